//! Engine Scenario Tests
//!
//! End-to-end checks of the execution controller through its bindings:
//! transform accuracy against a direct DFT, fault handling, length changes,
//! and consistency of the published real/imaginary pair.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use pv_fft::binding::{BindingEvent, ProcessRequestTrigger, PvBinding, ValueChangeTrigger};
use pv_fft::engine::{EngineError, ExecutionOutcome, ExecutionState, FftEngine};
use pv_fft::processing::generate_window;
use pv_fft::types::{AlarmSeverity, AlarmState, AlarmStatus, WindowType};

/// Direct O(N^2) half-spectrum DFT.
fn naive_half_dft(x: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    let bins = n / 2 + 1;
    let mut re = vec![0.0; bins];
    let mut im = vec![0.0; bins];
    for k in 0..bins {
        for (t, &v) in x.iter().enumerate() {
            let angle = -2.0 * PI * (k * t) as f64 / n as f64;
            re[k] += v * angle.cos();
            im[k] += v * angle.sin();
        }
    }
    (re, im)
}

fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "bin {}: {} vs {} (tol {})", i, a, e, tol);
    }
}

fn bits(v: &[f64]) -> Vec<u64> {
    v.iter().map(|x| x.to_bits()).collect()
}

fn value_change(name: &str) -> PvBinding<ValueChangeTrigger> {
    PvBinding::new(FftEngine::new(name), ValueChangeTrigger)
}

// ============================================================================
// Transform accuracy
// ============================================================================

#[test]
fn unit_pulse_at_index_one() {
    let mut binding = value_change("A1");
    let outcome = binding
        .dispatch(BindingEvent::InputWritten(vec![0.0, 1.0, 0.0, 0.0]))
        .unwrap();
    assert_eq!(outcome, Some(ExecutionOutcome::Published { execution: 1, bins: 3 }));

    let publication = binding.outputs().snapshot();
    assert_close(&publication.spectrum.real, &[1.0, 0.0, -1.0], 1e-12);
    assert_close(&publication.spectrum.imag, &[0.0, -1.0, 0.0], 1e-12);
    assert_eq!(binding.outputs().count(), 1);
    assert_eq!(binding.outputs().alarm(), AlarmState::CLEAR);
}

#[test]
fn two_cosines_match_direct_dft() {
    let n = 1024;
    let x: Vec<f64> = (0..n)
        .map(|t| {
            let t = t as f64;
            (2.0 * PI * t / n as f64).cos() + (2.0 * PI * 4.0 * t / n as f64).cos()
        })
        .collect();

    let mut binding = value_change("A2");
    binding.dispatch(BindingEvent::InputWritten(x.clone())).unwrap();
    let publication = binding.outputs().snapshot();

    let (re, im) = naive_half_dft(&x);
    assert_eq!(publication.spectrum.len(), 513);
    assert_close(&publication.spectrum.real, &re, 1e-8);
    assert_close(&publication.spectrum.imag, &im, 1e-8);

    // Peaks of N / 2 at the two tone bins
    assert!((publication.spectrum.real[1] - 512.0).abs() < 1e-8);
    assert!((publication.spectrum.real[4] - 512.0).abs() < 1e-8);
    assert!(publication.spectrum.real[2].abs() < 1e-8);
    assert_eq!(binding.outputs().count(), 1);
}

#[test]
fn windowed_input_matches_direct_dft_of_product() {
    let x: Vec<f64> = (0..16).map(|t| (t as f64 * 0.7).sin() + 0.25).collect();

    for window in WindowType::ALL {
        let mut engine = FftEngine::new("W1");
        engine.set_window_type(window);
        engine.set_input(x.clone());
        engine.execute().unwrap();

        let coeffs = generate_window(window, x.len());
        let product: Vec<f64> = x.iter().zip(&coeffs).map(|(a, b)| a * b).collect();
        let (re, im) = naive_half_dft(&product);

        let publication = engine.outputs().snapshot();
        assert_close(&publication.spectrum.real, &re, 1e-10);
        assert_close(&publication.spectrum.imag, &im, 1e-10);
    }
}

#[test]
fn random_inputs_of_random_length() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut engine = FftEngine::new("R1");

    for _ in 0..40 {
        let n = rng.gen_range(1..300usize);
        let x: Vec<f64> = (0..n).map(|_| rng.gen_range(-10.0..10.0)).collect();
        engine.set_input(x.clone());
        engine.execute().unwrap();

        let (re, im) = naive_half_dft(&x);
        let publication = engine.outputs().snapshot();
        let tol = 1e-9 * n as f64 * 10.0;
        assert_close(&publication.spectrum.real, &re, tol);
        assert_close(&publication.spectrum.imag, &im, tol);
    }
    assert_eq!(engine.outputs().count(), 40);
}

// ============================================================================
// Faults
// ============================================================================

#[test]
fn empty_input_faults_and_freezes_outputs() {
    let mut binding = PvBinding::new(FftEngine::new("A4"), ProcessRequestTrigger);
    binding
        .dispatch(BindingEvent::InputWritten(vec![3.0, 1.0, 4.0, 1.0, 5.0]))
        .unwrap();
    binding.dispatch(BindingEvent::ProcessRequested).unwrap();
    let before = binding.outputs().snapshot();
    assert_eq!(binding.outputs().count(), 1);

    binding.dispatch(BindingEvent::InputWritten(vec![])).unwrap();
    let outcome = binding.dispatch(BindingEvent::ProcessRequested).unwrap();

    let alarm = AlarmState::new(AlarmSeverity::Invalid, AlarmStatus::Write);
    assert_eq!(outcome, Some(ExecutionOutcome::Faulted(alarm)));
    assert_eq!(binding.outputs().alarm().severity.code(), 3);
    assert_eq!(binding.outputs().alarm().status.code(), 2);
    assert_eq!(binding.outputs().count(), 1);

    let after = binding.outputs().snapshot();
    assert_eq!(bits(&after.spectrum.real), bits(&before.spectrum.real));
    assert_eq!(bits(&after.spectrum.imag), bits(&before.spectrum.imag));
    assert_eq!(after.execution, before.execution);
    assert_eq!(binding.engine().state(), ExecutionState::Idle);
}

#[test]
fn fault_clears_on_next_success() {
    let mut engine = FftEngine::new("F1");
    engine.execute().unwrap();
    assert!(engine.outputs().alarm().is_alarmed());

    engine.set_input(vec![1.0, 2.0, 3.0]);
    engine.execute().unwrap();
    assert_eq!(engine.outputs().alarm(), AlarmState::CLEAR);
    assert_eq!(engine.outputs().count(), 1);
}

#[test]
fn unsupported_window_rejects_until_corrected() {
    let mut engine = FftEngine::new("U1");
    engine.set_input(vec![1.0, 0.0, 0.0, 0.0]);
    assert!(engine.write_window_selector("Kaiser").is_err());

    let result = engine.execute();
    assert!(matches!(result, Err(EngineError::UnsupportedWindowType(_))));
    assert_eq!(engine.outputs().count(), 0);
    assert_eq!(engine.outputs().alarm(), AlarmState::CLEAR);

    assert_eq!(engine.write_window_selector("hanning"), Ok(WindowType::Hann));
    assert!(engine.execute().is_ok());
    assert_eq!(engine.outputs().count(), 1);
}

// ============================================================================
// Lengths and invocation styles
// ============================================================================

#[test]
fn output_length_follows_input_length() {
    let mut binding = value_change("L1");
    for (n, bins) in [(4, 3), (8, 5), (5, 3), (1, 1), (2, 2), (1023, 512)] {
        let outcome = binding.dispatch(BindingEvent::InputWritten(vec![1.0; n])).unwrap();
        assert!(matches!(outcome, Some(ExecutionOutcome::Published { bins: b, .. }) if b == bins));
        let publication = binding.outputs().snapshot();
        assert_eq!(publication.spectrum.real.len(), bins);
        assert_eq!(publication.spectrum.imag.len(), bins);
        // Constant input: all energy in the DC bin
        assert!((publication.spectrum.real[0] - n as f64).abs() < 1e-9);
    }
}

#[test]
fn invocation_styles_publish_identical_spectra() {
    let x: Vec<f64> = (0..64).map(|t| ((t * t) % 7) as f64 - 3.0).collect();

    let mut by_value = value_change("A1");
    by_value.dispatch(BindingEvent::InputWritten(x.clone())).unwrap();

    let mut by_request = PvBinding::new(FftEngine::new("A4"), ProcessRequestTrigger);
    by_request.dispatch(BindingEvent::InputWritten(x)).unwrap();
    assert_eq!(by_request.outputs().count(), 0);
    by_request.dispatch(BindingEvent::ProcessRequested).unwrap();

    assert_eq!(
        by_value.outputs().snapshot().spectrum,
        by_request.outputs().snapshot().spectrum
    );
}

#[test]
fn counter_is_monotonic_and_notifies() {
    let mut engine = FftEngine::new("C1");
    let outputs = engine.outputs();
    let mut updates = outputs.subscribe();

    let mut last = 0;
    for i in 0..25 {
        // Every fifth trigger faults and must not advance the count
        let samples = if i % 5 == 0 { vec![] } else { vec![i as f64; 8] };
        engine.set_input(samples);
        engine.execute().unwrap();
        let count = outputs.count();
        assert!(count >= last);
        last = count;
    }
    assert_eq!(last, 20);
    assert!(updates.has_changed().unwrap());
    assert_eq!(*updates.borrow_and_update(), 20);
}

// ============================================================================
// Atomic pair publication
// ============================================================================

#[test]
fn readers_never_see_mixed_pairs() {
    let mut engine = FftEngine::new("P1");
    let outputs = engine.outputs();

    let reader = std::thread::spawn(move || {
        let mut observed = 0u64;
        while outputs.count() < 500 {
            let publication = outputs.snapshot();
            if publication.execution == 0 {
                continue;
            }
            // Input [k, k, 0, 0] gives real [2k, k, 0] and imag [0, -k, 0]
            let k = publication.spectrum.real[1];
            assert_eq!(publication.spectrum.real[0], 2.0 * k);
            assert_eq!(publication.spectrum.imag[1], -k);
            assert_eq!(k as u64, publication.execution);
            observed += 1;
        }
        observed
    });

    for k in 1..=500 {
        let k = k as f64;
        engine.set_input(vec![k, k, 0.0, 0.0]);
        engine.execute().unwrap();
    }

    reader.join().unwrap();
    assert_eq!(engine.outputs().snapshot().execution, 500);
}

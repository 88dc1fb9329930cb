//! FFT-based frequency profile extraction, ground: the teacher's
//! `processing/fft.rs` `FftProcessor` and bearing-frequency formulas, adapted
//! from vibration-specific TDS-11SA geometry constants to the generic
//! `MotorModel` bearing geometry fields carried per §3's motor model.

use num_complex::Complex;
use rustfft::FftPlanner;

use crate::types::{BearingFaultMultipliers, FrequencyProfile};

/// One-sided magnitude spectrum of a fixed-size sample window.
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
}

/// Compute the one-sided FFT magnitude spectrum of `samples` at
/// `sample_rate_hz`. Zero-pads to the next power of two if `samples` is
/// shorter than that; truncates if longer.
pub fn compute_spectrum(samples: &[f64], sample_rate_hz: f64) -> Option<Spectrum> {
    if samples.is_empty() || sample_rate_hz <= 0.0 {
        return None;
    }
    let fft_size = samples.len().next_power_of_two();
    let mut buffer: Vec<Complex<f64>> = samples.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buffer.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);

    let n_positive = fft_size / 2 + 1;
    let freq_resolution = sample_rate_hz / fft_size as f64;
    let frequencies: Vec<f64> = (0..n_positive).map(|i| i as f64 * freq_resolution).collect();
    let magnitudes: Vec<f64> = buffer
        .iter()
        .take(n_positive)
        .enumerate()
        .map(|(i, c)| {
            let scale = if i == 0 || i == n_positive - 1 {
                1.0 / fft_size as f64
            } else {
                2.0 / fft_size as f64
            };
            c.norm() * scale
        })
        .collect();

    Some(Spectrum { frequencies, magnitudes })
}

/// Peak magnitude within `target_freq ± bandwidth/2`.
fn peak_in_band(spectrum: &Spectrum, target_freq: f64, bandwidth: f64) -> f64 {
    let half = bandwidth / 2.0;
    spectrum
        .frequencies
        .iter()
        .zip(spectrum.magnitudes.iter())
        .filter(|(&f, _)| f >= target_freq - half && f <= target_freq + half)
        .map(|(_, &m)| m)
        .fold(0.0_f64, f64::max)
}

/// Build a `FrequencyProfile` for a current tag's sample window (§4.6):
/// fundamental peak in `[fundamental_min_hz, fundamental_max_hz]`, harmonic
/// amplitudes 2..=harmonics as multiples of the fundamental, THD, and the
/// bearing fault frequency amplitudes derived from `multipliers` at the
/// detected shaft speed.
pub fn build_frequency_profile(
    samples: &[f64],
    sample_rate_hz: f64,
    fundamental_min_hz: f64,
    fundamental_max_hz: f64,
    harmonics: usize,
    multipliers: BearingFaultMultipliers,
) -> Option<FrequencyProfile> {
    let spectrum = compute_spectrum(samples, sample_rate_hz)?;

    let (fundamental_hz, fundamental_amplitude) = spectrum
        .frequencies
        .iter()
        .zip(spectrum.magnitudes.iter())
        .filter(|(&f, _)| f >= fundamental_min_hz && f <= fundamental_max_hz)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(&f, &m)| (f, m))?;

    let bandwidth = fundamental_hz * 0.1;
    let mut harmonic_amplitudes = Vec::with_capacity(harmonics.saturating_sub(1));
    let mut harmonic_sum_sq = 0.0;
    for h in 2..=harmonics.max(2) {
        let amp = peak_in_band(&spectrum, fundamental_hz * h as f64, bandwidth);
        harmonic_sum_sq += amp * amp;
        harmonic_amplitudes.push(amp);
    }
    let thd_percent = if fundamental_amplitude > 1e-9 {
        harmonic_sum_sq.sqrt() / fundamental_amplitude * 100.0
    } else {
        0.0
    };

    let shaft_freq = fundamental_hz;
    let noise_floor = {
        let mut sorted = spectrum.magnitudes.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        crate::stats::percentile_of_sorted(&sorted, 0.5)
    };

    Some(FrequencyProfile {
        fundamental_hz,
        fundamental_amplitude,
        harmonic_amplitudes,
        thd_percent,
        bpfo_amplitude: peak_in_band(&spectrum, shaft_freq * multipliers.bpfo, bandwidth),
        bpfi_amplitude: peak_in_band(&spectrum, shaft_freq * multipliers.bpfi, bandwidth),
        bsf_amplitude: peak_in_band(&spectrum, shaft_freq * multipliers.bsf, bandwidth),
        ftf_amplitude: peak_in_band(&spectrum, shaft_freq * multipliers.ftf, bandwidth),
        noise_floor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn spectrum_peak_matches_synthetic_tone() {
        let sample_rate = 1000.0;
        let freq = 60.0;
        let samples: Vec<f64> = (0..2048)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect();
        let spectrum = compute_spectrum(&samples, sample_rate).unwrap();
        let (peak_freq, _) = spectrum
            .frequencies
            .iter()
            .zip(spectrum.magnitudes.iter())
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(&f, &m)| (f, m))
            .unwrap();
        assert!((peak_freq - freq).abs() < 2.0);
    }

    #[test]
    fn builds_profile_with_fundamental_in_range() {
        let sample_rate = 1000.0;
        let freq = 55.0;
        let samples: Vec<f64> = (0..2048)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect();
        let multipliers = BearingFaultMultipliers { bpfo: 7.0, bpfi: 11.0, bsf: 5.0, ftf: 0.4 };
        let profile = build_frequency_profile(&samples, sample_rate, 45.0, 65.0, 10, multipliers).unwrap();
        assert!((profile.fundamental_hz - freq).abs() < 2.0);
        assert_eq!(profile.harmonic_amplitudes.len(), 9);
    }
}

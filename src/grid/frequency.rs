//! Frequency-domain grid detector.
//!
//! The central horizontal and vertical axes of the 2-D spectrum are the 1-D
//! spectra of the column and row intensity projections, so the detector works
//! on those projections directly. A grid of thin lines is a pulse train whose
//! spectrum has a comb of harmonics; the fundamental with the strongest comb
//! gives the period.

use image::GrayImage;
use tracing;

use super::types::{GridCandidate, GridLines, GridMethod, GridStrategy};
use crate::config::GridDetectionConfig;
use crate::errors::AppResult;

/// Shortest period considered, in pixels
const MIN_PERIOD_PX: f64 = 6.0;
/// A period must repeat at least this many times across the image
const MIN_REPETITIONS: usize = 4;
/// Harmonics averaged when scoring a fundamental
const HARMONICS: usize = 3;

/// Dominant period of a 1-D profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodEstimate {
    pub period_px: f64,
    /// Comb score of the chosen fundamental over the mean spectral magnitude
    pub peak_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct FrequencyGridDetector {
    confidence_cap: f64,
}

impl FrequencyGridDetector {
    pub fn from_config(config: &GridDetectionConfig) -> Self {
        Self {
            confidence_cap: config.frequency_confidence_cap,
        }
    }
}

impl GridStrategy for FrequencyGridDetector {
    fn method(&self) -> GridMethod {
        GridMethod::Frequency
    }

    fn detect(&self, gray: &GrayImage) -> AppResult<GridCandidate> {
        let (columns, rows) = intensity_projections(gray);
        let vertical = dominant_period(&columns);
        let horizontal = dominant_period(&rows);

        let (Some(h), Some(v)) = (horizontal, vertical) else {
            return Ok(GridCandidate::empty(GridMethod::Frequency));
        };

        let consistency = 1.0 - (h.period_px - v.period_px).abs() / h.period_px.max(v.period_px);
        let strength = ((h.peak_ratio.min(v.peak_ratio) - 3.0) / 7.0).clamp(0.0, 1.0);
        let confidence = (self.confidence_cap * (0.5 * consistency + 0.5 * strength))
            .clamp(0.0, self.confidence_cap);
        let spacing_px = (h.period_px + v.period_px) / 2.0;

        tracing::debug!(
            target: "vision_pipeline",
            "Frequency detector: horizontal period={:.2}px (ratio {:.1}), vertical period={:.2}px (ratio {:.1}), confidence={:.3}",
            h.period_px,
            h.peak_ratio,
            v.period_px,
            v.peak_ratio,
            confidence
        );

        Ok(GridCandidate {
            method: GridMethod::Frequency,
            spacing_px,
            confidence,
            lines: GridLines {
                horizontal: periodic_positions(&rows, h.period_px),
                vertical: periodic_positions(&columns, v.period_px),
            },
        })
    }
}

/// Mean intensity per column and per row.
fn intensity_projections(gray: &GrayImage) -> (Vec<f64>, Vec<f64>) {
    let (width, height) = gray.dimensions();
    let mut columns = vec![0f64; width as usize];
    let mut rows = vec![0f64; height as usize];
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = pixel[0] as f64;
        columns[x as usize] += value;
        rows[y as usize] += value;
    }
    columns.iter_mut().for_each(|c| *c /= height.max(1) as f64);
    rows.iter_mut().for_each(|r| *r /= width.max(1) as f64);
    (columns, rows)
}

/// Magnitudes of the DFT of the mean-removed profile for bins `0..=n/2`.
fn magnitude_spectrum(profile: &[f64]) -> Vec<f64> {
    let n = profile.len();
    let mean = profile.iter().sum::<f64>() / n as f64;
    (0..=n / 2)
        .map(|k| {
            let (mut re, mut im) = (0.0, 0.0);
            for (i, value) in profile.iter().enumerate() {
                let phase = std::f64::consts::TAU * (k * i) as f64 / n as f64;
                re += (value - mean) * phase.cos();
                im -= (value - mean) * phase.sin();
            }
            (re * re + im * im).sqrt()
        })
        .collect()
}

pub fn dominant_period(profile: &[f64]) -> Option<PeriodEstimate> {
    let n = profile.len();
    let k_min = MIN_REPETITIONS;
    let k_max = (n as f64 / MIN_PERIOD_PX) as usize;
    if n < 2 * MIN_PERIOD_PX as usize || k_max <= k_min {
        return None;
    }

    let spectrum = magnitude_spectrum(profile);
    let nyquist = spectrum.len() - 1;
    let mean_magnitude = spectrum[1..].iter().sum::<f64>() / nyquist.max(1) as f64;
    if mean_magnitude < 1e-6 {
        return None;
    }

    let comb_score = |k: usize| -> f64 {
        let harmonics: Vec<f64> = (1..=HARMONICS)
            .map(|h| h * k)
            .filter(|&bin| bin <= nyquist)
            .map(|bin| spectrum[bin])
            .collect();
        harmonics.iter().sum::<f64>() / harmonics.len().max(1) as f64
    };

    let scores: Vec<(usize, f64)> = (k_min..=k_max.min(nyquist))
        .map(|k| (k, comb_score(k)))
        .collect();
    let best_score = scores.iter().map(|(_, s)| *s).fold(0.0, f64::max);
    if best_score <= 0.0 {
        return None;
    }

    // Lowest fundamental whose comb is nearly as strong as the best one
    let (k, score) = scores
        .iter()
        .copied()
        .find(|(_, s)| *s >= 0.8 * best_score)?;

    Some(PeriodEstimate {
        period_px: n as f64 / refine_peak(&spectrum, k),
        peak_ratio: score / mean_magnitude,
    })
}

/// Parabolic interpolation of the peak bin.
fn refine_peak(spectrum: &[f64], k: usize) -> f64 {
    if k == 0 || k + 1 >= spectrum.len() {
        return k as f64;
    }
    let (a, b, c) = (spectrum[k - 1], spectrum[k], spectrum[k + 1]);
    let denominator = a - 2.0 * b + c;
    if denominator.abs() < 1e-12 {
        return k as f64;
    }
    let offset = 0.5 * (a - c) / denominator;
    k as f64 + offset.clamp(-0.5, 0.5)
}

/// Line positions implied by the period: the darkest phase, repeated across the profile.
fn periodic_positions(profile: &[f64], period: f64) -> Vec<f64> {
    if !(period.is_finite() && period >= 1.0) {
        return Vec::new();
    }
    let phases = period.round() as usize;
    let phase = (0..phases)
        .min_by(|&a, &b| {
            let sum = |p: usize| -> f64 {
                let mut total = 0.0;
                let mut position = p as f64;
                while (position as usize) < profile.len() {
                    total += profile[position as usize];
                    position += period;
                }
                total
            };
            sum(a).total_cmp(&sum(b))
        })
        .unwrap_or(0);

    let mut positions = Vec::new();
    let mut position = phase as f64;
    while position < profile.len() as f64 {
        positions.push(position);
        position += period;
    }
    positions
}

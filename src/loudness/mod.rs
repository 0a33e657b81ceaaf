//! Two-pass loudness normalization pipeline.
//!
//! The measure pass runs the external loudness filter in statistics mode;
//! on success the apply pass corrects linearly with the measured values, on
//! failure it falls back to single-pass dynamic correction. The fallback is
//! never fatal, and linear vs dynamic is never caller-selected.

pub mod ffmpeg;

pub use ffmpeg::FfmpegLoudnessFilter;

use crate::error::ChapterResult;
use log::{debug, warn};
use std::path::Path;

/// Default integrated loudness target in LUFS
pub const DEFAULT_TARGET_LUFS: f64 = -16.0;
/// True-peak ceiling in dBTP, fixed by design
pub const TARGET_TRUE_PEAK_DBTP: f64 = -1.5;
/// Loudness-range target in LU, fixed by design
pub const TARGET_LOUDNESS_RANGE_LU: f64 = 11.0;

/// Normalization targets threaded explicitly through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessTargets {
    /// Integrated loudness target in LUFS
    pub integrated_lufs: f64,
    /// True-peak ceiling in dBTP
    pub true_peak_dbtp: f64,
    /// Loudness-range target in LU
    pub loudness_range_lu: f64,
}

impl LoudnessTargets {
    /// Targets with a custom integrated loudness and the fixed TP/LRA values
    pub fn with_integrated(integrated_lufs: f64) -> Self {
        LoudnessTargets {
            integrated_lufs,
            ..Self::default()
        }
    }
}

impl Default for LoudnessTargets {
    fn default() -> Self {
        LoudnessTargets {
            integrated_lufs: DEFAULT_TARGET_LUFS,
            true_peak_dbtp: TARGET_TRUE_PEAK_DBTP,
            loudness_range_lu: TARGET_LOUDNESS_RANGE_LU,
        }
    }
}

/// Result of the measurement pass over a source file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessMeasurement {
    /// Measured integrated loudness in LUFS
    pub integrated_lufs: f64,
    /// Measured true peak in dBTP
    pub true_peak_dbtp: f64,
    /// Measured loudness range in LU
    pub loudness_range_lu: f64,
    /// Measured gating threshold in LUFS
    pub threshold_lufs: f64,
}

/// External loudness measurement port
pub trait LoudnessFilter {
    /// Single-pass statistics run over the full input.
    fn measure(
        &self,
        input: &Path,
        targets: &LoudnessTargets,
    ) -> ChapterResult<LoudnessMeasurement>;
}

/// How the apply pass will correct (or not touch) the audio.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationPlan {
    /// Two-pass linear correction with the measured values
    Linear(LoudnessMeasurement),
    /// Single-pass dynamic correction, used when measurement failed
    Dynamic,
    /// Normalization disabled, stream passes through unmodified
    Skipped,
}

/// Apply-pass mode, reported after the pipeline finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationMode {
    /// Linear correction from measured values
    Linear,
    /// Dynamic single-pass correction
    Dynamic,
    /// No normalization performed
    Skipped,
}

impl NormalizationPlan {
    /// The mode this plan will run in
    pub fn mode(&self) -> NormalizationMode {
        match self {
            NormalizationPlan::Linear(_) => NormalizationMode::Linear,
            NormalizationPlan::Dynamic => NormalizationMode::Dynamic,
            NormalizationPlan::Skipped => NormalizationMode::Skipped,
        }
    }

    /// Measured values, if the measure pass succeeded
    pub fn measurement(&self) -> Option<&LoudnessMeasurement> {
        match self {
            NormalizationPlan::Linear(m) => Some(m),
            _ => None,
        }
    }

    /// Whether an apply pass will run at all
    pub fn is_active(&self) -> bool {
        !matches!(self, NormalizationPlan::Skipped)
    }
}

/// Run the measure state and decide the apply mode.
///
/// Measurement failure is downgraded to a warning and the dynamic fallback;
/// only the apply pass itself can fail the pipeline.
pub fn plan<F: LoudnessFilter + ?Sized>(
    filter: &F,
    input: &Path,
    targets: &LoudnessTargets,
    enabled: bool,
) -> NormalizationPlan {
    if !enabled {
        return NormalizationPlan::Skipped;
    }

    match filter.measure(input, targets) {
        Ok(measurement) => {
            debug!(
                "measured {:?}: I={} LUFS, TP={} dBTP, LRA={} LU, thresh={} LUFS",
                input,
                measurement.integrated_lufs,
                measurement.true_peak_dbtp,
                measurement.loudness_range_lu,
                measurement.threshold_lufs
            );
            NormalizationPlan::Linear(measurement)
        }
        Err(e) => {
            warn!("loudness measurement failed, falling back to dynamic mode: {e}");
            NormalizationPlan::Dynamic
        }
    }
}

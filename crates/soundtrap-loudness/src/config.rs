use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD_PERCENT: f32 = 5.0;

/// Trigger threshold for the RMS loudness metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoudnessConfig {
    /// Percent of full-scale RMS above which a chunk counts as loud.
    pub threshold_percent: f32,
}

impl LoudnessConfig {
    /// Strictly above the threshold; a chunk sitting exactly on it is quiet.
    pub fn is_loud(&self, loudness_percent: f32) -> bool {
        loudness_percent > self.threshold_percent
    }
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
        }
    }
}

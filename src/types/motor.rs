//! The 4-layer motor model: `MotorModel` (catalog) → `MotorInstance` →
//! `MotorParameterMapping` → `OperationMode`, plus the `BaselineProfile`
//! the motor baseline learner (§4.6) produces per `(mode, parameter)`.

use serde::{Deserialize, Serialize};

/// Catalog entry: rated values and bearing geometry shared by every instance
/// of a given motor model (used for BPFO/BPFI/BSF/FTF computation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorModel {
    pub model_id: u64,
    pub name: String,
    pub rated_current_a: f64,
    pub rated_rpm: f64,
    /// Bearing geometry: number of rolling elements, ball diameter / pitch
    /// diameter ratio, contact angle (radians).
    pub bearing_num_elements: u32,
    pub bearing_diameter_ratio: f64,
    pub bearing_contact_angle_rad: f64,
}

impl MotorModel {
    /// Bearing fault frequencies as multiples of shaft rotation frequency,
    /// from standard rolling-element bearing geometry formulas.
    pub fn bearing_fault_multipliers(&self) -> BearingFaultMultipliers {
        let n = self.bearing_num_elements as f64;
        let d_ratio = self.bearing_diameter_ratio;
        let cos_phi = self.bearing_contact_angle_rad.cos();

        BearingFaultMultipliers {
            bpfo: (n / 2.0) * (1.0 - d_ratio * cos_phi),
            bpfi: (n / 2.0) * (1.0 + d_ratio * cos_phi),
            bsf: (1.0 / (2.0 * d_ratio)) * (1.0 - (d_ratio * cos_phi).powi(2)),
            ftf: 0.5 * (1.0 - d_ratio * cos_phi),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BearingFaultMultipliers {
    pub bpfo: f64,
    pub bpfi: f64,
    pub bsf: f64,
    pub ftf: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorInstance {
    pub instance_id: u64,
    pub device_id: u64,
    pub model_id: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorParameter {
    Current,
    Voltage,
    Temperature,
    Vibration,
    Speed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorParameterMapping {
    pub instance_id: u64,
    pub parameter: MotorParameter,
    pub tag_id: u64,
    pub scale: f64,
    pub offset: f64,
}

impl MotorParameterMapping {
    pub fn convert(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

/// A named phase (e.g. "Running", "Startup", "Idle") triggered by a tag
/// value within `[trigger_min, trigger_max]` for at least `min_duration_ms`.
/// `priority` disambiguates overlapping ranges: the highest-priority match
/// wins; equal priority resolves to declaration order (resolved Open
/// Question, DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMode {
    pub mode_id: u64,
    pub instance_id: u64,
    pub name: String,
    pub trigger_tag_id: u64,
    pub trigger_min: f64,
    pub trigger_max: f64,
    pub min_duration_ms: u64,
    /// 0 = unbounded.
    pub max_duration_ms: u64,
    pub priority: i32,
}

impl OperationMode {
    pub fn in_range(&self, value: f64) -> bool {
        value >= self.trigger_min && value <= self.trigger_max
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TagStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p05: f64,
    pub p95: f64,
    pub sample_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrequencyProfile {
    pub fundamental_hz: f64,
    pub fundamental_amplitude: f64,
    /// Amplitudes of harmonics 2..10 as multiples of the fundamental.
    pub harmonic_amplitudes: Vec<f64>,
    pub thd_percent: f64,
    pub bpfo_amplitude: f64,
    pub bpfi_amplitude: f64,
    pub bsf_amplitude: f64,
    pub ftf_amplitude: f64,
    pub noise_floor: f64,
}

/// Per-(mode, parameter) learned statistics, with an optional frequency
/// profile for current-type parameters. `version` is incremented on every
/// successful learn so consumers can detect staleness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineProfile {
    pub instance_id: u64,
    pub mode_id: u64,
    pub parameter: MotorParameter,
    pub stats: TagStats,
    pub frequency: Option<FrequencyProfile>,
    pub version: u64,
    pub learned_to_utc: i64,
}

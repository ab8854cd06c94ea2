//! The docking search box and its validation.

use dockyard_common::{DockyardError, Result};
use serde::{Deserialize, Serialize};

pub const EXHAUSTIVENESS_MIN: u32 = 1;
pub const EXHAUSTIVENESS_MAX: u32 = 32;
pub const EXHAUSTIVENESS_DEFAULT: u32 = 8;

/// Region sampled by Vina, in Angstrom, plus the search effort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchBox {
    pub center: [f64; 3],
    pub size: [f64; 3],
    pub exhaustiveness: u32,
}

impl Default for SearchBox {
    fn default() -> Self {
        Self {
            center: [0.0; 3],
            size: [0.0; 3],
            exhaustiveness: EXHAUSTIVENESS_DEFAULT,
        }
    }
}

/// Bounds applied by [`SearchBox::validate`].
#[derive(Debug, Clone, Copy)]
pub struct BoxLimits {
    pub max_edge: f64,
}

impl Default for BoxLimits {
    fn default() -> Self {
        Self { max_edge: 126.0 }
    }
}

impl From<&dockyard_config::LimitsConfig> for BoxLimits {
    fn from(limits: &dockyard_config::LimitsConfig) -> Self {
        Self { max_edge: limits.max_box_edge }
    }
}

const AXES: [&str; 3] = ["x", "y", "z"];

impl SearchBox {
    /// Reject boxes Vina cannot search meaningfully. A zero or negative edge,
    /// which includes the all-zero box of a fresh session, is an error here
    /// instead of an opaque failure inside the binary.
    pub fn validate(&self, limits: BoxLimits) -> Result<()> {
        for (axis, value) in AXES.iter().zip(self.center) {
            if !value.is_finite() {
                return Err(DockyardError::InvalidSearchBox(format!(
                    "center_{} must be a finite number, got {}",
                    axis, value
                )));
            }
        }

        for (axis, value) in AXES.iter().zip(self.size) {
            if !value.is_finite() || value <= 0.0 || value > limits.max_edge {
                return Err(DockyardError::InvalidSearchBox(format!(
                    "size_{} must be in (0, {}] Å, got {}",
                    axis, limits.max_edge, value
                )));
            }
        }

        if !(EXHAUSTIVENESS_MIN..=EXHAUSTIVENESS_MAX).contains(&self.exhaustiveness) {
            return Err(DockyardError::InvalidSearchBox(format!(
                "exhaustiveness must be in {}..={}, got {}",
                EXHAUSTIVENESS_MIN, EXHAUSTIVENESS_MAX, self.exhaustiveness
            )));
        }

        Ok(())
    }
}

//! Reading binding affinities out of Vina's stdout.
//!
//! Vina prints a results table whose rows start with the mode rank:
//!
//! ```text
//! mode |   affinity | dist from best mode
//!      | (kcal/mol) | rmsd l.b.| rmsd u.b.
//! -----+------------+----------+----------
//!    1         -7.2      0.000      0.000
//! ```

use serde::{Deserialize, Serialize};

/// Shown wherever the affinity could not be read.
pub const AFFINITY_UNAVAILABLE: &str = "N/A";

/// One row of the results table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseScore {
    pub mode: u32,
    /// kcal/mol, more negative binds stronger.
    pub affinity: f64,
    pub rmsd_lb: f64,
    pub rmsd_ub: f64,
}

/// Affinity of the rank-1 pose: the second token of the first line whose
/// first token is `"1"` and whose second token parses. `None` when no such
/// line exists.
pub fn extract_affinity(stdout: &str) -> Option<f64> {
    stdout.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some("1"), Some(value)) => value.parse::<f64>().ok(),
            _ => None,
        }
    })
}

/// Every well-formed row of the results table, in printed order.
pub fn parse_pose_table(stdout: &str) -> Vec<PoseScore> {
    stdout
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 4 {
                return None;
            }
            Some(PoseScore {
                mode: tokens[0].parse().ok()?,
                affinity: tokens[1].parse().ok()?,
                rmsd_lb: tokens[2].parse().ok()?,
                rmsd_ub: tokens[3].parse().ok()?,
            })
        })
        .collect()
}

pub fn format_affinity(affinity: Option<f64>) -> String {
    affinity
        .map(|a| a.to_string())
        .unwrap_or_else(|| AFFINITY_UNAVAILABLE.to_string())
}

//! The detection verdict returned from a full aggregator run.

use crate::brand::BrandId;

/// The outcome of one aggregator run (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionResult {
    pub verdict: bool,
    pub percentage: u8,
    pub brand: BrandId,
}

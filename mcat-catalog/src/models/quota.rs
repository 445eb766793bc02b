//! Quota state model
//!
//! Persisted as-is under the `quota` key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaTier {
    Free,
    Pro,
    Unlimited,
}

impl QuotaTier {
    /// Monthly cap for the tier (None = unlimited)
    pub fn default_cap(&self) -> Option<u64> {
        match self {
            QuotaTier::Free => Some(200),
            QuotaTier::Pro => Some(2000),
            QuotaTier::Unlimited => None,
        }
    }
}

impl FromStr for QuotaTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(QuotaTier::Free),
            "pro" => Ok(QuotaTier::Pro),
            "unlimited" => Ok(QuotaTier::Unlimited),
            other => Err(format!("unknown quota tier: {}", other)),
        }
    }
}

/// Usage cycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    /// Admissions still possible this cycle
    Active,
    /// `used` reached the cap
    Exhausted,
}

/// Monthly usage against a cap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaState {
    pub tier: QuotaTier,
    /// None = unlimited
    pub monthly_cap: Option<u64>,
    /// Cumulative admissions this cycle, clamped to `[0, monthly_cap]`
    pub used: u64,
    pub cycle_status: CycleStatus,
    /// First day of the current cycle (UTC)
    pub cycle_start: NaiveDate,
}

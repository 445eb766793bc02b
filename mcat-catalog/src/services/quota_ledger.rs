//! Quota ledger
//!
//! Monthly admission counter against a tier cap. Plain data: the catalog
//! store keeps it inside its locked state so a batch commit and the
//! matching quota increment land in one state transition.
//!
//! Deletion never gives quota back.

use crate::models::{CycleStatus, QuotaState, QuotaTier};
use chrono::{DateTime, Utc};
use mcat_common::time;

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaLedger {
    state: QuotaState,
}

impl QuotaLedger {
    /// Fresh ledger for the cycle containing `now`
    ///
    /// `cap_override` replaces the tier default when set.
    pub fn new(tier: QuotaTier, cap_override: Option<u64>, now: DateTime<Utc>) -> Self {
        let mut ledger = Self {
            state: QuotaState {
                tier,
                monthly_cap: cap_override.or(tier.default_cap()),
                used: 0,
                cycle_status: CycleStatus::Active,
                cycle_start: time::month_start(now),
            },
        };
        ledger.refresh_status();
        ledger
    }

    /// Restore a persisted ledger, enforcing `used <= cap`
    pub fn from_state(state: QuotaState) -> Self {
        let mut ledger = Self { state };
        ledger.clamp_used();
        ledger.refresh_status();
        ledger
    }

    pub fn state(&self) -> &QuotaState {
        &self.state
    }

    pub fn used(&self) -> u64 {
        self.state.used
    }

    pub fn monthly_cap(&self) -> Option<u64> {
        self.state.monthly_cap
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.cycle_status == CycleStatus::Exhausted
    }

    /// Admissions still possible with `pending` in flight (None = unlimited)
    pub fn remaining(&self, pending: u64) -> Option<u64> {
        self.state
            .monthly_cap
            .map(|cap| cap.saturating_sub(self.state.used.saturating_add(pending)))
    }

    /// How many of `requested` items may be admitted now
    pub fn admissible(&self, requested: usize, pending: u64) -> usize {
        match self.remaining(pending) {
            Some(remaining) => requested.min(usize::try_from(remaining).unwrap_or(usize::MAX)),
            None => requested,
        }
    }

    /// Record `delta` admissions; negative deltas are ignored
    pub fn commit(&mut self, delta: i64) {
        let delta = u64::try_from(delta).unwrap_or(0);
        self.state.used = self.state.used.saturating_add(delta);
        self.clamp_used();
        self.refresh_status();
    }

    /// Start a new cycle if `now` is past the current one
    ///
    /// Returns true when the cycle rolled over.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        let current = time::month_start(now);
        if current <= self.state.cycle_start {
            return false;
        }
        tracing::info!(
            previous_cycle = %self.state.cycle_start,
            cycle = %current,
            used = self.state.used,
            "Quota cycle rolled over"
        );
        self.state.cycle_start = current;
        self.state.used = 0;
        self.refresh_status();
        true
    }

    /// Apply a tier/cap from configuration, keeping this cycle's usage
    pub fn reconfigure(&mut self, tier: QuotaTier, cap_override: Option<u64>) -> bool {
        let cap = cap_override.or(tier.default_cap());
        if self.state.tier == tier && self.state.monthly_cap == cap {
            return false;
        }
        self.state.tier = tier;
        self.state.monthly_cap = cap;
        self.clamp_used();
        self.refresh_status();
        true
    }

    fn clamp_used(&mut self) {
        if let Some(cap) = self.state.monthly_cap {
            self.state.used = self.state.used.min(cap);
        }
    }

    fn refresh_status(&mut self) {
        self.state.cycle_status = match self.state.monthly_cap {
            Some(cap) if self.state.used >= cap => CycleStatus::Exhausted,
            _ => CycleStatus::Active,
        };
    }
}

//! Budget guard for reask spending.
//!
//! Spend is an estimate: a fixed cost per extraction supplied by the caller.
//! The orchestrator owns a [`BudgetState`] for the lifetime of one run and
//! mutates it from its sequential review loop only.

use serde::{Deserialize, Serialize};

/// True iff a cap is set and the spend has reached it.
pub fn should_abort(spend_usd: f64, cap_usd: Option<f64>) -> bool {
    match cap_usd {
        None => false,
        Some(cap) => spend_usd >= cap,
    }
}

/// Running spend for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub spend_usd: f64,
    pub cap_usd: Option<f64>,
}

impl BudgetState {
    pub fn new(cap_usd: Option<f64>) -> Self {
        Self {
            spend_usd: 0.0,
            cap_usd,
        }
    }

    /// Add spend. Negative amounts are ignored so spend never decreases.
    pub fn charge(&mut self, amount_usd: f64) {
        if amount_usd > 0.0 {
            self.spend_usd += amount_usd;
        }
    }

    pub fn exhausted(&self) -> bool {
        should_abort(self.spend_usd, self.cap_usd)
    }
}

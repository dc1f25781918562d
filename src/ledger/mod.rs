//! The Cycle Ledger: opens and closes monthly cycles and keeps their
//! denormalized aggregates (`total_charges`, `total_depenses`, `reste`) in step
//! with the fixed charges and expenses they summarize.

pub mod charges;
pub mod cycle;
pub mod expenses;

use crate::database::models::{Cycle, CycleScope, Expense, FixedCharge};
use crate::database::store::RecordStore;
use crate::error::{BudgetError, Result};
use crate::retry::RetryConfig;
use crate::utils::Logger;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

pub use charges::ChargeDraft;
pub use expenses::ExpenseDraft;

/// What happens to expense edits and cycle updates once a cycle is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostClosurePolicy {
    /// Closed cycles are frozen; edits fail with `CycleClosed`.
    #[default]
    Forbid,
    /// Edits go through and the closed cycle's expense totals are recomputed.
    Allow,
}

impl FromStr for PostClosurePolicy {
    type Err = BudgetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forbid" => Ok(PostClosurePolicy::Forbid),
            "allow" => Ok(PostClosurePolicy::Allow),
            other => Err(BudgetError::validation(format!(
                "unknown post-closure policy '{other}', expected 'forbid' or 'allow'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LedgerOptions {
    pub post_closure: PostClosurePolicy,
    pub retry: RetryConfig,
}

/// Outcome of the best-effort aggregate refresh that follows a primary write.
#[derive(Debug, Clone, PartialEq)]
pub enum TotalsRefresh {
    Updated(Cycle),
    /// Nothing to refresh (e.g. a charge changed while no cycle is active).
    Skipped,
    /// The write succeeded but the cached totals could not be refreshed.
    /// `cycle_id` is `None` when the cycle itself could not be looked up.
    Stale { cycle_id: Option<i64>, reason: String },
}

impl TotalsRefresh {
    pub(crate) fn stale(cycle_id: Option<i64>, error: &BudgetError) -> Self {
        let reason = error.to_string();
        Logger::log_totals_stale(cycle_id, &reason);
        TotalsRefresh::Stale { cycle_id, reason }
    }

    pub fn cycle(&self) -> Option<&Cycle> {
        match self {
            TotalsRefresh::Updated(cycle) => Some(cycle),
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, TotalsRefresh::Stale { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseChange {
    pub expense: Expense,
    pub totals: TotalsRefresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeChange {
    pub charge: FixedCharge,
    pub totals: TotalsRefresh,
}

/// `reste = income - total_charges - total_depenses`
pub fn compute_reste(income: f64, total_charges: f64, total_depenses: f64) -> f64 {
    income - total_charges - total_depenses
}

#[derive(Debug)]
pub struct CycleLedger<S> {
    store: Arc<S>,
    options: LedgerOptions,
}

impl<S> Clone for CycleLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            options: self.options.clone(),
        }
    }
}

impl<S: RecordStore> CycleLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_options(store, LedgerOptions::default())
    }

    pub fn with_options(store: Arc<S>, options: LedgerOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    pub(crate) async fn load_cycle(&self, cycle_id: i64) -> Result<Cycle> {
        self.store
            .get_cycle(cycle_id)
            .await?
            .ok_or_else(|| BudgetError::cycle_not_found(cycle_id))
    }

    /// Cycles owned by someone else are reported as missing.
    pub(crate) async fn load_owned_cycle(&self, cycle_id: i64, user_id: &str) -> Result<Cycle> {
        let cycle = self.load_cycle(cycle_id).await?;
        if cycle.user_id != user_id {
            return Err(BudgetError::cycle_not_found(cycle_id));
        }
        Ok(cycle)
    }

    /// Status guard handed to the store for expense and cycle edits.
    pub(crate) fn write_scope(&self) -> CycleScope {
        match self.options.post_closure {
            PostClosurePolicy::Forbid => CycleScope::ActiveOnly,
            PostClosurePolicy::Allow => CycleScope::AnyStatus,
        }
    }

    pub(crate) fn ensure_editable(&self, cycle: &Cycle) -> Result<()> {
        if cycle.is_closed() && self.options.post_closure == PostClosurePolicy::Forbid {
            return Err(BudgetError::CycleClosed { cycle_id: cycle.id });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::database::models::{Currency, Cycle, CycleStatus, Expense};
    use chrono::{NaiveDate, TimeZone, Utc};

    pub fn cycle(id: i64, income: f64, total_charges: f64, total_depenses: f64) -> Cycle {
        Cycle {
            id,
            user_id: "alice".to_string(),
            year: 2024,
            month: 3,
            income,
            total_charges,
            total_depenses,
            reste: income - total_charges - total_depenses,
            status: CycleStatus::Active,
            currency: Currency::Eur,
            period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    pub fn expense(id: i64, cycle_id: i64, category_id: i64, amount: f64) -> Expense {
        Expense {
            id,
            user_id: "alice".to_string(),
            cycle_id,
            amount,
            category_id,
            date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            description: None,
            tags: vec![],
            created_at: Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_reste() {
        assert_eq!(compute_reste(3000.0, 800.0, 450.0), 1750.0);
        assert_eq!(compute_reste(0.0, 100.0, 0.0), -100.0);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Forbid".parse::<PostClosurePolicy>().unwrap(), PostClosurePolicy::Forbid);
        assert_eq!(" allow ".parse::<PostClosurePolicy>().unwrap(), PostClosurePolicy::Allow);
        assert!("maybe".parse::<PostClosurePolicy>().is_err());
        assert_eq!(PostClosurePolicy::default(), PostClosurePolicy::Forbid);
    }

    #[test]
    fn test_totals_refresh_accessors() {
        let refreshed = TotalsRefresh::Updated(test_support::cycle(1, 100.0, 10.0, 5.0));
        assert_eq!(refreshed.cycle().map(|c| c.id), Some(1));
        assert!(!refreshed.is_stale());

        let stale = TotalsRefresh::Stale {
            cycle_id: Some(1),
            reason: "store down".to_string(),
        };
        assert!(stale.cycle().is_none());
        assert!(stale.is_stale());
    }
}

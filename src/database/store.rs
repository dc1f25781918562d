use crate::database::models::{
    Category, Cycle, CyclePatch, CycleScope, Expense, ExpensePatch, FixedCharge,
    FixedChargePatch, NewCategory, NewCycle, NewExpense, NewFixedCharge,
};
use crate::database::query::Query;
use crate::error::Result;
use async_trait::async_trait;

/// Record Store boundary used by the ledger and the statistics service.
///
/// `get_*` return `Ok(None)` for a missing id; `update_*`/`delete_*` return
/// `NotFound` instead. Inserts, updates and deletes hand back the stored record.
///
/// Writes that take a [`CycleScope`] check the owning cycle's status in the
/// same transaction as the write and fail with `CycleClosed` when the scope
/// excludes it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_cycle(&self, id: i64) -> Result<Option<Cycle>>;
    async fn find_cycles(&self, query: Query) -> Result<Vec<Cycle>>;
    async fn insert_cycle(&self, cycle: NewCycle) -> Result<Cycle>;
    /// Applies `patch` and sets `reste = income - total_charges - total_depenses`
    /// from the stored row in the same statement sequence.
    async fn update_cycle(&self, id: i64, patch: CyclePatch, scope: CycleScope) -> Result<Cycle>;
    /// Active to closed, snapshotting `total_charges`. Fails with `CycleClosed`
    /// unless the cycle is still active when the write lands.
    async fn close_cycle(&self, id: i64, total_charges: f64) -> Result<Cycle>;
    /// `close_cycle` followed by inserting `next`, committed together or not at all.
    async fn roll_over_cycle(
        &self,
        id: i64,
        total_charges: f64,
        next: NewCycle,
    ) -> Result<(Cycle, Cycle)>;
    async fn delete_cycle(&self, id: i64) -> Result<Cycle>;

    async fn get_fixed_charge(&self, id: i64) -> Result<Option<FixedCharge>>;
    async fn find_fixed_charges(&self, query: Query) -> Result<Vec<FixedCharge>>;
    async fn insert_fixed_charge(&self, charge: NewFixedCharge) -> Result<FixedCharge>;
    async fn update_fixed_charge(&self, id: i64, patch: FixedChargePatch) -> Result<FixedCharge>;
    async fn delete_fixed_charge(&self, id: i64) -> Result<FixedCharge>;

    async fn get_expense(&self, id: i64) -> Result<Option<Expense>>;
    async fn find_expenses(&self, query: Query) -> Result<Vec<Expense>>;
    async fn insert_expense(&self, expense: NewExpense, scope: CycleScope) -> Result<Expense>;
    async fn update_expense(
        &self,
        id: i64,
        patch: ExpensePatch,
        scope: CycleScope,
    ) -> Result<Expense>;
    async fn delete_expense(&self, id: i64, scope: CycleScope) -> Result<Expense>;

    async fn find_categories(&self, query: Query) -> Result<Vec<Category>>;
    async fn insert_category(&self, category: NewCategory) -> Result<Category>;

    /// Sets `total_depenses` to the sum of the cycle's expenses and
    /// `reste = income - total_charges - total_depenses`, as one atomic step.
    async fn recompute_expense_totals(&self, cycle_id: i64) -> Result<Cycle>;
}

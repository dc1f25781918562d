use super::breakdown::{category_breakdown, CategoryTotal};
use super::comparison::{compare_cycles, CycleComparison};
use super::evolution::{evolution_series, EvolutionPoint};
use super::summary::{monthly_summary, MonthlySummary};
use crate::database::models::{Category, Cycle, CycleStatus, Expense, FixedCharge};
use crate::database::query::{Filter, Query};
use crate::database::store::RecordStore;
use crate::error::{BudgetError, Result};
use crate::utils::previous_month;
use chrono::NaiveDate;
use futures::try_join;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const RECENT_EXPENSES: usize = 5;

/// Everything the home screen shows for the active cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub cycle: Cycle,
    pub summary: MonthlySummary,
    pub active_charges: Vec<FixedCharge>,
    pub active_charges_total: f64,
    pub recent_expenses: Vec<Expense>,
    pub breakdown: Vec<CategoryTotal>,
}

/// Read-only statistics over stored cycles.
#[derive(Debug)]
pub struct StatisticsService<S> {
    store: Arc<S>,
}

impl<S> Clone for StatisticsService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> StatisticsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn load_cycle(&self, cycle_id: i64) -> Result<Cycle> {
        self.store
            .get_cycle(cycle_id)
            .await?
            .ok_or_else(|| BudgetError::cycle_not_found(cycle_id))
    }

    async fn cycle_expenses(&self, cycle_id: i64) -> Result<Vec<Expense>> {
        self.store
            .find_expenses(Query::new().eq("cycle_id", cycle_id))
            .await
    }

    /// Default categories plus the user's own.
    async fn visible_categories(&self, user_id: &str) -> Result<Vec<Category>> {
        self.store
            .find_categories(Query::new().or(vec![
                Filter::IsNull("user_id"),
                Filter::Eq("user_id", user_id.into()),
            ]))
            .await
    }

    async fn breakdown_for(&self, cycle: &Cycle) -> Result<Vec<CategoryTotal>> {
        let (expenses, categories) = try_join!(
            self.cycle_expenses(cycle.id),
            self.visible_categories(&cycle.user_id)
        )?;
        Ok(category_breakdown(&expenses, &categories))
    }

    pub async fn monthly_summary(&self, cycle_id: i64, today: NaiveDate) -> Result<MonthlySummary> {
        let cycle = self.load_cycle(cycle_id).await?;
        Ok(monthly_summary(&cycle, today))
    }

    pub async fn category_breakdown(&self, cycle_id: i64) -> Result<Vec<CategoryTotal>> {
        let cycle = self.load_cycle(cycle_id).await?;
        self.breakdown_for(&cycle).await
    }

    pub async fn compare(&self, previous_id: i64, current_id: i64) -> Result<CycleComparison> {
        let (previous, current) =
            try_join!(self.load_cycle(previous_id), self.load_cycle(current_id))?;
        let (previous_breakdown, current_breakdown) =
            try_join!(self.breakdown_for(&previous), self.breakdown_for(&current))?;

        Ok(compare_cycles(
            &previous,
            &current,
            &previous_breakdown,
            &current_breakdown,
        ))
    }

    /// Compares a cycle with the same user's cycle for the preceding calendar
    /// month. `None` when there is no such cycle.
    pub async fn compare_with_previous(&self, cycle_id: i64) -> Result<Option<CycleComparison>> {
        let current = self.load_cycle(cycle_id).await?;
        let (year, month) = previous_month(current.year, current.month);

        let previous = self
            .store
            .find_cycles(
                Query::new()
                    .eq("user_id", current.user_id.as_str())
                    .eq("year", year)
                    .eq("month", month)
                    .limit(1),
            )
            .await?
            .into_iter()
            .next();

        let Some(previous) = previous else {
            debug!("No cycle before {}-{:02} for comparison", current.year, current.month);
            return Ok(None);
        };

        let (previous_breakdown, current_breakdown) =
            try_join!(self.breakdown_for(&previous), self.breakdown_for(&current))?;
        Ok(Some(compare_cycles(
            &previous,
            &current,
            &previous_breakdown,
            &current_breakdown,
        )))
    }

    /// Last `window` cycles of the user, oldest first.
    pub async fn evolution(&self, user_id: &str, window: usize) -> Result<Vec<EvolutionPoint>> {
        let cycles = self
            .store
            .find_cycles(
                Query::new()
                    .eq("user_id", user_id)
                    .order_by_desc("year")
                    .order_by_desc("month")
                    .limit(window),
            )
            .await?;
        Ok(evolution_series(cycles, window))
    }

    /// `None` when the user has no active cycle.
    pub async fn dashboard(&self, user_id: &str, today: NaiveDate) -> Result<Option<Dashboard>> {
        let active = self
            .store
            .find_cycles(
                Query::new()
                    .eq("user_id", user_id)
                    .eq("status", CycleStatus::Active)
                    .limit(1),
            )
            .await?
            .into_iter()
            .next();
        let Some(cycle) = active else {
            return Ok(None);
        };

        let (active_charges, recent_expenses, breakdown) = try_join!(
            self.store.find_fixed_charges(
                Query::new()
                    .eq("user_id", user_id)
                    .eq("active", true)
                    .order_by("debit_day")
            ),
            self.store.find_expenses(
                Query::new()
                    .eq("cycle_id", cycle.id)
                    .order_by_desc("date")
                    .order_by_desc("id")
                    .limit(RECENT_EXPENSES)
            ),
            self.breakdown_for(&cycle)
        )?;

        Ok(Some(Dashboard {
            summary: monthly_summary(&cycle, today),
            active_charges_total: active_charges.iter().map(|c| c.amount).sum(),
            active_charges,
            recent_expenses,
            breakdown,
            cycle,
        }))
    }
}

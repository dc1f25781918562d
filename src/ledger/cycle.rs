use super::{compute_reste, CycleLedger, TotalsRefresh};
use crate::database::models::{Currency, Cycle, CyclePatch, CycleStatus, NewCycle};
use crate::database::query::Query;
use crate::database::store::RecordStore;
use crate::error::{BudgetError, Result};
use crate::retry::retry_with_backoff;
use crate::utils::{month_bounds, next_month, Formatter, Logger, Validator};

impl<S: RecordStore> CycleLedger<S> {
    /// Opens an active cycle for (year, month). Expenses start at zero.
    pub async fn create_cycle(
        &self,
        user_id: &str,
        income: f64,
        year: i32,
        month: u32,
        initial_charges_total: f64,
        currency: Currency,
    ) -> Result<Cycle> {
        let period = Formatter::format_period(year, month);
        Logger::log_operation_start("create cycle", &format!("{user_id} {period}"));

        if !Validator::is_valid_name(user_id) {
            return Err(BudgetError::validation("user id is required"));
        }
        Validator::ensure_period(year, month)?;
        Validator::ensure_amount(income, "income")?;
        Validator::ensure_amount(initial_charges_total, "initial charges total")?;

        let existing = self
            .store
            .find_cycles(
                Query::new()
                    .eq("user_id", user_id)
                    .eq("year", year)
                    .eq("month", month)
                    .limit(1),
            )
            .await?;
        if !existing.is_empty() {
            return Err(BudgetError::DuplicateCycle { year, month });
        }

        if self.active_cycle(user_id).await?.is_some() {
            return Err(BudgetError::ActiveCycleExists {
                user_id: user_id.to_string(),
            });
        }

        let (period_start, period_end) = month_bounds(year, month)?;
        let cycle = self
            .store
            .insert_cycle(NewCycle {
                user_id: user_id.to_string(),
                year,
                month,
                income,
                total_charges: initial_charges_total,
                total_depenses: 0.0,
                reste: compute_reste(income, initial_charges_total, 0.0),
                status: CycleStatus::Active,
                currency,
                period_start,
                period_end,
            })
            .await
            .map_err(|e| {
                Logger::log_operation_failure("create cycle", &e.to_string());
                e
            })?;

        Logger::log_operation_success(
            "create cycle",
            &format!(
                "cycle {} for {} with reste {}",
                cycle.id,
                period,
                Formatter::format_amount(cycle.reste, cycle.currency)
            ),
        );
        Ok(cycle)
    }

    pub async fn get_cycle(&self, cycle_id: i64) -> Result<Cycle> {
        self.load_cycle(cycle_id).await
    }

    pub async fn active_cycle(&self, user_id: &str) -> Result<Option<Cycle>> {
        let cycles = self
            .store
            .find_cycles(
                Query::new()
                    .eq("user_id", user_id)
                    .eq("status", CycleStatus::Active)
                    .limit(1),
            )
            .await?;
        Ok(cycles.into_iter().next())
    }

    /// All cycles of a user, most recent period first.
    pub async fn list_cycles(&self, user_id: &str) -> Result<Vec<Cycle>> {
        self.store
            .find_cycles(
                Query::new()
                    .eq("user_id", user_id)
                    .order_by_desc("year")
                    .order_by_desc("month"),
            )
            .await
    }

    /// Applies `patch`. The store re-derives `reste` from the merged row, so a
    /// concurrent expense recompute is never overwritten with stale figures.
    pub async fn update_cycle(&self, cycle_id: i64, patch: CyclePatch) -> Result<Cycle> {
        let cycle = self.load_cycle(cycle_id).await?;
        self.ensure_editable(&cycle)?;

        for (value, field) in patch.amounts() {
            if let Some(amount) = value {
                Validator::ensure_amount(amount, field)?;
            }
        }

        let updated = self
            .store
            .update_cycle(cycle_id, patch, self.write_scope())
            .await?;
        Logger::log_cycle_totals(&updated, "update");
        Ok(updated)
    }

    /// Closes the cycle, snapshotting the live sum of active fixed charges.
    ///
    /// If the charges cannot be read the cycle is left untouched. The store
    /// only closes a cycle that is still active when the write lands.
    pub async fn close_cycle(&self, cycle_id: i64) -> Result<Cycle> {
        Logger::log_operation_start("close cycle", &cycle_id.to_string());

        let cycle = self.load_active_cycle(cycle_id).await?;
        let live_charges = self.active_charges_total(&cycle.user_id).await.map_err(|e| {
            Logger::log_operation_failure("close cycle", &e.to_string());
            e
        })?;

        let closed = self
            .store
            .close_cycle(cycle_id, live_charges)
            .await
            .map_err(|e| {
                Logger::log_operation_failure("close cycle", &e.to_string());
                e
            })?;

        Logger::log_cycle_closed(&closed, cycle.total_charges);
        Ok(closed)
    }

    /// Closes the cycle and opens the following month in the same currency,
    /// seeded with the charges total captured at closure. `next_income`
    /// defaults to the closed cycle's income.
    ///
    /// Both writes commit together: if the next month cannot be opened the
    /// cycle stays active.
    pub async fn close_and_roll_over(
        &self,
        cycle_id: i64,
        next_income: Option<f64>,
    ) -> Result<(Cycle, Cycle)> {
        let cycle = self.load_active_cycle(cycle_id).await?;
        let (year, month) = next_month(cycle.year, cycle.month);
        Validator::ensure_period(year, month)?;
        let income = next_income.unwrap_or(cycle.income);
        Validator::ensure_amount(income, "income")?;

        let live_charges = self.active_charges_total(&cycle.user_id).await?;
        let (period_start, period_end) = month_bounds(year, month)?;
        let next = NewCycle {
            user_id: cycle.user_id.clone(),
            year,
            month,
            income,
            total_charges: live_charges,
            total_depenses: 0.0,
            reste: compute_reste(income, live_charges, 0.0),
            status: CycleStatus::Active,
            currency: cycle.currency,
            period_start,
            period_end,
        };

        let (closed, opened) = self
            .store
            .roll_over_cycle(cycle_id, live_charges, next)
            .await
            .map_err(|e| {
                Logger::log_operation_failure("roll over cycle", &e.to_string());
                e
            })?;

        Logger::log_cycle_closed(&closed, cycle.total_charges);
        Logger::log_operation_success(
            "roll over cycle",
            &format!(
                "cycle {} opened for {}",
                opened.id,
                Formatter::format_period(opened.year, opened.month)
            ),
        );
        Ok((closed, opened))
    }

    /// Rebuilds `total_depenses` and `reste` from the cycle's expense rows,
    /// retrying transient store failures.
    pub async fn recompute_expense_aggregate(&self, cycle_id: i64) -> Result<Cycle> {
        let cycle = retry_with_backoff(
            || self.store.recompute_expense_totals(cycle_id),
            &self.options.retry,
            "recompute expense aggregate",
        )
        .await?;
        Logger::log_cycle_totals(&cycle, "expense recompute");
        Ok(cycle)
    }

    /// Best-effort variant used after a successful expense write.
    pub(crate) async fn refresh_expense_totals(&self, cycle_id: i64) -> TotalsRefresh {
        match self.recompute_expense_aggregate(cycle_id).await {
            Ok(cycle) => TotalsRefresh::Updated(cycle),
            Err(e) => TotalsRefresh::stale(Some(cycle_id), &e),
        }
    }

    async fn load_active_cycle(&self, cycle_id: i64) -> Result<Cycle> {
        let cycle = self.load_cycle(cycle_id).await?;
        if !cycle.is_active() {
            return Err(BudgetError::CycleClosed { cycle_id });
        }
        Ok(cycle)
    }
}

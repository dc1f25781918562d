use super::{ChargeChange, CycleLedger, TotalsRefresh};
use crate::database::models::{
    Cycle, CyclePatch, CycleScope, FixedCharge, FixedChargePatch, NewFixedCharge,
};
use crate::database::query::Query;
use crate::database::store::RecordStore;
use crate::error::{BudgetError, Result};
use crate::utils::{Formatter, Logger, Validator};
use log::debug;
use serde::{Deserialize, Serialize};

/// Input for a new recurring monthly charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeDraft {
    pub name: String,
    pub amount: f64,
    pub category_id: Option<i64>,
    pub debit_day: u32,
    pub active: bool,
}

impl ChargeDraft {
    pub fn new(name: impl Into<String>, amount: f64, debit_day: u32) -> Self {
        Self {
            name: name.into(),
            amount,
            category_id: None,
            debit_day,
            active: true,
        }
    }
}

fn validate_charge_fields(
    name: Option<&str>,
    amount: Option<f64>,
    debit_day: Option<u32>,
) -> Result<()> {
    if let Some(name) = name {
        if !Validator::is_valid_name(name) {
            return Err(BudgetError::validation(format!("invalid charge name: '{name}'")));
        }
    }
    if let Some(amount) = amount {
        Validator::ensure_positive_amount(amount, "charge amount")?;
    }
    if let Some(day) = debit_day {
        if !Validator::is_valid_debit_day(day) {
            return Err(BudgetError::validation(format!("invalid debit day: {day}")));
        }
    }
    Ok(())
}

impl<S: RecordStore> CycleLedger<S> {
    pub async fn add_fixed_charge(&self, user_id: &str, draft: ChargeDraft) -> Result<ChargeChange> {
        validate_charge_fields(Some(&draft.name), Some(draft.amount), Some(draft.debit_day))?;

        let charge = self
            .store
            .insert_fixed_charge(NewFixedCharge {
                user_id: user_id.to_string(),
                name: draft.name.trim().to_string(),
                amount: draft.amount,
                category_id: draft.category_id,
                debit_day: draft.debit_day,
                active: draft.active,
            })
            .await?;
        Logger::log_operation_success(
            "add fixed charge",
            &format!("{} ({}) on day {}", charge.name, charge.amount, charge.debit_day),
        );

        let totals = self.resync_after_charge_change(user_id).await;
        Ok(ChargeChange { charge, totals })
    }

    pub async fn update_fixed_charge(
        &self,
        user_id: &str,
        charge_id: i64,
        patch: FixedChargePatch,
    ) -> Result<ChargeChange> {
        validate_charge_fields(patch.name.as_deref(), patch.amount, patch.debit_day)?;
        self.load_owned_charge(charge_id, user_id).await?;

        let patch = FixedChargePatch {
            name: patch.name.map(|n| n.trim().to_string()),
            ..patch
        };
        let charge = self.store.update_fixed_charge(charge_id, patch).await?;

        let totals = self.resync_after_charge_change(user_id).await;
        Ok(ChargeChange { charge, totals })
    }

    /// Flips the charge between active and inactive.
    pub async fn toggle_fixed_charge(&self, user_id: &str, charge_id: i64) -> Result<ChargeChange> {
        let current = self.load_owned_charge(charge_id, user_id).await?;
        let charge = self
            .store
            .update_fixed_charge(
                charge_id,
                FixedChargePatch {
                    active: Some(!current.active),
                    ..FixedChargePatch::default()
                },
            )
            .await?;
        debug!("Fixed charge {} is now active={}", charge.id, charge.active);

        let totals = self.resync_after_charge_change(user_id).await;
        Ok(ChargeChange { charge, totals })
    }

    pub async fn delete_fixed_charge(&self, user_id: &str, charge_id: i64) -> Result<ChargeChange> {
        self.load_owned_charge(charge_id, user_id).await?;
        let charge = self.store.delete_fixed_charge(charge_id).await?;

        let totals = self.resync_after_charge_change(user_id).await;
        Ok(ChargeChange { charge, totals })
    }

    /// Charges of a user, ordered by debit day then name.
    pub async fn list_fixed_charges(&self, user_id: &str, active_only: bool) -> Result<Vec<FixedCharge>> {
        let mut query = Query::new().eq("user_id", user_id);
        if active_only {
            query = query.eq("active", true);
        }
        self.store
            .find_fixed_charges(query.order_by("debit_day").order_by("name"))
            .await
    }

    /// Live sum of the user's active fixed charges.
    pub async fn active_charges_total(&self, user_id: &str) -> Result<f64> {
        let charges = self
            .store
            .find_fixed_charges(Query::new().eq("user_id", user_id).eq("active", true))
            .await?;
        Ok(charges.iter().map(|c| c.amount).sum())
    }

    /// Aligns the active cycle's `total_charges` (and `reste`) with the live
    /// sum of active charges. Closed cycles keep their snapshot.
    pub async fn sync_active_cycle_charges(&self, user_id: &str) -> Result<Option<Cycle>> {
        match self.active_cycle(user_id).await? {
            Some(cycle) => self.sync_cycle_charges(cycle).await.map(Some),
            None => Ok(None),
        }
    }

    async fn sync_cycle_charges(&self, cycle: Cycle) -> Result<Cycle> {
        let live = self.active_charges_total(&cycle.user_id).await?;
        if (live - cycle.total_charges).abs() < f64::EPSILON {
            return Ok(cycle);
        }

        debug!(
            "Syncing cycle {} charges {} -> {}",
            cycle.id,
            Formatter::format_amount(cycle.total_charges, cycle.currency),
            Formatter::format_amount(live, cycle.currency)
        );
        // A cycle closed since it was read keeps its snapshot.
        self.store
            .update_cycle(
                cycle.id,
                CyclePatch {
                    total_charges: Some(live),
                    ..CyclePatch::default()
                },
                CycleScope::ActiveOnly,
            )
            .await
    }

    async fn resync_after_charge_change(&self, user_id: &str) -> TotalsRefresh {
        let cycle = match self.active_cycle(user_id).await {
            Ok(Some(cycle)) => cycle,
            Ok(None) => return TotalsRefresh::Skipped,
            Err(e) => return TotalsRefresh::stale(None, &e),
        };
        let cycle_id = cycle.id;
        match self.sync_cycle_charges(cycle).await {
            Ok(updated) => TotalsRefresh::Updated(updated),
            Err(BudgetError::CycleClosed { .. }) => TotalsRefresh::Skipped,
            Err(e) => TotalsRefresh::stale(Some(cycle_id), &e),
        }
    }

    async fn load_owned_charge(&self, charge_id: i64, user_id: &str) -> Result<FixedCharge> {
        match self.store.get_fixed_charge(charge_id).await? {
            Some(charge) if charge.user_id == user_id => Ok(charge),
            _ => Err(BudgetError::fixed_charge_not_found(charge_id)),
        }
    }
}

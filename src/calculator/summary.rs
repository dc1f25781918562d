use crate::database::models::{Currency, Cycle};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Figures shown for one cycle on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub cycle_id: i64,
    pub currency: Currency,
    pub income: f64,
    pub total_charges: f64,
    pub total_depenses: f64,
    pub reste: f64,
    /// Share of income consumed by charges and expenses, in percent.
    pub pourcentage_utilise: f64,
    /// `reste` as a share of income, in percent.
    pub taux_epargne: f64,
    pub jours_ecoules: i64,
    pub jours_restants: i64,
    pub depense_moyenne_jour: f64,
    pub budget_jour_restant: f64,
}

fn ratio_percent(value: f64, base: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        value / base * 100.0
    }
}

/// Elapsed and remaining days of the cycle on `today`, both clamped to
/// `[0, length of the period]`.
pub fn elapsed_and_remaining_days(cycle: &Cycle, today: NaiveDate) -> (i64, i64) {
    let period_days = (cycle.period_end - cycle.period_start).num_days() + 1;
    let elapsed = (today - cycle.period_start).num_days().clamp(0, period_days);
    let remaining = (cycle.period_end - today).num_days().clamp(0, period_days);
    (elapsed, remaining)
}

pub fn monthly_summary(cycle: &Cycle, today: NaiveDate) -> MonthlySummary {
    let (jours_ecoules, jours_restants) = elapsed_and_remaining_days(cycle, today);

    let depense_moyenne_jour = if jours_ecoules == 0 {
        0.0
    } else {
        cycle.total_depenses / jours_ecoules as f64
    };
    let budget_jour_restant = if jours_restants == 0 {
        cycle.reste
    } else {
        cycle.reste / jours_restants as f64
    };

    MonthlySummary {
        cycle_id: cycle.id,
        currency: cycle.currency,
        income: cycle.income,
        total_charges: cycle.total_charges,
        total_depenses: cycle.total_depenses,
        reste: cycle.reste,
        pourcentage_utilise: ratio_percent(cycle.total_charges + cycle.total_depenses, cycle.income),
        taux_epargne: ratio_percent(cycle.reste, cycle.income),
        jours_ecoules,
        jours_restants,
        depense_moyenne_jour,
        budget_jour_restant,
    }
}

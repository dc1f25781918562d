//! Derived statistics. The free functions are pure; `StatisticsService`
//! loads the snapshots they need from a [`RecordStore`](crate::database::RecordStore).

pub mod breakdown;
pub mod comparison;
pub mod evolution;
pub mod service;
pub mod summary;

pub use breakdown::{category_breakdown, CategoryTotal};
pub use comparison::{compare_cycles, variation, CategoryVariation, CycleComparison};
pub use evolution::{evolution_series, EvolutionPoint};
pub use service::{Dashboard, StatisticsService};
pub use summary::{monthly_summary, MonthlySummary};

#[cfg(test)]
pub(crate) fn test_cycle(
    id: i64,
    year: i32,
    month: u32,
    income: f64,
    total_charges: f64,
    total_depenses: f64,
) -> crate::database::models::Cycle {
    use crate::database::models::{Currency, CycleStatus};
    use crate::utils::month_bounds;
    use chrono::Utc;

    let (period_start, period_end) = month_bounds(year, month).unwrap();
    crate::database::models::Cycle {
        id,
        user_id: "alice".to_string(),
        year,
        month,
        income,
        total_charges,
        total_depenses,
        reste: income - total_charges - total_depenses,
        status: CycleStatus::Active,
        currency: Currency::Eur,
        period_start,
        period_end,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
pub(crate) fn test_expense(id: i64, category_id: i64, amount: f64) -> crate::database::models::Expense {
    use chrono::{NaiveDate, Utc};

    crate::database::models::Expense {
        id,
        user_id: "alice".to_string(),
        cycle_id: 1,
        amount,
        category_id,
        date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        description: None,
        tags: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
pub(crate) fn test_category(
    id: i64,
    name: &str,
    max_budget: Option<f64>,
) -> crate::database::models::Category {
    use crate::database::models::CategoryKind;

    crate::database::models::Category {
        id,
        user_id: None,
        name: name.to_string(),
        icon: "tag".to_string(),
        color: "#64748b".to_string(),
        max_budget,
        kind: CategoryKind::Expense,
    }
}

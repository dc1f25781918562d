use super::breakdown::CategoryTotal;
use crate::database::models::Cycle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category moves within this many percent are not reported.
pub const VARIATION_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVariation {
    pub category_id: i64,
    pub name: Option<String>,
    pub previous: f64,
    pub current: f64,
    /// Magnitude of the change in percent; the list it sits in gives the sign.
    pub variation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleComparison {
    pub previous_cycle_id: i64,
    pub current_cycle_id: i64,
    pub variation_depenses: f64,
    pub variation_reste: f64,
    pub hausses: Vec<CategoryVariation>,
    pub baisses: Vec<CategoryVariation>,
}

/// Percentage change from `previous` to `current`; 0 when `previous` is 0.
pub fn variation(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous.abs() * 100.0
    }
}

pub fn compare_cycles(
    previous: &Cycle,
    current: &Cycle,
    previous_breakdown: &[CategoryTotal],
    current_breakdown: &[CategoryTotal],
) -> CycleComparison {
    let mut per_category: BTreeMap<i64, (Option<String>, f64, f64)> = BTreeMap::new();
    for group in previous_breakdown {
        let entry = per_category
            .entry(group.category_id)
            .or_insert((group.name.clone(), 0.0, 0.0));
        entry.1 += group.total;
    }
    for group in current_breakdown {
        let entry = per_category
            .entry(group.category_id)
            .or_insert((None, 0.0, 0.0));
        if group.name.is_some() {
            entry.0 = group.name.clone();
        }
        entry.2 += group.total;
    }

    let mut hausses = Vec::new();
    let mut baisses = Vec::new();
    for (category_id, (name, before, after)) in per_category {
        let change = variation(before, after);
        let item = CategoryVariation {
            category_id,
            name,
            previous: before,
            current: after,
            variation: change.abs(),
        };
        if change > VARIATION_THRESHOLD {
            hausses.push(item);
        } else if change < -VARIATION_THRESHOLD {
            baisses.push(item);
        }
    }
    hausses.sort_by(|a, b| b.variation.total_cmp(&a.variation));
    baisses.sort_by(|a, b| b.variation.total_cmp(&a.variation));

    CycleComparison {
        previous_cycle_id: previous.id,
        current_cycle_id: current.id,
        variation_depenses: variation(previous.total_depenses, current.total_depenses),
        variation_reste: variation(previous.reste, current.reste),
        hausses,
        baisses,
    }
}

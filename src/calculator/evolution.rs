use crate::database::models::Cycle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionPoint {
    pub cycle_id: i64,
    pub year: i32,
    pub month: u32,
    pub total_charges: f64,
    pub total_depenses: f64,
    pub reste: f64,
}

impl From<&Cycle> for EvolutionPoint {
    fn from(cycle: &Cycle) -> Self {
        Self {
            cycle_id: cycle.id,
            year: cycle.year,
            month: cycle.month,
            total_charges: cycle.total_charges,
            total_depenses: cycle.total_depenses,
            reste: cycle.reste,
        }
    }
}

/// The `window` most recent cycles, oldest first, whatever order they come in.
pub fn evolution_series(mut cycles: Vec<Cycle>, window: usize) -> Vec<EvolutionPoint> {
    cycles.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
    cycles.truncate(window);
    cycles.iter().rev().map(EvolutionPoint::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::test_cycle;

    #[test]
    fn test_series_is_chronological() {
        let cycles = vec![
            test_cycle(2, 2024, 1, 2000.0, 500.0, 300.0),
            test_cycle(4, 2024, 3, 2000.0, 500.0, 500.0),
            test_cycle(1, 2023, 12, 2000.0, 500.0, 200.0),
            test_cycle(3, 2024, 2, 2000.0, 500.0, 400.0),
        ];

        let series = evolution_series(cycles, 3);
        let ids: Vec<i64> = series.iter().map(|p| p.cycle_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(series[0].reste, 1200.0);
    }

    #[test]
    fn test_window_larger_than_history() {
        let series = evolution_series(vec![test_cycle(1, 2024, 5, 100.0, 0.0, 0.0)], 6);
        assert_eq!(series.len(), 1);
        assert!(evolution_series(vec![], 3).is_empty());
    }
}

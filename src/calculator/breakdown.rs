use crate::database::models::{Category, Expense};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Expenses of one category within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category_id: i64,
    /// `None` when the category is not visible to the user any more.
    pub name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub total: f64,
    pub nombre: usize,
    pub pourcentage: f64,
    pub max_budget: Option<f64>,
    pub exceeded: bool,
}

/// Groups expenses by category, largest total first. Categories without
/// expenses do not appear.
pub fn category_breakdown(expenses: &[Expense], categories: &[Category]) -> Vec<CategoryTotal> {
    let cycle_total: f64 = expenses.iter().map(|e| e.amount).sum();

    let mut groups: HashMap<i64, (f64, usize)> = HashMap::new();
    for expense in expenses {
        let group = groups.entry(expense.category_id).or_insert((0.0, 0));
        group.0 += expense.amount;
        group.1 += 1;
    }

    let by_id: HashMap<i64, &Category> = categories.iter().map(|c| (c.id, c)).collect();

    let mut totals: Vec<CategoryTotal> = groups
        .into_iter()
        .map(|(category_id, (total, nombre))| {
            let category = by_id.get(&category_id);
            let max_budget = category.and_then(|c| c.max_budget);
            CategoryTotal {
                category_id,
                name: category.map(|c| c.name.clone()),
                icon: category.map(|c| c.icon.clone()),
                color: category.map(|c| c.color.clone()),
                total,
                nombre,
                pourcentage: if cycle_total == 0.0 {
                    0.0
                } else {
                    total / cycle_total * 100.0
                },
                max_budget,
                exceeded: max_budget.is_some_and(|limit| total > limit),
            }
        })
        .collect();

    totals.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.category_id.cmp(&b.category_id))
    });
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{test_category, test_expense};

    #[test]
    fn test_groups_sum_count_and_share() {
        let expenses = vec![
            test_expense(1, 1, 30.0),
            test_expense(2, 1, 20.0),
            test_expense(3, 2, 50.0),
        ];
        let categories = vec![test_category(1, "A", None), test_category(2, "B", None)];

        let breakdown = category_breakdown(&expenses, &categories);
        assert_eq!(breakdown.len(), 2);

        let a = breakdown.iter().find(|g| g.category_id == 1).unwrap();
        assert_eq!(a.total, 50.0);
        assert_eq!(a.pourcentage, 50.0);
        assert_eq!(a.nombre, 2);
        assert_eq!(a.name.as_deref(), Some("A"));

        let b = breakdown.iter().find(|g| g.category_id == 2).unwrap();
        assert_eq!(b.total, 50.0);
        assert_eq!(b.pourcentage, 50.0);
        assert_eq!(b.nombre, 1);
    }

    #[test]
    fn test_sorted_descending_and_flags_exceeded() {
        let expenses = vec![
            test_expense(1, 1, 10.0),
            test_expense(2, 2, 90.0),
            test_expense(3, 3, 40.0),
        ];
        let categories = vec![
            test_category(1, "Loisirs", Some(50.0)),
            test_category(2, "Alimentation", Some(80.0)),
            test_category(3, "Transport", None),
            test_category(4, "Santé", Some(10.0)),
        ];

        let breakdown = category_breakdown(&expenses, &categories);
        let order: Vec<i64> = breakdown.iter().map(|g| g.category_id).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert!(breakdown[0].exceeded);
        assert!(!breakdown[1].exceeded);
        assert!(!breakdown[2].exceeded);
    }

    #[test]
    fn test_empty_cycle_has_no_groups() {
        assert!(category_breakdown(&[], &[test_category(1, "A", None)]).is_empty());
    }

    #[test]
    fn test_unknown_category_is_kept_without_metadata() {
        let breakdown = category_breakdown(&[test_expense(1, 42, 12.5)], &[]);
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].name, None);
        assert_eq!(breakdown[0].pourcentage, 100.0);
    }
}

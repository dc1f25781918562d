use super::{CycleLedger, ExpenseChange};
use crate::database::models::{Expense, ExpensePatch, NewExpense};
use crate::database::query::{Filter, Query};
use crate::database::store::RecordStore;
use crate::error::{BudgetError, Result};
use crate::utils::{Formatter, Logger, Validator};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Input for a new expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub amount: f64,
    pub category_id: i64,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl ExpenseDraft {
    pub fn new(amount: f64, category_id: i64, date: NaiveDate) -> Self {
        Self {
            amount,
            category_id,
            date,
            description: None,
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Trimmed, lowercased, deduplicated, in first-seen order.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

impl<S: RecordStore> CycleLedger<S> {
    /// Records an expense against a cycle, then refreshes the cycle's totals.
    ///
    /// The insert is the primary effect: a failed refresh is reported through
    /// `ExpenseChange::totals` rather than as an error.
    pub async fn add_expense(
        &self,
        user_id: &str,
        cycle_id: i64,
        draft: ExpenseDraft,
    ) -> Result<ExpenseChange> {
        Validator::ensure_positive_amount(draft.amount, "expense amount")?;

        let cycle = self.load_owned_cycle(cycle_id, user_id).await?;
        self.ensure_editable(&cycle)?;
        self.ensure_category_visible(user_id, draft.category_id).await?;

        let expense = self
            .store
            .insert_expense(
                NewExpense {
                    user_id: user_id.to_string(),
                    cycle_id,
                    amount: draft.amount,
                    category_id: draft.category_id,
                    date: draft.date,
                    description: normalize_description(draft.description),
                    tags: normalize_tags(draft.tags),
                },
                self.write_scope(),
            )
            .await?;

        Logger::log_operation_success(
            "add expense",
            &format!(
                "expense {} of {} in cycle {}",
                expense.id,
                Formatter::format_amount(expense.amount, cycle.currency),
                cycle_id
            ),
        );

        let totals = self.refresh_expense_totals(cycle_id).await;
        Ok(ExpenseChange { expense, totals })
    }

    pub async fn update_expense(
        &self,
        user_id: &str,
        expense_id: i64,
        patch: ExpensePatch,
    ) -> Result<ExpenseChange> {
        if patch.is_empty() {
            return Err(BudgetError::validation("expense update has no fields"));
        }
        let existing = self.load_owned_expense(expense_id, user_id).await?;

        if let Some(amount) = patch.amount {
            Validator::ensure_positive_amount(amount, "expense amount")?;
        }

        let cycle = self.load_cycle(existing.cycle_id).await?;
        self.ensure_editable(&cycle)?;

        if let Some(category_id) = patch.category_id {
            self.ensure_category_visible(user_id, category_id).await?;
        }

        let patch = ExpensePatch {
            description: patch.description.map(normalize_description),
            tags: patch.tags.map(normalize_tags),
            ..patch
        };

        let expense = self
            .store
            .update_expense(expense_id, patch, self.write_scope())
            .await?;
        let totals = self.refresh_expense_totals(expense.cycle_id).await;
        Ok(ExpenseChange { expense, totals })
    }

    pub async fn delete_expense(&self, user_id: &str, expense_id: i64) -> Result<ExpenseChange> {
        let existing = self.load_owned_expense(expense_id, user_id).await?;

        let cycle = self.load_cycle(existing.cycle_id).await?;
        self.ensure_editable(&cycle)?;

        let expense = self
            .store
            .delete_expense(expense_id, self.write_scope())
            .await?;
        Logger::log_operation_success(
            "delete expense",
            &format!("expense {} from cycle {}", expense.id, expense.cycle_id),
        );

        let totals = self.refresh_expense_totals(expense.cycle_id).await;
        Ok(ExpenseChange { expense, totals })
    }

    /// Expenses of a cycle, newest first.
    pub async fn list_expenses(&self, cycle_id: i64) -> Result<Vec<Expense>> {
        self.store
            .find_expenses(
                Query::new()
                    .eq("cycle_id", cycle_id)
                    .order_by_desc("date")
                    .order_by_desc("id"),
            )
            .await
    }

    async fn load_owned_expense(&self, expense_id: i64, user_id: &str) -> Result<Expense> {
        match self.store.get_expense(expense_id).await? {
            Some(expense) if expense.user_id == user_id => Ok(expense),
            _ => Err(BudgetError::expense_not_found(expense_id)),
        }
    }

    /// A category is usable when it is a default one or belongs to the user.
    async fn ensure_category_visible(&self, user_id: &str, category_id: i64) -> Result<()> {
        let found = self
            .store
            .find_categories(
                Query::new()
                    .eq("id", category_id)
                    .or(vec![
                        Filter::IsNull("user_id"),
                        Filter::Eq("user_id", user_id.into()),
                    ])
                    .limit(1),
            )
            .await?;
        if found.is_empty() {
            return Err(BudgetError::validation(format!(
                "unknown category: {category_id}"
            )));
        }
        Ok(())
    }
}

use crate::error::BudgetError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency is a label only; amounts are never converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "MAD")]
    Mad,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Eur, Currency::Usd, Currency::Mad];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Mad => "MAD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = BudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        Currency::ALL
            .into_iter()
            .find(|currency| currency.code() == code)
            .ok_or_else(|| {
                let known: Vec<&str> = Currency::ALL.iter().map(Currency::code).collect();
                BudgetError::validation(format!(
                    "unsupported currency '{code}', expected one of {}",
                    known.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Active,
    Closed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Active => "active",
            CycleStatus::Closed => "closed",
        }
    }
}

impl FromStr for CycleStatus {
    type Err = BudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CycleStatus::Active),
            "closed" => Ok(CycleStatus::Closed),
            other => Err(BudgetError::validation(format!("unknown cycle status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Charge,
    Expense,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Charge => "charge",
            CategoryKind::Expense => "expense",
        }
    }
}

impl FromStr for CategoryKind {
    type Err = BudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "charge" => Ok(CategoryKind::Charge),
            "expense" => Ok(CategoryKind::Expense),
            other => Err(BudgetError::validation(format!("unknown category kind '{other}'"))),
        }
    }
}

// The three label enums travel through SQLite as TEXT.
macro_rules! text_column {
    ($ty:ty, $render:expr) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(($render)(self)))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<$ty>()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_column!(Currency, Currency::code);
text_column!(CycleStatus, CycleStatus::as_str);
text_column!(CategoryKind, CategoryKind::as_str);

/// One calendar month's budget period for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: i64,
    pub user_id: String,
    pub year: i32,
    pub month: u32,
    pub income: f64,
    pub total_charges: f64,
    pub total_depenses: f64,
    pub reste: f64,
    pub status: CycleStatus,
    pub currency: Currency,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cycle {
    pub fn is_active(&self) -> bool {
        self.status == CycleStatus::Active
    }

    pub fn is_closed(&self) -> bool {
        self.status == CycleStatus::Closed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCycle {
    pub user_id: String,
    pub year: i32,
    pub month: u32,
    pub income: f64,
    pub total_charges: f64,
    pub total_depenses: f64,
    pub reste: f64,
    pub status: CycleStatus,
    pub currency: Currency,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// Partial update of a cycle's figures. `None` leaves the stored value
/// untouched; `reste` is re-derived by the store from the merged row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CyclePatch {
    pub income: Option<f64>,
    pub total_charges: Option<f64>,
    pub total_depenses: Option<f64>,
    pub currency: Option<Currency>,
}

impl CyclePatch {
    pub fn amounts(&self) -> [(Option<f64>, &'static str); 3] {
        [
            (self.income, "income"),
            (self.total_charges, "total charges"),
            (self.total_depenses, "total depenses"),
        ]
    }
}

/// Which cycles a guarded write may land on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CycleScope {
    /// Writes against a closed cycle fail with `CycleClosed`.
    #[default]
    ActiveOnly,
    AnyStatus,
}

/// A recurring monthly obligation (rent, insurance, subscription...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedCharge {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub category_id: Option<i64>,
    pub debit_day: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFixedCharge {
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub category_id: Option<i64>,
    pub debit_day: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedChargePatch {
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub category_id: Option<Option<i64>>,
    pub debit_day: Option<u32>,
    pub active: Option<bool>,
}

/// A single variable spend event belonging to exactly one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub user_id: String,
    pub cycle_id: i64,
    pub amount: f64,
    pub category_id: i64,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub user_id: String,
    pub cycle_id: i64,
    pub amount: f64,
    pub category_id: i64,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpensePatch {
    pub amount: Option<f64>,
    pub category_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl ExpensePatch {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.category_id.is_none()
            && self.date.is_none()
            && self.description.is_none()
            && self.tags.is_none()
    }
}

/// Default categories have no owner and are shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: Option<String>,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub max_budget: Option<f64>,
    pub kind: CategoryKind,
}

impl Category {
    pub fn is_default(&self) -> bool {
        self.user_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCategory {
    pub user_id: Option<String>,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub max_budget: Option<f64>,
    pub kind: CategoryKind,
}

use crate::database::models::{CategoryKind, Currency, CycleStatus};
use crate::error::{BudgetError, Result};
use rusqlite::types::Value as SqlValue;

/// A scalar a filter can compare a column against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<CycleStatus> for Value {
    fn from(v: CycleStatus) -> Self {
        Value::Text(v.as_str().to_string())
    }
}

impl From<Currency> for Value {
    fn from(v: Currency) -> Self {
        Value::Text(v.code().to_string())
    }
}

impl From<CategoryKind> for Value {
    fn from(v: CategoryKind) -> Self {
        Value::Text(v.as_str().to_string())
    }
}

impl From<Value> for SqlValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Int(i) => SqlValue::Integer(i),
            Value::Real(r) => SqlValue::Real(r),
            Value::Text(t) => SqlValue::Text(t),
            Value::Bool(b) => SqlValue::Integer(b as i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    IsNull(&'static str),
    Or(Vec<Filter>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order {
    pub column: &'static str,
    pub descending: bool,
}

/// Conjunction of filters, plus ordering and an optional row limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column, value.into()));
        self
    }

    pub fn is_null(mut self, column: &'static str) -> Self {
        self.filters.push(Filter::IsNull(column));
        self
    }

    pub fn or(mut self, alternatives: Vec<Filter>) -> Self {
        self.filters.push(Filter::Or(alternatives));
        self
    }

    pub fn order_by(mut self, column: &'static str) -> Self {
        self.order.push(Order {
            column,
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, column: &'static str) -> Self {
        self.order.push(Order {
            column,
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Renders the WHERE / ORDER BY / LIMIT tail of a SELECT. Every column must
    /// appear in `columns`, so nothing caller-controlled reaches the SQL text.
    pub fn render(&self, columns: &[&str]) -> Result<(String, Vec<SqlValue>)> {
        let mut sql = String::new();
        let mut params = Vec::new();

        if !self.filters.is_empty() {
            let clauses = self
                .filters
                .iter()
                .map(|f| render_filter(f, columns, &mut params))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order.is_empty() {
            let terms = self
                .order
                .iter()
                .map(|o| {
                    check_column(o.column, columns)?;
                    Ok(format!(
                        "{} {}",
                        o.column,
                        if o.descending { "DESC" } else { "ASC" }
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok((sql, params))
    }
}

fn check_column(column: &str, columns: &[&str]) -> Result<()> {
    if columns.contains(&column) {
        Ok(())
    } else {
        Err(BudgetError::validation(format!("unknown column '{column}'")))
    }
}

fn render_filter(filter: &Filter, columns: &[&str], params: &mut Vec<SqlValue>) -> Result<String> {
    match filter {
        Filter::Eq(column, value) => {
            check_column(column, columns)?;
            params.push(value.clone().into());
            Ok(format!("{column} = ?"))
        }
        Filter::IsNull(column) => {
            check_column(column, columns)?;
            Ok(format!("{column} IS NULL"))
        }
        // An empty disjunction matches nothing.
        Filter::Or(alternatives) if alternatives.is_empty() => Ok("0".to_string()),
        Filter::Or(alternatives) => {
            let parts = alternatives
                .iter()
                .map(|f| render_filter(f, columns, params))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", parts.join(" OR ")))
        }
    }
}

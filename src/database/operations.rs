use crate::database::models::{
    Category, CategoryKind, Cycle, CyclePatch, CycleScope, CycleStatus, Expense, ExpensePatch,
    FixedCharge, FixedChargePatch, NewCategory, NewCycle, NewExpense, NewFixedCharge,
};
use crate::database::query::Query;
use crate::database::store::RecordStore;
use crate::error::{BudgetError, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use rusqlite::ffi;
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use tokio::sync::Mutex;

const CYCLE_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "year",
    "month",
    "income",
    "total_charges",
    "total_depenses",
    "reste",
    "status",
    "currency",
    "period_start",
    "period_end",
    "created_at",
    "updated_at",
];

const FIXED_CHARGE_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "name",
    "amount",
    "category_id",
    "debit_day",
    "active",
    "created_at",
    "updated_at",
];

const EXPENSE_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "cycle_id",
    "amount",
    "category_id",
    "date",
    "description",
    "tags",
    "created_at",
    "updated_at",
];

const CATEGORY_COLUMNS: &[&str] = &["id", "user_id", "name", "icon", "color", "max_budget", "kind"];

type Assignments = Vec<(&'static str, Box<dyn ToSql + Send>)>;

/// SQLite-backed [`RecordStore`].
#[derive(Clone, Debug)]
pub struct DatabaseOperations {
    conn: Arc<Mutex<Connection>>,
}

impl DatabaseOperations {
    pub async fn new(database_url: &str) -> Result<Self> {
        let conn = Connection::open(database_url)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema().await?;
        db.seed_default_categories().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS cycles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
                income REAL NOT NULL,
                total_charges REAL NOT NULL DEFAULT 0.0,
                total_depenses REAL NOT NULL DEFAULT 0.0,
                reste REAL NOT NULL DEFAULT 0.0,
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'closed')),
                currency TEXT NOT NULL CHECK (length(currency) = 3 AND currency IN ('EUR', 'USD', 'MAD')),
                period_start DATE NOT NULL,
                period_end DATE NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                UNIQUE(user_id, year, month)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_cycles_single_active
                ON cycles(user_id) WHERE status = 'active';

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                name TEXT NOT NULL,
                icon TEXT NOT NULL DEFAULT '',
                color TEXT NOT NULL DEFAULT '',
                max_budget REAL,
                kind TEXT NOT NULL CHECK (kind IN ('charge', 'expense'))
            );

            CREATE TABLE IF NOT EXISTS fixed_charges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                amount REAL NOT NULL CHECK (amount >= 0),
                category_id INTEGER,
                debit_day INTEGER NOT NULL CHECK (debit_day BETWEEN 1 AND 31),
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                cycle_id INTEGER NOT NULL,
                amount REAL NOT NULL CHECK (amount > 0),
                category_id INTEGER NOT NULL,
                date DATE NOT NULL,
                description TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (cycle_id) REFERENCES cycles(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_cycle ON expenses(cycle_id);
            CREATE INDEX IF NOT EXISTS idx_fixed_charges_user ON fixed_charges(user_id, active);",
        )?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    async fn seed_default_categories(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM categories WHERE user_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Ok(());
        }

        let defaults: [(&str, &str, &str, CategoryKind); 10] = [
            ("Logement", "home", "#6366f1", CategoryKind::Charge),
            ("Assurances", "shield", "#0ea5e9", CategoryKind::Charge),
            ("Abonnements", "repeat", "#8b5cf6", CategoryKind::Charge),
            ("Transport", "car", "#f59e0b", CategoryKind::Charge),
            ("Alimentation", "shopping-cart", "#22c55e", CategoryKind::Expense),
            ("Restaurants", "utensils", "#ef4444", CategoryKind::Expense),
            ("Loisirs", "gamepad", "#ec4899", CategoryKind::Expense),
            ("Santé", "heart", "#14b8a6", CategoryKind::Expense),
            ("Shopping", "bag", "#f97316", CategoryKind::Expense),
            ("Autre", "tag", "#64748b", CategoryKind::Expense),
        ];
        for (name, icon, color, kind) in defaults {
            conn.execute(
                "INSERT INTO categories (user_id, name, icon, color, max_budget, kind)
                 VALUES (NULL, ?1, ?2, ?3, NULL, ?4)",
                params![name, icon, color, kind],
            )?;
        }

        debug!("Seeded {} default categories", defaults.len());
        Ok(())
    }

    fn select<T>(
        conn: &Connection,
        table: &str,
        columns: &[&str],
        query: &Query,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let (tail, values) = query.render(columns)?;
        let sql = format!("SELECT {} FROM {}{}", columns.join(", "), table, tail);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
    }

    fn select_by_id<T>(
        conn: &Connection,
        table: &str,
        columns: &[&str],
        id: i64,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", columns.join(", "), table);
        Ok(conn.query_row(&sql, params![id], map).optional()?)
    }

    fn update_by_id<T>(
        conn: &Connection,
        table: &str,
        columns: &[&str],
        id: i64,
        mut assignments: Assignments,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
        entity: &'static str,
    ) -> Result<T> {
        assignments.push(("updated_at", Box::new(Utc::now())));

        let set_clause = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{} RETURNING {}",
            table,
            set_clause,
            assignments.len() + 1,
            columns.join(", ")
        );

        let mut values: Vec<Box<dyn ToSql + Send>> =
            assignments.into_iter().map(|(_, value)| value).collect();
        values.push(Box::new(id));

        conn.query_row(&sql, params_from_iter(values.iter()), map)
            .optional()
            .map_err(map_constraint_error)?
            .ok_or_else(|| BudgetError::not_found(entity, id))
    }

    fn delete_by_id<T>(
        conn: &Connection,
        table: &str,
        columns: &[&str],
        id: i64,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
        entity: &'static str,
    ) -> Result<T> {
        let sql = format!("DELETE FROM {} WHERE id = ?1 RETURNING {}", table, columns.join(", "));
        conn.query_row(&sql, params![id], map)
            .optional()
            .map_err(map_constraint_error)?
            .ok_or_else(|| BudgetError::not_found(entity, id))
    }

    fn ensure_cycle_writable(conn: &Connection, cycle_id: i64, scope: CycleScope) -> Result<()> {
        let status: Option<CycleStatus> = conn
            .query_row(
                "SELECT status FROM cycles WHERE id = ?1",
                params![cycle_id],
                |row| row.get(0),
            )
            .optional()?;
        match status {
            None => Err(BudgetError::cycle_not_found(cycle_id)),
            Some(CycleStatus::Closed) if scope == CycleScope::ActiveOnly => {
                Err(BudgetError::CycleClosed { cycle_id })
            }
            Some(_) => Ok(()),
        }
    }

    fn ensure_expense_writable(conn: &Connection, expense_id: i64, scope: CycleScope) -> Result<()> {
        let cycle_id: i64 = conn
            .query_row(
                "SELECT cycle_id FROM expenses WHERE id = ?1",
                params![expense_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| BudgetError::expense_not_found(expense_id))?;
        Self::ensure_cycle_writable(conn, cycle_id, scope)
    }

    /// Re-derives `reste` from the columns as they are stored now.
    fn derive_reste(conn: &Connection, id: i64) -> Result<Cycle> {
        let sql = format!(
            "UPDATE cycles SET reste = income - total_charges - total_depenses
             WHERE id = ?1
             RETURNING {}",
            CYCLE_COLUMNS.join(", ")
        );
        conn.query_row(&sql, params![id], cycle_from_row)
            .optional()?
            .ok_or_else(|| BudgetError::cycle_not_found(id))
    }

    fn close_in(conn: &Connection, id: i64, total_charges: f64) -> Result<Cycle> {
        let sql = format!(
            "UPDATE cycles
             SET total_charges = ?1, reste = income - ?1 - total_depenses, status = ?2, updated_at = ?3
             WHERE id = ?4 AND status = ?5
             RETURNING {}",
            CYCLE_COLUMNS.join(", ")
        );
        let closed = conn
            .query_row(
                &sql,
                params![total_charges, CycleStatus::Closed, Utc::now(), id, CycleStatus::Active],
                cycle_from_row,
            )
            .optional()
            .map_err(map_constraint_error)?;

        match closed {
            Some(cycle) => Ok(cycle),
            None => match Self::select_by_id(conn, "cycles", CYCLE_COLUMNS, id, cycle_from_row)? {
                Some(_) => Err(BudgetError::CycleClosed { cycle_id: id }),
                None => Err(BudgetError::cycle_not_found(id)),
            },
        }
    }

    fn insert_cycle_in(conn: &Connection, cycle: &NewCycle) -> Result<Cycle> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO cycles (user_id, year, month, income, total_charges, total_depenses, reste,
                                 status, currency, period_start, period_end, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             RETURNING {}",
            CYCLE_COLUMNS.join(", ")
        );
        let created = conn
            .query_row(
                &sql,
                params![
                    cycle.user_id,
                    cycle.year,
                    cycle.month,
                    cycle.income,
                    cycle.total_charges,
                    cycle.total_depenses,
                    cycle.reste,
                    cycle.status,
                    cycle.currency,
                    cycle.period_start,
                    cycle.period_end,
                    now,
                    now
                ],
                cycle_from_row,
            )
            .map_err(|e| map_cycle_insert_error(e, cycle))?;

        debug!(
            "Inserted cycle {} for user {} ({}-{:02})",
            created.id, created.user_id, created.year, created.month
        );
        Ok(created)
    }
}

fn cycle_from_row(row: &Row<'_>) -> rusqlite::Result<Cycle> {
    Ok(Cycle {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        year: row.get("year")?,
        month: row.get("month")?,
        income: row.get("income")?,
        total_charges: row.get("total_charges")?,
        total_depenses: row.get("total_depenses")?,
        reste: row.get("reste")?,
        status: row.get("status")?,
        currency: row.get("currency")?,
        period_start: row.get("period_start")?,
        period_end: row.get("period_end")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn fixed_charge_from_row(row: &Row<'_>) -> rusqlite::Result<FixedCharge> {
    Ok(FixedCharge {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        amount: row.get("amount")?,
        category_id: row.get("category_id")?,
        debit_day: row.get("debit_day")?,
        active: row.get("active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn expense_from_row(row: &Row<'_>) -> rusqlite::Result<Expense> {
    let raw_tags: String = row.get("tags")?;
    let tags = serde_json::from_str(&raw_tags).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            EXPENSE_COLUMNS.iter().position(|c| *c == "tags").unwrap_or_default(),
            Type::Text,
            Box::new(e),
        )
    })?;

    Ok(Expense {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        cycle_id: row.get("cycle_id")?,
        amount: row.get("amount")?,
        category_id: row.get("category_id")?,
        date: row.get("date")?,
        description: row.get("description")?,
        tags,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        icon: row.get("icon")?,
        color: row.get("color")?,
        max_budget: row.get("max_budget")?,
        kind: row.get("kind")?,
    })
}

/// CHECK and FOREIGN KEY failures are bad input, not transport failures.
fn map_constraint_error(err: rusqlite::Error) -> BudgetError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_CHECK
                || e.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY
                || e.extended_code == ffi::SQLITE_CONSTRAINT_NOTNULL =>
        {
            BudgetError::validation(
                msg.clone()
                    .unwrap_or_else(|| "constraint violation".to_string()),
            )
        }
        _ => BudgetError::Database(err),
    }
}

fn map_cycle_insert_error(err: rusqlite::Error, cycle: &NewCycle) -> BudgetError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE => {
            // The (user, year, month) key names the year column; the single-active index does not.
            if msg.as_deref().map_or(false, |m| m.contains("cycles.year")) {
                BudgetError::DuplicateCycle {
                    year: cycle.year,
                    month: cycle.month,
                }
            } else {
                BudgetError::ActiveCycleExists {
                    user_id: cycle.user_id.clone(),
                }
            }
        }
        _ => map_constraint_error(err),
    }
}

#[async_trait]
impl RecordStore for DatabaseOperations {
    async fn get_cycle(&self, id: i64) -> Result<Option<Cycle>> {
        let conn = self.conn.lock().await;
        Self::select_by_id(&conn, "cycles", CYCLE_COLUMNS, id, cycle_from_row)
    }

    async fn find_cycles(&self, query: Query) -> Result<Vec<Cycle>> {
        let conn = self.conn.lock().await;
        Self::select(&conn, "cycles", CYCLE_COLUMNS, &query, cycle_from_row)
    }

    async fn insert_cycle(&self, cycle: NewCycle) -> Result<Cycle> {
        let conn = self.conn.lock().await;
        Self::insert_cycle_in(&conn, &cycle)
    }

    async fn update_cycle(&self, id: i64, patch: CyclePatch, scope: CycleScope) -> Result<Cycle> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::ensure_cycle_writable(&tx, id, scope)?;

        let mut assignments: Assignments = Vec::new();
        if let Some(income) = patch.income {
            assignments.push(("income", Box::new(income)));
        }
        if let Some(total_charges) = patch.total_charges {
            assignments.push(("total_charges", Box::new(total_charges)));
        }
        if let Some(total_depenses) = patch.total_depenses {
            assignments.push(("total_depenses", Box::new(total_depenses)));
        }
        if let Some(currency) = patch.currency {
            assignments.push(("currency", Box::new(currency)));
        }

        Self::update_by_id(&tx, "cycles", CYCLE_COLUMNS, id, assignments, cycle_from_row, "Cycle")?;
        let cycle = Self::derive_reste(&tx, id)?;
        tx.commit()?;
        Ok(cycle)
    }

    async fn close_cycle(&self, id: i64, total_charges: f64) -> Result<Cycle> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let closed = Self::close_in(&tx, id, total_charges)?;
        tx.commit()?;
        Ok(closed)
    }

    async fn roll_over_cycle(
        &self,
        id: i64,
        total_charges: f64,
        next: NewCycle,
    ) -> Result<(Cycle, Cycle)> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let closed = Self::close_in(&tx, id, total_charges)?;
        let opened = Self::insert_cycle_in(&tx, &next)?;
        tx.commit()?;
        Ok((closed, opened))
    }

    async fn delete_cycle(&self, id: i64) -> Result<Cycle> {
        let conn = self.conn.lock().await;
        Self::delete_by_id(&conn, "cycles", CYCLE_COLUMNS, id, cycle_from_row, "Cycle")
    }

    async fn get_fixed_charge(&self, id: i64) -> Result<Option<FixedCharge>> {
        let conn = self.conn.lock().await;
        Self::select_by_id(&conn, "fixed_charges", FIXED_CHARGE_COLUMNS, id, fixed_charge_from_row)
    }

    async fn find_fixed_charges(&self, query: Query) -> Result<Vec<FixedCharge>> {
        let conn = self.conn.lock().await;
        Self::select(&conn, "fixed_charges", FIXED_CHARGE_COLUMNS, &query, fixed_charge_from_row)
    }

    async fn insert_fixed_charge(&self, charge: NewFixedCharge) -> Result<FixedCharge> {
        let conn = self.conn.lock().await;
        let now = Utc::now();

        let sql = format!(
            "INSERT INTO fixed_charges (user_id, name, amount, category_id, debit_day, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING {}",
            FIXED_CHARGE_COLUMNS.join(", ")
        );
        let created = conn
            .query_row(
                &sql,
                params![
                    charge.user_id,
                    charge.name,
                    charge.amount,
                    charge.category_id,
                    charge.debit_day,
                    charge.active,
                    now,
                    now
                ],
                fixed_charge_from_row,
            )
            .map_err(map_constraint_error)?;

        debug!("Inserted fixed charge {} ({})", created.id, created.name);
        Ok(created)
    }

    async fn update_fixed_charge(&self, id: i64, patch: FixedChargePatch) -> Result<FixedCharge> {
        let conn = self.conn.lock().await;

        let mut assignments: Assignments = Vec::new();
        if let Some(name) = patch.name {
            assignments.push(("name", Box::new(name)));
        }
        if let Some(amount) = patch.amount {
            assignments.push(("amount", Box::new(amount)));
        }
        if let Some(category_id) = patch.category_id {
            assignments.push(("category_id", Box::new(category_id)));
        }
        if let Some(debit_day) = patch.debit_day {
            assignments.push(("debit_day", Box::new(debit_day)));
        }
        if let Some(active) = patch.active {
            assignments.push(("active", Box::new(active)));
        }

        Self::update_by_id(
            &conn,
            "fixed_charges",
            FIXED_CHARGE_COLUMNS,
            id,
            assignments,
            fixed_charge_from_row,
            "Fixed charge",
        )
    }

    async fn delete_fixed_charge(&self, id: i64) -> Result<FixedCharge> {
        let conn = self.conn.lock().await;
        Self::delete_by_id(
            &conn,
            "fixed_charges",
            FIXED_CHARGE_COLUMNS,
            id,
            fixed_charge_from_row,
            "Fixed charge",
        )
    }

    async fn get_expense(&self, id: i64) -> Result<Option<Expense>> {
        let conn = self.conn.lock().await;
        Self::select_by_id(&conn, "expenses", EXPENSE_COLUMNS, id, expense_from_row)
    }

    async fn find_expenses(&self, query: Query) -> Result<Vec<Expense>> {
        let conn = self.conn.lock().await;
        Self::select(&conn, "expenses", EXPENSE_COLUMNS, &query, expense_from_row)
    }

    async fn insert_expense(&self, expense: NewExpense, scope: CycleScope) -> Result<Expense> {
        let tags = serde_json::to_string(&expense.tags)?;
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::ensure_cycle_writable(&tx, expense.cycle_id, scope)?;
        let now = Utc::now();

        let sql = format!(
            "INSERT INTO expenses (user_id, cycle_id, amount, category_id, date, description, tags, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING {}",
            EXPENSE_COLUMNS.join(", ")
        );
        let created = tx
            .query_row(
                &sql,
                params![
                    expense.user_id,
                    expense.cycle_id,
                    expense.amount,
                    expense.category_id,
                    expense.date,
                    expense.description,
                    tags,
                    now,
                    now
                ],
                expense_from_row,
            )
            .map_err(map_constraint_error)?;
        tx.commit()?;

        debug!(
            "Inserted expense {} ({:.2}) in cycle {}",
            created.id, created.amount, created.cycle_id
        );
        Ok(created)
    }

    async fn update_expense(
        &self,
        id: i64,
        patch: ExpensePatch,
        scope: CycleScope,
    ) -> Result<Expense> {
        let tags = patch.tags.as_ref().map(serde_json::to_string).transpose()?;
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::ensure_expense_writable(&tx, id, scope)?;

        let mut assignments: Assignments = Vec::new();
        if let Some(amount) = patch.amount {
            assignments.push(("amount", Box::new(amount)));
        }
        if let Some(category_id) = patch.category_id {
            assignments.push(("category_id", Box::new(category_id)));
        }
        if let Some(date) = patch.date {
            assignments.push(("date", Box::new(date)));
        }
        if let Some(description) = patch.description {
            assignments.push(("description", Box::new(description)));
        }
        if let Some(tags) = tags {
            assignments.push(("tags", Box::new(tags)));
        }

        let expense =
            Self::update_by_id(&tx, "expenses", EXPENSE_COLUMNS, id, assignments, expense_from_row, "Expense")?;
        tx.commit()?;
        Ok(expense)
    }

    async fn delete_expense(&self, id: i64, scope: CycleScope) -> Result<Expense> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::ensure_expense_writable(&tx, id, scope)?;
        let expense = Self::delete_by_id(&tx, "expenses", EXPENSE_COLUMNS, id, expense_from_row, "Expense")?;
        tx.commit()?;
        Ok(expense)
    }

    async fn find_categories(&self, query: Query) -> Result<Vec<Category>> {
        let conn = self.conn.lock().await;
        Self::select(&conn, "categories", CATEGORY_COLUMNS, &query, category_from_row)
    }

    async fn insert_category(&self, category: NewCategory) -> Result<Category> {
        let conn = self.conn.lock().await;

        let sql = format!(
            "INSERT INTO categories (user_id, name, icon, color, max_budget, kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING {}",
            CATEGORY_COLUMNS.join(", ")
        );
        conn.query_row(
            &sql,
            params![
                category.user_id,
                category.name,
                category.icon,
                category.color,
                category.max_budget,
                category.kind
            ],
            category_from_row,
        )
        .map_err(map_constraint_error)
    }

    async fn recompute_expense_totals(&self, cycle_id: i64) -> Result<Cycle> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let total_depenses: f64 = tx.query_row(
            "SELECT COALESCE(SUM(amount), 0.0) FROM expenses WHERE cycle_id = ?1",
            params![cycle_id],
            |row| row.get(0),
        )?;

        let sql = format!(
            "UPDATE cycles
             SET total_depenses = ?1, reste = income - total_charges - ?1, updated_at = ?2
             WHERE id = ?3
             RETURNING {}",
            CYCLE_COLUMNS.join(", ")
        );
        let cycle = tx
            .query_row(&sql, params![total_depenses, Utc::now(), cycle_id], cycle_from_row)
            .optional()?
            .ok_or_else(|| BudgetError::cycle_not_found(cycle_id))?;

        tx.commit()?;

        debug!(
            "Recomputed totals for cycle {}: depenses={:.2} reste={:.2}",
            cycle.id, cycle.total_depenses, cycle.reste
        );
        Ok(cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Currency, CycleStatus};
    use chrono::NaiveDate;

    fn new_cycle(user: &str, year: i32, month: u32) -> NewCycle {
        NewCycle {
            user_id: user.to_string(),
            year,
            month,
            income: 2000.0,
            total_charges: 500.0,
            total_depenses: 0.0,
            reste: 1500.0,
            status: CycleStatus::Active,
            currency: Currency::Eur,
            period_start: NaiveDate::from_ymd_opt(year, month, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(year, month, 28).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_defaults_are_seeded_once() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let defaults = db.find_categories(Query::new().is_null("user_id")).await.unwrap();
        assert_eq!(defaults.len(), 10);

        db.seed_default_categories().await.unwrap();
        let again = db.find_categories(Query::new().is_null("user_id")).await.unwrap();
        assert_eq!(again.len(), 10);
    }

    #[tokio::test]
    async fn test_unique_period_maps_to_duplicate() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let first = db.insert_cycle(new_cycle("alice", 2024, 5)).await.unwrap();
        db.close_cycle(first.id, 500.0).await.unwrap();

        let err = db.insert_cycle(new_cycle("alice", 2024, 5)).await.unwrap_err();
        assert!(matches!(err, BudgetError::DuplicateCycle { year: 2024, month: 5 }));
    }

    #[tokio::test]
    async fn test_second_active_cycle_is_rejected_by_index() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        db.insert_cycle(new_cycle("alice", 2024, 5)).await.unwrap();

        let err = db.insert_cycle(new_cycle("alice", 2024, 6)).await.unwrap_err();
        assert!(matches!(err, BudgetError::ActiveCycleExists { .. }));

        // Other users are unaffected.
        db.insert_cycle(new_cycle("bob", 2024, 6)).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_currency_rejected_at_store_boundary() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let conn = db.conn.lock().await;
        let result = conn.execute(
            "INSERT INTO cycles (user_id, year, month, income, status, currency, period_start, period_end, created_at, updated_at)
             VALUES ('alice', 2024, 1, 100.0, 'active', 'GBP', '2024-01-01', '2024-01-31', '2024-01-01', '2024-01-01')",
            [],
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_rows() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let err = db
            .update_cycle(99, CyclePatch::default(), CycleScope::AnyStatus)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = db.close_cycle(99, 0.0).await.unwrap_err();
        assert!(err.is_not_found());

        let err = db.delete_expense(99, CycleScope::AnyStatus).await.unwrap_err();
        assert!(err.is_not_found());

        assert!(db.get_fixed_charge(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recompute_expense_totals() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let cycle = db.insert_cycle(new_cycle("alice", 2024, 5)).await.unwrap();
        let category = db
            .find_categories(Query::new().eq("name", "Alimentation"))
            .await
            .unwrap()
            .remove(0);

        for amount in [30.0, 20.0, 50.0] {
            let expense = NewExpense {
                tags: vec!["courses".to_string()],
                ..expense_for(cycle.id, category.id, amount)
            };
            db.insert_expense(expense, CycleScope::ActiveOnly).await.unwrap();
        }

        let refreshed = db.recompute_expense_totals(cycle.id).await.unwrap();
        assert_eq!(refreshed.total_depenses, 100.0);
        assert_eq!(refreshed.reste, 2000.0 - 500.0 - 100.0);

        let expenses = db.find_expenses(Query::new().eq("cycle_id", cycle.id)).await.unwrap();
        assert_eq!(expenses[0].tags, vec!["courses".to_string()]);

        let err = db.recompute_expense_totals(cycle.id + 100).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_expense_with_unknown_category_is_validation_error() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let cycle = db.insert_cycle(new_cycle("alice", 2024, 5)).await.unwrap();

        let err = db
            .insert_expense(expense_for(cycle.id, 9999, 10.0), CycleScope::ActiveOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, BudgetError::Validation { .. }));
    }

    fn expense_for(cycle_id: i64, category_id: i64, amount: f64) -> NewExpense {
        NewExpense {
            user_id: "alice".to_string(),
            cycle_id,
            amount,
            category_id,
            date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            description: None,
            tags: vec![],
        }
    }

    async fn food_category(db: &DatabaseOperations) -> i64 {
        db.find_categories(Query::new().eq("name", "Alimentation"))
            .await
            .unwrap()
            .remove(0)
            .id
    }

    #[tokio::test]
    async fn test_update_cycle_derives_reste_from_stored_row() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let cycle = db.insert_cycle(new_cycle("alice", 2024, 5)).await.unwrap();

        // The stored depenses moves on without the patch knowing about it.
        {
            let conn = db.conn.lock().await;
            conn.execute(
                "UPDATE cycles SET total_depenses = 100.0 WHERE id = ?1",
                params![cycle.id],
            )
            .unwrap();
        }

        let updated = db
            .update_cycle(
                cycle.id,
                CyclePatch {
                    total_charges: Some(700.0),
                    ..Default::default()
                },
                CycleScope::ActiveOnly,
            )
            .await
            .unwrap();
        assert_eq!(updated.total_charges, 700.0);
        assert_eq!(updated.total_depenses, 100.0);
        assert_eq!(updated.reste, 2000.0 - 700.0 - 100.0);
    }

    #[tokio::test]
    async fn test_close_cycle_only_once() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let cycle = db.insert_cycle(new_cycle("alice", 2024, 5)).await.unwrap();
        let food = food_category(&db).await;
        db.insert_expense(expense_for(cycle.id, food, 40.0), CycleScope::ActiveOnly)
            .await
            .unwrap();
        db.recompute_expense_totals(cycle.id).await.unwrap();

        let closed = db.close_cycle(cycle.id, 800.0).await.unwrap();
        assert_eq!(closed.status, CycleStatus::Closed);
        assert_eq!(closed.total_charges, 800.0);
        assert_eq!(closed.reste, 2000.0 - 800.0 - 40.0);

        let err = db.close_cycle(cycle.id, 900.0).await.unwrap_err();
        assert!(matches!(err, BudgetError::CycleClosed { .. }));
        let stored = db.get_cycle(cycle.id).await.unwrap().unwrap();
        assert_eq!(stored.total_charges, 800.0);
    }

    #[tokio::test]
    async fn test_closed_cycle_rejects_scoped_writes() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let cycle = db.insert_cycle(new_cycle("alice", 2024, 5)).await.unwrap();
        let food = food_category(&db).await;
        let kept = db
            .insert_expense(expense_for(cycle.id, food, 25.0), CycleScope::ActiveOnly)
            .await
            .unwrap();
        db.close_cycle(cycle.id, 500.0).await.unwrap();

        let err = db
            .insert_expense(expense_for(cycle.id, food, 10.0), CycleScope::ActiveOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, BudgetError::CycleClosed { .. }));
        let err = db
            .update_expense(
                kept.id,
                ExpensePatch {
                    amount: Some(30.0),
                    ..Default::default()
                },
                CycleScope::ActiveOnly,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BudgetError::CycleClosed { .. }));
        let err = db.delete_expense(kept.id, CycleScope::ActiveOnly).await.unwrap_err();
        assert!(matches!(err, BudgetError::CycleClosed { .. }));
        let err = db
            .update_cycle(
                cycle.id,
                CyclePatch {
                    income: Some(1.0),
                    ..Default::default()
                },
                CycleScope::ActiveOnly,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BudgetError::CycleClosed { .. }));

        db.insert_expense(expense_for(cycle.id, food, 10.0), CycleScope::AnyStatus)
            .await
            .unwrap();
        let rows = db.find_expenses(Query::new().eq("cycle_id", cycle.id)).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_roll_over_is_all_or_nothing() {
        let db = DatabaseOperations::new(":memory:").await.unwrap();
        let june = db.insert_cycle(new_cycle("alice", 2024, 6)).await.unwrap();
        db.close_cycle(june.id, 500.0).await.unwrap();
        let may = db.insert_cycle(new_cycle("alice", 2024, 5)).await.unwrap();

        let err = db
            .roll_over_cycle(may.id, 600.0, new_cycle("alice", 2024, 6))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
        let may_after = db.get_cycle(may.id).await.unwrap().unwrap();
        assert_eq!(may_after.status, CycleStatus::Active);
        assert_eq!(may_after.total_charges, 500.0);

        db.delete_cycle(june.id).await.unwrap();
        let (closed, opened) = db
            .roll_over_cycle(may.id, 600.0, new_cycle("alice", 2024, 6))
            .await
            .unwrap();
        assert_eq!(closed.status, CycleStatus::Closed);
        assert_eq!(closed.total_charges, 600.0);
        assert_eq!(opened.status, CycleStatus::Active);
        assert_eq!((opened.year, opened.month), (2024, 6));
    }
}

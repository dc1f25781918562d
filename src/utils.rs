use crate::database::models::{Currency, Cycle};
use crate::error::{BudgetError, Result};
use chrono::NaiveDate;
use log::{error, info, warn};
use std::fs;
use std::path::Path;

/// Logging helpers
pub struct Logger;

impl Logger {
    pub fn log_operation_start(operation: &str, details: &str) {
        info!("🚀 Starting {}: {}", operation, details);
    }

    pub fn log_operation_success(operation: &str, details: &str) {
        info!("✅ {} completed successfully: {}", operation, details);
    }

    pub fn log_operation_failure(operation: &str, error: &str) {
        error!("❌ {} failed: {}", operation, error);
    }

    pub fn log_cycle_totals(cycle: &Cycle, source: &str) {
        info!(
            "🔄 Cycle {} ({}-{:02}) | charges {} | depenses {} | reste {} ({})",
            cycle.id,
            cycle.year,
            cycle.month,
            Formatter::format_amount(cycle.total_charges, cycle.currency),
            Formatter::format_amount(cycle.total_depenses, cycle.currency),
            Formatter::format_amount(cycle.reste, cycle.currency),
            source
        );
    }

    pub fn log_cycle_closed(cycle: &Cycle, snapshot_charges: f64) {
        info!(
            "🔒 Cycle {} closed | charges {} → {} | reste {}",
            cycle.id,
            Formatter::format_amount(snapshot_charges, cycle.currency),
            Formatter::format_amount(cycle.total_charges, cycle.currency),
            Formatter::format_amount(cycle.reste, cycle.currency)
        );
    }

    pub fn log_totals_stale(cycle_id: Option<i64>, reason: &str) {
        match cycle_id {
            Some(id) => warn!(
                "⚠️ Totals for cycle {} are stale until the next successful recompute: {}",
                id, reason
            ),
            None => warn!("⚠️ Active cycle totals could not be refreshed: {}", reason),
        }
    }
}

/// Display formatting
pub struct Formatter;

impl Formatter {
    pub fn format_amount(amount: f64, currency: Currency) -> String {
        format!("{:.2} {}", amount, currency)
    }

    pub fn format_percentage(value: f64) -> String {
        format!("{:.1}%", value)
    }

    /// Signed percentage, as shown for month-over-month variations.
    pub fn format_variation(variation: f64) -> String {
        if variation > 0.0 {
            format!("+{:.1}%", variation)
        } else {
            format!("{:.1}%", variation)
        }
    }

    pub fn format_period(year: i32, month: u32) -> String {
        format!("{}-{:02}", year, month)
    }
}

/// Input validation
pub struct Validator;

impl Validator {
    pub fn is_valid_name(name: &str) -> bool {
        !name.trim().is_empty() && name.len() <= 100 && !name.contains('\n')
    }

    pub fn is_valid_amount(amount: f64) -> bool {
        amount >= 0.0 && amount <= 999_999_999.99 && !amount.is_nan() && !amount.is_infinite()
    }

    pub fn is_valid_month(month: u32) -> bool {
        (1..=12).contains(&month)
    }

    /// Any year whose twelve months have calendar bounds.
    pub fn is_valid_year(year: i32) -> bool {
        NaiveDate::from_ymd_opt(year, 1, 1).is_some()
            && year
                .checked_add(1)
                .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1))
                .is_some()
    }

    pub fn is_valid_debit_day(day: u32) -> bool {
        (1..=31).contains(&day)
    }

    pub fn ensure_amount(amount: f64, field: &str) -> Result<()> {
        if Self::is_valid_amount(amount) {
            Ok(())
        } else {
            Err(BudgetError::validation(format!("invalid {field}: {amount}")))
        }
    }

    pub fn ensure_positive_amount(amount: f64, field: &str) -> Result<()> {
        Self::ensure_amount(amount, field)?;
        if amount > 0.0 {
            Ok(())
        } else {
            Err(BudgetError::validation(format!("{field} must be greater than zero")))
        }
    }

    pub fn ensure_period(year: i32, month: u32) -> Result<()> {
        if !Self::is_valid_year(year) {
            return Err(BudgetError::validation(format!("invalid year: {year}")));
        }
        if !Self::is_valid_month(month) {
            return Err(BudgetError::validation(format!("invalid month: {month}")));
        }
        Ok(())
    }
}

/// First and last calendar day of (year, month).
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| BudgetError::validation(format!("invalid period {year}-{month}")))?;
    let (next_year, next_month) = next_month(year, month);
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| BudgetError::validation(format!("invalid period {year}-{month}")))?;
    Ok((start, end))
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// Filesystem helpers
pub struct FileUtils;

impl FileUtils {
    pub fn ensure_dir_exists(path: &Path) -> Result<()> {
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path)?;
            info!("Created directory: {}", path.display());
        }
        Ok(())
    }

    /// Creates the parent directory of a SQLite file path. In-memory URLs are left alone.
    pub fn ensure_database_dir(database_url: &str) -> Result<()> {
        if database_url == ":memory:" {
            return Ok(());
        }
        match Path::new(database_url).parent() {
            Some(parent) => Self::ensure_dir_exists(parent),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(Formatter::format_amount(1000.0, Currency::Eur), "1000.00 EUR");
        assert_eq!(Formatter::format_amount(1000.5, Currency::Mad), "1000.50 MAD");
    }

    #[test]
    fn test_format_variation() {
        assert_eq!(Formatter::format_variation(12.34), "+12.3%");
        assert_eq!(Formatter::format_variation(-7.0), "-7.0%");
        assert_eq!(Formatter::format_variation(0.0), "0.0%");
        assert_eq!(Formatter::format_period(2024, 3), "2024-03");
    }

    #[test]
    fn test_validators() {
        assert!(Validator::is_valid_name("Loyer"));
        assert!(!Validator::is_valid_name("   "));
        assert!(!Validator::is_valid_name("Loyer\nappartement"));

        assert!(Validator::is_valid_amount(1000.0));
        assert!(Validator::is_valid_amount(0.0));
        assert!(!Validator::is_valid_amount(-100.0));
        assert!(!Validator::is_valid_amount(f64::NAN));
        assert!(!Validator::is_valid_amount(f64::INFINITY));

        assert!(Validator::is_valid_month(12));
        assert!(!Validator::is_valid_month(0));
        assert!(!Validator::is_valid_month(13));

        assert!(Validator::is_valid_year(2025));
        assert!(Validator::is_valid_year(1999));
        assert!(Validator::is_valid_year(2101));
        assert!(!Validator::is_valid_year(i32::MAX));
        assert!(month_bounds(2101, 12).is_ok());

        assert!(Validator::is_valid_debit_day(31));
        assert!(!Validator::is_valid_debit_day(0));

        assert!(Validator::ensure_positive_amount(0.0, "amount").is_err());
        assert!(Validator::ensure_positive_amount(0.01, "amount").is_ok());
    }

    #[test]
    fn test_month_bounds() {
        let (start, end) = month_bounds(2024, 2).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (_, end) = month_bounds(2023, 12).unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());

        assert!(month_bounds(2024, 13).is_err());
    }

    #[test]
    fn test_month_navigation() {
        assert_eq!(next_month(2024, 12), (2025, 1));
        assert_eq!(next_month(2024, 4), (2024, 5));
        assert_eq!(previous_month(2024, 1), (2023, 12));
        assert_eq!(previous_month(2024, 7), (2024, 6));
    }

    #[test]
    fn test_ensure_database_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("data").join("budget.db");
        FileUtils::ensure_database_dir(nested.to_str().unwrap()).unwrap();
        assert!(dir.path().join("data").exists());
        assert!(FileUtils::ensure_database_dir(":memory:").is_ok());
    }
}

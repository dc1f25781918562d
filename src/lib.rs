// Internal modules are public so tests/ can drive them
pub mod calculator;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod retry;
pub mod utils;

// Commonly used types
pub use calculator::StatisticsService;
pub use config::Settings;
pub use database::{models, DatabaseOperations, RecordStore};
pub use error::{BudgetError, Result};
pub use ledger::{CycleLedger, LedgerOptions, PostClosurePolicy, TotalsRefresh};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("A cycle already exists for {year}-{month:02}")]
    DuplicateCycle { year: i32, month: u32 },

    #[error("User {user_id} already has an active cycle")]
    ActiveCycleExists { user_id: String },

    #[error("Cycle {cycle_id} is closed")]
    CycleClosed { cycle_id: i64 },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, BudgetError>;

impl BudgetError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn cycle_not_found(id: i64) -> Self {
        Self::not_found("Cycle", id)
    }

    pub fn expense_not_found(id: i64) -> Self {
        Self::not_found("Expense", id)
    }

    pub fn fixed_charge_not_found(id: i64) -> Self {
        Self::not_found("Fixed charge", id)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateCycle { .. })
    }

    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Store { .. })
    }

    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BudgetError::Database(_) | BudgetError::Store { .. } | BudgetError::Io(_)
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BudgetError::Config(_) => ErrorSeverity::Critical,
            BudgetError::Env(_) => ErrorSeverity::Critical,
            BudgetError::Database(_) => ErrorSeverity::High,
            BudgetError::Store { .. } => ErrorSeverity::High,
            BudgetError::Serialization(_) => ErrorSeverity::High,
            BudgetError::Io(_) => ErrorSeverity::Medium,
            BudgetError::NotFound { .. } => ErrorSeverity::Medium,
            BudgetError::CycleClosed { .. } => ErrorSeverity::Low,
            BudgetError::DuplicateCycle { .. } => ErrorSeverity::Low,
            BudgetError::ActiveCycleExists { .. } => ErrorSeverity::Low,
            BudgetError::Validation { .. } => ErrorSeverity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_cycle_message() {
        let err = BudgetError::DuplicateCycle {
            year: 2024,
            month: 3,
        };
        assert_eq!(err.to_string(), "A cycle already exists for 2024-03");
        assert!(err.is_duplicate());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = BudgetError::cycle_not_found(42);
        assert_eq!(err.to_string(), "Cycle not found: 42");
        assert!(err.is_not_found());
        assert_eq!(err.severity(), ErrorSeverity::Medium);
    }

    #[test]
    fn test_store_errors_are_retryable() {
        let err = BudgetError::store("connection reset");
        assert!(err.is_store_error());
        assert!(err.is_retryable());

        let err = BudgetError::Database(rusqlite::Error::InvalidQuery);
        assert!(err.is_store_error());
        assert!(err.is_retryable());

        let err = BudgetError::validation("amount must be positive");
        assert!(!err.is_store_error());
        assert!(!err.is_retryable());
    }
}

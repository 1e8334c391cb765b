use thiserror::Error;

use crate::models::PersonKey;

pub type Result<T> = std::result::Result<T, CoefficientError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoefficientError {
    #[error("record store query failed: {0}")]
    DataUnavailable(String),

    #[error("no exam records found for {0}")]
    PersonNotFound(PersonKey),

    #[error("no exam records match the requested scope")]
    EmptyResultSet,

    #[error("invalid mode '{0}', expected one of: general, primary, final, all")]
    InvalidMode(String),

    /// Population standard deviation is zero, so no person can be standardized.
    #[error("population standard deviation is zero")]
    DegenerateStatistics,

    #[error("no trainings with an exam are available{}", category_suffix(.category))]
    NoTrainingsAvailable { category: Option<String> },

    #[error("deadline exceeded while waiting on the record store")]
    DeadlineExceeded,
}

fn category_suffix(category: &Option<String>) -> String {
    match category {
        Some(category) => format!(" in category '{category}'"),
        None => String::new(),
    }
}

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::ingest::ExamCsvRow;
use crate::models::{AvailableTraining, ExamRecord, Filter};

/// Read-only access to exam results. Implementations report any query or
/// connectivity failure as `CoefficientError::DataUnavailable`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records matching the filter, in ingestion order.
    async fn query_records(&self, filter: &Filter) -> Result<Vec<ExamRecord>>;

    /// Trainings that have an exam, optionally restricted to one category.
    async fn query_available_trainings(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<AvailableTraining>>;
}

/// Store backed by a vector of records, used for offline runs from a CSV export.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Vec<ExamRecord>,
    trainings: Vec<AvailableTraining>,
}

impl InMemoryStore {
    /// Every training that appears in the records is treated as available.
    pub fn from_records(records: Vec<ExamRecord>) -> Self {
        let mut trainings: Vec<AvailableTraining> = Vec::new();
        for record in &records {
            if !trainings.iter().any(|t| t.training_id == record.training_id) {
                trainings.push(AvailableTraining {
                    training_id: record.training_id.clone(),
                    category: record.category.clone(),
                });
            }
        }

        Self { records, trainings }
    }

    pub fn from_csv_rows(rows: Vec<ExamCsvRow>) -> Self {
        Self::from_records(rows.into_iter().map(ExamCsvRow::into_record).collect())
    }

    /// Registers a training with an exam that nobody has attempted yet.
    #[cfg(test)]
    pub fn with_training(mut self, training_id: &str, category: &str) -> Self {
        if !self.trainings.iter().any(|t| t.training_id == training_id) {
            self.trainings.push(AvailableTraining {
                training_id: training_id.to_string(),
                category: category.to_string(),
            });
        }
        self
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn query_records(&self, filter: &Filter) -> Result<Vec<ExamRecord>> {
        let records: Vec<ExamRecord> = self
            .records
            .iter()
            .filter(|record| record.matches(filter))
            .cloned()
            .collect();
        debug!(?filter, rows = records.len(), "in-memory record query");
        Ok(records)
    }

    async fn query_available_trainings(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<AvailableTraining>> {
        Ok(self
            .trainings
            .iter()
            .filter(|t| category.map_or(true, |c| t.category == c))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::time::Duration;

    use super::*;
    use crate::error::CoefficientError;

    pub fn record(
        name: &str,
        login: &str,
        external: &str,
        training: &str,
        category: &str,
        score: f64,
    ) -> ExamRecord {
        ExamRecord {
            person_name: name.to_string(),
            person_login_code: login.to_string(),
            person_external_id: external.to_string(),
            training_id: training.to_string(),
            score,
            category: category.to_string(),
        }
    }

    /// Two people in category "X", one in "Y". Paula retakes T1.
    pub fn sample_store() -> InMemoryStore {
        InMemoryStore::from_records(vec![
            record("Paula Reis", "prs01", "9001", "T1", "X", 10.0),
            record("Bruno Lima", "blm02", "9002", "T1", "X", 18.0),
            record("Paula Reis", "prs01", "9001", "T1", "X", 16.0),
            record("Paula Reis", "prs01", "9001", "T2", "X", 14.0),
            record("Carla Dias", "cds03", "9003", "T3", "Y", 12.0),
        ])
    }

    pub struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn query_records(&self, _filter: &Filter) -> Result<Vec<ExamRecord>> {
            Err(CoefficientError::DataUnavailable("connection reset".to_string()))
        }

        async fn query_available_trainings(
            &self,
            _category: Option<&str>,
        ) -> Result<Vec<AvailableTraining>> {
            Err(CoefficientError::DataUnavailable("connection reset".to_string()))
        }
    }

    pub struct SlowStore {
        pub inner: InMemoryStore,
        pub delay: Duration,
    }

    #[async_trait]
    impl RecordStore for SlowStore {
        async fn query_records(&self, filter: &Filter) -> Result<Vec<ExamRecord>> {
            tokio::time::sleep(self.delay).await;
            self.inner.query_records(filter).await
        }

        async fn query_available_trainings(
            &self,
            category: Option<&str>,
        ) -> Result<Vec<AvailableTraining>> {
            tokio::time::sleep(self.delay).await;
            self.inner.query_available_trainings(category).await
        }
    }
}

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{CoefficientError, Result};
use crate::models::{AvailableTraining, ExamRecord, Filter};
use crate::store::RecordStore;

/// Request-scoped handle every calculator works through. It borrows the
/// long-lived store and carries the caller's deadline into each round-trip.
#[derive(Clone, Copy)]
pub struct Engine<'a> {
    store: &'a dyn RecordStore,
    deadline: Option<Instant>,
}

impl<'a> Engine<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        match timeout {
            Some(timeout) => self.with_deadline(Instant::now() + timeout),
            None => self,
        }
    }

    pub(crate) async fn records(&self, filter: &Filter) -> Result<Vec<ExamRecord>> {
        let records = self.bounded(self.store.query_records(filter)).await?;
        debug!(?filter, rows = records.len(), "fetched exam records");
        Ok(records)
    }

    /// Records for a filter that must match something. A person key that
    /// matches nothing is reported as `PersonNotFound`.
    pub(crate) async fn required_records(&self, filter: &Filter) -> Result<Vec<ExamRecord>> {
        let records = self.records(filter).await?;
        if records.is_empty() {
            return Err(match &filter.person {
                Some(key) => CoefficientError::PersonNotFound(key.clone()),
                None => CoefficientError::EmptyResultSet,
            });
        }
        Ok(records)
    }

    pub(crate) async fn available_trainings(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<AvailableTraining>> {
        let trainings = self
            .bounded(self.store.query_available_trainings(category))
            .await?;
        debug!(?category, trainings = trainings.len(), "fetched available trainings");
        Ok(trainings)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call).await.map_err(|_| {
                warn!("record store round-trip hit the request deadline");
                CoefficientError::DeadlineExceeded
            })?,
            None => call.await,
        }
    }
}

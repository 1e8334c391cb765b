use std::collections::HashSet;

use tracing::{debug, warn};

use crate::averages;
use crate::engine::Engine;
use crate::error::{CoefficientError, Result};
use crate::models::{AvailableTraining, ExamRecord, Filter, PersonKey};
use crate::ranking::population;

/// Distinct trainings with an exam, the CP denominator.
pub fn available_count(trainings: &[AvailableTraining], category: Option<&str>) -> Result<usize> {
    let distinct: HashSet<&str> = trainings.iter().map(|t| t.training_id.as_str()).collect();
    if distinct.is_empty() {
        return Err(CoefficientError::NoTrainingsAvailable {
            category: category.map(str::to_owned),
        });
    }
    Ok(distinct.len())
}

pub fn completed_count(records: &[ExamRecord]) -> usize {
    records
        .iter()
        .map(|r| r.training_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// `CP = completed / available`.
pub fn progression_coefficient(records: &[ExamRecord], available: usize) -> f64 {
    let completed = completed_count(records);
    if completed > available {
        warn!(completed, available, "person completed trainings that have no exam on record");
    }
    completed as f64 / available as f64
}

pub(crate) fn population_progression(records: &[ExamRecord], available: usize) -> Vec<f64> {
    population(records)
        .iter()
        .map(|member| progression_coefficient(&member.records, available))
        .collect()
}

impl Engine<'_> {
    pub async fn progression(&self, key: PersonKey, category: Option<&str>) -> Result<f64> {
        let available = available_count(&self.available_trainings(category).await?, category)?;
        let filter = Filter::person(key).with_category(category);
        let records = self.required_records(&filter).await?;

        let coefficient = progression_coefficient(&records, available);
        debug!(?filter, available, coefficient, "computed progression coefficient");
        Ok(coefficient)
    }

    pub async fn mean_progression(&self, category: Option<&str>) -> Result<f64> {
        let available = available_count(&self.available_trainings(category).await?, category)?;
        let records = self
            .required_records(&Filter::scope(category, None))
            .await?;
        averages::mean(&population_progression(&records, available))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::{record, sample_store};
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn half_of_category_completed() {
        let store = InMemoryStore::from_records(vec![record("A", "a", "1", "T1", "X", 15.0)])
            .with_training("T2", "X")
            .with_training("T9", "Z");
        let engine = Engine::new(&store);

        let cp = engine
            .progression(PersonKey::LoginCode("a".to_string()), Some("X"))
            .await
            .unwrap();
        assert!((cp - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn retakes_count_once() {
        let store = sample_store();
        let engine = Engine::new(&store);

        // Paula completed T1 (twice) and T2 out of T1, T2, T3.
        let cp = engine
            .progression(PersonKey::Name("Paula Reis".to_string()), None)
            .await
            .unwrap();
        assert!((cp - 2.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn empty_category_is_a_failure() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let err = engine
            .progression(PersonKey::Name("Paula Reis".to_string()), Some("Q"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CoefficientError::NoTrainingsAvailable {
                category: Some("Q".to_string())
            }
        );
    }

    #[tokio::test]
    async fn completed_never_exceeds_available() {
        let store = sample_store();
        let engine = Engine::new(&store);
        let available = available_count(&engine.available_trainings(None).await.unwrap(), None)
            .unwrap();

        for login in ["prs01", "blm02", "cds03"] {
            let records = engine
                .records(&Filter::person(PersonKey::LoginCode(login.to_string())))
                .await
                .unwrap();
            assert!(completed_count(&records) <= available);
        }
    }

    #[tokio::test]
    async fn mean_progression_over_category() {
        let store = sample_store();
        let engine = Engine::new(&store);

        // Paula 2/2, Bruno 1/2
        let mean = engine.mean_progression(Some("X")).await.unwrap();
        assert!((mean - 0.75).abs() < 1e-12);
    }
}

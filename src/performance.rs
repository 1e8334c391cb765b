use tracing::debug;

use crate::averages::{self, general_average, primary_average};
use crate::engine::Engine;
use crate::error::Result;
use crate::models::{ExamRecord, Filter, PersonKey};
use crate::ranking::{population, Member};

const SCALE: f64 = 20.0;

/// `(primary + general) / 20` over one record set.
pub fn performance_coefficient(records: &[ExamRecord]) -> Result<f64> {
    Ok((primary_average(records)? + general_average(records)?) / SCALE)
}

/// CR of every person in the record set, in enumeration order.
pub(crate) fn population_performance(records: &[ExamRecord]) -> Result<Vec<f64>> {
    member_performance(&population(records))
}

pub(crate) fn member_performance(members: &[Member]) -> Result<Vec<f64>> {
    members
        .iter()
        .map(|member| performance_coefficient(&member.records))
        .collect()
}

impl Engine<'_> {
    pub async fn performance(
        &self,
        key: PersonKey,
        category: Option<&str>,
        training: Option<&str>,
    ) -> Result<f64> {
        let filter = Filter::person(key)
            .with_category(category)
            .with_training(training);
        let records = self.required_records(&filter).await?;
        let coefficient = performance_coefficient(&records)?;
        debug!(?filter, coefficient, "computed performance coefficient");
        Ok(coefficient)
    }

    /// Mean CR across everyone with a record in the scope.
    pub async fn mean_performance(
        &self,
        category: Option<&str>,
        training: Option<&str>,
    ) -> Result<f64> {
        let records = self
            .required_records(&Filter::scope(category, training))
            .await?;
        averages::mean(&population_performance(&records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoefficientError;
    use crate::store::fixtures::sample_store;

    #[tokio::test]
    async fn matches_worked_example() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let cr = engine
            .performance(PersonKey::Name("Paula Reis".to_string()), None, None)
            .await
            .unwrap();
        assert!((cr - (12.0 + 40.0 / 3.0) / 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn identical_for_every_lookup_key() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let by_name = engine
            .performance(PersonKey::Name("Paula Reis".to_string()), Some("X"), None)
            .await
            .unwrap();
        let by_login = engine
            .performance(PersonKey::LoginCode("prs01".to_string()), Some("X"), None)
            .await
            .unwrap();
        let by_external = engine
            .performance(PersonKey::ExternalId("9001".to_string()), Some("X"), None)
            .await
            .unwrap();
        assert_eq!(by_name, by_login);
        assert_eq!(by_login, by_external);
    }

    #[tokio::test]
    async fn unknown_person_is_an_error_not_zero() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let key = PersonKey::LoginCode("zzz99".to_string());
        let err = engine.performance(key.clone(), None, None).await.unwrap_err();
        assert_eq!(err, CoefficientError::PersonNotFound(key));
    }

    #[tokio::test]
    async fn person_outside_category_is_not_found() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let err = engine
            .performance(PersonKey::LoginCode("cds03".to_string()), Some("X"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoefficientError::PersonNotFound(_)));
    }

    #[tokio::test]
    async fn mean_over_category_population() {
        let store = sample_store();
        let engine = Engine::new(&store);

        // Paula: (12 + 40/3) / 20, Bruno: (18 + 18) / 20
        let expected = ((12.0 + 40.0 / 3.0) / 20.0 + 1.8) / 2.0;
        let mean = engine.mean_performance(Some("X"), None).await.unwrap();
        assert!((mean - expected).abs() < 1e-9);
    }
}

use crate::engine::Engine;
use crate::error::Result;
use crate::models::{PersonKey, Scale, ScoreBreakdown};

/// `Score = (100*CR + 100*CP) / 2 + CRP`. CRP is added unscaled, so the
/// result may leave the 0-100 range in either direction.
pub fn final_score(performance: f64, progression: f64, standardized: f64) -> f64 {
    (100.0 * performance + 100.0 * progression) / 2.0 + standardized
}

pub fn breakdown(performance: f64, progression: f64, standardized: f64) -> ScoreBreakdown {
    ScoreBreakdown {
        performance: 100.0 * performance,
        progression: 100.0 * progression,
        standardized,
        score: final_score(performance, progression, standardized),
    }
}

impl Scale {
    pub fn apply(self, score: f64) -> f64 {
        match self {
            Scale::Hundred => score,
            Scale::Unit => score / 100.0,
        }
    }
}

impl Engine<'_> {
    /// All three coefficients must resolve; any failure fails the whole score.
    pub async fn score_breakdown(
        &self,
        key: PersonKey,
        category: Option<&str>,
    ) -> Result<ScoreBreakdown> {
        let performance = self.performance(key.clone(), category, None).await?;
        let progression = self.progression(key, category).await?;
        let standardized = self
            .performance_statistics(category)
            .await?
            .standardize(performance)?;

        Ok(breakdown(performance, progression, standardized))
    }

    pub async fn final_score(
        &self,
        key: PersonKey,
        category: Option<&str>,
        scale: Scale,
    ) -> Result<f64> {
        let breakdown = self.score_breakdown(key, category).await?;
        Ok(scale.apply(breakdown.score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoefficientError;
    use crate::store::fixtures::sample_store;

    #[test]
    fn matches_worked_example() {
        let score = final_score(0.7, 0.5, 2.1);
        assert!((score - 62.1).abs() < 1e-9);
        assert!((Scale::Unit.apply(score) - 0.621).abs() < 1e-9);
    }

    #[test]
    fn standardized_term_can_push_past_hundred() {
        assert!(final_score(1.0, 1.0, 1.5) > 100.0);
        assert!(final_score(0.0, 0.0, -1.2) < 0.0);
    }

    #[tokio::test]
    async fn breakdown_scales_constituents() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let key = PersonKey::LoginCode("blm02".to_string());
        let result = engine.score_breakdown(key, Some("X")).await.unwrap();

        // Bruno: CR 1.8, CP 1/2, and the higher of two CRs so CRP is +1.
        assert!((result.performance - 180.0).abs() < 1e-9);
        assert!((result.progression - 50.0).abs() < 1e-9);
        assert!((result.standardized - 1.0).abs() < 1e-9);
        assert!((result.score - 116.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_constituent_fails_whole_score() {
        let store = sample_store();
        let engine = Engine::new(&store);

        // Carla is alone in category Y, so her CRP cannot be computed.
        let err = engine
            .final_score(PersonKey::LoginCode("cds03".to_string()), Some("Y"), Scale::Hundred)
            .await
            .unwrap_err();
        assert_eq!(err, CoefficientError::DegenerateStatistics);
    }
}

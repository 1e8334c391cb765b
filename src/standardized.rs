use tracing::debug;

use crate::averages;
use crate::engine::Engine;
use crate::error::{CoefficientError, Result};
use crate::models::{Filter, PersonKey};
use crate::performance::population_performance;

/// Deviations at or below this are float noise from identical coefficients.
const DEGENERATE_DEVIATION: f64 = 1e-12;

/// Mean and population (not sample) deviation of CR across a category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationStatistics {
    pub mean: f64,
    pub std_dev: f64,
    pub size: usize,
}

impl PopulationStatistics {
    pub fn from_values(values: &[f64]) -> Result<Self> {
        let mean = averages::mean(values)?;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

        Ok(Self {
            mean,
            std_dev: variance.sqrt(),
            size: values.len(),
        })
    }

    pub fn standardize(&self, value: f64) -> Result<f64> {
        if self.std_dev <= DEGENERATE_DEVIATION {
            return Err(CoefficientError::DegenerateStatistics);
        }
        Ok((value - self.mean) / self.std_dev)
    }
}

impl Engine<'_> {
    pub async fn performance_statistics(
        &self,
        category: Option<&str>,
    ) -> Result<PopulationStatistics> {
        let records = self
            .required_records(&Filter::scope(category, None))
            .await?;
        let statistics = PopulationStatistics::from_values(&population_performance(&records)?)?;
        debug!(
            ?category,
            mean = statistics.mean,
            std_dev = statistics.std_dev,
            population = statistics.size,
            "computed population statistics"
        );
        Ok(statistics)
    }

    pub async fn standardized(&self, key: PersonKey, category: Option<&str>) -> Result<f64> {
        let coefficient = self.performance(key, category, None).await?;
        self.performance_statistics(category)
            .await?
            .standardize(coefficient)
    }
}

use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::models::ExamRecord;

pub const MAX_SCORE: f64 = 20.0;

#[derive(Debug, Clone, Deserialize)]
pub struct ExamCsvRow {
    pub person_name: String,
    pub login_code: String,
    pub external_id: String,
    pub training: String,
    pub category: String,
    pub score: f64,
    pub source_key: Option<String>,
}

impl ExamCsvRow {
    pub fn into_record(self) -> ExamRecord {
        ExamRecord {
            person_name: self.person_name,
            person_login_code: self.login_code,
            person_external_id: self.external_id,
            training_id: self.training,
            score: self.score,
            category: self.category,
        }
    }
}

/// Reads an exam export, rejecting the whole file on the first malformed row.
pub fn read_exam_csv(path: &Path) -> anyhow::Result<Vec<ExamCsvRow>> {
    let reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_rows(reader)
}

fn read_rows<R: std::io::Read>(mut reader: csv::Reader<R>) -> anyhow::Result<Vec<ExamCsvRow>> {
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<ExamCsvRow>().enumerate() {
        let line = index + 2;
        let mut row = result.with_context(|| format!("malformed exam row on line {line}"))?;
        if !(0.0..=MAX_SCORE).contains(&row.score) {
            bail!(
                "score {} on line {line} is outside the 0-{MAX_SCORE} range",
                row.score
            );
        }
        // -0 reads as 0
        row.score += 0.0;
        rows.push(row);
    }

    Ok(rows)
}

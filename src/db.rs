use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{CoefficientError, Result};
use crate::ingest::ExamCsvRow;
use crate::models::{AvailableTraining, ExamRecord, Filter, PersonKey};
use crate::store::RecordStore;

const RECORDS_QUERY: &str = "SELECT r.person_name, r.login_code, r.external_id, \
     t.title AS training, r.score, c.description AS category \
     FROM coefficient.exam_results r \
     JOIN coefficient.trainings t ON t.id = r.training_id \
     JOIN coefficient.categories c ON c.id = t.category_id \
     WHERE TRUE";

const TRAININGS_QUERY: &str = "SELECT t.title AS training, c.description AS category, \
     MIN(t.id) AS first_id \
     FROM coefficient.trainings t \
     JOIN coefficient.exams e ON e.training_id = t.id \
     JOIN coefficient.categories c ON c.id = t.category_id \
     WHERE TRUE";

fn person_column(key: &PersonKey) -> (&'static str, &str) {
    match key {
        PersonKey::Name(value) => ("r.person_name", value),
        PersonKey::LoginCode(value) => ("r.login_code", value),
        PersonKey::ExternalId(value) => ("r.external_id", value),
    }
}

fn unavailable(context: &str, err: sqlx::Error) -> CoefficientError {
    error!("{context}: {err}");
    CoefficientError::DataUnavailable(format!("{context}: {err}"))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| unavailable(&format!("bad {name} column"), e))
}

/// Postgres-backed record store. The pool is opened once by the host and reused.
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn query_records(&self, filter: &Filter) -> Result<Vec<ExamRecord>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(RECORDS_QUERY);

        if let Some(key) = &filter.person {
            let (column, value) = person_column(key);
            query.push(" AND ").push(column).push(" = ").push_bind(value.to_string());
        }
        if let Some(category) = &filter.category {
            query.push(" AND c.description = ").push_bind(category.clone());
        }
        if let Some(training) = &filter.training {
            query.push(" AND t.title = ").push_bind(training.clone());
        }
        query.push(" ORDER BY r.id");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("failed to query exam results", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let score: f64 = column(&row, "score")?;
            records.push(ExamRecord {
                person_name: column(&row, "person_name")?,
                person_login_code: column(&row, "login_code")?,
                person_external_id: column(&row, "external_id")?,
                training_id: column(&row, "training")?,
                // -0 passes the range check
                score: score + 0.0,
                category: column(&row, "category")?,
            });
        }

        debug!(?filter, rows = records.len(), "queried exam results");
        Ok(records)
    }

    async fn query_available_trainings(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<AvailableTraining>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(TRAININGS_QUERY);
        if let Some(category) = category {
            query.push(" AND c.description = ").push_bind(category.to_string());
        }
        query.push(" GROUP BY t.title, c.description ORDER BY first_id");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("failed to query available trainings", e))?;

        rows.into_iter()
            .map(|row| {
                Ok(AvailableTraining {
                    training_id: column(&row, "training")?,
                    category: column(&row, "category")?,
                })
            })
            .collect()
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let trainings = [
        ("Rust Fundamentals", "Engineering"),
        ("Async Services", "Engineering"),
        ("Incident Response", "Operations"),
        ("Data Privacy", "Compliance"),
    ];
    for (title, category) in trainings {
        ensure_training(pool, title, category).await?;
    }

    let results = [
        ("seed-001", "Avery Lee", "alee01", "100231", "Rust Fundamentals", 11.0),
        ("seed-002", "Jules Moreno", "jmor02", "100232", "Rust Fundamentals", 17.5),
        ("seed-003", "Avery Lee", "alee01", "100231", "Rust Fundamentals", 16.0),
        ("seed-004", "Avery Lee", "alee01", "100231", "Async Services", 14.0),
        ("seed-005", "Kiara Patel", "kpat03", "100233", "Async Services", 19.0),
        ("seed-006", "Kiara Patel", "kpat03", "100233", "Incident Response", 12.5),
        ("seed-007", "Jules Moreno", "jmor02", "100232", "Data Privacy", 15.0),
    ];

    for (source_key, name, login, external_id, training, score) in results {
        let training_id = find_training(pool, training).await?;
        insert_result(pool, source_key, name, login, external_id, training_id, score).await?;
    }

    info!(rows = results.len(), "seeded exam results");
    Ok(())
}

/// Imports exam rows, skipping any whose source key was already loaded.
pub async fn import_csv(pool: &PgPool, rows: Vec<ExamCsvRow>) -> anyhow::Result<usize> {
    let mut inserted = 0usize;

    for row in rows {
        let training_id = ensure_training(pool, &row.training, &row.category).await?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_result(
            pool,
            &source_key,
            &row.person_name,
            &row.login_code,
            &row.external_id,
            training_id,
            row.score,
        )
        .await?
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Upserts a category and a training, and attaches an exam if it has none.
async fn ensure_training(pool: &PgPool, title: &str, category: &str) -> anyhow::Result<i32> {
    let category_id: i32 = sqlx::query(
        r#"
        INSERT INTO coefficient.categories (description)
        VALUES ($1)
        ON CONFLICT (description) DO UPDATE SET description = EXCLUDED.description
        RETURNING id
        "#,
    )
    .bind(category)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert category {category}"))?
    .get("id");

    let training_id: i32 = sqlx::query(
        r#"
        INSERT INTO coefficient.trainings (title, category_id)
        VALUES ($1, $2)
        ON CONFLICT (title) DO UPDATE SET category_id = EXCLUDED.category_id
        RETURNING id
        "#,
    )
    .bind(title)
    .bind(category_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert training {title}"))?
    .get("id");

    sqlx::query(
        r#"
        INSERT INTO coefficient.exams (training_id)
        SELECT $1
        WHERE NOT EXISTS (SELECT 1 FROM coefficient.exams WHERE training_id = $1)
        "#,
    )
    .bind(training_id)
    .execute(pool)
    .await?;

    Ok(training_id)
}

async fn find_training(pool: &PgPool, title: &str) -> anyhow::Result<i32> {
    let id: i32 = sqlx::query("SELECT id FROM coefficient.trainings WHERE title = $1")
        .bind(title)
        .fetch_one(pool)
        .await
        .with_context(|| format!("unknown training {title}"))?
        .get("id");
    Ok(id)
}

async fn insert_result(
    pool: &PgPool,
    source_key: &str,
    name: &str,
    login: &str,
    external_id: &str,
    training_id: i32,
    score: f64,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO coefficient.exam_results
        (person_name, login_code, external_id, training_id, score, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(name)
    .bind(login)
    .bind(external_id)
    .bind(training_id)
    .bind(score)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

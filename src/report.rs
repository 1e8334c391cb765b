use std::fmt::Write;

use chrono::Utc;

use crate::models::{AverageValue, ScoreBreakdown};
use crate::ranking::{Columns, Ranking, RankingRow, RowValues};

pub fn build_ranking_report(ranking: &Ranking, columns: &Columns) -> String {
    let rows = ranking.rows(columns);
    let mut output = String::new();
    let scope = ranking.category.as_deref().unwrap_or("all categories");

    let _ = writeln!(output, "# Ranking by {}", ranking.metric);
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        scope,
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);

    let mut header = vec!["ID"];
    if columns.include_name {
        header.push("Name");
    }
    if columns.include_external_id {
        header.push("External ID");
    }
    match rows.first().map(|row| &row.values) {
        Some(RowValues::Breakdown(_)) => {
            header.extend(["Performance", "Progression", "Standardized", "Score"])
        }
        Some(RowValues::Score { .. }) => header.push("Score"),
        _ => header.push("Coefficient"),
    }

    let _ = writeln!(output, "| {} |", header.join(" | "));
    let _ = writeln!(output, "|{}", "---|".repeat(header.len()));
    for row in &rows {
        let _ = writeln!(output, "| {} |", cells(row).join(" | "));
    }

    output
}

fn cells(row: &RankingRow) -> Vec<String> {
    let mut cells = vec![row.id.to_string()];
    cells.extend(row.name.clone());
    cells.extend(row.external_id.clone());
    match &row.values {
        RowValues::Coefficient { coefficient } => cells.push(format!("{coefficient:.4}")),
        RowValues::Breakdown(breakdown) => cells.extend([
            format!("{:.2}", breakdown.performance),
            format!("{:.2}", breakdown.progression),
            format!("{:.4}", breakdown.standardized),
            format!("{:.2}", breakdown.score),
        ]),
        RowValues::Score { score } => cells.push(format!("{score:.2}")),
    }
    cells
}

pub fn ranking_json(ranking: &Ranking, columns: &Columns) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&ranking.rows(columns))?)
}

pub fn format_average(value: &AverageValue) -> String {
    match value {
        AverageValue::Single(value) => format!("{value:.4}"),
        AverageValue::All(averages) => format!(
            "general {:.4}, primary {:.4}, final {:.4}",
            averages.general, averages.primary, averages.final_
        ),
    }
}

pub fn format_breakdown(breakdown: &ScoreBreakdown) -> String {
    format!(
        "performance {:.2}, progression {:.2}, standardized {:.4}, score {:.2}",
        breakdown.performance, breakdown.progression, breakdown.standardized, breakdown.score
    )
}

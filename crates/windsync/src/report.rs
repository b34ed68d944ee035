use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use windsync_core::audit::{Checkpoint, QualityReport};
use windsync_core::pipelines::DatasetOutcome;

/// A source that never reached the engine (unreadable or unparsable file).
#[derive(Debug, Clone)]
pub struct SourceProblem {
    pub source: String,
    pub reason: String,
}

pub struct DatasetSummary {
    pub outcome: DatasetOutcome,
    pub unreadable: Vec<SourceProblem>,
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn pct(value: f64) -> String {
    format!("{value:.1}%")
}

pub fn print_run(summaries: &[DatasetSummary], dry_run: bool) {
    let mut entities = new_table();
    entities.set_header(vec![
        "Dataset",
        "Pipeline",
        "Entity",
        "Artifact",
        "Rows in",
        "Rows out",
        "Rows w/ missing",
        "Rows all missing",
    ]);
    for summary in summaries {
        let outcome = &summary.outcome;
        for entity in &outcome.entities {
            let (with_missing, all_missing) = match &entity.report {
                Some(report) => (
                    pct(report.rows_with_missing_pct),
                    pct(report.rows_all_missing_pct),
                ),
                None => ("n/a".to_string(), "n/a".to_string()),
            };
            entities.add_row(vec![
                outcome.dataset.clone(),
                outcome.pipeline.to_string(),
                entity.entity.clone(),
                entity.artifact.clone(),
                entity.rows_in.to_string(),
                entity.rows_out.to_string(),
                with_missing,
                all_missing,
            ]);
        }
    }
    println!("{entities}");

    let mut problems = new_table();
    problems.set_header(vec!["Dataset", "Source", "Problem"]);
    let mut problem_count = 0;
    for summary in summaries {
        let dataset = &summary.outcome.dataset;
        for problem in &summary.unreadable {
            problems.add_row(vec![dataset.clone(), problem.source.clone(), problem.reason.clone()]);
            problem_count += 1;
        }
        for failure in &summary.outcome.failed_sources {
            problems.add_row(vec![
                dataset.clone(),
                failure.source.clone(),
                failure.error.to_string(),
            ]);
            problem_count += 1;
        }
        if !summary.outcome.dropped_records.is_empty() {
            problems.add_row(vec![
                dataset.clone(),
                "(records)".to_string(),
                format!(
                    "{} record(s) with unknown discriminator dropped",
                    summary.outcome.dropped_records.len()
                ),
            ]);
            problem_count += 1;
        }
    }
    if problem_count > 0 {
        println!("{problems}");
    }

    let artifacts: usize = summaries.iter().map(|s| s.outcome.entities.len()).sum();
    if dry_run {
        println!("Dry run: {artifacts} artifact(s) built, nothing written.");
    } else {
        println!("{artifacts} artifact(s) written.");
    }
}

pub fn print_reports(entries: &[(Checkpoint, Result<QualityReport, String>)]) {
    let mut table = new_table();
    table.set_header(vec![
        "Checkpoint",
        "Entity",
        "Rows",
        "Columns",
        "Rows w/ missing",
        "Columns w/ missing",
        "Rows all missing",
    ]);
    for (checkpoint, outcome) in entries {
        match outcome {
            Ok(report) => table.add_row(vec![
                checkpoint.to_string(),
                report.entity.clone(),
                report.rows.to_string(),
                report.columns.to_string(),
                format!("{} ({})", report.rows_with_missing, pct(report.rows_with_missing_pct)),
                format!(
                    "{} ({})",
                    report.columns_with_missing,
                    pct(report.columns_with_missing_pct)
                ),
                format!("{} ({})", report.rows_all_missing, pct(report.rows_all_missing_pct)),
            ]),
            Err(message) => table.add_row(vec![
                checkpoint.to_string(),
                message.clone(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ]),
        };
    }
    println!("{table}");
}

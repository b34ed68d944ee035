use polars::prelude::*;
use windsync_core::audit::{Checkpoint, CollectingSink};
use windsync_core::config::{DatasetSettings, RawLayout, RunConfig};
use windsync_core::pipelines::{all_pipelines, pipeline_for, run_dataset};
use windsync_core::store::{ArtifactStore, MemoryStore};
use windsync_core::{CanonicalSeries, HarmonizeError, TIMESTAMP_FIELD};
use windsync_parser::{parse_raw_batch, RawBatch, ReadOptions};

const FARM_ALPHA: &str = include_str!("../../windsync-parser/tests/data/farm_alpha_windspeed.csv");
const TURBINE_Q1: &str = include_str!("../../windsync-parser/tests/data/turbine_export_2023q1.csv");

const TURBINE_Q2: &str = "t_unix,WTG,0,1,2
1672532400,1,7.0,185.0,1200.0
1672532400,2,6.5,186.0,1100.0
1672533600,1,9.0,190.0,1600.0
";

const RUN: &str = r#"
data_folder = "data"
output_folder = "out"

[[dataset]]
name = "farm"
layout = "farm_sensor_table"
resample_step_seconds = 600

[dataset.ensemble]

[[dataset]]
name = "turbines"
layout = "turbine_export"
resample_step_seconds = 600
discriminator = "WTG"
entities = [{ key = 1 }, { key = 2 }]
channel_renames = [
  { from = "0", to = "speed" },
  { from = "1", to = "direction" },
  { from = "2", to = "power" },
]
"#;

fn settings(name: &str) -> DatasetSettings {
    let config: RunConfig = toml::from_str(RUN).expect("toml");
    config
        .resolve_all()
        .expect("resolve")
        .into_iter()
        .find(|dataset| dataset.name == name)
        .expect("dataset")
}

fn parse(source: &str, content: &str) -> RawBatch {
    parse_raw_batch(source, content, &ReadOptions::default()).expect("parse")
}

const CHARLIE: &str =
    "t_local,WS_A,WS_B\n2023-06-01 00:00:00,4.0,6.0\n2023-06-01 00:20:00,8.0,\n";

/// Memory store that refuses one artifact name, as a full disk or a locked file would.
struct RefusingStore {
    inner: MemoryStore,
    refused: &'static str,
}

impl ArtifactStore for RefusingStore {
    fn store(&self, name: &str, series: &CanonicalSeries) -> windsync_core::Result<()> {
        if name == self.refused {
            return Err(HarmonizeError::Store {
                name: name.to_string(),
                message: "disk full".into(),
            });
        }
        self.inner.store(name, series)
    }
}

fn f64_values(df: &DataFrame, column: &str) -> Vec<Option<f64>> {
    df.column(column)
        .expect("column")
        .f64()
        .expect("f64")
        .into_iter()
        .collect()
}

fn assert_close(actual: &[Option<f64>], expected: &[Option<f64>]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        match (a, e) {
            (Some(a), Some(e)) => assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}"),
            (None, None) => {}
            _ => panic!("{actual:?} vs {expected:?}"),
        }
    }
}

#[test]
fn farm_sources_are_harmonized_and_a_broken_one_is_isolated() {
    let settings = settings("farm");
    let batches = vec![
        parse("Alpha", FARM_ALPHA),
        parse("Bravo", "time,WS_80m\n2023-06-01 00:00:00,5.0\n"),
        parse("Charlie", CHARLIE),
    ];
    let sink = CollectingSink::new();
    let store = MemoryStore::new();

    let outcome = run_dataset(&settings, &batches, &sink, &store).expect("run");

    assert_eq!(outcome.pipeline, "farm_sensor_v1");
    assert_eq!(outcome.failed_sources.len(), 1);
    assert_eq!(outcome.failed_sources[0].source, "Bravo");
    assert!(matches!(
        outcome.failed_sources[0].error,
        HarmonizeError::Schema { .. }
    ));
    assert_eq!(store.names(), vec!["farm_Alpha", "farm_Charlie"]);

    let alpha = store.get("farm_Alpha").expect("alpha artifact");
    assert_eq!(
        alpha.get_column_names_str(),
        vec![TIMESTAMP_FIELD, "WS_80m_N", "WS_80m_S", "WS_60m", "Mean"]
    );
    assert_eq!(alpha.height(), 3);
    assert_close(
        &f64_values(&alpha, "WS_80m_S"),
        &[None, Some(7.05), Some(7.22)],
    );
    assert_close(
        &f64_values(&alpha, "Mean"),
        &[
            Some((6.98 + 6.21) / 2.0),
            Some((7.12 + 7.05 + 6.40) / 3.0),
            Some((7.30 + 7.22) / 2.0),
        ],
    );

    let charlie = store.get("farm_Charlie").expect("charlie artifact");
    assert_close(&f64_values(&charlie, "WS_A"), &[Some(4.0), Some(6.0), Some(8.0)]);
    assert_close(&f64_values(&charlie, "WS_B"), &[Some(6.0), None, None]);
    assert_close(&f64_values(&charlie, "Mean"), &[Some(5.0), Some(6.0), Some(8.0)]);

    assert_eq!(sink.reports(Checkpoint::Ingest).len(), 2);
    assert_eq!(sink.reports(Checkpoint::Resampled).len(), 2);
    assert_eq!(outcome.entities[0].report.as_ref().map(|r| r.rows), Some(3));
}

#[test]
fn turbine_windows_are_stitched_per_entity() {
    let settings = settings("turbines");
    let batches = vec![parse("2023q1", TURBINE_Q1), parse("2023q2", TURBINE_Q2)];
    let sink = CollectingSink::new();
    let store = MemoryStore::new();

    let outcome = run_dataset(&settings, &batches, &sink, &store).expect("run");

    assert_eq!(outcome.pipeline, "turbine_stitch_v1");
    assert!(outcome.failed_sources.is_empty());
    assert_eq!(outcome.dropped_records.len(), 1);
    assert_eq!(outcome.dropped_records[0].key.as_deref(), Some("7"));
    assert_eq!(store.names(), vec!["turbines_WTG_1", "turbines_WTG_2"]);

    let wtg1 = store.get("turbines_WTG_1").expect("wtg1");
    assert_eq!(
        wtg1.get_column_names_str(),
        vec![TIMESTAMP_FIELD, "speed", "direction", "power"]
    );
    assert_close(
        &f64_values(&wtg1, "speed"),
        &[Some(5.5), Some(6.0), Some(7.0), Some(8.0), Some(9.0)],
    );
    assert_close(
        &f64_values(&wtg1, "power"),
        &[Some(850.0), Some(1010.5), Some(1200.0), Some(1400.0), Some(1600.0)],
    );

    let wtg2 = store.get("turbines_WTG_2").expect("wtg2");
    assert_close(&f64_values(&wtg2, "speed"), &[Some(5.1), Some(5.8), Some(6.5)]);

    assert_eq!(outcome.entities[0].rows_in, 4);
    assert_eq!(outcome.entities[0].rows_out, 5);
}

#[test]
fn registry_resolves_each_layout() {
    let codes: Vec<&str> = all_pipelines().iter().map(|p| p.code_identifier()).collect();
    assert_eq!(codes, vec!["farm_sensor_v1", "turbine_stitch_v1"]);
    assert_eq!(
        pipeline_for(RawLayout::TurbineExport).map(|p| p.code_identifier()),
        Some("turbine_stitch_v1")
    );
}

#[test]
fn pipeline_refuses_a_dataset_of_another_layout() {
    let farm = settings("farm");
    let turbine_pipeline = pipeline_for(RawLayout::TurbineExport).expect("pipeline");
    let err = turbine_pipeline
        .run(&farm, &[], &CollectingSink::new(), &MemoryStore::new())
        .expect_err("layout mismatch");
    assert!(err.is_fatal_for_run());
}

#[test]
fn single_channel_farm_file_fails_alone_when_a_mean_is_configured() {
    let settings = settings("farm");
    let batches = vec![
        parse("Alpha", FARM_ALPHA),
        parse(
            "Bravo",
            "t_local,WS_A\n2023-06-01 00:00:00,5.0\n2023-06-01 00:10:00,6.0\n",
        ),
        parse("Charlie", CHARLIE),
    ];
    let sink = CollectingSink::new();
    let store = MemoryStore::new();

    let outcome = run_dataset(&settings, &batches, &sink, &store).expect("run completes");

    assert_eq!(store.names(), vec!["farm_Alpha", "farm_Charlie"]);
    assert_eq!(outcome.entities.len(), 2);
    assert_eq!(outcome.failed_sources.len(), 1);
    assert_eq!(outcome.failed_sources[0].source, "Bravo");
    assert!(matches!(
        outcome.failed_sources[0].error,
        HarmonizeError::Config(_)
    ));
}

#[test]
fn farm_store_failure_spares_the_other_sources() {
    let settings = settings("farm");
    let batches = vec![
        parse("Alpha", FARM_ALPHA),
        parse("Bravo", CHARLIE),
        parse("Charlie", CHARLIE),
    ];
    let store = RefusingStore {
        inner: MemoryStore::new(),
        refused: "farm_Bravo",
    };

    let outcome =
        run_dataset(&settings, &batches, &CollectingSink::new(), &store).expect("run completes");

    assert_eq!(store.inner.names(), vec!["farm_Alpha", "farm_Charlie"]);
    assert_eq!(outcome.failed_sources.len(), 1);
    assert_eq!(outcome.failed_sources[0].source, "Bravo");
    assert!(matches!(
        outcome.failed_sources[0].error,
        HarmonizeError::Store { ref name, .. } if name == "farm_Bravo"
    ));
}

#[test]
fn turbine_store_failure_spares_the_other_entities() {
    let settings = settings("turbines");
    let batches = vec![parse("2023q1", TURBINE_Q1), parse("2023q2", TURBINE_Q2)];
    let store = RefusingStore {
        inner: MemoryStore::new(),
        refused: "turbines_WTG_1",
    };

    let outcome =
        run_dataset(&settings, &batches, &CollectingSink::new(), &store).expect("run completes");

    assert_eq!(store.inner.names(), vec!["turbines_WTG_2"]);
    assert_eq!(outcome.entities.len(), 1);
    assert_eq!(outcome.entities[0].entity, "WTG_2");
    assert_eq!(outcome.failed_sources.len(), 1);
    assert_eq!(outcome.failed_sources[0].source, "WTG_1");
    assert!(matches!(
        outcome.failed_sources[0].error,
        HarmonizeError::Store { .. }
    ));
}

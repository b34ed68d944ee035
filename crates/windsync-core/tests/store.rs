use std::fs::File;

use polars::prelude::*;
use windsync_core::store::{ArtifactStore, MemoryStore, ParquetDirStore};
use windsync_core::{CanonicalSeries, Channel, HarmonizeError, TIMESTAMP_FIELD};

fn sample() -> CanonicalSeries {
    CanonicalSeries::new(
        "alpha",
        vec![1_704_067_200_000_000, 1_704_067_800_000_000],
        vec![
            Channel::new("WS_80m", vec![Some(5.5), None]),
            Channel::new("Mean", vec![Some(5.5), Some(6.0)]),
        ],
    )
    .expect("series")
}

#[test]
fn parquet_artifact_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ParquetDirStore::new(dir.path().join("nested"));

    store.store("farm_alpha", &sample()).expect("store");

    let path = store.path_for("farm_alpha");
    assert!(path.exists());
    assert_eq!(path.parent(), Some(store.root()));
    let df = ParquetReader::new(File::open(&path).expect("open"))
        .finish()
        .expect("read parquet");

    assert_eq!(df.height(), 2);
    assert_eq!(
        df.get_column_names_str(),
        vec![TIMESTAMP_FIELD, "WS_80m", "Mean"]
    );
    assert!(matches!(
        df.column(TIMESTAMP_FIELD).expect("timestamp").dtype(),
        DataType::Datetime(TimeUnit::Microseconds, Some(_))
    ));
    let ws = df.column("WS_80m").expect("WS_80m").f64().expect("f64");
    assert_eq!(ws.get(0), Some(5.5));
    assert_eq!(ws.get(1), None);
}

#[test]
fn storing_twice_replaces_the_artifact() {
    let store = MemoryStore::new();
    store.store("farm_alpha", &sample()).expect("first");

    let shorter = CanonicalSeries::new(
        "alpha",
        vec![0],
        vec![Channel::new("WS_80m", vec![Some(1.0)])],
    )
    .expect("series");
    store.store("farm_alpha", &shorter).expect("second");

    assert_eq!(store.len(), 1);
    assert_eq!(store.get("farm_alpha").expect("frame").height(), 1);
}

#[test]
fn names_with_path_separators_are_refused() {
    let store = MemoryStore::new();
    let err = store.store("../escape", &sample()).expect_err("bad name");
    assert!(matches!(err, HarmonizeError::Store { .. }));
    assert!(store.is_empty());
}

use chrono::Duration;
use windsync_core::config::{
    DuplicatePolicy, RawLayout, RerunPolicy, RunConfig, TimestampKind, TurbineChannel,
};
use windsync_core::HarmonizeError;

const RUN: &str = r#"
data_folder = "data"
output_folder = "out"

[[dataset]]
name = "farm"
layout = "farm_sensor_table"
subfolder = "farm"
timezone = "Europe/Paris"
resample_step_seconds = 600
max_gap_seconds = 3600
locations = ["Alpha", "Bravo"]
file_template = "{location}_windspeed_COD_to_20230601.csv"

[dataset.ensemble]

[[dataset]]
name = "turbines"
layout = "turbine_export"
source_glob = "turbines/*.csv"
resample_step_seconds = 600
duplicates = "keep_last"
discriminator = "WTG"
entities = [{ key = 1, name = "north" }, { key = 2 }]
channel_renames = [
  { from = "0", to = "speed" },
  { from = "1", to = "direction" },
  { from = "2", to = "power" },
]
"#;

fn parse(text: &str) -> RunConfig {
    toml::from_str(text).expect("valid toml")
}

fn expect_config_error(text: &str, needle: &str) {
    let config = parse(text);
    match config.resolve_all() {
        Err(HarmonizeError::Config(message)) => {
            assert!(message.contains(needle), "'{message}' should mention '{needle}'")
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn resolves_both_layouts() {
    let config = parse(RUN);
    let resolved = config.resolve_all().expect("resolve");
    assert_eq!(resolved.len(), 2);

    let farm = &resolved[0];
    assert_eq!(farm.layout, RawLayout::FarmSensorTable);
    assert_eq!(farm.schema.timezone, chrono_tz::Europe::Paris);
    assert_eq!(farm.schema.aliases[0].column, "t_local");
    assert_eq!(farm.schema.aliases[1].kind, TimestampKind::UnixSeconds);
    assert_eq!(farm.resample.step, Duration::minutes(10));
    assert_eq!(farm.resample.max_gap, Some(Duration::hours(1)));
    let ensemble = farm.ensemble.as_ref().expect("ensemble");
    assert_eq!(ensemble.channel, "Mean");
    assert_eq!(ensemble.rerun, RerunPolicy::Overwrite);
    assert!(farm.stitch.is_none());

    let turbines = &resolved[1];
    assert_eq!(turbines.resample.duplicates, DuplicatePolicy::KeepLast);
    assert!(turbines.ensemble.is_none());
    let stitch = turbines.stitch.as_ref().expect("stitch settings");
    assert_eq!(stitch.entities.field(), "WTG");
    let names: Vec<&str> = stitch.entities.entities().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["north", "WTG_2"]);
    assert_eq!(stitch.renames.target("1"), Some(TurbineChannel::Direction));
    assert_eq!(stitch.schema.key_field.as_deref(), Some("WTG"));

    assert!(config.dataset("turbines").is_some());
    assert!(config.dataset("missing").is_none());
}

#[test]
fn non_positive_step_is_rejected() {
    expect_config_error(
        r#"
data_folder = "d"
output_folder = "o"
[[dataset]]
name = "farm"
layout = "farm_sensor_table"
resample_step_seconds = 0
"#,
        "step",
    );
}

#[test]
fn unknown_rename_target_is_rejected() {
    expect_config_error(
        r#"
data_folder = "d"
output_folder = "o"
[[dataset]]
name = "turbines"
layout = "turbine_export"
resample_step_seconds = 600
discriminator = "WTG"
entities = [{ key = 1 }]
channel_renames = [{ from = "0", to = "torque" }]
"#,
        "torque",
    );
}

#[test]
fn turbine_layout_needs_a_discriminator() {
    expect_config_error(
        r#"
data_folder = "d"
output_folder = "o"
[[dataset]]
name = "turbines"
layout = "turbine_export"
resample_step_seconds = 600
entities = [{ key = 1 }]
"#,
        "discriminator",
    );
}

#[test]
fn duplicate_entity_keys_are_rejected() {
    expect_config_error(
        r#"
data_folder = "d"
output_folder = "o"
[[dataset]]
name = "turbines"
layout = "turbine_export"
resample_step_seconds = 600
discriminator = "WTG"
entities = [{ key = 1 }, { key = "1" }]
"#,
        "listed twice",
    );
}

#[test]
fn unknown_time_zone_is_rejected() {
    expect_config_error(
        r#"
data_folder = "d"
output_folder = "o"
[[dataset]]
name = "farm"
layout = "farm_sensor_table"
timezone = "Mars/Olympus_Mons"
resample_step_seconds = 600
"#,
        "Mars/Olympus_Mons",
    );
}

#[test]
fn empty_ensemble_channel_is_rejected() {
    expect_config_error(
        r#"
data_folder = "d"
output_folder = "o"
[[dataset]]
name = "farm"
layout = "farm_sensor_table"
resample_step_seconds = 600
[dataset.ensemble]
channel = "  "
"#,
        "ensemble channel",
    );
}

#[test]
fn duplicate_dataset_names_are_rejected() {
    expect_config_error(
        r#"
data_folder = "d"
output_folder = "o"
[[dataset]]
name = "farm"
layout = "farm_sensor_table"
resample_step_seconds = 600
[[dataset]]
name = "farm"
layout = "farm_sensor_table"
resample_step_seconds = 300
"#,
        "more than once",
    );
}

#[test]
fn read_options_default_when_omitted() {
    let config = parse(RUN);
    let resolved = config.resolve_all().expect("resolve");
    assert_eq!(resolved[0].read_options.delimiter, ',');
    assert!(resolved[0].read_options.is_null_token("NaN"));
}

#[test]
fn strict_rerun_policy_parses() {
    let config = parse(
        r#"
data_folder = "d"
output_folder = "o"
[[dataset]]
name = "farm"
layout = "farm_sensor_table"
resample_step_seconds = 600
[dataset.ensemble]
channel = "ensemble"
rerun = "strict"
"#,
    );
    let resolved = config.resolve_all().expect("resolve");
    let ensemble = resolved[0].ensemble.as_ref().expect("ensemble");
    assert_eq!(ensemble.rerun, RerunPolicy::Strict);
    assert_eq!(ensemble.channel, "ensemble");
}

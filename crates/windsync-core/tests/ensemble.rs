use windsync_core::config::RerunPolicy;
use windsync_core::ensemble::{append_mean, EnsembleSettings, DEFAULT_MEAN_CHANNEL};
use windsync_core::{CanonicalSeries, Channel, HarmonizeError};

fn farm() -> CanonicalSeries {
    CanonicalSeries::new(
        "alpha",
        vec![0, 600_000_000, 1_200_000_000],
        vec![
            Channel::new("WS_80m_N", vec![Some(4.0), None, None]),
            Channel::new("WS_80m_S", vec![Some(6.0), Some(5.0), None]),
            Channel::new("WS_60m", vec![Some(8.0), Some(7.0), None]),
        ],
    )
    .expect("series")
}

#[test]
fn mean_skips_undefined_channels() {
    let input = farm();
    let out = append_mean(&input, &EnsembleSettings::default()).expect("mean");

    assert_eq!(
        out.channel_names(),
        vec!["WS_80m_N", "WS_80m_S", "WS_60m", DEFAULT_MEAN_CHANNEL]
    );
    assert_eq!(
        out.channel(DEFAULT_MEAN_CHANNEL).expect("mean").values,
        vec![Some(6.0), Some(6.0), None]
    );
    // The input is left as it was.
    assert_eq!(input.channels().len(), 3);
    assert_eq!(out.timestamps(), input.timestamps());
}

#[test]
fn rerun_overwrites_the_derived_channel_in_place() {
    let once = append_mean(&farm(), &EnsembleSettings::default()).expect("first");
    let twice = append_mean(&once, &EnsembleSettings::default()).expect("second");

    assert_eq!(twice, once);
    assert_eq!(twice.channels().len(), 4);
}

#[test]
fn rerun_in_strict_mode_is_a_config_error() {
    let strict = EnsembleSettings::default().with_rerun(RerunPolicy::Strict);
    let once = append_mean(&farm(), &strict).expect("first run is fine");
    let err = append_mean(&once, &strict).expect_err("second run rejected");
    assert!(matches!(err, HarmonizeError::Config(_)));
}

#[test]
fn custom_channel_name_is_used() {
    let out = append_mean(&farm(), &EnsembleSettings::new("ensemble_ws")).expect("mean");
    assert!(out.channel("ensemble_ws").is_some());
    assert!(out.channel(DEFAULT_MEAN_CHANNEL).is_none());
}

#[test]
fn single_channel_cannot_form_an_ensemble() {
    let lonely = CanonicalSeries::new(
        "alpha",
        vec![0],
        vec![Channel::new("WS", vec![Some(1.0)])],
    )
    .expect("series");
    let err = append_mean(&lonely, &EnsembleSettings::default()).expect_err("too few");
    assert!(err.is_fatal_for_run());
}

//! Treated volume and CO2e estimates.
//!
//! Run with: cargo test --test impact_test

use pump_collector::config::ImpactConfig;
use pump_collector::cycles::{ImpactError, co2e_impact, volume_m3};

#[test]
fn volume_from_flow_and_duration() {
    assert_eq!(volume_m3(6.0, 30.0), Ok(3.0));
    assert_eq!(volume_m3(4.5, 14.0), Ok(1.05));
    assert_eq!(volume_m3(6.0, 0.0), Ok(0.0));
    // Three decimals
    assert_eq!(volume_m3(1.0, 1.0), Ok(0.017));
}

#[test]
fn negative_duration_is_an_error() {
    assert_eq!(volume_m3(6.0, -1.0), Err(ImpactError::NegativeDuration(-1.0)));
}

#[test]
fn default_factors_give_94_percent_reduction() {
    let impact = co2e_impact(1.0, 570.0, &ImpactConfig::default());

    assert_eq!(impact.reduction_percent, 94.0);
    assert_eq!(impact.co2e_avoided_kg, 4.5);
    assert_eq!(impact.ch4_avoided_kg, 0.16);
}

#[test]
fn larger_batch_of_effluent() {
    let impact = co2e_impact(10.0, 1000.0, &ImpactConfig::default());
    assert_eq!(impact.co2e_avoided_kg, 78.96);
    assert_eq!(impact.ch4_avoided_kg, 2.82);
}

#[test]
fn impact_scales_linearly_with_volume() {
    let factors = ImpactConfig::default();
    let one = co2e_impact(10.0, 570.0, &factors);
    let two = co2e_impact(20.0, 570.0, &factors);

    assert!((two.co2e_avoided_kg - 2.0 * one.co2e_avoided_kg).abs() < 0.02);
    assert_eq!(one.reduction_percent, two.reduction_percent);
}

#[test]
fn gwp_factor_is_configurable() {
    let base = co2e_impact(10.0, 570.0, &ImpactConfig::default());
    let ar6 = co2e_impact(
        10.0,
        570.0,
        &ImpactConfig {
            gwp_ch4: 29.8,
            ..ImpactConfig::default()
        },
    );

    let ratio = ar6.co2e_avoided_kg / base.co2e_avoided_kg;
    assert!(ratio > 1.06 && ratio < 1.07, "ratio {ratio}");
}

#[test]
fn no_septic_baseline_means_negative_avoidance() {
    let impact = co2e_impact(
        10.0,
        570.0,
        &ImpactConfig {
            mcf_fosse: 0.0,
            ..ImpactConfig::default()
        },
    );

    assert!(impact.co2e_avoided_kg < 0.0);
    assert_eq!(impact.reduction_percent, 0.0);
}

#[test]
fn nothing_treated_means_no_impact() {
    let factors = ImpactConfig::default();
    assert_eq!(co2e_impact(0.0, 570.0, &factors).co2e_avoided_kg, 0.0);
    assert_eq!(co2e_impact(5.0, 0.0, &factors).co2e_avoided_kg, 0.0);
}

//! Quality-aware operation tests.

use serde_json::json;

use super::common::harness;
use crate::utils::ErrorKind;

#[tokio::test]
async fn quality_filter_applies_thresholds() {
    let h = harness().await;
    let output = h
        .engine
        .quality_filtered(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "min_quality_score": 85,
            "confidence_level": "HIGH",
        })).unwrap())
        .await
        .unwrap();

    assert!(!output.rows.is_empty());
    for row in &output.rows {
        assert!(row["quality_score"].as_f64().unwrap() >= 85.0);
        assert_eq!(row["confidence_level"], "HIGH");
        assert!(row["uncertainty_pct"].as_f64().unwrap() <= 20.0);
    }
}

#[tokio::test]
async fn exclude_synthetic_drops_synthetic_rows() {
    let h = harness().await;
    let output = h
        .engine
        .quality_filtered(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "min_quality_score": 0,
            "max_uncertainty": 100,
            "exclude_synthetic": true,
        })).unwrap())
        .await
        .unwrap();

    assert!(!output.rows.is_empty());
    assert!(output.rows.iter().all(|r| r["is_synthetic"] == 0));
    assert!(output.rows.iter().all(|r| r["country_name"] != "France"));
}

#[tokio::test]
async fn quality_filter_without_quality_columns_is_rejected() {
    let h = harness().await;
    let err = h
        .engine
        .quality_filtered(&serde_json::from_value(json!({
            "file_id": "agriculture-country-year",
        })).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert!(err.detail.contains("quality_score"));
    assert!(err.detail.contains("get_data_quality"));
}

#[tokio::test]
async fn invalid_confidence_level_is_rejected() {
    let h = harness().await;
    let err = h
        .engine
        .quality_filtered(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "confidence_level": "VERY_HIGH",
        })).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert!(err.detail.contains("HIGH, MEDIUM, LOW or ALL"));
}

#[tokio::test]
async fn validated_records_parse_and_count_sources() {
    let h = harness().await;
    let output = h
        .engine
        .validated_records(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "min_sources": 3,
            "location": "Germany",
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.rows.len(), 5);
    for row in &output.rows {
        assert_eq!(row["source_count"], 3);
        let sources: Vec<&str> = row["sources"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(serde_json::Value::as_str)
            .collect();
        assert_eq!(sources, vec!["IEA", "UNFCCC", "National Inventory"]);
    }
}

#[tokio::test]
async fn validated_records_min_sources_filters_single_source_rows() {
    let h = harness().await;
    let output = h
        .engine
        .validated_records(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "min_sources": 2,
            "location": "France",
        })).unwrap())
        .await
        .unwrap();
    // France rows carry a single source.
    assert!(output.rows.is_empty());
}

#[tokio::test]
async fn uncertainty_uses_per_row_bounds_when_present() {
    let h = harness().await;
    let output = h
        .engine
        .uncertainty_analysis(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "location": "Germany",
            "year_start": 2023,
            "year_end": 2023,
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.meta["bounds_source"], "per_row");
    let row = &output.rows[0];
    let value = row["emissions_tonnes"].as_f64().unwrap();
    assert_eq!(value, 148.0e6);
    // Germany's per-row uncertainty is 8%.
    assert!((row["lower_bound_95"].as_f64().unwrap() - value * 0.92).abs() < 1.0);
    assert!((row["upper_bound_95"].as_f64().unwrap() - value * 1.08).abs() < 1.0);
}

#[tokio::test]
async fn uncertainty_falls_back_to_the_sector_block() {
    let h = harness().await;
    let output = h
        .engine
        .uncertainty_analysis(&serde_json::from_value(json!({
            "file_id": "agriculture-country-year",
            "location": "Germany",
            "year_start": 2022,
            "year_end": 2023,
            "include_trends": true,
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.meta["bounds_source"], "sector_block");
    let row = &output.rows[0];
    let value = row["emissions_tonnes"].as_f64().unwrap();
    // Agriculture's sector uncertainty is 25%.
    assert!((row["lower_bound_95"].as_f64().unwrap() - value * 0.75).abs() < 1.0);
    assert!((row["upper_bound_95"].as_f64().unwrap() - value * 1.25).abs() < 1.0);
    // Flat series.
    assert_eq!(output.meta["pattern"], "stable");
}

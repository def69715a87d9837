//! Comparative and temporal analytics tests.

use serde_json::{Value, json};

use super::common::harness;
use crate::utils::ErrorKind;

#[tokio::test]
async fn compare_matches_individual_query_totals() {
    let h = harness().await;
    let output = h
        .engine
        .compare(&serde_json::from_value(json!({
            "entities": ["Germany", "France"],
            "sector": "transport",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.rows.len(), 2);
    let by_name = |name: &str| {
        output
            .rows
            .iter()
            .find(|r| r["canonical_name"] == name)
            .and_then(|r| r["emissions_tonnes"].as_f64())
            .unwrap()
    };
    assert_eq!(by_name("Germany"), 148.0e6);
    assert_eq!(by_name("France"), 52.0e6);

    let ranking = output.meta["ranking"].as_array().unwrap();
    assert_eq!(ranking[0]["entity"], "Germany");
    assert_eq!(ranking[0]["rank"], 1);

    let deltas = output.meta["deltas"].as_array().unwrap();
    assert_eq!(deltas[0]["entity"], "France");
    assert_eq!(deltas[0]["absolute_tonnes"].as_f64().unwrap(), 96.0e6);
}

#[tokio::test]
async fn compare_reports_unresolved_entities_with_suggestions() {
    let h = harness().await;
    let output = h
        .engine
        .compare(&serde_json::from_value(json!({
            "entities": ["Germany", "Atlantis"],
            "sector": "transport",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.rows.len(), 1);
    let unresolved = output.meta["unresolved"].as_array().unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0]["entity"], "Atlantis");
    assert_eq!(unresolved[0]["error"], "unresolved");
    assert!(!unresolved[0]["suggestions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn empty_entities_list_is_rejected() {
    let h = harness().await;
    let err = h
        .engine
        .compare(&serde_json::from_value(json!({
            "entities": [],
            "sector": "transport",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn trend_labels_growth_patterns() {
    let h = harness().await;

    // United States: steady growth, CAGR well above the stable band.
    let rising = h
        .engine
        .trend(&serde_json::from_value(json!({
            "entity": "USA",
            "sector": "transport",
            "start_year": 2019,
            "end_year": 2023,
        })).unwrap())
        .await
        .unwrap();
    assert_eq!(rising.meta["pattern"], "increasing");
    assert!(rising.meta["cagr_pct"].as_f64().unwrap() > 1.0);
    assert_eq!(rising.rows.len(), 5);

    // France: steady decline.
    let falling = h
        .engine
        .trend(&serde_json::from_value(json!({
            "entity": "France",
            "sector": "transport",
            "start_year": 2019,
            "end_year": 2023,
        })).unwrap())
        .await
        .unwrap();
    assert_eq!(falling.meta["pattern"], "decreasing");

    // Germany: ends near where it started.
    let flat = h
        .engine
        .trend(&serde_json::from_value(json!({
            "entity": "Germany",
            "sector": "transport",
            "start_year": 2019,
            "end_year": 2023,
        })).unwrap())
        .await
        .unwrap();
    assert_eq!(flat.meta["pattern"], "stable");
}

#[tokio::test]
async fn trend_with_no_rows_is_no_data_found() {
    let h = harness().await;
    let err = h
        .engine
        .trend(&serde_json::from_value(json!({
            "entity": "Germany",
            "sector": "transport",
            "start_year": 2001,
            "end_year": 2003,
        })).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoDataFound);
}

#[tokio::test]
async fn yoy_same_year_is_zero_change_for_nonzero_bases() {
    let h = harness().await;
    let output = h
        .engine
        .yoy(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "key_column": "country_name",
            "base_year": 2023,
            "compare_year": 2023,
        })).unwrap())
        .await
        .unwrap();

    for row in &output.rows {
        assert_eq!(row["abs_change"].as_f64().unwrap(), 0.0);
        let base = row["base_value"].as_f64().unwrap();
        if base != 0.0 {
            assert_eq!(row["pct_change"].as_f64().unwrap(), 0.0);
        }
    }
}

#[tokio::test]
async fn yoy_zero_base_reports_null_percentage() {
    let h = harness().await;
    let output = h
        .engine
        .yoy(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "key_column": "country_name",
            "base_year": 2020,
            "compare_year": 2023,
            "direction": "rise",
        })).unwrap())
        .await
        .unwrap();

    let iceland = output
        .rows
        .iter()
        .find(|r| r["country_name"] == "Iceland")
        .expect("Iceland ranked");
    assert_eq!(iceland["abs_change"].as_f64().unwrap(), 5.0e6);
    assert!(iceland["pct_change"].is_null());
}

#[tokio::test]
async fn yoy_ranks_drops_first() {
    let h = harness().await;
    let output = h
        .engine
        .yoy(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "key_column": "country_name",
            "base_year": 2020,
            "compare_year": 2023,
            "top_n": 5,
            "direction": "drop",
        })).unwrap())
        .await
        .unwrap();

    // France fell; it must lead the drop ranking.
    assert_eq!(output.rows[0]["country_name"], "France");
    assert!(output.rows[0]["abs_change"].as_f64().unwrap() < 0.0);
}

#[tokio::test]
async fn yoy_on_monthly_dataset_is_a_grain_mismatch() {
    let h = harness().await;
    let err = h
        .engine
        .yoy(&serde_json::from_value(json!({
            "file_id": "power-country-month",
            "key_column": "country_name",
            "base_year": 2022,
            "compare_year": 2023,
        })).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::GrainMismatch);
}

#[tokio::test]
async fn monthly_trends_profile_with_peak_and_trough() {
    let h = harness().await;
    let output = h
        .engine
        .monthly_trends(&serde_json::from_value(json!({
            "file_id": "power-country-month",
            "entity_column": "country_name",
            "entity_value": "Germany",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.rows.len(), 12);
    assert_eq!(output.meta["peak_month"], 1);
    assert_eq!(output.meta["trough_month"], 7);

    let share_total: f64 = output
        .rows
        .iter()
        .filter_map(|r| r["share_of_year_pct"].as_f64())
        .sum();
    assert!((share_total - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn monthly_trends_requires_month_grain() {
    let h = harness().await;
    let err = h
        .engine
        .monthly_trends(&serde_json::from_value(json!({
            "file_id": "transport-country-year",
            "entity_column": "country_name",
            "entity_value": "Germany",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::GrainMismatch);
}

#[tokio::test]
async fn seasonal_scores_a_winter_peaking_profile() {
    let h = harness().await;
    let output = h
        .engine
        .seasonal(&serde_json::from_value(json!({
            "file_id": "power-country-month",
            "entity_column": "country_name",
            "entity_value": "Germany",
            "years": [2022, 2023],
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.rows.len(), 12);
    let score = output.meta["seasonality_score"].as_f64().unwrap();
    assert!(score > 0.1, "winter-peaking profile must score seasonal, got {}", score);
}

#[tokio::test]
async fn aggregate_across_sectors_reports_missing_sectors() {
    let h = harness().await;
    let output = h
        .engine
        .aggregate_across_sectors(&serde_json::from_value(json!({
            "entity": "Germany",
            "sectors": "all",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap();

    let with_data: Vec<&str> = output.meta["sectors_with_data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(with_data, vec!["transport", "power", "agriculture"]);

    let missing = output.meta["sectors_missing"].as_array().unwrap();
    assert_eq!(missing.len(), 5);

    let total = output.meta["total_tonnes"].as_f64().unwrap();
    assert_eq!(total, 148.0e6 + 200.0e6 + 50.0e6);
    assert_eq!(output.meta["total_mtco2"].as_f64().unwrap(), total / 1.0e6);
}

#[tokio::test]
async fn aggregate_rejects_empty_sector_list() {
    let h = harness().await;
    let err = h
        .engine
        .aggregate_across_sectors(&serde_json::from_value(json!({
            "entity": "Germany",
            "sectors": [],
            "year": 2023,
        })).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

//! Smart query and cascade tests: alias normalisation, fuzzy matching and
//! the city -> admin1 -> country fallback with its observable trace.

use serde_json::json;

use super::common::harness;

#[tokio::test]
async fn alias_resolves_to_canonical_before_querying() {
    let h = harness().await;
    let output = h
        .engine
        .smart_query(&serde_json::from_value(json!({
            "entity": "USA",
            "sector": "transport",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.meta["resolved_entity"]["canonical_name"], "United States of America");
    assert_eq!(output.meta["actual_level"], "country");
    assert_eq!(output.rows[0]["country_name"], "United States of America");
}

#[tokio::test]
async fn typo_is_fuzzy_matched_with_suggestions() {
    let h = harness().await;
    let output = h
        .engine
        .smart_query(&serde_json::from_value(json!({
            "entity": "Germny",
            "sector": "transport",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap();

    let resolved = &output.meta["resolved_entity"];
    assert_eq!(resolved["canonical_name"], "Germany");
    assert!(resolved["similarity"].as_f64().unwrap() >= 0.75);
    assert_eq!(resolved["suggestions"][0], "Germany");
    assert_eq!(output.rows[0]["emissions_tonnes"].as_f64().unwrap(), 148.0e6);
}

#[tokio::test]
async fn city_without_rows_cascades_to_admin1() {
    let h = harness().await;
    // Munich has no city-level rows; Bavaria does at admin1.
    let output = h
        .engine
        .smart_query(&serde_json::from_value(json!({
            "entity": "Munich",
            "sector": "transport",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.meta["requested_level"], "city");
    assert_eq!(output.meta["actual_level"], "admin1");
    assert_eq!(output.rows[0]["admin1_name"], "Bavaria");

    let trace = output.meta["fallback_trace"].as_array().unwrap();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0]["level"], "city");
    assert_eq!(trace[0]["status"], "no_data");
    assert_eq!(trace[0]["entity"], "Munich");
    assert_eq!(trace[1]["level"], "admin1");
    assert_eq!(trace[1]["status"], "ok");
    assert_eq!(trace[1]["entity"], "Bavaria");
}

#[tokio::test]
async fn fallback_disabled_stays_at_the_detected_level() {
    let h = harness().await;
    let output = h
        .engine
        .smart_query(&serde_json::from_value(json!({
            "entity": "Munich",
            "sector": "transport",
            "year": 2023,
            "enable_fallback": false,
        })).unwrap())
        .await
        .unwrap();

    assert!(output.rows.is_empty());
    assert!(output.meta["actual_level"].is_null());
    let trace = output.meta["fallback_trace"].as_array().unwrap();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0]["level"], "city");
}

#[tokio::test]
async fn city_with_rows_answers_at_city_level() {
    let h = harness().await;
    let output = h
        .engine
        .smart_query(&serde_json::from_value(json!({
            "entity": "Berlin",
            "sector": "transport",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap();

    assert_eq!(output.meta["actual_level"], "city");
    let trace = output.meta["fallback_trace"].as_array().unwrap();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0]["status"], "ok");
}

#[tokio::test]
async fn missing_dataset_levels_are_recorded_in_the_trace() {
    let h = harness().await;
    // Power only exists at country level; a city entity must record the
    // missing datasets on its way down.
    let output = h
        .engine
        .smart_query(&serde_json::from_value(json!({
            "entity": "Munich",
            "sector": "power",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap();

    let trace = output.meta["fallback_trace"].as_array().unwrap();
    assert_eq!(trace[0]["status"], "dataset_missing");
    assert_eq!(trace[1]["status"], "dataset_missing");
    assert_eq!(trace[2]["status"], "ok");
    assert_eq!(output.meta["actual_level"], "country");
    assert_eq!(output.rows[0]["country_name"], "Germany");
}

#[tokio::test]
async fn unresolvable_entity_fails_with_suggestions() {
    let h = harness().await;
    let err = h
        .engine
        .smart_query(&serde_json::from_value(json!({
            "entity": "Xqzvwt",
            "sector": "transport",
            "year": 2023,
        })).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, crate::utils::ErrorKind::EntityUnresolved);
    assert!(!err.suggestions.is_empty());
}

#[tokio::test]
async fn no_data_anywhere_returns_the_full_trace() {
    let h = harness().await;
    // 2005 is inside coverage but the fixture has no rows for it.
    let output = h
        .engine
        .smart_query(&serde_json::from_value(json!({
            "entity": "Munich",
            "sector": "transport",
            "year": 2005,
        })).unwrap())
        .await
        .unwrap();

    assert!(output.rows.is_empty());
    let trace = output.meta["fallback_trace"].as_array().unwrap();
    assert_eq!(trace.len(), 3);
    assert!(trace.iter().all(|s| s["status"] == "no_data"));
    assert!(output.meta["warnings"].as_array().unwrap()[0]
        .as_str()
        .unwrap()
        .contains("no data"));
}

//! Catalog integration tests against the seeded manifest.

use super::common::harness;
use crate::utils::ErrorKind;

#[tokio::test]
async fn every_listed_dataset_has_a_resolvable_schema() {
    let h = harness().await;
    let listed = h.catalog.list_datasets();
    assert_eq!(listed.len(), 6);

    for dataset in listed {
        let file_id = dataset.file_id.to_string();
        let schema = h.catalog.schema(&file_id).expect("schema resolves");
        assert_eq!(schema.file_id, dataset.file_id);
        assert!(!schema.columns.is_empty());
    }
}

#[tokio::test]
async fn listing_is_sorted_by_file_id() {
    let h = harness().await;
    let ids: Vec<String> = h
        .catalog
        .list_datasets()
        .iter()
        .map(|d| d.file_id.to_string())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn unknown_dataset_reports_nearest_matches() {
    let h = harness().await;
    let err = h.catalog.schema("transport-country-yr").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownDataset);
    assert_eq!(
        err.suggestions.first().map(String::as_str),
        Some("transport-country-year")
    );
}

#[tokio::test]
async fn unknown_column_reports_nearest_matches() {
    let h = harness().await;
    let err = h
        .catalog
        .resolve_columns("transport-country-year", &["emisions_tonnes".to_string()])
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownColumn);
    assert_eq!(
        err.suggestions.first().map(String::as_str),
        Some("emissions_tonnes")
    );
}

#[tokio::test]
async fn per_row_quality_is_feature_detected() {
    let h = harness().await;
    assert!(h.catalog.schema("transport-country-year").unwrap().has_per_row_quality());
    assert!(!h.catalog.schema("agriculture-country-year").unwrap().has_per_row_quality());
}

#[tokio::test]
async fn quality_metadata_echoes_the_block_verbatim() {
    let h = harness().await;
    let metadata = h.catalog.quality_metadata(crate::models::Sector::Transport).unwrap();
    assert_eq!(metadata.quality_score, 85);
    assert_eq!(metadata.uncertainty_pct, 12.0);
    assert_eq!(metadata.external_sources, vec!["IEA".to_string(), "UNFCCC".to_string()]);
    assert_eq!(metadata.data_version, "EDGAR v2024");
}

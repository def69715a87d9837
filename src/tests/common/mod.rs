//! Shared test fixtures: a seeded temp-file warehouse and its manifest.
//!
//! The warehouse is written once with a writable connection, then opened
//! read-only through the gateway exactly as production does.

use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;

use crate::config::{CacheConfig, ResolverConfig, WarehouseConfig};
use crate::models::Manifest;
use crate::services::{Catalog, EntityResolver, QueryEngine, ToolSurface, WarehouseGateway};

pub struct TestHarness {
    // Held so the temp dir outlives the pool.
    pub _dir: tempfile::TempDir,
    pub catalog: Arc<Catalog>,
    pub resolver: Arc<EntityResolver>,
    pub gateway: Arc<WarehouseGateway>,
    pub engine: Arc<QueryEngine>,
    pub surface: Arc<ToolSurface>,
}

pub async fn harness() -> TestHarness {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db_path = dir.path().join("warehouse.db");
    seed_warehouse(&db_path).await;

    let warehouse_config = WarehouseConfig {
        db_path: db_path.to_string_lossy().to_string(),
        manifest_path: String::new(),
        pool_size: 2,
        max_overflow: 1,
        acquire_timeout_secs: 2,
        query_timeout_secs: 5,
    };
    let cache_config = CacheConfig { size: 100, ttl_seconds: 60 };

    let catalog = Arc::new(
        Catalog::from_manifest(sample_manifest()).expect("manifest is valid"),
    );
    let resolver = Arc::new(EntityResolver::from_config(&ResolverConfig::default()).unwrap());
    let gateway = Arc::new(
        WarehouseGateway::open(&warehouse_config, &cache_config)
            .await
            .expect("open warehouse"),
    );
    let engine = Arc::new(QueryEngine::new(
        Arc::clone(&catalog),
        Arc::clone(&resolver),
        Arc::clone(&gateway),
    ));
    let surface = Arc::new(ToolSurface::new(Arc::clone(&engine)));

    TestHarness { _dir: dir, catalog, resolver, gateway, engine, surface }
}

pub fn sample_manifest() -> Manifest {
    let quality_columns = json!([
        {"name": "quality_score", "kind": "quality-score"},
        {"name": "confidence_level", "kind": "confidence-tier"},
        {"name": "uncertainty_pct", "kind": "uncertainty-pct"},
        {"name": "uncertainty_low", "kind": "measure-tonnes"},
        {"name": "uncertainty_high", "kind": "measure-tonnes"},
        {"name": "is_synthetic", "kind": "flag"},
        {"name": "data_source", "kind": "string"},
        {"name": "validation_status", "kind": "string"},
    ]);
    let mut transport_columns = vec![
        json!({"name": "country_name", "kind": "identifier"}),
        json!({"name": "iso3", "kind": "categorical"}),
        json!({"name": "year", "kind": "integer-year"}),
        json!({"name": "emissions_tonnes", "kind": "measure-tonnes"}),
        json!({"name": "emissions_mt", "kind": "measure-mt"}),
    ];
    transport_columns.extend(quality_columns.as_array().unwrap().iter().cloned());

    let manifest = json!({
        "data_version": "EDGAR v2024",
        "datasets": [
            {
                "file_id": "transport-country-year",
                "physical_table": "transport_country_year",
                "columns": transport_columns,
                "start_year": 2000,
                "end_year": 2023,
                "spatial_coverage": "global",
            },
            {
                "file_id": "transport-admin1-year",
                "physical_table": "transport_admin1_year",
                "columns": [
                    {"name": "admin1_name", "kind": "identifier"},
                    {"name": "year", "kind": "integer-year"},
                    {"name": "emissions_tonnes", "kind": "measure-tonnes"},
                ],
                "start_year": 2000,
                "end_year": 2023,
            },
            {
                "file_id": "transport-city-year",
                "physical_table": "transport_city_year",
                "columns": [
                    {"name": "city_name", "kind": "identifier"},
                    {"name": "year", "kind": "integer-year"},
                    {"name": "emissions_tonnes", "kind": "measure-tonnes"},
                ],
                "start_year": 2000,
                "end_year": 2023,
            },
            {
                "file_id": "power-country-year",
                "physical_table": "power_country_year",
                "columns": [
                    {"name": "country_name", "kind": "identifier"},
                    {"name": "year", "kind": "integer-year"},
                    {"name": "emissions_tonnes", "kind": "measure-tonnes"},
                ],
                "start_year": 2000,
                "end_year": 2023,
            },
            {
                "file_id": "power-country-month",
                "physical_table": "power_country_month",
                "columns": [
                    {"name": "country_name", "kind": "identifier"},
                    {"name": "year", "kind": "integer-year"},
                    {"name": "month", "kind": "integer-month"},
                    {"name": "emissions_tonnes", "kind": "measure-tonnes"},
                ],
                "start_year": 2000,
                "end_year": 2023,
            },
            {
                "file_id": "agriculture-country-year",
                "physical_table": "agriculture_country_year",
                "columns": [
                    {"name": "country_name", "kind": "identifier"},
                    {"name": "year", "kind": "integer-year"},
                    {"name": "emissions_tonnes", "kind": "measure-tonnes"},
                ],
                "start_year": 2000,
                "end_year": 2023,
            },
        ],
        "sector_quality": {
            "transport": {
                "quality_score": 85,
                "tier": "Tier 1 (Excellent)",
                "confidence_tier": "HIGH",
                "uncertainty_pct": 12.0,
                "external_sources": ["IEA", "UNFCCC"],
                "records_enhanced": 1200,
                "synthetic_percent": 2.5,
                "notes": "Road transport dominates; validated against IEA energy balances.",
            },
            "power": {
                "quality_score": 78,
                "tier": "Tier 2 (Good)",
                "confidence_tier": "MEDIUM",
                "uncertainty_pct": 18.0,
                "external_sources": ["IEA", "Ember"],
            },
            "agriculture": {
                "quality_score": 70,
                "tier": "Tier 3 (Fair)",
                "confidence_tier": "MEDIUM",
                "uncertainty_pct": 25.0,
                "external_sources": ["FAO"],
            },
        },
    });
    serde_json::from_value(manifest).expect("sample manifest deserialises")
}

async fn seed_warehouse(path: &Path) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("create warehouse file");

    sqlx::query(
        r#"
        CREATE TABLE transport_country_year (
            country_name TEXT NOT NULL,
            iso3 TEXT,
            year INTEGER NOT NULL,
            emissions_tonnes REAL NOT NULL,
            emissions_mt REAL NOT NULL,
            quality_score REAL NOT NULL,
            confidence_level TEXT NOT NULL,
            uncertainty_pct REAL NOT NULL,
            uncertainty_low REAL NOT NULL,
            uncertainty_high REAL NOT NULL,
            is_synthetic INTEGER NOT NULL DEFAULT 0,
            data_source TEXT NOT NULL,
            validation_status TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("create transport_country_year");

    // (country, iso3, year, tonnes, quality, confidence, uncertainty,
    //  synthetic, sources)
    let transport_rows: Vec<(&str, &str, i64, f64, f64, &str, f64, i64, &str)> = vec![
        ("Germany", "DEU", 2019, 150.0e6, 90.0, "HIGH", 8.0, 0, "IEA | UNFCCC | National Inventory"),
        ("Germany", "DEU", 2020, 140.0e6, 90.0, "HIGH", 8.0, 0, "IEA | UNFCCC | National Inventory"),
        ("Germany", "DEU", 2021, 145.0e6, 91.0, "HIGH", 8.0, 0, "IEA | UNFCCC | National Inventory"),
        ("Germany", "DEU", 2022, 150.0e6, 92.0, "HIGH", 8.0, 0, "IEA | UNFCCC | National Inventory"),
        ("Germany", "DEU", 2023, 148.0e6, 92.0, "HIGH", 8.0, 0, "IEA | UNFCCC | National Inventory"),
        ("France", "FRA", 2019, 60.0e6, 80.0, "MEDIUM", 18.0, 1, "IEA"),
        ("France", "FRA", 2020, 58.0e6, 80.0, "MEDIUM", 18.0, 1, "IEA"),
        ("France", "FRA", 2021, 56.0e6, 80.0, "MEDIUM", 18.0, 1, "IEA"),
        ("France", "FRA", 2022, 54.0e6, 80.0, "MEDIUM", 18.0, 1, "IEA"),
        ("France", "FRA", 2023, 52.0e6, 80.0, "MEDIUM", 18.0, 1, "IEA"),
        ("United States of America", "USA", 2019, 100.0e6, 88.0, "HIGH", 10.0, 0, "IEA | UNFCCC"),
        ("United States of America", "USA", 2020, 110.0e6, 88.0, "HIGH", 10.0, 0, "IEA | UNFCCC"),
        ("United States of America", "USA", 2021, 120.0e6, 88.0, "HIGH", 10.0, 0, "IEA | UNFCCC"),
        ("United States of America", "USA", 2022, 130.0e6, 88.0, "HIGH", 10.0, 0, "IEA | UNFCCC"),
        ("United States of America", "USA", 2023, 140.0e6, 88.0, "HIGH", 10.0, 0, "IEA | UNFCCC"),
        ("Iceland", "ISL", 2020, 0.0, 75.0, "LOW", 30.0, 1, "IEA"),
        ("Iceland", "ISL", 2023, 5.0e6, 75.0, "LOW", 30.0, 1, "IEA"),
    ];
    for (country, iso3, year, tonnes, quality, confidence, uncertainty, synthetic, sources) in
        transport_rows
    {
        sqlx::query(
            r#"
            INSERT INTO transport_country_year
                (country_name, iso3, year, emissions_tonnes, emissions_mt,
                 quality_score, confidence_level, uncertainty_pct,
                 uncertainty_low, uncertainty_high, is_synthetic,
                 data_source, validation_status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'validated')
            "#,
        )
        .bind(country)
        .bind(iso3)
        .bind(year)
        .bind(tonnes)
        .bind(tonnes / 1.0e6)
        .bind(quality)
        .bind(confidence)
        .bind(uncertainty)
        .bind(tonnes * (1.0 - uncertainty / 100.0))
        .bind(tonnes * (1.0 + uncertainty / 100.0))
        .bind(synthetic)
        .bind(sources)
        .execute(&pool)
        .await
        .expect("insert transport row");
    }

    sqlx::query(
        "CREATE TABLE transport_admin1_year (admin1_name TEXT NOT NULL, year INTEGER NOT NULL, emissions_tonnes REAL NOT NULL)",
    )
    .execute(&pool)
    .await
    .expect("create transport_admin1_year");
    for (admin1, year, tonnes) in
        [("Bavaria", 2023_i64, 30.0e6), ("Bavaria", 2022, 31.0e6), ("California", 2023, 80.0e6)]
    {
        sqlx::query("INSERT INTO transport_admin1_year VALUES (?, ?, ?)")
            .bind(admin1)
            .bind(year)
            .bind(tonnes)
            .execute(&pool)
            .await
            .expect("insert admin1 row");
    }

    sqlx::query(
        "CREATE TABLE transport_city_year (city_name TEXT NOT NULL, year INTEGER NOT NULL, emissions_tonnes REAL NOT NULL)",
    )
    .execute(&pool)
    .await
    .expect("create transport_city_year");
    sqlx::query("INSERT INTO transport_city_year VALUES ('Berlin', 2023, 8000000.0)")
        .execute(&pool)
        .await
        .expect("insert city row");

    sqlx::query(
        "CREATE TABLE power_country_year (country_name TEXT NOT NULL, year INTEGER NOT NULL, emissions_tonnes REAL NOT NULL)",
    )
    .execute(&pool)
    .await
    .expect("create power_country_year");
    for (year, tonnes) in [(2022_i64, 210.0e6), (2023, 200.0e6)] {
        sqlx::query("INSERT INTO power_country_year VALUES ('Germany', ?, ?)")
            .bind(year)
            .bind(tonnes)
            .execute(&pool)
            .await
            .expect("insert power row");
    }

    sqlx::query(
        "CREATE TABLE power_country_month (country_name TEXT NOT NULL, year INTEGER NOT NULL, month INTEGER NOT NULL, emissions_tonnes REAL NOT NULL)",
    )
    .execute(&pool)
    .await
    .expect("create power_country_month");
    // Winter-peaking profile: January highest, July lowest.
    let monthly = [12.0, 11.0, 10.0, 9.0, 8.0, 7.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0];
    for year in [2022_i64, 2023] {
        for (index, base) in monthly.iter().enumerate() {
            sqlx::query("INSERT INTO power_country_month VALUES ('Germany', ?, ?, ?)")
                .bind(year)
                .bind(index as i64 + 1)
                .bind(base * 1.0e6)
                .execute(&pool)
                .await
                .expect("insert monthly row");
        }
    }

    sqlx::query(
        "CREATE TABLE agriculture_country_year (country_name TEXT NOT NULL, year INTEGER NOT NULL, emissions_tonnes REAL NOT NULL)",
    )
    .execute(&pool)
    .await
    .expect("create agriculture_country_year");
    for year in 2019_i64..=2023 {
        sqlx::query("INSERT INTO agriculture_country_year VALUES ('Germany', ?, 50000000.0)")
            .bind(year)
            .execute(&pool)
            .await
            .expect("insert agriculture row");
    }

    pool.close().await;
}

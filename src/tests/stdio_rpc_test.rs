//! Stdio JSON-RPC transport tests, driven through `handle_line` without a
//! real stdin.

use serde_json::{Value, json};

use super::common::harness;
use crate::services::tools::{catalog_listing, stdio};

#[tokio::test]
async fn initialize_lists_the_tool_catalog() {
    let h = harness().await;
    let response = stdio::handle_line(
        &h.surface,
        r#"{"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}"#,
    )
    .await
    .expect("response owed");

    assert_eq!(response["id"], 1);
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 14);
    assert!(tools.iter().any(|t| t["name"] == "metrics.yoy"));
}

#[tokio::test]
async fn tools_list_matches_the_shared_catalog() {
    let h = harness().await;
    let response = stdio::handle_line(
        &h.surface,
        r#"{"jsonrpc": "2.0", "id": 2, "method": "tools/list"}"#,
    )
    .await
    .unwrap();

    // Byte-identical catalog across transports.
    assert_eq!(response["result"], catalog_listing());
}

#[tokio::test]
async fn tools_call_runs_a_query() {
    let h = harness().await;
    let request = json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/call",
        "params": {
            "name": "query",
            "arguments": {
                "file_id": "transport-country-year",
                "select": ["country_name", "year", "emissions_tonnes"],
                "where": {"country_name": "Germany", "year": 2023},
            },
        },
    });
    let response = stdio::handle_line(&h.surface, &request.to_string())
        .await
        .unwrap();

    let rows = response["result"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["emissions_tonnes"].as_f64().unwrap(), 148.0e6);
    assert_eq!(response["result"]["meta"]["quality_metadata"]["quality_score"], 85);
}

#[tokio::test]
async fn abbreviated_parameter_is_rejected_over_rpc() {
    let h = harness().await;
    let request = json!({
        "jsonrpc": "2.0",
        "id": 4,
        "method": "tools/call",
        "params": {
            "name": "metrics.yoy",
            "arguments": {
                "file_id": "transport-country-year",
                "key_col": "country_name",
                "base_year": 2020,
                "compare_year": 2023,
            },
        },
    });
    let response = stdio::handle_line(&h.surface, &request.to_string())
        .await
        .unwrap();

    let error = &response["error"];
    assert_eq!(error["code"], -32602);
    assert!(error["message"].as_str().unwrap().contains("key_col"));
    assert_eq!(error["data"]["kind"], "InvalidArgument");
    assert_eq!(error["data"]["suggestions"][0], "key_column");
}

#[tokio::test]
async fn unknown_tool_gets_nearest_suggestions() {
    let h = harness().await;
    let request = json!({
        "jsonrpc": "2.0",
        "id": 5,
        "method": "tools/call",
        "params": {"name": "smart_query", "arguments": {}},
    });
    let response = stdio::handle_line(&h.surface, &request.to_string())
        .await
        .unwrap();
    assert_eq!(
        response["error"]["data"]["suggestions"][0],
        "smart_query_emissions"
    );
}

#[tokio::test]
async fn notifications_get_no_response() {
    let h = harness().await;
    let response = stdio::handle_line(
        &h.surface,
        r#"{"jsonrpc": "2.0", "method": "tools/list"}"#,
    )
    .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn parse_errors_answer_with_null_id() {
    let h = harness().await;
    let response = stdio::handle_line(&h.surface, "not json at all")
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);
}

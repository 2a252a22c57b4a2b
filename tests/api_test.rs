//! Status API integration tests

use anyhow::Result;
use axum::http::StatusCode;
use axum_test::TestServer;
use revchain::api::create_router;
use revchain_core::store::SchemaStore;
use revchain_core::{
    plan, resolve_chain, Chain, ColumnSpec, ColumnType, Executor, Operation, Revision, SqliteStore,
    Target,
};
use serde_json::Value;

fn app_chain() -> Chain {
    resolve_chain(vec![
        Revision::new("R1", None)
            .with_message("add last_seen to users")
            .upgrade(Operation::AddColumn {
                table: "users".into(),
                column: ColumnSpec::new("last_seen", ColumnType::DateTime),
            }),
        Revision::new("R2", Some("R1".into()))
            .with_message("add pautas to meetings")
            .upgrade(Operation::AddColumn {
                table: "meetings".into(),
                column: ColumnSpec::new("pautas", ColumnType::Text),
            }),
    ])
    .expect("chain should resolve")
}

/// Store with the application tables and `R1` applied.
fn store_at_r1(chain: &Chain) -> Result<SqliteStore> {
    let mut store = SqliteStore::open_in_memory()?;
    store.connection().execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY);
         CREATE TABLE meetings (id INTEGER PRIMARY KEY);",
    )?;
    let p = plan(None, &Target::Revision("R1".into()), chain)?;
    assert!(Executor::new(&mut store).run_plan(&p).is_success());
    Ok(store)
}

fn setup_test_server() -> Result<TestServer> {
    let chain = app_chain();
    let store = store_at_r1(&chain)?;
    let server = TestServer::new(create_router(store, chain))?;
    Ok(server)
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let server = setup_test_server()?;

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["service"], "revchain");
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_status_reports_pending_revisions() -> Result<()> {
    let server = setup_test_server()?;

    let response = server.get("/api/v1/status").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["current"], "R1");
    assert_eq!(body["head"], "R2");
    assert_eq!(body["pending"], serde_json::json!(["R2"]));
    assert_eq!(body["up_to_date"], false);

    Ok(())
}

#[tokio::test]
async fn test_chain_marks_applied_revisions() -> Result<()> {
    let server = setup_test_server()?;

    let response = server.get("/api/v1/chain").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let entries: Vec<Value> = response.json();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], "R1");
    assert_eq!(entries[0]["parent_id"], Value::Null);
    assert_eq!(entries[0]["applied"], true);
    assert_eq!(entries[0]["current"], true);
    assert_eq!(entries[1]["id"], "R2");
    assert_eq!(entries[1]["applied"], false);
    assert_eq!(entries[1]["upgrade_ops"], 1);

    Ok(())
}

#[tokio::test]
async fn test_history_lists_committed_steps() -> Result<()> {
    let server = setup_test_server()?;

    let response = server.get("/api/v1/history").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let history: Vec<Value> = response.json();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["revision_id"], "R1");
    assert_eq!(history[0]["direction"], "upgrade");
    assert_eq!(history[0]["marker_before"], Value::Null);

    Ok(())
}

#[tokio::test]
async fn test_marker_outside_chain_is_a_conflict() -> Result<()> {
    let chain = app_chain();
    let mut store = SqliteStore::open_in_memory()?;
    {
        let mut tx = store.begin()?;
        tx.set_marker(Some(&"orphan".into()))?;
        tx.commit()?;
    }
    let server = TestServer::new(create_router(store, chain))?;

    let response = server.get("/api/v1/status").await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("orphan"));

    Ok(())
}

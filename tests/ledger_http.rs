use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use tally::{
    LedgerConfig, LedgerHttpState, LedgerStateFile, MemoryBalanceStore, MemoryHistoryStore,
    PointLedger, TransactionRecord, UserBalance,
};
use tower::util::ServiceExt;

fn new_ledger() -> PointLedger {
    PointLedger::new(
        LedgerConfig::default(),
        Arc::new(MemoryBalanceStore::new()),
        Arc::new(MemoryHistoryStore::new()),
    )
}

fn patch_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn ledger_http_routes_and_metrics() -> tally::Result<()> {
    let ledger = new_ledger();
    ledger.seed_account(1, 0).await.unwrap();
    let app = tally::ledger::http::router(LedgerHttpState::new(ledger));

    let response = app
        .clone()
        .oneshot(patch_json("/point/1/charge", json!({ "amount": 100 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let charged: UserBalance = serde_json::from_slice(&body)?;
    assert_eq!(charged.id, 1);
    assert_eq!(charged.amount, 100);

    let response = app
        .clone()
        .oneshot(patch_json("/point/1/use", json!({ "amount": 40 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let used: UserBalance = serde_json::from_slice(&body)?;
    assert_eq!(used.amount, 60);

    let response = app.clone().oneshot(get("/point/1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let queried: UserBalance = serde_json::from_slice(&body)?;
    assert_eq!(queried.amount, 60);

    let response = app.clone().oneshot(get("/point/1/histories")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let records: Vec<TransactionRecord> = serde_json::from_slice(&body)?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].amount, 100);
    assert_eq!(records[1].amount, 40);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let metrics: Value = serde_json::from_slice(&body)?;
    assert_eq!(metrics["charges"], json!(1));
    assert_eq!(metrics["uses"], json!(1));
    assert_eq!(metrics["key_locks"], json!(0));

    Ok(())
}

#[tokio::test]
async fn ledger_http_maps_domain_errors() -> tally::Result<()> {
    let ledger = new_ledger();
    ledger.seed_account(1, 50).await.unwrap();
    let app = tally::ledger::http::router(LedgerHttpState::new(ledger));

    let response = app
        .clone()
        .oneshot(patch_json("/point/9/charge", json!({ "amount": 100 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["error"]["code"], json!("user_not_found"));

    let response = app
        .clone()
        .oneshot(patch_json("/point/1/charge", json!({ "amount": 1001 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["error"]["code"], json!("invalid_amount"));

    let response = app
        .clone()
        .oneshot(patch_json("/point/1/use", json!({ "amount": 51 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["error"]["code"], json!("insufficient_balance"));

    // Balance untouched by any of the rejected calls.
    let response = app.clone().oneshot(get("/point/1")).await.unwrap();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let balance: UserBalance = serde_json::from_slice(&body)?;
    assert_eq!(balance.amount, 50);

    // Malformed path id and missing body field are rejected by extractors.
    let response = app.clone().oneshot(get("/point/tt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(patch_json("/point/1/charge", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    Ok(())
}

#[tokio::test]
async fn admin_routes_require_configuration_and_token() -> tally::Result<()> {
    // Without an admin token the route is not mounted at all.
    let app = tally::ledger::http::router(LedgerHttpState::new(new_ledger()));
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/admin/accounts/1")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "amount": 0 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let app = tally::ledger::http::router(
        LedgerHttpState::new(new_ledger()).with_admin_token("admin-token"),
    );

    let unauthorized = Request::builder()
        .method("PUT")
        .uri("/admin/accounts/1")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "amount": 500 }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(unauthorized).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .method("PUT")
        .uri("/admin/accounts/1")
        .header("content-type", "application/json")
        .header("x-admin-token", "admin-token")
        .body(Body::from(json!({ "amount": 500 }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(authorized).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let seeded: UserBalance = serde_json::from_slice(&body)?;
    assert_eq!(seeded.amount, 500);

    let response = app.clone().oneshot(get("/point/1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn admin_upsert_persists_state_file() -> tally::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger-state.json");

    let app = tally::ledger::http::router(
        LedgerHttpState::new(new_ledger())
            .with_admin_token("admin-token")
            .with_state_file(&path),
    );

    for (id, amount) in [(1, 300), (2, 0), (1, 700)] {
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/admin/accounts/{id}"))
            .header("content-type", "application/json")
            .header("x-admin-token", "admin-token")
            .body(Body::from(json!({ "amount": amount }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let saved = LedgerStateFile::load(&path).unwrap();
    assert_eq!(saved.accounts.len(), 2);
    assert_eq!(saved.accounts[0].id, 1);
    assert_eq!(saved.accounts[0].amount, 700);
    assert_eq!(saved.accounts[1].id, 2);
    assert_eq!(saved.accounts[1].amount, 0);

    Ok(())
}

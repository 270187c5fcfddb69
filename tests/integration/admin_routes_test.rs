use crate::common::{setup_test_db, test_config, unique_email};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use credit_ledger::{
    config::Config,
    models::owner::Owner,
    routes::create_router,
    services::{BalanceAggregator, DirectoryService},
    AppState,
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    db: DatabaseConnection,
    router: Router,
    directory: DirectoryService,
}

async fn setup_app() -> TestApp {
    setup_app_with(test_config()).await
}

async fn setup_app_with(config: Config) -> TestApp {
    let db = setup_test_db().await;
    let state = AppState::with_connection(db.clone(), config);

    TestApp {
        router: create_router(state),
        directory: DirectoryService::new(db.clone()),
        db,
    }
}

async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn credits_uri(user_id: Uuid) -> String {
    format!("/admin/users/{}/tools/credits", user_id)
}

#[tokio::test]
async fn test_panel_for_new_user() {
    let app = setup_app().await;
    let user = app.directory.create_user(&unique_email()).await.unwrap();

    let (status, body) = send(&app, Method::GET, &credits_uri(user.id), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let panel = &body["data"];
    assert_eq!(panel["unspentCredits"], 0);
    assert_eq!(panel["availableLabel"], "0 available user credits");
    assert_eq!(panel["addCredits"]["id"], "user_credits_add");
    assert_eq!(panel["addCredits"]["action"], credits_uri(user.id));
    assert!(panel["removeCredits"].is_null());
    assert!(panel["organizationCredits"].is_null());
}

#[tokio::test]
async fn test_adding_one_credit_updates_panel() {
    let app = setup_app().await;
    let user = app.directory.create_user(&unique_email()).await.unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &credits_uri(user.id),
        Some(json!({ "operation": "add", "amount": 1, "reason": "support ticket" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unspentCredits"], 1);
    assert_eq!(body["data"]["owner"], json!({ "kind": "user", "id": user.id }));

    let (_, body) = send(&app, Method::GET, &credits_uri(user.id), None).await;
    assert_eq!(body["data"]["availableLabel"], "1 available user credit");
    assert_eq!(body["data"]["removeCredits"]["id"], "user_credits_remove");
}

#[tokio::test]
async fn test_adjustment_errors_map_to_status_codes() {
    let app = setup_app().await;
    let user = app.directory.create_user(&unique_email()).await.unwrap();
    let uri = credits_uri(user.id);

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "operation": "remove", "amount": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_CREDITS");

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "scope": "organization", "operation": "add", "amount": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NO_ORGANIZATION");

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "operation": "add", "amount": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "operation": "add", "amount": 2, "reason": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // None of the rejected requests touched the ledger
    let (_, body) = send(&app, Method::GET, &format!("{}/transactions", uri), None).await;
    assert_eq!(body["data"]["transactions"], json!([]));
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let app = setup_app().await;

    let (status, body) = send(&app, Method::GET, &credits_uri(Uuid::new_v4()), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_organization_member_sees_organization_forms() {
    let app = setup_app().await;
    let user = app.directory.create_user(&unique_email()).await.unwrap();
    let organization = app.directory.create_organization("Acme").await.unwrap();
    app.directory
        .add_membership(user.id, organization.id)
        .await
        .unwrap();

    let (status, body) = send(&app, Method::GET, &credits_uri(user.id), None).await;
    assert_eq!(status, StatusCode::OK);

    let section = &body["data"]["organizationCredits"];
    assert_eq!(section["organizationId"], json!(organization.id));
    assert_eq!(section["add"]["id"], "org_credits_add");
    assert_eq!(section["remove"]["id"], "org_credits_remove");
    assert_eq!(section["add"]["scope"], "organization");

    let (status, body) = send(
        &app,
        Method::POST,
        &credits_uri(user.id),
        Some(json!({ "scope": "organization", "operation": "add", "amount": 25 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["owner"],
        json!({ "kind": "organization", "id": organization.id })
    );

    // The user's own balance is unchanged
    let (_, body) = send(&app, Method::GET, &credits_uri(user.id), None).await;
    assert_eq!(body["data"]["unspentCredits"], 0);
}

#[tokio::test]
async fn test_transactions_endpoint_lists_history() {
    let app = setup_app().await;
    let user = app.directory.create_user(&unique_email()).await.unwrap();
    let uri = credits_uri(user.id);

    for (operation, amount) in [("add", 5), ("remove", 2)] {
        let (status, _) = send(
            &app,
            Method::POST,
            &uri,
            Some(json!({ "operation": operation, "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, Method::GET, &format!("{}/transactions", uri), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unspentCredits"], 3);
    let transactions = body["data"]["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0]["amount"], 5);
    assert_eq!(transactions[1]["amount"], -2);
    assert_eq!(transactions[1]["sequence"], 2);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = setup_app().await;
    let user = app.directory.create_user(&unique_email()).await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(credits_uri(user.id))
                .header("x-request-id", "test-request-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "test-request-1");
}

#[tokio::test]
async fn test_oversized_body_is_rejected_with_error_envelope() {
    let app = setup_app().await;
    let user = app.directory.create_user(&unique_email()).await.unwrap();

    let padding = "x".repeat(70 * 1024);
    let (status, body) = send(
        &app,
        Method::POST,
        &credits_uri(user.id),
        Some(json!({ "operation": "add", "amount": 1, "reason": padding })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_request_times_out() {
    let mut config = test_config();
    config.server.request_timeout_ms = 200;
    let app = setup_app_with(config).await;
    let user = app.directory.create_user(&unique_email()).await.unwrap();

    // Keep the user's balance busy so the adjustment cannot finish in time
    let aggregator = BalanceAggregator::new(app.db.clone());
    let txn = app.db.begin().await.unwrap();
    aggregator
        .lock_for_update(&txn, Owner::User(user.id))
        .await
        .unwrap();

    let (status, _) = send(
        &app,
        Method::POST,
        &credits_uri(user.id),
        Some(json!({ "operation": "add", "amount": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

    txn.rollback().await.unwrap();

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("{}/transactions", credits_uri(user.id)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["transactions"], json!([]));
}

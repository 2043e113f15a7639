//! HTTP API integration tests.
//!
//! The full router runs against the in-memory store, a scripted gateway and
//! a recording dispatcher, wired exactly as in production by
//! [`Services::build`].

#![allow(clippy::unwrap_used)] // Test code can use unwrap
#![allow(clippy::too_many_lines)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use racepay_registration::config::{
    Config, DatabaseConfig, GatewayConfig, NotifierConfig, RegistrationConfig, ServerConfig,
    SweeperConfig,
};
use racepay_registration::{Services, build_router};
use racepay_testing::{
    FailPoint, InMemoryRegistrationStore, RecordingDispatcher, ScriptedTransport, Step,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn config() -> Config {
    Config {
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            connect_timeout: 1,
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            metrics_port: 0,
            shutdown_timeout: 1,
        },
        gateway: GatewayConfig {
            url: "http://gateway.invalid/payments".to_string(),
            api_key: "test-key".to_string(),
            timeout_ms: 5_000,
            max_attempts: 3,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        },
        registration: RegistrationConfig {
            reservation_window_hours: 72,
            slot_price_cents: 2_500,
            currency: "USD".to_string(),
            max_runners_per_group: 20,
        },
        sweeper: SweeperConfig {
            interval_secs: 60,
            batch_size: 100,
        },
        notifier: NotifierConfig {
            max_retries: 0,
            base_delay_ms: 0,
            resend_attempts: 1,
            queue_capacity: 16,
            webhook_url: None,
        },
    }
}

struct Api {
    router: Router,
    store: InMemoryRegistrationStore,
    dispatcher: Arc<RecordingDispatcher>,
}

fn api(steps: Vec<Step>) -> Api {
    let store = InMemoryRegistrationStore::new();
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let services = Services::build(
        &config(),
        Arc::new(store.clone()),
        Arc::new(ScriptedTransport::new(steps)),
        dispatcher.clone(),
    );
    Api {
        router: build_router(services.state),
        store,
        dispatcher,
    }
}

impl Api {
    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn send(&self, method: Method, uri: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.call(request).await
    }

    async fn stock(&self, size: &str, gender: &str, units: u32) -> (StatusCode, Value) {
        self.send(
            Method::PUT,
            &format!("/api/inventory/{size}/{gender}"),
            &json!({ "stock": units }),
        )
        .await
    }
}

fn registration(runners: &[(&str, &str, &str)], payment_method: &Value) -> Value {
    let runners: Vec<_> = runners
        .iter()
        .map(|(id, size, gender)| {
            json!({
                "full_name": format!("Runner {id}"),
                "identification": id,
                "size": size,
                "gender": gender,
            })
        })
        .collect();
    json!({
        "registrant": { "name": "Ana Rivas", "email": "ana@example.com", "phone": "+58 414 555 0101" },
        "runners": runners,
        "payment_method": payment_method,
    })
}

fn mobile() -> Value {
    json!({ "type": "mobile_payment", "bank_code": "0102", "phone": "04145550101", "payer_id": "V-12345678" })
}

fn transfer(reference: &str) -> Value {
    json!({ "type": "bank_transfer", "reference": reference })
}

#[tokio::test]
async fn health_and_readiness() {
    let api = api(vec![]);

    let response = api
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let (status, body) = api.get("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    api.store.fail_always(FailPoint::Ping);
    let (status, _) = api.get("/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn configured_stock_is_listed() {
    let api = api(vec![]);

    let (status, body) = api.stock("m", "F", 4).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["size"], "M");
    assert_eq!(body["available"], 4);

    let (status, body) = api.get("/api/inventory").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["stock"], 4);

    let (status, body) = api.stock("XXXL", "F", 4).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn confirmed_registration_can_be_looked_up() {
    let api = api(vec![]);
    api.stock("M", "F", 2).await;
    api.stock("L", "M", 2).await;

    let (status, receipt) = api
        .send(
            Method::POST,
            "/api/registrations",
            &registration(&[("V-1", "M", "F"), ("V-2", "L", "M")], &transfer("TRX-100")),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "confirmed");
    assert_eq!(receipt["replayed"], false);
    assert!(receipt.get("reserved_until").is_none());

    let code = receipt["group_code"].as_str().unwrap();
    let (status, view) = api.get(&format!("/api/registrations/{code}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "confirmed");
    assert_eq!(view["runners"].as_array().unwrap().len(), 2);
    assert_eq!(view["attempts"], json!([]));

    let (_, inventory) = api.get("/api/inventory").await;
    let assigned: u64 = inventory
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["assigned"].as_u64().unwrap())
        .sum();
    assert_eq!(assigned, 2);
}

#[tokio::test]
async fn gateway_refusal_is_a_rejected_receipt() {
    let api = api(vec![Step::rejected(422, "ACCOUNT_NOT_REGISTERED", "phone not registered")]);
    api.stock("S", "M", 1).await;

    let (status, receipt) = api
        .send(Method::POST, "/api/registrations", &registration(&[("V-1", "S", "M")], &mobile()))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "rejected");
    assert_eq!(receipt["error_code"], "ACCOUNT_NOT_REGISTERED");
    assert_eq!(receipt["can_retry"], false);
    assert!(receipt["action"].is_string());

    let (_, inventory) = api.get("/api/inventory").await;
    assert_eq!(inventory[0]["available"], 1);
}

#[tokio::test]
async fn exhausted_inventory_is_a_conflict() {
    let api = api(vec![]);
    api.stock("XL", "F", 1).await;

    let (status, body) = api
        .send(
            Method::POST,
            "/api/registrations",
            &registration(&[("V-1", "XL", "F"), ("V-2", "XL", "F")], &transfer("TRX-1")),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVENTORY_EXHAUSTED");
    assert!(body["action"].is_string());
    assert_eq!(api.store.group_count(), 0);
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let api = api(vec![]);
    api.stock("M", "F", 5).await;

    let request = Request::post("/api/registrations")
        .header("content-type", "application/json")
        .body(Body::from("{\"registrant\":"))
        .unwrap();
    let (status, body) = api.call(request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = api
        .send(Method::POST, "/api/registrations", &registration(&[], &transfer("TRX-1")))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["can_retry"], false);
}

#[tokio::test]
async fn idempotency_key_replays_the_first_receipt() {
    let api = api(vec![Step::approved()]);
    api.stock("M", "F", 5).await;
    let body = registration(&[("V-1", "M", "F")], &mobile());

    let submit = || {
        Request::post("/api/registrations")
            .header("content-type", "application/json")
            .header("idempotency-key", "checkout-42")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let (_, first) = api.call(submit()).await;
    let (status, second) = api.call(submit()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "confirmed");
    assert_eq!(second["replayed"], true);
    assert_eq!(second["group_code"], first["group_code"]);
    assert_eq!(api.store.group_count(), 1);
}

#[tokio::test]
async fn unknown_group_is_not_found() {
    let api = api(vec![]);

    let (status, body) = api.get("/api/registrations/RG-0000000000").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn stock_cannot_shrink_below_committed_units() {
    let api = api(vec![]);
    api.stock("M", "F", 2).await;
    api.send(
        Method::POST,
        "/api/registrations",
        &registration(&[("V-1", "M", "F"), ("V-2", "M", "F")], &transfer("TRX-1")),
    )
    .await;

    let (status, body) = api.stock("M", "F", 1).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STOCK_BELOW_COMMITTED");
}

#[tokio::test]
async fn confirmation_resend() {
    let api = api(vec![Step::rejected(422, "DECLINED", "insufficient funds")]);
    api.stock("M", "F", 5).await;

    let (_, rejected) = api
        .send(Method::POST, "/api/registrations", &registration(&[("V-1", "M", "F")], &mobile()))
        .await;
    let (status, body) = api
        .send(
            Method::POST,
            "/api/confirmations/resend",
            &json!({ "group_code": rejected["group_code"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "NOT_CONFIRMED");

    let (_, confirmed) = api
        .send(
            Method::POST,
            "/api/registrations",
            &registration(&[("V-2", "M", "F")], &transfer("TRX-5")),
        )
        .await;
    let (status, body) = api
        .send(
            Method::POST,
            "/api/confirmations/resend",
            &json!({ "group_code": confirmed["group_code"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "sent");
    assert_eq!(api.dispatcher.sent().len(), 1);
}

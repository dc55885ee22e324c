//! End-to-end reconciliation against mocked gateways and in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use localpro_db_memory::MemoryStores;
use localpro_reconcile::{
    PayMongoConfig, PayPalConfig, ReconcileConfig, ReconciliationEngine, ReconciliationScheduler,
    RunOptions,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn paypal_config(server: &MockServer) -> PayPalConfig {
    PayPalConfig {
        client_id: Some("client".into()),
        client_secret: Some("secret".into()),
        base_url: Some(server.uri()),
        ..Default::default()
    }
}

fn paymongo_config(server: &MockServer) -> PayMongoConfig {
    PayMongoConfig {
        secret_key: Some("sk_test_123".into()),
        base_url: server.uri(),
        ..Default::default()
    }
}

fn engine(
    stores: &MemoryStores,
    paypal: &PayPalConfig,
    paymongo: &PayMongoConfig,
) -> ReconciliationEngine {
    ReconciliationEngine::builder()
        .with_repositories(stores.repositories())
        .with_gateway_clients(paypal, paymongo)
        .unwrap()
        .with_config(&ReconcileConfig::default())
        .build()
}

async fn mount_paypal_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A21AA-token",
            "token_type": "Bearer",
            "expires_in": 32400
        })))
        .mount(server)
        .await;
}

async fn mount_paypal_order(server: &MockServer, order_id: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/checkout/orders/{order_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn completed_order(order_id: &str, capture_id: &str) -> Value {
    json!({
        "id": order_id,
        "status": "COMPLETED",
        "purchase_units": [{
            "payments": {
                "captures": [{
                    "id": capture_id,
                    "status": "COMPLETED",
                    "create_time": "2024-05-01T10:15:00Z"
                }]
            }
        }]
    })
}

fn pending_booking(order_id: &str) -> Value {
    json!({
        "client": "c1",
        "payment": { "method": "paypal", "status": "pending", "paypalOrderId": order_id }
    })
}

fn pending_supply_order(order_id: &str) -> Value {
    json!({
        "status": "pending",
        "paymentMethod": "paypal",
        "payment": { "status": "pending", "paypalOrderId": order_id }
    })
}

#[tokio::test]
async fn test_booking_paid_via_paypal() {
    let server = MockServer::start().await;
    mount_paypal_token(&server).await;
    mount_paypal_order(&server, "ORDER123", completed_order("ORDER123", "CAPTURE123")).await;

    let stores = MemoryStores::new();
    stores.bookings.insert("b1", pending_booking("ORDER123"));
    let engine = engine(&stores, &paypal_config(&server), &PayMongoConfig::default());

    let stats = engine.run_once(&RunOptions::default()).await;

    let booking = stores.bookings.get("b1").unwrap();
    assert_eq!(booking["payment"]["status"], "paid");
    assert_eq!(booking["payment"]["paypalTransactionId"], "CAPTURE123");
    assert_eq!(booking["payment"]["paidAt"], "2024-05-01T10:15:00Z");
    assert_eq!(booking["client"], "c1");
    assert_eq!(stats.paypal.checked, 1);
    assert!(stats.paypal.updated >= 1);
    assert!(stats.paymongo.skipped);
}

#[tokio::test]
async fn test_supply_order_confirmed_on_payment() {
    let server = MockServer::start().await;
    mount_paypal_token(&server).await;
    mount_paypal_order(&server, "ORDER123", completed_order("ORDER123", "CAPTURE123")).await;

    let stores = MemoryStores::new();
    stores
        .supply_orders
        .insert("o1", pending_supply_order("ORDER123"));
    let engine = engine(&stores, &paypal_config(&server), &PayMongoConfig::default());

    engine.run_once(&RunOptions::default()).await;

    let order = stores.supply_orders.get("o1").unwrap();
    assert_eq!(order["payment"]["status"], "paid");
    assert_eq!(order["status"], "confirmed");
}

#[tokio::test]
async fn test_order_without_method_follows_booking() {
    let server = MockServer::start().await;
    mount_paypal_token(&server).await;
    mount_paypal_order(&server, "ORDER123", completed_order("ORDER123", "CAPTURE123")).await;

    let stores = MemoryStores::new();
    stores.bookings.insert("b1", pending_booking("ORDER123"));
    stores.supply_orders.insert(
        "o1",
        json!({
            "status": "pending",
            "payment": { "status": "pending", "paypalOrderId": "ORDER123" }
        }),
    );
    let engine = engine(&stores, &paypal_config(&server), &PayMongoConfig::default());

    let stats = engine.run_once(&RunOptions::default()).await;

    assert_eq!(stats.paypal.checked, 1);
    assert_eq!(stats.paypal.updated, 2);
    assert_eq!(stores.bookings.get("b1").unwrap()["payment"]["status"], "paid");
    let order = stores.supply_orders.get("o1").unwrap();
    assert_eq!(order["payment"]["status"], "paid");
    assert_eq!(order["status"], "confirmed");
}

#[tokio::test]
async fn test_paypal_skipped_without_credentials() {
    let server = MockServer::start().await;
    Mock::given(path_regex(".*"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let stores = MemoryStores::new();
    stores.bookings.insert("b1", pending_booking("ORDER123"));
    let unconfigured = PayPalConfig {
        base_url: Some(server.uri()),
        ..Default::default()
    };
    let engine = engine(&stores, &unconfigured, &PayMongoConfig::default());

    let stats = engine.run_once(&RunOptions::default()).await;

    assert_eq!(stats.paypal.checked, 0);
    assert!(stats.paypal.skipped);
    assert_eq!(stores.bookings.get("b1").unwrap()["payment"]["status"], "pending");
}

#[tokio::test]
async fn test_subscription_payment_completed_via_paymongo() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "pi_123",
                "type": "payment_intent",
                "attributes": {
                    "status": "succeeded",
                    "charges": { "data": [{ "id": "ch_123" }] }
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stores = MemoryStores::new();
    stores.subscription_payments.insert(
        "p1",
        json!({
            "paymentMethod": "paymongo",
            "status": "pending",
            "paymentDetails": { "paymongoIntentId": "pi_123" }
        }),
    );
    let engine = engine(&stores, &PayPalConfig::default(), &paymongo_config(&server));

    let stats = engine.run_once(&RunOptions::default()).await;

    let payment = stores.subscription_payments.get("p1").unwrap();
    assert_eq!(payment["status"], "completed");
    assert_eq!(payment["paymentDetails"]["paymongoChargeId"], "ch_123");
    assert!(payment["processedAt"].is_string());
    assert_eq!(stats.paymongo.updated, 1);
}

#[tokio::test]
async fn test_every_store_converges_once() {
    let server = MockServer::start().await;
    mount_paypal_token(&server).await;
    mount_paypal_order(&server, "ORDER1", completed_order("ORDER1", "CAP1")).await;

    let stores = MemoryStores::new();
    stores.bookings.insert("b1", pending_booking("ORDER1"));
    stores.supply_orders.insert("o1", pending_supply_order("ORDER1"));
    stores.transactions.insert(
        "t1",
        json!({
            "paymentMethod": "paypal",
            "status": "pending",
            "paymentDetails": { "paypalOrderId": "ORDER1" }
        }),
    );
    stores.subscription_payments.insert(
        "p1",
        json!({
            "paymentMethod": "paypal",
            "status": "pending",
            "paymentDetails": { "paypalOrderId": "ORDER1" }
        }),
    );
    let engine = engine(&stores, &paypal_config(&server), &PayMongoConfig::default());

    let first = engine.run_once(&RunOptions::default()).await;
    assert_eq!(first.paypal.checked, 1);
    assert_eq!(first.paypal.updated, 4);
    assert_eq!(stores.transactions.get("t1").unwrap()["paymentDetails"]["paypalCaptureId"], "CAP1");

    let second = engine.run_once(&RunOptions::default()).await;
    assert_eq!(second.paypal.checked, 0);
    assert_eq!(second.paypal.updated, 0);
}

#[tokio::test]
async fn test_refunded_record_untouched() {
    let server = MockServer::start().await;
    mount_paypal_token(&server).await;
    mount_paypal_order(&server, "ORDER1", completed_order("ORDER1", "CAP1")).await;

    let stores = MemoryStores::new();
    stores.bookings.insert("b1", pending_booking("ORDER1"));
    stores.transactions.insert(
        "t1",
        json!({
            "paymentMethod": "paypal",
            "status": "refunded",
            "paymentDetails": { "paypalOrderId": "ORDER1" }
        }),
    );
    let engine = engine(&stores, &paypal_config(&server), &PayMongoConfig::default());

    let stats = engine.run_once(&RunOptions::default()).await;

    assert_eq!(stats.paypal.updated, 1);
    let transaction = stores.transactions.get("t1").unwrap();
    assert_eq!(transaction["status"], "refunded");
    assert!(transaction.get("completedAt").is_none());
}

#[tokio::test]
async fn test_gateway_failure_leaves_record_for_next_run() {
    let server = MockServer::start().await;
    mount_paypal_token(&server).await;
    mount_paypal_order(&server, "ORDER1", completed_order("ORDER1", "CAP1")).await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/ORDER2"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let stores = MemoryStores::new();
    stores.bookings.insert("b1", pending_booking("ORDER1"));
    stores.bookings.insert("b2", pending_booking("ORDER2"));
    let engine = engine(&stores, &paypal_config(&server), &PayMongoConfig::default());

    let stats = engine.run_once(&RunOptions::default()).await;

    assert_eq!(stats.paypal.checked, 2);
    assert_eq!(stats.paypal.errors, 1);
    assert_eq!(stats.paypal.updated, 1);
    assert_eq!(stores.bookings.get("b2").unwrap()["payment"]["status"], "pending");
}

#[tokio::test]
async fn test_stop_lets_in_flight_run_finish() {
    let server = MockServer::start().await;
    mount_paypal_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/ORDER1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completed_order("ORDER1", "CAP1"))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let stores = MemoryStores::new();
    stores.bookings.insert("b1", pending_booking("ORDER1"));
    let engine = Arc::new(engine(&stores, &paypal_config(&server), &PayMongoConfig::default()));
    let config = ReconcileConfig {
        run_on_startup: true,
        startup_delay_secs: 0,
        ..Default::default()
    };
    let scheduler = ReconciliationScheduler::new(engine, &config).unwrap();

    assert!(scheduler.start());
    for _ in 0..50 {
        if scheduler.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(scheduler.is_running());

    scheduler.stop();
    scheduler.wait_idle().await;

    assert_eq!(stores.bookings.get("b1").unwrap()["payment"]["status"], "paid");
    let last = scheduler.last_run().unwrap();
    assert_eq!(last.paypal.updated, 1);
}

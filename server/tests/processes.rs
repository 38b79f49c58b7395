//! Process-level tests: real HTTP listeners wired to the in-memory event bus.

#![allow(clippy::unwrap_used)]

use order_lifecycle_core::{EventBus, NOTIFICATIONS_TOPIC, ORDERS_TOPIC, OrderStatus};
use order_lifecycle_runtime::notifier::NOTIFIER_CONSUMER;
use order_lifecycle_runtime::{IntakeService, NewOrder, NotificationDispatcher, StatusIndex};
use order_lifecycle_server::{Supervisor, bind, load_dataset, replay};
use order_lifecycle_testing::helpers::{fast_config, widget_order, widget_request};
use order_lifecycle_testing::{InMemoryEventBus, RecordingMailer};
use order_lifecycle_web::{intake_router, status_router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

async fn intake_server(bus: Arc<InMemoryEventBus>, supervisor: &mut Supervisor) -> String {
    let intake = IntakeService::new(bus, Arc::new(order_lifecycle_core::AtomicOrderIdGenerator::new()));
    let listener = bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    supervisor.serve("intake", listener, intake_router(intake));
    format!("http://{addr}/")
}

#[tokio::test]
async fn seed_replays_dataset_and_skips_rejects() {
    let bus = Arc::new(InMemoryEventBus::new());
    let (shutdown, _) = broadcast::channel(1);
    let mut supervisor = Supervisor::new(shutdown, Duration::from_secs(5));
    let target = intake_server(bus.clone(), &mut supervisor).await;

    let path = std::env::temp_dir().join(format!("order-lifecycle-seed-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"[
            {"productName": "Widget", "price": 1500, "email": "a@example.com"},
            {"productName": "", "price": 10, "email": "b@example.com"},
            {"productName": "Gadget", "price": 990, "email": "c@example.com"}
        ]"#,
    )
    .unwrap();
    let orders = load_dataset(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let report = replay(&reqwest::Client::new(), &target, &orders).await;

    assert_eq!(report.accepted, 2);
    assert_eq!(report.failed, 1);
    let published: Vec<String> = bus
        .published(ORDERS_TOPIC)
        .iter()
        .map(|record| record.decode().unwrap().product_name)
        .collect();
    assert_eq!(published, ["Widget", "Gadget"]);

    supervisor.run_until(async {}).await.unwrap();
}

#[tokio::test]
async fn unreachable_intake_counts_every_order_as_failed() {
    let listener = bind("127.0.0.1:0").await.unwrap();
    let target = format!("http://{}/", listener.local_addr().unwrap());
    drop(listener);

    let orders: Vec<NewOrder> = vec![widget_request(), widget_request()];
    let report = replay(&reqwest::Client::new(), &target, &orders).await;

    assert_eq!(report.accepted, 0);
    assert_eq!(report.failed, 2);
}

#[test]
fn missing_dataset_is_an_error() {
    let err = load_dataset(std::path::Path::new("/nonexistent/dataset.json")).unwrap_err();
    assert!(err.to_string().contains("failed to read"));
}

#[tokio::test]
async fn status_is_queryable_after_notification() {
    let bus = Arc::new(InMemoryEventBus::new());
    let (shutdown, _) = broadcast::channel(1);
    let mut supervisor = Supervisor::new(shutdown, Duration::from_secs(5));
    let config = fast_config();

    let mailer = RecordingMailer::new();
    let index = StatusIndex::new();
    let dispatcher = NotificationDispatcher::new(index.clone(), mailer.clone(), config.mail_retry.clone());
    let event_bus: Arc<dyn EventBus> = bus.clone();
    let handle = dispatcher.spawn(event_bus, &config, supervisor.shutdown());
    supervisor.consumer(NOTIFIER_CONSUMER, handle);

    let listener = bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    supervisor.serve("status", listener, status_router(index.clone()));
    bus.wait_for_subscribers(NOTIFICATIONS_TOPIC, 1).await;

    let order = widget_order(7).with_status(OrderStatus::Preparing);
    let record = order_lifecycle_core::EventRecord::encode(NOTIFICATIONS_TOPIC, &order).unwrap();
    bus.publish(NOTIFICATIONS_TOPIC, &record).await.unwrap();

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/order?id=7");
    let mut body = String::new();
    for _ in 0..100 {
        let response = client.get(&url).send().await.unwrap();
        if response.status().is_success() {
            body = response.text().await.unwrap();
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(body, "preparando");

    let missing = client.get(format!("http://{addr}/order?id=8")).send().await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    // Draining waits for the email that follows the index update.
    supervisor.run_until(async {}).await.unwrap();
    assert_eq!(mailer.statuses_for(order.id), [OrderStatus::Preparing]);
}

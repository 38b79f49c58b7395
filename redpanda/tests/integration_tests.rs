//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! Ignored by default: they need Docker and take a while to start Kafka.
//!
//! ```bash
//! cargo test -p order-lifecycle-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use order_lifecycle_core::{EventBus, EventRecord, Order, OrderId, OrderStatus};
use order_lifecycle_redpanda::RedpandaEventBus;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

fn order(id: i64, status: OrderStatus) -> Order {
    Order::new(OrderId::new(id), "Widget", 1500, "a@example.com").with_status(status)
}

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka.get_host_port_ipv4(KAFKA_PORT).await.expect("Failed to get port");
    let brokers = format!("{host}:{port}");
    wait_for_topic(&brokers, "warmup").await;
    (kafka, brokers)
}

/// Publish until the broker accepts, which also auto-creates `topic`.
async fn wait_for_topic(brokers: &str, topic: &str) {
    let bus = RedpandaEventBus::new(brokers).expect("Failed to create event bus");
    let warmup = EventRecord::new(topic, "0", b"warmup".to_vec());

    for _ in 0..60 {
        if bus.publish(topic, &warmup).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(2)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    panic!("Kafka did not accept a record on {topic}");
}

async fn next_order(stream: &mut order_lifecycle_core::EventStream) -> EventRecord {
    loop {
        let delivery = tokio::time::timeout(Duration::from_secs(15), stream.next())
            .await
            .expect("Timed out waiting for a record")
            .expect("Stream ended")
            .expect("Failed to receive record");
        let (record, ack) = delivery.into_parts();
        ack.ack();
        if record.payload != b"warmup" {
            return record;
        }
    }
}

#[tokio::test]
#[ignore]
async fn records_keep_key_and_payload() {
    let (_kafka, brokers) = start_kafka().await;
    wait_for_topic(&brokers, "orders").await;

    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("round-trip")
        .build()
        .expect("Failed to create event bus");
    let mut stream = bus.subscribe(&["orders"]).await.expect("Failed to subscribe");

    let placed = order(42, OrderStatus::Created);
    let record = EventRecord::encode("orders", &placed).expect("encode");
    bus.publish("orders", &record).await.expect("Failed to publish");

    let received = next_order(&mut stream).await;
    assert_eq!(received.topic, "orders");
    assert_eq!(received.key, "42");
    assert_eq!(received.decode().expect("decode"), placed);
}

#[tokio::test]
#[ignore]
async fn same_key_keeps_publish_order() {
    let (_kafka, brokers) = start_kafka().await;
    wait_for_topic(&brokers, "status").await;

    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("ordering")
        .build()
        .expect("Failed to create event bus");
    let mut stream = bus.subscribe(&["status"]).await.expect("Failed to subscribe");

    let sequence = [OrderStatus::Received, OrderStatus::Preparing, OrderStatus::Delivering];
    for status in sequence {
        let record = EventRecord::encode("status", &order(7, status)).expect("encode");
        bus.publish("status", &record).await.expect("Failed to publish");
    }

    for expected in sequence {
        let received = next_order(&mut stream).await.decode().expect("decode");
        assert_eq!(received.status, expected);
    }
}

#[tokio::test]
#[ignore]
async fn unacknowledged_record_is_redelivered() {
    let (_kafka, brokers) = start_kafka().await;
    wait_for_topic(&brokers, "orders").await;

    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("unacked")
        .build()
        .expect("Failed to create event bus");

    let record = EventRecord::encode("orders", &order(9, OrderStatus::Created)).expect("encode");
    bus.publish("orders", &record).await.expect("Failed to publish");

    let mut first = bus.subscribe(&["orders"]).await.expect("Failed to subscribe");
    let dropped = loop {
        let delivery = tokio::time::timeout(Duration::from_secs(15), first.next())
            .await
            .expect("Timed out waiting for a record")
            .expect("Stream ended")
            .expect("Failed to receive record");
        if delivery.record().payload == b"warmup" {
            delivery.ack();
            continue;
        }
        break delivery;
    };
    assert_eq!(dropped.record().key, "9");
    // Handler failed: the delivery goes away without an ack.
    drop(dropped);
    drop(first);
    tokio::time::sleep(Duration::from_secs(8)).await;

    let mut second = bus.subscribe(&["orders"]).await.expect("Failed to resubscribe");
    assert_eq!(next_order(&mut second).await.key, "9");
}

#[tokio::test]
#[ignore]
async fn dropped_subscription_redelivers_uncommitted_records() {
    let (_kafka, brokers) = start_kafka().await;
    wait_for_topic(&brokers, "notifications").await;

    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("redelivery")
        .buffer_size(1)
        .build()
        .expect("Failed to create event bus");

    for id in 1..=3 {
        let record = EventRecord::encode("notifications", &order(id, OrderStatus::Received)).expect("encode");
        bus.publish("notifications", &record).await.expect("Failed to publish");
    }

    let mut first = bus.subscribe(&["notifications"]).await.expect("Failed to subscribe");
    let seen = next_order(&mut first).await;
    drop(first);
    tokio::time::sleep(Duration::from_secs(8)).await;

    // At-least-once: whatever was not committed comes back to the next member.
    let mut second = bus.subscribe(&["notifications"]).await.expect("Failed to resubscribe");
    let again = next_order(&mut second).await;
    assert!(again.key.parse::<i64>().expect("numeric key") >= seen.key.parse::<i64>().expect("numeric key"));
}

use std::sync::Arc;

use serde_json::{Value, json};

use super::{ClientStream, DeliveryState};
use crate::broker::Hub;
use crate::utils::PubSubError;

fn drain(stream: &mut ClientStream) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = stream.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

fn sys(kind: &str, names: &[&str]) -> Value {
    let list: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
    json!({ "sys": [{ "type": kind, "list": list }] })
}

#[test]
fn test_client_starts_idle() {
    let hub = Hub::new();
    let client = hub.get_or_create_client("c1");
    assert_eq!(client.id(), "c1");
    assert_eq!(client.state(), DeliveryState::Idle);
    assert!(client.topics().is_empty());
}

#[test]
fn test_private_topic_round_trip_delivers_update() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    let mut stream = c1.attach();

    c1.create_private_topic("orders").unwrap();
    c1.subscribe("orders").unwrap();
    assert_eq!(c1.publish("orders", &json!({"id": 1})).unwrap(), 1);

    let frames = drain(&mut stream);
    assert_eq!(
        frames,
        vec![
            json!({"sys": [{"type": "topics", "list": [{"name": "orders", "type": "private"}]}]}),
            sys("subscribed", &["orders"]),
            json!({"updates": [{"topic": "orders", "data": {"id": 1}}]}),
        ]
    );
}

#[test]
fn test_create_private_topic_twice() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    c1.create_private_topic("orders").unwrap();

    assert!(matches!(
        c1.create_private_topic("orders"),
        Err(PubSubError::AlreadyExists(name)) if name == "orders"
    ));
}

#[test]
fn test_publish_does_not_reach_non_subscribers() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    let c2 = hub.get_or_create_client("c2");
    let _c1_stream = c1.attach();
    let mut c2_stream = c2.attach();

    c1.create_private_topic("orders").unwrap();
    c1.subscribe("orders").unwrap();
    c1.publish("orders", &json!({"id": 2})).unwrap();

    assert!(drain(&mut c2_stream).is_empty());
}

#[test]
fn test_unsubscribe_notifies_and_removes() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    let mut stream = c1.attach();
    let orders = c1.create_private_topic("orders").unwrap();
    c1.subscribe("orders").unwrap();
    drain(&mut stream);

    c1.unsubscribe("orders").unwrap();

    assert_eq!(drain(&mut stream), vec![sys("unsubscribed", &["orders"])]);
    assert!(!orders.subscribers().contains("c1"));
}

#[test]
fn test_subscribe_unsubscribe_restores_subscriber_set() {
    let hub = Hub::new();
    let news = hub.register_public_topic("news").unwrap();
    let other = hub.get_or_create_client("other");
    other.subscribe("news").unwrap();
    let before = news.subscribers();

    let c1 = hub.get_or_create_client("c1");
    c1.subscribe("news").unwrap();
    c1.unsubscribe("news").unwrap();

    assert_eq!(news.subscribers(), before);
    assert!(matches!(
        c1.unsubscribe("news"),
        Err(PubSubError::NotSubscribed { .. })
    ));
}

#[test]
fn test_subscribe_unknown_topic() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    assert!(matches!(
        c1.subscribe("nowhere"),
        Err(PubSubError::NotFound { kind: "topic", .. })
    ));
    assert!(matches!(
        c1.unsubscribe("nowhere"),
        Err(PubSubError::NotFound { kind: "topic", .. })
    ));
}

#[test]
fn test_private_topics_are_invisible_to_other_clients() {
    let hub = Hub::new();
    let owner = hub.get_or_create_client("owner");
    let other = hub.get_or_create_client("other");
    owner.create_private_topic("secret").unwrap();

    assert!(matches!(
        other.subscribe("secret"),
        Err(PubSubError::NotFound { .. })
    ));
    assert!(!other.topics().contains_key("secret"));
}

#[test]
fn test_publish_requires_receiving() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    c1.create_private_topic("orders").unwrap();

    assert!(matches!(
        c1.publish("orders", &1),
        Err(PubSubError::NotReceiving(id)) if id == "c1"
    ));
}

#[test]
fn test_publish_only_to_owned_topics() {
    let hub = Hub::new();
    hub.register_public_topic("news").unwrap();
    let c1 = hub.get_or_create_client("c1");
    let _stream = c1.attach();

    assert!(matches!(
        c1.publish("news", &1),
        Err(PubSubError::NotFound { kind: "topic", .. })
    ));
}

#[test]
fn test_remove_private_topic_evicts_subscribers() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    let mut stream = c1.attach();
    let orders = c1.create_private_topic("orders").unwrap();
    c1.subscribe("orders").unwrap();
    drain(&mut stream);

    c1.remove_private_topic("orders").unwrap();

    assert_eq!(drain(&mut stream), vec![sys("unsubscribed", &["orders"])]);
    assert_eq!(orders.subscriber_count(), 0);
    assert!(!c1.topics().contains_key("orders"));
    assert!(matches!(
        c1.remove_private_topic("orders"),
        Err(PubSubError::NotFound { .. })
    ));
}

#[test]
fn test_topics_union_and_shadowing() {
    let hub = Hub::new();
    hub.register_public_topic("news").unwrap();
    let c1 = hub.get_or_create_client("c1");
    c1.create_private_topic("orders").unwrap();
    c1.create_private_topic("shared").unwrap();
    // a public topic registered later under the same name stays hidden
    hub.register_public_topic("shared").unwrap();

    let topics = c1.topics();
    let names: Vec<_> = topics.keys().cloned().collect();
    assert_eq!(names, vec!["news", "orders", "shared"]);
    assert_eq!(
        topics["shared"].visibility(),
        crate::broker::Visibility::Private
    );

    c1.subscribe("news").unwrap();
    let subscribed: Vec<_> = c1.subscribed_topics().keys().cloned().collect();
    assert_eq!(subscribed, vec!["news"]);
}

#[test]
fn test_private_topic_cannot_take_a_public_name() {
    let hub = Hub::new();
    let news = hub.register_public_topic("news").unwrap();
    let c1 = hub.get_or_create_client("c1");
    let mut stream = c1.attach();
    c1.subscribe("news").unwrap();
    drain(&mut stream);

    assert!(matches!(
        c1.create_private_topic("news"),
        Err(PubSubError::AlreadyExists(name)) if name == "news"
    ));
    assert!(drain(&mut stream).is_empty());

    // the public subscription stays visible and can still be left
    assert!(c1.subscribed_topics().contains_key("news"));
    c1.unsubscribe("news").unwrap();
    assert!(!news.is_subscribed("c1"));
    assert_eq!(drain(&mut stream), vec![sys("unsubscribed", &["news"])]);
}

#[test]
fn test_remove_private_topic_notifies_before_next_change() {
    let hub = Hub::new();
    hub.register_public_topic("news").unwrap();
    let c1 = hub.get_or_create_client("c1");
    let mut stream = c1.attach();
    c1.create_private_topic("orders").unwrap();
    c1.subscribe("orders").unwrap();
    drain(&mut stream);

    c1.remove_private_topic("orders").unwrap();
    c1.subscribe("news").unwrap();

    assert_eq!(
        drain(&mut stream),
        vec![sys("unsubscribed", &["orders"]), sys("subscribed", &["news"])]
    );
}

#[test]
fn test_public_topics_registered_later_are_visible() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    hub.register_public_topic("late").unwrap();

    assert!(c1.topics().contains_key("late"));
    c1.subscribe("late").unwrap();
}

#[test]
fn test_initial_snapshot() {
    let hub = Hub::new();
    hub.register_public_topic("news").unwrap();
    let c1 = hub.get_or_create_client("c1");
    c1.create_private_topic("orders").unwrap();
    c1.subscribe("news").unwrap();

    let frame = c1.initial_snapshot().unwrap().unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(&frame).unwrap(),
        json!({"sys": [
            {"type": "topics", "list": [
                {"name": "news", "type": "public"},
                {"name": "orders", "type": "private"}
            ]},
            {"type": "subscribed", "list": [{"name": "news"}]}
        ]})
    );
}

#[test]
fn test_initial_snapshot_without_topics_is_no_frame() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    assert!(c1.initial_snapshot().unwrap().is_none());

    let mut stream = c1.attach();
    assert!(drain(&mut stream).is_empty());
}

#[test]
fn test_attach_queues_snapshot_first() {
    let hub = Hub::new();
    hub.register_public_topic("news").unwrap();
    let c1 = hub.get_or_create_client("c1");
    c1.subscribe("news").unwrap();

    let mut stream = c1.attach();
    assert_eq!(c1.state(), DeliveryState::Active);
    let frames = drain(&mut stream);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["sys"][1], json!({"type": "subscribed", "list": [{"name": "news"}]}));
}

#[test]
fn test_idle_client_drops_messages() {
    let hub = Hub::new();
    hub.register_public_topic("news").unwrap();
    let c1 = hub.get_or_create_client("c1");
    c1.subscribe("news").unwrap();

    assert_eq!(hub.publish_public("news", &"missed").unwrap(), 0);

    let mut stream = c1.attach();
    let frames = drain(&mut stream);
    assert!(frames.iter().all(|f| f.get("updates").is_none()));
}

#[test]
fn test_dropping_stream_returns_to_idle() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    let stream = c1.attach();
    assert_eq!(c1.state(), DeliveryState::Active);

    drop(stream);
    assert_eq!(c1.state(), DeliveryState::Idle);
}

#[tokio::test]
async fn test_reattach_supersedes_previous_stream() {
    let hub = Hub::new();
    let c1 = hub.get_or_create_client("c1");
    let mut first = c1.attach();
    let mut second = c1.attach();

    // the first stream ends, and dropping it leaves the second in charge
    assert!(first.recv().await.is_none());
    drop(first);
    assert_eq!(c1.state(), DeliveryState::Active);

    c1.create_private_topic("orders").unwrap();
    assert!(second.recv().await.is_some());
}

#[test]
fn test_notifications_follow_call_order() {
    let hub = Hub::new();
    hub.register_public_topic("a").unwrap();
    hub.register_public_topic("b").unwrap();
    let c1 = hub.get_or_create_client("c1");
    let mut stream = c1.attach();
    drain(&mut stream);

    c1.subscribe("a").unwrap();
    c1.subscribe("b").unwrap();
    c1.unsubscribe("a").unwrap();
    c1.subscribe("a").unwrap();

    assert_eq!(
        drain(&mut stream),
        vec![
            sys("subscribed", &["a"]),
            sys("subscribed", &["b"]),
            sys("unsubscribed", &["a"]),
            sys("subscribed", &["a"]),
        ]
    );
}

#[test]
fn test_concurrent_subscription_changes_stay_consistent() {
    let hub = Arc::new(Hub::new());
    for i in 0..4 {
        hub.register_public_topic(&format!("t{i}")).unwrap();
    }

    let workers: Vec<_> = (0..8)
        .map(|w| {
            let hub = hub.clone();
            std::thread::spawn(move || {
                let client = hub.get_or_create_client(&format!("w{w}"));
                for round in 0..200 {
                    let name = format!("t{}", round % 4);
                    client.subscribe(&name).unwrap();
                    hub.publish_public(&name, &round).unwrap();
                    client.unsubscribe(&name).unwrap();
                }
                client.subscribe("t0").unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let t0 = hub.public_topic("t0").unwrap();
    assert_eq!(t0.subscriber_count(), 8);
    for i in 1..4 {
        assert_eq!(hub.public_topic(&format!("t{i}")).unwrap().subscriber_count(), 0);
    }
}

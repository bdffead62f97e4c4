use super::*;
use serde_json::json;

struct Echo;

#[async_trait]
impl EventHandler for Echo {
    async fn handle(&self, _ctx: &Context, data: Value) -> Result<Option<Event>, String> {
        Ok(Some(Event::new("echo", data)))
    }
}

// =============================================================================
// registry
// =============================================================================

#[test]
fn builder_freezes_registered_events() {
    let registry = RegistryBuilder::new()
        .on("echo", Arc::new(Echo))
        .on("also", Arc::new(Echo))
        .build();
    assert_eq!(registry.events(), vec!["also", "echo"]);
    assert!(registry.get("echo").is_some());
    assert!(registry.get("missing").is_none());
}

#[test]
fn later_registration_replaces_earlier() {
    let registry = RegistryBuilder::new().on("echo", Arc::new(Echo)).on("echo", Arc::new(Echo)).build();
    assert_eq!(registry.events(), vec!["echo"]);
}

// =============================================================================
// hub
// =============================================================================

#[tokio::test]
async fn publish_reaches_only_subscribed_connections() {
    let hub = Hub::new();
    let user = Uuid::new_v4();
    let (a_id, b_id) = (Uuid::new_v4(), Uuid::new_v4());
    let (a_tx, mut a_rx) = mpsc::channel(4);
    let (b_tx, mut b_rx) = mpsc::channel(4);
    hub.register(user, a_id, a_tx).await;
    hub.register(user, b_id, b_tx).await;

    assert!(hub.set_subscribed(user, a_id, Topic::Training, true).await);
    let delivered = hub
        .publish(user, Topic::Training, Event::new("training:update", json!({"status": "queued"})))
        .await;

    assert_eq!(delivered, 1);
    assert!(matches!(a_rx.try_recv(), Ok(Outbound::Event(ev)) if ev.event == "training:update"));
    assert!(b_rx.try_recv().is_err());
}

#[tokio::test]
async fn publish_is_scoped_to_user() {
    let hub = Hub::new();
    let (owner, other) = (Uuid::new_v4(), Uuid::new_v4());
    let conn = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel(4);
    hub.register(other, conn, tx).await;
    hub.set_subscribed(other, conn, Topic::Training, true).await;

    assert_eq!(hub.publish(owner, Topic::Training, Event::new("training:update", json!({}))).await, 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let hub = Hub::new();
    let (user, conn) = (Uuid::new_v4(), Uuid::new_v4());
    let (tx, _rx) = mpsc::channel(4);
    hub.register(user, conn, tx).await;
    hub.set_subscribed(user, conn, Topic::Training, true).await;
    hub.set_subscribed(user, conn, Topic::Training, false).await;
    assert_eq!(hub.publish(user, Topic::Training, Event::new("training:update", json!({}))).await, 0);
}

#[tokio::test]
async fn full_queue_drops_instead_of_blocking() {
    let hub = Hub::new();
    let (user, conn) = (Uuid::new_v4(), Uuid::new_v4());
    let (tx, _rx) = mpsc::channel(1);
    hub.register(user, conn, tx).await;
    hub.set_subscribed(user, conn, Topic::Training, true).await;

    assert_eq!(hub.publish(user, Topic::Training, Event::new("a", json!({}))).await, 1);
    assert_eq!(hub.publish(user, Topic::Training, Event::new("b", json!({}))).await, 0);
}

#[tokio::test]
async fn unregister_removes_connection() {
    let hub = Hub::new();
    let (user, conn) = (Uuid::new_v4(), Uuid::new_v4());
    let (tx, _rx) = mpsc::channel(4);
    hub.register(user, conn, tx).await;
    assert_eq!(hub.connection_count().await, 1);

    hub.unregister(user, conn).await;
    assert_eq!(hub.connection_count().await, 0);
    assert!(!hub.set_subscribed(user, conn, Topic::Training, true).await);
}

#[tokio::test]
async fn close_all_signals_every_connection() {
    let hub = Hub::new();
    let mut receivers = Vec::new();
    for _ in 0..3 {
        let (tx, rx) = mpsc::channel(4);
        hub.register(Uuid::new_v4(), Uuid::new_v4(), tx).await;
        receivers.push(rx);
    }

    hub.close_all().await;
    for mut rx in receivers {
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
    }
}

#[tokio::test]
async fn connection_registered_after_close_all_is_closed() {
    let hub = Hub::new();
    hub.close_all().await;

    let (tx, mut rx) = mpsc::channel(4);
    hub.register(Uuid::new_v4(), Uuid::new_v4(), tx).await;
    assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
}

//! Built-in socket events.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Context, Event, EventHandler, RegistryBuilder, Topic};
use crate::routes::health::now_rfc3339;

/// Register every built-in event on `builder`.
#[must_use]
pub fn setup_socket_handlers(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .on("ping", Arc::new(Ping))
        .on("whoami", Arc::new(WhoAmI))
        .on("training:subscribe", Arc::new(TrainingSubscription { on: true }))
        .on("training:unsubscribe", Arc::new(TrainingSubscription { on: false }))
}

struct Ping;

#[async_trait]
impl EventHandler for Ping {
    async fn handle(&self, _ctx: &Context, _data: Value) -> Result<Option<Event>, String> {
        Ok(Some(Event::new("pong", json!({ "timestamp": now_rfc3339() }))))
    }
}

struct WhoAmI;

#[async_trait]
impl EventHandler for WhoAmI {
    async fn handle(&self, ctx: &Context, _data: Value) -> Result<Option<Event>, String> {
        let identity = serde_json::to_value(&ctx.identity).map_err(|e| e.to_string())?;
        Ok(Some(Event::new("whoami", identity)))
    }
}

struct TrainingSubscription {
    on: bool,
}

#[async_trait]
impl EventHandler for TrainingSubscription {
    async fn handle(&self, ctx: &Context, _data: Value) -> Result<Option<Event>, String> {
        let user_id = ctx.identity.user_id;
        if !ctx.hub.set_subscribed(user_id, ctx.connection_id, Topic::Training, self.on).await {
            return Err("connection is not registered".into());
        }
        let name = if self.on { "training:subscribed" } else { "training:unsubscribed" };
        Ok(Some(Event::new(name, json!({ "topic": "training" }))))
    }
}

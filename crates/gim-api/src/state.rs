use std::sync::Arc;

use serde::Serialize;

use gim_core::{
    domain::UserId,
    group::GroupRegistry,
    message::Message,
    ports::{DeliveryChannel, GroupStore},
};

/// Shared dependencies of every handler.
pub struct ApiState {
    pub groups: Arc<dyn GroupStore>,
    pub registry: Arc<GroupRegistry>,
    pub delivery: Arc<dyn DeliveryChannel>,
}

impl ApiState {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        registry: Arc<GroupRegistry>,
        delivery: Arc<dyn DeliveryChannel>,
    ) -> Self {
        Self {
            groups,
            registry,
            delivery,
        }
    }

    pub async fn respond(&self, uid: UserId, seq: i64, action: &str, data: impl Serialize) {
        self.delivery
            .deliver(uid, &Message::new(seq, action, data))
            .await;
    }
}

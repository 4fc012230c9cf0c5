//! フィード更新の配信先。配信は投げっぱなしで、確認応答は待たない。

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::store::UserId;

#[async_trait]
pub trait FeedDelivery: Send + Sync {
    async fn deliver(&self, user_id: UserId, message: String);
}

/// 配信メッセージをログに書き出すだけの既定の配信先。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl FeedDelivery for LogDelivery {
    async fn deliver(&self, user_id: UserId, message: String) {
        info!(%user_id, bytes = message.len(), %message, "feed update delivered");
    }
}

/// チャネル経由で受け取った配信。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredUpdate {
    pub user_id: UserId,
    pub message: String,
}

/// プロセス内の購読者へ配信を転送する。
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    sender: mpsc::UnboundedSender<DeliveredUpdate>,
}

impl ChannelDelivery {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeliveredUpdate>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl FeedDelivery for ChannelDelivery {
    async fn deliver(&self, user_id: UserId, message: String) {
        if self
            .sender
            .send(DeliveredUpdate { user_id, message })
            .is_err()
        {
            debug!(%user_id, "feed update dropped; no subscriber");
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn channel_delivery_forwards_messages_in_order() {
        let (delivery, mut receiver) = ChannelDelivery::new();
        let user = Uuid::new_v4();

        delivery.deliver(user, "first".to_string()).await;
        delivery.deliver(user, "second".to_string()).await;

        assert_eq!(
            receiver.recv().await,
            Some(DeliveredUpdate {
                user_id: user,
                message: "first".to_string()
            })
        );
        assert_eq!(
            receiver.recv().await.map(|update| update.message),
            Some("second".to_string())
        );
    }

    #[tokio::test]
    async fn channel_delivery_survives_dropped_receiver() {
        let (delivery, receiver) = ChannelDelivery::new();
        drop(receiver);

        delivery.deliver(Uuid::new_v4(), "ignored".to_string()).await;
    }
}

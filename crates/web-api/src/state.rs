use std::sync::Arc;
use std::time::Duration;

use application::{ChatBroker, EventDispatcher};
use config::BrokerConfig;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: EventDispatcher,
    /// 未认证连接等待 `authenticate` 帧的上限
    pub handshake_timeout: Duration,
}

impl AppState {
    pub fn new(broker: Arc<ChatBroker>, config: &BrokerConfig) -> Self {
        Self {
            dispatcher: EventDispatcher::new(broker),
            handshake_timeout: config.handshake_timeout(),
        }
    }

    pub fn broker(&self) -> &Arc<ChatBroker> {
        self.dispatcher.broker()
    }
}

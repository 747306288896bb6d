use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    Authenticator, BrokerSettings, ChatBroker, DemoDirectory, DemoSeed, InMemoryStore,
    Repositories, SystemClock,
};
use chrono::Utc;
use config::BrokerConfig;
use domain::{Identity, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use infrastructure::JwtAuthService;
use serde_json::Value;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::timeout,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub seed: DemoSeed,
    pub jwt: JwtAuthService,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(BrokerConfig::default()).await
    }

    pub async fn start_with(config: BrokerConfig) -> Self {
        let directory = DemoDirectory::standard();
        let store = Arc::new(InMemoryStore::new());
        let seed = store
            .seed_demo(&directory, Utc::now())
            .await
            .expect("demo seed");

        let jwt = JwtAuthService::new(JWT_SECRET, chrono::Duration::hours(1));
        let broker = Arc::new(ChatBroker::new(
            Repositories::from_store(store),
            Authenticator::new(Arc::new(jwt.clone())).with_demo(directory),
            Arc::new(SystemClock),
            BrokerSettings {
                submit_timeout: config.submit_timeout(),
                history_limit: config.history_limit,
            },
        ));
        let app = router(AppState::new(broker, &config));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            seed,
            jwt,
            _shutdown: shutdown_tx,
        }
    }

    pub fn ws_url(&self, query: &str) -> String {
        if query.is_empty() {
            format!("ws://{}/ws", self.addr)
        } else {
            format!("ws://{}/ws?{}", self.addr, query)
        }
    }

    pub async fn connect(&self, query: &str) -> Client {
        let (client, _) = connect_async(self.ws_url(query)).await.expect("connect");
        client
    }

    /// 以演示身份连接，并消费 `authenticated` 帧
    pub async fn connect_demo(&self, email: &str) -> (Client, Identity) {
        let mut client = self.connect(&format!("demo_user={email}")).await;
        let identity = match next_event(&mut client).await {
            ServerEvent::Authenticated {
                user_id,
                display_name,
                role,
                ..
            } => Identity::new(user_id, display_name, role),
            other => panic!("expected authenticated, got {other:?}"),
        };
        (client, identity)
    }
}

pub async fn send_event(client: &mut Client, event: Value) {
    client
        .send(TungsteniteMessage::Text(event.to_string().into()))
        .await
        .expect("send frame");
}

/// 下一个服务端事件，跳过控制帧
pub async fn next_event(client: &mut Client) -> ServerEvent {
    loop {
        let frame = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("event within timeout")
            .expect("stream open")
            .expect("frame");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("server event");
        }
    }
}

/// 读取直到满足条件的事件
pub async fn expect_event(
    client: &mut Client,
    mut predicate: impl FnMut(&ServerEvent) -> bool,
) -> ServerEvent {
    loop {
        let event = next_event(client).await;
        if predicate(&event) {
            return event;
        }
    }
}

/// 连接在超时内被服务端关闭
pub async fn expect_closed(client: &mut Client) {
    let closed = timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(TungsteniteMessage::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection should be closed by the server");
}

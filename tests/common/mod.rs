//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docchat::{
    ApiError, ChannelConnection, ChannelEvent, ChatApi, ChatClient, ClientConfig, ConnectionId,
    Connector, ManualScheduler, MemorySnapshotStore, TransportError,
};
use time::OffsetDateTime;
use time::macros::datetime;

pub const T0: OffsetDateTime = datetime!(2025-06-01 9:00 UTC);

// ============================================
// Chat API double
// ============================================

#[derive(Default)]
pub struct ApiLog {
    pub created: Vec<(u64, String, Option<String>)>,
    pub deleted: Vec<String>,
    pub recorded: Vec<(String, String, bool, String)>,
    pub fail_create: bool,
    pub fail_delete: bool,
    pub fail_record: bool,
    /// `record_message` never completes.
    pub hang_record: bool,
}

#[derive(Clone, Default)]
pub struct FakeApi {
    pub log: Arc<Mutex<ApiLog>>,
}

impl FakeApi {
    pub fn log(&self) -> std::sync::MutexGuard<'_, ApiLog> {
        self.log.lock().expect("api log poisoned")
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn create_conversation(
        &self,
        owner_id: u64,
        title: &str,
        document_id: Option<&str>,
    ) -> Result<String, ApiError> {
        let mut log = self.log();
        if log.fail_create {
            return Err(ApiError::Rejected("create disabled".into()));
        }
        log.created
            .push((owner_id, title.to_string(), document_id.map(str::to_string)));
        Ok(format!("conv-{}", log.created.len()))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let mut log = self.log();
        if log.fail_delete {
            return Err(ApiError::Rejected("delete disabled".into()));
        }
        log.deleted.push(conversation_id.to_string());
        Ok(())
    }

    async fn record_message(
        &self,
        conversation_id: &str,
        text: &str,
        is_bot: bool,
        kind: &str,
    ) -> Result<(), ApiError> {
        let hang = self.log().hang_record;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut log = self.log();
        if log.fail_record {
            return Err(ApiError::Status {
                status: 500,
                body: "boom".into(),
            });
        }
        log.recorded.push((
            conversation_id.to_string(),
            text.to_string(),
            is_bot,
            kind.to_string(),
        ));
        Ok(())
    }
}

// ============================================
// Transport double
// ============================================

#[derive(Default)]
pub struct ConnectorLog {
    pub opened: Vec<(String, ConnectionId)>,
    pub sent: Vec<(ConnectionId, String)>,
    pub closed: Vec<(ConnectionId, u16, String)>,
    pub fail_open: bool,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub log: Arc<Mutex<ConnectorLog>>,
}

impl FakeConnector {
    pub fn log(&self) -> std::sync::MutexGuard<'_, ConnectorLog> {
        self.log.lock().expect("connector log poisoned")
    }

    pub fn open_count(&self) -> usize {
        self.log().opened.len()
    }

    pub fn last_connection(&self) -> ConnectionId {
        self.log()
            .opened
            .last()
            .map(|(_, id)| *id)
            .expect("no connection opened")
    }
}

impl Connector for FakeConnector {
    fn open(
        &mut self,
        url: &str,
        connection: ConnectionId,
    ) -> Result<Box<dyn ChannelConnection>, TransportError> {
        let mut log = self.log();
        if log.fail_open {
            return Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: "open disabled".into(),
            });
        }
        log.opened.push((url.to_string(), connection));
        Ok(Box::new(FakeConnection {
            id: connection,
            log: self.log.clone(),
        }))
    }
}

struct FakeConnection {
    id: ConnectionId,
    log: Arc<Mutex<ConnectorLog>>,
}

impl ChannelConnection for FakeConnection {
    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.log
            .lock()
            .expect("connector log poisoned")
            .sent
            .push((self.id, frame));
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        self.log
            .lock()
            .expect("connector log poisoned")
            .closed
            .push((self.id, code, reason.to_string()));
    }
}

// ============================================
// Harness
// ============================================

pub struct Harness {
    pub client: ChatClient,
    pub scheduler: ManualScheduler,
    pub connector: FakeConnector,
    pub api: FakeApi,
    pub store: MemorySnapshotStore,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_store(config, MemorySnapshotStore::new())
    }

    pub fn with_store(config: ClientConfig, store: MemorySnapshotStore) -> Self {
        let scheduler = ManualScheduler::new(T0);
        let connector = FakeConnector::default();
        let api = FakeApi::default();
        let client = ChatClient::new(
            config,
            Arc::new(api.clone()),
            Box::new(connector.clone()),
            Box::new(scheduler.clone()),
            Box::new(store.clone()),
        );
        Self {
            client,
            scheduler,
            connector,
            api,
            store,
        }
    }

    /// Advance the fake clock and deliver every task that came due.
    pub async fn advance(&mut self, by: Duration) {
        for (handle, task) in self.scheduler.advance(by) {
            self.client.handle_timer(handle, task).await;
        }
    }

    pub fn emit(&mut self, event: ChannelEvent) {
        let id = self.connector.last_connection();
        self.client.handle_channel_event(id, event);
    }

    pub fn open(&mut self) {
        self.emit(ChannelEvent::Opened);
    }

    pub fn frame(&mut self, raw: &str) {
        self.emit(ChannelEvent::Frame(raw.to_string()));
    }

    pub fn close(&mut self, code: u16) {
        self.emit(ChannelEvent::Closed {
            code,
            reason: String::new(),
        });
    }

    /// Connect and report the channel open.
    pub async fn connected(&mut self) {
        self.client.connect().await;
        self.open();
    }
}

/// Let detached tasks spawned by the client run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn quiet_config() -> ClientConfig {
    ClientConfig {
        auto_connect: false,
        ..ClientConfig::default()
    }
}

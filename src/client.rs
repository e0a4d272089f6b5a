//! Streaming chat client.
//!
//! `ChatClient` owns one logical channel for one conversation. It is driven
//! entirely by discrete events: user calls (`send_message`, `connect`, ...),
//! channel events (`handle_channel_event`) and timer firings (`handle_timer`).
//! None of its public operations fail; transport and backend problems show up
//! only as a change of `ConnectionState`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::RngExt;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ChatApi;
use crate::config::ClientConfig;
use crate::export::ConversationExport;
use crate::fallback::{fallback_metadata, simulated_reply};
use crate::protocol::{InboundFrame, NORMAL_CLOSURE, OutboundMessage, decode_frame};
use crate::scheduler::{Scheduler, TaskHandle, TimerTask};
use crate::storage::SnapshotStore;
use crate::transport::{ChannelConnection, ChannelEvent, ConnectionId, Connector};
use crate::types::{
    ConnectionMode, ConnectionState, ConnectionStatus, ConversationMessage, MessageMetadata,
    Sender, iso_timestamp,
};

/// Point-in-time view of the client for rendering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatSnapshot {
    pub state: ConnectionState,
    pub messages: Vec<ConversationMessage>,
    pub typing: bool,
}

struct LiveConnection {
    id: ConnectionId,
    handle: Box<dyn ChannelConnection>,
    open: bool,
}

pub struct ChatClient {
    config: ClientConfig,
    api: Arc<dyn ChatApi>,
    connector: Box<dyn Connector>,
    scheduler: Box<dyn Scheduler>,
    store: Box<dyn SnapshotStore>,
    state: ConnectionState,
    messages: Vec<ConversationMessage>,
    typing: bool,
    live: Option<LiveConnection>,
    connections_opened: u64,
    /// Cleared by `disconnect` and by transport errors; blocks scheduled reconnects.
    auto_reconnect: bool,
    connect_timer: Option<TaskHandle>,
    reconnect_timer: Option<TaskHandle>,
    reply_timers: HashSet<TaskHandle>,
    /// Set by stream frames, which are saved on stop instead of per frame.
    unsaved: bool,
}

impl ChatClient {
    /// Build a client and restore the last saved message list.
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn ChatApi>,
        connector: Box<dyn Connector>,
        scheduler: Box<dyn Scheduler>,
        store: Box<dyn SnapshotStore>,
    ) -> Self {
        let messages = restore_messages(store.as_ref(), &config, scheduler.now());
        Self {
            config,
            api,
            connector,
            scheduler,
            store,
            state: ConnectionState::default(),
            messages,
            typing: false,
            live: None,
            connections_opened: 0,
            auto_reconnect: true,
            connect_timer: None,
            reconnect_timer: None,
            reply_timers: HashSet::new(),
            unsaved: false,
        }
    }

    // ============================================
    // Accessors
    // ============================================

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    pub fn mode(&self) -> ConnectionMode {
        self.state.mode
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.state.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn is_connected(&self) -> bool {
        self.live.as_ref().is_some_and(|live| live.open)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            state: self.state.clone(),
            messages: self.messages.clone(),
            typing: self.typing,
        }
    }

    // ============================================
    // Connection lifecycle
    // ============================================

    /// Schedule the first connect attempt, if auto-connect is enabled.
    pub fn start(&mut self) {
        if !self.config.auto_connect || self.connect_timer.is_some() {
            return;
        }
        let handle = self
            .scheduler
            .schedule(self.config.initial_connect_delay, TimerTask::InitialConnect);
        self.connect_timer = Some(handle);
    }

    /// Explicit connect request. Ignored in simulated mode or while a channel
    /// is open or opening.
    pub async fn connect(&mut self) {
        if self.state.is_simulated() {
            debug!("Connect ignored in simulated mode");
            return;
        }
        self.auto_reconnect = true;
        self.open_channel().await;
    }

    /// Leave simulated mode, reset the retry budget and connect again.
    pub async fn retry(&mut self) {
        info!("Retrying channel connection");
        self.cancel_reconnect();
        self.state.mode = ConnectionMode::Live;
        self.state.reconnect_attempts = 0;
        if self.state.status == ConnectionStatus::Error {
            self.state.status = ConnectionStatus::Disconnected;
        }
        self.auto_reconnect = true;
        self.open_channel().await;
    }

    /// User-initiated disconnect. Cancels any pending reconnect before the
    /// channel is closed; does not enter simulated mode.
    pub fn disconnect(&mut self) {
        self.cancel_reconnect();
        if let Some(handle) = self.connect_timer.take() {
            self.scheduler.cancel(handle);
        }
        self.auto_reconnect = false;
        self.close_live(NORMAL_CLOSURE, "User disconnected");
        self.state.status = ConnectionStatus::Disconnected;
        self.state.reconnect_attempts = 0;
        self.typing = false;
    }

    /// Disconnect and drop every pending timer. Also runs on drop.
    pub fn shutdown(&mut self) {
        self.disconnect();
        for handle in self.reply_timers.drain() {
            self.scheduler.cancel(handle);
        }
        if self.unsaved {
            self.persist();
        }
    }

    async fn open_channel(&mut self) {
        if self.state.is_simulated() {
            return;
        }
        if self.live.is_some() {
            debug!("Channel already open, skipping connect");
            return;
        }
        if self.state.status == ConnectionStatus::Connecting {
            debug!("Connection already in progress, skipping connect");
            return;
        }

        self.state.status = ConnectionStatus::Connecting;

        let Some(conversation_id) = self.ensure_conversation().await else {
            warn!("No conversation available, switching to simulated mode");
            self.enter_failed_state();
            return;
        };

        let url = self.config.channel_url(&conversation_id);
        self.connections_opened += 1;
        let id = ConnectionId(self.connections_opened);
        info!("Connecting channel {:?} to {}", id, url);

        match self.connector.open(&url, id) {
            Ok(handle) => {
                self.live = Some(LiveConnection {
                    id,
                    handle,
                    open: false,
                });
            }
            Err(err) => {
                warn!("Failed to open channel: {}", err);
                self.enter_failed_state();
            }
        }
    }

    async fn ensure_conversation(&mut self) -> Option<String> {
        if let Some(id) = &self.state.conversation_id {
            return Some(id.clone());
        }

        let title = self.conversation_title();
        match self
            .api
            .create_conversation(
                self.config.owner_id,
                &title,
                self.config.document_id.as_deref(),
            )
            .await
        {
            Ok(id) => {
                info!("Created conversation {}", id);
                self.state.conversation_id = Some(id.clone());
                Some(id)
            }
            Err(err) => {
                warn!("Failed to create conversation: {}", err);
                None
            }
        }
    }

    fn conversation_title(&self) -> String {
        let mut now = self.scheduler.now();
        if let Ok(offset) = UtcOffset::current_local_offset() {
            now = now.to_offset(offset);
        }
        let stamp = now
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .unwrap_or_default();
        if self.config.has_document() {
            format!("Chat with Document {stamp}")
        } else {
            format!("Chat {stamp}")
        }
    }

    fn enter_failed_state(&mut self) {
        self.state.status = ConnectionStatus::Error;
        self.state.mode = ConnectionMode::Simulated;
        self.auto_reconnect = false;
        self.typing = false;
    }

    fn close_live(&mut self, code: u16, reason: &str) {
        if let Some(mut live) = self.live.take() {
            live.handle.close(code, reason);
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(handle) = self.reconnect_timer.take() {
            self.scheduler.cancel(handle);
        }
    }

    // ============================================
    // Channel events
    // ============================================

    pub fn handle_channel_event(&mut self, connection: ConnectionId, event: ChannelEvent) {
        let current = self.live.as_ref().map(|live| live.id);
        if current != Some(connection) {
            debug!("Ignoring {:?} from stale channel {:?}", event, connection);
            return;
        }

        match event {
            ChannelEvent::Opened => {
                info!("Channel connected");
                if let Some(live) = self.live.as_mut() {
                    live.open = true;
                }
                self.state.status = ConnectionStatus::Connected;
                self.state.mode = ConnectionMode::Live;
                self.state.reconnect_attempts = 0;
                self.auto_reconnect = true;
            }
            ChannelEvent::Frame(raw) => self.handle_frame(&raw),
            ChannelEvent::Closed { code, reason } => self.handle_close(code, &reason),
            ChannelEvent::Error(reason) => {
                warn!("Channel failed ({}), switching to simulated mode", reason);
                // The close that follows belongs to a dropped channel and is ignored.
                self.live = None;
                self.enter_failed_state();
            }
        }
    }

    fn handle_close(&mut self, code: u16, reason: &str) {
        info!("Channel closed: {} {}", code, reason);
        self.live = None;
        self.state.status = ConnectionStatus::Disconnected;

        if code == NORMAL_CLOSURE {
            return;
        }

        let attempts = self.state.reconnect_attempts;
        if !self.auto_reconnect || self.config.reconnect.is_exhausted(attempts) {
            info!(
                "Giving up after {} attempt(s), switching to simulated mode",
                attempts + 1
            );
            self.state.mode = ConnectionMode::Simulated;
            self.auto_reconnect = false;
            return;
        }

        let delay = self.config.reconnect.delay_for(attempts);
        debug!("Reconnecting in {:?}", delay);
        self.cancel_reconnect();
        self.reconnect_timer = Some(self.scheduler.schedule(delay, TimerTask::Reconnect));
    }

    pub async fn handle_timer(&mut self, handle: TaskHandle, task: TimerTask) {
        match task {
            TimerTask::InitialConnect => {
                if self.connect_timer != Some(handle) {
                    return;
                }
                self.connect_timer = None;
                if self.auto_reconnect {
                    self.open_channel().await;
                }
            }
            TimerTask::Reconnect => {
                if self.reconnect_timer != Some(handle) {
                    return;
                }
                self.reconnect_timer = None;
                if self.state.is_simulated() || !self.auto_reconnect {
                    return;
                }
                self.state.reconnect_attempts += 1;
                self.open_channel().await;
            }
            TimerTask::SimulatedReply { prompt } => {
                if self.reply_timers.remove(&handle) {
                    self.deliver_simulated_reply(&prompt);
                }
            }
        }
    }

    // ============================================
    // Inbound frames
    // ============================================

    fn handle_frame(&mut self, raw: &str) {
        self.typing = false;

        let frame = match decode_frame(raw) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Dropping undecodable frame: {}", err);
                return;
            }
        };

        match frame {
            InboundFrame::StreamStart {
                token,
                timestamp,
                message_context,
            } => {
                if self.messages.iter().any(|msg| msg.id == token) {
                    warn!("Stream {} already started, ignoring", token);
                    return;
                }
                let metadata = MessageMetadata {
                    message_context,
                    streaming: Some(true),
                    ..MessageMetadata::default()
                };
                let timestamp = timestamp.unwrap_or_else(|| self.now_iso());
                let message =
                    ConversationMessage::bot(token, String::new(), timestamp).with_metadata(metadata);
                self.messages.push(message);
                self.unsaved = true;
                return;
            }
            InboundFrame::StreamPartial { token, text } => {
                match self
                    .messages
                    .iter_mut()
                    .find(|msg| msg.id == token && msg.is_streaming())
                {
                    Some(msg) => msg.content.push_str(&text),
                    None => {
                        debug!("Dropping partial for unknown or finished stream {}", token);
                        return;
                    }
                }
                self.unsaved = true;
                return;
            }
            InboundFrame::StreamStop { token } => {
                let Some(metadata) = self
                    .messages
                    .iter_mut()
                    .find(|msg| msg.id == token && msg.is_streaming())
                    .and_then(|msg| msg.metadata.as_mut())
                else {
                    debug!("Stop for unknown or finished stream {}", token);
                    return;
                };
                metadata.streaming = Some(false);
            }
            InboundFrame::Complete {
                id,
                text,
                timestamp,
                metadata,
            } => {
                let id = self.unused_id(id);
                let timestamp = timestamp.unwrap_or_else(|| self.now_iso());
                let mut message = ConversationMessage::bot(id, text, timestamp);
                message.metadata = metadata;
                self.messages.push(message);
            }
            InboundFrame::UserEcho => {
                debug!("Ignoring echoed user message");
                return;
            }
            InboundFrame::Unrecognized {
                text,
                timestamp,
                metadata,
            } => {
                if self.echoes_last_user_message(&text) {
                    debug!("Ignoring frame that repeats the user query");
                    return;
                }
                let timestamp = timestamp.unwrap_or_else(|| self.now_iso());
                let mut message =
                    ConversationMessage::bot(Uuid::new_v4().to_string(), text, timestamp);
                message.metadata = metadata;
                self.messages.push(message);
            }
            InboundFrame::Ignored => return,
        }

        self.persist();
    }

    fn unused_id(&self, candidate: Option<String>) -> String {
        candidate
            .filter(|id| !id.is_empty() && !self.messages.iter().any(|msg| &msg.id == id))
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    fn echoes_last_user_message(&self, text: &str) -> bool {
        self.messages
            .iter()
            .rev()
            .find(|msg| msg.sender == Sender::User)
            .is_some_and(|last| text.to_lowercase().contains(&last.content.to_lowercase()))
    }

    // ============================================
    // Outbound messages
    // ============================================

    /// Submit user input. Returns false when the text was rejected as blank
    /// or as a duplicate of a recent submission.
    pub async fn send_message(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        let now = self.scheduler.now();
        if self.is_recent_duplicate(text, now) {
            info!("Duplicate message detected, skipping");
            return false;
        }

        let message = ConversationMessage::user(Uuid::new_v4().to_string(), text, now);
        let timestamp = message.timestamp.clone();
        self.messages.push(message);
        self.typing = true;
        self.persist();

        if let Some(conversation_id) = self.live_conversation()
            && self.transmit(text, &timestamp)
        {
            self.record_in_background(conversation_id, text.to_string());
            return true;
        }

        self.schedule_simulated_reply(text);

        let idle = self.live.is_none()
            && self.reconnect_timer.is_none()
            && self.state.status == ConnectionStatus::Disconnected;
        if idle && self.auto_reconnect && !self.state.is_simulated() {
            self.open_channel().await;
        }
        true
    }

    /// Saving the message server-side is best effort and must not hold up
    /// the event loop.
    fn record_in_background(&self, conversation_id: String, text: String) {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(err) = api
                .record_message(&conversation_id, &text, false, "text")
                .await
            {
                warn!("Failed to save user message: {}", err);
            }
        });
    }

    fn live_conversation(&self) -> Option<String> {
        if !self.is_connected() || self.state.is_simulated() {
            return None;
        }
        self.state.conversation_id.clone()
    }

    fn transmit(&mut self, text: &str, timestamp: &str) -> bool {
        let frame = OutboundMessage::new(
            text,
            timestamp,
            self.config.owner_id,
            self.config.document_id.as_deref(),
        );
        let payload = match frame.to_json() {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Failed to encode outbound frame: {}", err);
                return false;
            }
        };
        let Some(live) = self.live.as_mut() else {
            return false;
        };
        match live.handle.send(payload) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to send message over channel: {}", err);
                false
            }
        }
    }

    fn is_recent_duplicate(&self, text: &str, now: OffsetDateTime) -> bool {
        let window = self.config.duplicate_window.as_millis() as i128;
        let lookback = self.messages.len().saturating_sub(self.config.duplicate_lookback);
        self.messages[lookback..].iter().any(|msg| {
            msg.sender == Sender::User
                && msg.content == text
                && msg
                    .created_at()
                    .is_some_and(|at| (now - at).whole_milliseconds() < window)
        })
    }

    fn schedule_simulated_reply(&mut self, prompt: &str) {
        let min = self.config.simulated_reply_min;
        let max = self.config.simulated_reply_max;
        let delay = if max > min {
            let millis = rand::rng().random_range(min.as_millis() as u64..max.as_millis() as u64);
            Duration::from_millis(millis)
        } else {
            min
        };
        let handle = self.scheduler.schedule(
            delay,
            TimerTask::SimulatedReply {
                prompt: prompt.to_string(),
            },
        );
        self.reply_timers.insert(handle);
    }

    fn deliver_simulated_reply(&mut self, prompt: &str) {
        let content = simulated_reply(prompt, self.config.has_document());
        let message = ConversationMessage::bot(Uuid::new_v4().to_string(), content, self.now_iso())
            .with_metadata(fallback_metadata());
        self.messages.push(message);
        self.typing = false;
        self.persist();
    }

    // ============================================
    // Clear / export
    // ============================================

    /// Reset the conversation. When live, the server-side conversation is
    /// replaced by a fresh one; failures there are logged and ignored.
    pub async fn clear_conversation(&mut self) {
        if !self.state.is_simulated()
            && let Some(old) = self.state.conversation_id.clone()
        {
            self.replace_conversation(&old).await;
        }

        for handle in self.reply_timers.drain() {
            self.scheduler.cancel(handle);
        }
        self.messages = vec![self.greeting()];
        self.typing = false;
        self.persist();
    }

    async fn replace_conversation(&mut self, old: &str) {
        if let Err(err) = self.api.delete_conversation(old).await {
            warn!("Could not reset server conversation: {}", err);
            return;
        }

        // The channel is bound to the deleted conversation; rebind it.
        let resume = self.live.is_some() || self.reconnect_timer.is_some();
        self.cancel_reconnect();
        self.close_live(NORMAL_CLOSURE, "Conversation cleared");
        self.state.conversation_id = None;
        self.state.status = ConnectionStatus::Disconnected;

        if self.ensure_conversation().await.is_some() && resume {
            self.open_channel().await;
        }
    }

    pub fn export(&self) -> ConversationExport {
        ConversationExport::new(
            self.state.conversation_id.clone(),
            &self.messages,
            self.scheduler.now(),
        )
    }

    /// Replace the message list with an exported one, behind a fresh greeting.
    pub fn import(&mut self, export: ConversationExport) {
        let mut messages = vec![self.greeting()];
        messages.extend(export.messages.into_iter().filter(|msg| !msg.is_greeting()));
        self.messages = messages;
        self.persist();
    }

    fn greeting(&self) -> ConversationMessage {
        ConversationMessage::greeting(self.config.has_document(), self.scheduler.now())
    }

    fn now_iso(&self) -> String {
        iso_timestamp(self.scheduler.now())
    }

    fn persist(&mut self) {
        let encoded = match serde_json::to_string(&self.messages) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("Failed to encode message snapshot: {}", err);
                return;
            }
        };
        match self.store.save(&self.config.storage_key, &encoded) {
            Ok(()) => self.unsaved = false,
            Err(err) => warn!("Failed to save message snapshot: {}", err),
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn restore_messages(
    store: &dyn SnapshotStore,
    config: &ClientConfig,
    now: OffsetDateTime,
) -> Vec<ConversationMessage> {
    let greeting = || vec![ConversationMessage::greeting(config.has_document(), now)];

    let Some(raw) = store.load(&config.storage_key) else {
        return greeting();
    };
    match serde_json::from_str::<Vec<ConversationMessage>>(&raw) {
        Ok(mut messages) if !messages.is_empty() => {
            // A stream cut off by a restart never receives its stop frame.
            for msg in messages.iter_mut() {
                if msg.is_streaming()
                    && let Some(metadata) = msg.metadata.as_mut()
                {
                    metadata.streaming = Some(false);
                }
            }
            messages
        }
        Ok(_) => greeting(),
        Err(err) => {
            warn!("Ignoring corrupt message snapshot: {}", err);
            greeting()
        }
    }
}

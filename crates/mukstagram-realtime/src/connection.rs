//! The connection manager.
//!
//! One tokio task owns the socket and serially handles socket events, the
//! heartbeat, reconnect timers, auth transitions and control commands. The
//! [`RealtimeClient`] handle talks to it over a control channel and shares
//! the router, the connection state and the outbound sender with it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mukstagram_models::gateway::{OutboundFrame, CLOSE_SUPERSEDED};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::auth::{AuthState, CredentialStore};
use crate::backoff::{ReconnectPolicy, Reconnector, ScheduledReconnect};
use crate::commands::OutboundChannel;
use crate::conversation::ConversationGuard;
use crate::endpoint::Endpoint;
use crate::error::RealtimeError;
use crate::notifier::Notifier;
use crate::router::MessageRouter;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connecting,
    Open,
    #[default]
    Closed,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Endpoint derived from the REST API base URL.
    pub fn from_api_url(api_url: &str) -> Result<Self, RealtimeError> {
        Ok(Self::new(Endpoint::from_api_url(api_url)?))
    }
}

#[derive(Debug)]
enum Control {
    Connect,
    Disconnect,
    Shutdown,
}

/// Handle to a running realtime channel.
///
/// The background task is aborted when the handle is dropped; use
/// [`RealtimeClient::shutdown`] for an orderly close.
pub struct RealtimeClient {
    router: Arc<MessageRouter>,
    state: watch::Receiver<ConnectionState>,
    attempts: Arc<AtomicU32>,
    control: mpsc::UnboundedSender<Control>,
    outbound: OutboundChannel,
    task: Option<JoinHandle<()>>,
}

impl RealtimeClient {
    /// Start the connection manager on the current tokio runtime.
    ///
    /// The channel connects right away if `auth` is already authenticated,
    /// and follows every later transition of `auth`.
    pub fn spawn(
        config: ClientConfig,
        credentials: Arc<dyn CredentialStore>,
        auth: watch::Receiver<AuthState>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let router = Arc::new(MessageRouter::new(notifier));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicU32::new(0));
        let outbound = OutboundChannel::new();

        let manager = ConnectionManager {
            reconnector: Reconnector::new(config.reconnect),
            config,
            credentials,
            auth,
            router: Arc::clone(&router),
            state: state_tx,
            attempts: Arc::clone(&attempts),
            outbound: outbound.clone(),
            control: control_rx,
            session_user: None,
        };
        let task = tokio::spawn(manager.run());

        Self {
            router,
            state: state_rx,
            attempts,
            control: control_tx,
            outbound,
            task: Some(task),
        }
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Open the channel if it is not open; resets the reconnect counter.
    pub fn connect(&self) {
        self.control_send(Control::Connect);
    }

    /// Close the channel and stay closed until `connect` or the next sign-in.
    pub fn disconnect(&self) {
        self.control_send(Control::Disconnect);
    }

    pub fn outbound(&self) -> &OutboundChannel {
        &self.outbound
    }

    pub fn send(&self, frame: OutboundFrame) {
        self.outbound.send(frame);
    }

    pub fn join_room(&self, room_id: impl Into<String>) {
        self.outbound.join_room(room_id);
    }

    pub fn leave_room(&self, room_id: impl Into<String>) {
        self.outbound.leave_room(room_id);
    }

    pub fn send_chat_message(&self, room_id: impl Into<String>, message: impl Into<String>) {
        self.outbound.send_chat_message(room_id, message);
    }

    pub fn send_typing(&self, room_id: impl Into<String>) {
        self.outbound.send_typing(room_id);
    }

    pub fn set_active_conversation(&self, conversation_id: Option<String>) {
        self.router.set_active(conversation_id);
    }

    pub fn enter_conversation(&self, conversation_id: impl Into<String>) -> ConversationGuard {
        self.router.active_conversation().enter(conversation_id)
    }

    /// Close the socket and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        self.control_send(Control::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "realtime task ended abnormally");
            }
        }
    }

    fn control_send(&self, command: Control) {
        if self.control.send(command).is_err() {
            tracing::debug!("realtime task is gone; ignoring control command");
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum Phase {
    Idle,
    Connect,
    Backoff(ScheduledReconnect),
    Stop,
}

enum SessionEnd {
    Lost,
    Superseded,
    Disconnect,
    SwitchUser,
    Stop,
}

struct ConnectionManager {
    config: ClientConfig,
    credentials: Arc<dyn CredentialStore>,
    auth: watch::Receiver<AuthState>,
    router: Arc<MessageRouter>,
    state: watch::Sender<ConnectionState>,
    attempts: Arc<AtomicU32>,
    reconnector: Reconnector,
    outbound: OutboundChannel,
    control: mpsc::UnboundedReceiver<Control>,
    session_user: Option<String>,
}

impl ConnectionManager {
    async fn run(mut self) {
        let initial = self.auth.borrow_and_update().clone();
        let mut phase = match initial.user_id() {
            Some(user_id) => {
                self.router.set_local_user_id(Some(user_id.to_string()));
                Phase::Connect
            }
            None => Phase::Idle,
        };

        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connect => self.connect_once().await,
                Phase::Backoff(scheduled) => self.backoff(scheduled).await,
                Phase::Stop => break,
            };
        }

        self.outbound.detach();
        self.set_state(ConnectionState::Closed);
        tracing::debug!("realtime connection manager stopped");
    }

    async fn idle(&mut self) -> Phase {
        loop {
            tokio::select! {
                changed = self.auth.changed() => return self.on_auth_change(changed.is_ok()),
                command = self.control.recv() => match command {
                    Some(Control::Connect) => {
                        self.resume();
                        return Phase::Connect;
                    }
                    Some(Control::Disconnect) => self.disconnect_cleanup(),
                    Some(Control::Shutdown) | None => return Phase::Stop,
                },
            }
        }
    }

    async fn connect_once(&mut self) -> Phase {
        // The token is resolved for this user; the dial is only valid for them.
        let Some(dial_user) = self.auth.borrow().user_id().map(str::to_string) else {
            tracing::debug!("not authenticated; realtime channel stays closed");
            return Phase::Idle;
        };
        let url = match self.resolve_url() {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "cannot open realtime channel");
                return Phase::Idle;
            }
        };

        self.set_state(ConnectionState::Connecting);
        tracing::info!(endpoint = %self.config.endpoint.url(), "connecting realtime channel");

        let dial = tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()));
        tokio::pin!(dial);

        let result = loop {
            tokio::select! {
                result = &mut dial => break result,
                changed = self.auth.changed() => match self.on_auth_change(changed.is_ok()) {
                    Phase::Connect if self.auth.borrow().user_id() == Some(dial_user.as_str()) => {
                        continue
                    }
                    Phase::Connect => {
                        tracing::info!("user changed while connecting; redialing");
                        return Phase::Connect;
                    }
                    other => return other,
                },
                command = self.control.recv() => match command {
                    Some(Control::Connect) => continue,
                    Some(Control::Disconnect) => {
                        self.disconnect_cleanup();
                        return Phase::Idle;
                    }
                    Some(Control::Shutdown) | None => return Phase::Stop,
                },
            }
        };

        match result {
            Ok(Ok((socket, _response))) => self.run_session(socket, dial_user).await,
            Ok(Err(e)) => {
                let err = RealtimeError::from(e);
                tracing::warn!(error = %err, "realtime connect failed");
                self.after_close()
            }
            Err(_) => {
                let err = RealtimeError::ConnectTimeout(self.config.connect_timeout.as_millis());
                tracing::warn!(error = %err, "realtime connect failed");
                self.after_close()
            }
        }
    }

    async fn run_session(&mut self, socket: Socket, user_id: String) -> Phase {
        let (mut sink, mut source) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();

        self.session_user = Some(user_id);
        self.outbound.attach(out_tx);
        self.reconnector.on_open();
        self.sync_attempts();
        self.set_state(ConnectionState::Open);
        tracing::info!(user_id = ?self.session_user, "realtime channel open");

        let period = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => self.router.handle_text(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        if code == Some(CLOSE_SUPERSEDED) {
                            tracing::info!("realtime channel superseded by a newer connection");
                            break SessionEnd::Superseded;
                        }
                        tracing::info!(?frame, "gateway closed the realtime channel");
                        break SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let err = RealtimeError::from(e);
                        tracing::warn!(error = %err, "realtime channel error");
                        break SessionEnd::Lost;
                    }
                    None => break SessionEnd::Lost,
                },
                Some(frame) = out_rx.recv() => {
                    if let Err(e) = sink.send(Message::Text(frame.to_text().into())).await {
                        let err = RealtimeError::from(e);
                        tracing::warn!(error = %err, kind = frame.kind(), "realtime send failed");
                        break SessionEnd::Lost;
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = sink.send(Message::Text(OutboundFrame::Ping.to_text().into())).await {
                        let err = RealtimeError::from(e);
                        tracing::warn!(error = %err, "realtime heartbeat failed");
                        break SessionEnd::Lost;
                    }
                }
                changed = self.auth.changed() => {
                    if changed.is_err() {
                        break SessionEnd::Stop;
                    }
                    let current = self.auth.borrow_and_update().clone();
                    match current.user_id() {
                        None => {
                            tracing::info!("signed out; closing realtime channel");
                            self.router.set_local_user_id(None);
                            break SessionEnd::Disconnect;
                        }
                        Some(user_id) if Some(user_id) != self.session_user.as_deref() => {
                            self.router.set_local_user_id(Some(user_id.to_string()));
                            break SessionEnd::SwitchUser;
                        }
                        Some(_) => {}
                    }
                }
                command = self.control.recv() => match command {
                    Some(Control::Connect) => {}
                    Some(Control::Disconnect) => break SessionEnd::Disconnect,
                    Some(Control::Shutdown) | None => break SessionEnd::Stop,
                },
            }
        };

        self.outbound.detach();
        self.session_user = None;
        if !matches!(end, SessionEnd::Lost | SessionEnd::Superseded) {
            if let Err(e) = sink.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "close frame not delivered");
            }
        }

        match end {
            SessionEnd::Lost => self.after_close(),
            SessionEnd::Superseded => {
                self.set_state(ConnectionState::Closed);
                Phase::Idle
            }
            SessionEnd::Disconnect => {
                self.disconnect_cleanup();
                Phase::Idle
            }
            SessionEnd::SwitchUser => {
                self.set_state(ConnectionState::Closed);
                self.router.reset_session();
                self.resume();
                Phase::Connect
            }
            SessionEnd::Stop => Phase::Stop,
        }
    }

    async fn backoff(&mut self, scheduled: ScheduledReconnect) -> Phase {
        let sleep = tokio::time::sleep(scheduled.delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Phase::Connect,
                changed = self.auth.changed() => return self.on_auth_change(changed.is_ok()),
                command = self.control.recv() => match command {
                    Some(Control::Connect) => {
                        self.resume();
                        return Phase::Connect;
                    }
                    Some(Control::Disconnect) => {
                        self.disconnect_cleanup();
                        return Phase::Idle;
                    }
                    Some(Control::Shutdown) | None => return Phase::Stop,
                },
            }
        }
    }

    fn resolve_url(&self) -> Result<Url, RealtimeError> {
        let token = self
            .credentials
            .access_token()?
            .ok_or(RealtimeError::MissingToken)?;
        Ok(self.config.endpoint.with_token(&token))
    }

    fn on_auth_change(&mut self, sender_alive: bool) -> Phase {
        if !sender_alive {
            tracing::debug!("auth state source dropped; stopping realtime channel");
            self.disconnect_cleanup();
            return Phase::Stop;
        }
        let current = self.auth.borrow_and_update().clone();
        match current {
            AuthState::Authenticated { user_id } => {
                self.router.set_local_user_id(Some(user_id));
                self.resume();
                Phase::Connect
            }
            AuthState::SignedOut => {
                tracing::info!("signed out; closing realtime channel");
                self.router.set_local_user_id(None);
                self.disconnect_cleanup();
                Phase::Idle
            }
        }
    }

    fn after_close(&mut self) -> Phase {
        self.set_state(ConnectionState::Closed);
        let authenticated = self.auth.borrow().is_authenticated();
        match self.reconnector.on_close(authenticated) {
            Some(scheduled) => {
                self.sync_attempts();
                tracing::info!(
                    attempt = scheduled.attempt,
                    delay_ms = scheduled.delay.as_millis() as u64,
                    "scheduling realtime reconnect"
                );
                Phase::Backoff(scheduled)
            }
            None => {
                if authenticated && self.reconnector.is_exhausted() && !self.reconnector.is_suppressed() {
                    tracing::warn!(
                        attempts = self.reconnector.attempts(),
                        "realtime reconnect attempts exhausted; waiting for connect"
                    );
                }
                Phase::Idle
            }
        }
    }

    fn disconnect_cleanup(&mut self) {
        self.reconnector.suppress();
        self.outbound.detach();
        self.set_state(ConnectionState::Closed);
        self.router.reset_session();
    }

    fn resume(&mut self) {
        self.reconnector.resume();
        self.sync_attempts();
    }

    fn sync_attempts(&self) {
        self.attempts.store(self.reconnector.attempts(), Ordering::Relaxed);
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

//! `listen` subcommand: a line-oriented terminal client for the gateway.

use std::sync::Arc;

use anyhow::{Context, Result};
use mukstagram_models::presence::OnlineStatus;
use mukstagram_realtime::conversation::ConversationGuard;
use mukstagram_realtime::{
    listener, ActivityBadges, AuthState, ChatEvent, CredentialStore, FileCredentialStore,
    Notifier, RealtimeClient, StaticCredentials, Toast, ToastKind,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::config::Config;

const HELP: &str = "\
commands:
  /join <room>          join a chat room
  /leave <room>         leave a chat room
  /say <room> <text>    send a chat message
  /typing <room>        send a typing indicator
  /focus <id>           mark a conversation as open
  /unfocus              clear the open conversation
  /online               list online users
  /badges               show activity badges
  /logout               sign out (closes the channel)
  /login                sign back in
  /quit                 exit";

/// Prints toasts straight to the terminal.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Error => eprintln!("[!] {}", toast.message),
            _ => println!("[toast] {}", toast.message),
        }
    }
}

pub async fn run(config: &Config, user_id: String, token_file: Option<String>) -> Result<()> {
    let credentials: Arc<dyn CredentialStore> = match token_file {
        Some(path) => Arc::new(FileCredentialStore::new(path)),
        None => {
            tracing::warn!("No token file configured; the channel will not open");
            Arc::new(StaticCredentials::empty())
        }
    };
    let client_config = config
        .realtime
        .client_config()
        .context("invalid realtime endpoint")?;
    tracing::info!("Connecting to {}", client_config.endpoint.url());

    let (auth, auth_rx) = watch::channel(AuthState::authenticated(user_id.as_str()));
    let client = RealtimeClient::spawn(
        client_config,
        credentials,
        auth_rx,
        Arc::new(ConsoleNotifier),
    );
    let badges = ActivityBadges::attach(client.router());

    let on_presence = listener(|status: &OnlineStatus| {
        let state = if status.is_online { "online" } else { "offline" };
        println!("* {} is {state}", status.user_id);
    });
    let on_chat = listener(|event: &ChatEvent| match event {
        ChatEvent::Message(frame) => println!(
            "[{}] {}: {}",
            frame.conversation_id.as_deref().unwrap_or("?"),
            frame.message.sender_id().unwrap_or("?"),
            frame.message.content
        ),
        ChatEvent::Typing(typing) => {
            println!("[{}] {} is typing...", typing.room_id, typing.user_id)
        }
    });
    let listeners = client.router().listeners();
    listeners.presence.subscribe(&on_presence);
    listeners.chat.subscribe(&on_chat);

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut focus: Option<ConversationGuard> = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let mut parts = line.trim().splitn(3, ' ');
        let command = parts.next().unwrap_or_default();
        let arg = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();

        match (command, arg) {
            ("", _) => {}
            ("/join", room) if !room.is_empty() => client.join_room(room),
            ("/leave", room) if !room.is_empty() => client.leave_room(room),
            ("/say", room) if !room.is_empty() && !rest.is_empty() => {
                client.send_chat_message(room, rest)
            }
            ("/typing", room) if !room.is_empty() => client.send_typing(room),
            ("/focus", id) if !id.is_empty() => {
                if focus.as_ref().map(ConversationGuard::conversation_id) != Some(id) {
                    focus = Some(client.enter_conversation(id));
                }
            }
            ("/unfocus", _) => focus = None,
            ("/online", _) => {
                println!("online: {}", client.router().online_users().snapshot().join(", "))
            }
            ("/badges", _) => println!(
                "notifications: {}  messages: {}",
                badges.has_new_notification(),
                badges.has_new_message()
            ),
            ("/logout", _) => {
                auth.send_replace(AuthState::SignedOut);
            }
            ("/login", _) => {
                auth.send_replace(AuthState::authenticated(user_id.as_str()));
            }
            ("/quit", _) => break,
            _ => println!("{HELP}"),
        }
    }

    drop(focus);
    listeners.presence.unsubscribe(&on_presence);
    listeners.chat.unsubscribe(&on_chat);
    drop(badges);
    client.shutdown().await;
    Ok(())
}

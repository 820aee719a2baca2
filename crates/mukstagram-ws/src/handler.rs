use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, Stream, StreamExt};
use mukstagram_models::gateway::{InboundFrame, OutboundFrame, CLOSE_SUPERSEDED};
use mukstagram_models::presence::InitialData;

use crate::session::Session;
use crate::GatewayState;

pub async fn handle_connection(socket: WebSocket, state: GatewayState, user_id: String) {
    let (connection_id, mut hub_rx) = state.hub.register(&user_id);
    let mut session = Session::new(user_id, connection_id);
    tracing::info!(user_id = %session.user_id, %connection_id, "gateway connection opened");

    state.hub.broadcast_online_status(&session.user_id, true);

    let (mut sender, mut receiver) = socket.split();

    let initial = InboundFrame::InitialData(InitialData {
        online_users: state.hub.online_users(),
        user_id: Some(session.user_id.clone()),
    });
    let greeted = match initial.to_text() {
        Some(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        None => false,
    };

    let reason = if greeted {
        run_session(&mut sender, &mut receiver, &mut hub_rx, &mut session, &state).await
    } else {
        "initial_data send error".to_string()
    };

    tracing::info!(user_id = %session.user_id, %connection_id, reason = %reason, "gateway connection closed");

    // A superseded connection leaves rooms and presence to its replacement.
    if state.hub.unregister(&session.user_id, session.connection_id) {
        session.rooms.clear();
        state.hub.leave_all_rooms(&session.user_id);
        state.hub.broadcast_online_status(&session.user_id, false);
    }
}

async fn run_session(
    sender: &mut (impl SinkExt<Message> + Unpin),
    receiver: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    hub_rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>,
    session: &mut Session,
    state: &GatewayState,
) -> String {
    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame = match serde_json::from_str::<OutboundFrame>(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::debug!(user_id = %session.user_id, error = %e, "ignoring unrecognised client frame");
                            continue;
                        }
                    };
                    if let Some(reply) = handle_client_frame(frame, session, state) {
                        if let Some(text) = reply.to_text() {
                            if sender.send(Message::Text(text.into())).await.is_err() {
                                return "websocket send error".to_string();
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame) => format!("client close frame (code={}, reason={})", frame.code, frame.reason),
                        None => "client close frame (no code/reason)".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return format!("websocket receive error: {err}"),
                None => return "websocket stream ended".to_string(),
            },
            outgoing = hub_rx.recv() => match outgoing {
                Some(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        return "websocket send error".to_string();
                    }
                }
                None => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: CLOSE_SUPERSEDED,
                            reason: "superseded by a newer connection".to_string().into(),
                        })))
                        .await;
                    return "superseded by a newer connection".to_string();
                }
            },
        }
    }
}

/// Apply one client frame. Returns a direct reply for the sender, if any.
fn handle_client_frame(
    frame: OutboundFrame,
    session: &mut Session,
    state: &GatewayState,
) -> Option<InboundFrame> {
    match frame {
        OutboundFrame::Ping => Some(InboundFrame::Pong),
        OutboundFrame::JoinRoom { room_id } => {
            if room_id.is_empty() {
                return None;
            }
            if session.join(&room_id) {
                tracing::debug!(user_id = %session.user_id, room_id = %room_id, "joined room");
            }
            state.hub.join_room(&room_id, &session.user_id);
            None
        }
        OutboundFrame::LeaveRoom { room_id } => {
            // Membership lives in the hub, keyed by user; it may predate this session.
            if session.leave(&room_id) {
                tracing::debug!(user_id = %session.user_id, room_id = %room_id, "left room");
            }
            state.hub.leave_room(&room_id, &session.user_id);
            None
        }
        OutboundFrame::ChatMessage { room_id, message } => {
            if room_id.is_empty() || message.is_empty() {
                return None;
            }
            if !state.rate_limits.allow_chat(&session.user_id) {
                tracing::debug!(user_id = %session.user_id, "chat rate limited (silent drop)");
                return None;
            }
            state.hub.send_room_chat(&room_id, &session.user_id, &message);
            None
        }
        OutboundFrame::Typing { room_id } => {
            if room_id.is_empty() {
                return None;
            }
            if !state.rate_limits.allow_typing(&session.user_id) {
                tracing::debug!(user_id = %session.user_id, "typing rate limited (silent drop)");
                return None;
            }
            state.hub.send_typing(&room_id, &session.user_id);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::GatewayLimits;
    use uuid::Uuid;

    fn state() -> GatewayState {
        GatewayState::new("0123456789abcdef0123456789abcdef", GatewayLimits::default())
    }

    #[test]
    fn ping_gets_pong() {
        let state = state();
        let mut session = Session::new("alice".into(), Uuid::new_v4());
        assert_eq!(
            handle_client_frame(OutboundFrame::Ping, &mut session, &state),
            Some(InboundFrame::Pong)
        );
    }

    #[test]
    fn join_and_leave_track_membership() {
        let state = state();
        let mut session = Session::new("alice".into(), Uuid::new_v4());
        handle_client_frame(OutboundFrame::JoinRoom { room_id: "r1".into() }, &mut session, &state);
        assert_eq!(state.hub.room_members("r1"), vec!["alice"]);
        assert!(session.rooms.contains("r1"));
        handle_client_frame(OutboundFrame::LeaveRoom { room_id: "r1".into() }, &mut session, &state);
        assert_eq!(state.hub.room_count(), 0);
    }

    #[test]
    fn leave_applies_to_membership_from_an_earlier_session() {
        let state = state();
        let mut earlier = Session::new("alice".into(), Uuid::new_v4());
        handle_client_frame(OutboundFrame::JoinRoom { room_id: "r1".into() }, &mut earlier, &state);

        let mut current = Session::new("alice".into(), Uuid::new_v4());
        handle_client_frame(OutboundFrame::LeaveRoom { room_id: "r1".into() }, &mut current, &state);
        assert!(state.hub.room_members("r1").is_empty());
        assert_eq!(state.hub.room_count(), 0);
    }

    #[test]
    fn empty_chat_is_ignored() {
        let state = state();
        let (_, mut rx) = state.hub.register("alice");
        let mut session = Session::new("alice".into(), Uuid::new_v4());
        handle_client_frame(OutboundFrame::JoinRoom { room_id: "r1".into() }, &mut session, &state);
        handle_client_frame(
            OutboundFrame::ChatMessage {
                room_id: "r1".into(),
                message: String::new(),
            },
            &mut session,
            &state,
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn chat_over_quota_is_dropped() {
        let state = GatewayState::new(
            "0123456789abcdef0123456789abcdef",
            GatewayLimits {
                chat_messages_per_minute: 1,
                typing_events_per_minute: 1,
            },
        );
        let (_, mut rx) = state.hub.register("alice");
        let mut session = Session::new("alice".into(), Uuid::new_v4());
        handle_client_frame(OutboundFrame::JoinRoom { room_id: "r1".into() }, &mut session, &state);
        for _ in 0..3 {
            handle_client_frame(
                OutboundFrame::ChatMessage {
                    room_id: "r1".into(),
                    message: "spam".into(),
                },
                &mut session,
                &state,
            );
        }
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}

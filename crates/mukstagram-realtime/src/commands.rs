use std::sync::Arc;

use mukstagram_models::gateway::OutboundFrame;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Best-effort sender for client frames.
///
/// Holds the write half of the live session while the channel is open.
/// Frames sent at any other time are dropped with a warning; nothing is
/// queued for a later connection.
#[derive(Clone, Default)]
pub struct OutboundChannel {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>>,
}

impl OutboundChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.tx.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn send(&self, frame: OutboundFrame) {
        let kind = frame.kind();
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            tracing::warn!(kind, "realtime channel is not open; dropping outbound frame");
            return;
        };
        if tx.send(frame).is_err() {
            tracing::warn!(kind, "realtime session ended; dropping outbound frame");
        }
    }

    pub fn join_room(&self, room_id: impl Into<String>) {
        self.send(OutboundFrame::JoinRoom {
            room_id: room_id.into(),
        });
    }

    pub fn leave_room(&self, room_id: impl Into<String>) {
        self.send(OutboundFrame::LeaveRoom {
            room_id: room_id.into(),
        });
    }

    pub fn send_chat_message(&self, room_id: impl Into<String>, message: impl Into<String>) {
        self.send(OutboundFrame::ChatMessage {
            room_id: room_id.into(),
            message: message.into(),
        });
    }

    pub fn send_typing(&self, room_id: impl Into<String>) {
        self.send(OutboundFrame::Typing {
            room_id: room_id.into(),
        });
    }

    pub(crate) fn attach(&self, tx: mpsc::UnboundedSender<OutboundFrame>) {
        *self.tx.lock() = Some(tx);
    }

    pub(crate) fn detach(&self) {
        self.tx.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_while_closed_is_dropped() {
        let channel = OutboundChannel::new();
        assert!(!channel.is_open());
        channel.send_chat_message("r1", "hello");
        channel.join_room("r1");

        // Nothing was queued for the next session.
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.attach(tx);
        assert!(rx.try_recv().is_err());
        channel.send_typing("r1");
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundFrame::Typing {
                room_id: "r1".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn attached_channel_forwards_frames() {
        let channel = OutboundChannel::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.attach(tx);
        assert!(channel.is_open());
        channel.send_typing("r1");
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundFrame::Typing {
                room_id: "r1".into()
            }
        );
        channel.detach();
        channel.leave_room("r1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clones_share_the_session() {
        let channel = OutboundChannel::new();
        let handle = channel.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.attach(tx);
        handle.join_room("lobby");
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundFrame::JoinRoom {
                room_id: "lobby".into()
            }
        );
    }
}

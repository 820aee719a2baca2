//! Client side of the Mukstagram realtime channel.
//!
//! [`RealtimeClient`] keeps one websocket to the gateway open while the user
//! is signed in, reconnecting with capped exponential backoff. Inbound
//! frames go through the [`MessageRouter`], which fans them out to
//! listeners, tracks presence and raises toasts through a [`Notifier`].

pub mod auth;
pub mod backoff;
pub mod badges;
pub mod commands;
pub mod connection;
pub mod conversation;
pub mod endpoint;
pub mod error;
pub mod listeners;
pub mod notifier;
pub mod presence;
pub mod router;

pub use auth::{AuthState, CredentialStore, FileCredentialStore, StaticCredentials};
pub use backoff::ReconnectPolicy;
pub use badges::ActivityBadges;
pub use connection::{ClientConfig, ConnectionState, RealtimeClient};
pub use endpoint::Endpoint;
pub use error::RealtimeError;
pub use listeners::{listener, ChatEvent, Listener};
pub use notifier::{Notifier, Toast, ToastAction, ToastKind, ToastQueue, TracingNotifier};
pub use router::MessageRouter;

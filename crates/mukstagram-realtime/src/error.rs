use thiserror::Error;

use crate::auth::CredentialError;
use crate::endpoint::EndpointError;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("invalid realtime endpoint: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("credential store error: {0}")]
    Credential(#[from] CredentialError),
    #[error("no access token available")]
    MissingToken,
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("connect timed out after {0}ms")]
    ConnectTimeout(u128),
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RealtimeError::WebSocket(Box::new(err))
    }
}

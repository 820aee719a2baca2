use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credentials from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Session state as seen by the realtime channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    SignedOut,
    Authenticated { user_id: String },
}

impl AuthState {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        AuthState::Authenticated {
            user_id: user_id.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthState::Authenticated { user_id } => Some(user_id),
            AuthState::SignedOut => None,
        }
    }
}

/// Source of the bearer token presented on connect.
///
/// Read on every connect attempt so a refreshed token is picked up by the
/// next reconnect.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> Result<Option<String>, CredentialError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn empty() -> Self {
        Self { token: None }
    }
}

impl CredentialStore for StaticCredentials {
    fn access_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.token.clone().filter(|t| !t.is_empty()))
    }
}

/// Token kept in a file, one line, surrounding whitespace ignored.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn access_token(&self) -> Result<Option<String>, CredentialError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CredentialError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

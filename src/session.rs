//! Local session file: a random id with an expiry, removed before self-update.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("файл сессии {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("файл сессии повреждён: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("некорректный срок действия сессии '{0}'")]
    BadExpiry(String),
    #[error("сессия истекла")]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub expires_at: String,
}

impl Session {
    pub fn new(ttl: Duration) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            expires_at: humantime::format_rfc3339_seconds(SystemTime::now() + ttl).to_string(),
        }
    }

    pub fn is_expired(&self) -> Result<bool, SessionError> {
        let expires = humantime::parse_rfc3339(&self.expires_at)
            .map_err(|_| SessionError::BadExpiry(self.expires_at.clone()))?;
        Ok(expires <= SystemTime::now())
    }

    /// Loads a still-valid session.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let session: Session = serde_json::from_str(&text)?;
        if session.is_expired()? {
            return Err(SessionError::Expired);
        }
        Ok(session)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        let io_err = |source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::write(path, serde_json::to_string_pretty(self)?).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }
        Ok(())
    }

    /// Removes the session file; a file that is already gone is not an error.
    pub fn clear(path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::health::notify::{NotifyError, Notifier};

/// Queued completion notice, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub queued_at: DateTime<Utc>,
}

/// Appends notices to a JSON-lines outbox for a mail relay to pick up.
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn transport(&self, err: impl std::fmt::Display) -> NotifyError {
        NotifyError::Transport(format!("{}: {err}", self.path.display()))
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let message = OutboxMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            queued_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&message).map_err(|err| self.transport(err))?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.transport(err))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| self.transport(err))?;
        file.write_all(line.as_bytes())
            .map_err(|err| self.transport(err))?;

        info!(recipient, subject, outbox = %self.path.display(), "queued notification");
        Ok(())
    }
}

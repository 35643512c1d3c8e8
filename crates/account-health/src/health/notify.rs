#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound completion notice (e-mail or similar).
pub trait Notifier: Send + Sync {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

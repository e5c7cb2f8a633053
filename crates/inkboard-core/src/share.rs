//! Collaborators outside the drawing engine: sharing exported images and
//! fetching decorative backgrounds.

use crate::storage::BoxFuture;
use thiserror::Error;

/// Sharing failures, surfaced to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    /// The service refused the request and said why.
    #[error("{0}")]
    Rejected(String),
    #[error("Sharing failed")]
    Failed,
}

/// An exported drawing addressed to a list of recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    pub sender_name: String,
    pub recipient_emails: Vec<String>,
    /// Send a copy to the owner as well.
    pub include_owner_cc: bool,
    /// PNG bytes produced by the exporter.
    pub image: Vec<u8>,
}

impl ShareRequest {
    /// Build a request, trimming addresses and dropping blank ones.
    pub fn new<I, S>(sender_name: impl Into<String>, recipients: I, include_owner_cc: bool, image: Vec<u8>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sender_name: sender_name.into(),
            recipient_emails: recipients
                .into_iter()
                .map(|email| email.as_ref().trim().to_string())
                .filter(|email| !email.is_empty())
                .collect(),
            include_owner_cc,
            image,
        }
    }
}

/// Delivers exported drawings to third parties.
pub trait ShareService: Send + Sync {
    fn share(&self, request: ShareRequest) -> BoxFuture<'_, Result<(), ShareError>>;
}

/// Supplies an optional decorative background, by URL or opaque handle.
pub trait BackgroundSource: Send + Sync {
    fn background(&self) -> BoxFuture<'_, Option<String>>;
}

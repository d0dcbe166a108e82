use thiserror::Error;

/// Failures reported by a [`Backend`](crate::client::services::backend::Backend).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend refused the request; the text is shown to the user as-is.
    #[error("{message}")]
    Rejected { status: Option<u16>, message: String },
    #[error("could not decode backend row: {0}")]
    Decode(String),
    #[error("subscription channel closed")]
    ChannelClosed,
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

impl BackendError {
    pub fn rejected(message: impl Into<String>) -> Self {
        BackendError::Rejected { status: None, message: message.into() }
    }

    /// True when the error text names the given column (e.g. a column the backend does not know).
    pub fn mentions(&self, column: &str) -> bool {
        self.to_string().contains(column)
    }
}

/// Errors surfaced by chat operations. The `Display` text is what the user sees.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    #[error("Invalid invite code '{0}': codes are exactly 7 characters")]
    InvalidInviteCode(String),
    #[error("Invalid invite code '{0}': no group uses it")]
    InviteCodeNotFound(String),
    #[error("Could not look up invite code: {0}")]
    InviteLookup(BackendError),
    #[error("Error sending message: {0}")]
    SendMessage(BackendError),
    #[error("Error creating group: {0}")]
    CreateGroup(BackendError),
    #[error("Error uploading image: {0}")]
    Attachment(String),
    #[error("Could not save display name: {0}")]
    Identity(String),
}

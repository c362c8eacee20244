use crate::primitives::http_client::HttpError;

/// Errors that end a migration run.
///
/// The binary maps [`MigrateError::is_user_error`] to the platform exit codes:
/// user errors exit with `1` and are shown to the user, everything else is an
/// application error exiting with `2`.
#[crate::migrate_error]
pub enum MigrateError {
    /// The migration failed because of the input or the state of the projects.
    #[error("{message}")]
    User {
        /// Message shown to the user
        message: String,
        /// HTTP status code, when the failure came from a 4xx response
        code: Option<u16>,
    },

    /// The backup sync action returned credentials for an unknown storage backend.
    #[error("Unrecognized restore credentials.")]
    UnrecognizedBackupCredentials,

    /// The component configuration is not valid.
    #[error("{0}")]
    InvalidConfig(String),

    /// An invalid operation was attempted.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A transport error that is not the caller's fault.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {message}")]
    Json {
        /// The error message from `serde_json`
        message: String,
    },
}

impl MigrateError {
    /// A user error without a status code.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
            code: None,
        }
    }

    /// Whether the error is the user's to fix (exit code `1`).
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::User { .. } | Self::UnrecognizedBackupCredentials | Self::InvalidConfig(_)
        )
    }

    /// Promotes 4xx transport errors to user errors, keeping the status code.
    ///
    /// Applied once at the boundary of the migration run; 5xx and transport
    /// failures are returned unchanged.
    #[must_use]
    pub fn classify(self) -> Self {
        match self {
            Self::Http(HttpError::BadStatusCode { code, message }) if (400..500).contains(&code) => {
                Self::User {
                    message,
                    code: Some(code),
                }
            }
            other => other,
        }
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json {
            message: e.to_string(),
        }
    }
}

//! Error handling utilities
//!
//! Strongly typed variants cover the failures the pipeline reacts to; everything
//! else is carried as an `anyhow` chain and flattened into the `Generic` variant
//! that `#[migrate_error]` adds to each error enum.

/// Re-export anyhow for convenience
pub use anyhow;

/// Helper trait for converting anyhow errors to generic error messages
pub trait AnyhowErrorExt {
    /// Convert an anyhow error to a string, preserving the error chain
    fn to_generic_message(self) -> String;

    /// Convert an anyhow error to a string with a custom prefix
    fn to_generic_message_with_prefix(self, prefix: &str) -> String;
}

impl AnyhowErrorExt for anyhow::Error {
    fn to_generic_message(self) -> String {
        let mut message = self.to_string();

        let chain: Vec<String> = self.chain().skip(1).map(ToString::to_string).collect();
        if !chain.is_empty() {
            message.push_str(" (caused by: ");
            message.push_str(&chain.join(" -> "));
            message.push(')');
        }

        message
    }

    fn to_generic_message_with_prefix(self, prefix: &str) -> String {
        format!("{prefix}: {}", self.to_generic_message())
    }
}

/// HTTP transport used by every service wrapper.
pub mod http_client;

/// Logging sink, context-aware logging macros and the stderr logger used by the binary.
pub mod logger;

/// Secret values that never reach logs.
pub mod secret;

//! Runtime settings handed to the library by the server binary.

use std::time::Duration;

/// How long store operations may take before the caller gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// The bound on CRUD and ledger store calls.
    pub database: Duration,
    /// The bound on running a report.
    pub report: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            database: Duration::from_millis(5_000),
            report: Duration::from_millis(30_000),
        }
    }
}

/// The settings of the application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// The token clients must send in the `x-api-key` header.
    ///
    /// When unset every request is refused.
    pub api_token: Option<String>,
    /// Store operation time limits.
    pub timeouts: Timeouts,
}

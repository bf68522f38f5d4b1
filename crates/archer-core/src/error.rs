// ── Core error types ──
//
// Errors surfaced by reconciliation, sweep and scheduling. Device and
// network API failures are wrapped unchanged so callers can still ask
// `is_not_found()` / `is_transient()`.

use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Remote APIs ──────────────────────────────────────────────────
    /// A device or network API call failed.
    #[error(transparent)]
    Api(#[from] archer_api::Error),

    // ── Store ────────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // ── Network resolution ───────────────────────────────────────────
    /// The network has no segment on the agent's physical network.
    #[error("No physical network {physical_network} found for network {network}")]
    NoPhysicalNetwork {
        network: Uuid,
        physical_network: String,
    },

    /// The network was deleted upstream.
    #[error("Network not found: {network}")]
    NetworkNotFound { network: Uuid },

    // ── Agent state ──────────────────────────────────────────────────
    #[error("No active device available")]
    NoActiveDevice,

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Agent is shutting down")]
    Shutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` when the referenced network (or resource) no longer exists.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NetworkNotFound { .. } => true,
            Self::Api(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api(e) => e.is_transient(),
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => true,
            _ => false,
        }
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

use thiserror::Error;

/// Errors from the device and network API clients.
///
/// One type for iControl REST, AS3, F5OS and Neutron/Keystone, so retry
/// and teardown decisions can be made on the variant alone.
#[derive(Debug, Error)]
pub enum Error {
    // ── Session ─────────────────────────────────────────────────────
    /// Login or token request rejected.
    #[error("Login rejected: {message}")]
    Authentication { message: String },

    /// Still unauthorized after logging in again.
    #[error("Session expired and re-login was rejected")]
    SessionExpired,

    /// No username/password could be resolved for a device.
    #[error("No credentials for {url}: set them in the URL or via {user_env}/{password_env}")]
    MissingCredentials {
        url: String,
        user_env: &'static str,
        password_env: &'static str,
    },

    // ── Transport ───────────────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Bad URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("No response within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// CA bundle unreadable or client construction failed.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    // ── Device / API ────────────────────────────────────────────────
    /// Structured error returned by a device or the network API.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The requested object does not exist.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The device is busy processing another request (HTTP 503).
    #[error("Device busy: {message}")]
    Busy { message: String },

    /// A declarative config was accepted but one of its tenants failed.
    #[error("Declaration rejected for tenant {tenant}: {message}")]
    Declaration { tenant: String, message: String },

    /// Response body did not match the expected shape.
    #[error("Unexpected response body: {message}")]
    Deserialization { message: String, body: String },

    /// The device family cannot perform this operation.
    #[error("{0} is not supported on this device family")]
    UnsupportedOperation(&'static str),
}

impl Error {
    /// Login-related failure; a fresh session may fix it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SessionExpired)
    }

    /// Connect/timeout failures, 503 busy and gateway errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::Busy { .. } => true,
            Self::Api { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_gateway_errors_are_transient() {
        assert!(
            Error::Busy {
                message: "in progress".into()
            }
            .is_transient()
        );
        assert!(
            Error::Api {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !Error::Api {
                status: 400,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!Error::UnsupportedOperation("as3").is_transient());
    }

    #[test]
    fn not_found_detection() {
        assert!(Error::not_found("network abc").is_not_found());
        assert!(
            Error::Api {
                status: 404,
                message: String::new()
            }
            .is_not_found()
        );
        assert!(!Error::SessionExpired.is_not_found());
    }
}

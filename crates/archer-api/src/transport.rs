// HTTP client construction.
//
// Every client (BIG-IP, F5OS, Neutron) is built here from one
// `TransportConfig`, so TLS and timeout settings cannot drift apart.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::error::Error;

const USER_AGENT: &str = concat!("archer-agent/", env!("CARGO_PKG_VERSION"));

/// How server certificates are checked.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Bundled web PKI roots.
    System,
    /// Trust the PEM bundle at this path.
    CustomCa(PathBuf),
    /// Accept any certificate (appliances ship self-signed by default).
    #[default]
    DangerAcceptInvalid,
}

/// TLS mode plus the per-request timeout.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(60),
        }
    }
}

impl TransportConfig {
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.build_client_with_headers(HeaderMap::new())
    }

    /// Client that sends `headers` on every request.
    pub fn build_client_with_headers(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    Error::Tls(format!("cannot read CA bundle {}: {e}", path.display()))
                })?;
                for cert in reqwest::Certificate::from_pem_bundle(&pem)
                    .map_err(|e| Error::Tls(format!("bad CA bundle {}: {e}", path.display())))?
                {
                    builder = builder.add_root_certificate(cert);
                }
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("HTTP client construction failed: {e}")))
    }
}

/// At most the first 200 bytes of a body, cut on a char boundary.
pub(crate) fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

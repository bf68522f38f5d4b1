// BIG-IP iControl REST HTTP client
//
// Wraps `reqwest::Client` with token-session handling, retry, and status
// mapping. Resource modules (network, vcmp, declare) are implemented as
// inherent methods in separate files to keep this module focused on
// transport mechanics.

use std::sync::RwLock;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use super::models::{ErrorBody, LoginResponse};
use crate::credentials::{self, Credentials};
use crate::error::Error;
use crate::retry::RetryPolicy;
use crate::transport::{TransportConfig, preview};

const LOGIN_PATH: &str = "mgmt/shared/authn/login";
const TOKEN_HEADER: &str = "X-F5-Auth-Token";

/// Per-device settings that shape the objects the client creates.
#[derive(Debug, Clone, Default)]
pub struct BigIpOptions {
    /// Interface (or trunk) VLANs are tagged on when created here.
    /// `None` on VCMP guests, which inherit VLANs from the host.
    pub physical_interface: Option<String>,

    /// VCMP guest name when this session manages a VCMP host.
    pub vcmp_guest: Option<String>,
}

/// Stateful-session client for one BIG-IP.
///
/// Logs in with username/password, keeps the returned session token and
/// sends it as `X-F5-Auth-Token`. A 401 drops the token, logs in once more
/// and replays the request.
pub struct BigIpClient {
    http: reqwest::Client,
    base_url: Url,
    name: String,
    credentials: Credentials,
    retry: RetryPolicy,
    options: BigIpOptions,
    token: RwLock<Option<String>>,
}

impl BigIpClient {
    /// Create a client from a device URL.
    ///
    /// Credentials come from the URL userinfo or `BIGIP_USER` /
    /// `BIGIP_PASSWORD`; neither being present is an error.
    pub fn new(
        url: &Url,
        transport: &TransportConfig,
        retry: RetryPolicy,
        options: BigIpOptions,
    ) -> Result<Self, Error> {
        let credentials = Credentials::resolve(url)?;
        Self::with_credentials(url, credentials, transport, retry, options)
    }

    /// Create a client with explicit credentials.
    pub fn with_credentials(
        url: &Url,
        credentials: Credentials,
        transport: &TransportConfig,
        retry: RetryPolicy,
        options: BigIpOptions,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let base_url = credentials::base_url(url)?;
        let name = url.host_str().unwrap_or("bigip").to_owned();
        Ok(Self {
            http,
            base_url,
            name,
            credentials,
            retry,
            options,
            token: RwLock::new(None),
        })
    }

    /// Device name (management host).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BigIpOptions {
        &self.options
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Session management ───────────────────────────────────────────

    /// Log in and store the session token.
    pub async fn login(&self) -> Result<String, Error> {
        let url = self.base_url.join(LOGIN_PATH)?;
        debug!(device = %self.name, "logging in at {url}");

        let (username, password) = self.credentials.basic_auth();
        let body = serde_json::json!({
            "username": username,
            "password": password,
            "loginProviderName": "tmos",
        });

        let resp = self.http.post(url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {}", preview(&body)),
            });
        }

        let login: LoginResponse = parse_json(&resp.text().await?)?;
        let token = login.token.token;
        self.store_token(Some(token.clone()));
        debug!(device = %self.name, timeout = ?login.token.timeout, "login successful");
        Ok(token)
    }

    fn current_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    fn store_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    async fn session_token(&self) -> Result<String, Error> {
        match self.current_token() {
            Some(token) => Ok(token),
            None => self.login().await,
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a request with retry, returning the raw response body.
    pub(crate) async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<String, Error>
    where
        B: Serialize + Sync + ?Sized,
    {
        let what = format!("{method} {path}");
        self.retry
            .run(&what, || self.send_once(method.clone(), path, body))
            .await
    }

    async fn send_once<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<String, Error>
    where
        B: Serialize + Sync + ?Sized,
    {
        let token = self.session_token().await?;
        let resp = self.dispatch(method.clone(), path, body, &token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return read_body(resp, path).await;
        }

        trace!(device = %self.name, "session token rejected, logging in again");
        self.store_token(None);
        let token = self.login().await?;
        let resp = self.dispatch(method, path, body, &token).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }
        read_body(resp, path).await
    }

    async fn dispatch<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: &str,
    ) -> Result<reqwest::Response, Error>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.base_url.join(path)?;
        debug!(device = %self.name, "{method} {url}");

        let mut builder = self.http.request(method, url).header(TOKEN_HEADER, token);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let body = self.send::<()>(Method::GET, path, None).await?;
        parse_json(&body)
    }

    /// GET that maps "not found" to `None`.
    pub(crate) async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, Error> {
        match self.get(path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn post<B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String, Error> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub(crate) async fn patch<B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), Error> {
        self.send(Method::PATCH, path, Some(body)).await.map(|_| ())
    }

    /// DELETE that treats a missing object as success.
    pub(crate) async fn delete(&self, path: &str) -> Result<(), Error> {
        match self.send::<()>(Method::DELETE, path, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(device = %self.name, path, "already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Map an iControl REST response to its body or a typed error.
async fn read_body(resp: reqwest::Response, path: &str) -> Result<String, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.text().await?);
    }

    let raw = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&raw)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| preview(&raw).to_owned());

    Err(match status {
        StatusCode::NOT_FOUND => Error::not_found(path.to_owned()),
        StatusCode::SERVICE_UNAVAILABLE => Error::Busy { message },
        StatusCode::UNAUTHORIZED => Error::SessionExpired,
        _ => Error::Api {
            status: status.as_u16(),
            message,
        },
    })
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(body)),
        body: body.to_owned(),
    })
}

// F5OS REST client
//
// Basic-auth bootstrap, then the JWT returned in `X-Auth-Token` is sent
// back on every call until it expires locally or the device answers 401.

use std::sync::RwLock;

use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use super::token::CachedToken;
use crate::credentials::{self, Credentials};
use crate::error::Error;
use crate::retry::RetryPolicy;
use crate::transport::{TransportConfig, preview};

const TOKEN_HEADER: &str = "X-Auth-Token";
const YANG_JSON: &str = "application/yang-data+json";

/// Chassis-side settings.
#[derive(Debug, Clone, Default)]
pub struct F5OsOptions {
    /// LAG or interface the tenant VLANs are trunked on.
    pub interface: Option<String>,

    /// Tenant (VCMP guest) the VLANs are assigned to.
    pub tenant: Option<String>,
}

pub struct F5OsClient {
    http: reqwest::Client,
    base_url: Url,
    name: String,
    credentials: Credentials,
    retry: RetryPolicy,
    options: F5OsOptions,
    token: RwLock<Option<CachedToken>>,
}

impl F5OsClient {
    /// Create a client; credentials come from the URL or `BIGIP_USER` /
    /// `BIGIP_PASSWORD`.
    pub fn new(
        url: &Url,
        transport: &TransportConfig,
        retry: RetryPolicy,
        options: F5OsOptions,
    ) -> Result<Self, Error> {
        let credentials = Credentials::resolve(url)?;
        Self::with_credentials(url, credentials, transport, retry, options)
    }

    pub fn with_credentials(
        url: &Url,
        credentials: Credentials,
        transport: &TransportConfig,
        retry: RetryPolicy,
        options: F5OsOptions,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(YANG_JSON));
        let http = transport.build_client_with_headers(headers)?;
        Ok(Self {
            http,
            base_url: credentials::base_url(url)?,
            name: url.host_str().unwrap_or("f5os").to_owned(),
            credentials,
            retry,
            options,
            token: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &F5OsOptions {
        &self.options
    }

    // ── Token cache ──────────────────────────────────────────────────

    fn valid_token(&self) -> Option<String> {
        let guard = self.token.read().ok()?;
        let token = guard.as_ref()?;
        if token.is_valid_at(Utc::now()) {
            Some(token.value.clone())
        } else {
            trace!(device = %self.name, "cached token expired");
            None
        }
    }

    fn store_token(&self, token: Option<CachedToken>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    fn remember_token(&self, resp: &reqwest::Response) {
        if let Some(value) = resp
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.store_token(Some(CachedToken::new(value)));
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

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
        let token = self.valid_token();
        let had_token = token.is_some();
        let resp = self.dispatch(method.clone(), path, body, token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            self.remember_token(&resp);
            return read_body(resp, path).await;
        }
        if !had_token {
            return Err(Error::Authentication {
                message: format!("{} rejected basic auth", self.name),
            });
        }

        debug!(device = %self.name, "token rejected, re-authenticating");
        self.store_token(None);
        let resp = self.dispatch(method, path, body, None).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }
        self.remember_token(&resp);
        read_body(resp, path).await
    }

    async fn dispatch<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<String>,
    ) -> Result<reqwest::Response, Error>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.base_url.join(path)?;
        debug!(device = %self.name, "{method} {url}");

        let mut builder = self.http.request(method, url);
        builder = match token {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => {
                let (user, password) = self.credentials.basic_auth();
                builder.basic_auth(user, Some(password))
            }
        };
        if let Some(body) = body {
            let payload = serde_json::to_vec(body).map_err(|e| Error::Deserialization {
                message: format!("failed to encode request body: {e}"),
                body: String::new(),
            })?;
            builder = builder.header(CONTENT_TYPE, YANG_JSON).body(payload);
        }
        Ok(builder.send().await?)
    }

    pub(crate) async fn get<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T, Error> {
        let body = self.send::<()>(Method::GET, path, None).await?;
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body,
        })
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
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn read_body(resp: reqwest::Response, path: &str) -> Result<String, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.text().await?);
    }
    let raw = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => Error::not_found(path.to_owned()),
        StatusCode::SERVICE_UNAVAILABLE => Error::Busy {
            message: preview(&raw).to_owned(),
        },
        _ => Error::Api {
            status: status.as_u16(),
            message: preview(&raw).to_owned(),
        },
    })
}

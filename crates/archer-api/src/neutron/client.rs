// Keystone-authenticated Neutron client
//
// Password-scoped Keystone v3 token, network endpoint from the service
// catalog (or an explicit override), token reuse until a 401.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::NetworkApi;
use super::models::{
    CreatePort, CreatePortEnvelope, Network, NetworkEnvelope, Port, PortEnvelope, PortFilter,
    PortsEnvelope, Subnet, SubnetEnvelope,
};
use crate::error::Error;
use crate::transport::{TransportConfig, preview};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Keystone v3 password credentials.
#[derive(Debug, Clone)]
pub struct KeystoneAuth {
    pub auth_url: Url,
    pub username: String,
    pub password: SecretString,
    pub user_domain_name: String,
    pub project_name: String,
    pub project_domain_name: String,
    pub region: Option<String>,
    /// Skip the catalog lookup and talk to this endpoint directly.
    pub endpoint_override: Option<Url>,
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    endpoint: Url,
}

pub struct NeutronClient {
    http: reqwest::Client,
    auth: KeystoneAuth,
    session: RwLock<Option<Session>>,
}

// ── Keystone catalog ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenEnvelope {
    token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region_id: Option<String>,
    #[serde(default)]
    region: Option<String>,
    url: String,
}

fn network_endpoint(catalog: &[CatalogEntry], region: Option<&str>) -> Option<String> {
    catalog
        .iter()
        .filter(|entry| entry.kind == "network")
        .flat_map(|entry| entry.endpoints.iter())
        .filter(|ep| ep.interface == "public")
        .find(|ep| {
            region.is_none_or(|r| {
                ep.region_id.as_deref() == Some(r) || ep.region.as_deref() == Some(r)
            })
        })
        .map(|ep| ep.url.clone())
}

/// Ensure the endpoint ends with `/` so relative joins append.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

impl NeutronClient {
    pub fn new(auth: KeystoneAuth, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            auth,
            session: RwLock::new(None),
        })
    }

    /// Authenticate against Keystone and resolve the network endpoint.
    async fn authenticate(&self) -> Result<Session, Error> {
        let url = with_trailing_slash(self.auth.auth_url.clone()).join("v3/auth/tokens")?;
        debug!("POST {url}");
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.auth.username,
                            "domain": { "name": self.auth.user_domain_name },
                            "password": self.auth.password.expose_secret(),
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.auth.project_name,
                        "domain": { "name": self.auth.project_domain_name },
                    }
                }
            }
        });

        let resp = self.http.post(url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("keystone returned HTTP {status}: {}", preview(&raw)),
            });
        }
        let token = resp
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| Error::Authentication {
                message: "keystone response carries no X-Subject-Token".into(),
            })?;

        let endpoint = match &self.auth.endpoint_override {
            Some(url) => url.clone(),
            None => {
                let raw = resp.text().await?;
                let envelope: TokenEnvelope = parse_json(&raw)?;
                let found = network_endpoint(&envelope.token.catalog, self.auth.region.as_deref())
                    .ok_or_else(|| Error::Authentication {
                        message: "no public network endpoint in the service catalog".into(),
                    })?;
                Url::parse(&found)?
            }
        };

        let session = Session {
            token,
            endpoint: with_trailing_slash(endpoint),
        };
        info!(endpoint = %session.endpoint, "authenticated against keystone");
        if let Ok(mut guard) = self.session.write() {
            *guard = Some(session.clone());
        }
        Ok(session)
    }

    async fn session(&self) -> Result<Session, Error> {
        let cached = self.session.read().ok().and_then(|guard| guard.clone());
        match cached {
            Some(session) => Ok(session),
            None => self.authenticate().await,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<String, Error> {
        let session = self.session().await?;
        let resp = self
            .dispatch(&session, method.clone(), path, query, body)
            .await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return read_body(resp, path).await;
        }

        debug!("network API token rejected, re-authenticating");
        let session = self.authenticate().await?;
        let resp = self.dispatch(&session, method, path, query, body).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }
        read_body(resp, path).await
    }

    async fn dispatch(
        &self,
        session: &Session,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, Error> {
        let url = session.endpoint.join(path)?;
        debug!("{method} {url}");
        let mut builder = self
            .http
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &session.token);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        let body = self.send(Method::GET, path, query, None).await?;
        parse_json(&body)
    }
}

#[async_trait]
impl NetworkApi for NeutronClient {
    async fn get_network(&self, id: Uuid) -> Result<Network, Error> {
        let env: NetworkEnvelope = self.get(&format!("v2.0/networks/{id}"), &[]).await?;
        Ok(env.network)
    }

    async fn get_subnet(&self, id: Uuid) -> Result<Subnet, Error> {
        let env: SubnetEnvelope = self.get(&format!("v2.0/subnets/{id}"), &[]).await?;
        Ok(env.subnet)
    }

    async fn get_port(&self, id: Uuid) -> Result<Port, Error> {
        let env: PortEnvelope = self.get(&format!("v2.0/ports/{id}"), &[]).await?;
        Ok(env.port)
    }

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>, Error> {
        let env: PortsEnvelope = self.get("v2.0/ports", &filter.query()).await?;
        Ok(env.ports)
    }

    async fn create_port(&self, request: &CreatePort) -> Result<Port, Error> {
        let body = serde_json::to_value(CreatePortEnvelope { port: request }).map_err(|e| {
            Error::Deserialization {
                message: format!("failed to encode port: {e}"),
                body: String::new(),
            }
        })?;
        let raw = self
            .send(Method::POST, "v2.0/ports", &[], Some(&body))
            .await?;
        let env: PortEnvelope = parse_json(&raw)?;
        info!(port_id = %env.port.id, name = %env.port.name, "created port");
        Ok(env.port)
    }

    async fn delete_port(&self, id: Uuid) -> Result<(), Error> {
        match self
            .send(Method::DELETE, &format!("v2.0/ports/{id}"), &[], None)
            .await
        {
            Ok(_) => {
                info!(port_id = %id, "deleted port");
                Ok(())
            }
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

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(body)),
        body: body.to_owned(),
    })
}

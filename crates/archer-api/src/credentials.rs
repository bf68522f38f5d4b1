// Device credential resolution
//
// Appliance URLs may carry `user:password@` userinfo. When they don't,
// the credentials come from two well-known environment variables.

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

/// Environment variable holding the device username.
pub const USER_ENV: &str = "BIGIP_USER";
/// Environment variable holding the device password.
pub const PASSWORD_ENV: &str = "BIGIP_PASSWORD";

/// Username/password pair for one device.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Resolve credentials from the URL userinfo or the process environment.
    pub fn resolve(url: &Url) -> Result<Self, Error> {
        Self::resolve_with(url, |name| std::env::var(name).ok())
    }

    /// Resolve credentials with a custom environment lookup.
    ///
    /// URL userinfo wins when it carries both parts; otherwise both
    /// environment variables must be present.
    pub fn resolve_with<F>(url: &Url, env: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = percent_decode(url.username());
        let password = url.password().map(percent_decode);
        if let Some(password) = password {
            if !user.is_empty() {
                return Ok(Self::new(user, SecretString::from(password)));
            }
        }

        match (env(USER_ENV), env(PASSWORD_ENV)) {
            (Some(user), Some(password)) if !user.is_empty() => {
                Ok(Self::new(user, SecretString::from(password)))
            }
            _ => Err(Error::MissingCredentials {
                url: redact(url),
                user_env: USER_ENV,
                password_env: PASSWORD_ENV,
            }),
        }
    }

    /// `Basic` authorization header value.
    pub fn basic_auth(&self) -> (String, String) {
        (
            self.username.clone(),
            self.password.expose_secret().to_owned(),
        )
    }
}

/// The URL with userinfo stripped, safe to log.
pub fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    let _ = clean.set_username("");
    let _ = clean.set_password(None);
    clean.to_string()
}

/// Base URL (scheme + host + port) with userinfo and path stripped.
pub fn base_url(url: &Url) -> Result<Url, Error> {
    let mut base = Url::parse(&redact(url))?;
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    Ok(base)
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

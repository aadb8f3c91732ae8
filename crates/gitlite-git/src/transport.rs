//! HTTP transport for the smart protocol.

use crate::{GitError, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use std::fmt;
use std::time::Duration;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("gitlite/", env!("CARGO_PKG_VERSION"));
/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Basic-auth credentials for the remote.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password or access token.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from a user name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Request/response exchange with a remote.
///
/// The protocol client only ever needs a GET for discovery and a POST for
/// the push itself; tests substitute an in-process remote here.
pub trait Transport {
    /// Fetches `url` and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>>;

    /// Posts `body` to `url` and returns the response body.
    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// Blocking HTTP transport with optional basic authentication.
pub struct HttpTransport {
    client: Client,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    /// Creates a transport with the default user agent and timeout.
    pub fn new(credentials: Option<Credentials>) -> Result<Self> {
        Self::with_options(credentials, DEFAULT_USER_AGENT, DEFAULT_TIMEOUT)
    }

    /// Creates a transport with an explicit user agent and timeout.
    pub fn with_options(
        credentials: Option<Credentials>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| GitError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            credentials,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    fn read_body(url: &str, response: Response) -> Result<Vec<u8>> {
        let status = response.status();
        if !status.is_success() {
            return Err(GitError::Transport(format!("{} returned {}", url, status)));
        }
        let body = response
            .bytes()
            .map_err(|e| GitError::Transport(e.to_string()))?;
        tracing::debug!(url = %url, status = %status, bytes = body.len(), "received response");
        Ok(body.to_vec())
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .authorize(self.client.get(url))
            .send()
            .map_err(|e| GitError::Transport(e.to_string()))?;
        Self::read_body(url, response)
    }

    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        tracing::debug!(url = %url, bytes = body.len(), "POST");
        let response = self
            .authorize(self.client.post(url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .map_err(|e| GitError::Transport(e.to_string()))?;
        Self::read_body(url, response)
    }
}

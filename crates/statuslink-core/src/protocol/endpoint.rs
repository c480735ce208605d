//! Realtime socket endpoint

use core::fmt;

use url::Url;

use crate::errors::ConfigError;

const SOCKET_PATH: &str = "/realtime/v1/websocket";
const PROTOCOL_VERSION: &str = "1.0.0";

/// Where the realtime socket connects and with which API key
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    authority: String,
    secure: bool,
    api_key: String,
}

impl Endpoint {
    /// Accepts a bare host (`abc.example.co`) or a project URL
    /// (`https://abc.example.co/`). Plain `http`/`ws` schemes select an
    /// unencrypted socket for local development.
    pub fn new(project: &str, api_key: &str) -> Result<Self, ConfigError> {
        let project = project.trim();
        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            endpoint: project.to_string(),
            reason: reason.to_string(),
        };

        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(invalid("API key is empty"));
        }

        let parsed = if project.contains("://") {
            Url::parse(project)
        } else {
            Url::parse(&format!("https://{project}"))
        }
        .map_err(|e| invalid(&e.to_string()))?;

        let secure = match parsed.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => return Err(invalid(&format!("unsupported scheme `{other}`"))),
        };
        let host = parsed.host_str().ok_or_else(|| invalid("missing host"))?;
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            authority,
            secure,
            api_key: api_key.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.authority
    }

    /// Full socket URL including the API key
    pub fn socket_url(&self) -> String {
        self.build_url(&self.api_key)
    }

    /// Socket URL safe for logs
    pub fn redacted_url(&self) -> String {
        self.build_url("***")
    }

    fn build_url(&self, key: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = format!("{scheme}://{}{SOCKET_PATH}", self.authority);
        url.push('?');
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("apikey", key)
            .append_pair("vsn", PROTOCOL_VERSION)
            .finish();
        url.push_str(&query);
        url
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.redacted_url())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_socket_url_from_project_url() {
        let endpoint = Endpoint::new("https://abc.example.co/", "anon-key").unwrap();
        assert_eq!(
            endpoint.socket_url(),
            "wss://abc.example.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
    }

    #[test]
    fn bare_host_and_local_ports() {
        assert_eq!(Endpoint::new("abc.example.co", "k").unwrap().host(), "abc.example.co");
        let local = Endpoint::new("http://127.0.0.1:54321", "k").unwrap();
        assert_eq!(
            local.socket_url(),
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
    }

    #[test]
    fn redacts_key() {
        let endpoint = Endpoint::new("abc.example.co", "secret").unwrap();
        assert!(!endpoint.redacted_url().contains("secret"));
        assert!(!format!("{endpoint:?}").contains("secret"));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Endpoint::new("abc.example.co", " ").is_err());
        assert!(Endpoint::new("ftp://abc.example.co", "k").is_err());
    }
}

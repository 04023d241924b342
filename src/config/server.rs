use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request body size limit in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Header carrying the authenticated user's identity, set by the
    /// reverse proxy in front of the server.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Identity used when the request carries no identity header.
    #[serde(default = "default_guest_user")]
    pub guest_user: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            identity_header: default_identity_header(),
            guest_user: default_guest_user(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity_header.is_empty() {
            return Err(ConfigError::Validation(
                "server.identity_header cannot be empty".into(),
            ));
        }
        if http::HeaderName::from_bytes(self.identity_header.as_bytes()).is_err() {
            return Err(ConfigError::Validation(format!(
                "server.identity_header '{}' is not a valid header name",
                self.identity_header
            )));
        }
        Ok(())
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8000
}

fn default_body_limit() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_identity_header() -> String {
    "X-Forwarded-User".to_string()
}

fn default_guest_user() -> String {
    "Guest".to_string()
}

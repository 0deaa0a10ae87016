//! Backend environments and their endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Built-in backend deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    #[default]
    Production,
    Staging,
}

impl EnvironmentType {
    /// Parse a name, falling back to production for anything unknown.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "staging" => EnvironmentType::Staging,
            _ => EnvironmentType::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Production => "production",
            EnvironmentType::Staging => "staging",
        }
    }

    /// Endpoints of this environment.
    pub fn default_endpoints(&self) -> BackendEndpoints {
        match self {
            EnvironmentType::Production => BackendEndpoints::from_hosts(
                "Production",
                "prod-nginz-https.wire.com",
                "prod-nginz-ssl.wire.com",
                "clientblacklist.wire.com/prod",
                "wire.com",
            ),
            EnvironmentType::Staging => BackendEndpoints::from_hosts(
                "Staging",
                "staging-nginz-https.zinfra.io",
                "staging-nginz-ssl.zinfra.io",
                "clientblacklist.wire.com/staging",
                "wire-webapp-staging.zinfra.io",
            ),
        }
    }
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URLs of one backend deployment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendEndpoints {
    pub title: String,
    pub backend_url: Url,
    pub backend_ws_url: Url,
    pub blacklist_url: Url,
    pub frontend_url: Url,
}

impl BackendEndpoints {
    fn from_hosts(title: &str, backend: &str, ws: &str, blacklist: &str, frontend: &str) -> Self {
        // Hosts are compile-time constants; parsing cannot fail.
        let parse = |scheme: &str, host: &str| {
            Url::parse(&format!("{}://{}/", scheme, host)).expect("built-in endpoint is a valid url")
        };
        Self {
            title: title.to_string(),
            backend_url: parse("https", backend),
            backend_ws_url: parse("wss", ws),
            blacklist_url: parse("https", blacklist),
            frontend_url: parse("https", frontend),
        }
    }
}

use reqwest::Proxy;
use serde::{Deserialize, Serialize};

use crate::ShelterError;

/// Which upstream traffic goes through the proxy
#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Http,
    Https,
    Socks5,
    /// Every scheme
    All,
}

/// Proxy credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// Outbound proxy used when fetching from the origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy server URL, e.g. "http://proxy.example.com:8080"
    pub url: String,
    #[serde(default = "default_proxy_type")]
    pub proxy_type: ProxyType,
    #[serde(default)]
    pub auth: Option<ProxyAuth>,
}

fn default_proxy_type() -> ProxyType {
    ProxyType::All
}

impl ProxyConfig {
    /// Build the reqwest proxy for this configuration
    pub fn to_proxy(&self) -> Result<Proxy, ShelterError> {
        let invalid = |e: reqwest::Error| ShelterError::ProxyError(format!("{}: {e}", self.url));

        let mut proxy = match self.proxy_type {
            ProxyType::Http => Proxy::http(&self.url).map_err(invalid)?,
            ProxyType::Https => Proxy::https(&self.url).map_err(invalid)?,
            ProxyType::Socks5 => {
                let url = if self.url.starts_with("socks5://") || self.url.starts_with("socks5h://")
                {
                    self.url.clone()
                } else {
                    format!("socks5://{}", self.url)
                };
                Proxy::all(&url).map_err(invalid)?
            }
            ProxyType::All => Proxy::all(&self.url).map_err(invalid)?,
        };

        if let Some(auth) = &self.auth {
            proxy = proxy.basic_auth(&auth.username, &auth.password);
        }

        Ok(proxy)
    }
}

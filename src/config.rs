//! Configuration management

use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::capabilities::CapabilityFilter;
use crate::model::DEFAULT_BASE_URL;
use crate::screening::Category;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI-compatible API key (required for any model call)
    pub openai_api_key: Option<String>,

    /// Chat completions base URL
    pub openai_base_url: String,

    /// Model name sent with every completion
    pub model: String,

    /// Backend the capabilities talk to
    pub tools_base_url: String,

    /// Directory scanned for capability entries
    pub capabilities_dir: PathBuf,

    /// Allow/deny lists applied while scanning
    pub filter: CapabilityFilter,

    /// Categories the assistant will act on
    pub supported_categories: Vec<Category>,

    /// HTTP bind address
    pub bind_addr: IpAddr,

    /// HTTP port
    pub port: u16,

    /// HS256 secret for bearer tokens (server mode only)
    pub jwt_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            model: "gpt-4o".to_string(),
            tools_base_url: String::new(),
            capabilities_dir: PathBuf::from("capabilities"),
            filter: CapabilityFilter::default(),
            supported_categories: vec![Category::Modification, Category::FileSystemInteraction],
            bind_addr: IpAddr::from([127, 0, 0, 1]),
            port: 8000,
            jwt_secret: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let openai_api_key = non_empty_var("ASSISTANT_OPENAI_API_KEY");

        let openai_base_url = non_empty_var("ASSISTANT_OPENAI_BASE_URL")
            .unwrap_or(defaults.openai_base_url);

        let model = non_empty_var("ASSISTANT_GPT_MODEL").unwrap_or(defaults.model);

        let tools_base_url = non_empty_var("TOOLS_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_default();

        let capabilities_dir = non_empty_var("ASSISTANT_CAPABILITIES_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.capabilities_dir);

        let filter = CapabilityFilter {
            allow: non_empty_var("ASSISTANT_CAPABILITY_ALLOW").map(|v| split_list(&v)),
            deny: non_empty_var("ASSISTANT_CAPABILITY_DENY")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        };

        let supported_categories = match non_empty_var("ASSISTANT_SUPPORTED_CATEGORIES") {
            Some(raw) => parse_categories(&raw)?,
            None => defaults.supported_categories,
        };

        let bind_addr = match non_empty_var("ASSISTANT_BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("ASSISTANT_BIND_ADDR is not an IP address: {}", raw))?,
            None => defaults.bind_addr,
        };

        let port = match non_empty_var("ASSISTANT_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("ASSISTANT_PORT is not a port number: {}", raw))?,
            None => defaults.port,
        };

        let jwt_secret = non_empty_var("ASSISTANT_JWT_SECRET");

        Ok(Self {
            openai_api_key,
            openai_base_url,
            model,
            tools_base_url,
            capabilities_dir,
            filter,
            supported_categories,
            bind_addr,
            port,
            jwt_secret,
        })
    }

    /// Address the HTTP server listens on
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Parse a comma-separated category list. Unknown names are an error.
pub fn parse_categories(raw: &str) -> Result<Vec<Category>> {
    split_list(raw)
        .iter()
        .map(|s| {
            s.parse::<Category>()
                .map_err(|e| anyhow::anyhow!("ASSISTANT_SUPPORTED_CATEGORIES: {}", e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8000");
        assert_eq!(
            config.supported_categories,
            vec![Category::Modification, Category::FileSystemInteraction]
        );
        assert!(config.filter.allow.is_none());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_parse_categories() {
        let parsed = parse_categories("Modification, information").unwrap();
        assert_eq!(parsed, vec![Category::Modification, Category::Information]);
        assert!(parse_categories("modification,cooking").is_err());
    }
}

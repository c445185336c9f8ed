//! Install-registry REST client.
//!
//! Uses reqwest to call the registry endpoints for install search, creation,
//! deactivation, and clone-resolution reports.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use thiserror::Error;

use cloneguard_core::config::ApiConfig;

use super::RemoteRegistry;
use super::types::{InstallSearchPage, NewInstall, RemoteInstall, ResolutionReport};

/// Registry API client errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Install-registry REST client.
#[derive(Debug)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    /// Create a new registry API client.
    pub fn new(config: &ApiConfig) -> Result<Self, RegistryError> {
        if config.base_url.is_empty() {
            return Err(RegistryError::Config("base_url is empty".into()));
        }
        if config.token.is_empty() {
            return Err(RegistryError::Config("token is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| RegistryError::Config("Invalid token format".into()))?;
        headers.insert(AUTHORIZATION, token_val);

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed — safe to ignore.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    /// Build the API v1 URL for a given path.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    /// Percent-encode a URL passed as a query-string value.
    pub(crate) fn encode_query(value: &str) -> String {
        let mut encoded = String::with_capacity(value.len());
        for byte in value.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    encoded.push(byte as char);
                }
                _ => {
                    encoded.push('%');
                    encoded.push_str(&format!("{byte:02X}"));
                }
            }
        }
        encoded
    }

    /// Check HTTP response status, returning error for non-success codes.
    fn check_status(resp: &reqwest::Response) -> Result<(), RegistryError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(RegistryError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            });
        }
        Ok(())
    }
}

impl RemoteRegistry for RegistryClient {
    async fn find_installs_by_url(
        &self,
        product_id: i64,
        url: &str,
    ) -> Result<Vec<RemoteInstall>, RegistryError> {
        let request_url = format!(
            "{}?url={}&all=true",
            self.api_url(&format!("/products/{product_id}/installs.json")),
            Self::encode_query(url)
        );
        let resp = self.http.get(&request_url).send().await?;
        Self::check_status(&resp)?;
        let page: InstallSearchPage = resp.json().await?;
        Ok(page.installs)
    }

    async fn create_install(
        &self,
        product_id: i64,
        new_install: &NewInstall,
    ) -> Result<RemoteInstall, RegistryError> {
        let request_url = self.api_url(&format!("/products/{product_id}/installs.json"));
        let resp = self.http.post(&request_url).json(new_install).send().await?;
        Self::check_status(&resp)?;
        Ok(resp.json().await?)
    }

    async fn deactivate_install(
        &self,
        product_id: i64,
        install_id: i64,
    ) -> Result<(), RegistryError> {
        let request_url =
            self.api_url(&format!("/products/{product_id}/installs/{install_id}.json"));
        let resp = self.http.delete(&request_url).send().await?;
        Self::check_status(&resp)
    }

    async fn report_resolution(
        &self,
        product_id: i64,
        install_id: i64,
        report: &ResolutionReport,
    ) -> Result<(), RegistryError> {
        let request_url = self.api_url(&format!(
            "/products/{product_id}/installs/{install_id}/clone_resolution.json"
        ));
        let resp = self.http.post(&request_url).json(report).send().await?;
        Self::check_status(&resp)
    }
}

//! HTTP transport for reachability probes and captive portal logins

use crate::networks::{NetworkProfile, RequestBody};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("netlogin/", env!("CARGO_PKG_VERSION"));

/// Sends requests and reports the response status code
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` with certificate verification on
    async fn probe(&self, url: &str) -> Result<u16>;

    /// Send a fully substituted login request, ignoring certificate errors
    async fn send(&self, request: &NetworkProfile) -> Result<u16>;
}

pub struct HttpClient {
    probe: Client,
    login: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let probe = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .default_headers(headers.clone())
            .build()?;

        // Captive portals routinely serve self-signed or mismatched certificates
        let login = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { probe, login })
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn probe(&self, url: &str) -> Result<u16> {
        let resp = self.probe.get(url).send().await?;
        Ok(resp.status().as_u16())
    }

    async fn send(&self, request: &NetworkProfile) -> Result<u16> {
        let mut builder = self.login.request(request.method.clone(), &request.url);

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.data {
            Some(RequestBody::Raw(body)) => builder.body(body.clone()),
            Some(RequestBody::Form(form)) => builder.form(form),
            None => builder,
        };

        let resp = builder.send().await?;
        let status = resp.status();
        tracing::debug!("{} {} -> {}", request.method, resp.url(), status);
        Ok(status.as_u16())
    }
}

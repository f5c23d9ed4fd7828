//! The HTTP seam used by the resolver.

use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use std::io::Read;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = concat!("tapedeck/", env!("CARGO_PKG_VERSION"));

pub struct HttpResponse {
    pub status: StatusCode,
    /// Final URL, after any redirects were followed.
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Box<dyn Read + Send>,
}

/// Anything that can perform a blocking GET.
pub trait HttpTransport {
    fn get(&self, url: &Url) -> Result<HttpResponse>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn get(&self, url: &Url) -> Result<HttpResponse> {
        (**self).get(url)
    }
}

/// [`HttpTransport`] backed by a blocking reqwest client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout_sec: u64, user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &Url) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(reqwest::Error::without_url)?;

        debug!("GET {} -> {} {}", url, response.status(), response.url());
        Ok(HttpResponse {
            status: response.status(),
            url: response.url().clone(),
            headers: response.headers().clone(),
            body: Box::new(response),
        })
    }
}

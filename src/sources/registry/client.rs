//! HTTP client for registry name lookups.
//!
//! A registry answers `GET {endpoint}/packages/{name}` with a JSON record
//! naming the package's real source locator:
//!
//! ```json
//! { "name": "zlib", "url": "https://github.com/madler/zlib.git" }
//! ```

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::resolver::ResolveError;
use crate::sources::FetchContext;

/// What a registry knows about a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub name: String,

    /// Source locator of the package (git remote, tarball URL, ...)
    #[serde(alias = "source")]
    pub url: String,
}

/// Turns a bare package name into a [`RegistryRecord`].
pub trait RegistryClient: Send + Sync {
    fn lookup(&self, name: &str, cx: &FetchContext<'_>) -> Result<RegistryRecord>;
}

/// Queries registry endpoints over HTTP, in order.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    endpoints: Vec<Url>,
}

impl HttpRegistryClient {
    pub fn new(endpoints: Vec<Url>) -> Self {
        HttpRegistryClient { endpoints }
    }

    fn package_url(endpoint: &Url, name: &str) -> Result<Url> {
        let mut base = endpoint.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(&format!("packages/{}", name))
            .with_context(|| format!("invalid registry endpoint: {}", endpoint))
    }
}

impl RegistryClient for HttpRegistryClient {
    fn lookup(&self, name: &str, cx: &FetchContext<'_>) -> Result<RegistryRecord> {
        if self.endpoints.is_empty() {
            bail!(ResolveError::UnresolvableSource {
                package: name.to_string(),
                locator: name.to_string(),
            });
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(cx.options.fetch_timeout)
            .build()
            .context("failed to build HTTP client")?;

        let mut not_found = false;
        let mut last_error = None;

        for endpoint in &self.endpoints {
            let url = Self::package_url(endpoint, name)?;
            tracing::debug!("Looking up `{}` at {}", name, url);

            let response = match client.get(url.clone()).send() {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!("registry {} unreachable: {}", endpoint, e);
                    last_error = Some(anyhow::Error::new(e).context(format!(
                        "registry {} unreachable",
                        endpoint
                    )));
                    continue;
                }
            };
            match response.status() {
                StatusCode::NOT_FOUND => not_found = true,
                status if status.is_success() => {
                    let record: RegistryRecord = response
                        .json()
                        .with_context(|| format!("invalid registry record from {}", url))?;
                    return Ok(record);
                }
                status => {
                    last_error = Some(anyhow::anyhow!("registry {} answered HTTP {}", url, status));
                }
            }
        }

        // A definite "not found" is final; otherwise the lookup may succeed later
        match last_error {
            Some(e) if !not_found => Err(e),
            _ => Err(ResolveError::UnresolvableSource {
                package: name.to_string(),
                locator: name.to_string(),
            }
            .into()),
        }
    }
}

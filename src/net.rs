//! HTTP side of the resource cache.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::cache::CachedResource;

/// Fetches application resources over HTTP, for cache installs and for
/// cache-miss fall-through.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  base: Url,
}

impl HttpFetcher {
  pub fn new(base_url: &str) -> Result<Self> {
    let base = Url::parse(base_url).map_err(|e| eyre!("Invalid base URL {}: {}", base_url, e))?;

    Ok(Self {
      client: reqwest::Client::new(),
      base,
    })
  }

  /// Fetch a resource path resolved against the configured origin.
  pub async fn fetch(&self, path: &str) -> Result<CachedResource> {
    let url = self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid resource path {}: {}", path, e))?;

    let response = self
      .client
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;

    if !response.status().is_success() {
      return Err(eyre!("Failed to fetch {}: HTTP {}", url, response.status()));
    }

    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read {}: {}", url, e))?
      .to_vec();

    Ok(CachedResource {
      url: path.to_string(),
      content_type,
      body,
      fetched_at: Utc::now(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rejects_invalid_base_url() {
    assert!(HttpFetcher::new("not a url").is_err());
    assert!(HttpFetcher::new("https://audits.example.com").is_ok());
  }
}

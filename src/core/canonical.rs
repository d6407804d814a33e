//! Optional canonical artist name lookup
//!
//! A remote service maps artist spellings to a canonical form. The
//! lookup is advisory: results never override a non-empty tag, at most
//! they fill an empty album-artist from the canonical form of the
//! track artist. One request is in flight at a time and requests are
//! spaced at least a second apart.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;

const MIN_REQUEST_SPACING: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct CanonicalResponse {
    canonical: String,
    #[serde(default)]
    #[allow(dead_code)]
    aliases: Vec<String>,
}

/// Rate-limited client with an in-memory result cache
pub struct CanonicalClient {
    base_url: String,
    http: reqwest::Client,
    cache: DashMap<String, Option<String>>,
    // guards both single-flight and request spacing
    gate: Mutex<Option<Instant>>,
}

impl CanonicalClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            cache: DashMap::new(),
            gate: Mutex::new(None),
        }
    }

    /// Canonical form of an artist name, or None when the service has
    /// no answer (failures are cached so each artist is asked once)
    pub async fn canonical_name(&self, artist: &str) -> Option<String> {
        let key = artist.to_lowercase();

        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let mut last_request = self.gate.lock().await;

        // re-check: another task may have resolved it while we waited
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < MIN_REQUEST_SPACING {
                tokio::time::sleep(MIN_REQUEST_SPACING - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());

        let result = self.fetch(artist).await;
        if let Err(e) = &result {
            tracing::warn!("canonical lookup failed for '{}': {}", artist, e);
        }

        let value = result.ok().flatten();
        self.cache.insert(key, value.clone());
        value
    }

    async fn fetch(&self, artist: &str) -> Result<Option<String>, reqwest::Error> {
        let url = format!("{}/artists/canonical", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("name", artist)])
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body: CanonicalResponse = response.json().await?;
        if body.canonical.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(body.canonical))
    }
}

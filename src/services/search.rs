//! Web search via the Brave Search API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::helpers::{clean_html, extract_domain};

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
}

impl SearchResult {
    pub fn domain(&self) -> Option<String> {
        extract_domain(&self.url)
    }
}

/// Seam over the search provider, mockable in handler tests.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchResult>>;
}

pub struct BraveSearch {
    client: Client,
    endpoint: String,
    api_key: String,
    max_results: u32,
}

impl BraveSearch {
    pub fn new(config: &SearchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            max_results: config.max_results,
        }
    }
}

#[async_trait]
impl WebSearch for BraveSearch {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchResult>> {
        info!(query, "Searching the web");
        let count = self.max_results.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("search API returned {}: {}", status, body);
        }

        let data: Value = resp.json().await?;
        let results: Vec<SearchResult> = data["web"]["results"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(self.max_results as usize)
                    .filter_map(|item| {
                        Some(SearchResult {
                            title: clean_html(item["title"].as_str()?),
                            url: item["url"].as_str()?.to_string(),
                            description: clean_html(item["description"].as_str().unwrap_or("")),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(count = results.len(), "Search results parsed");
        Ok(results)
    }
}

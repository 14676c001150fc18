use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::provider::NewsSource;
use crate::db::models::Fixture;

/// Largest news boost accepted from the sentiment endpoint, either direction.
const MAX_NEWS_BOOST: f64 = 0.05;

/// Client for a news-sentiment endpoint answering `{"boost": <float>}`.
pub struct NewsFeed {
    http: Client,
    url: String,
}

impl NewsFeed {
    pub fn new(url: &str, timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(NewsFeed {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NewsSource for NewsFeed {
    async fn get_news_boost(&self, fixture: &Fixture) -> Result<Option<f64>> {
        debug!("Fetching news boost for {}", fixture.name());
        let resp = self
            .http
            .get(&self.url)
            .query(&[
                ("fixture", fixture.id.as_str()),
                ("home", fixture.home_team.as_str()),
                ("away", fixture.away_team.as_str()),
            ])
            .send()
            .await
            .context("News request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("News endpoint error: {}", resp.status());
        }

        let raw: Value = resp.json().await.context("Failed to parse news response")?;
        Ok(parse_boost(&raw))
    }
}

fn parse_boost(raw: &Value) -> Option<f64> {
    raw["boost"]
        .as_f64()
        .filter(|b| b.is_finite())
        .map(|b| b.clamp(-MAX_NEWS_BOOST, MAX_NEWS_BOOST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_boost() {
        assert_eq!(parse_boost(&json!({"boost": 0.02})), Some(0.02));
        assert_eq!(parse_boost(&json!({"boost": 0.4})), Some(MAX_NEWS_BOOST));
        assert_eq!(parse_boost(&json!({"boost": null})), None);
        assert_eq!(parse_boost(&json!({})), None);
    }
}

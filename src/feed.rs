// The roster/sales collaborator seam: an async trait so the poller can be
// driven by scripted fakes in tests, plus the reqwest implementation used in
// production.

use async_trait::async_trait;
use thiserror::Error;

use crate::board::model::FeedResponse;

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Transport(String),

    #[error("feed responded with status {0}")]
    Status(u16),

    #[error("feed returned malformed JSON: {0}")]
    Malformed(String),
}

/// Source of `{teams, newSales}` snapshots, invoked once per poll tick.
#[async_trait]
pub trait SalesFeed: Send + Sync {
    async fn fetch(&self) -> Result<FeedResponse, FeedError>;
}

/// HTTP implementation fetching from the configured proxy URL.
pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: String) -> Self {
        HttpFeed {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl SalesFeed for HttpFeed {
    async fn fetch(&self) -> Result<FeedResponse, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| FeedError::Malformed(e.to_string()))
    }
}

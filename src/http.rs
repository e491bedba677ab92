use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::HttpSettings;
use crate::error::SnapshotError;

#[derive(Debug, Clone)]
pub struct FeedResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FeedResponse {
    /// Only an exact 200 counts; other 2xx codes are treated like failures.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

pub trait FeedClient: Send + Sync {
    fn get(&self, url: &str) -> Result<FeedResponse, SnapshotError>;
}

#[derive(Clone)]
pub struct FeedHttpClient {
    client: Client,
}

impl FeedHttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, SnapshotError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent)
                .map_err(|err| SnapshotError::FeedHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| SnapshotError::FeedHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl FeedClient for FeedHttpClient {
    fn get(&self, url: &str) -> Result<FeedResponse, SnapshotError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SnapshotError::FeedHttp(err.without_url().to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| SnapshotError::FeedHttp(err.without_url().to_string()))?;
        Ok(FeedResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Strips the query string, which carries API keys, so the URL can be logged.
pub fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    }
}

use super::{EntryPage, EventSource, ListRequest, RawEntry, SourceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesRequest<'a> {
    resource_names: &'a [String],
    filter: &'a str,
    order_by: &'a str,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesResponse {
    #[serde(default)]
    entries: Vec<serde_json::Value>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Google Cloud Logging `entries:list` over HTTP.
#[derive(Debug)]
pub struct CloudLoggingSource {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl CloudLoggingSource {
    pub fn new(
        endpoint: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }
}

#[async_trait]
impl EventSource for CloudLoggingSource {
    async fn list_entries(&self, request: &ListRequest) -> Result<EntryPage, SourceError> {
        let url = format!("{}/v2/entries:list", self.endpoint);
        let body = ListEntriesRequest {
            resource_names: &request.resource_names,
            filter: &request.filter,
            order_by: &request.order_by,
            page_size: request.page_size,
            page_token: request.page_token.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let page: ListEntriesResponse = response.json().await?;
        let entries = page
            .entries
            .into_iter()
            .map(RawEntry::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            entries = entries.len(),
            has_next_page = page.next_page_token.is_some(),
            "Fetched log entry page"
        );

        Ok(EntryPage {
            entries,
            next_page_token: page.next_page_token.filter(|token| !token.is_empty()),
        })
    }
}

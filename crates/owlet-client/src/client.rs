//! The Experimenter API client.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};

/// One page of a collection listing.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    links: PageLinks,
}

#[derive(Debug, Default, Deserialize)]
struct PageLinks {
    next: Option<String>,
}

/// Bearer-token client for the Experimenter JSON API.
#[derive(Debug, Clone)]
pub struct ExperimenterClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl ExperimenterClient {
    /// Create a client for `base_url` authenticating with `token`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> ClientResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http: reqwest::Client::builder().build()?,
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/id/collections/{}/documents",
            self.base_url, collection
        )
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/v1/id/documents/{}", self.base_url, id)
    }

    async fn check(&self, response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Status {
                status: status.as_u16(),
                url,
                body,
            })
        }
    }

    /// Fetch every record in a collection, following `links.next` until
    /// there is no next page.
    pub async fn fetch_collection(&self, collection: &str) -> ClientResult<Vec<Value>> {
        let mut records = Vec::new();
        let mut url = self.collection_url(collection);

        loop {
            debug!("GET {}", url);
            let response = self
                .http
                .get(&url)
                .header("authorization", &self.token)
                .send()
                .await?;
            let page: Page = self.check(response).await?.json().await?;
            records.extend(page.data);

            match page.links.next {
                Some(next) => url = next,
                None => break,
            }
        }

        info!("Fetched {} records from {}", records.len(), collection);
        Ok(records)
    }

    /// Fetch one record by id.
    pub async fn fetch_record(&self, id: &str) -> ClientResult<Value> {
        let response = self
            .http
            .get(self.document_url(id))
            .header("authorization", &self.token)
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    /// Replace a session's feedback sub-resource.
    pub async fn set_session_feedback(
        &self,
        session_key: &str,
        feedback: &str,
    ) -> ClientResult<()> {
        let patch = json!([{ "op": "add", "path": "/feedback", "value": feedback }]);
        let response = self
            .http
            .patch(self.document_url(session_key))
            .header("authorization", &self.token)
            .header("content-type", "application/vnd.api+json; ext=jsonpatch")
            .json(&patch)
            .send()
            .await?;
        self.check(response).await?;
        info!("Updated feedback for {}", session_key);
        Ok(())
    }
}

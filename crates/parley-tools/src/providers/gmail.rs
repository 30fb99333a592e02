use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_status, transport, MailSearchApi};
use crate::error::Result;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

const PROVIDER: &str = "gmail";

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageMetadata {
    id: String,
    thread_id: Option<String>,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

impl MessageMetadata {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn summary(&self) -> Value {
        json!({
            "id": self.id,
            "threadId": self.thread_id,
            "subject": self.header("Subject"),
            "from": self.header("From"),
            "date": self.header("Date"),
            "snippet": self.snippet,
        })
    }
}

/// Gmail REST client: list matching ids, then fetch each message's headers.
#[derive(Clone)]
pub struct GmailApi {
    http: reqwest::Client,
    base_url: String,
}

impl GmailApi {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn metadata(&self, access_token: &str, id: &str) -> Result<MessageMetadata> {
        let url = format!("{}/users/me/messages/{}", self.base_url.trim_end_matches('/'), id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Date"),
            ])
            .send()
            .await
            .map_err(transport(PROVIDER))?;
        let response = check_status(PROVIDER, response).await?;
        response.json().await.map_err(transport(PROVIDER))
    }
}

#[async_trait]
impl MailSearchApi for GmailApi {
    async fn search_mail(&self, access_token: &str, query: &str, max_results: u32) -> Result<Value> {
        let url = format!("{}/users/me/messages", self.base_url.trim_end_matches('/'));
        let max_results = max_results.to_string();
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("q", query), ("maxResults", max_results.as_str())])
            .send()
            .await
            .map_err(transport(PROVIDER))?;
        let list: MessageList = check_status(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(transport(PROVIDER))?;

        let fetched = join_all(list.messages.iter().map(|m| self.metadata(access_token, &m.id))).await;
        let mut messages = Vec::with_capacity(fetched.len());
        for message in fetched {
            messages.push(message?.summary());
        }
        Ok(Value::Array(messages))
    }
}

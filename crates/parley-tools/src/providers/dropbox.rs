use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{check_status, transport, FileSearchApi};
use crate::error::Result;

pub const DROPBOX_API_BASE: &str = "https://api.dropboxapi.com/2";

const PROVIDER: &str = "dropbox";
const MAX_RESULTS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Document,
    Pdf,
    Spreadsheet,
    Presentation,
    Audio,
    Video,
    Folder,
    Paper,
    Others,
    Other,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Pdf => "pdf",
            Self::Spreadsheet => "spreadsheet",
            Self::Presentation => "presentation",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Folder => "folder",
            Self::Paper => "paper",
            Self::Others => "others",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSearch {
    pub query: String,
    pub path: Option<String>,
    pub file_extensions: Option<Vec<String>>,
    pub file_categories: Option<Vec<FileCategory>>,
}

/// Dropbox API v2 client (`files/search_v2`).
#[derive(Clone)]
pub struct DropboxApi {
    http: reqwest::Client,
    base_url: String,
}

impl DropboxApi {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DROPBOX_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_search_body(request: &FileSearch) -> Value {
        let mut options = Map::new();
        options.insert("max_results".to_string(), json!(MAX_RESULTS));
        if let Some(path) = &request.path {
            options.insert("path".to_string(), json!(path));
        }
        if let Some(extensions) = request.file_extensions.as_ref().filter(|e| !e.is_empty()) {
            options.insert("file_extensions".to_string(), json!(extensions));
        }
        if let Some(categories) = request.file_categories.as_ref().filter(|c| !c.is_empty()) {
            let tagged: Vec<Value> = categories
                .iter()
                .map(|c| json!({ ".tag": c.as_str() }))
                .collect();
            options.insert("file_categories".to_string(), Value::Array(tagged));
        }

        json!({
            "query": request.query,
            "options": options,
            "match_field_options": { "include_highlights": true },
        })
    }
}

#[async_trait]
impl FileSearchApi for DropboxApi {
    async fn search_files(&self, access_token: &str, request: &FileSearch) -> Result<Value> {
        let url = format!("{}/files/search_v2", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&Self::build_search_body(request))
            .send()
            .await
            .map_err(transport(PROVIDER))?;

        let response = check_status(PROVIDER, response).await?;
        let body: Value = response.json().await.map_err(transport(PROVIDER))?;
        tracing::debug!(
            matches = body["matches"].as_array().map_or(0, Vec::len),
            "dropbox search finished"
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_body_tags_categories() {
        let body = DropboxApi::build_search_body(&FileSearch {
            query: "invoice".into(),
            path: Some("/finance".into()),
            file_extensions: Some(vec![]),
            file_categories: Some(vec![FileCategory::Pdf, FileCategory::Spreadsheet]),
        });

        assert_eq!(body["query"], "invoice");
        assert_eq!(body["options"]["max_results"], 200);
        assert_eq!(body["options"]["path"], "/finance");
        assert!(body["options"].get("file_extensions").is_none());
        assert_eq!(body["options"]["file_categories"][1][".tag"], "spreadsheet");
        assert_eq!(body["match_field_options"]["include_highlights"], true);
    }
}

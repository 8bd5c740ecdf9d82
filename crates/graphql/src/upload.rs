use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;
use url::Url;

use crate::client::{parse_json, RemoteError};

/// Client for the temporary file-upload endpoint.
#[derive(Clone)]
pub struct UploadClient {
    http: Client,
    endpoint: Url,
}

/// Temporary file stored by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    pub url: String,
    #[serde(default)]
    pub id: Option<String>,
}

impl UploadClient {
    pub fn new(endpoint: Url, http: Client) -> Self {
        Self { http, endpoint }
    }

    /// Uploads one font binary as a multipart `data` part named `label`.
    pub async fn upload(&self, label: &str, bytes: Vec<u8>) -> Result<UploadedFile, RemoteError> {
        let part = Part::bytes(bytes)
            .file_name(label.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("data", part);

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;
        parse_json(response).await
    }
}

use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::client::{ensure_success, RemoteError};

/// Client for the external font generator.
///
/// The generator answers asynchronously through the generation callback, so
/// dispatch only checks that the job was accepted.
#[derive(Clone)]
pub struct GeneratorClient {
    http: Client,
    base_url: Url,
}

impl GeneratorClient {
    pub fn new(base_url: Url, http: Client) -> Self {
        Self { http, base_url }
    }

    pub async fn dispatch<T>(&self, request: &T) -> Result<(), RemoteError>
    where
        T: Serialize + ?Sized,
    {
        let url = self.base_url.join("jobs")?;
        let response = self.http.post(url).json(request).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

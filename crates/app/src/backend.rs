use std::{future::Future, pin::Pin};

use fonthost_core::{
    types::{AbstractedFontRef, CreatedAbstractedFont, HostedDomain, HostedVariant},
    GenerationRequest, NewAbstractedFont,
};
use fonthost_graphql::{
    CreateAbstractedFontRequest, GeneratorClient, GraphqlClient, HostedDomainRecord,
    HostedFontRecord, HostedVariantRecord, RemoteError, UploadClient,
};
use thiserror::Error;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// External services the hosting workflow calls while committing a submission.
pub trait HostingBackend: Send + Sync {
    fn dispatch_generation<'a>(&'a self, request: &'a GenerationRequest) -> BackendFuture<'a, ()>;

    /// Stores one generated binary and returns its temporary url.
    fn upload<'a>(&'a self, label: &'a str, data: Vec<u8>) -> BackendFuture<'a, String>;

    fn create_abstracted_font<'a>(
        &'a self,
        font: &'a NewAbstractedFont,
    ) -> BackendFuture<'a, CreatedAbstractedFont>;

    fn host_font<'a>(
        &'a self,
        abstracted_font_id: &'a str,
        tmp_file_url: &'a str,
    ) -> BackendFuture<'a, HostedVariant>;

    fn create_hosted_domain<'a>(
        &'a self,
        domain: &'a str,
        creator_id: &'a str,
        hosted_variant_ids: &'a [String],
    ) -> BackendFuture<'a, HostedDomain>;
}

/// Route changes requested by a hosting session.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// [`HostingBackend`] talking to the generator, upload and GraphQL services.
#[derive(Clone)]
pub struct RemoteBackend {
    graphql: GraphqlClient,
    upload: UploadClient,
    generator: GeneratorClient,
}

impl RemoteBackend {
    pub fn new(graphql: GraphqlClient, upload: UploadClient, generator: GeneratorClient) -> Self {
        Self {
            graphql,
            upload,
            generator,
        }
    }
}

impl HostingBackend for RemoteBackend {
    fn dispatch_generation<'a>(&'a self, request: &'a GenerationRequest) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.generator.dispatch(request).await?;
            Ok(())
        })
    }

    fn upload<'a>(&'a self, label: &'a str, data: Vec<u8>) -> BackendFuture<'a, String> {
        Box::pin(async move {
            let file = self.upload.upload(label, data).await?;
            Ok(file.url)
        })
    }

    fn create_abstracted_font<'a>(
        &'a self,
        font: &'a NewAbstractedFont,
    ) -> BackendFuture<'a, CreatedAbstractedFont> {
        Box::pin(async move {
            let record = self
                .graphql
                .create_abstracted_font(&CreateAbstractedFontRequest {
                    kind: font.kind.as_str(),
                    variant_id: font.variant_id.as_deref(),
                    template: font.template.as_deref(),
                    preset_id: font.preset_id.as_deref(),
                    name: &font.name,
                })
                .await?;

            // The family is only echoed back for variants.
            let family_id = record
                .variant
                .as_ref()
                .and_then(|variant| variant.family.as_ref())
                .map(|family| family.id.clone())
                .or_else(|| font.family_id.clone());
            Ok(CreatedAbstractedFont {
                id: record.id,
                kind: font.kind,
                template: record.template.or_else(|| font.template.clone()),
                preset_id: record
                    .preset
                    .map(|preset| preset.id)
                    .or_else(|| font.preset_id.clone()),
                family_id,
                variant_id: record
                    .variant
                    .map(|variant| variant.id)
                    .or_else(|| font.variant_id.clone()),
            })
        })
    }

    fn host_font<'a>(
        &'a self,
        abstracted_font_id: &'a str,
        tmp_file_url: &'a str,
    ) -> BackendFuture<'a, HostedVariant> {
        Box::pin(async move {
            let record = self
                .graphql
                .host_font(abstracted_font_id, tmp_file_url)
                .await?;
            Ok(hosted_font(record, abstracted_font_id))
        })
    }

    fn create_hosted_domain<'a>(
        &'a self,
        domain: &'a str,
        creator_id: &'a str,
        hosted_variant_ids: &'a [String],
    ) -> BackendFuture<'a, HostedDomain> {
        Box::pin(async move {
            let record = self
                .graphql
                .create_hosted_domain(domain, creator_id, hosted_variant_ids)
                .await?;
            Ok(hosted_domain(record))
        })
    }
}

fn hosted_font(record: HostedFontRecord, abstracted_font_id: &str) -> HostedVariant {
    HostedVariant {
        id: record.id,
        url: record.url,
        created_at: record.created_at,
        version: record.version,
        abstracted_font: Some(AbstractedFontRef {
            id: abstracted_font_id.to_string(),
        }),
    }
}

fn hosted_variant(record: HostedVariantRecord) -> HostedVariant {
    HostedVariant {
        id: record.id,
        url: record.url,
        created_at: record.created_at,
        version: record.version,
        abstracted_font: record
            .abstracted_font
            .map(|font| AbstractedFontRef { id: font.id }),
    }
}

fn hosted_domain(record: HostedDomainRecord) -> HostedDomain {
    HostedDomain {
        id: record.id,
        domain: record.domain,
        updated_at: record.updated_at,
        hosted_variants: record
            .hosted_variants
            .into_iter()
            .map(hosted_variant)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fonthost_core::types::FontKind;
    use httpmock::prelude::*;
    use reqwest::Client;
    use serde_json::json;
    use url::Url;

    fn backend(server: &MockServer) -> RemoteBackend {
        let http = Client::builder().build().expect("client");
        RemoteBackend::new(
            GraphqlClient::new(
                Url::parse(&server.url("/simple/v1/")).expect("url"),
                None,
                http.clone(),
            ),
            UploadClient::new(
                Url::parse(&server.url("/file/v1/")).expect("url"),
                http.clone(),
            ),
            GeneratorClient::new(Url::parse(&server.url("/generator/")).expect("url"), http),
        )
    }

    #[tokio::test]
    async fn created_preset_font_keeps_requested_identity() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/simple/v1/")
                    .body_contains("\"type\":\"PRESET\"");
                then.status(200).json_body(json!({
                    "data": {
                        "createAbstractedFont": {
                            "id": "af-new",
                            "type": "PRESET",
                            "template": null,
                            "preset": { "id": "preset-1" },
                            "variant": null
                        }
                    }
                }));
            })
            .await;

        let request = NewAbstractedFont {
            kind: FontKind::Preset,
            variant_id: None,
            template: Some("venus.ptf".to_string()),
            preset_id: Some("preset-1".to_string()),
            family_id: None,
            name: "Grotesk Preset".to_string(),
        };
        let created = backend(&server)
            .create_abstracted_font(&request)
            .await
            .expect("create");

        assert_eq!(created.id, "af-new");
        assert_eq!(created.kind, FontKind::Preset);
        assert_eq!(created.preset_id.as_deref(), Some("preset-1"));
        assert_eq!(created.template.as_deref(), Some("venus.ptf"));
    }

    #[tokio::test]
    async fn hosted_font_references_its_abstracted_font() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/simple/v1/");
                then.status(200).json_body(json!({
                    "data": {
                        "hostFont": {
                            "id": "hf-1",
                            "url": "https://fonts.example.com/hf-1.otf",
                            "version": null,
                            "createdAt": "2024-01-01T00:00:00Z"
                        }
                    }
                }));
            })
            .await;

        let hosted = backend(&server)
            .host_font("af-1", "https://files.example.com/tmp/1")
            .await
            .expect("host");

        assert_eq!(hosted.id, "hf-1");
        assert_eq!(hosted.version, None);
        assert_eq!(
            hosted.abstracted_font.map(|font| font.id).as_deref(),
            Some("af-1")
        );
    }

    #[tokio::test]
    async fn upload_failure_is_a_backend_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/file/v1/");
                then.status(500).body("boom");
            })
            .await;

        let err = backend(&server)
            .upload("Grotesk Display regular", vec![1, 2, 3])
            .await
            .expect_err("upload should fail");
        assert!(matches!(
            err,
            BackendError::Remote(RemoteError::Status { .. })
        ));
    }
}

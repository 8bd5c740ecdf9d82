use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

const HOST_FONT: &str = r#"
mutation hostVariant($id: ID!, $tmpFileUrl: String!) {
    hostFont(id: $id, tmpFileUrl: $tmpFileUrl) {
        id
        url
        version
        createdAt
    }
}"#;

const CREATE_HOSTED_DOMAIN: &str = r#"
mutation createHostedDomain($domain: String!, $creatorId: ID!, $hostedVariantsIds: [ID!]!) {
    createHostedDomain(domain: $domain, creatorId: $creatorId, hostedVariantsIds: $hostedVariantsIds) {
        id
        domain
        updatedAt
        hostedVariants {
            id
            url
            createdAt
            abstractedFont {
                id
            }
            version
        }
    }
}"#;

const CREATE_ABSTRACTED_FONT: &str = r#"
mutation createAbstractedFont($type: FontType!, $variantId: ID, $template: String, $presetId: ID, $name: String!) {
    createAbstractedFont(type: $type, variantId: $variantId, template: $template, presetId: $presetId, name: $name) {
        id
        type
        template
        preset {
            id
        }
        variant {
            id
            family {
                id
            }
        }
    }
}"#;

const DELETE_ABSTRACTED_FONT: &str = r#"
mutation deleteAbstractedFont($id: ID!) {
    deleteAbstractedFont(id: $id) {
        id
    }
}"#;

/// Client for the hosting mutations of the GraphQL backend.
#[derive(Clone)]
pub struct GraphqlClient {
    http: Client,
    endpoint: Url,
    token: Option<String>,
}

impl GraphqlClient {
    /// Creates a new client posting to `endpoint`, authenticated when `token` is set.
    pub fn new(endpoint: Url, token: Option<String>, http: Client) -> Self {
        Self {
            http,
            endpoint,
            token,
        }
    }

    /// Registers a hosted font from a temporary upload.
    pub async fn host_font(
        &self,
        abstracted_font_id: &str,
        tmp_file_url: &str,
    ) -> Result<HostedFontRecord, RemoteError> {
        let data: HostFontData = self
            .execute(
                HOST_FONT,
                json!({ "id": abstracted_font_id, "tmpFileUrl": tmp_file_url }),
            )
            .await?;
        Ok(data.host_font)
    }

    /// Creates the hosted-domain record serving the given hosted fonts.
    pub async fn create_hosted_domain(
        &self,
        domain: &str,
        creator_id: &str,
        hosted_variant_ids: &[String],
    ) -> Result<HostedDomainRecord, RemoteError> {
        let data: CreateHostedDomainData = self
            .execute(
                CREATE_HOSTED_DOMAIN,
                json!({
                    "domain": domain,
                    "creatorId": creator_id,
                    "hostedVariantsIds": hosted_variant_ids,
                }),
            )
            .await?;
        Ok(data.create_hosted_domain)
    }

    /// Creates a durable abstracted-font record.
    pub async fn create_abstracted_font(
        &self,
        request: &CreateAbstractedFontRequest<'_>,
    ) -> Result<AbstractedFontRecord, RemoteError> {
        let variables = serde_json::to_value(request)?;
        let data: CreateAbstractedFontData =
            self.execute(CREATE_ABSTRACTED_FONT, variables).await?;
        Ok(data.create_abstracted_font)
    }

    /// Deletes an abstracted-font record.
    pub async fn delete_abstracted_font(&self, id: &str) -> Result<IdRef, RemoteError> {
        let data: DeleteAbstractedFontData = self
            .execute(DELETE_ABSTRACTED_FONT, json!({ "id": id }))
            .await?;
        Ok(data.delete_abstracted_font)
    }

    async fn execute<T>(&self, query: &str, variables: Value) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let response = request.send().await?;
        let envelope: GraphqlResponse<T> = parse_json(response).await?;

        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            let messages = errors
                .into_iter()
                .map(|error| error.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RemoteError::Graphql(messages));
        }
        envelope.data.ok_or(RemoteError::MissingData)
    }
}

/// Variables of the `createAbstractedFont` mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAbstractedFontRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub variant_id: Option<&'a str>,
    pub template: Option<&'a str>,
    pub preset_id: Option<&'a str>,
    pub name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedFontRecord {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub version: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedVariantRecord {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub abstracted_font: Option<IdRef>,
    #[serde(default)]
    pub version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedDomainRecord {
    pub id: String,
    pub domain: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub hosted_variants: Vec<HostedVariantRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbstractedVariantRecord {
    pub id: String,
    #[serde(default)]
    pub family: Option<IdRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbstractedFontRecord {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub preset: Option<IdRef>,
    #[serde(default)]
    pub variant: Option<AbstractedVariantRecord>,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphqlErrorEntry>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostFontData {
    host_font: HostedFontRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateHostedDomainData {
    create_hosted_domain: HostedDomainRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAbstractedFontData {
    create_abstracted_font: AbstractedFontRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteAbstractedFontData {
    delete_abstracted_font: IdRef,
}

/// Errors produced by the remote clients.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("graphql error: {0}")]
    Graphql(String),
    #[error("graphql response carried no data")]
    MissingData,
}

pub(crate) async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(RemoteError::Status { status, body });
    }
    Ok(response)
}

pub(crate) async fn parse_json<T>(response: Response) -> Result<T, RemoteError>
where
    T: DeserializeOwned,
{
    let response = ensure_success(response).await?;
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer, token: Option<&str>) -> GraphqlClient {
        GraphqlClient::new(
            Url::parse(&server.url("/simple/v1/project")).expect("url"),
            token.map(str::to_string),
            Client::builder().build().expect("client"),
        )
    }

    #[tokio::test]
    async fn host_font_sends_variables_and_parses_record() {
        let server = MockServer::start_async().await;
        let client = client(&server, Some("token"));

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/simple/v1/project")
                    .header("Authorization", "Bearer token")
                    .body_contains("hostFont")
                    .body_contains("\"tmpFileUrl\":\"https://files.example.com/tmp/1\"");
                then.status(200).json_body(json!({
                    "data": {
                        "hostFont": {
                            "id": "hf-1",
                            "url": "https://fonts.example.com/hf-1.otf",
                            "version": 1,
                            "createdAt": "2024-01-01T00:00:00Z"
                        }
                    }
                }));
            })
            .await;

        let record = client
            .host_font("af-1", "https://files.example.com/tmp/1")
            .await
            .expect("host font");
        mock.assert_async().await;

        assert_eq!(record.id, "hf-1");
        assert_eq!(record.version, Some(1));
    }

    #[tokio::test]
    async fn create_hosted_domain_parses_hosted_variants() {
        let server = MockServer::start_async().await;
        let client = client(&server, None);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/simple/v1/project")
                    .body_contains("createHostedDomain")
                    .body_contains("\"hostedVariantsIds\":[\"hf-1\",\"hf-2\"]")
                    .body_contains("\"creatorId\":\"user-1\"");
                then.status(200).json_body(json!({
                    "data": {
                        "createHostedDomain": {
                            "id": "hd-1",
                            "domain": "www.example.com",
                            "updatedAt": "2024-01-01T00:00:00Z",
                            "hostedVariants": [
                                {
                                    "id": "hf-1",
                                    "url": "https://fonts.example.com/hf-1.otf",
                                    "createdAt": "2024-01-01T00:00:00Z",
                                    "abstractedFont": { "id": "af-1" },
                                    "version": 1
                                }
                            ]
                        }
                    }
                }));
            })
            .await;

        let record = client
            .create_hosted_domain(
                "www.example.com",
                "user-1",
                &["hf-1".to_string(), "hf-2".to_string()],
            )
            .await
            .expect("create hosted domain");
        mock.assert_async().await;

        assert_eq!(record.domain, "www.example.com");
        assert_eq!(record.hosted_variants.len(), 1);
        assert_eq!(
            record.hosted_variants[0].abstracted_font,
            Some(IdRef {
                id: "af-1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn create_abstracted_font_omits_nothing_from_variables() {
        let server = MockServer::start_async().await;
        let client = client(&server, None);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/simple/v1/project")
                    .body_contains("\"type\":\"VARIANT\"")
                    .body_contains("\"variantId\":\"v-1\"")
                    .body_contains("\"presetId\":null");
                then.status(200).json_body(json!({
                    "data": {
                        "createAbstractedFont": {
                            "id": "af-new",
                            "type": "VARIANT",
                            "template": null,
                            "preset": null,
                            "variant": { "id": "v-1", "family": { "id": "fam-1" } }
                        }
                    }
                }));
            })
            .await;

        let record = client
            .create_abstracted_font(&CreateAbstractedFontRequest {
                kind: "VARIANT",
                variant_id: Some("v-1"),
                template: None,
                preset_id: None,
                name: "Grotesk",
            })
            .await
            .expect("create abstracted font");
        mock.assert_async().await;

        assert_eq!(record.id, "af-new");
        let variant = record.variant.expect("variant");
        assert_eq!(variant.family.map(|f| f.id).as_deref(), Some("fam-1"));
    }

    #[tokio::test]
    async fn graphql_errors_are_surfaced() {
        let server = MockServer::start_async().await;
        let client = client(&server, None);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/simple/v1/project");
                then.status(200).json_body(json!({
                    "data": null,
                    "errors": [
                        { "message": "Insufficient permissions" },
                        { "message": "Node not found" }
                    ]
                }));
            })
            .await;

        let err = client
            .delete_abstracted_font("af-1")
            .await
            .expect_err("should error");
        match err {
            RemoteError::Graphql(message) => {
                assert_eq!(message, "Insufficient permissions; Node not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_status_returns_message() {
        let server = MockServer::start_async().await;
        let client = client(&server, None);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/simple/v1/project");
                then.status(502).body("bad gateway");
            })
            .await;

        let err = client
            .delete_abstracted_font("af-1")
            .await
            .expect_err("should error");
        match err {
            RemoteError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

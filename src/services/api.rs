//! src/services/api.rs
//!
//! The three RPC operations of the multipart protocol and a GraphQL client
//! that carries them over a single POST endpoint.

use crate::{
    errors::ApiError,
    models::{
        attachment::{Attachment, AttachmentType},
        session::UploadedPart,
    },
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::future::Future;
use tracing::debug;

/// Input of `CreateMultipartUpload`.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateMultipartUploadInput {
    /// Owning entity id.
    pub id: String,
    pub content_type: String,
    pub attachment_type: AttachmentType,
    pub file_type: String,
}

/// Session identifiers returned by `CreateMultipartUpload`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MultipartSession {
    #[serde(rename = "UploadId")]
    pub upload_id: String,

    #[serde(rename = "Key")]
    pub key: String,
}

/// Input of `GetPreSignedUrl`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresignPartInput {
    pub upload_id: String,
    /// Storage key of the session.
    pub name: String,
    /// 1-based part number.
    pub parts: u32,
}

/// Input of `CompleteMultipartUpload`. `parts` must be sorted ascending.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CompleteMultipartUploadInput {
    #[serde(rename = "UploadId")]
    pub upload_id: String,

    #[serde(rename = "Key")]
    pub key: String,

    #[serde(rename = "type")]
    pub attachment_type: AttachmentType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "relatedId")]
    pub related_id: String,

    pub parts: Vec<UploadedPart>,

    #[serde(rename = "detailedInput", skip_serializing_if = "Option::is_none")]
    pub detailed_input: Option<Value>,

    #[serde(rename = "embedMapInput", skip_serializing_if = "Option::is_none")]
    pub embed_map_input: Option<Value>,
}

/// Server side of the multipart protocol.
///
/// Each call is a single request/response; implementations must not retry.
pub trait UploadApi {
    fn create_multipart_upload(
        &self,
        input: &CreateMultipartUploadInput,
    ) -> impl Future<Output = Result<MultipartSession, ApiError>> + Send;

    /// Returns the single-use signed URL for one part.
    fn get_presigned_url(
        &self,
        input: &PresignPartInput,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    fn complete_multipart_upload(
        &self,
        input: &CompleteMultipartUploadInput,
    ) -> impl Future<Output = Result<Attachment, ApiError>> + Send;
}

pub const CREATE_MULTIPART_UPLOAD: &str = "mutation CreateMultipartUpload($input: CreateMultipartUploadInput!) { \
createMultipartUpload(createMultipartUploadInput: $input) { createMultipartData { UploadId Key } } }";

pub const GET_PRESIGNED_URL: &str = "query GetPreSignedUrl($input: GetPreSignedUrlInput!) { \
getPreSignedUrl(getPreSignedUrlInput: $input) { key } }";

pub const COMPLETE_MULTIPART_UPLOAD: &str = "mutation CompleteMultipartUpload($input: CompleteMultipartUploadInput!) { \
completeMultipartUpload(completeMultipartUploadInput: $input) { id key name url type } }";

#[derive(Serialize)]
struct GraphqlRequest<'a, V> {
    query: &'a str,
    variables: InputVariables<'a, V>,
}

#[derive(Serialize)]
struct InputVariables<'a, V> {
    input: &'a V,
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMultipartUploadData {
    create_multipart_upload: CreateMultipartUploadPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMultipartUploadPayload {
    create_multipart_data: MultipartSession,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetPresignedUrlData {
    get_pre_signed_url: SignedUrlPayload,
}

#[derive(Deserialize)]
struct SignedUrlPayload {
    key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteMultipartUploadData {
    complete_multipart_upload: Attachment,
}

/// `UploadApi` over a GraphQL endpoint.
#[derive(Clone)]
pub struct GraphqlApi {
    http: reqwest::Client,
    endpoint: String,
}

impl GraphqlApi {
    /// Creates a client posting to `endpoint`, authenticating with `token` as a
    /// bearer token when one is given.
    pub fn new(endpoint: impl Into<String>, token: Option<&str>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ApiError::Rejected("invalid API token".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self::with_client(http, endpoint))
    }

    /// Reuses an existing `reqwest::Client` (connection pool, TLS config).
    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one operation and unwraps the `{ data, errors }` envelope.
    async fn execute<V, T>(&self, query: &str, input: &V) -> Result<T, ApiError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let request = GraphqlRequest {
            query,
            variables: InputVariables { input },
        };
        let resp = self.http.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        let envelope: GraphqlResponse<T> = serde_json::from_slice(&body)?;
        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ApiError::Rejected(message));
        }

        envelope.data.ok_or(ApiError::MissingData("data"))
    }
}

impl UploadApi for GraphqlApi {
    async fn create_multipart_upload(
        &self,
        input: &CreateMultipartUploadInput,
    ) -> Result<MultipartSession, ApiError> {
        debug!(related_id = %input.id, "creating multipart upload");
        let data: CreateMultipartUploadData =
            self.execute(CREATE_MULTIPART_UPLOAD, input).await?;
        Ok(data.create_multipart_upload.create_multipart_data)
    }

    async fn get_presigned_url(&self, input: &PresignPartInput) -> Result<String, ApiError> {
        let data: GetPresignedUrlData = self.execute(GET_PRESIGNED_URL, input).await?;
        Ok(data.get_pre_signed_url.key)
    }

    async fn complete_multipart_upload(
        &self,
        input: &CompleteMultipartUploadInput,
    ) -> Result<Attachment, ApiError> {
        debug!(upload_id = %input.upload_id, parts = input.parts.len(), "completing multipart upload");
        let data: CompleteMultipartUploadData =
            self.execute(COMPLETE_MULTIPART_UPLOAD, input).await?;
        Ok(data.complete_multipart_upload)
    }
}

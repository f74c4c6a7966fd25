//! In-process backend for integration tests.
//!
//! Serves the three GraphQL operations of the multipart protocol on
//! `POST /graphql` and acts as the blob store on
//! `PUT /blob/{upload_id}/{part}`, answering every part with a quoted MD5
//! ETag. Completion re-assembles the stored parts so tests can compare the
//! final object byte for byte.

#![allow(dead_code)]

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::net::TcpListener;
use uuid::Uuid;

/// Everything the backend saw, in arrival order.
#[derive(Default, Debug)]
pub struct Recorded {
    pub sessions_created: usize,
    pub authorization: Vec<Option<String>>,
    pub presigned: Vec<u32>,
    pub put_attempts: Vec<u32>,
    pub completions: Vec<Value>,
    pub parts: HashMap<(String, u32), Bytes>,
    pub objects: HashMap<String, Vec<u8>>,
}

impl Recorded {
    /// Part numbers listed in the first completion request.
    pub fn completed_part_numbers(&self) -> Option<Vec<u64>> {
        self.completions.first().map(|input| {
            input["parts"]
                .as_array()
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p["PartNumber"].as_u64())
                        .collect()
                })
                .unwrap_or_default()
        })
    }
}

#[derive(Default, Clone)]
pub struct BackendOptions {
    /// Part numbers the blob store answers with `500`.
    pub fail_parts: Vec<u32>,
    /// Reject `createMultipartUpload` with a GraphQL error.
    pub reject_create: bool,
}

struct BackendState {
    base_url: String,
    options: BackendOptions,
    fail_parts: HashSet<u32>,
    recorded: Mutex<Recorded>,
}

pub struct Backend {
    pub base_url: String,
    state: Arc<BackendState>,
}

impl Backend {
    pub async fn spawn(options: BackendOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(BackendState {
            base_url: base_url.clone(),
            fail_parts: options.fail_parts.iter().copied().collect(),
            options,
            recorded: Mutex::new(Recorded::default()),
        });

        let app = routes().with_state(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.base_url)
    }

    pub fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.state.recorded.lock().unwrap()
    }
}

fn routes() -> Router<Arc<BackendState>> {
    Router::new()
        .route("/graphql", post(graphql))
        .route("/blob/{upload_id}/{part}", put(upload_part))
}

#[derive(Deserialize)]
struct GraphqlRequest {
    query: String,
    variables: Variables,
}

#[derive(Deserialize)]
struct Variables {
    input: Value,
}

fn graphql_error(message: &str) -> Json<Value> {
    Json(json!({ "data": null, "errors": [{ "message": message }] }))
}

async fn graphql(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(req): Json<GraphqlRequest>,
) -> Json<Value> {
    let input = req.variables.input;
    let mut recorded = state.recorded.lock().unwrap();
    recorded.authorization.push(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    if req.query.contains("createMultipartUpload(") {
        if state.options.reject_create {
            return graphql_error("related entity not found");
        }
        recorded.sessions_created += 1;
        let related = input["id"].as_str().unwrap_or("unknown");
        return Json(json!({
            "data": {
                "createMultipartUpload": {
                    "createMultipartData": {
                        "UploadId": Uuid::new_v4().to_string(),
                        "Key": format!("attachments/{}/{}", related, Uuid::new_v4()),
                    }
                }
            }
        }));
    }

    if req.query.contains("getPreSignedUrl(") {
        let upload_id = input["uploadId"].as_str().unwrap_or_default();
        let Some(part) = input["parts"].as_u64() else {
            return graphql_error("parts must be a number");
        };
        recorded.presigned.push(part as u32);
        return Json(json!({
            "data": {
                "getPreSignedUrl": {
                    "key": format!("{}/blob/{}/{}", state.base_url, upload_id, part)
                }
            }
        }));
    }

    if req.query.contains("completeMultipartUpload(") {
        recorded.completions.push(input.clone());
        let upload_id = input["UploadId"].as_str().unwrap_or_default().to_string();
        let key = input["Key"].as_str().unwrap_or_default().to_string();

        let mut object = Vec::new();
        for part in input["parts"].as_array().cloned().unwrap_or_default() {
            let number = part["PartNumber"].as_u64().unwrap_or_default() as u32;
            let Some(bytes) = recorded.parts.get(&(upload_id.clone(), number)) else {
                return graphql_error(&format!("part {number} was never uploaded"));
            };
            if part["ETag"].as_str() != Some(format!("{:x}", md5::compute(bytes)).as_str()) {
                return graphql_error(&format!("ETag mismatch for part {number}"));
            }
            object.extend_from_slice(bytes);
        }
        recorded.objects.insert(key.clone(), object);

        return Json(json!({
            "data": {
                "completeMultipartUpload": {
                    "id": 101,
                    "key": key,
                    "name": input["name"],
                    "url": format!("{}/objects/{}", state.base_url, key),
                    "type": input["type"],
                }
            }
        }));
    }

    graphql_error("unknown operation")
}

async fn upload_part(
    State(state): State<Arc<BackendState>>,
    Path((upload_id, part)): Path<(String, u32)>,
    body: Bytes,
) -> Response {
    let mut recorded = state.recorded.lock().unwrap();
    recorded.put_attempts.push(part);
    if state.fail_parts.contains(&part) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let etag = format!("\"{:x}\"", md5::compute(&body));
    recorded.parts.insert((upload_id, part), body);

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    (StatusCode::OK, headers).into_response()
}

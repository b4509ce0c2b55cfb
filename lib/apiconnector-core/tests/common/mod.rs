#![allow(dead_code, missing_docs, clippy::expect_used, clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::post;
use rstest::fixture;
use serde_json::{Value, json};
use tracing::info;
use url::Url;

use apiconnector_core::{ConnectorConfig, ContractDocument, RetryPolicy, TransportSettings};

pub fn init_tracing() {
    // should be run once, fail otherwise, we skip that error
    let _ = tracing_subscriber::fmt()
        .pretty()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    info!("Tracing initialized");
}

/// A request as the mock model received it.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Received {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }

    pub fn form(&self) -> Vec<(String, String)> {
        serde_urlencoded::from_bytes(&self.body).expect("form body")
    }
}

#[derive(Debug, Clone, Default)]
struct MockState {
    // status of each answer, the last one repeats
    statuses: Arc<Vec<u16>>,
    received: Arc<Mutex<Vec<Received>>>,
    multipart_fields: Arc<Mutex<Vec<(String, String)>>>,
}

/// A local model server answering with scripted statuses.
///
/// Every path is served. `/multipart` additionally decodes its body as
/// `multipart/form-data`.
#[derive(Debug)]
pub struct MockModel {
    url: Url,
    state: MockState,
}

impl MockModel {
    pub async fn start(statuses: impl IntoIterator<Item = u16>) -> anyhow::Result<Self> {
        let state = MockState {
            statuses: Arc::new(statuses.into_iter().collect()),
            ..MockState::default()
        };
        let app = Router::new()
            .route("/multipart", post(multipart))
            .fallback(record)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = Url::parse(&format!("http://{}", listener.local_addr()?))?;
        info!(%url, "launching mock model");
        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                tracing::error!(%error, "mock model stopped");
            }
        });

        Ok(Self { url, state })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Transport settings pointing at this server, retrying without waiting.
    pub fn settings(&self) -> TransportSettings {
        TransportSettings::default()
            .with_base_url(self.url.clone())
            .with_retry_policy(
                RetryPolicy::default()
                    .with_backoff_factor(0.0)
                    .with_rate_limit_timeout(std::time::Duration::ZERO),
            )
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().expect("not poisoned").clone()
    }

    pub fn multipart_fields(&self) -> Vec<(String, String)> {
        self.state
            .multipart_fields
            .lock()
            .expect("not poisoned")
            .clone()
    }
}

fn answer(state: &MockState, received: Received) -> (StatusCode, axum::Json<Value>) {
    let mut all = state.received.lock().expect("not poisoned");
    all.push(received);
    let index = all.len() - 1;
    let code = state
        .statuses
        .get(index)
        .or_else(|| state.statuses.last())
        .copied()
        .unwrap_or(200);
    let status = StatusCode::from_u16(code).expect("valid status");
    (status, axum::Json(json!({ "attempt": index + 1 })))
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, axum::Json<Value>) {
    let received = Received {
        method,
        uri,
        headers,
        body,
    };
    answer(&state, received)
}

async fn multipart(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    mut form: Multipart,
) -> (StatusCode, axum::Json<Value>) {
    let mut fields = Vec::new();
    while let Ok(Some(field)) = form.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let text = field.text().await.unwrap_or_default();
        fields.push((name, text));
    }
    state
        .multipart_fields
        .lock()
        .expect("not poisoned")
        .extend(fields);

    let received = Received {
        method: Method::POST,
        uri,
        headers,
        body: Bytes::new(),
    };
    answer(&state, received)
}

/// A contract with a single `POST` operation on `path` accepting `content_type`.
pub fn post_contract(path: &str, content_type: &str) -> ContractDocument {
    ContractDocument::from_value(json!({
        "openapi": "3.0.3",
        "info": { "title": "Donation model", "version": "1.0" },
        "servers": [{ "url": "http://unreachable.invalid" }],
        "paths": {
            path: {
                "post": {
                    "operationId": "predict",
                    "security": [{ "bearerAuth": [] }],
                    "requestBody": { "content": { content_type: {} } }
                }
            }
        },
        "components": {
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer" }
            }
        }
    }))
    .expect("valid contract")
}

pub fn bearer_config(token: &str) -> ConnectorConfig {
    ConnectorConfig::from_value(json!({ "authentication": { "token": token } }))
}

#[fixture]
pub async fn mock_model() -> MockModel {
    init_tracing();
    match MockModel::start([200]).await {
        Ok(model) => model,
        Err(error) => {
            panic!("fail to start mock model: {error:?}");
        }
    }
}

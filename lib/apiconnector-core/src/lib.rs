//! # API Connector Core
//!
//! Call a remote, OpenAPI-described prediction service as if it were a local model.
//!
//! A [`Connector`] is driven by a [`ContractDocument`] and a [`ConnectorConfig`]:
//!
//! 1. [`setup`](Connector::setup) validates the configuration against the contract,
//!    resolves the first declared operation and registers the credentials for
//!    the declared `http` bearer and basic security schemes.
//! 2. [`predict`](Connector::predict) builds a request from the operation and
//!    sends it through a [`ResilientTransport`], which retries transient
//!    failures, rate limiting (`429`) and server errors with backoff.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use apiconnector_core::{Connector, ConnectorConfig, ContractDocument, RetryPolicy, TransportSettings};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let contract = ContractDocument::from_json_str(r#"{
//!     "openapi": "3.0.3",
//!     "servers": [{ "url": "https://model.example.com" }],
//!     "paths": {
//!         "/predict": {
//!             "post": {
//!                 "security": [{ "bearerAuth": [] }],
//!                 "requestBody": { "content": { "application/json": {} } }
//!             }
//!         }
//!     },
//!     "components": {
//!         "securitySchemes": { "bearerAuth": { "type": "http", "scheme": "bearer" } }
//!     }
//! }"#)?;
//! let config = ConnectorConfig::from_value(json!({
//!     "authentication": { "token": "my-secret-token" }
//! }));
//!
//! let settings = TransportSettings::default()
//!     .with_retry_policy(RetryPolicy::default().with_max_retries(5));
//! let mut connector = Connector::new(contract, config).with_settings(settings);
//! connector.setup()?;
//!
//! match connector.predict(&json!(null)).await {
//!     Ok(response) => println!("{}: {}", response.status(), response.text()),
//!     Err(error) => eprintln!("prediction failed: {error}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries
//!
//! With the default [`RetryPolicy`] a request is attempted up to 4 times.
//! Between attempts the transport waits 1s, 2s then 4s, or the rate limit
//! timeout (5s) after a `429`. Other responses, `4xx` included, are returned
//! as is. When every attempt failed, the message
//! `Maximum retries exceeded (3) <last failure>` is recorded and can be read
//! with [`Connector::last_error`].
//!
//! ## Custom transports
//!
//! The [`Dispatch`] trait performs a single attempt. [`HttpDispatcher`] is the
//! `reqwest` implementation; [`Connector::with_dispatcher`] plugs in another one.

mod auth;
mod client;
mod config;
mod connector;
mod contract;
mod plugin;
mod request;
mod transport;
mod validator;

pub use self::auth::{
    Authenticate, AuthenticationConfigurator, AuthenticationError, Credentials, SchemeOutcome,
    SecureString,
};
pub use self::client::{ClientError, ContractClient};
pub use self::config::{ClientCertificate, ConnectorConfig, TransportSettings};
pub use self::connector::{Connector, OPENAPI_CONNECTOR_METADATA, PredictError, SetupError};
pub use self::contract::{
    AuthScheme, ContractDocument, ContractError, HttpAuthKind, MediaTypeSpec,
    OperationDescriptor, PREDICT_OPERATION_ID, ParameterLocation, ParameterSpec, RequestBodySpec,
};
pub use self::plugin::{ModelPluginType, PluginMetadata, PluginType, SerializerPluginType};
pub use self::request::{
    BuildError, Payload, PreparedRequest, RequestBody, RequestBuilder, SUPPORTED_CONTENT_TYPES,
};
pub use self::transport::{
    ConnectorState, Dispatch, DispatchError, HttpDispatcher, OutgoingRequest, ResilientTransport,
    Response, RetryPolicy, SendError,
};
pub use self::validator::{ContractValidator, ValidationError};

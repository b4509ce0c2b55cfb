//! The model connector facade.

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{AuthenticationConfigurator, SchemeOutcome};
use crate::client::{ClientError, ContractClient};
use crate::config::{ConnectorConfig, TransportSettings};
use crate::contract::{ContractDocument, ContractError, OperationDescriptor};
use crate::plugin::{ModelPluginType, PluginMetadata, PluginType};
use crate::request::{BuildError, RequestBuilder};
use crate::transport::{
    ConnectorState, Dispatch, DispatchError, HttpDispatcher, ResilientTransport, Response,
    SendError,
};
use crate::validator::{ContractValidator, ValidationError};

/// Registration metadata of the connector.
pub const OPENAPI_CONNECTOR_METADATA: PluginMetadata = PluginMetadata {
    name: "OpenAPIConnector",
    description: "OpenAPIConnector supports performing api calls to external model servers",
    version: "0.9.0",
};

type DispatcherFactory<D> = Box<dyn Fn(&TransportSettings) -> Result<D, DispatchError> + Send + Sync>;

/// Why [`Connector::setup`] failed.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum SetupError {
    /// The configuration does not satisfy the contract.
    #[display("{_0}")]
    Validation(ValidationError),

    /// The contract cannot be used.
    #[display("{_0}")]
    Contract(ContractError),

    /// Neither the settings nor the contract name a server.
    #[from(skip)]
    #[display("No server URL: the contract declares no 'servers' and none is configured")]
    MissingServer,

    /// The server URL is not an absolute URL.
    #[from(skip)]
    #[display("Invalid server URL '{url}': {source}")]
    InvalidServerUrl {
        /// The URL as declared.
        url: String,
        /// The parse failure.
        source: url::ParseError,
    },

    /// The HTTP client cannot be created.
    #[display("{_0}")]
    Dispatcher(DispatchError),
}

/// A prediction call failed.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum PredictError {
    /// [`Connector::setup`] has not succeeded.
    #[from(skip)]
    #[display("Connector is not set up")]
    NotReady,

    /// The request cannot be built from the operation.
    #[display("{_0}")]
    Build(BuildError),

    /// The request cannot be sent and retrying would not help.
    #[display("{_0}")]
    Client(ClientError),

    /// The model service kept failing; carries the last recorded error.
    #[from(skip)]
    #[display("{message}")]
    ModelRequest {
        /// The connector's last error message.
        message: String,
    },

    /// The connector does not implement the operation.
    #[from(skip)]
    #[display("OpenAPIConnector does not support {operation} method")]
    UnsupportedOperation {
        /// The operation name.
        operation: &'static str,
    },
}

struct Session<D> {
    operation: OperationDescriptor,
    client: ContractClient<D>,
    auth_outcomes: Vec<SchemeOutcome>,
}

/// Calls the first operation of an OpenAPI contract as if it were a local model.
///
/// # Example
///
/// ```rust,no_run
/// use apiconnector_core::{Connector, ConnectorConfig, ContractDocument};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let contract = ContractDocument::from_json_str(r#"{
///     "openapi": "3.0.3",
///     "servers": [{ "url": "http://localhost:5000" }],
///     "paths": {
///         "/predict": {
///             "post": { "requestBody": { "content": { "application/json": {} } } }
///         }
///     }
/// }"#)?;
/// let config = ConnectorConfig::from_value(json!({ "authentication": { "token": "secret" } }));
///
/// let mut connector = Connector::new(contract, config);
/// connector.setup()?;
///
/// let response = connector.predict(&json!([[1, 2, 3]])).await?;
/// println!("{}", response.text());
/// # Ok(())
/// # }
/// ```
#[derive(derive_more::Debug)]
pub struct Connector<D = HttpDispatcher> {
    contract: ContractDocument,
    config: ConnectorConfig,
    settings: TransportSettings,
    state: ConnectorState,
    #[debug(ignore)]
    dispatcher: DispatcherFactory<D>,
    #[debug("{}", if session.is_some() { "ready" } else { "not set up" })]
    session: Option<Session<D>>,
}

impl Connector<HttpDispatcher> {
    /// A connector sending requests over HTTP.
    pub fn new(contract: ContractDocument, config: ConnectorConfig) -> Self {
        Self::with_factory(contract, config, Box::new(HttpDispatcher::new))
    }
}

impl<D> Connector<D>
where
    D: Dispatch + Clone + 'static,
{
    /// A connector sending every attempt through `dispatcher`.
    ///
    /// TLS and timeout settings are the dispatcher's concern; the retry policy
    /// and the deadline still apply.
    pub fn with_dispatcher(contract: ContractDocument, config: ConnectorConfig, dispatcher: D) -> Self {
        Self::with_factory(
            contract,
            config,
            Box::new(move |_: &TransportSettings| -> Result<D, DispatchError> {
                Ok(dispatcher.clone())
            }),
        )
    }
}

impl<D> Connector<D>
where
    D: Dispatch,
{
    fn with_factory(
        contract: ContractDocument,
        config: ConnectorConfig,
        dispatcher: DispatcherFactory<D>,
    ) -> Self {
        Self {
            contract,
            config,
            settings: TransportSettings::default(),
            state: ConnectorState::new(),
            dispatcher,
            session: None,
        }
    }

    /// Replaces the transport settings, used by the next [`setup`](Self::setup).
    pub fn with_settings(mut self, settings: TransportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validates the configuration, resolves the operation, builds the client
    /// and registers the credentials.
    ///
    /// On failure the connector is left not set up.
    ///
    /// # Errors
    ///
    /// Returns the failure message.
    pub fn setup(&mut self) -> Result<(), String> {
        self.session = None;
        let session = self.try_setup().map_err(|err| {
            warn!(%err, "setup failed");
            err.to_string()
        })?;
        info!(
            operation = %session.operation.path(),
            method = %session.operation.method(),
            server = %session.client.base_url(),
            "connector ready"
        );
        self.session = Some(session);
        Ok(())
    }

    fn try_setup(&self) -> Result<Session<D>, SetupError> {
        ContractValidator.validate(&self.config, &self.contract)?;

        let operation = self.contract.first_operation()?;
        debug!(id = operation.id(), path = operation.path(), "resolved operation");

        let base_url = self.base_url()?;
        let dispatcher = (self.dispatcher)(&self.settings)?;
        let transport = ResilientTransport::new(
            dispatcher,
            self.settings.retry_policy().clone(),
            self.state.clone(),
        )
        .with_deadline(self.settings.deadline);
        let mut client = ContractClient::new(base_url, transport);

        let auth_outcomes =
            AuthenticationConfigurator.configure(&mut client, &self.contract, &self.config)?;

        Ok(Session {
            operation,
            client,
            auth_outcomes,
        })
    }

    fn base_url(&self) -> Result<Url, SetupError> {
        if let Some(url) = &self.settings.base_url {
            return Ok(url.clone());
        }
        let url = self.contract.server_url().ok_or(SetupError::MissingServer)?;
        Url::parse(url).map_err(|source| SetupError::InvalidServerUrl {
            url: url.to_string(),
            source,
        })
    }

    /// Whether the configuration satisfies the contract.
    pub fn is_supported(&self) -> bool {
        ContractValidator
            .validate(&self.config, &self.contract)
            .is_ok()
    }

    /// Whether [`setup`](Self::setup) succeeded.
    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    /// Calls the model.
    ///
    /// `data` is accepted for interface parity with local models: the request
    /// always carries the example payload.
    ///
    /// # Errors
    ///
    /// - [`PredictError::NotReady`] before a successful setup
    /// - [`PredictError::Build`] if the operation cannot be called
    /// - [`PredictError::ModelRequest`] when retries are exhausted
    /// - [`PredictError::Client`] for non-retryable failures
    pub async fn predict(&self, data: &Value) -> Result<Response, PredictError> {
        let session = self.session.as_ref().ok_or(PredictError::NotReady)?;
        debug!(data_is_null = data.is_null(), "predicting with the example payload");

        let request = RequestBuilder::default().build(&session.operation)?;
        match session
            .client
            .send(&request, session.operation.security())
            .await
        {
            Ok(response) => Ok(response),
            Err(ClientError::Send(
                SendError::RetryExhausted { .. } | SendError::DeadlineElapsed { .. },
            )) => {
                let message = self.state.last_error().await.unwrap_or_default();
                Err(PredictError::ModelRequest { message })
            }
            Err(err) => Err(PredictError::Client(err)),
        }
    }

    /// Probability predictions are not available from API models.
    ///
    /// # Errors
    ///
    /// Always fails with [`PredictError::UnsupportedOperation`].
    pub fn predict_proba(&self, _data: &Value) -> Result<Response, PredictError> {
        debug!("predict_proba is not supported by the OpenAPI connector");
        Err(PredictError::UnsupportedOperation {
            operation: "predict_proba",
        })
    }

    /// Scoring is not supported.
    ///
    /// # Errors
    ///
    /// Always fails with [`PredictError::UnsupportedOperation`].
    pub fn score(&self, _data: &Value, _y_true: &Value) -> Result<Value, PredictError> {
        Err(PredictError::UnsupportedOperation { operation: "score" })
    }

    /// The last transport error recorded by any call of this connector.
    pub async fn last_error(&self) -> Option<String> {
        self.state.last_error().await
    }

    /// The operation resolved at setup.
    pub fn operation(&self) -> Option<&OperationDescriptor> {
        self.session.as_ref().map(|session| &session.operation)
    }

    /// What happened to each declared security scheme at setup.
    pub fn auth_outcomes(&self) -> &[SchemeOutcome] {
        self.session
            .as_ref()
            .map(|session| session.auth_outcomes.as_slice())
            .unwrap_or_default()
    }

    /// The contract.
    pub fn contract(&self) -> &ContractDocument {
        &self.contract
    }

    /// Registration metadata.
    pub fn metadata(&self) -> PluginMetadata {
        OPENAPI_CONNECTOR_METADATA
    }

    /// Always [`PluginType::Model`].
    pub fn plugin_type(&self) -> PluginType {
        PluginType::Model
    }

    /// Always [`ModelPluginType::Api`].
    pub fn model_plugin_type(&self) -> ModelPluginType {
        ModelPluginType::Api
    }

    /// The connector name.
    pub fn model_algorithm(&self) -> &'static str {
        OPENAPI_CONNECTOR_METADATA.name
    }
}

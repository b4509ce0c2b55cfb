//! Connector configuration.
//!
//! Two kinds of settings drive a connector:
//!
//! - [`ConnectorConfig`]: the caller-supplied JSON configuration. It is
//!   validated against the contract and provides the credentials.
//! - [`TransportSettings`]: how requests are sent (TLS, timeouts, retries),
//!   configured in code with `with_*` methods.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use crate::auth::SecureString;
use crate::transport::RetryPolicy;

/// Caller-supplied configuration, immutable after construction.
///
/// The only section read by the connector is `authentication`:
///
/// ```json
/// { "authentication": { "token": "..." } }
/// { "authentication": { "username": "...", "password": "..." } }
/// ```
///
/// Absent values read as empty strings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    raw: Value,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }
}

impl ConnectorConfig {
    /// Wraps a JSON configuration value.
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Fails if the text is not JSON.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::from_value)
    }

    /// The configuration as given.
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// `authentication.token`, empty when absent.
    pub fn token(&self) -> SecureString {
        self.authentication_field("token")
    }

    /// `authentication.username`, empty when absent.
    pub fn username(&self) -> String {
        self.authentication_field("username").into_string()
    }

    /// `authentication.password`, empty when absent.
    pub fn password(&self) -> SecureString {
        self.authentication_field("password")
    }

    fn authentication_field(&self, name: &str) -> SecureString {
        let value = match self.raw.get("authentication").and_then(|auth| auth.get(name)) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };
        SecureString::new(value)
    }
}

impl From<Value> for ConnectorConfig {
    fn from(raw: Value) -> Self {
        Self::from_value(raw)
    }
}

/// A PEM encoded client identity (certificate chain and private key).
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pem: Vec<u8>,
}

impl ClientCertificate {
    /// Wraps PEM bytes holding both the certificate and its private key.
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        Self { pem: pem.into() }
    }

    pub(crate) fn as_pem(&self) -> &[u8] {
        &self.pem
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("pem", &format_args!("[{} bytes]", self.pem.len()))
            .finish()
    }
}

/// How the connector sends requests.
///
/// # Default Configuration
///
/// - **TLS verification**: enabled, also for self-signed model endpoints; those
///   need an explicit [`with_verify(false)`](Self::with_verify)
/// - **Client certificate**: none
/// - **Request timeout**: 5 seconds per attempt
/// - **Deadline**: none (bounded by attempts and backoff only)
/// - **Base URL**: the first `servers` entry of the contract
/// - **Retry policy**: [`RetryPolicy::default()`]
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use apiconnector_core::{RetryPolicy, TransportSettings};
///
/// let settings = TransportSettings::default()
///     .with_request_timeout(Duration::from_secs(10))
///     .with_deadline(Duration::from_secs(60))
///     .with_retry_policy(RetryPolicy::default().with_max_retries(5));
/// ```
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub(crate) verify: bool,
    pub(crate) cert: Option<ClientCertificate>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) deadline: Option<Duration>,
    pub(crate) base_url: Option<Url>,
    pub(crate) retry_policy: RetryPolicy,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            verify: true,
            cert: None,
            request_timeout: Some(Duration::from_secs(5)),
            deadline: None,
            base_url: None,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl TransportSettings {
    /// Enables or disables TLS certificate verification.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Presents a client certificate on TLS connections.
    pub fn with_cert(mut self, cert: ClientCertificate) -> Self {
        self.cert = Some(cert);
        self
    }

    /// Sets the connect and read timeout of a single attempt.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Removes the per-attempt timeout.
    pub fn without_request_timeout(mut self) -> Self {
        self.request_timeout = None;
        self
    }

    /// Bounds the total time of a call, retries and backoff included.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sends requests to `base_url` instead of the contract's first server.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// The retry policy requests are sent with.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

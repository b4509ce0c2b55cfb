use std::borrow::Cow;
use std::future::Future;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::TransportSettings;

/// A fully resolved request, ready to be sent as many times as needed.
#[derive(Clone, derive_more::Debug)]
pub struct OutgoingRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, query string included.
    pub url: Url,
    /// Request headers, `Content-Type` and `Authorization` included.
    pub headers: HeaderMap,
    /// Encoded body.
    #[debug("{}", body.as_ref().map_or(0, Bytes::len))]
    pub body: Option<Bytes>,
}

impl OutgoingRequest {
    /// A request without headers nor body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// The response of the model service, returned to the caller verbatim.
#[derive(Clone, derive_more::Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    #[debug("{} bytes", body.len())]
    body: Bytes,
}

impl Response {
    /// Assembles a response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as text, invalid UTF-8 sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes a JSON body.
    ///
    /// # Errors
    ///
    /// Fails if the body is not a JSON representation of `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A single attempt could not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum DispatchError {
    /// Timeouts and network level failures; worth another attempt.
    #[display("{message}")]
    Transient {
        /// The underlying error text.
        message: String,
    },

    /// The request can never succeed as built (invalid request, TLS setup,
    /// redirect loop).
    #[display("{message}")]
    Fatal {
        /// The underlying error text.
        message: String,
    },
}

impl DispatchError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::Transient { message }
        } else {
            Self::Fatal { message }
        }
    }
}

/// Sends one attempt of a request.
///
/// This is the seam under the retry loop: [`HttpDispatcher`] talks HTTP, tests
/// and alternative transports provide their own implementation.
pub trait Dispatch: Send + Sync {
    /// Performs a single attempt.
    fn dispatch(
        &self,
        request: &OutgoingRequest,
    ) -> impl Future<Output = Result<Response, DispatchError>> + Send;
}

/// [`Dispatch`] over a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    /// Builds the HTTP client from the TLS and timeout settings.
    ///
    /// # Errors
    ///
    /// Fails if the client certificate cannot be read or the TLS backend
    /// cannot be initialized.
    pub fn new(settings: &TransportSettings) -> Result<Self, DispatchError> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!settings.verify);

        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout).connect_timeout(timeout);
        }

        if let Some(cert) = &settings.cert {
            let identity =
                reqwest::Identity::from_pem(cert.as_pem()).map_err(|err| DispatchError::Fatal {
                    message: format!("invalid client certificate: {err}"),
                })?;
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(|err| DispatchError::Fatal {
            message: err.to_string(),
        })?;
        Ok(Self { client })
    }
}

impl Dispatch for HttpDispatcher {
    async fn dispatch(&self, request: &OutgoingRequest) -> Result<Response, DispatchError> {
        let mut outgoing = reqwest::Request::new(request.method.clone(), request.url.clone());
        *outgoing.headers_mut() = request.headers.clone();
        if let Some(body) = &request.body {
            *outgoing.body_mut() = Some(reqwest::Body::from(body.clone()));
        }

        debug!(?outgoing, "sending...");
        let response = self.client.execute(outgoing).await?;
        debug!(?response, "...receiving");

        let status = response.status();
        let headers = response.headers().clone();
        // a peer hanging up mid-body is retried like a connect failure
        let body = response
            .bytes()
            .await
            .map_err(|err| DispatchError::Transient {
                message: format!("failed to read response body: {}", source_chain(&err)),
            })?;
        Ok(Response::new(status, headers, body))
    }
}

// `outer: inner: innermost`
fn source_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

//! The client bound to the contract's server.

use headers::HeaderMapExt;
use indexmap::IndexMap;
use tracing::debug;
use url::Url;

use crate::auth::{Authenticate, AuthenticationError, Credentials};
use crate::request::PreparedRequest;
use crate::transport::{
    Dispatch, HttpDispatcher, OutgoingRequest, ResilientTransport, Response, SendError,
};

/// A request could not be sent to the server.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum ClientError {
    /// The request URL cannot be built from the base URL and the path.
    #[display("Invalid request URL: {_0}")]
    InvalidUrl(url::ParseError),

    /// The registered credentials cannot be turned into a header.
    #[display("{_0}")]
    Authentication(AuthenticationError),

    /// The transport gave up.
    #[display("{_0}")]
    Send(SendError),
}

/// Sends prepared requests to one server, with the registered credentials and
/// through a [`ResilientTransport`].
#[derive(Debug, Clone)]
pub struct ContractClient<D = HttpDispatcher> {
    base_url: Url,
    credentials: IndexMap<String, Credentials>,
    transport: ResilientTransport<D>,
}

impl<D> ContractClient<D>
where
    D: Dispatch,
{
    /// A client for the server at `base_url`, without credentials.
    pub fn new(base_url: Url, transport: ResilientTransport<D>) -> Self {
        Self {
            base_url,
            credentials: IndexMap::new(),
            transport,
        }
    }

    /// The server the requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The credentials registered for `scheme`.
    pub fn credentials(&self, scheme: &str) -> Option<&Credentials> {
        self.credentials.get(scheme)
    }

    /// The transport.
    pub fn transport(&self) -> &ResilientTransport<D> {
        &self.transport
    }

    /// Resolves `request` against the base URL and applies the credentials of
    /// the security schemes in `security`.
    ///
    /// Schemes without registered credentials are ignored. When several
    /// schemes apply, the first one wins.
    ///
    /// # Errors
    ///
    /// Fails if the URL cannot be built or the credentials cannot be rendered.
    pub fn outgoing(
        &self,
        request: &PreparedRequest,
        security: &[String],
    ) -> Result<OutgoingRequest, ClientError> {
        let url = self.build_url(request)?;
        let mut outgoing = OutgoingRequest::new(request.method.clone(), url);
        outgoing.headers = request.headers.clone();

        if let Some((scheme, credentials)) = security
            .iter()
            .find_map(|scheme| Some((scheme, self.credentials.get(scheme)?)))
        {
            debug!(%scheme, %credentials, "applying credentials");
            let (name, value) = credentials.to_header()?;
            outgoing.headers.insert(name, value);
        }

        if let Some(body) = &request.body {
            outgoing.headers.typed_insert(body.content_type().clone());
            outgoing.body = Some(body.data().clone());
        }

        Ok(outgoing)
    }

    /// Sends `request` with the credentials of `security`.
    ///
    /// # Errors
    ///
    /// See [`outgoing`](Self::outgoing) and [`ResilientTransport::send`].
    pub async fn send(
        &self,
        request: &PreparedRequest,
        security: &[String],
    ) -> Result<Response, ClientError> {
        let outgoing = self.outgoing(request, security)?;
        let response = self.transport.send(&outgoing).await?;
        Ok(response)
    }

    fn build_url(&self, request: &PreparedRequest) -> Result<Url, ClientError> {
        let url = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        let mut url = url.parse::<Url>()?;

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        Ok(url)
    }
}

impl<D> Authenticate for ContractClient<D> {
    fn authenticate(&mut self, scheme: &str, credentials: Credentials) {
        self.credentials.insert(scheme.to_string(), credentials);
    }
}

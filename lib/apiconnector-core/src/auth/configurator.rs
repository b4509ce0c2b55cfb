use tracing::{debug, warn};

use super::Credentials;
use crate::config::ConnectorConfig;
use crate::contract::{ContractDocument, ContractError, HttpAuthKind};

/// Something credentials can be registered on, keyed by security scheme name.
pub trait Authenticate {
    /// Registers `credentials` for the security scheme named `scheme`.
    ///
    /// Registering twice for the same scheme replaces the first credentials.
    fn authenticate(&mut self, scheme: &str, credentials: Credentials);
}

/// What happened to one declared security scheme during setup.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum SchemeOutcome {
    /// Credentials were registered for the scheme.
    #[display("{scheme}: registered {kind} credentials")]
    Registered {
        /// Scheme name.
        scheme: String,
        /// Kind of credentials registered.
        kind: HttpAuthKind,
    },

    /// The scheme is recognized but the connector does not fill it in.
    #[display("{scheme}: unsupported scheme type '{kind}'")]
    Unsupported {
        /// Scheme name.
        scheme: String,
        /// The scheme `type`.
        kind: String,
        /// The scheme `scheme`, for `http` schemes.
        sub_scheme: Option<String>,
    },
}

/// Registers the configured credentials for each declared security scheme.
///
/// - `http` + `bearer`: `authentication.token`
/// - `http` + `basic`: `authentication.username` and `authentication.password`
/// - anything else: skipped, reported as [`SchemeOutcome::Unsupported`]
///
/// Missing credentials are registered as empty strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticationConfigurator;

impl AuthenticationConfigurator {
    /// Runs once at setup, returning one outcome per declared scheme.
    ///
    /// # Errors
    ///
    /// Fails if `components.securitySchemes` cannot be read.
    pub fn configure(
        &self,
        client: &mut impl Authenticate,
        contract: &ContractDocument,
        config: &ConnectorConfig,
    ) -> Result<Vec<SchemeOutcome>, ContractError> {
        let schemes = contract.security_schemes()?;
        let mut outcomes = Vec::with_capacity(schemes.len());

        for scheme in schemes {
            let Some(kind) = scheme.http_kind() else {
                debug!(scheme = %scheme.name, kind = %scheme.kind, "skipping unsupported security scheme");
                outcomes.push(SchemeOutcome::Unsupported {
                    scheme: scheme.name,
                    kind: scheme.kind,
                    sub_scheme: scheme.sub_scheme,
                });
                continue;
            };

            let credentials = match kind {
                HttpAuthKind::Bearer => {
                    let token = config.token();
                    if token.is_empty() {
                        warn!(scheme = %scheme.name, "no token configured, using an empty one");
                    }
                    Credentials::Bearer(token)
                }
                HttpAuthKind::Basic => {
                    let username = config.username();
                    let password = config.password();
                    if username.is_empty() || password.is_empty() {
                        warn!(scheme = %scheme.name, "incomplete basic credentials, missing values are empty");
                    }
                    Credentials::Basic { username, password }
                }
            };

            debug!(scheme = %scheme.name, %kind, "registering credentials");
            client.authenticate(&scheme.name, credentials);
            outcomes.push(SchemeOutcome::Registered {
                scheme: scheme.name,
                kind,
            });
        }

        Ok(outcomes)
    }
}

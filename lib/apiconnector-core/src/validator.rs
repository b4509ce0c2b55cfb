//! Configuration validation against the contract document.
//!
//! The configuration object is validated *against the contract*: the contract
//! document itself is compiled as a JSON Schema (Draft 4, the dialect OpenAPI
//! 3.0 schema objects derive from) and the configuration is the instance.
//! Keywords the schema dialect does not know (`paths`, `components`, ...) are
//! ignored, so only top-level `type`, `required`, `enum`, `properties`, ...
//! constrain the configuration.

use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::ContractDocument;
use crate::config::ConnectorConfig;

/// The configuration does not satisfy the contract.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum ValidationError {
    /// The contract cannot be compiled as a schema.
    #[display("Invalid contract schema: {message}")]
    InvalidSchema {
        /// The schema compilation failure.
        message: String,
    },

    /// The configuration violates the schema.
    #[display("{message}")]
    Violation {
        /// Description of the first violation.
        message: String,
    },
}

/// Validates a configuration object against a contract document.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractValidator;

impl ContractValidator {
    /// Checks `config` against `contract`, stopping at the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSchema`] if the contract cannot be
    /// used as a schema, and [`ValidationError::Violation`] describing the
    /// first violation otherwise.
    pub fn validate(
        &self,
        config: &ConnectorConfig,
        contract: &ContractDocument,
    ) -> Result<(), ValidationError> {
        validate_value(config.as_value(), contract.as_value())
    }
}

fn validate_value(instance: &Value, schema: &Value) -> Result<(), ValidationError> {
    let validator = jsonschema::options()
        .with_draft(Draft::Draft4)
        .build(schema)
        .map_err(|err| ValidationError::InvalidSchema {
            message: err.to_string(),
        })?;

    if let Some(error) = validator.iter_errors(instance).next() {
        debug!(%error, "configuration rejected by contract");
        return Err(ValidationError::Violation {
            message: error.to_string(),
        });
    }
    Ok(())
}

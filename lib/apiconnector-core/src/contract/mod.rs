//! OpenAPI contract model.
//!
//! A [`ContractDocument`] is the parsed contract the connector is driven by. It
//! keeps the document as a JSON value in declaration order (so "first declared
//! operation" is meaningful) and exposes the few views the connector needs:
//!
//! - the first declared operation, as an [`OperationDescriptor`]
//! - the declared security schemes, as [`AuthScheme`]s
//! - the first server URL
//!
//! Only local references (`#/...`) are resolved.

use http::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

mod error;
pub use self::error::ContractError;

mod operation;
pub use self::operation::{
    MediaTypeSpec, OperationDescriptor, PREDICT_OPERATION_ID, ParameterLocation, ParameterSpec,
    RequestBodySpec,
};

mod security;
pub use self::security::{AuthScheme, HttpAuthKind};

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

const MAX_REFERENCE_DEPTH: usize = 16;

/// A parsed OpenAPI v3 document, immutable once loaded.
///
/// # Example
///
/// ```rust
/// use apiconnector_core::ContractDocument;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let contract = ContractDocument::from_json_str(r#"{
///     "openapi": "3.0.3",
///     "servers": [{ "url": "http://localhost:8080" }],
///     "paths": { "/predict": { "get": {} } }
/// }"#)?;
///
/// let operation = contract.first_operation()?;
/// assert_eq!(operation.path(), "/predict");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ContractDocument {
    raw: Value,
}

// Load
impl ContractDocument {
    /// Wraps an already parsed document.
    ///
    /// # Errors
    ///
    /// Fails with [`ContractError::NotAnObject`] if the root is not an object.
    pub fn from_value(raw: Value) -> Result<Self, ContractError> {
        if !raw.is_object() {
            return Err(ContractError::NotAnObject);
        }
        Ok(Self { raw })
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Fails if the text is not JSON or the root is not an object.
    pub fn from_json_str(json: &str) -> Result<Self, ContractError> {
        let raw = serde_json::from_str(json)?;
        Self::from_value(raw)
    }

    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Fails if the text is not YAML or the root is not a mapping.
    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ContractError> {
        let raw = serde_saphyr::from_str::<Value>(yaml).map_err(|err| {
            ContractError::YamlError {
                message: err.to_string(),
            }
        })?;
        Self::from_value(raw)
    }

    /// Uses an in-process `utoipa` OpenAPI document as the contract.
    ///
    /// # Errors
    ///
    /// Fails if the document cannot be serialized.
    pub fn from_openapi(openapi: &utoipa::openapi::OpenApi) -> Result<Self, ContractError> {
        let raw = serde_json::to_value(openapi)?;
        Self::from_value(raw)
    }
}

// Views
impl ContractDocument {
    /// The raw document.
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// URL of the first entry of `servers`, if any.
    pub fn server_url(&self) -> Option<&str> {
        self.raw.pointer("/servers/0/url").and_then(Value::as_str)
    }

    /// Resolves the first method declared on the first path that has one.
    ///
    /// Path item keys that are not HTTP methods (`summary`, `parameters`, ...)
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Fails if `paths` is missing, if no path declares an operation, or if the
    /// operation cannot be parsed.
    pub fn first_operation(&self) -> Result<OperationDescriptor, ContractError> {
        let paths = self
            .raw
            .get("paths")
            .and_then(Value::as_object)
            .ok_or(ContractError::MissingSection { section: "paths" })?;

        for (path, item) in paths {
            let Some(item) = self.resolve(item)?.as_object() else {
                continue;
            };
            let found = item.iter().find(|(key, _)| {
                HTTP_METHODS
                    .iter()
                    .any(|method| method.eq_ignore_ascii_case(key))
            });
            let Some((method, operation)) = found else {
                continue;
            };

            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(
                |err| ContractError::InvalidSection {
                    section: format!("path '{path}'"),
                    path: method.clone(),
                    message: err.to_string(),
                },
            )?;
            debug!(%path, %method, "first declared operation");
            return OperationDescriptor::resolve(self, path, method, item, operation);
        }

        Err(ContractError::NoOperation)
    }

    /// Lists `components.securitySchemes`, in declaration order.
    ///
    /// A contract without the section has no schemes.
    ///
    /// # Errors
    ///
    /// Fails if an entry is not a security scheme object.
    pub fn security_schemes(&self) -> Result<Vec<AuthScheme>, ContractError> {
        let Some(schemes) = self
            .raw
            .pointer("/components/securitySchemes")
            .and_then(Value::as_object)
        else {
            return Ok(Vec::new());
        };

        schemes
            .iter()
            .map(|(name, scheme)| {
                let scheme = self.resolve(scheme)?;
                let raw = parse(scheme, &format!("securityScheme '{name}'"))?;
                Ok(AuthScheme::new(name, raw))
            })
            .collect()
    }

    /// Follows local `$ref`s until a non-reference value is reached.
    pub(crate) fn resolve<'a>(&'a self, value: &'a Value) -> Result<&'a Value, ContractError> {
        let mut current = value;
        for _ in 0..MAX_REFERENCE_DEPTH {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return Ok(current);
            };
            current = reference
                .strip_prefix('#')
                .and_then(|pointer| self.raw.pointer(pointer))
                .ok_or_else(|| ContractError::UnresolvedReference {
                    reference: reference.to_string(),
                })?;
        }

        let reference = value
            .get("$ref")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Err(ContractError::ReferenceTooDeep { reference })
    }
}

fn parse<T: DeserializeOwned>(value: &Value, section: &str) -> Result<T, ContractError> {
    serde_path_to_error::deserialize(value).map_err(|err| ContractError::InvalidSection {
        section: section.to_string(),
        path: err.path().to_string(),
        message: err.inner().to_string(),
    })
}

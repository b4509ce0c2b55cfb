use http::Method;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{ContractDocument, ContractError};

/// Identifier given to the operation the connector drives.
pub const PREDICT_OPERATION_ID: &str = "predict_api";

/// Where a parameter is carried in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Query string parameter.
    Query,
    /// Request header.
    Header,
    /// Templated path segment.
    Path,
    /// Cookie value.
    Cookie,
}

/// A parameter declared by the operation (or inherited from its path item).
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name as declared.
    pub name: String,
    /// Parameter location.
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    /// Whether the contract marks the parameter as required.
    #[serde(default)]
    pub required: bool,
    /// The parameter schema, with a top-level `$ref` already resolved.
    #[serde(default)]
    pub schema: Option<Value>,
}

impl ParameterSpec {
    /// Returns the values listed in the schema `enum`, empty when there is none.
    pub fn enumeration(&self) -> &[Value] {
        self.schema
            .as_ref()
            .and_then(|schema| schema.get("enum"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn key(&self) -> (&str, ParameterLocation) {
        (&self.name, self.location)
    }
}

/// One entry of a request body `content` map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaTypeSpec {
    /// Body schema, with a top-level `$ref` already resolved.
    #[serde(default)]
    pub schema: Option<Value>,
}

/// The request body declaration of an operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestBodySpec {
    /// Whether the body is required.
    #[serde(default)]
    pub required: bool,
    /// Declared media types, in declaration order.
    #[serde(default)]
    pub content: IndexMap<String, MediaTypeSpec>,
}

/// The single operation a connector drives, resolved once at setup.
///
/// All local `$ref`s the connector needs (path item, parameters, parameter
/// schemas, request body, media type schemas) are resolved when the descriptor
/// is built, so nothing has to be looked up again while predicting.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    id: &'static str,
    declared_id: Option<String>,
    path: String,
    method: Method,
    parameters: Vec<ParameterSpec>,
    request_body: Option<RequestBodySpec>,
    security: Vec<String>,
}

impl OperationDescriptor {
    pub(super) fn resolve(
        contract: &ContractDocument,
        path: &str,
        method: Method,
        path_item: &Map<String, Value>,
        operation: &Value,
    ) -> Result<Self, ContractError> {
        let operation = contract.resolve(operation)?;

        let mut parameters = Self::resolve_parameters(contract, path_item.get("parameters"))?;
        for parameter in Self::resolve_parameters(contract, operation.get("parameters"))? {
            match parameters
                .iter_mut()
                .find(|existing| existing.key() == parameter.key())
            {
                Some(existing) => *existing = parameter,
                None => parameters.push(parameter),
            }
        }

        let request_body = operation
            .get("requestBody")
            .map(|body| Self::resolve_request_body(contract, body))
            .transpose()?;

        let security = operation
            .get("security")
            .or_else(|| contract.as_value().get("security"))
            .map(security_names)
            .unwrap_or_default();

        let declared_id = operation
            .get("operationId")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        Ok(Self {
            id: PREDICT_OPERATION_ID,
            declared_id,
            path: path.to_string(),
            method,
            parameters,
            request_body,
            security,
        })
    }

    fn resolve_parameters(
        contract: &ContractDocument,
        parameters: Option<&Value>,
    ) -> Result<Vec<ParameterSpec>, ContractError> {
        let Some(parameters) = parameters else {
            return Ok(Vec::new());
        };
        let Some(parameters) = parameters.as_array() else {
            return Err(ContractError::InvalidSection {
                section: "parameters".to_string(),
                path: ".".to_string(),
                message: "expected an array".to_string(),
            });
        };

        parameters
            .iter()
            .map(|parameter| {
                let parameter = contract.resolve(parameter)?;
                let mut parameter: ParameterSpec = super::parse(parameter, "parameter")?;
                if let Some(schema) = parameter.schema.take() {
                    parameter.schema = Some(contract.resolve(&schema)?.clone());
                }
                Ok(parameter)
            })
            .collect()
    }

    fn resolve_request_body(
        contract: &ContractDocument,
        body: &Value,
    ) -> Result<RequestBodySpec, ContractError> {
        let body = contract.resolve(body)?;
        let mut body: RequestBodySpec = super::parse(body, "requestBody")?;
        for media in body.content.values_mut() {
            if let Some(schema) = media.schema.take() {
                media.schema = Some(contract.resolve(&schema)?.clone());
            }
        }
        Ok(body)
    }

    /// The canonical identifier, always [`PREDICT_OPERATION_ID`].
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// The `operationId` written in the contract, if any.
    pub fn declared_id(&self) -> Option<&str> {
        self.declared_id.as_deref()
    }

    /// The path template the operation is declared under.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The HTTP method of the operation.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path-level and operation-level parameters, operation entries winning.
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// The request body declaration, if any.
    pub fn request_body(&self) -> Option<&RequestBodySpec> {
        self.request_body.as_ref()
    }

    /// Media types declared for the request body, in declaration order.
    pub fn content_types(&self) -> impl Iterator<Item = &str> {
        self.request_body
            .iter()
            .flat_map(|body| body.content.keys())
            .map(String::as_str)
    }

    /// Header parameters the contract marks as required.
    pub fn required_headers(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters
            .iter()
            .filter(|param| param.location == ParameterLocation::Header && param.required)
    }

    /// Names of the security schemes this operation requires.
    pub fn security(&self) -> &[String] {
        &self.security
    }
}

// `[{ "a": [] }, { "b": [], "c": [] }]` -> `["a", "b", "c"]`
fn security_names(security: &Value) -> Vec<String> {
    let mut names = Vec::new();
    for requirement in security.as_array().into_iter().flatten() {
        for name in requirement.as_object().into_iter().flat_map(Map::keys) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

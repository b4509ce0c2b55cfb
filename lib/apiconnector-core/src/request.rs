//! Request materialization.
//!
//! [`RequestBuilder`] turns the connector's [`OperationDescriptor`] and the
//! example [`Payload`] into a [`PreparedRequest`]:
//!
//! - `POST`: the payload is the body, encoded with the first supported media
//!   type the operation declares (JSON, then multipart, then urlencoded form)
//! - `GET`: the payload is the query string
//!
//! On `POST`, required header parameters with an enumeration get its first value.

use bytes::Bytes;
use headers::ContentType;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::contract::OperationDescriptor;

const MULTIPART_BOUNDARY: &str = "----apiconnector-formdata-boundary";

/// Body media types the builder can encode, in order of preference.
pub const SUPPORTED_CONTENT_TYPES: [&str; 3] = [
    "application/json",
    "multipart/form-data",
    "application/x-www-form-urlencoded",
];

/// The request cannot be built from the operation.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum BuildError {
    /// No declared body media type is supported.
    #[display("Unsupported request body content types: [{}]", declared.join(", "))]
    UnsupportedContentType {
        /// Declared media types, empty when there is no request body.
        declared: Vec<String>,
    },

    /// Only `GET` and `POST` operations can be called.
    #[display("Unexpected api method: {method}")]
    UnsupportedMethod {
        /// The operation method.
        method: Method,
    },

    /// A required header value cannot be carried in a header.
    #[display("Invalid header '{name}': {message}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Why it is invalid.
        message: String,
    },

    /// The body could not be encoded.
    #[display("Failed to encode request body: {message}")]
    Encoding {
        /// The encoder error.
        message: String,
    },
}

/// The data sent to the model, an ordered map of feature values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(IndexMap<String, Value>);

impl Payload {
    /// The fixed example record every prediction request carries.
    pub fn example() -> Self {
        let fields = [
            ("age", 1),
            ("gender", 2),
            ("race", 3),
            ("income", 4),
            ("employment", 5),
            ("employment_length", 6),
            ("total_donated", 7),
            ("num_donation", 8),
        ];
        Self(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), json!(value)))
                .collect(),
        )
    }

    /// Field values, in order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Fits the payload to a body schema.
    ///
    /// With `properties`, only declared fields are kept (in declaration order)
    /// and missing declared fields with a `default` are filled in. Without
    /// `properties` the payload is used as is.
    fn materialize(&self, schema: Option<&Value>) -> Map<String, Value> {
        let Some(properties) = schema
            .and_then(|schema| schema.get("properties"))
            .and_then(Value::as_object)
        else {
            return self.0.clone().into_iter().collect();
        };

        properties
            .iter()
            .filter_map(|(name, property)| {
                let value = self
                    .0
                    .get(name)
                    .or_else(|| property.get("default"))?
                    .clone();
                Some((name.clone(), value))
            })
            .collect()
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::example()
    }
}

/// An encoded request body.
#[derive(Clone, derive_more::Debug)]
pub struct RequestBody {
    content_type: ContentType,
    #[debug(ignore)]
    data: Bytes,
}

impl RequestBody {
    fn json(fields: &Map<String, Value>) -> Result<Self, BuildError> {
        let data = serde_json::to_vec(fields).map_err(|err| BuildError::Encoding {
            message: err.to_string(),
        })?;
        Ok(Self {
            content_type: ContentType::json(),
            data: data.into(),
        })
    }

    fn form(fields: &Map<String, Value>) -> Result<Self, BuildError> {
        let pairs = text_fields(fields);
        let data = serde_urlencoded::to_string(&pairs).map_err(|err| BuildError::Encoding {
            message: format!("Failed to serialize form data: {err}"),
        })?;
        Ok(Self {
            content_type: ContentType::form_url_encoded(),
            data: data.into(),
        })
    }

    fn multipart(fields: &Map<String, Value>) -> Result<Self, BuildError> {
        let mut data = Vec::new();
        for (name, value) in text_fields(fields) {
            data.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
            data.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    escape_field_name(&name)
                )
                .as_bytes(),
            );
            data.extend_from_slice(value.as_bytes());
            data.extend_from_slice(b"\r\n");
        }
        data.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

        let mime = format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}")
            .parse::<mime::Mime>()
            .map_err(|err| BuildError::Encoding {
                message: err.to_string(),
            })?;
        Ok(Self {
            content_type: ContentType::from(mime),
            data: data.into(),
        })
    }

    /// The `Content-Type` of the body.
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// The encoded body.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// A request built from the operation, not yet bound to a server.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method.
    pub method: Method,
    /// Path template of the operation.
    pub path: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Headers derived from the operation parameters.
    pub headers: HeaderMap,
    /// Encoded body, for `POST`.
    pub body: Option<RequestBody>,
}

/// Builds requests for an operation from a payload.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    payload: Payload,
}

impl RequestBuilder {
    /// A builder sending `payload`.
    pub fn new(payload: Payload) -> Self {
        Self { payload }
    }

    /// Builds the request for `operation`.
    ///
    /// # Errors
    ///
    /// - [`BuildError::UnsupportedMethod`] for anything but `GET` and `POST`
    /// - [`BuildError::UnsupportedContentType`] for a `POST` without a supported body media type
    /// - [`BuildError::InvalidHeader`] when a header enumeration value of a `POST` is not a valid header
    pub fn build(&self, operation: &OperationDescriptor) -> Result<PreparedRequest, BuildError> {
        let method = operation.method().clone();

        let (headers, query, body) = match method {
            Method::POST => {
                let headers = required_headers(operation)?;
                let (content_type, schema) = select_content_type(operation)?;
                let fields = self.payload.materialize(schema);
                debug!(%content_type, fields = fields.len(), "encoding request body");
                let body = match content_type {
                    "application/json" => RequestBody::json(&fields)?,
                    "multipart/form-data" => RequestBody::multipart(&fields)?,
                    _ => RequestBody::form(&fields)?,
                };
                (headers, Vec::new(), Some(body))
            }
            Method::GET => (HeaderMap::new(), text_fields(self.payload.fields()), None),
            _ => return Err(BuildError::UnsupportedMethod { method }),
        };

        Ok(PreparedRequest {
            method,
            path: operation.path().to_string(),
            query,
            headers,
            body,
        })
    }
}

fn select_content_type(
    operation: &OperationDescriptor,
) -> Result<(&'static str, Option<&Value>), BuildError> {
    let declared: Vec<(mime::Mime, Option<&Value>)> = operation
        .request_body()
        .into_iter()
        .flat_map(|body| body.content.iter())
        .filter_map(|(media_type, spec)| {
            let mime = media_type.parse::<mime::Mime>().ok()?;
            Some((mime, spec.schema.as_ref()))
        })
        .collect();

    SUPPORTED_CONTENT_TYPES
        .into_iter()
        .find_map(|supported| {
            declared
                .iter()
                .find(|(mime, _)| mime.essence_str().eq_ignore_ascii_case(supported))
                .map(|(_, schema)| (supported, *schema))
        })
        .ok_or_else(|| BuildError::UnsupportedContentType {
            declared: operation.content_types().map(ToString::to_string).collect(),
        })
}

fn required_headers(operation: &OperationDescriptor) -> Result<HeaderMap, BuildError> {
    let mut headers = HeaderMap::new();
    for parameter in operation.required_headers() {
        let Some(first) = parameter.enumeration().first() else {
            continue;
        };
        let invalid = |message: String| BuildError::InvalidHeader {
            name: parameter.name.clone(),
            message,
        };
        let name = HeaderName::from_bytes(parameter.name.as_bytes())
            .map_err(|err| invalid(err.to_string()))?;
        let value =
            HeaderValue::from_str(&text_value(first)).map_err(|err| invalid(err.to_string()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn text_fields<'a, K: AsRef<str>>(
    fields: impl IntoIterator<Item = (K, &'a Value)>,
) -> Vec<(String, String)> {
    fields
        .into_iter()
        .map(|(name, value)| (name.as_ref().to_string(), text_value(value)))
        .collect()
}

// Percent-encodes the characters that would end the quoted name or the header line.
fn escape_field_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '"' => escaped.push_str("%22"),
            '\r' => escaped.push_str("%0D"),
            '\n' => escaped.push_str("%0A"),
            other => escaped.push(other),
        }
    }
    escaped
}

// Strings verbatim, anything else as JSON text.
fn text_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

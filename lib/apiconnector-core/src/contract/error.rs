/// Errors raised while loading or inspecting a contract document.
///
/// These describe a contract that cannot be used to drive a prediction call,
/// either because it cannot be parsed or because a section the connector needs
/// is missing or malformed.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum ContractError {
    /// The document is not valid JSON.
    JsonError(serde_json::Error),

    /// The document is not valid YAML.
    #[display("Invalid YAML contract: {message}")]
    #[from(skip)]
    YamlError {
        /// Description of the YAML parsing failure.
        message: String,
    },

    /// The document root is not an object.
    #[display("Contract document must be an object")]
    #[from(skip)]
    NotAnObject,

    /// A section the connector relies on is absent.
    #[display("Contract is missing the '{section}' section")]
    #[from(skip)]
    MissingSection {
        /// Name of the missing section.
        section: &'static str,
    },

    /// A section exists but does not have the expected shape.
    #[display("Invalid {section} at '{path}': {message}")]
    #[from(skip)]
    InvalidSection {
        /// Section being parsed, e.g. `parameter` or `securityScheme 'bearerAuth'`.
        section: String,
        /// Location inside the section where parsing failed.
        path: String,
        /// The underlying deserialization message.
        message: String,
    },

    /// A local `$ref` does not point to anything in the document.
    #[display("Cannot resolve reference '{reference}'")]
    #[from(skip)]
    UnresolvedReference {
        /// The reference as written in the document.
        reference: String,
    },

    /// A `$ref` chain does not terminate.
    #[display("Reference chain starting at '{reference}' is too deep")]
    #[from(skip)]
    ReferenceTooDeep {
        /// The first reference of the chain.
        reference: String,
    },

    /// No path of the document declares an HTTP operation.
    #[display("Contract does not declare any operation")]
    #[from(skip)]
    NoOperation,
}

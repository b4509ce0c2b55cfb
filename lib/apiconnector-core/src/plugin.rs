//! Plugin registration metadata.

/// Name, description and version a plugin registers under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display("{name} v{version}")]
pub struct PluginMetadata {
    /// Stable plugin identifier.
    pub name: &'static str,
    /// Human readable description.
    pub description: &'static str,
    /// Plugin version.
    pub version: &'static str,
}

/// Broad family a plugin belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum PluginType {
    /// Predicts from data.
    #[display("MODEL")]
    Model,
    /// Reads data files.
    #[display("SERIALIZER")]
    Serializer,
}

/// Kind of model plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ModelPluginType {
    /// A remote model reached over an API.
    #[display("API")]
    Api,
}

/// Kind of serializer plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum SerializerPluginType {
    /// Delimiter separated text.
    #[display("DELIMITER")]
    Delimiter,
}

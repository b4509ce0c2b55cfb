//! # API Connector Delimited
//!
//! Reads delimiter separated data files (CSV, TSV, ...), detecting the
//! delimiter from the first [`SAMPLE_SIZE`] bytes.
//!
//! ```rust,no_run
//! use apiconnector_delimited::{DelimitedSerializer, Delimiter};
//!
//! # fn example() -> Result<(), apiconnector_delimited::DelimitedError> {
//! let data = DelimitedSerializer.deserialize("data/donors.csv")?;
//!
//! assert_eq!(data.delimiter, Delimiter::Comma);
//! for row in &data.rows {
//!     println!("{row:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use apiconnector_core::{PluginMetadata, PluginType, SerializerPluginType};
use tracing::debug;

mod sniffer;
pub use self::sniffer::{SAMPLE_SIZE, sample, sniff};

/// Registration metadata of the serializer.
pub const DELIMITER_SERIALIZER_METADATA: PluginMetadata = PluginMetadata {
    name: "delimiterserializer",
    description: "delimiterserializer supports reading data with separated values",
    version: "0.9.0",
};

/// The delimiters that can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Delimiter {
    /// `,`
    #[display("COMMA")]
    Comma,
    /// `\t`
    #[display("TAB")]
    Tab,
    /// `;`
    #[display("SEMICOLON")]
    Semicolon,
    /// `|`
    #[display("PIPE")]
    Pipe,
    /// ` `
    #[display("SPACE")]
    Space,
    /// `:`
    #[display("COLON")]
    Colon,
}

impl Delimiter {
    /// Every supported delimiter, in detection preference order.
    pub const ALL: [Self; 6] = [
        Self::Comma,
        Self::Tab,
        Self::Semicolon,
        Self::Pipe,
        Self::Space,
        Self::Colon,
    ];

    /// The separator character.
    pub fn as_char(self) -> char {
        match self {
            Self::Comma => ',',
            Self::Tab => '\t',
            Self::Semicolon => ';',
            Self::Pipe => '|',
            Self::Space => ' ',
            Self::Colon => ':',
        }
    }

    /// The delimiter using `separator`, if supported.
    pub fn from_char(separator: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|delimiter| delimiter.as_char() == separator)
    }

    fn as_byte(self) -> u8 {
        match self {
            Self::Comma => b',',
            Self::Tab => b'\t',
            Self::Semicolon => b';',
            Self::Pipe => b'|',
            Self::Space => b' ',
            Self::Colon => b':',
        }
    }
}

/// Reading a delimited file failed.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum DelimitedError {
    /// The file cannot be read.
    #[display("Cannot read data file: {_0}")]
    Io(std::io::Error),

    /// The content is not valid delimited text.
    #[display("Cannot parse data file: {_0}")]
    Csv(csv::Error),

    /// The detected delimiter is not one of [`Delimiter::ALL`].
    #[from(skip)]
    #[display("The delimiter is not supported: {delimiter:?}")]
    UnsupportedDelimiter {
        /// The detected separator.
        delimiter: char,
    },

    /// No character separates the values consistently.
    #[from(skip)]
    #[display("Could not determine delimiter")]
    UndetectedDelimiter,
}

/// The rows of a delimited file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedData {
    /// Every record, header line included.
    pub rows: Vec<Vec<String>>,
    /// The detected delimiter.
    pub delimiter: Delimiter,
    /// Where the data was read from.
    pub path: PathBuf,
}

/// Reads delimited data files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedSerializer;

impl DelimitedSerializer {
    /// Reads the file at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, its delimiter cannot be detected or
    /// is not supported, or a record cannot be parsed.
    pub fn deserialize(&self, path: impl AsRef<Path>) -> Result<DelimitedData, DelimitedError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let (delimiter, rows) = self.parse(&text)?;
        debug!(path = %path.display(), %delimiter, rows = rows.len(), "data file read");

        Ok(DelimitedData {
            rows,
            delimiter,
            path: path.to_path_buf(),
        })
    }

    /// Detects the delimiter of `text` and splits it into records.
    ///
    /// # Errors
    ///
    /// See [`deserialize`](Self::deserialize).
    pub fn parse(&self, text: &str) -> Result<(Delimiter, Vec<Vec<String>>), DelimitedError> {
        let delimiter = sniff(sample(text))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter.as_byte())
            .from_reader(text.as_bytes());

        let rows = reader
            .records()
            .map(|record| {
                let record = record?;
                Ok(record.iter().map(ToString::to_string).collect())
            })
            .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;

        Ok((delimiter, rows))
    }

    /// Registration metadata.
    pub fn metadata(&self) -> PluginMetadata {
        DELIMITER_SERIALIZER_METADATA
    }

    /// Always [`PluginType::Serializer`].
    pub fn plugin_type(&self) -> PluginType {
        PluginType::Serializer
    }

    /// Always [`SerializerPluginType::Delimiter`].
    pub fn serializer_plugin_type(&self) -> SerializerPluginType {
        SerializerPluginType::Delimiter
    }
}

//! xbrl-filing - XBRL filing loader
//!
//! Resolves an instance document together with its schemas and linkbases
//! (loose file, folder or zip archive) into a read-only [`Filing`].
//!
//! Licensed under AGPL-3.0

pub mod cache;
pub mod characteristic;
pub mod filing;
pub mod linkbase;
pub mod model;
pub mod namespace;
pub mod parser;
pub mod path;
pub mod qname;
pub mod repository;
pub mod resource;
pub mod schema;
pub mod xml;

pub use cache::{DirectoryCache, MemoryCache, TaxonomyCache};
pub use filing::Filing;
pub use model::{
    Accuracy, Aspect, Characteristic, Component, Context, ContextId, Entity, Fact, FactFlags,
    LinkKind, Network, NetworkId, NetworkNode, Period, Relationship, Resource, Unit, UnitId,
    XbrlDate,
};
pub use parser::{Parser, ParserConfig};
pub use qname::QName;
pub use repository::{ParseError, ParseErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported path: {0}")]
    UnsupportedPath(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("XML error in {uri}: {message}")]
    Xml { uri: String, message: String },

    #[error("Characteristic error: {0}")]
    Characteristic(String),

    #[error("Network resolution error: {0}")]
    NetworkResolution(String),

    #[error("Reference resolution error: {0}")]
    ReferenceResolution(String),

    #[error("No instance document found in {0}")]
    MissingInstance(String),

    #[error("Root schema could not be loaded: {0}")]
    MissingSchema(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid URI: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    pub(crate) fn xml(uri: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Xml {
            uri: uri.into(),
            message: message.to_string(),
        }
    }
}

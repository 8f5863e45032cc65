//! Document parsing and classification.
//!
//! Turns an uploaded interchange document into classified parsed data and
//! a preview. Unsupported content is counted, never rejected; only an
//! oversized or unreadable document is an error.

pub mod archimate;
pub mod classify;

use thiserror::Error;

pub use classify::{classify, relationship_role, ElementCategory, ParseResult, RelationshipRole};

/// Errors for documents that cannot be read at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Document too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("Document is not valid UTF-8")]
    InvalidEncoding,

    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Expected a <model> root element, found <{0}>")]
    MissingModel(String),
}

/// Parse and classify a size-bounded document
pub fn parse_document(bytes: &[u8], max_bytes: usize) -> Result<ParseResult, ParseError> {
    if bytes.len() > max_bytes {
        return Err(ParseError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidEncoding)?;
    let text = text.trim_start_matches('\u{feff}');

    let model = archimate::read_model(text)?;
    let result = classify(&model);

    tracing::debug!(
        capabilities = result.parsed_data.capabilities.len(),
        components = result.parsed_data.components.len(),
        value_streams = result.parsed_data.value_streams.len(),
        relationships = result.parsed_data.relationships.len(),
        "Document classified"
    );

    Ok(result)
}

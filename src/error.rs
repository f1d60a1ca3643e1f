use std::fmt;

/// Failures of the signing pipeline.
#[derive(Debug)]
pub enum SignError {
    /// The source bytes are not a PDF we can parse.
    MalformedDocument(String),
    /// The document parsed but has no pages.
    EmptyDocument,
    /// The signature raster is not a well-formed PNG.
    InvalidImage(String),
    /// No document was loaded, or nothing has been drawn.
    MissingInput(&'static str),
    /// A previous signing request has not finished yet.
    Busy,
    /// Writing the output document failed.
    Serialize(String),
}

impl SignError {
    /// Short machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SignError::MalformedDocument(_) => "malformed_document",
            SignError::EmptyDocument => "empty_document",
            SignError::InvalidImage(_) => "invalid_image",
            SignError::MissingInput(_) => "missing_input",
            SignError::Busy => "busy",
            SignError::Serialize(_) => "serialize_failed",
        }
    }
}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignError::MalformedDocument(e) => write!(f, "not a valid PDF document: {e}"),
            SignError::EmptyDocument => write!(f, "the document has no pages"),
            SignError::InvalidImage(e) => write!(f, "invalid signature image: {e}"),
            SignError::MissingInput(what) => write!(f, "missing input: {what}"),
            SignError::Busy => write!(f, "a signing operation is already running"),
            SignError::Serialize(e) => write!(f, "failed to write the signed document: {e}"),
        }
    }
}

impl std::error::Error for SignError {}

impl From<lopdf::Error> for SignError {
    fn from(e: lopdf::Error) -> Self {
        SignError::MalformedDocument(e.to_string())
    }
}

impl From<image::ImageError> for SignError {
    fn from(e: image::ImageError) -> Self {
        SignError::InvalidImage(e.to_string())
    }
}

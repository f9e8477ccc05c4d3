use reqwest::{StatusCode, header::InvalidHeaderValue};

use crate::zotero_api::response::ErrorResponse;

/// Caller mistakes, detected before anything is sent.
#[derive(thiserror::Error, Debug)]
pub enum UsageError {
    #[error("Called delete() without first specifying what to delete")]
    NoDeleteTarget,

    #[error("Resource requires a library")]
    MissingLibrary,

    #[error("Invalid library key '{0}', expected 'u<id>' or 'g<id>'")]
    InvalidLibraryKey(String),

    #[error("Unrecognized library type '{0}'")]
    UnknownLibraryType(String),

    #[error("Unknown resource kind '{0}'")]
    UnknownResourceKind(String),

    #[error("Unknown query parameter '{0}'")]
    UnknownQueryParam(String),

    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("Invalid value for header '{name}'")]
    InvalidHeaderValue {
        name: &'static str,
        #[source]
        source: InvalidHeaderValue,
    },

    #[error("Request body could not be serialized")]
    InvalidBody(#[from] serde_json::Error),
}

/// The request never produced an HTTP response.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Transport failed: {0}")]
    Other(String),
}

/// A 2xx/304 response whose body does not have the expected form.
#[derive(thiserror::Error, Debug)]
pub enum ResponseError {
    #[error("Response body was already read")]
    BodyUsed,

    #[error("Invalid JSON in response with status '{status}'")]
    InvalidJson {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected a JSON {expected} in the response body")]
    UnexpectedShape { expected: &'static str },

    #[error("Invalid write report")]
    InvalidWriteReport(#[source] serde_json::Error),

    #[error("Write report index '{0}' is not a number")]
    InvalidIndex(String),

    #[error("Write report index {index} is outside the submitted batch of {len}")]
    IndexOutOfBatch { index: usize, len: usize },

    #[error("Write report lists index {0} in more than one group")]
    OverlappingIndex(usize),
}

/// Everything that can go wrong with a single `request()` call.
#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    Usage(#[from] UsageError),

    #[error("Error in transport: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Api(#[from] ErrorResponse),

    #[error("Invalid response from Zotero API: {0}")]
    Response(#[from] ResponseError),
}

//! Request dispatch and response classification for the Zotero Web API.
//!
//! A [`ZoteroClient`] turns a [`ResourceDescriptor`] plus [`RequestOptions`]
//! into an HTTP request, sends it through a [`Transport`] and classifies the
//! reply into an [`Outcome`]. Batch writes come back as a
//! [`MultiWriteResponse`] that lines the server's report up with the
//! submitted entities.

pub mod zotero_api;

pub use zotero_api::{
    API_BASE_URL,
    api_key::ApiKey,
    builder::ZoteroClientBuilder,
    client::{ReqwestZoteroClient, ZoteroClient},
    multi_write::{EntityLookupError, EntryStatus, MultiWriteResponse, WriteFailure},
    request::{Method, QueryParam, QueryParams, RequestBody, RequestHeaders, RequestOptions},
    resource::{LibraryKey, ResourceDescriptor, ResourceKind},
    response::{ErrorResponse, Outcome},
    transport::{ReqwestTransport, Transport, TransportResponse},
    types::{RequestError, ResponseError, TransportError, UsageError},
};

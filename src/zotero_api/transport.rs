use reqwest::{
    StatusCode,
    header::{self, HeaderMap},
};
use serde::de::DeserializeOwned;

use crate::zotero_api::{
    headers,
    request::RequestConfig,
    types::{ResponseError, TransportError},
};

/// Executes a built request. Any HTTP client can sit behind this.
///
/// Implementations may write `async fn execute`, as long as the future is `Send`.
pub trait Transport {
    fn execute(
        &self,
        request: &RequestConfig,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// Status, headers and body of an HTTP reply.
///
/// The body can be taken out at most once; [`TransportResponse::body_used`]
/// tells whether that already happened.
#[derive(Debug)]
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    body_used: bool,
}

impl TransportResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            body_used: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn body_used(&self) -> bool {
        self.body_used
    }

    pub fn is_json(&self) -> bool {
        self.header(header::CONTENT_TYPE.as_str())
            .is_none_or(|content_type| content_type.contains("json"))
    }

    pub fn take_body(&mut self) -> Result<Vec<u8>, ResponseError> {
        if self.body_used {
            return Err(ResponseError::BodyUsed);
        }
        self.body_used = true;
        Ok(std::mem::take(&mut self.body))
    }

    pub fn text(&mut self) -> Result<String, ResponseError> {
        let body = self.take_body()?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T, ResponseError> {
        let status = self.status;
        let body = self.take_body()?;
        serde_json::from_slice(&body).map_err(|source| ResponseError::InvalidJson { status, source })
    }

    /// Reads the body as text without marking it used.
    pub(crate) fn peek_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn last_modified_version(&self) -> Option<u64> {
        parse_version(&self.headers)
    }
}

pub(crate) fn parse_version(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(headers::LAST_MODIFIED_VERSION)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// [`Transport`] backed by a [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    async fn execute(&self, request: &RequestConfig) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method().into(), request.url())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }
        let request = builder.build()?;

        log::trace!("Sending request: {:?}", request);
        let response = self.client.execute(request).await?;
        log::trace!("Received response: {:?}", response);

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(TransportResponse::new(status, headers, body.to_vec()))
    }
}

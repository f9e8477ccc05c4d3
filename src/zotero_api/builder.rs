use crate::zotero_api::{
    API_BASE_URL,
    api_key::ApiKey,
    client::{ReqwestZoteroClient, ZoteroClient},
    transport::{ReqwestTransport, Transport},
};

/// Configures a [`ZoteroClient`].
pub struct ZoteroClientBuilder {
    base_url: String,
    api_key: Option<ApiKey>,
    http_client: Option<reqwest::Client>,
}

impl Default for ZoteroClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoteroClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: API_BASE_URL.into(),
            api_key: None,
            http_client: None,
        }
    }

    /// Overrides the API origin, e.g. to point at a mock server.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Key sent as `Authorization: Bearer <key>` with every request.
    pub fn api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Builds a client sending its requests with reqwest.
    pub fn build(self) -> Result<ReqwestZoteroClient, ClientBuildError> {
        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().build()?,
        };
        log::debug!("Base URL: {}", self.base_url);
        Ok(ZoteroClient::new(
            self.base_url,
            self.api_key,
            ReqwestTransport::new(http_client),
        ))
    }

    /// Builds a client on top of a custom transport.
    pub fn build_with_transport<T: Transport>(self, transport: T) -> ZoteroClient<T> {
        ZoteroClient::new(self.base_url, self.api_key, transport)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ClientBuildError {
    #[error("Error creating HTTP client")]
    HttpClient(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_to_public_api() {
        let client = ZoteroClientBuilder::new().build().unwrap();
        assert_eq!(client.base_url(), "https://api.zotero.org");
        assert!(client.api_key().is_none());
    }

    #[test]
    fn overrides() {
        let client = ZoteroClientBuilder::new()
            .base_url("http://localhost:8080")
            .api_key(ApiKey::from("LOREM"))
            .http_client(reqwest::Client::new())
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.api_key(), Some(&ApiKey::from("LOREM")));
    }
}

use crate::zotero_api::{
    api::ApiCall,
    api_key::ApiKey,
    request::{self, RequestConfig, RequestOptions},
    resource::ResourceDescriptor,
    response::{self, Outcome},
    transport::{ReqwestTransport, Transport},
    types::{RequestError, UsageError},
};

/// Sends requests to the Zotero API through a [`Transport`] and classifies
/// the responses.
///
/// The client holds no state besides its configuration, so calls are
/// independent of each other and may run concurrently.
pub struct ZoteroClient<T: Transport> {
    base_url: String,
    api_key: Option<ApiKey>,
    transport: T,
}

pub type ReqwestZoteroClient = ZoteroClient<ReqwestTransport>;

impl<T: Transport> ZoteroClient<T> {
    pub fn new(base_url: impl Into<String>, api_key: Option<ApiKey>, transport: T) -> Self {
        let base_url = base_url.into();
        log::trace!(
            "Creating client with base URL: '{}' and API key: {:?}",
            base_url,
            api_key
        );
        Self {
            base_url,
            api_key,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Starts a fluent request, e.g. `client.api().library(lib).items(None).get()`.
    pub fn api(&self) -> ApiCall<'_, T> {
        ApiCall::new(self)
    }

    /// Builds the request without sending it.
    ///
    /// The client's API key is used unless the options carry an authorization.
    pub fn prepare(
        &self,
        resource: &ResourceDescriptor,
        mut options: RequestOptions,
    ) -> Result<RequestConfig, UsageError> {
        if options.headers.authorization.is_none() {
            options.headers.authorization = self.api_key.as_ref().map(ApiKey::authorization);
        }
        request::build(&self.base_url, resource, &options)
    }

    pub async fn request(
        &self,
        resource: &ResourceDescriptor,
        options: RequestOptions,
    ) -> Result<Outcome, RequestError> {
        let config = self.prepare(resource, options)?;
        self.execute(config).await
    }

    /// Sends a built request and classifies the response.
    pub async fn execute(&self, config: RequestConfig) -> Result<Outcome, RequestError> {
        log::debug!("Sending {} request to '{}'", config.method(), config.url());
        let response = self.transport.execute(&config).await?;
        log::debug!(
            "Received '{}' for {} '{}'",
            response.status(),
            config.method(),
            config.url()
        );
        response::classify(response, config.into_context()).inspect_err(|e| match e {
            RequestError::Api(error) => log::info!("Zotero API error '{}': {}", error, error.reason()),
            other => log::error!("Request failed: {}", other),
        })
    }
}

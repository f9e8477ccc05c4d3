use crate::zotero_api::{
    api_key::ApiKey,
    client::ZoteroClient,
    request::{Method, QueryParam, QueryParams, RequestBody, RequestHeaders, RequestOptions},
    resource::{LibraryKey, ResourceDescriptor, ResourceKind},
    response::Outcome,
    transport::Transport,
    types::{RequestError, UsageError},
};

/// Chainable description of a request, sent by one of the terminal methods
/// [`get`](Self::get), [`post`](Self::post), [`put`](Self::put),
/// [`patch`](Self::patch) or [`delete`](Self::delete).
///
/// ```no_run
/// # use zotero_request::zotero_api::{builder::ZoteroClientBuilder, resource::LibraryKey};
/// # async fn example() -> anyhow::Result<()> {
/// let client = ZoteroClientBuilder::new().build()?;
/// let top_items = client
///     .api()
///     .library(&LibraryKey::User("475425".into()))
///     .items(None)
///     .top()
///     .limit(25)
///     .get()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ApiCall<'a, T: Transport> {
    client: &'a ZoteroClient<T>,
    resource: ResourceDescriptor,
    query: QueryParams,
    headers: RequestHeaders,
    version: Option<u64>,
}

impl<'a, T: Transport> ApiCall<'a, T> {
    pub(crate) fn new(client: &'a ZoteroClient<T>) -> Self {
        Self {
            client,
            resource: ResourceDescriptor::new(),
            query: QueryParams::new(),
            headers: RequestHeaders::default(),
            version: None,
        }
    }

    /// Authenticates this call with a key other than the client's.
    pub fn api_key(mut self, api_key: &ApiKey) -> Self {
        self.headers.authorization = Some(api_key.authorization());
        self
    }

    pub fn library(mut self, library: &LibraryKey) -> Self {
        self.resource = self.resource.with_library(library);
        self
    }

    /// Selects a library by type name (`user` or `group`) and id.
    pub fn library_of(self, library_type: &str, id: &str) -> Result<Self, UsageError> {
        let library = LibraryKey::new(library_type, id)?;
        Ok(self.library(&library))
    }

    fn segment(mut self, kind: ResourceKind, key: Option<&str>) -> Self {
        self.resource = self.resource.with(kind, key);
        self
    }

    pub fn items(self, key: Option<&str>) -> Self {
        self.segment(ResourceKind::Items, key)
    }

    pub fn collections(self, key: Option<&str>) -> Self {
        self.segment(ResourceKind::Collections, key)
    }

    /// `key` is a URL-encoded tag name.
    ///
    /// A named tag reads as [`Outcome::SingleRead`] even though the server
    /// answers with a list (one entry per tag type), kept as-is in `raw()`.
    pub fn tags(self, key: Option<&str>) -> Self {
        self.segment(ResourceKind::Tags, key)
    }

    pub fn searches(self, key: Option<&str>) -> Self {
        self.segment(ResourceKind::Searches, key)
    }

    pub fn top(self) -> Self {
        self.segment(ResourceKind::Top, None)
    }

    pub fn trash(self) -> Self {
        self.segment(ResourceKind::Trash, None)
    }

    pub fn children(self) -> Self {
        self.segment(ResourceKind::Children, None)
    }

    pub fn item_types(self) -> Self {
        self.segment(ResourceKind::ItemTypes, None)
    }

    pub fn item_fields(self) -> Self {
        self.segment(ResourceKind::ItemFields, None)
    }

    pub fn creator_fields(self) -> Self {
        self.segment(ResourceKind::CreatorFields, None)
    }

    pub fn item_type_fields(self, item_type: Option<&str>) -> Self {
        self.segment(ResourceKind::ItemTypeFields, None)
            .maybe_item_type(item_type)
    }

    pub fn item_type_creator_types(self, item_type: Option<&str>) -> Self {
        self.segment(ResourceKind::ItemTypeCreatorTypes, None)
            .maybe_item_type(item_type)
    }

    /// Template of a new item of the given type.
    pub fn template(self, item_type: Option<&str>) -> Self {
        self.segment(ResourceKind::Template, None)
            .maybe_item_type(item_type)
    }

    fn maybe_item_type(self, item_type: Option<&str>) -> Self {
        match item_type {
            Some(item_type) => self.query(QueryParam::ItemType, item_type),
            None => self,
        }
    }

    /// Library version for optimistic concurrency.
    ///
    /// Sent as `If-Modified-Since-Version` with `get` and as
    /// `If-Unmodified-Since-Version` with every write.
    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn write_token(mut self, token: impl Into<String>) -> Self {
        self.headers.zotero_write_token = Some(token.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.headers.content_type = Some(content_type.into());
        self
    }

    pub fn query(mut self, param: QueryParam, value: impl ToString) -> Self {
        self.query = self.query.set(param, value);
        self
    }

    pub fn format(self, format: &str) -> Self {
        self.query(QueryParam::Format, format)
    }

    pub fn include(self, include: &str) -> Self {
        self.query(QueryParam::Include, include)
    }

    pub fn since(self, version: u64) -> Self {
        self.query(QueryParam::Since, version)
    }

    pub fn tag(self, tag: &str) -> Self {
        self.query(QueryParam::Tag, tag)
    }

    pub fn sort(self, sort: &str) -> Self {
        self.query(QueryParam::Sort, sort)
    }

    pub fn direction(self, direction: &str) -> Self {
        self.query(QueryParam::Direction, direction)
    }

    pub fn limit(self, limit: u32) -> Self {
        self.query(QueryParam::Limit, limit)
    }

    pub fn start(self, start: u32) -> Self {
        self.query(QueryParam::Start, start)
    }

    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    pub async fn get(self) -> Result<Outcome, RequestError> {
        self.send(Method::Get, None, Vec::new()).await
    }

    pub async fn post(self, body: impl Into<RequestBody>) -> Result<Outcome, RequestError> {
        self.send(Method::Post, Some(body.into()), Vec::new()).await
    }

    pub async fn put(self, body: impl Into<RequestBody>) -> Result<Outcome, RequestError> {
        self.send(Method::Put, Some(body.into()), Vec::new()).await
    }

    pub async fn patch(self, body: impl Into<RequestBody>) -> Result<Outcome, RequestError> {
        self.send(Method::Patch, Some(body.into()), Vec::new()).await
    }

    /// Deletes the addressed entity, or the given keys of the addressed
    /// collection (e.g. `items(None).delete(["A", "B"])`).
    pub async fn delete<I, S>(self, keys: I) -> Result<Outcome, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.send(Method::Delete, None, keys).await
    }

    async fn send(
        self,
        method: Method,
        body: Option<RequestBody>,
        keys_to_delete: Vec<String>,
    ) -> Result<Outcome, RequestError> {
        let client = self.client;
        let (resource, options) = self.into_request(method, body, keys_to_delete);
        client.request(&resource, options).await
    }

    fn into_request(
        self,
        method: Method,
        body: Option<RequestBody>,
        keys_to_delete: Vec<String>,
    ) -> (ResourceDescriptor, RequestOptions) {
        let mut headers = self.headers;
        if let Some(version) = self.version {
            match method {
                Method::Get => headers.if_modified_since_version = Some(version),
                _ => headers.if_unmodified_since_version = Some(version),
            }
        }
        let options = RequestOptions {
            method,
            query: self.query,
            headers,
            body,
            keys_to_delete,
        };
        (self.resource, options)
    }
}

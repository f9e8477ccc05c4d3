use std::{collections::BTreeMap, fmt, str::FromStr};

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize, de::IntoDeserializer};
use serde_json::Value;

use crate::zotero_api::{
    headers,
    resource::{ResourceDescriptor, ResourceKind, ResourceShape},
    types::UsageError,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn name(self) -> &'static str {
        serde_variant::to_variant_name(&self).unwrap_or_default()
    }

    pub fn is_write(self) -> bool {
        self != Self::Get
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = UsageError;

    /// Case-insensitive, so `GET` and `get` are the same method.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_lowercase();
        let deserializer: serde::de::value::StrDeserializer<'_, serde::de::value::Error> =
            name.as_str().into_deserializer();
        Self::deserialize(deserializer).map_err(|_| UsageError::UnknownMethod(s.into()))
    }
}

/// The query parameters understood by the API.
///
/// Declaration order is the order in which they appear in built URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryParam {
    Format,
    Include,
    Content,
    Style,
    ItemKey,
    CollectionKey,
    SearchKey,
    ItemType,
    Qmode,
    Since,
    Tag,
    Sort,
    Direction,
    Limit,
    Start,
}

impl QueryParam {
    pub fn name(self) -> &'static str {
        serde_variant::to_variant_name(&self).unwrap_or_default()
    }

    fn list_separator(self) -> &'static str {
        match self {
            Self::Tag => " || ",
            _ => ",",
        }
    }
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QueryParam {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let deserializer: serde::de::value::StrDeserializer<'_, serde::de::value::Error> =
            s.into_deserializer();
        Self::deserialize(deserializer).map_err(|_| UsageError::UnknownQueryParam(s.into()))
    }
}

/// Query parameter values. Values are sent verbatim, callers pre-encode them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<QueryParam, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing any previous value.
    pub fn set(mut self, param: QueryParam, value: impl ToString) -> Self {
        self.values.insert(param, vec![value.to_string()]);
        self
    }

    /// Appends values to a list parameter, keeping what is already there.
    pub fn append<I, S>(mut self, param: QueryParam, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.values.entry(param).or_default().extend(values);
        }
        self
    }

    pub fn get(&self, param: QueryParam) -> Option<&[String]> {
        self.values.get(&param).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        self.values
            .iter()
            .map(|(param, values)| {
                format!("{}={}", param.name(), values.join(param.list_separator()))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Optional request headers. `None` means the header is not sent at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    /// Final header value, e.g. `Bearer <key>`.
    pub authorization: Option<String>,
    pub zotero_write_token: Option<String>,
    pub if_modified_since_version: Option<u64>,
    pub if_unmodified_since_version: Option<u64>,
    pub content_type: Option<String>,
}

/// A request body: one entity, or an ordered batch of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestBody {
    Single(Value),
    Batch(Vec<Value>),
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(entities) => Self::Batch(entities),
            other => Self::Single(other),
        }
    }
}

impl From<Vec<Value>> for RequestBody {
    fn from(entities: Vec<Value>) -> Self {
        Self::Batch(entities)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub query: QueryParams,
    pub headers: RequestHeaders,
    pub body: Option<RequestBody>,
    /// Keys appended to the matching key parameter of a delete request.
    pub keys_to_delete: Vec<String>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_keys_to_delete<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys_to_delete = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// What the response classifier needs to know about the request that was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub method: Method,
    pub shape: ResourceShape,
    pub format: Option<String>,
    pub submitted: Option<RequestBody>,
}

impl RequestContext {
    /// Every format except `json` and `versions` is delivered as-is.
    pub fn expects_json(&self) -> bool {
        match self.format.as_deref() {
            None | Some("json") | Some("versions") => true,
            Some(_) => false,
        }
    }
}

/// A fully built, immutable request, ready for the transport.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    context: RequestContext,
}

impl RequestConfig {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn into_context(self) -> RequestContext {
        self.context
    }
}

/// Translates a resource descriptor and options into a request for `origin`.
pub fn build(
    origin: &str,
    resource: &ResourceDescriptor,
    options: &RequestOptions,
) -> Result<RequestConfig, UsageError> {
    let query = merge_keys_to_delete(resource, options)?;

    let mut url = format!("{}{}", origin.trim_end_matches('/'), resource.path()?);
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.to_query_string());
    }

    let headers = build_headers(options)?;
    let body = options
        .body
        .as_ref()
        .map(serde_json::to_vec)
        .transpose()?;

    log::debug!("Built request: {} {}", options.method, url);

    Ok(RequestConfig {
        method: options.method,
        url,
        headers,
        body,
        context: RequestContext {
            method: options.method,
            shape: resource.shape(),
            format: query.get(QueryParam::Format).map(|values| values.join(",")),
            submitted: options.body.clone(),
        },
    })
}

/// The key parameter a delete on this resource is filtered by.
fn delete_target(resource: &ResourceDescriptor) -> Option<QueryParam> {
    [
        (ResourceKind::Items, QueryParam::ItemKey),
        (ResourceKind::Collections, QueryParam::CollectionKey),
        (ResourceKind::Tags, QueryParam::Tag),
        (ResourceKind::Searches, QueryParam::SearchKey),
    ]
    .into_iter()
    .find(|(kind, _)| resource.contains(*kind))
    .map(|(_, param)| param)
}

fn merge_keys_to_delete(
    resource: &ResourceDescriptor,
    options: &RequestOptions,
) -> Result<QueryParams, UsageError> {
    if options.method != Method::Delete {
        if !options.keys_to_delete.is_empty() {
            log::warn!(
                "Ignoring keys to delete for {} request: {:?}",
                options.method,
                options.keys_to_delete
            );
        }
        return Ok(options.query.clone());
    }
    let param = delete_target(resource).ok_or(UsageError::NoDeleteTarget)?;
    Ok(options
        .query
        .clone()
        .append(param, options.keys_to_delete.iter().cloned()))
}

fn build_headers(options: &RequestOptions) -> Result<HeaderMap, UsageError> {
    let mut map = HeaderMap::new();
    map.insert(
        headers::ZOTERO_API_VERSION,
        HeaderValue::from_static(headers::API_VERSION),
    );

    let values = &options.headers;
    if let Some(authorization) = &values.authorization {
        map.insert(header::AUTHORIZATION, text_value("Authorization", authorization)?);
    }
    if let Some(token) = &values.zotero_write_token {
        map.insert(
            headers::ZOTERO_WRITE_TOKEN,
            text_value(headers::ZOTERO_WRITE_TOKEN, token)?,
        );
    }
    if let Some(version) = values.if_modified_since_version {
        if options.method != Method::Get {
            log::warn!(
                "{} is meant for GET requests, sending it with {} anyway",
                headers::IF_MODIFIED_SINCE_VERSION,
                options.method
            );
        }
        map.insert(headers::IF_MODIFIED_SINCE_VERSION, version.into());
    }
    if let Some(version) = values.if_unmodified_since_version {
        if !options.method.is_write() {
            log::warn!(
                "{} is meant for write requests, sending it with {} anyway",
                headers::IF_UNMODIFIED_SINCE_VERSION,
                options.method
            );
        }
        map.insert(headers::IF_UNMODIFIED_SINCE_VERSION, version.into());
    }
    match (&values.content_type, &options.body) {
        (Some(content_type), _) => {
            map.insert(header::CONTENT_TYPE, text_value("Content-Type", content_type)?);
        }
        (None, Some(_)) => {
            map.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        (None, None) => {}
    }
    Ok(map)
}

fn text_value(name: &'static str, value: &str) -> Result<HeaderValue, UsageError> {
    HeaderValue::from_str(value).map_err(|source| UsageError::InvalidHeaderValue { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zotero_api::resource::LibraryKey;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    const ORIGIN: &str = "https://api.zotero.org";

    fn items() -> ResourceDescriptor {
        ResourceDescriptor::for_library(&LibraryKey::User("475425".into()))
            .with(ResourceKind::Items, None)
    }

    fn header<'a>(config: &'a RequestConfig, name: &str) -> Option<&'a str> {
        config.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn builds_url_from_origin_and_path() {
        let config = build(
            "https://api.zotero.org/",
            &items().with(ResourceKind::Top, None),
            &RequestOptions::default(),
        )
        .unwrap();
        assert_eq!(config.url(), "https://api.zotero.org/users/475425/items/top");
        assert_eq!(config.method(), Method::Get);
        assert_eq!(config.body(), None);
    }

    #[test]
    fn query_params_follow_fixed_order() {
        let query = QueryParams::new()
            .set(QueryParam::Start, 25)
            .set(QueryParam::Limit, 50)
            .set(QueryParam::Sort, "title")
            .set(QueryParam::Direction, "asc")
            .set(QueryParam::Format, "json");
        let config = build(
            ORIGIN,
            &items(),
            &RequestOptions::default().with_query(query),
        )
        .unwrap();
        assert_eq!(
            config.url(),
            "https://api.zotero.org/users/475425/items?format=json&sort=title&direction=asc&limit=50&start=25"
        );
    }

    #[test]
    fn all_query_params_are_serialized() {
        let params = [
            QueryParam::Format,
            QueryParam::Include,
            QueryParam::Content,
            QueryParam::Style,
            QueryParam::ItemKey,
            QueryParam::CollectionKey,
            QueryParam::SearchKey,
            QueryParam::ItemType,
            QueryParam::Qmode,
            QueryParam::Since,
            QueryParam::Tag,
            QueryParam::Sort,
            QueryParam::Direction,
            QueryParam::Limit,
            QueryParam::Start,
        ];
        let query = params
            .iter()
            .fold(QueryParams::new(), |q, param| q.set(*param, "foo"));
        let config = build(ORIGIN, &items(), &RequestOptions::default().with_query(query)).unwrap();
        for param in params {
            assert!(
                config.url().contains(&format!("{}=foo", param)),
                "{} missing from {}",
                param,
                config.url()
            );
        }
    }

    #[rstest]
    #[case("itemTypeFields", "/itemTypeFields?itemType=book")]
    #[case("itemTypeCreatorTypes", "/itemTypeCreatorTypes?itemType=book")]
    #[case("template", "/items/new?itemType=book")]
    fn meta_resources_carry_item_type(#[case] kind: &str, #[case] expected: &str) {
        let resource = ResourceDescriptor::new().with(kind.parse().unwrap(), None);
        let options = RequestOptions::default()
            .with_query(QueryParams::new().set(QueryParam::ItemType, "book"));
        let config = build(ORIGIN, &resource, &options).unwrap();
        assert_eq!(config.url(), format!("{}{}", ORIGIN, expected));
        assert_eq!(config.context().shape, ResourceShape::Meta);
    }

    #[test]
    fn maps_all_headers() {
        let options = RequestOptions::default().with_headers(RequestHeaders {
            authorization: Some("a".into()),
            zotero_write_token: Some("b".into()),
            if_modified_since_version: Some(1),
            if_unmodified_since_version: Some(1),
            content_type: Some("c".into()),
        });
        let config = build(ORIGIN, &items(), &options).unwrap();
        assert_eq!(header(&config, "Authorization"), Some("a"));
        assert_eq!(header(&config, "Zotero-Write-Token"), Some("b"));
        assert_eq!(header(&config, "If-Modified-Since-Version"), Some("1"));
        assert_eq!(header(&config, "If-Unmodified-Since-Version"), Some("1"));
        assert_eq!(header(&config, "Content-Type"), Some("c"));
        assert_eq!(header(&config, "Zotero-API-Version"), Some("3"));
    }

    #[test]
    fn absent_headers_are_not_sent() {
        let config = build(ORIGIN, &items(), &RequestOptions::default()).unwrap();
        assert_eq!(config.headers().len(), 1);
        for name in [
            "Authorization",
            "Zotero-Write-Token",
            "If-Modified-Since-Version",
            "If-Unmodified-Since-Version",
            "Content-Type",
        ] {
            assert!(config.headers().get(name).is_none(), "{} was sent", name);
        }
    }

    #[test]
    fn body_is_serialized_as_json() {
        let body = json!([{ "key": "ITEM1111" }, { "key": "ITEM2222" }]);
        let options = RequestOptions::new(Method::Post).with_body(body.clone());
        let config = build(ORIGIN, &items(), &options).unwrap();
        assert_eq!(header(&config, "Content-Type"), Some("application/json"));
        let sent: Value = serde_json::from_slice(config.body().unwrap()).unwrap();
        assert_eq!(sent, body);
        assert_matches!(config.context().submitted, Some(RequestBody::Batch(ref batch)) if batch.len() == 2);
    }

    #[test]
    fn unencodable_header_is_a_usage_error() {
        let options = RequestOptions::default().with_headers(RequestHeaders {
            zotero_write_token: Some("line\nbreak".into()),
            ..RequestHeaders::default()
        });
        assert_matches!(
            build(ORIGIN, &items(), &options),
            Err(UsageError::InvalidHeaderValue { name: "Zotero-Write-Token", .. })
        );
    }

    #[rstest]
    #[case(ResourceKind::Items, QueryParam::ItemKey)]
    #[case(ResourceKind::Collections, QueryParam::CollectionKey)]
    #[case(ResourceKind::Tags, QueryParam::Tag)]
    #[case(ResourceKind::Searches, QueryParam::SearchKey)]
    fn delete_merges_keys_into_matching_param(
        #[case] kind: ResourceKind,
        #[case] param: QueryParam,
    ) {
        let resource = ResourceDescriptor::for_library(&LibraryKey::User("475425".into()))
            .with(kind, None);
        let options = RequestOptions::new(Method::Delete).with_keys_to_delete(["A", "B"]);
        let config = build(ORIGIN, &resource, &options).unwrap();
        let mut keys = merge_keys_to_delete(&resource, &options)
            .unwrap()
            .get(param)
            .unwrap()
            .to_vec();
        keys.sort();
        assert_eq!(keys, vec!["A".to_string(), "B".to_string()]);
        assert!(config.url().contains(&format!("{}=", param)));
    }

    #[test]
    fn delete_appends_to_existing_keys() {
        let options = RequestOptions::new(Method::Delete)
            .with_query(QueryParams::new().set(QueryParam::ItemKey, "A"))
            .with_keys_to_delete(["B", "A"]);
        let config = build(ORIGIN, &items(), &options).unwrap();
        assert_eq!(
            config.url(),
            "https://api.zotero.org/users/475425/items?itemKey=A,B,A"
        );
    }

    #[test]
    fn deleted_tags_are_joined_with_or() {
        let resource = ResourceDescriptor::for_library(&LibraryKey::User("475425".into()))
            .with(ResourceKind::Tags, None);
        let options = RequestOptions::new(Method::Delete).with_keys_to_delete(["one", "two"]);
        let config = build(ORIGIN, &resource, &options).unwrap();
        assert_eq!(
            config.url(),
            "https://api.zotero.org/users/475425/tags?tag=one || two"
        );
    }

    #[test]
    fn delete_without_plural_resource_fails() {
        let resource = ResourceDescriptor::for_library(&LibraryKey::User("475425".into()));
        let options = RequestOptions::new(Method::Delete).with_keys_to_delete(["A"]);
        assert_matches!(
            build(ORIGIN, &resource, &options),
            Err(UsageError::NoDeleteTarget)
        );
    }

    #[test]
    fn delete_single_entity_needs_no_keys() {
        let options = RequestOptions::new(Method::Delete);
        let config = build(
            ORIGIN,
            &items().with(ResourceKind::Items, Some("ITEM1111")),
            &options,
        )
        .unwrap();
        assert_eq!(config.url(), "https://api.zotero.org/users/475425/items/ITEM1111");
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some("json"), true)]
    #[case(Some("versions"), true)]
    #[case(Some("atom"), false)]
    #[case(Some("bibtex"), false)]
    #[case(Some("keys"), false)]
    fn json_formats(#[case] format: Option<&str>, #[case] expected: bool) {
        let query = format
            .map(|f| QueryParams::new().set(QueryParam::Format, f))
            .unwrap_or_default();
        let config = build(ORIGIN, &items(), &RequestOptions::default().with_query(query)).unwrap();
        assert_eq!(config.context().expects_json(), expected);
    }

    #[rstest]
    #[case("get", Method::Get)]
    #[case("patch", Method::Patch)]
    #[case("delete", Method::Delete)]
    fn method_from_name(#[case] name: &str, #[case] method: Method) {
        assert_eq!(name.parse::<Method>().unwrap(), method);
        assert_eq!(method.to_string(), name);
    }

    #[rstest]
    #[case("POST", Method::Post)]
    #[case("Put", Method::Put)]
    #[case("DELETE", Method::Delete)]
    fn method_names_ignore_case(#[case] name: &str, #[case] method: Method) {
        assert_eq!(name.parse::<Method>().unwrap(), method);
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert_matches!("fetch".parse::<Method>(), Err(UsageError::UnknownMethod(m)) if m == "fetch");
    }

    #[test]
    fn unknown_query_param_is_rejected() {
        assert_matches!("q".parse::<QueryParam>(), Err(UsageError::UnknownQueryParam(p)) if p == "q");
        assert_eq!("collectionKey".parse::<QueryParam>().unwrap(), QueryParam::CollectionKey);
    }
}

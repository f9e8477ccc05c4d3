use reqwest::{
    StatusCode,
    header::{self, HeaderMap},
};
use serde_json::Value;

use crate::zotero_api::{
    headers,
    multi_write::MultiWriteResponse,
    request::{Method, RequestBody, RequestContext},
    resource::ResourceShape,
    transport::{TransportResponse, parse_version},
    types::{RequestError, ResponseError},
};

/// Status line and headers of a classified response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    fn of(response: &TransportResponse) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The library version after the request, from `Last-Modified-Version`.
    pub fn last_modified_version(&self) -> Option<u64> {
        parse_version(&self.headers)
    }

    /// Total number of results of a paginated read, from `Total-Results`.
    pub fn total_results(&self) -> Option<u64> {
        self.header(headers::TOTAL_RESULTS)
            .and_then(|s| s.trim().parse().ok())
    }

    /// The `rel="next"` target of the `Link` header, if there are more pages.
    pub fn next_page_url(&self) -> Option<String> {
        self.headers.get(header::LINK).and_then(|link_header| {
            let link_str = link_header.to_str().ok()?;
            for part in link_str.split(',') {
                let sections: Vec<&str> = part.split(';').map(|s| s.trim()).collect();
                if sections.len() == 2 && sections[1] == r#"rel="next""# {
                    let url = sections[0].trim_start_matches('<').trim_end_matches('>');
                    return Some(url.to_string());
                }
            }
            None
        })
    }
}

/// Entities come wrapped in an envelope (`key`, `links`, `meta`, `data`);
/// the entity itself is `data` when there is one.
fn entity_data(value: &Value) -> &Value {
    value.get("data").filter(|data| data.is_object()).unwrap_or(value)
}

fn into_entity_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(data @ Value::Object(_)) => data,
            Some(other) => {
                map.insert("data".into(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

/// A response without a more specific shape: `304 Not Modified` (no data)
/// and schema resources such as item types.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    head: ResponseHead,
    data: Option<Value>,
}

impl ApiResponse {
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<Value> {
        self.data
    }
}

#[derive(Debug, Clone)]
pub struct SingleReadResponse {
    head: ResponseHead,
    raw: Value,
}

impl SingleReadResponse {
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn data(&self) -> &Value {
        entity_data(&self.raw)
    }

    /// The full envelope, including `links` and `meta`.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_data(self) -> Value {
        into_entity_data(self.raw)
    }
}

#[derive(Debug, Clone)]
pub struct MultiReadResponse {
    head: ResponseHead,
    raw: Vec<Value>,
}

impl MultiReadResponse {
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn data(&self) -> Vec<&Value> {
        self.raw.iter().map(entity_data).collect()
    }

    pub fn raw(&self) -> &[Value] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn into_data(self) -> Vec<Value> {
        self.raw.into_iter().map(into_entity_data).collect()
    }
}

/// A write of one entity. The entity carries the new library version.
#[derive(Debug, Clone)]
pub struct SingleWriteResponse {
    head: ResponseHead,
    entity: Option<Value>,
}

impl SingleWriteResponse {
    fn new(head: ResponseHead, body: Option<Value>, submitted: Option<Value>) -> Self {
        let mut entity = body.map(into_entity_data).or(submitted);
        if let (Some(Value::Object(map)), Some(version)) =
            (entity.as_mut(), head.last_modified_version())
        {
            map.insert("version".into(), version.into());
        }
        Self { head, entity }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn data(&self) -> Option<&Value> {
        self.entity.as_ref()
    }

    pub fn into_data(self) -> Option<Value> {
        self.entity
    }
}

/// A response in a non-JSON format (e.g. `atom`, `bibtex`), body untouched.
#[derive(Debug)]
pub struct RawResponse {
    response: TransportResponse,
}

impl RawResponse {
    pub fn response(&self) -> &TransportResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut TransportResponse {
        &mut self.response
    }

    pub fn into_response(self) -> TransportResponse {
        self.response
    }
}

/// The API answered with a status other than 2xx or 304.
///
/// `reason` holds the body text; the body of `response` is left unread.
#[derive(thiserror::Error, Debug)]
#[error("{}: {}", .status.as_u16(), .status_text)]
pub struct ErrorResponse {
    status: StatusCode,
    status_text: String,
    reason: String,
    response: TransportResponse,
}

impl ErrorResponse {
    fn new(response: TransportResponse) -> Self {
        let status = response.status();
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            reason: response.peek_text(),
            response,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// `"<status>: <statusText>"`, e.g. `404: Not Found`.
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn response(&self) -> &TransportResponse {
        &self.response
    }

    pub fn into_response(self) -> TransportResponse {
        self.response
    }
}

/// The classified result of one request.
#[derive(Debug)]
pub enum Outcome {
    Api(ApiResponse),
    SingleRead(SingleReadResponse),
    MultiRead(MultiReadResponse),
    SingleWrite(SingleWriteResponse),
    MultiWrite(MultiWriteResponse),
    Raw(RawResponse),
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Raw(raw) => raw.response.status(),
            other => other.head().map(|head| head.status).unwrap_or_default(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            Self::Api(r) => &r.head.headers,
            Self::SingleRead(r) => &r.head.headers,
            Self::MultiRead(r) => &r.head.headers,
            Self::SingleWrite(r) => &r.head.headers,
            Self::MultiWrite(r) => r.headers(),
            Self::Raw(r) => r.response.headers(),
        }
    }

    /// Status and headers of every JSON outcome; `None` for raw responses.
    pub fn head(&self) -> Option<&ResponseHead> {
        match self {
            Self::Api(r) => Some(&r.head),
            Self::SingleRead(r) => Some(&r.head),
            Self::MultiRead(r) => Some(&r.head),
            Self::SingleWrite(r) => Some(&r.head),
            Self::MultiWrite(r) => Some(r.head()),
            Self::Raw(_) => None,
        }
    }

    pub fn last_modified_version(&self) -> Option<u64> {
        parse_version(self.headers())
    }

    pub fn is_not_modified(&self) -> bool {
        self.status() == StatusCode::NOT_MODIFIED
    }

    /// The data of the outcome as JSON: one entity, a list of entities, or
    /// `None` for `304 Not Modified`, bodiless writes and raw responses.
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::Api(r) => r.data.clone(),
            Self::SingleRead(r) => Some(r.data().clone()),
            Self::MultiRead(r) => Some(Value::Array(r.data().into_iter().cloned().collect())),
            Self::SingleWrite(r) => r.entity.clone(),
            Self::MultiWrite(r) => Some(Value::Array(r.data().to_vec())),
            Self::Raw(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Api(_) => "api",
            Self::SingleRead(_) => "single read",
            Self::MultiRead(_) => "multi read",
            Self::SingleWrite(_) => "single write",
            Self::MultiWrite(_) => "multi write",
            Self::Raw(_) => "raw",
        }
    }
}

/// Turns a transport response into the outcome matching the request.
pub fn classify(
    mut response: TransportResponse,
    context: RequestContext,
) -> Result<Outcome, RequestError> {
    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
        log::debug!("Not modified");
        return Ok(Outcome::Api(ApiResponse {
            head: ResponseHead::of(&response),
            data: None,
        }));
    }
    if !status.is_success() {
        let error = ErrorResponse::new(response);
        log::debug!("Error response '{}': {}", error, error.reason());
        return Err(error.into());
    }
    if !context.expects_json() || !response.is_json() {
        log::debug!(
            "Passing through raw response (format {:?}, content type {:?})",
            context.format,
            response.header(header::CONTENT_TYPE.as_str())
        );
        return Ok(Outcome::Raw(RawResponse { response }));
    }

    let head = ResponseHead::of(&response);
    let body = response.take_body()?;
    let json = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(&body)
                .map_err(|source| ResponseError::InvalidJson { status, source })?,
        )
    };

    let outcome = match (context.method, context.shape) {
        (Method::Get, ResourceShape::Single) => Outcome::SingleRead(SingleReadResponse {
            head,
            raw: json.unwrap_or(Value::Null),
        }),
        (Method::Get, ResourceShape::Multiple) => match json {
            Some(Value::Array(raw)) => Outcome::MultiRead(MultiReadResponse { head, raw }),
            None => Outcome::MultiRead(MultiReadResponse {
                head,
                raw: Vec::new(),
            }),
            // `format=versions` maps keys to versions instead of listing entities
            Some(versions @ Value::Object(_)) if context.format.as_deref() == Some("versions") => {
                Outcome::Api(ApiResponse {
                    head,
                    data: Some(versions),
                })
            }
            Some(_) => return Err(ResponseError::UnexpectedShape { expected: "array" }.into()),
        },
        (Method::Get, ResourceShape::Meta | ResourceShape::Bare) => {
            Outcome::Api(ApiResponse { head, data: json })
        }
        (_, _) => match context.submitted {
            Some(RequestBody::Batch(batch)) => {
                Outcome::MultiWrite(MultiWriteResponse::reconcile(head, batch, json)?)
            }
            Some(RequestBody::Single(entity)) => {
                Outcome::SingleWrite(SingleWriteResponse::new(head, json, Some(entity)))
            }
            None => Outcome::SingleWrite(SingleWriteResponse::new(head, json, None)),
        },
    };
    log::debug!("Classified {} response as {}", status, outcome.kind());
    Ok(outcome)
}

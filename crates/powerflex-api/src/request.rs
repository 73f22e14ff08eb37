// Request description handed to the pipeline
//
// An `ApiRequest` is everything a resource module supplies: verb, path
// below `/api`, optional body, filter and projection. It is plain data so
// the pipeline can rebuild the HTTP request for the renewal retry.

use reqwest::Method;
use serde_json::{Map, Value};

use crate::error::{Error, Operation};
use crate::query::{self, FieldProjection, FilterSpec};

/// A single logical gateway operation.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    filter: FilterSpec,
    fields: FieldProjection,
    operation: Operation,
    redacted: bool,
}

impl ApiRequest {
    /// `path` is relative to the gateway's `/api` root and starts with `/`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let operation = match method {
            Method::POST => Operation::Create,
            Method::PUT | Method::PATCH => Operation::Update,
            Method::DELETE => Operation::Delete,
            _ => Operation::Query,
        };
        Self {
            method,
            path: path.into(),
            body: None,
            filter: FilterSpec::default(),
            fields: FieldProjection::default(),
            operation,
            redacted: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Send `body` as-is.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Send `params` the way the gateway's object API expects them
    /// (see [`prepare_params`]).
    pub fn params(mut self, params: Value) -> Self {
        self.body = Some(prepare_params(params));
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    pub fn fields(mut self, fields: FieldProjection) -> Self {
        self.fields = fields;
        self
    }

    /// Override the operation kind reported on failure.
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Keep the body out of trace logs.
    pub fn redacted(mut self) -> Self {
        self.redacted = true;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn operation_kind(&self) -> Operation {
        self.operation
    }

    pub fn is_redacted(&self) -> bool {
        self.redacted
    }

    /// `filter` / `fields` query parameters, encoded.
    pub fn query_pairs(&self) -> Result<Vec<(&'static str, String)>, Error> {
        let mut pairs = Vec::new();
        if let Some(filter) = query::encode_filter(&self.filter)? {
            pairs.push(("filter", filter));
        }
        if let Some(fields) = query::encode_fields(&self.fields)? {
            pairs.push(("fields", fields));
        }
        Ok(pairs)
    }
}

/// Reject a path segment (entity name, id, action) that would change the
/// URL's structure once interpolated.
pub(crate) fn check_segment(kind: &str, segment: &str) -> Result<(), Error> {
    let invalid = segment.is_empty()
        || segment
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace());
    if invalid {
        Err(Error::invalid_option(format!("invalid {kind} {segment:?}")))
    } else {
        Ok(())
    }
}

fn stringify(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(stringify).collect()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => other,
    }
}

/// Prepare object-API parameters: drop `null` members and render numbers
/// and booleans (including list items) as strings.
///
/// Nested objects are passed through untouched. Non-object values are
/// returned unchanged.
pub fn prepare_params(params: Value) -> Value {
    match params {
        Value::Object(members) => Value::Object(
            members
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, stringify(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

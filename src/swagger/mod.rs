//! Swagger 2.0 document model.
//!
//! A [`SpecDocument`] is the loaded form of one contract file: its paths and
//! operations with parameters and responses resolved, and every schema
//! interned into the shared [`SchemaArena`].

pub mod discovery;
mod error;
pub mod loader;
mod position;
pub mod schema;

use std::sync::Arc;

pub use error::{LoadError, LoadResult};
use http::Method;
pub use loader::{FileSystemLoader, LoadedDocument, Loader, SwaggerReader};
pub use position::{Position, PositionIndex};
pub use schema::{
    AdditionalProperties, Mutability, Schema, SchemaArena, SchemaId, SchemaSource, SchemaType,
};

use crate::transform::PathRegex;

/// Where a parameter is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Body,
    FormData,
}

impl ParameterLocation {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "body" => Some(Self::Body),
            "formData" => Some(Self::FormData),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
            Self::FormData => "formData",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterDef {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    /// Body parameters point at their `schema`; the others at the
    /// parameter object itself, which carries the schema keywords.
    pub schema: SchemaId,
    /// Declared `type` of a non-body parameter, used for wire coercion.
    pub wire_type: Option<SchemaType>,
    /// Only `in`/`name`/`type: string`/`description`/`required` are set.
    pub is_plain_string: bool,
}

#[derive(Debug, Clone)]
pub struct HeaderDef {
    pub name: String,
    pub schema: SchemaId,
    pub wire_type: Option<SchemaType>,
}

#[derive(Debug, Clone)]
pub struct ResponseDef {
    /// Status code key as written in the contract (`200`, `default`).
    pub status: String,
    pub schema: Option<SchemaId>,
    pub is_file: bool,
    pub headers: Vec<HeaderDef>,
}

#[derive(Debug, Clone)]
pub struct OperationDef {
    pub operation_id: String,
    pub method: Method,
    pub parameters: Vec<ParameterDef>,
    pub consumes: Option<Vec<String>>,
    pub produces: Option<Vec<String>>,
    pub responses: Vec<ResponseDef>,
    pub long_running: bool,
    pub source: SchemaSource,
}

impl OperationDef {
    pub fn response(&self, status: &str) -> Option<&ResponseDef> {
        self.responses.iter().find(|r| r.status == status)
    }
}

#[derive(Debug, Clone)]
pub struct PathDef {
    pub template: String,
    pub parameters: Vec<ParameterDef>,
    pub operations: Vec<OperationDef>,
    /// Built by the path regex transform.
    pub regex: Option<Arc<PathRegex>>,
}

#[derive(Debug, Clone)]
pub struct SpecDocument {
    /// Stable id: the file path the document was read from.
    pub id: Arc<str>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub host: Option<String>,
    pub base_path: String,
    /// `x-ms-parameterized-host.hostTemplate`.
    pub host_template: Option<String>,
    pub host_parameters: Vec<ParameterDef>,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    pub paths: Vec<PathDef>,
    pub xms_paths: Vec<PathDef>,
    /// Every node under `definitions`, referenced or not.
    pub definitions: Vec<SchemaId>,
    pub provider_hint: Option<String>,
}

/// HTTP methods a Swagger path item may declare.
pub const OPERATION_METHODS: [&str; 7] = ["get", "put", "post", "delete", "options", "head", "patch"];

/// Parses a lowercase path-item key into a method.
pub fn parse_method(key: &str) -> Option<Method> {
    if !OPERATION_METHODS.contains(&key) {
        return None;
    }
    Method::from_bytes(key.to_ascii_uppercase().as_bytes()).ok()
}

/// Escapes one JSON pointer token.
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_rejects_non_operation_keys() {
        assert_eq!(parse_method("get"), Some(Method::GET));
        assert_eq!(parse_method("patch"), Some(Method::PATCH));
        assert_eq!(parse_method("parameters"), None);
        assert_eq!(parse_method("x-ms-foo"), None);
    }

    #[test]
    fn test_escape_pointer_token() {
        assert_eq!(
            escape_pointer_token("/subscriptions/{id}~x"),
            "~1subscriptions~1{id}~0x"
        );
    }
}

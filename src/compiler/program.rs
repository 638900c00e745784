//! Compiled validator programs and their executor.
//!
//! A [`Program`] is a flat list of [`Node`]s, one per reachable schema plus
//! the synthetic request/response envelope. Nodes refer to each other by
//! index, so recursive schemas compile to cycles in the node list rather
//! than to recursive types.

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashSet},
};

use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::formats::Format;
use crate::{
    swagger::{SchemaSource, SchemaType, escape_pointer_token},
    validation::IssueCode,
};

static QUERY_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?([Ee]\+?\d+)?$").unwrap());

pub(crate) type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// Facts about the exchange that checks consult. One value is built per
/// validate call and passed down explicitly.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub direction: Direction,
    pub http_method: Method,
}

impl ValidationContext {
    pub fn request(http_method: Method) -> Self {
        Self {
            direction: Direction::Request,
            http_method,
        }
    }

    pub fn response(http_method: Method) -> Self {
        Self {
            direction: Direction::Response,
            http_method,
        }
    }

    fn is_response(&self) -> bool {
        self.direction == Direction::Response
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// One failed check, before normalization.
#[derive(Debug, Clone)]
pub struct Violation {
    pub code: IssueCode,
    pub message: String,
    pub params: Vec<Value>,
    /// Location in the validated envelope (`body`, `headers`, ...).
    pub path: Vec<PathSegment>,
    /// Keyword location relative to the innermost referenced schema.
    pub schema_path: String,
    pub source: SchemaSource,
    /// Branch failures of an `anyOf`/`oneOf` violation.
    pub inner: Vec<Violation>,
    suppressed: bool,
}

#[cfg(test)]
impl Violation {
    pub(crate) fn for_test(code: IssueCode, message: &str, path: Vec<PathSegment>, source: SchemaSource) -> Self {
        Self {
            code,
            message: message.to_string(),
            params: Vec::new(),
            path,
            schema_path: "#".to_string(),
            source,
            inner: Vec::new(),
            suppressed: false,
        }
    }
}

#[derive(Debug)]
pub(crate) enum AdditionalRule {
    Deny,
    Schema(NodeId),
}

#[derive(Debug)]
pub(crate) struct DispatchEntry {
    /// `None` is the root's own value.
    pub target: Option<NodeId>,
    /// Property names of the dispatched schema when undeclared keys must
    /// be reported.
    pub closed: Option<HashSet<String>>,
}

#[derive(Debug)]
pub(crate) struct Dispatch {
    pub property: String,
    pub entries: BTreeMap<String, DispatchEntry>,
}

#[derive(Debug)]
pub(crate) enum Check {
    Ref(NodeId),
    Type(SchemaType),
    Enum {
        values: Vec<Value>,
        model_as_string: bool,
    },
    Format(Format),
    Pattern(Regex),
    Minimum {
        limit: f64,
        exclusive: bool,
    },
    Maximum {
        limit: f64,
        exclusive: bool,
    },
    MultipleOf(f64),
    MinLength(u64),
    MaxLength(u64),
    MinItems(u64),
    MaxItems(u64),
    UniqueItems,
    MinProperties(u64),
    MaxProperties(u64),
    Properties(Vec<(String, NodeId)>),
    Required {
        names: Vec<String>,
        /// Properties whose absence is fine in a response.
        unread: HashSet<String>,
    },
    AdditionalProperties {
        known: HashSet<String>,
        rule: AdditionalRule,
    },
    Items(NodeId),
    AllOf(Vec<NodeId>),
    AnyOf(Vec<NodeId>),
    OneOf(Vec<NodeId>),
    Discriminator(Dispatch),
    ReadOnly,
    Mutability {
        in_request: bool,
        in_response: bool,
    },
    Secret,
    AzureResource,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub checks: Vec<Check>,
    pub nullable: bool,
    pub skip_error: bool,
    /// `x-ms-mutability` is absent or lists `read`.
    pub readable: bool,
    pub secret: bool,
    /// Query parameter declared as an array.
    pub query_array: bool,
    /// Last segment of the schema's self reference.
    pub name: Option<String>,
    pub source: SchemaSource,
}

impl Node {
    pub fn new(source: SchemaSource) -> Self {
        Self {
            checks: Vec::new(),
            nullable: false,
            skip_error: false,
            readable: true,
            secret: false,
            query_array: false,
            name: None,
            source,
        }
    }
}

/// An immutable, reusable validator for one request or response shape.
#[derive(Debug)]
pub struct Program {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Program {
    pub(crate) fn new(nodes: Vec<Node>, root: NodeId) -> Self {
        Self { nodes, root }
    }

    /// Number of compiled nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Runs every check against `value` and returns the reportable
    /// violations in evaluation order.
    pub fn validate(&self, value: &Value, ctx: &ValidationContext) -> Vec<Violation> {
        let mut run = Run {
            program: self,
            ctx,
            dispatched: HashSet::new(),
        };
        let mut out = Vec::new();
        let mut path = Vec::new();
        let mut schema_path = String::from("#");
        run.node(self.root, value, &mut path, &mut schema_path, &mut out);
        retain_reported(&mut out);
        out
    }
}

struct Run<'a> {
    program: &'a Program,
    ctx: &'a ValidationContext,
    /// Addresses of objects already dispatched through a discriminator.
    dispatched: HashSet<usize>,
}

impl Run<'_> {
    fn node(
        &mut self,
        id: NodeId,
        value: &Value,
        path: &mut Vec<PathSegment>,
        schema_path: &mut String,
        out: &mut Vec<Violation>,
    ) {
        let program = self.program;
        let node = &program.nodes[id];
        if node.nullable && value.is_null() {
            return;
        }

        let value = match value {
            Value::String(s) if node.query_array && !self.ctx.is_response() => {
                Cow::Owned(split_query_array(s))
            }
            _ => Cow::Borrowed(value),
        };

        for check in &node.checks {
            self.check(node, check, &value, path, schema_path, out);
        }
    }

    fn check(
        &mut self,
        node: &Node,
        check: &Check,
        value: &Value,
        path: &mut Vec<PathSegment>,
        schema_path: &mut String,
        out: &mut Vec<Violation>,
    ) {
        let is_response = self.ctx.is_response();
        match check {
            Check::Ref(target) => {
                let mut fresh = String::from("#");
                self.node(*target, value, path, &mut fresh, out);
            }

            Check::Type(expected) => {
                if type_matches(*expected, value) {
                    return;
                }
                let found = SchemaType::of_value(value);
                let mut v = violation(
                    node,
                    IssueCode::InvalidType,
                    format!("Expected type {} but found type {found}", expected.as_str()),
                    path,
                    keyword_path(schema_path, "type"),
                );
                v.params = vec![Value::from(expected.as_str()), Value::from(found)];
                v.suppressed |= is_response && value.is_null() && !node.readable;
                out.push(v);
            }

            Check::Enum {
                values,
                model_as_string,
            } => {
                if values.contains(value) {
                    return;
                }
                let data = display_value(value);
                let case_mismatch = value.as_str().is_some_and(|s| {
                    let lower = s.to_lowercase();
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|allowed| allowed.to_lowercase() == lower)
                });
                let mut v = if case_mismatch {
                    violation(
                        node,
                        IssueCode::EnumCaseMismatch,
                        format!("Enum does not match case for: {data}"),
                        path,
                        keyword_path(schema_path, "enum"),
                    )
                } else {
                    let mut v = violation(
                        node,
                        IssueCode::EnumMismatch,
                        format!("No enum match for: {data}"),
                        path,
                        keyword_path(schema_path, "enum"),
                    );
                    v.suppressed |= *model_as_string;
                    v
                };
                v.params = vec![value.clone(), Value::Array(values.clone())];
                out.push(v);
            }

            Check::Format(format) => {
                if format.is_valid(value) {
                    return;
                }
                let data = display_value(value);
                let mut v = violation(
                    node,
                    IssueCode::InvalidFormat,
                    format!(
                        "Object didn't pass validation for format {}: {data}",
                        format.name()
                    ),
                    path,
                    keyword_path(schema_path, "format"),
                );
                v.params = vec![Value::from(format.name()), value.clone()];
                out.push(v);
            }

            Check::Pattern(regex) => {
                let Some(s) = value.as_str() else { return };
                if regex.is_match(s) {
                    return;
                }
                let mut v = violation(
                    node,
                    IssueCode::Pattern,
                    format!("String does not match pattern {}: {s}", regex.as_str()),
                    path,
                    keyword_path(schema_path, "pattern"),
                );
                v.params = vec![Value::from(regex.as_str()), value.clone()];
                out.push(v);
            }

            Check::Minimum { limit, exclusive } => {
                let Some(n) = value.as_f64() else { return };
                let (failed, code, message) = if *exclusive {
                    (
                        n <= *limit,
                        IssueCode::MinimumExclusive,
                        "is equal or less than exclusive minimum",
                    )
                } else {
                    (n < *limit, IssueCode::Minimum, "is less than minimum")
                };
                if failed {
                    out.push(limit_violation(node, code, message, value, *limit, path, schema_path, "minimum"));
                }
            }

            Check::Maximum { limit, exclusive } => {
                let Some(n) = value.as_f64() else { return };
                let (failed, code, message) = if *exclusive {
                    (
                        n >= *limit,
                        IssueCode::MaximumExclusive,
                        "is equal or greater than exclusive maximum",
                    )
                } else {
                    (n > *limit, IssueCode::Maximum, "is greater than maximum")
                };
                if failed {
                    out.push(limit_violation(node, code, message, value, *limit, path, schema_path, "maximum"));
                }
            }

            Check::MultipleOf(divisor) => {
                let Some(n) = value.as_f64() else { return };
                if is_multiple_of(n, *divisor) {
                    return;
                }
                let mut v = violation(
                    node,
                    IssueCode::MultipleOf,
                    format!("Value {} is not a multiple of {}", display_value(value), format_number(*divisor)),
                    path,
                    keyword_path(schema_path, "multipleOf"),
                );
                v.params = vec![number_value(*divisor), value.clone()];
                out.push(v);
            }

            Check::MinLength(limit) | Check::MaxLength(limit) => {
                let Some(s) = value.as_str() else { return };
                let length = s.chars().count() as u64;
                let (failed, code, message) = match check {
                    Check::MinLength(_) => (
                        length < *limit,
                        IssueCode::MinLength,
                        format!("String is too short ({length} chars), minimum {limit}"),
                    ),
                    _ => (
                        length > *limit,
                        IssueCode::MaxLength,
                        format!("String is too long ({length} chars), maximum {limit}"),
                    ),
                };
                if failed {
                    let keyword = if code == IssueCode::MinLength { "minLength" } else { "maxLength" };
                    let mut v = violation(node, code, message, path, keyword_path(schema_path, keyword));
                    v.params = vec![Value::from(length), Value::from(*limit)];
                    out.push(v);
                }
            }

            Check::MinItems(limit) | Check::MaxItems(limit) => {
                let Some(items) = value.as_array() else { return };
                let length = items.len() as u64;
                let (failed, code, message, keyword) = match check {
                    Check::MinItems(_) => (
                        length < *limit,
                        IssueCode::ArrayLengthShort,
                        format!("Array is too short ({length}), minimum {limit}"),
                        "minItems",
                    ),
                    _ => (
                        length > *limit,
                        IssueCode::ArrayLengthLong,
                        format!("Array is too long ({length}), maximum {limit}"),
                        "maxItems",
                    ),
                };
                if failed {
                    let mut v = violation(node, code, message, path, keyword_path(schema_path, keyword));
                    v.params = vec![Value::from(length), Value::from(*limit)];
                    out.push(v);
                }
            }

            Check::UniqueItems => {
                let Some(items) = value.as_array() else { return };
                if let Some((i, j)) = first_duplicate(items) {
                    let mut v = violation(
                        node,
                        IssueCode::ArrayUnique,
                        format!("Array items are not unique (indexes {i} and {j})"),
                        path,
                        keyword_path(schema_path, "uniqueItems"),
                    );
                    v.params = vec![Value::from(i), Value::from(j)];
                    out.push(v);
                }
            }

            Check::MinProperties(limit) | Check::MaxProperties(limit) => {
                let Some(object) = value.as_object() else { return };
                let count = object.len() as u64;
                let (failed, code, message, keyword) = match check {
                    Check::MinProperties(_) => (
                        count < *limit,
                        IssueCode::ObjectPropertiesMinimum,
                        format!("Too few properties defined ({count}), minimum {limit}"),
                        "minProperties",
                    ),
                    _ => (
                        count > *limit,
                        IssueCode::ObjectPropertiesMaximum,
                        format!("Too many properties defined ({count}), maximum {limit}"),
                        "maxProperties",
                    ),
                };
                if failed {
                    let mut v = violation(node, code, message, path, keyword_path(schema_path, keyword));
                    v.params = vec![Value::from(count), Value::from(*limit)];
                    out.push(v);
                }
            }

            Check::Properties(properties) => {
                let Some(object) = value.as_object() else { return };
                for (name, child) in properties {
                    let Some(item) = object.get(name) else { continue };
                    let mark = schema_path.len();
                    schema_path.push_str("/properties/");
                    schema_path.push_str(&escape_pointer_token(name));
                    path.push(PathSegment::Key(name.clone()));
                    self.node(*child, item, path, schema_path, out);
                    path.pop();
                    schema_path.truncate(mark);
                }
            }

            Check::Required { names, unread } => {
                let Some(object) = value.as_object() else { return };
                for name in names {
                    if object.contains_key(name) {
                        continue;
                    }
                    path.push(PathSegment::Key(name.clone()));
                    let mut v = violation(
                        node,
                        IssueCode::ObjectMissingRequiredProperty,
                        format!("Missing required property: {name}"),
                        path,
                        keyword_path(schema_path, "required"),
                    );
                    path.pop();
                    v.params = vec![Value::from(name.as_str())];
                    v.suppressed |= is_response && unread.contains(name);
                    out.push(v);
                }
            }

            Check::AdditionalProperties { known, rule } => {
                let Some(object) = value.as_object() else { return };
                for (key, item) in object {
                    if known.contains(key) {
                        continue;
                    }
                    path.push(PathSegment::Key(key.clone()));
                    match rule {
                        AdditionalRule::Deny => {
                            out.push(additional_property(node, key, path, schema_path));
                        }
                        AdditionalRule::Schema(child) => {
                            let mark = schema_path.len();
                            schema_path.push_str("/additionalProperties");
                            self.node(*child, item, path, schema_path, out);
                            schema_path.truncate(mark);
                        }
                    }
                    path.pop();
                }
            }

            Check::Items(child) => {
                let Some(items) = value.as_array() else { return };
                let mark = schema_path.len();
                schema_path.push_str("/items");
                for (index, item) in items.iter().enumerate() {
                    path.push(PathSegment::Index(index));
                    self.node(*child, item, path, schema_path, out);
                    path.pop();
                }
                schema_path.truncate(mark);
            }

            Check::AllOf(members) => {
                for (index, member) in members.iter().enumerate() {
                    let mark = schema_path.len();
                    schema_path.push_str(&format!("/allOf/{index}"));
                    self.node(*member, value, path, schema_path, out);
                    schema_path.truncate(mark);
                }
            }

            Check::AnyOf(branches) => {
                let snapshot = self.dispatched.clone();
                let mut failures = Vec::new();
                for (index, branch) in branches.iter().enumerate() {
                    let mut local = Vec::new();
                    let mark = schema_path.len();
                    schema_path.push_str(&format!("/anyOf/{index}"));
                    self.node(*branch, value, path, schema_path, &mut local);
                    schema_path.truncate(mark);
                    if local.is_empty() {
                        return;
                    }
                    failures.extend(local);
                    self.dispatched = snapshot.clone();
                }
                let missing = violation(
                    node,
                    IssueCode::AnyOfMissing,
                    "Data does not match any schemas from 'anyOf'".to_string(),
                    path,
                    keyword_path(schema_path, "anyOf"),
                );
                push_combined(node, missing, failures, out);
            }

            Check::OneOf(branches) => {
                let snapshot = self.dispatched.clone();
                let mut failures = Vec::new();
                let mut passing = Vec::new();
                for (index, branch) in branches.iter().enumerate() {
                    self.dispatched = snapshot.clone();
                    let mut local = Vec::new();
                    let mark = schema_path.len();
                    schema_path.push_str(&format!("/oneOf/{index}"));
                    self.node(*branch, value, path, schema_path, &mut local);
                    schema_path.truncate(mark);
                    if local.is_empty() {
                        passing.push(self.dispatched.clone());
                    } else {
                        failures.extend(local);
                    }
                }
                match passing.len() {
                    1 => {
                        self.dispatched = passing.remove(0);
                    }
                    0 => {
                        self.dispatched = snapshot;
                        let missing = violation(
                            node,
                            IssueCode::OneOfMissing,
                            "Data does not match any schemas from 'oneOf'".to_string(),
                            path,
                            keyword_path(schema_path, "oneOf"),
                        );
                        push_combined(node, missing, failures, out);
                    }
                    _ => {
                        self.dispatched = snapshot;
                        let multiple = violation(
                            node,
                            IssueCode::OneOfMultiple,
                            "Data is valid against more than one schema from 'oneOf'".to_string(),
                            path,
                            keyword_path(schema_path, "oneOf"),
                        );
                        push_combined(node, multiple, failures, out);
                    }
                }
            }

            Check::Discriminator(dispatch) => {
                self.dispatch(node, dispatch, value, path, schema_path, out);
            }

            Check::ReadOnly => {
                if is_response || value.is_null() {
                    return;
                }
                out.push(access_violation(
                    node,
                    IssueCode::ReadonlyPropertyNotAllowedInRequest,
                    path,
                    keyword_path(schema_path, "readOnly"),
                ));
            }

            Check::Mutability {
                in_request,
                in_response,
            } => {
                let allowed = if is_response { *in_response } else { *in_request };
                if allowed || value.is_null() {
                    return;
                }
                let code = if is_response {
                    IssueCode::WriteonlyPropertyNotAllowedInResponse
                } else {
                    IssueCode::ReadonlyPropertyNotAllowedInRequest
                };
                let mut v = access_violation(node, code, path, keyword_path(schema_path, "x-ms-mutability"));
                v.suppressed |= is_response
                    && self.ctx.http_method == Method::POST
                    && node.secret
                    && !node.readable;
                out.push(v);
            }

            Check::Secret => {
                if !is_response || value.is_null() {
                    return;
                }
                let mut v = access_violation(
                    node,
                    IssueCode::SecretProperty,
                    path,
                    keyword_path(schema_path, "x-ms-secret"),
                );
                v.suppressed |= self.ctx.http_method == Method::POST;
                out.push(v);
            }

            Check::AzureResource => {
                let applies = is_response
                    && (self.ctx.http_method == Method::GET || self.ctx.http_method == Method::PUT);
                let Some(object) = value.as_object() else { return };
                if !applies || object.get("id").is_some_and(|id| !id.is_null()) {
                    return;
                }
                out.push(violation(
                    node,
                    IssueCode::MissingResourceId,
                    "id is required to return in response of GET/PUT resource calls but not being provided"
                        .to_string(),
                    path,
                    keyword_path(schema_path, "x-ms-azure-resource"),
                ));
            }
        }
    }

    fn dispatch(
        &mut self,
        node: &Node,
        dispatch: &Dispatch,
        value: &Value,
        path: &mut Vec<PathSegment>,
        schema_path: &str,
        out: &mut Vec<Violation>,
    ) {
        let Some(object) = value.as_object() else { return };
        if !self.dispatched.insert(value as *const Value as usize) {
            return;
        }

        let tag = object.get(&dispatch.property).and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        });
        let Some(entry) = tag.as_deref().and_then(|t| dispatch.entries.get(t)) else {
            let shown = match object.get(&dispatch.property) {
                None => "undefined".to_string(),
                Some(v) => display_value(v),
            };
            path.push(PathSegment::Key(dispatch.property.clone()));
            let mut v = violation(
                node,
                IssueCode::DiscriminatorValueNotFound,
                format!("Discriminator value \"{shown}\" not found"),
                path,
                keyword_path(schema_path, "discriminator"),
            );
            path.pop();
            let allowed: Vec<Value> = dispatch.entries.keys().map(|k| Value::from(k.as_str())).collect();
            v.params = vec![Value::from(shown), Value::Array(allowed)];
            out.push(v);
            return;
        };

        if let Some(target) = entry.target {
            let mut fresh = String::from("#");
            self.node(target, value, path, &mut fresh, out);
        }

        if let Some(known) = &entry.closed {
            for key in object.keys().filter(|k| !known.contains(*k)) {
                path.push(PathSegment::Key(key.clone()));
                out.push(additional_property(node, key, path, schema_path));
                path.pop();
            }
        }
    }
}

fn violation(
    node: &Node,
    code: IssueCode,
    message: String,
    path: &[PathSegment],
    schema_path: String,
) -> Violation {
    Violation {
        code,
        message,
        params: Vec::new(),
        path: path.to_vec(),
        schema_path,
        source: node.source.clone(),
        inner: Vec::new(),
        suppressed: node.skip_error,
    }
}

/// Reports a combinator failure. Synthetic wrappers are transparent: their
/// branch failures are reported directly. Otherwise they nest under it.
fn push_combined(
    node: &Node,
    mut combined: Violation,
    failures: Vec<Violation>,
    out: &mut Vec<Violation>,
) {
    if node.skip_error {
        out.extend(failures);
    } else {
        combined.inner = failures;
    }
    out.push(combined);
}

fn retain_reported(violations: &mut Vec<Violation>) {
    violations.retain(|v| !v.suppressed);
    for violation in violations {
        retain_reported(&mut violation.inner);
    }
}

fn additional_property(node: &Node, key: &str, path: &[PathSegment], schema_path: &str) -> Violation {
    let mut v = violation(
        node,
        IssueCode::ObjectAdditionalProperties,
        format!("Additional properties not allowed: {key}"),
        path,
        keyword_path(schema_path, "additionalProperties"),
    );
    v.params = vec![Value::from(key)];
    v
}

fn access_violation(node: &Node, code: IssueCode, path: &[PathSegment], schema_path: String) -> Violation {
    let key = node
        .name
        .clone()
        .or_else(|| {
            path.iter().rev().find_map(|segment| match segment {
                PathSegment::Key(k) => Some(k.clone()),
                PathSegment::Index(_) => None,
            })
        })
        .unwrap_or_default();
    let message = match code {
        IssueCode::SecretProperty => format!("Secret property \"{key}\" cannot be sent in the response"),
        IssueCode::WriteonlyPropertyNotAllowedInResponse => {
            format!("Write-only property \"{key}\" is not allowed in the response")
        }
        _ => format!("ReadOnly property \"{key}\" cannot be sent in the request"),
    };
    let mut v = violation(node, code, message, path, schema_path);
    v.params = vec![Value::from(key), Value::Null];
    v
}

#[allow(clippy::too_many_arguments)]
fn limit_violation(
    node: &Node,
    code: IssueCode,
    relation: &str,
    value: &Value,
    limit: f64,
    path: &[PathSegment],
    schema_path: &str,
    keyword: &str,
) -> Violation {
    let mut v = violation(
        node,
        code,
        format!("Value {} {relation} {}", display_value(value), format_number(limit)),
        path,
        keyword_path(schema_path, keyword),
    );
    v.params = vec![value.clone(), number_value(limit)];
    v
}

fn keyword_path(schema_path: &str, keyword: &str) -> String {
    format!("{schema_path}/{keyword}")
}

fn type_matches(expected: SchemaType, value: &Value) -> bool {
    match expected {
        SchemaType::Object => value.is_object(),
        SchemaType::Array => value.is_array(),
        SchemaType::String => value.is_string(),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Null => value.is_null(),
        SchemaType::Number => value.is_number(),
        SchemaType::Integer => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        SchemaType::File => true,
    }
}

/// Accepts decimal divisors that binary floating point cannot represent
/// exactly, such as `0.01`.
fn is_multiple_of(value: f64, divisor: f64) -> bool {
    let quotient = value / divisor;
    if quotient.fract() == 0.0 {
        return true;
    }
    let (mut value, mut divisor) = (value, divisor);
    while divisor < 1.0 {
        divisor *= 10.0;
        value *= 10.0;
    }
    (value / divisor).fract() == 0.0
}

/// Last duplicate pair scanning from the end, as `(later, earlier)`.
fn first_duplicate(items: &[Value]) -> Option<(usize, usize)> {
    for i in (0..items.len()).rev() {
        for j in (0..i).rev() {
            if items[i] == items[j] {
                return Some((i, j));
            }
        }
    }
    None
}

fn split_query_array(raw: &str) -> Value {
    let items = raw
        .split(',')
        .map(|item| {
            if QUERY_NUMBER.is_match(item)
                && let Ok(n) = item.parse::<f64>()
            {
                return number_value(n);
            }
            match item {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::from(item),
            }
        })
        .collect();
    Value::Array(items)
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn format_number(n: f64) -> String {
    number_value(n).to_string()
}

/// Data as it appears in messages: strings bare, everything else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

use std::{collections::HashSet, fmt, sync::Arc};

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value, json};

use super::{SpecTransform, TransformContext, TransformError, TransformResult};
use crate::swagger::{ParameterLocation, SchemaArena, SpecDocument};

/// Capture group for an ordinary path parameter.
const SEGMENT_GROUP: &str = "([^/#?]+?)";
/// Capture group for a leading parameter that may span several segments.
const MULTI_SEGMENT_GROUP: &str = "(.*)";

/// Matcher for one path template.
pub struct PathRegex {
    regex: Regex,
    /// Parameter name of each capture group, in group order.
    keys: Vec<String>,
    has_host_template: bool,
    has_multi_path_param: bool,
    param_only: bool,
    query: Option<QueryConstraint>,
    /// Declared path parameters without a capture group, sorted.
    unbound: Vec<String>,
}

impl fmt::Debug for PathRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRegex")
            .field("regex", &self.regex.as_str())
            .field("keys", &self.keys)
            .field("has_host_template", &self.has_host_template)
            .field("has_multi_path_param", &self.has_multi_path_param)
            .field("query", &self.query)
            .field("unbound", &self.unbound)
            .finish()
    }
}

impl PathRegex {
    /// Builds the matcher for `host_template + base_path + template`.
    ///
    /// `declared` holds the names of the declared path parameters; only a
    /// declared parameter in the first segment may span several segments.
    pub fn build(
        host_template: Option<&str>,
        base_path: &str,
        template: &str,
        declared: &HashSet<String>,
        case_sensitive: bool,
    ) -> TransformResult<Self> {
        if template.matches('{').count() != template.matches('}').count() {
            return Err(TransformError::UnbalancedBraces {
                template: template.to_string(),
            });
        }

        let (path, query) = match template.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (template, None),
        };
        let path = path.strip_suffix('/').unwrap_or(path);
        let base_path = base_path.strip_suffix('/').unwrap_or(base_path);
        let host = host_template
            .unwrap_or_default()
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        let mut pattern = String::from("^");
        let mut keys = Vec::new();
        push_template(&mut pattern, &mut keys, host);
        pattern.push_str(&regex::escape(base_path));

        let mut has_multi_path_param = false;
        let multi = leading_parameter(path).filter(|name| declared.contains(*name));
        match multi {
            Some(name) => {
                has_multi_path_param = true;
                pattern.push('/');
                pattern.push_str(MULTI_SEGMENT_GROUP);
                keys.push(name.to_string());
                push_template(&mut pattern, &mut keys, &path[name.len() + 3..]);
            }
            None => push_template(&mut pattern, &mut keys, path),
        }
        pattern.push_str("/?$");

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|source| TransformError::PathRegex {
                template: template.to_string(),
                source,
            })?;

        let query = query
            .map(|q| QueryConstraint::from_query(template, q))
            .transpose()?;

        let mut unbound: Vec<String> = declared
            .iter()
            .filter(|name| !keys.contains(*name))
            .cloned()
            .collect();
        unbound.sort();

        Ok(Self {
            unbound,
            regex,
            param_only: keys.len() == 1 && path.matches('/').count() == 1,
            keys,
            has_host_template: !host.is_empty(),
            has_multi_path_param,
            query,
        })
    }

    /// Matches a request against the template, returning the raw (still
    /// percent-encoded) value of every parameter.
    pub fn captures(&self, host: &str, path: &str) -> Option<Vec<(String, String)>> {
        let subject;
        let subject = if self.has_host_template {
            subject = format!("{host}{path}");
            subject.as_str()
        } else {
            path
        };
        let captures = self.regex.captures(subject)?;
        Some(
            self.keys
                .iter()
                .enumerate()
                .filter_map(|(index, key)| {
                    captures
                        .get(index + 1)
                        .map(|m| (key.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn has_host_template(&self) -> bool {
        self.has_host_template
    }

    pub fn has_multi_path_param(&self) -> bool {
        self.has_multi_path_param
    }

    /// Template is a single parameter segment such as `/{resourceId}`.
    pub fn is_param_only(&self) -> bool {
        self.param_only
    }

    pub fn query(&self) -> Option<&QueryConstraint> {
        self.query.as_ref()
    }

    /// Declared path parameters the template never captures. Requests can
    /// never supply them, so they always fail as missing.
    pub fn unbound_parameters(&self) -> &[String] {
        &self.unbound
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Appends a template with `{name}` parameters turned into capture groups.
fn push_template(pattern: &mut String, keys: &mut Vec<String>, template: &str) {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|c| open + c) else {
            break;
        };
        pattern.push_str(&regex::escape(&rest[..open]));
        pattern.push_str(SEGMENT_GROUP);
        keys.push(rest[open + 1..close].to_string());
        rest = &rest[close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
}

/// Name of the parameter when the path starts with a whole `/{name}` segment.
fn leading_parameter(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/{")?;
    let close = rest.find('}')?;
    let after = &rest[close + 1..];
    if after.is_empty() || after.starts_with('/') {
        Some(&rest[..close])
    } else {
        None
    }
}

/// Required query parameters of an `x-ms-paths` template, e.g.
/// `/{blob}?comp=list`. Each key must be present with exactly that value.
pub struct QueryConstraint {
    schema: Value,
    validator: jsonschema::Validator,
}

impl fmt::Debug for QueryConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryConstraint")
            .field("schema", &self.schema)
            .finish()
    }
}

impl QueryConstraint {
    fn from_query(template: &str, query: &str) -> TransformResult<Self> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let key = key.to_lowercase();
            properties.insert(key.clone(), json!({"enum": [value.to_lowercase()]}));
            required.push(Value::String(key));
        }
        let schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
        let validator =
            jsonschema::draft7::new(&schema).map_err(|e| TransformError::QueryConstraint {
                template: template.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { schema, validator })
    }

    /// Checks a lowercased request query object.
    pub fn is_satisfied(&self, query: &Value) -> bool {
        self.validator.is_valid(query)
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }
}

/// Compiles the path matcher of every path in a document.
pub struct PathRegexTransform;

impl SpecTransform for PathRegexTransform {
    fn name(&self) -> &'static str {
        "path-regex"
    }

    fn apply(
        &self,
        spec: &mut SpecDocument,
        _arena: &mut SchemaArena,
        ctx: &mut TransformContext,
    ) -> TransformResult<()> {
        let host_params: HashSet<String> = spec
            .host_parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Path)
            .map(|p| p.name.clone())
            .collect();

        for path in &mut spec.paths {
            let mut declared = host_params.clone();
            let parameters = path
                .parameters
                .iter()
                .chain(path.operations.iter().flat_map(|op| op.parameters.iter()));
            declared.extend(
                parameters
                    .filter(|p| p.location == ParameterLocation::Path)
                    .map(|p| p.name.clone()),
            );

            let regex = PathRegex::build(
                spec.host_template.as_deref(),
                &spec.base_path,
                &path.template,
                &declared,
                ctx.options.is_path_case_sensitive,
            )?;
            if !regex.unbound_parameters().is_empty() {
                tracing::warn!(
                    spec = %spec.id,
                    template = %path.template,
                    parameters = ?regex.unbound_parameters(),
                    "Declared path parameters have no capture group in the template"
                );
            }
            path.regex = Some(Arc::new(regex));
        }
        Ok(())
    }
}

//! Routable operations and their lazily compiled validators.

use std::{collections::HashMap, sync::Arc};

use http::Method;
use serde_json::{Map, Value};

use crate::{
    compiler::{CompileError, CompileSlot, Compiler, Program},
    swagger::{OperationDef, ParameterDef, ParameterLocation, ResponseDef, SchemaSource, SchemaType, SpecDocument},
    transform::PathRegex,
};

/// Content type assumed when an operation and its document declare none.
const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// Conversion applied to a wire string before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Number,
    Boolean,
}

impl Coercion {
    fn for_type(wire_type: Option<SchemaType>) -> Option<Self> {
        match wire_type? {
            SchemaType::Number | SchemaType::Integer => Some(Self::Number),
            SchemaType::Boolean => Some(Self::Boolean),
            _ => None,
        }
    }

    /// Converts `raw`, leaving it a string when it does not parse.
    pub fn apply(self, raw: &str) -> Value {
        match self {
            Self::Number => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(|n| {
                    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                        Value::from(n as i64)
                    } else {
                        Value::from(n)
                    }
                })
                .unwrap_or_else(|| Value::from(raw)),
            Self::Boolean => match raw.to_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::from(raw),
            },
        }
    }
}

/// Applies coercions in place to string values and to arrays of strings.
pub fn coerce_map(map: &mut Map<String, Value>, coercions: &HashMap<String, Coercion>) {
    for (key, coercion) in coercions {
        let Some(value) = map.get_mut(key) else { continue };
        match value {
            Value::String(raw) => *value = coercion.apply(raw),
            Value::Array(items) => {
                for item in items.iter_mut() {
                    if let Value::String(raw) = item {
                        *item = coercion.apply(raw);
                    }
                }
            }
            _ => {}
        }
    }
}

/// One declared response of an operation.
#[derive(Debug)]
pub struct Response {
    pub def: ResponseDef,
    pub header_coercions: HashMap<String, Coercion>,
    slot: CompileSlot,
}

impl Response {
    fn new(def: ResponseDef) -> Self {
        let header_coercions = def
            .headers
            .iter()
            .filter_map(|h| Coercion::for_type(h.wire_type).map(|c| (h.name.to_lowercase(), c)))
            .collect();
        Self {
            def,
            header_coercions,
            slot: CompileSlot::new(),
        }
    }

    pub fn status(&self) -> &str {
        &self.def.status
    }

    pub fn has_schema(&self) -> bool {
        self.def.schema.is_some()
    }

    pub fn slot(&self) -> &CompileSlot {
        &self.slot
    }
}

/// An operation indexed by the router.
#[derive(Debug)]
pub struct Operation {
    pub operation_id: String,
    pub method: Method,
    pub template: String,
    /// Id of the document that declares the operation.
    pub spec_id: Arc<str>,
    /// Declared document version, lowercased.
    pub api_version: String,
    pub provider_hint: Option<String>,
    pub regex: Arc<PathRegex>,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    pub long_running: bool,
    pub parameters: Vec<ParameterDef>,
    pub source: SchemaSource,
    pub responses: Vec<Response>,
    pub query_coercions: HashMap<String, Coercion>,
    pub header_coercions: HashMap<String, Coercion>,
    pub path_coercions: HashMap<String, Coercion>,
    /// A body parameter exists and is optional.
    pub optional_body: bool,
    request_slot: CompileSlot,
}

impl Operation {
    /// Builds the runtime form of `def` declared under `template`.
    pub fn new(spec: &SpecDocument, template: &str, regex: Arc<PathRegex>, def: &OperationDef) -> Self {
        let mut query_coercions = HashMap::new();
        let mut header_coercions = HashMap::new();
        let mut path_coercions = HashMap::new();
        for parameter in &def.parameters {
            let Some(coercion) = Coercion::for_type(parameter.wire_type) else {
                continue;
            };
            match parameter.location {
                ParameterLocation::Query => {
                    query_coercions.insert(parameter.name.clone(), coercion);
                }
                ParameterLocation::Header => {
                    header_coercions.insert(parameter.name.to_lowercase(), coercion);
                }
                ParameterLocation::Path => {
                    path_coercions.insert(parameter.name.clone(), coercion);
                }
                ParameterLocation::Body | ParameterLocation::FormData => {}
            }
        }

        let media_types = |own: &Option<Vec<String>>, document: &[String]| -> Vec<String> {
            match own {
                Some(own) => own.clone(),
                None if !document.is_empty() => document.to_vec(),
                None => vec![DEFAULT_MEDIA_TYPE.to_string()],
            }
        };

        Self {
            operation_id: def.operation_id.clone(),
            method: def.method.clone(),
            template: template.to_string(),
            spec_id: spec.id.clone(),
            api_version: spec
                .version
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_else(|| super::UNKNOWN_API_VERSION.to_string()),
            provider_hint: spec.provider_hint.clone(),
            regex,
            consumes: media_types(&def.consumes, &spec.consumes),
            produces: media_types(&def.produces, &spec.produces),
            long_running: def.long_running,
            optional_body: def
                .parameters
                .iter()
                .any(|p| p.location == ParameterLocation::Body && !p.required),
            parameters: def.parameters.clone(),
            source: def.source.clone(),
            responses: def.responses.iter().cloned().map(Response::new).collect(),
            query_coercions,
            header_coercions,
            path_coercions,
            request_slot: CompileSlot::new(),
        }
    }

    pub fn response(&self, status: &str) -> Option<&Response> {
        self.responses.iter().find(|r| r.def.status == status)
    }

    pub fn request_slot(&self) -> &CompileSlot {
        &self.request_slot
    }

    /// The request validator, compiled on first use.
    pub async fn request_program(&self, compiler: &Compiler) -> Result<Arc<Program>, CompileError> {
        self.request_slot
            .get_or_compile("request", || compiler.compile_request(&self.parameters, &self.source))
            .await
    }

    /// The validator of one declared response, compiled on first use.
    pub async fn response_program(
        &self,
        response: &Response,
        compiler: &Compiler,
    ) -> Result<Arc<Program>, CompileError> {
        response
            .slot
            .get_or_compile("response", || compiler.compile_response(&response.def, &self.source))
            .await
    }

    /// Compiles the request validator and every response validator.
    /// Failures stay cached in their slots and surface on use.
    pub async fn precompile(&self, compiler: &Compiler) -> usize {
        let mut failures = usize::from(self.request_program(compiler).await.is_err());
        for response in &self.responses {
            failures += usize::from(self.response_program(response, compiler).await.is_err());
        }
        failures
    }
}

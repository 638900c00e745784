//! Lowers transformed schemas into executable validator programs.
//!
//! Each operation gets one request program and one program per declared
//! response. Programs are compiled lazily on first use (see [`CompileSlot`])
//! and shared afterwards.

mod formats;
mod program;
mod slot;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

pub use program::{Direction, PathSegment, Program, ValidationContext, Violation};
use program::{AdditionalRule, Check, Dispatch, DispatchEntry, Node, NodeId};
use regex::Regex;
pub use slot::{CompileSlot, SlotState};
use thiserror::Error;

use self::formats::Format;
use crate::swagger::{
    AdditionalProperties, Mutability, ParameterDef, ParameterLocation, ResponseDef, SchemaArena,
    SchemaId, SchemaSource, SchemaType, escape_pointer_token,
};

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("Invalid x-ms-mutability value at {location}: must contain create, read or update")]
    InvalidMutability { location: String },

    #[error("Not supported parameter in: formData ({name} at {location})")]
    UnsupportedParameter { name: String, location: String },

    #[error("Discriminator property is absent on {location}")]
    MissingDiscriminator { location: String },
}

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompilerOptions {
    /// Enables Azure resource checks (`x-ms-azure-resource`).
    pub is_arm_call: bool,
}

/// Compiles request and response programs against one transformed arena.
#[derive(Debug, Clone)]
pub struct Compiler {
    arena: Arc<SchemaArena>,
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(arena: Arc<SchemaArena>, options: CompilerOptions) -> Self {
        Self { arena, options }
    }

    pub fn arena(&self) -> &SchemaArena {
        &self.arena
    }

    /// Builds the program for `{query, headers, path, body}` of a request.
    pub fn compile_request(
        &self,
        parameters: &[ParameterDef],
        operation: &SchemaSource,
    ) -> CompileResult<Program> {
        let mut builder = Builder::new(&self.arena, self.options);
        let mut query = Envelope::default();
        let mut headers = Envelope::default();
        let mut path = Envelope::default();
        let mut body = None;

        for parameter in parameters {
            match parameter.location {
                ParameterLocation::Body => {
                    body = Some((builder.schema(parameter.schema)?, parameter.required));
                }
                ParameterLocation::Header => {
                    let name = parameter.name.to_lowercase();
                    let node = builder.schema(parameter.schema)?;
                    headers.add(name, node, parameter.required);
                }
                ParameterLocation::Query => {
                    if parameter.name == "api-version" && parameter.is_plain_string {
                        continue;
                    }
                    let node = builder.schema(parameter.schema)?;
                    query.add(parameter.name.clone(), node, parameter.required);
                }
                ParameterLocation::Path => {
                    if parameter.is_plain_string {
                        continue;
                    }
                    let node = builder.schema(parameter.schema)?;
                    path.add(parameter.name.clone(), node, true);
                }
                ParameterLocation::FormData => {
                    return Err(CompileError::UnsupportedParameter {
                        name: parameter.name.clone(),
                        location: operation.reference(),
                    });
                }
            }
        }

        let mut root = Envelope::default();
        root.add("query".into(), query.build(&mut builder, operation), false);
        root.add("headers".into(), headers.build(&mut builder, operation), false);
        root.add("path".into(), path.build(&mut builder, operation), false);
        if let Some((node, required)) = body {
            root.add("body".into(), node, required);
        }
        let root = root.build(&mut builder, operation);
        Ok(builder.finish(root))
    }

    /// Builds the program for `{headers, body}` of one declared response.
    pub fn compile_response(
        &self,
        response: &ResponseDef,
        operation: &SchemaSource,
    ) -> CompileResult<Program> {
        let source = SchemaSource::new(
            operation.url.clone(),
            format!(
                "{}/responses/{}",
                operation.pointer,
                escape_pointer_token(&response.status)
            ),
        );
        let mut builder = Builder::new(&self.arena, self.options);

        let mut headers = Envelope::default();
        for header in &response.headers {
            let node = builder.schema(header.schema)?;
            headers.add(header.name.to_lowercase(), node, true);
        }

        let mut root = Envelope::default();
        root.add("headers".into(), headers.build(&mut builder, &source), false);
        if let Some(schema) = response.schema.filter(|_| !response.is_file) {
            root.add("body".into(), builder.schema(schema)?, true);
        }
        let root = root.build(&mut builder, &source);
        Ok(builder.finish(root))
    }
}

/// A synthetic object node that groups parameters or headers.
#[derive(Default)]
struct Envelope {
    properties: Vec<(String, NodeId)>,
    required: Vec<String>,
}

impl Envelope {
    fn add(&mut self, name: String, node: NodeId, required: bool) {
        if required && !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        match self.properties.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = node,
            None => self.properties.push((name, node)),
        }
    }

    fn build(self, builder: &mut Builder<'_>, source: &SchemaSource) -> NodeId {
        let mut node = Node::new(source.clone());
        if !self.properties.is_empty() {
            node.checks.push(Check::Properties(self.properties));
        }
        if !self.required.is_empty() {
            node.checks.push(Check::Required {
                names: self.required,
                unread: HashSet::new(),
            });
        }
        builder.push(node)
    }
}

struct Builder<'a> {
    arena: &'a SchemaArena,
    options: CompilerOptions,
    nodes: Vec<Node>,
    memo: HashMap<SchemaId, NodeId>,
}

impl<'a> Builder<'a> {
    fn new(arena: &'a SchemaArena, options: CompilerOptions) -> Self {
        Self {
            arena,
            options,
            nodes: Vec::new(),
            memo: HashMap::new(),
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn finish(self, root: NodeId) -> Program {
        Program::new(self.nodes, root)
    }

    fn schema(&mut self, id: SchemaId) -> CompileResult<NodeId> {
        if let Some(&node_id) = self.memo.get(&id) {
            return Ok(node_id);
        }
        let arena = self.arena;
        let schema = arena.get(id);
        // Reserved before descending so recursive schemas point back here.
        let node_id = self.push(Node::new(schema.source.clone()));
        self.memo.insert(id, node_id);

        let mut checks = Vec::new();

        if let Some(target) = schema.reference {
            checks.push(Check::Ref(self.schema(target)?));
        }
        if let Some(schema_type) = schema.schema_type {
            checks.push(Check::Type(schema_type));
        }
        if let Some(values) = &schema.enum_values {
            checks.push(Check::Enum {
                values: values.clone(),
                model_as_string: schema.enum_model_as_string,
            });
        }
        if let Some(format) = schema.format.as_deref().and_then(Format::parse) {
            checks.push(Check::Format(format));
        }
        if let Some(pattern) = &schema.pattern {
            match Regex::new(pattern) {
                Ok(regex) => checks.push(Check::Pattern(regex)),
                Err(error) => tracing::warn!(
                    pattern = %pattern,
                    location = %schema.source.reference(),
                    error = %error,
                    "Skipping pattern that does not compile"
                ),
            }
        }
        if let Some(limit) = schema.minimum {
            checks.push(Check::Minimum {
                limit,
                exclusive: schema.exclusive_minimum,
            });
        }
        if let Some(limit) = schema.maximum {
            checks.push(Check::Maximum {
                limit,
                exclusive: schema.exclusive_maximum,
            });
        }
        if let Some(divisor) = schema.multiple_of.filter(|d| *d > 0.0) {
            checks.push(Check::MultipleOf(divisor));
        }
        checks.extend(schema.min_length.map(Check::MinLength));
        checks.extend(schema.max_length.map(Check::MaxLength));
        checks.extend(schema.min_items.map(Check::MinItems));
        checks.extend(schema.max_items.map(Check::MaxItems));
        if schema.unique_items {
            checks.push(Check::UniqueItems);
        }
        checks.extend(schema.min_properties.map(Check::MinProperties));
        checks.extend(schema.max_properties.map(Check::MaxProperties));

        if let Some(properties) = &schema.properties {
            let mut compiled = Vec::with_capacity(properties.len());
            for (name, child) in properties {
                compiled.push((name.clone(), self.schema(*child)?));
            }
            if !compiled.is_empty() {
                checks.push(Check::Properties(compiled));
            }
        }

        if !schema.required.is_empty() {
            let unread = schema
                .required
                .iter()
                .filter(|name| {
                    schema
                        .properties
                        .as_ref()
                        .and_then(|p| p.get(*name))
                        .map(|child| arena.get(*child))
                        .is_some_and(|child| !child.readable() || child.secret)
                })
                .cloned()
                .collect();
            checks.push(Check::Required {
                names: schema.required.clone(),
                unread,
            });
        }

        let known = || -> HashSet<String> {
            schema
                .properties
                .as_ref()
                .map(|p| p.keys().cloned().collect())
                .unwrap_or_default()
        };
        match schema.additional_properties {
            AdditionalProperties::Allowed(false) => checks.push(Check::AdditionalProperties {
                known: known(),
                rule: AdditionalRule::Deny,
            }),
            AdditionalProperties::Schema(child) => {
                let rule = AdditionalRule::Schema(self.schema(child)?);
                checks.push(Check::AdditionalProperties {
                    known: known(),
                    rule,
                });
            }
            AdditionalProperties::Allowed(true) | AdditionalProperties::Unset => {}
        }

        if let Some(items) = schema.items {
            checks.push(Check::Items(self.schema(items)?));
        }
        if let Some(members) = &schema.all_of {
            checks.push(Check::AllOf(self.schemas(members)?));
        }
        if let Some(branches) = &schema.any_of {
            checks.push(Check::AnyOf(self.schemas(branches)?));
        }
        if let Some(branches) = &schema.one_of {
            checks.push(Check::OneOf(self.schemas(branches)?));
        }
        if let Some(map) = &schema.discriminator_map {
            checks.push(Check::Discriminator(self.dispatch(id, map)?));
        }

        match &schema.mutability {
            Some(mutability) => {
                let in_request =
                    mutability.contains(&Mutability::Create) || mutability.contains(&Mutability::Update);
                let in_response = mutability.contains(&Mutability::Read);
                if !in_request && !in_response {
                    return Err(CompileError::InvalidMutability {
                        location: schema.source.reference(),
                    });
                }
                if !(in_request && in_response) {
                    checks.push(Check::Mutability {
                        in_request,
                        in_response,
                    });
                }
            }
            None if schema.read_only => checks.push(Check::ReadOnly),
            None => {}
        }
        if schema.secret {
            checks.push(Check::Secret);
        }
        if self.options.is_arm_call && schema.azure_resource {
            checks.push(Check::AzureResource);
        }

        let node = &mut self.nodes[node_id];
        node.checks = checks;
        node.nullable = schema.nullable;
        node.skip_error = schema.skip_error;
        node.readable = schema.readable();
        node.secret = schema.secret;
        node.query_array = schema.parameter_in == Some(ParameterLocation::Query)
            && schema.schema_type == Some(SchemaType::Array);
        node.name = schema.ref_name().map(str::to_string);
        Ok(node_id)
    }

    fn schemas(&mut self, ids: &[SchemaId]) -> CompileResult<Vec<NodeId>> {
        ids.iter().map(|id| self.schema(*id)).collect()
    }

    fn dispatch(
        &mut self,
        root: SchemaId,
        map: &BTreeMap<String, Option<SchemaId>>,
    ) -> CompileResult<Dispatch> {
        let arena = self.arena;
        let schema = arena.get(root);
        let property = schema
            .discriminator
            .clone()
            .ok_or_else(|| CompileError::MissingDiscriminator {
                location: schema.source.reference(),
            })?;
        let root_closed = schema.properties.is_some() && schema.additional_properties.is_unset();

        let mut entries = BTreeMap::new();
        for (value, target) in map {
            let node = match target {
                Some(target) => Some(self.schema(*target)?),
                None => None,
            };
            let dispatched = arena.get(target.unwrap_or(root));
            let closed = match &dispatched.properties {
                Some(properties) if root_closed && dispatched.additional_properties.is_unset() => {
                    Some(properties.keys().cloned().collect())
                }
                _ => None,
            };
            entries.insert(
                value.clone(),
                DispatchEntry {
                    target: node,
                    closed,
                },
            );
        }
        Ok(Dispatch { property, entries })
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde_json::json;

    use super::*;
    use crate::{
        swagger::{HeaderDef, Schema},
        transform::test_support::{node, reference, typed, with_properties},
        validation::IssueCode,
    };

    fn op_source() -> SchemaSource {
        SchemaSource::new("test.json", "/paths/~1pets/put")
    }

    fn body_param(schema: SchemaId, required: bool) -> ParameterDef {
        ParameterDef {
            name: "body".into(),
            location: ParameterLocation::Body,
            required,
            schema,
            wire_type: None,
            is_plain_string: false,
        }
    }

    fn simple_param(arena: &mut SchemaArena, name: &str, location: ParameterLocation, t: SchemaType) -> ParameterDef {
        let mut schema = Schema::new(SchemaSource::new("test.json", format!("/parameters/{name}")));
        schema.schema_type = Some(t);
        schema.parameter_in = Some(location);
        let id = arena.alloc(schema);
        ParameterDef {
            name: name.into(),
            location,
            required: true,
            schema: id,
            wire_type: Some(t),
            is_plain_string: false,
        }
    }

    fn codes(violations: &[Violation]) -> Vec<IssueCode> {
        violations.iter().map(|v| v.code).collect()
    }

    fn compiler(arena: SchemaArena) -> Compiler {
        Compiler::new(Arc::new(arena), CompilerOptions::default())
    }

    #[test]
    fn test_missing_required_body_property() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        let name = typed(&mut arena, "Name", SchemaType::String);
        with_properties(&mut arena, pet, &[("name", name)]);
        arena.get_mut(pet).required = vec!["name".into()];
        let body = reference(&mut arena, pet);

        let program = compiler(arena)
            .compile_request(&[body_param(body, true)], &op_source())
            .unwrap();
        let violations = program.validate(
            &json!({"query": {}, "headers": {}, "path": {}, "body": {}}),
            &ValidationContext::request(Method::PUT),
        );
        assert_eq!(codes(&violations), vec![IssueCode::ObjectMissingRequiredProperty]);
        assert_eq!(
            violations[0].path,
            vec![PathSegment::Key("body".into()), PathSegment::Key("name".into())]
        );
        assert_eq!(violations[0].schema_path, "#/required");
    }

    #[test]
    fn test_required_body_absent() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        let program = compiler(arena)
            .compile_request(&[body_param(pet, true)], &op_source())
            .unwrap();
        let violations = program.validate(
            &json!({"query": {}, "headers": {}, "path": {}}),
            &ValidationContext::request(Method::PUT),
        );
        assert_eq!(codes(&violations), vec![IssueCode::ObjectMissingRequiredProperty]);
        assert_eq!(violations[0].path, vec![PathSegment::Key("body".into())]);
    }

    #[test]
    fn test_read_only_depends_on_direction() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        let id = typed(&mut arena, "Id", SchemaType::String);
        arena.get_mut(id).read_only = true;
        with_properties(&mut arena, pet, &[("id", id)]);
        let compiler = compiler(arena);

        let request = compiler.compile_request(&[body_param(pet, false)], &op_source()).unwrap();
        let violations = request.validate(
            &json!({"body": {"id": "x"}}),
            &ValidationContext::request(Method::PUT),
        );
        assert_eq!(codes(&violations), vec![IssueCode::ReadonlyPropertyNotAllowedInRequest]);
        assert_eq!(violations[0].message, "ReadOnly property \"Id\" cannot be sent in the request");

        let response = ResponseDef {
            status: "200".into(),
            schema: Some(pet),
            is_file: false,
            headers: Vec::new(),
        };
        let program = compiler.compile_response(&response, &op_source()).unwrap();
        let violations = program.validate(
            &json!({"headers": {}, "body": {"id": "x"}}),
            &ValidationContext::response(Method::GET),
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_mutability_checks() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        let password = typed(&mut arena, "Password", SchemaType::String);
        arena.get_mut(password).mutability = Some(vec![Mutability::Create]);
        with_properties(&mut arena, pet, &[("password", password)]);
        let compiler = compiler(arena);
        let response = ResponseDef {
            status: "200".into(),
            schema: Some(pet),
            is_file: false,
            headers: Vec::new(),
        };
        let program = compiler.compile_response(&response, &op_source()).unwrap();
        let violations = program.validate(
            &json!({"headers": {}, "body": {"password": "p"}}),
            &ValidationContext::response(Method::GET),
        );
        assert_eq!(codes(&violations), vec![IssueCode::WriteonlyPropertyNotAllowedInResponse]);
    }

    #[test]
    fn test_empty_mutability_is_compile_error() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        arena.get_mut(pet).mutability = Some(Vec::new());
        let err = compiler(arena)
            .compile_request(&[body_param(pet, true)], &op_source())
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidMutability { .. }));
    }

    #[test]
    fn test_form_data_is_rejected() {
        let mut arena = SchemaArena::new();
        let param = simple_param(&mut arena, "file", ParameterLocation::FormData, SchemaType::File);
        let err = compiler(arena).compile_request(&[param], &op_source()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedParameter { .. }));
    }

    #[test]
    fn test_query_array_from_comma_separated_string() {
        let mut arena = SchemaArena::new();
        let mut param = simple_param(&mut arena, "ids", ParameterLocation::Query, SchemaType::Array);
        let item = typed(&mut arena, "Item", SchemaType::Integer);
        arena.get_mut(param.schema).items = Some(item);
        param.required = false;
        let program = compiler(arena).compile_request(&[param], &op_source()).unwrap();

        let ok = program.validate(&json!({"query": {"ids": "1,2,3"}}), &ValidationContext::request(Method::GET));
        assert!(ok.is_empty());
        let bad = program.validate(&json!({"query": {"ids": "1,x"}}), &ValidationContext::request(Method::GET));
        assert_eq!(codes(&bad), vec![IssueCode::InvalidType]);
        assert_eq!(
            bad[0].path,
            vec![
                PathSegment::Key("query".into()),
                PathSegment::Key("ids".into()),
                PathSegment::Index(1)
            ]
        );
    }

    #[test]
    fn test_plain_api_version_and_path_parameters_skipped() {
        let mut arena = SchemaArena::new();
        let mut api_version = simple_param(&mut arena, "api-version", ParameterLocation::Query, SchemaType::String);
        api_version.is_plain_string = true;
        let program = compiler(arena).compile_request(&[api_version], &op_source()).unwrap();
        let violations = program.validate(&json!({"query": {}}), &ValidationContext::request(Method::GET));
        assert!(violations.is_empty());
    }

    #[test]
    fn test_nullable_wrapper_accepts_null_without_noise() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        let tag = typed(&mut arena, "Tag", SchemaType::Object);
        let tag_ref = reference(&mut arena, tag);
        let mut null = Schema::new(SchemaSource::new("test.json", "/null"));
        null.schema_type = Some(SchemaType::Null);
        null.skip_error = true;
        let null = arena.alloc(null);
        let mut wrapper = Schema::new(SchemaSource::new("test.json", "/wrapper"));
        wrapper.any_of = Some(vec![tag_ref, null]);
        wrapper.skip_error = true;
        let wrapper = arena.alloc(wrapper);
        with_properties(&mut arena, pet, &[("tag", wrapper)]);

        let program = compiler(arena).compile_request(&[body_param(pet, true)], &op_source()).unwrap();
        let ctx = ValidationContext::request(Method::PUT);
        assert!(program.validate(&json!({"body": {"tag": null}}), &ctx).is_empty());
        let violations = program.validate(&json!({"body": {"tag": 5}}), &ctx);
        assert_eq!(codes(&violations), vec![IssueCode::InvalidType]);
    }

    #[test]
    fn test_combinator_branch_failures_nest_under_issue() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        let count = typed(&mut arena, "Count", SchemaType::Integer);
        let flag = typed(&mut arena, "Flag", SchemaType::Boolean);
        let mut size = Schema::new(SchemaSource::new("test.json", "/definitions/Pet/properties/size"));
        size.any_of = Some(vec![count, flag]);
        let size = arena.alloc(size);
        let number = typed(&mut arena, "Number", SchemaType::Number);
        let mut weight = Schema::new(SchemaSource::new("test.json", "/definitions/Pet/properties/weight"));
        weight.one_of = Some(vec![number, count]);
        let weight = arena.alloc(weight);
        with_properties(&mut arena, pet, &[("size", size), ("weight", weight)]);

        let program = compiler(arena).compile_request(&[body_param(pet, true)], &op_source()).unwrap();
        let ctx = ValidationContext::request(Method::PUT);
        assert!(program.validate(&json!({"body": {"size": true, "weight": 1.5}}), &ctx).is_empty());

        let violations = program.validate(&json!({"body": {"size": "big", "weight": 3}}), &ctx);
        assert_eq!(
            codes(&violations),
            vec![IssueCode::AnyOfMissing, IssueCode::OneOfMultiple]
        );
        assert_eq!(
            codes(&violations[0].inner),
            vec![IssueCode::InvalidType, IssueCode::InvalidType]
        );
        assert!(violations[0].inner[0].schema_path.ends_with("/anyOf/0/type"));
        assert!(violations[1].inner.is_empty());
    }

    #[test]
    fn test_discriminator_dispatch_and_closed_subtype() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        let kind = typed(&mut arena, "Kind", SchemaType::String);
        let meow = typed(&mut arena, "Meow", SchemaType::Boolean);
        with_properties(&mut arena, pet, &[("kind", kind)]);
        let cat = typed(&mut arena, "Cat", SchemaType::Object);
        with_properties(&mut arena, cat, &[("kind", kind), ("meow", meow)]);
        {
            let root = arena.get_mut(pet);
            root.discriminator = Some("kind".into());
            root.discriminator_map = Some(BTreeMap::from([
                ("Pet".to_string(), None),
                ("Cat".to_string(), Some(cat)),
            ]));
        }

        let program = compiler(arena).compile_request(&[body_param(pet, true)], &op_source()).unwrap();
        let ctx = ValidationContext::request(Method::PUT);

        assert!(program.validate(&json!({"body": {"kind": "Cat", "meow": true}}), &ctx).is_empty());

        let wrong = program.validate(&json!({"body": {"kind": "Cat", "meow": "yes"}}), &ctx);
        assert_eq!(codes(&wrong), vec![IssueCode::InvalidType]);

        let extra = program.validate(&json!({"body": {"kind": "Cat", "bark": 1}}), &ctx);
        assert_eq!(codes(&extra), vec![IssueCode::ObjectAdditionalProperties]);

        let unknown = program.validate(&json!({"body": {"kind": "Dog"}}), &ctx);
        assert_eq!(codes(&unknown), vec![IssueCode::DiscriminatorValueNotFound]);
        assert_eq!(unknown[0].message, "Discriminator value \"Dog\" not found");
        assert_eq!(
            unknown[0].path,
            vec![PathSegment::Key("body".into()), PathSegment::Key("kind".into())]
        );
    }

    #[test]
    fn test_recursive_schema_compiles_once() {
        let mut arena = SchemaArena::new();
        let tree = typed(&mut arena, "Tree", SchemaType::Object);
        let children = node(&mut arena, "Children");
        arena.get_mut(children).schema_type = Some(SchemaType::Array);
        let tree_ref = reference(&mut arena, tree);
        arena.get_mut(children).items = Some(tree_ref);
        with_properties(&mut arena, tree, &[("children", children)]);

        let program = compiler(arena).compile_request(&[body_param(tree, true)], &op_source()).unwrap();
        let violations = program.validate(
            &json!({"body": {"children": [{"children": [{"children": 1}]}]}}),
            &ValidationContext::request(Method::PUT),
        );
        assert_eq!(codes(&violations), vec![IssueCode::InvalidType]);
        assert_eq!(violations[0].path.len(), 6);
    }

    #[test]
    fn test_enum_case_and_model_as_string() {
        let mut arena = SchemaArena::new();
        let color = typed(&mut arena, "Color", SchemaType::String);
        arena.get_mut(color).enum_values = Some(vec![json!("Red"), json!("Blue")]);
        let loose = typed(&mut arena, "Loose", SchemaType::String);
        arena.get_mut(loose).enum_values = Some(vec![json!("A")]);
        arena.get_mut(loose).enum_model_as_string = true;
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        with_properties(&mut arena, pet, &[("color", color), ("loose", loose)]);

        let program = compiler(arena).compile_request(&[body_param(pet, true)], &op_source()).unwrap();
        let ctx = ValidationContext::request(Method::PUT);
        let violations = program.validate(&json!({"body": {"color": "red", "loose": "B"}}), &ctx);
        assert_eq!(codes(&violations), vec![IssueCode::EnumCaseMismatch]);
        assert_eq!(violations[0].message, "Enum does not match case for: red");
        let violations = program.validate(&json!({"body": {"color": "Green"}}), &ctx);
        assert_eq!(codes(&violations), vec![IssueCode::EnumMismatch]);
    }

    #[test]
    fn test_response_headers_required_and_lowercased() {
        let mut arena = SchemaArena::new();
        let header = typed(&mut arena, "Location", SchemaType::String);
        let response = ResponseDef {
            status: "202".into(),
            schema: None,
            is_file: false,
            headers: vec![HeaderDef {
                name: "Location".into(),
                schema: header,
                wire_type: Some(SchemaType::String),
            }],
        };
        let program = compiler(arena).compile_response(&response, &op_source()).unwrap();
        let ctx = ValidationContext::response(Method::PUT);
        let violations = program.validate(&json!({"headers": {}}), &ctx);
        assert_eq!(codes(&violations), vec![IssueCode::ObjectMissingRequiredProperty]);
        assert_eq!(
            violations[0].path,
            vec![PathSegment::Key("headers".into()), PathSegment::Key("location".into())]
        );
        assert!(program.validate(&json!({"headers": {"location": "x"}}), &ctx).is_empty());
    }

    #[test]
    fn test_secret_property_rules() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        let key = typed(&mut arena, "Key", SchemaType::String);
        arena.get_mut(key).secret = true;
        with_properties(&mut arena, pet, &[("key", key)]);
        arena.get_mut(pet).required = vec!["key".into()];
        let response = ResponseDef {
            status: "200".into(),
            schema: Some(pet),
            is_file: false,
            headers: Vec::new(),
        };
        let program = compiler(arena).compile_response(&response, &op_source()).unwrap();

        let get = program.validate(
            &json!({"headers": {}, "body": {"key": "s"}}),
            &ValidationContext::response(Method::GET),
        );
        assert_eq!(codes(&get), vec![IssueCode::SecretProperty]);

        let post = program.validate(
            &json!({"headers": {}, "body": {"key": "s"}}),
            &ValidationContext::response(Method::POST),
        );
        assert!(post.is_empty());

        // Secret properties may be omitted from responses even when required.
        let omitted = program.validate(
            &json!({"headers": {}, "body": {}}),
            &ValidationContext::response(Method::GET),
        );
        assert!(omitted.is_empty());
    }

    #[test]
    fn test_azure_resource_requires_id_in_arm_mode() {
        let mut arena = SchemaArena::new();
        let resource = typed(&mut arena, "Resource", SchemaType::Object);
        arena.get_mut(resource).azure_resource = true;
        let response = ResponseDef {
            status: "200".into(),
            schema: Some(resource),
            is_file: false,
            headers: Vec::new(),
        };
        let compiler = Compiler::new(Arc::new(arena), CompilerOptions { is_arm_call: true });
        let program = compiler.compile_response(&response, &op_source()).unwrap();
        let violations = program.validate(
            &json!({"headers": {}, "body": {"name": "a"}}),
            &ValidationContext::response(Method::GET),
        );
        assert_eq!(codes(&violations), vec![IssueCode::MissingResourceId]);
        let violations = program.validate(
            &json!({"headers": {}, "body": {"name": "a"}}),
            &ValidationContext::response(Method::DELETE),
        );
        assert!(violations.is_empty());
    }
}

use std::collections::BTreeMap;

use super::{SpecTransform, TransformContext, TransformResult};
use crate::swagger::{
    AdditionalProperties, ResponseDef, Schema, SchemaArena, SchemaId, SchemaSource, SchemaType,
    SpecDocument,
};

/// Document id of the synthesized error schemas.
pub const IMPLICIT_DEFAULT_SOURCE: &str = "implicit-default-response.json";

/// Gives operations without a `default` response the ARM error envelope
/// `{"error": {"code", "message", ...}}`.
pub struct ImplicitDefaultResponseTransform;

impl SpecTransform for ImplicitDefaultResponseTransform {
    fn name(&self) -> &'static str {
        "implicit-default-response"
    }

    fn apply(
        &self,
        spec: &mut SpecDocument,
        arena: &mut SchemaArena,
        ctx: &mut TransformContext,
    ) -> TransformResult<()> {
        if !ctx.options.model_implicit_default_response {
            return Ok(());
        }
        let wrapper = match ctx.cloud_error {
            Some(id) => id,
            None => {
                let id = cloud_error_wrapper(arena, ctx);
                ctx.cloud_error = Some(id);
                id
            }
        };

        for operation in spec.paths.iter_mut().flat_map(|p| p.operations.iter_mut()) {
            if operation.response("default").is_none() {
                operation.responses.push(ResponseDef {
                    status: "default".to_string(),
                    schema: Some(wrapper),
                    is_file: false,
                    headers: Vec::new(),
                });
            }
        }
        Ok(())
    }
}

fn definition(name: &str) -> Schema {
    let pointer = format!("/definitions/{name}");
    let mut schema = Schema::new(SchemaSource::new(IMPLICIT_DEFAULT_SOURCE, pointer.as_str()));
    schema.ref_self = Some(format!("{IMPLICIT_DEFAULT_SOURCE}#{pointer}"));
    schema
}

fn typed(parent: &str, property: &str, schema_type: SchemaType) -> Schema {
    let mut schema = definition(&format!("{parent}/properties/{property}"));
    schema.schema_type = Some(schema_type);
    schema
}

fn cloud_error_wrapper(arena: &mut SchemaArena, ctx: &mut TransformContext) -> SchemaId {
    const CLOUD_ERROR: &str = "generated.default.CloudError";
    const WRAPPER: &str = "generated.default.CloudErrorWrapper";

    let mut properties = BTreeMap::new();
    for name in ["code", "message", "target"] {
        properties.insert(name.to_string(), arena.alloc(typed(CLOUD_ERROR, name, SchemaType::String)));
    }
    for name in ["details", "additionalInfo"] {
        let mut item = typed(CLOUD_ERROR, name, SchemaType::Object);
        item.source.pointer.push_str("/items");
        let item = arena.alloc(item);
        let mut list = typed(CLOUD_ERROR, name, SchemaType::Array);
        list.items = Some(item);
        properties.insert(name.to_string(), arena.alloc(list));
    }
    properties.insert(
        "innererror".to_string(),
        arena.alloc(typed(CLOUD_ERROR, "innererror", SchemaType::Object)),
    );

    let mut cloud_error = definition(CLOUD_ERROR);
    cloud_error.schema_type = Some(SchemaType::Object);
    cloud_error.properties = Some(properties);
    cloud_error.required = vec!["code".to_string(), "message".to_string()];
    cloud_error.additional_properties = AdditionalProperties::Allowed(false);
    let cloud_error = arena.alloc(cloud_error);

    let mut error_ref = definition(&format!("{WRAPPER}/properties/error"));
    error_ref.ref_self = None;
    error_ref.reference = Some(cloud_error);
    let error_ref = arena.alloc(error_ref);

    let mut wrapper = definition(WRAPPER);
    wrapper.schema_type = Some(SchemaType::Object);
    wrapper.properties = Some(BTreeMap::from([("error".to_string(), error_ref)]));
    wrapper.additional_properties = AdditionalProperties::Allowed(false);
    let wrapper = arena.alloc(wrapper);

    let mut pending = vec![wrapper];
    while let Some(id) = pending.pop() {
        let id = arena.resolve(id);
        if ctx.collect(arena, id) {
            let schema = arena.get(id);
            pending.extend(schema.properties.iter().flat_map(|p| p.values().copied()));
            pending.extend(schema.items);
        }
    }
    wrapper
}

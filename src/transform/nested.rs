use super::{SpecTransform, TransformContext, TransformResult};
use crate::swagger::{
    AdditionalProperties, ParameterLocation, SchemaArena, SchemaId, SpecDocument,
};

/// Collects every schema reachable from a document (definitions, parameter
/// and response schemas) into the context's shape buckets so the global
/// transforms can visit them.
pub struct NestedSchemaTransform;

impl SpecTransform for NestedSchemaTransform {
    fn name(&self) -> &'static str {
        "nested-schemas"
    }

    fn apply(
        &self,
        spec: &mut SpecDocument,
        arena: &mut SchemaArena,
        ctx: &mut TransformContext,
    ) -> TransformResult<()> {
        let mut pending: Vec<SchemaId> = Vec::new();

        for path in spec.paths.iter() {
            let parameters = path
                .parameters
                .iter()
                .chain(path.operations.iter().flat_map(|op| op.parameters.iter()));
            for param in parameters {
                if param.location == ParameterLocation::Body {
                    pending.push(param.schema);
                } else if !ctx.params.contains(&param.schema) {
                    ctx.params.push(param.schema);
                }
            }
            for operation in &path.operations {
                pending.extend(operation.responses.iter().filter_map(|r| r.schema));
            }
        }
        pending.extend(spec.definitions.iter().copied());

        while let Some(id) = pending.pop() {
            visit(arena, ctx, id, &mut pending);
        }
        Ok(())
    }
}

fn visit(arena: &SchemaArena, ctx: &mut TransformContext, id: SchemaId, pending: &mut Vec<SchemaId>) {
    let schema = arena.get(id);
    if let Some(target) = schema.reference {
        pending.push(target);
        return;
    }
    if !ctx.collect(arena, id) {
        return;
    }
    if let Some(properties) = &schema.properties {
        pending.extend(properties.values().copied());
    }
    if let AdditionalProperties::Schema(extra) = schema.additional_properties {
        pending.push(extra);
    }
    pending.extend(schema.items);
    for members in [&schema.all_of, &schema.any_of, &schema.one_of].into_iter().flatten() {
        pending.extend(members.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        swagger::SchemaType,
        transform::test_support::{node, reference, typed, with_properties},
    };

    fn spec(definitions: Vec<SchemaId>) -> SpecDocument {
        SpecDocument {
            id: Arc::from("test.json"),
            title: None,
            version: None,
            host: None,
            base_path: String::new(),
            host_template: None,
            host_parameters: Vec::new(),
            consumes: Vec::new(),
            produces: Vec::new(),
            paths: Vec::new(),
            xms_paths: Vec::new(),
            definitions,
            provider_hint: None,
        }
    }

    #[test]
    fn test_collects_by_shape_once() {
        let mut arena = SchemaArena::new();
        let name = typed(&mut arena, "Name", SchemaType::String);
        let tags = typed(&mut arena, "Tags", SchemaType::Array);
        let pet = node(&mut arena, "Pet");
        let self_ref = reference(&mut arena, pet);
        with_properties(&mut arena, pet, &[("name", name), ("tags", tags), ("parent", self_ref)]);

        let mut doc = spec(vec![pet, pet]);
        let mut ctx = TransformContext::default();
        NestedSchemaTransform.apply(&mut doc, &mut arena, &mut ctx).unwrap();

        assert_eq!(ctx.obj_schemas, vec![pet]);
        assert_eq!(ctx.arr_schemas, vec![tags]);
        assert_eq!(ctx.prim_schemas, vec![name]);
    }
}

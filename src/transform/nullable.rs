use super::{GlobalTransform, TransformContext};
use crate::swagger::{
    AdditionalProperties, ParameterLocation, Schema, SchemaArena, SchemaId, SchemaType,
};

/// Lets schemas accept `null` where the contract allows it.
///
/// The marker is `x-nullable`, else `nullable`. An explicit `false` always
/// wins. Without a marker, properties outside `required` accept null, as do
/// array items and `additionalProperties` schemas. A bare reference is
/// wrapped in `anyOf [ref, {type: null}]` with both synthetic nodes
/// skip-error; an inline schema gets the nullable flag. Query parameters with
/// `allowEmptyValue` accept null as well.
pub struct NullableTransform;

impl GlobalTransform for NullableTransform {
    fn name(&self) -> &'static str {
        "nullable"
    }

    fn apply(&self, arena: &mut SchemaArena, ctx: &mut TransformContext) {
        for &id in &ctx.obj_schemas {
            let schema = arena.get(id);
            let properties: Vec<(String, SchemaId, bool)> = schema
                .properties
                .iter()
                .flatten()
                .map(|(name, child)| (name.clone(), *child, !schema.required.contains(name)))
                .collect();
            let extra = schema.additional_properties;

            for (name, child, optional) in properties {
                let replaced = make_nullable(arena, child, Some(optional));
                if replaced != child
                    && let Some(properties) = arena.get_mut(id).properties.as_mut()
                {
                    properties.insert(name, replaced);
                }
            }
            if let AdditionalProperties::Schema(child) = extra {
                let replaced = make_nullable(arena, child, None);
                arena.get_mut(id).additional_properties = AdditionalProperties::Schema(replaced);
            }
        }

        for &id in &ctx.arr_schemas {
            if let Some(items) = arena.get(id).items {
                let replaced = make_nullable(arena, items, None);
                arena.get_mut(id).items = Some(replaced);
            }
        }

        for &id in &ctx.params {
            let param = arena.get_mut(id);
            if param.parameter_in == Some(ParameterLocation::Query) && param.allow_empty_value {
                param.nullable = true;
            }
        }
    }
}

/// Returns the schema to use in place of `id`.
fn make_nullable(arena: &mut SchemaArena, id: SchemaId, default_nullable: Option<bool>) -> SchemaId {
    let marker = arena.get(arena.resolve(id)).nullable_marker;
    if marker == Some(false) || (marker.is_none() && default_nullable == Some(false)) {
        return id;
    }

    if !arena.is_reference(id) {
        arena.get_mut(id).nullable = true;
        return id;
    }

    let source = arena.get(id).source.clone();
    let mut null = Schema::new(source.clone());
    null.schema_type = Some(SchemaType::Null);
    null.skip_error = true;
    let null = arena.alloc(null);

    let mut wrapper = Schema::new(source);
    wrapper.any_of = Some(vec![id, null]);
    wrapper.skip_error = true;
    arena.alloc(wrapper)
}

use super::{GlobalTransform, TransformContext};
use crate::swagger::{SchemaArena, SchemaType};

/// `type: object` with no properties and no `additionalProperties` accepts
/// any value.
pub struct PureObjectTransform;

impl GlobalTransform for PureObjectTransform {
    fn name(&self) -> &'static str {
        "pure-object"
    }

    fn apply(&self, arena: &mut SchemaArena, ctx: &mut TransformContext) {
        for &id in &ctx.obj_schemas {
            let schema = arena.get_mut(id);
            if schema.schema_type == Some(SchemaType::Object)
                && !schema.has_properties()
                && schema.additional_properties.is_unset()
            {
                schema.schema_type = None;
            }
        }
    }
}

use super::{GlobalTransform, TransformContext};
use crate::swagger::{AdditionalProperties, SchemaArena};

/// Objects that declare properties reject unknown ones unless they say
/// otherwise. Polymorphic roots and bases stay open so subtype properties
/// pass through them.
pub struct ClosedObjectTransform;

impl GlobalTransform for ClosedObjectTransform {
    fn name(&self) -> &'static str {
        "closed-object"
    }

    fn apply(&self, arena: &mut SchemaArena, ctx: &mut TransformContext) {
        for &id in &ctx.obj_schemas {
            let schema = arena.get_mut(id);
            if schema.additional_properties.is_unset()
                && schema.discriminator.is_none()
                && !ctx.base_schemas.contains(&id)
                && schema.has_properties()
            {
                schema.additional_properties = AdditionalProperties::Allowed(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        swagger::SchemaType,
        transform::test_support::{typed, with_properties},
    };

    #[test]
    fn test_only_plain_objects_are_closed() {
        let mut arena = SchemaArena::new();
        let name = typed(&mut arena, "Name", SchemaType::String);
        let plain = typed(&mut arena, "Plain", SchemaType::Object);
        with_properties(&mut arena, plain, &[("name", name)]);
        let root = typed(&mut arena, "Root", SchemaType::Object);
        with_properties(&mut arena, root, &[("name", name)]);
        arena.get_mut(root).discriminator = Some("name".to_string());
        let base = typed(&mut arena, "Base", SchemaType::Object);
        with_properties(&mut arena, base, &[("name", name)]);
        let empty = typed(&mut arena, "Empty", SchemaType::Object);
        let open = typed(&mut arena, "Open", SchemaType::Object);
        with_properties(&mut arena, open, &[("name", name)]);
        arena.get_mut(open).additional_properties = AdditionalProperties::Allowed(true);

        let mut ctx = TransformContext::default();
        ctx.obj_schemas = vec![plain, root, base, empty, open];
        ctx.base_schemas.insert(base);
        ClosedObjectTransform.apply(&mut arena, &mut ctx);

        assert_eq!(arena.get(plain).additional_properties, AdditionalProperties::Allowed(false));
        assert!(arena.get(root).additional_properties.is_unset());
        assert!(arena.get(base).additional_properties.is_unset());
        assert!(arena.get(empty).additional_properties.is_unset());
        assert_eq!(arena.get(open).additional_properties, AdditionalProperties::Allowed(true));
    }
}

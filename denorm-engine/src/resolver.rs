//! Entity resolution against a storage view.

use denorm_core::{EntityRef, NotFound, StorageView, StoredEntity};

/// Look up `view[type][id]`.
///
/// A type with no sub-store and an id missing from an existing sub-store are
/// reported separately but mean the same thing to every caller.
pub fn resolve<'v>(
    reference: &EntityRef,
    view: &'v StorageView,
) -> Result<&'v StoredEntity, NotFound> {
    let store = view
        .type_store(&reference.entity_type)
        .ok_or_else(|| NotFound::MissingType {
            entity_type: reference.entity_type.clone(),
        })?;

    store.get(&reference.id).ok_or_else(|| NotFound::MissingId {
        entity_type: reference.entity_type.clone(),
        id: reference.id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> StorageView {
        let mut view = StorageView::new();
        view.insert(denorm_core::StoredEntity::new("a", "t"));
        view.ensure_type("empty");
        view
    }

    #[test]
    fn test_resolve_found() {
        let view = view();
        let entity = resolve(&EntityRef::new("a", "t"), &view).unwrap();
        assert_eq!(entity.id, "a");
    }

    #[test]
    fn test_resolve_missing_id() {
        let view = view();
        assert_eq!(
            resolve(&EntityRef::new("b", "t"), &view).unwrap_err(),
            NotFound::MissingId {
                entity_type: "t".to_string(),
                id: "b".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_missing_type() {
        let view = view();
        assert_eq!(
            resolve(&EntityRef::new("a", "nope"), &view).unwrap_err(),
            NotFound::MissingType {
                entity_type: "nope".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_type_present_but_empty() {
        let view = view();
        assert!(matches!(
            resolve(&EntityRef::new("a", "empty"), &view),
            Err(NotFound::MissingId { .. })
        ));
    }
}

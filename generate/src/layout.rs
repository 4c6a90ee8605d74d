//! The layout validator. Recomputes size, alignment, and field offsets for
//! every resolved struct and union under Rust `#[repr(C)]` rules and compares
//! them with the front-end report captured at resolve time. Any difference is
//! fatal; a silently wrong offset is memory corruption at runtime, not a
//! compile error.
//!
//! Leaf sizes come from the resolved units (the data model wrote them);
//! the aggregate arithmetic here is an independent implementation. Opaque
//! types are trusted as-is, since their shape *is* the report.

use crate::resolve::{Resolved, ResolvedField, ResolvedId, ResolvedKind, ResolvedType};
use cbind_core::Error;
use tracing::{debug, warn};

pub fn validate(resolved: &Resolved) -> Result<(), Error> {
    let mut checked = 0usize;
    for unit in &resolved.arena {
        match &unit.kind {
            ResolvedKind::Struct { .. } | ResolvedKind::Union { .. } => {
                if unit.size.is_none() {
                    warn!(name = %unit.name, "no front-end layout to validate against");
                    continue;
                }
                check_record(resolved, unit)?;
                checked += 1;
            }
            _ => {}
        }
    }
    debug!(records = checked, "layout validation passed");
    Ok(())
}

/// `#[repr(C)]` size and alignment of a resolved type, or `None` when a leaf
/// size is unknown.
fn size_align(resolved: &Resolved, id: ResolvedId) -> Option<(u64, u64)> {
    let unit = resolved.get(id);
    match &unit.kind {
        ResolvedKind::Primitive(_) | ResolvedKind::Pointer { .. } | ResolvedKind::Enum { .. } => {
            Some((unit.size?, unit.align?))
        }
        // Opaque shapes are not recomputed; the reported pair is the truth.
        ResolvedKind::Opaque => Some((unit.size?, unit.align?)),
        ResolvedKind::Array { elem, len } => {
            let (size, align) = size_align(resolved, *elem)?;
            Some((size * len, align))
        }
        ResolvedKind::Alias { target } => size_align(resolved, *target),
        ResolvedKind::Struct {
            fields,
            explicit_align,
        } => {
            let mut offset = 0u64;
            let mut align = explicit_align.unwrap_or(1);
            for field in fields {
                let (fs, fa) = size_align(resolved, field.ty)?;
                offset = round_up(offset, fa);
                offset += fs;
                align = align.max(fa);
            }
            Some((round_up(offset, align), align))
        }
        ResolvedKind::Union {
            fields,
            explicit_align,
        } => {
            let mut size = 0u64;
            let mut align = explicit_align.unwrap_or(1);
            for field in fields {
                let (fs, fa) = size_align(resolved, field.ty)?;
                size = size.max(fs);
                align = align.max(fa);
            }
            Some((round_up(size, align), align))
        }
        ResolvedKind::Function { .. } | ResolvedKind::Pending => None,
    }
}

fn check_record(resolved: &Resolved, unit: &ResolvedType) -> Result<(), Error> {
    let (fields, explicit_align, is_union) = match &unit.kind {
        ResolvedKind::Struct {
            fields,
            explicit_align,
        } => (fields, explicit_align, false),
        ResolvedKind::Union {
            fields,
            explicit_align,
        } => (fields, explicit_align, true),
        _ => unreachable!("check_record called on a non-record unit"),
    };

    let mut offset = 0u64;
    let mut align = explicit_align.unwrap_or(1);
    let mut computable = true;
    for field in fields {
        let Some((fs, fa)) = size_align(resolved, field.ty) else {
            computable = false;
            break;
        };
        let computed_offset = if is_union { 0 } else { round_up(offset, fa) };
        check_field(unit, field, computed_offset)?;
        if is_union {
            offset = offset.max(fs);
        } else {
            offset = computed_offset + fs;
        }
        align = align.max(fa);
    }
    if !computable {
        warn!(name = %unit.name, "field size unknown, skipping layout check");
        return Ok(());
    }

    let computed_size = round_up(offset, align);
    if let Some(expected) = unit.size
        && expected != computed_size
    {
        return Err(Error::LayoutMismatch {
            type_name: unit.name.clone(),
            field: None,
            what: "size",
            expected,
            computed: computed_size,
        });
    }
    if let Some(expected) = unit.align
        && expected != align
    {
        return Err(Error::LayoutMismatch {
            type_name: unit.name.clone(),
            field: None,
            what: "alignment",
            expected,
            computed: align,
        });
    }
    Ok(())
}

fn check_field(unit: &ResolvedType, field: &ResolvedField, computed: u64) -> Result<(), Error> {
    if let Some(expected) = field.c_offset
        && expected != computed
    {
        return Err(Error::LayoutMismatch {
            type_name: unit.name.clone(),
            field: Some(field.rust_name.clone()),
            what: "offset",
            expected,
            computed,
        });
    }
    Ok(())
}

fn round_up(value: u64, to: u64) -> u64 {
    value.div_ceil(to) * to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Decl, DeclarationTree, Field, RecordKind, TypeNode};
    use crate::policy::NamePolicy;
    use cbind_core::config::Config;

    fn int_field(name: &str) -> Field {
        Field {
            name: Some(name.to_string()),
            ty: TypeNode::Primitive("int".to_string()),
            bit_width: None,
        }
    }

    fn resolve_tree(tree: &mut DeclarationTree) -> Resolved {
        crate::abi::compute_layouts(tree).unwrap();
        let config = Config::mock();
        let policy = NamePolicy::from_config(&config).unwrap();
        crate::resolve::resolve(tree, &config, &policy).unwrap()
    }

    #[test]
    fn consistent_layout_validates() {
        let mut tree = DeclarationTree::default();
        let id = tree.intern_record_tag(RecordKind::Struct, "msg");
        tree.record_mut(id).fields = Some(vec![
            int_field("len"),
            Field {
                name: Some("payload".to_string()),
                ty: TypeNode::Pointer {
                    pointee: Box::new(TypeNode::Void),
                    is_const: false,
                },
                bit_width: None,
            },
        ]);
        tree.decls.push(Decl::Record(id));
        let resolved = resolve_tree(&mut tree);
        validate(&resolved).unwrap();
    }

    #[test]
    fn bitfield_storage_units_validate_by_container() {
        let mut tree = DeclarationTree::default();
        let id = tree.intern_record_tag(RecordKind::Struct, "F");
        tree.record_mut(id).fields = Some(vec![
            Field {
                name: Some("a".to_string()),
                ty: TypeNode::Primitive("unsigned int".to_string()),
                bit_width: Some(3),
            },
            Field {
                name: Some("b".to_string()),
                ty: TypeNode::Primitive("unsigned int".to_string()),
                bit_width: Some(5),
            },
            int_field("c"),
        ]);
        tree.decls.push(Decl::Record(id));
        let resolved = resolve_tree(&mut tree);
        validate(&resolved).unwrap();
    }

    #[test]
    fn bitfield_sharing_a_unit_with_an_ordinary_field_validates() {
        let mut tree = DeclarationTree::default();
        let id = tree.intern_record_tag(RecordKind::Struct, "mixed");
        tree.record_mut(id).fields = Some(vec![
            Field {
                name: Some("tag".to_string()),
                ty: TypeNode::Primitive("char".to_string()),
                bit_width: None,
            },
            Field {
                name: Some("flags".to_string()),
                ty: TypeNode::Primitive("unsigned int".to_string()),
                bit_width: Some(3),
            },
        ]);
        tree.decls.push(Decl::Record(id));
        let resolved = resolve_tree(&mut tree);
        validate(&resolved).unwrap();
    }

    #[test]
    fn tampered_offset_is_a_mismatch() {
        let mut tree = DeclarationTree::default();
        let id = tree.intern_record_tag(RecordKind::Struct, "pair");
        tree.record_mut(id).fields = Some(vec![int_field("a"), int_field("b")]);
        tree.decls.push(Decl::Record(id));
        let mut resolved = resolve_tree(&mut tree);
        for unit in &mut resolved.arena {
            if let ResolvedKind::Struct { fields, .. } = &mut unit.kind {
                fields[1].c_offset = Some(8);
            }
        }
        let err = validate(&resolved).unwrap_err();
        let Error::LayoutMismatch {
            type_name,
            field,
            what,
            expected,
            computed,
        } = err
        else {
            panic!("expected LayoutMismatch");
        };
        assert_eq!(type_name, "pair");
        assert_eq!(field.as_deref(), Some("b"));
        assert_eq!(what, "offset");
        assert_eq!((expected, computed), (8, 4));
    }

    #[test]
    fn tampered_size_is_a_mismatch() {
        let mut tree = DeclarationTree::default();
        let id = tree.intern_record_tag(RecordKind::Struct, "pair");
        tree.record_mut(id).fields = Some(vec![int_field("a"), int_field("b")]);
        tree.decls.push(Decl::Record(id));
        let mut resolved = resolve_tree(&mut tree);
        for unit in &mut resolved.arena {
            if matches!(unit.kind, ResolvedKind::Struct { .. }) {
                unit.size = Some(16);
            }
        }
        assert!(matches!(
            validate(&resolved),
            Err(Error::LayoutMismatch { what: "size", .. })
        ));
    }

    #[test]
    fn union_members_all_sit_at_zero() {
        let mut tree = DeclarationTree::default();
        let id = tree.intern_record_tag(RecordKind::Union, "value");
        tree.record_mut(id).fields = Some(vec![
            int_field("i"),
            Field {
                name: Some("d".to_string()),
                ty: TypeNode::Primitive("double".to_string()),
                bit_width: None,
            },
        ]);
        tree.decls.push(Decl::Record(id));
        let resolved = resolve_tree(&mut tree);
        validate(&resolved).unwrap();
    }
}

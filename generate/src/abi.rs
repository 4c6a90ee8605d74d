//! Target ABI layout rules. Computes the size, alignment, and field offset
//! report attached to every complete record in the declaration tree.
//!
//! The JSON AST dump carries no layout facts, so the parse stage derives them
//! here under the SysV x86-64 LP64 data model, including GCC-compatible
//! bit-field packing. The validator later recomputes layout independently
//! from the emitted Rust shapes and compares against this report.

use crate::ir::{
    DeclarationTree, Field, FieldOffset, RecordId, RecordKind, RecordLayout, TypeNode,
};
use cbind_core::Error;
use std::collections::HashSet;
use tracing::debug;

/// Primitive sizes and alignments for one target data model.
#[derive(Clone, Copy, Debug)]
pub struct DataModel {
    pub pointer_size: u64,
    pub pointer_align: u64,
}

impl DataModel {
    /// The LP64 model used by Linux and the BSDs on 64-bit targets.
    pub fn lp64() -> DataModel {
        DataModel {
            pointer_size: 8,
            pointer_align: 8,
        }
    }

    /// Size and alignment of a primitive by canonical spelling, or `None`
    /// when the spelling is not a known C primitive.
    pub fn primitive_size_align(&self, spelling: &str) -> Option<(u64, u64)> {
        let size = match spelling {
            "bool" | "char" | "signed char" | "unsigned char" => 1,
            "short" | "unsigned short" => 2,
            "int" | "unsigned int" | "float" => 4,
            "long" | "unsigned long" | "long long" | "unsigned long long" | "double" => 8,
            "long double" | "__int128" | "unsigned __int128" => 16,
            _ => return None,
        };
        Some((size, size))
    }
}

/// Size and alignment of a type, or `None` when it cannot be determined
/// (incomplete record, unmapped primitive). Errors only on by-value cycles,
/// which clang itself would have rejected in valid input.
pub fn size_align(
    tree: &DeclarationTree,
    model: &DataModel,
    ty: &TypeNode,
) -> Result<Option<(u64, u64)>, Error> {
    let mut in_progress = HashSet::new();
    size_align_inner(tree, model, ty, &mut in_progress)
}

fn size_align_inner(
    tree: &DeclarationTree,
    model: &DataModel,
    ty: &TypeNode,
    in_progress: &mut HashSet<RecordId>,
) -> Result<Option<(u64, u64)>, Error> {
    match ty {
        TypeNode::Void | TypeNode::Function(_) => Ok(None),
        TypeNode::Primitive(spelling) => Ok(model.primitive_size_align(spelling)),
        TypeNode::Pointer { .. } => Ok(Some((model.pointer_size, model.pointer_align))),
        TypeNode::Array { elem, len } => {
            Ok(size_align_inner(tree, model, elem, in_progress)?
                .map(|(size, align)| (size * len, align)))
        }
        TypeNode::IncompleteArray { elem } => {
            Ok(size_align_inner(tree, model, elem, in_progress)?.map(|(_, align)| (0, align)))
        }
        TypeNode::Enum(id) => Ok(model.primitive_size_align(&tree.enum_def(*id).underlying)),
        TypeNode::Typedef(id) => size_align_inner(tree, model, &tree.typedef(*id).ty, in_progress),
        TypeNode::Record(id) => {
            if let Some(layout) = &tree.record(*id).layout {
                return Ok(Some((layout.size, layout.align)));
            }
            Ok(record_layout(tree, model, *id, in_progress)?.map(|l| (l.size, l.align)))
        }
    }
}

/// Computes the layout report for one record, or `None` when a field's size
/// is undeterminable.
fn record_layout(
    tree: &DeclarationTree,
    model: &DataModel,
    id: RecordId,
    in_progress: &mut HashSet<RecordId>,
) -> Result<Option<RecordLayout>, Error> {
    let def = tree.record(id);
    let Some(fields) = &def.fields else {
        return Ok(None);
    };
    if !in_progress.insert(id) {
        return Err(Error::Parse {
            message: format!("`{}` contains itself by value", tree.record_display(id)),
            file: def.origin.clone(),
            line: None,
        });
    }
    let result = match def.kind {
        RecordKind::Struct => struct_layout(tree, model, fields, in_progress),
        RecordKind::Union => union_layout(tree, model, fields, in_progress),
    };
    in_progress.remove(&id);
    result
}

/// GCC-compatible struct packing. The running cursor is kept in bits so
/// bit-fields and ordinary fields share one placement rule: a field is
/// aligned to its type unless it is a bit-field that still fits in the
/// current storage unit.
fn struct_layout(
    tree: &DeclarationTree,
    model: &DataModel,
    fields: &[Field],
    in_progress: &mut HashSet<RecordId>,
) -> Result<Option<RecordLayout>, Error> {
    let mut bit_cursor = 0u64;
    let mut align = 1u64;
    let mut offsets = Vec::with_capacity(fields.len());
    for field in fields {
        let Some((size, field_align)) = size_align_inner(tree, model, &field.ty, in_progress)?
        else {
            return Ok(None);
        };
        match field.bit_width {
            Some(0) => {
                // Zero-width bit-field: pad to the next unit boundary of its
                // declared type without affecting the record's alignment.
                bit_cursor = round_up(bit_cursor, size * 8);
                offsets.push(FieldOffset::Bits {
                    unit_offset: bit_cursor / 8,
                    bit_offset: 0,
                    width: 0,
                    unit_size: size,
                });
            }
            Some(width) => {
                let unit_bits = size * 8;
                if bit_cursor % (field_align * 8) + u64::from(width) > unit_bits {
                    bit_cursor = round_up(bit_cursor, field_align * 8);
                }
                let unit_offset = (bit_cursor / unit_bits) * size;
                offsets.push(FieldOffset::Bits {
                    unit_offset,
                    bit_offset: (bit_cursor - unit_offset * 8) as u32,
                    width,
                    unit_size: size,
                });
                bit_cursor += u64::from(width);
                align = align.max(field_align);
            }
            None => {
                bit_cursor = round_up(bit_cursor, field_align * 8);
                offsets.push(FieldOffset::Byte(bit_cursor / 8));
                bit_cursor += size * 8;
                align = align.max(field_align);
            }
        }
    }
    let size = round_up(bit_cursor.div_ceil(8), align);
    Ok(Some(RecordLayout {
        size,
        align,
        offsets,
    }))
}

fn union_layout(
    tree: &DeclarationTree,
    model: &DataModel,
    fields: &[Field],
    in_progress: &mut HashSet<RecordId>,
) -> Result<Option<RecordLayout>, Error> {
    let mut size = 0u64;
    let mut align = 1u64;
    let mut offsets = Vec::with_capacity(fields.len());
    for field in fields {
        let Some((field_size, field_align)) =
            size_align_inner(tree, model, &field.ty, in_progress)?
        else {
            return Ok(None);
        };
        match field.bit_width {
            Some(width) => {
                offsets.push(FieldOffset::Bits {
                    unit_offset: 0,
                    bit_offset: 0,
                    width,
                    unit_size: field_size,
                });
            }
            None => offsets.push(FieldOffset::Byte(0)),
        }
        size = size.max(field_size);
        align = align.max(field_align);
    }
    Ok(Some(RecordLayout {
        size: round_up(size, align),
        align,
        offsets,
    }))
}

fn round_up(value: u64, to: u64) -> u64 {
    value.div_ceil(to) * to
}

/// Annotates every complete record in the tree with its layout report.
/// Records with undeterminable layout keep `layout: None`; whether that is
/// fatal depends on how the record is used, which the resolver decides.
pub fn compute_layouts(tree: &mut DeclarationTree) -> Result<(), Error> {
    let model = DataModel::lp64();
    for index in 0..tree.records.len() {
        let id = RecordId(index as u32);
        if tree.record(id).layout.is_some() || tree.record(id).fields.is_none() {
            continue;
        }
        let mut in_progress = HashSet::new();
        let layout = record_layout(tree, &model, id, &mut in_progress)?;
        if layout.is_none() {
            debug!(record = %tree.record_display(id), "layout undeterminable");
        }
        tree.record_mut(id).layout = layout;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_field(name: &str) -> Field {
        Field {
            name: Some(name.to_string()),
            ty: TypeNode::Primitive("int".to_string()),
            bit_width: None,
        }
    }

    fn bit_field(name: &str, width: u32) -> Field {
        Field {
            name: Some(name.to_string()),
            ty: TypeNode::Primitive("unsigned int".to_string()),
            bit_width: Some(width),
        }
    }

    fn define(tree: &mut DeclarationTree, kind: RecordKind, tag: &str, fields: Vec<Field>) -> RecordId {
        let id = tree.intern_record_tag(kind, tag);
        tree.record_mut(id).fields = Some(fields);
        id
    }

    fn layout_of(tree: &mut DeclarationTree, id: RecordId) -> RecordLayout {
        compute_layouts(tree).unwrap();
        tree.record(id).layout.clone().unwrap()
    }

    #[test]
    fn two_ints_pack_without_padding() {
        let mut tree = DeclarationTree::default();
        let id = define(
            &mut tree,
            RecordKind::Struct,
            "point",
            vec![int_field("x"), int_field("y")],
        );
        let layout = layout_of(&mut tree, id);
        assert_eq!(layout.size, 8);
        assert_eq!(layout.align, 4);
        assert_eq!(layout.offsets, vec![FieldOffset::Byte(0), FieldOffset::Byte(4)]);
    }

    #[test]
    fn tail_padding_rounds_to_alignment() {
        let mut tree = DeclarationTree::default();
        let id = define(
            &mut tree,
            RecordKind::Struct,
            "mixed",
            vec![
                Field {
                    name: Some("p".to_string()),
                    ty: TypeNode::Pointer {
                        pointee: Box::new(TypeNode::Void),
                        is_const: false,
                    },
                    bit_width: None,
                },
                Field {
                    name: Some("c".to_string()),
                    ty: TypeNode::Primitive("char".to_string()),
                    bit_width: None,
                },
            ],
        );
        let layout = layout_of(&mut tree, id);
        assert_eq!(layout.size, 16);
        assert_eq!(layout.align, 8);
        assert_eq!(layout.offsets[1], FieldOffset::Byte(8));
    }

    #[test]
    fn bitfields_share_one_storage_unit() {
        let mut tree = DeclarationTree::default();
        let id = define(
            &mut tree,
            RecordKind::Struct,
            "flags",
            vec![bit_field("ready", 1), bit_field("kind", 3), int_field("count")],
        );
        let layout = layout_of(&mut tree, id);
        assert_eq!(layout.size, 8);
        assert_eq!(
            layout.offsets,
            vec![
                FieldOffset::Bits {
                    unit_offset: 0,
                    bit_offset: 0,
                    width: 1,
                    unit_size: 4
                },
                FieldOffset::Bits {
                    unit_offset: 0,
                    bit_offset: 1,
                    width: 3,
                    unit_size: 4
                },
                FieldOffset::Byte(4),
            ]
        );
    }

    #[test]
    fn straddling_bitfield_moves_to_the_next_unit() {
        let mut tree = DeclarationTree::default();
        let id = define(
            &mut tree,
            RecordKind::Struct,
            "wide",
            vec![bit_field("a", 20), bit_field("b", 20)],
        );
        let layout = layout_of(&mut tree, id);
        assert_eq!(layout.size, 8);
        assert_eq!(
            layout.offsets[1],
            FieldOffset::Bits {
                unit_offset: 4,
                bit_offset: 0,
                width: 20,
                unit_size: 4
            }
        );
    }

    #[test]
    fn zero_width_forces_a_unit_boundary() {
        let mut tree = DeclarationTree::default();
        let id = define(
            &mut tree,
            RecordKind::Struct,
            "split",
            vec![bit_field("a", 1), bit_field("sep", 0), bit_field("b", 1)],
        );
        let layout = layout_of(&mut tree, id);
        assert_eq!(layout.size, 8);
        assert_eq!(
            layout.offsets[2],
            FieldOffset::Bits {
                unit_offset: 4,
                bit_offset: 0,
                width: 1,
                unit_size: 4
            }
        );
    }

    #[test]
    fn union_takes_the_widest_member() {
        let mut tree = DeclarationTree::default();
        let id = define(
            &mut tree,
            RecordKind::Union,
            "value",
            vec![
                int_field("i"),
                Field {
                    name: Some("d".to_string()),
                    ty: TypeNode::Primitive("double".to_string()),
                    bit_width: None,
                },
            ],
        );
        let layout = layout_of(&mut tree, id);
        assert_eq!(layout.size, 8);
        assert_eq!(layout.align, 8);
        assert_eq!(layout.offsets, vec![FieldOffset::Byte(0), FieldOffset::Byte(0)]);
    }

    #[test]
    fn flexible_array_member_adds_no_size() {
        let mut tree = DeclarationTree::default();
        let id = define(
            &mut tree,
            RecordKind::Struct,
            "packet",
            vec![
                int_field("len"),
                Field {
                    name: Some("data".to_string()),
                    ty: TypeNode::IncompleteArray {
                        elem: Box::new(TypeNode::Primitive("unsigned char".to_string())),
                    },
                    bit_width: None,
                },
            ],
        );
        let layout = layout_of(&mut tree, id);
        assert_eq!(layout.size, 4);
        assert_eq!(layout.offsets[1], FieldOffset::Byte(4));
    }

    #[test]
    fn unknown_primitive_leaves_layout_unset() {
        let mut tree = DeclarationTree::default();
        let id = define(
            &mut tree,
            RecordKind::Struct,
            "odd",
            vec![Field {
                name: Some("v".to_string()),
                ty: TypeNode::Primitive("__some_vendor_int".to_string()),
                bit_width: None,
            }],
        );
        compute_layouts(&mut tree).unwrap();
        assert!(tree.record(id).layout.is_none());
    }

    #[test]
    fn nested_struct_field_uses_inner_layout() {
        let mut tree = DeclarationTree::default();
        let inner = define(
            &mut tree,
            RecordKind::Struct,
            "inner",
            vec![int_field("a"), int_field("b")],
        );
        let outer = define(
            &mut tree,
            RecordKind::Struct,
            "outer",
            vec![
                Field {
                    name: Some("c".to_string()),
                    ty: TypeNode::Primitive("char".to_string()),
                    bit_width: None,
                },
                Field {
                    name: Some("pair".to_string()),
                    ty: TypeNode::Record(inner),
                    bit_width: None,
                },
            ],
        );
        let layout = layout_of(&mut tree, outer);
        assert_eq!(layout.size, 12);
        assert_eq!(layout.offsets[1], FieldOffset::Byte(4));
    }

    #[test]
    fn by_value_cycle_is_rejected() {
        let mut tree = DeclarationTree::default();
        let id = tree.intern_record_tag(RecordKind::Struct, "ouroboros");
        tree.record_mut(id).fields = Some(vec![Field {
            name: Some("next".to_string()),
            ty: TypeNode::Record(id),
            bit_width: None,
        }]);
        assert!(matches!(
            compute_layouts(&mut tree),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn pointer_cycles_are_fine() {
        let mut tree = DeclarationTree::default();
        let id = tree.intern_record_tag(RecordKind::Struct, "list");
        tree.record_mut(id).fields = Some(vec![
            int_field("value"),
            Field {
                name: Some("next".to_string()),
                ty: TypeNode::Pointer {
                    pointee: Box::new(TypeNode::Record(id)),
                    is_const: false,
                },
                bit_width: None,
            },
        ]);
        let layout = layout_of(&mut tree, id);
        assert_eq!(layout.size, 16);
        assert_eq!(layout.offsets, vec![FieldOffset::Byte(0), FieldOffset::Byte(8)]);
    }
}

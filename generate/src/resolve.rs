//! The type resolver: maps every C type reachable from policy-admitted
//! declarations onto a target-language shape, memoized by structural
//! identity so repeated references share one resolved unit.
//!
//! Self-referential graphs are handled by registering a placeholder in the
//! arena and memo table before any child resolution starts; a pointer back
//! into an in-flight record then hits the memo instead of recursing.

use crate::abi::DataModel;
use crate::ir::{
    Decl, DeclarationTree, EnumId, FieldOffset, FuncType, MacroConst, RecordId, RecordKind,
    TypeNode, TypedefId,
};
use crate::policy::{NameKind, NamePolicy};
use cbind_core::Error;
use cbind_core::config::{Config, VariadicPolicy};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResolvedId(pub u32);

/// One resolved type in the arena. Named kinds (structs, unions, enums,
/// aliases, opaques) become top-level items; the rest are spelled inline at
/// their point of use.
#[derive(Clone, Debug)]
pub struct ResolvedType {
    /// Rust identifier for named kinds; empty for inline shapes.
    pub name: String,
    /// Original C spelling (`struct cn_msg`, `typedef size_t`) for
    /// provenance comments; empty for inline shapes.
    pub c_name: String,
    pub kind: ResolvedKind,
    /// Expected byte size; from the front-end report for records, from the
    /// data model for leaves. `None` when undeterminable.
    pub size: Option<u64>,
    pub align: Option<u64>,
}

#[derive(Clone, Debug)]
pub enum ResolvedKind {
    /// Target path such as `::core::ffi::c_int` or `f64`.
    Primitive(String),
    Pointer {
        pointee: ResolvedId,
        is_const: bool,
    },
    Array {
        elem: ResolvedId,
        len: u64,
    },
    Struct {
        fields: Vec<ResolvedField>,
        /// Set when bit-field storage units erase the natural alignment and
        /// the emitted type needs `#[repr(C, align(n))]`.
        explicit_align: Option<u64>,
    },
    Union {
        fields: Vec<ResolvedField>,
        explicit_align: Option<u64>,
    },
    Enum {
        /// Target path of the underlying integer.
        underlying: String,
        constants: Vec<(String, i64)>,
    },
    /// `pub type name = target;`
    Alias {
        target: ResolvedId,
    },
    /// A type referenced but not translated: policy-denied or incomplete.
    Opaque,
    /// Function shape, only reachable behind a pointer.
    Function {
        params: Vec<ResolvedId>,
        ret: Option<ResolvedId>,
    },
    /// Transient placeholder while a unit's children resolve. Never present
    /// in the finished arena.
    Pending,
}

#[derive(Clone, Debug)]
pub struct ResolvedField {
    pub rust_name: String,
    pub ty: ResolvedId,
    /// Expected byte offset from the front-end report (run start for
    /// bit-field storage units). `None` when the report is unavailable.
    pub c_offset: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct ResolvedFunc {
    pub rust_name: String,
    pub link_name: Option<String>,
    pub c_name: String,
    pub params: Vec<(String, ResolvedId)>,
    pub ret: Option<ResolvedId>,
}

#[derive(Clone, Debug)]
pub struct ResolvedStatic {
    pub rust_name: String,
    pub link_name: Option<String>,
    pub c_name: String,
    pub ty: ResolvedId,
}

/// One renderable declaration, consumed exactly once by the emitter.
#[derive(Clone, Debug)]
pub enum EmissionUnit {
    /// A named type item; the emitter walks value edges from here.
    Type(ResolvedId),
    Function(ResolvedFunc),
    Static(ResolvedStatic),
    Constant {
        name: String,
        /// Target path of the constant's type.
        ty: String,
        value: i128,
    },
}

/// Output of the resolution stage.
#[derive(Debug, Default)]
pub struct Resolved {
    pub arena: Vec<ResolvedType>,
    pub units: Vec<EmissionUnit>,
}

impl Resolved {
    pub fn get(&self, id: ResolvedId) -> &ResolvedType {
        &self.arena[id.0 as usize]
    }
}

pub fn resolve(
    tree: &DeclarationTree,
    config: &Config,
    policy: &NamePolicy,
) -> Result<Resolved, Error> {
    let mut resolver = Resolver {
        tree,
        config,
        policy,
        model: DataModel::lp64(),
        primitives: config.primitive_table(),
        arena: Vec::new(),
        memo: HashMap::new(),
        units: Vec::new(),
        context: Vec::new(),
    };
    resolver.run()?;
    debug_assert!(
        !resolver
            .arena
            .iter()
            .any(|t| matches!(t.kind, ResolvedKind::Pending)),
        "placeholder survived resolution"
    );
    Ok(Resolved {
        arena: resolver.arena,
        units: resolver.units,
    })
}

struct Resolver<'a> {
    tree: &'a DeclarationTree,
    config: &'a Config,
    policy: &'a NamePolicy,
    model: DataModel,
    primitives: BTreeMap<String, String>,
    arena: Vec<ResolvedType>,
    memo: HashMap<TypeNode, ResolvedId>,
    units: Vec<EmissionUnit>,
    /// Declaration names enclosing the current resolution, for error context.
    context: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn run(&mut self) -> Result<(), Error> {
        for decl in &self.tree.decls {
            match decl {
                Decl::Record(id) => self.top_record(*id)?,
                Decl::Enum(id) => self.top_enum(*id)?,
                Decl::Typedef(id) => self.top_typedef(*id)?,
                Decl::Function(func) => self.top_function(func)?,
                Decl::Var(var) => self.top_var(var)?,
                Decl::Constant(c) => self.top_constant(c),
            }
        }
        Ok(())
    }

    fn top_record(&mut self, id: RecordId) -> Result<(), Error> {
        let def = self.tree.record(id);
        let label = def.tag.clone().unwrap_or_else(|| def.base_name.clone());
        // A top-level anonymous record no typedef adopted declares nothing
        // usable; skip it entirely.
        if def.tag.is_none() && is_synthesized(&def.base_name) {
            return Ok(());
        }
        if !self.policy.admits(&label, def.origin.as_deref()) {
            debug!(name = %label, "record dropped by policy");
            return Ok(());
        }
        let rid = self.resolve_record(id)?;
        self.units.push(EmissionUnit::Type(rid));
        Ok(())
    }

    fn top_enum(&mut self, id: EnumId) -> Result<(), Error> {
        let def = self.tree.enum_def(id);
        let label = def.tag.clone().unwrap_or_else(|| def.base_name.clone());
        if def.tag.is_none() && is_synthesized(&def.base_name) {
            // Anonymous enums surface as bare constants of the underlying
            // type, with no type item.
            let underlying = self.primitive_path(&def.underlying, &label)?;
            for constant in &def.constants {
                if !self.policy.admits(&constant.name, def.origin.as_deref()) {
                    continue;
                }
                let name = self.policy.rename(&constant.name, NameKind::Constant).rust;
                self.units.push(EmissionUnit::Constant {
                    name,
                    ty: underlying.clone(),
                    value: i128::from(constant.value),
                });
            }
            return Ok(());
        }
        if !self.policy.admits(&label, def.origin.as_deref()) {
            debug!(name = %label, "enum dropped by policy");
            return Ok(());
        }
        let rid = self.resolve_enum(id)?;
        self.units.push(EmissionUnit::Type(rid));
        Ok(())
    }

    fn top_typedef(&mut self, id: TypedefId) -> Result<(), Error> {
        let def = self.tree.typedef(id);
        if !self.policy.admits(&def.name, def.origin.as_deref()) {
            debug!(name = %def.name, "typedef dropped by policy");
            return Ok(());
        }
        let rid = self.resolve_typedef(id)?;
        self.units.push(EmissionUnit::Type(rid));
        Ok(())
    }

    fn top_function(&mut self, func: &crate::ir::FuncDecl) -> Result<(), Error> {
        if !self.policy.admits(&func.name, func.origin.as_deref()) {
            debug!(name = %func.name, "function dropped by policy");
            return Ok(());
        }
        self.context.push(func.name.clone());
        let (param_types, ret) = self.resolve_signature(&func.ty)?;
        self.context.pop();
        let mut params = Vec::with_capacity(param_types.len());
        for (index, ty) in param_types.into_iter().enumerate() {
            let name = match func.param_names.get(index).and_then(|n| n.as_deref()) {
                Some(n) => self.policy.rename(n, NameKind::Value).rust,
                None => format!("arg{index}"),
            };
            params.push((name, ty));
        }
        let renamed = self.policy.rename(&func.name, NameKind::Value);
        trace!(c = %func.name, rust = %renamed.rust, "resolved function");
        self.units.push(EmissionUnit::Function(ResolvedFunc {
            rust_name: renamed.rust,
            link_name: renamed.link_name,
            c_name: func.name.clone(),
            params,
            ret,
        }));
        Ok(())
    }

    fn top_var(&mut self, var: &crate::ir::VarDecl) -> Result<(), Error> {
        if !self.policy.admits(&var.name, var.origin.as_deref()) {
            return Ok(());
        }
        self.context.push(var.name.clone());
        let ty = self.resolve_type(&var.ty)?;
        self.context.pop();
        let renamed = self.policy.rename(&var.name, NameKind::Value);
        self.units.push(EmissionUnit::Static(ResolvedStatic {
            rust_name: renamed.rust,
            link_name: renamed.link_name,
            c_name: var.name.clone(),
            ty,
        }));
        Ok(())
    }

    fn top_constant(&mut self, c: &MacroConst) {
        if !self.policy.admits(&c.name, None) {
            return;
        }
        let name = self.policy.rename(&c.name, NameKind::Constant).rust;
        self.units.push(EmissionUnit::Constant {
            name,
            ty: macro_const_type(c.value).to_string(),
            value: c.value,
        });
    }

    fn push(&mut self, unit: ResolvedType) -> ResolvedId {
        let id = ResolvedId(self.arena.len() as u32);
        self.arena.push(unit);
        id
    }

    fn needed_by(&self) -> String {
        self.context
            .last()
            .cloned()
            .unwrap_or_else(|| "<top level>".to_string())
    }

    fn primitive_path(&self, spelling: &str, needed_by: &str) -> Result<String, Error> {
        self.primitives
            .get(spelling)
            .cloned()
            .ok_or_else(|| Error::UnknownPrimitive {
                spelling: spelling.to_string(),
                needed_by: needed_by.to_string(),
            })
    }

    fn primitive_unit(&mut self, spelling: &str) -> Result<ResolvedId, Error> {
        let key = TypeNode::Primitive(spelling.to_string());
        if let Some(&id) = self.memo.get(&key) {
            return Ok(id);
        }
        let path = self.primitive_path(spelling, &self.needed_by())?;
        let (size, align) = match self.model.primitive_size_align(spelling) {
            Some((s, a)) => (Some(s), Some(a)),
            None => (None, None),
        };
        let id = self.push(ResolvedType {
            name: String::new(),
            c_name: String::new(),
            kind: ResolvedKind::Primitive(path),
            size,
            align,
        });
        self.memo.insert(key, id);
        Ok(id)
    }

    /// A bare target-path unit outside the C primitive table, for
    /// synthesized shapes (bit-field storage bytes, capped variadic slots).
    fn raw_unit(&mut self, path: &str, size: u64, align: u64) -> ResolvedId {
        let key = TypeNode::Primitive(format!("${path}"));
        if let Some(&id) = self.memo.get(&key) {
            return id;
        }
        let id = self.push(ResolvedType {
            name: String::new(),
            c_name: String::new(),
            kind: ResolvedKind::Primitive(path.to_string()),
            size: Some(size),
            align: Some(align),
        });
        self.memo.insert(key, id);
        id
    }

    fn void_pointee(&mut self) -> ResolvedId {
        let path = if self.config.use_core_types_only {
            "::core::ffi::c_void"
        } else {
            "libc::c_void"
        };
        self.raw_unit(path, 0, 1)
    }

    fn resolve_type(&mut self, ty: &TypeNode) -> Result<ResolvedId, Error> {
        if let Some(&id) = self.memo.get(ty) {
            return Ok(id);
        }
        let id = match ty {
            TypeNode::Void => self.void_pointee(),
            TypeNode::Primitive(spelling) => self.primitive_unit(spelling)?,
            TypeNode::Pointer { pointee, is_const } => {
                // Reserve the pointer's slot first so pointee resolution can
                // safely loop back through the memo.
                let id = self.push(ResolvedType {
                    name: String::new(),
                    c_name: String::new(),
                    kind: ResolvedKind::Pending,
                    size: Some(self.model.pointer_size),
                    align: Some(self.model.pointer_align),
                });
                self.memo.insert(ty.clone(), id);
                let target = self.resolve_type(pointee)?;
                self.arena[id.0 as usize].kind = ResolvedKind::Pointer {
                    pointee: target,
                    is_const: *is_const,
                };
                return Ok(id);
            }
            TypeNode::Array { elem, len } => {
                let elem_id = self.resolve_type(elem)?;
                let elem_unit = self.get(elem_id);
                let (size, align) = (elem_unit.size.map(|s| s * len), elem_unit.align);
                let id = self.push(ResolvedType {
                    name: String::new(),
                    c_name: String::new(),
                    kind: ResolvedKind::Array {
                        elem: elem_id,
                        len: *len,
                    },
                    size,
                    align,
                });
                self.memo.insert(ty.clone(), id);
                return Ok(id);
            }
            TypeNode::IncompleteArray { elem } => {
                let elem_id = self.resolve_type(elem)?;
                let align = self.get(elem_id).align;
                let id = self.push(ResolvedType {
                    name: String::new(),
                    c_name: String::new(),
                    kind: ResolvedKind::Array {
                        elem: elem_id,
                        len: 0,
                    },
                    size: Some(0),
                    align,
                });
                self.memo.insert(ty.clone(), id);
                return Ok(id);
            }
            TypeNode::Record(id) => self.resolve_record(*id)?,
            TypeNode::Enum(id) => self.resolve_enum(*id)?,
            TypeNode::Typedef(id) => self.resolve_typedef(*id)?,
            TypeNode::Function(func) => {
                let decl = self.needed_by();
                let (params, ret) = self.resolve_func_type(func, &decl)?;
                self.push(ResolvedType {
                    name: String::new(),
                    c_name: String::new(),
                    kind: ResolvedKind::Function { params, ret },
                    size: None,
                    align: None,
                })
            }
        };
        self.memo.insert(ty.clone(), id);
        Ok(id)
    }

    fn get(&self, id: ResolvedId) -> &ResolvedType {
        &self.arena[id.0 as usize]
    }

    fn resolve_record(&mut self, id: RecordId) -> Result<ResolvedId, Error> {
        let key = TypeNode::Record(id);
        if let Some(&rid) = self.memo.get(&key) {
            return Ok(rid);
        }
        let def = self.tree.record(id);
        let display = def.tag.clone().unwrap_or_else(|| def.base_name.clone());
        let rust_name = self.policy.rename(&display, NameKind::Type).rust;

        let denied = !self.policy.admits(&display, def.origin.as_deref());
        if denied || def.fields.is_none() {
            // Referenced but not translatable: an opaque shape carrying the
            // C size and alignment (zero-sized when incomplete).
            let (size, align) = match &def.layout {
                Some(l) => (l.size, l.align),
                None => (0, 1),
            };
            let rid = self.push(ResolvedType {
                name: rust_name,
                c_name: self.tree.record_display(id),
                kind: ResolvedKind::Opaque,
                size: Some(size),
                align: Some(align),
            });
            self.memo.insert(key, rid);
            return Ok(rid);
        }

        let (size, align) = match &def.layout {
            Some(l) => (Some(l.size), Some(l.align)),
            None => (None, None),
        };
        let rid = self.push(ResolvedType {
            name: rust_name,
            c_name: self.tree.record_display(id),
            kind: ResolvedKind::Pending,
            size,
            align,
        });
        self.memo.insert(key, rid);

        self.context.push(self.tree.record_display(id));
        let kind = match def.kind {
            RecordKind::Struct => self.resolve_struct_fields(id)?,
            RecordKind::Union => self.resolve_union_fields(id)?,
        };
        self.context.pop();
        self.arena[rid.0 as usize].kind = kind;
        Ok(rid)
    }

    fn resolve_struct_fields(&mut self, id: RecordId) -> Result<ResolvedKind, Error> {
        let def = self.tree.record(id);
        let fields = def.fields.as_ref().unwrap_or_else(|| unreachable!());
        let offsets = def.layout.as_ref().map(|l| l.offsets.clone());
        let c_align = def.layout.as_ref().map(|l| l.align);
        let fields = fields.clone();

        let mut out = Vec::new();
        let mut run_ordinal = 0u32;
        let mut anon_ordinal = 0u32;
        let mut has_bitfields = false;
        let mut i = 0usize;
        while i < fields.len() {
            if fields[i].bit_width.is_some() {
                let start = i;
                while i < fields.len() && fields[i].bit_width.is_some() {
                    i += 1;
                }
                let Some(offsets) = &offsets else {
                    return Err(Error::Unsupported {
                        decl: self.tree.record_display(id),
                        construct: "bit-fields without a computable layout".to_string(),
                    });
                };
                // Collapse the run into one opaque storage field covering
                // exactly the bytes its bits occupy. Anchoring at the unit
                // start would overlap an ordinary field sharing the unit.
                let mut lo_bit = u64::MAX;
                let mut hi_bit = 0u64;
                for offset in &offsets[start..i] {
                    if let FieldOffset::Bits {
                        unit_offset,
                        bit_offset,
                        width,
                        ..
                    } = offset
                        && *width > 0
                    {
                        let first = unit_offset * 8 + u64::from(*bit_offset);
                        lo_bit = lo_bit.min(first);
                        hi_bit = hi_bit.max(first + u64::from(*width));
                    }
                }
                if lo_bit == u64::MAX {
                    continue;
                }
                let lo = lo_bit / 8;
                let len = hi_bit.div_ceil(8) - lo;
                let byte = self.raw_unit("u8", 1, 1);
                let storage = self.push(ResolvedType {
                    name: String::new(),
                    c_name: String::new(),
                    kind: ResolvedKind::Array { elem: byte, len },
                    size: Some(len),
                    align: Some(1),
                });
                out.push(ResolvedField {
                    rust_name: format!("_bitfield_{run_ordinal}"),
                    ty: storage,
                    c_offset: Some(lo),
                });
                run_ordinal += 1;
                has_bitfields = true;
            } else {
                let field = &fields[i];
                let ty = self.resolve_type(&field.ty)?;
                let rust_name = match &field.name {
                    Some(name) => self.policy.rename(name, NameKind::Value).rust,
                    None => {
                        let name = format!("__anon{anon_ordinal}");
                        anon_ordinal += 1;
                        name
                    }
                };
                let c_offset = offsets.as_ref().and_then(|offs| match offs[i] {
                    FieldOffset::Byte(o) => Some(o),
                    FieldOffset::Bits { .. } => None,
                });
                out.push(ResolvedField {
                    rust_name,
                    ty,
                    c_offset,
                });
                i += 1;
            }
        }
        Ok(ResolvedKind::Struct {
            fields: out,
            // Byte-array storage units erase the declared field alignment,
            // so pin the record to the C alignment whenever they exist.
            explicit_align: if has_bitfields { c_align } else { None },
        })
    }

    fn resolve_union_fields(&mut self, id: RecordId) -> Result<ResolvedKind, Error> {
        let def = self.tree.record(id);
        let fields = def.fields.as_ref().unwrap_or_else(|| unreachable!()).clone();
        let offsets = def.layout.as_ref().map(|l| l.offsets.clone());
        let c_align = def.layout.as_ref().map(|l| l.align);

        let mut out = Vec::new();
        let mut anon_ordinal = 0u32;
        let mut has_bitfields = false;
        for (index, field) in fields.iter().enumerate() {
            let rust_name = match &field.name {
                Some(name) => self.policy.rename(name, NameKind::Value).rust,
                None => {
                    let name = format!("__anon{anon_ordinal}");
                    anon_ordinal += 1;
                    name
                }
            };
            let ty = if field.bit_width.is_some() {
                let unit_size = match offsets.as_ref().map(|offs| offs[index]) {
                    Some(FieldOffset::Bits { unit_size, .. }) => unit_size,
                    _ => {
                        return Err(Error::Unsupported {
                            decl: self.tree.record_display(id),
                            construct: "bit-fields without a computable layout".to_string(),
                        });
                    }
                };
                has_bitfields = true;
                let byte = self.raw_unit("u8", 1, 1);
                self.push(ResolvedType {
                    name: String::new(),
                    c_name: String::new(),
                    kind: ResolvedKind::Array {
                        elem: byte,
                        len: unit_size,
                    },
                    size: Some(unit_size),
                    align: Some(1),
                })
            } else {
                self.resolve_type(&field.ty)?
            };
            out.push(ResolvedField {
                rust_name,
                ty,
                c_offset: Some(0),
            });
        }
        Ok(ResolvedKind::Union {
            fields: out,
            explicit_align: if has_bitfields { c_align } else { None },
        })
    }

    fn resolve_enum(&mut self, id: EnumId) -> Result<ResolvedId, Error> {
        let key = TypeNode::Enum(id);
        if let Some(&rid) = self.memo.get(&key) {
            return Ok(rid);
        }
        let def = self.tree.enum_def(id);
        let display = def.tag.clone().unwrap_or_else(|| def.base_name.clone());

        // An anonymous enum that no typedef adopted has no referable name;
        // uses of it collapse to the underlying integer.
        if def.tag.is_none() && is_synthesized(&def.base_name) {
            let rid = self.primitive_unit(&def.underlying.clone())?;
            self.memo.insert(key, rid);
            return Ok(rid);
        }

        let rust_name = self.policy.rename(&display, NameKind::Type).rust;
        if !self.policy.admits(&display, def.origin.as_deref()) || def.constants.is_empty() {
            let (size, align) = self
                .model
                .primitive_size_align(&def.underlying)
                .unwrap_or((4, 4));
            let rid = self.push(ResolvedType {
                name: rust_name,
                c_name: format!("enum {display}"),
                kind: ResolvedKind::Opaque,
                size: Some(size),
                align: Some(align),
            });
            self.memo.insert(key, rid);
            return Ok(rid);
        }

        let underlying = self.primitive_path(&def.underlying, &display)?;
        let constants = def
            .constants
            .iter()
            .map(|c| {
                (
                    self.policy.rename(&c.name, NameKind::Constant).rust,
                    c.value,
                )
            })
            .collect();
        let (size, align) = self
            .model
            .primitive_size_align(&def.underlying)
            .unwrap_or((4, 4));
        let rid = self.push(ResolvedType {
            name: rust_name,
            c_name: format!("enum {display}"),
            kind: ResolvedKind::Enum {
                underlying,
                constants,
            },
            size: Some(size),
            align: Some(align),
        });
        self.memo.insert(key, rid);
        Ok(rid)
    }

    fn resolve_typedef(&mut self, id: TypedefId) -> Result<ResolvedId, Error> {
        let key = TypeNode::Typedef(id);
        if let Some(&rid) = self.memo.get(&key) {
            return Ok(rid);
        }
        let def = self.tree.typedef(id);
        let name = def.name.clone();
        let ty = def.ty.clone();
        let origin = def.origin.clone();

        // When the typedef adopted an anonymous aggregate, the aggregate
        // already carries this name; references collapse onto it directly
        // and no alias item is produced.
        match self.tree.strip_typedefs(&ty) {
            TypeNode::Record(rid) if self.tree.record(*rid).tag.is_none() => {
                if self.tree.record(*rid).base_name == name {
                    let rid = *rid;
                    let resolved = self.resolve_record(rid)?;
                    self.memo.insert(key, resolved);
                    return Ok(resolved);
                }
            }
            TypeNode::Enum(eid) if self.tree.enum_def(*eid).tag.is_none() => {
                if self.tree.enum_def(*eid).base_name == name {
                    let eid = *eid;
                    let resolved = self.resolve_enum(eid)?;
                    self.memo.insert(key, resolved);
                    return Ok(resolved);
                }
            }
            _ => {}
        }

        // A policy-denied typedef still resolves; uses of it fall through to
        // the underlying type with no alias emitted.
        if !self.policy.admits(&name, origin.as_deref()) {
            self.context.push(name);
            let target = self.resolve_type(&ty)?;
            self.context.pop();
            self.memo.insert(key, target);
            return Ok(target);
        }

        let rust_name = self.policy.rename(&name, NameKind::Type).rust;
        let rid = self.push(ResolvedType {
            name: rust_name,
            c_name: format!("typedef {name}"),
            kind: ResolvedKind::Pending,
            size: None,
            align: None,
        });
        self.memo.insert(key, rid);
        self.context.push(name);
        let target = self.resolve_type(&ty)?;
        self.context.pop();
        let (size, align) = {
            let t = self.get(target);
            (t.size, t.align)
        };
        let unit = &mut self.arena[rid.0 as usize];
        unit.kind = ResolvedKind::Alias { target };
        unit.size = size;
        unit.align = align;
        Ok(rid)
    }

    fn resolve_signature(
        &mut self,
        func: &FuncType,
    ) -> Result<(Vec<ResolvedId>, Option<ResolvedId>), Error> {
        let decl = self.needed_by();
        self.resolve_func_type(func, &decl)
    }

    fn resolve_func_type(
        &mut self,
        func: &FuncType,
        decl: &str,
    ) -> Result<(Vec<ResolvedId>, Option<ResolvedId>), Error> {
        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            params.push(self.resolve_type(param)?);
        }
        if func.variadic {
            match self.config.variadic {
                VariadicPolicy::Reject => {
                    return Err(Error::Unsupported {
                        decl: decl.to_string(),
                        construct: "variadic argument tail".to_string(),
                    });
                }
                VariadicPolicy::Cap { max_extra } => {
                    // Documented lossy approximation: the tail becomes a
                    // fixed number of pointer-sized slots.
                    debug!(decl, max_extra, "capping variadic tail");
                    let slot = self.raw_unit("usize", 8, 8);
                    for _ in 0..max_extra {
                        params.push(slot);
                    }
                }
            }
        }
        let ret = match &func.ret {
            TypeNode::Void => None,
            ty => Some(self.resolve_type(ty)?),
        };
        Ok((params, ret))
    }
}

/// True for names the tree synthesized for anonymous definitions
/// (`enclosing__anon3`). Adopted names were overwritten by the typedef and
/// no longer match.
fn is_synthesized(base_name: &str) -> bool {
    base_name
        .rfind("__anon")
        .is_some_and(|at| base_name[at + "__anon".len()..].bytes().all(|b| b.is_ascii_digit()))
}

/// Smallest conventional Rust type for a macro constant: unsigned when the
/// value fits, signed otherwise.
fn macro_const_type(value: i128) -> &'static str {
    if (0..=i128::from(u32::MAX)).contains(&value) {
        "u32"
    } else if value > 0 && value <= i128::from(u64::MAX) {
        "u64"
    } else if value > 0 {
        "u128"
    } else if value >= i128::from(i32::MIN) {
        "i32"
    } else if value >= i128::from(i64::MIN) {
        "i64"
    } else {
        "i128"
    }
}

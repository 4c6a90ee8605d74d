//! The declaration tree handed from the front end to the rest of the
//! pipeline. Immutable once parsed (layout annotation happens inside the
//! parse stage); owned exclusively by the pipeline run.
//!
//! Records, enums, and typedefs live in id-indexed tables so that mutually
//! recursive references (struct-via-pointer graphs) are plain ids rather than
//! owned cycles. Top-level order is preserved in [DeclarationTree::decls].

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypedefId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Struct,
    Union,
}

impl RecordKind {
    pub fn keyword(self) -> &'static str {
        match self {
            RecordKind::Struct => "struct",
            RecordKind::Union => "union",
        }
    }
}

/// A C type shape. The set of kinds is closed on purpose: exhaustive matching
/// downstream catches missing cases at compile time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeNode {
    Void,
    /// A primitive, keyed by its canonical C spelling (`"unsigned long"`).
    Primitive(String),
    Pointer {
        pointee: Box<TypeNode>,
        is_const: bool,
    },
    Array {
        elem: Box<TypeNode>,
        len: u64,
    },
    /// Flexible array member (`int tail[];`). Occupies no space.
    IncompleteArray {
        elem: Box<TypeNode>,
    },
    Record(RecordId),
    Enum(EnumId),
    Typedef(TypedefId),
    /// Function shape; reachable only behind a pointer or as the type of a
    /// [FuncDecl].
    Function(Box<FuncType>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncType {
    pub ret: TypeNode,
    pub params: Vec<TypeNode>,
    pub variadic: bool,
}

#[derive(Clone, Debug)]
pub struct Field {
    /// `None` for an anonymous struct/union member.
    pub name: Option<String>,
    pub ty: TypeNode,
    pub bit_width: Option<u32>,
}

/// Front-end layout report for one complete record. Treated as ground truth
/// by the validator; nothing downstream re-derives it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordLayout {
    pub size: u64,
    pub align: u64,
    /// One entry per field, in declaration order.
    pub offsets: Vec<FieldOffset>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldOffset {
    /// Ordinary field at a byte offset.
    Byte(u64),
    /// Bit-field packed into a storage unit.
    Bits {
        /// Byte offset of the storage unit holding this field.
        unit_offset: u64,
        /// Bit position within the storage unit.
        bit_offset: u32,
        /// Declared width in bits.
        width: u32,
        /// Size of the storage unit in bytes.
        unit_size: u64,
    },
}

#[derive(Clone, Debug)]
pub struct RecordDef {
    pub kind: RecordKind,
    pub tag: Option<String>,
    /// Synthesized reference name: the tag when present, otherwise derived
    /// from the enclosing declaration plus a stable ordinal suffix.
    pub base_name: String,
    /// `None` for a forward declaration with no visible definition.
    pub fields: Option<Vec<Field>>,
    /// Front-end layout report; `None` until computed, or undeterminable
    /// (incomplete record, unknown primitive in a field).
    pub layout: Option<RecordLayout>,
    /// File the definition came from, for origin-based visibility rules.
    pub origin: Option<String>,
}

#[derive(Clone, Debug)]
pub struct EnumConstant {
    pub name: String,
    pub value: i64,
}

#[derive(Clone, Debug)]
pub struct EnumDef {
    pub tag: Option<String>,
    pub base_name: String,
    /// Canonical spelling of the underlying integer type.
    pub underlying: String,
    pub constants: Vec<EnumConstant>,
    pub origin: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TypedefDef {
    pub name: String,
    pub ty: TypeNode,
    pub origin: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FuncDecl {
    pub name: String,
    pub ty: FuncType,
    /// Declared parameter names, parallel to `ty.params`.
    pub param_names: Vec<Option<String>>,
    pub origin: Option<String>,
}

#[derive(Clone, Debug)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeNode,
    pub origin: Option<String>,
}

/// An integer constant recovered from an object-like `#define`.
#[derive(Clone, Debug)]
pub struct MacroConst {
    pub name: String,
    pub value: i128,
}

/// One top-level declaration, in source order.
#[derive(Clone, Debug)]
pub enum Decl {
    Record(RecordId),
    Enum(EnumId),
    Typedef(TypedefId),
    Function(FuncDecl),
    Var(VarDecl),
    Constant(MacroConst),
}

#[derive(Debug, Default)]
pub struct DeclarationTree {
    pub records: Vec<RecordDef>,
    pub enums: Vec<EnumDef>,
    pub typedefs: Vec<TypedefDef>,
    pub decls: Vec<Decl>,
    record_tags: HashMap<String, RecordId>,
    enum_tags: HashMap<String, EnumId>,
    typedef_names: HashMap<String, TypedefId>,
}

impl DeclarationTree {
    pub fn record(&self, id: RecordId) -> &RecordDef {
        &self.records[id.0 as usize]
    }

    pub fn record_mut(&mut self, id: RecordId) -> &mut RecordDef {
        &mut self.records[id.0 as usize]
    }

    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        &self.enums[id.0 as usize]
    }

    pub fn enum_def_mut(&mut self, id: EnumId) -> &mut EnumDef {
        &mut self.enums[id.0 as usize]
    }

    pub fn typedef(&self, id: TypedefId) -> &TypedefDef {
        &self.typedefs[id.0 as usize]
    }

    /// Returns the id for a tagged record, creating a forward declaration on
    /// first sight. Repeated references to the same tag intern to one id.
    pub fn intern_record_tag(&mut self, kind: RecordKind, tag: &str) -> RecordId {
        if let Some(&id) = self.record_tags.get(tag) {
            return id;
        }
        let id = RecordId(self.records.len() as u32);
        self.records.push(RecordDef {
            kind,
            tag: Some(tag.to_string()),
            base_name: tag.to_string(),
            fields: None,
            layout: None,
            origin: None,
        });
        self.record_tags.insert(tag.to_string(), id);
        id
    }

    /// Registers an anonymous record definition nested in `enclosing`.
    /// `ordinal` is its source-order position among the enclosing
    /// declaration's anonymous members, which keeps the synthesized name
    /// stable across runs.
    pub fn add_anonymous_record(
        &mut self,
        kind: RecordKind,
        enclosing: &str,
        ordinal: u32,
    ) -> RecordId {
        let id = RecordId(self.records.len() as u32);
        self.records.push(RecordDef {
            kind,
            tag: None,
            base_name: format!("{enclosing}__anon{ordinal}"),
            fields: None,
            layout: None,
            origin: None,
        });
        id
    }

    pub fn intern_enum_tag(&mut self, tag: &str) -> EnumId {
        if let Some(&id) = self.enum_tags.get(tag) {
            return id;
        }
        let id = EnumId(self.enums.len() as u32);
        self.enums.push(EnumDef {
            tag: Some(tag.to_string()),
            base_name: tag.to_string(),
            underlying: "unsigned int".to_string(),
            constants: Vec::new(),
            origin: None,
        });
        self.enum_tags.insert(tag.to_string(), id);
        id
    }

    pub fn add_anonymous_enum(&mut self, enclosing: &str, ordinal: u32) -> EnumId {
        let id = EnumId(self.enums.len() as u32);
        self.enums.push(EnumDef {
            tag: None,
            base_name: format!("{enclosing}__anon{ordinal}"),
            underlying: "unsigned int".to_string(),
            constants: Vec::new(),
            origin: None,
        });
        id
    }

    /// Registers an extra tag spelling for an existing record. Used to make
    /// anonymous definitions reachable from rewritten type spellings.
    pub fn alias_record_tag(&mut self, tag: String, id: RecordId) {
        self.record_tags.insert(tag, id);
    }

    pub fn alias_enum_tag(&mut self, tag: String, id: EnumId) {
        self.enum_tags.insert(tag, id);
    }

    pub fn add_typedef(&mut self, def: TypedefDef) -> TypedefId {
        let id = TypedefId(self.typedefs.len() as u32);
        self.typedef_names.insert(def.name.clone(), id);
        self.typedefs.push(def);
        id
    }

    pub fn lookup_typedef(&self, name: &str) -> Option<TypedefId> {
        self.typedef_names.get(name).copied()
    }

    /// Human-readable name for diagnostics, e.g. `struct cn_msg`.
    pub fn record_display(&self, id: RecordId) -> String {
        let def = self.record(id);
        match &def.tag {
            Some(tag) => format!("{} {tag}", def.kind.keyword()),
            None => format!("{} {}", def.kind.keyword(), def.base_name),
        }
    }

    /// Follows a typedef chain to its terminal non-typedef node.
    pub fn strip_typedefs<'a>(&'a self, mut ty: &'a TypeNode) -> &'a TypeNode {
        while let TypeNode::Typedef(id) = ty {
            ty = &self.typedef(*id).ty;
        }
        ty
    }
}

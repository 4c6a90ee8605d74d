//! The code emitter: renders the resolved, validated declaration set into
//! Rust source text. Emission is append-only and single-pass; the only
//! ordering constraint is that value dependencies (fields, array elements,
//! alias targets) are declared before their users, which a topological walk
//! guarantees. Pointer edges enqueue the pointee without ordering.

use crate::policy::NamePolicy;
use crate::resolve::{EmissionUnit, Resolved, ResolvedId, ResolvedKind};
use cbind_core::FormatterError;
use cbind_core::config::FormatterKind;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::Write as _;
use std::process::{Command, Stdio};

/// A post-processing style pass over the generated source.
pub trait Formatter {
    fn name(&self) -> &'static str;
    fn format(&self, source: &str) -> Result<String, FormatterError>;
}

/// Pipes the source through the external `rustfmt` binary.
pub struct RustfmtFormatter;

impl Formatter for RustfmtFormatter {
    fn name(&self) -> &'static str {
        "rustfmt"
    }

    fn format(&self, source: &str) -> Result<String, FormatterError> {
        let fail = |message: String| FormatterError {
            backend: "rustfmt".to_string(),
            message,
        };
        let mut child = Command::new("rustfmt")
            .args(["--edition", "2024"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fail(e.to_string()))?;
        child
            .stdin
            .take()
            .ok_or_else(|| fail("no stdin handle".to_string()))?
            .write_all(source.as_bytes())
            .map_err(|e| fail(e.to_string()))?;
        let output = child.wait_with_output().map_err(|e| fail(e.to_string()))?;
        if !output.status.success() {
            return Err(fail(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        String::from_utf8(output.stdout).map_err(|_| fail("output is not UTF-8".to_string()))
    }
}

/// Emits the generator's own layout untouched.
pub struct NoopFormatter;

impl Formatter for NoopFormatter {
    fn name(&self) -> &'static str {
        "none"
    }

    fn format(&self, source: &str) -> Result<String, FormatterError> {
        Ok(source.to_string())
    }
}

pub fn formatter_for(kind: FormatterKind) -> Box<dyn Formatter> {
    match kind {
        FormatterKind::Rustfmt => Box::new(RustfmtFormatter),
        FormatterKind::None => Box::new(NoopFormatter),
    }
}

/// Renders the full output text (before formatting).
pub fn emit(resolved: &Resolved, policy: &NamePolicy, prologue: Option<&str>) -> String {
    let mut emitter = Emitter {
        resolved,
        docs: !policy.exclude_doc_comments,
        emitted: HashSet::new(),
        pending: Vec::new(),
        types: String::new(),
    };

    let mut consts = String::new();
    let mut externs = String::new();
    for unit in &resolved.units {
        match unit {
            EmissionUnit::Type(id) => emitter.emit_type(*id),
            EmissionUnit::Constant { name, ty, value } => {
                let _ = writeln!(consts, "pub const {name}: {ty} = {value};");
            }
            EmissionUnit::Function(func) => {
                for (_, ty) in &func.params {
                    emitter.enqueue(*ty);
                }
                if let Some(ret) = func.ret {
                    emitter.enqueue(ret);
                }
                if emitter.docs {
                    let _ = writeln!(externs, "    /// C function `{}`", func.c_name);
                }
                if let Some(link) = &func.link_name {
                    let _ = writeln!(externs, "    #[link_name = \"{link}\"]");
                }
                let params: Vec<String> = func
                    .params
                    .iter()
                    .map(|(name, ty)| format!("{name}: {}", emitter.type_ref(*ty)))
                    .collect();
                let ret = match func.ret {
                    Some(ty) => format!(" -> {}", emitter.type_ref(ty)),
                    None => String::new(),
                };
                let _ = writeln!(
                    externs,
                    "    pub fn {}({}){ret};",
                    func.rust_name,
                    params.join(", ")
                );
            }
            EmissionUnit::Static(var) => {
                emitter.enqueue(var.ty);
                if emitter.docs {
                    let _ = writeln!(externs, "    /// C global `{}`", var.c_name);
                }
                if let Some(link) = &var.link_name {
                    let _ = writeln!(externs, "    #[link_name = \"{link}\"]");
                }
                let _ = writeln!(
                    externs,
                    "    pub static mut {}: {};",
                    var.rust_name,
                    emitter.type_ref(var.ty)
                );
            }
        }
        emitter.drain_pending();
    }
    emitter.drain_pending();

    let mut out = String::new();
    out.push_str("// Generated by cbind. Do not edit by hand.\n");
    if let Some(prologue) = prologue {
        out.push('\n');
        out.push_str(prologue);
        if !prologue.ends_with('\n') {
            out.push('\n');
        }
    }
    if !emitter.types.is_empty() {
        out.push_str(&emitter.types);
    }
    if !consts.is_empty() {
        out.push('\n');
        out.push_str(&consts);
    }
    if !externs.is_empty() {
        out.push_str("\nunsafe extern \"C\" {\n");
        out.push_str(&externs);
        out.push_str("}\n");
    }
    out
}

struct Emitter<'a> {
    resolved: &'a Resolved,
    docs: bool,
    emitted: HashSet<ResolvedId>,
    /// Named types discovered through pointer edges, emitted after the
    /// current item finishes.
    pending: Vec<ResolvedId>,
    types: String,
}

impl Emitter<'_> {
    /// Emits the named item for `id` after all of its value dependencies.
    fn emit_type(&mut self, id: ResolvedId) {
        if !self.is_named(id) || !self.emitted.insert(id) {
            return;
        }
        let unit = self.resolved.get(id);
        match &unit.kind {
            ResolvedKind::Struct { fields, .. } | ResolvedKind::Union { fields, .. } => {
                for field in fields.clone() {
                    self.value_dep(field.ty);
                }
            }
            ResolvedKind::Alias { target } => self.value_dep(*target),
            _ => {}
        }
        self.render_item(id);
    }

    /// Follows a value edge: named targets are emitted first, inline shapes
    /// are traversed, pointer pointees are only enqueued.
    fn value_dep(&mut self, id: ResolvedId) {
        match &self.resolved.get(id).kind {
            ResolvedKind::Pointer { pointee, .. } => self.enqueue(*pointee),
            ResolvedKind::Array { elem, .. } => self.value_dep(*elem),
            ResolvedKind::Function { params, ret } => {
                for param in params.clone() {
                    self.enqueue(param);
                }
                if let Some(ret) = ret {
                    self.enqueue(*ret);
                }
            }
            ResolvedKind::Primitive(_) => {}
            _ => self.emit_type(id),
        }
    }

    /// Registers a type reached through a pointer or signature edge so it
    /// still appears in the output, without constraining order.
    fn enqueue(&mut self, id: ResolvedId) {
        match &self.resolved.get(id).kind {
            ResolvedKind::Pointer { pointee, .. } => self.enqueue(*pointee),
            ResolvedKind::Array { elem, .. } => self.enqueue(*elem),
            ResolvedKind::Function { params, ret } => {
                for param in params.clone() {
                    self.enqueue(param);
                }
                if let Some(ret) = ret {
                    self.enqueue(*ret);
                }
            }
            ResolvedKind::Primitive(_) => {}
            _ => {
                if !self.emitted.contains(&id) {
                    self.pending.push(id);
                }
            }
        }
    }

    fn drain_pending(&mut self) {
        while let Some(id) = self.pending.pop() {
            self.emit_type(id);
        }
    }

    fn is_named(&self, id: ResolvedId) -> bool {
        !self.resolved.get(id).name.is_empty()
    }

    fn doc(&mut self, id: ResolvedId) {
        if self.docs {
            let c_name = &self.resolved.get(id).c_name;
            if !c_name.is_empty() {
                let _ = writeln!(self.types, "/// C `{c_name}`");
            }
        }
    }

    fn render_item(&mut self, id: ResolvedId) {
        let unit = self.resolved.get(id).clone();
        self.types.push('\n');
        match &unit.kind {
            ResolvedKind::Struct {
                fields,
                explicit_align,
            } => {
                self.doc(id);
                self.repr_attr(*explicit_align);
                let _ = writeln!(self.types, "#[derive(Copy, Clone)]");
                let _ = writeln!(self.types, "pub struct {} {{", unit.name);
                for field in fields {
                    let ty = self.type_ref(field.ty);
                    let _ = writeln!(self.types, "    pub {}: {ty},", field.rust_name);
                }
                let _ = writeln!(self.types, "}}");
            }
            ResolvedKind::Union {
                fields,
                explicit_align,
            } => {
                self.doc(id);
                self.repr_attr(*explicit_align);
                let _ = writeln!(self.types, "#[derive(Copy, Clone)]");
                let _ = writeln!(self.types, "pub union {} {{", unit.name);
                for field in fields {
                    let ty = self.type_ref(field.ty);
                    let _ = writeln!(self.types, "    pub {}: {ty},", field.rust_name);
                }
                let _ = writeln!(self.types, "}}");
            }
            ResolvedKind::Enum {
                underlying,
                constants,
            } => {
                self.doc(id);
                let _ = writeln!(self.types, "pub type {} = {underlying};", unit.name);
                for (name, value) in constants {
                    let _ = writeln!(
                        self.types,
                        "pub const {name}: {} = {value};",
                        unit.name
                    );
                }
            }
            ResolvedKind::Alias { target } => {
                self.doc(id);
                let target = self.type_ref(*target);
                let _ = writeln!(self.types, "pub type {} = {target};", unit.name);
            }
            ResolvedKind::Opaque => {
                let size = unit.size.unwrap_or(0);
                self.doc(id);
                match unit.align {
                    Some(align) if align > 1 => {
                        let _ = writeln!(self.types, "#[repr(C, align({align}))]");
                    }
                    _ => {
                        let _ = writeln!(self.types, "#[repr(C)]");
                    }
                }
                let _ = writeln!(self.types, "#[derive(Copy, Clone)]");
                let _ = writeln!(self.types, "pub struct {} {{", unit.name);
                let _ = writeln!(self.types, "    _opaque: [u8; {size}],");
                let _ = writeln!(self.types, "}}");
            }
            _ => unreachable!("inline shape rendered as item"),
        }
    }

    fn repr_attr(&mut self, explicit_align: Option<u64>) {
        match explicit_align {
            Some(align) => {
                let _ = writeln!(self.types, "#[repr(C, align({align}))]");
            }
            None => {
                let _ = writeln!(self.types, "#[repr(C)]");
            }
        }
    }

    /// Inline spelling of a type reference.
    fn type_ref(&self, id: ResolvedId) -> String {
        let unit = self.resolved.get(id);
        match &unit.kind {
            ResolvedKind::Primitive(path) => path.clone(),
            ResolvedKind::Pointer { pointee, is_const } => {
                if let ResolvedKind::Function { params, ret } = &self.resolved.get(*pointee).kind {
                    let params: Vec<String> =
                        params.iter().map(|p| self.type_ref(*p)).collect();
                    let ret = match ret {
                        Some(ty) => format!(" -> {}", self.type_ref(*ty)),
                        None => String::new(),
                    };
                    return format!(
                        "::core::option::Option<unsafe extern \"C\" fn({}){ret}>",
                        params.join(", ")
                    );
                }
                let qualifier = if *is_const { "const" } else { "mut" };
                format!("*{qualifier} {}", self.type_ref(*pointee))
            }
            ResolvedKind::Array { elem, len } => {
                format!("[{}; {len}]", self.type_ref(*elem))
            }
            _ => unit.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Decl, DeclarationTree, Field, FuncDecl, FuncType, RecordKind, TypeNode};
    use cbind_core::config::Config;

    fn int_field(name: &str) -> Field {
        Field {
            name: Some(name.to_string()),
            ty: TypeNode::Primitive("int".to_string()),
            bit_width: None,
        }
    }

    fn emit_tree(tree: &mut DeclarationTree, config: &Config) -> String {
        crate::abi::compute_layouts(tree).unwrap();
        let policy = NamePolicy::from_config(config).unwrap();
        let resolved = crate::resolve::resolve(tree, config, &policy).unwrap();
        crate::layout::validate(&resolved).unwrap();
        emit(&resolved, &policy, config.prologue.as_deref())
    }

    fn point_and_move() -> DeclarationTree {
        let mut tree = DeclarationTree::default();
        let point = tree.intern_record_tag(RecordKind::Struct, "Point");
        tree.record_mut(point).fields = Some(vec![int_field("x"), int_field("y")]);
        tree.decls.push(Decl::Record(point));
        tree.decls.push(Decl::Function(FuncDecl {
            name: "move".to_string(),
            ty: FuncType {
                ret: TypeNode::Void,
                params: vec![
                    TypeNode::Pointer {
                        pointee: Box::new(TypeNode::Record(point)),
                        is_const: false,
                    },
                    TypeNode::Primitive("int".to_string()),
                    TypeNode::Primitive("int".to_string()),
                ],
                variadic: false,
            },
            param_names: vec![
                Some("p".to_string()),
                Some("dx".to_string()),
                Some("dy".to_string()),
            ],
            origin: None,
        }));
        tree
    }

    #[test]
    fn point_scenario_renders_struct_and_linked_function() {
        let mut tree = point_and_move();
        let out = emit_tree(&mut tree, &Config::mock());
        assert!(out.contains("#[repr(C)]\n#[derive(Copy, Clone)]\npub struct Point {"));
        assert!(out.contains("pub x: ::core::ffi::c_int,"));
        assert!(out.contains("#[link_name = \"move\"]"));
        assert!(out.contains(
            "pub fn move_(p: *mut Point, dx: ::core::ffi::c_int, dy: ::core::ffi::c_int);"
        ));
        assert!(out.contains("unsafe extern \"C\" {"));
    }

    #[test]
    fn value_dependency_precedes_its_user() {
        let mut tree = DeclarationTree::default();
        let inner = tree.intern_record_tag(RecordKind::Struct, "inner");
        tree.record_mut(inner).fields = Some(vec![int_field("a")]);
        let outer = tree.intern_record_tag(RecordKind::Struct, "outer");
        tree.record_mut(outer).fields = Some(vec![Field {
            name: Some("pair".to_string()),
            ty: TypeNode::Record(inner),
            bit_width: None,
        }]);
        // Declared outer-first; the value edge must still reorder them.
        tree.decls.push(Decl::Record(outer));
        tree.decls.push(Decl::Record(inner));
        let out = emit_tree(&mut tree, &Config::mock());
        let inner_at = out.find("pub struct inner").unwrap();
        let outer_at = out.find("pub struct outer").unwrap();
        assert!(inner_at < outer_at);
    }

    #[test]
    fn prologue_appears_before_declarations() {
        let mut tree = point_and_move();
        let mut config = Config::mock();
        config.prologue = Some("#![allow(non_camel_case_types)]".to_string());
        let out = emit_tree(&mut tree, &config);
        let prologue_at = out.find("#![allow(non_camel_case_types)]").unwrap();
        let first_item = out.find("pub struct").unwrap();
        assert!(prologue_at < first_item);
    }

    #[test]
    fn doc_comments_can_be_suppressed() {
        let mut tree = point_and_move();
        let mut config = Config::mock();
        let out = emit_tree(&mut tree, &config);
        assert!(out.contains("/// C `struct Point`"));
        config.naming.exclude_doc_comments = true;
        let mut tree = point_and_move();
        let out = emit_tree(&mut tree, &config);
        assert!(!out.contains("/// C"));
    }

    #[test]
    fn determinism_byte_identical_across_runs() {
        let mut a = point_and_move();
        let mut b = point_and_move();
        let out_a = emit_tree(&mut a, &Config::mock());
        let out_b = emit_tree(&mut b, &Config::mock());
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn function_pointer_field_renders_as_option() {
        let mut tree = DeclarationTree::default();
        let id = tree.intern_record_tag(RecordKind::Struct, "ops");
        tree.record_mut(id).fields = Some(vec![Field {
            name: Some("notify".to_string()),
            ty: TypeNode::Pointer {
                pointee: Box::new(TypeNode::Function(Box::new(FuncType {
                    ret: TypeNode::Void,
                    params: vec![TypeNode::Primitive("int".to_string())],
                    variadic: false,
                }))),
                is_const: false,
            },
            bit_width: None,
        }]);
        tree.decls.push(Decl::Record(id));
        let out = emit_tree(&mut tree, &Config::mock());
        assert!(out.contains(
            "pub notify: ::core::option::Option<unsafe extern \"C\" fn(::core::ffi::c_int)>,"
        ));
    }

    #[test]
    fn noop_formatter_passes_text_through() {
        let formatter = NoopFormatter;
        assert_eq!(formatter.format("pub struct X;").unwrap(), "pub struct X;");
        assert_eq!(formatter.name(), "none");
    }
}

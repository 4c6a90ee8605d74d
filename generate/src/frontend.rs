//! The C front end. Drives `clang -Xclang -ast-dump=json` over the input
//! header, deserializes the dump through `clang_ast`, and lowers the subset of
//! nodes we care about into a [DeclarationTree]. A second clang invocation
//! (`-dM -E`) recovers integer constants from object-like `#define`s.
//!
//! Clang's JSON dump reports every type as a spelling string; the actual shape
//! recovery happens in [crate::ctype].

use crate::abi;
use crate::ctype;
use crate::ir::{
    Decl, DeclarationTree, EnumConstant, EnumId, Field, FuncDecl, MacroConst, RecordId,
    RecordKind, TypeNode, TypedefDef, VarDecl,
};
use cbind_core::Error;
use cbind_core::config::Config;
use clang_ast::Node;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// A (possibly) qualified type reference in the Clang AST, such as `int`,
/// `const int *`, or a typedef name.
/// Clang docs: https://clang.llvm.org/doxygen/classclang_1_1QualType.html
#[derive(Deserialize, Debug)]
pub struct QualType {
    /// Spelling with typedefs and typeofs resolved away.
    #[serde(rename = "desugaredQualType")]
    pub desugared_qual_type: Option<String>,
    /// Spelling as written in the source.
    #[serde(rename = "qualType")]
    pub qual_type: String,
}

/// The subset of Clang AST nodes the generator consumes. Everything else
/// falls into [Clang::Other] and is skipped during lowering.
#[derive(Deserialize, Debug)]
pub enum Clang {
    TranslationUnitDecl,
    /// Clang docs: https://clang.llvm.org/doxygen/classclang_1_1TypedefDecl.html
    TypedefDecl {
        loc: Option<clang_ast::SourceLocation>,
        #[serde(rename = "isImplicit", default)]
        is_implicit: bool,
        name: String,
        #[serde(rename = "type")]
        qtype: QualType,
    },
    /// Clang docs: https://clang.llvm.org/doxygen/classclang_1_1RecordDecl.html
    RecordDecl {
        loc: Option<clang_ast::SourceLocation>,
        name: Option<String>,
        #[serde(rename = "tagUsed")]
        tag_used: Option<String>,
        #[serde(rename = "completeDefinition", default)]
        complete_definition: bool,
    },
    /// Clang docs: https://clang.llvm.org/doxygen/classclang_1_1FieldDecl.html
    FieldDecl {
        name: Option<String>,
        #[serde(rename = "type")]
        qtype: QualType,
        #[serde(rename = "isBitfield", default)]
        is_bitfield: bool,
    },
    /// Clang docs: https://clang.llvm.org/doxygen/classclang_1_1EnumDecl.html
    EnumDecl {
        loc: Option<clang_ast::SourceLocation>,
        name: Option<String>,
        #[serde(rename = "fixedUnderlyingType")]
        fixed_underlying_type: Option<QualType>,
    },
    EnumConstantDecl {
        name: String,
    },
    /// Clang docs: https://clang.llvm.org/doxygen/classclang_1_1FunctionDecl.html
    FunctionDecl {
        loc: Option<clang_ast::SourceLocation>,
        name: String,
        #[serde(rename = "storageClass")]
        storage_class: Option<String>,
        #[serde(rename = "type")]
        qtype: QualType,
        #[serde(default)]
        variadic: bool,
    },
    ParmVarDecl {
        name: Option<String>,
    },
    /// Clang docs: https://clang.llvm.org/doxygen/classclang_1_1VarDecl.html
    VarDecl {
        loc: Option<clang_ast::SourceLocation>,
        name: String,
        #[serde(rename = "storageClass")]
        storage_class: Option<String>,
        #[serde(rename = "type")]
        qtype: QualType,
    },
    ConstantExpr {
        value: Option<String>,
    },
    IntegerLiteral {
        value: Option<String>,
    },
    Other {
        kind: Option<String>,
    },
}

/// Runs the front end over `config.header` and produces the declaration tree,
/// layout report included.
pub fn parse(config: &Config) -> Result<DeclarationTree, Error> {
    let root = run_ast_dump(config)?;
    let mut tree = lower(&root, &config.header)?;
    if config.macro_constants {
        let dump = run_macro_dump(config)?;
        let consts = parse_macro_dump(&dump);
        info!(count = consts.len(), "scanned macro constants");
        for c in consts {
            tree.decls.push(Decl::Constant(c));
        }
    }
    abi::compute_layouts(&mut tree)?;
    Ok(tree)
}

fn clang_command(config: &Config) -> Command {
    let mut cmd = Command::new(&config.clang);
    for dir in &config.include_dirs {
        cmd.arg("-I").arg(dir);
    }
    for define in &config.defines {
        cmd.arg(format!("-D{define}"));
    }
    cmd
}

fn run_ast_dump(config: &Config) -> Result<Node<Clang>, Error> {
    let mut cmd = clang_command(config);
    cmd.args(["-Xclang", "-ast-dump=json", "-fsyntax-only"])
        .arg(&config.header)
        .stderr(Stdio::piped());
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(clang_failure(&config.header, &output.stderr));
    }
    debug!(bytes = output.stdout.len(), "AST dump complete");
    serde_json::from_slice(&output.stdout).map_err(|e| Error::Parse {
        message: format!("malformed AST dump: {e}"),
        file: Some(config.header.display().to_string()),
        line: None,
    })
}

fn run_macro_dump(config: &Config) -> Result<String, Error> {
    let mut cmd = clang_command(config);
    cmd.args(["-dM", "-E"]).arg(&config.header).stderr(Stdio::piped());
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(clang_failure(&config.header, &output.stderr));
    }
    String::from_utf8(output.stdout).map_err(|_| Error::Parse {
        message: "macro dump is not UTF-8".to_string(),
        file: Some(config.header.display().to_string()),
        line: None,
    })
}

fn clang_failure(header: &Path, stderr: &[u8]) -> Error {
    let text = String::from_utf8_lossy(stderr);
    let message = text
        .lines()
        .find(|l| l.contains("error:"))
        .or_else(|| text.lines().next())
        .unwrap_or("clang exited with an error")
        .trim()
        .to_string();
    Error::Parse {
        message,
        file: Some(header.display().to_string()),
        line: None,
    }
}

/// Lowers a deserialized translation unit into a declaration tree. Split out
/// from [parse] so tests can feed hand-written dumps without running clang.
pub fn lower(root: &Node<Clang>, header: &Path) -> Result<DeclarationTree, Error> {
    if !matches!(root.kind, Clang::TranslationUnitDecl) {
        return Err(Error::Parse {
            message: "expected a translation unit at the root of the AST dump".to_string(),
            file: Some(header.display().to_string()),
            line: None,
        });
    }
    let enclosing = header
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("header")
        .to_string();
    let mut lowerer = Lowerer::default();
    let mut anon_ordinal = 0u32;
    for node in &root.inner {
        lowerer.lower_top(node, &enclosing, &mut anon_ordinal)?;
    }
    Ok(lowerer.tree)
}

#[derive(Default)]
struct Lowerer {
    tree: DeclarationTree,
    /// Clang's `(unnamed union at file:line:col)` spelling fragments mapped
    /// to the synthesized reference names, applied to every type spelling
    /// before parsing.
    anon_rewrites: Vec<(String, String)>,
    adopted_records: HashSet<RecordId>,
    adopted_enums: HashSet<EnumId>,
    pushed_records: HashSet<RecordId>,
    pushed_enums: HashSet<EnumId>,
    seen_funcs: HashSet<String>,
    seen_vars: HashSet<String>,
}

impl Lowerer {
    fn lower_top(
        &mut self,
        node: &Node<Clang>,
        enclosing: &str,
        anon_ordinal: &mut u32,
    ) -> Result<(), Error> {
        match &node.kind {
            Clang::RecordDecl { .. } => {
                let id = self.lower_record_node(node, enclosing, anon_ordinal)?;
                if self.pushed_records.insert(id) {
                    self.tree.decls.push(Decl::Record(id));
                }
            }
            Clang::EnumDecl { .. } => {
                let id = self.lower_enum_node(node, enclosing, anon_ordinal)?;
                if self.pushed_enums.insert(id) {
                    self.tree.decls.push(Decl::Enum(id));
                }
            }
            Clang::TypedefDecl {
                loc,
                is_implicit,
                name,
                qtype,
            } => {
                if *is_implicit || self.tree.lookup_typedef(name).is_some() {
                    return Ok(());
                }
                let ty = self.parse_type(qtype, name)?;
                self.adopt_if_anonymous(&ty, name);
                let id = self.tree.add_typedef(TypedefDef {
                    name: name.clone(),
                    ty,
                    origin: loc_file(loc),
                });
                self.tree.decls.push(Decl::Typedef(id));
            }
            Clang::FunctionDecl {
                loc,
                name,
                storage_class,
                qtype,
                variadic,
            } => {
                if storage_class.as_deref() == Some("static") {
                    debug!(name, "skipping static function");
                    return Ok(());
                }
                if !self.seen_funcs.insert(name.clone()) {
                    return Ok(());
                }
                let ty = self.parse_type(qtype, name)?;
                let TypeNode::Function(func) = ty else {
                    return Err(Error::Parse {
                        message: format!(
                            "function `{name}` has non-function type `{}`",
                            qtype.qual_type
                        ),
                        file: loc_file(loc),
                        line: None,
                    });
                };
                let mut func = *func;
                func.variadic |= *variadic;
                let mut param_names: Vec<Option<String>> = node
                    .inner
                    .iter()
                    .filter_map(|c| match &c.kind {
                        Clang::ParmVarDecl { name } => Some(name.clone()),
                        _ => None,
                    })
                    .collect();
                param_names.resize(func.params.len(), None);
                param_names.truncate(func.params.len());
                self.tree.decls.push(Decl::Function(FuncDecl {
                    name: name.clone(),
                    ty: func,
                    param_names,
                    origin: loc_file(loc),
                }));
            }
            Clang::VarDecl {
                loc,
                name,
                storage_class,
                qtype,
            } => {
                if storage_class.as_deref() == Some("static") {
                    debug!(name, "skipping static variable");
                    return Ok(());
                }
                if !self.seen_vars.insert(name.clone()) {
                    return Ok(());
                }
                let ty = self.parse_type(qtype, name)?;
                self.tree.decls.push(Decl::Var(VarDecl {
                    name: name.clone(),
                    ty,
                    origin: loc_file(loc),
                }));
            }
            _ => {}
        }
        Ok(())
    }

    fn lower_record_node(
        &mut self,
        node: &Node<Clang>,
        enclosing: &str,
        anon_ordinal: &mut u32,
    ) -> Result<RecordId, Error> {
        let Clang::RecordDecl {
            loc,
            name,
            tag_used,
            complete_definition,
        } = &node.kind
        else {
            unreachable!("lower_record_node called on a non-record node");
        };
        let kind = match tag_used.as_deref() {
            Some("union") => RecordKind::Union,
            _ => RecordKind::Struct,
        };
        let id = match name {
            Some(tag) => self.tree.intern_record_tag(kind, tag),
            None => {
                let id = self.tree.add_anonymous_record(kind, enclosing, *anon_ordinal);
                *anon_ordinal += 1;
                let base = self.tree.record(id).base_name.clone();
                self.tree.alias_record_tag(base.clone(), id);
                self.register_anon_rewrites(loc, kind.keyword(), &base);
                id
            }
        };
        if self.tree.record(id).origin.is_none() {
            self.tree.record_mut(id).origin = loc_file(loc);
        }
        if !complete_definition {
            return Ok(id);
        }

        let record_base = self.tree.record(id).base_name.clone();
        let mut nested_ordinal = 0u32;
        let mut fields = Vec::new();
        for child in &node.inner {
            match &child.kind {
                Clang::RecordDecl { .. } => {
                    self.lower_record_node(child, &record_base, &mut nested_ordinal)?;
                }
                Clang::EnumDecl { .. } => {
                    self.lower_enum_node(child, &record_base, &mut nested_ordinal)?;
                }
                Clang::FieldDecl {
                    name,
                    qtype,
                    is_bitfield,
                } => {
                    let display = name.as_deref().unwrap_or("<anonymous>");
                    let ty = self.parse_type(qtype, display)?;
                    let bit_width = if *is_bitfield {
                        let width =
                            child.inner.iter().find_map(int_value).ok_or_else(|| {
                                Error::Parse {
                                    message: format!(
                                        "bit-field `{record_base}.{display}` has no width"
                                    ),
                                    file: None,
                                    line: None,
                                }
                            })?;
                        Some(width as u32)
                    } else {
                        None
                    };
                    fields.push(Field {
                        name: name.clone(),
                        ty,
                        bit_width,
                    });
                }
                _ => {}
            }
        }
        self.tree.record_mut(id).fields = Some(fields);
        Ok(id)
    }

    fn lower_enum_node(
        &mut self,
        node: &Node<Clang>,
        enclosing: &str,
        anon_ordinal: &mut u32,
    ) -> Result<EnumId, Error> {
        let Clang::EnumDecl {
            loc,
            name,
            fixed_underlying_type,
        } = &node.kind
        else {
            unreachable!("lower_enum_node called on a non-enum node");
        };
        let id = match name {
            Some(tag) => self.tree.intern_enum_tag(tag),
            None => {
                let id = self.tree.add_anonymous_enum(enclosing, *anon_ordinal);
                *anon_ordinal += 1;
                let base = self.tree.enum_def(id).base_name.clone();
                self.tree.alias_enum_tag(base.clone(), id);
                self.register_anon_rewrites(loc, "enum", &base);
                id
            }
        };
        if self.tree.enum_def(id).origin.is_none() {
            self.tree.enum_def_mut(id).origin = loc_file(loc);
        }

        let mut constants = Vec::new();
        let mut next = 0i64;
        for child in &node.inner {
            if let Clang::EnumConstantDecl { name } = &child.kind {
                let value = child
                    .inner
                    .iter()
                    .find_map(int_value)
                    .map(|v| v as i64)
                    .unwrap_or(next);
                constants.push(EnumConstant {
                    name: name.clone(),
                    value,
                });
                next = value.wrapping_add(1);
            }
        }
        if constants.is_empty() {
            return Ok(id);
        }

        let underlying = match fixed_underlying_type {
            Some(qt) => {
                let display = self.tree.enum_def(id).base_name.clone();
                let ty = self.parse_type(qt, &display)?;
                match self.tree.strip_typedefs(&ty).clone() {
                    TypeNode::Primitive(spelling) => spelling,
                    other => {
                        return Err(Error::Unsupported {
                            decl: format!("enum {display}"),
                            construct: format!("non-integer underlying type {other:?}"),
                        });
                    }
                }
            }
            // Without a fixed underlying type, C picks int for enums with
            // negative enumerators and unsigned int otherwise.
            None if constants.iter().any(|c| c.value < 0) => "int".to_string(),
            None => "unsigned int".to_string(),
        };
        let def = self.tree.enum_def_mut(id);
        def.underlying = underlying;
        def.constants = constants;
        Ok(id)
    }

    /// Records every spelling fragment clang may use for this anonymous
    /// definition. Wording varies across clang versions.
    fn register_anon_rewrites(
        &mut self,
        loc: &Option<clang_ast::SourceLocation>,
        keyword: &str,
        base: &str,
    ) {
        let Some((file, line, col)) = loc_parts(loc) else {
            return;
        };
        for word in ["unnamed", "anonymous"] {
            self.anon_rewrites.push((
                format!("({word} {keyword} at {file}:{line}:{col})"),
                base.to_string(),
            ));
        }
        self.anon_rewrites
            .push((format!("(anonymous at {file}:{line}:{col})"), base.to_string()));
    }

    fn parse_type(&mut self, qtype: &QualType, needed_by: &str) -> Result<TypeNode, Error> {
        let spelling = self.rewrite(&qtype.qual_type);
        match ctype::parse(&spelling, &mut self.tree) {
            Ok(ty) => Ok(ty),
            Err(primary) => {
                if let Some(desugared) = &qtype.desugared_qual_type {
                    let fallback = self.rewrite(desugared);
                    if let Ok(ty) = ctype::parse(&fallback, &mut self.tree) {
                        debug!(
                            spelling = %qtype.qual_type,
                            %needed_by,
                            "parsed type through its desugared spelling"
                        );
                        return Ok(ty);
                    }
                }
                Err(primary)
            }
        }
    }

    fn rewrite(&self, spelling: &str) -> String {
        let mut out = spelling.to_string();
        for (pattern, replacement) in &self.anon_rewrites {
            if out.contains(pattern.as_str()) {
                out = out.replace(pattern.as_str(), replacement);
            }
        }
        out
    }

    fn adopt_if_anonymous(&mut self, ty: &TypeNode, name: &str) {
        let stripped = self.tree.strip_typedefs(ty).clone();
        match stripped {
            TypeNode::Record(id)
                if self.tree.record(id).tag.is_none() && self.adopted_records.insert(id) =>
            {
                self.tree.record_mut(id).base_name = name.to_string();
            }
            TypeNode::Enum(id)
                if self.tree.enum_def(id).tag.is_none() && self.adopted_enums.insert(id) =>
            {
                self.tree.enum_def_mut(id).base_name = name.to_string();
            }
            _ => {}
        }
    }
}

/// Digs an integer literal value out of a node or its descendants. Clang
/// wraps enum constant initializers and bit-field widths in ConstantExpr
/// nodes that carry the evaluated value as a string.
fn int_value(node: &Node<Clang>) -> Option<i128> {
    if let Clang::ConstantExpr { value } | Clang::IntegerLiteral { value } = &node.kind
        && let Some(text) = value
        && let Ok(parsed) = text.parse::<i128>()
    {
        return Some(parsed);
    }
    node.inner.iter().find_map(int_value)
}

fn loc_parts(loc: &Option<clang_ast::SourceLocation>) -> Option<(String, usize, usize)> {
    let bare = loc.as_ref()?.spelling_loc.as_ref()?;
    Some((bare.file.to_string(), bare.line, bare.col))
}

fn loc_file(loc: &Option<clang_ast::SourceLocation>) -> Option<String> {
    loc_parts(loc).map(|(file, _, _)| file)
}

/// Extracts integer constants from a `clang -dM -E` dump. Only object-like
/// macros whose body is a plain integer literal survive; reserved names are
/// dropped. Output is sorted by name for deterministic emission.
pub fn parse_macro_dump(text: &str) -> Vec<MacroConst> {
    let mut consts = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.strip_prefix("#define ") else {
            continue;
        };
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("");
        let body = parts.next().unwrap_or("").trim();
        if name.is_empty() || name.contains('(') || name.starts_with("__") {
            continue;
        }
        if let Some(value) = parse_int_body(body) {
            consts.push(MacroConst {
                name: name.to_string(),
                value,
            });
        }
    }
    consts.sort_by(|a, b| a.name.cmp(&b.name));
    consts.dedup_by(|a, b| a.name == b.name);
    consts
}

fn parse_int_body(body: &str) -> Option<i128> {
    let mut s = body.trim();
    while s.starts_with('(') && s.ends_with(')') {
        s = s[1..s.len() - 1].trim();
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };
    let digits = digits.trim_end_matches(['u', 'U', 'l', 'L']);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        i128::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i128::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i128>().ok()?
    };
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{RecordId, RecordKind};
    use std::path::Path;

    fn lower_json(json: &str) -> DeclarationTree {
        let root: Node<Clang> = serde_json::from_str(json).unwrap();
        lower(&root, Path::new("/include/probe.h")).unwrap()
    }

    #[test]
    fn struct_definition_lowers_with_fields_and_origin() {
        let tree = lower_json(
            r#"{
                "id": "0x1", "kind": "TranslationUnitDecl",
                "inner": [{
                    "id": "0x2", "kind": "RecordDecl",
                    "loc": {"offset": 0, "file": "/include/probe.h", "line": 1, "col": 8, "tokLen": 5},
                    "name": "point", "tagUsed": "struct", "completeDefinition": true,
                    "inner": [
                        {"id": "0x3", "kind": "FieldDecl", "name": "x", "type": {"qualType": "int"}},
                        {"id": "0x4", "kind": "FieldDecl", "name": "y", "type": {"qualType": "int"}}
                    ]
                }]
            }"#,
        );
        assert_eq!(tree.records.len(), 1);
        let rec = &tree.records[0];
        assert_eq!(rec.kind, RecordKind::Struct);
        assert_eq!(rec.tag.as_deref(), Some("point"));
        assert_eq!(rec.fields.as_ref().unwrap().len(), 2);
        assert_eq!(rec.origin.as_deref(), Some("/include/probe.h"));
        assert!(matches!(tree.decls[0], Decl::Record(_)));
    }

    #[test]
    fn typedef_adopts_anonymous_struct() {
        let tree = lower_json(
            r#"{
                "id": "0x1", "kind": "TranslationUnitDecl",
                "inner": [
                    {
                        "id": "0x2", "kind": "RecordDecl",
                        "loc": {"offset": 0, "file": "/include/probe.h", "line": 1, "col": 9, "tokLen": 1},
                        "tagUsed": "struct", "completeDefinition": true,
                        "inner": [
                            {"id": "0x3", "kind": "FieldDecl", "name": "n", "type": {"qualType": "int"}}
                        ]
                    },
                    {
                        "id": "0x4", "kind": "TypedefDecl",
                        "loc": {"offset": 0, "file": "/include/probe.h", "line": 3, "col": 3, "tokLen": 6},
                        "name": "widget_t",
                        "type": {"qualType": "struct (unnamed struct at /include/probe.h:1:9)"}
                    }
                ]
            }"#,
        );
        let rec = &tree.records[0];
        assert!(rec.tag.is_none());
        assert_eq!(rec.base_name, "widget_t");
        let td = tree.lookup_typedef("widget_t").unwrap();
        assert_eq!(tree.typedef(td).ty, TypeNode::Record(RecordId(0)));
    }

    #[test]
    fn nested_anonymous_union_is_linked_to_its_field() {
        let tree = lower_json(
            r#"{
                "id": "0x1", "kind": "TranslationUnitDecl",
                "inner": [{
                    "id": "0x2", "kind": "RecordDecl",
                    "loc": {"offset": 0, "file": "/include/probe.h", "line": 1, "col": 8, "tokLen": 3},
                    "name": "msg", "tagUsed": "struct", "completeDefinition": true,
                    "inner": [
                        {"id": "0x3", "kind": "FieldDecl", "name": "len", "type": {"qualType": "unsigned int"}},
                        {
                            "id": "0x4", "kind": "RecordDecl",
                            "loc": {"offset": 0, "file": "/include/probe.h", "line": 3, "col": 3, "tokLen": 5},
                            "tagUsed": "union", "completeDefinition": true,
                            "inner": [
                                {"id": "0x5", "kind": "FieldDecl", "name": "raw", "type": {"qualType": "unsigned int"}}
                            ]
                        },
                        {"id": "0x6", "kind": "FieldDecl", "name": "body",
                         "type": {"qualType": "union (unnamed union at /include/probe.h:3:3)"}}
                    ]
                }]
            }"#,
        );
        assert_eq!(tree.records.len(), 2);
        let anon = &tree.records[1];
        assert_eq!(anon.kind, RecordKind::Union);
        assert_eq!(anon.base_name, "msg__anon0");
        let outer = tree.records[0].fields.as_ref().unwrap();
        assert_eq!(outer[1].name.as_deref(), Some("body"));
        assert_eq!(outer[1].ty, TypeNode::Record(RecordId(1)));
    }

    #[test]
    fn enum_constants_count_up_from_initializers() {
        let tree = lower_json(
            r#"{
                "id": "0x1", "kind": "TranslationUnitDecl",
                "inner": [{
                    "id": "0x2", "kind": "EnumDecl",
                    "loc": {"offset": 0, "file": "/include/probe.h", "line": 1, "col": 6, "tokLen": 4},
                    "name": "mode",
                    "inner": [
                        {"id": "0x3", "kind": "EnumConstantDecl", "name": "MODE_OFF"},
                        {"id": "0x4", "kind": "EnumConstantDecl", "name": "MODE_ON",
                         "inner": [{"id": "0x5", "kind": "ConstantExpr", "value": "4"}]},
                        {"id": "0x6", "kind": "EnumConstantDecl", "name": "MODE_AUTO"}
                    ]
                }]
            }"#,
        );
        let def = &tree.enums[0];
        assert_eq!(def.underlying, "unsigned int");
        let values: Vec<i64> = def.constants.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![0, 4, 5]);
    }

    #[test]
    fn negative_enumerator_switches_underlying_to_int() {
        let tree = lower_json(
            r#"{
                "id": "0x1", "kind": "TranslationUnitDecl",
                "inner": [{
                    "id": "0x2", "kind": "EnumDecl",
                    "loc": {"offset": 0, "file": "/include/probe.h", "line": 1, "col": 6, "tokLen": 3},
                    "name": "err",
                    "inner": [
                        {"id": "0x3", "kind": "EnumConstantDecl", "name": "E_FAIL",
                         "inner": [{"id": "0x4", "kind": "ConstantExpr", "value": "-1"}]},
                        {"id": "0x5", "kind": "EnumConstantDecl", "name": "E_OK",
                         "inner": [{"id": "0x6", "kind": "ConstantExpr", "value": "0"}]}
                    ]
                }]
            }"#,
        );
        assert_eq!(tree.enums[0].underlying, "int");
    }

    #[test]
    fn bitfield_width_comes_from_the_inner_constant() {
        let tree = lower_json(
            r#"{
                "id": "0x1", "kind": "TranslationUnitDecl",
                "inner": [{
                    "id": "0x2", "kind": "RecordDecl",
                    "loc": {"offset": 0, "file": "/include/probe.h", "line": 1, "col": 8, "tokLen": 5},
                    "name": "flags", "tagUsed": "struct", "completeDefinition": true,
                    "inner": [
                        {"id": "0x3", "kind": "FieldDecl", "name": "ready",
                         "type": {"qualType": "unsigned int"}, "isBitfield": true,
                         "inner": [{"id": "0x4", "kind": "ConstantExpr", "value": "1"}]},
                        {"id": "0x5", "kind": "FieldDecl", "name": "kind",
                         "type": {"qualType": "unsigned int"}, "isBitfield": true,
                         "inner": [{"id": "0x6", "kind": "ConstantExpr", "value": "3"}]}
                    ]
                }]
            }"#,
        );
        let fields = tree.records[0].fields.as_ref().unwrap();
        assert_eq!(fields[0].bit_width, Some(1));
        assert_eq!(fields[1].bit_width, Some(3));
    }

    #[test]
    fn static_functions_are_not_lowered() {
        let tree = lower_json(
            r#"{
                "id": "0x1", "kind": "TranslationUnitDecl",
                "inner": [
                    {
                        "id": "0x2", "kind": "FunctionDecl",
                        "loc": {"offset": 0, "file": "/include/probe.h", "line": 1, "col": 5, "tokLen": 6},
                        "name": "helper", "storageClass": "static",
                        "type": {"qualType": "int (void)"}
                    },
                    {
                        "id": "0x3", "kind": "FunctionDecl",
                        "loc": {"offset": 0, "file": "/include/probe.h", "line": 2, "col": 5, "tokLen": 7},
                        "name": "visible",
                        "type": {"qualType": "int (int, char *)"},
                        "inner": [
                            {"id": "0x4", "kind": "ParmVarDecl", "name": "count", "type": {"qualType": "int"}},
                            {"id": "0x5", "kind": "ParmVarDecl", "name": "buf", "type": {"qualType": "char *"}}
                        ]
                    }
                ]
            }"#,
        );
        assert_eq!(tree.decls.len(), 1);
        let Decl::Function(func) = &tree.decls[0] else {
            panic!("expected a function decl");
        };
        assert_eq!(func.name, "visible");
        assert_eq!(func.param_names[0].as_deref(), Some("count"));
        assert_eq!(func.ty.params.len(), 2);
    }

    #[test]
    fn variadic_prototype_is_flagged() {
        let tree = lower_json(
            r#"{
                "id": "0x1", "kind": "TranslationUnitDecl",
                "inner": [{
                    "id": "0x2", "kind": "FunctionDecl",
                    "loc": {"offset": 0, "file": "/include/probe.h", "line": 1, "col": 5, "tokLen": 6},
                    "name": "logf2", "variadic": true,
                    "type": {"qualType": "int (const char *, ...)"},
                    "inner": [
                        {"id": "0x3", "kind": "ParmVarDecl", "name": "fmt", "type": {"qualType": "const char *"}}
                    ]
                }]
            }"#,
        );
        let Decl::Function(func) = &tree.decls[0] else {
            panic!("expected a function decl");
        };
        assert!(func.ty.variadic);
        assert_eq!(func.ty.params.len(), 1);
    }

    #[test]
    fn macro_dump_keeps_plain_integers_only() {
        let consts = parse_macro_dump(
            "#define __GNUC__ 13\n\
             #define PROBE_MAX 0x40\n\
             #define PROBE_MIN (8)\n\
             #define PROBE_NAME \"probe\"\n\
             #define PROBE_SUM (PROBE_MAX + 1)\n\
             #define PROBE_UL 32UL\n\
             #define probe_pair(a, b) ((a) | (b))\n",
        );
        let names: Vec<&str> = consts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["PROBE_MAX", "PROBE_MIN", "PROBE_UL"]);
        assert_eq!(consts[0].value, 0x40);
        assert_eq!(consts[1].value, 8);
        assert_eq!(consts[2].value, 32);
    }
}

//! Naming and visibility policy: which declarations are emitted, and under
//! what Rust identifier. All decisions are driven by [NamingPolicy] in the
//! run configuration; nothing here knows about any particular header.

use cbind_core::Error;
use cbind_core::config::{Config, SymbolFilter};
use std::path::{Path, PathBuf};

/// What a C identifier names, for case normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameKind {
    /// Records, enums, typedefs. Normalizes to UpperCamelCase.
    Type,
    /// Functions, variables, fields, parameters. Normalizes to snake_case.
    Value,
    /// Enum constants and macro constants. Normalizes to SCREAMING_SNAKE_CASE.
    Constant,
}

/// A renamed identifier. `link_name` is populated when the Rust spelling no
/// longer matches the C symbol and the declaration links by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Renamed {
    pub rust: String,
    pub link_name: Option<String>,
}

#[derive(Debug)]
pub struct NamePolicy {
    preserve_case: bool,
    strip_prefix: Option<String>,
    filter: SymbolFilter,
    main_header_only: bool,
    main_header: PathBuf,
    pub exclude_doc_comments: bool,
}

impl NamePolicy {
    pub fn from_config(config: &Config) -> Result<NamePolicy, Error> {
        Ok(NamePolicy {
            preserve_case: config.naming.preserve_case,
            strip_prefix: config.naming.strip_prefix.clone(),
            filter: config.naming.compile_filter()?,
            main_header_only: config.naming.main_header_only,
            main_header: config.header.clone(),
            exclude_doc_comments: config.naming.exclude_doc_comments,
        })
    }

    /// Whether a declaration with this original name and origin file is
    /// visible in the output. Filters match original C identifiers, before
    /// any renaming.
    pub fn admits(&self, original: &str, origin: Option<&str>) -> bool {
        if !self.filter.admits(original) {
            return false;
        }
        if !self.main_header_only {
            return true;
        }
        match origin {
            Some(file) => {
                let file = Path::new(file);
                file == self.main_header
                    || (file.file_name().is_some()
                        && file.file_name() == self.main_header.file_name())
            }
            // No origin means the declaration was synthesized (macro
            // constants from the preprocessor dump); those pass.
            None => true,
        }
    }

    /// Maps an original C identifier to its Rust spelling.
    pub fn rename(&self, original: &str, kind: NameKind) -> Renamed {
        let mut name = match &self.strip_prefix {
            Some(prefix) => match original.strip_prefix(prefix.as_str()) {
                // Never strip down to nothing or to a non-identifier start.
                Some(rest) if !rest.is_empty() && !rest.starts_with(|c: char| c.is_ascii_digit()) => {
                    rest.to_string()
                }
                _ => original.to_string(),
            },
            None => original.to_string(),
        };
        if !self.preserve_case {
            name = match kind {
                NameKind::Type => to_upper_camel(&name),
                NameKind::Value => to_snake(&name),
                NameKind::Constant => to_snake(&name).to_uppercase(),
            };
        }
        if is_rust_keyword(&name) {
            name.push('_');
        }
        let link_name = if name == original {
            None
        } else {
            Some(original.to_string())
        };
        Renamed {
            rust: name,
            link_name,
        }
    }
}

/// Strict and reserved keywords across editions. Raw identifiers are not
/// used; a trailing underscore keeps generated names grep-friendly.
const RUST_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub",
    "ref", "return", "self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

fn is_rust_keyword(name: &str) -> bool {
    RUST_KEYWORDS.contains(&name) || name == "Self"
}

fn to_upper_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for word in name.split('_').filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    if out.is_empty() { name.to_string() } else { out }
}

fn to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

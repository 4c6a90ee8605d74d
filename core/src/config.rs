//! Run configuration for the binding generator.
//!
//! A [Config] is assembled once by the CLI (defaults, optional TOML file,
//! command-line overrides), then treated as immutable: every pipeline
//! component receives a shared reference and none may alter it. This keeps a
//! run a pure function of (header, configuration).

use crate::Error;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_clang() -> String {
    "clang".to_string()
}

/// Immutable configuration for one generation run.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// The header to generate bindings for.
    pub header: PathBuf,

    /// Include search directories passed to the front end as `-I`.
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,

    /// Predefined macros passed to the front end as `-D` (`NAME` or
    /// `NAME=VALUE`).
    #[serde(default)]
    pub defines: Vec<String>,

    /// The C front end executable.
    #[serde(default = "default_clang")]
    pub clang: String,

    /// Where to write the generated source; `None` writes to stdout.
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Overrides and additions to the primitive-type table, keyed by the
    /// canonical C spelling (e.g. `"unsigned long"`).
    #[serde(default)]
    pub primitive_types: BTreeMap<String, String>,

    /// Map C primitives onto `::core::ffi` when true, `libc` when false.
    #[serde(default = "default_true")]
    pub use_core_types_only: bool,

    /// Naming and visibility policy.
    #[serde(default)]
    pub naming: NamingPolicy,

    /// Text injected verbatim before any generated declaration.
    #[serde(default)]
    pub prologue: Option<String>,

    /// Post-processing style pass for the generated source.
    #[serde(default)]
    pub formatter: FormatterKind,

    /// How to handle functions with a variadic tail.
    #[serde(default)]
    pub variadic: VariadicPolicy,

    /// Also scan object-like `#define`s with integer bodies into `pub const`s.
    #[serde(default = "default_true")]
    pub macro_constants: bool,
}

impl Config {
    /// A minimal configuration for tests: everything defaulted, no header.
    pub fn mock() -> Config {
        Config {
            header: PathBuf::new(),
            include_dirs: Vec::new(),
            defines: Vec::new(),
            clang: default_clang(),
            output: None,
            primitive_types: BTreeMap::new(),
            use_core_types_only: true,
            naming: NamingPolicy::default(),
            prologue: None,
            formatter: FormatterKind::None,
            variadic: VariadicPolicy::default(),
            macro_constants: true,
        }
    }

    /// The effective primitive-type table: built-in defaults for the chosen
    /// C-compatible types module, with user entries layered on top.
    pub fn primitive_table(&self) -> BTreeMap<String, String> {
        let mut table = default_primitive_table(self.use_core_types_only);
        for (spelling, target) in &self.primitive_types {
            table.insert(spelling.clone(), target.clone());
        }
        table
    }
}

/// Name transformations and per-symbol visibility rules. All options are
/// configuration-driven; nothing here is hard-coded to a particular header.
#[derive(Debug, Deserialize)]
pub struct NamingPolicy {
    /// Keep C identifier casing as-is. When false, types are normalized to
    /// UpperCamelCase, functions and fields to snake_case, and constants to
    /// SCREAMING_SNAKE_CASE.
    #[serde(default = "default_true")]
    pub preserve_case: bool,

    /// A prefix stripped from every emitted top-level identifier.
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// Regex over original identifiers; when set, only matching declarations
    /// are emitted.
    #[serde(default)]
    pub allowlist: Option<String>,

    /// Regex over original identifiers; matching declarations are dropped.
    #[serde(default)]
    pub blocklist: Option<String>,

    /// Only emit declarations whose definition originates in the main header
    /// (as opposed to anything pulled in through `#include`).
    #[serde(default)]
    pub main_header_only: bool,

    /// Suppress the generated provenance doc comments.
    #[serde(default)]
    pub exclude_doc_comments: bool,
}

impl Default for NamingPolicy {
    fn default() -> NamingPolicy {
        NamingPolicy {
            preserve_case: true,
            strip_prefix: None,
            allowlist: None,
            blocklist: None,
            main_header_only: false,
            exclude_doc_comments: false,
        }
    }
}

impl NamingPolicy {
    /// Compiles the allow/deny patterns. Pattern errors are configuration
    /// errors, reported before the pipeline starts.
    pub fn compile_filter(&self) -> Result<SymbolFilter, Error> {
        let compile = |pattern: &Option<String>| -> Result<Option<Regex>, Error> {
            match pattern {
                None => Ok(None),
                Some(p) => Regex::new(p)
                    .map(Some)
                    .map_err(|e| Error::Config(format!("bad filter pattern `{p}`: {e}"))),
            }
        };
        Ok(SymbolFilter {
            allow: compile(&self.allowlist)?,
            deny: compile(&self.blocklist)?,
        })
    }
}

/// Compiled allow/deny predicates over original C identifiers.
#[derive(Debug)]
pub struct SymbolFilter {
    allow: Option<Regex>,
    deny: Option<Regex>,
}

impl SymbolFilter {
    pub fn admits(&self, name: &str) -> bool {
        if let Some(deny) = &self.deny
            && deny.is_match(name)
        {
            return false;
        }
        match &self.allow {
            Some(allow) => allow.is_match(name),
            None => true,
        }
    }
}

/// Which style pass to run over the emitted source.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormatterKind {
    /// Pipe the output through the external `rustfmt` binary.
    #[default]
    Rustfmt,
    /// Emit the generator's own layout untouched.
    None,
}

/// Policy for functions with a variadic tail. Approximation is documented as
/// lossy: the `...` is replaced by a fixed number of pointer-sized arguments.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariadicPolicy {
    /// Fail the run with an unsupported-construct error.
    #[default]
    Reject,
    /// Emit the declared parameters plus `max_extra` trailing `usize` slots.
    Cap { max_extra: u32 },
}

fn default_primitive_table(use_core: bool) -> BTreeMap<String, String> {
    let prefix = if use_core { "::core::ffi::" } else { "libc::" };
    let c = |name: &str| format!("{prefix}{name}");
    let mut table = BTreeMap::new();
    table.insert("bool".to_string(), "bool".to_string());
    table.insert("char".to_string(), c("c_char"));
    table.insert("signed char".to_string(), c("c_schar"));
    table.insert("unsigned char".to_string(), c("c_uchar"));
    table.insert("short".to_string(), c("c_short"));
    table.insert("unsigned short".to_string(), c("c_ushort"));
    table.insert("int".to_string(), c("c_int"));
    table.insert("unsigned int".to_string(), c("c_uint"));
    table.insert("long".to_string(), c("c_long"));
    table.insert("unsigned long".to_string(), c("c_ulong"));
    table.insert("long long".to_string(), c("c_longlong"));
    table.insert("unsigned long long".to_string(), c("c_ulonglong"));
    table.insert("float".to_string(), "f32".to_string());
    table.insert("double".to_string(), "f64".to_string());
    table.insert("long double".to_string(), "u128".to_string());
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_uses_core_ffi() {
        let config = Config::mock();
        let table = config.primitive_table();
        assert_eq!(table["int"], "::core::ffi::c_int");
        assert_eq!(table["float"], "f32");
    }

    #[test]
    fn user_entries_override_defaults() {
        let mut config = Config::mock();
        config
            .primitive_types
            .insert("int".to_string(), "i32".to_string());
        config
            .primitive_types
            .insert("__int128".to_string(), "i128".to_string());
        let table = config.primitive_table();
        assert_eq!(table["int"], "i32");
        assert_eq!(table["__int128"], "i128");
    }

    #[test]
    fn libc_prefix_when_core_types_disabled() {
        let mut config = Config::mock();
        config.use_core_types_only = false;
        assert_eq!(config.primitive_table()["unsigned long"], "libc::c_ulong");
    }

    #[test]
    fn filter_deny_wins_over_allow() {
        let policy = NamingPolicy {
            allowlist: Some("^foo_".to_string()),
            blocklist: Some("_private$".to_string()),
            ..NamingPolicy::default()
        };
        let filter = policy.compile_filter().unwrap();
        assert!(filter.admits("foo_bar"));
        assert!(!filter.admits("foo_bar_private"));
        assert!(!filter.admits("other"));
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        let policy = NamingPolicy {
            allowlist: Some("(".to_string()),
            ..NamingPolicy::default()
        };
        assert!(matches!(
            policy.compile_filter(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn variadic_policy_deserializes_from_toml_shapes() {
        #[derive(Deserialize)]
        struct Holder {
            variadic: VariadicPolicy,
        }
        let reject: Holder = serde_json::from_str(r#"{"variadic":"reject"}"#).unwrap();
        assert_eq!(reject.variadic, VariadicPolicy::Reject);
        let cap: Holder =
            serde_json::from_str(r#"{"variadic":{"cap":{"max_extra":4}}}"#).unwrap();
        assert_eq!(cap.variadic, VariadicPolicy::Cap { max_extra: 4 });
    }
}

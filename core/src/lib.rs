//! Shared foundation for the cbind binding generator: the pipeline stage
//! ladder, the error taxonomy, run configuration, and test utilities.

pub mod config;
pub mod test_util;

use std::fmt;
use thiserror::Error;

/// Stages of the generation pipeline, in execution order. A run advances
/// strictly forward through these; there is no retry or partial-success
/// state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    Parsed,
    Resolved,
    Validated,
    Emitted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Parsed => "parsed",
            Stage::Resolved => "resolved",
            Stage::Validated => "validated",
            Stage::Emitted => "emitted",
        };
        f.write_str(name)
    }
}

/// Fatal error taxonomy for a generation run. Every variant aborts the run;
/// formatter trouble is deliberately *not* here (see [FormatterError]) because
/// it degrades to unformatted output instead of failing.
#[derive(Debug, Error)]
pub enum Error {
    /// The C front end could not produce a declaration tree.
    #[error("parse error{}: {message}", location_suffix(.file.as_deref(), *.line))]
    Parse {
        message: String,
        file: Option<String>,
        line: Option<usize>,
    },

    /// A C primitive spelling has no entry in the primitive-type table.
    #[error("no primitive mapping for C type `{spelling}` (needed by `{needed_by}`)")]
    UnknownPrimitive { spelling: String, needed_by: String },

    /// The target-language layout recomputation disagrees with the front
    /// end's report. Never auto-corrected; a silently wrong offset is memory
    /// corruption at runtime.
    #[error(
        "layout mismatch in `{type_name}`: {what} of `{}` is {computed}, front end reports {expected}",
        .field.as_deref().unwrap_or("<whole type>")
    )]
    LayoutMismatch {
        type_name: String,
        field: Option<String>,
        what: &'static str,
        expected: u64,
        computed: u64,
    },

    /// A construct the generator cannot represent faithfully (and was not
    /// configured to approximate).
    #[error("unsupported construct in `{decl}`: {construct}")]
    Unsupported { decl: String, construct: String },

    /// Bad run configuration (e.g. an invalid filter pattern).
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn location_suffix(file: Option<&str>, line: Option<usize>) -> String {
    match (file, line) {
        (Some(f), Some(l)) => format!(" at {f}:{l}"),
        (Some(f), None) => format!(" at {f}"),
        _ => String::new(),
    }
}

/// The one non-fatal failure: a formatting backend rejected the generated
/// source. Callers log it and fall back to the unformatted text.
#[derive(Debug, Error)]
#[error("formatter `{backend}` failed: {message}")]
pub struct FormatterError {
    pub backend: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Init < Stage::Parsed);
        assert!(Stage::Parsed < Stage::Resolved);
        assert!(Stage::Resolved < Stage::Validated);
        assert!(Stage::Validated < Stage::Emitted);
    }

    #[test]
    fn layout_mismatch_names_the_field() {
        let err = Error::LayoutMismatch {
            type_name: "cn_msg".into(),
            field: Some("len".into()),
            what: "offset",
            expected: 16,
            computed: 12,
        };
        let text = err.to_string();
        assert!(text.contains("cn_msg"));
        assert!(text.contains("len"));
        assert!(text.contains("16"));
        assert!(text.contains("12"));
    }

    #[test]
    fn parse_error_carries_location() {
        let err = Error::Parse {
            message: "unexpected token".into(),
            file: Some("evil.h".into()),
            line: Some(7),
        };
        assert!(err.to_string().contains("evil.h:7"));
    }
}

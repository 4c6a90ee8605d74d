//! The `cbind` generation pipeline: clang front end, type resolver, layout
//! validator, and code emitter, wired together as a strictly forward pass
//! over [cbind_core::Stage].

pub mod abi;
pub mod cli;
pub mod ctype;
pub mod emit;
pub mod frontend;
pub mod ir;
pub mod layout;
pub mod policy;
pub mod resolve;

use crate::ir::DeclarationTree;
use crate::policy::NamePolicy;
use cbind_core::config::Config;
use cbind_core::{Error, Stage};
use std::io::Write as _;
use std::path::Path;
use tracing::{info, warn};

/// A failed run: the error plus the furthest stage the pipeline reached.
/// There is no retry or partial-success state; re-running the whole pipeline
/// is the only recovery path.
#[derive(Debug, thiserror::Error)]
#[error("failed after stage `{stage}`: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: Error,
}

/// Runs the full pipeline and returns the generated source text.
pub fn generate(config: &Config) -> Result<String, PipelineFailure> {
    let at = |stage: Stage| move |error: Error| PipelineFailure { stage, error };
    info!(header = %config.header.display(), "starting generation");
    let policy = NamePolicy::from_config(config).map_err(at(Stage::Init))?;
    let tree = frontend::parse(config).map_err(at(Stage::Init))?;
    generate_from_tree(&tree, config, &policy)
}

/// The pipeline from a parsed tree onward. Split from [generate] so tests
/// can run everything downstream of the clang invocation.
fn generate_from_tree(
    tree: &DeclarationTree,
    config: &Config,
    policy: &NamePolicy,
) -> Result<String, PipelineFailure> {
    let at = |stage: Stage| move |error: Error| PipelineFailure { stage, error };
    info!(stage = %Stage::Parsed, decls = tree.decls.len(), "declaration tree ready");

    let resolved = resolve::resolve(tree, config, policy).map_err(at(Stage::Parsed))?;
    info!(stage = %Stage::Resolved, units = resolved.units.len(), "types resolved");

    layout::validate(&resolved).map_err(at(Stage::Resolved))?;
    info!(stage = %Stage::Validated, "layout verified against the front-end report");

    let text = emit::emit(&resolved, policy, config.prologue.as_deref());
    let formatter = emit::formatter_for(config.formatter);
    let text = match formatter.format(&text) {
        Ok(formatted) => formatted,
        // The one non-fatal failure: fall back to the unformatted text.
        Err(e) => {
            warn!("{e}; emitting unformatted output");
            text
        }
    };
    info!(stage = %Stage::Emitted, bytes = text.len(), "generation complete");
    Ok(text)
}

/// Runs the pipeline and writes the output to the configured destination
/// (stdout when none). File output is atomic: the text lands in a temporary
/// file that is persisted over the target only after a fully successful run,
/// so a pre-existing binding file is never clobbered by a failure.
pub fn generate_to(config: &Config) -> Result<(), PipelineFailure> {
    let text = generate(config)?;
    write_output(config.output.as_deref(), &text).map_err(|error| PipelineFailure {
        stage: Stage::Emitted,
        error,
    })
}

fn write_output(path: Option<&Path>, text: &str) -> Result<(), Error> {
    match path {
        None => {
            std::io::stdout().write_all(text.as_bytes())?;
            Ok(())
        }
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(text.as_bytes())?;
            tmp.persist(path).map_err(|e| Error::Io(e.error))?;
            Ok(())
        }
    }
}

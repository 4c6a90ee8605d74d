//! Command-line interface for the `cbind` binary. Configuration is layered:
//! built-in defaults, then the user config file, then a `cbind.toml` in the
//! working directory, then `-c NAME=VALUE` overrides, with a handful of
//! dedicated flags on top.

use cbind_core::config::Config;
use clap::Parser;
use config::FileFormat::Toml;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "cbind", about = "Generate Rust FFI bindings from a C header")]
pub struct Args {
    /// The C header to generate bindings for.
    pub header: Option<PathBuf>,

    /// Where to write the bindings; stdout when absent.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Add an include search directory (repeatable).
    #[arg(short = 'I', long = "include")]
    pub include_dirs: Vec<PathBuf>,

    /// Predefine a macro, NAME or NAME=VALUE (repeatable).
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// Set a configuration value; format $NAME=$VALUE.
    #[arg(short, long)]
    pub config: Vec<String>,

    /// Prints out the location of the config file.
    #[arg(long)]
    pub print_config_path: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Loads the layered configuration, or `None` when the invocation only
/// wanted the config file path printed.
pub fn initialize(args: &Args) -> Option<Config> {
    let dirs = ProjectDirs::from("", "", "cbind").expect("no home directory found");
    if args.print_config_path {
        println!("Config file location: {:?}", config_file(dirs.config_dir()));
        return None;
    }
    Some(load_config(args, dirs.config_dir()))
}

fn config_file(config_dir: &Path) -> PathBuf {
    config_dir.join("config.toml")
}

fn load_config(args: &Args, config_dir: &Path) -> Config {
    let mut settings = config::Config::builder()
        .add_source(config::File::from_str(
            include_str!("../default_config.toml"),
            Toml,
        ))
        .add_source(config::File::from(config_file(config_dir)).required(false))
        .add_source(config::File::from(PathBuf::from("cbind.toml")).required(false));
    for config_arg in &args.config {
        let Some((name, value)) = config_arg.split_once('=') else {
            panic!("failed to parse config value {config_arg:?}; no '=' found");
        };
        settings = settings
            .set_override(name, value)
            .expect("settings override failed");
    }
    let mut config: Config = settings
        .build()
        .expect("failed to build settings")
        .try_deserialize()
        .expect("config deserialization failed");
    // Dedicated flags beat every config source.
    if let Some(header) = &args.header {
        config.header = header.clone();
    }
    if let Some(output) = &args.output {
        config.output = Some(output.clone());
    }
    // `-o -` means stdout, like most generators.
    if config.output.as_deref() == Some(Path::new("-")) {
        config.output = None;
    }
    config.include_dirs.extend(args.include_dirs.iter().cloned());
    config.defines.extend(args.defines.iter().cloned());
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbind_core::config::FormatterKind;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("cbind").chain(argv.iter().copied()))
    }

    #[cfg(not(miri))]
    #[test]
    fn defaults_apply_without_any_config_file() {
        let dir = cbind_core::test_util::tempdir().unwrap();
        let config = load_config(&args(&["probe.h"]), dir.path());
        assert_eq!(config.header, PathBuf::from("probe.h"));
        assert_eq!(config.clang, "clang");
        assert_eq!(config.formatter, FormatterKind::Rustfmt);
        assert!(config.naming.preserve_case);
        assert!(config.macro_constants);
    }

    #[cfg(not(miri))]
    #[test]
    fn user_config_file_overrides_defaults() {
        let dir = cbind_core::test_util::tempdir().unwrap();
        std::fs::write(
            config_file(dir.path()),
            "clang = \"clang-19\"\n[naming]\nstrip_prefix = \"cn_\"\n",
        )
        .unwrap();
        let config = load_config(&args(&["probe.h"]), dir.path());
        assert_eq!(config.clang, "clang-19");
        assert_eq!(config.naming.strip_prefix.as_deref(), Some("cn_"));
    }

    #[cfg(not(miri))]
    #[test]
    fn dash_output_means_stdout() {
        let dir = cbind_core::test_util::tempdir().unwrap();
        let config = load_config(&args(&["probe.h", "-o", "-"]), dir.path());
        assert!(config.output.is_none());
        let config = load_config(&args(&["probe.h", "-o", "out.rs"]), dir.path());
        assert_eq!(config.output, Some(PathBuf::from("out.rs")));
    }

    #[cfg(not(miri))]
    #[test]
    fn dash_c_overrides_beat_the_config_file() {
        let dir = cbind_core::test_util::tempdir().unwrap();
        std::fs::write(config_file(dir.path()), "formatter = \"rustfmt\"\n").unwrap();
        let config = load_config(
            &args(&["probe.h", "-c", "formatter=none", "-I", "/opt/include"]),
            dir.path(),
        );
        assert_eq!(config.formatter, FormatterKind::None);
        assert_eq!(config.include_dirs, vec![PathBuf::from("/opt/include")]);
    }
}

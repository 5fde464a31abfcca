// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::discovery::DEFAULT_CONFIG_GLOB;
use crate::config::settings::SettingsOverrides;
use crate::types::Verbosity;

/// Command-line arguments for `retemplate`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "retemplate",
    version,
    about = "Re-render templates into target files whenever their sources change.",
    long_about = None
)]
pub struct CliArgs {
    /// Workspace root to search for config documents. Repeatable.
    ///
    /// Default: the current working directory.
    #[arg(long = "workspace", value_name = "DIR")]
    pub workspaces: Vec<PathBuf>,

    /// Glob (relative to each workspace root) matching config documents.
    #[arg(long, value_name = "GLOB", default_value = DEFAULT_CONFIG_GLOB)]
    pub config_glob: String,

    /// Settings file (TOML with a `[settings]` table).
    ///
    /// Default: `retemplate.toml` in the first workspace root.
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Template file extension inside directory transforms (e.g. `.njk`).
    #[arg(long, value_name = "EXT")]
    pub extension: Option<String>,

    /// Extra template search path, relative to the workspace root.
    /// Repeatable; replaces the list from the settings file.
    #[arg(long = "search-path", value_name = "DIR")]
    pub search_paths: Vec<String>,

    /// Diagnostics verbosity (silent, normal, verbose).
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub verbosity: Option<Verbosity>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RETEMPLATE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load configuration, render every transform once, then exit.
    #[arg(long)]
    pub once: bool,

    /// Load configuration and print the resolved transforms and variables
    /// without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Settings given on the command line.
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            template_extension: self.extension.clone(),
            search_paths: (!self.search_paths.is_empty()).then(|| self.search_paths.clone()),
            verbosity: self.verbosity,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let args = CliArgs::parse_from(["retemplate"]);
        assert!(args.workspaces.is_empty());
        assert_eq!(args.config_glob, DEFAULT_CONFIG_GLOB);
        let o = args.overrides();
        assert!(o.template_extension.is_none() && o.search_paths.is_none() && o.verbosity.is_none());

        let args = CliArgs::parse_from([
            "retemplate",
            "--workspace",
            "/a",
            "--workspace",
            "/b",
            "--search-path",
            "shared",
            "--extension",
            "tpl",
            "--verbosity",
            "verbose",
            "--once",
        ]);
        assert_eq!(args.workspaces, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        let o = args.overrides();
        assert_eq!(o.search_paths, Some(vec!["shared".to_string()]));
        assert_eq!(o.template_extension.as_deref(), Some("tpl"));
        assert_eq!(o.verbosity, Some(Verbosity::Verbose));
        assert!(args.once);
    }
}

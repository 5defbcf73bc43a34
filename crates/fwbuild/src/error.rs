//! Fatal configuration errors.
//!
//! Everything in here is detected while the configuration is loaded or while
//! the task graph is being built, before any toolchain process is spawned.
//! Failures of the toolchain itself belong to the executors and travel as
//! `anyhow::Error`.

use std::path::PathBuf;

/// Result alias for the configuration and graph-construction layer.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid option table entry '{key}': {message}")]
    InvalidOption { key: String, message: String },

    #[error("variants '{first}' and '{second}' share the output directory {}", dir.display())]
    DuplicateOutput {
        first: String,
        second: String,
        dir: PathBuf,
    },

    #[error(
        "variants '{first}' and '{second}' both write {} (source '{source_path}' of module '{module}')",
        object.display()
    )]
    SharedObject {
        module: String,
        source_path: String,
        first: String,
        second: String,
        object: PathBuf,
    },

    #[error("unknown build variant '{0}'")]
    UnknownVariant(String),

    #[error("module '{module}' uses unknown module '{used}' in section '{section}'")]
    UnknownModule {
        section: String,
        module: String,
        used: String,
    },

    #[error("module '{module}' targets architecture '{arch}' which has no toolchain")]
    UnknownArchitecture { module: String, arch: String },

    #[error("don't know how to compile {} from module '{module}'", source_path.display())]
    NoToolForExtension { module: String, source_path: PathBuf },

    #[error("extension '{extension}' is claimed by both '{first}' and '{second}'")]
    DuplicateExtension {
        extension: String,
        first: String,
        second: String,
    },

    #[error("toolchain for '{arch}' has no '{tool}' program")]
    MissingTool { arch: String, tool: String },

    #[error("no '{0}' utility is configured")]
    MissingUtility(&'static str),

    #[error("module '{module}' declares more than one role: {roles}")]
    ConflictingRoles { module: String, roles: String },

    #[error("module '{module}': {message}")]
    InvalidModule { module: String, message: String },

    #[error("task in group '{group}' waits on '{prerequisite}', which is not built before it")]
    DanglingPrerequisite { group: String, prerequisite: String },

    #[error("cyclic 'uses' dependency in section '{section}': {cycle}")]
    UsesCycle { section: String, cycle: String },
}

//! Configuration-driven build orchestration for embedded firmware.
//!
//! A project file declares toolchains, option trees, variants and modules.
//! [`project::plan`] turns it into task graphs of compiler, archiver, linker
//! and post-processing invocations, and an [`executor::Executor`] runs them.
//!
//! ```text
//! fwbuild.toml -> BuildConfig -> orchestrator -> TaskGraph -> Executor
//!                      |              |
//!                   options        paths / closure / toolchain
//! ```

pub mod closure;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod logger;
pub mod options;
pub mod orchestrator;
pub mod paths;
pub mod project;
pub mod toolchain;

pub use config::BuildConfig;
pub use error::{Error, Result};
pub use graph::{BuildTask, GroupId, Stage, TaskGraph};

//! # fwbuild
//!
//! Build embedded firmware from a declarative project file.
//!
//! ## Usage
//!
//! ```bash
//! fwbuild build                      # external modules, then the default variants
//! fwbuild build --variant debug -j8  # one variant, eight jobs
//! fwbuild build --dry-run            # print the commands only
//! fwbuild graph --variant release    # planned task graph as JSON
//! fwbuild check                      # validate fwbuild.toml
//! fwbuild clean                      # remove variant output directories
//! ```

use anyhow::Result;
use clap::Parser;

mod app;
mod cli;

fn main() -> Result<()> {
    let cli = crate::cli::Cli::parse();
    crate::app::run(cli)
}

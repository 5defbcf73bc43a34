//! Whole-project driver.
//!
//! A build runs in two phases: the `external` section for the external
//! variant, a barrier, then the `source` section for every requested variant,
//! and a final barrier. Every graph is planned before the first submission.

use crate::config::{BuildConfig, SectionKind, SourceEntry};
use crate::error::{Error, Result};
use crate::executor::{submit_graph, Executor};
use crate::graph::TaskGraph;
use crate::orchestrator::plan_section;
use crate::paths;
use anyhow::{bail, Context};
use serde::Serialize;
use std::collections::hash_map::{Entry, HashMap};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct VariantPlan {
    pub variant: String,
    pub graph: TaskGraph,
}

#[derive(Debug, Serialize)]
pub struct ProjectPlan {
    pub external: VariantPlan,
    pub variants: Vec<VariantPlan>,
}

/// Plan the external section and the source section of each variant.
/// An empty `variants` list means the configured default build list.
pub fn plan(config: &BuildConfig, variants: &[String]) -> Result<ProjectPlan> {
    let requested = if variants.is_empty() {
        &config.build
    } else {
        variants
    };

    let external = VariantPlan {
        variant: config.external_variant.clone(),
        graph: plan_section(config, SectionKind::External, &config.external_variant)?,
    };

    let mut planned = Vec::with_capacity(requested.len());
    for variant in requested {
        if planned.iter().any(|p: &VariantPlan| &p.variant == variant) {
            continue;
        }
        planned.push(VariantPlan {
            variant: variant.clone(),
            graph: plan_section(config, SectionKind::Source, variant)?,
        });
    }

    check_shared_objects(config, &planned)?;
    Ok(ProjectPlan {
        external,
        variants: planned,
    })
}

/// Variants run side by side, so no two of them may write the same object.
/// Only explicit destinations can escape a variant's output directory.
fn check_shared_objects(config: &BuildConfig, planned: &[VariantPlan]) -> Result<()> {
    let mut writers: HashMap<PathBuf, &str> = HashMap::new();
    for plan in planned {
        for module in config.source.modules.values() {
            if config.is_skipped(&module.name) {
                continue;
            }
            let ctx = config.context(SectionKind::Source, module, &plan.variant);
            for entry in &module.sources {
                if !matches!(entry, SourceEntry::Explicit { .. }) {
                    continue;
                }
                let object = paths::resolve_source(&ctx, entry)?.object();
                match writers.entry(object) {
                    Entry::Vacant(slot) => {
                        slot.insert(&plan.variant);
                    }
                    Entry::Occupied(slot) if *slot.get() != plan.variant => {
                        return Err(Error::SharedObject {
                            module: module.name.clone(),
                            source_path: entry.path().to_string(),
                            first: (*slot.get()).to_string(),
                            second: plan.variant.clone(),
                            object: slot.key().clone(),
                        });
                    }
                    Entry::Occupied(_) => {}
                }
            }
        }
    }
    Ok(())
}

impl ProjectPlan {
    pub fn task_count(&self) -> usize {
        self.external.graph.len() + self.variants.iter().map(|v| v.graph.len()).sum::<usize>()
    }

    /// Hand every graph to `executor`, waiting for the external phase first.
    pub fn run(self, executor: &mut dyn Executor) -> anyhow::Result<()> {
        if !self.external.graph.is_empty() {
            log::info!("Preparing external modules ({})", self.external.variant);
            submit_graph(self.external.graph, executor)?;
            executor
                .barrier(None)
                .context("External modules failed")?;
        }

        for plan in self.variants {
            log::info!("Building variant {}", plan.variant);
            submit_graph(plan.graph, executor)?;
        }
        executor.barrier(None).context("Build failed")
    }
}

/// Remove every variant output directory; returns the ones that existed.
///
/// Relative output directories are taken from `root`, the project directory.
/// Nothing is removed unless every directory lies strictly inside it.
pub fn clean(config: &BuildConfig, root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let root = paths::normalize(root);
    let mut dirs = Vec::with_capacity(config.variants.len());
    for variant in &config.variants {
        let dir = paths::normalize(&variant.output_dir);
        if !inside(&dir, &root) {
            bail!(
                "Refusing to remove output directory '{}' of variant {}: not inside {}",
                variant.output_dir.display(),
                variant.name,
                root.display()
            );
        }
        dirs.push(root.join(dir));
    }

    let mut removed = Vec::new();
    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        log::info!("Removing {}", dir.display());
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to remove {}", dir.display()))?;
        removed.push(dir);
    }
    Ok(removed)
}

/// `dir` names a directory below `root`, never `root` itself or an ancestor.
fn inside(dir: &Path, root: &Path) -> bool {
    if dir.components().any(|c| c == Component::ParentDir) {
        return false;
    }
    let relative = if dir.is_absolute() {
        let Ok(relative) = dir.strip_prefix(root) else {
            return false;
        };
        relative
    } else {
        dir
    };
    relative.components().any(|c| matches!(c, Component::Normal(_)))
}

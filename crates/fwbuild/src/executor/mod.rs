//! Task execution.
//!
//! The planner never runs anything itself. It hands a finished
//! [`TaskGraph`] to an [`Executor`], which owns scheduling, parallelism and
//! failure reporting.

mod dry_run;
mod local;

pub use dry_run::DryRun;
pub use local::LocalExecutor;

use crate::graph::{BuildTask, GroupId, TaskGraph};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;

pub trait Executor {
    /// Queue one task. Every prerequisite must name an already submitted group.
    fn submit(&mut self, task: BuildTask) -> Result<()>;

    /// Block until the given groups (or everything, for `None`) are complete.
    fn barrier(&mut self, groups: Option<&[GroupId]>) -> Result<()>;
}

/// Submit every task of `graph`, in graph order.
pub fn submit_graph(graph: TaskGraph, executor: &mut dyn Executor) -> Result<()> {
    for task in graph.into_tasks() {
        let group = task.group.clone();
        executor
            .submit(task)
            .with_context(|| format!("Submitting task of {group}"))?;
    }
    Ok(())
}

/// Create the output directories of `task`; existing ones are fine.
pub fn prepare_output_dirs(task: &BuildTask) -> Result<()> {
    for dir in &task.output_dirs {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// Groups seen so far by an executor, used to reject dangling prerequisites.
#[derive(Debug, Default)]
struct KnownGroups(HashSet<GroupId>);

impl KnownGroups {
    fn admit(&mut self, task: &BuildTask) -> Result<()> {
        for prerequisite in &task.prerequisites {
            if !self.0.contains(prerequisite) {
                bail!(
                    "{} waits on {prerequisite}, which has not been submitted",
                    task.group
                );
            }
        }
        self.0.insert(task.group.clone());
        Ok(())
    }

    fn check(&self, groups: &[GroupId]) -> Result<()> {
        if let Some(unknown) = groups.iter().find(|g| !self.0.contains(*g)) {
            bail!("Barrier on unknown group {unknown}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SectionKind;
    use crate::graph::Stage;
    use crate::toolchain::Invocation;

    fn task(group: &GroupId, prerequisites: &[&GroupId]) -> BuildTask {
        BuildTask {
            group: group.clone(),
            description: format!("task of {group}"),
            invocation: Invocation::new("true"),
            prerequisites: prerequisites.iter().map(|g| (*g).clone()).collect(),
            output_dirs: Vec::new(),
        }
    }

    #[test]
    fn test_known_groups_rejects_forward_reference() {
        let compile = GroupId::new(SectionKind::Source, "d", "m", Stage::Compile);
        let link = GroupId::new(SectionKind::Source, "d", "m", Stage::Link);

        let mut known = KnownGroups::default();
        assert!(known.admit(&task(&link, &[&compile])).is_err());
        assert!(known.admit(&task(&compile, &[])).is_ok());
        assert!(known.admit(&task(&link, &[&compile])).is_ok());
        assert!(known.check(&[link.clone(), compile]).is_ok());
    }

    #[test]
    fn test_prepare_output_dirs_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let group = GroupId::new(SectionKind::Source, "d", "m", Stage::Compile);
        let mut t = task(&group, &[]);
        t.output_dirs = vec![dir.path().join("a/b/c"), dir.path().join("a/b/c")];

        prepare_output_dirs(&t).unwrap();
        prepare_output_dirs(&t).unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
    }
}

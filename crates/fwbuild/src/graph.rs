//! Task graph.
//!
//! A [`TaskGraph`] is built in full before anything is handed to an
//! executor. Tasks reference each other only through [`GroupId`]s; a group
//! completes when every task carrying it has finished.

use crate::config::SectionKind;
use crate::error::{Error, Result};
use crate::toolchain::Invocation;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Step of a module's pipeline a group stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// The n-th `make` command of an external module.
    Make(usize),
    Compile,
    Archive,
    Link,
    Hex,
    Dump,
    Hex2c,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Make(n) => write!(f, "make{n}"),
            Self::Compile => f.write_str("compile"),
            Self::Archive => f.write_str("archive"),
            Self::Link => f.write_str("link"),
            Self::Hex => f.write_str("hex"),
            Self::Dump => f.write_str("dump"),
            Self::Hex2c => f.write_str("hex2c"),
        }
    }
}

/// `<section>/<variant>/<module>.<stage>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(section: SectionKind, variant: &str, module: &str, stage: Stage) -> Self {
        Self(format!("{section}/{variant}/{module}.{stage}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildTask {
    pub group: GroupId,
    /// Human readable progress line, e.g. `Compiling app/main.c [blinky]`.
    pub description: String,
    pub invocation: Invocation,
    pub prerequisites: Vec<GroupId>,
    /// Directories that must exist before the task starts.
    pub output_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskGraph {
    tasks: Vec<BuildTask>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: BuildTask) {
        self.tasks.push(task);
    }

    pub fn tasks(&self) -> &[BuildTask] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<BuildTask> {
        self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn in_group<'a: 'g, 'g>(&'a self, group: &'g GroupId) -> impl Iterator<Item = &'a BuildTask> + 'g {
        self.tasks.iter().filter(move |t| &t.group == group)
    }

    /// Every prerequisite must name a group with a task earlier in the graph,
    /// which also rules out cycles.
    pub fn verify(&self) -> Result<()> {
        let mut seen: HashSet<&GroupId> = HashSet::new();
        for task in &self.tasks {
            for prerequisite in &task.prerequisites {
                if !seen.contains(prerequisite) || prerequisite == &task.group {
                    return Err(Error::DanglingPrerequisite {
                        group: task.group.to_string(),
                        prerequisite: prerequisite.to_string(),
                    });
                }
            }
            seen.insert(&task.group);
        }
        Ok(())
    }
}

use super::{Executor, KnownGroups};
use crate::graph::{BuildTask, GroupId};
use anyhow::Result;

/// Records submissions without running anything.
///
/// With [`DryRun::printing`] every command line is also written to stdout,
/// which is what `fwbuild build --dry-run` shows.
#[derive(Debug, Default)]
pub struct DryRun {
    tasks: Vec<BuildTask>,
    barriers: Vec<Option<Vec<GroupId>>>,
    known: KnownGroups,
    print: bool,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn printing() -> Self {
        Self {
            print: true,
            ..Self::default()
        }
    }

    pub fn tasks(&self) -> &[BuildTask] {
        &self.tasks
    }

    /// Barriers in the order they were requested.
    pub fn barriers(&self) -> &[Option<Vec<GroupId>>] {
        &self.barriers
    }
}

impl Executor for DryRun {
    fn submit(&mut self, task: BuildTask) -> Result<()> {
        self.known.admit(&task)?;
        if self.print {
            println!("{}", task.invocation);
        }
        self.tasks.push(task);
        Ok(())
    }

    fn barrier(&mut self, groups: Option<&[GroupId]>) -> Result<()> {
        if let Some(groups) = groups {
            self.known.check(groups)?;
        }
        self.barriers.push(groups.map(<[GroupId]>::to_vec));
        Ok(())
    }
}

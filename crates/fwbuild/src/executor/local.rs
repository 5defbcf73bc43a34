//! Runs tasks on this machine with a bounded number of worker threads.
//!
//! Submissions are only queued; work happens at [`Executor::barrier`]. A task
//! starts once every task of each of its prerequisite groups has finished.
//! After the first failure nothing new is started, tasks already running are
//! left to finish, and the barrier returns the failure.

use super::{prepare_output_dirs, Executor, KnownGroups};
use crate::graph::{BuildTask, GroupId};
use anyhow::{anyhow, bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::sync::mpsc;
use std::thread;

#[derive(Debug)]
pub struct LocalExecutor {
    jobs: usize,
    pending: Vec<BuildTask>,
    known: KnownGroups,
}

impl LocalExecutor {
    /// `jobs` of zero means one job per available CPU.
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 {
            thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            jobs
        };
        Self {
            jobs,
            pending: Vec::new(),
            known: KnownGroups::default(),
        }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Remove and return the pending tasks `groups` transitively wait on.
    fn take_needed(&mut self, groups: &[GroupId]) -> Vec<BuildTask> {
        let mut needed: HashSet<GroupId> = groups.iter().cloned().collect();
        loop {
            let before = needed.len();
            for task in &self.pending {
                if needed.contains(&task.group) {
                    needed.extend(task.prerequisites.iter().cloned());
                }
            }
            if needed.len() == before {
                break;
            }
        }

        let (take, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|t| needed.contains(&t.group));
        self.pending = keep;
        take
    }

    fn run(&self, tasks: Vec<BuildTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        // Tasks left per group. A group absent from here has completed.
        let mut outstanding: HashMap<GroupId, usize> = HashMap::new();
        for task in &tasks {
            *outstanding.entry(task.group.clone()).or_default() += 1;
        }

        let mut waiting = tasks;
        let (tx, rx) = mpsc::channel::<(GroupId, Result<()>)>();

        thread::scope(|scope| {
            let mut running = 0;
            let mut failure: Option<anyhow::Error> = None;

            loop {
                if failure.is_none() {
                    let mut i = 0;
                    while running < self.jobs && i < waiting.len() {
                        let ready = waiting[i]
                            .prerequisites
                            .iter()
                            .all(|p| !outstanding.contains_key(p));
                        if !ready {
                            i += 1;
                            continue;
                        }

                        let task = waiting.remove(i);
                        let tx = tx.clone();
                        running += 1;
                        scope.spawn(move || {
                            let result = run_task(&task);
                            // The receiver outlives every worker of this scope.
                            let _ = tx.send((task.group, result));
                        });
                    }
                }

                if running == 0 {
                    if let Some(err) = failure {
                        return Err(err);
                    }
                    if waiting.is_empty() {
                        return Ok(());
                    }
                    bail!(
                        "{} tasks wait on groups that never complete, first: {}",
                        waiting.len(),
                        waiting[0].group
                    );
                }

                let (group, result) = rx
                    .recv()
                    .map_err(|_| anyhow!("Worker threads exited unexpectedly"))?;
                running -= 1;

                match result {
                    Ok(()) => {
                        if let Some(left) = outstanding.get_mut(&group) {
                            *left -= 1;
                            if *left == 0 {
                                outstanding.remove(&group);
                                log::debug!("{group} complete");
                            }
                        }
                    }
                    Err(err) => {
                        if failure.is_none() {
                            log::error!("{err:#}");
                            failure = Some(err);
                        }
                    }
                }
            }
        })
    }
}

impl Executor for LocalExecutor {
    fn submit(&mut self, task: BuildTask) -> Result<()> {
        self.known.admit(&task)?;
        prepare_output_dirs(&task)?;
        self.pending.push(task);
        Ok(())
    }

    fn barrier(&mut self, groups: Option<&[GroupId]>) -> Result<()> {
        let tasks = match groups {
            Some(groups) => {
                self.known.check(groups)?;
                self.take_needed(groups)
            }
            None => std::mem::take(&mut self.pending),
        };

        let result = self.run(tasks);
        if result.is_err() {
            // Nothing queued after a failure is worth running.
            self.pending.clear();
        }
        result
    }
}

fn run_task(task: &BuildTask) -> Result<()> {
    log::info!("{}", task.description);
    log::debug!("{}", task.invocation);

    let program = task.invocation.program.display();
    let mut cmd = task.invocation.command();
    if let Some(file) = &task.invocation.stdout {
        let out =
            File::create(file).with_context(|| format!("Failed to create {}", file.display()))?;
        cmd.stdout(out);
    }

    let status = cmd
        .status()
        .with_context(|| format!("Failed to run {program} [{}]", task.group))?;
    if !status.success() {
        bail!("{program} failed with status {status} [{}]", task.group);
    }
    Ok(())
}

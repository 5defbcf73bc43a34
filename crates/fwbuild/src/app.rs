use crate::cli::{Cli, Cmd, ProjectArgs};
use anyhow::{Context, Result};
use fwbuild::config::BuildConfig;
use fwbuild::executor::{DryRun, Executor, LocalExecutor};
use fwbuild::{logger, project};

pub fn run(cli: Cli) -> Result<()> {
    logger::init(logger::level(cli.verbose, cli.quiet));

    match cli.cmd {
        Cmd::Build {
            project: args,
            variants,
            jobs,
            dry_run,
        } => {
            let config = open(&args)?;
            let plan = project::plan(&config, &variants)?;
            log::debug!("{} tasks planned", plan.task_count());

            let mut executor: Box<dyn Executor> = if dry_run {
                Box::new(DryRun::printing())
            } else {
                let local = LocalExecutor::new(jobs);
                log::debug!("running up to {} jobs", local.jobs());
                Box::new(local)
            };
            plan.run(executor.as_mut())
        }
        Cmd::Graph {
            project: args,
            variants,
        } => {
            let config = open(&args)?;
            let plan = project::plan(&config, &variants)?;
            let json = serde_json::to_string_pretty(&plan).context("Failed to serialize graph")?;
            println!("{json}");
            Ok(())
        }
        Cmd::Check { project: args } => {
            let config = open(&args)?;
            log::info!(
                "{}: {} variants, {} external and {} source modules",
                args.config.display(),
                config.variants.len(),
                config.external.modules.len(),
                config.source.modules.len()
            );
            Ok(())
        }
        Cmd::Clean { project: args } => {
            let config = open(&args)?;
            let root = std::env::current_dir().context("Failed to read the project directory")?;
            let removed = project::clean(&config, &root)?;
            if removed.is_empty() {
                log::info!("Nothing to clean");
            }
            Ok(())
        }
    }
}

/// Load the project file and move into its directory, which every path in it
/// is relative to.
fn open(project: &ProjectArgs) -> Result<BuildConfig> {
    let config = BuildConfig::load(&project.config)?;

    if let Some(dir) = project.config.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to enter {}", dir.display()))?;
    }
    Ok(config)
}

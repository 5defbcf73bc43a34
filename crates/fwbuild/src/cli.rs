use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fwbuild")]
#[command(about = "Configuration-driven firmware builds for GCC cross toolchains")]
pub struct Cli {
    /// More output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Args)]
pub struct ProjectArgs {
    /// Project file. Paths inside it are relative to its directory.
    #[arg(short, long, default_value = fwbuild::config::CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Build the external modules, then every requested variant.
    Build {
        #[command(flatten)]
        project: ProjectArgs,

        /// Variant to build; repeatable. Defaults to the project's `build` list.
        #[arg(long = "variant")]
        variants: Vec<String>,

        /// Parallel jobs (0 = one per CPU).
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,

        /// Print the commands instead of running them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the planned task graph as JSON.
    Graph {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(long = "variant")]
        variants: Vec<String>,
    },

    /// Load and validate the project file.
    Check {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Remove every variant output directory.
    Clean {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_args() {
        let cli = Cli::parse_from([
            "fwbuild", "-vv", "build", "-c", "fw/project.toml", "--variant", "debug", "--variant",
            "release", "-j", "4", "--dry-run",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.cmd {
            Cmd::Build {
                project,
                variants,
                jobs,
                dry_run,
            } => {
                assert_eq!(project.config, PathBuf::from("fw/project.toml"));
                assert_eq!(variants, vec!["debug", "release"]);
                assert_eq!(jobs, 4);
                assert!(dry_run);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_default_config_file() {
        let cli = Cli::parse_from(["fwbuild", "check", "-q"]);
        assert!(cli.quiet);
        match cli.cmd {
            Cmd::Check { project } => assert_eq!(project.config, PathBuf::from("fwbuild.toml")),
            _ => panic!("expected check"),
        }
    }
}

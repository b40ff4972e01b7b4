//! `rept`: feature branches and dependency pinning across a repository tree.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use log::LevelFilter;

use rept::feature::{self, DeleteOptions};
use rept::plan::{plan_workspace, CommitType};
use rept::remote::{self, RemoteOp};
use rept::switch;
use rept::{check_workspace, sync, update, GitVcs, Workspace};

#[derive(Parser, Debug)]
#[command(name = "rept")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run as if started in DIR
    #[arg(short = 'C', global = true, value_name = "DIR")]
    directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that every repository agrees on dependency revisions
    CheckDeps {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a feature branch in every repository, or delete it with -d/-D
    #[command(group(ArgGroup::new("deletion").args(["delete", "force_delete"])))]
    Feature {
        /// Feature branch name
        name: String,

        /// Delete the branch where it is merged
        #[arg(short = 'd')]
        delete: bool,

        /// Delete the branch even when unmerged
        #[arg(short = 'D')]
        force_delete: bool,

        /// Also delete the branch on the remotes
        #[arg(long, requires = "deletion", conflicts_with = "push_only")]
        push: bool,

        /// Only delete the branch on the remotes
        #[arg(long, requires = "deletion")]
        push_only: bool,
    },

    /// Fetch the remotes of every repository
    Fetch,

    /// Prune stale remote branches in every repository
    Prune,

    /// Check out a feature branch across repositories
    Switch {
        /// Feature branch name
        name: String,

        /// Create local branches tracking remote feature branches
        #[arg(short = 'b', conflicts_with = "detach")]
        create: bool,

        /// Detach HEAD in repositories on the feature branch
        #[arg(short = 'd')]
        detach: bool,
    },

    /// Clone or fetch dependencies and check out their declared revisions
    Sync,

    /// Propagate feature branch changes into dependent manifests
    UpDeps {
        /// Feature branch name
        name: String,

        /// How to commit the root repository's manifest (new, amend)
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        commit_type: CommitType,

        /// Only print the plan
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Emit the plan as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

impl Cli {
    fn execute(self) -> Result<ExitCode> {
        let start = match self.directory {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let workspace = Workspace::discover(&start)
            .with_context(|| format!("Failed to load workspace from {}", start.display()))?;

        match self.command {
            Commands::CheckDeps { json } => {
                let report = check_workspace(&GitVcs, &workspace);
                if json {
                    print_json(&report.to_json())?;
                } else {
                    report.print();
                }
                Ok(status(report.is_ok()))
            }

            Commands::Feature {
                name,
                delete,
                force_delete,
                push,
                push_only,
            } => {
                if delete || force_delete {
                    let options = DeleteOptions {
                        force: force_delete,
                        push,
                        push_only,
                    };
                    let report = feature::delete(&workspace, &name, options)?;
                    report.print();
                    Ok(status(report.is_ok()))
                } else {
                    let report = feature::create(&workspace, &name)?;
                    report.print();
                    Ok(status(report.is_ok()))
                }
            }

            Commands::Fetch => {
                let report = remote::run(&workspace, RemoteOp::Fetch)?;
                report.print();
                Ok(status(report.is_ok()))
            }

            Commands::Prune => {
                let report = remote::run(&workspace, RemoteOp::Prune)?;
                report.print();
                Ok(status(report.is_ok()))
            }

            Commands::Switch {
                name,
                create,
                detach,
            } => {
                let report = if detach {
                    switch::detach(&workspace, &name)?
                } else {
                    switch::switch(&workspace, &name, create)?
                };
                report.print();
                Ok(status(report.is_ok()))
            }

            Commands::Sync => {
                let report = sync::sync(&workspace)?;
                report.print();
                Ok(status(report.is_ok()))
            }

            Commands::UpDeps {
                name,
                commit_type,
                dry_run,
                json,
            } => {
                let plan = plan_workspace(&GitVcs, &workspace, &name, commit_type);
                if json {
                    print_json(&plan.to_json())?;
                } else {
                    plan.print();
                }
                if plan.has_errors() {
                    eprintln!(
                        "\n{} {} error(s); no manifests were changed",
                        "error:".red().bold(),
                        plan.error_count()
                    );
                    return Ok(ExitCode::FAILURE);
                }
                if dry_run {
                    return Ok(ExitCode::SUCCESS);
                }

                let applied = update::apply(&GitVcs, &plan, &name)
                    .context("Failed to update dependency manifests")?;
                if !json {
                    println!();
                    for update in &applied {
                        update.print();
                    }
                }
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.execute() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

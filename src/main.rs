//! Bring every running container up to its latest image, then prune what is left
mod cli;
mod compose;
mod detect;
mod projects;
mod report;
mod runspec;
mod standalone;
mod sweep;

use std::path::Path;
use std::process::ExitCode;

use bollard::Docker;
use bollard::errors::Error as BollardError;
use env_logger::Env;
use log::{error, info};
use thiserror::Error;

use crate::cli::configure_cli;
use crate::compose::ComposeDriver;
use crate::projects::{discover_projects, update_project};
use crate::report::RunReport;
use crate::standalone::{standalone_containers, update_standalone};
use crate::sweep::sweep;

#[derive(Debug, Error)]
pub(crate) enum RefitError {
    #[error(transparent)]
    Docker(#[from] BollardError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("docker compose {command} failed for {project}: {stderr}")]
    Compose {
        project: String,
        command: String,
        stderr: String,
    },
    #[error("image identity for {reference} could not be resolved after pull")]
    UnresolvedImage { reference: String },
    #[error("container {container} has no image reference")]
    MissingImageReference { container: String },
    #[error("container {container} cannot be inspected: {source}")]
    Extraction {
        container: String,
        source: BollardError,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let config = configure_cli();

    if !config.base_path.is_dir() {
        eprintln!("refit: {} is not a directory", config.base_path.display());
        return ExitCode::from(2);
    }

    let docker = match Docker::connect_with_local_defaults() {
        Ok(docker) => docker,
        Err(e) => {
            error!("cannot connect to the container runtime: {e}");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = docker.ping().await {
        error!("container runtime is not responding: {e}");
        return ExitCode::from(1);
    }

    match run(&docker, &config.base_path).await {
        Ok(report) => {
            print!("{}", report.summary());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("run aborted: {e}");
            ExitCode::from(1)
        }
    }
}

/// The whole run, fully sequential: every project to completion, then every
/// standalone container, then one sweep. Unit failures are recorded and the
/// loop moves on; only discovery and the sweep abort the run.
async fn run(docker: &Docker, base_path: &Path) -> Result<RunReport, RefitError> {
    let mut report = RunReport::default();
    let compose = ComposeDriver;

    println!("--- compose projects ---");
    let projects = discover_projects(base_path)?;
    info!("found {} compose projects under {}", projects.len(), base_path.display());
    for project in &projects {
        let outcome = update_project(docker, &compose, project).await;
        println!("{outcome}");
        report.record(outcome);
    }

    println!("--- standalone containers ---");
    let containers = standalone_containers(docker).await?;
    info!("found {} standalone containers", containers.len());
    for container in &containers {
        let outcome = update_standalone(docker, container).await;
        println!("{outcome}");
        report.record(outcome);
    }

    println!("--- cleanup ---");
    let pruned = sweep(docker).await?;
    println!("{pruned}");

    Ok(report)
}

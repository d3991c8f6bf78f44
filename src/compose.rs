//! Thin driver around the `docker compose` CLI. Subcommands run with the
//! project directory as working directory and the compose file passed
//! explicitly, always as an argument vector.

use std::process::Output;

use log::debug;
use tokio::process::Command;

use crate::RefitError;
use crate::projects::ProjectDescriptor;

pub(crate) struct ComposeDriver;

impl ComposeDriver {
    /// Declared services, in the order compose reports them. Resolved fresh
    /// from the compose file on every call, never cached.
    pub(crate) async fn services(&self, project: &ProjectDescriptor) -> Result<Vec<String>, RefitError> {
        let output = self.run(project, &["config", "--services"]).await?;
        let services = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        Ok(services)
    }

    /// Project-wide pull, one operation for all services.
    pub(crate) async fn pull(&self, project: &ProjectDescriptor) -> Result<(), RefitError> {
        self.run(project, &["pull"]).await.map(|_| ())
    }

    pub(crate) async fn down(&self, project: &ProjectDescriptor) -> Result<(), RefitError> {
        self.run(project, &["down"]).await.map(|_| ())
    }

    pub(crate) async fn up(&self, project: &ProjectDescriptor) -> Result<(), RefitError> {
        self.run(project, &["up", "-d"]).await.map(|_| ())
    }

    async fn run(&self, project: &ProjectDescriptor, args: &[&str]) -> Result<Output, RefitError> {
        debug!("docker compose {} ({})", args.join(" "), project.name);
        // -p pins the project name, so the com.docker.compose.project label on
        // every container matches the name used for label filtering
        let output = Command::new("docker")
            .arg("compose")
            .arg("-p")
            .arg(&project.name)
            .arg("-f")
            .arg(&project.compose_file)
            .args(args)
            .current_dir(&project.working_dir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(RefitError::Compose {
                project: project.name.clone(),
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

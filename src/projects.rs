//! Discovery and whole-unit update of compose projects. A project is restarted
//! as one lifecycle unit: the first service that is not running, or the first
//! whose image identity changed under the pull, already decides the restart and
//! ends the scan.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bollard::Docker;
use bollard::models::ContainerSummary;
use bollard::query_parameters::ListContainersOptions;
use log::{debug, error, info, warn};

use crate::RefitError;
use crate::compose::ComposeDriver;
use crate::detect::{identity_changed, resolve_image_id};
use crate::report::{Action, Scope, UpdateOutcome};

const COMPOSE_FILE_NAMES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yml",
    "docker-compose.yaml",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProjectDescriptor {
    pub name: String,
    pub compose_file: PathBuf,
    pub working_dir: PathBuf,
}

/// One descriptor per immediate subdirectory of the base path that holds a
/// compose file. Search depth is fixed at the immediate child level. The name
/// is the directory name normalized the way compose normalizes project names;
/// every compose invocation also pins it with `-p`, so the
/// `com.docker.compose.project` label always carries exactly this value.
pub(crate) fn discover_projects(base: &Path) -> Result<Vec<ProjectDescriptor>, RefitError> {
    let mut projects = Vec::new();
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let working_dir = entry.path();
        if !working_dir.is_dir() {
            continue;
        }
        let Some(compose_file) = compose_file_in(&working_dir) else {
            continue;
        };
        let name = project_name(&entry.file_name().to_string_lossy());
        if name.is_empty() {
            warn!(
                "{}: directory name has no usable project-name characters, skipping",
                working_dir.display()
            );
            continue;
        }
        projects.push(ProjectDescriptor {
            name,
            compose_file,
            working_dir,
        });
    }
    projects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(projects)
}

/// Compose project names are lowercase, restricted to `[a-z0-9_-]`, and must
/// start with a letter or digit; anything else is dropped.
fn project_name(dir_name: &str) -> String {
    let name: String = dir_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .collect();
    name.trim_start_matches(['-', '_']).to_string()
}

fn compose_file_in(dir: &Path) -> Option<PathBuf> {
    COMPOSE_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServiceSignal {
    UpToDate,
    ImageChanged,
    NotRunning,
}

/// Accumulator for one project's service scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProjectScan {
    pub has_updates: bool,
    pub containers_not_running: bool,
}

impl ProjectScan {
    pub(crate) fn absorb(mut self, signal: ServiceSignal) -> Self {
        match signal {
            ServiceSignal::UpToDate => {}
            ServiceSignal::ImageChanged => self.has_updates = true,
            ServiceSignal::NotRunning => self.containers_not_running = true,
        }
        self
    }

    pub(crate) fn restart_needed(&self) -> bool {
        self.has_updates || self.containers_not_running
    }

    fn reason(&self) -> &'static str {
        if self.containers_not_running {
            "service not running"
        } else {
            "image changed"
        }
    }
}

pub(crate) async fn update_project(
    docker: &Docker,
    compose: &ComposeDriver,
    project: &ProjectDescriptor,
) -> UpdateOutcome {
    let services = match compose.services(project).await {
        Ok(services) => services,
        Err(e) => {
            error!("{}: resolving services failed: {e}", project.name);
            return UpdateOutcome::with_detail(
                Scope::Project,
                &project.name,
                Action::Skipped,
                format!("resolving services failed: {e}"),
            );
        }
    };
    if services.is_empty() {
        warn!("{}: no services declared, skipping", project.name);
        return UpdateOutcome::with_detail(
            Scope::Project,
            &project.name,
            Action::Skipped,
            "no services declared",
        );
    }

    if let Err(e) = compose.pull(project).await {
        error!("{}: pull failed: {e}", project.name);
        return UpdateOutcome::with_detail(
            Scope::Project,
            &project.name,
            Action::Skipped,
            format!("pull failed: {e}"),
        );
    }

    let scan = match scan_services(docker, project, &services).await {
        Ok(scan) => scan,
        Err(e) => {
            error!("{}: service scan failed: {e}", project.name);
            return UpdateOutcome::with_detail(
                Scope::Project,
                &project.name,
                Action::Skipped,
                format!("service scan failed: {e}"),
            );
        }
    };

    if !scan.restart_needed() {
        return UpdateOutcome::new(Scope::Project, &project.name, Action::NoChange);
    }

    info!("{}: restarting ({})", project.name, scan.reason());
    if let Err(e) = compose.down(project).await {
        error!("{}: down failed: {e}", project.name);
        return UpdateOutcome::with_detail(
            Scope::Project,
            &project.name,
            Action::Failed,
            format!("down failed: {e}"),
        );
    }
    if let Err(e) = compose.up(project).await {
        error!("{}: up failed: {e}", project.name);
        return UpdateOutcome::with_detail(
            Scope::Project,
            &project.name,
            Action::Failed,
            format!("up failed: {e}"),
        );
    }
    UpdateOutcome::with_detail(Scope::Project, &project.name, Action::Recreated, scan.reason())
}

/// Short-circuiting fold: later services are not scanned once a restart is
/// already decided, so the report names only the first signal.
async fn scan_services(
    docker: &Docker,
    project: &ProjectDescriptor,
    services: &[String],
) -> Result<ProjectScan, RefitError> {
    let mut scan = ProjectScan::default();
    for service in services {
        let signal = service_signal(docker, project, service).await?;
        debug!("{}/{service}: {signal:?}", project.name);
        scan = scan.absorb(signal);
        if scan.restart_needed() {
            break;
        }
    }
    Ok(scan)
}

async fn service_signal(
    docker: &Docker,
    project: &ProjectDescriptor,
    service: &str,
) -> Result<ServiceSignal, RefitError> {
    let Some(container) = service_container(docker, project, service).await? else {
        return Ok(ServiceSignal::NotRunning);
    };
    let reference = container.image.ok_or_else(|| RefitError::MissingImageReference {
        container: format!("{}/{service}", project.name),
    })?;
    // the project-wide pull already ran; resolve what the reference points at now
    let after = resolve_image_id(docker, &reference).await?;
    let before = container.image_id.filter(|image_id| !image_id.is_empty());
    if identity_changed(before.as_deref(), &after) {
        Ok(ServiceSignal::ImageChanged)
    } else {
        Ok(ServiceSignal::UpToDate)
    }
}

async fn service_container(
    docker: &Docker,
    project: &ProjectDescriptor,
    service: &str,
) -> Result<Option<ContainerSummary>, RefitError> {
    let filters = HashMap::from([(
        "label".to_string(),
        vec![
            format!("com.docker.compose.project={}", project.name),
            format!("com.docker.compose.service={service}"),
        ],
    )]);
    let options = ListContainersOptions {
        filters: Some(filters),
        ..Default::default()
    };
    let mut containers = docker.list_containers(Some(options)).await?;
    Ok(containers.pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn unique_base() -> PathBuf {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        PathBuf::from(format!("/tmp/refit_test_{}_{}", std::process::id(), id))
    }

    #[test]
    fn discovery_finds_immediate_children_with_a_compose_file() {
        let base = unique_base();
        fs::create_dir_all(base.join("Alpha")).unwrap();
        fs::write(base.join("Alpha/docker-compose.yml"), "services: {}\n").unwrap();
        fs::create_dir_all(base.join("beta")).unwrap();
        fs::write(base.join("beta/compose.yaml"), "services: {}\n").unwrap();
        fs::create_dir_all(base.join("gamma")).unwrap();
        fs::create_dir_all(base.join("delta/nested")).unwrap();
        fs::write(base.join("delta/nested/docker-compose.yml"), "services: {}\n").unwrap();
        fs::write(base.join("stray.txt"), "not a project\n").unwrap();

        let projects = discover_projects(&base).unwrap();
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        // gamma has no compose file; delta's is one level too deep; names are
        // lowercased and sorted
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(projects[0].compose_file, base.join("Alpha/docker-compose.yml"));
        assert_eq!(projects[0].working_dir, base.join("Alpha"));

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn project_names_follow_composes_normalization() {
        assert_eq!(project_name("Plain-01"), "plain-01");
        assert_eq!(project_name("My.App"), "myapp");
        assert_eq!(project_name("app v2"), "appv2");
        assert_eq!(project_name("_under-start"), "under-start");
        assert_eq!(project_name("..."), "");
    }

    #[test]
    fn discovery_normalizes_names_and_drops_unnameable_directories() {
        let base = unique_base();
        fs::create_dir_all(base.join("My.App")).unwrap();
        fs::write(base.join("My.App/docker-compose.yml"), "services: {}\n").unwrap();
        fs::create_dir_all(base.join("+++")).unwrap();
        fs::write(base.join("+++/docker-compose.yml"), "services: {}\n").unwrap();

        let projects = discover_projects(&base).unwrap();
        // the filterable label value is the normalized name, never the raw
        // directory name; a directory that normalizes to nothing is skipped
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["myapp"]);
        assert_eq!(projects[0].working_dir, base.join("My.App"));

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn scan_accumulates_signals() {
        let scan = ProjectScan::default();
        assert!(!scan.restart_needed());

        let scan = scan.absorb(ServiceSignal::UpToDate);
        assert!(!scan.restart_needed());

        let changed = scan.absorb(ServiceSignal::ImageChanged);
        assert!(changed.restart_needed());
        assert!(changed.has_updates);
        assert!(!changed.containers_not_running);

        let stopped = scan.absorb(ServiceSignal::NotRunning);
        assert!(stopped.restart_needed());
        assert!(stopped.containers_not_running);
        assert_eq!(stopped.reason(), "service not running");
    }

    #[test]
    fn scan_stops_at_the_first_decisive_signal() {
        let signals = [
            ServiceSignal::UpToDate,
            ServiceSignal::ImageChanged,
            ServiceSignal::NotRunning,
        ];
        let mut seen = 0;
        let mut scan = ProjectScan::default();
        for signal in signals {
            seen += 1;
            scan = scan.absorb(signal);
            if scan.restart_needed() {
                break;
            }
        }
        assert_eq!(seen, 2);
        assert!(scan.has_updates);
        assert!(!scan.containers_not_running);
        assert_eq!(scan.reason(), "image changed");
    }
}

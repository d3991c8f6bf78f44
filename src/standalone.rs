//! In-place replacement of standalone containers. A container is only ever
//! stopped once the new image is pulled and a run spec is in hand; from there
//! the stop/remove/create/start sequence is all-or-nothing with no rollback.

use bollard::Docker;
use bollard::models::ContainerSummary;
use bollard::query_parameters::{
    CreateContainerOptions, ListContainersOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptionsBuilder,
};
use log::{debug, error, info};

use crate::RefitError;
use crate::detect::detect_change;
use crate::report::{Action, Scope, UpdateOutcome};
use crate::runspec::{RunSpec, extract_run_spec};

pub(crate) const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

const REMOVE_OPTIONS: RemoveContainerOptions = RemoveContainerOptions {
    v: false,
    force: false,
    link: false,
};

/// Standalone means not owned by any compose project.
pub(crate) fn is_standalone(container: &ContainerSummary) -> bool {
    !container
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(COMPOSE_PROJECT_LABEL))
}

/// All running containers minus the compose-labeled set, sorted by ID so the
/// run order (and the log) is deterministic.
pub(crate) async fn standalone_containers(
    docker: &Docker,
) -> Result<Vec<ContainerSummary>, RefitError> {
    let containers = docker
        .list_containers(Some(ListContainersOptions::default()))
        .await?;
    let mut standalone: Vec<ContainerSummary> = containers
        .into_iter()
        .filter(is_standalone)
        .collect();
    standalone.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(standalone)
}

pub(crate) fn container_name(container: &ContainerSummary) -> Option<String> {
    container
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
}

pub(crate) async fn update_standalone(
    docker: &Docker,
    container: &ContainerSummary,
) -> UpdateOutcome {
    let Some(id) = container.id.clone() else {
        error!("standalone container without an ID, leaving untouched");
        return UpdateOutcome::with_detail(
            Scope::Standalone,
            "<unknown>",
            Action::Failed,
            "container has no ID",
        );
    };
    let Some(name) = container_name(container) else {
        error!("{id}: container has no name, leaving untouched");
        return UpdateOutcome::with_detail(
            Scope::Standalone,
            &id,
            Action::Failed,
            "container has no name",
        );
    };
    let Some(reference) = container.image.clone() else {
        error!("{name}: container has no image reference, leaving untouched");
        return UpdateOutcome::with_detail(
            Scope::Standalone,
            &name,
            Action::Failed,
            "container has no image reference",
        );
    };

    let before = container.image_id.clone().filter(|image_id| !image_id.is_empty());
    let change = match detect_change(docker, &reference, before).await {
        Ok(change) => change,
        Err(e) => {
            error!("{name}: update check failed: {e}");
            return UpdateOutcome::with_detail(
                Scope::Standalone,
                &name,
                Action::Failed,
                format!("update check failed: {e}"),
            );
        }
    };
    if !change.changed {
        debug!("{name}: {reference} unchanged ({})", change.after);
        return UpdateOutcome::new(Scope::Standalone, &name, Action::NoChange);
    }

    info!(
        "{name}: {reference} changed ({} -> {}), recreating",
        change.before.as_deref().unwrap_or("<none>"),
        change.after
    );
    // the run spec must be in hand before anything destructive happens
    let spec = match extract_run_spec(docker, &id).await {
        Ok(spec) => spec,
        Err(e) => {
            error!("{name}: run spec extraction failed, container left untouched: {e}");
            return UpdateOutcome::with_detail(
                Scope::Standalone,
                &name,
                Action::Failed,
                format!("run spec extraction failed: {e}"),
            );
        }
    };

    if let Err(e) = replace_container(docker, &id, &spec).await {
        error!("{name}: recreate failed: {e}");
        return UpdateOutcome::with_detail(
            Scope::Standalone,
            &name,
            Action::Failed,
            format!("recreate failed: {e}"),
        );
    }
    UpdateOutcome::with_detail(
        Scope::Standalone,
        &name,
        Action::Recreated,
        format!("now on {}", change.after),
    )
}

async fn replace_container(
    docker: &Docker,
    old_id: &str,
    spec: &RunSpec,
) -> Result<(), RefitError> {
    info!("stopping container {old_id}...");
    let stop_options = StopContainerOptionsBuilder::new().t(30).build();
    docker.stop_container(old_id, Some(stop_options)).await?;
    docker.remove_container(old_id, Some(REMOVE_OPTIONS)).await?;

    let options = CreateContainerOptions {
        name: Some(spec.name.clone()),
        ..Default::default()
    };
    let created = docker.create_container(Some(options), spec.create_body()).await?;
    debug!("container created with ID: {}", created.id);
    docker
        .start_container(&created.id, None::<StartContainerOptions>)
        .await?;
    info!("container {} started", spec.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn summary(id: &str, labels: Option<HashMap<String, String>>) -> ContainerSummary {
        ContainerSummary {
            id: Some(id.to_string()),
            labels,
            ..Default::default()
        }
    }

    #[test]
    fn compose_labeled_containers_are_not_standalone() {
        let labels = HashMap::from([(
            COMPOSE_PROJECT_LABEL.to_string(),
            "proja".to_string(),
        )]);
        assert!(!is_standalone(&summary("aaa", Some(labels))));
    }

    #[test]
    fn unlabeled_containers_are_standalone() {
        assert!(is_standalone(&summary("aaa", None)));
        let unrelated = HashMap::from([("maintainer".to_string(), "ops".to_string())]);
        assert!(is_standalone(&summary("aaa", Some(unrelated))));
    }

    #[test]
    fn standalone_and_compose_sets_partition_all_containers() {
        let compose_labels = HashMap::from([(
            COMPOSE_PROJECT_LABEL.to_string(),
            "proja".to_string(),
        )]);
        let all = vec![
            summary("aaa", None),
            summary("bbb", Some(compose_labels.clone())),
            summary("ccc", None),
        ];
        let standalone: Vec<&ContainerSummary> =
            all.iter().filter(|c| is_standalone(c)).collect();
        let compose: Vec<&ContainerSummary> =
            all.iter().filter(|c| !is_standalone(c)).collect();
        assert_eq!(standalone.len() + compose.len(), all.len());
        assert!(standalone.iter().all(|c| !compose.iter().any(|o| o.id == c.id)));
    }

    #[test]
    fn container_name_strips_the_leading_slash() {
        let container = ContainerSummary {
            names: Some(vec!["/cache1".to_string()]),
            ..Default::default()
        };
        assert_eq!(container_name(&container).as_deref(), Some("cache1"));
        assert_eq!(container_name(&ContainerSummary::default()), None);
    }
}

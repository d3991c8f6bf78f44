//! Best-effort reconstruction of a standalone container's run configuration.
//!
//! Replacing a container destroys its only authoritative configuration record,
//! so before touching one we derive a [`RunSpec`] from its inspection record.
//! The derivation is one-way and lossy: command, env, published ports, mounts,
//! network mode, restart policy name and extra hosts are carried; build-time
//! labels, health-check overrides, device mappings, capabilities, ephemeral
//! host ports, non-tcp port protocols and restart retry counts are not.

use std::collections::HashMap;

use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, HostConfig, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::query_parameters::InspectContainerOptions;
use log::{debug, trace};

use crate::RefitError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct PortMapping {
    /// Host port, as configured. Bindings where the host picked an ephemeral
    /// port are not representable and never appear here.
    pub host: String,
    /// Container port with the protocol suffix stripped.
    pub container: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VolumeMapping {
    pub source: String,
    pub destination: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSpec {
    pub name: String,
    pub image: String,
    pub command: Option<Vec<String>>,
    /// Entries carried verbatim as opaque `KEY=value` strings, never re-tokenized.
    pub env: Vec<String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMapping>,
    pub network_mode: Option<String>,
    pub restart_policy: Option<String>,
    pub extra_hosts: Vec<String>,
}

pub(crate) async fn extract_run_spec(
    docker: &Docker,
    container_id: &str,
) -> Result<RunSpec, RefitError> {
    let details = docker
        .inspect_container(container_id, None::<InspectContainerOptions>)
        .await
        .map_err(|source| RefitError::Extraction {
            container: container_id.to_string(),
            source,
        })?;
    trace!(
        "container details: {}",
        serde_json::to_string_pretty(&details).unwrap_or_default()
    );
    run_spec_from_inspect(&details)
}

pub(crate) fn run_spec_from_inspect(
    details: &ContainerInspectResponse,
) -> Result<RunSpec, RefitError> {
    let config = details.config.clone().unwrap_or_default();
    let host_config = details.host_config.clone().unwrap_or_default();

    let name = details
        .name
        .clone()
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();

    let image = config.image.clone().ok_or_else(|| RefitError::MissingImageReference {
        container: name.clone(),
    })?;

    let mut ports = Vec::new();
    for (container_port, bindings) in host_config.port_bindings.clone().unwrap_or_default() {
        let stripped = container_port
            .split('/')
            .next()
            .unwrap_or(container_port.as_str())
            .to_string();
        for binding in bindings.unwrap_or_default() {
            match binding.host_port {
                Some(host_port) if !host_port.is_empty() => ports.push(PortMapping {
                    host: host_port,
                    container: stripped.clone(),
                }),
                // ephemeral host port, not reproducible deterministically
                _ => debug!("{name}: no host port configured for {container_port}, omitted"),
            }
        }
    }
    ports.sort();
    ports.dedup();

    let mut volumes = Vec::new();
    for mount in details.mounts.clone().unwrap_or_default() {
        let Some(destination) = mount.destination else {
            continue;
        };
        // a named volume reports its name; tmpfs mounts have neither and are dropped
        let source = match (mount.source.filter(|s| !s.is_empty()), mount.name) {
            (Some(source), _) => source,
            (None, Some(volume_name)) => volume_name,
            (None, None) => {
                debug!("{name}: mount at {destination} has no source, omitted");
                continue;
            }
        };
        volumes.push(VolumeMapping {
            source,
            destination,
            read_only: mount.rw == Some(false),
        });
    }

    let network_mode = host_config.network_mode.clone().filter(|mode| mode != "default");

    let restart_policy = host_config
        .restart_policy
        .as_ref()
        .and_then(|policy| policy.name.as_ref())
        .map(restart_policy_name)
        .filter(|policy| !policy.is_empty())
        .map(str::to_string);

    Ok(RunSpec {
        name,
        image,
        command: config.cmd.clone(),
        env: config.env.clone().unwrap_or_default(),
        ports,
        volumes,
        network_mode,
        restart_policy,
        extra_hosts: host_config.extra_hosts.clone().unwrap_or_default(),
    })
}

fn restart_policy_name(name: &RestartPolicyNameEnum) -> &'static str {
    match name {
        RestartPolicyNameEnum::EMPTY => "",
        RestartPolicyNameEnum::NO => "no",
        RestartPolicyNameEnum::ALWAYS => "always",
        RestartPolicyNameEnum::UNLESS_STOPPED => "unless-stopped",
        RestartPolicyNameEnum::ON_FAILURE => "on-failure",
    }
}

fn restart_policy_from_name(name: &str) -> RestartPolicyNameEnum {
    match name {
        "no" => RestartPolicyNameEnum::NO,
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => RestartPolicyNameEnum::EMPTY,
    }
}

impl RunSpec {
    /// Translate back into the runtime's creation parameters. Command and env
    /// pass through as vectors; nothing is ever concatenated into a shell string.
    pub(crate) fn create_body(&self) -> ContainerCreateBody {
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for mapping in &self.ports {
            // protocol was stripped at extraction; rebinding defaults to tcp
            let key = format!("{}/tcp", mapping.container);
            exposed_ports.entry(key.clone()).or_default();
            port_bindings
                .entry(key)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(PortBinding {
                    host_ip: None,
                    host_port: Some(mapping.host.clone()),
                });
        }

        let binds: Vec<String> = self
            .volumes
            .iter()
            .map(|volume| {
                if volume.read_only {
                    format!("{}:{}:ro", volume.source, volume.destination)
                } else {
                    format!("{}:{}", volume.source, volume.destination)
                }
            })
            .collect();

        let restart_policy = self.restart_policy.as_deref().map(|name| RestartPolicy {
            name: Some(restart_policy_from_name(name)),
            maximum_retry_count: None,
        });

        let host_config = HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            network_mode: self.network_mode.clone(),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            restart_policy,
            extra_hosts: (!self.extra_hosts.is_empty()).then(|| self.extra_hosts.clone()),
            ..Default::default()
        };

        ContainerCreateBody {
            image: Some(self.image.clone()),
            cmd: self.command.clone(),
            env: (!self.env.is_empty()).then(|| self.env.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

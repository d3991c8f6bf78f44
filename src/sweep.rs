//! Final reclamation pass. One idempotent sweep over containers, images,
//! networks and volumes; a failure here means the runtime API itself is
//! unhealthy and aborts the run.

use std::collections::HashMap;
use std::fmt;

use bollard::Docker;
use bollard::query_parameters::{
    PruneContainersOptions, PruneImagesOptions, PruneNetworksOptions, PruneVolumesOptions,
};
use log::info;

use crate::RefitError;

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SweepSummary {
    pub containers: usize,
    pub images: usize,
    pub networks: usize,
    pub volumes: usize,
    pub bytes_reclaimed: i64,
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pruned {} containers, {} images, {} networks, {} volumes ({} bytes reclaimed)",
            self.containers, self.images, self.networks, self.volumes, self.bytes_reclaimed
        )
    }
}

pub(crate) async fn sweep(docker: &Docker) -> Result<SweepSummary, RefitError> {
    let mut summary = SweepSummary::default();

    let containers = docker.prune_containers(None::<PruneContainersOptions>).await?;
    summary.containers = containers.containers_deleted.unwrap_or_default().len();
    summary.bytes_reclaimed += containers.space_reclaimed.unwrap_or_default();

    // dangling=false widens the prune to every unused image, not just untagged ones
    let image_filters = HashMap::from([("dangling".to_string(), vec!["false".to_string()])]);
    let images = docker
        .prune_images(Some(PruneImagesOptions {
            filters: Some(image_filters),
            ..Default::default()
        }))
        .await?;
    summary.images = images.images_deleted.unwrap_or_default().len();
    summary.bytes_reclaimed += images.space_reclaimed.unwrap_or_default();

    let networks = docker.prune_networks(None::<PruneNetworksOptions>).await?;
    summary.networks = networks.networks_deleted.unwrap_or_default().len();

    // all=true includes named volumes, not just anonymous ones
    let volume_filters = HashMap::from([("all".to_string(), vec!["true".to_string()])]);
    let volumes = docker
        .prune_volumes(Some(PruneVolumesOptions {
            filters: Some(volume_filters),
            ..Default::default()
        }))
        .await?;
    summary.volumes = volumes.volumes_deleted.unwrap_or_default().len();
    summary.bytes_reclaimed += volumes.space_reclaimed.unwrap_or_default();

    info!("{summary}");
    Ok(summary)
}

use bollard::Docker;
use bollard::query_parameters::CreateImageOptions;
use futures_util::StreamExt;
use log::{debug, error};

use crate::RefitError;

/// Result of one pull-and-compare pass for a single image reference.
#[derive(Debug)]
pub(crate) struct ImageChange {
    pub changed: bool,
    pub before: Option<String>,
    pub after: String,
}

/// Split `name:tag`, defaulting the tag to `latest`. A `:` that belongs to a
/// registry port (`registry:5000/app`) is not a tag separator, and a
/// digest-pinned reference (`redis@sha256:…`) is pulled verbatim with no tag.
pub(crate) fn split_reference(reference: &str) -> (String, Option<String>) {
    if reference.contains('@') {
        return (reference.to_string(), None);
    }
    match reference.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name.to_string(), Some(tag.to_string())),
        _ => (reference.to_string(), Some("latest".to_string())),
    }
}

/// A container that was never bound to an image counts as changed.
pub(crate) fn identity_changed(before: Option<&str>, after: &str) -> bool {
    match before {
        Some(before) => before != after,
        None => true,
    }
}

pub(crate) async fn pull_image(docker: &Docker, reference: &str) -> Result<(), RefitError> {
    let (image_name, image_tag) = split_reference(reference);
    let options = CreateImageOptions {
        from_image: Some(image_name),
        tag: image_tag,
        ..Default::default()
    };
    let mut pull_stream = docker.create_image(Some(options), None, None);
    let mut failure = None;
    while let Some(result) = pull_stream.next().await {
        match result {
            Ok(output) => {
                if let Some(status) = &output.status {
                    debug!("pull {reference}: {status}");
                }
            }
            Err(e) => {
                error!("error pulling {reference}: {e}");
                failure = Some(e);
            }
        }
    }
    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Resolve the local content identity the reference points at right now.
/// An unresolvable identity is a hard error, never "unchanged".
pub(crate) async fn resolve_image_id(docker: &Docker, reference: &str) -> Result<String, RefitError> {
    let inspect = docker.inspect_image(reference).await?;
    inspect.id.ok_or_else(|| RefitError::UnresolvedImage {
        reference: reference.to_string(),
    })
}

/// Pull `reference` and compare the post-pull identity against `before`.
/// Read/pull only: no container state is touched.
pub(crate) async fn detect_change(
    docker: &Docker,
    reference: &str,
    before: Option<String>,
) -> Result<ImageChange, RefitError> {
    pull_image(docker, reference).await?;
    let after = resolve_image_id(docker, reference).await?;
    let changed = identity_changed(before.as_deref(), &after);
    debug!(
        "{reference}: {} -> {after} (changed: {changed})",
        before.as_deref().unwrap_or("<none>")
    );
    Ok(ImageChange {
        changed,
        before,
        after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_reference_plain_tag() {
        assert_eq!(
            split_reference("redis:7"),
            ("redis".to_string(), Some("7".to_string()))
        );
    }

    #[test]
    fn split_reference_without_tag_defaults_to_latest() {
        assert_eq!(
            split_reference("nginx"),
            ("nginx".to_string(), Some("latest".to_string()))
        );
    }

    #[test]
    fn split_reference_keeps_registry_port_out_of_the_tag() {
        assert_eq!(
            split_reference("registry.local:5000/app"),
            ("registry.local:5000/app".to_string(), Some("latest".to_string()))
        );
        assert_eq!(
            split_reference("registry.local:5000/app:v2"),
            ("registry.local:5000/app".to_string(), Some("v2".to_string()))
        );
    }

    #[test]
    fn digest_pinned_references_are_not_split() {
        assert_eq!(
            split_reference("redis@sha256:0123abc"),
            ("redis@sha256:0123abc".to_string(), None)
        );
        assert_eq!(
            split_reference("registry.local:5000/app@sha256:0123abc"),
            ("registry.local:5000/app@sha256:0123abc".to_string(), None)
        );
    }

    #[test]
    fn identity_compares_content_ids_not_tags() {
        // same tag, new digest: changed
        assert!(identity_changed(Some("sha256:aaa"), "sha256:bbb"));
        // identical content identity: unchanged, whatever the tag said
        assert!(!identity_changed(Some("sha256:aaa"), "sha256:aaa"));
    }

    #[test]
    fn missing_prior_identity_counts_as_changed() {
        assert!(identity_changed(None, "sha256:aaa"));
    }
}

//! Build-context staging and image tagging.
//!
//! Each slice block becomes one image: a generated Dockerfile on top of
//! the runtime base image, plus the block's merged model artifacts. Tags
//! carry a content digest so re-deploys of identical slices resolve to
//! the same image.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use slice_core::SliceBlock;
use tracing::debug;

use crate::error::DeployResult;

/// A staged build context, ready for `FleetApi::build_image`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub tag: String,
    pub context: PathBuf,
}

/// Stage the build context for one slice block.
///
/// Layout: `<staging>/<service>/Dockerfile` plus the block's model
/// artifacts copied under `model/`, index-prefixed to preserve
/// composition order.
pub fn stage_slice_image(
    staging: &Path,
    registry: &str,
    project: &str,
    runtime_image: &str,
    block: &SliceBlock,
) -> DeployResult<StagedImage> {
    let service = block.service_name(project);
    let context = staging.join(&service);
    let model_dir = context.join("model");
    std::fs::create_dir_all(&model_dir)?;

    let mut copied = Vec::new();
    for (index, part) in block.model.parts.iter().enumerate() {
        let dest = model_dir.join(format!("{index:02}-{}", part.name));
        std::fs::copy(&part.artifact, &dest)?;
        copied.push(dest);
    }

    let dockerfile = format!(
        "FROM {runtime_image}\n\
         COPY model/ /opt/slicegrid/model/\n\
         ENV SLICEGRID_SLICE={service}\n",
    );
    let dockerfile_path = context.join("Dockerfile");
    std::fs::write(&dockerfile_path, &dockerfile)?;

    let mut inputs = vec![dockerfile_path];
    inputs.extend(copied);
    let digest = content_digest(&inputs)?;
    let tag = format!("{registry}/{service}:{digest}");

    debug!(%service, %tag, "slice build context staged");
    Ok(StagedImage { tag, context })
}

/// Stage the build context for the pipeline-front service.
///
/// The front image carries the forwarding/aggregation role of the
/// runtime base image instead of a model.
pub fn stage_front_image(
    staging: &Path,
    registry: &str,
    project: &str,
    runtime_image: &str,
) -> DeployResult<StagedImage> {
    let service = format!("{project}-front");
    let context = staging.join(&service);
    std::fs::create_dir_all(&context)?;

    let dockerfile = format!(
        "FROM {runtime_image}\n\
         ENV SLICEGRID_ROLE=front\n",
    );
    let dockerfile_path = context.join("Dockerfile");
    std::fs::write(&dockerfile_path, &dockerfile)?;

    let digest = content_digest(&[dockerfile_path])?;
    let tag = format!("{registry}/{service}:{digest}");

    debug!(%service, %tag, "front build context staged");
    Ok(StagedImage { tag, context })
}

/// SHA-256 over the given files in order, truncated to 12 hex chars.
fn content_digest(paths: &[PathBuf]) -> DeployResult<String> {
    let mut hasher = Sha256::new();
    for path in paths {
        hasher.update(std::fs::read(path)?);
    }
    let digest = hex::encode(hasher.finalize());
    Ok(digest[..12].to_string())
}

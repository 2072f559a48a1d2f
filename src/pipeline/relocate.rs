//! Move staged assets into the final output directory.
//!
//! Consumes [`StagedAssets`] by value and returns the final generation of the
//! URL map, so nothing downstream can hold a staging path by mistake.

use crate::error::SnapshotError;
use crate::pipeline::fetch::{Final, StagedAssets, UrlMap};
use crate::pipeline::naming::{claim_unique_path, is_image_path};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Assets in their final location.
#[derive(Debug)]
pub struct FinalAssets {
    /// The `<slug>_assets` directory.
    pub dir: PathBuf,
    /// Every relocated file, in the staged order.
    pub files: Vec<PathBuf>,
    /// The subset of `files` with an image extension.
    pub images: Vec<PathBuf>,
    pub map: UrlMap<Final>,
}

/// Copy every staged file into `final_dir` and re-key the URL map.
///
/// Each file claims its own name in `final_dir`, so files left there by an
/// earlier run are kept and the new copy gets a `_N` suffix. Any copy
/// failure aborts with [`SnapshotError::Io`].
pub async fn relocate(staged: StagedAssets, final_dir: &Path) -> Result<FinalAssets, SnapshotError> {
    tokio::fs::create_dir_all(final_dir)
        .await
        .map_err(|e| SnapshotError::io(final_dir, e))?;

    let mut moved: HashMap<PathBuf, PathBuf> = HashMap::with_capacity(staged.saved.len());
    let mut files = Vec::with_capacity(staged.saved.len());

    for src in &staged.saved {
        let name = src
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SnapshotError::Internal(format!("staged file without a name: {}", src.display())))?;
        let dst = claim_unique_path(final_dir, name)
            .await
            .map_err(|e| SnapshotError::io(final_dir.join(name), e))?;
        tokio::fs::copy(src, &dst)
            .await
            .map_err(|e| SnapshotError::io(&dst, e))?;
        debug!("Relocated {} → {}", src.display(), dst.display());
        moved.insert(src.clone(), dst.clone());
        files.push(dst);
    }

    let mut map = UrlMap::new();
    for (url, staged_path) in staged.map.iter() {
        match moved.get(staged_path) {
            Some(dst) => map.insert(url.to_string(), dst.clone()),
            None => warn!("No relocated copy for {} ({})", url, staged_path.display()),
        }
    }

    let images = files.iter().filter(|p| is_image_path(p)).cloned().collect();

    info!("Relocated {} assets into {}", files.len(), final_dir.display());
    Ok(FinalAssets {
        dir: final_dir.to_path_buf(),
        files,
        images,
        map,
    })
}

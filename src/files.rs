//! Local file processing: turn HTML files, office documents and images on
//! disk into Markdown documents in the output directory.
//!
//! Each input yields one [`FileOutcome`]; nothing here aborts the batch.

use crate::config::SnapshotConfig;
use crate::error::SnapshotError;
use crate::output::FileOutcome;
use crate::pipeline::describe::{resolve_describer, ImageDescriber};
use crate::pipeline::naming::is_image_path;
use crate::prompts::generated_footer;
use crate::snapshot::write_atomic;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Document formats handed to the configured converter.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["html", "htm", "docx", "xlsx", "pdf"];

enum InputKind {
    Document,
    Image,
}

fn classify(path: &Path) -> Option<InputKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        Some(InputKind::Document)
    } else if is_image_path(path) {
        Some(InputKind::Image)
    } else {
        None
    }
}

/// Convert each of `paths` into `<output_dir>/<stem>.md`.
///
/// Missing paths, directories and unsupported extensions are skipped with a
/// logged reason. Images are described when captioning is enabled and a
/// describer can be resolved; otherwise the document is a plain image
/// reference.
pub async fn process_files(paths: &[PathBuf], config: &SnapshotConfig) -> Vec<FileOutcome> {
    let describer = if config.caption_images {
        match resolve_describer(config) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Images will not be described: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut outcomes = Vec::with_capacity(paths.len());
    for path in paths {
        let outcome = process_one(path, config, describer.as_ref()).await;
        match &outcome {
            FileOutcome::Converted { output, .. } => {
                info!("{} → {}", path.display(), output.display())
            }
            FileOutcome::Skipped { reason, .. } => info!("Skipped {}: {}", path.display(), reason),
            FileOutcome::Failed { error, .. } => warn!("Failed {}: {}", path.display(), error),
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_file_processed(&outcome);
        }
        outcomes.push(outcome);
    }
    outcomes
}

async fn process_one(
    path: &Path,
    config: &SnapshotConfig,
    describer: Option<&Arc<dyn ImageDescriber>>,
) -> FileOutcome {
    let skipped = |reason: &str| FileOutcome::Skipped {
        input: path.to_path_buf(),
        reason: reason.to_string(),
    };

    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return skipped("not a regular file"),
        Err(_) => return skipped("file not found"),
    }
    let Some(kind) = classify(path) else {
        return skipped("unsupported extension");
    };
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return skipped("no file name");
    };

    let result = async {
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|e| SnapshotError::io(&config.output_dir, e))?;
        let markdown = match kind {
            InputKind::Document => config.converter.convert_file(path).await?,
            InputKind::Image => image_document(path, &stem, config, describer).await?,
        };
        let output = config.output_dir.join(format!("{stem}.md"));
        write_atomic(&output, &markdown).await?;
        Ok::<_, SnapshotError>(output)
    }
    .await;

    match result {
        Ok(output) => FileOutcome::Converted {
            input: path.to_path_buf(),
            output,
        },
        Err(e) => FileOutcome::Failed {
            input: path.to_path_buf(),
            error: e.to_string(),
        },
    }
}

/// Copy the image next to the document and reference it, with a description
/// and footer when a describer is available.
async fn image_document(
    path: &Path,
    stem: &str,
    config: &SnapshotConfig,
    describer: Option<&Arc<dyn ImageDescriber>>,
) -> Result<String, SnapshotError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| stem.to_string());
    let target = config.output_dir.join(&name);
    if !same_file(path, &target).await {
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| SnapshotError::io(&target, e))?;
    }

    let alt = stem.replace(['[', ']'], "");
    let mut doc = format!("# {stem}\n\n![{alt}]({})\n", name.replace(' ', "%20"));

    if let Some(describer) = describer {
        match describer.describe(path, &config.prompt, &config.model).await {
            Ok(description) => {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
                doc.push_str(&format!("\n**Description:** {}\n\n", description.trim()));
                doc.push_str(&generated_footer(&config.model, &timestamp));
            }
            Err(e) => {
                warn!("Could not describe {}: {}", path.display(), e);
            }
        }
    } else {
        debug!("No describer; writing plain reference for {}", path.display());
    }
    Ok(doc)
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

use crate::error::{ReplayError, Result};
use crate::manifest::Segment;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub fn segment_file_name(index: usize) -> String {
    format!("segment_{index}.ts")
}

async fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .await
            .map_err(|e| ReplayError::io(path, e))?;
    }
    Ok(())
}

/// Removes `*.ts` files an earlier, failed run left behind.
pub async fn clear_ts_files(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    let mut entries = fs::read_dir(dir).await.map_err(|e| ReplayError::io(dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ReplayError::io(dir, e))?
    {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "ts") {
            fs::remove_file(&path)
                .await
                .map_err(|e| ReplayError::io(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{msg} [{bar:40.cyan/blue}] {pos}/{len} segments ({elapsed_precise})",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message("Downloading");
    bar
}

/// Fetches every segment, one after the other, into `scratch_dir`.
///
/// Files are named by manifest index so the concat list can be rebuilt from
/// the returned paths alone. The first failure stops the whole record.
pub async fn download_segments(
    client: &Client,
    segments: &[Segment],
    scratch_dir: &Path,
    show_progress: bool,
) -> Result<Vec<PathBuf>> {
    ensure_directory(scratch_dir).await?;
    let stale = clear_ts_files(scratch_dir).await?;
    if stale > 0 {
        debug!(stale, dir = %scratch_dir.display(), "removed leftover segments");
    }

    info!(count = segments.len(), "downloading segments");
    let bar = progress_bar(segments.len(), show_progress);
    let mut paths = Vec::with_capacity(segments.len());
    for segment in segments {
        let path = scratch_dir.join(segment_file_name(segment.index));
        let written = download_segment(client, segment, &path).await.inspect_err(|_| {
            bar.abandon();
        })?;
        debug!(index = segment.index, bytes = written, "segment done");
        paths.push(path);
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(paths)
}

async fn download_segment(client: &Client, segment: &Segment, path: &Path) -> Result<u64> {
    let context = || format!("downloading segment {} ({})", segment.index, segment.url);
    let response = client
        .get(segment.url.clone())
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| ReplayError::network(context(), e))?;

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| ReplayError::io(path, e))?;
    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ReplayError::network(context(), e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ReplayError::io(path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| ReplayError::io(path, e))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clears_only_ts_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("segment_0.ts"), b"old").unwrap();
        std::fs::write(dir.path().join("segment_1.ts"), b"old").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        assert_eq!(clear_ts_files(dir.path()).await.unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir.path().join("segment_0.ts").exists());
    }

    #[test]
    fn names_follow_manifest_index() {
        assert_eq!(segment_file_name(0), "segment_0.ts");
        assert_eq!(segment_file_name(12), "segment_12.ts");
    }
}

use crate::error::{ReplayError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const CONCAT_LIST: &str = "concat.txt";

/// Joins downloaded segments into the final file.
pub trait Muxer {
    fn mux(
        &self,
        segments: &[PathBuf],
        scratch_dir: &Path,
        output: &Path,
    ) -> impl Future<Output = Result<()>>;
}

/// Remuxes through `ffmpeg -f concat -c copy`, nothing gets re-encoded.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    program: String,
    timeout: Duration,
}

impl FfmpegMuxer {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        FfmpegMuxer {
            program: program.into(),
            timeout,
        }
    }

    fn tool_error(&self, message: impl Into<String>) -> ReplayError {
        ReplayError::ExternalTool {
            program: self.program.clone(),
            message: message.into(),
        }
    }
}

impl Muxer for FfmpegMuxer {
    async fn mux(&self, segments: &[PathBuf], scratch_dir: &Path, output: &Path) -> Result<()> {
        let list = write_concat_list(scratch_dir, segments).await?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ReplayError::io(parent, e))?;
        }

        info!(output = %output.display(), "remuxing with {}", self.program);
        let mut command = Command::new(&self.program);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list)
            .args(["-c", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(?command, "spawning muxer");

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                self.tool_error(format!("gave up after {:?}", self.timeout))
            })?;
        let finished = match result {
            Ok(finished) => finished,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(self.tool_error("not found, is it installed and on PATH?"));
            }
            Err(e) => return Err(self.tool_error(format!("can't start: {e}"))),
        };

        if !finished.status.success() {
            let stderr = String::from_utf8_lossy(&finished.stderr);
            let tail = stderr.trim().lines().last().unwrap_or("no output");
            return Err(self.tool_error(format!("exited with {}: {tail}", finished.status)));
        }
        if !output.exists() {
            return Err(self.tool_error(format!(
                "exited cleanly but {} was not written",
                output.display()
            )));
        }
        Ok(())
    }
}

// ffmpeg's concat syntax: single quotes, an embedded quote becomes '\''
fn concat_line(name: &str) -> String {
    format!("file '{}'\n", name.replace('\'', r"'\''"))
}

/// Writes the ffmpeg concat list, entries in the order given.
pub async fn write_concat_list(scratch_dir: &Path, segments: &[PathBuf]) -> Result<PathBuf> {
    let list = scratch_dir.join(CONCAT_LIST);
    let mut contents = String::new();
    for segment in segments {
        // the list lives next to the segments, ffmpeg resolves names relative to it
        let name = segment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ReplayError::io(
                    segment,
                    std::io::Error::new(ErrorKind::InvalidInput, "segment path has no file name"),
                )
            })?;
        contents.push_str(&concat_line(&name));
    }
    fs::write(&list, contents)
        .await
        .map_err(|e| ReplayError::io(&list, e))?;
    Ok(list)
}

/// Best effort, a leftover file is only worth a warning.
pub async fn cleanup_scratch(scratch_dir: &Path, segments: &[PathBuf]) {
    let list = scratch_dir.join(CONCAT_LIST);
    for path in segments.iter().chain(std::iter::once(&list)) {
        if let Err(e) = fs::remove_file(path).await
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %path.display(), "could not remove scratch file: {e}");
        }
    }
    // only goes away when nothing else was put there
    if let Err(e) = fs::remove_dir(scratch_dir).await {
        debug!(dir = %scratch_dir.display(), "scratch dir kept: {e}");
    }
}

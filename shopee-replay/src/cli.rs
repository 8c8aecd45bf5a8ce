use crate::config::{Config, FailurePolicy};
use crate::error::{ReplayError, Result};
use crate::input::{ResolvedInput, is_valid_id, resolve_input};
use clap::Parser;
use std::path::PathBuf;

/// Download Shopee Philippines live replays
#[derive(Debug, Parser)]
#[command(name = "shopee-replay", version)]
pub struct Args {
    /// Replay URL or session id, asked for interactively when left out
    pub input: Option<String>,

    /// Session id, instead of INPUT
    #[arg(long, conflicts_with = "input")]
    pub session: Option<String>,

    /// Only download this record of the session
    #[arg(long)]
    pub record: Option<String>,

    /// Directory the finished videos go to
    #[arg(short = 'd', long)]
    pub output_dir: Option<PathBuf>,

    /// Output file name, only when a single record is downloaded
    #[arg(long)]
    pub output: Option<String>,

    /// Where segments are kept while downloading
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// ffmpeg binary to remux with
    #[arg(long, env = "SHOPEE_REPLAY_FFMPEG")]
    pub ffmpeg: Option<String>,

    /// Replay API endpoint
    #[arg(long, hide = true, env = "SHOPEE_REPLAY_API")]
    pub api_base: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Leave the segment files in the scratch directory
    #[arg(long)]
    pub keep_segments: bool,

    /// Stop at the first record that fails
    #[arg(long)]
    pub fail_fast: bool,

    /// Choose one record of the session with fzf
    #[arg(long, conflicts_with = "record")]
    pub pick: bool,

    /// Print a json report on stdout
    #[arg(long)]
    pub json: bool,

    /// Config file, defaults to <config dir>/shopee-replay/config.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Flags beat the config file.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = dir.clone();
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.ffmpeg = ffmpeg.clone();
        }
        if let Some(api_base) = &self.api_base {
            config.api_base = api_base.clone();
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
        if self.keep_segments {
            config.keep_segments = true;
        }
        if self.fail_fast {
            config.failure_policy = FailurePolicy::Abort;
        }
        config.validate()
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some() || self.session.is_some()
    }

    /// Resolves INPUT or `--session`, `--record` wins over a record in the URL.
    pub fn resolve(&self, prompted: Option<&str>) -> Result<ResolvedInput> {
        let raw = self
            .input
            .as_deref()
            .or(self.session.as_deref())
            .or(prompted)
            .unwrap_or_default();
        let mut resolved = resolve_input(raw)?;
        if let Some(record) = &self.record {
            let record = record.trim();
            if !is_valid_id(record) {
                return Err(ReplayError::InputValidation(format!(
                    "'{record}' is not a valid record id"
                )));
            }
            resolved.record_id = Some(record.to_string());
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("shopee-replay").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&["123", "-d", "/videos", "--fail-fast", "--timeout", "5"]);
        let mut config = Config::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/videos"));
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn record_flag_beats_url() {
        let args = parse(&[
            "https://live.shopee.ph/watch/123456?recordId=r1",
            "--record",
            "r9",
        ]);
        let resolved = args.resolve(None).unwrap();
        assert_eq!(resolved.session_id, "123456");
        assert_eq!(resolved.record_id.as_deref(), Some("r9"));
    }

    #[test]
    fn session_flag_and_prompt() {
        let args = parse(&["--session", "777"]);
        assert!(args.has_input());
        assert_eq!(args.resolve(None).unwrap().session_id, "777");

        let args = parse(&[]);
        assert!(!args.has_input());
        assert_eq!(args.resolve(Some(" 888 ")).unwrap().session_id, "888");
        assert!(args.resolve(None).is_err());
    }

    #[test]
    fn session_conflicts_with_input() {
        let result =
            Args::try_parse_from(["shopee-replay", "123", "--session", "456"]);
        assert!(result.is_err());
    }
}

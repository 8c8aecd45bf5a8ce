use crate::error::ReplayError;
use serde::Serialize;
use std::path::PathBuf;

/// Where a record's pipeline was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStage {
    /// Not started yet.
    Resolving,
    FetchingManifest,
    DownloadingSegments,
    Muxing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Done,
    Failed,
    /// Never started because an earlier record failed under the abort policy.
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct RecordReport {
    pub record_id: String,
    pub status: RecordStatus,
    pub stage: RecordStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordReport {
    pub fn done(record_id: &str, output: PathBuf) -> Self {
        RecordReport {
            record_id: record_id.to_string(),
            status: RecordStatus::Done,
            stage: RecordStage::Done,
            output: Some(output),
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(record_id: &str, stage: RecordStage, error: &ReplayError) -> Self {
        RecordReport {
            record_id: record_id.to_string(),
            status: RecordStatus::Failed,
            stage,
            output: None,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
        }
    }

    pub fn skipped(record_id: &str, stage: RecordStage) -> Self {
        RecordReport {
            record_id: record_id.to_string(),
            status: RecordStatus::Skipped,
            stage,
            output: None,
            error_kind: None,
            error: None,
        }
    }
}

/// Machine readable outcome of a whole run, printed with `--json`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub session_id: String,
    pub records: Vec<RecordReport>,
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: bool,
}

impl RunReport {
    pub fn new(session_id: &str, records: Vec<RecordReport>, aborted: bool) -> Self {
        let succeeded = records
            .iter()
            .filter(|r| r.status == RecordStatus::Done)
            .count();
        let failed = records
            .iter()
            .filter(|r| r.status == RecordStatus::Failed)
            .count();
        RunReport {
            session_id: session_id.to_string(),
            records,
            succeeded,
            failed,
            aborted,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.records.is_empty() && self.succeeded == self.records.len()
    }

    pub fn outputs(&self) -> Vec<&PathBuf> {
        self.records.iter().filter_map(|r| r.output.as_ref()).collect()
    }
}

/// The `--json` shape for errors that happen before any record starts.
pub fn error_json(error: &ReplayError) -> serde_json::Value {
    serde_json::json!({
        "status": "error",
        "error_kind": error.kind(),
        "message": error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_serialises() {
        let err = ReplayError::NoRecords("s".into());
        let report = RunReport::new(
            "123456",
            vec![
                RecordReport::failed("r1", RecordStage::DownloadingSegments, &err),
                RecordReport::done("r2", PathBuf::from("shopee_replay_r2.mp4")),
            ],
            false,
        );
        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert!(!report.is_success());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["records"][0]["stage"], "downloading_segments");
        assert_eq!(json["records"][0]["error_kind"], "no_records");
        assert_eq!(json["records"][1]["status"], "done");
        assert!(json["records"][1].get("error").is_none());
    }

    #[test]
    fn empty_run_is_not_a_success() {
        assert!(!RunReport::new("s", Vec::new(), false).is_success());
    }
}

use crate::api::{ApiClient, Record, build_http_client};
use crate::config::{Config, FailurePolicy};
use crate::error::{ReplayError, Result};
use crate::input::ResolvedInput;
use crate::manifest::fetch_manifest;
use crate::mux::{Muxer, cleanup_scratch};
use crate::report::{RecordReport, RecordStage, RunReport};
use crate::segments::download_segments;
use std::path::PathBuf;
use tracing::{Instrument, error, info, info_span};

/// A record that didn't make it, and how far it got.
#[derive(Debug)]
pub struct RecordFailure {
    pub stage: RecordStage,
    pub error: ReplayError,
}

fn at(stage: RecordStage) -> impl FnOnce(ReplayError) -> RecordFailure {
    move |error| RecordFailure { stage, error }
}

/// Runs records one at a time: manifest, segments, mux, cleanup.
pub struct Pipeline<M: Muxer> {
    api: ApiClient,
    muxer: M,
    config: Config,
    show_progress: bool,
    output_name: Option<String>,
}

impl<M: Muxer> Pipeline<M> {
    pub fn new(config: Config, muxer: M) -> Result<Self> {
        config.validate()?;
        let client = build_http_client(&config)?;
        let api = ApiClient::new(client, &config.api_base)?;
        Ok(Pipeline {
            api,
            muxer,
            config,
            show_progress: false,
            output_name: None,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Fixed output file name, only usable when a single record is downloaded.
    pub fn with_output_name(mut self, name: Option<String>) -> Self {
        self.output_name = name;
        self
    }

    /// The records to download: the one named in the input, or every record
    /// of the session.
    pub async fn resolve_records(&self, input: &ResolvedInput) -> Result<Vec<Record>> {
        match &input.record_id {
            Some(record_id) => {
                info!(record_id, "downloading the given record only");
                Ok(vec![Record {
                    id: record_id.clone(),
                    session_id: input.session_id.clone(),
                }])
            }
            None => self.api.list_records(&input.session_id).await,
        }
    }

    pub async fn run(&self, input: &ResolvedInput) -> Result<RunReport> {
        let records = self.resolve_records(input).await?;
        self.run_records(&input.session_id, &records).await
    }

    /// Processes each record in turn. A failure is logged and, unless the
    /// policy says abort, the next record still runs.
    pub async fn run_records(&self, session_id: &str, records: &[Record]) -> Result<RunReport> {
        if self.output_name.is_some() && records.len() > 1 {
            return Err(ReplayError::InputValidation(format!(
                "--output names one file but session {session_id} has {} records",
                records.len()
            )));
        }

        let mut reports = Vec::with_capacity(records.len());
        let mut aborted = false;
        for (i, record) in records.iter().enumerate() {
            if aborted {
                reports.push(RecordReport::skipped(&record.id, RecordStage::Resolving));
                continue;
            }
            info!("downloading record {}/{}: {}", i + 1, records.len(), record.id);

            let span = info_span!("record", id = %record.id);
            match self.process_record(record).instrument(span).await {
                Ok(output) => {
                    info!(record_id = %record.id, output = %output.display(), "record done");
                    reports.push(RecordReport::done(&record.id, output));
                }
                Err(failure) => {
                    error!(
                        record_id = %record.id,
                        stage = ?failure.stage,
                        "record failed: {}",
                        failure.error
                    );
                    reports.push(RecordReport::failed(&record.id, failure.stage, &failure.error));
                    aborted = self.config.failure_policy == FailurePolicy::Abort;
                }
            }
        }

        let report = RunReport::new(session_id, reports, aborted);
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            total = records.len(),
            "run finished"
        );
        Ok(report)
    }

    pub async fn process_record(&self, record: &Record) -> Result<PathBuf, RecordFailure> {
        let manifest_url = self
            .api
            .get_manifest_url(&record.id)
            .await
            .map_err(at(RecordStage::FetchingManifest))?;
        let manifest = fetch_manifest(self.api.http(), &manifest_url)
            .await
            .map_err(at(RecordStage::FetchingManifest))?;

        let scratch = self.config.scratch_for(&record.id);
        let files = download_segments(
            self.api.http(),
            &manifest.segments,
            &scratch,
            self.show_progress,
        )
        .await
        .map_err(at(RecordStage::DownloadingSegments))?;

        let output = match &self.output_name {
            Some(name) => self.config.output_dir.join(name),
            None => self.config.output_path(&record.id),
        };
        self.muxer
            .mux(&files, &scratch, &output)
            .await
            .map_err(at(RecordStage::Muxing))?;

        if self.config.keep_segments {
            info!(dir = %scratch.display(), "keeping segment files");
        } else {
            cleanup_scratch(&scratch, &files).await;
        }
        Ok(output)
    }
}

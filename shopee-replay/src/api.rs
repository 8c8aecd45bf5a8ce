use crate::config::Config;
use crate::error::{ReplayError, Result};
use crate::input::is_valid_id;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

/// One recorded replay of a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub session_id: String,
}

// every replay endpoint wraps its payload like this
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    err_code: Option<i64>,
    #[serde(default)]
    err_msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct RecordList {
    #[serde(default)]
    record_ids: Vec<RecordId>,
}

// shopee hands these out as numbers, links carry them as strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordId {
    Text(String),
    Number(serde_json::Number),
}

impl RecordId {
    fn into_string(self) -> String {
        match self {
            RecordId::Text(s) => s,
            RecordId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReplayData {
    replay_info: Option<ReplayInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplayInfo {
    record_url: Option<String>,
}

/// The HTTP client every stage shares, timeouts come from the config.
pub fn build_http_client(config: &Config) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| ReplayError::Config(format!("could not build http client: {e}")))
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(client: Client, api_base: &str) -> Result<Self> {
        let base = Url::parse(api_base)
            .map_err(|e| ReplayError::Config(format!("bad api_base '{api_base}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ReplayError::Config(format!("bad api_base '{api_base}'")));
        }
        Ok(ApiClient { client, base })
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Lists every record of a session, in the order the API returns them.
    pub async fn list_records(&self, session_id: &str) -> Result<Vec<Record>> {
        let context = format!("session {session_id}");
        info!(session_id, "fetching record ids");
        let request = self
            .client
            .get(self.base.clone())
            .query(&[("session_id", session_id)]);
        let list: RecordList = self.fetch(request, &context).await?.unwrap_or_default();

        // each id owns a scratch dir and an output file, a repeat would clobber both
        let mut seen = HashSet::new();
        let records: Vec<Record> = list
            .record_ids
            .into_iter()
            .map(RecordId::into_string)
            .filter(|id| seen.insert(id.clone()))
            .map(|id| Record {
                id,
                session_id: session_id.to_string(),
            })
            .collect();
        if records.is_empty() {
            return Err(ReplayError::NoRecords(session_id.to_string()));
        }
        if let Some(bad) = records.iter().find(|r| !is_valid_id(&r.id)) {
            return Err(ReplayError::MalformedResponse {
                context,
                message: format!("record id '{}' is not usable", bad.id),
            });
        }
        info!(session_id, count = records.len(), "found records");
        Ok(records)
    }

    /// Resolves the HLS manifest URL of one record.
    pub async fn get_manifest_url(&self, record_id: &str) -> Result<String> {
        let context = format!("record {record_id}");
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ReplayError::Config(format!("bad api_base '{}'", self.base)))?
            .pop_if_empty()
            .push(record_id);

        let data: ReplayData = self
            .fetch(self.client.get(url), &context)
            .await?
            .unwrap_or_default();
        let record_url = data
            .replay_info
            .and_then(|info| info.record_url)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ReplayError::MalformedResponse {
                context: context.clone(),
                message: "replay_info.record_url is missing".into(),
            })?;
        debug!(record_id, %record_url, "resolved manifest url");
        Ok(record_url)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Option<T>> {
        let envelope: Envelope<T> = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ReplayError::network(format!("querying {context}"), e))?
            .json()
            .await
            .map_err(|e| {
                if e.is_decode() {
                    ReplayError::MalformedResponse {
                        context: context.to_string(),
                        message: e.to_string(),
                    }
                } else {
                    ReplayError::network(format!("reading {context}"), e)
                }
            })?;
        check_envelope(&envelope, context)?;
        Ok(envelope.data)
    }
}

fn check_envelope<T>(envelope: &Envelope<T>, context: &str) -> Result<()> {
    match envelope.err_code {
        Some(0) => Ok(()),
        Some(code) => Err(ReplayError::Api {
            context: context.to_string(),
            code,
            message: envelope
                .err_msg
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Unknown error".to_string()),
        }),
        None => Err(ReplayError::MalformedResponse {
            context: context.to_string(),
            message: "err_code is missing".into(),
        }),
    }
}

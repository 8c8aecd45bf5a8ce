use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = ReplayError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("network error while {context}: {source}")]
    Network {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("shopee api error {code} for {context}: {message}")]
    Api {
        context: String,
        code: i64,
        message: String,
    },

    #[error("unexpected response for {context}: {message}")]
    MalformedResponse { context: String, message: String },

    #[error("no records found for session {0}")]
    NoRecords(String),

    #[error("could not parse manifest {url}: {message}")]
    ManifestParse { url: String, message: String },

    #[error("{program}: {message}")]
    ExternalTool { program: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl ReplayError {
    pub(crate) fn network(context: impl Into<String>, source: reqwest::Error) -> Self {
        ReplayError::Network {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReplayError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable name used in the json report.
    pub fn kind(&self) -> &'static str {
        match self {
            ReplayError::InputValidation(_) => "input_validation",
            ReplayError::Network { .. } => "network",
            ReplayError::Api { .. } => "api",
            ReplayError::MalformedResponse { .. } => "malformed_response",
            ReplayError::NoRecords(_) => "no_records",
            ReplayError::ManifestParse { .. } => "manifest_parse",
            ReplayError::ExternalTool { .. } => "external_tool",
            ReplayError::Io { .. } => "io",
            ReplayError::Config(_) => "config",
        }
    }

    /// 2 for things the user typed wrong, 1 for everything that went wrong later.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReplayError::InputValidation(_) | ReplayError::Config(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_exit_with_two() {
        assert_eq!(ReplayError::InputValidation("empty".into()).exit_code(), 2);
        assert_eq!(ReplayError::Config("bad toml".into()).exit_code(), 2);
        assert_eq!(ReplayError::NoRecords("123".into()).exit_code(), 1);
    }

    #[test]
    fn display_names_the_record() {
        let err = ReplayError::Api {
            context: "record 42".into(),
            code: 7,
            message: "replay expired".into(),
        };
        assert_eq!(err.to_string(), "shopee api error 7 for record 42: replay expired");
        assert_eq!(err.kind(), "api");
    }
}

use crate::error::{ReplayError, Result};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

const SHOPEE_HOST: &str = "shopee.ph";
const SESSION_KEYS: [&str; 2] = ["session", "session_id"];
const RECORD_KEYS: [&str; 3] = ["record", "recordId", "record_id"];
const WATCH_PATH: &str = "watch";

static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// Ids end up in file names, so only plain word characters are allowed.
pub fn is_valid_id(id: &str) -> bool {
    BARE_ID.is_match(id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub session_id: String,
    pub record_id: Option<String>,
}

/// Turns whatever the user pasted into a session id and maybe a record id.
///
/// Accepts either a live.shopee.ph replay link (the ids live in the query
/// string, or the session is the second path segment of `/watch/<id>` links)
/// or a bare session id.
pub fn resolve_input(raw: &str) -> Result<ResolvedInput> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ReplayError::InputValidation(
            "expected a Shopee live replay URL or a session id, got nothing".into(),
        ));
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return resolve_url(trimmed);
    }

    if !BARE_ID.is_match(trimmed) {
        return Err(ReplayError::InputValidation(format!(
            "'{trimmed}' is neither a Shopee URL nor a session id"
        )));
    }
    Ok(ResolvedInput {
        session_id: trimmed.to_string(),
        record_id: None,
    })
}

fn resolve_url(raw: &str) -> Result<ResolvedInput> {
    let url = Url::parse(raw)
        .map_err(|e| ReplayError::InputValidation(format!("malformed URL '{raw}': {e}")))?;

    let host = url.host_str().unwrap_or_default();
    if host != SHOPEE_HOST && !host.ends_with(&format!(".{SHOPEE_HOST}")) {
        return Err(ReplayError::InputValidation(format!(
            "'{host}' is not a Shopee Philippines host"
        )));
    }

    let query_value = |keys: &[&str]| {
        url.query_pairs()
            .find(|(k, v)| keys.contains(&&**k) && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
    };

    let session_id = query_value(&SESSION_KEYS[..]).or_else(|| watch_session(&url));

    let Some(session_id) = session_id.filter(|id| is_valid_id(id)) else {
        return Err(ReplayError::InputValidation(format!(
            "no usable session id found in '{raw}'"
        )));
    };

    let record_id = query_value(&RECORD_KEYS[..]);
    if let Some(record_id) = record_id.as_deref().filter(|id| !is_valid_id(id)) {
        return Err(ReplayError::InputValidation(format!(
            "'{record_id}' is not a valid record id"
        )));
    }
    Ok(ResolvedInput {
        session_id,
        record_id,
    })
}

// `/watch/<session>`, nothing else in the path
fn watch_session(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [WATCH_PATH, session] => Some(session.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(session: &str, record: Option<&str>) -> ResolvedInput {
        ResolvedInput {
            session_id: session.to_string(),
            record_id: record.map(str::to_string),
        }
    }

    #[test]
    fn watch_url_with_record() {
        let got = resolve_input("https://live.shopee.ph/watch/123456?recordId=r1").unwrap();
        assert_eq!(got, resolved("123456", Some("r1")));
    }

    #[test]
    fn protocol_and_whitespace_do_not_matter() {
        let inputs = [
            "https://live.shopee.ph/watch/123456?recordId=r1",
            "http://live.shopee.ph/watch/123456?recordId=r1",
            "   https://live.shopee.ph/watch/123456?recordId=r1\n",
            "\thttp://live.shopee.ph/watch/123456?recordId=r1  ",
            "HTTPS://live.shopee.ph/watch/123456?recordId=r1",
        ];
        for input in inputs {
            assert_eq!(
                resolve_input(input).unwrap(),
                resolved("123456", Some("r1")),
                "{input:?}"
            );
        }
    }

    #[test]
    fn query_string_ids_win_over_path() {
        let got = resolve_input(
            "https://live.shopee.ph/share?session=987&record=555&room_id=1",
        )
        .unwrap();
        assert_eq!(got, resolved("987", Some("555")));
    }

    #[test]
    fn url_without_record_lists_session() {
        let got = resolve_input("https://live.shopee.ph/watch/123456").unwrap();
        assert_eq!(got, resolved("123456", None));
    }

    #[test]
    fn watch_path_tolerates_trailing_slash() {
        let got = resolve_input("https://live.shopee.ph/watch/123456/?recordId=r1").unwrap();
        assert_eq!(got, resolved("123456", Some("r1")));
    }

    #[test]
    fn unknown_path_without_session_query_is_rejected() {
        let err = resolve_input("https://live.shopee.ph/share?room_id=1").unwrap_err();
        assert_eq!(err.kind(), "input_validation");
        assert!(err.to_string().contains("no usable session id"), "{err}");
    }

    #[test]
    fn bare_ids_come_back_unchanged() {
        for id in ["123456", "abc_DEF-9", "0"] {
            assert_eq!(resolve_input(id).unwrap(), resolved(id, None));
        }
        assert_eq!(resolve_input("  42 ").unwrap(), resolved("42", None));
    }

    #[test]
    fn empty_input_is_rejected() {
        for input in ["", "   ", "\n\t"] {
            let err = resolve_input(input).unwrap_err();
            assert_eq!(err.kind(), "input_validation");
        }
    }

    #[test]
    fn foreign_hosts_and_junk_are_rejected() {
        for input in [
            "https://example.com/watch/123?recordId=1",
            "https://shopee.ph.evil.com/watch/123",
            "12 34",
            "a/b",
            "https://live.shopee.ph/",
            "https://live.shopee.ph/watch/1?recordId=../../etc",
            "https://live.shopee.ph/share?room_id=1",
            "https://live.shopee.ph/123456",
            "https://live.shopee.ph/watch",
            "https://live.shopee.ph/watch/1/extra",
        ] {
            assert!(resolve_input(input).is_err(), "{input:?}");
        }
    }
}

use crate::api::Record;
use crate::error::{ReplayError, Result};
use fzf_wrapped::Fzf;

fn fzf_error(message: String) -> ReplayError {
    ReplayError::ExternalTool {
        program: "fzf".into(),
        message,
    }
}

fn fzf_lines(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| format!("{}: record {}", i + 1, record.id))
        .collect()
}

// lines look like "3: record 123", the number is 1-based
fn selected_index(selection: &str, len: usize) -> Option<usize> {
    selection
        .split(':')
        .next()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| (1..=len).contains(n))
        .map(|n| n - 1)
}

/// Lets the user choose one record of the session through fzf.
pub fn pick_record(records: &[Record]) -> Result<Record> {
    let mut fzf = Fzf::default();
    fzf.run()
        .map_err(|e| fzf_error(format!("can't start: {e}")))?;
    fzf.add_items(fzf_lines(records))
        .map_err(|e| fzf_error(format!("can't send records: {e}")))?;
    let selection = fzf
        .output()
        .ok_or_else(|| ReplayError::InputValidation("no record selected".into()))?;

    selected_index(&selection, records.len())
        .map(|i| records[i].clone())
        .ok_or_else(|| ReplayError::InputValidation(format!("unknown selection '{selection}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_maps_back_to_record() {
        let records: Vec<Record> = ["a", "b", "c"]
            .into_iter()
            .map(|id| Record {
                id: id.into(),
                session_id: "s".into(),
            })
            .collect();
        let lines = fzf_lines(&records);
        assert_eq!(lines[1], "2: record b");
        assert_eq!(selected_index(&lines[1], records.len()), Some(1));
        assert_eq!(selected_index("0: record x", 3), None);
        assert_eq!(selected_index("9: record x", 3), None);
        assert_eq!(selected_index("", 3), None);
    }
}

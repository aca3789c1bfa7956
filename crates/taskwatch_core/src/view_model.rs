use crate::format::{download_path, FormattedBlock, TextFormatter};
use crate::{StatusSnapshot, TaskStatus};

/// A file the completed task made available for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub filename: String,
    pub url: String,
}

/// Everything a front end needs to show one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotView {
    pub status: TaskStatus,
    pub text: String,
    pub blocks: Vec<FormattedBlock>,
    pub download: Option<DownloadTarget>,
}

impl SnapshotView {
    pub fn from_snapshot(snapshot: &StatusSnapshot, formatter: &TextFormatter) -> Self {
        let text = display_text(snapshot);
        let blocks = formatter.format(&text);
        let download = download_target(snapshot);
        Self {
            status: snapshot.status,
            text,
            blocks,
            download,
        }
    }
}

/// The message followed by whatever result payload a completed task carries.
pub fn display_text(snapshot: &StatusSnapshot) -> String {
    let mut text = snapshot.message.clone();

    if let Some(result) = snapshot.data_str("result") {
        push_section(&mut text, &format!("Final result: {result}"));
        if let Some(file) = snapshot.data_str("file") {
            text.push_str("\nFile: ");
            text.push_str(file);
        }
    }

    // Chat tasks answer through `response` instead of `result`.
    if let Some(response) = snapshot.data_str("response") {
        push_section(&mut text, response);
    }

    text
}

fn push_section(text: &mut String, section: &str) {
    if !text.is_empty() {
        text.push_str("\n\n");
    }
    text.push_str(section);
}

fn download_target(snapshot: &StatusSnapshot) -> Option<DownloadTarget> {
    if !snapshot.download_ready() {
        return None;
    }
    let filename = snapshot.data_str("file")?;
    let url = snapshot
        .data_str("download_url")
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| download_path(filename));
    Some(DownloadTarget {
        filename: filename.to_string(),
        url,
    })
}

//! Terminal rendering of formatted blocks and status updates.

use std::fmt::Write as _;

use taskwatch_core::{
    download_path, DownloadLink, FormattedBlock, Inline, RichText, SnapshotView, StatusUpdate,
    Table, TaskStatus,
};
use taskwatch_engine::ReqwestTransport;
use unicode_width::UnicodeWidthStr;
use url::Url;

const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone)]
pub struct Renderer {
    styled: bool,
    downloads: Option<ReqwestTransport>,
}

impl Renderer {
    /// `styled` turns on ANSI attributes. Download links resolve against the server behind
    /// `downloads`; without one they are printed as given.
    pub fn new(styled: bool, downloads: Option<ReqwestTransport>) -> Self {
        Self { styled, downloads }
    }

    pub fn render_update(&self, update: &StatusUpdate, view: &SnapshotView) -> String {
        let mut out = format!("[{}] {}\n", update.seq, self.status_label(view.status));
        out.push_str(&self.render_blocks(&view.blocks));
        if let Some(download) = &view.download {
            let _ = writeln!(
                out,
                "Download {}: {}",
                download.filename,
                self.download_location(&download.filename, &download.url)
            );
        }
        out
    }

    pub fn render_blocks(&self, blocks: &[FormattedBlock]) -> String {
        let mut out = String::new();
        for block in blocks {
            match block {
                FormattedBlock::Paragraph(text) => {
                    out.push_str(&self.inline(text));
                    out.push('\n');
                }
                FormattedBlock::Blank => out.push('\n'),
                FormattedBlock::Table(table) => out.push_str(&self.table(table)),
                FormattedBlock::DownloadLink(link) => out.push_str(&self.link(link)),
            }
        }
        out
    }

    fn status_label(&self, status: TaskStatus) -> String {
        let label = status.to_string().to_uppercase();
        if !self.styled {
            return label;
        }
        match status {
            TaskStatus::Completed => format!("{BOLD}{GREEN}{label}{RESET}"),
            TaskStatus::Failed => format!("{BOLD}{RED}{label}{RESET}"),
            TaskStatus::Pending | TaskStatus::Processing => format!("{BOLD}{label}{RESET}"),
        }
    }

    fn inline(&self, text: &RichText) -> String {
        if !self.styled {
            return text.plain_text();
        }
        let mut out = String::new();
        for span in text.spans() {
            match span {
                Inline::Text(value) => out.push_str(value),
                Inline::Strong(value) => {
                    let _ = write!(out, "{BOLD}{value}{RESET}");
                }
                Inline::Emphasis(value) => {
                    let _ = write!(out, "{ITALIC}{value}{RESET}");
                }
            }
        }
        out
    }

    fn table(&self, table: &Table) -> String {
        let mut widths = vec![0usize; table.width()];
        for row in table.header.iter().chain(table.rows.iter()) {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.plain_text().width());
            }
        }

        let mut out = String::new();
        if let Some(header) = &table.header {
            out.push_str(&self.table_row(header, &widths, true));
            let rule = widths
                .iter()
                .map(|width| "-".repeat(*width))
                .collect::<Vec<_>>()
                .join("-+-");
            let _ = writeln!(out, "|-{rule}-|");
        }
        for row in &table.rows {
            out.push_str(&self.table_row(row, &widths, false));
        }
        out
    }

    fn table_row(&self, row: &[RichText], widths: &[usize], header: bool) -> String {
        let cells = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| {
                let padding = " ".repeat(width.saturating_sub(cell.plain_text().width()));
                let text = self.inline(cell);
                if header && self.styled {
                    format!("{BOLD}{text}{RESET}{padding}")
                } else {
                    format!("{text}{padding}")
                }
            })
            .collect::<Vec<_>>();
        format!("| {} |\n", cells.join(" | "))
    }

    fn link(&self, link: &DownloadLink) -> String {
        let url = self.download_location(&link.filename, &link.url);
        if self.styled {
            format!("{BOLD}{}{RESET} ({}) <{url}>\n", link.filename, link.ticket)
        } else {
            format!("{} ({}) <{url}>\n", link.filename, link.ticket)
        }
    }

    /// The server's own download route is rebuilt from the filename so it keeps the base
    /// path and escapes the name. Other relative links hang off the base path.
    fn download_location(&self, filename: &str, url: &str) -> String {
        let Some(transport) = &self.downloads else {
            return url.to_string();
        };
        if url == download_path(filename) {
            if let Ok(resolved) = transport.download_url(filename) {
                return resolved.to_string();
            }
        }
        if Url::parse(url).is_ok() {
            return url.to_string();
        }
        let mut base = transport.base_url().clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(url.trim_start_matches('/'))
            .map(|joined| joined.to_string())
            .unwrap_or_else(|_| url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use taskwatch_core::{format, StatusSnapshot, TextFormatter};
    use taskwatch_engine::TransportSettings;

    fn against(base_url: &str) -> Renderer {
        let transport = ReqwestTransport::new(TransportSettings {
            base_url: base_url.into(),
            ..TransportSettings::default()
        })
        .unwrap();
        Renderer::new(false, Some(transport))
    }

    fn plain() -> Renderer {
        against("http://reports.local:8000/")
    }

    fn completed_with(data: &str) -> (StatusUpdate, SnapshotView) {
        let snapshot: StatusSnapshot = serde_json::from_str(&format!(
            r#"{{"status":"completed","message":"Done","data":{data}}}"#
        ))
        .unwrap();
        let view = SnapshotView::from_snapshot(&snapshot, &TextFormatter::new());
        let update = StatusUpdate {
            seq: 4,
            snapshot,
            synthesized: false,
        };
        (update, view)
    }

    #[test]
    fn plain_rendering_drops_markers() {
        let out = plain().render_blocks(&format("**bold** and *soft*"));
        assert_eq!(out, "bold and soft\n");
    }

    #[test]
    fn styled_rendering_uses_ansi() {
        let out = Renderer::new(true, None).render_blocks(&format("**bold** *soft*"));
        assert_eq!(out, "\x1b[1mbold\x1b[0m \x1b[3msoft\x1b[0m\n");
    }

    #[test]
    fn tables_align_by_display_width() {
        let out = plain().render_blocks(&format("|名前|n|\n|-|-|\n|ab|12345|"));
        assert_eq!(
            out,
            "| 名前 | n     |\n|------+-------|\n| ab   | 12345 |\n"
        );
    }

    #[test]
    fn download_links_are_absolute() {
        let out = plain().render_blocks(&format(
            "🎉 操作完成！Jira 工单 T-1 的文件已成功下载为 'T 1.xlsx'",
        ));
        assert!(
            out.ends_with("T 1.xlsx (T-1) <http://reports.local:8000/api/download/T%201.xlsx>\n"),
            "{out}"
        );
    }

    #[test]
    fn update_shows_status_and_download() {
        let (update, view) =
            completed_with(r#"{"result":"ok","file":"r.csv","download_ready":true}"#);

        let out = plain().render_update(&update, &view);
        assert_eq!(
            out,
            "[4] COMPLETED\nDone\n\nFinal result: ok\nFile: r.csv\nDownload r.csv: http://reports.local:8000/api/download/r.csv\n"
        );
    }

    #[test]
    fn download_links_keep_base_path_and_escape_names() {
        let renderer = against("http://host:8000/veeva/");
        let out = renderer.render_blocks(&format(
            "🎉 操作完成！Jira 工单 T-9 的文件已成功下载为 'r#1.xlsx'",
        ));
        assert!(
            out.ends_with("r#1.xlsx (T-9) <http://host:8000/veeva/api/download/r%231.xlsx>\n"),
            "{out}"
        );

        let (update, view) =
            completed_with(r#"{"file":"r#1.xlsx","download_ready":true}"#);
        let out = renderer.render_update(&update, &view);
        assert!(
            out.ends_with("Download r#1.xlsx: http://host:8000/veeva/api/download/r%231.xlsx\n"),
            "{out}"
        );
    }

    #[test]
    fn server_supplied_download_urls_stay_under_base_path() {
        let (update, view) = completed_with(
            r#"{"file":"r.csv","download_url":"/api/download/r.csv?v=2","download_ready":true}"#,
        );
        let out = against("http://host:8000/veeva").render_update(&update, &view);
        assert!(
            out.ends_with("Download r.csv: http://host:8000/veeva/api/download/r.csv?v=2\n"),
            "{out}"
        );
    }
}

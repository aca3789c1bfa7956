//! Turns raw status text into display blocks.
//!
//! The backend writes loosely markdown-flavoured text: pipe tables with a
//! `|---|` separator under the header, `**strong**` and `*emphasis*` spans,
//! and a fixed "operation complete" sentence that names a downloadable file.
//! Formatting never fails; anything that does not parse cleanly is kept as
//! plain text.

use std::sync::LazyLock;

use regex::Regex;

/// Route under which the backend serves downloadable files.
pub const DOWNLOAD_ROUTE: &str = "/api/download/";

/// The sentence the backend emits after it saved a Jira attachment.
///
/// Must expose `ticket` and `filename` capture groups.
pub const DEFAULT_DOWNLOAD_NOTICE: &str =
    r"🎉 操作完成！Jira 工单 (?P<ticket>.+?) 的文件已成功下载为 '(?P<filename>[^']+)'";

static STRONG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("strong pattern compiles"));

static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("emphasis pattern compiles"));

static DEFAULT_FORMATTER: LazyLock<TextFormatter> = LazyLock::new(TextFormatter::new);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Strong(String),
    Emphasis(String),
}

/// A run of inline spans. Markup delimiters are dropped from the span contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichText(pub Vec<Inline>);

impl RichText {
    /// Resolves `**strong**` first, then `*emphasis*` in the remaining text.
    ///
    /// Spans do not nest: `*` markers inside a strong span stay in its text, so
    /// `**total *approx* 5**` is one `Strong("total *approx* 5")`.
    pub fn parse(raw: &str) -> Self {
        let mut spans = Vec::new();
        let mut last = 0;
        for found in STRONG.find_iter(raw) {
            push_emphasis(&raw[last..found.start()], &mut spans);
            spans.push(Inline::Strong(
                raw[found.start() + 2..found.end() - 2].to_string(),
            ));
            last = found.end();
        }
        push_emphasis(&raw[last..], &mut spans);
        Self(spans)
    }

    pub fn spans(&self) -> &[Inline] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Text content without any markup.
    pub fn plain_text(&self) -> String {
        self.0
            .iter()
            .map(|span| match span {
                Inline::Text(text) | Inline::Strong(text) | Inline::Emphasis(text) => {
                    text.as_str()
                }
            })
            .collect()
    }

    /// Re-emits the source markup; inverse of [`RichText::parse`].
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for span in &self.0 {
            match span {
                Inline::Text(text) => out.push_str(text),
                Inline::Strong(text) => {
                    out.push_str("**");
                    out.push_str(text);
                    out.push_str("**");
                }
                Inline::Emphasis(text) => {
                    out.push('*');
                    out.push_str(text);
                    out.push('*');
                }
            }
        }
        out
    }
}

impl From<&str> for RichText {
    /// Plain text, no markup resolution.
    fn from(text: &str) -> Self {
        if text.is_empty() {
            Self::default()
        } else {
            Self(vec![Inline::Text(text.to_string())])
        }
    }
}

fn push_emphasis(text: &str, spans: &mut Vec<Inline>) {
    let mut last = 0;
    for found in EMPHASIS.find_iter(text) {
        push_text(&text[last..found.start()], spans);
        spans.push(Inline::Emphasis(
            text[found.start() + 1..found.end() - 1].to_string(),
        ));
        last = found.end();
    }
    push_text(&text[last..], spans);
}

fn push_text(text: &str, spans: &mut Vec<Inline>) {
    if !text.is_empty() {
        spans.push(Inline::Text(text.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub header: Option<Vec<RichText>>,
    pub rows: Vec<Vec<RichText>>,
}

impl Table {
    /// Cell count shared by every row.
    pub fn width(&self) -> usize {
        self.header
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.rows.first().map(Vec::len))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub ticket: String,
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedBlock {
    Paragraph(RichText),
    /// Single separator standing in for one or more blank lines.
    Blank,
    Table(Table),
    DownloadLink(DownloadLink),
}

impl FormattedBlock {
    pub fn as_paragraph(&self) -> Option<&RichText> {
        match self {
            FormattedBlock::Paragraph(text) => Some(text),
            _ => None,
        }
    }
}

/// Relative download path for a file the backend saved.
pub fn download_path(filename: &str) -> String {
    format!("{DOWNLOAD_ROUTE}{filename}")
}

/// Formats with the default download notice.
pub fn format(text: &str) -> Vec<FormattedBlock> {
    DEFAULT_FORMATTER.format(text)
}

#[derive(Debug, Clone)]
pub struct TextFormatter {
    download_notice: Regex,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self {
            download_notice: Regex::new(DEFAULT_DOWNLOAD_NOTICE)
                .expect("download notice pattern compiles"),
        }
    }

    /// Uses a custom notice pattern. Without `ticket` and `filename` groups
    /// no download links are produced.
    pub fn with_download_notice(download_notice: Regex) -> Self {
        Self { download_notice }
    }

    pub fn format(&self, text: &str) -> Vec<FormattedBlock> {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut blocks = Vec::with_capacity(lines.len());

        if !text.contains('|') {
            for line in lines {
                self.push_paragraph(line, &mut blocks);
            }
            return blocks;
        }

        let mut index = 0;
        while index < lines.len() {
            if parse_row(lines[index]).is_none() {
                self.push_line(lines[index], &mut blocks);
                index += 1;
                continue;
            }

            let start = index;
            let mut rows = Vec::new();
            while let Some(cells) = lines.get(index).copied().and_then(parse_row) {
                rows.push(cells);
                index += 1;
            }

            match build_table(&rows) {
                Some(table) if table.width() > 0 => blocks.push(FormattedBlock::Table(table)),
                Some(_) => {}
                None => {
                    for line in &lines[start..index] {
                        self.push_line(line, &mut blocks);
                    }
                }
            }
        }
        blocks
    }

    fn push_line(&self, line: &str, blocks: &mut Vec<FormattedBlock>) {
        if line.trim().is_empty() {
            if blocks.last() != Some(&FormattedBlock::Blank) {
                blocks.push(FormattedBlock::Blank);
            }
            return;
        }
        self.push_paragraph(line, blocks);
    }

    fn push_paragraph(&self, line: &str, blocks: &mut Vec<FormattedBlock>) {
        if let Some((prefix, link, suffix)) = self.split_download_notice(line) {
            if !prefix.is_empty() {
                blocks.push(FormattedBlock::Paragraph(RichText::parse(prefix)));
            }
            blocks.push(FormattedBlock::DownloadLink(link));
            if !suffix.is_empty() {
                blocks.push(FormattedBlock::Paragraph(RichText::parse(suffix)));
            }
            return;
        }
        blocks.push(FormattedBlock::Paragraph(RichText::parse(line)));
    }

    fn split_download_notice<'a>(&self, line: &'a str) -> Option<(&'a str, DownloadLink, &'a str)> {
        let captures = self.download_notice.captures(line)?;
        let ticket = captures.name("ticket")?;
        let filename = captures.name("filename")?;
        let name = filename.as_str().trim();
        if name.is_empty() {
            return None;
        }

        let prefix = &line[..filename.start()];
        let prefix = prefix.strip_suffix(is_quote).unwrap_or(prefix);
        let suffix = &line[filename.end()..];
        let suffix = suffix.strip_prefix(is_quote).unwrap_or(suffix);

        let link = DownloadLink {
            ticket: ticket.as_str().trim().to_string(),
            filename: name.to_string(),
            url: download_path(name),
        };
        Some((prefix, link, suffix))
    }
}

fn is_quote(c: char) -> bool {
    matches!(c, '\'' | '"' | '`')
}

/// Cells of a `| a | b |` line, or `None` when the line is not a table row.
fn parse_row(line: &str) -> Option<Vec<&str>> {
    let trimmed = line.trim();
    if trimmed.len() < 3 || !trimmed.starts_with('|') || !trimmed.ends_with('|') {
        return None;
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    if !inner.contains('|') {
        return None;
    }
    Some(inner.split('|').map(str::trim).collect())
}

fn is_separator(cells: &[&str]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|cell| !cell.is_empty() && cell.chars().all(|c| c == '-'))
}

/// Builds a table from a run of rows; `None` when the run has no separator row.
///
/// Only the run's first row can be the header, and only when the first separator
/// directly follows it. Rows above a later separator are body rows like the rest.
fn build_table(rows: &[Vec<&str>]) -> Option<Table> {
    let first_separator = rows.iter().position(|row| is_separator(row))?;
    let header_index = (first_separator == 1).then_some(0);

    let width = match rows.iter().find(|row| !is_separator(row)) {
        Some(row) => row.len(),
        None => return Some(Table::default()),
    };

    let header = header_index.map(|index| normalize_row(&rows[index], width));
    let body = rows
        .iter()
        .enumerate()
        .filter(|(index, row)| Some(*index) != header_index && !is_separator(row))
        .map(|(_, row)| normalize_row(row, width))
        .collect();

    Some(Table { header, rows: body })
}

/// Pads short rows with empty cells and folds overflow cells into the last one.
fn normalize_row(cells: &[&str], width: usize) -> Vec<RichText> {
    let mut normalized: Vec<RichText> = cells
        .iter()
        .take(width)
        .map(|cell| RichText::parse(cell))
        .collect();
    if cells.len() > width {
        let merged = cells[width - 1..].join(" | ");
        normalized[width - 1] = RichText::parse(&merged);
    }
    normalized.resize_with(width, RichText::default);
    normalized
}

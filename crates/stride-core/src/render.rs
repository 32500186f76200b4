//! Report rendering collaborator
//!
//! [`ReportRenderer`] is the seam for document output. Two renderers ship
//! here: pretty JSON, and a paginated fixed-width text table.

use crate::error::RenderError;
use stride_model::Report;

/// Turns a report into a document
pub trait ReportRenderer: Send + Sync {
    /// Render report bytes
    ///
    /// # Errors
    /// - `RenderError` if the report cannot be laid out or encoded
    fn render(&self, report: &Report) -> Result<Vec<u8>, RenderError>;

    /// MIME type of the rendered bytes
    fn content_type(&self) -> &'static str;
}

/// Pretty-printed JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn render(&self, report: &Report) -> Result<Vec<u8>, RenderError> {
        serde_json::to_vec_pretty(report).map_err(|e| RenderError::Serialization(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Page separator in table output
pub const PAGE_BREAK: char = '\u{c}';

const HEADERS: [&str; 4] = ["Title", "Severity", "Description", "Mitigation"];
const MIN_COLUMN_WIDTH: usize = 4;

/// Paginated plain-text table with Title/Severity/Description/Mitigation
/// columns and wrapped cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRenderer {
    rows_per_page: usize,
    widths: [usize; 4],
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self {
            rows_per_page: 20,
            widths: [28, 8, 48, 48],
        }
    }
}

impl TableRenderer {
    /// Create renderer with default layout
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With number of threat rows per page
    #[inline]
    #[must_use]
    pub fn with_rows_per_page(mut self, rows: usize) -> Self {
        self.rows_per_page = rows;
        self
    }

    /// With column widths in characters
    #[inline]
    #[must_use]
    pub fn with_column_widths(mut self, widths: [usize; 4]) -> Self {
        self.widths = widths;
        self
    }

    /// Number of pages a report needs
    #[must_use]
    pub fn page_count(&self, report: &Report) -> usize {
        report.threats.len().div_ceil(self.rows_per_page.max(1)).max(1)
    }

    fn check_layout(&self) -> Result<(), RenderError> {
        if self.rows_per_page == 0 {
            return Err(RenderError::InvalidLayout("rows per page must be positive".into()));
        }
        if let Some(width) = self.widths.iter().find(|w| **w < MIN_COLUMN_WIDTH) {
            return Err(RenderError::InvalidLayout(format!(
                "column width {width} is below the minimum of {MIN_COLUMN_WIDTH}"
            )));
        }
        Ok(())
    }

    fn separator(&self) -> String {
        let mut line = String::from("+");
        for width in self.widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line
    }

    fn push_row(&self, out: &mut Vec<String>, cells: [&str; 4]) {
        let wrapped: Vec<Vec<String>> = cells
            .iter()
            .zip(self.widths)
            .map(|(cell, width)| wrap(cell, width))
            .collect();
        let height = wrapped.iter().map(Vec::len).max().unwrap_or(1);

        for line_index in 0..height {
            let mut line = String::from("|");
            for (column, width) in wrapped.iter().zip(self.widths) {
                let text = column.get(line_index).map_or("", String::as_str);
                line.push_str(&format!(" {text:<width$} |"));
            }
            out.push(line);
        }
    }
}

impl ReportRenderer for TableRenderer {
    fn render(&self, report: &Report) -> Result<Vec<u8>, RenderError> {
        self.check_layout()?;

        let total = self.page_count(report);
        let separator = self.separator();
        let mut pages = Vec::with_capacity(total);

        let chunks: Vec<_> = if report.threats.is_empty() {
            vec![&report.threats[..]]
        } else {
            report.threats.chunks(self.rows_per_page).collect()
        };

        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut lines = vec![
                format!(
                    "STRIDE threat report | analysis {} | Page {}/{}",
                    report.analysis_id,
                    index + 1,
                    total
                ),
                separator.clone(),
            ];
            self.push_row(&mut lines, HEADERS);
            lines.push(separator.clone());

            if chunk.is_empty() {
                lines.push("(no threats)".to_string());
            }
            for threat in chunk {
                self.push_row(
                    &mut lines,
                    [
                        threat.title.as_str(),
                        threat.severity.as_str(),
                        threat.description.as_str(),
                        threat.mitigation.as_str(),
                    ],
                );
                lines.push(separator.clone());
            }
            pages.push(lines.join("\n"));
        }

        let page_break = format!("\n{PAGE_BREAK}\n");
        let mut text = pages.join(page_break.as_str());
        text.push('\n');
        Ok(text.into_bytes())
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }
}

/// Greedy word wrap; words longer than `width` are split
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(width) {
            let piece: String = piece.iter().collect();
            let current_len = current.chars().count();
            if current_len == 0 {
                current = piece;
            } else if current_len + 1 + piece.chars().count() <= width {
                current.push(' ');
                current.push_str(&piece);
            } else {
                lines.push(std::mem::take(&mut current));
                current = piece;
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

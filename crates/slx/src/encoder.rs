// ai
//! 🧾 Encoder — cleaned rows in, quoted CSV bytes out.
//!
//! Every field is quoted. Embedded quotes are doubled. Lines end in `\n`.
//! The header goes out exactly once, on the first non-empty chunk, and the caller
//! decides which chunk that is. We just write what we're told. 🦆
//!
//! 🧠 Knowledge graph:
//! - Upstream: `sanitize::normalize_cell_text` has already flattened tabs/newlines
//! - Downstream: `uploader::UploadCoordinator::append` swallows the bytes
//! - Round-trip: a `csv::Reader` with default settings gives back the exact cell strings

use anyhow::{Context, Result};
use csv::{QuoteStyle, Terminator, WriterBuilder};

/// 🧾 Stateless CSV encoder with a fixed quoting discipline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowEncoder;

impl RowEncoder {
    /// 📦 Serialize one chunk. `header_names` is written first only when `include_header` is set.
    pub fn encode(
        &self,
        rows: &[Vec<String>],
        include_header: bool,
        header_names: &[String],
    ) -> Result<Vec<u8>> {
        // 🧮 vibes-based capacity: cell bytes + quotes + commas, roughly
        let the_estimate: usize = rows
            .iter()
            .map(|row| row.iter().map(|c| c.len() + 3).sum::<usize>() + 1)
            .sum();
        let mut the_writer = WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::Always)
            .double_quote(true)
            .terminator(Terminator::Any(b'\n'))
            // -- 📐 rows are passed through at whatever width the source gave them
            .flexible(true)
            .from_writer(Vec::with_capacity(the_estimate));

        if include_header {
            the_writer
                .write_record(header_names)
                .context("💀 Failed to write the header line. It was RIGHT THERE.")?;
        }
        for (idx, row) in rows.iter().enumerate() {
            the_writer
                .write_record(row)
                .with_context(|| format!("💀 Failed to encode row {idx} of the chunk"))?;
        }

        the_writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("💀 Failed to flush the CSV writer: {}", e.error()))
    }
}

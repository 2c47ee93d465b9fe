// AI
//! 📊 progress.rs — "Are we there yet?" — every conversion, every time, forever.
//!
//! 🚀 Rows in, bytes out, parts shipped. A progress bar measured in rows (when the
//! sheet height is known) and a comfy-table panel underneath it with the rates.
//!
//! ⚠️  Warning: Watching this progress bar will not make the spreadsheet smaller.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

// -- 📏 one mebibyte — not a megabyte, pedants.
const MIB: f64 = 1024.0 * 1024.0;

/// 🔢 "1000000 rows" → "1,000,000 rows" — you're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS or HH:MM:SS. If it shows HH:MM:SS, the spreadsheet owner owes you lunch.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

struct Rates {
    rows_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 Tracks rows converted, bytes encoded, parts uploaded, and renders them.
///
/// Rates use a sliding 5-second window so one slow chunk doesn't look like the apocalypse.
pub(crate) struct ProgressMetrics {
    label: String,
    /// 📏 data rows in the sheet, when the source could say
    total_rows: Option<u64>,
    rows: u64,
    bytes: u64,
    parts: usize,
    progress_bar: ProgressBar,
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("total_rows", &self.total_rows)
            .field("rows", &self.rows)
            .field("bytes", &self.bytes)
            .field("parts", &self.parts)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 `visible = false` gives a hidden bar: all the bookkeeping, none of the terminal.
    pub(crate) fn new(label: String, total_rows: Option<u64>, visible: bool) -> Self {
        let progress_bar = if visible {
            ProgressBar::new(total_rows.unwrap_or(0))
        } else {
            ProgressBar::hidden()
        };
        let the_style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(the_style);

        let start_time = Instant::now();
        // -- 🔄 seed the window with t=0 so we don't divide by zero like animals
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            label,
            total_rows,
            rows: 0,
            bytes: 0,
            parts: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Feed it one chunk's worth of numbers. `parts` is the running total, not a delta.
    pub(crate) fn update(&mut self, rows: u64, bytes: u64, parts: usize) {
        self.rows += rows;
        self.bytes += bytes;
        self.parts = parts;

        let rates = self.calculate_rates();
        self.render(rates);
        self.progress_bar.set_position(self.rows);
    }

    /// ✅ Ring the bell. We made it. (Or we hit the empty window. Same energy.)
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    /// 🧹 Clear the bar without pretending it finished.
    pub(crate) fn abandon(&self) {
        self.progress_bar.abandon();
    }

    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.rows, self.bytes));

        if let Some(&(oldest_time, oldest_rows, oldest_bytes)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                return Rates {
                    rows_per_sec: self.rows.saturating_sub(oldest_rows) as f64 / elapsed,
                    mib_per_sec: (self.bytes.saturating_sub(oldest_bytes) as f64 / elapsed) / MIB,
                };
            }
        }
        Rates {
            rows_per_sec: 0.0,
            mib_per_sec: 0.0,
        }
    }

    /// ⏳ Linear extrapolation from rows done vs rows known. No total, no ETA.
    fn remaining(&self, elapsed: Duration) -> String {
        match self.total_rows {
            Some(total) if total > 0 && self.rows > 0 => {
                let the_fraction = (self.rows as f64 / total as f64).min(1.0);
                let the_remaining = elapsed.as_secs_f64() / the_fraction - elapsed.as_secs_f64();
                if the_remaining > 0.0 {
                    format_duration(Duration::from_secs_f64(the_remaining))
                } else {
                    "--:--".to_string()
                }
            }
            _ => "--:--".to_string(),
        }
    }

    /// 🎨 Layout:
    /// ```text
    /// | sheet: <label>
    /// | [=====>----------]
    ///   <rows/s>     <rows / total>
    ///   <MiB/s>      <MiB encoded>
    ///   <parts>      <part label>
    ///   <elapsed>    <remaining>
    /// ```
    fn render(&self, rates: Rates) {
        let rows_progress = match self.total_rows {
            Some(total) => format!("{} / {} Rows", format_number(self.rows), format_number(total)),
            None => format!("{} Rows", format_number(self.rows)),
        };
        let elapsed = self.start_time.elapsed();

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Rows/s", format_number(rates.rows_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(rows_progress).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2} MiB encoded", self.bytes as f64 / MIB))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} parts", self.parts)).set_alignment(CellAlignment::Right),
            Cell::new(if self.parts == 0 { "buffering" } else { "multipart" })
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", self.remaining(elapsed)))
                .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("sheet: {}\n{}", self.label, table));
    }
}

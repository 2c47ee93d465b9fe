// ai
//! 📗 SpreadsheetSource — calamine behind a row-window interface.
//!
//! 🎬 COLD OPEN — INT. SCRATCH DIRECTORY — NIGHT
//!
//! The workbook arrives from the bucket as a temp file with a hopeful extension.
//! Nobody trusts the extension. We try the engine it suggests first, then every other
//! engine in a fixed order, and only give up when all of them have said no. Each "no"
//! is logged. The last one is returned with all the others stapled to it.
//!
//! 🧠 Knowledge graph:
//! - Engines: Xlsx → Xls → Xlsb → Ods, with the extension's favorite moved to the front
//! - The selected sheet is decoded once and cached. Xlsx/Xlsb stream their cells and only the
//!   non-empty ones are kept; Xls/Ods only hand out a whole dense `Range`
//! - Windows are sliced from the cached sheet, converted to text only for the rows asked for
//! - Decoding is CPU work, so it runs on the blocking pool
//! - Row 0 of the range is the header; offsets count rows after it

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use calamine::{Cell, Data, DataRef, Ods, Range, Reader, Xls, Xlsb, Xlsx, open_workbook};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::locations::ObjectLocation;
use crate::sources::{RowWindow, SheetId, TabularSource};
use crate::stores::ObjectStore;

type FileReader = BufReader<File>;

/// 📅 The one date format everybody downstream agreed on.
pub(crate) const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 🔧 A calamine reader, by format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEngine {
    Xlsx,
    Xls,
    Xlsb,
    Ods,
}

impl DecodeEngine {
    /// 🔁 The fallback order when the extension has no opinion.
    pub const FALLBACK_ORDER: [DecodeEngine; 4] = [Self::Xlsx, Self::Xls, Self::Xlsb, Self::Ods];

    pub fn for_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "xlsx" | "xlsm" | "xlam" => Some(Self::Xlsx),
            "xls" | "xla" => Some(Self::Xls),
            "xlsb" => Some(Self::Xlsb),
            "ods" => Some(Self::Ods),
            _ => None,
        }
    }

    /// 📋 Every engine, the one the file name suggests first.
    pub fn ordered_for(file_name: &str) -> Vec<Self> {
        let the_preferred = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::for_extension);
        let mut the_order: Vec<Self> = the_preferred.into_iter().collect();
        the_order.extend(
            Self::FALLBACK_ORDER
                .into_iter()
                .filter(|engine| Some(*engine) != the_preferred),
        );
        the_order
    }

    fn open(self, path: &Path) -> Result<Workbook> {
        Ok(match self {
            Self::Xlsx => Workbook::Xlsx(open_workbook(path)?),
            Self::Xls => Workbook::Xls(open_workbook(path)?),
            Self::Xlsb => Workbook::Xlsb(open_workbook(path)?),
            Self::Ods => Workbook::Ods(open_workbook(path)?),
        })
    }
}

impl fmt::Display for DecodeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let the_name = match self {
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Xlsb => "xlsb",
            Self::Ods => "ods",
        };
        f.write_str(the_name)
    }
}

enum Workbook {
    Xlsx(Xlsx<FileReader>),
    Xls(Xls<FileReader>),
    Xlsb(Xlsb<FileReader>),
    Ods(Ods<FileReader>),
}

impl Workbook {
    fn sheet_names(&self) -> Vec<String> {
        match self {
            Self::Xlsx(book) => book.sheet_names(),
            Self::Xls(book) => book.sheet_names(),
            Self::Xlsb(book) => book.sheet_names(),
            Self::Ods(book) => book.sheet_names(),
        }
    }

    fn decode_sheet(&mut self, name: &str) -> Result<DecodedSheet> {
        Ok(match self {
            Self::Xlsx(book) => {
                let mut the_reader = book.worksheet_cells_reader(name)?;
                let mut the_sheet = SparseSheet::default();
                while let Some(cell) = the_reader.next_cell()? {
                    the_sheet.insert(cell);
                }
                DecodedSheet::Sparse(the_sheet)
            }
            Self::Xlsb(book) => {
                let mut the_reader = book.worksheet_cells_reader(name)?;
                let mut the_sheet = SparseSheet::default();
                while let Some(cell) = the_reader.next_cell()? {
                    the_sheet.insert(cell);
                }
                DecodedSheet::Sparse(the_sheet)
            }
            Self::Xls(book) => DecodedSheet::Dense(book.worksheet_range(name)?),
            Self::Ods(book) => DecodedSheet::Dense(book.worksheet_range(name)?),
        })
    }
}

/// 🕳️ Only the cells that hold something, grouped by absolute row.
/// Bounds start at the first non-empty row and column, the same way calamine sizes a `Range`.
#[derive(Debug, Default)]
struct SparseSheet {
    rows: BTreeMap<u32, Vec<(u32, Data)>>,
    columns: Option<(u32, u32)>,
    cells: usize,
}

impl SparseSheet {
    fn insert(&mut self, cell: Cell<DataRef<'_>>) {
        let the_value: Data = cell.get_value().clone().into();
        if the_value == Data::Empty {
            return;
        }
        let (row, column) = cell.get_position();
        self.columns = Some(match self.columns {
            Some((first, last)) => (first.min(column), last.max(column)),
            None => (column, column),
        });
        self.rows.entry(row).or_default().push((column, the_value));
        self.cells += 1;
    }

    fn first_row(&self) -> Option<u32> {
        self.rows.keys().next().copied()
    }

    fn height(&self) -> usize {
        match (self.first_row(), self.rows.keys().next_back()) {
            (Some(first), Some(last)) => (last - first) as usize + 1,
            _ => 0,
        }
    }

    fn width(&self) -> usize {
        self.columns.map_or(0, |(first, last)| (last - first) as usize + 1)
    }

    /// 📏 Rows `start..end` relative to the first row, gaps filled with empty cells.
    fn rows_text(&self, start: usize, end: usize) -> Vec<Vec<String>> {
        let (Some(first_row), Some((first_column, _))) = (self.first_row(), self.columns) else {
            return Vec::new();
        };
        let the_end = end.min(self.height());
        let the_width = self.width();
        (start..the_end)
            .map(|relative| {
                let mut the_row = vec![String::new(); the_width];
                // -- relative < height, and height came from u32 row numbers
                let the_absolute = first_row + relative as u32;
                for (column, value) in self.rows.get(&the_absolute).into_iter().flatten() {
                    if let Some(slot) = the_row.get_mut((column - first_column) as usize) {
                        *slot = cell_text(value);
                    }
                }
                the_row
            })
            .collect()
    }
}

/// 🗂️ One decoded sheet, whichever way the engine could hand it over.
#[derive(Debug)]
enum DecodedSheet {
    Dense(Range<Data>),
    Sparse(SparseSheet),
}

impl DecodedSheet {
    /// Every row, header included.
    fn height(&self) -> usize {
        match self {
            Self::Dense(range) => range.height(),
            Self::Sparse(sheet) => sheet.height(),
        }
    }

    fn width(&self) -> usize {
        match self {
            Self::Dense(range) => range.width(),
            Self::Sparse(sheet) => sheet.width(),
        }
    }

    fn header(&self) -> Vec<String> {
        self.rows_text(0, 1).into_iter().next().unwrap_or_default()
    }

    /// 📖 Up to `count` data rows starting `offset` rows after the header.
    fn data_rows(&self, offset: usize, count: usize) -> Vec<Vec<String>> {
        let the_start = offset.saturating_add(1);
        self.rows_text(the_start, the_start.saturating_add(count))
    }

    fn rows_text(&self, start: usize, end: usize) -> Vec<Vec<String>> {
        match self {
            Self::Dense(range) => range
                .rows()
                .skip(start)
                .take(end.saturating_sub(start))
                .map(row_text)
                .collect(),
            Self::Sparse(sheet) => sheet.rows_text(start, end),
        }
    }
}

/// 🧮 Integers print without `.0`; anything with a fraction (or too big to be exact) prints as-is.
fn float_text(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

/// 🔤 One cell, as the text that lands in the CSV.
pub(crate) fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) => float_text(*value),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        Data::DateTime(value) => match value.as_datetime() {
            Some(datetime) => datetime.format(DATE_TIME_FORMAT).to_string(),
            None => float_text(value.as_f64()),
        },
        Data::DateTimeIso(text) | Data::DurationIso(text) => text.clone(),
        Data::Error(error) => error.to_string(),
    }
}

fn row_text(row: &[Data]) -> Vec<String> {
    row.iter().map(cell_text).collect()
}

/// 📗 A workbook downloaded to scratch space, opened by whichever engine could read it.
pub struct SpreadsheetSource {
    origin: String,
    engine: DecodeEngine,
    sheet_names: Vec<String>,
    workbook: Option<Workbook>,
    decoded: Option<(usize, DecodedSheet)>,
    scratch: Option<NamedTempFile>,
}

impl fmt::Debug for SpreadsheetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpreadsheetSource")
            .field("origin", &self.origin)
            .field("engine", &self.engine)
            .field("sheet_names", &self.sheet_names)
            .field("decoded_sheet", &self.decoded.as_ref().map(|(index, _)| index))
            .finish_non_exhaustive()
    }
}

impl SpreadsheetSource {
    /// 📥 Download the workbook into scratch space and open it.
    pub async fn open<S: ObjectStore + ?Sized>(
        store: &S,
        location: &ObjectLocation,
        scratch_dir: Option<&Path>,
    ) -> Result<Self> {
        let the_suffix = Path::new(location.file_name())
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let mut the_builder = tempfile::Builder::new();
        the_builder.prefix("slx-source-").suffix(&the_suffix);
        let the_scratch = match scratch_dir {
            Some(dir) => the_builder.tempfile_in(dir),
            None => the_builder.tempfile(),
        }
        .context("💀 Could not create a scratch file for the workbook")?;

        let the_size = store
            .download_to(location, the_scratch.path())
            .await
            .with_context(|| format!("💀 Could not download the workbook from {location}"))?;
        info!("📥 downloaded {} ({} bytes)", location, the_size);

        let mut the_source =
            Self::open_path(the_scratch.path(), location.file_name(), location.to_string()).await?;
        the_source.scratch = Some(the_scratch);
        Ok(the_source)
    }

    /// 📂 Open a workbook already on disk. `file_name` only steers which engine goes first.
    pub async fn open_path(path: &Path, file_name: &str, origin: String) -> Result<Self> {
        let the_engines = DecodeEngine::ordered_for(file_name);
        let the_path = path.to_path_buf();
        let the_origin = origin.clone();

        let (the_engine, the_workbook) = tokio::task::spawn_blocking(move || {
            let mut the_failures = Vec::new();
            for engine in the_engines {
                match engine.open(&the_path) {
                    Ok(workbook) => return Ok((engine, workbook)),
                    Err(err) => {
                        warn!("⚠️ {} engine could not read {}: {:#}", engine, the_origin, err);
                        the_failures.push(format!("{engine}: {err:#}"));
                    }
                }
            }
            Err(anyhow!(
                "💀 No decoding engine could read {the_origin}. Tried {}",
                the_failures.join("; ")
            ))
        })
        .await
        .context("💀 The workbook decoding task panicked")??;

        let the_sheet_names = the_workbook.sheet_names();
        debug!(
            "📗 opened {} with the {} engine, sheets: {:?}",
            origin, the_engine, the_sheet_names
        );
        Ok(Self {
            origin,
            engine: the_engine,
            sheet_names: the_sheet_names,
            workbook: Some(the_workbook),
            decoded: None,
            scratch: None,
        })
    }

    pub fn engine(&self) -> DecodeEngine {
        self.engine
    }

    async fn ensure_decoded(&mut self, sheet: &SheetId) -> Result<&DecodedSheet> {
        let already_decoded = matches!(&self.decoded, Some((index, _)) if *index == sheet.index);
        if !already_decoded {
            let mut the_workbook = self
                .workbook
                .take()
                .with_context(|| format!("💀 {} is already closed", self.origin))?;
            let the_name = sheet.name.clone();
            let (the_workbook, the_decoded) = tokio::task::spawn_blocking(move || {
                let the_decoded = the_workbook.decode_sheet(&the_name);
                (the_workbook, the_decoded)
            })
            .await
            .context("💀 The sheet decoding task panicked")?;
            self.workbook = Some(the_workbook);

            let the_decoded = the_decoded
                .with_context(|| format!("💀 Could not decode sheet {sheet} of {}", self.origin))?;
            match &the_decoded {
                DecodedSheet::Sparse(sparse) => info!(
                    "📗 decoded sheet {}: {} rows x {} columns, {} non-empty cells kept",
                    sheet,
                    the_decoded.height(),
                    the_decoded.width(),
                    sparse.cells
                ),
                DecodedSheet::Dense(_) => info!(
                    "📗 decoded sheet {}: {} rows x {} columns",
                    sheet,
                    the_decoded.height(),
                    the_decoded.width()
                ),
            }
            self.decoded = Some((sheet.index, the_decoded));
        }
        match &self.decoded {
            Some((_, decoded)) => Ok(decoded),
            None => Err(anyhow!("💀 sheet {sheet} vanished right after decoding")),
        }
    }
}

#[async_trait]
impl TabularSource for SpreadsheetSource {
    async fn list_sheets(&mut self) -> Result<Vec<SheetId>> {
        Ok(self
            .sheet_names
            .iter()
            .enumerate()
            .map(|(index, name)| SheetId {
                index,
                name: name.clone(),
            })
            .collect())
    }

    async fn read_rows(&mut self, sheet: &SheetId, offset: u64, count: usize) -> Result<RowWindow> {
        let the_decoded = self.ensure_decoded(sheet).await?;
        let the_header = the_decoded.header();
        let the_skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let the_window_rows = the_decoded.data_rows(the_skip, count);
        Ok(RowWindow {
            offset,
            requested: count,
            header: the_header,
            rows: the_window_rows,
        })
    }

    async fn row_count_hint(&mut self, sheet: &SheetId) -> Result<Option<u64>> {
        let the_decoded = self.ensure_decoded(sheet).await?;
        Ok(Some(the_decoded.height().saturating_sub(1) as u64))
    }

    async fn close(&mut self) -> Result<()> {
        self.decoded = None;
        self.workbook = None;
        if let Some(scratch) = self.scratch.take() {
            scratch
                .close()
                .with_context(|| format!("💀 Could not remove the scratch copy of {}", self.origin))?;
        }
        Ok(())
    }
}

//! 📖 Sources — where rows come from.
//!
//! 🎬 *[a workbook sits in a bucket. 40 MB. 14 sheets. One of them matters.]*
//!
//! A tabular source can list its sheets, hand out a window of rows starting at a
//! data-row offset, and be closed. That's the whole relationship. An empty window is
//! the end of the sheet. Not an error, not a sentinel row, just nothing. 🦆
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (Spreadsheet, InMemory) → `SourceBackend` enum
//! - Offsets count DATA rows. Row 0 of the sheet is the header and rides along in every window.
//! - Stateless w.r.t. previous reads: the caller owns the offset and advances it.

use std::fmt;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::app_config::SheetSelector;

pub(crate) mod in_mem;
pub(crate) mod spreadsheet;

pub use in_mem::{InMemorySheet, InMemorySource, SourceRead};
pub use spreadsheet::{DecodeEngine, SpreadsheetSource};

/// 📑 A sheet, by position and by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetId {
    pub index: usize,
    pub name: String,
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (#{})", self.name, self.index)
    }
}

/// 🪟 One page of rows.
///
/// `offset` is the data-row offset it was read at, `requested` is how many rows were asked
/// for, `header` is the sheet's first row (raw, unsanitized), `rows` is what came back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowWindow {
    pub offset: u64,
    pub requested: usize,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RowWindow {
    /// 🏁 The sole end-of-data signal.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// 📖 The tabular-source capability.
#[async_trait]
pub trait TabularSource: fmt::Debug + Send {
    /// 📑 Every sheet, in workbook order.
    async fn list_sheets(&mut self) -> Result<Vec<SheetId>>;

    /// 🪟 Up to `count` data rows starting at data-row `offset`. Past the end = empty window.
    async fn read_rows(&mut self, sheet: &SheetId, offset: u64, count: usize) -> Result<RowWindow>;

    /// 📏 Number of data rows, when the source can tell without guessing.
    async fn row_count_hint(&mut self, sheet: &SheetId) -> Result<Option<u64>>;

    /// 🚪 Release whatever the source is holding (scratch files, decoded sheets).
    async fn close(&mut self) -> Result<()>;
}

/// 🔍 Resolve a selector against the sheets a source actually has.
pub fn select_sheet(sheets: &[SheetId], selector: &SheetSelector) -> Result<SheetId> {
    let the_found = match selector {
        SheetSelector::Index(index) => sheets.iter().find(|s| s.index == *index),
        SheetSelector::Name(name) => sheets.iter().find(|s| &s.name == name),
    };
    match the_found {
        Some(sheet) => Ok(sheet.clone()),
        None => {
            let the_available: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
            bail!("💀 No sheet {selector} in this workbook. It has: {the_available:?}")
        }
    }
}

/// 🎭 The many faces of a source.
#[derive(Debug)]
pub enum SourceBackend {
    Spreadsheet(SpreadsheetSource),
    InMemory(InMemorySource),
}

#[async_trait]
impl TabularSource for SourceBackend {
    async fn list_sheets(&mut self) -> Result<Vec<SheetId>> {
        match self {
            Self::Spreadsheet(source) => source.list_sheets().await,
            Self::InMemory(source) => source.list_sheets().await,
        }
    }

    async fn read_rows(&mut self, sheet: &SheetId, offset: u64, count: usize) -> Result<RowWindow> {
        match self {
            Self::Spreadsheet(source) => source.read_rows(sheet, offset, count).await,
            Self::InMemory(source) => source.read_rows(sheet, offset, count).await,
        }
    }

    async fn row_count_hint(&mut self, sheet: &SheetId) -> Result<Option<u64>> {
        match self {
            Self::Spreadsheet(source) => source.row_count_hint(sheet).await,
            Self::InMemory(source) => source.row_count_hint(sheet).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Spreadsheet(source) => source.close().await,
            Self::InMemory(source) => source.close().await,
        }
    }
}

/// ✂️ Slice a window out of a fully known row list. Shared by every source that has one.
pub(crate) fn slice_window(
    header: &[String],
    rows: &[Vec<String>],
    offset: u64,
    count: usize,
) -> RowWindow {
    let the_start = usize::try_from(offset).unwrap_or(usize::MAX).min(rows.len());
    let the_end = the_start.saturating_add(count).min(rows.len());
    RowWindow {
        offset,
        requested: count,
        header: header.to_vec(),
        rows: rows[the_start..the_end].to_vec(),
    }
}

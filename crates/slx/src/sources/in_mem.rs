//! 🧪 InMemorySource — a workbook made of Vecs.
//!
//! Holds named sheets in memory, writes down every read, and can be told to
//! blow up at a given offset. Clones share state, so a test keeps one handle
//! and hands the other to the pipeline. Then asks it awkward questions afterwards. 🦆

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::sources::{RowWindow, SheetId, TabularSource, slice_window};

/// 📄 One sheet: a header row and data rows.
#[derive(Debug, Clone, Default)]
pub struct InMemorySheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl InMemorySheet {
    pub fn new(name: impl Into<String>, header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            header,
            rows,
        }
    }
}

/// 📼 One recorded `read_rows` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRead {
    pub sheet_index: usize,
    pub offset: u64,
    pub count: usize,
    pub returned: usize,
}

#[derive(Debug, Default)]
struct InMemorySourceState {
    sheets: Vec<InMemorySheet>,
    reads: Vec<SourceRead>,
    fail_at_offset: Option<u64>,
    close_calls: usize,
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    state: Arc<Mutex<InMemorySourceState>>,
}

impl InMemorySource {
    pub fn new(sheets: Vec<InMemorySheet>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemorySourceState {
                sheets,
                ..Default::default()
            })),
        }
    }

    /// 💣 Any read starting at `offset` fails, like a corrupt block in the middle of the file.
    pub async fn fail_reads_at(&self, offset: u64) {
        self.state.lock().await.fail_at_offset = Some(offset);
    }

    pub async fn reads(&self) -> Vec<SourceRead> {
        self.state.lock().await.reads.clone()
    }

    pub async fn close_calls(&self) -> usize {
        self.state.lock().await.close_calls
    }
}

#[async_trait]
impl TabularSource for InMemorySource {
    async fn list_sheets(&mut self) -> Result<Vec<SheetId>> {
        let the_state = self.state.lock().await;
        Ok(the_state
            .sheets
            .iter()
            .enumerate()
            .map(|(index, sheet)| SheetId {
                index,
                name: sheet.name.clone(),
            })
            .collect())
    }

    async fn read_rows(&mut self, sheet: &SheetId, offset: u64, count: usize) -> Result<RowWindow> {
        let mut the_state = self.state.lock().await;
        if the_state.fail_at_offset == Some(offset) {
            the_state.reads.push(SourceRead {
                sheet_index: sheet.index,
                offset,
                count,
                returned: 0,
            });
            bail!("💥 injected decode failure at row offset {offset}");
        }
        let the_window = {
            let the_sheet = the_state
                .sheets
                .get(sheet.index)
                .with_context(|| format!("💀 no sheet {sheet} in memory"))?;
            slice_window(&the_sheet.header, &the_sheet.rows, offset, count)
        };
        the_state.reads.push(SourceRead {
            sheet_index: sheet.index,
            offset,
            count,
            returned: the_window.len(),
        });
        Ok(the_window)
    }

    async fn row_count_hint(&mut self, sheet: &SheetId) -> Result<Option<u64>> {
        let the_state = self.state.lock().await;
        Ok(the_state
            .sheets
            .get(sheet.index)
            .map(|s| s.rows.len() as u64))
    }

    async fn close(&mut self) -> Result<()> {
        self.state.lock().await.close_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> InMemorySource {
        InMemorySource::new(vec![InMemorySheet::new(
            "Only",
            vec!["a".into()],
            (0..3).map(|n| vec![n.to_string()]).collect(),
        )])
    }

    #[tokio::test]
    async fn the_one_where_every_read_gets_written_down() {
        let mut the_source = tiny();
        let the_sheet = the_source.list_sheets().await.expect("💀").remove(0);

        the_source.read_rows(&the_sheet, 0, 2).await.expect("💀");
        the_source.read_rows(&the_sheet, 2, 2).await.expect("💀");
        let the_last = the_source.read_rows(&the_sheet, 3, 2).await.expect("💀");

        assert!(the_last.is_empty());
        let the_returned: Vec<usize> = the_source.reads().await.iter().map(|r| r.returned).collect();
        assert_eq!(the_returned, vec![2, 1, 0]);
        assert_eq!(the_source.row_count_hint(&the_sheet).await.expect("💀"), Some(3));
    }

    #[tokio::test]
    async fn the_one_where_the_armed_offset_explodes() {
        let mut the_source = tiny();
        the_source.fail_reads_at(2).await;
        let the_sheet = the_source.list_sheets().await.expect("💀").remove(0);

        assert!(the_source.read_rows(&the_sheet, 0, 2).await.is_ok());
        assert!(the_source.read_rows(&the_sheet, 2, 2).await.is_err());
    }
}

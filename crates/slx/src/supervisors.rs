//! 🎬 *[camera pans across a dimly lit bucket]*
//! 🎬 "In a world where spreadsheets grow without limit..."
//! 🎬 "One supervisor dared to read them ten thousand rows at a time."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor drives one conversion, start to finish:
//!
//! ```text
//!   read window ─▶ normalize cells ─▶ (first window: derive columns) ─▶ encode ─▶ append
//!        ▲                                                                          │
//!        └──────────────────────── offset += rows read ◀────────────────────────────┘
//!   empty window ─▶ finish()          any error ─▶ fail() ─▶ typed error with the row offset
//! ```
//!
//! Strictly sequential. One chunk is fully read, cleaned, encoded and appended before
//! the next is requested, because part numbers and row order have to keep marching
//! forward. The source is closed on every exit path. The upload session is completed
//! or aborted on every exit path. Nothing is left open for the invoice to find.

use tracing::{debug, info, warn};

use crate::app_config::{AppConfig, ConversionConfig, RuntimeConfig, SheetSelector};
use crate::encoder::RowEncoder;
use crate::errors::{ConversionError, ErrorKind, SessionDisposition, StageFailure, StageResultExt};
use crate::locations::{ObjectLocation, resolve_output_location};
use crate::progress::ProgressMetrics;
use crate::sanitize::{derive_column_names, normalize_cell_text};
use crate::sources::{SheetId, SourceBackend, SpreadsheetSource, TabularSource, select_sheet};
use crate::stores::ObjectStoreBackend;
use crate::uploader::{UploadCoordinator, UploadOutcome};

/// 🏁 What a successful conversion leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    pub output: ObjectLocation,
    pub sheet: SheetId,
    pub columns: Vec<String>,
    pub total_rows: u64,
    pub upload: UploadOutcome,
}

/// 💀 Failures before the upload session exists have nothing to abort and no offset yet.
fn before_session(failure: StageFailure) -> ConversionError {
    failure.into_conversion_error(None, SessionDisposition::NeverCreated)
}

/// 📦 The Supervisor: owns the store handle and the runtime knobs for a conversion.
#[derive(Debug)]
pub struct Supervisor {
    store: ObjectStoreBackend,
    runtime: RuntimeConfig,
}

impl Supervisor {
    pub fn new(store: ObjectStoreBackend, runtime: RuntimeConfig) -> Self {
        Self { store, runtime }
    }

    /// 🏗️ Build the store the config asks for.
    pub async fn from_config(app_config: &AppConfig) -> Result<Self, ConversionError> {
        let the_store = ObjectStoreBackend::from_config(&app_config.object_store)
            .await
            .stage(ErrorKind::UploadError)
            .map_err(before_session)?;
        Ok(Self::new(the_store, app_config.runtime.clone()))
    }

    /// 🚀 Resolve the locations, download and open the workbook, convert the selected sheet.
    pub async fn run(
        &self,
        conversion: &ConversionConfig,
    ) -> Result<ConversionReport, ConversionError> {
        let the_input = ObjectLocation::parse(&conversion.input)
            .stage(ErrorKind::InvalidLocation)
            .map_err(before_session)?;
        let the_output = resolve_output_location(&conversion.input, conversion.output.as_deref())
            .stage(ErrorKind::InvalidLocation)
            .map_err(before_session)?;
        info!("🎯 converting {} → {}", the_input, the_output);

        let the_source =
            SpreadsheetSource::open(&self.store, &the_input, self.runtime.scratch_dir.as_deref())
                .await
                .stage(ErrorKind::SourceReadError)
                .map_err(before_session)?;
        info!("📗 {} opened with the {} engine", the_input, the_source.engine());

        self.convert(SourceBackend::Spreadsheet(the_source), the_output, &conversion.sheet)
            .await
    }

    /// 🔄 Convert one sheet of an already opened source. The source is closed before this returns.
    pub async fn convert(
        &self,
        mut source: SourceBackend,
        output: ObjectLocation,
        sheet: &SheetSelector,
    ) -> Result<ConversionReport, ConversionError> {
        let the_result = self.convert_open_source(&mut source, output, sheet).await;
        if let Err(err) = source.close().await {
            warn!("⚠️ could not close the source cleanly: {:#}", err);
        }
        the_result
    }

    async fn convert_open_source(
        &self,
        source: &mut SourceBackend,
        output: ObjectLocation,
        selector: &SheetSelector,
    ) -> Result<ConversionReport, ConversionError> {
        let the_sheets = source
            .list_sheets()
            .await
            .stage(ErrorKind::SourceReadError)
            .map_err(before_session)?;
        let the_sheet = select_sheet(&the_sheets, selector)
            .stage(ErrorKind::SourceReadError)
            .map_err(before_session)?;
        let the_row_hint = source
            .row_count_hint(&the_sheet)
            .await
            .stage(ErrorKind::SourceReadError)
            .map_err(before_session)?;
        info!(
            "📑 sheet {} of {} selected, {} data rows",
            the_sheet,
            the_sheets.len(),
            the_row_hint.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );

        let mut the_coordinator =
            UploadCoordinator::new(&self.store, output.clone(), self.runtime.part_threshold_bytes);
        let mut the_progress =
            ProgressMetrics::new(the_sheet.name.clone(), the_row_hint, self.runtime.show_progress);
        let mut the_cursor = 0u64;

        let the_pumped = self
            .pump_rows(
                source,
                &the_sheet,
                &mut the_coordinator,
                &mut the_cursor,
                &mut the_progress,
            )
            .await;

        match the_pumped {
            Ok((the_columns, the_outcome)) => {
                the_progress.finish();
                info!(
                    "✅ {} rows from sheet {} written to {} ({})",
                    the_cursor,
                    the_sheet,
                    output,
                    describe_upload(&the_outcome)
                );
                Ok(ConversionReport {
                    output,
                    sheet: the_sheet,
                    columns: the_columns,
                    total_rows: the_cursor,
                    upload: the_outcome,
                })
            }
            Err(failure) => {
                the_progress.abandon();
                let the_disposition = the_coordinator.fail().await;
                Err(failure.into_conversion_error(Some(the_cursor), the_disposition))
            }
        }
    }

    /// 🔄 The loop. `cursor` always holds the offset of the window being worked on,
    /// so whoever catches a failure knows where it happened.
    async fn pump_rows(
        &self,
        source: &mut SourceBackend,
        sheet: &SheetId,
        coordinator: &mut UploadCoordinator<'_, ObjectStoreBackend>,
        cursor: &mut u64,
        progress: &mut ProgressMetrics,
    ) -> Result<(Vec<String>, UploadOutcome), StageFailure> {
        coordinator.open_session().await.stage(ErrorKind::UploadError)?;
        info!(
            "🚀 processing sheet {} in chunks of {} rows",
            sheet, self.runtime.chunk_size_rows
        );

        let the_encoder = RowEncoder;
        let mut the_columns: Option<Vec<String>> = None;
        loop {
            let the_window = source
                .read_rows(sheet, *cursor, self.runtime.chunk_size_rows)
                .await
                .stage(ErrorKind::SourceReadError)?;
            if the_window.is_empty() {
                break;
            }

            let the_rows: Vec<Vec<String>> = the_window
                .rows
                .iter()
                .map(|row| normalize_cell_text(row))
                .collect();
            let include_header = the_columns.is_none();
            if include_header {
                let the_names = derive_column_names(&the_window.header)
                    .stage(ErrorKind::SanitizationError)?;
                debug!("🧹 columns: {:?}", the_names);
                the_columns = Some(the_names);
            }
            let the_header: &[String] = the_columns.as_deref().unwrap_or_default();
            let the_bytes = the_encoder
                .encode(&the_rows, include_header, the_header)
                .stage(ErrorKind::EncodeError)?;
            coordinator
                .append(&the_bytes)
                .await
                .stage(ErrorKind::UploadError)?;

            let the_count = the_window.len() as u64;
            debug!(
                "📦 rows {}..{} encoded into {} bytes ({} accepted so far)",
                *cursor,
                *cursor + the_count,
                the_bytes.len(),
                coordinator.bytes_accepted()
            );
            *cursor += the_count;
            progress.update(
                the_count,
                the_bytes.len() as u64,
                coordinator.parts_uploaded(),
            );
        }

        let the_outcome = coordinator.finish().await.stage(ErrorKind::UploadError)?;
        Ok((the_columns.unwrap_or_default(), the_outcome))
    }
}

/// 📝 "3 parts" or "direct write", for the final log line.
pub fn describe_upload(outcome: &UploadOutcome) -> String {
    match outcome.disposition {
        SessionDisposition::DirectWrite => format!("direct write, {} bytes", outcome.bytes),
        _ => format!("{} parts, {} bytes", outcome.parts, outcome.bytes),
    }
}

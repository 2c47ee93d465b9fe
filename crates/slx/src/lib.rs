//! 📗➡️🪣 slx — spreadsheet in, CSV out, bucket to bucket, memory bounded.
//!
//! Reads one sheet of a workbook in fixed-size row windows, cleans the header into
//! unique identifiers, normalizes every cell, encodes fully quoted CSV, and streams it
//! to an object store as a multipart upload (or a single put, when it turns out small).

pub mod app_config;
pub mod encoder;
pub mod errors;
pub mod locations;
pub(crate) mod progress;
pub mod sanitize;
pub mod sources;
pub mod stores;
pub mod supervisors;
pub mod uploader;

pub use errors::{ConversionError, ErrorKind, SessionDisposition};
pub use supervisors::{ConversionReport, Supervisor};

use crate::app_config::AppConfig;

/// 🚀 One conversion, as configured.
pub async fn run(app_config: AppConfig) -> Result<ConversionReport, ConversionError> {
    let the_supervisor = Supervisor::from_config(&app_config).await?;
    the_supervisor.run(&app_config.conversion).await
}

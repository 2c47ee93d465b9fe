//! 🔧 App Configuration — the sacred TOML-to-struct pipeline, now with a spreadsheet in it.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Three layers, last one wins:
//!   1. `SLX_*` environment variables (nested keys split on `__`, e.g. `SLX_RUNTIME__CHUNK_SIZE_ROWS`)
//!   2. an optional TOML file
//!   3. explicit overrides (the CLI flags)

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::stores::{LocalStoreConfig, S3StoreConfig};

/// 📏 The smallest part S3 accepts for anything but the last part of a multipart upload.
pub const MIN_MULTIPART_PART_BYTES: usize = 5 * 1024 * 1024;

const ENV_PREFIX: &str = "SLX_";

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 📄 What to convert, where to put it, which sheet.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConversionConfig {
    /// `s3://bucket/key.xlsx`
    pub input: String,
    /// Absent, a directory-ish prefix, or a full `s3://bucket/key.csv`.
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub sheet: SheetSelector,
}

/// 📑 Which sheet. By position or by name. Numbers win ties, so a sheet literally named "2" needs the TOML.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl std::fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(n) => write!(f, "#{n}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// ⚙️ Knobs for the pipeline itself.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_chunk_size_rows")]
    pub chunk_size_rows: usize,
    #[serde(default = "default_part_threshold_bytes")]
    pub part_threshold_bytes: usize,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
    /// 🗃️ Where the downloaded workbook is spooled. None = the OS temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_chunk_size_rows() -> usize {
    10_000
}
fn default_part_threshold_bytes() -> usize {
    MIN_MULTIPART_PART_BYTES
}
fn default_show_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chunk_size_rows: default_chunk_size_rows(),
            part_threshold_bytes: default_part_threshold_bytes(),
            show_progress: default_show_progress(),
            scratch_dir: None,
        }
    }
}

/// 🪣 Which object store to talk to. Externally tagged, like the sinks used to be:
/// `[object_store.S3]` or `[object_store.Local]`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum ObjectStoreConfig {
    S3(S3StoreConfig),
    Local(LocalStoreConfig),
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self::S3(S3StoreConfig::default())
    }
}

/// 📜 Where logs go besides stdout.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// 🎛️ Values that beat both env and file. Usually the CLI flags.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub input: Option<String>,
    pub output: Option<String>,
    pub sheet: Option<String>,
    pub chunk_size_rows: Option<usize>,
    pub log_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    fn apply(self, figment: Figment) -> Figment {
        let mut the_figment = figment;
        if let Some(input) = self.input {
            the_figment = the_figment.merge(("conversion.input", input));
        }
        if let Some(output) = self.output {
            the_figment = the_figment.merge(("conversion.output", output));
        }
        if let Some(sheet) = self.sheet {
            // -- 🔢 all digits = a position. Anything else = a name.
            the_figment = match sheet.parse::<usize>() {
                Ok(index) => the_figment.merge(("conversion.sheet", index)),
                Err(_) => the_figment.merge(("conversion.sheet", sheet)),
            };
        }
        if let Some(chunk_size_rows) = self.chunk_size_rows {
            the_figment = the_figment.merge(("runtime.chunk_size_rows", chunk_size_rows));
        }
        if let Some(log_dir) = self.log_dir {
            the_figment = the_figment.merge(("logging.log_dir", log_dir));
        }
        the_figment
    }
}

impl AppConfig {
    /// 🚦 Reject knobs that would make the pipeline spin or stall.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime.chunk_size_rows == 0 {
            bail!("💀 runtime.chunk_size_rows must be > 0. Reading zero rows at a time is a lifestyle, not a conversion.");
        }
        if self.runtime.part_threshold_bytes == 0 {
            bail!("💀 runtime.part_threshold_bytes must be > 0");
        }
        if matches!(self.object_store, ObjectStoreConfig::S3(_))
            && self.runtime.part_threshold_bytes < MIN_MULTIPART_PART_BYTES
        {
            warn!(
                "⚠️ part_threshold_bytes = {} is below S3's {} byte minimum. Multi-part uploads will be rejected at completion.",
                self.runtime.part_threshold_bytes, MIN_MULTIPART_PART_BYTES
            );
        }
        Ok(())
    }
}

/// 🚀 Load the config — env vars, then the optional TOML file, then overrides.
///
/// 📐 No file means env + overrides only. We don't go looking for a `config.toml` nobody asked for.
pub fn load_config(
    config_file_name: Option<&Path>,
    overrides: ConfigOverrides,
) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let the_figment = Figment::new().merge(Env::prefixed(ENV_PREFIX).split("__"));
    let the_figment = match config_file_name {
        Some(file_name) => the_figment.merge(Toml::file(file_name)),
        None => the_figment,
    };
    let the_figment = overrides.apply(the_figment);

    let the_context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}', environment variables ({ENV_PREFIX}*) and flags. \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => format!(
            "💀 Failed to parse configuration from environment variables ({ENV_PREFIX}*) and flags. \
             Did you pass --input-s3-path?"
        ),
    };

    let the_config: AppConfig = the_figment.extract().context(the_context_msg)?;
    the_config.validate()?;
    Ok(the_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_test_config(dir: &Path, contents: &str) -> PathBuf {
        let the_path = dir.join("slx.toml");
        // 🧪 We write a real file here because Figment wants TOML from disk, like it's method acting.
        fs::write(&the_path, contents)
            .expect("💀 Failed to write test config. The filesystem said 'new phone who dis'.");
        the_path
    }

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_path = write_test_config(
            the_dir.path(),
            r#"
            [conversion]
            input = "s3://bucket/in/report.xlsx"
            "#,
        );

        let the_config = load_config(Some(&the_path), ConfigOverrides::default())
            .expect("💀 Minimal config should parse.");

        assert_eq!(the_config.runtime.chunk_size_rows, 10_000);
        assert_eq!(the_config.runtime.part_threshold_bytes, 5 * 1024 * 1024);
        assert!(the_config.runtime.show_progress);
        assert_eq!(the_config.conversion.sheet, SheetSelector::Index(0));
        assert_eq!(the_config.object_store, ObjectStoreConfig::S3(S3StoreConfig::default()));
        assert_eq!(the_config.logging.log_dir, None);
    }

    #[test]
    fn the_one_where_the_local_store_and_a_named_sheet_come_from_toml() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_path = write_test_config(
            the_dir.path(),
            r#"
            [conversion]
            input = "s3://bucket/in/report.xlsx"
            output = "s3://bucket/out/"
            sheet = "Q3 Numbers"

            [runtime]
            chunk_size_rows = 500
            show_progress = false

            [object_store.Local]
            root_dir = "/tmp/buckets"
            "#,
        );

        let the_config = load_config(Some(&the_path), ConfigOverrides::default()).expect("💀");

        assert_eq!(the_config.conversion.sheet, SheetSelector::Name("Q3 Numbers".into()));
        assert_eq!(the_config.conversion.output.as_deref(), Some("s3://bucket/out/"));
        assert_eq!(the_config.runtime.chunk_size_rows, 500);
        assert!(!the_config.runtime.show_progress);
        match the_config.object_store {
            ObjectStoreConfig::Local(local) => {
                assert_eq!(local.root_dir, PathBuf::from("/tmp/buckets"))
            }
            honestly_who_knows => panic!(
                "💀 Expected the Local store, but serde took us to {:?}. Plot twist energy.",
                honestly_who_knows
            ),
        }
    }

    #[test]
    fn the_one_where_flags_beat_the_file() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_path = write_test_config(
            the_dir.path(),
            r#"
            [conversion]
            input = "s3://bucket/from-file.xlsx"
            sheet = "Summary"

            [runtime]
            chunk_size_rows = 500
            "#,
        );

        let the_config = load_config(
            Some(&the_path),
            ConfigOverrides {
                input: Some("s3://bucket/from-flag.xlsx".into()),
                sheet: Some("2".into()),
                chunk_size_rows: Some(42),
                log_dir: Some(PathBuf::from("/var/log/slx")),
                ..Default::default()
            },
        )
        .expect("💀");

        assert_eq!(the_config.conversion.input, "s3://bucket/from-flag.xlsx");
        assert_eq!(the_config.conversion.sheet, SheetSelector::Index(2));
        assert_eq!(the_config.runtime.chunk_size_rows, 42);
        assert_eq!(the_config.logging.log_dir, Some(PathBuf::from("/var/log/slx")));
    }

    #[test]
    fn the_one_where_a_config_survives_a_trip_through_toml() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_original = AppConfig {
            conversion: ConversionConfig {
                input: "s3://in/book.xlsx".into(),
                output: Some("s3://out/book.csv".into()),
                sheet: SheetSelector::Name("Data".into()),
            },
            runtime: RuntimeConfig {
                chunk_size_rows: 7,
                part_threshold_bytes: 6 * 1024 * 1024,
                show_progress: false,
                scratch_dir: Some(PathBuf::from("/scratch")),
            },
            object_store: ObjectStoreConfig::S3(S3StoreConfig {
                region: Some("eu-west-1".into()),
                endpoint_url: Some("http://localhost:9000".into()),
                force_path_style: true,
            }),
            logging: LoggingConfig {
                log_dir: Some(PathBuf::from("/logs")),
            },
        };
        let the_toml = toml::to_string(&the_original).expect("💀 serialize");
        let the_path = write_test_config(the_dir.path(), &the_toml);

        let the_reloaded = load_config(Some(&the_path), ConfigOverrides::default()).expect("💀");
        assert_eq!(the_reloaded, the_original);
    }

    #[test]
    fn the_one_where_zero_rows_per_chunk_is_rejected() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_path = write_test_config(
            the_dir.path(),
            r#"
            [conversion]
            input = "s3://bucket/in.xlsx"

            [runtime]
            chunk_size_rows = 0
            "#,
        );
        let the_error = load_config(Some(&the_path), ConfigOverrides::default())
            .expect_err("💀 zero rows per chunk should not load");
        assert!(the_error.to_string().contains("chunk_size_rows"));
    }

    #[test]
    fn the_one_where_no_input_means_no_config() {
        let the_dir = tempfile::tempdir().expect("💀");
        let the_path = write_test_config(the_dir.path(), "[runtime]\nchunk_size_rows = 5\n");
        assert!(load_config(Some(&the_path), ConfigOverrides::default()).is_err());
    }
}

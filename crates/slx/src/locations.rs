// ai
//! 🗺️ Locations — turning `s3://bucket/some/Report (Final).xlsx` into somewhere to put a CSV.
//!
//! 🎬 *[a user forgets to pass an output path. the resolver sighs, and does it for them.]*
//!
//! Rules for the output location:
//! - no output given → same directory as the input, cleaned stem + `.csv`
//! - output is a "directory" (trailing `/`, or last segment has no dot) → that directory + cleaned stem + `.csv`
//! - anything else → used verbatim
//!
//! Either location failing to split into (container, key) is an `InvalidLocation`. 🦆

use std::fmt;

use anyhow::{Result, bail};

const SCHEME_PREFIX: &str = "s3://";
const TARGET_EXTENSION: &str = ".csv";
// -- 🪧 what a file becomes when its name was nothing but punctuation
const FALLBACK_STEM: &str = "converted";

/// 🪣 A fully parsed object location: which container, which key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub container: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }

    /// 🔍 Parse `s3://container/key`. The key may be empty (`s3://bucket/` is a valid prefix).
    pub fn parse(raw: &str) -> Result<Self> {
        let Some(the_rest) = raw.strip_prefix(SCHEME_PREFIX) else {
            bail!("💀 Invalid location '{raw}': must start with '{SCHEME_PREFIX}'");
        };
        let (the_container, the_key) = match the_rest.split_once('/') {
            Some((container, key)) => (container, key),
            None => (the_rest, ""),
        };
        if the_container.is_empty() {
            bail!("💀 Invalid location '{raw}': no container (bucket) name after the scheme");
        }
        Ok(Self::new(the_container, the_key.trim_start_matches('/')))
    }

    /// 📂 The "directory" part of the key, without a trailing slash. Empty at the container root.
    pub fn key_dir(&self) -> &str {
        match self.key.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        }
    }

    /// 📄 The last path segment of the key.
    pub fn file_name(&self) -> &str {
        match self.key.rsplit_once('/') {
            Some((_, name)) => name,
            None => &self.key,
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME_PREFIX}{}/{}", self.container, self.key)
    }
}

/// 🧽 Clean a filename stem: keep ASCII letters/digits/whitespace, whitespace becomes `_`,
/// runs of `_` collapse, edges get trimmed.
///
/// Underscores already in the name are punctuation as far as this is concerned.
/// `"My File (2024)"` → `"My_File_2024"`.
pub fn clean_file_stem(stem: &str) -> String {
    let mut the_cleaned = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            the_cleaned.push(c);
        } else if c.is_whitespace() && !the_cleaned.ends_with('_') {
            the_cleaned.push('_');
        }
    }
    the_cleaned.trim_matches('_').to_string()
}

/// 🏷️ `Report (Final).xlsx` → `Report_Final.csv`
fn derive_output_file_name(input_file_name: &str) -> String {
    // -- ✂️ splitext semantics: a leading dot is part of the name, not an extension
    let the_stem = match input_file_name.rfind('.') {
        Some(idx) if idx > 0 => &input_file_name[..idx],
        _ => input_file_name,
    };
    let the_cleaned = clean_file_stem(the_stem);
    if the_cleaned.is_empty() {
        format!("{FALLBACK_STEM}{TARGET_EXTENSION}")
    } else {
        format!("{the_cleaned}{TARGET_EXTENSION}")
    }
}

fn join_key(dir: &str, file_name: &str) -> String {
    let the_dir = dir.trim_end_matches('/');
    if the_dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{the_dir}/{file_name}")
    }
}

/// 🗺️ Work out where the CSV lands.
///
/// Both locations are parsed up front, so a malformed one fails before anything
/// touches the network.
pub fn resolve_output_location(input: &str, output: Option<&str>) -> Result<ObjectLocation> {
    let the_input = ObjectLocation::parse(input)?;
    if the_input.file_name().is_empty() {
        bail!("💀 Invalid location '{input}': the input must name an object, not a prefix");
    }
    let the_file_name = derive_output_file_name(the_input.file_name());

    let Some(raw_output) = output else {
        return Ok(ObjectLocation::new(
            the_input.container.clone(),
            join_key(the_input.key_dir(), &the_file_name),
        ));
    };

    let the_output = ObjectLocation::parse(raw_output)?;
    let names_a_directory =
        the_output.key.is_empty() || the_output.key.ends_with('/') || !the_output.file_name().contains('.');
    if names_a_directory {
        let the_key = join_key(&the_output.key, &the_file_name);
        Ok(ObjectLocation::new(the_output.container, the_key))
    } else {
        Ok(the_output)
    }
}

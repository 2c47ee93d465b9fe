// ai
//! 🧹 Sanitize — where `"  Customer-Name (Primary) "` goes in and `customer_name_primary` comes out.
//!
//! 🎬 COLD OPEN — INT. SPREADSHEET — FIRST ROW — MONDAY MORNING
//!
//! Someone typed the headers by hand. Three of them say "Name". One has a trailing space.
//! One is blank. One is an emoji. The warehouse downstream wants identifiers. Lowercase.
//! Unique. Underscores only. This module is the translator who makes that happen without
//! asking anyone in Finance to "just fix the sheet". 🦆
//!
//! Two jobs:
//! - [`derive_column_names`]: runs once, on the first non-empty window's header.
//! - [`normalize_cell_text`]: runs on every row of every chunk. Pure. Idempotent.

use std::collections::HashSet;

use anyhow::{Result, bail};

/// 🪧 What a header cell becomes when sanitizing leaves nothing behind.
pub const PLACEHOLDER_COLUMN_NAME: &str = "column";

/// 🧽 Reduce one header cell to `[a-z0-9_]+`, or an empty string if nothing survives.
///
/// lowercase → dashes and whitespace become `_` → everything else non-alphanumeric
/// (except `_`) is dropped → `_` runs collapse → edges trimmed.
fn clean_column_name(raw: &str) -> String {
    let mut the_cleaned = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        let the_keeper = if c.is_ascii_alphanumeric() {
            Some(c)
        } else if c == '_' || c == '-' || c.is_whitespace() {
            Some('_')
        } else {
            None
        };
        match the_keeper {
            // -- 🧹 collapse on the way in, no second pass needed
            Some('_') if the_cleaned.ends_with('_') => {}
            Some(keep) => the_cleaned.push(keep),
            None => {}
        }
    }
    the_cleaned.trim_matches('_').to_string()
}

/// 🏷️ Turn a header row into unique, identifier-safe column names.
///
/// Collisions get `_1`, `_2`, … in encounter order, per base name.
/// Fails only when there is nothing to name: no cells, or every cell is blank after cleaning.
pub fn derive_column_names(header_cells: &[String]) -> Result<Vec<String>> {
    let the_bases: Vec<String> = header_cells.iter().map(|h| clean_column_name(h)).collect();
    if the_bases.iter().all(String::is_empty) {
        bail!(
            "💀 The header row has {} cell(s) and not one of them survives sanitizing. \
             A CSV with no column names is just a vibe.",
            header_cells.len()
        );
    }

    let mut the_seen: HashSet<String> = HashSet::with_capacity(the_bases.len());
    let mut the_names = Vec::with_capacity(the_bases.len());
    for base in the_bases {
        let the_base = if base.is_empty() {
            PLACEHOLDER_COLUMN_NAME.to_string()
        } else {
            base
        };
        let mut the_candidate = the_base.clone();
        let mut the_counter = 1usize;
        while the_seen.contains(&the_candidate) {
            the_candidate = format!("{the_base}_{the_counter}");
            the_counter += 1;
        }
        the_seen.insert(the_candidate.clone());
        the_names.push(the_candidate);
    }
    Ok(the_names)
}

/// 🧼 Scrub one row: newline, carriage return, tab and NBSP become a space, zero-width
/// spaces vanish, every cell is trimmed. Returns a fresh row; the input is untouched.
pub fn normalize_cell_text(row: &[String]) -> Vec<String> {
    row.iter().map(|cell| normalize_cell(cell)).collect()
}

fn normalize_cell(cell: &str) -> String {
    let the_scrubbed: String = cell
        .chars()
        .filter(|c| *c != '\u{200b}')
        .map(|c| match c {
            '\n' | '\r' | '\t' | '\u{a0}' => ' ',
            other => other,
        })
        .collect();
    the_scrubbed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn is_identifier(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    #[test]
    fn the_one_where_three_names_walk_into_a_header() {
        let the_names = derive_column_names(&cells(&["Name", "name", "NAME "])).expect("💀");
        assert_eq!(the_names, vec!["name", "name_1", "name_2"]);
    }

    #[test]
    fn the_one_where_punctuation_dashes_and_spaces_get_flattened() {
        let the_names = derive_column_names(&cells(&[
            "  Customer-Name (Primary) ",
            "Amount $",
            "already_snake__case",
            "__edges__",
            "Order\tDate",
        ]))
        .expect("💀");
        assert_eq!(
            the_names,
            vec![
                "customer_name_primary",
                "amount",
                "already_snake_case",
                "edges",
                "order_date"
            ]
        );
    }

    #[test]
    fn the_one_where_blank_cells_become_placeholders_and_still_stay_unique() {
        let the_names = derive_column_names(&cells(&["id", "", "!!!", "column"])).expect("💀");
        assert_eq!(the_names, vec!["id", "column", "column_1", "column_2"]);
    }

    #[test]
    fn the_one_where_a_literal_suffix_collides_with_a_generated_one() {
        let the_names = derive_column_names(&cells(&["a", "a_1", "a", "A"])).expect("💀");
        assert_eq!(the_names, vec!["a", "a_1", "a_2", "a_3"]);
    }

    #[test]
    fn the_one_where_the_whole_header_is_blank() {
        assert!(derive_column_names(&cells(&["", "  ", "???"])).is_err());
        assert!(derive_column_names(&[]).is_err());
    }

    #[test]
    fn the_one_where_every_name_is_unique_nonempty_and_identifier_shaped() {
        let the_headers = cells(&[
            "Name", "name", "NAME ", "", " ", "-", "Ünïcödé", "2024", "x--y", "x y", "x_y", "🦆",
            "name_1", "Name!", "a\u{a0}b",
        ]);
        let the_names = derive_column_names(&the_headers).expect("💀");
        assert_eq!(the_names.len(), the_headers.len());
        let the_unique: HashSet<&String> = the_names.iter().collect();
        assert_eq!(the_unique.len(), the_names.len(), "{the_names:?}");
        assert!(the_names.iter().all(|n| is_identifier(n)), "{the_names:?}");
        // -- 🔁 pure: same input, same output
        assert_eq!(derive_column_names(&the_headers).expect("💀"), the_names);
    }

    #[test]
    fn the_one_where_cells_get_scrubbed() {
        let the_row = cells(&[
            "  line one\nline two\r\n",
            "tab\there",
            "nbsp\u{a0}space",
            "zero\u{200b}width",
            "\u{200b}  padded  \u{200b}",
            "",
        ]);
        assert_eq!(
            normalize_cell_text(&the_row),
            vec![
                "line one line two",
                "tab here",
                "nbsp space",
                "zerowidth",
                "padded",
                ""
            ]
        );
    }

    #[test]
    fn the_one_where_normalizing_twice_changes_nothing() {
        let the_row = cells(&[
            "\t\t mixed \r\n bag \u{a0}",
            "\u{200b}\n\u{200b}",
            " a  b ",
            "plain",
        ]);
        let the_once = normalize_cell_text(&the_row);
        let the_twice = normalize_cell_text(&the_once);
        assert_eq!(the_once, the_twice);
    }

    // 🎲 The same promises, over headers and rows nobody hand-picked.
    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Printable ASCII plus the characters the scrubber and the cleaner care about most.
        const MESSY_CELL: &str = "[ -~\t\n\r\u{a0}\u{200b}éÜ🦆K]{0,16}";

        proptest! {
            #[test]
            fn derived_names_are_unique_and_identifier_shaped(
                header in prop::collection::vec(MESSY_CELL, 0..12)
            ) {
                match derive_column_names(&header) {
                    Ok(names) => {
                        prop_assert_eq!(names.len(), header.len());
                        let the_unique: HashSet<&String> = names.iter().collect();
                        prop_assert_eq!(the_unique.len(), names.len(), "{:?}", names);
                        prop_assert!(names.iter().all(|n| is_identifier(n)), "{:?}", names);
                        // -- already clean and unique, so a second pass leaves them alone
                        prop_assert_eq!(derive_column_names(&names).expect("💀"), names);
                    }
                    Err(_) => prop_assert!(
                        header.iter().all(|h| !h.chars().any(|c| c.is_ascii_alphanumeric())),
                        "{:?} has something to name but was refused",
                        header
                    ),
                }
            }

            #[test]
            fn any_header_with_a_letter_or_digit_gets_names(
                header in prop::collection::vec(any::<String>(), 1..8),
                anchor in "[a-zA-Z0-9]"
            ) {
                let mut the_header = header;
                the_header.push(anchor);
                let the_names = derive_column_names(&the_header).expect("💀");
                prop_assert_eq!(the_names.len(), the_header.len());
                prop_assert!(the_names.iter().all(|n| is_identifier(n)), "{:?}", the_names);
            }

            #[test]
            fn normalized_rows_are_scrubbed_and_stay_put(
                row in prop::collection::vec(MESSY_CELL, 0..10)
            ) {
                let the_once = normalize_cell_text(&row);
                prop_assert_eq!(the_once.len(), row.len());
                for cell in &the_once {
                    prop_assert!(
                        !cell.contains(['\n', '\r', '\t', '\u{a0}', '\u{200b}']),
                        "{:?}",
                        cell
                    );
                    prop_assert_eq!(cell.trim(), cell.as_str());
                }
                prop_assert_eq!(normalize_cell_text(&the_once), the_once);
            }
        }
    }
}

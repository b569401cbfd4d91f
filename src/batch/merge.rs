//! Merges ingredient rows that name the same thing into one row per group.
//!
//! Rows are grouped by the trimmed value of a key column, optionally matching keys that are
//! merely similar. The first row of a group keeps its other columns; the addition columns
//! are combined across the group:
//!
//! - packing labels with the same pack, `(2) 25 kg bag` and `(3) 25 kg bag`, add up their
//!   counts to `(5) 25 kg bag`
//! - quantity descriptions, `(2) 25 kg bags full`, add up to the total mass, `50.00 kg bags`
//! - plain or currency amounts are summed
//!
//! Anything else keeps the first row's value.

use crate::emit::record::RecordSet;
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;
use tracing::warn;

static PACKING_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(([\d.]+)\)\s+([\d.,]+)\s*(kg|g|lb)?\s*(.*?)\s*(\(.*?\))?$").expect("Hardcode regex pattern")
});
static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(([\d.]+)\)\s*([\d.]+)\s*kg\s*(\w+)\s*(\w+)").expect("Hardcode regex pattern")
});
static CURRENCY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Sc}").expect("Hardcode regex pattern"));
static PLAIN_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d{1,2})?$").expect("Hardcode regex pattern"));

/// Share of the nominal mass in a pack that is not marked `full`
const PARTIAL_PACK_FACTOR: f64 = 0.63;

/// Default score above which two keys count as the same name
pub const DEFAULT_SIMILARITY: f64 = 0.85;

/// Which column groups the rows and which columns add up
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeOptions {
    /// Column whose value groups the rows, e.g. `description`
    pub key: String,
    /// Columns combined across a group
    #[serde(default)]
    pub additions: Vec<String>,
    /// Also group keys whose bigram similarity is above this score
    #[serde(default)]
    pub similarity: Option<f64>,
}

/// True when `a` and `b` are alike above `threshold`, using the Sørensen–Dice coefficient
/// over character bigrams.
pub fn similar_text(a: &str, b: &str, threshold: f64) -> bool {
    strsim::sorensen_dice(a, b) > threshold
}

struct Group {
    key: String,
    row: IndexMap<String, String>,
    additions: Vec<Vec<String>>,
}

/// Merges rows of `records` that share a key; rows with a blank key are left alone.
///
/// Rows of different sheets never merge when the records carry a `sheet_name` column.
pub fn merge_records(records: &RecordSet, options: &MergeOptions) -> RecordSet {
    if !records.headers.contains(&options.key) {
        warn!(table = %records.table, column = %options.key, "merge column not found");
        return records.clone();
    }

    let mut groups = Vec::<Group>::new();
    for row in &records.rows {
        let sheet = row.get("sheet_name").map(String::as_str).unwrap_or_default();
        let key = row.get(&options.key).map(|value| value.trim()).unwrap_or_default();
        let values: Vec<String> = options
            .additions
            .iter()
            .map(|column| row.get(column).cloned().unwrap_or_default())
            .collect();

        let found = if key.is_empty() {
            None
        } else {
            groups.iter_mut().find(|group| {
                group.row.get("sheet_name").map(String::as_str).unwrap_or_default() == sheet
                    && is_same_key(&group.key, key, options.similarity)
            })
        };
        match found {
            Some(group) => {
                debug!(key, into = %group.key, "merge row");
                for (collected, value) in group.additions.iter_mut().zip(values) {
                    collected.push(value);
                }
            }
            None => groups.push(Group {
                key: key.to_owned(),
                row: row.clone(),
                additions: values.into_iter().map(|value| vec![value]).collect(),
            }),
        }
    }

    let mut merged = RecordSet {
        table: records.table.to_owned(),
        headers: records.headers.clone(),
        rows: Vec::with_capacity(groups.len()),
    };
    for mut group in groups {
        for (column, values) in options.additions.iter().zip(&group.additions) {
            if let Some(total) = combine(values) {
                group.row.insert(column.to_owned(), total);
            }
        }
        merged.rows.push(group.row);
    }
    merged
}

fn is_same_key(group: &str, key: &str, similarity: Option<f64>) -> bool {
    if group.is_empty() {
        return false;
    }
    group == key || similarity.is_some_and(|threshold| similar_text(group, key, threshold))
}

/// Combined value of an addition column, `None` when there is nothing to combine
fn combine(values: &[String]) -> Option<String> {
    let values: Vec<&str> = values.iter().map(|value| value.trim()).filter(|value| !value.is_empty()).collect();
    if values.len() < 2 {
        return None;
    }
    sum_packing_labels(&values)
        .or_else(|| sum_quantities(&values))
        .or_else(|| sum_amounts(&values))
}

/// `(count) weight unit type` labels of one pack, with the counts added up
fn sum_packing_labels(values: &[&str]) -> Option<String> {
    let mut total = 0f64;
    let mut pack = None::<String>;
    for value in values {
        let captures = PACKING_LABEL.captures(value)?;
        let count = captures[1].parse::<f64>().ok()?;
        let label = [2, 3, 4]
            .iter()
            .filter_map(|index| captures.get(*index).map(|part| part.as_str()))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if *pack.get_or_insert_with(|| label.clone()) != label {
            return None;
        }
        total += count;
    }
    Some(format!("({}) {}", format_number(total), pack?))
}

/// `(count) weight kg unit type` descriptions turned into their total mass
fn sum_quantities(values: &[&str]) -> Option<String> {
    let mut total = 0f64;
    let mut unit = None::<String>;
    for value in values {
        let captures = QUANTITY.captures(value)?;
        let count = captures[1].parse::<f64>().ok()?;
        let weight = captures[2].parse::<f64>().ok()?;
        let factor = if captures[4].eq_ignore_ascii_case("full") { 1.0 } else { PARTIAL_PACK_FACTOR };
        total += count * weight * factor;
        let expected = unit.get_or_insert_with(|| captures[3].to_owned());
        if !expected.eq_ignore_ascii_case(&captures[3]) {
            warn!(expected = %expected, found = &captures[3], "merging quantities of different units");
        }
    }
    Some(format!("{:.2} kg {}", total, unit?))
}

/// Plain numbers with up to two decimals or currency values, summed
fn sum_amounts(values: &[&str]) -> Option<String> {
    let mut total = 0f64;
    for value in values {
        let plain = value.replace(',', "");
        if !CURRENCY.is_match(value) && !PLAIN_AMOUNT.is_match(&plain) {
            return None;
        }
        total += CURRENCY.replace_all(&plain, "").trim().parse::<f64>().ok()?;
    }
    let symbol = CURRENCY.find(values[0]).map(|symbol| symbol.as_str()).unwrap_or_default();
    Some(format!("{}{}", symbol, format_number(total)))
}

/// Whole numbers without decimals, others rounded to two places
fn format_number(number: f64) -> String {
    if number.fract() == 0.0 {
        format!("{}", number)
    } else {
        format!("{:.2}", number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn records(rows: &[[&str; 3]]) -> RecordSet {
        let mut records = RecordSet::new("ingredients", &["sheet_name", "description", "additions"]);
        for row in rows {
            records.push(row.iter().map(|value| value.to_string()).collect());
        }
        records
    }

    fn options(similarity: Option<f64>) -> MergeOptions {
        MergeOptions {
            key: "description".to_owned(),
            additions: vec!["additions".to_owned()],
            similarity,
        }
    }

    fn cells(records: &RecordSet) -> Vec<(String, String)> {
        records
            .rows
            .iter()
            .map(|row| (row["description"].to_owned(), row["additions"].to_owned()))
            .collect()
    }

    #[test]
    fn adds_up_packing_labels_of_one_pack() {
        let merged = merge_records(
            &records(&[
                ["Batch", "Sugar", "(2) 25 kg bag"],
                ["Batch", "Salt", "(1) 10 kg bag"],
                ["Batch", " Sugar ", "(3) 25 kg bag (white)"],
            ]),
            &options(None),
        );
        assert_eq!(
            cells(&merged),
            vec![("Sugar".to_owned(), "(5) 25 kg bag".to_owned()), ("Salt".to_owned(), "(1) 10 kg bag".to_owned())]
        );
    }

    #[test]
    fn different_packs_add_up_to_total_mass() {
        let merged = merge_records(
            &records(&[["Batch", "Sugar", "(2) 25 kg bags full"], ["Batch", "Sugar", "(1) 10 kg bags part"]]),
            &options(None),
        );
        assert_eq!(cells(&merged), vec![("Sugar".to_owned(), "56.30 kg bags".to_owned())]);
    }

    #[test]
    fn sums_amounts_and_keeps_other_text() {
        let merged = merge_records(
            &records(&[
                ["Batch", "Water", "1,200"],
                ["Batch", "Water", "300.5"],
                ["Batch", "Dye", "$4.50"],
                ["Batch", "Dye", "$1.50"],
                ["Batch", "Oil", "drum"],
                ["Batch", "Oil", "tote"],
            ]),
            &options(None),
        );
        assert_eq!(
            cells(&merged),
            vec![
                ("Water".to_owned(), "1500.50".to_owned()),
                ("Dye".to_owned(), "$6".to_owned()),
                ("Oil".to_owned(), "drum".to_owned()),
            ]
        );
    }

    #[test]
    fn similar_keys_merge_only_when_asked() {
        let rows = records(&[["Batch", "Sodium Chloride", "2"], ["Batch", "Sodium  Chloride.", "3"]]);
        assert_eq!(merge_records(&rows, &options(None)).len(), 2);
        let merged = merge_records(&rows, &options(Some(DEFAULT_SIMILARITY)));
        assert_eq!(cells(&merged), vec![("Sodium Chloride".to_owned(), "5".to_owned())]);
    }

    #[test]
    fn blank_keys_and_other_sheets_stay_apart() {
        let merged = merge_records(
            &records(&[["One", "", "1"], ["One", "", "2"], ["One", "Sugar", "1"], ["Two", "Sugar", "4"]]),
            &options(None),
        );
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn unknown_key_column_changes_nothing() {
        let rows = records(&[["Batch", "Sugar", "1"], ["Batch", "Sugar", "2"]]);
        let options = MergeOptions {
            key: "material".to_owned(),
            ..options(None)
        };
        assert_eq!(merge_records(&rows, &options), rows);
    }

    #[test]
    fn scores_text_similarity() {
        assert!(similar_text("Citric Acid", "Citric  Acid", DEFAULT_SIMILARITY));
        assert!(!similar_text("Citric Acid", "Sorbic Acid", DEFAULT_SIMILARITY));
    }
}

use crate::batch::options::ExtractionOptions;
use crate::batch::SheetError;
use crate::spreadsheet::Sheet;
use indexmap::IndexMap;
use std::cmp::min;

/// Header label (lower-cased, trimmed) -> column index, in header order
pub type HeaderIndex = IndexMap<String, usize>;

/// Labels that mark a header row; an item or fng number column counts too.
const HEADER_KEYWORDS: [&str; 20] = [
    "step",
    "step no",
    "step number",
    "seq",
    "sequence",
    "instruction",
    "action",
    "procedure",
    "material",
    "description",
    "material description",
    "vendor",
    "type",
    "speed",
    "temp",
    "temperature",
    "concentration",
    "mixer",
    "item number",
    "fng",
];

/// The located header row of a sheet
#[derive(Clone, Debug, PartialEq)]
pub struct HeaderRow {
    /// 0-based row of the header
    pub row_index: usize,
    /// Every non-empty label; a repeated label keeps its first position and its last column
    pub index: HeaderIndex,
    /// Normalized label of every column of the header row, empty when blank
    pub labels: Vec<String>,
}

impl HeaderRow {
    /// Label of a header column, `None` when blank or out of range
    pub fn label(&self, col: usize) -> Option<&str> {
        self.labels.get(col).map(String::as_str).filter(|label| !label.is_empty())
    }
}

/// Finds the first row within the scan window that looks like a batch card header.
///
/// A row qualifies when one label mentions a step or sequence and one label contains a
/// known header keyword.
pub fn locate_header(sheet: &Sheet, options: &ExtractionOptions) -> Result<HeaderRow, SheetError> {
    let scan_rows = min(options.header_scan_rows, sheet.row_count());
    for (row_index, row) in sheet.rows.iter().take(scan_rows).enumerate() {
        let labels: Vec<String> = row.iter().map(|cell| cell.to_text().trim().to_lowercase()).collect();
        let has_step = labels.iter().any(|label| label.contains("step") || label.contains("seq"));
        let has_keyword = labels
            .iter()
            .filter(|label| !label.is_empty())
            .any(|label| HEADER_KEYWORDS.iter().any(|keyword| label.contains(keyword)));
        if has_step && has_keyword {
            let mut index = HeaderIndex::new();
            for (col, label) in labels.iter().enumerate() {
                if !label.is_empty() {
                    index.insert(label.to_owned(), col);
                }
            }
            return Ok(HeaderRow {
                row_index,
                index,
                labels,
            });
        }
    }
    Err(SheetError::HeaderNotFound {
        sheet: sheet.name.to_owned(),
        scanned: scan_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_header_below_title_rows() {
        let sheet = Sheet::from_text_rows(
            "Batch",
            vec![
                vec!["Batch Card", "", ""],
                vec!["Product: Hand Cream", "", ""],
                vec![" Step No ", "Instruction", "Vendor"],
                vec!["1", "Mix", "Acme"],
            ],
        );
        let header = locate_header(&sheet, &ExtractionOptions::default()).unwrap();
        assert_eq!(header.row_index, 2);
        assert_eq!(header.index.get("step no"), Some(&0));
        assert_eq!(header.index.get("instruction"), Some(&1));
        assert_eq!(header.label(2), Some("vendor"));
    }

    #[test]
    fn needs_a_step_like_label() {
        let sheet = Sheet::from_text_rows("Batch", [["Material", "Vendor"], ["Sugar", "Acme"]]);
        let error = locate_header(&sheet, &ExtractionOptions::default()).unwrap_err();
        assert_eq!(error, SheetError::HeaderNotFound { sheet: "Batch".to_owned(), scanned: 2 });
    }

    #[test]
    fn repeated_label_keeps_last_column_in_first_position() {
        let sheet = Sheet::from_text_rows("Batch", [["Step", "Type", "Action", "Type"]]);
        let header = locate_header(&sheet, &ExtractionOptions::default()).unwrap();
        let labels: Vec<(&str, usize)> = header.index.iter().map(|(label, col)| (label.as_str(), *col)).collect();
        assert_eq!(labels, vec![("step", 0), ("type", 3), ("action", 2)]);
    }

    #[test]
    fn scan_window_is_configurable() {
        let mut rows = vec![vec!["notes".to_owned(), String::new()]; 5];
        rows.push(vec!["Step".to_owned(), "Action".to_owned()]);
        let sheet = Sheet::from_text_rows("Batch", rows);

        let narrow = ExtractionOptions { header_scan_rows: 5, ..ExtractionOptions::default() };
        assert!(locate_header(&sheet, &narrow).is_err());
        let header = locate_header(&sheet, &ExtractionOptions::default()).unwrap();
        assert_eq!(header.row_index, 5);
    }

    #[test]
    fn location_is_deterministic() {
        let sheet = Sheet::from_text_rows("Batch", [["x", ""], ["Seq", "Procedure"]]);
        let options = ExtractionOptions::default();
        assert_eq!(locate_header(&sheet, &options), locate_header(&sheet, &options));
    }
}

//! # Spreadsheet Reading Module
//!
//! Reads Excel 2007+ workbooks (`.xlsx`, `.xlsm`) into in-memory [`Sheet`]s: a dense grid
//! of typed cell values plus the formula text authored in each formula cell. Shared strings,
//! inline strings, the 1900/1904 date systems and shared formulas are resolved while reading.
pub(crate) mod cell;
pub mod criteria;
pub(crate) mod excel;
pub mod reference;
pub(crate) mod xlsx;

use crate::error::RustyBatchError;
use crate::helpers::reader::UnifiedReader;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use thiserror::Error;

/// Errors raised while opening or decoding a workbook
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Missing workbook part '{0}'")]
    FileError(String),

    #[error("Workbook '{0}' contains no worksheet")]
    SpreadsheetEmptyError(String),

    #[error("Unsupported workbook format '{0}', expected .xlsx or .xlsm")]
    UnsupportedFormatError(String),

    #[error("Workbook '{0}' is encrypted or a legacy compound document")]
    CompoundDocumentError(String),

    #[error("Shared string #{1} referenced at {0} does not exist")]
    SharedStringError(String, usize),
}

/// A decoded cell value
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Empty cells and blank text both count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Display text of the value; whole numbers drop their fraction (`3.0` -> `3`).
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => write!(f, "{}", text),
            CellValue::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
                write!(f, "{}", *number as i64)
            }
            CellValue::Number(number) => write!(f, "{}", number),
            CellValue::Bool(value) => write!(f, "{}", value),
            CellValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            CellValue::DateTime(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        if text.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(text.to_owned())
        }
    }
}

/// Formula text per cell address (`"C14"` -> `"=\"Add \"&A14"`)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormulaMap(HashMap<String, String>);

impl FormulaMap {
    pub fn new() -> FormulaMap {
        FormulaMap::default()
    }

    pub fn insert(&mut self, address: &str, formula: &str) {
        self.0.insert(address.to_ascii_uppercase(), formula.to_owned());
    }

    /// Gets the formula of a cell by address
    pub fn by_address(&self, address: &str) -> Option<&str> {
        self.0.get(&address.to_ascii_uppercase()).map(String::as_str)
    }

    /// Gets the formula of a cell by 0-based indexes
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.by_address(&index_to_reference(row, col))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One worksheet: rows of cell values (row 0 is spreadsheet row 1, column 0 is `A`)
/// and the formulas behind them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
    pub formulas: FormulaMap,
}

impl Sheet {
    pub fn new(name: &str, rows: Vec<Vec<CellValue>>, formulas: FormulaMap) -> Sheet {
        Sheet {
            name: name.to_owned(),
            rows,
            formulas,
        }
    }

    /// Builds a sheet from plain text rows, empty strings become empty cells.
    pub fn from_text_rows<R, C>(name: &str, rows: R) -> Sheet
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|text| CellValue::from(text.as_ref())).collect())
            .collect();
        Sheet::new(name, rows, FormulaMap::new())
    }

    /// Attaches a formula to a cell address
    pub fn with_formula(mut self, address: &str, formula: &str) -> Sheet {
        self.formulas.insert(address, formula);
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|cells| cells.get(col))
    }

    /// Cell display text, empty when out of range
    pub fn text(&self, row: usize, col: usize) -> String {
        self.cell(row, col).map(CellValue::to_text).unwrap_or_default()
    }
}

/// Common interface of workbook readers
pub trait Spreadsheet {
    /// Returns the workbook name
    fn name(&self) -> String;

    /// Returns all worksheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Reads the worksheets accepted by `criteria`
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, RustyBatchError>;
}

/// Opens a workbook on disk, dispatching on its extension.
pub fn open_spreadsheet<P: AsRef<Path>>(path: P) -> Result<Box<dyn Spreadsheet>, RustyBatchError> {
    let path = path.as_ref();
    let name = path.to_string_lossy().to_string();
    check_extension(&name)?;
    let reader = UnifiedReader::open(path)?;
    Ok(Box::new(XlsxSpreadsheet::open(&name, reader)?))
}

/// Opens a workbook already materialized in memory (an upload), `name` carries the extension.
pub fn open_spreadsheet_bytes(name: &str, bytes: Vec<u8>) -> Result<Box<dyn Spreadsheet>, RustyBatchError> {
    check_extension(name)?;
    let reader = UnifiedReader::from_bytes(bytes);
    Ok(Box::new(XlsxSpreadsheet::open(name, reader)?))
}

fn check_extension(name: &str) -> Result<(), RustyBatchError> {
    let extension = Path::new(name)
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("xlsx") | Some("xlsm") => Ok(()),
        _ => Err(SpreadsheetError::UnsupportedFormatError(name.to_owned()))?,
    }
}

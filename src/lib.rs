//! # Rusty Batch
//!
//! Reads manufacturing batch cards out of Excel workbooks and turns them into relational
//! records with the SQL to load them.
//!
//! ## Features
//!
//! - **Pure Rust workbook reader**: Streams `.xlsx` and `.xlsm` parts straight from the zip
//!   archive, including shared strings, number formats and shared formulas
//! - **Header detection**: Finds the header row below title and note rows
//! - **Fuzzy column resolution**: Maps `Instruction`, `Seq` or `Item Number` style headers to
//!   the logical step, action and raw material fields
//! - **Step segmentation**: Builds the step/ingredient tree, including continuation rows and
//!   ingredient lines without a step number
//! - **Formula templates**: Generalizes string-concatenation formulas into `{placeholder}`
//!   templates named after the referenced header
//! - **Row merging**: Optionally folds ingredient rows sharing a material or description
//!   into one, adding up pack counts, quantities and amounts
//! - **SQL generation**: Infers column types and emits `CREATE TABLE` and `INSERT` statements
//!
//! ## Entry points
//!
//! - [`open_spreadsheet`] and [`extract_spreadsheet`] for workbook files
//! - [`extract_workbook`] and [`extract_sheet`] for sheets already in memory
pub mod batch;
pub mod emit;
mod error;
mod helpers;
pub mod spreadsheet;

pub use crate::batch::extract_sheet;
pub use crate::batch::extract_spreadsheet;
pub use crate::batch::extract_workbook;
pub use crate::batch::merge::merge_records;
pub use crate::batch::merge::similar_text;
pub use crate::batch::merge::MergeOptions;
pub use crate::batch::options::ExtractionOptions;
pub use crate::batch::segment::IngredientDetail;
pub use crate::batch::segment::Step;
pub use crate::batch::template::FormulaTemplate;
pub use crate::batch::SheetError;
pub use crate::emit::record::RecordSet;
pub use crate::emit::sql::SqlPair;
pub use crate::emit::WorkbookOutput;
pub use crate::error::RustyBatchError;
pub use crate::spreadsheet::criteria::Criteria;
pub use crate::spreadsheet::open_spreadsheet;
pub use crate::spreadsheet::open_spreadsheet_bytes;
pub use crate::spreadsheet::CellValue;
pub use crate::spreadsheet::FormulaMap;
pub use crate::spreadsheet::Sheet;
pub use crate::spreadsheet::Spreadsheet;

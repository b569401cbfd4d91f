//! Output of an extraction: record sets for display and the SQL that loads them.
pub mod record;
pub mod sql;

use crate::batch::SheetError;
use crate::emit::record::RecordSet;
use crate::emit::sql::SqlPair;
use crate::error::RustyBatchError;
use serde::Serialize;

/// Merged records of every extracted sheet of a workbook
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkbookOutput {
    pub instructions: RecordSet,
    pub ingredients: RecordSet,
    pub templates: RecordSet,
    /// Sheets that contributed nothing and why
    pub skipped: Vec<SheetError>,
}

#[derive(Serialize)]
struct RecordSetDocument<'a> {
    #[serde(flatten)]
    records: &'a RecordSet,
    sql: SqlPair,
}

impl<'a> RecordSetDocument<'a> {
    fn new(records: &'a RecordSet) -> RecordSetDocument<'a> {
        RecordSetDocument {
            records,
            sql: records.sql(),
        }
    }
}

#[derive(Serialize)]
struct WorkbookDocument<'a> {
    instructions: RecordSetDocument<'a>,
    ingredients: RecordSetDocument<'a>,
    templates: RecordSetDocument<'a>,
    skipped: &'a [SheetError],
}

impl WorkbookOutput {
    pub fn record_sets(&self) -> [&RecordSet; 3] {
        [&self.instructions, &self.ingredients, &self.templates]
    }

    /// All statements of the workbook as one script, blank-line separated
    pub fn combined_sql(&self) -> String {
        self.record_sets()
            .iter()
            .map(|records| records.sql())
            .flat_map(|sql| [sql.create, sql.insert])
            .filter(|statement| !statement.is_empty())
            .collect::<Vec<String>>()
            .join("\n\n")
    }

    /// Pretty JSON of the record sets, their SQL and the skipped sheets
    pub fn to_json(&self) -> Result<String, RustyBatchError> {
        let document = WorkbookDocument {
            instructions: RecordSetDocument::new(&self.instructions),
            ingredients: RecordSetDocument::new(&self.ingredients),
            templates: RecordSetDocument::new(&self.templates),
            skipped: &self.skipped,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

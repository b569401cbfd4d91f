use crate::batch::segment::IngredientDetail;
use crate::batch::segment::Step;
use crate::batch::template::TemplateSet;
use crate::emit::sql::SqlPair;
use indexmap::IndexMap;
use serde::Serialize;

pub const INSTRUCTION_TABLE: &str = "rcp_btch_card_instr";
pub const INGREDIENT_TABLE: &str = "rcp_batch_step_rm_dtl";
pub const TEMPLATE_TABLE: &str = "instruction_templates";

const INSTRUCTION_COLUMNS: [&str; 4] = ["sheet_name", "step_no", "step_seq", "action"];
const INGREDIENT_COLUMNS: [&str; 13] = [
    "sheet_name",
    "step_no",
    "step_seq",
    "detail_seq",
    "raw_material",
    "vendor",
    "description",
    "type",
    "speed",
    "temp",
    "mass",
    "concentration",
    "mixer_needed",
];

/// A named table of text rows keyed by column name, in header order
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RecordSet {
    pub table: String,
    pub headers: Vec<String>,
    pub rows: Vec<IndexMap<String, String>>,
}

impl RecordSet {
    pub fn new(table: &str, headers: &[&str]) -> RecordSet {
        RecordSet {
            table: table.to_owned(),
            headers: headers.iter().map(|header| header.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row; values pair with headers by position, missing ones stay empty.
    pub fn push(&mut self, values: Vec<String>) {
        let mut values = values.into_iter();
        let row = self
            .headers
            .iter()
            .map(|header| (header.to_owned(), values.next().unwrap_or_default()))
            .collect();
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sql(&self) -> SqlPair {
        SqlPair::from_records(self)
    }
}

/// Headers with the optional leading `fng_number` column
fn headers<'a>(fng_number: Option<&str>, columns: &[&'a str]) -> Vec<&'a str> {
    fng_number
        .map(|_| "fng_number")
        .into_iter()
        .chain(columns.iter().copied())
        .collect()
}

fn prefix(fng_number: Option<&str>, sheet_name: &str) -> Vec<String> {
    fng_number
        .map(str::to_owned)
        .into_iter()
        .chain([sheet_name.to_owned()])
        .collect()
}

/// Builds instruction records: one row per step
pub fn instruction_records<'a, I>(fng_number: Option<&str>, sheets: I) -> RecordSet
where
    I: IntoIterator<Item = (&'a str, &'a [Step])>,
{
    let mut records = RecordSet::new(INSTRUCTION_TABLE, &headers(fng_number, &INSTRUCTION_COLUMNS));
    for (sheet_name, steps) in sheets {
        for step in steps {
            let mut values = prefix(fng_number, sheet_name);
            values.extend([
                step.step_number.to_string(),
                step.step_sequence.to_string(),
                step.action_text.to_owned(),
            ]);
            records.push(values);
        }
    }
    records
}

/// Builds ingredient records: one row per ingredient detail
pub fn ingredient_records<'a, I>(fng_number: Option<&str>, sheets: I) -> RecordSet
where
    I: IntoIterator<Item = (&'a str, &'a [IngredientDetail])>,
{
    let mut records = RecordSet::new(INGREDIENT_TABLE, &headers(fng_number, &INGREDIENT_COLUMNS));
    for (sheet_name, ingredients) in sheets {
        for ingredient in ingredients {
            let mut values = prefix(fng_number, sheet_name);
            values.extend([
                ingredient.step_number.to_string(),
                ingredient.step_sequence.to_string(),
                ingredient.detail_sequence.to_string(),
                ingredient.raw_material.to_owned(),
                ingredient.vendor.to_owned(),
                ingredient.description.to_owned(),
                ingredient.kind.to_owned(),
                ingredient.speed.to_owned(),
                ingredient.temperature.to_owned(),
                ingredient.mass.to_owned(),
                ingredient.concentration.to_owned(),
                ingredient.mixer_needed.to_owned(),
            ]);
            records.push(values);
        }
    }
    records
}

/// Builds template records numbered from 1
pub fn template_records(templates: &TemplateSet) -> RecordSet {
    let mut records = RecordSet::new(TEMPLATE_TABLE, &["id", "template"]);
    for template in templates.to_templates() {
        records.push(vec![template.id.to_string(), template.template]);
    }
    records
}

//! # Batch Card Extraction
//!
//! Turns batch card worksheets into instruction steps, their ingredient lines and
//! instruction templates. Each sheet runs through the same pipeline:
//!
//! 1. [`header::locate_header`] finds the header row among title and note rows
//! 2. [`column::ResolvedColumns`] maps logical fields to header columns
//! 3. [`segment::segment`] walks the rows, building the step/ingredient tree and templates
//! 4. [`align::align`] drops repeated steps and renumbers what is left
//!
//! A sheet that cannot be read as a batch card is skipped with a warning; the rest of the
//! workbook is still extracted.
pub mod align;
pub mod column;
pub mod header;
pub mod merge;
pub mod options;
pub mod segment;
pub mod template;

use crate::batch::align::align;
use crate::batch::column::ResolvedColumns;
use crate::batch::header::locate_header;
use crate::batch::merge::merge_records;
use crate::batch::options::ExtractionOptions;
use crate::batch::segment::segment;
use crate::batch::segment::IngredientDetail;
use crate::batch::segment::Step;
use crate::batch::template::TemplateSet;
use crate::emit::record::ingredient_records;
use crate::emit::record::instruction_records;
use crate::emit::record::template_records;
use crate::emit::WorkbookOutput;
use crate::error::RustyBatchError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;

/// Reasons a sheet contributes nothing to the output
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason")]
pub enum SheetError {
    #[error("No header row in the first {scanned} rows of sheet '{sheet}'")]
    HeaderNotFound { sheet: String, scanned: usize },

    #[error("No action, instruction or ingredient column in sheet '{sheet}'")]
    ActionColumnNotFound { sheet: String },

    #[error("No step or sequence column in sheet '{sheet}'")]
    StepColumnNotFound { sheet: String },
}

/// Aligned steps, ingredients and templates of one sheet
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SheetExtraction {
    pub sheet_name: String,
    /// 0-based header row
    pub header_row: usize,
    pub steps: Vec<Step>,
    pub ingredients: Vec<IngredientDetail>,
    pub templates: TemplateSet,
}

/// Extracts one sheet.
pub fn extract_sheet(sheet: &Sheet, options: &ExtractionOptions) -> Result<SheetExtraction, SheetError> {
    let header = locate_header(sheet, options)?;
    let columns = ResolvedColumns::resolve(&header.index, &sheet.name)?;
    let segments = segment(sheet, &header, &columns, options);
    let (steps, ingredients) = align(segments.steps, segments.ingredients, options.dedupe_ingredients);
    info!(
        sheet = %sheet.name,
        header_row = header.row_index + 1,
        steps = steps.len(),
        ingredients = ingredients.len(),
        templates = segments.templates.len(),
        "extracted sheet"
    );
    Ok(SheetExtraction {
        sheet_name: sheet.name.to_owned(),
        header_row: header.row_index,
        steps,
        ingredients,
        templates: segments.templates,
    })
}

/// Extracts every sheet and merges the results; skipped sheets are listed, not fatal.
///
/// Templates are unique across the workbook and numbered in first-seen order. With
/// [`ExtractionOptions::merge`] set, ingredient rows are merged afterwards.
pub fn extract_workbook(sheets: &[Sheet], options: &ExtractionOptions) -> WorkbookOutput {
    let mut extractions = Vec::<SheetExtraction>::with_capacity(sheets.len());
    let mut skipped = Vec::<SheetError>::new();
    let mut templates = TemplateSet::new();
    for sheet in sheets {
        match extract_sheet(sheet, options) {
            Ok(extraction) => {
                templates.extend(extraction.templates.clone());
                extractions.push(extraction);
            }
            Err(error) => {
                warn!(sheet = %sheet.name, "{}", error);
                skipped.push(error);
            }
        }
    }

    let fng_number = options.fng_number();
    let mut ingredients = ingredient_records(
        fng_number,
        extractions.iter().map(|extraction| (extraction.sheet_name.as_str(), extraction.ingredients.as_slice())),
    );
    if let Some(merge) = &options.merge {
        let before = ingredients.len();
        ingredients = merge_records(&ingredients, merge);
        info!(column = %merge.key, before, after = ingredients.len(), "merged ingredient rows");
    }
    WorkbookOutput {
        instructions: instruction_records(
            fng_number,
            extractions.iter().map(|extraction| (extraction.sheet_name.as_str(), extraction.steps.as_slice())),
        ),
        ingredients,
        templates: template_records(&templates),
        skipped,
    }
}

/// Reads the selected sheets of an open workbook and extracts them.
pub fn extract_spreadsheet(
    spreadsheet: &mut dyn Spreadsheet,
    criteria: &Criteria,
    options: &ExtractionOptions,
) -> Result<WorkbookOutput, RustyBatchError> {
    let sheets = spreadsheet.read_sheets(criteria)?;
    info!(workbook = %spreadsheet.name(), sheets = sheets.len(), "read workbook");
    Ok(extract_workbook(&sheets, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::merge::MergeOptions;
    use crate::spreadsheet::open_spreadsheet_bytes;
    use crate::spreadsheet::xlsx::tests::build_workbook;
    use pretty_assertions::assert_eq;

    fn scenario_sheet(name: &str) -> Sheet {
        Sheet::from_text_rows(
            name,
            [
                ["Step", "Action", "Vendor", "Description"],
                ["1", "Mix ingredients", "AcmeCo", "Sugar (raw)"],
                ["", "", "AcmeCo", "Salt"],
                ["2", "Heat mixture", "", ""],
            ],
        )
    }

    #[test]
    fn extracts_steps_and_ingredients() {
        let extraction = extract_sheet(&scenario_sheet("Batch"), &ExtractionOptions::default()).unwrap();
        assert_eq!(extraction.header_row, 0);
        let steps: Vec<(u32, &str)> = extraction.steps.iter().map(|step| (step.step_number, step.action_text.as_str())).collect();
        assert_eq!(steps, vec![(1, "Mix ingredients"), (2, "Heat mixture")]);
        let ingredients: Vec<(u32, u32, &str)> = extraction
            .ingredients
            .iter()
            .map(|ingredient| (ingredient.step_number, ingredient.detail_sequence, ingredient.description.as_str()))
            .collect();
        assert_eq!(ingredients, vec![(1, 1, "Sugar"), (1, 2, "Salt")]);
    }

    #[test]
    fn repeated_step_does_not_shift_numbering() {
        let sheet = Sheet::from_text_rows(
            "Batch",
            [
                ["Step", "Action"],
                ["1", "Add water"],
                ["2", "Add water"],
                ["3", "Stir"],
            ],
        );
        let extraction = extract_sheet(&sheet, &ExtractionOptions::default()).unwrap();
        let steps: Vec<(u32, &str)> = extraction.steps.iter().map(|step| (step.step_number, step.action_text.as_str())).collect();
        assert_eq!(steps, vec![(1, "Add water"), (2, "Stir")]);
    }

    #[test]
    fn materials_without_description_are_distinct_ingredients() {
        let sheet = Sheet::from_text_rows("Batch", [["Step", "Action"], ["1", "Mix"], ["", "Sugar"], ["", "Salt"]]);
        let extraction = extract_sheet(&sheet, &ExtractionOptions::default()).unwrap();
        let materials: Vec<(u32, &str)> = extraction
            .ingredients
            .iter()
            .map(|ingredient| (ingredient.detail_sequence, ingredient.raw_material.as_str()))
            .collect();
        assert_eq!(materials, vec![(1, "Sugar"), (2, "Salt")]);
    }

    #[test]
    fn sheet_without_header_is_skipped() {
        let notes = Sheet::from_text_rows("Notes", [["Prepared by", "QA"], ["Approved", "yes"]]);
        let sheets = vec![notes, scenario_sheet("Batch")];
        let output = extract_workbook(&sheets, &ExtractionOptions::default());
        assert_eq!(
            output.skipped,
            vec![SheetError::HeaderNotFound { sheet: "Notes".to_owned(), scanned: 2 }]
        );
        assert_eq!(output.instructions.len(), 2);
        assert_eq!(output.ingredients.len(), 2);
        assert!(output.instructions.rows.iter().all(|row| row["sheet_name"] == "Batch"));
    }

    #[test]
    fn sheet_without_action_column_is_skipped() {
        let sheet = Sheet::from_text_rows("Batch", [["Step", "Vendor"], ["1", "AcmeCo"]]);
        let output = extract_workbook(&[sheet], &ExtractionOptions::default());
        assert_eq!(output.skipped, vec![SheetError::ActionColumnNotFound { sheet: "Batch".to_owned() }]);
        assert!(output.instructions.is_empty());
        assert_eq!(output.combined_sql(), "");
    }

    #[test]
    fn merges_sheets_with_fng_number() {
        let options = ExtractionOptions {
            fng_number: Some("FNG-1042".to_owned()),
            ..ExtractionOptions::default()
        };
        let sheets = vec![scenario_sheet("Batch A"), scenario_sheet("Batch B")];
        let output = extract_workbook(&sheets, &options);
        assert_eq!(output.instructions.len(), 4);
        assert_eq!(output.instructions.headers[0], "fng_number");
        assert_eq!(output.instructions.rows[3]["fng_number"], "FNG-1042");
        assert_eq!(output.instructions.rows[3]["sheet_name"], "Batch B");
        assert_eq!(output.ingredients.rows[0]["description"], "Sugar");
    }

    #[test]
    fn merges_ingredient_rows_when_configured() {
        let sheet = Sheet::from_text_rows(
            "Batch",
            [
                ["Step", "Action", "Material", "Mass"],
                ["1", "Charge", "Water", "100"],
                ["2", "Dilute", "Water", "50"],
                ["", "", "Salt", "2"],
            ],
        );
        let options = ExtractionOptions {
            merge: Some(MergeOptions {
                key: "raw_material".to_owned(),
                additions: vec!["mass".to_owned()],
                similarity: None,
            }),
            ..ExtractionOptions::default()
        };
        let output = extract_workbook(&[sheet], &options);
        let rows: Vec<(&str, &str)> = output
            .ingredients
            .rows
            .iter()
            .map(|row| (row["raw_material"].as_str(), row["mass"].as_str()))
            .collect();
        assert_eq!(rows, vec![("Water", "150"), ("Salt", "2")]);
    }

    #[test]
    fn templates_are_unique_across_sheets() {
        let sheet = |name: &str| {
            Sheet::from_text_rows(name, [["Step", "Action", "Mass"], ["1", "Add 5 kg", "5"]])
                .with_formula("B2", "=\"Add \"&C2&\" kg\"")
        };
        let output = extract_workbook(&[sheet("One"), sheet("Two")], &ExtractionOptions::default());
        assert_eq!(output.templates.len(), 1);
        assert_eq!(output.templates.rows[0]["template"], "Add {mass} kg");
    }

    #[test]
    fn extracts_from_workbook_file() {
        let batch = concat!(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Batch Card</t></is></c></row>"#,
            r#"<row r="3"><c r="A3" t="s"><v>0</v></c><c r="B3" t="s"><v>1</v></c><c r="C3" t="s"><v>2</v></c><c r="D3" t="s"><v>3</v></c></row>"#,
            r#"<row r="4"><c r="A4"><v>1</v></c><c r="B4" t="str"><f>"Add "&amp;C4&amp;" kg of "&amp;D4</f><v>Add 5 kg of Sugar</v></c><c r="C4"><v>5</v></c><c r="D4" t="inlineStr"><is><t>Sugar</t></is></c></row>"#,
            r#"<row r="5"><c r="A5"><v>2</v></c><c r="B5" t="inlineStr"><is><t>Heat to 70C</t></is></c></row>"#,
        );
        let bytes = build_workbook(&[("Batch", batch), ("Notes", "")], &["Step", "Action", "Mass", "Material"], None);
        let mut spreadsheet = open_spreadsheet_bytes("recipe.xlsx", bytes).unwrap();
        let output = extract_spreadsheet(spreadsheet.as_mut(), &Criteria::default(), &ExtractionOptions::default()).unwrap();

        assert_eq!(output.instructions.len(), 2);
        assert_eq!(output.instructions.rows[0]["action"], "Add 5 kg of Sugar");
        assert_eq!(output.ingredients.len(), 1);
        assert_eq!(output.ingredients.rows[0]["raw_material"], "Sugar");
        assert_eq!(output.ingredients.rows[0]["mass"], "5");
        assert_eq!(output.templates.rows[0]["template"], "Add {mass} kg of {material}");
        assert_eq!(output.skipped.len(), 1);
    }
}

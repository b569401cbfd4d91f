use crate::batch::column::ResolvedColumns;
use crate::batch::header::HeaderRow;
use crate::batch::options::ExtractionOptions;
use crate::batch::template::generalize;
use crate::batch::template::TemplateSet;
use crate::spreadsheet::CellValue;
use crate::spreadsheet::Sheet;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static STEP_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(\.0)?$").expect("Hardcode regex pattern"));
static PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("Hardcode regex pattern"));
static PART_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpart\b\.?(\s*\d+\b)?").expect("Hardcode regex pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("Hardcode regex pattern"));

/// One instruction of a batch card
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Step {
    pub step_number: u32,
    /// Sub-order of continuation steps sharing a number
    pub step_sequence: u32,
    pub action_text: String,
}

/// One ingredient line, owned by the step with the same number and sequence
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IngredientDetail {
    pub step_number: u32,
    pub step_sequence: u32,
    pub detail_sequence: u32,
    pub raw_material: String,
    pub vendor: String,
    pub description: String,
    pub kind: String,
    pub speed: String,
    pub temperature: String,
    pub mass: String,
    pub concentration: String,
    pub mixer_needed: String,
}

/// Steps, ingredients and templates found in one sheet
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Segments {
    pub steps: Vec<Step>,
    pub ingredients: Vec<IngredientDetail>,
    pub templates: TemplateSet,
}

impl IngredientDetail {
    /// True when no material, vendor or setting is filled in
    fn is_blank(&self) -> bool {
        [
            &self.raw_material,
            &self.vendor,
            &self.description,
            &self.kind,
            &self.speed,
            &self.temperature,
            &self.mass,
            &self.concentration,
            &self.mixer_needed,
        ]
        .iter()
        .all(|field| field.is_empty())
    }
}

/// Walks the rows below the header, turning step rows into [`Step`]s and the rows after
/// them into that step's [`IngredientDetail`]s.
///
/// A step row that also fills ingredient columns contributes a detail to its own step.
pub fn segment(sheet: &Sheet, header: &HeaderRow, columns: &ResolvedColumns, options: &ExtractionOptions) -> Segments {
    let keywords: Vec<String> = options
        .continuation_keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect();

    let mut segments = Segments::default();
    let mut current = None::<(u32, u32)>;
    let mut details_per_step = HashMap::<(u32, u32), u32>::new();
    for (row_index, row) in sheet.rows.iter().enumerate().skip(header.row_index + 1) {
        if row.iter().all(CellValue::is_empty) {
            continue;
        }
        let text = |col: usize| sheet.text(row_index, col).trim().to_owned();
        let field = |col: Option<usize>| col.map(text).unwrap_or_default();

        let is_step = match parse_step_number(&text(columns.step)) {
            Some(number) => {
                let action_text = text(columns.action);
                let lower = action_text.to_lowercase();
                let is_continuation = keywords.iter().any(|keyword| lower.starts_with(keyword.as_str()));
                let (step_number, step_sequence) = match current {
                    Some((number, sequence)) if is_continuation => (number, sequence + 1),
                    _ => (number, 1),
                };

                let previous = segments.steps.last().map(|step| step.action_text.as_str());
                if previous == Some(action_text.as_str()) {
                    debug!(sheet = %sheet.name, row = row_index + 1, action = %action_text, "skip repeated step");
                } else {
                    current = Some((step_number, step_sequence));
                    segments.steps.push(Step {
                        step_number,
                        step_sequence,
                        action_text,
                    });
                    if let Some(formula) = sheet.formulas.get(row_index, columns.action) {
                        if let Some(template) = generalize(formula, header, sheet) {
                            segments.templates.insert(template);
                        }
                    }
                }
                true
            }
            None => false,
        };

        // the action cell names the material on detail rows, never on step rows
        let raw_material = match columns.raw_material {
            Some(col) => text(col),
            None if is_step => String::new(),
            None => text(columns.action),
        };
        let mut detail = IngredientDetail {
            raw_material,
            vendor: field(columns.vendor),
            description: normalize_description(&field(columns.description)),
            kind: field(columns.kind),
            speed: field(columns.speed),
            temperature: field(columns.temperature),
            mass: field(columns.mass),
            concentration: field(columns.concentration),
            mixer_needed: field(columns.mixer),
            ..IngredientDetail::default()
        };
        if is_step && detail.is_blank() {
            continue;
        }

        match current {
            Some((step_number, step_sequence)) => {
                let detail_sequence = details_per_step.entry((step_number, step_sequence)).or_insert(0);
                *detail_sequence += 1;
                detail.step_number = step_number;
                detail.step_sequence = step_sequence;
                detail.detail_sequence = *detail_sequence;
                segments.ingredients.push(detail);
            }
            None => debug!(sheet = %sheet.name, row = row_index + 1, "drop detail row before first step"),
        }
    }
    segments
}

/// `"3"` and `"3.0"` start a step, anything else does not.
pub(crate) fn parse_step_number(text: &str) -> Option<u32> {
    if !STEP_START.is_match(text) {
        return None;
    }
    let digits = text.split('.').next().unwrap_or(text);
    digits.parse::<u32>().ok()
}

/// Drops parenthetical groups and `part`/`part N`/`part.` tokens, then collapses whitespace.
pub fn normalize_description(description: &str) -> String {
    let mut text = description.to_owned();
    // innermost groups first so nested parentheses go too
    while PARENTHETICAL.is_match(&text) {
        text = PARENTHETICAL.replace_all(&text, " ").into_owned();
    }
    let text = PART_TOKEN.replace_all(&text, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_owned()
}

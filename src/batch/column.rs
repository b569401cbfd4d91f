use crate::batch::header::HeaderIndex;
use crate::batch::SheetError;

const ACTION_KEYS: [&str; 3] = ["action", "instruction", "ingredient"];
const STEP_KEYS: [&str; 2] = ["step", "seq"];
const RAW_MATERIAL_KEYS: [&str; 3] = ["rawmaterial", "itemnumber", "material"];

/// Lower-cases and drops everything but ASCII letters and digits.
fn normalize_key(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|char| char.to_ascii_lowercase())
        .collect()
}

/// Column of the first header label (in header order) containing `key` once both are normalized.
pub fn resolve_field(index: &HeaderIndex, key: &str) -> Option<usize> {
    let key = normalize_key(key);
    if key.is_empty() {
        return None;
    }
    index
        .iter()
        .find(|(label, _)| normalize_key(label).contains(&key))
        .map(|(_, col)| *col)
}

/// First key of the chain that resolves.
pub fn resolve_any(index: &HeaderIndex, keys: &[&str]) -> Option<usize> {
    keys.iter().find_map(|key| resolve_field(index, key))
}

/// Column indexes of every field a batch card row is read from
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedColumns {
    pub step: usize,
    pub action: usize,
    /// Falls back to the action cell when unresolved
    pub raw_material: Option<usize>,
    pub vendor: Option<usize>,
    pub description: Option<usize>,
    pub kind: Option<usize>,
    pub speed: Option<usize>,
    pub temperature: Option<usize>,
    pub mass: Option<usize>,
    pub concentration: Option<usize>,
    pub mixer: Option<usize>,
}

impl ResolvedColumns {
    /// Resolves all columns; a sheet without an action or a step column cannot be segmented.
    pub fn resolve(index: &HeaderIndex, sheet_name: &str) -> Result<ResolvedColumns, SheetError> {
        let action = resolve_any(index, &ACTION_KEYS).ok_or_else(|| SheetError::ActionColumnNotFound {
            sheet: sheet_name.to_owned(),
        })?;
        let step = resolve_any(index, &STEP_KEYS).ok_or_else(|| SheetError::StepColumnNotFound {
            sheet: sheet_name.to_owned(),
        })?;
        Ok(ResolvedColumns {
            step,
            action,
            raw_material: resolve_any(index, &RAW_MATERIAL_KEYS),
            vendor: resolve_field(index, "vendor"),
            description: resolve_field(index, "description"),
            kind: resolve_field(index, "type"),
            speed: resolve_field(index, "speed"),
            temperature: resolve_field(index, "temp"),
            mass: resolve_field(index, "mass"),
            concentration: resolve_field(index, "concentration"),
            mixer: resolve_field(index, "mixer"),
        })
    }
}

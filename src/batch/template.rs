//! Generalizes concatenation formulas of instruction cells into reusable text templates.
//!
//! `="Add "&TEXT(C14,"0.0")&" kg of "&D14` under a header with `Mass` in column C and
//! `Material` in column D becomes `Add {mass} kg of {material}`.

use crate::batch::header::HeaderRow;
use crate::spreadsheet::reference::replace_references;
use crate::spreadsheet::Sheet;
use indexmap::IndexSet;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z0-9_]+)\}").expect("Hardcode regex pattern"));

const TEXT_FUNCTION: &str = "text(";

/// A generalized formula with `{placeholder}` tokens
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormulaTemplate {
    /// 1-based position in first-seen order
    pub id: usize,
    pub template: String,
}

impl FormulaTemplate {
    /// Placeholder names in order of appearance
    pub fn placeholders(&self) -> Vec<&str> {
        PLACEHOLDER
            .captures_iter(&self.template)
            .filter_map(|captures| captures.get(1).map(|name| name.as_str()))
            .collect()
    }

    /// Fills placeholders from `values`; unknown placeholders stay as they are.
    pub fn render(&self, values: &HashMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |captures: &regex::Captures| {
                values
                    .get(&captures[1])
                    .cloned()
                    .unwrap_or_else(|| captures[0].to_owned())
            })
            .into_owned()
    }
}

/// Unique templates in first-seen order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateSet(IndexSet<String>);

impl TemplateSet {
    pub fn new() -> TemplateSet {
        TemplateSet::default()
    }

    /// Adds a template, returns false when it was already known
    pub fn insert(&mut self, template: String) -> bool {
        self.0.insert(template)
    }

    pub fn extend(&mut self, other: TemplateSet) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, template: &str) -> bool {
        self.0.contains(template)
    }

    /// Numbers the templates from 1 in first-seen order
    pub fn to_templates(&self) -> Vec<FormulaTemplate> {
        self.0
            .iter()
            .enumerate()
            .map(|(index, template)| FormulaTemplate {
                id: index + 1,
                template: template.to_owned(),
            })
            .collect()
    }
}

/// Rewrites a concatenation formula into a template, `None` when it concatenates nothing.
///
/// Each cell reference becomes `{name}` where the name comes from the header label of the
/// referenced column, else from the referenced cell's own value, else `unknown`.
///
/// When the formula is not a concatenation itself, the first call argument that is one
/// becomes the template, so `=IF(C2>0,"Add "&C2&" kg","")` yields `Add {mass} kg`.
pub fn generalize(formula: &str, header: &HeaderRow, sheet: &Sheet) -> Option<String> {
    if !formula.contains('&') {
        return None;
    }
    let formula = formula.trim();
    let formula = formula.strip_prefix('=').unwrap_or(formula);
    let formula = collapse_text_calls(formula);
    let segments = find_concatenation(&formula)?;

    let mut template = String::new();
    for segment in segments {
        let segment = segment.trim();
        if let Some(literal) = unquote_literal(segment) {
            template.push_str(&literal);
        } else {
            template.push_str(&replace_references(segment, |reference| {
                let label = header
                    .label(reference.col)
                    .map(str::to_owned)
                    .unwrap_or_else(|| sheet.text(reference.row, reference.col));
                format!("{{{}}}", placeholder_name(&label))
            }));
        }
    }
    let template = template.trim().to_owned();
    if template.is_empty() {
        None
    } else {
        Some(template)
    }
}

/// Lower-cases, turns every run of non-alphanumerics into `_` and trims `_`.
pub(crate) fn placeholder_name(label: &str) -> String {
    let mut name = String::with_capacity(label.len());
    for char in label.trim().to_lowercase().chars() {
        if char.is_ascii_alphanumeric() {
            name.push(char);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    let name = name.trim_matches('_');
    if name.is_empty() {
        "unknown".to_owned()
    } else {
        name.to_owned()
    }
}

/// Replaces every `TEXT(value, format)` call with its first argument, inner calls included.
fn collapse_text_calls(formula: &str) -> String {
    let mut output = String::with_capacity(formula.len());
    let mut rest = formula;
    while let Some(start) = find_text_call(rest) {
        output.push_str(&rest[..start]);
        let arguments = start + TEXT_FUNCTION.len();
        match first_argument(&rest[arguments..]) {
            Some((argument, consumed)) => {
                output.push_str(&collapse_text_calls(argument.trim()));
                rest = &rest[arguments + consumed..];
            }
            None => {
                // unbalanced call, keep as written
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

/// Byte offset of the next `TEXT(` outside string literals that is not part of a longer name
fn find_text_call(formula: &str) -> Option<usize> {
    let mut in_literal = false;
    let mut previous = None::<char>;
    for (index, char) in formula.char_indices() {
        if char == '"' {
            in_literal = !in_literal;
        } else if !in_literal {
            let is_call = formula
                .get(index..index + TEXT_FUNCTION.len())
                .map(|name| name.eq_ignore_ascii_case(TEXT_FUNCTION))
                .unwrap_or(false);
            let glued = previous.map(|char| char.is_ascii_alphanumeric() || char == '_' || char == '.').unwrap_or(false);
            if is_call && !glued {
                return Some(index);
            }
        }
        previous = Some(char);
    }
    None
}

/// First argument of a call whose `(` was just consumed and the length up to its `)`
fn first_argument(arguments: &str) -> Option<(&str, usize)> {
    let mut in_literal = false;
    let mut depth = 0usize;
    let mut first_end = None::<usize>;
    for (index, char) in arguments.char_indices() {
        match char {
            '"' => in_literal = !in_literal,
            _ if in_literal => (),
            '(' => depth += 1,
            ')' if depth == 0 => {
                let end = first_end.unwrap_or(index);
                return Some((&arguments[..end], index + 1));
            }
            ')' => depth -= 1,
            ',' | ';' if depth == 0 && first_end.is_none() => first_end = Some(index),
            _ => (),
        }
    }
    None
}

/// Splits at `&` operators outside literals and parentheses
fn split_concatenation(formula: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_literal = false;
    let mut depth = 0usize;
    let mut start = 0usize;
    for (index, char) in formula.char_indices() {
        match char {
            '"' => in_literal = !in_literal,
            _ if in_literal => (),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '&' if depth == 0 => {
                segments.push(&formula[start..index]);
                start = index + 1;
            }
            _ => (),
        }
    }
    segments.push(&formula[start..]);
    segments
}

/// Segments of the first concatenation, looking into call arguments when the expression
/// itself has fewer than two segments
fn find_concatenation(expression: &str) -> Option<Vec<&str>> {
    let segments = split_concatenation(expression);
    if segments.len() >= 2 {
        return Some(segments);
    }
    call_arguments(expression)
        .into_iter()
        .find_map(|argument| find_concatenation(argument.trim()))
}

/// Arguments of the outermost calls and parentheses, split at `,` or `;`
fn call_arguments(expression: &str) -> Vec<&str> {
    let mut arguments = Vec::new();
    let mut in_literal = false;
    let mut depth = 0usize;
    let mut start = 0usize;
    for (index, char) in expression.char_indices() {
        match char {
            '"' => in_literal = !in_literal,
            _ if in_literal => (),
            '(' => {
                depth += 1;
                if depth == 1 {
                    start = index + 1;
                }
            }
            ')' if depth == 1 => {
                arguments.push(&expression[start..index]);
                depth = 0;
            }
            ')' => depth = depth.saturating_sub(1),
            ',' | ';' if depth == 1 => {
                arguments.push(&expression[start..index]);
                start = index + 1;
            }
            _ => (),
        }
    }
    arguments
}

/// Text of a segment made of exactly one string literal, `""` unescaped
fn unquote_literal(segment: &str) -> Option<String> {
    let inner = segment.strip_prefix('"')?.strip_suffix('"')?;
    let mut text = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(char) = chars.next() {
        if char == '"' {
            // a lone quote closes the literal early, so the segment is an expression
            if chars.next_if_eq(&'"').is_none() {
                return None;
            }
        }
        text.push(char);
    }
    Some(text)
}

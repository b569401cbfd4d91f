//! Excel-style cell references: `A1` <-> (row, col) conversions and reference rewriting
//! inside formula text.

use regex::Regex;
use std::fmt::Display;
use std::sync::LazyLock;

/// Sheet-qualified, optionally absolute A1 reference. Boundaries are checked by
/// [`replace_references`] since the regex crate has no look-around.
static CELL_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((?:'[^']+'|[A-Za-z0-9_.]+)!)?(\$?)([A-Z]{1,3})(\$?)([0-9]+)")
        .expect("Hardcode regex pattern")
});

/// Converts column letters to a 0-based column index ("A" = 0, "AA" = 26).
pub(crate) fn col_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.chars().all(|char| char.is_ascii_alphabetic()) {
        return None;
    }
    letters
        .to_ascii_uppercase()
        .chars()
        .map(|char| char as usize - 'A' as usize + 1)
        .reduce(|index, digit| index * 26 + digit)
        .map(|col| col - 1)
}

/// Converts a 1-based row number to a 0-based row index.
pub(crate) fn row_to_index(number: &str) -> Option<usize> {
    number
        .parse::<usize>()
        .ok()
        .filter(|row| *row > 0)
        .map(|row| row - 1)
}

/// Converts a 0-based column index to column letters.
pub fn col_to_letters(col: usize) -> String {
    let mut col = col + 1;
    let mut letters = String::new();
    while col > 0 {
        col -= 1;
        letters.insert(0, char::from(b'A' + (col % 26) as u8));
        col /= 26;
    }
    letters
}

/// Converts 0-based indexes to an A1 reference.
pub fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letters(col), row + 1)
}

/// Converts an A1 reference (absolute markers allowed) to 0-based indexes.
pub fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|char: char| char.is_ascii_digit())?;
    let col = col_to_index(&reference[..split])?;
    let row = row_to_index(&reference[split..])?;
    Some((row, col))
}

/// A cell reference found inside formula text.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CellReference {
    /// Sheet qualifier including the trailing `!`
    pub(crate) sheet: Option<String>,
    pub(crate) col_absolute: bool,
    pub(crate) col: usize,
    pub(crate) row_absolute: bool,
    pub(crate) row: usize,
}

impl CellReference {
    /// Moves the relative parts of the reference, absolute parts stay put.
    pub(crate) fn shifted(&self, row_shift: isize, col_shift: isize) -> CellReference {
        let shift = |index: usize, offset: isize| index.saturating_add_signed(offset);
        CellReference {
            sheet: self.sheet.clone(),
            col_absolute: self.col_absolute,
            col: if self.col_absolute { self.col } else { shift(self.col, col_shift) },
            row_absolute: self.row_absolute,
            row: if self.row_absolute { self.row } else { shift(self.row, row_shift) },
        }
    }
}

impl Display for CellReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.sheet.as_deref().unwrap_or(""),
            if self.col_absolute { "$" } else { "" },
            col_to_letters(self.col),
            if self.row_absolute { "$" } else { "" },
            self.row + 1
        )
    }
}

/// Rewrites every cell reference outside string literals with `replacer`.
///
/// A match only counts when it is not glued to a surrounding identifier
/// (`LOG10(`, `ABC123DEF`) and is not a function call.
pub(crate) fn replace_references<F>(formula: &str, mut replacer: F) -> String
where
    F: FnMut(&CellReference) -> String,
{
    let mut output = String::with_capacity(formula.len());
    let mut in_literal = false;
    let mut segment_start = 0usize;
    for (index, char) in formula.char_indices() {
        if char == '"' {
            if in_literal {
                output.push_str(&formula[segment_start..=index]);
            } else {
                output.push_str(&rewrite_segment(&formula[segment_start..index], &mut replacer));
                output.push('"');
            }
            in_literal = !in_literal;
            segment_start = index + 1;
        }
    }
    let rest = &formula[segment_start..];
    if in_literal {
        output.push_str(rest);
    } else {
        output.push_str(&rewrite_segment(rest, &mut replacer));
    }
    output
}

fn rewrite_segment<F>(segment: &str, replacer: &mut F) -> String
where
    F: FnMut(&CellReference) -> String,
{
    let mut output = String::with_capacity(segment.len());
    let mut last = 0usize;
    for captures in CELL_REFERENCE.captures_iter(segment) {
        let matched = captures.get(0).expect("Whole match");
        let glued_before = segment[..matched.start()]
            .chars()
            .next_back()
            .map(|char| char.is_ascii_alphanumeric() || char == '_' || char == '$' || char == '.')
            .unwrap_or(false);
        let glued_after = segment[matched.end()..]
            .chars()
            .next()
            .map(|char| char.is_ascii_alphanumeric() || char == '_' || char == '(')
            .unwrap_or(false);
        if glued_before || glued_after {
            continue;
        }
        let (Some(col), Some(row)) = (
            col_to_index(&captures[3]),
            row_to_index(&captures[5]),
        ) else {
            continue;
        };
        let reference = CellReference {
            sheet: captures.get(1).map(|sheet| sheet.as_str().to_owned()),
            col_absolute: !captures[2].is_empty(),
            col,
            row_absolute: !captures[4].is_empty(),
            row,
        };
        output.push_str(&segment[last..matched.start()]);
        output.push_str(&replacer(&reference));
        last = matched.end();
    }
    output.push_str(&segment[last..]);
    output
}

/// Translates the master formula of a shared-formula group to a dependent cell.
pub(crate) fn shift_formula(formula: &str, row_shift: isize, col_shift: isize) -> String {
    replace_references(formula, |reference| reference.shifted(row_shift, col_shift).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_indexes_and_references() {
        assert_eq!(index_to_reference(0, 0), "A1");
        assert_eq!(index_to_reference(13, 2), "C14");
        assert_eq!(index_to_reference(0, 27), "AB1");
        assert_eq!(reference_to_index("C14"), Some((13, 2)));
        assert_eq!(reference_to_index("$AB$1"), Some((0, 27)));
        assert_eq!(reference_to_index("A0"), None);
        assert_eq!(reference_to_index("14"), None);
    }

    #[test]
    fn column_letters_round_trip_at_boundaries() {
        assert_eq!(col_to_letters(25), "Z");
        assert_eq!(col_to_letters(26), "AA");
        assert_eq!(col_to_letters(701), "ZZ");
        assert_eq!(col_to_letters(702), "AAA");
        assert_eq!(col_to_index("ZZ"), Some(701));
    }

    #[test]
    fn rewrites_references_outside_literals_only() {
        let rewritten = replace_references("\"Mix B2 \"&B2&TEXT($C$3,\"0.0\")", |reference| {
            format!("<{}:{}>", reference.row, reference.col)
        });
        assert_eq!(rewritten, "\"Mix B2 \"&<1:1>&TEXT(<2:2>,\"0.0\")");
    }

    #[test]
    fn ignores_function_names_that_look_like_references() {
        let rewritten = replace_references("LOG10(A1)+ABC123DEF", |_| "X".to_owned());
        assert_eq!(rewritten, "LOG10(X)+ABC123DEF");
    }

    #[test]
    fn keeps_sheet_qualifier() {
        let rewritten = replace_references("'Raw Data'!B4&Sheet2!$A1", |reference| {
            reference.sheet.clone().unwrap_or_default()
        });
        assert_eq!(rewritten, "'Raw Data'!&Sheet2!");
    }

    #[test]
    fn shifts_relative_parts_of_shared_formulas() {
        assert_eq!(shift_formula("\"Add \"&A2&\" to \"&$B$2&C$2", 3, 1), "\"Add \"&B5&\" to \"&$B$2&D$2");
    }
}

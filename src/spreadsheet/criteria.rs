use crate::error::RustyBatchError;
use glob::Pattern;

/// Criteria for selecting which worksheets of a workbook are read.
#[derive(Clone, Debug, Default)]
pub struct Criteria {
    /// Sheet name patterns for filtering which sheets to process.
    pub sheet_name_patterns: Option<Vec<Pattern>>,

    /// Maximum number of sheets to read.
    pub sheet_limit: Option<usize>,
}

impl Criteria {
    /// Builds criteria from glob patterns (`Batch*`, `Sheet?`); no pattern accepts every sheet.
    pub fn new<S: AsRef<str>>(patterns: &[S], sheet_limit: Option<usize>) -> Result<Criteria, RustyBatchError> {
        let sheet_name_patterns = if patterns.is_empty() {
            None
        } else {
            Some(
                patterns
                    .iter()
                    .map(|pattern| Pattern::new(pattern.as_ref()))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        };
        Ok(Criteria {
            sheet_name_patterns,
            sheet_limit,
        })
    }

    /// Checks if a sheet name matches the criteria patterns.
    /// Returns true if no patterns are specified or if name matches any pattern.
    pub fn accept(&self, sheet_name: &str) -> bool {
        if let Some(patterns) = &self.sheet_name_patterns {
            patterns.iter().any(|pattern| pattern.matches(sheet_name))
        } else {
            true
        }
    }
}

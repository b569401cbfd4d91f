use crate::batch::merge::MergeOptions;
use crate::error::ResultMessage;
use crate::error::RustyBatchError;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Caller supplied settings for one extraction run.
///
/// Every field has a default, so a JSON config only needs the keys it changes:
///
/// ```json
/// { "fng_number": "FNG-1042", "continuation_keywords": ["upon", "rinse", "then"] }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionOptions {
    /// How many leading rows are searched for the header row
    pub header_scan_rows: usize,
    /// Action prefixes that continue the current step instead of starting a new one
    pub continuation_keywords: Vec<String>,
    /// Finished-goods identifier prepended to instruction and ingredient rows
    pub fng_number: Option<String>,
    /// Drop ingredients repeating the same material, vendor and settings within a step
    pub dedupe_ingredients: bool,
    /// Merge ingredient rows sharing a column value, off when absent
    pub merge: Option<MergeOptions>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        ExtractionOptions {
            header_scan_rows: 40,
            continuation_keywords: vec!["upon".to_owned(), "rinse".to_owned()],
            fng_number: None,
            dedupe_ingredients: true,
            merge: None,
        }
    }
}

impl ExtractionOptions {
    /// Loads options from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<ExtractionOptions, RustyBatchError> {
        let path = path.as_ref();
        let prefix = path.display().to_string();
        let text = fs::read_to_string(path).map_err(RustyBatchError::from).with_prefix(&prefix)?;
        Self::from_json(&text).with_prefix(&prefix)
    }

    pub fn from_json(text: &str) -> Result<ExtractionOptions, RustyBatchError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The fng number, when configured and not blank
    pub(crate) fn fng_number(&self) -> Option<&str> {
        self.fng_number.as_deref().map(str::trim).filter(|number| !number.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn partial_config_keeps_defaults() {
        let options = ExtractionOptions::from_json(r#"{"fng_number": "FNG-7"}"#).unwrap();
        assert_eq!(options.fng_number(), Some("FNG-7"));
        assert_eq!(options.header_scan_rows, 40);
        assert_eq!(options.continuation_keywords, vec!["upon", "rinse"]);
        assert!(options.dedupe_ingredients);
    }

    #[test]
    fn reads_merge_settings() {
        let options = ExtractionOptions::from_json(r#"{"merge": {"key": "description", "additions": ["mass"]}}"#).unwrap();
        assert_eq!(
            options.merge,
            Some(MergeOptions {
                key: "description".to_owned(),
                additions: vec!["mass".to_owned()],
                similarity: None,
            })
        );
        assert!(ExtractionOptions::from_json(r#"{"merge": {"additions": ["mass"]}}"#).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ExtractionOptions::from_json(r#"{"scan_rows": 10}"#).is_err());
    }

    #[test]
    fn blank_fng_number_counts_as_missing() {
        let options = ExtractionOptions {
            fng_number: Some("  ".to_owned()),
            ..ExtractionOptions::default()
        };
        assert_eq!(options.fng_number(), None);
    }

    #[test]
    fn loads_from_file_with_path_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"header_scan_rows": 5, "dedupe_ingredients": false}"#).unwrap();
        let options = ExtractionOptions::from_json_file(file.path()).unwrap();
        assert_eq!(options.header_scan_rows, 5);
        assert!(!options.dedupe_ingredients);

        let error = ExtractionOptions::from_json_file("missing-options.json").unwrap_err();
        assert!(error.to_string().starts_with("missing-options.json: "));
    }
}

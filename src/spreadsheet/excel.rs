//! Microsoft Office Excel package helpers
use crate::error::RustyBatchError;
use crate::helpers::reader::UnifiedReader;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use zip::ZipArchive;

/// XML tag name for relationship elements in Excel files
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Signature of OLE compound documents (legacy `.xls` and encrypted packages)
const COMPOUND_DOCUMENT_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Opens an Excel package and loads its structure
///
/// # Returns
/// Tuple containing:
/// - Zip archive handle
/// - Number format mappings
/// - List of sheet names and their paths
pub(super) fn open<W, F>(
    file_name: &str,
    mut reader: UnifiedReader,
    load_workbook: W,
    load_number_formats: F,
) -> Result<(ZipArchive<UnifiedReader>, Vec<CellType>, Vec<(String, String)>), RustyBatchError>
where
    W: Fn(&mut ZipArchive<UnifiedReader>) -> Result<(Vec<(String, String)>, bool), RustyBatchError>,
    F: Fn(&mut ZipArchive<UnifiedReader>, bool) -> Result<Vec<CellType>, RustyBatchError>,
{
    if is_compound_document(&mut reader)? {
        Err(SpreadsheetError::CompoundDocumentError(file_name.to_owned()))?;
    }

    let mut zip = ZipArchive::new(reader)?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    if sheets.is_empty() {
        Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
    }

    let number_formats = load_number_formats(&mut zip, is_1904)?;
    Ok((zip, number_formats, sheets))
}

/// Loads worksheet relationships, mapping relationship IDs to worksheet paths
pub(super) fn load_relationships(
    zip: &mut ZipArchive<UnifiedReader>,
    path: &str,
) -> Result<HashMap<String, String>, RustyBatchError> {
    let mut reader = zip.xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_string()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Only process worksheet relationships
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Maps cell format indexes to cell types using custom and built-in number formats
pub(super) fn load_number_formats(
    format_indexes: Vec<String>,
    custom_formats: HashMap<String, CellType>,
    is_1904: bool,
) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Normalizes a relationship target to a path inside the package
pub(crate) fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Checks for an OLE compound document header, which a ZIP reader cannot open
fn is_compound_document(reader: &mut UnifiedReader) -> Result<bool, RustyBatchError> {
    let mut signature = [0u8; 8];
    let mut length = 0usize;
    while length < signature.len() {
        let count = reader.read(&mut signature[length..])?;
        if count == 0 {
            break;
        }
        length += count;
    }
    reader.seek(SeekFrom::Start(0))?;
    Ok(length == signature.len() && signature == COMPOUND_DOCUMENT_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_relationship_targets() {
        assert_eq!(to_zip_path(Cow::Borrowed("worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path(Cow::Borrowed("/xl/worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path(Cow::Borrowed("xl/worksheets/sheet2.xml")), "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn custom_formats_override_builtin_ones() {
        let mut custom_formats = HashMap::new();
        custom_formats.insert("164".to_owned(), CellType::NumberDate1900);
        let formats = load_number_formats(
            vec!["0".to_owned(), "14".to_owned(), "164".to_owned()],
            custom_formats,
            false,
        );
        assert_eq!(formats, vec![CellType::Number, CellType::NumberDate1900, CellType::NumberDate1900]);
    }

    #[test]
    fn detects_compound_documents() {
        let mut bytes = COMPOUND_DOCUMENT_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        let mut reader = UnifiedReader::from_bytes(bytes);
        assert!(is_compound_document(&mut reader).unwrap());

        let mut reader = UnifiedReader::from_bytes(b"PK\x03\x04".to_vec());
        assert!(!is_compound_document(&mut reader).unwrap());
    }
}

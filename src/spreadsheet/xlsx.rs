use crate::error::ResultMessage;
use crate::error::RustyBatchError;
use crate::helpers::reader::UnifiedReader;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::reference::shift_formula;
use crate::spreadsheet::CellValue;
use crate::spreadsheet::FormulaMap;
use crate::spreadsheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufReader;
use tracing::debug;
use zip::read::ZipFile;
use zip::ZipArchive;

// XML tag names for parsing Excel XLSX format
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");  // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");         // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");   // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");       // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                  // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr"); // Workbook properties
const TAG_SHEET: QName = QName(b"sheet");             // Worksheet definition
const TAG_ROW: QName = QName(b"row");                 // Row in worksheet
const TAG_CELL: QName = QName(b"c");                  // Cell in worksheet
const TAG_INLINE_STRING: QName = QName(b"is");        // Inline string value
const TAG_VALUE: QName = QName(b"v");                 // Cell value content
const TAG_FORMULA: QName = QName(b"f");               // Cell formula

/// An Excel XLSX/XLSM workbook
pub(crate) struct XlsxSpreadsheet {
    /// File name of the workbook
    pub(crate) name: String,
    /// ZIP archive containing the package parts
    zip: ZipArchive<UnifiedReader>,
    /// Parsed number formats for cell type detection, indexed by style ID
    number_formats: Vec<CellType>,
    /// Worksheets as (name, zip_path) pairs in workbook order
    sheets: Vec<(String, String)>,
}

impl XlsxSpreadsheet {
    /// Opens a workbook and parses its structure
    pub(crate) fn open(file_name: &str, reader: UnifiedReader) -> Result<XlsxSpreadsheet, RustyBatchError> {
        let (zip, number_formats, sheets) =
            excel::open(file_name, reader, load_workbook, load_number_formats).with_prefix(file_name)?;
        Ok(XlsxSpreadsheet {
            name: file_name.to_owned(),
            zip,
            number_formats,
            sheets,
        })
    }

    /// Loads the whole shared string table
    fn load_shared_strings(&mut self) -> Result<Vec<String>, RustyBatchError> {
        let mut shared_strings = Vec::<String>::new();
        let mut reader = match self.zip.xml_reader("xl/sharedStrings.xml")? {
            Some(reader) => reader,
            None => return Ok(shared_strings),
        };

        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
                let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
                shared_strings.push(string);
            }
        });
        Ok(shared_strings)
    }

    /// Reads one worksheet part into a dense grid plus its formulas
    fn read_sheet(&mut self, sheet_name: &str, zip_path: &str, shared_strings: &[String]) -> Result<Sheet, RustyBatchError> {
        let mut cells = Vec::<Cell>::new();
        let mut formulas = FormulaMap::new();
        // Master formula of each shared group: si -> (formula, row, col)
        let mut shared_formulas = HashMap::<String, (String, usize, usize)>::new();

        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut formula = String::new();
        let mut reader = self.zip.xml_reader(zip_path)?
            .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_ROW => {
                if let Some(number) = event.get_attribute_value("r")? {
                    row_count = number.parse::<usize>()?.saturating_sub(1);
                }
                col_count = 0;
            }
            Event::End(event) if event.name() == TAG_ROW => {
                row_count += 1;
                col_count = 0;
            }
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                value.clear();
                formula.clear();
                kind = event.get_attribute_value("t")?.map(|t| {
                    match t.as_ref() {
                        "inlineStr" | "str" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                if let Some(format_id) = event.get_attribute_value("s")? {
                    if kind == CellType::Number && !format_id.is_empty() {
                        let index = format_id.parse::<usize>()?;
                        kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
            }
            Event::Start(event) if event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::Start(event) if event.name() == TAG_FORMULA => {
                let formula_type = event.get_attribute_value("t")?.map(Cow::into_owned);
                let shared_index = event.get_attribute_value("si")?.map(Cow::into_owned);
                let text = read_string_value(&mut reader, TAG_FORMULA, true)?;
                formula = match (formula_type.as_deref(), shared_index) {
                    (Some("shared"), Some(index)) if text.is_empty() => {
                        match shared_formulas.get(&index) {
                            Some((master, master_row, master_col)) => {
                                let row_shift = row as isize - *master_row as isize;
                                let col_shift = col as isize - *master_col as isize;
                                shift_formula(master, row_shift, col_shift)
                            }
                            None => {
                                debug!(sheet = sheet_name, cell = %index_to_reference(row, col), "shared formula without master");
                                String::new()
                            }
                        }
                    }
                    (Some("shared"), Some(index)) => {
                        shared_formulas.insert(index, (text.to_owned(), row, col));
                        text
                    }
                    _ => text,
                };
            }
            Event::End(event) if event.name() == TAG_CELL => {
                if !formula.is_empty() {
                    formulas.insert(&index_to_reference(row, col), &format!("={}", formula));
                }
                if !value.is_empty() {
                    cells.push(Cell {
                        row,
                        col,
                        kind,
                        value: value.to_owned(),
                    });
                }
            }
        });

        // rows are ragged: each one only reaches its own last filled column
        let height = cells.iter().map(|cell| cell.row + 1).max().unwrap_or(0);
        let mut rows = vec![Vec::<CellValue>::new(); height];
        for cell in &cells {
            let row = &mut rows[cell.row];
            if row.len() <= cell.col {
                row.resize(cell.col + 1, CellValue::Empty);
            }
            row[cell.col] = cell.to_value(shared_strings)?;
        }
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        debug!(sheet = sheet_name, rows = height, cols = width, formulas = formulas.len(), "read worksheet");
        Ok(Sheet::new(sheet_name, rows, formulas))
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Reads the worksheets accepted by `criteria`, honouring the sheet limit
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, RustyBatchError> {
        let shared_strings = self.load_shared_strings().with_prefix(&self.name)?;
        let selected: Vec<(String, String)> = self.sheets
            .iter()
            .filter(|(sheet_name, _)| criteria.accept(sheet_name))
            .take(criteria.sheet_limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        let mut sheets = Vec::<Sheet>::with_capacity(selected.len());
        for (sheet_name, zip_path) in &selected {
            let sheet = self.read_sheet(sheet_name, zip_path, &shared_strings)
                .with_prefix(&format!("{} [{}]", self.name, sheet_name))?;
            sheets.push(sheet);
        }
        Ok(sheets)
    }
}

/// Loads worksheet names and paths from `xl/workbook.xml` and whether the 1904 date system is used
fn load_workbook(zip: &mut ZipArchive<UnifiedReader>) -> Result<(Vec<(String, String)>, bool), RustyBatchError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::FileError("xl/workbook.xml".to_string()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.unescape_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.unescape_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads number formats and cell style indexes from `xl/styles.xml`
fn load_number_formats(zip: &mut ZipArchive<UnifiedReader>, is_1904: bool) -> Result<Vec<CellType>, RustyBatchError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();

    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }

        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => {
            // cellXfs follows numFmts, nothing else is needed
            break;
        }
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.unwrap_or(Cow::Borrowed("0"));
            format_indexes.push(id.to_string());
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

/// Reads string value from XML content, handling text and CDATA sections
///
/// Skips phonetic text annotations. With `is_text_content` the element's own text is
/// the value (`<v>`, `<f>`), otherwise only `<t>` runs count (`<si>`, `<is>`).
fn read_string_value(
    reader: &mut XmlReader<BufReader<ZipFile<'_, UnifiedReader>>>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, RustyBatchError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

use crate::error::RustyBatchError;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::CellValue;
use crate::spreadsheet::SpreadsheetError;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::TimeDelta;

/// Types of cell data in worksheet parts.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values (true/false)
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// Inline string values and cached formula strings
    InlineString,
    /// Shared string table references
    SharedString,
    /// Error values (`#REF!`, `#N/A`, ...)
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Analyzes format codes for date/time patterns.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_color = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_escaped => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_literal && !is_color => is_literal = true,

                ']' if is_color => is_color = false,
                '[' if !is_color && !is_literal => is_color = true,
                _ if is_literal || is_color => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// A raw cell read from a worksheet part, before shared strings and dates are resolved.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    /// Cell data type
    pub(crate) kind: CellType,
    /// Raw `<v>` / `<is>` text
    pub(crate) value: String,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Decodes the raw text into a typed value.
    ///
    /// Numbers and date serials that fail to parse, or fall outside the calendar, are kept
    /// as text rather than failing the sheet.
    pub(crate) fn to_value(&self, shared_strings: &[String]) -> Result<CellValue, RustyBatchError> {
        let value = match self.kind {
            CellType::Empty | CellType::Error => CellValue::Empty,
            CellType::Boolean => CellValue::Bool(self.value == "1" || self.value.eq_ignore_ascii_case("true")),
            CellType::Number => match self.value.trim().parse::<f64>() {
                Ok(number) => CellValue::Number(number),
                Err(_) => CellValue::Text(self.value.to_owned()),
            },
            CellType::NumberDate1900 | CellType::NumberDate1904 => {
                let is_1904 = self.kind == CellType::NumberDate1904;
                to_date(&self.value, is_1904).map_or_else(|| self.as_text(), CellValue::Date)
            }
            CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => {
                let is_1904 = self.kind == CellType::NumberDateTime1904;
                to_datetime(&self.value, is_1904).map_or_else(|| self.as_text(), CellValue::DateTime)
            }
            CellType::NumberTime1900 | CellType::NumberTime1904 => {
                to_time_string(&self.value).map_or_else(|| self.as_text(), CellValue::Text)
            }
            CellType::IsoDateTime => parse_iso_datetime(&self.value),
            CellType::InlineString => CellValue::Text(self.value.to_owned()),
            CellType::SharedString => {
                let index = self.value.trim().parse::<usize>()?;
                let text = shared_strings
                    .get(index)
                    .ok_or_else(|| SpreadsheetError::SharedStringError(self.reference(), index))?;
                CellValue::Text(text.to_owned())
            }
        };
        Ok(value)
    }

    fn as_text(&self) -> CellValue {
        CellValue::Text(self.value.to_owned())
    }
}

/// Parses a serial number, rejecting NaN and infinities
fn to_serial(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|serial| serial.is_finite())
}

/// Converts Excel numeric date to a calendar date.
/// Handles Lotus 1-2-3 leap year bug for 1900 epoch.
/// Returns `None` when the serial is not a number or lies outside chrono's date range.
fn to_date(value: &str, is_1904: bool) -> Option<NaiveDate> {
    let days = to_serial(value)?.trunc() as i64; // Handle Lotus 1-2-3 leap year bug
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let duration = TimeDelta::try_days(days.checked_add(offset)?)?;
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("NaiveDate Literal").checked_add_signed(duration)
}

/// Converts Excel numeric datetime to a timestamp, rounded to the second.
fn to_datetime(value: &str, is_1904: bool) -> Option<NaiveDateTime> {
    let serial = to_serial(value)?;
    let date = to_date(value, is_1904)?;
    let seconds = TimeDelta::try_seconds((serial.fract() * 86_400f64).round() as i64)?;
    date.and_hms_opt(0, 0, 0).expect("Append 00:00:00").checked_add_signed(seconds)
}

/// Converts Excel numeric time to ISO time string.
fn to_time_string(value: &str) -> Option<String> {
    let factor = to_serial(value)?.fract();
    let mut seconds = (factor * 86_400f64).round() as i64;
    let hours = seconds / 3_600;
    seconds %= 3_600;
    let minutes = seconds / 60;
    seconds %= 60;
    Some(format!("{hours:02}:{minutes:02}:{seconds:02}"))
}

fn parse_iso_datetime(value: &str) -> CellValue {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        CellValue::DateTime(datetime)
    } else if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        CellValue::Date(date)
    } else {
        CellValue::Text(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell {
            row: 2,
            col: 1,
            kind,
            value: value.to_owned(),
        }
    }

    #[test]
    fn detects_date_and_time_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("d/m/yy h:mm", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("hh:mm:ss", false), CellType::NumberTime1900);
        assert_eq!(CellType::parse_custom_number_format("0.00\" kg\"", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("[Red]0.0", false), CellType::Number);
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("2", false), None);
    }

    #[test]
    fn decodes_serial_dates_in_both_epochs() {
        let date = cell(CellType::NumberDate1900, "45351").to_value(&[]).unwrap();
        assert_eq!(date, CellValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        let date = cell(CellType::NumberDate1904, "0").to_value(&[]).unwrap();
        assert_eq!(date, CellValue::Date(NaiveDate::from_ymd_opt(1904, 1, 1).unwrap()));
        let date = cell(CellType::NumberDate1900, "1").to_value(&[]).unwrap();
        assert_eq!(date, CellValue::Date(NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()));
    }

    #[test]
    fn decodes_serial_datetimes_and_times() {
        let datetime = cell(CellType::NumberDateTime1900, "45351.5").to_value(&[]).unwrap();
        assert_eq!(datetime.to_text(), "2024-02-29 12:00:00");
        let time = cell(CellType::NumberTime1900, "0.75").to_value(&[]).unwrap();
        assert_eq!(time.to_text(), "18:00:00");
    }

    #[test]
    fn out_of_range_serials_stay_text() {
        assert_eq!(cell(CellType::NumberDate1900, "1e12").to_value(&[]).unwrap(), CellValue::Text("1e12".to_owned()));
        assert_eq!(cell(CellType::NumberDate1904, "-1e300").to_value(&[]).unwrap(), CellValue::Text("-1e300".to_owned()));
        assert_eq!(cell(CellType::NumberDateTime1900, "1e12").to_value(&[]).unwrap(), CellValue::Text("1e12".to_owned()));
        assert_eq!(cell(CellType::NumberDateTime1900, "NaN").to_value(&[]).unwrap(), CellValue::Text("NaN".to_owned()));
        assert_eq!(cell(CellType::NumberTime1900, "soon").to_value(&[]).unwrap(), CellValue::Text("soon".to_owned()));
    }

    #[test]
    fn resolves_shared_strings() {
        let strings = vec!["Step".to_owned(), "Action".to_owned()];
        assert_eq!(
            cell(CellType::SharedString, "1").to_value(&strings).unwrap(),
            CellValue::Text("Action".to_owned())
        );
        let error = cell(CellType::SharedString, "7").to_value(&strings).unwrap_err();
        assert_eq!(error.to_string(), "Shared string #7 referenced at B3 does not exist");
    }

    #[test]
    fn keeps_unparseable_numbers_as_text() {
        assert_eq!(cell(CellType::Number, "1.0").to_value(&[]).unwrap(), CellValue::Number(1.0));
        assert_eq!(cell(CellType::Number, "n/a").to_value(&[]).unwrap(), CellValue::Text("n/a".to_owned()));
        assert_eq!(cell(CellType::Error, "#REF!").to_value(&[]).unwrap(), CellValue::Empty);
        assert_eq!(cell(CellType::Boolean, "1").to_value(&[]).unwrap(), CellValue::Bool(true));
    }
}

use crate::emit::record::RecordSet;
use chrono::NaiveDate;
use serde::Serialize;

/// SQL column types inferred from record values.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SqlType {
    /// Whole numbers
    Int,
    /// Numbers with a fraction
    Decimal,
    /// ISO dates (`YYYY-MM-DD`)
    Date,
    /// Anything else
    Varchar,
}

impl SqlType {
    /// Returns the column type as written in `CREATE TABLE`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SqlType::Int => "INT",
            SqlType::Decimal => "DECIMAL(10, 2)",
            SqlType::Date => "DATE",
            SqlType::Varchar => "VARCHAR(255)",
        }
    }

    /// Infers the type of a single value, `None` for blanks.
    pub fn from_value(value: &str) -> Option<SqlType> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else if let Some(number) = parse_number(value) {
            if Self::is_integer(value) && number.abs() < i64::MAX as f64 {
                Some(SqlType::Int)
            } else {
                Some(SqlType::Decimal)
            }
        } else if parse_date(value).is_some() {
            Some(SqlType::Date)
        } else {
            Some(SqlType::Varchar)
        }
    }

    /// Checks if a numeric string represents an integer value.
    /// Returns true if the decimal part contains only zeros or no decimal point.
    fn is_integer(value: &str) -> bool {
        match value.find('.') {
            Some(index) => value[(index + 1)..].chars().all(|char| char == '0'),
            None => !value.contains(['e', 'E']),
        }
    }

    /// Detects the most specific common type of a column.
    /// Falls back to VARCHAR if types are inconsistent or empty.
    pub fn detect(types: Vec<Option<SqlType>>) -> SqlType {
        let types: Vec<SqlType> = types.into_iter().flatten().collect();
        if types.is_empty() {
            SqlType::Varchar
        } else if types.iter().all(SqlType::is_int) {
            SqlType::Int
        } else if types.iter().all(SqlType::is_numeric) {
            SqlType::Decimal
        } else if types.iter().all(|kind| *kind == SqlType::Date) {
            SqlType::Date
        } else {
            SqlType::Varchar
        }
    }

    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, SqlType::Int)
    }

    /// Returns true for integer and decimal columns.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Int | SqlType::Decimal)
    }

    /// Renders a value as a SQL literal of this type.
    ///
    /// Blanks are `NULL`; a non-numeric value in a numeric column is quoted; an unparseable
    /// date is `NULL`.
    pub fn literal(&self, value: &str) -> String {
        let value = value.trim();
        if value.is_empty() {
            return "NULL".to_owned();
        }
        match self {
            SqlType::Int => match parse_number(value) {
                Some(number) if Self::is_integer(value) => format!("{}", number as i64),
                Some(_) => value.to_owned(),
                None => quote(value),
            },
            SqlType::Decimal => match parse_number(value) {
                Some(_) => value.to_owned(),
                None => quote(value),
            },
            SqlType::Date => match parse_date(value) {
                Some(date) => format!("'{}'", date.format("%Y-%m-%d")),
                None => "NULL".to_owned(),
            },
            SqlType::Varchar => quote(value),
        }
    }
}

/// A finite number written without leading zeros; `007` is an identifier, not a number.
fn parse_number(value: &str) -> Option<f64> {
    let digits = value.strip_prefix('-').unwrap_or(value);
    let is_padded = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");
    if is_padded || !digits.starts_with(|char: char| char.is_ascii_digit()) {
        return None;
    }
    value.parse::<f64>().ok().filter(|number| number.is_finite())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Single-quotes a text literal, doubling embedded quotes
pub fn quote(value: &str) -> String {
    format!("'{}'", value.trim().replace('\'', "''"))
}

/// `CREATE TABLE` and `INSERT` statements of one record set
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SqlPair {
    pub create: String,
    pub insert: String,
}

impl SqlPair {
    /// Generates the statements; a record set without rows yields empty texts.
    pub fn from_records(records: &RecordSet) -> SqlPair {
        if records.rows.is_empty() {
            return SqlPair::default();
        }
        let types: Vec<SqlType> = records
            .headers
            .iter()
            .map(|header| {
                SqlType::detect(
                    records
                        .rows
                        .iter()
                        .map(|row| row.get(header).and_then(|value| SqlType::from_value(value)))
                        .collect(),
                )
            })
            .collect();

        let columns: Vec<String> = records
            .headers
            .iter()
            .zip(&types)
            .map(|(header, kind)| format!("  {} {}", header, kind.as_str()))
            .collect();
        let create = format!("CREATE TABLE {} (\n{}\n);", records.table, columns.join(",\n"));

        let names = records.headers.join(", ");
        let insert = records
            .rows
            .iter()
            .map(|row| {
                let values: Vec<String> = records
                    .headers
                    .iter()
                    .zip(&types)
                    .map(|(header, kind)| kind.literal(row.get(header).map(String::as_str).unwrap_or("")))
                    .collect();
                format!("INSERT INTO {} ({}) VALUES ({});", records.table, names, values.join(", "))
            })
            .collect::<Vec<String>>()
            .join("\n");
        SqlPair { create, insert }
    }
}

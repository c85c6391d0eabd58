//! Tabular record parsing – turns delimited roster text into [`Record`]s.
//!
//! The format is deliberately simple: one header line, one record per line,
//! fields separated by a single delimiter and trimmed. Quoting and escaping
//! are not supported, so a value containing the delimiter splits into two
//! fields.

use serde::{Deserialize, Serialize};

use crate::document::DOCUMENT_EXTENSION;
use crate::error::ParseError;

/// Course text used when a row carries none.
pub const DEFAULT_COURSE: &str = "Sou. Venutai Chavan Polytechnic";

/// Raw delimited text, read fully into memory and not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub text: String,
    pub delimiter: char,
}

impl RawTable {
    /// Comma-separated table.
    pub fn csv(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            delimiter: ',',
        }
    }

    fn lines(&self) -> std::str::Split<'_, char> {
        self.text.split('\n')
    }

    fn split_fields<'a>(&self, line: &'a str) -> Vec<&'a str> {
        line.split(self.delimiter).map(str::trim).collect()
    }
}

/// Which columns feed the certificate fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Header of the column holding the person's name (exact, case-sensitive).
    pub name_column: String,
    /// Header of the column holding the course, if any.
    pub course_column: Option<String>,
    /// Course used when the row has no course value.
    pub default_course: String,
}

impl ColumnMapping {
    pub fn new(name_column: impl Into<String>) -> Self {
        Self {
            name_column: name_column.into(),
            course_column: None,
            default_course: DEFAULT_COURSE.to_string(),
        }
    }

    pub fn with_course_column(mut self, column: impl Into<String>) -> Self {
        self.course_column = Some(column.into());
        self
    }

    pub fn with_default_course(mut self, course: impl Into<String>) -> Self {
        self.default_course = course.into();
        self
    }

    /// Guess a mapping from the header line.
    ///
    /// The name column is the header spelled `name` (any case), otherwise the
    /// first header. The course column is the header spelled `course` (any
    /// case), if present. Returns `None` when the table has no headers.
    pub fn detect(table: &RawTable, default_course: impl Into<String>) -> Option<Self> {
        let headers = read_headers(table);
        let name_column = headers
            .iter()
            .find(|h| h.eq_ignore_ascii_case("name"))
            .or_else(|| headers.first())?
            .clone();
        let course_column = headers
            .iter()
            .find(|h| h.eq_ignore_ascii_case("course"))
            .cloned();

        Some(Self {
            name_column,
            course_column,
            default_course: default_course.into(),
        })
    }
}

/// One person to issue a certificate for.
///
/// Deserialization goes through [`Record::new`], so a blank name is
/// rejected there too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RecordFields")]
pub struct Record {
    name: String,
    course: String,
}

#[derive(Deserialize)]
struct RecordFields {
    name: String,
    #[serde(default)]
    course: String,
}

impl TryFrom<RecordFields> for Record {
    type Error = String;

    fn try_from(fields: RecordFields) -> Result<Self, Self::Error> {
        Record::new(&fields.name, &fields.course).ok_or_else(|| "name must not be blank".to_string())
    }
}

impl Record {
    /// Build a record from untrimmed values. Returns `None` for a blank name.
    pub fn new(name: &str, course: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            course: course.trim().to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn course(&self) -> &str {
        &self.course
    }

    /// File name of this record's document, e.g. `Asha Rao-certificate.pdf`.
    pub fn file_name(&self) -> String {
        format!("{}-certificate.{}", self.name, DOCUMENT_EXTENSION)
    }
}

/// Trimmed, non-empty header fields of the first line.
pub fn read_headers(table: &RawTable) -> Vec<String> {
    table
        .lines()
        .next()
        .map(|line| {
            table
                .split_fields(line)
                .into_iter()
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse `table` into records using `mapping`.
///
/// Blank lines, rows too short to reach the name column and rows with an
/// empty name are skipped. A missing or empty course value falls back to
/// `mapping.default_course`.
pub fn parse(table: &RawTable, mapping: &ColumnMapping) -> Result<Vec<Record>, ParseError> {
    let mut lines = table.lines();
    let headers = lines
        .next()
        .map(|line| table.split_fields(line))
        .unwrap_or_default();

    let name_index = headers
        .iter()
        .position(|h| *h == mapping.name_column)
        .ok_or_else(|| ParseError::MissingColumn {
            column: mapping.name_column.clone(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
        })?;

    let course_index = mapping
        .course_column
        .as_deref()
        .and_then(|column| headers.iter().position(|h| *h == column));

    let mut records = Vec::new();
    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let values = table.split_fields(line);
        let Some(name) = values.get(name_index) else {
            log::debug!("Skipping row {}: too few fields", line_no + 2);
            continue;
        };

        let course = course_index
            .and_then(|i| values.get(i))
            .filter(|c| !c.is_empty())
            .copied()
            .unwrap_or(mapping.default_course.as_str());

        match Record::new(name, course) {
            Some(record) => records.push(record),
            None => log::debug!("Skipping row {}: empty name", line_no + 2),
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> ColumnMapping {
        ColumnMapping::new("name")
            .with_course_column("course")
            .with_default_course("General")
    }

    #[test]
    fn missing_name_column_is_an_error() {
        let table = RawTable::csv("student,course\nAsha,Diploma\n");
        let err = parse(&table, &mapping()).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingColumn {
                column: "name".to_string(),
                headers: vec!["student".to_string(), "course".to_string()],
            }
        );
        assert_eq!(err.to_string(), "Column \"name\" not found in CSV");
    }

    #[test]
    fn header_match_is_case_sensitive() {
        let table = RawTable::csv("Name\nAsha\n");
        assert!(parse(&table, &ColumnMapping::new("name")).is_err());
    }

    #[test]
    fn empty_input_has_no_name_column() {
        assert!(parse(&RawTable::csv(""), &mapping()).is_err());
    }

    #[test]
    fn values_are_trimmed() {
        let table = RawTable::csv(" name , course \r\n  Asha Rao  ,  Diploma \r\n");
        let records = parse(&table, &mapping()).unwrap();
        assert_eq!(records, vec![Record::new("Asha Rao", "Diploma").unwrap()]);
    }

    #[test]
    fn skips_blank_short_and_nameless_rows() {
        let table = RawTable::csv("id,name,course\n1,Asha,X\n\n   \n2\n3,,Y\n4,Bilal\n");
        let records = parse(&table, &mapping()).unwrap();
        let names: Vec<_> = records.iter().map(Record::name).collect();
        assert_eq!(names, ["Asha", "Bilal"]);
        // short row that still reaches the name column takes the default
        assert_eq!(records[1].course(), "General");
    }

    #[test]
    fn unconfigured_course_uses_default() {
        let table = RawTable::csv("name,course\nAsha,Diploma\nBilal,Degree\n");
        let records = parse(&table, &ColumnMapping::new("name")).unwrap();
        assert!(records.iter().all(|r| r.course() == DEFAULT_COURSE));
    }

    #[test]
    fn course_column_absent_from_header_uses_default() {
        let table = RawTable::csv("name\nAsha\n");
        let records = parse(&table, &mapping()).unwrap();
        assert_eq!(records[0].course(), "General");
    }

    #[test]
    fn custom_delimiter() {
        let table = RawTable {
            text: "name;course\nAsha;Diploma".to_string(),
            delimiter: ';',
        };
        let records = parse(&table, &mapping()).unwrap();
        assert_eq!(records[0].course(), "Diploma");
    }

    #[test]
    fn quoted_values_are_not_unescaped() {
        let table = RawTable::csv("name,course\n\"Rao, Asha\",Diploma\n");
        let records = parse(&table, &mapping()).unwrap();
        assert_eq!(records[0].name(), "\"Rao");
        assert_eq!(records[0].course(), "Asha\"");
    }

    #[test]
    fn detect_prefers_named_columns() {
        let table = RawTable::csv("id, NAME ,Course\n1,Asha,X\n");
        let mapping = ColumnMapping::detect(&table, "General").unwrap();
        assert_eq!(mapping.name_column, "NAME");
        assert_eq!(mapping.course_column.as_deref(), Some("Course"));
    }

    #[test]
    fn detect_falls_back_to_first_header() {
        let table = RawTable::csv(",student,grade\n");
        let mapping = ColumnMapping::detect(&table, "General").unwrap();
        assert_eq!(mapping.name_column, "student");
        assert_eq!(mapping.course_column, None);
        assert!(ColumnMapping::detect(&RawTable::csv(" , \n"), "General").is_none());
    }

    #[test]
    fn record_rejects_blank_name() {
        assert!(Record::new("   ", "X").is_none());
        assert_eq!(Record::new("Sam", "X").unwrap().file_name(), "Sam-certificate.pdf");
    }

    #[test]
    fn deserialized_record_rejects_blank_name() {
        let err = serde_json::from_str::<Record>(r#"{"name":"   ","course":"X"}"#).unwrap_err();
        assert!(err.to_string().contains("name must not be blank"), "{err}");

        let record: Record = serde_json::from_str(r#"{"name":"  Asha ","course":" Diploma "}"#).unwrap();
        assert_eq!(record, Record::new("Asha", "Diploma").unwrap());
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"name":"Asha","course":"Diploma"}"#);
    }
}

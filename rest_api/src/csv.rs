// rest_api/src/csv.rs

//! CSV codec for bulk import and export of patient records.
//!
//! Imports are header-driven and tolerant of the column spellings seen in
//! exported spreadsheets (`name` or `Name`, `department` or `Dept`, and
//! so on). Exports quote any field containing a delimiter, quote, or
//! line break.

use models::{patient::DEFAULT_STATUS, NewPatient, Patient, ValidationError, ValidationResult};

/// Column order of exported files.
pub const EXPORT_HEADER: &str =
    "id,name,age,gender,department,phone,address,notes,admission_date,status";

/// Splits raw CSV text into records, honoring quoted fields.
///
/// Quotes may enclose delimiters and line breaks, and a doubled quote
/// inside a quoted field is an escaped quote. Line endings may be `\n`
/// or `\r\n`.
fn parse_records(data: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = data.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => record.push(std::mem::take(&mut field)),
                '\n' => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                '\r' => {}
                _ => field.push(c),
            }
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

/// A data row paired with the header row it was parsed under.
struct RowView<'a> {
    headers: &'a [String],
    fields: &'a [String],
}

impl<'a> RowView<'a> {
    /// First non-empty value among the given column names.
    fn first(&self, names: &[&str]) -> Option<&'a str> {
        for name in names {
            if let Some(position) = self.headers.iter().position(|h| h == name) {
                if let Some(value) = self.fields.get(position) {
                    if !value.is_empty() {
                        return Some(value.as_str());
                    }
                }
            }
        }
        None
    }
}

/// Maps uploaded CSV text into creation payloads.
///
/// The first record is the header row. Rows without a name are dropped
/// silently; a row with an unreadable age fails the whole upload, so
/// nothing is half-imported.
pub fn parse_patients(data: &str) -> ValidationResult<Vec<NewPatient>> {
    let mut records = parse_records(data).into_iter();
    let headers = match records.next() {
        Some(headers) => headers,
        None => return Ok(Vec::new()),
    };

    let mut patients = Vec::new();
    for (index, fields) in records.enumerate() {
        let row = RowView {
            headers: &headers,
            fields: &fields,
        };
        let name = match row.first(&["name", "Name"]) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let age = match row.first(&["age", "Age"]) {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                ValidationError::CsvRow(index + 1, format!("unreadable age '{}'", raw))
            })?,
            None => 0,
        };
        patients.push(NewPatient {
            name,
            age,
            gender: row.first(&["gender", "Gender"]).unwrap_or("").to_string(),
            department: row.first(&["department", "Dept"]).unwrap_or("").to_string(),
            phone: row.first(&["phone", "Phone"]).unwrap_or("").to_string(),
            address: row.first(&["address"]).unwrap_or("").to_string(),
            notes: row.first(&["notes"]).unwrap_or("").to_string(),
            status: row
                .first(&["status", "Status"])
                .unwrap_or(DEFAULT_STATUS)
                .to_string(),
        });
    }
    Ok(patients)
}

/// Quotes a field when it contains a delimiter, quote, or line break.
/// Embedded quotes are doubled.
fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Renders records as CSV in the fixed export column order, dates in
/// RFC 3339.
pub fn export_patients(patients: &[Patient]) -> String {
    let mut out = String::with_capacity(64 * (patients.len() + 1));
    out.push_str(EXPORT_HEADER);
    out.push('\n');
    for patient in patients {
        let row = [
            patient.id.to_string(),
            escape(&patient.name),
            patient.age.to_string(),
            escape(&patient.gender),
            escape(&patient.department),
            escape(&patient.phone),
            escape(&patient.address),
            escape(&patient.notes),
            patient.admission_date.to_rfc3339(),
            escape(&patient.status),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

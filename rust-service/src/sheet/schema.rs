//! Header-row schema resolution for the subscriber sheet.
//!
//! Column positions are not fixed; they are resolved once per invocation
//! from the live header row, matched case-insensitively by name. A missing
//! required column is a single well-defined failure point instead of a
//! string lookup scattered through the workflow.

use std::collections::HashMap;

use thiserror::Error;

/// Required column absent from the sheet's header row.
#[derive(Debug, Error)]
#[error("required column {0:?} not found in sheet header")]
pub struct MissingColumn(pub String);

/// Zero-based column indices resolved from the header row.
#[derive(Debug, Clone)]
pub struct SheetSchema {
    pub email: usize,
    pub marker: usize,
    pub status: Option<usize>,
    pub date: Option<usize>,
    /// Number of header cells, used to size appended rows
    pub width: usize,
}

impl SheetSchema {
    /// Resolve the schema from a header row.
    ///
    /// `email` and the send-marker column are required; the status and date
    /// columns are optional (rows without a status are simply ineligible).
    pub fn resolve(
        headers: &[String],
        marker_column: &str,
        status_column: &str,
    ) -> Result<Self, MissingColumn> {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            // First occurrence wins on duplicate headers
            by_name
                .entry(header.trim().to_lowercase())
                .or_insert(index);
        }

        let email = *by_name
            .get("email")
            .ok_or_else(|| MissingColumn("email".to_string()))?;

        let marker = *by_name
            .get(&marker_column.to_lowercase())
            .ok_or_else(|| MissingColumn(marker_column.to_string()))?;

        Ok(SheetSchema {
            email,
            marker,
            status: by_name.get(&status_column.to_lowercase()).copied(),
            date: by_name.get("date").copied(),
            width: headers.len(),
        })
    }

    /// Fetch a cell from a data row, tolerating short rows.
    pub fn cell<'a>(row: &'a [String], index: usize) -> Option<&'a str> {
        row.get(index).map(|s| s.as_str())
    }
}

/// Convert a zero-based column index to its A1-notation letter(s).
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index;
    loop {
        letters.push(b'A' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let schema = SheetSchema::resolve(
            &headers(&["Email", "Date", "Verification", "LearnCode"]),
            "learncode",
            "verification",
        )
        .unwrap();

        assert_eq!(schema.email, 0);
        assert_eq!(schema.date, Some(1));
        assert_eq!(schema.status, Some(2));
        assert_eq!(schema.marker, 3);
        assert_eq!(schema.width, 4);
    }

    #[test]
    fn test_resolve_missing_email_column() {
        let err = SheetSchema::resolve(&headers(&["name", "learncode"]), "learncode", "verification")
            .unwrap_err();
        assert_eq!(err.0, "email");
    }

    #[test]
    fn test_resolve_missing_marker_column() {
        let err = SheetSchema::resolve(&headers(&["email", "date"]), "learncode", "verification")
            .unwrap_err();
        assert_eq!(err.0, "learncode");
    }

    #[test]
    fn test_resolve_without_status_column() {
        let schema =
            SheetSchema::resolve(&headers(&["email", "learncode"]), "learncode", "verification")
                .unwrap();
        assert!(schema.status.is_none());
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(3), "D");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(52), "BA");
    }
}

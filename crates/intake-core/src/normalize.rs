use crate::csv_decode::DecodedRow;
use crate::error::ValidationError;
use crate::model::{NewRawRequest, REQUEST_STATUS_RANGE, REQUEST_TYPE_RANGE};

pub const REQUEST_TYPE_HEADER: &str = "RequestType";
pub const REQUEST_STATUS_HEADER: &str = "RequestStatus";
pub const REQUEST_DATA_HEADER: &str = "RequestData";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Reject missing or out-of-range discriminators and statuses here
    /// instead of leaving them for the staging table's constraints.
    pub strict: bool,
}

pub fn normalize_rows(
    rows: &[DecodedRow],
    options: NormalizeOptions,
) -> Result<Vec<NewRawRequest>, ValidationError> {
    rows.iter().map(|row| normalize_row(row, options)).collect()
}

/// Maps a decoded row onto the staging shape. The payload is carried as-is;
/// it is only parsed when the record is dispatched.
pub fn normalize_row(
    row: &DecodedRow,
    options: NormalizeOptions,
) -> Result<NewRawRequest, ValidationError> {
    let line = row.line();
    let request_type = parse_integer(row, REQUEST_TYPE_HEADER)?;
    let request_status = parse_integer(row, REQUEST_STATUS_HEADER)?;
    let request_data = row
        .get(REQUEST_DATA_HEADER)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string);

    if options.strict {
        check_range(line, REQUEST_TYPE_HEADER, request_type, REQUEST_TYPE_RANGE.into_inner())?;
        check_range(
            line,
            REQUEST_STATUS_HEADER,
            request_status,
            REQUEST_STATUS_RANGE.into_inner(),
        )?;
    }

    Ok(NewRawRequest {
        line,
        request_type,
        request_status,
        request_data,
    })
}

fn parse_integer(row: &DecodedRow, field: &'static str) -> Result<Option<i32>, ValidationError> {
    let Some(raw) = row.get(field).map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };

    raw.parse::<i32>()
        .map(Some)
        .map_err(|_| ValidationError::NotAnInteger {
            line: row.line(),
            field,
            value: raw.to_string(),
        })
}

fn check_range(
    line: u64,
    field: &'static str,
    value: Option<i32>,
    (min, max): (i32, i32),
) -> Result<(), ValidationError> {
    let value = value.ok_or(ValidationError::Missing { line, field })?;
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            line,
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn row(line: u64, fields: &[(&str, &str)]) -> DecodedRow {
        let fields: HashMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DecodedRow::new(line, fields)
    }

    #[test]
    fn reads_the_three_request_fields() {
        let decoded = row(
            2,
            &[
                ("RequestType", " 2 "),
                ("RequestStatus", "3"),
                ("RequestData", r#"{"CompanyName":"Acme"}"#),
                ("Ignored", "x"),
            ],
        );

        let normalized = normalize_row(&decoded, NormalizeOptions::default()).expect("normalize");
        assert_eq!(
            normalized,
            NewRawRequest {
                line: 2,
                request_type: Some(2),
                request_status: Some(3),
                request_data: Some(r#"{"CompanyName":"Acme"}"#.to_string()),
            }
        );
    }

    #[test]
    fn missing_fields_become_none_in_lenient_mode() {
        let decoded = row(5, &[("RequestType", ""), ("RequestData", "  ")]);
        let normalized = normalize_row(&decoded, NormalizeOptions::default()).expect("normalize");
        assert_eq!(normalized.request_type, None);
        assert_eq!(normalized.request_status, None);
        assert_eq!(normalized.request_data, None);
    }

    #[test]
    fn out_of_range_values_pass_lenient_mode() {
        let decoded = row(2, &[("RequestType", "7"), ("RequestStatus", "0")]);
        let normalized = normalize_row(&decoded, NormalizeOptions::default()).expect("normalize");
        assert_eq!(normalized.request_type, Some(7));
        assert_eq!(normalized.request_status, Some(0));
    }

    #[test]
    fn non_integer_discriminator_is_rejected() {
        let decoded = row(4, &[("RequestType", "one"), ("RequestStatus", "1")]);
        let err = normalize_row(&decoded, NormalizeOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotAnInteger {
                line: 4,
                field: "RequestType",
                value: "one".to_string(),
            }
        );
    }

    #[test]
    fn strict_mode_enforces_ranges() {
        let strict = NormalizeOptions { strict: true };

        let decoded = row(3, &[("RequestType", "6"), ("RequestStatus", "1")]);
        assert_eq!(
            normalize_row(&decoded, strict).unwrap_err(),
            ValidationError::OutOfRange {
                line: 3,
                field: "RequestType",
                value: 6,
                min: 1,
                max: 5,
            }
        );

        let decoded = row(3, &[("RequestType", "5")]);
        assert_eq!(
            normalize_row(&decoded, strict).unwrap_err(),
            ValidationError::Missing {
                line: 3,
                field: "RequestStatus",
            }
        );

        let decoded = row(3, &[("RequestType", "5"), ("RequestStatus", "3")]);
        assert!(normalize_row(&decoded, strict).is_ok());
    }
}

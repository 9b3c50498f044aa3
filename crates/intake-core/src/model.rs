use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

pub const REQUEST_TYPE_RANGE: RangeInclusive<i32> = 1..=5;
pub const REQUEST_STATUS_RANGE: RangeInclusive<i32> = 1..=3;

/// Discriminator selecting which typed projection a staged payload feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    NewLicense,
    AccountRequest,
    InspectionRequest,
    AddActivity,
    StampLicense,
}

impl RequestType {
    pub const ALL: [RequestType; 5] = [
        RequestType::NewLicense,
        RequestType::AccountRequest,
        RequestType::InspectionRequest,
        RequestType::AddActivity,
        RequestType::StampLicense,
    ];

    pub fn code(&self) -> i32 {
        match self {
            RequestType::NewLicense => 1,
            RequestType::AccountRequest => 2,
            RequestType::InspectionRequest => 3,
            RequestType::AddActivity => 4,
            RequestType::StampLicense => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::NewLicense => "new_license",
            RequestType::AccountRequest => "account_request",
            RequestType::InspectionRequest => "inspection_request",
            RequestType::AddActivity => "add_activity",
            RequestType::StampLicense => "stamp_license",
        }
    }

    /// Destination table for this type's projection rows.
    pub fn table_name(&self) -> &'static str {
        match self {
            RequestType::NewLicense => "new_license_requests",
            RequestType::AccountRequest => "account_requests",
            RequestType::InspectionRequest => "inspection_requests",
            RequestType::AddActivity => "add_activity_requests",
            RequestType::StampLicense => "stamp_license_requests",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for RequestType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RequestType::NewLicense),
            2 => Ok(RequestType::AccountRequest),
            3 => Ok(RequestType::InspectionRequest),
            4 => Ok(RequestType::AddActivity),
            5 => Ok(RequestType::StampLicense),
            other => Err(other),
        }
    }
}

/// A normalized CSV row waiting to be staged. Nothing here has been range
/// checked unless the normalizer ran in strict mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRawRequest {
    pub line: u64,
    pub request_type: Option<i32>,
    pub request_status: Option<i32>,
    pub request_data: Option<String>,
}

impl NewRawRequest {
    /// Mirrors the staging table's NOT NULL and CHECK constraints.
    pub fn check_constraints(&self) -> Result<(i32, i32), String> {
        let request_type = self
            .request_type
            .ok_or_else(|| format!("line {}: RequestType is null", self.line))?;
        if !REQUEST_TYPE_RANGE.contains(&request_type) {
            return Err(format!(
                "line {}: RequestType {request_type} is outside 1..=5",
                self.line
            ));
        }

        let request_status = self
            .request_status
            .ok_or_else(|| format!("line {}: RequestStatus is null", self.line))?;
        if !REQUEST_STATUS_RANGE.contains(&request_status) {
            return Err(format!(
                "line {}: RequestStatus {request_status} is outside 1..=3",
                self.line
            ));
        }

        Ok((request_type, request_status))
    }
}

/// One row of the current staged generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RawRequest {
    pub request_id: i64,
    pub request_type: i32,
    pub request_status: i32,
    pub request_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLicense {
    pub source_request_id: i64,
    pub company_name: Option<String>,
    pub licence_type: Option<String>,
    pub is_office: Option<bool>,
    pub office_name: Option<String>,
    pub office_service_number: Option<String>,
    pub request_date: Option<String>,
    pub activities: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequest {
    pub source_request_id: i64,
    pub company_name: Option<String>,
    pub requester_name: Option<String>,
    pub applicant_name: Option<String>,
    pub user_name: Option<String>,
    pub contact_email: Option<String>,
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRequest {
    pub source_request_id: i64,
    pub company_name: Option<String>,
    pub inspection_date: Option<String>,
    pub inspection_time: Option<String>,
    pub inspection_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddActivity {
    pub source_request_id: i64,
    pub company_name: Option<String>,
    pub licence_id: Option<String>,
    pub activities: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampLicense {
    pub source_request_id: i64,
    pub company_name: Option<String>,
    pub licence_id: Option<String>,
    pub request_date: Option<String>,
}

/// A row bound for one of the typed tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request_type", rename_all = "snake_case")]
pub enum Projection {
    NewLicense(NewLicense),
    AccountRequest(AccountRequest),
    InspectionRequest(InspectionRequest),
    AddActivity(AddActivity),
    StampLicense(StampLicense),
}

impl Projection {
    pub fn request_type(&self) -> RequestType {
        match self {
            Projection::NewLicense(_) => RequestType::NewLicense,
            Projection::AccountRequest(_) => RequestType::AccountRequest,
            Projection::InspectionRequest(_) => RequestType::InspectionRequest,
            Projection::AddActivity(_) => RequestType::AddActivity,
            Projection::StampLicense(_) => RequestType::StampLicense,
        }
    }

    pub fn source_request_id(&self) -> i64 {
        match self {
            Projection::NewLicense(row) => row.source_request_id,
            Projection::AccountRequest(row) => row.source_request_id,
            Projection::InspectionRequest(row) => row.source_request_id,
            Projection::AddActivity(row) => row.source_request_id,
            Projection::StampLicense(row) => row.source_request_id,
        }
    }

    pub fn company_name(&self) -> Option<&str> {
        match self {
            Projection::NewLicense(row) => row.company_name.as_deref(),
            Projection::AccountRequest(row) => row.company_name.as_deref(),
            Projection::InspectionRequest(row) => row.company_name.as_deref(),
            Projection::AddActivity(row) => row.company_name.as_deref(),
            Projection::StampLicense(row) => row.company_name.as_deref(),
        }
    }
}

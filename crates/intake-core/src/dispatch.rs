//! Routes every staged request into its typed projection table.
//!
//! A record that cannot be routed is logged, recorded in the
//! [`DispatchReport`] and skipped; the rest of the generation still goes
//! through. Projection tables are append-only, so dispatching the same
//! generation twice doubles their row counts.

use std::collections::BTreeMap;

use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{
    AccountRequest, AddActivity, InspectionRequest, NewLicense, Projection, RawRequest,
    RequestType, StampLicense,
};
use crate::store::RequestRepository;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request {request_id} has no payload")]
    MissingPayload { request_id: i64 },

    #[error("request {request_id} payload is not valid JSON: {source}")]
    InvalidPayload {
        request_id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("request {request_id} payload is not a JSON object")]
    NotAnObject { request_id: i64 },

    #[error("request {request_id} payload does not match the {request_type} shape: {source}")]
    ShapeMismatch {
        request_id: i64,
        request_type: RequestType,
        #[source]
        source: serde_json::Error,
    },

    #[error("request {request_id} has unknown request type {value}")]
    UnknownDiscriminator { request_id: i64, value: i32 },

    #[error("request {request_id} could not be written to {table}: {source}")]
    Insert {
        request_id: i64,
        table: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("staged requests could not be listed: {0}")]
    Listing(#[source] StoreError),
}

impl DispatchError {
    pub fn request_id(&self) -> Option<i64> {
        match self {
            DispatchError::MissingPayload { request_id }
            | DispatchError::InvalidPayload { request_id, .. }
            | DispatchError::NotAnObject { request_id }
            | DispatchError::ShapeMismatch { request_id, .. }
            | DispatchError::UnknownDiscriminator { request_id, .. }
            | DispatchError::Insert { request_id, .. } => Some(*request_id),
            DispatchError::Listing(_) => None,
        }
    }

    pub fn kind(&self) -> DispatchFailureKind {
        match self {
            DispatchError::MissingPayload { .. } => DispatchFailureKind::MissingPayload,
            DispatchError::InvalidPayload { .. } => DispatchFailureKind::InvalidPayload,
            DispatchError::NotAnObject { .. } => DispatchFailureKind::NotAnObject,
            DispatchError::ShapeMismatch { .. } => DispatchFailureKind::ShapeMismatch,
            DispatchError::UnknownDiscriminator { .. } => DispatchFailureKind::UnknownDiscriminator,
            DispatchError::Insert { .. } => DispatchFailureKind::Insert,
            DispatchError::Listing(_) => DispatchFailureKind::Listing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchFailureKind {
    MissingPayload,
    InvalidPayload,
    NotAnObject,
    ShapeMismatch,
    UnknownDiscriminator,
    Insert,
    Listing,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchFailure {
    pub request_id: Option<i64>,
    pub kind: DispatchFailureKind,
    pub message: String,
}

impl From<&DispatchError> for DispatchFailure {
    fn from(err: &DispatchError) -> Self {
        Self {
            request_id: err.request_id(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub examined: usize,
    pub dispatched: usize,
    pub dispatched_by_type: BTreeMap<RequestType, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record_failure(&mut self, err: &DispatchError) {
        warn!(
            request_id = err.request_id(),
            kind = ?err.kind(),
            "skipping staged request: {err}"
        );
        self.failures.push(DispatchFailure::from(err));
    }
}

/// Dispatches the whole staged generation. Never fails as a whole: even a
/// listing error is returned inside the report.
pub async fn dispatch_generation(repository: &dyn RequestRepository) -> DispatchReport {
    let mut report = DispatchReport::default();

    let records = match repository.list_all().await {
        Ok(records) => records,
        Err(err) => {
            report.record_failure(&DispatchError::Listing(err));
            return report;
        }
    };

    for record in &records {
        report.examined += 1;

        let projection = match extract_projection(record) {
            Ok(projection) => projection,
            Err(err) => {
                report.record_failure(&err);
                continue;
            }
        };

        let request_type = projection.request_type();
        match repository.insert_projection(&projection).await {
            Ok(projection_id) => {
                debug!(
                    request_id = projection.source_request_id(),
                    projection_id,
                    table = request_type.table_name(),
                    "dispatched staged request"
                );
                report.dispatched += 1;
                *report.dispatched_by_type.entry(request_type).or_insert(0) += 1;
            }
            Err(source) => report.record_failure(&DispatchError::Insert {
                request_id: projection.source_request_id(),
                table: request_type.table_name(),
                source,
            }),
        }
    }

    info!(
        examined = report.examined,
        dispatched = report.dispatched,
        failed = report.failed(),
        "dispatch pass finished"
    );
    report
}

/// Parses a staged payload and extracts the fields of its typed projection.
pub fn extract_projection(record: &RawRequest) -> Result<Projection, DispatchError> {
    let request_id = record.request_id;

    let request_type = RequestType::try_from(record.request_type)
        .map_err(|value| DispatchError::UnknownDiscriminator { request_id, value })?;

    let payload = record
        .request_data
        .as_deref()
        .ok_or(DispatchError::MissingPayload { request_id })?;

    let document: Value = serde_json::from_str(payload)
        .map_err(|source| DispatchError::InvalidPayload { request_id, source })?;

    // Structs also deserialize from JSON arrays; only objects are documents.
    if !document.is_object() {
        return Err(DispatchError::NotAnObject { request_id });
    }

    let shape_mismatch = |source| DispatchError::ShapeMismatch {
        request_id,
        request_type,
        source,
    };

    let projection = match request_type {
        RequestType::NewLicense => {
            let payload: NewLicensePayload =
                serde_json::from_value(document).map_err(shape_mismatch)?;
            Projection::NewLicense(NewLicense {
                source_request_id: request_id,
                company_name: payload.company_name,
                licence_type: payload.licence_type,
                is_office: payload.is_office,
                office_name: payload.office_name,
                office_service_number: payload.office_service_number,
                request_date: payload.request_date,
                activities: encode_list(payload.activities),
            })
        }
        RequestType::AccountRequest => {
            let payload: AccountRequestPayload =
                serde_json::from_value(document).map_err(shape_mismatch)?;
            Projection::AccountRequest(AccountRequest {
                source_request_id: request_id,
                company_name: payload.company_name,
                requester_name: payload.requester_name,
                applicant_name: payload.applicant_name,
                user_name: payload.user_name,
                contact_email: payload.contact_email,
                permissions: encode_list(payload.permissions),
            })
        }
        RequestType::InspectionRequest => {
            let payload: InspectionRequestPayload =
                serde_json::from_value(document).map_err(shape_mismatch)?;
            Projection::InspectionRequest(InspectionRequest {
                source_request_id: request_id,
                company_name: payload.company_name,
                inspection_date: payload.inspection_date,
                inspection_time: payload.inspection_time,
                inspection_type: payload.inspection_type,
            })
        }
        RequestType::AddActivity => {
            let payload: AddActivityPayload =
                serde_json::from_value(document).map_err(shape_mismatch)?;
            Projection::AddActivity(AddActivity {
                source_request_id: request_id,
                company_name: payload.company_name,
                licence_id: payload.licence_id,
                activities: encode_list(payload.activities),
            })
        }
        RequestType::StampLicense => {
            let payload: StampLicensePayload =
                serde_json::from_value(document).map_err(shape_mismatch)?;
            Projection::StampLicense(StampLicense {
                source_request_id: request_id,
                company_name: payload.company_name,
                licence_id: payload.licence_id,
                request_date: payload.request_date,
            })
        }
    };

    Ok(projection)
}

/// List columns are textual; store the compact JSON encoding.
fn encode_list(value: Option<Value>) -> Option<String> {
    value.map(|value| value.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NewLicensePayload {
    #[serde(default, deserialize_with = "loose_text")]
    company_name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    licence_type: Option<String>,
    #[serde(default, deserialize_with = "loose_bool")]
    is_office: Option<bool>,
    #[serde(default, deserialize_with = "loose_text")]
    office_name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    office_service_number: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    request_date: Option<String>,
    #[serde(default)]
    activities: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccountRequestPayload {
    #[serde(default, deserialize_with = "loose_text")]
    company_name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    requester_name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    applicant_name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    user_name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    contact_email: Option<String>,
    #[serde(default)]
    permissions: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectionRequestPayload {
    #[serde(default, deserialize_with = "loose_text")]
    company_name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    inspection_date: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    inspection_time: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    inspection_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddActivityPayload {
    #[serde(default, deserialize_with = "loose_text")]
    company_name: Option<String>,
    #[serde(default, rename = "LicenceID", deserialize_with = "loose_text")]
    licence_id: Option<String>,
    #[serde(default)]
    activities: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StampLicensePayload {
    #[serde(default, deserialize_with = "loose_text")]
    company_name: Option<String>,
    #[serde(default, rename = "LicenceID", deserialize_with = "loose_text")]
    licence_id: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    request_date: Option<String>,
}

/// Text columns take any JSON scalar; numbers and booleans are rendered.
fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(Value::Bool(flag)) => Ok(Some(flag.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a text value, found {}",
            json_type_name(&other)
        ))),
    }
}

fn loose_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(flag)),
        Some(Value::Number(number)) => match number.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(D::Error::custom(format!(
                "expected a boolean, found number {number}"
            ))),
        },
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            "" => Ok(None),
            _ => Err(D::Error::custom(format!(
                "expected a boolean, found '{text}'"
            ))),
        },
        Some(other) => Err(D::Error::custom(format!(
            "expected a boolean, found {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

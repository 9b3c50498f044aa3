use serde::{Deserialize, Serialize};

use crate::model::{RawRequest, RequestType};

/// Per-type counts of the staged generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatistics {
    pub total_records: usize,
    pub new_license_requests: usize,
    pub account_requests: usize,
    pub inspection_requests: usize,
    pub add_activity_requests: usize,
    pub stamp_license_requests: usize,
}

impl RequestStatistics {
    pub fn from_generation(records: &[RawRequest]) -> Self {
        let mut statistics = Self {
            total_records: records.len(),
            ..Self::default()
        };

        for record in records {
            // The staging schema keeps every discriminator within 1..=5.
            if let Ok(request_type) = RequestType::try_from(record.request_type) {
                *statistics.counter_mut(request_type) += 1;
            }
        }

        statistics
    }

    pub fn count_for(&self, request_type: RequestType) -> usize {
        match request_type {
            RequestType::NewLicense => self.new_license_requests,
            RequestType::AccountRequest => self.account_requests,
            RequestType::InspectionRequest => self.inspection_requests,
            RequestType::AddActivity => self.add_activity_requests,
            RequestType::StampLicense => self.stamp_license_requests,
        }
    }

    /// Sum of the per-type counters; equals `total_records` for any
    /// generation the staging store accepted.
    pub fn typed_total(&self) -> usize {
        RequestType::ALL
            .iter()
            .map(|request_type| self.count_for(*request_type))
            .sum()
    }

    fn counter_mut(&mut self, request_type: RequestType) -> &mut usize {
        match request_type {
            RequestType::NewLicense => &mut self.new_license_requests,
            RequestType::AccountRequest => &mut self.account_requests,
            RequestType::InspectionRequest => &mut self.inspection_requests,
            RequestType::AddActivity => &mut self.add_activity_requests,
            RequestType::StampLicense => &mut self.stamp_license_requests,
        }
    }
}

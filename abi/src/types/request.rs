use chrono::NaiveDate;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::{BookingId, Error, EventDetails, ProviderId, RequesterId, TimeRange};

/// A request to place a booking. Built through [`BookingRequestBuilder`] so
/// missing fields surface as [`Error::MissingField`].
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(setter(into), build_fn(error = "Error"))]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub requester_id: RequesterId,
    pub provider_id: ProviderId,
    pub date: NaiveDate,
    pub slot: TimeRange,
    #[builder(default)]
    pub event: EventDetails,
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        Error::MissingField(e.field_name().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub booking_id: BookingId,
    pub total_price_cents: i64,
}

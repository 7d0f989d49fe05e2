use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{BookingId, ProviderId, ProviderKind, RequesterId, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_active(&self) -> bool {
        *self != BookingStatus::Cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub requester_id: RequesterId,
    pub provider_id: ProviderId,
    pub service: ProviderKind,
    pub date: NaiveDate,
    pub status: BookingStatus,
    pub total_price_cents: Option<i64>,
}

/// Concrete interval of one DJ booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub booking_id: BookingId,
    pub provider_id: ProviderId,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub status: BookingStatus,
}

/// Manual blackout for a provider/date. Always wins over booking counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AvailabilityBlock {
    pub provider_id: ProviderId,
    #[sqlx(rename = "block_date")]
    pub date: NaiveDate,
    pub reason: Option<String>,
}

impl AvailabilityBlock {
    pub fn new(provider_id: impl Into<ProviderId>, date: NaiveDate, reason: Option<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            date,
            reason,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    pub event_type: Option<String>,
    pub venue: Option<String>,
    pub guest_count: Option<u32>,
    pub notes: Option<String>,
}

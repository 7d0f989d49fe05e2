use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::TimeRange;

/// Verdict for a single provider/date (and optionally time) request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResult {
    pub available: bool,
    pub reason: String,
    pub can_double_book: bool,
    pub bookings_count: u32,
    pub max_bookings: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_booking: Option<TimeRange>,
}

impl AvailabilityResult {
    pub fn available(reason: impl Into<String>, bookings_count: u32, max_bookings: u32) -> Self {
        Self {
            available: true,
            reason: reason.into(),
            can_double_book: false,
            bookings_count,
            max_bookings,
            existing_booking: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>, bookings_count: u32, max_bookings: u32) -> Self {
        Self {
            available: false,
            ..Self::available(reason, bookings_count, max_bookings)
        }
    }

    pub fn with_double_booking(mut self) -> Self {
        self.can_double_book = true;
        self
    }

    pub fn with_existing(mut self, existing: TimeRange) -> Self {
        self.existing_booking = Some(existing);
        self
    }
}

/// One cell of the monthly calendar grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAvailability {
    pub available: bool,
    pub capacity: u32,
    pub remaining_slots: u32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blocked: bool,
}

impl DayAvailability {
    pub fn open(capacity: u32) -> Self {
        Self {
            available: true,
            capacity,
            remaining_slots: capacity,
            blocked: false,
        }
    }

    pub fn with_booked(mut self, count: u32) -> Self {
        self.remaining_slots = self.capacity.saturating_sub(count);
        self.available = self.remaining_slots > 0;
        self
    }

    pub fn full(mut self) -> Self {
        self.available = false;
        self.remaining_slots = 0;
        self
    }

    pub fn blocked(self) -> Self {
        Self {
            blocked: true,
            ..self.full()
        }
    }
}

pub type MonthlyAvailability = BTreeMap<NaiveDate, DayAvailability>;

/// Booking count for one date, as returned by a grouped query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u32,
}

/// DJ slot summary for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySlotSummary {
    pub date: NaiveDate,
    pub count: u32,
    pub has_afternoon_slot: bool,
}

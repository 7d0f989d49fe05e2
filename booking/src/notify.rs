use abi::{BookingId, EventDetails, NotificationError, Provider, RequesterId, TimeRange};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

/// What the notification collaborator learns about a committed booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated {
    pub booking_id: BookingId,
    pub requester_id: RequesterId,
    pub provider: Provider,
    pub date: NaiveDate,
    pub slot: TimeRange,
    pub total_price_cents: i64,
    pub event: EventDetails,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, booking: &BookingCreated) -> Result<(), NotificationError>;
}

/// Records the notification as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, booking: &BookingCreated) -> Result<(), NotificationError> {
        info!(
            booking_id = %booking.booking_id,
            requester = %booking.requester_id,
            provider = %booking.provider.id,
            date = %booking.date,
            slot = %booking.slot,
            total_price_cents = booking.total_price_cents,
            "booking created"
        );
        Ok(())
    }
}

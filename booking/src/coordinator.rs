use std::{sync::Arc, time::Duration};

use abi::{BookingConfirmation, BookingRequest, Error, NotificationError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{BookingCreated, BookingRepository, ConflictResolver, NewBooking, Notifier, PricingPolicy};

/// Outcome of a detached notification, bounded by the notify timeout.
pub type Delivery = JoinHandle<Result<(), NotificationError>>;

/// The only path that writes bookings: re-check under the day lock, price,
/// persist, then notify in the background.
#[derive(Clone)]
pub struct BookingCoordinator {
    resolver: ConflictResolver,
    repo: Arc<dyn BookingRepository>,
    pricing: Arc<dyn PricingPolicy>,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
}

impl BookingCoordinator {
    pub fn new(
        resolver: ConflictResolver,
        repo: Arc<dyn BookingRepository>,
        pricing: Arc<dyn PricingPolicy>,
        notifier: Arc<dyn Notifier>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            repo,
            pricing,
            notifier,
            notify_timeout,
        }
    }

    pub async fn create(&self, request: BookingRequest) -> Result<BookingConfirmation, Error> {
        let (confirmation, _delivery) = self.create_tracked(request).await?;
        Ok(confirmation)
    }

    /// Same as [`create`](Self::create), also handing back the detached
    /// notification so a short-lived caller can wait for it.
    pub async fn create_tracked(
        &self,
        request: BookingRequest,
    ) -> Result<(BookingConfirmation, Delivery), Error> {
        let provider = self.repo.provider(&request.provider_id).await?;
        let rules = self.resolver.rules();
        let key = rules.capacity_key(&provider);

        let mut day = self.repo.begin_day(&key, request.date).await?;
        let state = day.day_state(&provider, &key, request.date).await?;
        let verdict = self.resolver.evaluate(&provider, &state, Some(request.slot));
        if !verdict.available {
            warn!(
                provider = %provider.id,
                date = %request.date,
                slot = %request.slot,
                reason = %verdict.reason,
                "booking rejected"
            );
            return Err(Error::Conflict(verdict.reason));
        }

        let total_price_cents = self.pricing.price(provider.kind, request.slot.hours());
        let booking = NewBooking {
            requester_id: request.requester_id.clone(),
            provider: provider.clone(),
            capacity_key: key,
            date: request.date,
            slot: request.slot,
            capacity: rules.capacity(provider.kind),
            total_price_cents,
            event: request.event.clone(),
        };
        let booking_id = day.insert_booking(&booking).await?;
        day.commit().await?;
        info!(
            %booking_id,
            provider = %provider.id,
            date = %request.date,
            slot = %request.slot,
            total_price_cents,
            "booking committed"
        );

        let delivery = self.dispatch(BookingCreated {
            booking_id,
            requester_id: request.requester_id,
            provider,
            date: request.date,
            slot: request.slot,
            total_price_cents,
            event: request.event,
        });

        let confirmation = BookingConfirmation {
            booking_id,
            total_price_cents,
        };
        Ok((confirmation, delivery))
    }

    /// Runs detached; the booking is already durable.
    fn dispatch(&self, booking: BookingCreated) -> Delivery {
        let notifier = self.notifier.clone();
        let timeout = self.notify_timeout;
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, notifier.notify(&booking)).await {
                Ok(r) => r,
                Err(_) => Err(NotificationError::Timeout(timeout)),
            };
            match &outcome {
                Ok(()) => debug!(booking_id = %booking.booking_id, "notification sent"),
                Err(e) => warn!(booking_id = %booking.booking_id, error = %e, "notification failed"),
            }
            outcome
        })
    }
}

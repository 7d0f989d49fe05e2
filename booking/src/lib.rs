mod coordinator;
#[cfg(any(test, feature = "test_utils"))]
mod memory;
mod monthly;
mod notify;
mod pg;
mod pricing;
mod resolver;

use std::sync::Arc;

use abi::{
    AvailabilityBlock, AvailabilityResult, BookingConfirmation, BookingId, BookingRequest,
    BookingRules, CapacityKey, ClockTime, DailyCount, DailySlotSummary, Error, EventDetails,
    MonthlyAvailability, Provider, ProviderId, ProviderKind, RequesterId, TimeRange,
};
use async_trait::async_trait;
use chrono::NaiveDate;

pub use coordinator::{BookingCoordinator, Delivery};
#[cfg(any(test, feature = "test_utils"))]
pub use memory::MemoryStore;
pub use monthly::MonthlyAggregator;
pub use notify::{BookingCreated, LogNotifier, Notifier};
pub use pg::PgStore;
pub use pricing::{HourlyPricing, PricingPolicy};
pub use resolver::ConflictResolver;

/// Persisted state consulted for one provider/date decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayState {
    pub block: Option<AvailabilityBlock>,
    /// Non-cancelled bookings in the provider's capacity scope.
    pub booking_count: u32,
    /// Non-cancelled DJ slots, ordered by start.
    pub slots: Vec<TimeRange>,
}

/// Inclusive date range used by the monthly batch queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

/// A booking row about to be written by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub requester_id: RequesterId,
    pub provider: Provider,
    pub capacity_key: CapacityKey,
    pub date: NaiveDate,
    /// Written as a time slot for DJ bookings only.
    pub slot: TimeRange,
    pub capacity: u32,
    pub total_price_cents: i64,
    pub event: EventDetails,
}

#[async_trait]
pub trait AvailabilityBlockStore: Send + Sync {
    /// manual block for a provider/date, if any
    async fn block_for(
        &self,
        provider_id: &ProviderId,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityBlock>, Error>;
    /// blocked dates of a provider within the span
    async fn blocked_dates(
        &self,
        provider_id: &ProviderId,
        span: DateSpan,
    ) -> Result<Vec<NaiveDate>, Error>;
    /// add or replace a manual block
    async fn block(&self, block: AvailabilityBlock) -> Result<(), Error>;
    /// remove a manual block, returns whether one existed
    async fn unblock(&self, provider_id: &ProviderId, date: NaiveDate) -> Result<bool, Error>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// get provider by id
    async fn provider(&self, id: &ProviderId) -> Result<Provider, Error>;
    /// non-cancelled bookings in a capacity scope on a date
    async fn active_booking_count(&self, key: &CapacityKey, date: NaiveDate)
        -> Result<u32, Error>;
    /// non-cancelled DJ slots of a provider on a date, ordered by start
    async fn active_slots(
        &self,
        provider_id: &ProviderId,
        date: NaiveDate,
    ) -> Result<Vec<TimeRange>, Error>;
    /// booking counts grouped by date; dates without bookings are absent
    async fn booking_counts(&self, key: &CapacityKey, span: DateSpan)
        -> Result<Vec<DailyCount>, Error>;
    /// DJ slot counts grouped by date, flagging slots starting at or after `threshold`
    async fn slot_summaries(
        &self,
        provider_id: &ProviderId,
        span: DateSpan,
        threshold: ClockTime,
    ) -> Result<Vec<DailySlotSummary>, Error>;
    /// open a transaction holding the admission lock for a capacity unit/day
    async fn begin_day(
        &self,
        key: &CapacityKey,
        date: NaiveDate,
    ) -> Result<Box<dyn DayTransaction>, Error>;
}

/// Admission lock plus the reads and writes that must happen under it.
/// Dropping without [`DayTransaction::commit`] discards staged writes.
#[async_trait]
pub trait DayTransaction: Send {
    /// fresh block, count and slots as seen inside the lock
    async fn day_state(
        &mut self,
        provider: &Provider,
        key: &CapacityKey,
        date: NaiveDate,
    ) -> Result<DayState, Error>;
    /// write booking, DJ slot and event details
    async fn insert_booking(&mut self, booking: &NewBooking) -> Result<BookingId, Error>;
    async fn commit(self: Box<Self>) -> Result<(), Error>;
}

/// The availability engine: single-date checks, monthly grids and booking
/// creation over one store.
#[derive(Clone)]
pub struct BookingEngine {
    repo: Arc<dyn BookingRepository>,
    blocks: Arc<dyn AvailabilityBlockStore>,
    resolver: ConflictResolver,
    aggregator: MonthlyAggregator,
    coordinator: BookingCoordinator,
}

impl BookingEngine {
    pub fn new(
        repo: Arc<dyn BookingRepository>,
        blocks: Arc<dyn AvailabilityBlockStore>,
        rules: BookingRules,
        pricing: Arc<dyn PricingPolicy>,
        notifier: Arc<dyn Notifier>,
        notify_timeout: std::time::Duration,
    ) -> Self {
        let resolver = ConflictResolver::new(rules.clone(), repo.clone(), blocks.clone());
        let aggregator = MonthlyAggregator::new(rules, repo.clone(), blocks.clone());
        let coordinator = BookingCoordinator::new(
            resolver.clone(),
            repo.clone(),
            pricing,
            notifier,
            notify_timeout,
        );
        Self {
            repo,
            blocks,
            resolver,
            aggregator,
            coordinator,
        }
    }

    pub async fn check(
        &self,
        provider_id: &ProviderId,
        date: NaiveDate,
        requested: Option<TimeRange>,
    ) -> Result<AvailabilityResult, Error> {
        let provider = self.repo.provider(provider_id).await?;
        self.resolver.check(&provider, date, requested).await
    }

    pub async fn monthly(
        &self,
        provider_id: &ProviderId,
        year: i32,
        month: u32,
    ) -> Result<MonthlyAvailability, Error> {
        let provider = self.repo.provider(provider_id).await?;
        self.aggregator.monthly(&provider, year, month).await
    }

    pub async fn create(&self, request: BookingRequest) -> Result<BookingConfirmation, Error> {
        self.coordinator.create(request).await
    }

    pub async fn create_tracked(
        &self,
        request: BookingRequest,
    ) -> Result<(BookingConfirmation, Delivery), Error> {
        self.coordinator.create_tracked(request).await
    }

    pub async fn block(
        &self,
        provider_id: &ProviderId,
        date: NaiveDate,
        reason: Option<String>,
    ) -> Result<(), Error> {
        let provider = self.repo.provider(provider_id).await?;
        self.blocks
            .block(AvailabilityBlock::new(provider.id, date, reason))
            .await
    }

    pub async fn unblock(&self, provider_id: &ProviderId, date: NaiveDate) -> Result<bool, Error> {
        self.blocks.unblock(provider_id, date).await
    }
}

impl DateSpan {
    pub fn new(first: NaiveDate, last: NaiveDate) -> Self {
        Self { first, last }
    }
}

impl NewBooking {
    pub fn service(&self) -> ProviderKind {
        self.provider.kind
    }
}

use std::sync::Arc;

use abi::{
    parse_date, AvailabilityResult, BookingConfirmation, BookingRequest, BookingRequestBuilder,
    Config, Error, EventDetails, MonthlyAvailability, NotificationError, TimeRange,
};
use booking::{
    AvailabilityBlockStore, BookingEngine, BookingRepository, HourlyPricing, LogNotifier, PgStore,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// String-typed facade for route handlers and the CLI. Everything is
/// validated here before the engine touches the store.
#[derive(Clone)]
pub struct BookingService {
    engine: BookingEngine,
}

/// Raw booking form as it arrives from a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    pub provider_id: String,
    pub date: String,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default)]
    pub event: EventDetails,
}

impl BookingService {
    pub fn new(engine: BookingEngine) -> Self {
        Self { engine }
    }

    /// Wire the default pricing and notifier around a store.
    pub fn with_store<S>(store: Arc<S>, config: &Config) -> Self
    where
        S: BookingRepository + AvailabilityBlockStore + 'static,
    {
        let engine = BookingEngine::new(
            store.clone(),
            store,
            config.rules.clone(),
            Arc::new(HourlyPricing::new(config.pricing.clone())),
            Arc::new(LogNotifier),
            config.notification.timeout(),
        );
        Self::new(engine)
    }

    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let store = PgStore::connect(&config.db).await?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    #[instrument(skip(self))]
    pub async fn check(
        &self,
        provider_id: &str,
        date: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<AvailabilityResult, Error> {
        let provider_id = required("providerId", provider_id)?;
        let date = parse_date(date)?;
        let requested = slot(start, end)?;
        self.engine
            .check(&provider_id, date, requested)
            .await
    }

    #[instrument(skip(self))]
    pub async fn monthly(
        &self,
        provider_id: &str,
        year: i32,
        month: u32,
    ) -> Result<MonthlyAvailability, Error> {
        let provider_id = required("providerId", provider_id)?;
        self.engine.monthly(&provider_id, year, month).await
    }

    #[instrument(skip(self, input), fields(provider = %input.provider_id, date = %input.date))]
    pub async fn create(
        &self,
        requester_id: &str,
        input: CreateBooking,
    ) -> Result<BookingConfirmation, Error> {
        let request = booking_request(requester_id, input)?;
        self.engine.create(request).await
    }

    /// Create, then wait for the notification before returning. For callers
    /// that exit right after, like the CLI.
    pub async fn create_and_notify(
        &self,
        requester_id: &str,
        input: CreateBooking,
    ) -> Result<(BookingConfirmation, Result<(), NotificationError>), Error> {
        let request = booking_request(requester_id, input)?;
        let (confirmation, delivery) = self.engine.create_tracked(request).await?;
        let delivered = delivery
            .await
            .unwrap_or_else(|e| Err(NotificationError::Delivery(e.to_string())));
        Ok((confirmation, delivered))
    }

    pub async fn block(
        &self,
        provider_id: &str,
        date: &str,
        reason: Option<String>,
    ) -> Result<(), Error> {
        let provider_id = required("providerId", provider_id)?;
        let date = parse_date(date)?;
        let reason = reason.filter(|r| !r.trim().is_empty());
        self.engine.block(&provider_id, date, reason).await
    }

    /// Returns whether a block was removed.
    pub async fn unblock(&self, provider_id: &str, date: &str) -> Result<bool, Error> {
        let provider_id = required("providerId", provider_id)?;
        let date = parse_date(date)?;
        self.engine.unblock(&provider_id, date).await
    }
}

fn booking_request(requester_id: &str, input: CreateBooking) -> Result<BookingRequest, Error> {
    let mut builder = BookingRequestBuilder::default();
    builder
        .requester_id(required("requesterId", requester_id)?)
        .provider_id(required("providerId", &input.provider_id)?)
        .date(parse_date(&input.date)?)
        .event(input.event);
    match slot(input.start.as_deref(), input.end.as_deref())? {
        Some(range) => builder.slot(range),
        None => return Err(Error::MissingField("start".into())),
    };
    builder.build()
}

/// Both ends or neither.
fn slot(start: Option<&str>, end: Option<&str>) -> Result<Option<TimeRange>, Error> {
    match (start, end) {
        (Some(start), Some(end)) => Ok(Some(TimeRange::parse(start, end)?)),
        (None, None) => Ok(None),
        (Some(_), None) => Err(Error::MissingField("end".into())),
        (None, Some(_)) => Err(Error::MissingField("start".into())),
    }
}

fn required(field: &str, value: &str) -> Result<String, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::MissingField(field.to_string()));
    }
    Ok(value.to_string())
}

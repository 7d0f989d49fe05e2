use abi::{
    AvailabilityBlock, BookingId, BookingStatus, CapacityKey, ClockTime, DailyCount,
    DailySlotSummary, DbConfig, Error, Provider, ProviderId, ProviderKind, TimeRange,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Postgres, Row, Transaction,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    AvailabilityBlockStore, BookingRepository, DateSpan, DayState, DayTransaction, NewBooking,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

struct PgDay {
    tx: Transaction<'static, Postgres>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DbConfig) -> Result<Self, Error> {
        let pool = PgPoolOptions::default()
            .max_connections(config.max_connections)
            .connect(&config.url())
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations. Idempotent; run once at startup.
    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::DbError(sqlx::Error::Migrate(Box::new(e))))
    }

    /// Register or rename a provider.
    pub async fn upsert_provider(&self, provider: &Provider) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO providers (id, kind, name) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET kind = EXCLUDED.kind, name = EXCLUDED.name",
        )
        .bind(&provider.id)
        .bind(provider.kind)
        .bind(&provider.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn to_clock(minutes: i16) -> Result<ClockTime, Error> {
    let minutes = u16::try_from(minutes)
        .map_err(|_| Error::InvalidTime(format!("{} minutes past midnight", minutes)))?;
    ClockTime::from_minutes(minutes)
}

fn to_range(row: &PgRow) -> Result<TimeRange, Error> {
    let start: i16 = row.try_get("start_minute")?;
    let end: i16 = row.try_get("end_minute")?;
    TimeRange::new(to_clock(start)?, to_clock(end)?)
}

fn to_count(count: i64) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

// Capacity scope as a WHERE clause over `bookings`, binding the scope value as $1.
fn scope_filter(key: &CapacityKey) -> &'static str {
    match key {
        CapacityKey::Provider(_) => "provider_id = $1",
        CapacityKey::Category(_) => "service = $1::provider_kind",
    }
}

fn scope_value(key: &CapacityKey) -> String {
    match key {
        CapacityKey::Provider(id) => id.clone(),
        CapacityKey::Category(kind) => kind.as_str().to_string(),
    }
}

const BLOCK_FOR: &str =
    "SELECT provider_id, block_date, reason FROM availability_blocks WHERE provider_id = $1 AND block_date = $2";

const ACTIVE_SLOTS: &str = "SELECT start_minute, end_minute FROM booking_time_slots
     WHERE provider_id = $1 AND slot_date = $2 AND status <> 'cancelled'
     ORDER BY start_minute";

fn count_query(key: &CapacityKey) -> String {
    format!(
        "SELECT COUNT(*) FROM bookings WHERE {} AND booking_date = $2 AND status <> 'cancelled'",
        scope_filter(key)
    )
}

#[async_trait]
impl AvailabilityBlockStore for PgStore {
    #[instrument(skip(self))]
    async fn block_for(
        &self,
        provider_id: &ProviderId,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityBlock>, Error> {
        let block = sqlx::query_as(BLOCK_FOR)
            .bind(provider_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(block)
    }

    #[instrument(skip(self))]
    async fn blocked_dates(
        &self,
        provider_id: &ProviderId,
        span: DateSpan,
    ) -> Result<Vec<NaiveDate>, Error> {
        let dates = sqlx::query_scalar(
            "SELECT block_date FROM availability_blocks
             WHERE provider_id = $1 AND block_date BETWEEN $2 AND $3
             ORDER BY block_date",
        )
        .bind(provider_id)
        .bind(span.first)
        .bind(span.last)
        .fetch_all(&self.pool)
        .await?;
        Ok(dates)
    }

    async fn block(&self, block: AvailabilityBlock) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO availability_blocks (provider_id, block_date, reason) VALUES ($1, $2, $3)
             ON CONFLICT (provider_id, block_date) DO UPDATE SET reason = EXCLUDED.reason",
        )
        .bind(&block.provider_id)
        .bind(block.date)
        .bind(&block.reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unblock(&self, provider_id: &ProviderId, date: NaiveDate) -> Result<bool, Error> {
        let done = sqlx::query(
            "DELETE FROM availability_blocks WHERE provider_id = $1 AND block_date = $2",
        )
        .bind(provider_id)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn provider(&self, id: &ProviderId) -> Result<Provider, Error> {
        sqlx::query_as("SELECT id, kind, name FROM providers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::UnknownProvider(id.clone()))
    }

    #[instrument(skip(self))]
    async fn active_booking_count(
        &self,
        key: &CapacityKey,
        date: NaiveDate,
    ) -> Result<u32, Error> {
        let count: i64 = sqlx::query_scalar(&count_query(key))
            .bind(scope_value(key))
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
        Ok(to_count(count))
    }

    #[instrument(skip(self))]
    async fn active_slots(
        &self,
        provider_id: &ProviderId,
        date: NaiveDate,
    ) -> Result<Vec<TimeRange>, Error> {
        sqlx::query(ACTIVE_SLOTS)
            .bind(provider_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(to_range)
            .collect()
    }

    #[instrument(skip(self))]
    async fn booking_counts(
        &self,
        key: &CapacityKey,
        span: DateSpan,
    ) -> Result<Vec<DailyCount>, Error> {
        let sql = format!(
            "SELECT booking_date, COUNT(*) AS count FROM bookings
             WHERE {} AND booking_date BETWEEN $2 AND $3 AND status <> 'cancelled'
             GROUP BY booking_date",
            scope_filter(key)
        );
        let rows = sqlx::query(&sql)
            .bind(scope_value(key))
            .bind(span.first)
            .bind(span.last)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<DailyCount, Error> {
                Ok(DailyCount {
                    date: row.try_get("booking_date")?,
                    count: to_count(row.try_get("count")?),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn slot_summaries(
        &self,
        provider_id: &ProviderId,
        span: DateSpan,
        threshold: ClockTime,
    ) -> Result<Vec<DailySlotSummary>, Error> {
        let rows = sqlx::query(
            "SELECT slot_date, COUNT(*) AS count, BOOL_OR(start_minute >= $4) AS has_afternoon_slot
             FROM booking_time_slots
             WHERE provider_id = $1 AND slot_date BETWEEN $2 AND $3 AND status <> 'cancelled'
             GROUP BY slot_date",
        )
        .bind(provider_id)
        .bind(span.first)
        .bind(span.last)
        .bind(threshold.minutes() as i16)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<DailySlotSummary, Error> {
                let has_afternoon_slot: Option<bool> = row.try_get("has_afternoon_slot")?;
                Ok(DailySlotSummary {
                    date: row.try_get("slot_date")?,
                    count: to_count(row.try_get("count")?),
                    has_afternoon_slot: has_afternoon_slot.unwrap_or(false),
                })
            })
            .collect()
    }

    async fn begin_day(
        &self,
        key: &CapacityKey,
        date: NaiveDate,
    ) -> Result<Box<dyn DayTransaction>, Error> {
        let mut tx = self.pool.begin().await?;
        // released on commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key.day_key(date))
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgDay { tx }))
    }
}

#[async_trait]
impl DayTransaction for PgDay {
    async fn day_state(
        &mut self,
        provider: &Provider,
        key: &CapacityKey,
        date: NaiveDate,
    ) -> Result<DayState, Error> {
        let block: Option<AvailabilityBlock> = sqlx::query_as(BLOCK_FOR)
            .bind(&provider.id)
            .bind(date)
            .fetch_optional(&mut *self.tx)
            .await?;

        let (booking_count, slots) = match provider.kind {
            ProviderKind::Dj => {
                let slots = sqlx::query(ACTIVE_SLOTS)
                    .bind(&provider.id)
                    .bind(date)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .iter()
                    .map(to_range)
                    .collect::<Result<Vec<_>, _>>()?;
                (slots.len() as u32, slots)
            }
            ProviderKind::Photobooth => {
                let count: i64 = sqlx::query_scalar(&count_query(key))
                    .bind(scope_value(key))
                    .bind(date)
                    .fetch_one(&mut *self.tx)
                    .await?;
                (to_count(count), Vec::new())
            }
        };

        Ok(DayState {
            block,
            booking_count,
            slots,
        })
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> Result<BookingId, Error> {
        let capacity_key = booking.capacity_key.to_string();
        let used: Vec<i16> = sqlx::query_scalar(
            "SELECT slot_ordinal FROM bookings
             WHERE capacity_key = $1 AND booking_date = $2 AND status <> 'cancelled'",
        )
        .bind(&capacity_key)
        .bind(booking.date)
        .fetch_all(&mut *self.tx)
        .await?;
        let slot_ordinal = (1..=booking.capacity as i16)
            .find(|n| !used.contains(n))
            .ok_or_else(|| {
                Error::Conflict("capacity was taken by a concurrent booking".to_string())
            })?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO bookings
                (requester_id, provider_id, service, booking_date, status, total_price_cents, capacity_key, slot_ordinal)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(&booking.requester_id)
        .bind(&booking.provider.id)
        .bind(booking.service())
        .bind(booking.date)
        .bind(BookingStatus::Pending)
        .bind(booking.total_price_cents)
        .bind(&capacity_key)
        .bind(slot_ordinal)
        .fetch_one(&mut *self.tx)
        .await?;

        if booking.provider.is_dj() {
            sqlx::query(
                "INSERT INTO booking_time_slots (booking_id, provider_id, slot_date, start_minute, end_minute, status)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(id)
            .bind(&booking.provider.id)
            .bind(booking.date)
            .bind(booking.slot.start.minutes() as i16)
            .bind(booking.slot.end.minutes() as i16)
            .bind(BookingStatus::Pending)
            .execute(&mut *self.tx)
            .await?;
        }

        let event = &booking.event;
        sqlx::query(
            "INSERT INTO booking_events (booking_id, event_type, venue, guest_count, notes)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(&event.event_type)
        .bind(&event.venue)
        .bind(event.guest_count.map(|n| n as i32))
        .bind(&event.notes)
        .execute(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.tx.commit().await?;
        Ok(())
    }
}

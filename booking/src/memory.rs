use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use abi::{
    AvailabilityBlock, Booking, BookingId, BookingStatus, CapacityKey, ClockTime, DailyCount,
    DailySlotSummary, Error, EventDetails, Provider, ProviderId, ProviderKind, TimeRange,
    TimeSlot,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::{
    AvailabilityBlockStore, BookingRepository, DateSpan, DayState, DayTransaction, NewBooking,
};

/// In-process store for tests. Day transactions serialise on a per-key async
/// mutex the way the Postgres store does on an advisory lock.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    day_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

#[derive(Debug, Default)]
struct Tables {
    providers: HashMap<ProviderId, Provider>,
    bookings: Vec<StoredBooking>,
    slots: Vec<TimeSlot>,
    events: HashMap<BookingId, EventDetails>,
    blocks: HashMap<(ProviderId, NaiveDate), AvailabilityBlock>,
}

#[derive(Debug, Clone)]
struct StoredBooking {
    booking: Booking,
    capacity_key: String,
    slot_ordinal: u32,
}

struct MemoryDay {
    store: MemoryStore,
    staged: Vec<(StoredBooking, Option<TimeSlot>, EventDetails)>,
    _lock: OwnedMutexGuard<()>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_provider(&self, provider: Provider) {
        self.tables().providers.insert(provider.id.clone(), provider);
    }

    pub fn add_block(&self, block: AvailabilityBlock) {
        self.tables()
            .blocks
            .insert((block.provider_id.clone(), block.date), block);
    }

    /// Insert an existing DJ booking directly, bypassing admission.
    pub fn seed_slot(&self, provider: &Provider, date: NaiveDate, range: TimeRange) -> BookingId {
        let id = self.seed_booking(provider, date);
        self.tables().slots.push(TimeSlot {
            booking_id: id,
            provider_id: provider.id.clone(),
            date,
            range,
            status: BookingStatus::Confirmed,
        });
        id
    }

    /// Insert an existing booking directly, bypassing admission. Counted in
    /// the provider's own scope for DJs and the shared scope for photobooths.
    pub fn seed_booking(&self, provider: &Provider, date: NaiveDate) -> BookingId {
        let id = Uuid::new_v4();
        let key = match provider.kind {
            ProviderKind::Dj => CapacityKey::Provider(provider.id.clone()),
            ProviderKind::Photobooth => CapacityKey::Category(ProviderKind::Photobooth),
        };
        let capacity_key = key.to_string();
        let mut tables = self.tables();
        let used = tables.used_ordinals(&capacity_key, date);
        let slot_ordinal = (1..).find(|n| !used.contains(n)).unwrap_or(1);
        tables.bookings.push(StoredBooking {
            booking: Booking {
                id,
                requester_id: "seed".to_string(),
                provider_id: provider.id.clone(),
                service: provider.kind,
                date,
                status: BookingStatus::Confirmed,
                total_price_cents: None,
            },
            capacity_key,
            slot_ordinal,
        });
        id
    }

    /// Mark a booking and its slot cancelled.
    pub fn cancel(&self, id: BookingId) {
        let mut tables = self.tables();
        for b in tables.bookings.iter_mut().filter(|b| b.booking.id == id) {
            b.booking.status = BookingStatus::Cancelled;
        }
        for s in tables.slots.iter_mut().filter(|s| s.booking_id == id) {
            s.status = BookingStatus::Cancelled;
        }
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.tables().bookings.iter().map(|b| b.booking.clone()).collect()
    }

    pub fn slots(&self) -> Vec<TimeSlot> {
        self.tables().slots.clone()
    }

    pub fn event(&self, id: BookingId) -> Option<EventDetails> {
        self.tables().events.get(&id).cloned()
    }
}

impl Tables {
    fn block_for(&self, provider_id: &ProviderId, date: NaiveDate) -> Option<AvailabilityBlock> {
        self.blocks.get(&(provider_id.clone(), date)).cloned()
    }

    fn count(&self, key: &CapacityKey, date: NaiveDate) -> u32 {
        self.bookings
            .iter()
            .map(|b| &b.booking)
            .filter(|b| b.date == date && b.status.is_active())
            .filter(|b| match key {
                CapacityKey::Provider(id) => &b.provider_id == id,
                CapacityKey::Category(kind) => b.service == *kind,
            })
            .count() as u32
    }

    fn active_slots(&self, provider_id: &ProviderId, date: NaiveDate) -> Vec<TimeRange> {
        let mut slots: Vec<TimeRange> = self
            .slots
            .iter()
            .filter(|s| &s.provider_id == provider_id && s.date == date && s.status.is_active())
            .map(|s| s.range)
            .collect();
        slots.sort_by_key(|s| s.start);
        slots
    }

    fn day_state(&self, provider: &Provider, key: &CapacityKey, date: NaiveDate) -> DayState {
        let slots = match provider.kind {
            ProviderKind::Dj => self.active_slots(&provider.id, date),
            ProviderKind::Photobooth => Vec::new(),
        };
        let booking_count = match provider.kind {
            ProviderKind::Dj => slots.len() as u32,
            ProviderKind::Photobooth => self.count(key, date),
        };
        DayState {
            block: self.block_for(&provider.id, date),
            booking_count,
            slots,
        }
    }

    fn used_ordinals(&self, capacity_key: &str, date: NaiveDate) -> Vec<u32> {
        self.bookings
            .iter()
            .filter(|b| {
                b.capacity_key == capacity_key && b.booking.date == date && b.booking.status.is_active()
            })
            .map(|b| b.slot_ordinal)
            .collect()
    }
}

#[async_trait]
impl AvailabilityBlockStore for MemoryStore {
    async fn block_for(
        &self,
        provider_id: &ProviderId,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityBlock>, Error> {
        Ok(self.tables().block_for(provider_id, date))
    }

    async fn blocked_dates(
        &self,
        provider_id: &ProviderId,
        span: DateSpan,
    ) -> Result<Vec<NaiveDate>, Error> {
        let mut dates: Vec<NaiveDate> = self
            .tables()
            .blocks
            .keys()
            .filter(|(id, d)| id == provider_id && *d >= span.first && *d <= span.last)
            .map(|(_, d)| *d)
            .collect();
        dates.sort();
        Ok(dates)
    }

    async fn block(&self, block: AvailabilityBlock) -> Result<(), Error> {
        self.add_block(block);
        Ok(())
    }

    async fn unblock(&self, provider_id: &ProviderId, date: NaiveDate) -> Result<bool, Error> {
        Ok(self
            .tables()
            .blocks
            .remove(&(provider_id.clone(), date))
            .is_some())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn provider(&self, id: &ProviderId) -> Result<Provider, Error> {
        self.tables()
            .providers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(id.clone()))
    }

    async fn active_booking_count(
        &self,
        key: &CapacityKey,
        date: NaiveDate,
    ) -> Result<u32, Error> {
        Ok(self.tables().count(key, date))
    }

    async fn active_slots(
        &self,
        provider_id: &ProviderId,
        date: NaiveDate,
    ) -> Result<Vec<TimeRange>, Error> {
        Ok(self.tables().active_slots(provider_id, date))
    }

    async fn booking_counts(
        &self,
        key: &CapacityKey,
        span: DateSpan,
    ) -> Result<Vec<DailyCount>, Error> {
        let tables = self.tables();
        Ok(span
            .first
            .iter_days()
            .take_while(|d| *d <= span.last)
            .map(|date| DailyCount {
                date,
                count: tables.count(key, date),
            })
            .filter(|c| c.count > 0)
            .collect())
    }

    async fn slot_summaries(
        &self,
        provider_id: &ProviderId,
        span: DateSpan,
        threshold: ClockTime,
    ) -> Result<Vec<DailySlotSummary>, Error> {
        let tables = self.tables();
        Ok(span
            .first
            .iter_days()
            .take_while(|d| *d <= span.last)
            .filter_map(|date| {
                let slots = tables.active_slots(provider_id, date);
                (!slots.is_empty()).then(|| DailySlotSummary {
                    date,
                    count: slots.len() as u32,
                    has_afternoon_slot: slots.iter().any(|s| s.start >= threshold),
                })
            })
            .collect())
    }

    async fn begin_day(
        &self,
        key: &CapacityKey,
        date: NaiveDate,
    ) -> Result<Box<dyn DayTransaction>, Error> {
        let lock = self
            .day_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.day_key(date))
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        Ok(Box::new(MemoryDay {
            store: self.clone(),
            staged: Vec::new(),
            _lock: guard,
        }))
    }
}

#[async_trait]
impl DayTransaction for MemoryDay {
    async fn day_state(
        &mut self,
        provider: &Provider,
        key: &CapacityKey,
        date: NaiveDate,
    ) -> Result<DayState, Error> {
        Ok(self.store.tables().day_state(provider, key, date))
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> Result<BookingId, Error> {
        let capacity_key = booking.capacity_key.to_string();
        let mut used = self.store.tables().used_ordinals(&capacity_key, booking.date);
        used.extend(self.staged.iter().map(|(b, _, _)| b.slot_ordinal));
        let slot_ordinal = (1..=booking.capacity)
            .find(|n| !used.contains(n))
            .ok_or_else(|| {
                Error::Conflict("capacity was taken by a concurrent booking".to_string())
            })?;

        let id = Uuid::new_v4();
        let stored = StoredBooking {
            booking: Booking {
                id,
                requester_id: booking.requester_id.clone(),
                provider_id: booking.provider.id.clone(),
                service: booking.service(),
                date: booking.date,
                status: BookingStatus::Pending,
                total_price_cents: Some(booking.total_price_cents),
            },
            capacity_key,
            slot_ordinal,
        };
        let slot = booking.provider.is_dj().then(|| TimeSlot {
            booking_id: id,
            provider_id: booking.provider.id.clone(),
            date: booking.date,
            range: booking.slot,
            status: BookingStatus::Pending,
        });
        self.staged.push((stored, slot, booking.event.clone()));
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let MemoryDay { store, staged, _lock } = *self;
        let mut tables = store.tables();
        for (booking, slot, event) in staged {
            tables.events.insert(booking.booking.id, event);
            tables.bookings.push(booking);
            tables.slots.extend(slot);
        }
        Ok(())
    }
}

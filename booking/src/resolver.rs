use std::sync::Arc;

use abi::{
    format_hours, gap_minutes, AvailabilityResult, BookingRules, Error, Provider, ProviderKind,
    TimeRange,
};
use chrono::NaiveDate;
use tracing::debug;

use crate::{AvailabilityBlockStore, BookingRepository, DayState};

/// Decides whether a provider can take a booking on a date.
#[derive(Clone)]
pub struct ConflictResolver {
    rules: BookingRules,
    repo: Arc<dyn BookingRepository>,
    blocks: Arc<dyn AvailabilityBlockStore>,
}

/// How a requested slot sits relative to one existing slot.
struct Spacing {
    existing: TimeRange,
    gap: i32,
}

impl ConflictResolver {
    pub fn new(
        rules: BookingRules,
        repo: Arc<dyn BookingRepository>,
        blocks: Arc<dyn AvailabilityBlockStore>,
    ) -> Self {
        Self {
            rules,
            repo,
            blocks,
        }
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    /// Evaluate against the current persisted state.
    pub async fn check(
        &self,
        provider: &Provider,
        date: NaiveDate,
        requested: Option<TimeRange>,
    ) -> Result<AvailabilityResult, Error> {
        let state = self.load_day(provider, date).await?;
        let result = self.evaluate(provider, &state, requested);
        debug!(
            provider = %provider.id,
            %date,
            available = result.available,
            reason = %result.reason,
            "availability checked"
        );
        Ok(result)
    }

    async fn load_day(&self, provider: &Provider, date: NaiveDate) -> Result<DayState, Error> {
        let block = self.blocks.block_for(&provider.id, date);
        match provider.kind {
            ProviderKind::Dj => {
                let (block, slots) =
                    tokio::try_join!(block, self.repo.active_slots(&provider.id, date))?;
                Ok(DayState {
                    block,
                    booking_count: slots.len() as u32,
                    slots,
                })
            }
            ProviderKind::Photobooth => {
                let key = self.rules.capacity_key(provider);
                let (block, booking_count) =
                    tokio::try_join!(block, self.repo.active_booking_count(&key, date))?;
                Ok(DayState {
                    block,
                    booking_count,
                    slots: Vec::new(),
                })
            }
        }
    }

    /// Pure admission decision over an already loaded [`DayState`].
    pub fn evaluate(
        &self,
        provider: &Provider,
        day: &DayState,
        requested: Option<TimeRange>,
    ) -> AvailabilityResult {
        let max = self.rules.capacity(provider.kind);
        let count = match provider.kind {
            ProviderKind::Dj => day.slots.len() as u32,
            ProviderKind::Photobooth => day.booking_count,
        };

        if let Some(block) = &day.block {
            let reason = match block.reason.as_deref().map(str::trim) {
                Some(r) if !r.is_empty() => format!("manually blocked: {}", r),
                _ => "manually blocked".to_string(),
            };
            return AvailabilityResult::unavailable(reason, count, max);
        }

        match provider.kind {
            ProviderKind::Photobooth => self.evaluate_photobooth(count, max),
            ProviderKind::Dj => self.evaluate_dj(&day.slots, requested, max),
        }
    }

    fn evaluate_photobooth(&self, count: u32, max: u32) -> AvailabilityResult {
        if count < max {
            AvailabilityResult::available(
                format!("{} of {} photobooth units available", max - count, max),
                count,
                max,
            )
        } else {
            AvailabilityResult::unavailable(
                format!("All {} photobooth units are booked on this date", max),
                count,
                max,
            )
        }
    }

    fn evaluate_dj(
        &self,
        slots: &[TimeRange],
        requested: Option<TimeRange>,
        max: u32,
    ) -> AvailabilityResult {
        let count = slots.len() as u32;
        let threshold = self.rules.day_threshold;
        let min_gap = i32::from(self.rules.min_gap_minutes);

        if slots.is_empty() {
            return AvailabilityResult::available("No bookings on this date", 0, max)
                .with_double_booking();
        }
        if count >= max {
            return AvailabilityResult::unavailable(
                format!("DJ already has maximum {} bookings on this date", max),
                count,
                max,
            );
        }
        if let Some(late) = slots.iter().find(|s| s.start >= threshold) {
            return AvailabilityResult::unavailable(
                format!(
                    "afternoon/evening event blocks full day: existing booking {} starts at or after {}, full day blocked",
                    late, threshold
                ),
                count,
                max,
            )
            .with_existing(*late);
        }

        let requested = match requested {
            Some(r) => r,
            None => {
                let existing = slots[0];
                return AvailabilityResult::available(
                    format!(
                        "Morning booking {} exists; a second booking needs a {} hour gap",
                        existing,
                        format_hours(min_gap)
                    ),
                    count,
                    max,
                )
                .with_double_booking()
                .with_existing(existing);
            }
        };

        let Some(Spacing { existing, gap }) = slots
            .iter()
            .map(|existing| Spacing::between(*existing, requested))
            .min_by_key(|s| s.gap)
        else {
            return AvailabilityResult::available("No bookings on this date", 0, max)
                .with_double_booking();
        };

        if gap < 0 {
            return AvailabilityResult::unavailable(
                format!(
                    "Time conflict: requested {} overlaps existing booking {}",
                    requested, existing
                ),
                count,
                max,
            )
            .with_existing(existing);
        }
        if gap < min_gap {
            let label = if requested.start >= threshold {
                "Insufficient gap"
            } else {
                "Time conflict"
            };
            return AvailabilityResult::unavailable(
                format!(
                    "{}: only {} hours between bookings, minimum {} hours required",
                    label,
                    format_hours(gap),
                    format_hours(min_gap)
                ),
                count,
                max,
            )
            .with_existing(existing);
        }

        AvailabilityResult::available(
            format!(
                "Double booking possible: {} hours gap from existing booking {}",
                format_hours(gap),
                existing
            ),
            count,
            max,
        )
        .with_double_booking()
        .with_existing(existing)
    }
}

impl Spacing {
    /// Orders the two slots chronologically and measures the single gap
    /// between the earlier end and the later start.
    fn between(existing: TimeRange, requested: TimeRange) -> Self {
        let gap = if requested.start < existing.start {
            gap_minutes(requested.end, existing.start)
        } else {
            gap_minutes(existing.end, requested.start)
        };
        Self { existing, gap }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use abi::{AvailabilityBlock, ClockTime};
    use proptest::prelude::*;

    fn resolver() -> ConflictResolver {
        let store = Arc::new(MemoryStore::default());
        ConflictResolver::new(BookingRules::default(), store.clone(), store)
    }

    fn range(start: &str, end: &str) -> TimeRange {
        TimeRange::parse(start, end).unwrap()
    }

    fn dj_day(slots: &[TimeRange]) -> DayState {
        DayState {
            block: None,
            booking_count: slots.len() as u32,
            slots: slots.to_vec(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()
    }

    #[test]
    fn empty_dj_day_should_allow_double_booking() {
        let result = resolver().evaluate(&Provider::dj("dj-1"), &dj_day(&[]), None);
        assert!(result.available);
        assert!(result.can_double_book);
        assert_eq!(result.bookings_count, 0);
        assert_eq!(result.max_bookings, 2);
    }

    #[test]
    fn request_after_three_hour_gap_should_be_available() {
        let result = resolver().evaluate(
            &Provider::dj("dj-1"),
            &dj_day(&[range("09:00", "13:00")]),
            Some(range("16:00", "20:00")),
        );
        assert!(result.available, "{}", result.reason);
        assert!(result.can_double_book);
        assert_eq!(result.bookings_count, 1);
        assert_eq!(result.existing_booking, Some(range("09:00", "13:00")));
    }

    #[test]
    fn afternoon_request_with_short_gap_should_report_hours() {
        let result = resolver().evaluate(
            &Provider::dj("dj-1"),
            &dj_day(&[range("09:00", "13:00")]),
            Some(range("15:00", "19:00")),
        );
        assert!(!result.available);
        assert!(result.reason.starts_with("Insufficient gap"), "{}", result.reason);
        assert!(result.reason.contains("2.0 hours"), "{}", result.reason);
    }

    #[test]
    fn morning_request_with_short_gap_should_be_time_conflict() {
        let result = resolver().evaluate(
            &Provider::dj("dj-1"),
            &dj_day(&[range("06:00", "08:00")]),
            Some(range("10:00", "10:30")),
        );
        assert!(!result.available);
        assert!(result.reason.starts_with("Time conflict"), "{}", result.reason);
        assert!(result.reason.contains("2.0 hours"));
    }

    #[test]
    fn afternoon_event_should_block_full_day() {
        let result = resolver().evaluate(
            &Provider::dj("dj-1"),
            &dj_day(&[range("12:00", "16:00")]),
            Some(range("20:00", "23:00")),
        );
        assert!(!result.available);
        assert!(result.reason.contains("full day blocked"));

        let result = resolver().evaluate(
            &Provider::dj("dj-1"),
            &dj_day(&[range("11:00", "12:00")]),
            None,
        );
        assert!(!result.available);
    }

    #[test]
    fn two_slots_should_fill_dj_day() {
        let result = resolver().evaluate(
            &Provider::dj("dj-1"),
            &dj_day(&[range("08:00", "10:00"), range("14:00", "18:00")]),
            Some(range("21:00", "23:00")),
        );
        assert!(!result.available);
        assert_eq!(result.bookings_count, 2);
        assert!(result.reason.contains("maximum 2 bookings"));
    }

    #[test]
    fn overlapping_request_should_be_rejected() {
        let result = resolver().evaluate(
            &Provider::dj("dj-1"),
            &dj_day(&[range("09:00", "13:00")]),
            Some(range("10:00", "12:00")),
        );
        assert!(!result.available);
        assert!(result.reason.contains("overlaps"));
    }

    #[test]
    fn request_before_existing_slot_should_use_chronological_gap() {
        let resolver = resolver();
        let dj = Provider::dj("dj-1");
        let day = dj_day(&[range("10:00", "10:30")]);

        let result = resolver.evaluate(&dj, &day, Some(range("05:00", "07:00")));
        assert!(result.available, "{}", result.reason);

        let result = resolver.evaluate(&dj, &day, Some(range("06:00", "08:00")));
        assert!(!result.available);
        assert!(result.reason.contains("2.0 hours"));
    }

    #[test]
    fn morning_slot_without_requested_time_should_allow_double_booking() {
        let result = resolver().evaluate(
            &Provider::dj("dj-1"),
            &dj_day(&[range("09:00", "13:00")]),
            None,
        );
        assert!(result.available);
        assert!(result.can_double_book);
        assert_eq!(result.existing_booking, Some(range("09:00", "13:00")));
    }

    #[test]
    fn photobooth_should_admit_below_capacity() {
        let resolver = resolver();
        let booth = Provider::photobooth("booth-a");
        let day = |n| DayState {
            booking_count: n,
            ..DayState::default()
        };
        let result = resolver.evaluate(&booth, &day(1), None);
        assert!(result.available);
        assert!(!result.can_double_book);
        assert_eq!(result.bookings_count, 1);

        let result = resolver.evaluate(&booth, &day(2), None);
        assert!(!result.available);
    }

    #[test]
    fn manual_block_should_always_win() {
        let resolver = resolver();
        let block = AvailabilityBlock::new("dj-1", date(), Some("private event".into()));
        let day = DayState {
            block: Some(block),
            ..DayState::default()
        };
        let result = resolver.evaluate(&Provider::dj("dj-1"), &day, None);
        assert!(!result.available);
        assert_eq!(result.reason, "manually blocked: private event");

        let day = DayState {
            block: Some(AvailabilityBlock::new("booth-a", date(), None)),
            ..DayState::default()
        };
        let result = resolver.evaluate(&Provider::photobooth("booth-a"), &day, None);
        assert!(!result.available);
        assert_eq!(result.reason, "manually blocked");
    }

    #[tokio::test]
    async fn check_should_read_from_store() {
        let store = Arc::new(MemoryStore::default());
        let dj = Provider::dj("dj-1");
        store.add_provider(dj.clone());
        store.seed_slot(&dj, date(), range("09:00", "13:00"));
        let resolver = ConflictResolver::new(BookingRules::default(), store.clone(), store.clone());

        let result = resolver
            .check(&dj, date(), Some(range("15:00", "19:00")))
            .await
            .unwrap();
        assert!(!result.available);

        store.add_block(AvailabilityBlock::new("dj-1", date().succ_opt().unwrap(), None));
        let result = resolver
            .check(&dj, date().succ_opt().unwrap(), None)
            .await
            .unwrap();
        assert_eq!(result.reason, "manually blocked");
    }

    fn clock() -> impl Strategy<Value = u16> {
        0u16..1380
    }

    fn slot() -> impl Strategy<Value = TimeRange> {
        (clock(), 30u16..=240).prop_map(|(start, len)| {
            let end = (start + len).min(1440);
            TimeRange::new(
                ClockTime::from_minutes(start).unwrap(),
                ClockTime::from_minutes(end).unwrap(),
            )
            .unwrap()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            max_global_rejects: 16384,
            ..ProptestConfig::default()
        })]

        #[test]
        fn photobooth_availability_is_capacity_and_block(count in 0u32..5, blocked in any::<bool>()) {
            let day = DayState {
                block: blocked.then(|| AvailabilityBlock::new("booth-a", date(), None)),
                booking_count: count,
                slots: Vec::new(),
            };
            let result = resolver().evaluate(&Provider::photobooth("booth-a"), &day, None);
            prop_assert_eq!(result.available, !blocked && count < 2);
        }

        #[test]
        fn full_dj_day_is_never_available(a in slot(), b in slot(), req in proptest::option::of(slot())) {
            let result = resolver().evaluate(&Provider::dj("dj-1"), &dj_day(&[a, b]), req);
            prop_assert!(!result.available);
        }

        #[test]
        fn afternoon_slot_blocks_any_request(existing in slot(), req in slot()) {
            prop_assume!(existing.start >= ClockTime::DAY_THRESHOLD);
            let result = resolver().evaluate(&Provider::dj("dj-1"), &dj_day(&[existing]), Some(req));
            prop_assert!(!result.available);
        }

        #[test]
        fn morning_requests_need_three_hour_gap(existing in slot(), req in slot()) {
            prop_assume!(existing.start < ClockTime::DAY_THRESHOLD);
            prop_assume!(req.start < ClockTime::DAY_THRESHOLD);
            prop_assume!(req.start >= existing.start);
            let result = resolver().evaluate(&Provider::dj("dj-1"), &dj_day(&[existing]), Some(req));
            let gap = gap_minutes(existing.end, req.start);
            prop_assert_eq!(result.available, gap >= 180);
        }
    }
}

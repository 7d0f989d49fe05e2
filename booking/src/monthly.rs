use std::sync::Arc;

use abi::{
    month_days, BookingRules, DailyCount, DailySlotSummary, DayAvailability, Error,
    MonthlyAvailability, Provider, ProviderKind,
};
use chrono::NaiveDate;
use tracing::debug;

use crate::{AvailabilityBlockStore, BookingRepository, DateSpan};

/// Builds the per-day availability grid of a month with one grouped query per
/// table instead of a check per day.
#[derive(Clone)]
pub struct MonthlyAggregator {
    rules: BookingRules,
    repo: Arc<dyn BookingRepository>,
    blocks: Arc<dyn AvailabilityBlockStore>,
}

/// Grouped booking data of a month, by provider kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthUsage {
    Photobooth(Vec<DailyCount>),
    Dj(Vec<DailySlotSummary>),
}

impl MonthlyAggregator {
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

    pub async fn monthly(
        &self,
        provider: &Provider,
        year: i32,
        month: u32,
    ) -> Result<MonthlyAvailability, Error> {
        let days = month_days(year, month)?;
        let span = match (days.first(), days.last()) {
            (Some(first), Some(last)) => DateSpan::new(*first, *last),
            _ => return Ok(MonthlyAvailability::new()),
        };

        let blocked = self.blocks.blocked_dates(&provider.id, span);
        let (blocked, usage) = match provider.kind {
            ProviderKind::Photobooth => {
                let key = self.rules.capacity_key(provider);
                let (blocked, counts) =
                    tokio::try_join!(blocked, self.repo.booking_counts(&key, span))?;
                (blocked, MonthUsage::Photobooth(counts))
            }
            ProviderKind::Dj => {
                let summaries =
                    self.repo
                        .slot_summaries(&provider.id, span, self.rules.day_threshold);
                let (blocked, summaries) = tokio::try_join!(blocked, summaries)?;
                (blocked, MonthUsage::Dj(summaries))
            }
        };
        debug!(
            provider = %provider.id,
            year,
            month,
            blocked = blocked.len(),
            "monthly availability loaded"
        );

        Ok(aggregate(&self.rules, provider.kind, &days, &usage, &blocked))
    }
}

/// Fold grouped usage and manual blocks onto a fully open month.
pub fn aggregate(
    rules: &BookingRules,
    kind: ProviderKind,
    days: &[NaiveDate],
    usage: &MonthUsage,
    blocked: &[NaiveDate],
) -> MonthlyAvailability {
    let capacity = rules.capacity(kind);
    let mut grid: MonthlyAvailability = days
        .iter()
        .map(|d| (*d, DayAvailability::open(capacity)))
        .collect();

    match usage {
        MonthUsage::Photobooth(counts) => {
            for c in counts {
                if let Some(day) = grid.get_mut(&c.date) {
                    *day = day.with_booked(c.count);
                }
            }
        }
        MonthUsage::Dj(summaries) => {
            for s in summaries {
                if let Some(day) = grid.get_mut(&s.date) {
                    *day = if s.count >= capacity || s.has_afternoon_slot {
                        day.full()
                    } else {
                        day.with_booked(s.count)
                    };
                }
            }
        }
    }

    for date in blocked {
        if let Some(day) = grid.get_mut(date) {
            *day = day.blocked();
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use abi::{AvailabilityBlock, TimeRange};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn june() -> Vec<NaiveDate> {
        month_days(2025, 6).unwrap()
    }

    #[test]
    fn empty_month_should_be_fully_open() {
        let grid = aggregate(
            &BookingRules::default(),
            ProviderKind::Dj,
            &june(),
            &MonthUsage::Dj(vec![]),
            &[],
        );
        assert_eq!(grid.len(), 30);
        assert!(grid.values().all(|d| *d == DayAvailability::open(2)));
    }

    #[test]
    fn photobooth_counts_should_reduce_remaining_slots() {
        let usage = MonthUsage::Photobooth(vec![
            DailyCount { date: d(3), count: 1 },
            DailyCount { date: d(4), count: 2 },
        ]);
        let grid = aggregate(&BookingRules::default(), ProviderKind::Photobooth, &june(), &usage, &[d(5)]);

        assert!(grid[&d(3)].available);
        assert_eq!(grid[&d(3)].remaining_slots, 1);
        assert!(!grid[&d(4)].available);
        assert_eq!(grid[&d(4)].remaining_slots, 0);
        assert!(!grid[&d(4)].blocked);
        assert!(grid[&d(5)].blocked);
        assert!(!grid[&d(5)].available);
        assert_eq!(grid[&d(6)], DayAvailability::open(2));
    }

    #[test]
    fn dj_afternoon_slot_should_close_day() {
        let usage = MonthUsage::Dj(vec![
            DailySlotSummary { date: d(7), count: 1, has_afternoon_slot: true },
            DailySlotSummary { date: d(8), count: 1, has_afternoon_slot: false },
            DailySlotSummary { date: d(9), count: 2, has_afternoon_slot: false },
        ]);
        let grid = aggregate(&BookingRules::default(), ProviderKind::Dj, &june(), &usage, &[d(8)]);

        assert!(!grid[&d(7)].available);
        assert_eq!(grid[&d(7)].remaining_slots, 0);
        assert!(grid[&d(8)].blocked);
        assert_eq!(grid[&d(8)].remaining_slots, 0);
        assert!(!grid[&d(9)].available);
        assert_eq!(grid[&d(10)].remaining_slots, 2);
    }

    #[tokio::test]
    async fn monthly_should_combine_store_data() {
        let store = Arc::new(MemoryStore::default());
        let dj = Provider::dj("dj-1");
        store.add_provider(dj.clone());
        store.seed_slot(&dj, d(14), TimeRange::parse("09:00", "13:00").unwrap());
        store.seed_slot(&dj, d(15), TimeRange::parse("18:00", "23:00").unwrap());
        store.add_block(AvailabilityBlock::new("dj-1", d(20), Some("holiday".into())));
        // outside the month
        store.seed_slot(&dj, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(), TimeRange::parse("18:00", "23:00").unwrap());

        let aggregator = MonthlyAggregator::new(BookingRules::default(), store.clone(), store);
        let grid = aggregator.monthly(&dj, 2025, 6).await.unwrap();

        assert_eq!(grid.len(), 30);
        assert_eq!(grid[&d(14)].remaining_slots, 1);
        assert!(grid[&d(14)].available);
        assert!(!grid[&d(15)].available);
        assert!(grid[&d(20)].blocked);
        assert_eq!(grid[&d(1)], DayAvailability::open(2));
    }

    #[tokio::test]
    async fn invalid_month_should_be_rejected() {
        let store = Arc::new(MemoryStore::default());
        let aggregator = MonthlyAggregator::new(BookingRules::default(), store.clone(), store);
        let err = aggregator
            .monthly(&Provider::dj("dj-1"), 2025, 13)
            .await
            .unwrap_err();
        assert_eq!(err, Error::InvalidDate("2025-13".into()));
    }
}

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{CapacityKey, ClockTime, Error, Provider, ProviderKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub rules: BookingRules,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

fn default_pool_size() -> u32 {
    5
}

impl Config {
    pub fn load(filename: impl AsRef<Path>) -> Result<Self, Error> {
        let config = fs::read_to_string(filename.as_ref())?;
        Ok(serde_yaml::from_str(&config)?)
    }
}

impl DbConfig {
    pub fn server_url(&self) -> String {
        if self.password.is_empty() {
            format!("postgres://{}@{}:{}", self.user, self.host, self.port)
        } else {
            format!(
                "postgres://{}:{}@{}:{}",
                self.user, self.password, self.host, self.port
            )
        }
    }

    pub fn url(&self) -> String {
        format!("{}/{}", self.server_url(), self.dbname)
    }
}

/// How photobooth capacity is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoboothScope {
    /// All units share one daily capacity, counted by service category.
    #[default]
    Shared,
    /// Each unit has its own daily capacity.
    PerUnit,
}

/// Admission policy constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingRules {
    /// A DJ event starting at or after this time blocks the whole day.
    pub day_threshold: ClockTime,
    pub min_gap_minutes: u16,
    pub dj_max_slots: u32,
    pub photobooth_capacity: u32,
    pub photobooth_scope: PhotoboothScope,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            day_threshold: ClockTime::DAY_THRESHOLD,
            min_gap_minutes: 180,
            dj_max_slots: 2,
            photobooth_capacity: 2,
            photobooth_scope: PhotoboothScope::Shared,
        }
    }
}

impl BookingRules {
    pub fn capacity(&self, kind: ProviderKind) -> u32 {
        match kind {
            ProviderKind::Dj => self.dj_max_slots,
            ProviderKind::Photobooth => self.photobooth_capacity,
        }
    }

    pub fn capacity_key(&self, provider: &Provider) -> CapacityKey {
        match (provider.kind, self.photobooth_scope) {
            (ProviderKind::Photobooth, PhotoboothScope::Shared) => {
                CapacityKey::Category(ProviderKind::Photobooth)
            }
            _ => CapacityKey::Provider(provider.id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub dj_hourly_cents: i64,
    pub photobooth_hourly_cents: i64,
    pub minimum_hours: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            dj_hourly_cents: 15_000,
            photobooth_hourly_cents: 10_000,
            minimum_hours: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_should_be_loaded() {
        let config = Config::load("../service/fixtures/config.yml").unwrap();
        assert_eq!(
            config.db,
            DbConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                dbname: "booking".to_string(),
                max_connections: 5,
            }
        );
        assert_eq!(config.rules.day_threshold.to_string(), "11:00");
        assert_eq!(config.rules.min_gap_minutes, 180);
        assert_eq!(config.rules.photobooth_scope, PhotoboothScope::Shared);
        assert_eq!(config.notification.timeout(), Duration::from_millis(3_000));
        assert_eq!(config.pricing.dj_hourly_cents, 15_000);
    }

    #[test]
    fn missing_sections_should_default() {
        let config: Config = serde_yaml::from_str(
            "db:\n  host: db\n  port: 5433\n  user: app\n  password: ''\n  dbname: booking\n",
        )
        .unwrap();
        assert_eq!(config.rules, BookingRules::default());
        assert_eq!(config.db.max_connections, 5);
        assert_eq!(config.db.url(), "postgres://app@db:5433/booking");
    }

    #[test]
    fn malformed_threshold_should_fail_to_parse() {
        let err = serde_yaml::from_str::<BookingRules>("day_threshold: '11h'").unwrap_err();
        assert!(err.to_string().contains("invalid time"));
    }

    #[test]
    fn capacity_key_should_follow_photobooth_scope() {
        let unit = Provider::photobooth("booth-a");
        let dj = Provider::dj("dj-1");
        let shared = BookingRules::default();
        assert_eq!(
            shared.capacity_key(&unit),
            CapacityKey::Category(ProviderKind::Photobooth)
        );
        assert_eq!(shared.capacity_key(&dj), CapacityKey::Provider("dj-1".into()));

        let per_unit = BookingRules {
            photobooth_scope: PhotoboothScope::PerUnit,
            ..BookingRules::default()
        };
        assert_eq!(
            per_unit.capacity_key(&unit),
            CapacityKey::Provider("booth-a".into())
        );
    }
}

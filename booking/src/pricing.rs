use abi::{PricingConfig, ProviderKind};

/// Deterministic price of a booking, in cents.
pub trait PricingPolicy: Send + Sync {
    fn price(&self, service: ProviderKind, hours: f64) -> i64;
}

/// Hourly rate per service with a minimum billable duration.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyPricing {
    config: PricingConfig,
}

impl HourlyPricing {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }
}

impl PricingPolicy for HourlyPricing {
    fn price(&self, service: ProviderKind, hours: f64) -> i64 {
        let rate = match service {
            ProviderKind::Dj => self.config.dj_hourly_cents,
            ProviderKind::Photobooth => self.config.photobooth_hourly_cents,
        };
        let billable = hours.max(self.config.minimum_hours);
        (billable * rate as f64).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_should_apply_rate_and_minimum() {
        let pricing = HourlyPricing::new(PricingConfig::default());
        assert_eq!(pricing.price(ProviderKind::Dj, 4.0), 60_000);
        assert_eq!(pricing.price(ProviderKind::Photobooth, 2.5), 25_000);
        assert_eq!(pricing.price(ProviderKind::Dj, 1.0), 30_000);
    }
}

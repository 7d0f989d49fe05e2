use std::sync::Arc;

use abi::{Config, Provider};
use booking::MemoryStore;
use booking_service::BookingService;

/// A service over an in-memory store seeded with one DJ and two photobooths.
pub struct TestService {
    pub store: Arc<MemoryStore>,
    pub service: BookingService,
}

impl TestService {
    pub fn with_providers(providers: &[Provider]) -> Self {
        let config = Config::load("fixtures/config.yml").unwrap();
        let store = Arc::new(MemoryStore::default());
        for p in providers {
            store.add_provider(p.clone());
        }
        let service = BookingService::with_store(store.clone(), &config);
        Self { store, service }
    }
}

impl Default for TestService {
    fn default() -> Self {
        Self::with_providers(&[
            Provider::dj("dj-1"),
            Provider::photobooth("booth-a"),
            Provider::photobooth("booth-b"),
        ])
    }
}

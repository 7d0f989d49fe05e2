use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "provider_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Dj,
    Photobooth,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Dj => "dj",
            ProviderKind::Photobooth => "photobooth",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bookable resource: one DJ or one photobooth unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Provider {
    pub id: ProviderId,
    pub kind: ProviderKind,
    #[serde(default)]
    pub name: String,
}

impl Provider {
    pub fn new(id: impl Into<ProviderId>, kind: ProviderKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
        }
    }

    pub fn dj(id: impl Into<ProviderId>) -> Self {
        Self::new(id, ProviderKind::Dj, "")
    }

    pub fn photobooth(id: impl Into<ProviderId>) -> Self {
        Self::new(id, ProviderKind::Photobooth, "")
    }

    pub fn is_dj(&self) -> bool {
        self.kind == ProviderKind::Dj
    }
}

/// The unit over which capacity is counted and admission is serialised.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapacityKey {
    Provider(ProviderId),
    Category(ProviderKind),
}

impl CapacityKey {
    /// Lock key for one day of this capacity unit.
    pub fn day_key(&self, date: chrono::NaiveDate) -> String {
        format!("{}@{}", self, date)
    }
}

impl fmt::Display for CapacityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityKey::Provider(id) => write!(f, "provider:{}", id),
            CapacityKey::Category(kind) => write!(f, "category:{}", kind),
        }
    }
}

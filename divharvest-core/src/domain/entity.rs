use serde::{Deserialize, Serialize};

use super::Symbol;

/// One unit of collection work: a listed ticker and the seed attributes the
/// listing call supplied for it.
///
/// Entities are read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub symbol: Symbol,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Entity {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            sector: None,
            industry: None,
            country: None,
        }
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }
}

/// Lifecycle of one entity within a run.
///
/// `Pending → InFlight → {Recorded, Skipped, Failed}`. The three right-hand
/// states are terminal and all count as "processed" for checkpointing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    Pending,
    InFlight,
    Recorded,
    Skipped,
    Failed,
}

impl EntityState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Recorded | Self::Skipped | Self::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: EntityState) -> bool {
        match (self, next) {
            (Self::Pending, Self::InFlight) => true,
            (Self::InFlight, n) => n.is_terminal(),
            _ => false,
        }
    }
}

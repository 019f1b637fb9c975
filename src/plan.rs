//! Release plans and their persisted encoding.
//!
//! A plan is stored on the reward record as a versioned JSON envelope:
//!
//! ```text
//! {"v":1,"events":[[1700000000,3],[1700000060,1]]}
//! ```
//!
//! Plans written before the envelope existed are a bare `[[ts,qty],...]` array
//! and still decode. An empty string means nothing is pending.

use crate::error::{PoolError, PoolResult};
use serde::{Deserialize, Serialize};

/// Current envelope version.
pub const PLAN_VERSION: u32 = 1;

/// A quantity that becomes claimable at `due_at` (unix seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i64, u64)", into = "(i64, u64)")]
pub struct ReleaseEvent {
    pub due_at: i64,
    pub quantity: u64,
}

impl From<(i64, u64)> for ReleaseEvent {
    fn from((due_at, quantity): (i64, u64)) -> Self {
        Self { due_at, quantity }
    }
}

impl From<ReleaseEvent> for (i64, u64) {
    fn from(event: ReleaseEvent) -> Self {
        (event.due_at, event.quantity)
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u32,
    events: Vec<ReleaseEvent>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Encoded {
    Versioned(Envelope),
    Legacy(Vec<ReleaseEvent>),
}

/// Ordered release schedule, ascending by due time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleasePlan {
    events: Vec<ReleaseEvent>,
}

/// Result of splitting a plan at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueSplit {
    /// Total quantity of every event due at or before the split time
    pub due: u64,
    /// Number of leading events consumed
    pub consumed: usize,
    /// Events still in the future
    pub remainder: ReleasePlan,
}

impl ReleasePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a plan from events, sorting them by due time.
    pub fn from_events(mut events: Vec<ReleaseEvent>) -> Self {
        events.sort_by_key(|e| e.due_at);
        Self { events }
    }

    pub fn events(&self) -> &[ReleaseEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.events.iter().map(|e| e.quantity).sum()
    }

    pub fn first_due(&self) -> Option<i64> {
        self.events.first().map(|e| e.due_at)
    }

    pub fn last_due(&self) -> Option<i64> {
        self.events.last().map(|e| e.due_at)
    }

    /// Sum everything due at or before `now` and keep the rest.
    ///
    /// Scanning stops at the first future event; events are never consumed out
    /// of order.
    pub fn split_due(&self, now: i64) -> DueSplit {
        let consumed = self
            .events
            .iter()
            .position(|e| e.due_at > now)
            .unwrap_or(self.events.len());
        let due = self.events[..consumed].iter().map(|e| e.quantity).sum();

        DueSplit {
            due,
            consumed,
            remainder: ReleasePlan {
                events: self.events[consumed..].to_vec(),
            },
        }
    }

    pub fn encode(&self) -> PoolResult<String> {
        if self.events.is_empty() {
            return Ok(String::new());
        }
        let envelope = Envelope {
            v: PLAN_VERSION,
            events: self.events.clone(),
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    pub fn decode(raw: &str) -> PoolResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::new());
        }

        let events = match serde_json::from_str::<Encoded>(raw)
            .map_err(|e| PoolError::Parse(format!("release plan: {}", e)))?
        {
            Encoded::Versioned(envelope) => {
                if envelope.v != PLAN_VERSION {
                    return Err(PoolError::Parse(format!(
                        "unsupported release plan version {}",
                        envelope.v
                    )));
                }
                envelope.events
            }
            Encoded::Legacy(events) => events,
        };

        if events.windows(2).any(|w| w[0].due_at > w[1].due_at) {
            return Err(PoolError::Parse(
                "release plan events are not in time order".to_string(),
            ));
        }

        Ok(Self { events })
    }
}

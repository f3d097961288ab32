//! # Shared Bus
//!
//! In-process event bus. Components publish [`ChainEvent`]s after their state
//! changes commit; observers (the node runtime, tests, future API layers)
//! subscribe with an [`EventFilter`].
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Contracts   │    publish()       │   Observer   │
//! │  Consensus   │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐           │
//!                  │  Event Bus   │ ──────────┘
//!                  └──────────────┘  subscribe()
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{ChainEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the slowest one lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

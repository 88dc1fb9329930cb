//! Condition-driven collection rule engine (§4.3).

mod engine;

pub use engine::{CollectionEngine, CollectionEvent};

//! The versioned configuration store for SlotLens.
//!
//! Owns the rule-set version DAG, the copy-on-write draft machinery, the
//! entity mutation and read API, and the booking-query pipeline on top of
//! `slotlens-core`.

pub mod error;
mod fork;
mod mutations;
mod reads;
mod rulesets;
mod scheduling;
mod store;
mod tables;

pub use error::{Result, StoreError};
pub use fork::EntityKind;
pub use mutations::{
    AppointmentTypeUpdates, BaseScheduleInput, BaseScheduleUpdates, LocationUpdates, Mutated,
    PractitionerUpdates, RuleUpdates,
};
pub use reads::VersionEntry;
pub use scheduling::{EngineConfig, ScheduleResult, SlotQuery};
pub use store::ConfigStore;

//! In-memory registries with file-per-entity persistence
//!
//! Initialisation order is fixed and acyclic:
//! types → producer callbacks → jobs → job status notifier → producers →
//! type subscriptions.

pub mod info_jobs;
pub mod info_producers;
pub mod info_types;
pub mod multimap;
pub mod store;
pub mod type_subscriptions;

pub use info_jobs::{InfoJob, InfoJobs};
pub use info_producers::{InfoProducer, InfoProducers, ProducerRegistrationInfo};
pub use info_types::{InfoType, InfoTypes};
pub use multimap::MultiMap;
pub use store::EntityStore;
pub use type_subscriptions::{ConsumerCallbackHandler, InfoTypeSubscriptions, SubscriptionInfo};

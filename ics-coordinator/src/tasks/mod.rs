//! Background tasks

pub mod producer_supervision;

pub use producer_supervision::ProducerSupervision;

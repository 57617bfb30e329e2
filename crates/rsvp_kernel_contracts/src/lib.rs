#![forbid(unsafe_code)]

pub mod admin;
pub mod common;
pub mod rsvp;

pub use common::{ContractViolation, SchemaVersion, Validate};

#![forbid(unsafe_code)]

pub mod error;
pub mod rsvp_admin;
pub mod rsvp_submission;

pub use error::RsvpServiceError;

#![forbid(unsafe_code)]

pub mod admin_auth;
pub mod rsvp_csv;
pub mod rsvp_intake;

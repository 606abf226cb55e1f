//! Session attributes shared across the requests of one client.
//!
//! A `Session` is the per-request view of the attributes; a `SessionStore`
//! keeps them between requests. The request momento and remembered logins
//! live here.

mod attributes;
mod store;

pub use attributes::*;
pub use store::*;

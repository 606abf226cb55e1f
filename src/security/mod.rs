//! Authentication orchestration for one request pipeline.
//!
//! Each configured scheme gets one [`AuthenticationContext`] per request.
//! [`MultiSchemeAuthentication`] reads them as one, [`ChallengeOrchestrator`]
//! challenges the client when access control is missing, and
//! [`LoginContinuation`] replays the challenged request after login.

mod access_control;
mod accumulator;
mod context;
mod continuation;
mod credentials;
mod momento;
mod multi;
mod negotiation;
mod orchestrator;
mod registry;
mod scheme;

#[cfg(test)]
pub mod testing;

pub use access_control::*;
pub use accumulator::*;
pub use context::*;
pub use continuation::*;
pub use credentials::*;
pub use momento::*;
pub use multi::*;
pub use negotiation::*;
pub use orchestrator::*;
pub use registry::*;
pub use scheme::*;

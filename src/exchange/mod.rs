//! The per-request exchange: everything the security core reads and writes
//! while servicing one inbound request.

mod flight;
mod state;

pub use flight::*;
pub use state::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::session::Session;

/// Live state of one request being serviced.
///
/// Shared between the handler, the authentication contexts of the request
/// and any scheme completions running on other tasks.
#[derive(Debug)]
pub struct Exchange {
    connection: Mutex<ConnectionState>,
    request: Mutex<RequestState>,
    response: Mutex<ResponseState>,
    session: Session,
    flights: FlightTracker,
    login_submission: AtomicBool,
}

impl Exchange {
    pub fn new(connection: ConnectionState, request: RequestState, session: Session) -> Arc<Self> {
        Arc::new(Self {
            connection: Mutex::new(connection),
            request: Mutex::new(request),
            response: Mutex::new(ResponseState::default()),
            session,
            flights: FlightTracker::new(),
            login_submission: AtomicBool::new(false),
        })
    }

    pub fn connection(&self) -> MutexGuard<'_, ConnectionState> {
        self.connection.lock()
    }

    pub fn request(&self) -> MutexGuard<'_, RequestState> {
        self.request.lock()
    }

    pub fn response(&self) -> MutexGuard<'_, ResponseState> {
        self.response.lock()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn flights(&self) -> &FlightTracker {
        &self.flights
    }

    /// The request's Accept header, if any.
    pub fn accept(&self) -> Option<String> {
        self.request().header("accept").map(str::to_string)
    }

    /// Mark the request as carrying login credentials. Such a request is
    /// never captured for replay.
    pub fn mark_login_submission(&self) {
        self.login_submission.store(true, Ordering::Release);
    }

    pub fn is_login_submission(&self) -> bool {
        self.login_submission.load(Ordering::Acquire)
    }

    /// Take the response written so far, leaving an empty sink.
    pub fn take_response(&self) -> ResponseState {
        std::mem::take(&mut *self.response())
    }
}

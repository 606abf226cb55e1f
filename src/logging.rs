//! Structured logs for the gateway.
//!
//! Scheme invocations, challenges and login continuations log with a
//! `scheme` field. In production these are JSON lines nested under the
//! request span opened by the HTTP trace layer, so one request's
//! authentication rounds can be followed across concurrent requests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Used when `RUST_LOG` is unset. Scheme-level events are `info` and above,
/// per-round negotiation detail is `debug`.
pub const DEFAULT_DIRECTIVES: &str = "authn_gate=info,tower_http=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the JSON subscriber for the server binary.
pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true),
        )
        .init();
}

/// Readable output for tests that exercise authentication rounds. Only the
/// security core logs at `debug`, so router noise stays out of test output.
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("authn_gate=info,authn_gate::security=debug")
        .try_init();
}

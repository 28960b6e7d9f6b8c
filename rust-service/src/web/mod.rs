//! HTTP surface of the dispatch service.
//!
//! Four JSON endpoints glue the external world to the workflow: the
//! scheduler-facing dispatch trigger plus the subscriber-facing
//! subscribe/verify/unsubscribe flows, which share the token codec with
//! the dispatcher. Adapters are built per invocation from validated
//! configuration, so a misconfigured deployment fails the request, not
//! the process start.

pub mod handlers;

pub use handlers::{
    dispatch_newsletter, health, subscribe, unsubscribe, verify, AppState, DispatchRequest,
    DispatchResponse, ErrorResponse, HealthResponse,
};

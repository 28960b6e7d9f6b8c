//! learnif. newsletter dispatch service.
//!
//! This library provides shared modules for the two binaries:
//! - `learnif-web`: HTTP server exposing the dispatch trigger and
//!   subscriber endpoints
//! - `learnif-dispatch`: one-shot runner performing a single dispatch
//!   invocation
//!
//! ## Architecture
//!
//! ```text
//! trigger → Dispatcher → Drive (fetch issue) → Sheets (list + filter)
//!         → Renderer (per recipient) → SMTP send → Sheets (mark sent)
//!         → Drive (mark issue done)
//! ```

pub mod config;
pub mod content;
pub mod dispatch;
pub mod google;
pub mod mailer;
pub mod render;
pub mod sheet;
pub mod token;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use content::{ContentPayload, ContentSource, PendingIssue};
pub use dispatch::{DispatchOutcome, DispatchReport, Dispatcher};
pub use mailer::{Mailer, OutboundEmail};
pub use sheet::{RecipientRecord, RecipientStore};
pub use web::AppState;

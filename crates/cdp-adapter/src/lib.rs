//! CDP adapter: drives one Chromium tab over the DevTools Protocol for the
//! duration of a single test run.
//!
//! [`client::CdpClient`] is the entry point — it owns the transport, the
//! mock interceptor, and the console/network capture buffers a run needs.
//! Everything else in this crate is plumbing it's built from.

pub mod client;
pub mod config;
pub mod dom_snapshot;
pub mod error;
pub mod events;
pub mod ids;
pub mod mock;
pub mod transport;
pub mod util;

pub use client::{start, Cdp, CdpClient, DialogAction};
pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use events::RawEvent;
pub use ids::{BrowserId, FrameId, PageId};
pub use mock::{MockDecision, MockInterceptor};
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, NoopTransport, TransportEvent};

//! The cache proxy: install, interception and generation sweep.
//!
//! A `Worker` owns one `Generation`. Installing seeds the generation's static
//! store from the `Manifest`; activating sweeps every store the generation
//! does not own; from then on the `Router` answers each request by class:
//!
//! - static assets: static store first, network on a miss, never written back
//! - API requests: API store first, network on a miss, `200 OK` responses
//!   stored, a JSON `503` fallback when the network is unreachable

mod generation;
mod hooks;
mod install;
mod manifest;
mod router;
mod sweep;
mod worker;

pub use generation::Generation;
pub use hooks::LoggingHooks;
pub use manifest::Manifest;
pub use router::Router;
pub use worker::{InstallOutcome, Worker};

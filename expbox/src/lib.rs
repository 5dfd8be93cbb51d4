//! Lightweight experiment bookkeeping.
//!
//! Each experiment run gets a directory ("box") under a results root holding
//! `meta.json`, a config snapshot and four fixed subdirectories. The crate is
//! split the usual way:
//!
//! - **[`core`]**: pure logic (ids, record types, index projection, flattening).
//! - **[`io`]**: filesystem stores, config files, git/environment probes and
//!   logger backends.
//!
//! Orchestration lives at the root: [`lifecycle`] (create, resume,
//! checkpoint), [`maintenance`] (soft-archive, sweep), [`session`] (the
//! active-experiment handle) and [`export`] (summaries and CSV).

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod export;
pub mod io;
pub mod lifecycle;
pub mod logging;
pub mod maintenance;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{ExpboxError, Result};
pub use lifecycle::{
    ExpContext, InitOptions, LoadOptions, SaveOptions, SaveOutcome, init_exp, load_exp, save_exp,
};
pub use session::Session;

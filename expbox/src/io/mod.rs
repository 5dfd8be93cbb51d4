//! Side-effecting helpers: filesystem layout and stores, config files,
//! external probes and logger backends.

pub mod active;
pub mod config;
pub mod csv;
pub mod env;
pub mod exp_logger;
pub mod git;
pub mod index_store;
pub mod layout;
pub mod meta_store;
pub mod process;
pub mod settings;

//! Pure bookkeeping logic (no I/O).

pub mod flatten;
pub mod ids;
pub mod index;
pub mod meta;
pub mod remote;
pub mod summary;

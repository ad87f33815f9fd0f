//! Integration tests: end-to-end scenarios against the scheduler, journal,
//! and config hot reload, using a scripted prober in place of real network
//! and database I/O.

mod common;
mod core;

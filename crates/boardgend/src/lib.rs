//! boardgend library surface, split out so the HTTP contract is testable.

pub mod server;

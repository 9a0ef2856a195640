// src/core/repository/mod.rs

//! Abstract storage interfaces the core consumes (§4.1, §6.3). The core never
//! assumes a particular storage engine; it only relies on these traits and
//! their ordering/atomicity contracts. An in-memory reference implementation
//! lives in [`memory`] and backs both the shipped binary and the test suite.

pub mod clients;
pub mod groups;
pub mod memory;
pub mod rules;
pub mod traffic;

pub use clients::ClientRepository;
pub use groups::{GroupRepository, NodeRepository};
pub use rules::RuleRepository;
pub use traffic::TrafficRowRepository;

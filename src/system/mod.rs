//! # System Contracts
//!
//! Everything the engine needs to drive the well-known on-chain contracts:
//! their addresses and storage positions, the ABI registry, the fee-free
//! call path, governance proposals, the address-list access controller and
//! the hard-fork upgrade descriptors.

pub mod abi;
pub mod access_control;
pub mod contracts;
pub mod governance;
pub mod invoker;
pub mod upgrades;

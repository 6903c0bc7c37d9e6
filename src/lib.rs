//! # This projects library
//!
//! This library lets a fleet of elevators share their calls without a master: calls are sold at
//! auction, every node schedules its own orders, and a gossiped ledger resells calls whose owner
//! stops delivering.
//!
//! ## Overview
//! - **Config**: Handles configuration settings.
//! - **Init**: Command line and node identity.
//! - **Network**: Publish/subscribe over UDP discovery and TCP.
//! - **TTL queue**: FIFO queue with expiring items, used by the seller and the publishers.
//! - **Auction**: Seller and buyer.
//! - **Scheduler**: Trip ordering, pricing and the order handler.
//! - **Ledger**: Record of who owns what, with resale and gossip.
//! - **Elevator**: Interface to the physical elevator, and a simulated one.

/// Global variables
pub mod config;

/// Help functions
pub mod ip_help_functions;

/// Initialize functions
pub mod init;

/// Print functions with color coding
pub mod print;

/// Quit signal and shutdown rendezvous
pub mod shutdown;

/// Shared message types
pub mod types;

/// Queue with expiring items
pub mod ttl_queue;

/// Publish/subscribe between nodes
pub mod network;

/// Seller and buyer of calls
pub mod auction;

/// Order sorting, pricing and the order handler
pub mod scheduler;

/// Ledger of who owns which call
pub mod ledger;

/// Elevator interface and simulator
pub mod elevator;

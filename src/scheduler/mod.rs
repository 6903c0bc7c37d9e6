//! ## Scheduler
//!
//! Decides in which order a node serves its own orders, and what it costs to take on one more.
//!
//! ## Sub-modules
//! - [sort]: orders a queue into one up-and-down sweep of the elevator.
//! - [price]: marginal cost of inserting a call into a queue.
//! - [delayed_counter]: penalty that grows while a node sits on orders for too long.
//! - [order_handler]: the task that owns the node's queue and hands goals to the elevator.

pub mod delayed_counter;
pub mod order_handler;
pub mod price;
pub mod sort;

use thiserror::Error;

pub use order_handler::{start_order_handler, OrderHandlerHandle};
pub use price::{calc_price_from_queue, remove_dupes_sorted, total_queue_cost};
pub use sort::{find_start_dir, sort_orders};

/// Broken preconditions of the scheduling functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The direction must be resolved to up or down before ordering.
    #[error("trip ordering called with a stationary direction")]
    StationaryDirection,
    #[error("hall order at floor {floor} has no direction")]
    HallWithoutDirection { floor: i32 },
    /// No sweep ever stops for the order, e.g. going up from the top floor.
    #[error("order at floor {floor} is never served by a sweep")]
    Unreachable { floor: i32 },
}

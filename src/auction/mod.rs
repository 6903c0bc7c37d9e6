//! ## Auction module
//!
//! Assigns every call to exactly one node, without a leader.
//!
//! ## Sub-modules
//! - [seller]: puts calls up for sale, picks the lowest bid and waits for the winner to confirm.
//! - [buyer]: bids on calls this node can serve and takes on the ones it wins.
//!
//! Every node runs one of each. A node that cannot reach anyone still sells to its own buyer.

pub mod buyer;
pub mod seller;

pub use buyer::{should_bid, start_buyer, BuyerIo, PriceCalculator};
pub use seller::{start_seller, SellerIo};

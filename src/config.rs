//! # config.rs – Centralized Parameter Store
//!
//! This module holds all static program parameters used throughout the system.
//! Keeping configuration in one place makes tuning, experimentation, and testing easier.
//!
//! Timings that tests need to shorten are collected in the plain structs at the bottom,
//! whose `Default` impls read from the constants above them.

use std::net::Ipv4Addr;
use std::time::Duration;

//
// ──────────────────────────────────────────────────────────────
//   1. NETWORK SETTINGS
// ──────────────────────────────────────────────────────────────
//

/// UDP listen address for discovery sockets (bind address)
pub static BC_LISTEN_ADDR: &str = "0.0.0.0";

/// Broadcast address used for system-wide heartbeats
pub const BC_ADDR: Ipv4Addr = Ipv4Addr::BROADCAST;

/// Fallback address used for heartbeats when the network is unreachable
pub static LOCALHOST: &str = "127.0.0.1";

/// Discovery port for sale announcements
pub const SALES_DISCOVERY_PORT: u16 = 41000;

/// Discovery port for awards
pub const SOLD_TO_DISCOVERY_PORT: u16 = 41001;

/// Discovery port for bids
pub const BID_DISCOVERY_PORT: u16 = 41002;

/// Discovery port for acknowledgements
pub const ACK_DISCOVERY_PORT: u16 = 41003;

/// Discovery port for delivery confirmations
pub const ORDER_DELIVERED_DISCOVERY_PORT: u16 = 41004;

/// Discovery port for ledger gossip
pub const LEDGER_GOSSIP_DISCOVERY_PORT: u16 = 41005;

/// Size of UDP receive buffer in bytes
pub const UDP_BUFFER: usize = u16::MAX as usize;

/// Capacity of outgoing payload queues on publishers
pub const PUBLISH_QUEUE_LEN: usize = 1024;

//
// ──────────────────────────────────────────────────────────────
//   2. SYSTEM & ELEVATOR PARAMETERS
// ──────────────────────────────────────────────────────────────
//

/// Default number of floors
pub const DEFAULT_NUM_FLOORS: u8 = 4;

/// Default bottom floor
pub const DEFAULT_BOTTOM_FLOOR: i32 = 0;

/// Prefix of the node id when no network address could be found
pub static OFFLINE_ID_PREFIX: &str = "offline";

/// Bucket holding hall calls going up
pub static HALL_UP_BUCKET: &str = "hall-up";

/// Bucket holding hall calls going down
pub static HALL_DOWN_BUCKET: &str = "hall-down";

/// File the ledger is kept in, relative to the working directory
pub static LEDGER_DB_PATH: &str = "ledger.redb";

//
// ──────────────────────────────────────────────────────────────
//   3. TIMING & TIMEOUTS & INTERVALS
// ──────────────────────────────────────────────────────────────
//

/// Time between heartbeats from a subscriber
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(300);

/// How long a publisher keeps a peer without hearing a heartbeat
pub const PEER_TTL: Duration = Duration::from_secs(5);

/// Timeout for connecting to a peer when pushing a message
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Timeout for reading a whole message from a peer
pub const TCP_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// How long an unsold call is kept for sale
pub const AUCTION_TTL: Duration = Duration::from_millis(400);

/// Window in which bids are collected
pub const BIDDING_WINDOW: Duration = Duration::from_millis(10);

/// Window in which the winning bidder must acknowledge
pub const ACK_WINDOW: Duration = Duration::from_millis(10);

/// Interval between ledger traversals
pub const LEDGER_TRAVERSAL_INTERVAL: Duration = Duration::from_millis(500);

/// Base time-to-deliver before an order is resold
pub const BASE_TTD: Duration = Duration::from_millis(10_000);

/// Maximum jitter added to or subtracted from the time-to-deliver
pub const TTD_JITTER: Duration = Duration::from_millis(1_000);

/// Interval between ledger gossip rounds
pub const GOSSIP_INTERVAL: Duration = Duration::from_secs(10);

/// Grace period before the delayed counter starts counting
pub const COUNTER_DELAY: Duration = Duration::from_millis(12_000);

/// Interval between increments of the delayed counter
pub const COUNTER_TICK: Duration = Duration::from_millis(1_000);

/// Period between repeated delivery confirmations
pub const DELIVERED_REPEAT_PERIOD: Duration = Duration::from_millis(100);

/// How long a delivery confirmation is repeated
pub const DELIVERED_REPEAT_FOR: Duration = Duration::from_millis(1_000);

/// Simulated elevator step period (half a floor per step)
pub const SIM_STEP_PERIOD: Duration = Duration::from_millis(500);

//
// ──────────────────────────────────────────────────────────────
//   4. PRICE WEIGHTS
// ──────────────────────────────────────────────────────────────
//

/// Weight of the cost imposed on displaced orders
pub const COMMUNITY_WEIGHT: f64 = 2.0;

/// Weight of the cost of serving the new order itself
pub const INDIVIDUAL_WEIGHT: f64 = 1.0;

/// Cost per stop between two different floors
pub const WAIT_WEIGHT: f64 = 3.0;

/// Cost per floor travelled
pub const TRAVEL_WEIGHT: f64 = 1.0;

/// Weight of the delayed counter added to every price
pub const DELIVERY_DELAY_WEIGHT: i64 = 1;

//
// ──────────────────────────────────────────────────────────────
//   5. RUNTIME STRUCTS
// ──────────────────────────────────────────────────────────────
//

/// The range of floors served by the fleet.
///
/// `num` must be at least 1, otherwise `top()` falls below `bottom`. Build it with
/// [FloorConfig::new] unless the values are known to be valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorConfig {
    /// Number of floors
    pub num: u8,
    /// Lowest floor number
    pub bottom: i32,
}

impl FloorConfig {
    /// Returns an error for a building without floors.
    pub fn new(num: u8, bottom: i32) -> anyhow::Result<Self> {
        if num == 0 {
            anyhow::bail!("a building needs at least one floor");
        }
        Ok(FloorConfig { num, bottom })
    }

    /// Highest floor number
    pub fn top(&self) -> i32 {
        self.bottom + self.num as i32 - 1
    }

    /// Returns true if `floor` is inside the range
    pub fn contains(&self, floor: i32) -> bool {
        floor >= self.bottom && floor <= self.top()
    }
}

impl Default for FloorConfig {
    fn default() -> Self {
        FloorConfig { num: DEFAULT_NUM_FLOORS, bottom: DEFAULT_BOTTOM_FLOOR }
    }
}

/// Timings for the seller.
#[derive(Debug, Clone, Copy)]
pub struct SellerConfig {
    pub auction_ttl: Duration,
    pub bidding_window: Duration,
    pub ack_window: Duration,
}

impl Default for SellerConfig {
    fn default() -> Self {
        SellerConfig {
            auction_ttl: AUCTION_TTL,
            bidding_window: BIDDING_WINDOW,
            ack_window: ACK_WINDOW,
        }
    }
}

/// Timings for the order ledger and its gossip.
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    pub traversal_interval: Duration,
    pub base_ttd: Duration,
    pub ttd_jitter: Duration,
    pub gossip_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            traversal_interval: LEDGER_TRAVERSAL_INTERVAL,
            base_ttd: BASE_TTD,
            ttd_jitter: TTD_JITTER,
            gossip_interval: GOSSIP_INTERVAL,
        }
    }
}

/// Timings for the order handler.
#[derive(Debug, Clone, Copy)]
pub struct OrderHandlerConfig {
    pub counter_delay: Duration,
    pub counter_tick: Duration,
    pub delivered_repeat_period: Duration,
    pub delivered_repeat_for: Duration,
}

impl Default for OrderHandlerConfig {
    fn default() -> Self {
        OrderHandlerConfig {
            counter_delay: COUNTER_DELAY,
            counter_tick: COUNTER_TICK,
            delivered_repeat_period: DELIVERED_REPEAT_PERIOD,
            delivered_repeat_for: DELIVERED_REPEAT_FOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_range() {
        assert!(FloorConfig::new(0, 0).is_err());
        let floors = FloorConfig::new(3, -1).unwrap();
        assert_eq!(floors.top(), 1);
        assert!(floors.contains(-1) && floors.contains(1));
        assert!(!floors.contains(2));
    }
}

//! Message and value types shared by every part of the system.
//!
//! A [Call] is a request for service that nobody owns yet. After it has been bought at auction it
//! becomes an [Order]. [Bid], [SoldTo] and [Ack] are the auction messages sent between nodes.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Identity of a node in the fleet.
pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Whether a call was placed at a floor or inside a specific elevator.
pub enum CallKind {
    Hall,
    Cab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Direction requested by a call. Cab calls carry `None`.
pub enum CallDir {
    Up,
    Down,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Motor direction of an elevator.
pub enum Dirn {
    Down = -1,
    Stop = 0,
    Up = 1,
}

impl Dirn {
    /// The opposite direction. `Stop` stays `Stop`.
    pub fn reversed(self) -> Dirn {
        match self {
            Dirn::Up => Dirn::Down,
            Dirn::Down => Dirn::Up,
            Dirn::Stop => Dirn::Stop,
        }
    }

    /// Floor step taken in this direction.
    pub fn step(self) -> i32 {
        self as i32
    }
}

impl CallDir {
    /// Motor direction matching a hall call, `None` for cab calls.
    pub fn as_dirn(self) -> Option<Dirn> {
        match self {
            CallDir::Up => Some(Dirn::Up),
            CallDir::Down => Some(Dirn::Down),
            CallDir::None => None,
        }
    }
}

/// A request for elevator service.
///
/// Equality and hashing only look at `(kind, floor, dir)`. `owner` is meaningful for cab calls,
/// where it names the node the call was placed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub kind: CallKind,
    pub floor: i32,
    pub dir: CallDir,
    pub owner: Option<NodeId>,
}

impl Call {
    /// A hall call at `floor` going `dir`.
    pub fn hall(floor: i32, dir: CallDir) -> Self {
        Call { kind: CallKind::Hall, floor, dir, owner: None }
    }

    /// A cab call at `floor` placed inside `owner`.
    pub fn cab(floor: i32, owner: impl Into<NodeId>) -> Self {
        Call { kind: CallKind::Cab, floor, dir: CallDir::None, owner: Some(owner.into()) }
    }

    /// The triple that identifies a call.
    pub fn identity(&self) -> (CallKind, i32, CallDir) {
        (self.kind, self.floor, self.dir)
    }
}

impl PartialEq for Call {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Call {}

impl Hash for Call {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// A call that has been bought by a node and is now that node's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    pub call: Call,
}

impl From<Call> for Order {
    fn from(call: Call) -> Self {
        Order { call }
    }
}

impl Order {
    pub fn floor(&self) -> i32 {
        self.call.floor
    }

    pub fn kind(&self) -> CallKind {
        self.call.kind
    }
}

/// A price offered by a node for a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub call: Call,
    pub price: i64,
    pub bidder_id: NodeId,
}

/// Sent by the seller to name the winner of an auction round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldTo {
    pub bid: Bid,
}

/// Sent by the winner to confirm it now owns the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub bid: Bid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn call_identity_ignores_owner() {
        let a = Call::cab(2, "node-a");
        let b = Call::cab(2, "node-b");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn calls_with_different_direction_differ() {
        assert_ne!(Call::hall(1, CallDir::Up), Call::hall(1, CallDir::Down));
        assert_ne!(Call::hall(1, CallDir::Up), Call::hall(2, CallDir::Up));
    }

    #[test]
    fn dirn_reverses() {
        assert_eq!(Dirn::Up.reversed(), Dirn::Down);
        assert_eq!(Dirn::Down.reversed(), Dirn::Up);
        assert_eq!(Dirn::Stop.reversed(), Dirn::Stop);
        assert_eq!(Dirn::Down.step(), -1);
    }

    #[test]
    fn wire_records_are_field_named() {
        let bid = Bid { call: Call::hall(3, CallDir::Down), price: 7, bidder_id: "n1".into() };
        let json = serde_json::to_string(&Ack { bid }).unwrap();
        assert!(json.contains("\"bidder_id\":\"n1\""));
        assert!(json.contains("\"floor\":3"));
    }
}

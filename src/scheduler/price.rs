//! Marginal pricing of a call against a node's current queue.

use super::sort::sort_orders;
use super::SchedulerError;
use crate::config::{self, FloorConfig};
use crate::types::{Dirn, Order};

/// Cost of taking on `candidate` given the queue `orders`.
///
/// ## Parameters
/// - `candidate`: the call being priced
/// - `orders`: the node's unsorted queue
/// - `position`, `dir`: where the elevator is and where it is going, `dir` resolved to up or down
///
/// ## Behaviour
/// Both the current queue and the queue with the candidate are sorted and deduplicated.
/// - Community cost: how much longer the whole trip becomes, times the number of orders that now
///   come after the candidate.
/// - Individual cost: trip cost up to and including the candidate.
///
/// The price is `COMMUNITY_WEIGHT * community + INDIVIDUAL_WEIGHT * individual`, rounded.
/// A call already in the queue only costs its individual part.
///
/// ## Returns
/// `Err` if sorting fails, or if no sweep ever serves the candidate.
pub fn calc_price_from_queue(
    candidate: &Order,
    orders: &[Order],
    position: f64,
    dir: Dirn,
    floors: FloorConfig,
) -> Result<i64, SchedulerError> {
    let old = remove_dupes_sorted(sort_orders(orders, position, dir, floors)?);

    let mut with_candidate = old.clone();
    with_candidate.push(candidate.clone());
    let new = remove_dupes_sorted(sort_orders(&with_candidate, position, dir, floors)?);

    let k = new
        .iter()
        .position(|o| o == candidate)
        .ok_or(SchedulerError::Unreachable { floor: candidate.floor() })?;
    let after = (new.len() - (k + 1)) as i64;

    let community = (total_queue_cost(&new, position) - total_queue_cost(&old, position)) * after;
    let individual = total_queue_cost(&new[..=k], position);

    let price = config::COMMUNITY_WEIGHT * community as f64 + config::INDIVIDUAL_WEIGHT * individual as f64;
    Ok(price.round() as i64)
}

/// Trip cost of a sorted, deduplicated queue starting from `position`.
///
/// Travel is charged per floor. Every move between two different floors also pays the wait at
/// the stop it leaves, so a queue starting at the current position pays nothing to get going.
pub fn total_queue_cost(orders: &[Order], position: f64) -> i64 {
    let Some(first) = orders.first() else {
        return 0;
    };
    let mut cost = (position - first.floor() as f64).abs() * config::TRAVEL_WEIGHT;
    for pair in orders.windows(2) {
        let (prev, next) = (pair[0].floor(), pair[1].floor());
        cost += (next - prev).abs() as f64 * config::TRAVEL_WEIGHT;
        if next != prev {
            cost += config::WAIT_WEIGHT;
        }
    }
    cost.round() as i64
}

/// Drops consecutive orders with the same identity.
pub fn remove_dupes_sorted(mut orders: Vec<Order>) -> Vec<Order> {
    orders.dedup();
    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Call, CallDir};

    fn hall(floor: i32, dir: CallDir) -> Order {
        Call::hall(floor, dir).into()
    }

    fn cab(floor: i32) -> Order {
        Call::cab(floor, "self").into()
    }

    fn floors() -> FloorConfig {
        FloorConfig { num: 4, bottom: 0 }
    }

    fn queue() -> Vec<Order> {
        vec![hall(2, CallDir::Up), cab(3), cab(0), hall(2, CallDir::Down), hall(2, CallDir::Up)]
    }

    #[test]
    fn total_cost_of_sorted_queue() {
        let sorted = remove_dupes_sorted(sort_orders(&queue(), 3.0, Dirn::Up, floors()).unwrap());
        // 3 -> 2 -> 0 -> 2: 5 floors travelled and three waits
        assert_eq!(total_queue_cost(&sorted, 3.0), 14);
    }

    #[test]
    fn price_of_new_call_includes_displaced_orders() {
        let price = calc_price_from_queue(&hall(1, CallDir::Down), &queue(), 3.0, Dirn::Down, floors()).unwrap();
        assert_eq!(price, 20);
    }

    #[test]
    fn price_of_existing_call_is_individual_only() {
        let price = calc_price_from_queue(&hall(2, CallDir::Down), &queue(), 3.0, Dirn::Down, floors()).unwrap();
        assert_eq!(price, 4);
    }

    #[test]
    fn price_of_existing_call_where_we_are_is_zero() {
        let price = calc_price_from_queue(&hall(2, CallDir::Down), &queue(), 2.0, Dirn::Down, floors()).unwrap();
        assert_eq!(price, 0);

        let price = calc_price_from_queue(&cab(1), &[cab(1)], 1.0, Dirn::Up, floors()).unwrap();
        assert_eq!(price, 0);
    }

    #[test]
    fn price_from_empty_queue_is_distance() {
        let price = calc_price_from_queue(&hall(1, CallDir::Down), &[], 3.0, Dirn::Down, floors()).unwrap();
        assert_eq!(price, 2);
    }

    #[test]
    fn impossible_call_is_unreachable() {
        let err = calc_price_from_queue(&hall(3, CallDir::Up), &[], 0.0, Dirn::Up, floors()).unwrap_err();
        assert_eq!(err, SchedulerError::Unreachable { floor: 3 });
    }

    #[test]
    fn dedup_is_idempotent() {
        assert!(remove_dupes_sorted(Vec::new()).is_empty());

        let sorted = sort_orders(&queue(), 3.0, Dirn::Up, floors()).unwrap();
        let once = remove_dupes_sorted(sorted);
        let twice = remove_dupes_sorted(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 4);
    }
}

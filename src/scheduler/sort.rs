//! Trip ordering: one full up-and-down sweep of the elevator.

use super::SchedulerError;
use crate::config::FloorConfig;
use crate::types::{CallKind, Dirn, Order};

/// Sorts `orders` in the order they are served by one sweep of the elevator.
///
/// ## Parameters
/// - `orders`: unsorted pending orders, duplicates allowed
/// - `position`: current position, fractional while moving
/// - `dir`: current direction, must be `Up` or `Down`
///
/// ## Behaviour
/// - The sweep starts at the position rounded in the direction of travel and turns at the top and
///   bottom floors. It stops when it is back at the floor and direction it started from.
/// - At each floor it picks up every cab order, then every hall order going the same way as the
///   sweep. Cab orders come first, otherwise input order is kept.
/// - Orders no sweep stops for, like a hall call up at the top floor, are left out.
///
/// ## Returns
/// - `Err(StationaryDirection)` if `dir` is `Stop`.
/// - `Err(HallWithoutDirection)` if a hall order has no direction.
pub fn sort_orders(
    orders: &[Order],
    position: f64,
    dir: Dirn,
    floors: FloorConfig,
) -> Result<Vec<Order>, SchedulerError> {
    if dir == Dirn::Stop {
        return Err(SchedulerError::StationaryDirection);
    }
    if let Some(bad) = orders
        .iter()
        .find(|o| o.kind() == CallKind::Hall && o.call.dir.as_dirn().is_none())
    {
        return Err(SchedulerError::HallWithoutDirection { floor: bad.floor() });
    }

    let mut remaining: Vec<&Order> = orders.iter().collect();
    let mut sorted = Vec::with_capacity(orders.len());

    let mut floor = round_in_dir(position, dir).clamp(floors.bottom, floors.top());
    let mut dir = turn_at_boundary(floor, dir, floors);
    let start = (floor, dir);

    loop {
        collect_at(floor, dir, &mut remaining, &mut sorted);
        if remaining.is_empty() || floors.num <= 1 {
            break;
        }
        floor += dir.step();
        dir = turn_at_boundary(floor, dir, floors);
        if (floor, dir) == start {
            break;
        }
    }
    Ok(sorted)
}

/// Moves the orders served at `floor` going `dir` from `remaining` to `sorted`, cab orders first.
fn collect_at<'a>(floor: i32, dir: Dirn, remaining: &mut Vec<&'a Order>, sorted: &mut Vec<Order>) {
    let (here, rest): (Vec<&'a Order>, Vec<&'a Order>) = std::mem::take(remaining).into_iter().partition(|o| {
        o.floor() == floor && (o.kind() == CallKind::Cab || o.call.dir.as_dirn() == Some(dir))
    });
    *remaining = rest;
    let (cabs, halls): (Vec<&Order>, Vec<&Order>) = here.into_iter().partition(|o| o.kind() == CallKind::Cab);
    sorted.extend(cabs.into_iter().chain(halls).cloned());
}

/// Going down, a position between floors counts as the floor below. Otherwise the nearest floor.
fn round_in_dir(position: f64, dir: Dirn) -> i32 {
    match dir {
        Dirn::Down => position.floor() as i32,
        _ => (position + 0.5).floor() as i32,
    }
}

fn turn_at_boundary(floor: i32, dir: Dirn, floors: FloorConfig) -> Dirn {
    match dir {
        Dirn::Up if floor >= floors.top() => Dirn::Down,
        Dirn::Down if floor <= floors.bottom => Dirn::Up,
        _ => dir,
    }
}

/// Picks a direction for a stopped elevator: towards the nearest order, up on a tie.
///
/// An empty queue gives `Up`.
pub fn find_start_dir(orders: &[Order], floor: i32, floors: FloorConfig) -> Dirn {
    for d in 0..floors.num as i32 {
        for order in orders {
            if order.floor() == floor + d {
                return Dirn::Up;
            }
            if order.floor() == floor - d {
                return Dirn::Down;
            }
        }
    }
    Dirn::Up
}

/// The direction to sort with: `dir` itself while moving, otherwise [find_start_dir].
pub fn resolve_dir(orders: &[Order], position: f64, dir: Dirn, floors: FloorConfig) -> Dirn {
    match dir {
        Dirn::Stop => find_start_dir(orders, position.floor() as i32, floors),
        moving => moving,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Call, CallDir};
    use rand::seq::SliceRandom;

    fn hall(floor: i32, dir: CallDir) -> Order {
        Call::hall(floor, dir).into()
    }

    fn cab(floor: i32) -> Order {
        Call::cab(floor, "self").into()
    }

    fn floors() -> FloorConfig {
        FloorConfig { num: 4, bottom: 0 }
    }

    #[test]
    fn full_sweep_is_invariant_under_permutation() {
        use CallDir::{Down, Up};
        let mut orders = vec![
            hall(2, Up), cab(3), cab(0), cab(0), cab(2), cab(1), cab(1), cab(3), cab(2),
            hall(3, Down), hall(2, Down), hall(1, Down), hall(1, Down), hall(2, Down), hall(3, Down),
            hall(1, Down), hall(2, Up), hall(1, Up), hall(2, Up), hall(0, Up), hall(2, Up),
            hall(2, Up), hall(1, Up), hall(0, Up),
        ];
        let expected = vec![
            cab(1), cab(1), hall(1, Up), hall(1, Up),
            cab(2), cab(2), hall(2, Up), hall(2, Up), hall(2, Up), hall(2, Up), hall(2, Up),
            cab(3), cab(3), hall(3, Down), hall(3, Down),
            hall(2, Down), hall(2, Down),
            hall(1, Down), hall(1, Down), hall(1, Down),
            cab(0), cab(0), hall(0, Up), hall(0, Up),
        ];

        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            orders.shuffle(&mut rng);
            let sorted = sort_orders(&orders, 1.0, Dirn::Up, floors()).unwrap();
            let got: Vec<_> = sorted.iter().map(|o| o.call.identity()).collect();
            let want: Vec<_> = expected.iter().map(|o| o.call.identity()).collect();
            assert_eq!(got, want);
        }
    }

    #[test]
    fn goes_up_before_serving_hall_down_below_top() {
        let orders = vec![hall(2, CallDir::Down), cab(3)];
        let sorted = sort_orders(&orders, 1.0, Dirn::Up, floors()).unwrap();
        assert_eq!(sorted, vec![cab(3), hall(2, CallDir::Down)]);
    }

    #[test]
    fn cab_before_hall_on_same_floor() {
        let orders = vec![hall(2, CallDir::Up), cab(2)];
        let sorted = sort_orders(&orders, 2.0, Dirn::Up, floors()).unwrap();
        assert_eq!(sorted, vec![cab(2), hall(2, CallDir::Up)]);
    }

    #[test]
    fn stationary_direction_is_rejected() {
        let err = sort_orders(&[cab(1)], 0.0, Dirn::Stop, floors()).unwrap_err();
        assert_eq!(err, SchedulerError::StationaryDirection);
    }

    #[test]
    fn hall_without_direction_is_rejected() {
        let err = sort_orders(&[hall(1, CallDir::None)], 0.0, Dirn::Up, floors()).unwrap_err();
        assert_eq!(err, SchedulerError::HallWithoutDirection { floor: 1 });
    }

    #[test]
    fn starting_at_top_going_up_turns_around() {
        let orders = vec![hall(3, CallDir::Down), cab(1)];
        let sorted = sort_orders(&orders, 3.0, Dirn::Up, floors()).unwrap();
        assert_eq!(sorted, vec![hall(3, CallDir::Down), cab(1)]);
    }

    #[test]
    fn position_rounds_in_direction_of_travel() {
        assert_eq!(round_in_dir(1.6, Dirn::Down), 1);
        assert_eq!(round_in_dir(1.4, Dirn::Up), 1);
        assert_eq!(round_in_dir(1.5, Dirn::Up), 2);
    }

    #[test]
    fn start_dir_points_at_nearest_order() {
        assert_eq!(find_start_dir(&[cab(0), cab(3)], 1, floors()), Dirn::Down);
        assert_eq!(find_start_dir(&[cab(2), cab(0)], 1, floors()), Dirn::Up);
        assert_eq!(find_start_dir(&[], 1, floors()), Dirn::Up);
        assert_eq!(resolve_dir(&[cab(0)], 2.0, Dirn::Stop, floors()), Dirn::Down);
        assert_eq!(resolve_dir(&[cab(0)], 2.0, Dirn::Up, floors()), Dirn::Up);
    }

    #[test]
    fn single_floor_building_serves_once() {
        let one = FloorConfig { num: 1, bottom: 0 };
        let sorted = sort_orders(&[cab(0), hall(0, CallDir::Up)], 0.0, Dirn::Up, one).unwrap();
        assert_eq!(sorted, vec![cab(0)]);
    }
}

//! ## Elevator interface
//!
//! What the scheduling side needs from the physical elevator, and a simulated elevator that
//! provides it when no hardware is attached.
//!
//! The physical layer consumes goal orders and reports back an arrival once a goal is reached.
//! In between, the order handler and buyer read the position and direction through [ElevatorState].

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::FloorConfig;
use crate::print::Logger;
use crate::shutdown::QuitRx;
use crate::types::{Call, CallDir, Dirn, Order};

/// Position and direction of an elevator as seen by the scheduler.
pub trait ElevatorState: Send + Sync + 'static {
    fn direction(&self) -> Dirn;
    /// Floor position, fractional while between floors.
    fn position(&self) -> f64;
}

/// A snapshot of an elevator's motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub position: f64,
    pub dirn: Dirn,
}

impl ElevatorState for Motion {
    fn direction(&self) -> Dirn {
        self.dirn
    }

    fn position(&self) -> f64 {
        self.position
    }
}

impl ElevatorState for watch::Receiver<Motion> {
    fn direction(&self) -> Dirn {
        self.borrow().dirn
    }

    fn position(&self) -> f64 {
        self.borrow().position
    }
}

/// Starts a simulated elevator.
///
/// ## Parameters
/// - `start_floor`: where the cab is at start-up, clamped to `floors`
/// - `step`: time to move half a floor
/// - `goals_rx`: goal orders, a new goal replaces the current one
/// - `arrivals_tx`: receives the goal order once the cab stops at its floor
///
/// ## Returns
/// A watch of the current [Motion], which implements [ElevatorState], and the task handle.
pub fn start_simulated_elevator(
    floors: FloorConfig,
    start_floor: i32,
    step: Duration,
    mut goals_rx: mpsc::Receiver<Order>,
    arrivals_tx: mpsc::Sender<Order>,
    log: Logger,
    mut quit: QuitRx,
) -> (watch::Receiver<Motion>, JoinHandle<anyhow::Result<()>>) {
    let start = Motion { position: start_floor.clamp(floors.bottom, floors.top()) as f64, dirn: Dirn::Stop };
    let (motion_tx, motion_rx) = watch::channel(start);

    let handle = tokio::spawn(async move {
        let mut motion = start;
        let mut goal: Option<Order> = None;
        let mut ticker = interval(step);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = quit.wait() => break,
                next = goals_rx.recv() => {
                    let Some(next) = next else { break };
                    goal = Some(next);
                }
                _ = ticker.tick() => {
                    let Some(target) = goal.as_ref().map(|g| g.floor() as f64) else { continue };
                    if motion.position != target {
                        motion.dirn = if target > motion.position { Dirn::Up } else { Dirn::Down };
                        motion.position += 0.5 * motion.dirn.step() as f64;
                        motion_tx.send_replace(motion);
                        continue;
                    }
                    motion.dirn = Dirn::Stop;
                    motion_tx.send_replace(motion);
                    if let Some(reached) = goal.take() {
                        log.call("Arrived at goal", &reached.call);
                        if arrivals_tx.send(reached).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    });
    (motion_rx, handle)
}

/// Reads a button press typed on the terminal, in place of the button panel.
///
/// Accepts `hall <floor> up`, `hall <floor> down` and `cab <floor>`. A cab call is placed in
/// `self_id`. Anything else gives `None`.
pub fn parse_button(line: &str, self_id: &str) -> Option<Call> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["hall", floor, dir] => {
            let dir = match dir.to_lowercase().as_str() {
                "up" => CallDir::Up,
                "down" => CallDir::Down,
                _ => return None,
            };
            Some(Call::hall(floor.parse().ok()?, dir))
        }
        ["cab", floor] => Some(Call::cab(floor.parse().ok()?, self_id)),
        _ => None,
    }
}

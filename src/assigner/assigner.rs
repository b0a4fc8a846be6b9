/**
 * Distributed hall-call assignment.
 *
 * The node where a hall button is pressed computes a deterministic cost for
 * every live car and binds the call to the cheapest one. The binding is
 * broadcast redundantly; delivery is at-least-once and the receivers filter
 * duplicates with a per-assigner nonce. Self-assignments are additionally
 * applied directly by the caller, so a fully partitioned node still serves
 * its own landings.
 */

/***************************************/
/*        3rd party libraries          */
/***************************************/
use crossbeam_channel as cbc;
use driver_rust::elevio::elev::{CAB, HALL_DOWN, HALL_UP};
use log::{debug, info};
use std::collections::HashMap;
use std::net::UdpSocket;
use std::thread::Builder;

/***************************************/
/*           Local modules             */
/***************************************/
use crate::config::NetworkConfig;
use crate::shared::udp;
use crate::shared::{Button, ButtonEvent, CarState, Direction};
use crate::statesync::StateSync;

/***************************************/
/*             Constants               */
/***************************************/
/// How many copies of each assignment datagram go on the wire.
const ASSIGNMENT_REDUNDANCY: usize = 10;
const ASSIGNMENT_MSG_LEN: usize = 8;
const MOVING_AWAY_PENALTY: u32 = 10;
const WORKLOAD_WEIGHT: u32 = 5;

/***************************************/
/*       Public data structures        */
/***************************************/
/// Binds one hall call to one car. `assigner` and `nonce` identify the
/// logical assignment across its redundant copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub assignee: u8,
    pub floor: u8,
    pub button: Button,
    pub assigner: u8,
    pub nonce: u32,
}

impl Assignment {
    pub fn serialize(&self) -> [u8; ASSIGNMENT_MSG_LEN] {
        let mut buf = [0u8; ASSIGNMENT_MSG_LEN];
        buf[0] = self.assignee;
        buf[1] = self.floor;
        buf[2] = self.button.to_u8();
        buf[3] = self.assigner;
        buf[4..8].copy_from_slice(&self.nonce.to_le_bytes());
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Option<Assignment> {
        if buf.len() != ASSIGNMENT_MSG_LEN {
            return None;
        }
        let button = match buf[2] {
            HALL_UP => Button::HallUp,
            HALL_DOWN => Button::HallDown,
            CAB => Button::Cab,
            _ => return None,
        };
        Some(Assignment {
            assignee: buf[0],
            floor: buf[1],
            button,
            assigner: buf[3],
            nonce: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

/// Per-assigner duplicate suppression: only a nonce strictly newer than the
/// last admitted one from the same assigner passes.
pub struct NonceFilter {
    last_seen: HashMap<u8, u32>,
}

impl NonceFilter {
    pub fn new() -> NonceFilter {
        NonceFilter {
            last_seen: HashMap::new(),
        }
    }

    pub fn admit(&mut self, assigner: u8, nonce: u32) -> bool {
        match self.last_seen.get(&assigner) {
            Some(&prev) if nonce <= prev => false,
            _ => {
                self.last_seen.insert(assigner, nonce);
                true
            }
        }
    }
}

/***************************************/
/*             Public API              */
/***************************************/
pub struct Assigner {
    id: u8,
    nonce: u32,
    socket: UdpSocket,
    broadcast_addr: String,
    assignment_port: u16,
    sync: StateSync,
}

impl Assigner {
    pub fn new(id: u8, config: &NetworkConfig, sync: StateSync) -> Assigner {
        Assigner {
            id,
            nonce: 0,
            socket: udp::open_broadcast_socket(),
            broadcast_addr: config.broadcast_addr.clone(),
            assignment_port: config.assignment_port,
            sync,
        }
    }

    /// Elects the cheapest live car for `call` and broadcasts the binding.
    /// Returns the assignee so the caller can latch self-assignments
    /// directly instead of waiting for its own datagram.
    pub fn assign(&mut self, call: ButtonEvent) -> u8 {
        let assignee = self.select_assignee(call);
        let msg = Assignment {
            assignee,
            floor: call.floor,
            button: call.button,
            assigner: self.id,
            nonce: self.nonce,
        };
        self.nonce += 1;

        let buf = msg.serialize();
        for _ in 0..ASSIGNMENT_REDUNDANCY {
            let _ = self
                .socket
                .send_to(&buf, (self.broadcast_addr.as_str(), self.assignment_port));
        }

        info!(
            "Assigned {:?} at floor {} to elevator {}",
            call.button, call.floor, assignee
        );
        assignee
    }

    fn select_assignee(&self, call: ButtonEvent) -> u8 {
        let mut best: Option<(u32, u8)> = None;
        for id in self.sync.alive_ids() {
            let state = match self.sync.state_of(id) {
                Some(state) => state,
                None => continue,
            };
            let cost = cost(&state, call);
            debug!("Cost for elevator {}: {}", id, cost);
            best = match best {
                Some((best_cost, best_id)) if best_cost <= cost => Some((best_cost, best_id)),
                _ => Some((cost, id)),
            };
        }
        best.map(|(_, id)| id).unwrap_or(self.id)
    }
}

/// Cost of serving `call` with a car in state `state`: the travel distance,
/// a flat penalty when the car moves away from the landing, and the stops it
/// still has to make before it could turn around.
pub fn cost(state: &CarState, call: ButtonEvent) -> u32 {
    let dist = (state.floor as i32 - call.floor as i32).unsigned_abs();
    let moving_away = match state.direction {
        Direction::Up => call.floor < state.floor,
        Direction::Down => call.floor > state.floor,
        Direction::Stop => false,
    };
    let penalty = if moving_away { MOVING_AWAY_PENALTY } else { 0 };
    dist + penalty + WORKLOAD_WEIGHT * pending_stops_ahead(state)
}

/// Same-direction stops strictly beyond the car's floor, swept to the
/// extreme floor of its travel direction. A stopped car has none.
fn pending_stops_ahead(state: &CarState) -> u32 {
    let n_floors = state.requests.len();
    let stops = match state.direction {
        Direction::Up => (state.floor as usize + 1..n_floors)
            .filter(|&f| {
                state.requests[f][Button::Cab as usize]
                    || state.requests[f][Button::HallUp as usize]
            })
            .count(),
        Direction::Down => (0..state.floor as usize)
            .filter(|&f| {
                state.requests[f][Button::Cab as usize]
                    || state.requests[f][Button::HallDown as usize]
            })
            .count(),
        Direction::Stop => 0,
    };
    stops as u32
}

/// Spawns the assignment receiver: datagrams bound to other cars are
/// dropped, redundant copies are filtered, fresh assignments go to the
/// controller.
pub fn spawn_receiver(
    config: &NetworkConfig,
    local_id: u8,
    assignment_tx: cbc::Sender<ButtonEvent>,
) {
    let port = config.assignment_port;
    Builder::new()
        .name("assignment_rx".into())
        .spawn(move || {
            let socket = udp::bind_listener(port);
            let mut filter = NonceFilter::new();
            let mut buf = [0u8; 64];
            loop {
                let n = match socket.recv_from(&mut buf) {
                    Ok((n, _)) => n,
                    Err(_) => continue,
                };
                let msg = match Assignment::deserialize(&buf[..n]) {
                    Some(msg) => msg,
                    None => continue,
                };
                if msg.assignee != local_id {
                    continue;
                }
                if !filter.admit(msg.assigner, msg.nonce) {
                    continue;
                }
                debug!(
                    "Assignment from elevator {}: {:?} at floor {}",
                    msg.assigner, msg.button, msg.floor
                );
                let _ = assignment_tx.send(ButtonEvent {
                    floor: msg.floor,
                    button: msg.button,
                });
            }
        })
        .unwrap();
}

/***************************************/
/*              Test API               */
/***************************************/
#[cfg(test)]
pub mod testing {
    use super::*;

    impl Assigner {
        pub fn test_select_assignee(&self, call: ButtonEvent) -> u8 {
            self.select_assignee(call)
        }

        pub fn test_nonce(&self) -> u32 {
            self.nonce
        }
    }
}

/**
 * Leaderless replication of car states.
 *
 * Every node broadcasts its own state over UDP at a fixed interval and keeps
 * the latest state heard from every peer. Acceptance is gated on a strictly
 * increasing per-sender nonce, so reordered or duplicated datagrams cannot
 * roll a peer's state back. A peer that stays silent beyond the sync timeout
 * is declared dead: its slot is cleared and its hall orders are replayed on
 * the reassignment channel so the remaining cars pick them up.
 *
 * `StateSync` is a cheap handle (shared inner state) passed to every task
 * that needs cluster knowledge. The controller publishes its snapshot after
 * every mutation; the broadcaster, the cost function, the lamp driver and
 * the stuck watchdog all read from here.
 */

/***************************************/
/*        3rd party libraries          */
/***************************************/
use crossbeam_channel as cbc;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{sleep, Builder};
use std::time::{Duration, Instant};

/***************************************/
/*           Local modules             */
/***************************************/
use crate::config::NetworkConfig;
use crate::shared::udp;
use crate::shared::{Button, ButtonEvent, CarState, Direction, Fault, RequestMatrix};
use crate::statesync::wire;

/***************************************/
/*             Constants               */
/***************************************/
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);
const STUCK_THRESHOLD: Duration = Duration::from_secs(5);

/***************************************/
/*       Private data structures       */
/***************************************/
struct PeerEntry {
    state: CarState,
    last_sync: Instant,
}

struct SyncInner {
    local_id: u8,
    sync_timeout: Duration,
    states: RwLock<Vec<Option<PeerEntry>>>,
    local: RwLock<CarState>,
    heartbeat_enabled: AtomicBool,
}

/***************************************/
/*             Public API              */
/***************************************/
#[derive(Clone)]
pub struct StateSync {
    inner: Arc<SyncInner>,
}

impl StateSync {
    pub fn new(local_id: u8, n_floors: u8, sync_timeout: Duration) -> StateSync {
        StateSync {
            inner: Arc::new(SyncInner {
                local_id,
                sync_timeout,
                states: RwLock::new(Vec::new()),
                local: RwLock::new(CarState::new(local_id, n_floors)),
                heartbeat_enabled: AtomicBool::new(true),
            }),
        }
    }

    /// Spawns the broadcaster, the receiver, the failure detector and the
    /// stuck watchdog.
    pub fn start(
        &self,
        config: &NetworkConfig,
        reassignment_tx: cbc::Sender<ButtonEvent>,
        fault_tx: cbc::Sender<Fault>,
    ) {
        let interval = Duration::from_millis(config.sync_interval);
        let broadcast_addr = config.broadcast_addr.clone();
        let state_port = config.state_port;

        let sync = self.clone();
        Builder::new()
            .name("statesync_tx".into())
            .spawn(move || sync.broadcast_loop(broadcast_addr, state_port, interval))
            .unwrap();

        let sync = self.clone();
        Builder::new()
            .name("statesync_rx".into())
            .spawn(move || sync.receive_loop(state_port))
            .unwrap();

        let sync = self.clone();
        Builder::new()
            .name("statesync_monitor".into())
            .spawn(move || sync.monitor_loop(reassignment_tx))
            .unwrap();

        let sync = self.clone();
        Builder::new()
            .name("statesync_watchdog".into())
            .spawn(move || sync.watchdog_loop(fault_tx))
            .unwrap();
    }

    /// Publishes the controller's current snapshot. The broadcaster sends a
    /// copy of it on the next heartbeat; local readers see it immediately.
    pub fn publish(&self, floor: u8, direction: Direction, requests: &RequestMatrix) {
        let mut local = self.inner.local.write().unwrap();
        local.floor = floor;
        local.direction = direction;
        local.requests = requests.clone();
    }

    /// Resumes heartbeats after fault recovery.
    pub fn enable_heartbeat(&self) {
        self.inner.heartbeat_enabled.store(true, Ordering::Relaxed);
    }

    /// Silences heartbeats so the peers time this car out and take over its
    /// hall orders. Receiving continues.
    pub fn disable_heartbeat(&self) {
        self.inner.heartbeat_enabled.store(false, Ordering::Relaxed);
    }

    pub fn local_state(&self) -> CarState {
        self.inner.local.read().unwrap().clone()
    }

    /// Latest accepted state of car `id`. The local id reads the published
    /// snapshot instead of waiting for its own broadcast to loop back.
    pub fn state_of(&self, id: u8) -> Option<CarState> {
        if id == self.inner.local_id {
            return Some(self.local_state());
        }
        let states = self.inner.states.read().unwrap();
        states
            .get(id as usize)
            .and_then(|slot| slot.as_ref())
            .map(|entry| entry.state.clone())
    }

    /// IDs of every car that has synced within the timeout, plus self,
    /// ascending.
    pub fn alive_ids(&self) -> Vec<u8> {
        let states = self.inner.states.read().unwrap();
        let mut alive = Vec::with_capacity(states.len() + 1);
        for (id, slot) in states.iter().enumerate() {
            if id as u8 == self.inner.local_id {
                continue;
            }
            if let Some(entry) = slot {
                if entry.last_sync.elapsed() <= self.inner.sync_timeout {
                    alive.push(id as u8);
                }
            }
        }
        alive.push(self.inner.local_id);
        alive.sort_unstable();
        alive
    }

    /// Accepts `incoming` iff its slot is empty or its nonce is strictly
    /// newer than the stored one. Ties and regressions are dropped.
    pub fn merge(&self, incoming: CarState) {
        let mut states = self.inner.states.write().unwrap();
        let id = incoming.id as usize;
        if id >= states.len() {
            states.resize_with(id + 1, || None);
        }
        let accept = match &states[id] {
            None => true,
            Some(entry) => entry.state.nonce < incoming.nonce,
        };
        if accept {
            states[id] = Some(PeerEntry {
                state: incoming,
                last_sync: Instant::now(),
            });
        }
    }

    /// The cluster-wide request image: the local matrix with the hall
    /// columns OR-ed across every live peer. Cab columns stay private.
    pub fn or_aggregated_requests(&self) -> RequestMatrix {
        let mut agg = self.local_state().requests;
        let states = self.inner.states.read().unwrap();
        for (id, slot) in states.iter().enumerate() {
            if id as u8 == self.inner.local_id {
                continue;
            }
            let entry = match slot {
                Some(entry) if entry.last_sync.elapsed() <= self.inner.sync_timeout => entry,
                _ => continue,
            };
            for (floor, row) in agg.iter_mut().enumerate() {
                if floor >= entry.state.requests.len() {
                    break;
                }
                row[Button::HallUp as usize] |=
                    entry.state.requests[floor][Button::HallUp as usize];
                row[Button::HallDown as usize] |=
                    entry.state.requests[floor][Button::HallDown as usize];
            }
        }
        agg
    }

    /// Clears peers that stopped syncing and replays their hall orders on
    /// the reassignment channel. Cab orders stay with the dead car: they are
    /// persisted on its disk and come back with it.
    pub fn sweep_expired(&self, reassignment_tx: &cbc::Sender<ButtonEvent>) {
        let mut expired: Vec<(u8, RequestMatrix)> = Vec::new();
        {
            let mut states = self.inner.states.write().unwrap();
            for (id, slot) in states.iter_mut().enumerate() {
                if id as u8 == self.inner.local_id {
                    continue;
                }
                let timed_out =
                    matches!(slot, Some(entry) if entry.last_sync.elapsed() > self.inner.sync_timeout);
                if timed_out {
                    if let Some(entry) = slot.take() {
                        expired.push((id as u8, entry.state.requests));
                    }
                }
            }
        }

        for (id, requests) in expired {
            warn!(
                "Elevator {} has not synced for over {:?}, reassigning its hall orders",
                id, self.inner.sync_timeout
            );
            for (floor, row) in requests.iter().enumerate() {
                for button in [Button::HallUp, Button::HallDown] {
                    if row[button as usize] {
                        let _ = reassignment_tx.send(ButtonEvent {
                            floor: floor as u8,
                            button,
                        });
                    }
                }
            }
        }
    }

    /***************************************/
    /*            Task loops               */
    /***************************************/
    fn broadcast_loop(&self, broadcast_addr: String, port: u16, interval: Duration) {
        let socket = udp::open_broadcast_socket();
        info!("Broadcasting state on port {} every {:?}", port, interval);

        let mut nonce: u32 = 0;
        loop {
            sleep(interval);
            if !self.inner.heartbeat_enabled.load(Ordering::Relaxed) {
                continue;
            }
            let mut state = self.local_state();
            state.nonce = nonce;
            nonce = nonce.wrapping_add(1);
            let _ = socket.send_to(&wire::serialize(&state), (broadcast_addr.as_str(), port));
        }
    }

    fn receive_loop(&self, port: u16) {
        let socket = udp::bind_listener(port);
        let mut buf = [0u8; 1024];
        loop {
            let n = match socket.recv_from(&mut buf) {
                Ok((n, _)) => n,
                Err(_) => continue,
            };
            let state = match wire::deserialize(&buf[..n]) {
                Some(state) => state,
                None => continue,
            };
            if state.id == self.inner.local_id {
                continue;
            }
            self.merge(state);
        }
    }

    fn monitor_loop(&self, reassignment_tx: cbc::Sender<ButtonEvent>) {
        loop {
            sleep(self.inner.sync_timeout);
            self.sweep_expired(&reassignment_tx);
        }
    }

    /// Raises `Fault::Stuck` when the car holds active calls and commands a
    /// direction but neither floor nor direction has changed for a while.
    fn watchdog_loop(&self, fault_tx: cbc::Sender<Fault>) {
        let local = self.local_state();
        let mut prev_floor = local.floor;
        let mut prev_direction = local.direction;
        let mut last_action = Instant::now();

        loop {
            sleep(WATCHDOG_INTERVAL);

            let local = self.local_state();
            if local.floor != prev_floor || local.direction != prev_direction {
                last_action = Instant::now();
                prev_floor = local.floor;
                prev_direction = local.direction;
            }

            let has_active_calls = local
                .requests
                .iter()
                .any(|row| row.iter().any(|&cell| cell));

            if has_active_calls
                && local.direction != Direction::Stop
                && last_action.elapsed() > STUCK_THRESHOLD
            {
                warn!(
                    "No floor or direction change in {:?} despite active calls",
                    last_action.elapsed()
                );
                let _ = fault_tx.send(Fault::Stuck);
                last_action = Instant::now();
            }
        }
    }
}

/***************************************/
/*              Test API               */
/***************************************/
#[cfg(test)]
pub mod testing {
    use super::*;

    impl StateSync {
        /// Backdates a peer's last sync so timeout paths can be exercised
        /// without waiting.
        pub fn test_age_peer(&self, id: u8, age: Duration) {
            let mut states = self.inner.states.write().unwrap();
            if let Some(Some(entry)) = states.get_mut(id as usize) {
                entry.last_sync = Instant::now() - age;
            }
        }

        pub fn test_heartbeat_enabled(&self) -> bool {
            self.inner.heartbeat_enabled.load(Ordering::Relaxed)
        }
    }
}

/**
 * Drives one elevator car.
 *
 * The `ElevatorFSM` (Finite State Machine) turns sensor events (call
 * buttons, floor arrivals, door obstruction), network assignments and fault
 * reports into motor and door commands. It owns the request matrix: hall
 * presses run through the `Assigner` and are only latched here when this car
 * wins the election, assignments addressed to this car are latched directly,
 * and the matrix is published to `StateSync` after every mutation so the
 * peers always read a current snapshot. The cab column is persisted through
 * `CabCallCache` on every mutation.
 *
 * Requests are served SCAN style: keep going while there is work ahead in
 * the direction of travel, then reverse, then rest. The door cycle runs on a
 * single timer with two phases. `Serving` covers the boarding time of the
 * calls cleared at this stop, and turns into a second boarding interval when
 * the stop turns out to be the last one in the travel direction and the
 * opposite hall call gets cleared with it. `Closing` waits for the doorway
 * to be clear; an obstruction holds the door a full door time beyond its
 * deassertion.
 *
 * # Fields
 * - `hw_motor_direction_tx`:   Sends motor direction commands (up, down, stop).
 * - `hw_door_light_tx`:        Controls the door open lamp.
 * - `hw_floor_indicator_tx`:   Sets the floor indicator.
 * - `hw_button_rx`:            Receives call button presses from the driver.
 * - `hw_floor_sensor_rx`:      Receives floor sensor edges.
 * - `hw_obstruction_rx`:       Receives obstruction edges.
 * - `hw_stop_button_rx`:       Receives stop button edges.
 * - `fsm_assignment_rx`:       Receives assignments addressed to this car, both
 *                              from the network and from peer failure reassignment.
 * - `fsm_fault_tx`:            Carries faults raised by the FSM itself.
 * - `fsm_fault_rx`:            Receives faults (own and watchdog) for recovery.
 * - `fsm_terminate_rx`:        Receives a termination signal. Used for testing.
 * - `sync`:                    State replication handle (publish, heartbeat control).
 * - `assigner`:                Hall call assignment.
 * - `cache`:                   Cab call persistence.
 */

/***************************************/
/*        3rd party libraries          */
/***************************************/
use crossbeam_channel as cbc;
use log::{error, info, warn};
use std::time::{Duration, Instant};

/***************************************/
/*           Local modules             */
/***************************************/
use crate::assigner::Assigner;
use crate::config::ElevatorConfig;
use crate::elevator::cab_cache::CabCallCache;
use crate::shared::Behaviour::{DoorOpen, Idle, Moving};
use crate::shared::Direction::{Down, Stop, Up};
use crate::shared::{Behaviour, Button, ButtonEvent, Direction, Fault, RequestMatrix};
use crate::statesync::StateSync;

/***************************************/
/*             Constants               */
/***************************************/
const TICK_INTERVAL: Duration = Duration::from_millis(20);
/// A car resting on a floor reports it within the driver's first poll; no
/// reading within this window means the car starts between floors.
const INITIAL_FLOOR_GRACE: Duration = Duration::from_millis(100);

/***************************************/
/*               Enums                 */
/***************************************/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DoorPhase {
    /// Boarding time for the calls cleared at this stop.
    Serving,
    /// Timer ran out; close as soon as the doorway is clear.
    Closing,
}

/***************************************/
/*             Public API              */
/***************************************/
pub struct ElevatorFSM {
    // Hardware channels
    hw_motor_direction_tx: cbc::Sender<Direction>,
    hw_door_light_tx: cbc::Sender<bool>,
    hw_floor_indicator_tx: cbc::Sender<u8>,
    hw_button_rx: cbc::Receiver<ButtonEvent>,
    hw_floor_sensor_rx: cbc::Receiver<u8>,
    hw_obstruction_rx: cbc::Receiver<bool>,
    hw_stop_button_rx: cbc::Receiver<bool>,

    // Cluster channels
    fsm_assignment_rx: cbc::Receiver<ButtonEvent>,
    fsm_fault_tx: cbc::Sender<Fault>,
    fsm_fault_rx: cbc::Receiver<Fault>,
    fsm_terminate_rx: cbc::Receiver<()>,

    // Collaborators
    sync: StateSync,
    assigner: Assigner,
    cache: CabCallCache,

    // Private fields
    id: u8,
    state: Behaviour,
    floor: u8,
    direction: Direction,
    requests: RequestMatrix,
    door_obstructed: bool,
    door_phase: DoorPhase,
    door_timer: Instant,
    served_direction: Direction,
    recovering: Option<Fault>,
    door_open_time: Duration,
}

impl ElevatorFSM {
    pub fn new(
        config: &ElevatorConfig,
        id: u8,
        sync: StateSync,
        assigner: Assigner,
        cache: CabCallCache,

        hw_motor_direction_tx: cbc::Sender<Direction>,
        hw_door_light_tx: cbc::Sender<bool>,
        hw_floor_indicator_tx: cbc::Sender<u8>,
        hw_button_rx: cbc::Receiver<ButtonEvent>,
        hw_floor_sensor_rx: cbc::Receiver<u8>,
        hw_obstruction_rx: cbc::Receiver<bool>,
        hw_stop_button_rx: cbc::Receiver<bool>,

        fsm_assignment_rx: cbc::Receiver<ButtonEvent>,
        fsm_fault_tx: cbc::Sender<Fault>,
        fsm_fault_rx: cbc::Receiver<Fault>,
        fsm_terminate_rx: cbc::Receiver<()>,
    ) -> ElevatorFSM {
        let requests = cache.restore(config.n_floors);
        ElevatorFSM {
            hw_motor_direction_tx,
            hw_door_light_tx,
            hw_floor_indicator_tx,
            hw_button_rx,
            hw_floor_sensor_rx,
            hw_obstruction_rx,
            hw_stop_button_rx,

            fsm_assignment_rx,
            fsm_fault_tx,
            fsm_fault_rx,
            fsm_terminate_rx,

            sync,
            assigner,
            cache,

            id,
            state: Idle,
            floor: 0,
            direction: Stop,
            requests,
            door_obstructed: false,
            door_phase: DoorPhase::Serving,
            door_timer: Instant::now(),
            served_direction: Stop,
            recovering: None,
            door_open_time: Duration::from_millis(config.door_open_time),
        }
    }

    pub fn run(mut self) {
        self.find_initial_floor();
        info!("Elevator {} starting at floor {}", self.id, self.floor);

        // Serve restored cab calls right away; a call at the starting floor
        // opens the door without moving.
        if self.requests[self.floor as usize][Button::Cab as usize] {
            self.open_door();
        } else {
            self.set_next_direction(Stop);
            if self.state == Moving {
                let _ = self.hw_motor_direction_tx.send(self.direction);
            }
        }
        self.publish();

        // Main loop
        loop {
            cbc::select! {
                recv(self.hw_button_rx) -> event => {
                    match event {
                        Ok(event) => self.handle_button_press(event),
                        Err(e) => {
                            error!("ERROR - hw_button_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.fsm_assignment_rx) -> event => {
                    match event {
                        Ok(event) => self.handle_assignment(event),
                        Err(e) => {
                            error!("ERROR - fsm_assignment_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.hw_floor_sensor_rx) -> floor => {
                    match floor {
                        Ok(floor) => self.handle_floor_arrival(floor),
                        Err(e) => {
                            error!("ERROR - hw_floor_sensor_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.hw_obstruction_rx) -> value => {
                    match value {
                        Ok(value) => self.handle_obstruction(value),
                        Err(e) => {
                            error!("ERROR - hw_obstruction_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.hw_stop_button_rx) -> value => {
                    match value {
                        Ok(_) => (), // polled for completeness, no behaviour attached
                        Err(e) => {
                            error!("ERROR - hw_stop_button_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.fsm_fault_rx) -> fault => {
                    match fault {
                        Ok(fault) => self.handle_fault(fault),
                        Err(e) => {
                            error!("ERROR - fsm_fault_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.fsm_terminate_rx) -> _ => {
                    break;
                }
                default(TICK_INTERVAL) => {
                    match self.state {
                        Idle => self.dispatch_idle(),
                        DoorOpen => self.door_tick(),
                        Moving => (),
                    }
                }
            }
        }
    }

    /***************************************/
    /*           Event handlers            */
    /***************************************/
    fn handle_button_press(&mut self, event: ButtonEvent) {
        info!("Button pressed: {:?} at floor {}", event.button, event.floor);
        match event.button {
            Button::Cab => self.add_request(event),
            Button::HallUp | Button::HallDown => {
                let assignee = self.assigner.assign(event);
                if assignee == self.id {
                    self.add_request(event);
                }
            }
        }
    }

    fn handle_assignment(&mut self, event: ButtonEvent) {
        info!(
            "Assignment received: {:?} at floor {}",
            event.button, event.floor
        );
        self.add_request(event);
    }

    fn handle_floor_arrival(&mut self, floor: u8) {
        info!("Floor sensor: {}", floor);

        if let Some(fault) = self.recovering.take() {
            self.sync.enable_heartbeat();
            if fault == Fault::DoorObstruction {
                self.floor = floor;
                let _ = self.hw_floor_indicator_tx.send(floor);
                self.open_door();
                return;
            }
            // The car moves again; handle the arrival as usual.
        }

        match self.state {
            Moving => {
                self.floor = floor;
                let _ = self.hw_floor_indicator_tx.send(floor);
                self.publish();
                if self.should_stop() {
                    self.open_door();
                }
            }
            Idle => {
                self.floor = floor;
                let _ = self.hw_floor_indicator_tx.send(floor);
                let _ = self.fsm_fault_tx.send(Fault::UnexpectedMove);
            }
            DoorOpen => {
                self.floor = floor;
                let _ = self.hw_floor_indicator_tx.send(floor);
                let _ = self.fsm_fault_tx.send(Fault::DoorOpenMove);
            }
        }
    }

    fn handle_obstruction(&mut self, is_obstructed: bool) {
        info!("Door obstruction: {}", is_obstructed);
        self.door_obstructed = is_obstructed;
        if self.state != DoorOpen {
            let _ = self.fsm_fault_tx.send(Fault::DoorObstruction);
        }
    }

    /// Local recovery: silence the heartbeat so the peers take over the hall
    /// orders, bring the car to a safe configuration, then resume syncing.
    /// Cab orders stay latched and persisted throughout.
    fn handle_fault(&mut self, fault: Fault) {
        warn!("Recovering from fault: {}", fault);
        self.sync.disable_heartbeat();

        match fault {
            Fault::UnexpectedMove | Fault::DoorOpenMove => {
                let _ = self.hw_motor_direction_tx.send(Stop);
                let _ = self.hw_door_light_tx.send(false);
                self.state = Idle;
                self.direction = Stop;
                self.publish();
                self.sync.enable_heartbeat();
            }
            Fault::DoorObstruction => {
                if self.state == DoorOpen {
                    // Already serving the doorway, nothing to repair.
                    self.sync.enable_heartbeat();
                } else if self.state == Idle {
                    self.open_door();
                    self.sync.enable_heartbeat();
                } else {
                    // Finish the recovery at the next floor.
                    self.recovering = Some(fault);
                }
            }
            Fault::Stuck => {
                if self.direction == Stop {
                    // Recovered on its own before the report arrived.
                    self.sync.enable_heartbeat();
                } else {
                    let _ = self.hw_motor_direction_tx.send(self.direction);
                    self.recovering = Some(fault);
                }
            }
        }
    }

    /***************************************/
    /*          Request handling           */
    /***************************************/
    fn add_request(&mut self, event: ButtonEvent) {
        // The open door serves its own floor on the spot: the call is not
        // latched, it only buys the passenger another boarding interval.
        if self.state == DoorOpen && event.floor == self.floor {
            self.requests[event.floor as usize][event.button as usize] = false;
            self.commit_requests();
            self.door_timer = Instant::now() + self.door_open_time;
            self.door_phase = DoorPhase::Serving;
            return;
        }

        self.requests[event.floor as usize][event.button as usize] = true;
        self.commit_requests();

        if self.state == Idle {
            if event.floor > self.floor {
                self.state = Moving;
                self.direction = Up;
                let _ = self.hw_motor_direction_tx.send(self.direction);
                self.publish();
            } else if event.floor < self.floor {
                self.state = Moving;
                self.direction = Down;
                let _ = self.hw_motor_direction_tx.send(self.direction);
                self.publish();
            } else {
                self.open_door();
            }
        }
    }

    /// SCAN stop policy: take the floor iff it holds a cab call, a hall call
    /// in the direction of travel, or there is nothing left ahead.
    fn should_stop(&self) -> bool {
        let floor = self.floor as usize;
        match self.direction {
            Up => {
                self.requests[floor][Button::Cab as usize]
                    || self.requests[floor][Button::HallUp as usize]
                    || !self.has_request_above()
            }
            Down => {
                self.requests[floor][Button::Cab as usize]
                    || self.requests[floor][Button::HallDown as usize]
                    || !self.has_request_below()
            }
            Stop => false,
        }
    }

    fn has_request_above(&self) -> bool {
        self.requests[self.floor as usize + 1..]
            .iter()
            .any(|row| row.iter().any(|&cell| cell))
    }

    fn has_request_below(&self) -> bool {
        self.requests[..self.floor as usize]
            .iter()
            .any(|row| row.iter().any(|&cell| cell))
    }

    /// Clears the calls this stop serves: the cab call and the hall call in
    /// the direction of travel. A car stopped without direction serves both
    /// sides. Returns whether any call was actually served.
    fn clear_requests_at_floor(&mut self) -> bool {
        let floor = self.floor as usize;
        let mut cleared = false;

        if self.requests[floor][Button::Cab as usize] {
            self.requests[floor][Button::Cab as usize] = false;
            cleared = true;
        }
        match self.served_direction {
            Up => {
                if self.requests[floor][Button::HallUp as usize] {
                    self.requests[floor][Button::HallUp as usize] = false;
                    cleared = true;
                }
            }
            Down => {
                if self.requests[floor][Button::HallDown as usize] {
                    self.requests[floor][Button::HallDown as usize] = false;
                    cleared = true;
                }
            }
            Stop => {
                self.requests[floor][Button::HallUp as usize] = false;
                self.requests[floor][Button::HallDown as usize] = false;
                cleared = true;
            }
        }
        cleared
    }

    /// The last stop in a direction serves the opposite hall call as well.
    /// Returns whether a latched call was cleared by it.
    fn clear_opposite_requests(&mut self) -> bool {
        let floor = self.floor as usize;
        match self.served_direction {
            Up if !self.has_request_above() => {
                let was_set = self.requests[floor][Button::HallDown as usize];
                self.requests[floor][Button::HallDown as usize] = false;
                was_set
            }
            Down if !self.has_request_below() => {
                let was_set = self.requests[floor][Button::HallUp as usize];
                self.requests[floor][Button::HallUp as usize] = false;
                was_set
            }
            _ => false,
        }
    }

    /// SCAN dispatch: keep the previous direction while there is work ahead,
    /// then turn around, then rest.
    fn set_next_direction(&mut self, previous: Direction) {
        if previous == Up && self.has_request_above() {
            self.state = Moving;
            self.direction = Up;
        } else if previous == Down && self.has_request_below() {
            self.state = Moving;
            self.direction = Down;
        } else if self.has_request_above() {
            self.state = Moving;
            self.direction = Up;
        } else if self.has_request_below() {
            self.state = Moving;
            self.direction = Down;
        } else {
            self.state = Idle;
            self.direction = Stop;
        }
    }

    /***************************************/
    /*             Door cycle              */
    /***************************************/
    fn open_door(&mut self) {
        self.served_direction = self.direction;
        self.state = DoorOpen;
        self.direction = Stop;
        let _ = self.hw_motor_direction_tx.send(Stop);
        let _ = self.hw_door_light_tx.send(true);

        let cleared = self.clear_requests_at_floor();
        self.door_phase = DoorPhase::Serving;
        self.door_timer = if cleared {
            Instant::now() + self.door_open_time
        } else {
            Instant::now()
        };
        self.commit_requests();
    }

    fn door_tick(&mut self) {
        match self.door_phase {
            DoorPhase::Serving => {
                if Instant::now() < self.door_timer {
                    return;
                }
                if self.clear_opposite_requests() {
                    self.door_timer = Instant::now() + self.door_open_time;
                    self.commit_requests();
                }
                self.door_phase = DoorPhase::Closing;
            }
            DoorPhase::Closing => {
                if self.door_obstructed {
                    // Hold the door a full boarding interval beyond the
                    // obstruction.
                    self.door_timer = Instant::now() + self.door_open_time;
                    return;
                }
                if Instant::now() >= self.door_timer {
                    self.close_door();
                }
            }
        }
    }

    fn close_door(&mut self) {
        let _ = self.hw_door_light_tx.send(false);
        self.set_next_direction(self.served_direction);
        let _ = self.hw_motor_direction_tx.send(self.direction);
        self.publish();
    }

    /// An idle car with pending work starts serving it within one tick.
    /// This is also what restarts service after fault recovery and after a
    /// restore from disk.
    fn dispatch_idle(&mut self) {
        if self.requests[self.floor as usize].iter().any(|&cell| cell) {
            self.open_door();
            return;
        }
        self.set_next_direction(Stop);
        if self.state == Moving {
            let _ = self.hw_motor_direction_tx.send(self.direction);
            self.publish();
        }
    }

    /***************************************/
    /*              Helpers                */
    /***************************************/
    fn find_initial_floor(&mut self) {
        match self.hw_floor_sensor_rx.recv_timeout(INITIAL_FLOOR_GRACE) {
            Ok(floor) => self.floor = floor,
            Err(_) => {
                // Between floors: drive up until a floor is sensed.
                let _ = self.hw_motor_direction_tx.send(Up);
                match self.hw_floor_sensor_rx.recv() {
                    Ok(floor) => self.floor = floor,
                    Err(e) => {
                        error!("ERROR - hw_floor_sensor_rx: {}", e);
                        std::process::exit(1);
                    }
                }
                let _ = self.hw_motor_direction_tx.send(Stop);
            }
        }
        let _ = self.hw_floor_indicator_tx.send(self.floor);
    }

    fn publish(&self) {
        self.sync.publish(self.floor, self.direction, &self.requests);
    }

    fn commit_requests(&mut self) {
        self.cache.flush(&self.requests);
        self.publish();
    }
}

/***************************************/
/*              Test API               */
/***************************************/

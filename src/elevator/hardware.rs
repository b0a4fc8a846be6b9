/**
 * # Elevator Driver
 * Owns the TCP connection to the physical elevator panel.
 *
 * The driver thread polls the floor sensor, the stop button, the obstruction
 * switch and the call buttons, and forwards edges as events to the
 * controller. In the same loop it executes motor, lamp and indicator
 * commands received on channels from the controller and the lamp driver.
 *
 * # Fields
 * - `elevator`:                Instance of `Elevator` for low-level hardware control.
 * - `thread_sleep_time`:       Duration in milliseconds the driver thread sleeps for in each loop iteration.
 * - `current_floor`:           The last floor reading forwarded, `u8::MAX` before the first one.
 * - `obstruction`:             Last obstruction level. Used to only send changes over `hw_obstruction_tx`.
 * - `stop_button`:             Last stop button level. Used to only send changes over `hw_stop_button_tx`.
 * - `buttons`:                 Last call button levels. Used to send presses on the rising edge only.
 * - `hw_motor_direction_rx`:   Receiver for motor direction commands.
 * - `hw_button_light_rx`:      Receiver for button light control commands.
 * - `hw_door_light_rx`:        Receiver for door light control commands.
 * - `hw_floor_indicator_rx`:   Receiver for floor indicator commands.
 * - `hw_button_tx`:            Sender for call button events.
 * - `hw_floor_sensor_tx`:      Sender for floor sensor events.
 * - `hw_obstruction_tx`:       Sender for obstruction events.
 * - `hw_stop_button_tx`:       Sender for stop button events.
 * - `terminate_rx`:            Receiver for termination signal.
 */

/***************************************/
/*        3rd party libraries          */
/***************************************/
use crossbeam_channel as cbc;
use driver_rust::elevio::elev::Elevator;
use driver_rust::elevio::elev::{CAB, HALL_DOWN, HALL_UP};
use log::error;
use std::time::Duration;

/***************************************/
/*           Local modules             */
/***************************************/
use crate::config::HardwareConfig;
use crate::shared::{Button, ButtonEvent, Direction};
use crate::unwrap_or_exit;

/***************************************/
/*             Public API              */
/***************************************/
pub struct ElevatorDriver {
    elevator: Elevator,
    thread_sleep_time: u64,
    current_floor: u8,
    obstruction: bool,
    stop_button: bool,
    buttons: Vec<[bool; 3]>,
    hw_motor_direction_rx: cbc::Receiver<Direction>,
    hw_button_light_rx: cbc::Receiver<(u8, Button, bool)>,
    hw_door_light_rx: cbc::Receiver<bool>,
    hw_floor_indicator_rx: cbc::Receiver<u8>,
    hw_button_tx: cbc::Sender<ButtonEvent>,
    hw_floor_sensor_tx: cbc::Sender<u8>,
    hw_obstruction_tx: cbc::Sender<bool>,
    hw_stop_button_tx: cbc::Sender<bool>,
    terminate_rx: cbc::Receiver<()>,
}

impl ElevatorDriver {
    pub fn new(
        config: &HardwareConfig,
        hw_motor_direction_rx: cbc::Receiver<Direction>,
        hw_button_light_rx: cbc::Receiver<(u8, Button, bool)>,
        hw_door_light_rx: cbc::Receiver<bool>,
        hw_floor_indicator_rx: cbc::Receiver<u8>,
        hw_button_tx: cbc::Sender<ButtonEvent>,
        hw_floor_sensor_tx: cbc::Sender<u8>,
        hw_obstruction_tx: cbc::Sender<bool>,
        hw_stop_button_tx: cbc::Sender<bool>,
        terminate_rx: cbc::Receiver<()>,
    ) -> ElevatorDriver {
        ElevatorDriver {
            elevator: unwrap_or_exit!(Elevator::init(&config.driver_address, config.n_floors)),
            thread_sleep_time: config.hw_thread_sleep_time,
            current_floor: u8::MAX,
            obstruction: false,
            stop_button: false,
            buttons: vec![[false; 3]; config.n_floors as usize],
            hw_motor_direction_rx,
            hw_button_light_rx,
            hw_door_light_rx,
            hw_floor_indicator_rx,
            hw_button_tx,
            hw_floor_sensor_tx,
            hw_obstruction_tx,
            hw_stop_button_tx,
            terminate_rx,
        }
    }

    pub fn run(mut self) {
        // Reset system
        for floor in 0..self.elevator.num_floors {
            self.elevator.call_button_light(floor, HALL_UP, false);
            self.elevator.call_button_light(floor, HALL_DOWN, false);
            self.elevator.call_button_light(floor, CAB, false);
        }
        self.obstruction = self.elevator.obstruction();

        // Main loop
        loop {
            // A car resting on a floor reports it on the first pass, so the
            // controller learns its starting floor without moving.
            if let Some(floor) = self.elevator.floor_sensor() {
                if floor != self.current_floor {
                    self.current_floor = floor;
                    unwrap_or_exit!(self.hw_floor_sensor_tx.send(floor));
                }
            }

            // Check if stop button is toggled
            if self.elevator.stop_button() != self.stop_button {
                self.stop_button = !self.stop_button;
                unwrap_or_exit!(self.hw_stop_button_tx.send(self.stop_button));
            }

            // Check if obstruction is toggled
            if self.elevator.obstruction() != self.obstruction {
                self.obstruction = !self.obstruction;
                unwrap_or_exit!(self.hw_obstruction_tx.send(self.obstruction));
            }

            // Check if any call buttons are pressed (rising edge)
            for floor in 0..self.elevator.num_floors {
                for button in [Button::HallUp, Button::HallDown, Button::Cab] {
                    let pressed = self.elevator.call_button(floor, button.to_u8());
                    if pressed && !self.buttons[floor as usize][button as usize] {
                        unwrap_or_exit!(self.hw_button_tx.send(ButtonEvent { floor, button }));
                    }
                    self.buttons[floor as usize][button as usize] = pressed;
                }
            }

            // Handle incoming commands
            cbc::select! {
                recv(self.hw_motor_direction_rx) -> msg => {
                    match msg {
                        Ok(direction) => self.elevator.motor_direction(direction.to_u8()),
                        Err(e) => {
                            error!("ERROR - hw_motor_direction_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.hw_button_light_rx) -> msg => {
                    match msg {
                        Ok((floor, button, on)) => self.elevator.call_button_light(floor, button.to_u8(), on),
                        Err(e) => {
                            error!("ERROR - hw_button_light_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.hw_door_light_rx) -> msg => {
                    match msg {
                        Ok(on) => self.elevator.door_light(on),
                        Err(e) => {
                            error!("ERROR - hw_door_light_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.hw_floor_indicator_rx) -> msg => {
                    match msg {
                        Ok(floor) => self.elevator.floor_indicator(floor),
                        Err(e) => {
                            error!("ERROR - hw_floor_indicator_rx: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                recv(self.terminate_rx) -> _ => {
                    break;
                }
                default(Duration::from_millis(self.thread_sleep_time)) => {}
            }
        }
    }
}

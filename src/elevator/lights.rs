/***************************************/
/*        3rd party libraries          */
/***************************************/
use crossbeam_channel as cbc;
use std::thread::sleep;
use std::time::Duration;

/***************************************/
/*           Local modules             */
/***************************************/
use crate::shared::{empty_requests, Button};
use crate::statesync::StateSync;
use crate::unwrap_or_exit;

/***************************************/
/*             Constants               */
/***************************************/
const LAMP_REFRESH_INTERVAL: Duration = Duration::from_millis(20);

/***************************************/
/*             Public API              */
/***************************************/
/// Mirrors the cluster-wide request image onto the button lamps. Hall lamps
/// follow the OR of every live car, cab lamps follow the local car alone.
/// Only cells that changed since the last pass are written out.
pub fn run(n_floors: u8, sync: StateSync, hw_button_light_tx: cbc::Sender<(u8, Button, bool)>) {
    let mut lit = empty_requests(n_floors);
    loop {
        sleep(LAMP_REFRESH_INTERVAL);

        let target = sync.or_aggregated_requests();
        for floor in 0..n_floors as usize {
            for button in [Button::HallUp, Button::HallDown, Button::Cab] {
                let on = target[floor][button as usize];
                if on != lit[floor][button as usize] {
                    unwrap_or_exit!(hw_button_light_tx.send((floor as u8, button, on)));
                    lit[floor][button as usize] = on;
                }
            }
        }
    }
}

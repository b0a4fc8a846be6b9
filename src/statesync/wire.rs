/**
 * Datagram codec for replicated car states.
 *
 * Layout (multi-byte fields little-endian):
 *
 * | offset | size | field                                            |
 * |--------|------|--------------------------------------------------|
 * | 0      | 1    | car id                                           |
 * | 1      | 4    | nonce (u32)                                      |
 * | 5      | 1    | current floor                                    |
 * | 6      | 1    | direction (driver byte: Up=1, Down=0xFF, Stop=0) |
 * | 7      | 3*F  | request matrix row-major [HallUp, HallDown, Cab] |
 */

/***************************************/
/*        3rd party libraries          */
/***************************************/
use driver_rust::elevio::elev::{DIRN_DOWN, DIRN_STOP, DIRN_UP};

/***************************************/
/*           Local modules             */
/***************************************/
use crate::shared::{CarState, Direction};

/***************************************/
/*             Constants               */
/***************************************/
pub const HEADER_LEN: usize = 7;

/***************************************/
/*             Public API              */
/***************************************/
pub fn serialize(state: &CarState) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + 3 * state.requests.len());
    buf.push(state.id);
    buf.extend_from_slice(&state.nonce.to_le_bytes());
    buf.push(state.floor);
    buf.push(state.direction.to_u8());
    for row in &state.requests {
        for &cell in row {
            buf.push(cell as u8);
        }
    }
    buf
}

/// Rejects datagrams with a torn length, a floor outside the request
/// matrix, an unknown direction byte or a request cell outside {0, 1}.
pub fn deserialize(buf: &[u8]) -> Option<CarState> {
    if buf.len() < HEADER_LEN || (buf.len() - HEADER_LEN) % 3 != 0 {
        return None;
    }

    // Everything downstream indexes the matrix by this floor; a datagram
    // claiming a floor it has no row for must not reach the peer table.
    if buf[5] as usize >= (buf.len() - HEADER_LEN) / 3 {
        return None;
    }

    let direction = match buf[6] {
        DIRN_UP => Direction::Up,
        DIRN_DOWN => Direction::Down,
        DIRN_STOP => Direction::Stop,
        _ => return None,
    };

    let mut requests = Vec::with_capacity((buf.len() - HEADER_LEN) / 3);
    for row in buf[HEADER_LEN..].chunks(3) {
        let mut cells = [false; 3];
        for (cell, &byte) in cells.iter_mut().zip(row) {
            *cell = match byte {
                0 => false,
                1 => true,
                _ => return None,
            };
        }
        requests.push(cells);
    }

    Some(CarState {
        id: buf[0],
        nonce: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
        floor: buf[5],
        direction,
        requests,
    })
}

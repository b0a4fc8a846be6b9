/***************************************/
/*        3rd party libraries          */
/***************************************/
use driver_rust::elevio::elev::{CAB, DIRN_DOWN, DIRN_STOP, DIRN_UP, HALL_DOWN, HALL_UP};
use std::fmt;

/***************************************/
/*       Public data structures        */
/***************************************/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Idle,
    Moving,
    DoorOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Stop,
}

impl Direction {
    pub fn to_u8(&self) -> u8 {
        match *self {
            Direction::Up => DIRN_UP,
            Direction::Down => DIRN_DOWN,
            Direction::Stop => DIRN_STOP,
        }
    }
}

impl From<u8> for Direction {
    fn from(item: u8) -> Self {
        match item {
            DIRN_UP => Direction::Up,
            DIRN_DOWN => Direction::Down,
            DIRN_STOP => Direction::Stop,
            _ => panic!("Invalid direction value"),
        }
    }
}

/// Call button kinds. The discriminants double as the column index of a
/// request matrix row and match the driver's button encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    HallUp = 0,
    HallDown = 1,
    Cab = 2,
}

impl Button {
    pub fn to_u8(&self) -> u8 {
        match *self {
            Button::HallUp => HALL_UP,
            Button::HallDown => HALL_DOWN,
            Button::Cab => CAB,
        }
    }
}

impl From<u8> for Button {
    fn from(item: u8) -> Self {
        match item {
            HALL_UP => Button::HallUp,
            HALL_DOWN => Button::HallDown,
            CAB => Button::Cab,
            _ => panic!("Invalid button value"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub floor: u8,
    pub button: Button,
}

/// One row per floor, columns ordered [HallUp, HallDown, Cab].
pub type RequestMatrix = Vec<[bool; 3]>;

pub fn empty_requests(n_floors: u8) -> RequestMatrix {
    vec![[false; 3]; n_floors as usize]
}

/// Snapshot of one car as replicated between the nodes. Pure data; the
/// receive timestamp is tracked next to it in the peer table.
#[derive(Debug, Clone, PartialEq)]
pub struct CarState {
    pub id: u8,
    pub nonce: u32,
    pub floor: u8,
    pub direction: Direction,
    pub requests: RequestMatrix,
}

impl CarState {
    pub fn new(id: u8, n_floors: u8) -> CarState {
        CarState {
            id,
            nonce: 0,
            floor: 0,
            direction: Direction::Stop,
            requests: empty_requests(n_floors),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    UnexpectedMove,
    DoorOpenMove,
    DoorObstruction,
    Stuck,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Fault::UnexpectedMove => "unexpected move",
            Fault::DoorOpenMove => "door open move",
            Fault::DoorObstruction => "door obstruction",
            Fault::Stuck => "elevator stuck",
        };
        write!(f, "{}", name)
    }
}

/* 3rd party libraries */
use clap::{Arg, Command};
use crossbeam_channel as cbc;
use log::info;
use std::thread::Builder;
use std::time::Duration;

/* Custom libraries */
use assigner::Assigner;
use elevator::cab_cache::CabCallCache;
use elevator::ElevatorDriver;
use elevator::ElevatorFSM;
use shared::{Button, ButtonEvent, Direction, Fault};
use statesync::StateSync;

/* Modules */
mod assigner;
mod config;
mod elevator;
mod shared;
mod statesync;

/* Main */
fn main() {
    env_logger::init();

    let matches = Command::new("elevator")
        .about("Distributed multi-car elevator control node")
        .arg(
            Arg::new("id")
                .long("id")
                .takes_value(true)
                .required(true)
                .help("Dense non-negative car identifier, unique per cluster"),
        )
        .arg(
            Arg::new("addr")
                .long("addr")
                .takes_value(true)
                .help("TCP address of the elevator hardware driver"),
        )
        .get_matches();

    let id: u8 = matches
        .value_of("id")
        .unwrap()
        .parse()
        .expect("--id must be a small non-negative integer");

    // Load the configuration
    let mut config = config::load_config();
    if let Some(addr) = matches.value_of("addr") {
        config.hardware.driver_address = addr.to_string();
    }
    let n_floors = config.elevator.n_floors;

    info!("Starting elevator {} with {} floors", id, n_floors);

    // Hardware channels
    let (hw_motor_direction_tx, hw_motor_direction_rx) = cbc::unbounded::<Direction>();
    let (hw_button_light_tx, hw_button_light_rx) = cbc::unbounded::<(u8, Button, bool)>();
    let (hw_door_light_tx, hw_door_light_rx) = cbc::unbounded::<bool>();
    let (hw_floor_indicator_tx, hw_floor_indicator_rx) = cbc::unbounded::<u8>();
    let (hw_button_tx, hw_button_rx) = cbc::unbounded::<ButtonEvent>();
    let (hw_floor_sensor_tx, hw_floor_sensor_rx) = cbc::unbounded::<u8>();
    let (hw_obstruction_tx, hw_obstruction_rx) = cbc::unbounded::<bool>();
    let (hw_stop_button_tx, hw_stop_button_rx) = cbc::unbounded::<bool>();

    // Cluster channels
    let (fsm_assignment_tx, fsm_assignment_rx) = cbc::unbounded::<ButtonEvent>();
    let (fsm_fault_tx, fsm_fault_rx) = cbc::unbounded::<Fault>();

    // Terminate channels are only ever signalled from tests; the senders are
    // kept alive here so the receive ends stay connected.
    let (_hw_terminate_tx, hw_terminate_rx) = cbc::unbounded::<()>();
    let (_fsm_terminate_tx, fsm_terminate_rx) = cbc::unbounded::<()>();

    // Start the hardware driver
    let driver = ElevatorDriver::new(
        &config.hardware,
        hw_motor_direction_rx,
        hw_button_light_rx,
        hw_door_light_rx,
        hw_floor_indicator_rx,
        hw_button_tx,
        hw_floor_sensor_tx,
        hw_obstruction_tx,
        hw_stop_button_tx,
        hw_terminate_rx,
    );
    Builder::new()
        .name("hardware".into())
        .spawn(move || driver.run())
        .unwrap();

    // Start state replication
    let sync = StateSync::new(
        id,
        n_floors,
        Duration::from_millis(config.network.sync_timeout),
    );
    sync.start(
        &config.network,
        fsm_assignment_tx.clone(),
        fsm_fault_tx.clone(),
    );

    // Start the assignment receiver
    assigner::spawn_receiver(&config.network, id, fsm_assignment_tx);
    let assigner = Assigner::new(id, &config.network, sync.clone());

    // Start the hall lamp driver
    {
        let sync = sync.clone();
        Builder::new()
            .name("lights".into())
            .spawn(move || elevator::lights::run(n_floors, sync, hw_button_light_tx))
            .unwrap();
    }

    // Run the controller on the main thread
    let fsm = ElevatorFSM::new(
        &config.elevator,
        id,
        sync,
        assigner,
        CabCallCache::default_path(),
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
    );
    fsm.run();
}

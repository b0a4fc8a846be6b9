/***************************************/
/*        3rd party libraries          */
/***************************************/
use log::warn;
use std::net::UdpSocket;
use std::thread::sleep;
use std::time::Duration;

/***************************************/
/*             Constants               */
/***************************************/
const RETRY_DELAY: Duration = Duration::from_secs(1);

/***************************************/
/*             Public API              */
/***************************************/
/// Socket for sending to the LAN broadcast address. Retries forever: a node
/// without networking keeps serving its own calls and rejoins when it can.
pub fn open_broadcast_socket() -> UdpSocket {
    loop {
        match UdpSocket::bind(("0.0.0.0", 0)) {
            Ok(socket) => match socket.set_broadcast(true) {
                Ok(()) => return socket,
                Err(e) => warn!("Failed to enable broadcast: {}", e),
            },
            Err(e) => warn!("Failed to open send socket: {}", e),
        }
        sleep(RETRY_DELAY);
    }
}

/// Listener on `port` for broadcast datagrams, retried until the port is free.
pub fn bind_listener(port: u16) -> UdpSocket {
    loop {
        match UdpSocket::bind(("0.0.0.0", port)) {
            Ok(socket) => return socket,
            Err(e) => {
                warn!("Failed to bind UDP port {}: {}", port, e);
                sleep(RETRY_DELAY);
            }
        }
    }
}

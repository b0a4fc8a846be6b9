/***************************************/
/*        3rd party libraries          */
/***************************************/
use log::warn;
use std::fs;

/***************************************/
/*           Local modules             */
/***************************************/
use crate::shared::{empty_requests, Button, RequestMatrix};

/***************************************/
/*             Constants               */
/***************************************/
const DEFAULT_CACHE_PATH: &str = ".cabcall_cache";

/***************************************/
/*             Public API              */
/***************************************/
/// On-disk image of the cab column: one ASCII '0'/'1' byte per floor,
/// rewritten in full on every request mutation. Cab calls restored from it
/// survive a process restart.
pub struct CabCallCache {
    path: String,
}

impl CabCallCache {
    pub fn new(path: &str) -> CabCallCache {
        CabCallCache {
            path: path.to_string(),
        }
    }

    pub fn default_path() -> CabCallCache {
        CabCallCache::new(DEFAULT_CACHE_PATH)
    }

    /// Write errors are logged and swallowed: losing the cache degrades a
    /// restart, not the running car.
    pub fn flush(&self, requests: &RequestMatrix) {
        let bytes: Vec<u8> = requests
            .iter()
            .map(|row| if row[Button::Cab as usize] { b'1' } else { b'0' })
            .collect();
        if let Err(e) = fs::write(&self.path, &bytes) {
            warn!("Error writing to `{}`: {}", self.path, e);
        }
    }

    /// A missing or malformed cache restores an empty matrix.
    pub fn restore(&self, n_floors: u8) -> RequestMatrix {
        let mut requests = empty_requests(n_floors);

        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(_) => return requests,
        };
        if content.len() != n_floors as usize {
            warn!("Invalid state of `{}`: not enough floors", self.path);
            return requests;
        }

        for (floor, &byte) in content.iter().enumerate() {
            requests[floor][Button::Cab as usize] = byte != b'0';
        }
        requests
    }
}

/*
 * Unit tests for the cab call cache
 *
 * The unit tests follow the Arrange, Act, Assert pattern. Every test uses
 * its own file under the system temp directory.
 *
 * Tests:
 * - test_flush_then_restore
 * - test_flush_writes_ascii_image
 * - test_restore_handwritten_file
 * - test_restore_missing_file
 * - test_restore_wrong_length
 */

/***************************************/
/*             Unit tests              */
/***************************************/
use std::fs;

use crate::elevator::cab_cache::CabCallCache;
use crate::shared::Button::{Cab, HallDown, HallUp};
use crate::shared::empty_requests;

fn cache_at(name: &str) -> CabCallCache {
    let path = std::env::temp_dir()
        .join(format!("cabcall_cache_{}", name))
        .to_string_lossy()
        .into_owned();
    let _ = fs::remove_file(&path);
    CabCallCache::new(&path)
}

#[test]
fn test_flush_then_restore() {
    // Arrange: hall bits set alongside cab bits; only cab may survive
    let cache = cache_at("flush_then_restore");
    let mut requests = empty_requests(3);
    requests[0][HallUp as usize] = true;
    requests[1][HallDown as usize] = true;
    requests[1][Cab as usize] = true;
    requests[2][Cab as usize] = true;

    // Act
    cache.flush(&requests);
    let restored = cache.restore(3);

    // Assert
    let mut expected = empty_requests(3);
    expected[1][Cab as usize] = true;
    expected[2][Cab as usize] = true;
    assert_eq!(restored, expected);
}

#[test]
fn test_flush_writes_ascii_image() {
    // Arrange
    let cache = cache_at("ascii_image");
    let mut requests = empty_requests(4);
    requests[1][Cab as usize] = true;

    // Act
    cache.flush(&requests);

    // Assert
    let path = std::env::temp_dir().join("cabcall_cache_ascii_image");
    assert_eq!(fs::read(path).unwrap(), b"0100");
}

#[test]
fn test_restore_handwritten_file() {
    // Arrange
    let cache = cache_at("handwritten");
    let path = std::env::temp_dir().join("cabcall_cache_handwritten");
    fs::write(path, "101").unwrap();

    // Act
    let restored = cache.restore(3);

    // Assert
    let mut expected = empty_requests(3);
    expected[0][Cab as usize] = true;
    expected[2][Cab as usize] = true;
    assert_eq!(restored, expected);
}

#[test]
fn test_restore_missing_file() {
    // Arrange
    let cache = cache_at("missing");

    // Act / Assert
    assert_eq!(cache.restore(4), empty_requests(4));
}

#[test]
fn test_restore_wrong_length() {
    // Arrange
    let cache = cache_at("wrong_length");
    let path = std::env::temp_dir().join("cabcall_cache_wrong_length");
    fs::write(path, "01").unwrap();

    // Act / Assert
    assert_eq!(cache.restore(4), empty_requests(4));
}

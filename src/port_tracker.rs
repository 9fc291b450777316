// src/port_tracker.rs
//
// Port ownership tracker.
// A serial port is a single-handle device: only one open connection may own it.
// Connections claim a port before opening it and release the claim when they
// close. Each claim gets its own token, so two connections running under the
// same application name still cannot share a port or release each other's claim.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Identifies one claim. Returned by `claim` and required by `release`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClaimToken(u64);

struct PortClaim {
    token: ClaimToken,
    /// Application name, for messages and `owner_of`
    owner: String,
}

/// Map of port name -> current claim
static PORT_CLAIMS: Lazy<Mutex<HashMap<String, PortClaim>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Interval between ownership checks while waiting on a contended port
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Claim a port for `owner`. Fails if the port is already claimed, whoever holds it.
pub fn claim(port: &str, owner: &str) -> Result<ClaimToken, String> {
    let mut map = PORT_CLAIMS
        .lock()
        .map_err(|e| format!("Port tracker lock poisoned: {}", e))?;

    if let Some(current) = map.get(port) {
        return Err(format!("Port {} is in use by {}", port, current.owner));
    }

    let token = ClaimToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
    map.insert(
        port.to_string(),
        PortClaim {
            token,
            owner: owner.to_string(),
        },
    );
    tlog!("[port_tracker] Port '{}' claimed by '{}'", port, owner);
    Ok(token)
}

/// Claim a port, waiting up to `timeout` for the current holder to release it.
pub fn claim_with_timeout(port: &str, owner: &str, timeout: Duration) -> Result<ClaimToken, String> {
    let deadline = Instant::now() + timeout;
    loop {
        match claim(port, owner) {
            Ok(token) => return Ok(token),
            Err(e) if Instant::now() >= deadline => return Err(e),
            Err(_) => std::thread::sleep(CLAIM_POLL_INTERVAL),
        }
    }
}

/// Release a claim. Does nothing unless `token` is the port's current claim.
pub fn release(port: &str, token: ClaimToken) {
    if let Ok(mut map) = PORT_CLAIMS.lock() {
        if map.get(port).map(|c| c.token == token).unwrap_or(false) {
            if let Some(claim) = map.remove(port) {
                tlog!("[port_tracker] Port '{}' released by '{}'", port, claim.owner);
            }
        }
    }
}

/// Which application owns the port, if any
pub fn owner_of(port: &str) -> Option<String> {
    PORT_CLAIMS
        .lock()
        .ok()
        .and_then(|map| map.get(port).map(|c| c.owner.clone()))
}

pub fn is_owned(port: &str) -> bool {
    owner_of(port).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Port names are unique per test; the tracker is process-wide.

    #[test]
    fn test_claim_and_release() {
        assert!(!is_owned("test-claim-0"));
        let token = claim("test-claim-0", "monicom").unwrap();
        assert_eq!(owner_of("test-claim-0").as_deref(), Some("monicom"));

        release("test-claim-0", token);
        assert!(!is_owned("test-claim-0"));
    }

    #[test]
    fn test_same_owner_cannot_claim_twice() {
        let first = claim("test-claim-dup", "monicom").unwrap();
        let err = claim("test-claim-dup", "monicom").unwrap_err();
        assert!(err.contains("in use by monicom"));

        release("test-claim-dup", first);
        let second = claim("test-claim-dup", "monicom").unwrap();
        assert_ne!(first, second);

        // A stale token does not release the newer claim
        release("test-claim-dup", first);
        assert!(is_owned("test-claim-dup"));
        release("test-claim-dup", second);
        assert!(!is_owned("test-claim-dup"));
    }

    #[test]
    fn test_contended_claim_fails() {
        let first = claim("test-claim-1", "first").unwrap();
        let err = claim("test-claim-1", "second").unwrap_err();
        assert!(err.contains("in use by first"));
        release("test-claim-1", first);
    }

    #[test]
    fn test_claim_with_timeout_waits_for_release() {
        let first = claim("test-claim-2", "first").unwrap();

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            release("test-claim-2", first);
        });

        let second = claim_with_timeout("test-claim-2", "second", Duration::from_secs(2)).unwrap();
        assert_eq!(owner_of("test-claim-2").as_deref(), Some("second"));
        releaser.join().unwrap();
        release("test-claim-2", second);
    }

    #[test]
    fn test_claim_with_timeout_gives_up() {
        let first = claim("test-claim-3", "first").unwrap();
        let started = Instant::now();
        assert!(claim_with_timeout("test-claim-3", "second", Duration::from_millis(120)).is_err());
        assert!(started.elapsed() >= Duration::from_millis(120));
        release("test-claim-3", first);
    }
}

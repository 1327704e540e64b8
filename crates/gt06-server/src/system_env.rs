//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` is the production implementation of the Environment trait using
//! real system time and cryptographic RNG.
//!
//! # Capabilities
//!
//! - Real system time (`std::time::Instant`) that advances naturally
//! - OS cryptographic RNG (getrandom). Truly random, not reproducible
//! - Tokio async sleep for actual wall-clock delays
//!
//! This means production behavior is non-deterministic, but provides real-world
//! timing and security-grade randomness.

use std::time::Duration;

use gt06_core::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// Uses `std::time::Instant::now()` for time, `tokio::time::sleep()` for async
/// sleeping, and getrandom for cryptographic randomness.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness
/// (e.g., /dev/urandom on Linux, `BCryptGenRandom` on Windows). Suitable for
/// generating session IDs, nonces, ephemeral keys, and other security-critical
/// values.
///
/// # Panics
///
/// Panics if the OS RNG fails. This is intentional - a server without
/// functioning cryptographic randomness cannot operate securely. RNG failure
/// is extremely rare (indicates OS-level issues) and continuing would
/// compromise session IDs, nonces, and all cryptographic operations.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Current wall-clock time as Unix seconds.
    ///
    /// Distinct from [`Environment::now`]'s monotonic `Instant`: session
    /// records (`created_at_secs`/`last_activity_secs`) need a timestamp
    /// that survives across process restarts and is comparable to a TTL
    /// sweeper's `now_secs` argument, neither of which a monotonic instant
    /// provides.
    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_secs()
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - server cannot operate securely");
    }
}

//! Login sessions and secret hashing for galaxy access.

use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

/// An authenticated login session held by a galaxy handle.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque session token, unique per login.
    pub token: String,

    /// User the session was opened for. Empty for open-security logins.
    pub user: String,

    /// When the session was opened.
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Open a new session for the given galaxy and user.
    pub fn begin(galaxy: &str, user: &str) -> Self {
        let started_at = Utc::now();
        Session {
            token: generate_token(galaxy, user, started_at),
            user: user.to_string(),
            started_at,
        }
    }
}

/// Generate a unique session token from context + entropy.
/// Format: "gs-" + 16 hex chars of SHA256(galaxy + user + timestamp + random)
pub fn generate_token(galaxy: &str, user: &str, started_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(galaxy.as_bytes());
    hasher.update(user.as_bytes());
    hasher.update(started_at.timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
    // Add 8 bytes of randomness so two logins in the same nanosecond differ
    hasher.update(rand::rng().random::<[u8; 8]>());
    let hash = hasher.finalize();
    format!(
        "gs-{:016x}",
        u64::from_be_bytes([
            hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7]
        ])
    )
}

/// Hash a galaxy password for storage in galaxy metadata.
/// Hex SHA-256 over the raw password; compared on every login.
pub fn hash_secret(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

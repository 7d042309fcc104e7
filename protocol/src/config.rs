//! # Protocol Configuration & Constants
//!
//! Waypoint's constants and the runtime [`BridgeConfig`].
//!
//! Some of these values are tunables. Others are address-determining: change
//! them after launch and every existing user silently lands on a different
//! ledger address. Those are marked loudly below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Bridge protocol version, reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version byte embedded in every sponsored transaction. Bumped only when the
/// canonical byte layout changes.
pub const TRANSACTION_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Address-Determining Constants (DO NOT CHANGE AFTER LAUNCH)
// ---------------------------------------------------------------------------

/// Deployment-specific prefix mixed into every salt derivation.
///
/// **Compatibility constraint.** The salt feeds address derivation. Changing
/// this string re-derives a different address for every existing user, and
/// their funds stay behind at the old one.
pub const DEPLOYMENT_SALT_PREFIX: &str = "waypoint-zklogin-v1:";

/// Signature-scheme flag for token-derived (zkLogin-style) addresses. Hashed
/// in front of the issuer when computing the address.
pub const ZKLOGIN_ADDRESS_FLAG: u8 = 0x05;

// ---------------------------------------------------------------------------
// Domain Separation
// ---------------------------------------------------------------------------

/// BLAKE3 `derive_key` context for the OAuth nonce hash.
pub const NONCE_CONTEXT: &str = "waypoint 2026-01-01 oauth nonce v1";

/// BLAKE3 `derive_key` context for the address seed.
pub const ADDRESS_SEED_CONTEXT: &str = "waypoint 2026-01-01 address seed v1";

/// Number of hash bytes kept in the nonce. 20 bytes base64url-encode to 27
/// characters, which every mainstream identity provider accepts.
pub const NONCE_HASH_BYTES: usize = 20;

/// Bytes of fresh randomness mixed into each nonce.
pub const NONCE_RANDOMNESS_BYTES: usize = 16;

/// Intent prefix prepended to transaction bytes before signing. Both the
/// sponsor and the user sign `BLAKE3(INTENT_PREFIX || tx_bytes)`, so a
/// signature can never be replayed as a signature over some other message type.
pub const INTENT_PREFIX: &[u8] = &[0x00, 0x00, 0x00];

/// Signature scheme flag for plain Ed25519 wire signatures.
pub const ED25519_SCHEME_FLAG: u8 = 0x00;

/// Signature scheme flag for user signatures that carry a session proof.
pub const ZKLOGIN_SCHEME_FLAG: u8 = ZKLOGIN_ADDRESS_FLAG;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 public key length.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Serialized wire signature: flag + signature + public key.
pub const WIRE_SIGNATURE_LENGTH: usize = 1 + SIGNATURE_LENGTH + VERIFYING_KEY_LENGTH;

/// Ledger addresses are 32 bytes, rendered as `0x` + 64 hex chars.
pub const ADDRESS_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Ledger Epochs & Gas
// ---------------------------------------------------------------------------

/// How many epochs past the current one an ephemeral key stays valid.
pub const DEFAULT_EPOCH_WINDOW: u64 = 2;

/// Gas budget the sponsor attaches to a transfer, in the native base unit.
pub const DEFAULT_GAS_BUDGET: u64 = 10_000_000;

/// Reference gas price used by the devnet sponsor.
pub const DEFAULT_GAS_PRICE: u64 = 1_000;

/// Gas actually charged by the devnet ledger for a simple transfer.
pub const DEVNET_TRANSFER_GAS_COST: u64 = 2_000_000;

/// Coin type identifier of the ledger's native asset.
pub const NATIVE_COIN_TYPE: &str = "0x2::sui::SUI";

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Fixed key under which the device's single identity record is stored.
pub const IDENTITY_STORAGE_KEY: &str = "waypoint.identity";

// ---------------------------------------------------------------------------
// Networking
// ---------------------------------------------------------------------------

/// Default timeout for calls to the backend and the ledger RPC.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default port for the backend HTTP API.
pub const DEFAULT_API_PORT: u16 = 9741;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9742;

/// User agent for outbound HTTP calls.
pub const USER_AGENT: &str = "waypoint-protocol/0.1";

// ---------------------------------------------------------------------------
// Check-in
// ---------------------------------------------------------------------------

/// Maximum distance in meters between the device and a place for a check-in
/// to be accepted.
pub const MAX_CHECKIN_DISTANCE_M: f64 = 20.0;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Runtime configuration for a bridge client or backend.
///
/// Constants above are baked into the protocol; this struct carries the
/// deployment-specific bits that differ between environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// OAuth client identifier. Tokens must carry this as their audience.
    pub client_id: String,
    /// Base URL of the trusted backend (`/user`, `/sponsor`).
    pub backend_url: String,
    /// JSON-RPC endpoint of the ledger.
    pub ledger_rpc_url: String,
    /// Epochs an ephemeral key stays valid past the current epoch.
    pub epoch_window: u64,
    /// Timeout for outbound HTTP calls.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            backend_url: format!("http://127.0.0.1:{}", DEFAULT_API_PORT),
            ledger_rpc_url: format!("http://127.0.0.1:{}/rpc", DEFAULT_API_PORT),
            epoch_window: DEFAULT_EPOCH_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    /// Config for a given OAuth client id, everything else default.
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Max epoch for an ephemeral key minted while the ledger is at `current_epoch`.
    pub fn max_epoch(&self, current_epoch: u64) -> u64 {
        current_epoch.saturating_add(self.epoch_window)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

//! # Session Store
//!
//! The two storage tiers of a device, behind one explicit object:
//!
//! - **transient**: the current login attempt's [`EphemeralRecord`].
//!   Process memory only, guarded by a `parking_lot::RwLock`, zeroized
//!   when replaced or cleared.
//! - **durable**: the [`BridgedIdentity`], behind the [`IdentityStore`]
//!   trait. sled in production, a map in tests.
//!
//! Keeping the tiers in one type makes it impossible to put key material
//! in the durable tier by accident: there is no method that does it.

use parking_lot::{Mutex, RwLock};

use super::identity::BridgedIdentity;
use crate::identity::EphemeralRecord;
use crate::storage::{DbResult, WaypointDb};

/// Durable storage for the device's single identity record.
pub trait IdentityStore: Send + Sync {
    fn save(&self, identity: &BridgedIdentity) -> DbResult<()>;
    fn load(&self) -> DbResult<Option<BridgedIdentity>>;
    fn clear(&self) -> DbResult<()>;
}

impl IdentityStore for WaypointDb {
    fn save(&self, identity: &BridgedIdentity) -> DbResult<()> {
        self.save_identity(identity)
    }

    fn load(&self) -> DbResult<Option<BridgedIdentity>> {
        self.load_identity()
    }

    fn clear(&self) -> DbResult<()> {
        self.clear_identity()
    }
}

/// Process-local identity store. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<BridgedIdentity>>,
}

impl IdentityStore for MemoryIdentityStore {
    fn save(&self, identity: &BridgedIdentity) -> DbResult<()> {
        *self.slot.lock() = Some(identity.clone());
        Ok(())
    }

    fn load(&self) -> DbResult<Option<BridgedIdentity>> {
        Ok(self.slot.lock().clone())
    }

    fn clear(&self) -> DbResult<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}

/// Transient key slot plus durable identity record.
pub struct SessionStore {
    transient: RwLock<Option<EphemeralRecord>>,
    durable: Box<dyn IdentityStore>,
}

impl SessionStore {
    pub fn new(durable: impl IdentityStore + 'static) -> Self {
        Self {
            transient: RwLock::new(None),
            durable: Box::new(durable),
        }
    }

    /// Both tiers in memory.
    pub fn in_memory() -> Self {
        Self::new(MemoryIdentityStore::default())
    }

    // -- Transient tier -----------------------------------------------------

    /// Replace the pending login attempt. The previous record, if any, is
    /// dropped and therefore zeroized.
    pub fn put_ephemeral(&self, record: EphemeralRecord) {
        *self.transient.write() = Some(record);
    }

    /// A copy of the pending login attempt's record.
    pub fn ephemeral(&self) -> Option<EphemeralRecord> {
        self.transient.read().clone()
    }

    pub fn has_ephemeral(&self) -> bool {
        self.transient.read().is_some()
    }

    pub fn clear_ephemeral(&self) {
        *self.transient.write() = None;
    }

    // -- Durable tier -------------------------------------------------------

    pub fn save_identity(&self, identity: &BridgedIdentity) -> DbResult<()> {
        self.durable.save(identity)
    }

    pub fn load_identity(&self) -> DbResult<Option<BridgedIdentity>> {
        self.durable.load()
    }

    pub fn clear_identity(&self) -> DbResult<()> {
        self.durable.clear()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("has_ephemeral", &self.has_ephemeral())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{compute_address, derive_salt, mint_ephemeral};

    fn identity() -> BridgedIdentity {
        BridgedIdentity {
            subject: "abc123".into(),
            email: None,
            name: None,
            avatar: None,
            address: compute_address("iss", "abc123", "aud", derive_salt("abc123")),
            token: None,
        }
    }

    #[test]
    fn transient_slot_holds_latest_record() {
        let store = SessionStore::in_memory();
        assert!(store.ephemeral().is_none());

        let first = mint_ephemeral(1);
        let second = mint_ephemeral(1);
        store.put_ephemeral(first);
        store.put_ephemeral(second.clone());
        assert_eq!(store.ephemeral().unwrap().nonce(), second.nonce());

        store.clear_ephemeral();
        assert!(!store.has_ephemeral());
    }

    #[test]
    fn tiers_are_independent() {
        let store = SessionStore::in_memory();
        store.put_ephemeral(mint_ephemeral(1));
        store.save_identity(&identity()).unwrap();

        store.clear_ephemeral();
        assert_eq!(store.load_identity().unwrap(), Some(identity()));

        store.put_ephemeral(mint_ephemeral(1));
        store.clear_identity().unwrap();
        assert!(store.has_ephemeral());
        assert!(store.load_identity().unwrap().is_none());
    }

    #[test]
    fn sled_backed_store_persists_identity() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::new(WaypointDb::open(dir.path()).unwrap());
            store.put_ephemeral(mint_ephemeral(1));
            store.save_identity(&identity()).unwrap();
        }
        let store = SessionStore::new(WaypointDb::open(dir.path()).unwrap());
        assert_eq!(store.load_identity().unwrap(), Some(identity()));
        assert!(!store.has_ephemeral(), "key material must not survive a restart");
    }
}

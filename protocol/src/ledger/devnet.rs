//! # Devnet Ledger
//!
//! An in-process ledger that enforces the sponsored-transaction rules and
//! applies transfers against in-memory balances. It is what the backend's
//! `/rpc` endpoint serves on devnet, and what the end-to-end tests submit to.
//!
//! ## Execution rules
//!
//! A submission is accepted only if, in order:
//!
//! 1. it carries exactly two wire signatures;
//! 2. the bytes decode as a canonical transaction;
//! 3. one signature is from the declared gas owner, the other from a
//!    distinct key, and both verify over the intent message of the bytes;
//! 4. the user signature carries a [`SessionProof`] that binds its key and
//!    derives exactly the sender address;
//! 5. the current epoch has passed neither `expiration_epoch` nor the
//!    proof's `max_epoch`;
//! 6. the digest has not been executed before;
//! 7. the gas budget covers the transfer cost and the gas owner holds it;
//! 8. the sender holds the amount (or owns the object).
//!
//! All checks and all balance changes happen under one write lock, so a
//! transaction is applied entirely or not at all.
//!
//! Rule 4 stands in for zero-knowledge verification: the proof's public
//! inputs travel in the clear and the ledger recomputes both the nonce
//! commitment and the address. A sponsor signature plus any other key is
//! not enough to move a user's assets.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use super::client::{LedgerClient, LedgerError};
use crate::config::{DEVNET_TRANSFER_GAS_COST, NATIVE_COIN_TYPE};
use crate::identity::{LedgerAddress, SessionProof};
use crate::transaction::{
    CoSignedTransaction, SponsorSignature, SponsoredTransactionData, TransactionDigest,
    TransferKind, UserSignature,
};

#[derive(Debug, Default)]
struct DevnetState {
    /// (owner, coin type) -> balance in base units.
    balances: HashMap<(LedgerAddress, String), u64>,
    /// object id -> owner.
    objects: HashMap<String, LedgerAddress>,
    executed: HashSet<TransactionDigest>,
}

/// In-memory ledger for devnet and tests.
#[derive(Debug, Default)]
pub struct DevnetLedger {
    state: RwLock<DevnetState>,
    epoch: AtomicU64,
}

impl DevnetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Epochs -------------------------------------------------------------

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn set_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::Release);
    }

    /// Move to the next epoch and return it.
    pub fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    // -- Faucet ---------------------------------------------------------------

    /// Add `amount` of `coin_type` to `owner`. Saturates.
    pub fn credit(&self, owner: LedgerAddress, coin_type: &str, amount: u64) {
        let mut state = self.state.write();
        let balance = state
            .balances
            .entry((owner, coin_type.to_string()))
            .or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Create an object owned by `owner`. Fails if the id is taken.
    pub fn mint_object(&self, owner: LedgerAddress, object_id: &str) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        if state.objects.contains_key(object_id) {
            return Err(LedgerError::Rejected(format!("object {object_id} already exists")));
        }
        state.objects.insert(object_id.to_string(), owner);
        Ok(())
    }

    // -- Queries --------------------------------------------------------------

    pub fn balance(&self, owner: &LedgerAddress, coin_type: &str) -> u64 {
        self.state
            .read()
            .balances
            .get(&(*owner, coin_type.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn native_balance(&self, owner: &LedgerAddress) -> u64 {
        self.balance(owner, NATIVE_COIN_TYPE)
    }

    pub fn owner_of(&self, object_id: &str) -> Option<LedgerAddress> {
        self.state.read().objects.get(object_id).copied()
    }

    pub fn is_executed(&self, digest: &TransactionDigest) -> bool {
        self.state.read().executed.contains(digest)
    }

    // -- Execution ------------------------------------------------------------

    /// Execute raw bytes with base64 wire signatures, as received over RPC.
    pub fn execute(
        &self,
        tx_bytes: &[u8],
        signatures: &[String],
    ) -> Result<TransactionDigest, LedgerError> {
        let tx = Self::assemble(tx_bytes, signatures)?;
        self.execute_cosigned(&tx)
    }

    /// Execute an already assembled transaction.
    pub fn execute_cosigned(&self, tx: &CoSignedTransaction) -> Result<TransactionDigest, LedgerError> {
        let data = tx.verify().map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let proof = authorize_sender(tx.user_signature(), &data)?;
        let digest = tx.digest();

        let mut state = self.state.write();
        let epoch = self.epoch();
        if epoch > data.expiration_epoch {
            return Err(LedgerError::Rejected(format!(
                "transaction expired at epoch {}, current epoch {epoch}",
                data.expiration_epoch
            )));
        }
        if epoch > proof.max_epoch {
            return Err(LedgerError::Rejected(format!(
                "ephemeral key expired at epoch {}, current epoch {epoch}",
                proof.max_epoch
            )));
        }
        if state.executed.contains(&digest) {
            return Err(LedgerError::Rejected(format!("transaction {digest} already executed")));
        }

        apply_transfer(&mut state, &data)?;
        state.executed.insert(digest);
        drop(state);

        tracing::info!(%digest, sender = %data.sender, recipient = %data.recipient, "devnet transaction executed");
        Ok(digest)
    }

    /// Sort the two wire signatures into sponsor and user by the gas owner
    /// key declared in the bytes.
    fn assemble(tx_bytes: &[u8], signatures: &[String]) -> Result<CoSignedTransaction, LedgerError> {
        if signatures.len() != 2 {
            return Err(LedgerError::Rejected(format!(
                "expected exactly 2 signatures, got {}",
                signatures.len()
            )));
        }
        let data = SponsoredTransactionData::from_bytes(tx_bytes)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let mut decoded = signatures
            .iter()
            .map(|s| UserSignature::decode(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let sponsor_idx = decoded
            .iter()
            .position(|sig| sig.public_key() == &data.gas.owner_key && sig.proof().is_none())
            .ok_or_else(|| LedgerError::Rejected("missing gas owner signature".into()))?;
        let sponsor = decoded.swap_remove(sponsor_idx);
        let user = decoded.swap_remove(0);

        Ok(CoSignedTransaction::new(
            bytes::Bytes::copy_from_slice(tx_bytes),
            SponsorSignature::from_wire(sponsor.as_wire().clone()),
            user,
        ))
    }
}

/// The user key may act for the sender only under a proof deriving that
/// exact address.
fn authorize_sender<'a>(
    user: &'a UserSignature,
    data: &SponsoredTransactionData,
) -> Result<&'a SessionProof, LedgerError> {
    let proof = user
        .proof()
        .ok_or_else(|| LedgerError::Rejected("user signature carries no session proof".into()))?;
    match proof.authorize(user.public_key()) {
        Ok(address) if address == data.sender => Ok(proof),
        Ok(address) => Err(LedgerError::Rejected(format!(
            "session proof is for {address}, not sender {}",
            data.sender
        ))),
        Err(e) => Err(LedgerError::Rejected(format!(
            "user key is not authorized for sender {}: {e}",
            data.sender
        ))),
    }
}

/// Check and apply gas and transfer. Mutates only if every check passes.
fn apply_transfer(state: &mut DevnetState, data: &SponsoredTransactionData) -> Result<(), LedgerError> {
    if data.gas.budget < DEVNET_TRANSFER_GAS_COST {
        return Err(LedgerError::Rejected(format!(
            "gas budget {} below transfer cost {DEVNET_TRANSFER_GAS_COST}",
            data.gas.budget
        )));
    }

    let gas_key = (data.gas.owner, NATIVE_COIN_TYPE.to_string());
    let gas_balance = state.balances.get(&gas_key).copied().unwrap_or(0);
    if gas_balance < DEVNET_TRANSFER_GAS_COST {
        return Err(LedgerError::Rejected(format!(
            "gas owner {} cannot cover gas: balance {gas_balance}, cost {DEVNET_TRANSFER_GAS_COST}",
            data.gas.owner
        )));
    }

    match &data.transfer {
        TransferKind::Native { amount } => {
            move_coin(state, data, NATIVE_COIN_TYPE, *amount)?;
        }
        TransferKind::Coin { coin_type, amount } => {
            move_coin(state, data, coin_type, *amount)?;
        }
        TransferKind::Object { object_id } => {
            match state.objects.get(object_id) {
                Some(owner) if *owner == data.sender => {}
                Some(_) => {
                    return Err(LedgerError::Rejected(format!(
                        "object {object_id} is not owned by {}",
                        data.sender
                    )))
                }
                None => return Err(LedgerError::Rejected(format!("object {object_id} not found"))),
            }
            state.objects.insert(object_id.clone(), data.recipient);
        }
    }

    // Gas is charged last. The transfer can only have grown this balance.
    if let Some(balance) = state.balances.get_mut(&gas_key) {
        *balance -= DEVNET_TRANSFER_GAS_COST;
    }
    Ok(())
}

fn move_coin(
    state: &mut DevnetState,
    data: &SponsoredTransactionData,
    coin_type: &str,
    amount: u64,
) -> Result<(), LedgerError> {
    if data.sender == data.gas.owner {
        return Err(LedgerError::Rejected("gas owner cannot be the sender".into()));
    }
    let from = (data.sender, coin_type.to_string());
    let available = state.balances.get(&from).copied().unwrap_or(0);
    if available < amount {
        return Err(LedgerError::Rejected(format!(
            "insufficient {coin_type} balance: have {available}, need {amount}"
        )));
    }
    state.balances.insert(from, available - amount);
    let to = state
        .balances
        .entry((data.recipient, coin_type.to_string()))
        .or_default();
    *to = to.saturating_add(amount);
    Ok(())
}

#[async_trait]
impl LedgerClient for DevnetLedger {
    async fn submit(&self, tx: &CoSignedTransaction) -> Result<TransactionDigest, LedgerError> {
        self.execute(tx.bytes(), &tx.wire_signatures())
    }

    async fn current_epoch(&self) -> Result<u64, LedgerError> {
        Ok(self.epoch())
    }
}

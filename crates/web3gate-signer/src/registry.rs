//! Multi-key signer registry.

use alloy_primitives::{Address, B256};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use web3gate_types::{SignedTransaction, TransferSummary, TypedTransaction};

use crate::error::SignerError;
use crate::signer::Signer;

/// Registry mapping KMS key ids to signers.
///
/// One entry is the default; calls that do not name a key delegate to
/// it and it cannot be removed. Mutations take the write lock, lookups
/// take the read lock, and signing happens outside any lock so slow
/// KMS round-trips never serialize each other.
pub struct KeyRegistry {
    signers: RwLock<HashMap<String, Arc<Signer>>>,
    default_key_id: String,
    default_signer: Arc<Signer>,
}

impl KeyRegistry {
    pub fn new(default_key_id: impl Into<String>, default_signer: Signer) -> Result<Self, SignerError> {
        let default_key_id = default_key_id.into();
        if default_key_id.is_empty() {
            return Err(SignerError::EmptyKeyId);
        }
        let default_signer = Arc::new(default_signer);
        let mut signers = HashMap::new();
        signers.insert(default_key_id.clone(), default_signer.clone());
        Ok(KeyRegistry {
            signers: RwLock::new(signers),
            default_key_id,
            default_signer,
        })
    }

    /// Registers a signer under a new key id.
    pub fn add(&self, key_id: impl Into<String>, signer: Signer) -> Result<(), SignerError> {
        let key_id = key_id.into();
        if key_id.is_empty() {
            return Err(SignerError::EmptyKeyId);
        }
        let mut signers = self.signers.write();
        if signers.contains_key(&key_id) {
            return Err(SignerError::DuplicateKey(key_id));
        }
        signers.insert(key_id, Arc::new(signer));
        Ok(())
    }

    /// Removes a key. The default key is protected.
    pub fn remove(&self, key_id: &str) -> Result<(), SignerError> {
        if key_id == self.default_key_id {
            return Err(SignerError::DefaultKeyRemoval(key_id.to_string()));
        }
        let mut signers = self.signers.write();
        signers
            .remove(key_id)
            .map(|_| ())
            .ok_or_else(|| SignerError::UnknownKey(key_id.to_string()))
    }

    pub fn get(&self, key_id: &str) -> Option<Arc<Signer>> {
        self.signers.read().get(key_id).cloned()
    }

    pub fn default_key_id(&self) -> &str {
        &self.default_key_id
    }

    pub fn default_signer(&self) -> Arc<Signer> {
        self.default_signer.clone()
    }

    /// Addresses of all registered signers; the default comes first.
    pub fn addresses(&self) -> Vec<Address> {
        let signers = self.signers.read();
        let mut addresses = Vec::with_capacity(signers.len());
        addresses.push(self.default_signer.address());
        for (key_id, signer) in signers.iter() {
            if key_id != &self.default_key_id {
                addresses.push(signer.address());
            }
        }
        addresses
    }

    /// Address of the default signer.
    pub fn address(&self) -> Address {
        self.default_signer.address()
    }

    /// Signs a raw digest with the default key.
    pub async fn sign(&self, digest: B256) -> Result<[u8; 65], SignerError> {
        self.default_signer.sign_digest(digest).await
    }

    /// Signs a transaction with the default key.
    pub async fn sign_transaction(
        &self,
        tx: &TypedTransaction,
    ) -> Result<SignedTransaction, SignerError> {
        self.default_signer.sign_transaction(tx).await
    }

    /// Signs a transaction with a specific key.
    pub async fn sign_transaction_with_key_id(
        &self,
        tx: &TypedTransaction,
        key_id: &str,
    ) -> Result<SignedTransaction, SignerError> {
        let signer = self
            .get(key_id)
            .ok_or_else(|| SignerError::UnknownKey(key_id.to_string()))?;
        signer.sign_transaction(tx).await
    }

    /// Signs a transaction with a specific key, attaching an
    /// approval-UI summary where the backend supports one.
    pub async fn sign_transaction_with_summary(
        &self,
        tx: &TypedTransaction,
        key_id: &str,
        summary: Option<TransferSummary>,
    ) -> Result<SignedTransaction, SignerError> {
        let signer = self
            .get(key_id)
            .ok_or_else(|| SignerError::UnknownKey(key_id.to_string()))?;
        signer.sign_transaction_with_summary(tx, summary).await
    }
}

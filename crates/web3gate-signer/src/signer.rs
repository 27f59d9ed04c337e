//! Signer variants and `(r, s, v)` reassembly.

use alloy_primitives::{Address, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use std::sync::Arc;
use web3gate_kms::{DataEncoding, KmsClient};
use web3gate_types::transaction::TxSignature;
use web3gate_types::{SignedTransaction, TransferSummary, TypedTransaction};

use crate::error::SignerError;

/// A signing capability bound to one key and one chain id.
///
/// The variants differ only in where the 32-byte digest gets signed:
/// remotely by the MPC-KMS or in-process by a local wallet. The local
/// variant has no approval workflow, so display summaries are accepted
/// and dropped.
#[derive(Debug, Clone)]
pub enum Signer {
    Kms(KmsSigner),
    Local(LocalSigner),
}

/// Remote signer backed by one KMS key.
#[derive(Debug, Clone)]
pub struct KmsSigner {
    client: Arc<KmsClient>,
    key_id: String,
    address: Address,
    chain_id: U256,
}

impl KmsSigner {
    /// `address` is the Ethereum address of the KMS-held key, taken
    /// from configuration: the KMS API never exposes the public key.
    pub fn new(client: Arc<KmsClient>, key_id: impl Into<String>, address: Address, chain_id: U256) -> Self {
        KmsSigner {
            client,
            key_id: key_id.into(),
            address,
            chain_id,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// In-process wallet signer used by tests and development configs.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    wallet: PrivateKeySigner,
    chain_id: U256,
}

impl LocalSigner {
    pub fn new(wallet: PrivateKeySigner, chain_id: U256) -> Self {
        LocalSigner { wallet, chain_id }
    }

    pub fn random(chain_id: U256) -> Self {
        LocalSigner {
            wallet: PrivateKeySigner::random(),
            chain_id,
        }
    }
}

impl Signer {
    pub fn address(&self) -> Address {
        match self {
            Signer::Kms(signer) => signer.address,
            Signer::Local(signer) => signer.wallet.address(),
        }
    }

    pub fn chain_id(&self) -> U256 {
        match self {
            Signer::Kms(signer) => signer.chain_id,
            Signer::Local(signer) => signer.chain_id,
        }
    }

    /// Signs a raw 32-byte digest, returning `r‖s‖v` with `v ∈ {0, 1}`.
    pub async fn sign_digest(&self, digest: B256) -> Result<[u8; 65], SignerError> {
        match self {
            Signer::Kms(signer) => Ok(signer.client.sign(&signer.key_id, &digest.0).await?),
            Signer::Local(signer) => local_sign(signer, digest),
        }
    }

    /// Signs a transaction with no approval-UI summary.
    pub async fn sign_transaction(
        &self,
        tx: &TypedTransaction,
    ) -> Result<SignedTransaction, SignerError> {
        self.sign_transaction_with_summary(tx, None).await
    }

    /// Signs a transaction, attaching `summary` to the KMS request when
    /// the backend supports it.
    ///
    /// The caller's transaction is never mutated: signing works on a
    /// copy, stamps the signer address as `from` and pins the chain id
    /// before computing the digest. The summary only decorates the
    /// approval UI and has no influence on the signed bytes.
    pub async fn sign_transaction_with_summary(
        &self,
        tx: &TypedTransaction,
        summary: Option<TransferSummary>,
    ) -> Result<SignedTransaction, SignerError> {
        let mut tx = tx.clone();
        tx.set_from(self.address());
        tx.set_chain_id(self.chain_id());
        let digest = tx.signing_hash();

        let raw = match self {
            Signer::Kms(signer) => {
                signer
                    .client
                    .sign_with_options(&signer.key_id, &digest.0, DataEncoding::Hex, summary, None)
                    .await?
            }
            Signer::Local(signer) => local_sign(signer, digest)?,
        };

        let signature = assemble_signature(&raw, &tx)?;
        tracing::debug!(
            from = %tx.from(),
            tx_type = tx.tx_type(),
            nonce = tx.nonce(),
            "assembled transaction signature"
        );
        Ok(SignedTransaction { tx, signature })
    }
}

fn local_sign(signer: &LocalSigner, digest: B256) -> Result<[u8; 65], SignerError> {
    let signature = signer.wallet.sign_hash_sync(&digest)?;
    let mut raw = [0u8; 65];
    raw[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
    raw[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
    raw[64] = signature.v() as u8;
    Ok(raw)
}

/// Folds raw `r‖s‖v` bytes onto a transaction.
///
/// The recovery byte must be 0 or 1. Legacy transactions get the
/// EIP-155 fold `v = raw_v + 35 + 2·chain_id` (or the pre-155
/// `raw_v + 27` when the chain id is zero); typed transactions keep the
/// raw parity. The arithmetic stays in `U256` so oversized chain ids
/// cannot wrap.
fn assemble_signature(raw: &[u8; 65], tx: &TypedTransaction) -> Result<TxSignature, SignerError> {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&raw[..32]);
    s.copy_from_slice(&raw[32..64]);
    let raw_v = raw[64];
    if raw_v > 1 {
        return Err(SignerError::RecoveryId(raw_v));
    }

    let v = match tx {
        TypedTransaction::Legacy(legacy) if legacy.chain_id.is_zero() => {
            U256::from(raw_v as u64 + 27)
        }
        TypedTransaction::Legacy(legacy) => {
            U256::from(raw_v as u64 + 35) + legacy.chain_id + legacy.chain_id
        }
        TypedTransaction::AccessList(_) | TypedTransaction::DynamicFee(_) => {
            U256::from(raw_v as u64)
        }
    };

    Ok(TxSignature {
        v,
        r: TxSignature::scalar_bytes(&r),
        s: TxSignature::scalar_bytes(&s),
    })
}

use web3gate_kms::KmsError;

/// Failures while producing a signature or mutating the key registry.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error(transparent)]
    Kms(#[from] KmsError),

    #[error("local signer error: {0}")]
    Local(#[from] alloy_signer::Error),

    #[error("signature recovery byte must be 0 or 1, got {0}")]
    RecoveryId(u8),

    #[error("key id must not be empty")]
    EmptyKeyId,

    #[error("key {0} is already registered")]
    DuplicateKey(String),

    #[error("key {0} is not registered")]
    UnknownKey(String),

    #[error("the default key {0} cannot be removed")]
    DefaultKeyRemoval(String),
}

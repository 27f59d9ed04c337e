//! Ethereum typed-transaction model and RLP encodings.
//!
//! Three transaction families are supported: Legacy (type 0x00),
//! EIP-2930 access-list transactions (0x01) and EIP-1559 dynamic-fee
//! transactions (0x02). For each family two encodings exist:
//!
//! - the *signing payload*, the byte string whose Keccak-256 digest is
//!   sent to the remote signer (never includes `(v, r, s)`), and
//! - the *raw transaction*, the network encoding with the signature
//!   appended, as returned by `eth_signTransaction`.
//!
//! Legacy signing payloads fold the chain id in per EIP-155 when it is
//! non-zero; typed payloads always carry it as a list member and are
//! prefixed with their one-byte type tag.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, Header, EMPTY_STRING_CODE};

pub const LEGACY_TX_TYPE: u8 = 0x00;
pub const ACCESS_LIST_TX_TYPE: u8 = 0x01;
pub const DYNAMIC_FEE_TX_TYPE: u8 = 0x02;

/// One access-list entry: an address and the storage slots it touches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessListEntry {
    pub address: Address,
    pub storage_keys: Vec<B256>,
}

impl AccessListEntry {
    fn keys_payload_length(&self) -> usize {
        self.storage_keys.iter().map(Encodable::length).sum()
    }

    fn payload_length(&self) -> usize {
        let keys_payload = self.keys_payload_length();
        self.address.length() + alloy_rlp::length_of_length(keys_payload) + keys_payload
    }
}

impl Encodable for AccessListEntry {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.address.encode(out);
        Header {
            list: true,
            payload_length: self.keys_payload_length(),
        }
        .encode(out);
        for key in &self.storage_keys {
            key.encode(out);
        }
    }

    fn length(&self) -> usize {
        let payload = self.payload_length();
        alloy_rlp::length_of_length(payload) + payload
    }
}

/// EIP-2930 access list: a list of `[address, [storage_key, ...]]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessList(pub Vec<AccessListEntry>);

impl AccessList {
    fn payload_length(&self) -> usize {
        self.0.iter().map(Encodable::length).sum()
    }
}

impl Encodable for AccessList {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        for entry in &self.0 {
            entry.encode(out);
        }
    }

    fn length(&self) -> usize {
        let payload = self.payload_length();
        alloy_rlp::length_of_length(payload) + payload
    }
}

fn encode_to_field(to: &Option<Address>, out: &mut dyn alloy_rlp::BufMut) {
    match to {
        Some(address) => address.encode(out),
        // Contract creation encodes as the empty byte string.
        None => out.put_u8(EMPTY_STRING_CODE),
    }
}

fn to_field_length(to: &Option<Address>) -> usize {
    to.as_ref().map_or(1, Encodable::length)
}

/// A legacy (pre-EIP-2718) transaction. `chain_id == 0` disables
/// EIP-155 replay protection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LegacyTx {
    pub from: Address,
    pub nonce: u64,
    pub gas_price: u64,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub chain_id: U256,
}

impl LegacyTx {
    fn fields_payload_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas.length()
            + to_field_length(&self.to)
            + self.value.length()
            + self.input.length()
    }

    fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas.encode(out);
        encode_to_field(&self.to, out);
        self.value.encode(out);
        self.input.encode(out);
    }

    fn signing_payload(&self) -> Vec<u8> {
        let mut payload = self.fields_payload_length();
        if !self.chain_id.is_zero() {
            // EIP-155: chain id plus two empty placeholders.
            payload += self.chain_id.length() + 2;
        }
        let mut buf = Vec::with_capacity(alloy_rlp::length_of_length(payload) + payload);
        Header {
            list: true,
            payload_length: payload,
        }
        .encode(&mut buf);
        self.encode_fields(&mut buf);
        if !self.chain_id.is_zero() {
            self.chain_id.encode(&mut buf);
            buf.push(EMPTY_STRING_CODE);
            buf.push(EMPTY_STRING_CODE);
        }
        buf
    }

    fn encode_signed(&self, signature: &TxSignature) -> Vec<u8> {
        let payload = self.fields_payload_length() + signature.payload_length();
        let mut buf = Vec::with_capacity(alloy_rlp::length_of_length(payload) + payload);
        Header {
            list: true,
            payload_length: payload,
        }
        .encode(&mut buf);
        self.encode_fields(&mut buf);
        signature.encode_fields(&mut buf);
        buf
    }
}

/// An EIP-2930 transaction (type 0x01).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessListTx {
    pub from: Address,
    pub chain_id: U256,
    pub nonce: u64,
    pub gas_price: u64,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub access_list: AccessList,
}

impl AccessListTx {
    fn fields_payload_length(&self) -> usize {
        self.chain_id.length()
            + self.nonce.length()
            + self.gas_price.length()
            + self.gas.length()
            + to_field_length(&self.to)
            + self.value.length()
            + self.input.length()
            + self.access_list.length()
    }

    fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas.encode(out);
        encode_to_field(&self.to, out);
        self.value.encode(out);
        self.input.encode(out);
        self.access_list.encode(out);
    }
}

/// An EIP-1559 transaction (type 0x02).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DynamicFeeTx {
    pub from: Address,
    pub chain_id: U256,
    pub nonce: u64,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub access_list: AccessList,
}

impl DynamicFeeTx {
    fn fields_payload_length(&self) -> usize {
        self.chain_id.length()
            + self.nonce.length()
            + self.max_priority_fee_per_gas.length()
            + self.max_fee_per_gas.length()
            + self.gas.length()
            + to_field_length(&self.to)
            + self.value.length()
            + self.input.length()
            + self.access_list.length()
    }

    fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas.encode(out);
        encode_to_field(&self.to, out);
        self.value.encode(out);
        self.input.encode(out);
        self.access_list.encode(out);
    }
}

/// Builds the byte string for a type-prefixed payload: the one-byte tag
/// followed by an RLP list over `payload_length` bytes of fields.
fn typed_payload(
    tx_type: u8,
    payload_length: usize,
    encode_fields: impl FnOnce(&mut Vec<u8>),
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + alloy_rlp::length_of_length(payload_length) + payload_length);
    buf.push(tx_type);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut buf);
    encode_fields(&mut buf);
    buf
}

/// The three Ethereum transaction families handled by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedTransaction {
    Legacy(LegacyTx),
    AccessList(AccessListTx),
    DynamicFee(DynamicFeeTx),
}

impl TypedTransaction {
    /// The EIP-2718 type tag; `0x00` for legacy transactions.
    pub fn tx_type(&self) -> u8 {
        match self {
            TypedTransaction::Legacy(_) => LEGACY_TX_TYPE,
            TypedTransaction::AccessList(_) => ACCESS_LIST_TX_TYPE,
            TypedTransaction::DynamicFee(_) => DYNAMIC_FEE_TX_TYPE,
        }
    }

    pub fn from(&self) -> Address {
        match self {
            TypedTransaction::Legacy(tx) => tx.from,
            TypedTransaction::AccessList(tx) => tx.from,
            TypedTransaction::DynamicFee(tx) => tx.from,
        }
    }

    pub fn set_from(&mut self, from: Address) {
        match self {
            TypedTransaction::Legacy(tx) => tx.from = from,
            TypedTransaction::AccessList(tx) => tx.from = from,
            TypedTransaction::DynamicFee(tx) => tx.from = from,
        }
    }

    /// `None` means contract creation.
    pub fn to(&self) -> Option<Address> {
        match self {
            TypedTransaction::Legacy(tx) => tx.to,
            TypedTransaction::AccessList(tx) => tx.to,
            TypedTransaction::DynamicFee(tx) => tx.to,
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            TypedTransaction::Legacy(tx) => tx.value,
            TypedTransaction::AccessList(tx) => tx.value,
            TypedTransaction::DynamicFee(tx) => tx.value,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            TypedTransaction::Legacy(tx) => tx.nonce,
            TypedTransaction::AccessList(tx) => tx.nonce,
            TypedTransaction::DynamicFee(tx) => tx.nonce,
        }
    }

    pub fn gas(&self) -> u64 {
        match self {
            TypedTransaction::Legacy(tx) => tx.gas,
            TypedTransaction::AccessList(tx) => tx.gas,
            TypedTransaction::DynamicFee(tx) => tx.gas,
        }
    }

    pub fn input(&self) -> &Bytes {
        match self {
            TypedTransaction::Legacy(tx) => &tx.input,
            TypedTransaction::AccessList(tx) => &tx.input,
            TypedTransaction::DynamicFee(tx) => &tx.input,
        }
    }

    pub fn chain_id(&self) -> U256 {
        match self {
            TypedTransaction::Legacy(tx) => tx.chain_id,
            TypedTransaction::AccessList(tx) => tx.chain_id,
            TypedTransaction::DynamicFee(tx) => tx.chain_id,
        }
    }

    pub fn set_chain_id(&mut self, chain_id: U256) {
        match self {
            TypedTransaction::Legacy(tx) => tx.chain_id = chain_id,
            TypedTransaction::AccessList(tx) => tx.chain_id = chain_id,
            TypedTransaction::DynamicFee(tx) => tx.chain_id = chain_id,
        }
    }

    /// The byte string that is hashed for signing. Typed transactions
    /// are prefixed with their tag; `(v, r, s)` never appears here.
    pub fn signing_payload(&self) -> Vec<u8> {
        match self {
            TypedTransaction::Legacy(tx) => tx.signing_payload(),
            TypedTransaction::AccessList(tx) => typed_payload(
                ACCESS_LIST_TX_TYPE,
                tx.fields_payload_length(),
                |buf| tx.encode_fields(buf),
            ),
            TypedTransaction::DynamicFee(tx) => typed_payload(
                DYNAMIC_FEE_TX_TYPE,
                tx.fields_payload_length(),
                |buf| tx.encode_fields(buf),
            ),
        }
    }

    /// Keccak-256 digest of [`Self::signing_payload`]; this is what the
    /// remote signer receives.
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.signing_payload())
    }

    /// The raw network encoding with the signature appended.
    pub fn encode_signed(&self, signature: &TxSignature) -> Vec<u8> {
        match self {
            TypedTransaction::Legacy(tx) => tx.encode_signed(signature),
            TypedTransaction::AccessList(tx) => typed_payload(
                ACCESS_LIST_TX_TYPE,
                tx.fields_payload_length() + signature.payload_length(),
                |buf| {
                    tx.encode_fields(buf);
                    signature.encode_fields(buf);
                },
            ),
            TypedTransaction::DynamicFee(tx) => typed_payload(
                DYNAMIC_FEE_TX_TYPE,
                tx.fields_payload_length() + signature.payload_length(),
                |buf| {
                    tx.encode_fields(buf);
                    signature.encode_fields(buf);
                },
            ),
        }
    }
}

/// A finalized transaction signature.
///
/// `r` and `s` are held as minimal big-endian byte strings: leading
/// zero bytes are stripped and an all-zero scalar collapses to a single
/// `0x00` byte. `v` is the EIP-155-folded value for legacy
/// transactions and the raw recovery parity (0 or 1) for typed ones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxSignature {
    pub v: U256,
    pub r: Bytes,
    pub s: Bytes,
}

impl TxSignature {
    /// Reduces a 32-byte scalar to its minimal byte-string form.
    pub fn scalar_bytes(scalar: &[u8; 32]) -> Bytes {
        let first = scalar.iter().position(|b| *b != 0);
        match first {
            Some(at) => Bytes::copy_from_slice(&scalar[at..]),
            None => Bytes::copy_from_slice(&[0u8]),
        }
    }

    fn payload_length(&self) -> usize {
        self.v.length() + self.r.length() + self.s.length()
    }

    fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.v.encode(out);
        self.r.encode(out);
        self.s.encode(out);
    }
}

/// A transaction together with its signature, ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: TypedTransaction,
    pub signature: TxSignature,
}

impl SignedTransaction {
    /// Raw bytes accepted by `eth_sendRawTransaction`.
    pub fn raw(&self) -> Bytes {
        self.tx.encode_signed(&self.signature).into()
    }

    /// The transaction hash, i.e. the Keccak-256 of the raw encoding.
    pub fn hash(&self) -> B256 {
        keccak256(self.raw())
    }

    /// Echoes the transaction as a JSON-RPC transaction object, the
    /// `tx` half of the `eth_signTransaction` result.
    pub fn to_rpc_object(&self) -> serde_json::Value {
        let tx = &self.tx;
        let mut object = serde_json::json!({
            "type": hex_u64(tx.tx_type() as u64),
            "from": hex_address(&tx.from()),
            "nonce": hex_u64(tx.nonce()),
            "gas": hex_u64(tx.gas()),
            "to": tx.to().as_ref().map(hex_address),
            "value": hex_u256(&tx.value()),
            "input": hex_bytes(tx.input()),
            "v": hex_u256(&self.signature.v),
            "r": hex_bytes(&self.signature.r),
            "s": hex_bytes(&self.signature.s),
            "hash": format!("0x{}", hex::encode(self.hash())),
        });
        let fields = object
            .as_object_mut()
            .expect("literal above is an object");
        match tx {
            TypedTransaction::Legacy(tx) => {
                fields.insert("gasPrice".into(), hex_u64(tx.gas_price).into());
                if !tx.chain_id.is_zero() {
                    fields.insert("chainId".into(), hex_u256(&tx.chain_id).into());
                }
            }
            TypedTransaction::AccessList(tx) => {
                fields.insert("gasPrice".into(), hex_u64(tx.gas_price).into());
                fields.insert("chainId".into(), hex_u256(&tx.chain_id).into());
                fields.insert("accessList".into(), access_list_json(&tx.access_list));
            }
            TypedTransaction::DynamicFee(tx) => {
                fields.insert(
                    "maxPriorityFeePerGas".into(),
                    hex_u256(&tx.max_priority_fee_per_gas).into(),
                );
                fields.insert("maxFeePerGas".into(), hex_u256(&tx.max_fee_per_gas).into());
                fields.insert("chainId".into(), hex_u256(&tx.chain_id).into());
                fields.insert("accessList".into(), access_list_json(&tx.access_list));
            }
        }
        object
    }
}

fn hex_u64(value: u64) -> String {
    format!("0x{value:x}")
}

fn hex_u256(value: &U256) -> String {
    format!("0x{value:x}")
}

fn hex_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

fn hex_bytes(bytes: &Bytes) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn access_list_json(access_list: &AccessList) -> serde_json::Value {
    serde_json::Value::Array(
        access_list
            .0
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "address": hex_address(&entry.address),
                    "storageKeys": entry
                        .storage_keys
                        .iter()
                        .map(|key| format!("0x{}", hex::encode(key)))
                        .collect::<Vec<_>>(),
                })
            })
            .collect(),
    )
}

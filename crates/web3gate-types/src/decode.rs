//! Decoding of Ethereum JSON-RPC parameter objects.
//!
//! Intercepted methods carry their transaction as either a bare object
//! or a one-element array. All quantities arrive as `0x`-prefixed hex
//! strings; a bare `0x` means zero. The transaction family is selected
//! by field presence: any dynamic-fee field makes it EIP-1559, an
//! access list without fee fields makes it EIP-2930, anything else is
//! legacy.

use alloy_primitives::{Address, Bytes, B256, U256};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::transaction::{
    AccessList, AccessListEntry, AccessListTx, DynamicFeeTx, LegacyTx, TypedTransaction,
};

static ADDRESS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid address regex"));

/// Decoder failures; each carries enough context to point at the
/// offending field. All of them surface as `-32602` invalid params.
#[derive(Debug, thiserror::Error)]
pub enum TxDecodeError {
    #[error("params must be a transaction object or a one-element array")]
    Shape,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid `{field}`: {reason}")]
    Field { field: &'static str, reason: String },
}

impl TxDecodeError {
    fn field(field: &'static str, reason: impl Into<String>) -> Self {
        TxDecodeError::Field {
            field,
            reason: reason.into(),
        }
    }
}

fn string_field<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, TxDecodeError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(TxDecodeError::field(
            field,
            format!("expected a string, got {other}"),
        )),
    }
}

fn strip_hex_prefix<'a>(field: &'static str, raw: &'a str) -> Result<&'a str, TxDecodeError> {
    raw.strip_prefix("0x")
        .ok_or_else(|| TxDecodeError::field(field, "missing 0x prefix"))
}

fn parse_quantity_u256(field: &'static str, raw: &str) -> Result<U256, TxDecodeError> {
    let digits = strip_hex_prefix(field, raw)?;
    if digits.is_empty() {
        // "0x" on its own is zero.
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| TxDecodeError::field(field, format!("not a hex quantity: {e}")))
}

fn parse_quantity_u64(field: &'static str, raw: &str) -> Result<u64, TxDecodeError> {
    let digits = strip_hex_prefix(field, raw)?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| TxDecodeError::field(field, format!("not a hex quantity: {e}")))
}

/// Strict address grammar: lowercase `0x` followed by exactly 40 hex
/// digits. Also used to validate configured signer addresses.
pub fn parse_address(field: &'static str, raw: &str) -> Result<Address, TxDecodeError> {
    if !ADDRESS_REGEX.is_match(raw) {
        return Err(TxDecodeError::field(
            field,
            "expected 0x followed by 40 hex digits",
        ));
    }
    let bytes = hex::decode(&raw[2..]).map_err(|e| TxDecodeError::field(field, e.to_string()))?;
    Ok(Address::from_slice(&bytes))
}

fn parse_bytes(field: &'static str, raw: &str) -> Result<Bytes, TxDecodeError> {
    let digits = strip_hex_prefix(field, raw)?;
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| TxDecodeError::field(field, format!("not hex data: {e}")))
}

fn quantity_u256(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<U256>, TxDecodeError> {
    string_field(object, field)?
        .map(|raw| parse_quantity_u256(field, raw))
        .transpose()
}

fn quantity_u64(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<u64>, TxDecodeError> {
    string_field(object, field)?
        .map(|raw| parse_quantity_u64(field, raw))
        .transpose()
}

fn address_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<Address>, TxDecodeError> {
    string_field(object, field)?
        .map(|raw| parse_address(field, raw))
        .transpose()
}

/// `data` and `input` are interchangeable; when both are present they
/// must agree.
fn input_field(object: &Map<String, Value>) -> Result<Bytes, TxDecodeError> {
    let input = string_field(object, "input")?
        .map(|raw| parse_bytes("input", raw))
        .transpose()?;
    let data = string_field(object, "data")?
        .map(|raw| parse_bytes("data", raw))
        .transpose()?;
    match (input, data) {
        (Some(input), Some(data)) if input != data => Err(TxDecodeError::field(
            "input",
            "`data` and `input` are both present and differ",
        )),
        (Some(input), _) => Ok(input),
        (None, Some(data)) => Ok(data),
        (None, None) => Ok(Bytes::new()),
    }
}

fn access_list_field(object: &Map<String, Value>) -> Result<Option<AccessList>, TxDecodeError> {
    let raw = match object.get("accessList") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(TxDecodeError::field(
                "accessList",
                format!("expected an array, got {other}"),
            ))
        }
    };
    let mut entries = Vec::with_capacity(raw.len());
    for value in raw {
        let entry = value.as_object().ok_or_else(|| {
            TxDecodeError::field("accessList", "entries must be objects")
        })?;
        let address = address_field(entry, "address")?
            .ok_or(TxDecodeError::MissingField("accessList.address"))?;
        let mut storage_keys = Vec::new();
        if let Some(keys) = entry.get("storageKeys").filter(|v| !v.is_null()) {
            let keys = keys.as_array().ok_or_else(|| {
                TxDecodeError::field("storageKeys", "expected an array")
            })?;
            for key in keys {
                let key = key.as_str().ok_or_else(|| {
                    TxDecodeError::field("storageKeys", "keys must be hex strings")
                })?;
                let bytes = parse_bytes("storageKeys", key)?;
                if bytes.len() != 32 {
                    return Err(TxDecodeError::field(
                        "storageKeys",
                        format!("expected 32 bytes, got {}", bytes.len()),
                    ));
                }
                storage_keys.push(B256::from_slice(&bytes));
            }
        }
        entries.push(AccessListEntry {
            address,
            storage_keys,
        });
    }
    Ok(Some(AccessList(entries)))
}

fn params_object(params: &RawValue) -> Result<Map<String, Value>, TxDecodeError> {
    let value: Value = serde_json::from_str(params.get()).map_err(|_| TxDecodeError::Shape)?;
    match value {
        Value::Object(object) => Ok(object),
        Value::Array(mut items) => match items.first() {
            Some(Value::Object(_)) => match items.remove(0) {
                Value::Object(object) => Ok(object),
                _ => Err(TxDecodeError::Shape),
            },
            _ => Err(TxDecodeError::Shape),
        },
        _ => Err(TxDecodeError::Shape),
    }
}

/// Decodes the params of `eth_signTransaction`/`eth_sendTransaction`
/// into a typed transaction.
///
/// `gas` is required. `nonce` and `value` default to zero, the payload
/// defaults to empty, and an absent or null `to` selects contract
/// creation. A `chainId` field is honored when present but the signer
/// pins the effective chain id before hashing.
pub fn decode_transaction(params: &RawValue) -> Result<TypedTransaction, TxDecodeError> {
    let object = params_object(params)?;

    let from = address_field(&object, "from")?.unwrap_or(Address::ZERO);
    let to = address_field(&object, "to")?;
    let gas = quantity_u64(&object, "gas")?.ok_or(TxDecodeError::MissingField("gas"))?;
    let nonce = quantity_u64(&object, "nonce")?.unwrap_or(0);
    let value = quantity_u256(&object, "value")?.unwrap_or(U256::ZERO);
    let input = input_field(&object)?;
    let chain_id = quantity_u256(&object, "chainId")?.unwrap_or(U256::ZERO);

    let max_fee_per_gas = quantity_u256(&object, "maxFeePerGas")?;
    let max_priority_fee_per_gas = quantity_u256(&object, "maxPriorityFeePerGas")?;
    let access_list = access_list_field(&object)?;

    if max_fee_per_gas.is_some() || max_priority_fee_per_gas.is_some() {
        return Ok(TypedTransaction::DynamicFee(DynamicFeeTx {
            from,
            chain_id,
            nonce,
            max_priority_fee_per_gas: max_priority_fee_per_gas.unwrap_or(U256::ZERO),
            max_fee_per_gas: max_fee_per_gas.unwrap_or(U256::ZERO),
            gas,
            to,
            value,
            input,
            access_list: access_list.unwrap_or_default(),
        }));
    }

    let gas_price = quantity_u64(&object, "gasPrice")?.unwrap_or(0);
    if let Some(access_list) = access_list {
        return Ok(TypedTransaction::AccessList(AccessListTx {
            from,
            chain_id,
            nonce,
            gas_price,
            gas,
            to,
            value,
            input,
            access_list,
        }));
    }

    Ok(TypedTransaction::Legacy(LegacyTx {
        from,
        nonce,
        gas_price,
        gas,
        to,
        value,
        input,
        chain_id,
    }))
}

/// Decodes the `[address, data]` params of `eth_sign`. Length rules on
/// `data` are enforced by the caller.
pub fn decode_sign_params(params: &RawValue) -> Result<(Address, Bytes), TxDecodeError> {
    let value: Value = serde_json::from_str(params.get()).map_err(|_| TxDecodeError::Shape)?;
    let items = value.as_array().ok_or(TxDecodeError::Shape)?;
    let [address, data] = items.as_slice() else {
        return Err(TxDecodeError::field(
            "params",
            "expected [address, data]",
        ));
    };
    let address = address
        .as_str()
        .ok_or_else(|| TxDecodeError::field("address", "expected a string"))
        .and_then(|raw| parse_address("address", raw))?;
    let data = data
        .as_str()
        .ok_or_else(|| TxDecodeError::field("data", "expected a string"))
        .and_then(|raw| parse_bytes("data", raw))?;
    Ok((address, data))
}

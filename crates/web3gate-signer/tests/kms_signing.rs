//! End-to-end signing flows against a mocked KMS server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address, Bytes, U256};
use url::Url;
use web3gate_kms::{Credentials, KmsClient};
use web3gate_signer::{KmsSigner, Signer};
use web3gate_types::transaction::{DynamicFeeTx, LegacyTx, DYNAMIC_FEE_TX_TYPE};
use web3gate_types::TypedTransaction;

const KEY_ID: &str = "key-1";

fn signer_address() -> Address {
    address!("1234567890123456789012345678901234567890")
}

fn fixed_signature_hex(raw_v: u8) -> String {
    let mut raw = Vec::new();
    raw.extend_from_slice(&[0x01; 32]);
    raw.extend_from_slice(&[0x02; 32]);
    raw.push(raw_v);
    hex::encode(raw)
}

fn kms_signer(server: &mockito::ServerGuard, chain_id: u64) -> Signer {
    let endpoint = Url::parse(&server.url()).unwrap();
    let client = KmsClient::new(&endpoint, Credentials::new("ak", "sk"))
        .unwrap()
        .with_poll_interval(Duration::from_millis(10));
    Signer::Kms(KmsSigner::new(
        Arc::new(client),
        KEY_ID,
        signer_address(),
        U256::from(chain_id),
    ))
}

fn legacy_fixture() -> TypedTransaction {
    TypedTransaction::Legacy(LegacyTx {
        from: Address::ZERO,
        nonce: 5,
        gas_price: 20_000_000_000,
        gas: 21_000,
        to: Some(address!("0987654321098765432109876543210987654321")),
        value: U256::from(10u64).pow(U256::from(18u64)),
        input: Bytes::new(),
        chain_id: U256::from(1u64),
    })
}

fn dynamic_fee_fixture() -> TypedTransaction {
    TypedTransaction::DynamicFee(DynamicFeeTx {
        from: Address::ZERO,
        chain_id: U256::from(1u64),
        nonce: 5,
        max_priority_fee_per_gas: U256::from(2_000_000_000u64),
        max_fee_per_gas: U256::from(30_000_000_000u64),
        gas: 21_000,
        to: Some(address!("0987654321098765432109876543210987654321")),
        value: U256::from(10u64).pow(U256::from(18u64)),
        input: Bytes::new(),
        access_list: Default::default(),
    })
}

#[tokio::test]
async fn test_legacy_sign_folds_eip155_v() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("/api/v1/keys/{KEY_ID}/sign").as_str())
        .with_status(200)
        .with_body(format!(
            r#"{{"signature":"{}"}}"#,
            fixed_signature_hex(0)
        ))
        .create_async()
        .await;

    let signer = kms_signer(&server, 1);
    let signed = signer.sign_transaction(&legacy_fixture()).await.unwrap();

    // raw_v + 35 + 2 * chain_id = 0x25 for chain id 1.
    assert_eq!(signed.signature.v, U256::from(0x25u64));
    assert_eq!(signed.signature.r.as_ref(), &[0x01; 32][..]);
    assert_eq!(signed.signature.s.as_ref(), &[0x02; 32][..]);
    assert_eq!(signed.tx.from(), signer_address());

    // The raw encoding carries the folded v right after the fields.
    let raw = signed.raw();
    assert!(raw.contains(&0x25));
}

#[tokio::test]
async fn test_dynamic_fee_sign_keeps_raw_parity() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("/api/v1/keys/{KEY_ID}/sign").as_str())
        .with_status(200)
        .with_body(format!(
            r#"{{"signature":"{}"}}"#,
            fixed_signature_hex(1)
        ))
        .create_async()
        .await;

    let signer = kms_signer(&server, 1);
    let signed = signer
        .sign_transaction(&dynamic_fee_fixture())
        .await
        .unwrap();

    assert_eq!(signed.signature.v, U256::from(1u64));
    assert_eq!(signed.tx.signing_payload()[0], DYNAMIC_FEE_TX_TYPE);
    assert_eq!(signed.raw()[0], DYNAMIC_FEE_TX_TYPE);
}

#[tokio::test]
async fn test_approval_flow_produces_signed_transaction() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("/api/v1/keys/{KEY_ID}/sign").as_str())
        .with_status(201)
        .with_body(r#"{"task_id":"t-1"}"#)
        .create_async()
        .await;

    let polls = Arc::new(AtomicUsize::new(0));
    let polls_in_mock = polls.clone();
    let done_body = serde_json::json!({
        "status": "DONE",
        "response": format!(r#"{{"signature":"{}"}}"#, fixed_signature_hex(0)),
    })
    .to_string();
    server
        .mock("GET", "/api/v1/tasks/t-1")
        .with_status(200)
        .with_body_from_request(move |_| {
            if polls_in_mock.fetch_add(1, Ordering::SeqCst) < 3 {
                br#"{"status":"PENDING_APPROVAL"}"#.to_vec()
            } else {
                done_body.clone().into_bytes()
            }
        })
        .expect_at_least(4)
        .create_async()
        .await;

    let signer = kms_signer(&server, 1);
    let signed = signer.sign_transaction(&legacy_fixture()).await.unwrap();

    assert_eq!(polls.load(Ordering::SeqCst), 4);
    assert_eq!(signed.signature.v, U256::from(0x25u64));
    assert!(!signed.raw().is_empty());
}

#[tokio::test]
async fn test_kms_failure_propagates() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("/api/v1/keys/{KEY_ID}/sign").as_str())
        .with_status(403)
        .with_body(r#"{"code":40301,"message":"access denied"}"#)
        .create_async()
        .await;

    let signer = kms_signer(&server, 1);
    let err = signer
        .sign_transaction(&legacy_fixture())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("access denied"));
}

#[tokio::test]
async fn test_summary_travels_to_kms_but_not_into_digest() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", format!("/api/v1/keys/{KEY_ID}/sign").as_str())
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "summary": {
                "type": "TRANSFER",
                "token": "ETH",
                "amount": "1000000000000000000",
            }
        })))
        .with_status(200)
        .with_body(format!(
            r#"{{"signature":"{}"}}"#,
            fixed_signature_hex(0)
        ))
        .create_async()
        .await;

    let signer = kms_signer(&server, 1);
    // Stamp the fixture the same way signing will, so the expected
    // digest can be computed independently of the summary.
    let mut expected = legacy_fixture();
    expected.set_from(signer_address());
    expected.set_chain_id(U256::from(1u64));
    let expected_digest = expected.signing_hash();

    let summary = web3gate_types::TransferSummary::for_transaction(&expected, None);
    let signed = signer
        .sign_transaction_with_summary(&legacy_fixture(), Some(summary))
        .await
        .unwrap();

    assert_eq!(signed.tx.signing_hash(), expected_digest);
    mock.assert_async().await;
}

//! Shared fixtures for the registry integration tests.

#![allow(dead_code)]

use alloy_primitives::Address;
use trustreg_core::MemStore;
use trustreg_crypto::{fr_from_decimal, PublicKey};
use trustreg_registry::{
    IssuerDetails, Keeper, OperatorType, VerificationDetails, VerificationType,
};

pub const OPERATOR: Address = Address::repeat_byte(0x01);
pub const ISSUER: Address = Address::repeat_byte(0x0a);
pub const OTHER_ISSUER: Address = Address::repeat_byte(0x0b);
pub const USER: Address = Address::repeat_byte(0xaa);

/// Route `tracing` output to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn issuer_details(name: &str) -> IssuerDetails {
    IssuerDetails {
        name: name.to_string(),
        description: format!("{name} description"),
        url: "https://issuer.example".to_string(),
        operator: OPERATOR.to_string(),
        ..Default::default()
    }
}

/// Keeper with one initial operator and the issuer at [`ISSUER`], unverified.
pub fn keeper_with_issuer() -> Keeper<MemStore> {
    init_tracing();
    let keeper = Keeper::new(MemStore::new());
    keeper.add_operator(OPERATOR, OperatorType::Initial).unwrap();
    keeper
        .set_issuer_details(OPERATOR, ISSUER, &issuer_details("Issuer"))
        .unwrap();
    keeper
}

/// Like [`keeper_with_issuer`], with the issuer verified.
pub fn keeper_with_verified_issuer() -> Keeper<MemStore> {
    let keeper = keeper_with_issuer();
    keeper.set_address_verification_status(ISSUER, true).unwrap();
    keeper
}

pub fn details(issuer: Address, issuance: u32, expiration: u32) -> VerificationDetails {
    VerificationDetails {
        verification_type: VerificationType::Unspecified,
        issuer_address: issuer,
        origin_chain: "trustreg-test".to_string(),
        issuance_timestamp: issuance,
        expiration_timestamp: expiration,
        original_data: b"original proof data".to_vec(),
        schema: "https://schema.example/kyc".to_string(),
        issuer_verification_id: "issuer-side-1".to_string(),
        version: 1,
        ..Default::default()
    }
}

/// BabyJubJub base point (`Base8`), compressed.
pub fn holder_key() -> [u8; 32] {
    PublicKey::from_coordinates(
        fr_from_decimal(
            "5299619240641551281634865583518297030282874472190772894086521144482721001553",
        )
        .unwrap(),
        fr_from_decimal(
            "16950150798460657717958625567821834550301663161624707787222815936182638968203",
        )
        .unwrap(),
    )
    .unwrap()
    .compress()
}

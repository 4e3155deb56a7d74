//! # Registry Records
//!
//! Persisted entities and the enums they carry. Every record is stored as
//! self-describing JSON with `#[serde(default)]` on each field, so a missing
//! record and an all-default record read the same and new fields can be
//! added without breaking iteration over old rows.

use std::str::FromStr;

use alloy_primitives::Address;
use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use trustreg_crypto::{fr_from_be_bytes, mimc7, FieldError};

use crate::error::RegistryError;

// ─── Enums ───────────────────────────────────────────────────────────

/// Role of an operator account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum OperatorType {
    /// Zero value; never stored.
    #[default]
    Unspecified = 0,
    /// Installed at genesis; cannot be removed.
    Initial = 1,
    /// Added by another operator; removable.
    Regular = 2,
}

impl OperatorType {
    /// Whether the type may be stored.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Initial | Self::Regular)
    }
}

/// Kind of verification an issuer attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum VerificationType {
    /// Zero value; marks an absent record.
    #[default]
    Unspecified = 0,
    /// Know your customer.
    Kyc = 1,
    /// Know your business.
    Kyb = 2,
    /// Know your wallet.
    Kyw = 3,
    /// Proof of humanity.
    Humanity = 4,
    /// Anti money laundering screening.
    Aml = 5,
    /// Proof of address.
    Address = 6,
    /// Issuer-defined.
    Custom = 7,
    /// Credit scoring.
    CreditScore = 8,
    /// Biometric check.
    Biometric = 9,
}

impl VerificationType {
    /// Numeric value.
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// Parse a numeric value.
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Unspecified,
            1 => Self::Kyc,
            2 => Self::Kyb,
            3 => Self::Kyw,
            4 => Self::Humanity,
            5 => Self::Aml,
            6 => Self::Address,
            7 => Self::Custom,
            8 => Self::CreditScore,
            9 => Self::Biometric,
            _ => return None,
        })
    }

    /// Whether verifications of this type may be recorded.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Unspecified)
    }

    /// Little-endian `u32` encoding used in verification id derivation.
    pub fn to_le_bytes(&self) -> [u8; 4] {
        self.as_u32().to_le_bytes()
    }
}

// ─── Records ─────────────────────────────────────────────────────────

/// An account allowed to appoint issuers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorDetails {
    /// Operator address; empty in the zero value.
    pub operator: String,
    /// Operator role.
    pub operator_type: OperatorType,
}

impl OperatorDetails {
    /// Whether this is a stored operator rather than the zero value.
    pub fn exists(&self) -> bool {
        !self.operator.is_empty()
    }
}

/// Public profile of an issuer.
///
/// `operator` doubles as the existence marker: a record whose operator is
/// empty is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerDetails {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Homepage.
    pub url: String,
    /// Logo URL.
    pub logo: String,
    /// Registered legal entity.
    pub legal_entity: String,
    /// Address of the operator that manages this issuer.
    pub operator: String,
}

impl IssuerDetails {
    /// Whether the record marks an existing issuer.
    pub fn exists(&self) -> bool {
        !self.operator.is_empty()
    }
}

/// Pointer from an address to a stored [`VerificationDetails`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Verification {
    /// Verification kind.
    #[serde(rename = "type")]
    pub verification_type: VerificationType,
    /// Key of the referenced details record.
    #[serde(with = "hex_bytes")]
    pub verification_id: Vec<u8>,
    /// Issuer that attested the verification.
    pub issuer_address: Address,
}

/// Compliance state of one address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressDetails {
    /// Set through governance or an operator; gates issuing.
    pub is_verified: bool,
    /// Suspends the address' verifications when set.
    pub is_revoked: bool,
    /// Verifications received, oldest first.
    pub verifications: Vec<Verification>,
}

/// The attested data behind a [`Verification`]. Never mutated once stored,
/// apart from the revocation flag.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationDetails {
    /// Verification kind; `Unspecified` marks the zero value.
    #[serde(rename = "type")]
    pub verification_type: VerificationType,
    /// Issuer that attested the verification.
    pub issuer_address: Address,
    /// Chain the verification was performed for.
    pub origin_chain: String,
    /// Unix seconds; at least 1.
    pub issuance_timestamp: u32,
    /// Unix seconds; 0 means the verification never expires.
    pub expiration_timestamp: u32,
    /// Proof material submitted by the issuer.
    #[serde(with = "hex_bytes")]
    pub original_data: Vec<u8>,
    /// Optional supplementary proof.
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
    /// Schema reference of `original_data`.
    pub schema: String,
    /// Issuer-side identifier of the verification.
    pub issuer_verification_id: String,
    /// Format version of `original_data`.
    pub version: u32,
    /// Set when the issuer revokes the verification.
    pub is_revoked: bool,
}

impl VerificationDetails {
    /// Whether this is the zero value.
    pub fn is_empty(&self) -> bool {
        self.verification_type == VerificationType::Unspecified
    }
}

/// Credential committed into the issuance and revocation trees.
///
/// Not persisted; its hash is the leaf value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZkCredential {
    /// Verification kind.
    pub verification_type: VerificationType,
    /// Issuer address.
    pub issuer_address: Address,
    /// Holder public key `x` coordinate, big-endian.
    pub holder_public_key: Vec<u8>,
    /// Expiration, 0 for never.
    pub expiration_timestamp: u32,
    /// Issuance time.
    pub issuance_timestamp: u32,
}

impl ZkCredential {
    /// Credential for `details` held under `holder_public_key`.
    pub fn new(details: &VerificationDetails, holder_public_key: &[u8]) -> Self {
        Self {
            verification_type: details.verification_type,
            issuer_address: details.issuer_address,
            holder_public_key: holder_public_key.to_vec(),
            expiration_timestamp: details.expiration_timestamp,
            issuance_timestamp: details.issuance_timestamp,
        }
    }

    /// MiMC7 hash of `[type, issuer, holder key, expiration, issuance]`.
    pub fn hash(&self) -> Result<Fr, FieldError> {
        let inputs = [
            Fr::from(u64::from(self.verification_type.as_u32())),
            fr_from_be_bytes(self.issuer_address.as_slice())?,
            fr_from_be_bytes(&self.holder_public_key)?,
            Fr::from(u64::from(self.expiration_timestamp)),
            Fr::from(u64::from(self.issuance_timestamp)),
        ];
        Ok(mimc7::hash(&inputs, Fr::from(0u64)))
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Parse a `0x`-prefixed hex address, as a validation failure.
pub fn parse_address(s: &str) -> Result<Address, RegistryError> {
    if !s.starts_with("0x") {
        return Err(RegistryError::BasicValidation(format!(
            "invalid address {s:?}: missing 0x prefix"
        )));
    }
    Address::from_str(s)
        .map_err(|e| RegistryError::BasicValidation(format!("invalid address {s:?}: {e}")))
}

/// Parse a hex string, with or without `0x`, as a validation failure.
pub fn parse_hex(field: &str, s: &str) -> Result<Vec<u8>, RegistryError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| RegistryError::BasicValidation(format!("invalid {field}: {e}")))
}

/// Serde adapter encoding byte vectors as lowercase hex.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as hex.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize from hex.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_type_range() {
        assert!(!VerificationType::Unspecified.is_valid());
        for v in 1..=9 {
            let t = VerificationType::from_u32(v).unwrap();
            assert!(t.is_valid());
            assert_eq!(t.as_u32(), v);
        }
        assert_eq!(VerificationType::from_u32(10), None);
    }

    #[test]
    fn test_verification_type_bytes_little_endian() {
        assert_eq!(VerificationType::Kyc.to_le_bytes(), [1, 0, 0, 0]);
        assert_eq!(VerificationType::Biometric.to_le_bytes(), [9, 0, 0, 0]);
    }

    #[test]
    fn test_enum_serde_names() {
        assert_eq!(
            serde_json::to_string(&VerificationType::CreditScore).unwrap(),
            "\"CREDIT_SCORE\""
        );
        assert_eq!(
            serde_json::to_string(&OperatorType::Regular).unwrap(),
            "\"REGULAR\""
        );
    }

    #[test]
    fn test_issuer_existence_marker() {
        let mut details = IssuerDetails {
            name: "Issuer".into(),
            ..Default::default()
        };
        assert!(!details.exists());
        details.operator = "0x0000000000000000000000000000000000000001".into();
        assert!(details.exists());
    }

    #[test]
    fn test_missing_fields_default() {
        let details: VerificationDetails = serde_json::from_str("{\"origin_chain\":\"x\"}").unwrap();
        assert!(details.is_empty());
        assert_eq!(details.origin_chain, "x");
        let ignored: AddressDetails =
            serde_json::from_str("{\"is_verified\":true,\"future_field\":1}").unwrap();
        assert!(ignored.is_verified);
    }

    #[test]
    fn test_byte_fields_hex() {
        let v = Verification {
            verification_type: VerificationType::Kyc,
            verification_id: vec![0xab, 0xcd],
            issuer_address: Address::ZERO,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["verification_id"], "abcd");
        assert_eq!(json["type"], "KYC");
        let back: Verification = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0x00000000000000000000000000000000000000aa").unwrap();
        assert_eq!(addr.as_slice()[19], 0xaa);
        assert!(matches!(
            parse_address("00000000000000000000000000000000000000aa"),
            Err(RegistryError::BasicValidation(_))
        ));
        assert!(matches!(parse_address("0x1234"), Err(RegistryError::BasicValidation(_))));
        assert!(matches!(parse_address(""), Err(RegistryError::BasicValidation(_))));
    }

    #[test]
    fn test_credential_hash_field_sensitive() {
        let details = VerificationDetails {
            verification_type: VerificationType::Kyc,
            issuer_address: Address::repeat_byte(0x11),
            issuance_timestamp: 10,
            expiration_timestamp: 20,
            ..Default::default()
        };
        let a = ZkCredential::new(&details, &[1u8; 32]).hash().unwrap();
        let b = ZkCredential::new(&details, &[2u8; 32]).hash().unwrap();
        assert_ne!(a, b);
        let mut later = details.clone();
        later.expiration_timestamp = 21;
        assert_ne!(a, ZkCredential::new(&later, &[1u8; 32]).hash().unwrap());
    }

    #[test]
    fn test_credential_hash_known_value() {
        // KYC from 0x0a..0a, held under the BabyJubJub Base8 x coordinate.
        let holder_x = trustreg_crypto::fr_from_decimal(
            "5299619240641551281634865583518297030282874472190772894086521144482721001553",
        )
        .unwrap();
        let details = VerificationDetails {
            verification_type: VerificationType::Kyc,
            issuer_address: Address::repeat_byte(0x0a),
            issuance_timestamp: 100,
            expiration_timestamp: 0,
            ..Default::default()
        };
        let hash = ZkCredential::new(&details, &trustreg_crypto::fr_to_be_bytes(&holder_x))
            .hash()
            .unwrap();
        assert_eq!(
            trustreg_crypto::fr_to_decimal(&hash),
            "14365663642237637317727345314418680079900219742256086210444603976735681428748"
        );
    }

    #[test]
    fn test_credential_hash_rejects_out_of_field_key() {
        let details = VerificationDetails::default();
        assert_eq!(
            ZkCredential::new(&details, &[0xff; 32]).hash(),
            Err(FieldError::OutOfField)
        );
    }
}

//! EIP-712 digest construction and signer recovery for payment
//! authorizations.
//!
//! Pure functions, no I/O: given the token's domain separator parameters and
//! an [`Authorization`], compute the canonical typed-data digest
//! (`keccak256(0x1901 || domainSeparator || structHash)`) and recover the
//! ECDSA signer. The facilitator compares the recovered address against
//! `authorization.from`; the client signs the same digest.

use alloy::primitives::{Address, B256, FixedBytes, Signature};
use alloy::sol_types::{Eip712Domain, SolStruct, eip712_domain};

use crate::types::{Authorization, EvmSignature, TransferWithAuthorization};

/// Failure to decode or recover an ECDSA signature.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("signature recovery failed: {0}")]
    Recovery(String),
}

/// Builds the EIP-712 domain for a token deployment.
///
/// `name` and `version` must match what the token contract hashed into its
/// domain separator; the verifying contract is the asset itself.
pub fn domain(name: &str, version: &str, chain_id: u64, asset: Address) -> Eip712Domain {
    eip712_domain! {
        name: name.to_owned(),
        version: version.to_owned(),
        chain_id: chain_id,
        verifying_contract: asset,
    }
}

fn as_typed_data(authorization: &Authorization) -> TransferWithAuthorization {
    TransferWithAuthorization {
        from: authorization.from.0,
        to: authorization.to.0,
        value: authorization.value.into(),
        validAfter: authorization.valid_after.into(),
        validBefore: authorization.valid_before.into(),
        nonce: FixedBytes(authorization.nonce.0),
    }
}

/// Computes the typed-data digest a buyer signs for the given authorization.
pub fn signing_hash(domain: &Eip712Domain, authorization: &Authorization) -> B256 {
    as_typed_data(authorization).eip712_signing_hash(domain)
}

/// Recovers the signer of `signature` over the digest of `authorization`.
///
/// # Errors
///
/// Returns [`SignatureError`] if the 65 bytes do not decode as an ECDSA
/// signature or if public key recovery fails. A *wrong* but well-formed
/// signature recovers successfully to a different address; callers must
/// compare the result against the expected signer.
pub fn recover_payer(
    domain: &Eip712Domain,
    authorization: &Authorization,
    signature: &EvmSignature,
) -> Result<Address, SignatureError> {
    let signature = Signature::from_raw_array(&signature.0)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    let digest = signing_hash(domain, authorization);
    signature
        .recover_address_from_prehash(&digest)
        .map_err(|e| SignatureError::Recovery(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::SignerSync;
    use alloy::signers::local::PrivateKeySigner;

    use crate::timestamp::UnixTimestamp;
    use crate::types::HexEncodedNonce;

    fn test_domain() -> Eip712Domain {
        domain(
            "USDT0",
            "1",
            1030,
            "0xaf3744a2d92f7b1f07c938f9d9cb7a7e2fb647ff".parse().unwrap(),
        )
    }

    fn make_signed_authorization(signer: &PrivateKeySigner) -> (Authorization, EvmSignature) {
        let authorization = Authorization {
            from: signer.address().into(),
            to: "0x00000000000000000000000000000000000000a2".parse().unwrap(),
            value: "10000".parse().unwrap(),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(u64::MAX),
            nonce: HexEncodedNonce([0x42; 32]),
        };
        let digest = signing_hash(&test_domain(), &authorization);
        let signature = signer.sign_hash_sync(&digest).unwrap();
        let bytes: [u8; 65] = signature.as_bytes();
        (authorization, EvmSignature(bytes))
    }

    #[test]
    fn recovers_the_signer() {
        let signer = PrivateKeySigner::random();
        let (authorization, signature) = make_signed_authorization(&signer);
        let recovered = recover_payer(&test_domain(), &authorization, &signature).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn tampered_value_recovers_to_someone_else() {
        let signer = PrivateKeySigner::random();
        let (mut authorization, signature) = make_signed_authorization(&signer);
        authorization.value = "1".parse().unwrap();
        let recovered = recover_payer(&test_domain(), &authorization, &signature).unwrap();
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn tampered_nonce_recovers_to_someone_else() {
        let signer = PrivateKeySigner::random();
        let (mut authorization, signature) = make_signed_authorization(&signer);
        authorization.nonce = HexEncodedNonce([0xff; 32]);
        let recovered = recover_payer(&test_domain(), &authorization, &signature).unwrap();
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn wrong_domain_recovers_to_someone_else() {
        let signer = PrivateKeySigner::random();
        let (authorization, signature) = make_signed_authorization(&signer);
        let foreign = domain(
            "USDT0",
            "1",
            1,
            "0xaf3744a2d92f7b1f07c938f9d9cb7a7e2fb647ff".parse().unwrap(),
        );
        let recovered = recover_payer(&foreign, &authorization, &signature).unwrap();
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn garbage_signature_bytes_error() {
        let signer = PrivateKeySigner::random();
        let (authorization, _) = make_signed_authorization(&signer);
        // An all-0xff parity byte is not a valid recovery id.
        let garbage = EvmSignature([0xff; 65]);
        assert!(recover_payer(&test_domain(), &authorization, &garbage).is_err());
    }
}

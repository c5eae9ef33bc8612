// SPDX-License-Identifier: CC0-1.0

//! # Taproot signatures of an input
//!
//! Collects the Schnorr signatures an input carries and decides whether any
//! of them forbids a further change to the transaction.

use bitcoin::psbt::Input;
use bitcoin::secp256k1::schnorr;
use bitcoin::Witness;

use super::{Action, PsbtInputExt};
use crate::Error;

const SIGHASH_ANYONECANPAY: u8 = 0x80;
const SIGHASH_NONE: u8 = 0x02;
const SIGHASH_SINGLE: u8 = 0x03;

/// Decides whether an existing signature forbids an update.
pub trait SignaturePolicy {
    /// Whether a signature committing with `hash_type` is invalidated by
    /// `action`.
    fn signature_blocks_action(&self, hash_type: u8, action: Action) -> bool;
}

/// The sighash based policy: a signature only allows the changes its
/// sighash type does not commit to.
///
/// `ANYONECANPAY` allows adding inputs, `NONE` and `SINGLE` allow adding
/// outputs and changing input sequences. Everything else, and anything at
/// all under `ALL` or `DEFAULT`, is blocked.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SighashPolicy;

impl SignaturePolicy for SighashPolicy {
    fn signature_blocks_action(&self, hash_type: u8, action: Action) -> bool {
        let allowed = match action {
            Action::AddInput => hash_type & SIGHASH_ANYONECANPAY != 0,
            Action::AddOutput | Action::SetInputSequence => {
                matches!(hash_type & 0x1f, SIGHASH_NONE | SIGHASH_SINGLE)
            }
            _ => false,
        };
        !allowed
    }
}

/// Splits a 64 or 65 byte Schnorr signature into the signature proper and its
/// sighash type, which is `DEFAULT` (0) when absent.
pub fn decode_schnorr_signature(bytes: &[u8]) -> Result<(schnorr::Signature, u8), Error> {
    let (sig, hash_type) = match bytes.len() {
        64 => (bytes, 0),
        65 => {
            let (sig, hash_type) = bytes.split_at(64);
            (sig, hash_type[0])
        }
        len => return Err(Error::InvalidSignatureLength(len)),
    };
    let sig = schnorr::Signature::from_slice(sig).map_err(|_| Error::InvalidSignature)?;
    Ok((sig, hash_type))
}

/// The serialized Taproot signatures of `input`.
///
/// These are the key-path signature and all script-path signatures. If
/// there are none, a key-path signature is recovered from the finalized
/// witness, if any.
pub fn extract_taproot_sigs(input: &Input) -> Vec<Vec<u8>> {
    let mut sigs: Vec<Vec<u8>> = input.tap_key_sig.iter().map(|sig| sig.to_vec()).collect();
    sigs.extend(input.tap_script_sigs.values().map(|sig| sig.to_vec()));
    if sigs.is_empty() {
        sigs.extend(input.final_script_witness.as_ref().and_then(key_sig_from_witness));
    }
    sigs
}

// A finalized key-path spend is a single signature.
fn key_sig_from_witness(witness: &Witness) -> Option<Vec<u8>> {
    if witness.len() != 1 {
        return None;
    }
    witness.nth(0).filter(|item| item.len() == 64 || item.len() == 65).map(<[u8]>::to_vec)
}

/// Whether a signature of `input` forbids `action`, under `policy`.
///
/// A signature which cannot be decoded blocks every action.
pub fn check_input_for_sigs_with<P: SignaturePolicy>(
    input: &Input,
    action: Action,
    policy: &P,
) -> bool {
    extract_taproot_sigs(input).iter().any(|sig| match decode_schnorr_signature(sig) {
        Ok((_, hash_type)) => policy.signature_blocks_action(hash_type, action),
        Err(_) => true,
    })
}

/// Whether a signature of `input` forbids `action`, under [`SighashPolicy`].
pub fn check_input_for_sigs(input: &Input, action: Action) -> bool {
    check_input_for_sigs_with(input, action, &SighashPolicy)
}

/// Checks that no Taproot input carries a signature forbidding `action`.
///
/// Other inputs are skipped; their partial signatures are for the caller to
/// check.
pub fn check_inputs_for_sigs(inputs: &[Input], action: Action) -> Result<(), Error> {
    match inputs
        .iter()
        .position(|input| input.is_taproot() && check_input_for_sigs(input, action))
    {
        Some(index) => {
            log::debug!("input #{} has a signature which forbids {}", index, action);
            Err(Error::SignaturesExist { index, action })
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;
    use bitcoin::key::XOnlyPublicKey;
    use bitcoin::secp256k1;
    use bitcoin::sighash::TapSighashType;
    use bitcoin::taproot::{self, TapLeafHash};
    use core::str::FromStr;

    use super::*;

    fn sig(sighash_type: TapSighashType) -> taproot::Signature {
        taproot::Signature {
            signature: schnorr::Signature::from_slice(&[0x11; 64]).unwrap(),
            sighash_type,
        }
    }

    fn key() -> XOnlyPublicKey {
        XOnlyPublicKey::from_str("dff1d77f2a671c5f36183726db2341be58feae1da2deced843240f7b502ba659")
            .unwrap()
    }

    #[test]
    fn decode() {
        let (_, hash_type) = decode_schnorr_signature(&[0x11; 64]).unwrap();
        assert_eq!(hash_type, 0);
        let mut bytes = vec![0x11; 64];
        bytes.push(0x83);
        let (sig, hash_type) = decode_schnorr_signature(&bytes).unwrap();
        assert_eq!(hash_type, 0x83);
        assert_eq!(sig.serialize(), [0x11; 64]);
        assert_eq!(decode_schnorr_signature(&[0; 63]), Err(Error::InvalidSignatureLength(63)));
        assert_eq!(decode_schnorr_signature(&[0; 66]), Err(Error::InvalidSignatureLength(66)));
    }

    #[test]
    fn extract() {
        assert!(extract_taproot_sigs(&Input::default()).is_empty());

        let mut input =
            Input { tap_key_sig: Some(sig(TapSighashType::Default)), ..Default::default() };
        input
            .tap_script_sigs
            .insert((key(), TapLeafHash::all_zeros()), sig(TapSighashType::AllPlusAnyoneCanPay));
        let sigs = extract_taproot_sigs(&input);
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[0].len(), 64);
        assert_eq!(sigs[1].len(), 65);
    }

    #[test]
    fn extract_from_final_witness() {
        let input = Input {
            final_script_witness: Some(Witness::from_slice(&[vec![0x22; 65]])),
            ..Default::default()
        };
        assert_eq!(extract_taproot_sigs(&input), vec![vec![0x22; 65]]);

        // Script-path spends carry more than a signature.
        let input = Input {
            final_script_witness: Some(Witness::from_slice(&[vec![0x22; 64], vec![0x51]])),
            ..Default::default()
        };
        assert!(extract_taproot_sigs(&input).is_empty());

        let input = Input {
            final_script_witness: Some(Witness::from_slice(&[vec![0x22; 71]])),
            ..Default::default()
        };
        assert!(extract_taproot_sigs(&input).is_empty());

        // Signatures in the map win over the witness.
        let input = Input {
            tap_key_sig: Some(sig(TapSighashType::All)),
            final_script_witness: Some(Witness::from_slice(&[vec![0x22; 64]])),
            ..Default::default()
        };
        assert_eq!(extract_taproot_sigs(&input), vec![sig(TapSighashType::All).to_vec()]);
    }

    #[test]
    fn sighash_policy() {
        let policy = SighashPolicy;
        for action in [Action::AddInput, Action::AddOutput, Action::SetLocktime, Action::UpdateInput]
        {
            assert!(policy.signature_blocks_action(0x00, action));
            assert!(policy.signature_blocks_action(0x01, action));
        }
        assert!(!policy.signature_blocks_action(0x81, Action::AddInput));
        assert!(policy.signature_blocks_action(0x81, Action::AddOutput));
        assert!(!policy.signature_blocks_action(0x02, Action::AddOutput));
        assert!(!policy.signature_blocks_action(0x03, Action::SetInputSequence));
        assert!(policy.signature_blocks_action(0x03, Action::AddInput));
        assert!(!policy.signature_blocks_action(0x83, Action::AddInput));
        assert!(!policy.signature_blocks_action(0x83, Action::AddOutput));
        assert!(policy.signature_blocks_action(0x83, Action::SetVersion));
    }

    #[test]
    fn inputs_for_sigs() {
        let unsigned = Input { tap_internal_key: Some(key()), ..Default::default() };
        let signed = Input {
            tap_internal_key: Some(key()),
            tap_key_sig: Some(sig(TapSighashType::SinglePlusAnyoneCanPay)),
            ..Default::default()
        };
        assert!(!check_input_for_sigs(&unsigned, Action::SetVersion));
        assert!(check_input_for_sigs(&signed, Action::SetVersion));
        assert!(!check_input_for_sigs(&signed, Action::AddInput));

        let inputs = [unsigned, signed];
        assert!(check_inputs_for_sigs(&inputs, Action::AddOutput).is_ok());
        assert_eq!(
            check_inputs_for_sigs(&inputs, Action::SetLocktime),
            Err(Error::SignaturesExist { index: 1, action: Action::SetLocktime })
        );
    }

    #[test]
    fn legacy_inputs_skipped() {
        let pk = bitcoin::PublicKey::from_str(
            "02f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9",
        )
        .unwrap();
        let ecdsa_sig = secp256k1::ecdsa::Signature::from_compact(&[0x01; 64]).unwrap();
        let mut legacy =
            Input { redeem_script: Some(bitcoin::ScriptBuf::new()), ..Default::default() };
        legacy.partial_sigs.insert(pk, bitcoin::ecdsa::Signature::sighash_all(ecdsa_sig));
        assert!(check_inputs_for_sigs(&[legacy], Action::SetVersion).is_ok());
    }
}

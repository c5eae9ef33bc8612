// SPDX-License-Identifier: CC0-1.0

use bitcoin::hashes::{hash160, Hash};
use bitcoin::key::XOnlyPublicKey;
use bitcoin::script::Instruction;
use bitcoin::{consensus, Script, Witness};

/// Position of `pubkey` among the instructions of a Tapscript.
///
/// A push matches if it is the x-only key itself or its HASH160, the two
/// ways a Tapscript can refer to a key. Decoding stops at the first
/// malformed instruction.
pub(crate) fn pubkey_position_in_script(pubkey: &XOnlyPublicKey, script: &Script) -> Option<usize> {
    let x_only = pubkey.serialize();
    let pubkey_hash = hash160::Hash::hash(&x_only).to_byte_array();
    script.instructions().map_while(Result::ok).position(|ins| match ins {
        Instruction::PushBytes(push) => {
            push.as_bytes() == &x_only[..] || push.as_bytes() == &pubkey_hash[..]
        }
        Instruction::Op(_) => false,
    })
}

/// Serializes a witness stack with the consensus encoding.
pub(crate) fn witness_to_bytes(witness: &Witness) -> Vec<u8> { consensus::encode::serialize(witness) }

#[cfg(test)]
mod tests {
    use bitcoin::opcodes::all::{
        OP_CHECKSIG, OP_CHECKSIGADD, OP_EQUALVERIFY, OP_HASH160, OP_NUMEQUAL, OP_PUSHNUM_2,
    };
    use bitcoin::script::Builder;
    use core::str::FromStr;

    use super::*;

    fn key(hex: &str) -> XOnlyPublicKey { XOnlyPublicKey::from_str(hex).unwrap() }

    #[test]
    fn positions() {
        let a = key("dff1d77f2a671c5f36183726db2341be58feae1da2deced843240f7b502ba659");
        let b = key("dd308afec5777e13121fa72b9cc1b7cc0139715309b086c960e18fd969774eb8");
        let c = key("25d1dff95105f5253c4022f628a996ad3a0d95fbf21d468a1b33f8c160d8f517");
        let script = Builder::new()
            .push_x_only_key(&a)
            .push_opcode(OP_CHECKSIG)
            .push_x_only_key(&b)
            .push_opcode(OP_CHECKSIGADD)
            .push_opcode(OP_PUSHNUM_2)
            .push_opcode(OP_NUMEQUAL)
            .into_script();
        assert_eq!(pubkey_position_in_script(&a, &script), Some(0));
        assert_eq!(pubkey_position_in_script(&b, &script), Some(2));
        assert_eq!(pubkey_position_in_script(&c, &script), None);
    }

    #[test]
    fn position_of_key_hash() {
        let a = key("dff1d77f2a671c5f36183726db2341be58feae1da2deced843240f7b502ba659");
        let hash = hash160::Hash::hash(&a.serialize()).to_byte_array();
        let script = Builder::new()
            .push_opcode(OP_HASH160)
            .push_slice(hash)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .into_script();
        assert_eq!(pubkey_position_in_script(&a, &script), Some(1));
    }

    #[test]
    fn witness_bytes() {
        let witness = Witness::from_slice(&[vec![0xaa; 64]]);
        let bytes = witness_to_bytes(&witness);
        assert_eq!(bytes.len(), 66);
        assert_eq!(&bytes[..2], &[0x01, 0x40]);
    }
}

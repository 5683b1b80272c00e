//!
//! Dry-run executor of the verifier programs.
//!
//! Only the opcodes the compiler emits are supported. Stack items are byte strings and
//! numbers are minimally encoded little-endian sign-magnitude values of at most 4 bytes.
//! An item is true unless all its bytes are zero (a lone sign bit in the last byte counts
//! as zero). The comparisons push `[0x01]` or the empty string.
//!

use log::trace;
use thiserror::Error as ThisError;
// ---
use crate::common::PublicKey;
use crate::hash::{hash160, hash256};
use crate::script::{encode_number, Instruction, Opcode, VerifierProgram};

/// Longest numeric operand (in bytes) the machine accepts.
pub const MAX_NUM_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ScriptError {
    #[error("{0} on an empty stack")]
    StackUnderflow(Opcode),
    #[error("{0} on an empty alt stack")]
    AltStackUnderflow(Opcode),
    #[error("unbalanced OP_IF/OP_ENDIF")]
    UnbalancedConditional,
    #[error("numeric operand of {0} bytes is too long")]
    NumberTooLong(usize),
    #[error("numeric operand 0x{0} is not minimally encoded")]
    NonMinimalNumber(String),
    #[error("numeric overflow")]
    NumericOverflow,
    #[error("OP_EQUALVERIFY failed")]
    EqualVerifyFailed,
    #[error("the program finished with {main} items on the stack and {alt} on the alt stack")]
    UncleanStack { main: usize, alt: usize },
}

type ExecResult<T> = std::result::Result<T, ScriptError>;

fn to_number(item: &[u8]) -> ExecResult<i64> {
    if item.len() > MAX_NUM_SIZE {
        return Err(ScriptError::NumberTooLong(item.len()));
    }
    let last = match item.last() {
        Some(b) => *b,
        None => return Ok(0),
    };

    // The last byte may only be 0x00/0x80 if the sign bit would collide otherwise
    let n = item.len();
    if last & 0x7f == 0 && (n == 1 || item[n - 2] & 0x80 == 0) {
        return Err(ScriptError::NonMinimalNumber(hex::encode(item)));
    }

    let mut abs: i64 = 0;
    for (i, b) in item.iter().enumerate() {
        let b = if i == n - 1 { b & 0x7f } else { *b };
        abs |= i64::from(b) << (8 * i);
    }
    Ok(if last & 0x80 != 0 { -abs } else { abs })
}

fn is_true(item: &[u8]) -> bool {
    match item.iter().position(|&b| b != 0) {
        Some(i) => !(i == item.len() - 1 && item[i] == 0x80),
        None => false,
    }
}

fn from_bool(b: bool) -> Vec<u8> {
    if b {
        vec![1]
    } else {
        vec![]
    }
}

///
/// The two-stack machine.
///
#[derive(Debug, Default)]
pub struct StackMachine {
    main: Vec<Vec<u8>>,
    alt: Vec<Vec<u8>>,
}

impl StackMachine {
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Runs the program on the witness.
    ///
    /// The witness items are pushed in order before the first instruction. On success,
    /// the only item left on the stack (the authenticated digest) is returned.
    ///
    /// # Arguments
    /// * `program` - The compiled verifier.
    /// * `public_key` - The literal bound to the public key push.
    /// * `witness` - The stack items (see `Signature::witness`).
    ///
    pub fn execute(
        mut self,
        program: &VerifierProgram,
        public_key: &PublicKey,
        witness: Vec<Vec<u8>>,
    ) -> ExecResult<Vec<u8>> {
        self.main = witness;

        let mut exec_stack: Vec<bool> = vec![];
        for instr in program.instructions() {
            let executing = exec_stack.iter().all(|&e| e);

            match instr {
                Instruction::Op(Opcode::If) => {
                    if executing {
                        let cond = self.pop(Opcode::If)?;
                        exec_stack.push(is_true(&cond));
                    } else {
                        exec_stack.push(false);
                    }
                    continue;
                }
                Instruction::Op(Opcode::EndIf) => {
                    exec_stack
                        .pop()
                        .ok_or(ScriptError::UnbalancedConditional)?;
                    continue;
                }
                _ if !executing => continue,
                Instruction::Op(op) => self.step(*op)?,
                Instruction::PushNumber(n) => self.main.push(encode_number(*n)),
                Instruction::PushBytes(bytes) => self.main.push(bytes.clone()),
                Instruction::PushPublicKey => self.main.push(public_key.to_vec()),
            }
        }

        if !exec_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        if self.main.len() != 1 || !self.alt.is_empty() {
            return Err(ScriptError::UncleanStack {
                main: self.main.len(),
                alt: self.alt.len(),
            });
        }
        let out = self.main.remove(0);
        trace!("The program finished with {}.", hex::encode(&out));
        Ok(out)
    }

    fn pop(&mut self, op: Opcode) -> ExecResult<Vec<u8>> {
        self.main.pop().ok_or(ScriptError::StackUnderflow(op))
    }

    fn step(&mut self, op: Opcode) -> ExecResult<()> {
        match op {
            Opcode::Dup => {
                let top = self.main.last().ok_or(ScriptError::StackUnderflow(op))?.clone();
                self.main.push(top);
            }
            Opcode::Drop => {
                self.pop(op)?;
            }
            Opcode::Swap => {
                let len = self.main.len();
                if len < 2 {
                    return Err(ScriptError::StackUnderflow(op));
                }
                self.main.swap(len - 1, len - 2);
            }
            Opcode::ToAltStack => {
                let top = self.pop(op)?;
                self.alt.push(top);
            }
            Opcode::FromAltStack => {
                let top = self.alt.pop().ok_or(ScriptError::AltStackUnderflow(op))?;
                self.main.push(top);
            }
            Opcode::Cat => {
                let b = self.pop(op)?;
                let mut a = self.pop(op)?;
                a.extend_from_slice(&b);
                self.main.push(a);
            }
            Opcode::Hash160 => {
                let data = self.pop(op)?;
                self.main.push(hash160(&data).to_vec());
            }
            Opcode::Hash256 => {
                let data = self.pop(op)?;
                self.main.push(hash256(&data).to_vec());
            }
            Opcode::Sub => {
                let b = to_number(&self.pop(op)?)?;
                let a = to_number(&self.pop(op)?)?;
                let diff = a.checked_sub(b).ok_or(ScriptError::NumericOverflow)?;
                self.main.push(encode_number(diff));
            }
            Opcode::LessThan => {
                let b = to_number(&self.pop(op)?)?;
                let a = to_number(&self.pop(op)?)?;
                self.main.push(from_bool(a < b));
            }
            Opcode::GreaterThanOrEqual => {
                let b = to_number(&self.pop(op)?)?;
                let a = to_number(&self.pop(op)?)?;
                self.main.push(from_bool(a >= b));
            }
            Opcode::Equal => {
                let b = self.pop(op)?;
                let a = self.pop(op)?;
                self.main.push(from_bool(a == b));
            }
            Opcode::EqualVerify => {
                let b = self.pop(op)?;
                let a = self.pop(op)?;
                if a != b {
                    return Err(ScriptError::EqualVerifyFailed);
                }
            }
            // Control flow is handled by the caller
            Opcode::If | Opcode::EndIf => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use rand::rngs::OsRng;
    use rand::Rng;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;
    // ---
    use super::*;
    use crate::common::MasterSecret;
    use crate::config::SchemeParams;
    use crate::lamport::{LamportKeyPair, LamportScheme, Signature};
    use crate::script::ScriptCompiler;
    use crate::traits::SignatureSchemeTrait;

    /// A seedable CSPRNG used for number generation
    type CsPrng = ChaCha20Rng;

    fn setup(digits: usize, leaf_count: usize) -> (LamportScheme, LamportKeyPair, VerifierProgram) {
        let params = SchemeParams::new(digits, leaf_count).unwrap();
        let scheme = LamportScheme::new(params).unwrap();
        let key_pair = scheme.gen_key_pair(&MasterSecret::new([0u8; 32])).unwrap();
        let program = ScriptCompiler::new(params).unwrap().compile();
        (scheme, key_pair, program)
    }

    fn run(program: &VerifierProgram, pk: &PublicKey, signature: &Signature) -> ExecResult<Vec<u8>> {
        StackMachine::new().execute(program, pk, signature.witness())
    }

    #[test]
    fn test_accepts_valid_signature_and_outputs_digest() {
        let (scheme, key_pair, program) = setup(2, 4);
        for digest in [[0x01, 0x03], [0, 0], [3, 3], [2, 1]] {
            let signature = scheme.sign(&digest, &key_pair.secret).unwrap();
            let out = run(&program, &key_pair.public, &signature).unwrap();
            assert_eq!(out, digest);
        }
    }

    #[test]
    fn test_accepts_random_digests_on_full_depth() {
        const NUM_ITERS: usize = 8;

        let mut seed_rng = OsRng;
        let random_seed = seed_rng.gen::<u64>();
        println!("seed: {random_seed}");
        let mut rng = CsPrng::seed_from_u64(random_seed);

        let (scheme, key_pair, program) = setup(3, 256);
        for _ in 0..NUM_ITERS {
            let digest: [u8; 3] = rng.gen();
            let signature = scheme.sign(&digest, &key_pair.secret).unwrap();
            let out = run(&program, &key_pair.public, &signature).unwrap();
            assert_eq!(out, digest);
        }
    }

    #[test]
    fn test_rejects_wrong_public_key() {
        let (scheme, key_pair, program) = setup(2, 4);
        let signature = scheme.sign(&[1, 2], &key_pair.secret).unwrap();

        let mut other = key_pair.public;
        other[0] ^= 1;
        assert_eq!(
            run(&program, &other, &signature),
            Err(ScriptError::EqualVerifyFailed)
        );
    }

    #[test]
    fn test_rejects_single_bit_flips() {
        let (scheme, key_pair, program) = setup(2, 4);
        let params = *program.params();
        let bytes = scheme.sign(&[0x01, 0x03], &key_pair.secret).unwrap().to_bytes();

        for byte in 0..bytes.len() {
            for bit in 0..8 {
                let mut tampered = bytes.clone();
                tampered[byte] ^= 1 << bit;
                let signature = Signature::from_bytes(&tampered, &params).unwrap();

                let res = run(&program, &key_pair.public, &signature);
                assert!(res.is_err(), "flip of bit {bit} in byte {byte} was accepted");
            }
        }
    }

    #[test]
    fn test_truncated_witness_underflows() {
        let (scheme, key_pair, program) = setup(2, 4);
        let signature = scheme.sign(&[1, 2], &key_pair.secret).unwrap();
        let mut witness = signature.witness();
        witness.drain(..3);

        let res = StackMachine::new().execute(&program, &key_pair.public, witness);
        assert!(matches!(
            res,
            Err(ScriptError::StackUnderflow(_)) | Err(ScriptError::AltStackUnderflow(_))
        ));
    }

    #[test]
    fn test_extra_witness_item_is_unclean() {
        let (scheme, key_pair, program) = setup(2, 4);
        let signature = scheme.sign(&[1, 2], &key_pair.secret).unwrap();
        let mut witness = vec![vec![0xff]];
        witness.extend(signature.witness());

        let res = StackMachine::new().execute(&program, &key_pair.public, witness);
        assert_eq!(res, Err(ScriptError::UncleanStack { main: 2, alt: 0 }));
    }

    #[test]
    fn test_accepts_every_control_byte() {
        let (scheme, key_pair, program) = setup(1, 256);
        for d in 0..=255u8 {
            let signature = scheme.sign(&[d], &key_pair.secret).unwrap();
            let out = run(&program, &key_pair.public, &signature).unwrap();
            assert_eq!(out, vec![d], "control byte {d:#04x}");
        }
    }

    #[test]
    fn test_accepts_sign_bit_digits() {
        let (scheme, key_pair, program) = setup(4, 256);
        let digest = [0x80, 0xff, 0x00, 0x85];
        let signature = scheme.sign(&digest, &key_pair.secret).unwrap();
        assert_eq!(run(&program, &key_pair.public, &signature).unwrap(), digest);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(to_number(&[]).unwrap(), 0);
        assert_eq!(to_number(&[0x7f]).unwrap(), 127);
        assert_eq!(to_number(&[0x85]).unwrap(), -5);
        assert_eq!(to_number(&[0x80, 0x00]).unwrap(), 128);
        assert_eq!(to_number(&[0xff, 0x80]).unwrap(), -255);
        assert_eq!(to_number(&[0x00, 0x01]).unwrap(), 256);
        assert_eq!(to_number(&[0; 5]), Err(ScriptError::NumberTooLong(5)));
        for item in [&[0x00][..], &[0x80][..], &[0x01, 0x00][..], &[0x7f, 0x80][..]] {
            assert!(matches!(
                to_number(item),
                Err(ScriptError::NonMinimalNumber(_))
            ));
        }
        for n in [-300, -128, -1, 0, 1, 127, 128, 255, 0x1234] {
            assert_eq!(to_number(&encode_number(n)).unwrap(), n);
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(is_true(&[0, 1]));
        assert!(is_true(&[0x80, 0x00]));
        assert!(!is_true(&[0, 0]));
        assert!(!is_true(&[0x80]));
        assert!(!is_true(&[0x00, 0x80]));
        assert!(!is_true(&from_bool(false)));
        assert!(is_true(&from_bool(true)));
    }

    #[test]
    fn test_negative_difference_is_a_number() {
        let mut machine = StackMachine::new();
        machine.main = vec![encode_number(3), encode_number(5)];
        machine.step(Opcode::Sub).unwrap();
        assert_eq!(machine.main, vec![vec![0x82]]);
    }
}

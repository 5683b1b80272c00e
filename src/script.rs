//!
//! Compiler of the verifier program for the two-stack machine.
//!
//! The program expects the witness items of a signature (see `Signature::witness`) on the
//! main stack and uses the alt stack as its only other storage. The top of the main stack
//! holds the control byte of the last digit, so the digits are processed from the last to
//! the first and both the digest and the concatenation of the roots are built by prepending.
//!
//! One digit runs as follows (stack top on the right):
//!
//! ```text
//! main: .. s_0 .. s_{d-1} pre ctl        alt: .. digest agg
//! OP_DUP OP_TOALTSTACK                   ctl joins the digest
//! OP_DUP, normalize, bits d-1..0, OP_DROP  bit 0 ends on the top of alt
//! OP_SWAP OP_CAT OP_HASH160              leaf = hash160(ctl || pre)
//! d x (OP_SWAP OP_FROMALTSTACK OP_IF OP_SWAP OP_ENDIF OP_CAT OP_HASH160)
//! update of digest and agg on alt
//! ```
//!
//! Finally the aggregate is double hashed and compared with the public key literal.
//!
//! # Numbers
//! The machine reads numbers as minimally encoded little-endian sign-magnitude values of
//! at most 4 bytes. A raw control byte is therefore not usable as a number directly:
//! `0x00` and `0x80` are not minimal and the bytes from `0x81` up are negative. The copy
//! of the control byte is first mapped onto the number `0..=255` it stands for:
//!
//! ```text
//! OP_DUP <0x00> OP_EQUAL OP_IF OP_DROP OP_0 OP_ENDIF
//! OP_DUP <0x80> OP_EQUAL OP_IF OP_DROP <0x8000> OP_ENDIF
//! OP_DUP OP_0 OP_LESSTHAN OP_IF <0x8000> OP_SWAP OP_SUB OP_ENDIF      128 - (-(c - 128)) = c
//! ```
//!

use std::fmt::{self, Display, Formatter};
// ---
use log::debug;
// ---
use crate::common::{Error, PublicKey, Result};
use crate::config::SchemeParams;

/// Maximal tree depth that one control byte can address.
pub const MAX_DEPTH: usize = 8;

///
/// The named opcodes of the target machine used by the verifier.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Dup,
    Drop,
    Swap,
    ToAltStack,
    FromAltStack,
    Cat,
    Hash160,
    Hash256,
    If,
    EndIf,
    Sub,
    LessThan,
    GreaterThanOrEqual,
    Equal,
    EqualVerify,
}

impl Opcode {
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Dup => "OP_DUP",
            Opcode::Drop => "OP_DROP",
            Opcode::Swap => "OP_SWAP",
            Opcode::ToAltStack => "OP_TOALTSTACK",
            Opcode::FromAltStack => "OP_FROMALTSTACK",
            Opcode::Cat => "OP_CAT",
            Opcode::Hash160 => "OP_HASH160",
            Opcode::Hash256 => "OP_HASH256",
            Opcode::If => "OP_IF",
            Opcode::EndIf => "OP_ENDIF",
            Opcode::Sub => "OP_SUB",
            Opcode::LessThan => "OP_LESSTHAN",
            Opcode::GreaterThanOrEqual => "OP_GREATERTHANOREQUAL",
            Opcode::Equal => "OP_EQUAL",
            Opcode::EqualVerify => "OP_EQUALVERIFY",
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

///
/// One executable step of the program.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Op(Opcode),
    /// Pushes the number in its minimal encoding (see `encode_number`).
    PushNumber(i64),
    /// Pushes the raw bytes.
    PushBytes(Vec<u8>),
    /// Pushes the public key; the literal is bound when the program is rendered or run.
    PushPublicKey,
}

///
/// Minimal little-endian sign-magnitude encoding of a number.
///
/// Zero is the empty string. The top bit of the last byte is the sign, so a magnitude
/// with that bit set gets one more byte (`128` is `0x8000`, `-128` is `0x8080`).
///
pub fn encode_number(n: i64) -> Vec<u8> {
    let negative = n < 0;
    let mut abs = n.unsigned_abs();

    let mut out = vec![];
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }

    let top = out.last().copied().unwrap_or(0);
    if top & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if let Some(last) = out.last_mut().filter(|_| negative) {
        *last |= 0x80;
    }
    out
}

impl Instruction {
    /// Renders the instruction as one listing line with the public key bound.
    pub fn render(&self, public_key: &PublicKey) -> String {
        match self {
            Instruction::Op(op) => op.name().to_string(),
            Instruction::PushNumber(0) => "OP_0".to_string(),
            Instruction::PushNumber(-1) => "OP_1NEGATE".to_string(),
            Instruction::PushNumber(n @ 1..=16) => format!("OP_{n}"),
            Instruction::PushNumber(n) => format!("<0x{}>", hex::encode(encode_number(*n))),
            Instruction::PushBytes(bytes) => format!("<0x{}>", hex::encode(bytes)),
            Instruction::PushPublicKey => format!("<0x{}>", hex::encode(public_key)),
        }
    }
}

///
/// One line of the program listing.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Comment(String),
    Code(Instruction),
}

///
/// The compiled verifier, independent of any key or signature.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierProgram {
    params: SchemeParams,
    lines: Vec<Line>,
}

impl VerifierProgram {
    pub fn params(&self) -> &SchemeParams {
        &self.params
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// The executable instructions (comments skipped).
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.lines.iter().filter_map(|l| match l {
            Line::Code(i) => Some(i),
            Line::Comment(_) => None,
        })
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions().count()
    }

    ///
    /// Renders the human-readable listing with the public key embedded as a push literal.
    ///
    pub fn listing(&self, public_key: &PublicKey) -> String {
        let mut out = String::new();
        for line in self.lines.iter() {
            match line {
                Line::Comment(c) if c.is_empty() => {}
                Line::Comment(c) => {
                    out.push_str("// ");
                    out.push_str(c);
                }
                Line::Code(i) => out.push_str(&i.render(public_key)),
            }
            out.push('\n');
        }
        out
    }

    /// Binds the public key, producing the final listing (see `listing`).
    pub fn bind<'a>(&'a self, public_key: &'a PublicKey) -> BoundProgram<'a> {
        BoundProgram {
            program: self,
            public_key,
        }
    }
}

/// The program together with its public key literal.
pub struct BoundProgram<'a> {
    program: &'a VerifierProgram,
    public_key: &'a PublicKey,
}

impl Display for BoundProgram<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.program.listing(self.public_key))
    }
}

///
/// Emits the verifier program for the given scheme parameters.
///
/// The emitted program depends only on the number of digits and the tree depth; all
/// data-dependent decisions are left to `OP_IF` at run time.
///
pub struct ScriptCompiler {
    params: SchemeParams,
    lines: Vec<Line>,
}

impl ScriptCompiler {
    pub fn new(params: SchemeParams) -> Result<Self> {
        params.validate()?;
        if params.depth() > MAX_DEPTH {
            return Err(Error::Precondition(format!(
                "tree depth {} exceeds {MAX_DEPTH}",
                params.depth()
            )));
        }
        Ok(ScriptCompiler {
            params,
            lines: vec![],
        })
    }

    pub fn compile(mut self) -> VerifierProgram {
        let digits = self.params.digits;
        let depth = self.params.depth();

        self.comment("witness script");
        for (n, t) in (0..digits).rev().enumerate() {
            self.emit_leaf_hash(t, depth);
            for i in 0..depth {
                self.emit_merkle_step(t, i, depth);
            }
            if n == 0 {
                self.comment(format!("*** digit {t}: push state to alt-stack"));
                self.op(Opcode::ToAltStack);
            } else {
                self.emit_update_alt_stack(t);
            }
            self.comment("");
        }
        self.emit_final_check();

        let program = VerifierProgram {
            params: self.params,
            lines: self.lines,
        };
        debug!(
            "Compiled the verifier for {} digits of depth {}: {} instructions.",
            digits,
            depth,
            program.instruction_count()
        );
        program
    }

    // ---

    fn op(&mut self, op: Opcode) {
        self.lines.push(Line::Code(Instruction::Op(op)));
    }

    fn push_number(&mut self, n: i64) {
        self.lines.push(Line::Code(Instruction::PushNumber(n)));
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.lines.push(Line::Code(Instruction::PushBytes(bytes.to_vec())));
    }

    fn comment(&mut self, text: impl Into<String>) {
        self.lines.push(Line::Comment(text.into()));
    }

    /// Splits the control byte and hashes the revealed leaf.
    fn emit_leaf_hash(&mut self, t: usize, depth: usize) {
        self.comment(format!("*** digit {t} of <sighash>"));
        self.op(Opcode::Dup);
        self.op(Opcode::ToAltStack);

        self.comment(format!("digit {t}: control byte to number"));
        self.op(Opcode::Dup);
        self.emit_normalize_control();

        // Bits go to alt from the most significant one, bit 0 ends on top
        self.comment(format!("digit {t}: control byte to direction bits"));
        for k in (0..depth).rev() {
            let weight = 1i64 << k;
            self.op(Opcode::Dup);
            self.push_number(weight);
            self.op(Opcode::GreaterThanOrEqual);
            self.op(Opcode::Dup);
            self.op(Opcode::ToAltStack);
            self.op(Opcode::If);
            self.push_number(weight);
            self.op(Opcode::Sub);
            self.op(Opcode::EndIf);
        }
        self.op(Opcode::Drop);

        self.comment(format!("digit {t}: leaf = hash160(control || preimage)"));
        self.op(Opcode::Swap);
        self.op(Opcode::Cat);
        self.op(Opcode::Hash160);
    }

    ///
    /// Replaces the raw control byte on the top by the number `0..=255` it stands for.
    ///
    /// The non-minimal `0x00` and `0x80` are swapped for the literals and the negative
    /// bytes `0x81..=0xff` (`-1..=-127`) are mapped by `128 - n`.
    ///
    fn emit_normalize_control(&mut self) {
        self.op(Opcode::Dup);
        self.push_bytes(&[0x00]);
        self.op(Opcode::Equal);
        self.op(Opcode::If);
        self.op(Opcode::Drop);
        self.push_number(0);
        self.op(Opcode::EndIf);

        self.op(Opcode::Dup);
        self.push_bytes(&[0x80]);
        self.op(Opcode::Equal);
        self.op(Opcode::If);
        self.op(Opcode::Drop);
        self.push_number(128);
        self.op(Opcode::EndIf);

        self.op(Opcode::Dup);
        self.push_number(0);
        self.op(Opcode::LessThan);
        self.op(Opcode::If);
        self.push_number(128);
        self.op(Opcode::Swap);
        self.op(Opcode::Sub);
        self.op(Opcode::EndIf);
    }

    /// Folds the accumulator one level up; a set bit means it is the right child.
    fn emit_merkle_step(&mut self, t: usize, i: usize, depth: usize) {
        self.comment(format!("digit {t}: merkle step {} of {depth}", i + 1));
        self.op(Opcode::Swap);
        self.op(Opcode::FromAltStack);
        self.op(Opcode::If);
        self.op(Opcode::Swap);
        self.op(Opcode::EndIf);
        self.op(Opcode::Cat);
        self.op(Opcode::Hash160);
    }

    ///
    /// Prepends the digit byte to the digest and the root to the aggregate.
    ///
    /// main: `root`, alt: `digest agg byte` -> main: empty, alt: `byte||digest root||agg`
    ///
    fn emit_update_alt_stack(&mut self, t: usize) {
        self.comment(format!("*** digit {t}: update state on alt-stack"));
        self.op(Opcode::FromAltStack);
        self.op(Opcode::FromAltStack);
        self.op(Opcode::Swap);
        self.op(Opcode::FromAltStack);
        self.op(Opcode::Cat);
        self.op(Opcode::ToAltStack);
        self.op(Opcode::Cat);
        self.op(Opcode::ToAltStack);
    }

    fn emit_final_check(&mut self) {
        self.comment("*** finished building the sighash and pubkey");
        self.op(Opcode::FromAltStack);
        self.op(Opcode::Hash256);
        self.lines.push(Line::Code(Instruction::PushPublicKey));
        self.op(Opcode::EqualVerify);
        self.op(Opcode::FromAltStack);
    }
}

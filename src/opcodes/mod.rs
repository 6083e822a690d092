//! Glulx instruction set
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode list and hands it to a callback macro, so the table is written once.
//! From it this module generates:
//! - The [`Opcode`] enum and `TryFrom<u32>` for decoding opcode numbers
//! - Per-opcode metadata: mnemonic, load and store arity, [`OpcodeRule`]
//!
//! # Encoding
//!
//! An instruction is an opcode number (1, 2 or 4 bytes), a block of operand
//! type nibbles (two per byte, first operand in the low nibble), then the
//! operand bytes in order. See [`decoder`] and [`encoder`].

pub mod decoder;
pub mod encoder;
pub mod handlers;
pub mod machine;
pub mod operands;
pub mod search;

/// Special decoding behaviour attached to an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeRule {
    None,
    /// Memory and local operands are 8 bits wide
    Indirect8Bit,
    /// Memory and local operands are 16 bits wide
    Indirect16Bit,
    /// One trailing store operand is handed to the handler instead of stored
    DelayedStore,
    /// Like `DelayedStore`, but the store operand comes before the last load
    Catch,
}

/// Invokes a callback macro with the complete opcode list.
///
/// Each entry is `Name = number, "mnemonic", loads, stores, rule`.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            Nop = 0x00, "nop", 0, 0, None,
            Add = 0x10, "add", 2, 1, None,
            Sub = 0x11, "sub", 2, 1, None,
            Mul = 0x12, "mul", 2, 1, None,
            Div = 0x13, "div", 2, 1, None,
            Mod = 0x14, "mod", 2, 1, None,
            Neg = 0x15, "neg", 1, 1, None,
            Bitand = 0x18, "bitand", 2, 1, None,
            Bitor = 0x19, "bitor", 2, 1, None,
            Bitxor = 0x1A, "bitxor", 2, 1, None,
            Bitnot = 0x1B, "bitnot", 1, 1, None,
            Shiftl = 0x1C, "shiftl", 2, 1, None,
            Sshiftr = 0x1D, "sshiftr", 2, 1, None,
            Ushiftr = 0x1E, "ushiftr", 2, 1, None,
            Jump = 0x20, "jump", 1, 0, None,
            Jz = 0x22, "jz", 2, 0, None,
            Jnz = 0x23, "jnz", 2, 0, None,
            Jeq = 0x24, "jeq", 3, 0, None,
            Jne = 0x25, "jne", 3, 0, None,
            Jlt = 0x26, "jlt", 3, 0, None,
            Jge = 0x27, "jge", 3, 0, None,
            Jgt = 0x28, "jgt", 3, 0, None,
            Jle = 0x29, "jle", 3, 0, None,
            Jltu = 0x2A, "jltu", 3, 0, None,
            Jgeu = 0x2B, "jgeu", 3, 0, None,
            Jgtu = 0x2C, "jgtu", 3, 0, None,
            Jleu = 0x2D, "jleu", 3, 0, None,
            Call = 0x30, "call", 2, 0, DelayedStore,
            Return = 0x31, "return", 1, 0, None,
            Catch = 0x32, "catch", 0, 0, Catch,
            Throw = 0x33, "throw", 2, 0, None,
            Tailcall = 0x34, "tailcall", 2, 0, None,
            Copy = 0x40, "copy", 1, 1, None,
            Copys = 0x41, "copys", 1, 1, Indirect16Bit,
            Copyb = 0x42, "copyb", 1, 1, Indirect8Bit,
            Sexs = 0x44, "sexs", 1, 1, None,
            Sexb = 0x45, "sexb", 1, 1, None,
            Aload = 0x48, "aload", 2, 1, None,
            Aloads = 0x49, "aloads", 2, 1, None,
            Aloadb = 0x4A, "aloadb", 2, 1, None,
            Aloadbit = 0x4B, "aloadbit", 2, 1, None,
            Astore = 0x4C, "astore", 3, 0, None,
            Astores = 0x4D, "astores", 3, 0, None,
            Astoreb = 0x4E, "astoreb", 3, 0, None,
            Astorebit = 0x4F, "astorebit", 3, 0, None,
            Stkcount = 0x50, "stkcount", 0, 1, None,
            Stkpeek = 0x51, "stkpeek", 1, 1, None,
            Stkswap = 0x52, "stkswap", 0, 0, None,
            Stkroll = 0x53, "stkroll", 2, 0, None,
            Stkcopy = 0x54, "stkcopy", 1, 0, None,
            Streamchar = 0x70, "streamchar", 1, 0, None,
            Streamnum = 0x71, "streamnum", 1, 0, None,
            Streamstr = 0x72, "streamstr", 1, 0, None,
            Streamunichar = 0x73, "streamunichar", 1, 0, None,
            Gestalt = 0x100, "gestalt", 2, 1, None,
            Debugtrap = 0x101, "debugtrap", 1, 0, None,
            Getmemsize = 0x102, "getmemsize", 0, 1, None,
            Setmemsize = 0x103, "setmemsize", 1, 1, None,
            Jumpabs = 0x104, "jumpabs", 1, 0, None,
            Random = 0x110, "random", 1, 1, None,
            Setrandom = 0x111, "setrandom", 1, 0, None,
            Quit = 0x120, "quit", 0, 0, None,
            Verify = 0x121, "verify", 0, 1, None,
            Restart = 0x122, "restart", 0, 0, None,
            Save = 0x123, "save", 1, 0, DelayedStore,
            Restore = 0x124, "restore", 1, 0, DelayedStore,
            Saveundo = 0x125, "saveundo", 0, 0, DelayedStore,
            Restoreundo = 0x126, "restoreundo", 0, 0, DelayedStore,
            Protect = 0x127, "protect", 2, 0, None,
            Glk = 0x130, "glk", 2, 1, None,
            Getstringtbl = 0x140, "getstringtbl", 0, 1, None,
            Setstringtbl = 0x141, "setstringtbl", 1, 0, None,
            Getiosys = 0x148, "getiosys", 0, 2, None,
            Setiosys = 0x149, "setiosys", 2, 0, None,
            Linearsearch = 0x150, "linearsearch", 7, 1, None,
            Binarysearch = 0x151, "binarysearch", 7, 1, None,
            Linkedsearch = 0x152, "linkedsearch", 6, 1, None,
            Callf = 0x160, "callf", 1, 0, DelayedStore,
            Callfi = 0x161, "callfi", 2, 0, DelayedStore,
            Callfii = 0x162, "callfii", 3, 0, DelayedStore,
            Callfiii = 0x163, "callfiii", 4, 0, DelayedStore,
            Mzero = 0x170, "mzero", 2, 0, None,
            Mcopy = 0x171, "mcopy", 3, 0, None,
            Malloc = 0x178, "malloc", 1, 1, None,
            Mfree = 0x179, "mfree", 1, 0, None,
            Accelfunc = 0x180, "accelfunc", 2, 0, None,
            Accelparam = 0x181, "accelparam", 2, 0, None,
            Fyrecall = 0x1000, "fyrecall", 3, 1, None,
        }
    };
}

macro_rules! define_opcodes {
    (
        $( $name:ident = $code:literal, $mnemonic:literal, $loads:literal, $stores:literal, $rule:ident ),* $(,)?
    ) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $( $name, )*
        }

        impl TryFrom<u32> for Opcode {
            type Error = u32;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $( $code => Ok(Opcode::$name), )*
                    other => Err(other),
                }
            }
        }

        impl Opcode {
            /// Every opcode, in numeric order
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            pub const fn code(&self) -> u32 {
                match self {
                    $( Opcode::$name => $code, )*
                }
            }

            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            pub const fn load_count(&self) -> usize {
                match self {
                    $( Opcode::$name => $loads, )*
                }
            }

            pub const fn store_count(&self) -> usize {
                match self {
                    $( Opcode::$name => $stores, )*
                }
            }

            pub const fn rule(&self) -> OpcodeRule {
                match self {
                    $( Opcode::$name => OpcodeRule::$rule, )*
                }
            }

            pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
                match mnemonic {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

impl Opcode {
    /// Operand type nibbles that follow the opcode number
    pub const fn operand_count(&self) -> usize {
        let base = self.load_count() + self.store_count();
        match self.rule() {
            OpcodeRule::DelayedStore => base + 1,
            OpcodeRule::Catch => base + 2,
            _ => base,
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_code_and_mnemonic() {
        assert_eq!(Opcode::try_from(0x10), Ok(Opcode::Add));
        assert_eq!(Opcode::try_from(0x1000), Ok(Opcode::Fyrecall));
        assert_eq!(Opcode::try_from(0x16), Err(0x16));
        assert_eq!(Opcode::from_mnemonic("linkedsearch"), Some(Opcode::Linkedsearch));
        assert_eq!(Opcode::from_mnemonic("fadd"), None);
    }

    #[test]
    fn test_operand_counts() {
        assert_eq!(Opcode::Call.operand_count(), 3);
        assert_eq!(Opcode::Catch.operand_count(), 2);
        assert_eq!(Opcode::Getiosys.operand_count(), 2);
        assert_eq!(Opcode::Linearsearch.operand_count(), 8);
        assert_eq!(Opcode::Saveundo.operand_count(), 1);
    }

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in Opcode::ALL.iter().enumerate() {
            for b in &Opcode::ALL[i + 1..] {
                assert_ne!(a.code(), b.code(), "{} and {}", a, b);
            }
            assert_eq!(Opcode::try_from(a.code()), Ok(*a));
            assert_eq!(Opcode::from_mnemonic(a.mnemonic()), Some(*a));
        }
    }
}

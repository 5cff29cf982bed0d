use serde::{Deserialize, Serialize};

// =============================================================================
// OP - stack machine instructions
// =============================================================================

/// One instruction of the flat compiled program.
///
/// An instruction's position in the emitted `Vec<Op>` is its jump target:
/// `Jmp`/`Jpc` payloads and `Cal` entry addresses index into that vector.
///
/// Three payload shapes:
/// - level + address (`Lod`, `Sto`, `Cal`, `Ret`); `addr` is an offset from
///   the frame base of `level` and is negative for parameters,
/// - a single value (`Lit`, `Ict`, `Jmp`, `Jpc`),
/// - no payload (arithmetic, comparison, I/O).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Push a literal value.
    Lit(i64),
    /// Push the cell at `display[level] + addr`.
    Lod { level: usize, addr: i64 },
    /// Pop into the cell at `display[level] + addr`.
    Sto { level: usize, addr: i64 },
    /// Call the function entered at instruction `addr`, declared at `level`.
    Cal { level: usize, addr: usize },
    /// Return from a `level` activation, discarding `params` argument cells.
    Ret { level: usize, params: usize },
    /// Push `n` zero cells (frame slot reservation).
    Ict(usize),
    /// Unconditional jump.
    Jmp(usize),
    /// Pop; jump if the popped value is 0.
    Jpc(usize),

    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Odd,

    Eq,
    NotEq,
    Grt,
    Lss,
    GrtEq,
    LssEq,

    /// Pop and print the decimal value.
    Wrt,
    /// Print a line break.
    Wrl,
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Lit(value) => write!(f, "LIT {}", value),
            Op::Lod { level, addr } => write!(f, "LOD {},{}", level, addr),
            Op::Sto { level, addr } => write!(f, "STO {},{}", level, addr),
            Op::Cal { level, addr } => write!(f, "CAL {},{}", level, addr),
            Op::Ret { level, params } => write!(f, "RET {},{}", level, params),
            Op::Ict(n) => write!(f, "ICT {}", n),
            Op::Jmp(target) => write!(f, "JMP {}", target),
            Op::Jpc(target) => write!(f, "JPC {}", target),
            Op::Neg => write!(f, "NEG"),
            Op::Add => write!(f, "ADD"),
            Op::Sub => write!(f, "SUB"),
            Op::Mul => write!(f, "MUL"),
            Op::Div => write!(f, "DIV"),
            Op::Odd => write!(f, "ODD"),
            Op::Eq => write!(f, "EQ"),
            Op::NotEq => write!(f, "NOTEQ"),
            Op::Grt => write!(f, "GRT"),
            Op::Lss => write!(f, "LSS"),
            Op::GrtEq => write!(f, "GRTEQ"),
            Op::LssEq => write!(f, "LSSEQ"),
            Op::Wrt => write!(f, "WRT"),
            Op::Wrl => write!(f, "WRL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mnemonics() {
        assert_eq!(Op::Lit(7).to_string(), "LIT 7");
        assert_eq!(Op::Lod { level: 1, addr: -2 }.to_string(), "LOD 1,-2");
        assert_eq!(Op::Cal { level: 0, addr: 5 }.to_string(), "CAL 0,5");
        assert_eq!(Op::Ret { level: 1, params: 1 }.to_string(), "RET 1,1");
        assert_eq!(Op::Add.to_string(), "ADD");
    }

    #[test]
    fn test_postcard_roundtrip() {
        let ops = vec![
            Op::Ict(2),
            Op::Lit(-42),
            Op::Lod { level: 1, addr: -1 },
            Op::Sto { level: 0, addr: 2 },
            Op::Cal { level: 0, addr: 3 },
            Op::Jpc(9),
            Op::Ret { level: 1, params: 2 },
            Op::Wrt,
            Op::Wrl,
        ];
        let bytes = postcard::to_allocvec(&ops).expect("serialize");
        let back: Vec<Op> = postcard::from_bytes(&bytes).expect("deserialize");
        assert_eq!(ops, back);
    }
}

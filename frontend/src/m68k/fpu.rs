//! FPU (coprocessor 1) opcode classification.
//!
//! FPU instruction bodies are not translated. The decoder only needs
//! to know which class an F-line opcode belongs to and how many
//! extension words it carries, so the F-line exception reports the
//! right instruction length.

use super::decode::Decoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuOp {
    /// cpGEN with its command word.
    General { opclass: u8, command: u16 },
    Scc,
    Dbcc,
    Trapcc,
    Branch { long: bool },
    Save,
    Restore,
}

/// Operand bytes of an immediate source in FPU data format `fmt`.
const fn format_bytes(fmt: u16) -> u32 {
    match fmt & 7 {
        0 | 1 => 4, // long, single
        2 | 3 => 12, // extended, packed
        4 => 2,     // word
        5 => 8,     // double
        _ => 2,     // byte
    }
}

/// Classify the F-line opcode `op` and consume its extension words.
pub(super) fn classify(d: &mut Decoder<'_>, op: u16) -> Option<FpuOp> {
    let mode = (op >> 3) & 7;
    let reg = op & 7;

    match (op >> 6) & 7 {
        0 => {
            let command = d.word();
            let opclass = (command >> 13) as u8;
            match opclass {
                // register to register
                0 => {}
                // <ea> to register; FMOVECR has no operand
                2 => {
                    let fmt = (command >> 10) & 7;
                    if fmt != 7 {
                        d.skip_ea(mode, reg, format_bytes(fmt))?;
                    }
                }
                // register to <ea>
                3 => d.skip_ea(mode, reg, 0)?,
                // <ea> to control registers: one long per selected register
                4 => {
                    let count = ((command >> 10) & 7).count_ones().max(1);
                    d.skip_ea(mode, reg, 4 * count)?;
                }
                5..=7 => d.skip_ea(mode, reg, 0)?,
                _ => return None,
            }
            Some(FpuOp::General { opclass, command })
        }
        1 => {
            let _condition = d.word();
            match (mode, reg) {
                (1, _) => {
                    d.word();
                    Some(FpuOp::Dbcc)
                }
                (7, 2) => {
                    d.word();
                    Some(FpuOp::Trapcc)
                }
                (7, 3) => {
                    d.long();
                    Some(FpuOp::Trapcc)
                }
                (7, 4) => Some(FpuOp::Trapcc),
                _ => {
                    d.skip_ea(mode, reg, 2)?;
                    Some(FpuOp::Scc)
                }
            }
        }
        2 => {
            d.word();
            Some(FpuOp::Branch { long: false })
        }
        3 => {
            d.long();
            Some(FpuOp::Branch { long: true })
        }
        4 => {
            d.skip_ea(mode, reg, 0)?;
            Some(FpuOp::Save)
        }
        5 => {
            d.skip_ea(mode, reg, 0)?;
            Some(FpuOp::Restore)
        }
        _ => None,
    }
}

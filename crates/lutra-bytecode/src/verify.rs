//! Whole-program compression round-trip check
//!
//! Runs every block of every function body through the stream codec and
//! swaps the decoded instructions in place of the originals. Any difference
//! between the two is a codec bug, so it aborts with a dump of both versions.

use std::fmt::Write as _;
use std::mem;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::info;

use crate::compression::{decode_bytecode_vec, encode_bytecode_vec};
use crate::instruction::{BytecodeVec, Instruction};
use crate::opcode::Opcode;
use crate::program::{Func, Program};
use crate::varint::Buffer;

/// Aggregate statistics from [`test_compression`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompressionReport {
    /// Blocks checked
    pub blocks: usize,
    /// Instructions checked
    pub instructions: usize,
    /// In-memory size of the instructions, in bytes
    pub full_size: usize,
    /// Encoded size, in bytes
    pub compressed_size: usize,
    /// Instruction count per opcode
    pub histogram: FxHashMap<Opcode, u64>,
}

impl CompressionReport {
    /// Full size over compressed size
    pub fn ratio(&self) -> f64 {
        self.full_size as f64 / self.compressed_size.max(1) as f64
    }

    /// Render the report as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn record(&mut self, insns: &[Instruction], compressed: usize) {
        self.blocks += 1;
        self.instructions += insns.len();
        self.full_size += insns.len() * mem::size_of::<Instruction>();
        self.compressed_size += compressed;
        for insn in insns {
            *self.histogram.entry(insn.op).or_default() += 1;
        }
    }
}

fn show_block(func: &Func, index: usize, insns: &[Instruction]) -> String {
    let mut out = format!("{} B{index}:\n", func.name);
    for insn in insns {
        let _ = writeln!(out, "  {insn}");
    }
    out
}

fn check_function(func: &mut Func, buffer: &mut Buffer, report: &mut CompressionReport) {
    let mut original = BytecodeVec::new();
    for index in 0..func.blocks.len() {
        buffer.clear();
        if let Err(err) = encode_bytecode_vec(buffer, &func.blocks[index].instructions) {
            panic!("test_compression: encoding {} B{index} failed: {err}", func.name);
        }
        let decoded = match decode_bytecode_vec(buffer) {
            Ok(decoded) => decoded,
            Err(err) => panic!("test_compression: decoding {} B{index} failed: {err}", func.name),
        };
        original.clear();
        original.extend(mem::replace(&mut func.blocks[index].instructions, decoded));

        let current = &func.blocks[index].instructions;
        assert!(
            original.len() == current.len(),
            "test_compression\nOriginal:\n\n{}\nFinal:\n\n{}",
            show_block(func, index, &original),
            show_block(func, index, current),
        );
        for (old, new) in original.iter().zip(current) {
            assert!(
                old == new,
                "test_compression_bytecode\nOriginal:\n{old}\n\nFinal:\n{new}"
            );
        }
        report.record(current, buffer.len());
    }
}

/// Round-trip every block of `program` through the codec
///
/// Blocks are replaced by their decoded copies. Panics if any block does not
/// survive the round trip unchanged.
pub fn test_compression(program: &mut Program) -> CompressionReport {
    let mut report = CompressionReport::default();
    let mut buffer = Buffer::new();
    for unit in &mut program.units {
        for func in unit.bodies_mut() {
            check_function(func, &mut buffer, &mut report);
        }
    }
    info!(
        blocks = report.blocks,
        instructions = report.instructions,
        full_size = report.full_size,
        compressed_size = report.compressed_size,
        "Overall compression ratio: {:.2}",
        report.ratio()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Immediate;
    use crate::program::Unit;

    #[test]
    fn test_empty_program() {
        let report = test_compression(&mut Program::default());
        assert_eq!(report.blocks, 0);
        assert_eq!(report.ratio(), 0.0);
    }

    #[test]
    fn test_report_counts() {
        let func = Func::builder("f")
            .block([
                Instruction::new(Opcode::Int).imm(Immediate::I64(1)),
                Instruction::new(Opcode::RetC),
            ])
            .block([])
            .build();
        let mut program = Program::new(vec![Unit::builder("u").func(func).build()]);
        let report = test_compression(&mut program);

        assert_eq!(report.blocks, 2);
        assert_eq!(report.instructions, 2);
        assert_eq!(report.full_size, 2 * mem::size_of::<Instruction>());
        // [2, Int, 0, i64 x8, RetC, 0] + [0]
        assert_eq!(report.compressed_size, 13 + 1);
        assert_eq!(report.histogram.get(&Opcode::Int), Some(&1));
        assert!(report.ratio() > 1.0);
    }
}

//! Code frames: one compiled function/method/top-level scope and its
//! version-gated wire layout.

use crate::instruction::Instruction;
use crate::io::{ByteReader, ByteWriter};
use crate::symbol::{Symbol, SymbolTable};
use crate::{CodecError, CodecResult, FormatVersion};

/// Metadata plus the ordered instruction list of one compiled scope.
///
/// Nested frames live inside `FUNCTION_DEFINE`/`METHOD_DEFINE` payloads and
/// are exclusively owned by the defining instruction. Instruction order is
/// both the wire order and the order a structural walk visits.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodeFrame {
    /// Source file the frame was compiled from, when debug info is kept.
    pub source_file: Option<Symbol>,
    /// Function parameters, in declaration order.
    pub parameters: Vec<Symbol>,
    /// Variables captured from the enclosing scope (closures).
    pub captured: Vec<Symbol>,
    /// Maximum operand stack depth needed to run the frame.
    pub max_stack_size: u32,
    /// Size of the variable heap.
    pub variable_heap_size: u32,
    /// Extra storage for static-scope variables (v11+ containers; the
    /// front-end leaves this at 0).
    pub static_storage_size: u32,
    /// The frame's instructions, in wire order.
    pub instructions: Vec<Instruction>,
}

impl CodeFrame {
    /// Creates an empty frame.
    pub fn new() -> Self { Self::default() }

    /// Total number of instructions including nested frames.
    pub fn instruction_count_deep(&self) -> usize {
        let mut count = self.instructions.len();
        for ins in &self.instructions {
            if let Some(sub) = ins.op.nested_frame() {
                count += sub.instruction_count_deep();
            }
        }
        count
    }

    /// Serializes the frame. `debug_info` is the generation-wide flag echoed
    /// into every frame header.
    pub(crate) fn write(
        &self,
        w: &mut ByteWriter,
        version: FormatVersion,
        debug_info: bool,
        table: &SymbolTable,
    ) -> CodecResult<()> {
        w.write_bool(debug_info);
        w.write_u8(version.get());

        if version.has_source_file_field() && debug_info {
            match &self.source_file {
                Some(sym) => {
                    let id = table.id_of(sym).ok_or_else(|| CodecError::SymbolNotInterned {
                        name: sym.as_str().to_owned(),
                    })?;
                    w.write_varint(id);
                }
                // Id 0 doubles as the "no source file" marker.
                None => w.write_varint(0),
            }
        }

        if version.has_frame_padding() {
            w.write_u8(0);
        }

        w.write_u32_be(self.parameters.len() as u32);
        for (i, sym) in self.parameters.iter().enumerate() {
            table.write_ref(w, version, sym)?;
            w.write_u32_be(i as u32 + 1);
        }

        w.write_u32_be(self.captured.len() as u32);
        for (i, sym) in self.captured.iter().enumerate() {
            table.write_ref(w, version, sym)?;
            w.write_u32_be(i as u32 + 1);
        }

        w.write_u32_be(0); // reserved

        w.write_u32_be(self.max_stack_size);
        w.write_u32_be(self.variable_heap_size);
        if version.split_static_storage() {
            w.write_u32_be(self.static_storage_size);
        }

        w.write_u32_be(self.instructions.len() as u32);
        for ins in &self.instructions {
            ins.write(w, version, debug_info, table)?;
        }
        Ok(())
    }

    /// Deserializes a frame, returning it together with its debug-info flag.
    ///
    /// There is no end-of-frame marker; the instruction count alone bounds
    /// the list, and recursion into nested frames.
    pub(crate) fn read(
        r: &mut ByteReader<'_>,
        version: FormatVersion,
        table: &SymbolTable,
    ) -> CodecResult<(Self, bool)> {
        let head = r.offset();
        let debug_info = r.read_bool()?;
        let echo = r.read_u8()?;
        if echo != version.get() {
            return Err(CodecError::Corrupted {
                at: head,
                reason: "frame version echo does not match container version",
            });
        }

        let source_file = if version.has_source_file_field() && debug_info {
            let at = r.offset();
            let id = r.read_varint()?;
            if id == 0 {
                None
            } else {
                Some(table.get(id).cloned().ok_or(CodecError::SymbolIndexOutOfRange {
                    at,
                    id,
                    len: table.len(),
                })?)
            }
        } else {
            None
        };

        if version.has_frame_padding() {
            let _ = r.read_u8()?;
        }

        let parameter_count = r.read_u32_be()?;
        let mut parameters = Vec::new();
        for _ in 0..parameter_count {
            parameters.push(table.read_ref(r, version)?);
            let _slot = r.read_u32_be()?; // 1-based, regenerated on write
        }

        let captured_count = r.read_u32_be()?;
        let mut captured = Vec::new();
        for _ in 0..captured_count {
            captured.push(table.read_ref(r, version)?);
            let _slot = r.read_u32_be()?;
        }

        let _reserved = r.read_u32_be()?;

        let max_stack_size = r.read_u32_be()?;
        let variable_heap_size = r.read_u32_be()?;
        let static_storage_size =
            if version.split_static_storage() { r.read_u32_be()? } else { 0 };

        let instruction_count = r.read_u32_be()?;
        let mut instructions = Vec::new();
        for _ in 0..instruction_count {
            instructions.push(Instruction::read(r, version, table)?);
        }

        Ok((
            Self {
                source_file,
                parameters,
                captured,
                max_stack_size,
                variable_heap_size,
                static_storage_size,
                instructions,
            },
            debug_info,
        ))
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Op;
    use pretty_assertions::assert_eq;

    fn version(v: u8) -> FormatVersion { FormatVersion::from_raw(u32::from(v)).unwrap() }

    fn sample_frame() -> CodeFrame {
        let mut frame = CodeFrame::new();
        frame.source_file = Some(Symbol::new("projects/menu.ad"));
        frame.parameters = vec![Symbol::new("context"), Symbol::new("args")];
        frame.captured = vec![Symbol::new("self")];
        frame.max_stack_size = 6;
        frame.variable_heap_size = 4;
        frame.instructions = vec![
            Instruction::new(1, Op::SourceFile(Symbol::new("projects/menu.ad"))),
            Instruction::new(3, Op::IntConst(-7)),
            Instruction::new(3, Op::Pop),
        ];
        frame
    }

    fn roundtrip(frame: &CodeFrame, v: u8, debug_info: bool) -> (CodeFrame, bool) {
        let version = version(v);
        let table = SymbolTable::collect(frame);
        let mut w = ByteWriter::new();
        frame.write(&mut w, version, debug_info, &table).unwrap();
        let bytes = w.into_vec();
        let mut r = ByteReader::new(&bytes);
        let out = CodeFrame::read(&mut r, version, &table).unwrap();
        assert_eq!(r.remaining(), 0);
        out
    }

    #[test]
    fn roundtrip_every_version() {
        let frame = sample_frame();
        for v in 8..=12u8 {
            let (back, debug) = roundtrip(&frame, v, true);
            assert!(debug);
            let mut expected = frame.clone();
            // The source-file reference only exists on the wire above v9.
            if !version(v).has_source_file_field() {
                expected.source_file = None;
            }
            assert_eq!(back, expected, "version {v}");
        }
    }

    #[test]
    fn roundtrip_without_debug_info_drops_source_file() {
        let frame = sample_frame();
        let (back, debug) = roundtrip(&frame, 12, false);
        assert!(!debug);
        // The source-file field is only written when debug info is present.
        assert_eq!(back.source_file, None);
        assert_eq!(back.parameters, frame.parameters);
        assert_eq!(back.instructions, frame.instructions);
    }

    #[test]
    fn static_storage_is_version_gated() {
        let mut frame = sample_frame();
        frame.static_storage_size = 9;
        let (back_v10, _) = roundtrip(&frame, 10, true);
        assert_eq!(back_v10.static_storage_size, 0);
        let (back_v11, _) = roundtrip(&frame, 11, true);
        assert_eq!(back_v11.static_storage_size, 9);
    }

    #[test]
    fn version_echo_mismatch_is_fatal() {
        let frame = sample_frame();
        let table = SymbolTable::collect(&frame);
        let mut w = ByteWriter::new();
        frame.write(&mut w, version(12), true, &table).unwrap();
        let bytes = w.into_vec();
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(
            CodeFrame::read(&mut r, version(11), &table),
            Err(CodecError::Corrupted { at: 0, .. })
        ));
    }

    #[test]
    fn source_file_at_id_zero_reads_back_as_absent() {
        // Wire-level limitation: id 0 is the "none" marker, so a source file
        // that happens to be table entry 0 cannot be expressed. Real tables
        // reference other symbols first.
        let mut frame = CodeFrame::new();
        frame.source_file = Some(Symbol::new("lonely.ad"));
        let (back, _) = roundtrip(&frame, 12, true);
        assert_eq!(back.source_file, None);
    }

    #[test]
    fn truncated_frame_reports_offset() {
        let frame = sample_frame();
        let table = SymbolTable::collect(&frame);
        let mut w = ByteWriter::new();
        frame.write(&mut w, version(12), true, &table).unwrap();
        let bytes = w.into_vec();
        for len in [1, 6, 14, bytes.len() - 1] {
            let mut r = ByteReader::new(&bytes[..len]);
            assert!(
                matches!(
                    CodeFrame::read(&mut r, version(12), &table),
                    Err(CodecError::TruncatedInput { .. })
                ),
                "prefix of {len} bytes"
            );
        }
    }

    #[test]
    fn deep_count_includes_nested_frames() {
        let mut inner = CodeFrame::new();
        inner.instructions.push(Instruction::new(5, Op::VoidConst));
        let mut frame = CodeFrame::new();
        frame.instructions.push(Instruction::new(4, Op::FunctionDefine {
            name: Symbol::new("f"),
            frame: Box::new(inner),
        }));
        frame.instructions.push(Instruction::new(6, Op::Pop));
        assert_eq!(frame.instruction_count_deep(), 3);
    }
}

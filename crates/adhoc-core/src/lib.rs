//! adhoc-core — codec for the `ADCH` bytecode container.
//!
//! Turns an in-memory tree of code frames (metadata + ordered instruction
//! lists, nested through function/method definitions) into the versioned
//! binary container and back, and renders a decoded tree as structurally
//! annotated text.
//!
//! Container layout (big-endian fixed-width fields unless noted):
//! ```text
//! bytes[0..4)  "ADCH"
//! bytes[4..7)  ASCII version, zero-padded to 3 digits ("008".."012")
//! byte[7]      0x00
//! [ version >= 9: symbol table — varint count, then varint-length names ]
//! root code frame (see `frame` for the per-frame layout)
//! ```
//!
//! Pre-v9 containers carry no symbol table and spell every symbol out inline
//! at its point of use; v9+ containers reference the table by varint id.
//! Both the frame and instruction codecs branch on the version through
//! [`FormatVersion`]'s predicates, so encode and decode cannot disagree.
//!
//! The codec trusts its input semantically (jump targets, operator tokens
//! and slot indices are not validated); wire-level faults are fatal and
//! reported with the byte offset where decoding stopped.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

use thiserror::Error;

pub mod disasm;
pub mod frame;
pub mod instruction;
pub mod io;
pub mod symbol;

pub use frame::CodeFrame;
pub use instruction::{Instruction, Op, RunState};
pub use symbol::{Symbol, SymbolTable};

use io::{ByteReader, ByteWriter};

/* ─────────────────────────── Result / errors ─────────────────────────── */

/// Result alias used across the codec.
pub type CodecResult<T> = Result<T, CodecError>;

/// Fatal codec failures. No partial results: generation and decoding are
/// all-or-nothing over one container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The 8-byte header is not an `ADCH` header.
    #[error("malformed header at byte {at}: {reason}")]
    MalformedHeader {
        /// Offset of the offending header byte.
        at: usize,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// The header's version is outside the handled range.
    #[error("unsupported container version {version} (supported: 8..=12)")]
    UnsupportedVersion {
        /// Version as parsed from the header digits.
        version: u32,
    },
    /// A fixed-width field or varint ran past the end of the buffer.
    #[error("truncated input at offset {at}: {needed} more byte(s) needed")]
    TruncatedInput {
        /// Offset where the read started failing.
        at: usize,
        /// How many bytes were missing.
        needed: usize,
    },
    /// Decode dispatch hit an opcode byte outside the closed set.
    #[error("unknown instruction kind 0x{kind:02X} at offset {at}")]
    UnknownInstructionKind {
        /// Offset of the opcode byte.
        at: usize,
        /// The unassigned byte.
        kind: u8,
    },
    /// A symbol id pointed beyond the table.
    #[error("symbol id {id} out of range at offset {at} (table holds {len})")]
    SymbolIndexOutOfRange {
        /// Offset of the reference.
        at: usize,
        /// The out-of-range id.
        id: u32,
        /// Number of table entries.
        len: usize,
    },
    /// The structural walk popped a scope label off an empty stack.
    #[error("structural inconsistency at instruction {index}: {reason}")]
    StructuralInconsistency {
        /// In-frame index of the faulting instruction.
        index: usize,
        /// What went structurally wrong.
        reason: &'static str,
    },
    /// A wire-validity fault: overlong varint, bad boolean or run-state
    /// byte, frame version-echo mismatch, invalid inline-symbol UTF-8.
    #[error("corrupted container at offset {at}: {reason}")]
    Corrupted {
        /// Offset of the offending bytes.
        at: usize,
        /// What was wrong with them.
        reason: &'static str,
    },
    /// Encode-side guard: a symbol reference was not in the build table.
    #[error("symbol `{name}` missing from the symbol table")]
    SymbolNotInterned {
        /// The unregistered name.
        name: String,
    },
    /// File-level convenience IO failed.
    #[error("i/o error: {0}")]
    Io(String),
}

/* ─────────────────────────── Format version ─────────────────────────── */

/// Container magic.
pub const MAGIC: &[u8; 4] = b"ADCH";

/// A validated container format version.
///
/// Fixed once per container and threaded through every layout decision; the
/// predicates below are the only places the codec branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion(u8);

impl FormatVersion {
    /// Oldest handled version.
    pub const MIN: Self = Self(8);
    /// Newest handled version.
    pub const MAX: Self = Self(12);

    /// Validates a raw header version.
    pub fn from_raw(version: u32) -> CodecResult<Self> {
        if (u32::from(Self::MIN.0)..=u32::from(Self::MAX.0)).contains(&version) {
            Ok(Self(version as u8))
        } else {
            Err(CodecError::UnsupportedVersion { version })
        }
    }

    /// The raw version number.
    pub fn get(self) -> u8 { self.0 }

    /// v9+ containers carry a deduplicated symbol table.
    pub fn has_symbol_table(self) -> bool { self.0 >= 9 }

    /// Up to v8, every symbol use spells the name out inline.
    pub fn inline_symbols(self) -> bool { self.0 <= 8 }

    /// Above v9, frames reference their source file by symbol id.
    pub fn has_source_file_field(self) -> bool { self.0 > 9 }

    /// v12 adds a reserved byte to the frame header.
    pub fn has_frame_padding(self) -> bool { self.0 >= 12 }

    /// Above v10, static-variable storage is sized separately from the heap.
    pub fn split_static_storage(self) -> bool { self.0 > 10 }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/* ─────────────────────────── Container ─────────────────────────── */

/// A fully decoded container: header version, generation debug flag, the
/// symbol table as read (empty for pre-v9 input) and the root frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    /// Format version from the header.
    pub version: FormatVersion,
    /// Whether the container was generated with debug information.
    pub debug_info: bool,
    /// The symbol table, in id order.
    pub symbols: SymbolTable,
    /// The top-level code frame.
    pub root: CodeFrame,
}

impl Container {
    /// Serializes a frame tree into container bytes.
    ///
    /// Builds the symbol table (v9+) in one pass over the tree, then writes
    /// header, table and frames against it. The input tree is not mutated.
    pub fn generate(
        root: &CodeFrame,
        version: FormatVersion,
        debug_info: bool,
    ) -> CodecResult<Vec<u8>> {
        let mut w = ByteWriter::new();
        w.write_bytes(MAGIC);
        let digits = format!("{:03}", version.get());
        w.write_bytes(digits.as_bytes());
        w.write_u8(0);

        let table = if version.has_symbol_table() {
            let table = SymbolTable::collect(root);
            table.write_table(&mut w);
            table
        } else {
            SymbolTable::new()
        };
        root.write(&mut w, version, debug_info, &table)?;
        Ok(w.into_vec())
    }

    /// Serializes this container (inverse of [`Container::from_bytes`] up to
    /// symbol-id assignment, which is rebuilt from the tree).
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        Self::generate(&self.root, self.version, self.debug_info)
    }

    /// Decodes a container from bytes. The buffer is not modified; the
    /// returned tree is freshly built.
    pub fn from_bytes(data: &[u8]) -> CodecResult<Self> {
        let mut r = ByteReader::new(data);
        let header = r.read_bytes(8)?;
        if &header[..4] != MAGIC {
            return Err(CodecError::MalformedHeader { at: 0, reason: "magic does not match ADCH" });
        }
        let digits = &header[4..7];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(CodecError::MalformedHeader {
                at: 4,
                reason: "version is not three ASCII digits",
            });
        }
        if header[7] != 0 {
            return Err(CodecError::MalformedHeader {
                at: 7,
                reason: "header terminator is not NUL",
            });
        }
        let raw = digits.iter().fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
        let version = FormatVersion::from_raw(raw)?;

        let symbols = if version.has_symbol_table() {
            SymbolTable::read_table(&mut r)?
        } else {
            SymbolTable::new()
        };
        let (root, debug_info) = CodeFrame::read(&mut r, version, &symbols)?;
        if r.remaining() != 0 {
            return Err(CodecError::Corrupted { at: r.offset(), reason: "trailing bytes" });
        }
        Ok(Self { version, debug_info, symbols, root })
    }

    /// Writes the container to a file.
    pub fn write_file<P: AsRef<std::path::Path>>(&self, path: P) -> CodecResult<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|e| CodecError::Io(e.to_string()))
    }

    /// Reads a container from a file.
    pub fn read_file<P: AsRef<std::path::Path>>(path: P) -> CodecResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| CodecError::Io(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

/// Decodes a container and renders its annotated disassembly in one step.
pub fn disassemble(data: &[u8]) -> CodecResult<(Container, String)> {
    let container = Container::from_bytes(data)?;
    let text = disasm::disassemble_full(&container, "container", false)?;
    Ok((container, text))
}

/* ─────────────────────────── Prelude ─────────────────────────── */

/// Compact imports for codec consumers.
pub mod prelude {
    pub use super::{
        disassemble, CodeFrame, CodecError, CodecResult, Container, FormatVersion, Instruction,
        Op, RunState, Symbol, SymbolTable, MAGIC,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn version(v: u8) -> FormatVersion { FormatVersion::from_raw(u32::from(v)).unwrap() }

    fn sample_root() -> CodeFrame {
        let mut inner = CodeFrame::new();
        inner.parameters.push(Symbol::new("n"));
        inner.max_stack_size = 2;
        inner.variable_heap_size = 1;
        inner.instructions = vec![
            Instruction::new(4, Op::VariableEval { path: vec![Symbol::new("n")], slot: 1 }),
            Instruction::new(4, Op::IntConst(1)),
            Instruction::new(4, Op::BinaryOperator(Symbol::new("+"))),
            Instruction::new(4, Op::SetState(RunState::Return)),
        ];

        let mut root = CodeFrame::new();
        root.source_file = Some(Symbol::new("scripts/boot.ad"));
        root.max_stack_size = 8;
        root.variable_heap_size = 3;
        root.instructions = vec![
            Instruction::new(1, Op::SourceFile(Symbol::new("scripts/boot.ad"))),
            Instruction::new(2, Op::ModuleDefine { path: vec![Symbol::new("boot")] }),
            Instruction::new(3, Op::Import {
                path: vec![Symbol::new("system")],
                target: Symbol::new("*"),
            }),
            Instruction::new(4, Op::FunctionDefine {
                name: Symbol::new("increment"),
                frame: Box::new(inner),
            }),
            Instruction::new(6, Op::StringConst(Symbol::new("ready"))),
            Instruction::new(6, Op::Pop),
            Instruction::new(7, Op::SetState(RunState::Exit)),
            Instruction::new(7, Op::SetState(RunState::Exit)),
        ];
        root
    }

    #[test]
    fn roundtrip_every_supported_version() {
        let root = sample_root();
        for v in 8..=12u8 {
            let bytes = Container::generate(&root, version(v), true).unwrap();
            let back = Container::from_bytes(&bytes).unwrap();
            assert_eq!(back.version, version(v));
            assert!(back.debug_info);
            let mut expected = root.clone();
            // The source-file reference only exists on the wire above v9.
            if !version(v).has_source_file_field() {
                expected.source_file = None;
            }
            assert_eq!(back.root, expected, "version {v}");
            // Decoding is deterministic over the same buffer.
            assert_eq!(Container::from_bytes(&bytes).unwrap(), back);
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let root = sample_root();
        let a = Container::generate(&root, version(12), true).unwrap();
        let b = Container::generate(&root, version(12), true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn v8_inlines_symbols_and_writes_no_table() {
        let mut root = CodeFrame::new();
        root.instructions.push(Instruction::new(1, Op::StringConst(Symbol::new("marker"))));
        let bytes = Container::generate(&root, version(8), false).unwrap();
        // Directly after the 8-byte header: the frame, not a table. The
        // frame starts with the debug flag and the version echo.
        assert_eq!(&bytes[8..10], [0x00, 0x08]);
        // The name appears spelled out exactly once.
        let needle = b"marker";
        let count = bytes.windows(needle.len()).filter(|w| w == needle).count();
        assert_eq!(count, 1);

        let back = Container::from_bytes(&bytes).unwrap();
        assert!(back.symbols.is_empty());
        assert_eq!(back.root, root);
    }

    #[test]
    fn v9_emits_one_table_and_references_by_id() {
        let mut root = CodeFrame::new();
        root.instructions.push(Instruction::new(1, Op::StringConst(Symbol::new("marker"))));
        root.instructions.push(Instruction::new(2, Op::StringConst(Symbol::new("marker"))));
        let bytes = Container::generate(&root, version(9), false).unwrap();
        // One table entry, spelled out exactly once even though it is
        // referenced twice.
        let needle = b"marker";
        let count = bytes.windows(needle.len()).filter(|w| w == needle).count();
        assert_eq!(count, 1);
        assert_eq!(bytes[8], 1); // table entry count
        let back = Container::from_bytes(&bytes).unwrap();
        assert_eq!(back.symbols.len(), 1);
        assert_eq!(back.root, root);
    }

    #[test]
    fn end_to_end_v12_layout_is_byte_exact() {
        let mut root = CodeFrame::new();
        root.max_stack_size = 1;
        root.instructions = vec![
            Instruction::new(1, Op::IntConst(42)),
            Instruction::new(1, Op::Pop),
        ];
        let bytes = Container::generate(&root, version(12), true).unwrap();

        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            b'A', b'D', b'C', b'H', b'0', b'1', b'2', 0x00, // header
            0x00,                                           // empty symbol table
            0x01, 0x0C,                                     // debug flag, version echo
            0x00,                                           // no source file
            0x00,                                           // reserved (v12)
            0x00, 0x00, 0x00, 0x00,                         // parameter count
            0x00, 0x00, 0x00, 0x00,                         // captured count
            0x00, 0x00, 0x00, 0x00,                         // reserved
            0x00, 0x00, 0x00, 0x01,                         // max stack size
            0x00, 0x00, 0x00, 0x00,                         // variable heap size
            0x00, 0x00, 0x00, 0x00,                         // static storage size
            0x00, 0x00, 0x00, 0x02,                         // instruction count
            0x00, 0x00, 0x00, 0x01, 0x03,                   // line 1, INT_CONST
            0x00, 0x00, 0x00, 0x2A,                         //   value 42
            0x00, 0x00, 0x00, 0x01, 0x52,                   // line 1, POP
        ];
        assert_eq!(bytes, expected);

        let back = Container::from_bytes(&bytes).unwrap();
        assert!(back.debug_info);
        assert_eq!(back.root, root);
    }

    #[test]
    fn header_faults_are_precise() {
        let good = Container::generate(&CodeFrame::new(), version(12), false).unwrap();

        let mut bad_magic = good.clone();
        bad_magic[0] = b'X';
        assert_eq!(
            Container::from_bytes(&bad_magic).unwrap_err(),
            CodecError::MalformedHeader { at: 0, reason: "magic does not match ADCH" }
        );

        let mut bad_digits = good.clone();
        bad_digits[5] = b'x';
        assert_eq!(
            Container::from_bytes(&bad_digits).unwrap_err(),
            CodecError::MalformedHeader { at: 4, reason: "version is not three ASCII digits" }
        );

        let mut bad_nul = good.clone();
        bad_nul[7] = 0x20;
        assert_eq!(
            Container::from_bytes(&bad_nul).unwrap_err(),
            CodecError::MalformedHeader { at: 7, reason: "header terminator is not NUL" }
        );

        for raw in ["007", "013", "099"] {
            let mut bad_version = good.clone();
            bad_version[4..7].copy_from_slice(raw.as_bytes());
            assert!(matches!(
                Container::from_bytes(&bad_version).unwrap_err(),
                CodecError::UnsupportedVersion { .. }
            ));
        }

        assert!(matches!(
            Container::from_bytes(&good[..5]).unwrap_err(),
            CodecError::TruncatedInput { .. }
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = Container::generate(&CodeFrame::new(), version(12), false).unwrap();
        let end = bytes.len();
        bytes.push(0xAA);
        assert_eq!(
            Container::from_bytes(&bytes).unwrap_err(),
            CodecError::Corrupted { at: end, reason: "trailing bytes" }
        );
    }

    #[test]
    fn truncation_is_fatal_at_every_prefix() {
        let root = sample_root();
        let bytes = Container::generate(&root, version(12), true).unwrap();
        // Any strict prefix must fail; most with TruncatedInput, never a
        // panic or a silently short tree.
        for len in (8..bytes.len()).step_by(7) {
            assert!(Container::from_bytes(&bytes[..len]).is_err(), "prefix {len}");
        }
    }

    #[test]
    fn disassemble_renders_decoded_tree() {
        let root = sample_root();
        let bytes = Container::generate(&root, version(12), true).unwrap();
        let (container, text) = disassemble(&bytes).unwrap();
        assert_eq!(container.root, root);
        assert!(text.contains("MODULE_DEFINE - boot"));
        assert!(text.contains("FUNCTION_DEFINE - increment (1 params)"));
        assert!(text.contains("[EXIT boot]"));
        assert!(text.contains("[EXIT TopLevel]"));
    }

    #[test]
    fn version_predicates_gate_like_the_wire() {
        assert!(FormatVersion::from_raw(7).is_err());
        assert!(FormatVersion::from_raw(13).is_err());
        let v8 = version(8);
        assert!(v8.inline_symbols() && !v8.has_symbol_table());
        let v9 = version(9);
        assert!(v9.has_symbol_table() && !v9.has_source_file_field());
        let v10 = version(10);
        assert!(v10.has_source_file_field() && !v10.split_static_storage());
        let v11 = version(11);
        assert!(v11.split_static_storage() && !v11.has_frame_padding());
        let v12 = version(12);
        assert!(v12.has_frame_padding());
    }
}

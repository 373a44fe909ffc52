//! Interned symbols and the per-container symbol table.
//!
//! A [`Symbol`] is a shared, immutable name. The [`SymbolTable`] owns one
//! allocation per distinct name and hands out cheap handles; everything else
//! (frames, instruction payloads) holds those handles. Ids are dense 0-based
//! insertion indices assigned by a fixed first-seen walk of the frame tree,
//! which is what makes generation deterministic.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::frame::CodeFrame;
use crate::instruction::Op;
use crate::io::{ByteReader, ByteWriter};
use crate::{CodecError, CodecResult, FormatVersion};

/* ─────────────────────────── Symbol ─────────────────────────── */

/// An interned identifier, operator token, path segment or string literal.
///
/// Compares, orders and hashes by name. Clones share the underlying
/// allocation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Creates a standalone symbol (outside any table).
    pub fn new(name: &str) -> Self { Self(Arc::from(name)) }

    /// The symbol's name.
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self { Self::new(name) }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self { Self(Arc::from(name)) }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str { &self.0 }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Symbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Symbol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Symbol::from)
    }
}

/* ─────────────────────────── Table ─────────────────────────── */

/// Insertion-ordered name → dense id mapping, written once per container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    entries: IndexSet<Symbol>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self { Self { entries: IndexSet::new() } }

    /// Number of entries.
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Entry by id.
    pub fn get(&self, id: u32) -> Option<&Symbol> { self.entries.get_index(id as usize) }

    /// Id of a symbol already in the table.
    pub fn id_of(&self, sym: &Symbol) -> Option<u32> {
        self.entries.get_index_of(sym.as_str()).map(|i| i as u32)
    }

    /// Iterates entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> { self.entries.iter() }

    /// Interns a name, returning the shared handle.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(sym) = self.entries.get(name) {
            return sym.clone();
        }
        let sym = Symbol::new(name);
        self.entries.insert(sym.clone());
        sym
    }

    /// Records an existing handle, keeping its allocation shared.
    fn observe(&mut self, sym: &Symbol) {
        if !self.entries.contains(sym.as_str()) {
            self.entries.insert(sym.clone());
        }
    }

    /// Builds the table for a generation pass with a deterministic walk of
    /// the frame tree: parameters, captured variables, instruction payloads
    /// in order (recursing into nested frames at the defining instruction),
    /// then the frame's source file.
    pub fn collect(root: &CodeFrame) -> Self {
        let mut table = Self::new();
        table.collect_frame(root);
        table
    }

    fn collect_frame(&mut self, frame: &CodeFrame) {
        for sym in &frame.parameters {
            self.observe(sym);
        }
        for sym in &frame.captured {
            self.observe(sym);
        }
        for ins in &frame.instructions {
            self.collect_op(&ins.op);
        }
        // Visited last: id 0 doubles as the "no source file" wire marker, so
        // the path must never be the first entry of a table that holds
        // anything else.
        if let Some(src) = &frame.source_file {
            self.observe(src);
        }
    }

    fn collect_op(&mut self, op: &Op) {
        use Op::*;
        match op {
            StringConst(sym) | AttributeDefine(sym) | StaticDefine(sym) | SourceFile(sym)
            | UnaryOperator(sym) | BinaryOperator(sym) | UnaryAssignOperator(sym)
            | BinaryAssignOperator(sym) => self.observe(sym),
            VariableEval { path, .. } | VariablePush { path, .. } | AttributeEval { path }
            | AttributePush { path } | ModuleDefine { path } => {
                for sym in path {
                    self.observe(sym);
                }
            }
            ClassDefine { name, parents } => {
                self.observe(name);
                for sym in parents {
                    self.observe(sym);
                }
            }
            FunctionDefine { name, frame } | MethodDefine { name, frame } => {
                self.observe(name);
                self.collect_frame(frame);
            }
            Import { path, target } => {
                for sym in path {
                    self.observe(sym);
                }
                self.observe(target);
                // The import record carries a trailing "nil" sentinel.
                self.intern("nil");
            }
            _ => {}
        }
    }

    /* ── wire form ── */

    /// Writes the table: varint entry count, then each name as a VarString.
    pub fn write_table(&self, w: &mut ByteWriter) {
        w.write_varint(self.len() as u32);
        for sym in self.iter() {
            w.write_var_string(sym.as_str());
        }
    }

    /// Reads a table: varint entry count, then per entry a varint byte
    /// length followed by that many raw bytes. The length prefix is honored
    /// exactly; a duplicate name would silently shift every later id, so it
    /// is rejected instead.
    pub fn read_table(r: &mut ByteReader<'_>) -> CodecResult<Self> {
        let count = r.read_varint()? as usize;
        let mut table = Self::new();
        for _ in 0..count {
            let at = r.offset();
            let name = r.read_var_string()?;
            if !table.entries.insert(Symbol::from(name)) {
                return Err(CodecError::Corrupted { at, reason: "duplicate symbol table entry" });
            }
        }
        Ok(table)
    }

    /// Writes one symbol reference: the full name inline for pre-v9
    /// containers, the varint table id otherwise.
    pub fn write_ref(
        &self,
        w: &mut ByteWriter,
        version: FormatVersion,
        sym: &Symbol,
    ) -> CodecResult<()> {
        if version.inline_symbols() {
            w.write_str16(sym.as_str());
            return Ok(());
        }
        let id = self
            .id_of(sym)
            .ok_or_else(|| CodecError::SymbolNotInterned { name: sym.as_str().to_owned() })?;
        w.write_varint(id);
        Ok(())
    }

    /// Reads one symbol reference (inverse of [`SymbolTable::write_ref`]).
    pub fn read_ref(&self, r: &mut ByteReader<'_>, version: FormatVersion) -> CodecResult<Symbol> {
        if version.inline_symbols() {
            return Ok(Symbol::from(r.read_str16()?));
        }
        let at = r.offset();
        let id = r.read_varint()?;
        self.get(id)
            .cloned()
            .ok_or(CodecError::SymbolIndexOutOfRange { at, id, len: self.len() })
    }

    /// Writes a symbol sequence: `u32` count, then each reference.
    pub fn write_seq(
        &self,
        w: &mut ByteWriter,
        version: FormatVersion,
        syms: &[Symbol],
    ) -> CodecResult<()> {
        w.write_u32_be(syms.len() as u32);
        for sym in syms {
            self.write_ref(w, version, sym)?;
        }
        Ok(())
    }

    /// Reads a symbol sequence (inverse of [`SymbolTable::write_seq`]).
    pub fn read_seq(
        &self,
        r: &mut ByteReader<'_>,
        version: FormatVersion,
    ) -> CodecResult<Vec<Symbol>> {
        let count = r.read_u32_be()?;
        let mut syms = Vec::new();
        for _ in 0..count {
            syms.push(self.read_ref(r, version)?);
        }
        Ok(syms)
    }
}

impl<'a> IntoIterator for &'a SymbolTable {
    type Item = &'a Symbol;
    type IntoIter = indexmap::set::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

/* ─────────────────────────── Tests ─────────────────────────── */

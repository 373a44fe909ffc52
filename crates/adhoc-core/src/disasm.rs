//! Structural disassembly of a decoded container.
//!
//! Only function and method bodies are self-delimiting (their nested frames
//! carry an instruction count). Conditional bodies, module bodies, class
//! bodies and try/catch bodies are flat runs inside one instruction list, so
//! nesting is reconstructed from instruction semantics: a per-frame if-depth
//! counter and a walker-wide scope-label stack. Best-effort structural
//! annotation, not a verified control-flow graph.

use std::fmt::Write as _;

use crate::frame::CodeFrame;
use crate::instruction::{Op, RunState};
use crate::io::ByteWriter;
use crate::{CodecError, CodecResult, Container};

/// Produces the full annotated disassembly of a container.
///
/// Fails with [`CodecError::StructuralInconsistency`] when a scope exit has
/// no scope left to close (malformed or truncated input).
pub fn disassemble_full(container: &Container, title: &str, with_offsets: bool) -> CodecResult<String> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== {title} == (version={}, strings={}, root instructions={})",
        container.version,
        container.symbols.len(),
        container.root.instructions.len(),
    );
    if let Some(src) = &container.root.source_file {
        let _ = writeln!(out, ";; source file: {src}");
    }
    let _ = writeln!(
        out,
        ";; stack size: {} - variable heap: {} - static heap: {}",
        container.root.max_stack_size,
        container.root.variable_heap_size,
        container.root.static_storage_size,
    );
    let _ = writeln!(out);

    let mut walker = Walker {
        out,
        with_offsets,
        // Top-level scripts close with a bare SET_STATE EXIT; the seed label
        // is what that final pop annotates.
        scopes: vec!["TopLevel".to_owned()],
    };
    walker.frame(&container.root, 0)?;
    Ok(walker.out)
}

/// Lists every symbol table entry with its id and the id's varint encoding,
/// for auditing containers byte by byte.
pub fn string_table_dump(container: &Container) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== string table == ({} entries, count bytes {})",
        container.symbols.len(),
        varint_hex(container.symbols.len() as u32),
    );
    for (id, sym) in container.symbols.iter().enumerate() {
        let _ = writeln!(out, "{id} | {} | {sym}", varint_hex(id as u32));
    }
    out
}

fn varint_hex(value: u32) -> String {
    let mut w = ByteWriter::new();
    w.write_varint(value);
    let mut s = String::new();
    for b in w.as_slice() {
        if !s.is_empty() {
            s.push(' ');
        }
        let _ = write!(s, "{b:02X}");
    }
    s
}

struct Walker {
    out: String,
    with_offsets: bool,
    scopes: Vec<String>,
}

impl Walker {
    /// One linear pass over a frame, recursing where a nested frame is
    /// defined. `depth` is the frame nesting depth; the if-depth is local to
    /// each frame, while the scope-label stack spans the whole walk.
    fn frame(&mut self, frame: &CodeFrame, depth: usize) -> CodecResult<()> {
        let mut if_depth: i32 = 0;
        for (i, ins) in frame.instructions.iter().enumerate() {
            if depth == 0 && ins.op.nested_frame().is_some() {
                self.out.push('\n');
            }

            let mut indent = 2 * depth;
            if if_depth > 0 {
                indent += 2 * if_depth as usize;
            }
            for _ in 0..indent {
                self.out.push(' ');
            }

            if self.with_offsets {
                match ins.offset {
                    Some(off) => { let _ = write!(self.out, "{off:6X}|"); }
                    None => self.out.push_str("      |"),
                }
            }
            let _ = write!(self.out, "{:4}|{:3}| {}", ins.line, i, ins.op);

            if let Some(sub) = ins.op.nested_frame() {
                self.out.push('\n');
                self.frame(sub, depth + 1)?;
                continue;
            }

            match &ins.op {
                Op::JumpIfFalse(_) | Op::JumpIfTrue(_) => if_depth += 1,
                Op::Leave { .. } => if_depth -= 1,
                Op::ModuleDefine { path } => {
                    self.scopes.push(
                        path.last().map(|s| s.as_str().to_owned()).unwrap_or_default(),
                    );
                }
                Op::ClassDefine { name, .. } => self.scopes.push(name.as_str().to_owned()),
                Op::TryCatch(_) => self.scopes.push("TryCatch".to_owned()),
                Op::ModuleConstructor => self.scopes.push("Module Constructor".to_owned()),
                Op::SetState(RunState::Exit) => {
                    let label = self.scopes.pop().ok_or(CodecError::StructuralInconsistency {
                        index: i,
                        reason: "scope exit with no open scope",
                    })?;
                    let _ = write!(self.out, "  [EXIT {label}]");
                }
                _ => {}
            }
            self.out.push('\n');
        }
        if depth > 0 {
            self.out.push('\n');
        }
        Ok(())
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::symbol::{Symbol, SymbolTable};
    use crate::FormatVersion;

    fn container(instructions: Vec<Instruction>) -> Container {
        let mut root = CodeFrame::new();
        root.instructions = instructions;
        Container {
            version: FormatVersion::from_raw(12).unwrap(),
            debug_info: true,
            symbols: SymbolTable::collect(&root),
            root,
        }
    }

    fn line_for<'a>(text: &'a str, needle: &str) -> &'a str {
        text.lines().find(|l| l.contains(needle)).unwrap()
    }

    #[test]
    fn depth_law_for_conditionals_and_scope_exits() {
        // MODULE_DEFINE ; JUMP_IF_FALSE(5) ; <3 ops> ; LEAVE ; SET_STATE(EXIT)
        let c = container(vec![
            Instruction::new(1, Op::ModuleDefine { path: vec![Symbol::new("M")] }),
            Instruction::new(2, Op::JumpIfFalse(5)),
            Instruction::new(3, Op::IntConst(1)),
            Instruction::new(3, Op::IntConst(2)),
            Instruction::new(3, Op::Pop),
            Instruction::new(4, Op::Leave { heap_rewind: 0 }),
            Instruction::new(5, Op::SetState(RunState::Exit)),
        ]);
        let text = disassemble_full(&c, "t", false).unwrap();

        // Ops inside the conditional body are indented one level (two spaces
        // ahead of the four-wide line-number column).
        assert!(line_for(&text, "INT_CONST - 1").starts_with("     3|"));
        // The if-depth is back to 0 after LEAVE: the exit line is flush left.
        let exit = line_for(&text, "SET_STATE");
        assert!(exit.starts_with("   5"), "unexpected indent: {exit:?}");
        // The module scope opened by MODULE_DEFINE is what the exit closes.
        assert!(exit.ends_with("[EXIT M]"));
    }

    #[test]
    fn exits_pop_down_to_the_toplevel_seed_then_fault() {
        let c = container(vec![
            Instruction::new(1, Op::ModuleDefine { path: vec![Symbol::new("gui"), Symbol::new("M")] }),
            Instruction::new(2, Op::SetState(RunState::Exit)),
            Instruction::new(3, Op::SetState(RunState::Exit)),
        ]);
        let text = disassemble_full(&c, "t", false).unwrap();
        // Module labels use the last path segment.
        assert!(text.contains("[EXIT M]"));
        assert!(text.contains("[EXIT TopLevel]"));

        let c = container(vec![
            Instruction::new(1, Op::SetState(RunState::Exit)),
            Instruction::new(2, Op::SetState(RunState::Exit)),
        ]);
        let err = disassemble_full(&c, "t", false).unwrap_err();
        assert_eq!(
            err,
            CodecError::StructuralInconsistency { index: 1, reason: "scope exit with no open scope" }
        );
    }

    #[test]
    fn class_try_catch_and_constructor_labels() {
        let c = container(vec![
            Instruction::new(1, Op::ClassDefine { name: Symbol::new("Widget"), parents: vec![] }),
            Instruction::new(2, Op::ModuleConstructor),
            Instruction::new(3, Op::TryCatch(6)),
            Instruction::new(4, Op::SetState(RunState::Exit)),
            Instruction::new(5, Op::SetState(RunState::Exit)),
            Instruction::new(6, Op::SetState(RunState::Exit)),
        ]);
        let text = disassemble_full(&c, "t", false).unwrap();
        assert!(text.contains("[EXIT TryCatch]"));
        assert!(text.contains("[EXIT Module Constructor]"));
        assert!(text.contains("[EXIT Widget]"));
    }

    #[test]
    fn nested_frames_indent_and_recurse_in_place() {
        let mut body = CodeFrame::new();
        body.instructions.push(Instruction::new(11, Op::NilConst));
        body.instructions.push(Instruction::new(11, Op::SetState(RunState::Return)));
        let c = container(vec![
            Instruction::new(10, Op::FunctionDefine {
                name: Symbol::new("draw"),
                frame: Box::new(body),
            }),
            Instruction::new(12, Op::Pop),
        ]);
        let text = disassemble_full(&c, "t", false).unwrap();
        let inner = line_for(&text, "NIL_CONST");
        assert!(inner.starts_with("    11|"), "nested frame not indented: {inner:?}");
        // The instruction after the define keeps its own frame's numbering.
        assert!(line_for(&text, "POP").contains("|  1| "));
    }

    #[test]
    fn string_table_dump_lists_varint_ids() {
        let mut root = CodeFrame::new();
        root.instructions.push(Instruction::new(1, Op::StringConst(Symbol::new("a"))));
        root.instructions.push(Instruction::new(1, Op::BinaryOperator(Symbol::new("+"))));
        let c = Container {
            version: FormatVersion::from_raw(12).unwrap(),
            debug_info: false,
            symbols: SymbolTable::collect(&root),
            root,
        };
        let dump = string_table_dump(&c);
        assert!(dump.contains("(2 entries, count bytes 02)"));
        assert!(dump.contains("0 | 00 | a"));
        assert!(dump.contains("1 | 01 | +"));
    }
}

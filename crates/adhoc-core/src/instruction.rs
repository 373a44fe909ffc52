//! The instruction set and its wire codec.
//!
//! Every record is `u32` line number, one opcode byte, then a payload fully
//! determined by the opcode. The set is closed: decode dispatches on the
//! byte and anything unassigned is fatal, the format has no skip mechanism.
//! Adding a kind means adding an [`Op`] variant; the exhaustive matches
//! below make the compiler point at every site that must learn about it.

use std::fmt;

use crate::frame::CodeFrame;
use crate::io::{ByteReader, ByteWriter};
use crate::symbol::{Symbol, SymbolTable};
use crate::{CodecError, CodecResult, FormatVersion};

/* ─────────────────────────── Opcodes ─────────────────────────── */

/// Opcode byte values, grouped by payload family.
pub mod opcode {
    /// NIL_CONST
    pub const NIL_CONST: u8 = 0x00;
    /// VOID_CONST
    pub const VOID_CONST: u8 = 0x01;
    /// BOOL_CONST
    pub const BOOL_CONST: u8 = 0x02;
    /// INT_CONST
    pub const INT_CONST: u8 = 0x03;
    /// FLOAT_CONST
    pub const FLOAT_CONST: u8 = 0x04;
    /// STRING_CONST
    pub const STRING_CONST: u8 = 0x05;
    /// ARRAY_CONST
    pub const ARRAY_CONST: u8 = 0x06;

    /// VARIABLE_EVAL
    pub const VARIABLE_EVAL: u8 = 0x10;
    /// VARIABLE_PUSH
    pub const VARIABLE_PUSH: u8 = 0x11;
    /// ATTRIBUTE_EVAL
    pub const ATTRIBUTE_EVAL: u8 = 0x12;
    /// ATTRIBUTE_PUSH
    pub const ATTRIBUTE_PUSH: u8 = 0x13;
    /// ATTRIBUTE_DEFINE
    pub const ATTRIBUTE_DEFINE: u8 = 0x14;
    /// ELEMENT_EVAL
    pub const ELEMENT_EVAL: u8 = 0x15;
    /// ELEMENT_PUSH
    pub const ELEMENT_PUSH: u8 = 0x16;

    /// JUMP
    pub const JUMP: u8 = 0x20;
    /// JUMP_IF_FALSE
    pub const JUMP_IF_FALSE: u8 = 0x21;
    /// JUMP_IF_TRUE
    pub const JUMP_IF_TRUE: u8 = 0x22;
    /// LOGICAL_AND
    pub const LOGICAL_AND: u8 = 0x23;
    /// LOGICAL_OR
    pub const LOGICAL_OR: u8 = 0x24;
    /// LEAVE
    pub const LEAVE: u8 = 0x25;
    /// TRY_CATCH
    pub const TRY_CATCH: u8 = 0x26;
    /// THROW
    pub const THROW: u8 = 0x27;
    /// SET_STATE
    pub const SET_STATE: u8 = 0x28;

    /// MODULE_DEFINE
    pub const MODULE_DEFINE: u8 = 0x30;
    /// MODULE_CONSTRUCTOR
    pub const MODULE_CONSTRUCTOR: u8 = 0x31;
    /// CLASS_DEFINE
    pub const CLASS_DEFINE: u8 = 0x32;
    /// FUNCTION_DEFINE
    pub const FUNCTION_DEFINE: u8 = 0x33;
    /// METHOD_DEFINE
    pub const METHOD_DEFINE: u8 = 0x34;
    /// STATIC_DEFINE
    pub const STATIC_DEFINE: u8 = 0x35;
    /// IMPORT
    pub const IMPORT: u8 = 0x36;
    /// SOURCE_FILE
    pub const SOURCE_FILE: u8 = 0x37;

    /// UNARY_OPERATOR
    pub const UNARY_OPERATOR: u8 = 0x40;
    /// BINARY_OPERATOR
    pub const BINARY_OPERATOR: u8 = 0x41;
    /// UNARY_ASSIGN_OPERATOR
    pub const UNARY_ASSIGN_OPERATOR: u8 = 0x42;
    /// BINARY_ASSIGN_OPERATOR
    pub const BINARY_ASSIGN_OPERATOR: u8 = 0x43;

    /// CALL
    pub const CALL: u8 = 0x50;
    /// EVAL
    pub const EVAL: u8 = 0x51;
    /// POP
    pub const POP: u8 = 0x52;
    /// ASSIGN_POP
    pub const ASSIGN_POP: u8 = 0x53;
    /// ARRAY_PUSH
    pub const ARRAY_PUSH: u8 = 0x54;
    /// STRING_PUSH
    pub const STRING_PUSH: u8 = 0x55;
    /// LIST_ASSIGN
    pub const LIST_ASSIGN: u8 = 0x56;
}

/* ─────────────────────────── Run state ─────────────────────────── */

/// Scope marker carried by `SET_STATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RunState {
    /// Leaves the logical scope (module, class, try/catch body, script).
    Exit = 0,
    /// Enters a logical scope.
    Enter = 1,
    /// Returns from the current frame.
    Return = 2,
    /// Yields out of the current frame.
    Yield = 3,
}

impl RunState {
    /// Wire byte.
    pub fn as_byte(self) -> u8 { self as u8 }

    /// Parses the wire byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Exit),
            1 => Some(Self::Enter),
            2 => Some(Self::Return),
            3 => Some(Self::Yield),
            _ => None,
        }
    }

    /// Uppercase label used by the disassembly.
    pub fn name(self) -> &'static str {
        match self {
            Self::Exit => "EXIT",
            Self::Enter => "ENTER",
            Self::Return => "RETURN",
            Self::Yield => "YIELD",
        }
    }
}

/* ─────────────────────────── Instruction ─────────────────────────── */

/// One decoded instruction: source line, optional container byte offset
/// (decode side only, diagnostic) and the tagged payload.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// Source line the instruction was lowered from.
    pub line: u32,
    /// Byte offset of the record in the container; set by the decoder,
    /// never serialized.
    pub offset: Option<u32>,
    /// The operation and its payload.
    pub op: Op,
}

impl Instruction {
    /// Creates an instruction with no recorded byte offset.
    pub fn new(line: u32, op: Op) -> Self { Self { line, offset: None, op } }

    pub(crate) fn write(
        &self,
        w: &mut ByteWriter,
        version: FormatVersion,
        debug_info: bool,
        table: &SymbolTable,
    ) -> CodecResult<()> {
        w.write_u32_be(self.line);
        w.write_u8(self.op.opcode());
        self.op.write_payload(w, version, debug_info, table)
    }

    pub(crate) fn read(
        r: &mut ByteReader<'_>,
        version: FormatVersion,
        table: &SymbolTable,
    ) -> CodecResult<Self> {
        let offset = r.offset() as u32;
        let line = r.read_u32_be()?;
        let at = r.offset();
        let kind = r.read_u8()?;
        let op = Op::read_payload(kind, at, r, version, table)?;
        Ok(Self { line, offset: Some(offset), op })
    }
}

// The byte offset is diagnostic; two instructions are the same instruction
// regardless of where one of them was decoded from.
impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool { self.line == other.line && self.op == other.op }
}

impl Eq for Instruction {}

/* ─────────────────────────── Op ─────────────────────────── */

/// The closed instruction union. One variant per opcode.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    /// Pushes nil.
    NilConst,
    /// Pushes the void value.
    VoidConst,
    /// Pushes a boolean literal.
    BoolConst(bool),
    /// Pushes a signed integer literal.
    IntConst(i32),
    /// Pushes a float literal.
    FloatConst(f32),
    /// Pushes a string literal (interned).
    StringConst(Symbol),
    /// Builds an array from a known element count.
    ArrayConst(u32),

    /// Evaluates a (possibly dotted) variable path.
    VariableEval {
        /// Dotted access path.
        path: Vec<Symbol>,
        /// Variable heap slot.
        slot: u32,
    },
    /// Pushes a variable reference for assignment.
    VariablePush {
        /// Dotted access path.
        path: Vec<Symbol>,
        /// Variable storage slot.
        slot: u32,
    },
    /// Evaluates an attribute path on the top of stack.
    AttributeEval {
        /// Dotted attribute path.
        path: Vec<Symbol>,
    },
    /// Pushes an attribute reference for assignment.
    AttributePush {
        /// Dotted attribute path.
        path: Vec<Symbol>,
    },
    /// Declares an attribute on the enclosing object.
    AttributeDefine(Symbol),
    /// Evaluates a subscripted element.
    ElementEval,
    /// Pushes a subscripted element reference.
    ElementPush,

    /// Unconditional jump to an absolute in-frame instruction index.
    Jump(u32),
    /// Jump when the popped condition is false.
    JumpIfFalse(u32),
    /// Jump when the popped condition is true.
    JumpIfTrue(u32),
    /// Short-circuit AND jump.
    LogicalAnd(u32),
    /// Short-circuit OR jump.
    LogicalOr(u32),
    /// Leaves a scope, rewinding the variable heap.
    Leave {
        /// Heap index to rewind to.
        heap_rewind: u32,
    },
    /// Enters a try/catch region; the index addresses the handler.
    TryCatch(u32),
    /// Throws the value on top of the stack.
    Throw,
    /// Marks a run-state transition for a logical scope.
    SetState(RunState),

    /// Defines (or reopens) a module by path.
    ModuleDefine {
        /// Module path segments.
        path: Vec<Symbol>,
    },
    /// Marks a module constructor body.
    ModuleConstructor,
    /// Defines a class with optional parents.
    ClassDefine {
        /// Class name.
        name: Symbol,
        /// Parent path, outermost first.
        parents: Vec<Symbol>,
    },
    /// Defines a function; owns the nested frame.
    FunctionDefine {
        /// Function name.
        name: Symbol,
        /// The compiled body.
        frame: Box<CodeFrame>,
    },
    /// Defines a method; owns the nested frame.
    MethodDefine {
        /// Method name.
        name: Symbol,
        /// The compiled body.
        frame: Box<CodeFrame>,
    },
    /// Declares a static variable.
    StaticDefine(Symbol),
    /// Imports a target from a namespace.
    Import {
        /// Namespace path segments.
        path: Vec<Symbol>,
        /// Imported name (may be a wildcard token).
        target: Symbol,
    },
    /// Records the source file the following code came from.
    SourceFile(Symbol),

    /// Applies a unary operator by token.
    UnaryOperator(Symbol),
    /// Applies a binary operator by token.
    BinaryOperator(Symbol),
    /// Applies a unary assignment operator by token.
    UnaryAssignOperator(Symbol),
    /// Applies a binary assignment operator by token.
    BinaryAssignOperator(Symbol),

    /// Calls the evaluated target with an argument count.
    Call(u32),
    /// Forces evaluation of the pushed reference.
    Eval,
    /// Pops the top of stack.
    Pop,
    /// Pops an assignment result.
    AssignPop,
    /// Appends the top of stack to the array under it.
    ArrayPush,
    /// Concatenates a run of strings.
    StringPush(u32),
    /// Destructures a list into variables.
    ListAssign {
        /// Number of destructured variables.
        count: u32,
        /// Wire flag byte; meaning not modeled, carried verbatim.
        flag: bool,
    },
}

impl Op {
    /// Wire opcode byte for this operation.
    pub fn opcode(&self) -> u8 {
        use opcode::*;
        match self {
            Op::NilConst => NIL_CONST,
            Op::VoidConst => VOID_CONST,
            Op::BoolConst(_) => BOOL_CONST,
            Op::IntConst(_) => INT_CONST,
            Op::FloatConst(_) => FLOAT_CONST,
            Op::StringConst(_) => STRING_CONST,
            Op::ArrayConst(_) => ARRAY_CONST,
            Op::VariableEval { .. } => VARIABLE_EVAL,
            Op::VariablePush { .. } => VARIABLE_PUSH,
            Op::AttributeEval { .. } => ATTRIBUTE_EVAL,
            Op::AttributePush { .. } => ATTRIBUTE_PUSH,
            Op::AttributeDefine(_) => ATTRIBUTE_DEFINE,
            Op::ElementEval => ELEMENT_EVAL,
            Op::ElementPush => ELEMENT_PUSH,
            Op::Jump(_) => JUMP,
            Op::JumpIfFalse(_) => JUMP_IF_FALSE,
            Op::JumpIfTrue(_) => JUMP_IF_TRUE,
            Op::LogicalAnd(_) => LOGICAL_AND,
            Op::LogicalOr(_) => LOGICAL_OR,
            Op::Leave { .. } => LEAVE,
            Op::TryCatch(_) => TRY_CATCH,
            Op::Throw => THROW,
            Op::SetState(_) => SET_STATE,
            Op::ModuleDefine { .. } => MODULE_DEFINE,
            Op::ModuleConstructor => MODULE_CONSTRUCTOR,
            Op::ClassDefine { .. } => CLASS_DEFINE,
            Op::FunctionDefine { .. } => FUNCTION_DEFINE,
            Op::MethodDefine { .. } => METHOD_DEFINE,
            Op::StaticDefine(_) => STATIC_DEFINE,
            Op::Import { .. } => IMPORT,
            Op::SourceFile(_) => SOURCE_FILE,
            Op::UnaryOperator(_) => UNARY_OPERATOR,
            Op::BinaryOperator(_) => BINARY_OPERATOR,
            Op::UnaryAssignOperator(_) => UNARY_ASSIGN_OPERATOR,
            Op::BinaryAssignOperator(_) => BINARY_ASSIGN_OPERATOR,
            Op::Call(_) => CALL,
            Op::Eval => EVAL,
            Op::Pop => POP,
            Op::AssignPop => ASSIGN_POP,
            Op::ArrayPush => ARRAY_PUSH,
            Op::StringPush(_) => STRING_PUSH,
            Op::ListAssign { .. } => LIST_ASSIGN,
        }
    }

    /// The format's uppercase mnemonic.
    pub fn name(&self) -> &'static str {
        match self {
            Op::NilConst => "NIL_CONST",
            Op::VoidConst => "VOID_CONST",
            Op::BoolConst(_) => "BOOL_CONST",
            Op::IntConst(_) => "INT_CONST",
            Op::FloatConst(_) => "FLOAT_CONST",
            Op::StringConst(_) => "STRING_CONST",
            Op::ArrayConst(_) => "ARRAY_CONST",
            Op::VariableEval { .. } => "VARIABLE_EVAL",
            Op::VariablePush { .. } => "VARIABLE_PUSH",
            Op::AttributeEval { .. } => "ATTRIBUTE_EVAL",
            Op::AttributePush { .. } => "ATTRIBUTE_PUSH",
            Op::AttributeDefine(_) => "ATTRIBUTE_DEFINE",
            Op::ElementEval => "ELEMENT_EVAL",
            Op::ElementPush => "ELEMENT_PUSH",
            Op::Jump(_) => "JUMP",
            Op::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Op::JumpIfTrue(_) => "JUMP_IF_TRUE",
            Op::LogicalAnd(_) => "LOGICAL_AND",
            Op::LogicalOr(_) => "LOGICAL_OR",
            Op::Leave { .. } => "LEAVE",
            Op::TryCatch(_) => "TRY_CATCH",
            Op::Throw => "THROW",
            Op::SetState(_) => "SET_STATE",
            Op::ModuleDefine { .. } => "MODULE_DEFINE",
            Op::ModuleConstructor => "MODULE_CONSTRUCTOR",
            Op::ClassDefine { .. } => "CLASS_DEFINE",
            Op::FunctionDefine { .. } => "FUNCTION_DEFINE",
            Op::MethodDefine { .. } => "METHOD_DEFINE",
            Op::StaticDefine(_) => "STATIC_DEFINE",
            Op::Import { .. } => "IMPORT",
            Op::SourceFile(_) => "SOURCE_FILE",
            Op::UnaryOperator(_) => "UNARY_OPERATOR",
            Op::BinaryOperator(_) => "BINARY_OPERATOR",
            Op::UnaryAssignOperator(_) => "UNARY_ASSIGN_OPERATOR",
            Op::BinaryAssignOperator(_) => "BINARY_ASSIGN_OPERATOR",
            Op::Call(_) => "CALL",
            Op::Eval => "EVAL",
            Op::Pop => "POP",
            Op::AssignPop => "ASSIGN_POP",
            Op::ArrayPush => "ARRAY_PUSH",
            Op::StringPush(_) => "STRING_PUSH",
            Op::ListAssign { .. } => "LIST_ASSIGN",
        }
    }

    /// The nested frame, for the two defining instructions that own one.
    pub fn nested_frame(&self) -> Option<&CodeFrame> {
        match self {
            Op::FunctionDefine { frame, .. } | Op::MethodDefine { frame, .. } => Some(frame),
            _ => None,
        }
    }

    fn write_payload(
        &self,
        w: &mut ByteWriter,
        version: FormatVersion,
        debug_info: bool,
        table: &SymbolTable,
    ) -> CodecResult<()> {
        match self {
            Op::NilConst
            | Op::VoidConst
            | Op::ElementEval
            | Op::ElementPush
            | Op::Throw
            | Op::ModuleConstructor
            | Op::Eval
            | Op::Pop
            | Op::AssignPop
            | Op::ArrayPush => {}

            Op::BoolConst(v) => w.write_bool(*v),
            Op::IntConst(v) => w.write_i32_be(*v),
            Op::FloatConst(v) => w.write_f32_be(*v),
            Op::StringConst(sym) => table.write_ref(w, version, sym)?,
            Op::ArrayConst(size) => w.write_u32_be(*size),

            Op::VariableEval { path, slot } | Op::VariablePush { path, slot } => {
                table.write_seq(w, version, path)?;
                w.write_u32_be(*slot);
            }
            Op::AttributeEval { path } | Op::AttributePush { path } => {
                table.write_seq(w, version, path)?;
            }
            Op::AttributeDefine(sym) | Op::StaticDefine(sym) | Op::SourceFile(sym) => {
                table.write_ref(w, version, sym)?;
            }

            Op::Jump(ix)
            | Op::JumpIfFalse(ix)
            | Op::JumpIfTrue(ix)
            | Op::LogicalAnd(ix)
            | Op::LogicalOr(ix)
            | Op::TryCatch(ix) => w.write_u32_be(*ix),
            Op::Leave { heap_rewind } => {
                w.write_u32_be(0); // reserved
                w.write_u32_be(*heap_rewind);
            }
            Op::SetState(state) => w.write_u8(state.as_byte()),

            Op::ModuleDefine { path } => table.write_seq(w, version, path)?,
            Op::ClassDefine { name, parents } => {
                table.write_ref(w, version, name)?;
                table.write_seq(w, version, parents)?;
            }
            Op::FunctionDefine { name, frame } | Op::MethodDefine { name, frame } => {
                table.write_ref(w, version, name)?;
                frame.write(w, version, debug_info, table)?;
            }
            Op::Import { path, target } => {
                table.write_seq(w, version, path)?;
                table.write_ref(w, version, target)?;
                // Trailing sentinel, always the interned "nil".
                table.write_ref(w, version, &Symbol::new("nil"))?;
            }

            Op::UnaryOperator(sym)
            | Op::BinaryOperator(sym)
            | Op::UnaryAssignOperator(sym)
            | Op::BinaryAssignOperator(sym) => table.write_ref(w, version, sym)?,

            Op::Call(count) | Op::StringPush(count) => w.write_u32_be(*count),
            Op::ListAssign { count, flag } => {
                w.write_u32_be(*count);
                w.write_bool(*flag);
            }
        }
        Ok(())
    }

    fn read_payload(
        kind: u8,
        at: usize,
        r: &mut ByteReader<'_>,
        version: FormatVersion,
        table: &SymbolTable,
    ) -> CodecResult<Self> {
        use opcode::*;
        Ok(match kind {
            NIL_CONST => Op::NilConst,
            VOID_CONST => Op::VoidConst,
            BOOL_CONST => Op::BoolConst(r.read_bool()?),
            INT_CONST => Op::IntConst(r.read_i32_be()?),
            FLOAT_CONST => Op::FloatConst(r.read_f32_be()?),
            STRING_CONST => Op::StringConst(table.read_ref(r, version)?),
            ARRAY_CONST => Op::ArrayConst(r.read_u32_be()?),

            VARIABLE_EVAL => Op::VariableEval {
                path: table.read_seq(r, version)?,
                slot: r.read_u32_be()?,
            },
            VARIABLE_PUSH => Op::VariablePush {
                path: table.read_seq(r, version)?,
                slot: r.read_u32_be()?,
            },
            ATTRIBUTE_EVAL => Op::AttributeEval { path: table.read_seq(r, version)? },
            ATTRIBUTE_PUSH => Op::AttributePush { path: table.read_seq(r, version)? },
            ATTRIBUTE_DEFINE => Op::AttributeDefine(table.read_ref(r, version)?),
            ELEMENT_EVAL => Op::ElementEval,
            ELEMENT_PUSH => Op::ElementPush,

            JUMP => Op::Jump(r.read_u32_be()?),
            JUMP_IF_FALSE => Op::JumpIfFalse(r.read_u32_be()?),
            JUMP_IF_TRUE => Op::JumpIfTrue(r.read_u32_be()?),
            LOGICAL_AND => Op::LogicalAnd(r.read_u32_be()?),
            LOGICAL_OR => Op::LogicalOr(r.read_u32_be()?),
            LEAVE => {
                let _reserved = r.read_u32_be()?;
                Op::Leave { heap_rewind: r.read_u32_be()? }
            }
            TRY_CATCH => Op::TryCatch(r.read_u32_be()?),
            THROW => Op::Throw,
            SET_STATE => {
                let state_at = r.offset();
                let b = r.read_u8()?;
                Op::SetState(RunState::from_byte(b).ok_or(CodecError::Corrupted {
                    at: state_at,
                    reason: "unknown run state",
                })?)
            }

            MODULE_DEFINE => Op::ModuleDefine { path: table.read_seq(r, version)? },
            MODULE_CONSTRUCTOR => Op::ModuleConstructor,
            CLASS_DEFINE => Op::ClassDefine {
                name: table.read_ref(r, version)?,
                parents: table.read_seq(r, version)?,
            },
            FUNCTION_DEFINE => {
                let name = table.read_ref(r, version)?;
                let (frame, _) = CodeFrame::read(r, version, table)?;
                Op::FunctionDefine { name, frame: Box::new(frame) }
            }
            METHOD_DEFINE => {
                let name = table.read_ref(r, version)?;
                let (frame, _) = CodeFrame::read(r, version, table)?;
                Op::MethodDefine { name, frame: Box::new(frame) }
            }
            STATIC_DEFINE => Op::StaticDefine(table.read_ref(r, version)?),
            IMPORT => {
                let path = table.read_seq(r, version)?;
                let target = table.read_ref(r, version)?;
                let _sentinel = table.read_ref(r, version)?;
                Op::Import { path, target }
            }
            SOURCE_FILE => Op::SourceFile(table.read_ref(r, version)?),

            UNARY_OPERATOR => Op::UnaryOperator(table.read_ref(r, version)?),
            BINARY_OPERATOR => Op::BinaryOperator(table.read_ref(r, version)?),
            UNARY_ASSIGN_OPERATOR => Op::UnaryAssignOperator(table.read_ref(r, version)?),
            BINARY_ASSIGN_OPERATOR => Op::BinaryAssignOperator(table.read_ref(r, version)?),

            CALL => Op::Call(r.read_u32_be()?),
            EVAL => Op::Eval,
            POP => Op::Pop,
            ASSIGN_POP => Op::AssignPop,
            ARRAY_PUSH => Op::ArrayPush,
            STRING_PUSH => Op::StringPush(r.read_u32_be()?),
            LIST_ASSIGN => Op::ListAssign {
                count: r.read_u32_be()?,
                flag: r.read_bool()?,
            },

            other => return Err(CodecError::UnknownInstructionKind { at, kind: other }),
        })
    }
}

// Float payloads compare by bit pattern so round-trip equality is total.
impl PartialEq for Op {
    fn eq(&self, other: &Self) -> bool {
        use Op::*;
        match (self, other) {
            (NilConst, NilConst)
            | (VoidConst, VoidConst)
            | (ElementEval, ElementEval)
            | (ElementPush, ElementPush)
            | (Throw, Throw)
            | (ModuleConstructor, ModuleConstructor)
            | (Eval, Eval)
            | (Pop, Pop)
            | (AssignPop, AssignPop)
            | (ArrayPush, ArrayPush) => true,

            (BoolConst(a), BoolConst(b)) => a == b,
            (IntConst(a), IntConst(b)) => a == b,
            (FloatConst(a), FloatConst(b)) => a.to_bits() == b.to_bits(),
            (StringConst(a), StringConst(b)) => a == b,
            (ArrayConst(a), ArrayConst(b)) => a == b,

            (
                VariableEval { path: pa, slot: sa },
                VariableEval { path: pb, slot: sb },
            )
            | (
                VariablePush { path: pa, slot: sa },
                VariablePush { path: pb, slot: sb },
            ) => pa == pb && sa == sb,
            (AttributeEval { path: a }, AttributeEval { path: b })
            | (AttributePush { path: a }, AttributePush { path: b })
            | (ModuleDefine { path: a }, ModuleDefine { path: b }) => a == b,
            (AttributeDefine(a), AttributeDefine(b))
            | (StaticDefine(a), StaticDefine(b))
            | (SourceFile(a), SourceFile(b))
            | (UnaryOperator(a), UnaryOperator(b))
            | (BinaryOperator(a), BinaryOperator(b))
            | (UnaryAssignOperator(a), UnaryAssignOperator(b))
            | (BinaryAssignOperator(a), BinaryAssignOperator(b)) => a == b,

            (Jump(a), Jump(b))
            | (JumpIfFalse(a), JumpIfFalse(b))
            | (JumpIfTrue(a), JumpIfTrue(b))
            | (LogicalAnd(a), LogicalAnd(b))
            | (LogicalOr(a), LogicalOr(b))
            | (TryCatch(a), TryCatch(b)) => a == b,
            (Leave { heap_rewind: a }, Leave { heap_rewind: b }) => a == b,
            (SetState(a), SetState(b)) => a == b,

            (
                ClassDefine { name: na, parents: pa },
                ClassDefine { name: nb, parents: pb },
            ) => na == nb && pa == pb,
            (
                FunctionDefine { name: na, frame: fa },
                FunctionDefine { name: nb, frame: fb },
            )
            | (
                MethodDefine { name: na, frame: fa },
                MethodDefine { name: nb, frame: fb },
            ) => na == nb && fa == fb,
            (
                Import { path: pa, target: ta },
                Import { path: pb, target: tb },
            ) => pa == pb && ta == tb,

            (Call(a), Call(b)) | (StringPush(a), StringPush(b)) => a == b,
            (
                ListAssign { count: ca, flag: fa },
                ListAssign { count: cb, flag: fb },
            ) => ca == cb && fa == fb,

            _ => false,
        }
    }
}

impl Eq for Op {}

fn join_path(path: &[Symbol]) -> String {
    path.iter().map(Symbol::as_str).collect::<Vec<_>>().join(".")
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Op::BoolConst(v) => write!(f, "{name} - {v}"),
            Op::IntConst(v) => write!(f, "{name} - {v}"),
            Op::FloatConst(v) => write!(f, "{name} - {v}"),
            Op::StringConst(s) => write!(f, "{name} - \"{s}\""),
            Op::ArrayConst(size) => write!(f, "{name} - size {size}"),
            Op::VariableEval { path, slot } | Op::VariablePush { path, slot } => {
                write!(f, "{name} - {} (heap {slot})", join_path(path))
            }
            Op::AttributeEval { path } | Op::AttributePush { path } => {
                write!(f, "{name} - {}", join_path(path))
            }
            Op::AttributeDefine(s) | Op::StaticDefine(s) | Op::SourceFile(s) => {
                write!(f, "{name} - {s}")
            }
            Op::Jump(ix)
            | Op::JumpIfFalse(ix)
            | Op::JumpIfTrue(ix)
            | Op::LogicalAnd(ix)
            | Op::LogicalOr(ix)
            | Op::TryCatch(ix) => write!(f, "{name} -> {ix}"),
            Op::Leave { heap_rewind } => write!(f, "{name} - rewind {heap_rewind}"),
            Op::SetState(state) => write!(f, "{name} - {}", state.name()),
            Op::ModuleDefine { path } => write!(f, "{name} - {}", join_path(path)),
            Op::ClassDefine { name: class, parents } => {
                if parents.is_empty() {
                    write!(f, "{name} - {class}")
                } else {
                    write!(f, "{name} - {class} extends {}", join_path(parents))
                }
            }
            Op::FunctionDefine { name: func, frame } | Op::MethodDefine { name: func, frame } => {
                write!(f, "{name} - {func} ({} params)", frame.parameters.len())
            }
            Op::Import { path, target } => {
                if path.is_empty() {
                    write!(f, "{name} - {target}")
                } else {
                    write!(f, "{name} - {} -> {target}", join_path(path))
                }
            }
            Op::UnaryOperator(s)
            | Op::BinaryOperator(s)
            | Op::UnaryAssignOperator(s)
            | Op::BinaryAssignOperator(s) => write!(f, "{name} - {s}"),
            Op::Call(count) => write!(f, "{name} - {count} args"),
            Op::StringPush(count) => write!(f, "{name} - {count} parts"),
            Op::ListAssign { count, flag } => write!(f, "{name} - {count} vars, flag {flag}"),
            _ => f.write_str(name),
        }
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

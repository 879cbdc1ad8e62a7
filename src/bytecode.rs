//! Bytecode: the instruction set, the compiled module format, and the
//! generator that lowers an analyzed AST into it.
//!
//! Code is generated one statement at a time into self-contained buffers
//! whose jump operands are relative to the buffer's own start. When a
//! buffer is appended to its enclosing one, `add_offset` shifts every jump
//! operand by the insertion point, so by the time a function is complete
//! all jumps are absolute within its code. Expressions never branch, which
//! is what keeps this patching scheme sufficient.

pub mod io;

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{
    Block, ConstValue, Expression, ExprKind, ForInit, FunctionCall, Program, Statement,
};
use crate::builtins::BuiltinRegistry;
use crate::semantic::Analysis;
use crate::symbol::{SymbolId, SymbolTable};
use crate::token::Op;
use crate::types::{FunctionType, SimpleType, Type};

/// One-byte opcodes. Operand widths are fixed per opcode; see
/// [`operand_width`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    AConstNull = 0x01,
    IConst0 = 0x03,
    IConst1 = 0x04,
    IConst2 = 0x05,
    IConst3 = 0x06,
    IConst4 = 0x07,
    IConst5 = 0x08,
    BConst0 = 0x0e,
    BConst1 = 0x0f,
    /// Push an i8 operand.
    BiPush = 0x10,
    /// Push an i16 operand (big endian).
    SiPush = 0x11,
    /// Push a numeric constant-pool entry (u16 index).
    Ldc = 0x12,
    /// Push a string constant-pool entry (u16 index).
    SLdc = 0x13,
    ILoad = 0x15,
    ILoad0 = 0x1a,
    ILoad1 = 0x1b,
    ILoad2 = 0x1c,
    ILoad3 = 0x1d,
    IStore = 0x36,
    IStore0 = 0x3b,
    IStore1 = 0x3c,
    IStore2 = 0x3d,
    IStore3 = 0x3e,
    Pop = 0x57,
    Dup = 0x59,
    IAdd = 0x60,
    SAdd = 0x61,
    ISub = 0x64,
    IMul = 0x68,
    IDiv = 0x6c,
    IRem = 0x70,
    INeg = 0x74,
    Not = 0x75,
    IShl = 0x78,
    IShr = 0x7a,
    IAnd = 0x7e,
    IOr = 0x80,
    IXor = 0x82,
    /// Add an i8 delta to a local slot in place (u8 slot, i8 delta).
    IInc = 0x84,
    CmpEq = 0x87,
    CmpNe = 0x88,
    CmpGt = 0x89,
    CmpGe = 0x8a,
    CmpLt = 0x8b,
    CmpLe = 0x8c,
    /// Jump to the u16 operand when the popped value is falsy.
    IfEq = 0x99,
    Goto = 0xa7,
    IReturn = 0xac,
    Return = 0xb1,
    InvokeStatic = 0xb8,
}

impl OpCode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        use OpCode::*;
        Some(match byte {
            0x01 => AConstNull,
            0x03 => IConst0,
            0x04 => IConst1,
            0x05 => IConst2,
            0x06 => IConst3,
            0x07 => IConst4,
            0x08 => IConst5,
            0x0e => BConst0,
            0x0f => BConst1,
            0x10 => BiPush,
            0x11 => SiPush,
            0x12 => Ldc,
            0x13 => SLdc,
            0x15 => ILoad,
            0x1a => ILoad0,
            0x1b => ILoad1,
            0x1c => ILoad2,
            0x1d => ILoad3,
            0x36 => IStore,
            0x3b => IStore0,
            0x3c => IStore1,
            0x3d => IStore2,
            0x3e => IStore3,
            0x57 => Pop,
            0x59 => Dup,
            0x60 => IAdd,
            0x61 => SAdd,
            0x64 => ISub,
            0x68 => IMul,
            0x6c => IDiv,
            0x70 => IRem,
            0x74 => INeg,
            0x75 => Not,
            0x78 => IShl,
            0x7a => IShr,
            0x7e => IAnd,
            0x80 => IOr,
            0x82 => IXor,
            0x84 => IInc,
            0x87 => CmpEq,
            0x88 => CmpNe,
            0x89 => CmpGt,
            0x8a => CmpGe,
            0x8b => CmpLt,
            0x8c => CmpLe,
            0x99 => IfEq,
            0xa7 => Goto,
            0xac => IReturn,
            0xb1 => Return,
            0xb8 => InvokeStatic,
            _ => return None,
        })
    }

    /// Operand byte count following the opcode.
    pub fn operand_width(self) -> usize {
        use OpCode::*;
        match self {
            BiPush | ILoad | IStore => 1,
            SiPush | Ldc | SLdc | IInc | IfEq | Goto | InvokeStatic => 2,
            _ => 0,
        }
    }
}

/// A constant-pool entry. Integer and decimal constants are separate so the
/// machine can keep integer arithmetic in integers.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Integer(i64),
    Number(f64),
    String(String),
    Function(BcFunction),
}

/// A compiled function. Self-contained: the slot layout and types travel
/// with the code, so a module needs no symbol table to execute or to be
/// written out.
#[derive(Debug, Clone, PartialEq)]
pub struct BcFunction {
    pub name: String,
    pub ty: Rc<FunctionType>,
    /// Name and type per frame slot, parameters first.
    pub locals: Vec<(String, Type)>,
    pub op_stack_size: u16,
    pub code: Vec<u8>,
    pub is_builtin: bool,
}

impl BcFunction {
    fn stub(name: &str, ty: Rc<FunctionType>, is_builtin: bool) -> Self {
        Self {
            name: name.to_string(),
            ty,
            locals: Vec::new(),
            op_stack_size: 0,
            code: Vec::new(),
            is_builtin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BcModule {
    pub consts: Vec<Constant>,
}

impl BcModule {
    /// Pool index of the program entry function.
    pub fn entry(&self) -> Option<usize> {
        self.consts.iter().position(|c| {
            matches!(c, Constant::Function(f) if !f.is_builtin && f.name == "main")
        })
    }
}

pub fn push_u16(code: &mut Vec<u8>, value: u16) {
    code.extend_from_slice(&value.to_be_bytes());
}

pub fn read_u16(code: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([code[at], code[at + 1]])
}

/// Shifts every jump operand in `code` by `offset`. Operands are relative
/// to the buffer's own start until the buffer lands at its final position.
fn add_offset(code: &mut [u8], offset: u16) {
    let mut i = 0;
    while i < code.len() {
        let op = OpCode::from_u8(code[i]).unwrap_or(OpCode::Return);
        if matches!(op, OpCode::IfEq | OpCode::Goto) {
            let target = read_u16(code, i + 1) + offset;
            code[i + 1..i + 3].copy_from_slice(&target.to_be_bytes());
        }
        i += 1 + op.operand_width();
    }
}

pub fn generate(program: &Program, analysis: &Analysis) -> BcModule {
    let mut generator = Generator {
        symbols: &analysis.symbols,
        consts: Vec::new(),
        func_index: FxHashMap::default(),
    };
    generator.seed_builtins(&analysis.builtins);
    if let Some(main) = program.sym {
        generator.gen_function(main, &program.body);
    }
    BcModule {
        consts: generator.consts,
    }
}

struct Generator<'a> {
    symbols: &'a SymbolTable,
    consts: Vec<Constant>,
    func_index: FxHashMap<SymbolId, u16>,
}

impl<'a> Generator<'a> {
    /// Builtins occupy the first pool slots, in registry order, so their
    /// invoke indices are stable across modules.
    fn seed_builtins(&mut self, builtins: &BuiltinRegistry) {
        for sym in builtins.iter() {
            if let Some(func) = self.symbols.function(sym) {
                let idx = self.consts.len() as u16;
                self.consts
                    .push(Constant::Function(BcFunction::stub(&func.name, func.ty.clone(), true)));
                self.func_index.insert(sym, idx);
            }
        }
    }

    /// Pool slot for a function, reserving a stub on first reference so a
    /// call can be emitted before the callee's body is generated.
    fn func_slot(&mut self, sym: SymbolId) -> u16 {
        if let Some(&idx) = self.func_index.get(&sym) {
            return idx;
        }
        let idx = self.consts.len() as u16;
        let stub = match self.symbols.function(sym) {
            Some(func) => BcFunction::stub(&func.name, func.ty.clone(), func.is_builtin),
            None => BcFunction::stub(
                "?",
                Rc::new(FunctionType::new("?", Type::ANY, vec![])),
                false,
            ),
        };
        self.consts.push(Constant::Function(stub));
        self.func_index.insert(sym, idx);
        idx
    }

    fn integer_const(&mut self, value: i64) -> u16 {
        if let Some(idx) = self
            .consts
            .iter()
            .position(|c| matches!(c, Constant::Integer(v) if *v == value))
        {
            return idx as u16;
        }
        self.consts.push(Constant::Integer(value));
        (self.consts.len() - 1) as u16
    }

    fn number_const(&mut self, value: f64) -> u16 {
        if let Some(idx) = self
            .consts
            .iter()
            .position(|c| matches!(c, Constant::Number(v) if v.to_bits() == value.to_bits()))
        {
            return idx as u16;
        }
        self.consts.push(Constant::Number(value));
        (self.consts.len() - 1) as u16
    }

    fn string_const(&mut self, value: &str) -> u16 {
        if let Some(idx) = self
            .consts
            .iter()
            .position(|c| matches!(c, Constant::String(v) if v == value))
        {
            return idx as u16;
        }
        self.consts.push(Constant::String(value.to_string()));
        (self.consts.len() - 1) as u16
    }

    fn gen_function(&mut self, sym: SymbolId, body: &Block) {
        let slot = self.func_slot(sym) as usize;
        let mut code = self.gen_stmts(sym, &body.stmts);
        code.push(OpCode::Return as u8);

        let Some(func) = self.symbols.function(sym) else {
            return;
        };
        let locals = func
            .locals
            .iter()
            .filter_map(|&id| {
                self.symbols
                    .var(id)
                    .map(|var| (var.name.clone(), var.ty.clone()))
            })
            .collect();
        self.consts[slot] = Constant::Function(BcFunction {
            name: func.name.clone(),
            ty: func.ty.clone(),
            locals,
            op_stack_size: max_stack_of_stmts(&body.stmts),
            code,
            is_builtin: false,
        });
    }

    fn gen_stmts(&mut self, func: SymbolId, stmts: &[Statement]) -> Vec<u8> {
        let mut code = Vec::new();
        for stmt in stmts {
            let mut buf = self.gen_statement(func, stmt);
            add_offset(&mut buf, code.len() as u16);
            code.extend(buf);
        }
        code
    }

    fn gen_statement(&mut self, func: SymbolId, stmt: &Statement) -> Vec<u8> {
        match stmt {
            Statement::FunctionDecl(decl) => {
                if let Some(sym) = decl.sym {
                    self.gen_function(sym, &decl.body);
                }
                Vec::new()
            }
            Statement::VariableDecl(decl) => self.gen_variable_decl(func, decl),
            Statement::If(if_stmt) => {
                let mut code = self.gen_expression(func, &if_stmt.condition);
                let patch_at = code.len() + 1;
                code.push(OpCode::IfEq as u8);
                push_u16(&mut code, 0);

                let then_base = code.len();
                let mut then_code = self.gen_statement(func, &if_stmt.then_stmt);
                add_offset(&mut then_code, then_base as u16);
                code.extend(then_code);

                match &if_stmt.else_stmt {
                    Some(else_stmt) => {
                        let goto_at = code.len() + 1;
                        code.push(OpCode::Goto as u8);
                        push_u16(&mut code, 0);

                        let else_base = code.len();
                        code[patch_at..patch_at + 2]
                            .copy_from_slice(&(else_base as u16).to_be_bytes());
                        let mut else_code = self.gen_statement(func, else_stmt);
                        add_offset(&mut else_code, else_base as u16);
                        code.extend(else_code);

                        let end = code.len() as u16;
                        code[goto_at..goto_at + 2].copy_from_slice(&end.to_be_bytes());
                    }
                    None => {
                        let end = code.len() as u16;
                        code[patch_at..patch_at + 2].copy_from_slice(&end.to_be_bytes());
                    }
                }
                code
            }
            Statement::For(for_stmt) => {
                let mut code = match &for_stmt.init {
                    Some(ForInit::Decl(decl)) => self.gen_variable_decl(func, decl),
                    Some(ForInit::Expr(exp)) => self.gen_discarded(func, exp),
                    None => Vec::new(),
                };
                let loop_start = code.len();
                let exit_patch = match &for_stmt.condition {
                    Some(condition) => {
                        let mut cond = self.gen_expression(func, condition);
                        add_offset(&mut cond, code.len() as u16);
                        code.extend(cond);
                        let patch_at = code.len() + 1;
                        code.push(OpCode::IfEq as u8);
                        push_u16(&mut code, 0);
                        Some(patch_at)
                    }
                    None => None,
                };

                let body_base = code.len();
                let mut body = self.gen_statement(func, &for_stmt.body);
                add_offset(&mut body, body_base as u16);
                code.extend(body);

                if let Some(increment) = &for_stmt.increment {
                    let mut inc = self.gen_discarded(func, increment);
                    add_offset(&mut inc, code.len() as u16);
                    code.extend(inc);
                }
                code.push(OpCode::Goto as u8);
                push_u16(&mut code, loop_start as u16);

                if let Some(patch_at) = exit_patch {
                    let end = code.len() as u16;
                    code[patch_at..patch_at + 2].copy_from_slice(&end.to_be_bytes());
                }
                code
            }
            Statement::Return(ret) => match &ret.exp {
                Some(exp) => {
                    let mut code = self.gen_expression(func, exp);
                    code.push(OpCode::IReturn as u8);
                    code
                }
                None => vec![OpCode::Return as u8],
            },
            Statement::Block(block) => self.gen_stmts(func, &block.stmts),
            Statement::Expr(stmt) => self.gen_discarded(func, &stmt.exp),
            Statement::Error(_) => Vec::new(),
        }
    }

    fn gen_variable_decl(&mut self, func: SymbolId, decl: &crate::ast::VariableDecl) -> Vec<u8> {
        let (Some(init), Some(sym)) = (&decl.init, decl.sym) else {
            return Vec::new();
        };
        let mut code = self.gen_expression(func, init);
        self.emit_store(&mut code, self.slot_of(func, sym));
        code
    }

    /// Expression in statement position: evaluate and drop the value.
    fn gen_discarded(&mut self, func: SymbolId, exp: &Expression) -> Vec<u8> {
        let mut code = self.gen_expression(func, exp);
        if leaves_value(exp) {
            code.push(OpCode::Pop as u8);
        }
        code
    }

    fn gen_expression(&mut self, func: SymbolId, exp: &Expression) -> Vec<u8> {
        // A folded subtree loads its constant instead of recomputing it.
        if let Some(value) = &exp.const_value {
            if matches!(exp.kind, ExprKind::Binary { .. } | ExprKind::Unary { .. }) {
                let mut code = Vec::new();
                self.emit_const(&mut code, value);
                return code;
            }
        }
        let mut code = Vec::new();
        match &exp.kind {
            ExprKind::IntegerLiteral(value) => self.emit_integer(&mut code, *value),
            ExprKind::DecimalLiteral(value) => {
                let idx = self.number_const(*value);
                code.push(OpCode::Ldc as u8);
                push_u16(&mut code, idx);
            }
            ExprKind::StringLiteral(value) => {
                let idx = self.string_const(value);
                code.push(OpCode::SLdc as u8);
                push_u16(&mut code, idx);
            }
            ExprKind::BooleanLiteral(value) => {
                code.push(if *value {
                    OpCode::BConst1 as u8
                } else {
                    OpCode::BConst0 as u8
                });
            }
            ExprKind::NullLiteral => code.push(OpCode::AConstNull as u8),
            ExprKind::Variable { sym, .. } => {
                if let Some(sym) = sym {
                    self.emit_load(&mut code, self.slot_of(func, *sym));
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_assign() {
                    self.gen_assignment(&mut code, func, *op, lhs, rhs);
                } else {
                    code = self.gen_expression(func, lhs);
                    code.extend(self.gen_expression(func, rhs));
                    code.push(binary_opcode(*op, lhs, rhs) as u8);
                }
            }
            ExprKind::Unary {
                op,
                is_prefix,
                operand,
            } => match op {
                Op::Inc | Op::Dec => {
                    self.gen_inc_dec(&mut code, func, *op, *is_prefix, operand)
                }
                Op::Minus => {
                    code = self.gen_expression(func, operand);
                    code.push(OpCode::INeg as u8);
                }
                Op::Not => {
                    code = self.gen_expression(func, operand);
                    code.push(OpCode::Not as u8);
                }
                _ => {}
            },
            ExprKind::Call(call) => self.gen_call(&mut code, func, call),
            ExprKind::Error => {}
        }
        code
    }

    /// Assignment leaves the stored value on the stack; statement context
    /// pops it.
    fn gen_assignment(
        &mut self,
        code: &mut Vec<u8>,
        func: SymbolId,
        op: Op,
        lhs: &Expression,
        rhs: &Expression,
    ) {
        let ExprKind::Variable { sym: Some(sym), .. } = &lhs.kind else {
            return;
        };
        let slot = self.slot_of(func, *sym);
        match op.compound_base() {
            None => code.extend(self.gen_expression(func, rhs)),
            Some(base) => {
                self.emit_load(code, slot);
                code.extend(self.gen_expression(func, rhs));
                code.push(binary_opcode(base, lhs, rhs) as u8);
            }
        }
        code.push(OpCode::Dup as u8);
        self.emit_store(code, slot);
    }

    fn gen_inc_dec(
        &mut self,
        code: &mut Vec<u8>,
        func: SymbolId,
        op: Op,
        is_prefix: bool,
        operand: &Expression,
    ) {
        let ExprKind::Variable { sym: Some(sym), .. } = &operand.kind else {
            return;
        };
        let slot = self.slot_of(func, *sym);
        let delta: i8 = if op == Op::Inc { 1 } else { -1 };
        if is_prefix {
            code.push(OpCode::IInc as u8);
            code.push(slot);
            code.push(delta as u8);
            self.emit_load(code, slot);
        } else {
            self.emit_load(code, slot);
            code.push(OpCode::IInc as u8);
            code.push(slot);
            code.push(delta as u8);
        }
    }

    fn gen_call(&mut self, code: &mut Vec<u8>, func: SymbolId, call: &FunctionCall) {
        let Some(sym) = call.sym else {
            return;
        };
        let is_zero_arg_println = call.args.is_empty()
            && self
                .symbols
                .function(sym)
                .is_some_and(|f| f.is_builtin && f.name == "println");
        if is_zero_arg_println {
            // Printing nothing is printing the empty string.
            let idx = self.string_const("");
            code.push(OpCode::SLdc as u8);
            push_u16(code, idx);
        }
        for arg in &call.args {
            code.extend(self.gen_expression(func, arg));
        }
        let slot = self.func_slot(sym);
        code.push(OpCode::InvokeStatic as u8);
        push_u16(code, slot);
    }

    fn emit_const(&mut self, code: &mut Vec<u8>, value: &ConstValue) {
        match value {
            ConstValue::Integer(v) => self.emit_integer(code, *v),
            ConstValue::Decimal(v) => {
                let idx = self.number_const(*v);
                code.push(OpCode::Ldc as u8);
                push_u16(code, idx);
            }
            ConstValue::String(v) => {
                let idx = self.string_const(v);
                code.push(OpCode::SLdc as u8);
                push_u16(code, idx);
            }
            ConstValue::Boolean(v) => {
                code.push(if *v {
                    OpCode::BConst1 as u8
                } else {
                    OpCode::BConst0 as u8
                });
            }
        }
    }

    /// Smallest encoding that holds the value: IConst_n, then i8, then
    /// i16, then the constant pool.
    fn emit_integer(&mut self, code: &mut Vec<u8>, value: i64) {
        match value {
            0..=5 => code.push(OpCode::IConst0 as u8 + value as u8),
            -128..=127 => {
                code.push(OpCode::BiPush as u8);
                code.push(value as i8 as u8);
            }
            -32768..=32767 => {
                code.push(OpCode::SiPush as u8);
                push_u16(code, value as i16 as u16);
            }
            _ => {
                let idx = self.integer_const(value);
                code.push(OpCode::Ldc as u8);
                push_u16(code, idx);
            }
        }
    }

    fn emit_load(&self, code: &mut Vec<u8>, slot: u8) {
        match slot {
            0..=3 => code.push(OpCode::ILoad0 as u8 + slot),
            _ => {
                code.push(OpCode::ILoad as u8);
                code.push(slot);
            }
        }
    }

    fn emit_store(&self, code: &mut Vec<u8>, slot: u8) {
        match slot {
            0..=3 => code.push(OpCode::IStore0 as u8 + slot),
            _ => {
                code.push(OpCode::IStore as u8);
                code.push(slot);
            }
        }
    }

    fn slot_of(&self, func: SymbolId, var: SymbolId) -> u8 {
        // The resolver rejects cross-function references, so every variable
        // reaching codegen has a slot in its owning function.
        self.symbols
            .function(func)
            .and_then(|f| f.slot_of(var))
            .expect("variable has a frame slot") as u8
    }
}

fn binary_opcode(op: Op, lhs: &Expression, rhs: &Expression) -> OpCode {
    let string_plus = op == Op::Plus
        && (lhs.ty == Some(Type::Simple(SimpleType::String))
            || rhs.ty == Some(Type::Simple(SimpleType::String)));
    match op {
        Op::Plus if string_plus => OpCode::SAdd,
        Op::Plus => OpCode::IAdd,
        Op::Minus => OpCode::ISub,
        Op::Multiply => OpCode::IMul,
        Op::Divide => OpCode::IDiv,
        Op::Modulus => OpCode::IRem,
        Op::Eq => OpCode::CmpEq,
        Op::Ne => OpCode::CmpNe,
        Op::Greater => OpCode::CmpGt,
        Op::GreaterEq => OpCode::CmpGe,
        Op::Less => OpCode::CmpLt,
        Op::LessEq => OpCode::CmpLe,
        Op::And | Op::BitAnd => OpCode::IAnd,
        Op::Or | Op::BitOr => OpCode::IOr,
        Op::BitXor => OpCode::IXor,
        Op::ShiftLeft => OpCode::IShl,
        Op::ShiftRight => OpCode::IShr,
        _ => OpCode::Pop,
    }
}

fn leaves_value(exp: &Expression) -> bool {
    exp.ty != Some(Type::Simple(SimpleType::Void))
}

/// Worst-case operand stack depth. Every statement starts and ends with an
/// empty stack, so the function maximum is the maximum over its statements'
/// expressions.
fn max_stack_of_stmts(stmts: &[Statement]) -> u16 {
    stmts.iter().map(stmt_depth).max().unwrap_or(0)
}

fn stmt_depth(stmt: &Statement) -> u16 {
    match stmt {
        // Nested functions have their own stack.
        Statement::FunctionDecl(_) => 0,
        Statement::VariableDecl(decl) => decl.init.as_ref().map_or(0, expr_depth),
        Statement::If(if_stmt) => expr_depth(&if_stmt.condition)
            .max(stmt_depth(&if_stmt.then_stmt))
            .max(if_stmt.else_stmt.as_deref().map_or(0, stmt_depth)),
        Statement::For(for_stmt) => {
            let init = match &for_stmt.init {
                Some(ForInit::Decl(decl)) => decl.init.as_ref().map_or(0, expr_depth),
                Some(ForInit::Expr(exp)) => expr_depth(exp),
                None => 0,
            };
            init.max(for_stmt.condition.as_ref().map_or(0, expr_depth))
                .max(for_stmt.increment.as_ref().map_or(0, expr_depth))
                .max(stmt_depth(&for_stmt.body))
        }
        Statement::Return(ret) => ret.exp.as_ref().map_or(0, expr_depth),
        Statement::Block(block) => max_stack_of_stmts(&block.stmts),
        Statement::Expr(stmt) => expr_depth(&stmt.exp),
        Statement::Error(_) => 0,
    }
}

fn expr_depth(exp: &Expression) -> u16 {
    if exp.const_value.is_some()
        && matches!(exp.kind, ExprKind::Binary { .. } | ExprKind::Unary { .. })
    {
        return 1;
    }
    match &exp.kind {
        ExprKind::IntegerLiteral(_)
        | ExprKind::DecimalLiteral(_)
        | ExprKind::StringLiteral(_)
        | ExprKind::BooleanLiteral(_)
        | ExprKind::NullLiteral
        | ExprKind::Variable { .. } => 1,
        ExprKind::Binary { op, lhs, rhs } => match op.compound_base() {
            // load, rhs on top, op, dup
            Some(_) => (1 + expr_depth(rhs)).max(2),
            None if op.is_assign() => expr_depth(rhs) + 1,
            None => expr_depth(lhs).max(1 + expr_depth(rhs)),
        },
        ExprKind::Unary { op, operand, .. } => match op {
            Op::Inc | Op::Dec => 1,
            _ => expr_depth(operand),
        },
        ExprKind::Call(call) => {
            let args = call
                .args
                .iter()
                .enumerate()
                .map(|(i, arg)| i as u16 + expr_depth(arg))
                .max()
                .unwrap_or(1);
            args.max(1)
        }
        ExprKind::Error => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::semantic;
    use indoc::indoc;

    fn compile(src: &str) -> BcModule {
        let (mut program, diagnostics) = Parser::new(src).parse();
        assert!(diagnostics.is_empty(), "parse: {diagnostics:?}");
        let analysis = semantic::analyze(&mut program, false);
        assert_eq!(
            crate::diagnostics::error_count(&analysis.diagnostics),
            0,
            "semantic: {:?}",
            analysis.diagnostics
        );
        generate(&program, &analysis)
    }

    fn function<'m>(module: &'m BcModule, name: &str) -> &'m BcFunction {
        module
            .consts
            .iter()
            .find_map(|c| match c {
                Constant::Function(f) if f.name == name => Some(f),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no function '{name}' in pool"))
    }

    #[test]
    fn pool_starts_with_builtin_stubs() {
        let module = compile("println(1);");
        let names: Vec<_> = module
            .consts
            .iter()
            .take(3)
            .map(|c| match c {
                Constant::Function(f) => f.name.as_str(),
                other => panic!("expected function stub, got {other:?}"),
            })
            .collect();
        assert_eq!(names, ["println", "tick", "integer_to_string"]);
        assert_eq!(module.entry(), Some(3));
    }

    #[test]
    fn straight_line_code_bytes() {
        let module = compile("let a = 2; println(a);");
        let main = function(&module, "main");
        assert_eq!(
            main.code,
            vec![
                OpCode::IConst2 as u8,
                OpCode::IStore0 as u8,
                OpCode::ILoad0 as u8,
                OpCode::InvokeStatic as u8,
                0x00,
                0x00,
                OpCode::Pop as u8,
                OpCode::Return as u8,
            ]
        );
        assert_eq!(main.op_stack_size, 1);
        assert_eq!(main.locals.len(), 1);
    }

    #[test]
    fn if_else_jump_targets_are_absolute() {
        let module = compile("let a = 1; if (a) { println(1); } else { println(2); }");
        let main = function(&module, "main");
        assert_eq!(
            main.code,
            vec![
                OpCode::IConst1 as u8,  // 0
                OpCode::IStore0 as u8,  // 1
                OpCode::ILoad0 as u8,   // 2
                OpCode::IfEq as u8,     // 3, jump to else at 14
                0x00,
                0x0e,
                OpCode::IConst1 as u8,  // 6
                OpCode::InvokeStatic as u8, // 7
                0x00,
                0x00,
                OpCode::Pop as u8,      // 10
                OpCode::Goto as u8,     // 11, jump to end at 19
                0x00,
                0x13,
                OpCode::IConst2 as u8,  // 14
                OpCode::InvokeStatic as u8, // 15
                0x00,
                0x00,
                OpCode::Pop as u8,      // 18
                OpCode::Return as u8,   // 19
            ]
        );
    }

    #[test]
    fn loop_jumps_back_to_its_condition() {
        let module = compile("for (let i = 0; i < 3; i++) { println(i); }");
        let main = function(&module, "main");
        // init is two bytes, so the back edge targets offset 2.
        let goto_at = main
            .code
            .iter()
            .position(|&b| b == OpCode::Goto as u8)
            .unwrap();
        assert_eq!(read_u16(&main.code, goto_at + 1), 2);
        // The exit jump lands on the trailing Return.
        let ifeq_at = main
            .code
            .iter()
            .position(|&b| b == OpCode::IfEq as u8)
            .unwrap();
        assert_eq!(
            read_u16(&main.code, ifeq_at + 1) as usize,
            main.code.len() - 1
        );
    }

    #[test]
    fn small_integers_use_compact_encodings() {
        let module = compile("let a = 5; let b = 100; let c = 1000; let d = 100000;");
        let main = function(&module, "main");
        assert_eq!(main.code[0], OpCode::IConst5 as u8);
        assert_eq!(main.code[2], OpCode::BiPush as u8);
        assert_eq!(main.code[5], OpCode::SiPush as u8);
        assert_eq!(main.code[9], OpCode::Ldc as u8);
        let idx = read_u16(&main.code, 10) as usize;
        assert_eq!(module.consts[idx], Constant::Integer(100000));
    }

    #[test]
    fn booleans_get_their_own_opcodes() {
        let module = compile("let t = true; let f = false;");
        let main = function(&module, "main");
        assert_eq!(main.code[0], OpCode::BConst1 as u8);
        assert_eq!(main.code[2], OpCode::BConst0 as u8);
    }

    #[test]
    fn string_plus_lowers_to_sadd() {
        let module = compile(r#"let s = "a" + "b"; let n = 1 + 2;"#);
        let main = function(&module, "main");
        assert!(main.code.contains(&(OpCode::SAdd as u8)));
        assert!(main.code.contains(&(OpCode::IAdd as u8)));
    }

    #[test]
    fn user_function_pool_entry_carries_its_frame_layout() {
        let module = compile(indoc! {r#"
            function add(a: integer, b: integer): integer {
                let sum = a + b;
                return sum;
            }
            println(add(2, 3));
        "#});
        let add = function(&module, "add");
        let names: Vec<_> = add.locals.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["a", "b", "sum"]);
        assert_eq!(
            add.code,
            vec![
                OpCode::ILoad0 as u8,
                OpCode::ILoad1 as u8,
                OpCode::IAdd as u8,
                OpCode::IStore2 as u8,
                OpCode::ILoad2 as u8,
                OpCode::IReturn as u8,
                OpCode::Return as u8,
            ]
        );
        assert_eq!(add.op_stack_size, 2);
    }

    #[test]
    fn folded_expressions_load_a_single_constant() {
        let (mut program, _) = Parser::new("println(2 + 3 * 4);").parse();
        let analysis = semantic::analyze(&mut program, true);
        assert_eq!(crate::diagnostics::error_count(&analysis.diagnostics), 0);
        let module = generate(&program, &analysis);
        let main = function(&module, "main");
        assert_eq!(main.code[0], OpCode::BiPush as u8);
        assert_eq!(main.code[1], 14);
    }
}

//! Tree-walking interpreter. Walks the annotated AST directly; each
//! function call gets a frame mapping variable symbols to values.

use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ast::{Expression, ExprKind, ForInit, FunctionDecl, Statement};
use crate::backend::{Backend, CompiledUnit, PreparedBackend};
use crate::symbol::{SymbolId, SymbolTable};
use crate::token::Op;
use crate::value::{Value, ValueOpError, ops};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Value(#[from] ValueOpError),
    #[error("call to unresolved function '{0}'")]
    UnresolvedFunction(String),
}

pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn prepare<'a>(&self, unit: &'a CompiledUnit) -> anyhow::Result<Box<dyn PreparedBackend + 'a>> {
        Ok(Box::new(PreparedInterpreter { unit }))
    }
}

struct PreparedInterpreter<'a> {
    unit: &'a CompiledUnit,
}

impl PreparedBackend for PreparedInterpreter<'_> {
    fn run(&self) -> anyhow::Result<String> {
        Ok(run_program(self.unit)?)
    }
}

pub fn run_program(unit: &CompiledUnit) -> Result<String, RuntimeError> {
    let mut exec = Exec {
        symbols: &unit.analysis.symbols,
        functions: collect_functions(&unit.program.body.stmts),
        output: Vec::new(),
    };
    let mut frame = Frame::default();
    for stmt in &unit.program.body.stmts {
        if let Flow::Return(_) = exec.exec_statement(&mut frame, stmt)? {
            break;
        }
    }
    if exec.output.is_empty() {
        Ok(String::new())
    } else {
        Ok(exec.output.join("\n") + "\n")
    }
}

/// Bodies of every function declaration, keyed by symbol, gathered up
/// front so calls need no tree search.
fn collect_functions(stmts: &[Statement]) -> FxHashMap<SymbolId, &FunctionDecl> {
    let mut functions = FxHashMap::default();
    collect_into(stmts, &mut functions);
    functions
}

fn collect_into<'a>(stmts: &'a [Statement], out: &mut FxHashMap<SymbolId, &'a FunctionDecl>) {
    for stmt in stmts {
        match stmt {
            Statement::FunctionDecl(decl) => {
                if let Some(sym) = decl.sym {
                    out.insert(sym, decl);
                }
                collect_into(&decl.body.stmts, out);
            }
            Statement::Block(block) => collect_into(&block.stmts, out),
            Statement::If(if_stmt) => {
                collect_into(std::slice::from_ref(&*if_stmt.then_stmt), out);
                if let Some(else_stmt) = &if_stmt.else_stmt {
                    collect_into(std::slice::from_ref(&**else_stmt), out);
                }
            }
            Statement::For(for_stmt) => {
                collect_into(std::slice::from_ref(&*for_stmt.body), out);
            }
            _ => {}
        }
    }
}

#[derive(Default)]
struct Frame {
    values: FxHashMap<SymbolId, Value>,
}

enum Flow {
    Normal,
    Return(Value),
}

struct Exec<'a> {
    symbols: &'a SymbolTable,
    functions: FxHashMap<SymbolId, &'a FunctionDecl>,
    output: Vec<String>,
}

impl<'a> Exec<'a> {
    fn exec_statement(&mut self, frame: &mut Frame, stmt: &Statement) -> Result<Flow, RuntimeError> {
        match stmt {
            // Bodies were collected before execution started.
            Statement::FunctionDecl(_) | Statement::Error(_) => Ok(Flow::Normal),
            Statement::VariableDecl(decl) => {
                let value = match &decl.init {
                    Some(init) => self.eval(frame, init)?,
                    None => Value::Undefined,
                };
                if let Some(sym) = decl.sym {
                    frame.values.insert(sym, value);
                }
                Ok(Flow::Normal)
            }
            Statement::If(if_stmt) => {
                if self.eval(frame, &if_stmt.condition)?.is_truthy() {
                    self.exec_statement(frame, &if_stmt.then_stmt)
                } else if let Some(else_stmt) = &if_stmt.else_stmt {
                    self.exec_statement(frame, else_stmt)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::For(for_stmt) => {
                match &for_stmt.init {
                    Some(ForInit::Decl(decl)) => {
                        let value = match &decl.init {
                            Some(init) => self.eval(frame, init)?,
                            None => Value::Undefined,
                        };
                        if let Some(sym) = decl.sym {
                            frame.values.insert(sym, value);
                        }
                    }
                    Some(ForInit::Expr(exp)) => {
                        self.eval(frame, exp)?;
                    }
                    None => {}
                }
                loop {
                    if let Some(condition) = &for_stmt.condition {
                        if !self.eval(frame, condition)?.is_truthy() {
                            break;
                        }
                    }
                    if let Flow::Return(value) = self.exec_statement(frame, &for_stmt.body)? {
                        return Ok(Flow::Return(value));
                    }
                    if let Some(increment) = &for_stmt.increment {
                        self.eval(frame, increment)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::Block(block) => {
                for stmt in &block.stmts {
                    if let Flow::Return(value) = self.exec_statement(frame, stmt)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::Return(ret) => {
                let value = match &ret.exp {
                    Some(exp) => self.eval(frame, exp)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Statement::Expr(stmt) => {
                self.eval(frame, &stmt.exp)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn eval(&mut self, frame: &mut Frame, exp: &Expression) -> Result<Value, RuntimeError> {
        match &exp.kind {
            ExprKind::IntegerLiteral(value) => Ok(Value::Integer(*value)),
            ExprKind::DecimalLiteral(value) => Ok(Value::Decimal(*value)),
            ExprKind::StringLiteral(value) => Ok(Value::String(value.clone())),
            ExprKind::BooleanLiteral(value) => Ok(Value::Boolean(*value)),
            ExprKind::NullLiteral => Ok(Value::Null),
            ExprKind::Variable { sym, .. } => Ok(sym
                .and_then(|id| frame.values.get(&id).cloned())
                .unwrap_or(Value::Undefined)),
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_assign() {
                    self.eval_assignment(frame, *op, lhs, rhs)
                } else {
                    let left = self.eval(frame, lhs)?;
                    let right = self.eval(frame, rhs)?;
                    Ok(apply_binary(*op, &left, &right)?)
                }
            }
            ExprKind::Unary {
                op,
                is_prefix,
                operand,
            } => self.eval_unary(frame, *op, *is_prefix, operand),
            ExprKind::Call(call) => {
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.eval(frame, arg)?);
                }
                let Some(sym) = call.sym else {
                    return Err(RuntimeError::UnresolvedFunction(call.name.clone()));
                };
                self.call(sym, &call.name, args)
            }
            ExprKind::Error => Ok(Value::Undefined),
        }
    }

    fn eval_assignment(
        &mut self,
        frame: &mut Frame,
        op: Op,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<Value, RuntimeError> {
        let right = self.eval(frame, rhs)?;
        let ExprKind::Variable { sym: Some(sym), .. } = &lhs.kind else {
            return Ok(Value::Undefined);
        };
        let value = match op.compound_base() {
            None => right,
            Some(base) => {
                let current = frame.values.get(sym).cloned().unwrap_or(Value::Undefined);
                apply_binary(base, &current, &right)?
            }
        };
        frame.values.insert(*sym, value.clone());
        Ok(value)
    }

    fn eval_unary(
        &mut self,
        frame: &mut Frame,
        op: Op,
        is_prefix: bool,
        operand: &Expression,
    ) -> Result<Value, RuntimeError> {
        match op {
            Op::Not => {
                let value = self.eval(frame, operand)?;
                Ok(ops::not(&value))
            }
            Op::Minus => {
                let value = self.eval(frame, operand)?;
                Ok(ops::neg(&value)?)
            }
            Op::Inc | Op::Dec => {
                let ExprKind::Variable { sym: Some(sym), .. } = &operand.kind else {
                    return Ok(Value::Undefined);
                };
                let old = frame.values.get(sym).cloned().unwrap_or(Value::Undefined);
                let one = Value::Integer(1);
                let new = if op == Op::Inc {
                    ops::add(&old, &one)?
                } else {
                    ops::sub(&old, &one)?
                };
                frame.values.insert(*sym, new.clone());
                Ok(if is_prefix { new } else { old })
            }
            _ => Ok(Value::Undefined),
        }
    }

    fn call(
        &mut self,
        sym: SymbolId,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let builtin = self
            .symbols
            .function(sym)
            .filter(|f| f.is_builtin)
            .map(|f| f.name.clone());
        if let Some(name) = builtin {
            return self.call_builtin(&name, args);
        }
        let Some(decl) = self.functions.get(&sym).copied() else {
            return Err(RuntimeError::UnresolvedFunction(name.to_string()));
        };
        let mut frame = Frame::default();
        for (param, value) in decl.params.iter().zip(args) {
            if let Some(sym) = param.sym {
                frame.values.insert(sym, value);
            }
        }
        for stmt in &decl.body.stmts {
            if let Flow::Return(value) = self.exec_statement(&mut frame, stmt)? {
                return Ok(value);
            }
        }
        Ok(Value::Undefined)
    }

    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match name {
            "println" => {
                let line = args.first().map(Value::to_output).unwrap_or_default();
                self.output.push(line);
                Ok(Value::Integer(0))
            }
            "tick" => Ok(Value::Integer(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0),
            )),
            "integer_to_string" => {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(Value::String(value.to_output()))
            }
            _ => Err(RuntimeError::UnresolvedFunction(name.to_string())),
        }
    }
}

fn apply_binary(op: Op, lhs: &Value, rhs: &Value) -> Result<Value, ValueOpError> {
    match op {
        Op::Plus => {
            if matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_)) {
                Ok(ops::concat(lhs, rhs))
            } else {
                ops::add(lhs, rhs)
            }
        }
        Op::Minus => ops::sub(lhs, rhs),
        Op::Multiply => ops::mul(lhs, rhs),
        Op::Divide => ops::div(lhs, rhs),
        Op::Modulus => ops::rem(lhs, rhs),
        Op::Eq => Ok(Value::Boolean(ops::eq(lhs, rhs))),
        Op::Ne => Ok(Value::Boolean(!ops::eq(lhs, rhs))),
        Op::Greater => Ok(Value::Boolean(ops::ordering(">", lhs, rhs)?.is_gt())),
        Op::GreaterEq => Ok(Value::Boolean(ops::ordering(">=", lhs, rhs)?.is_ge())),
        Op::Less => Ok(Value::Boolean(ops::ordering("<", lhs, rhs)?.is_lt())),
        Op::LessEq => Ok(Value::Boolean(ops::ordering("<=", lhs, rhs)?.is_le())),
        Op::And | Op::BitAnd => Ok(ops::and(lhs, rhs)),
        Op::Or | Op::BitOr => Ok(ops::or(lhs, rhs)),
        Op::BitXor => ops::xor(lhs, rhs),
        Op::ShiftLeft => ops::shl(lhs, rhs),
        Op::ShiftRight => ops::shr(lhs, rhs),
        _ => Err(ValueOpError::Unsupported {
            op: op.text(),
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::compile;
    use indoc::indoc;

    fn run(src: &str) -> String {
        let unit = compile(src).expect("compile");
        run_program(&unit).expect("run")
    }

    #[test]
    fn prints_function_result() {
        let output = run(indoc! {r#"
            function add(a: integer, b: integer): integer {
                return a + b;
            }
            println(add(2, 3));
        "#});
        assert_eq!(output, "5\n");
    }

    #[test]
    fn for_loop_counts() {
        let output = run("for (let i = 0; i < 3; i++) { println(i); }");
        assert_eq!(output, "0\n1\n2\n");
    }

    #[test]
    fn string_conversion_in_initializer() {
        let output = run(r#"let s: string = 1 + "x"; println(s);"#);
        assert_eq!(output, "1x\n");
    }

    #[test]
    fn compound_assignment_desugars() {
        let output = run("let a = 10; a += 5; a *= 2; println(a);");
        assert_eq!(output, "30\n");
    }

    #[test]
    fn unassigned_variable_reads_undefined() {
        let output = run("let a: integer; println(a);");
        assert_eq!(output, "undefined\n");
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let unit = compile("let a = 0; println(1 / a);").expect("compile");
        let err = run_program(&unit).unwrap_err();
        assert_eq!(err, RuntimeError::Value(ValueOpError::DivisionByZero));
    }

    #[test]
    fn recursion_works() {
        let output = run(indoc! {r#"
            function fib(n: integer): integer {
                if (n < 2) {
                    return n;
                }
                return fib(n - 1) + fib(n - 2);
            }
            println(fib(10));
        "#});
        assert_eq!(output, "55\n");
    }
}

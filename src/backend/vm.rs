//! Stack-based virtual machine executing compiled modules.
//!
//! Execution keeps an explicit frame stack; each frame holds its function's
//! pool index, an instruction pointer, the local slots, and an operand
//! stack. A well-formed module never underflows or indexes past the pool,
//! so those conditions are reported as corrupt-module errors rather than
//! panics.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::backend::{Backend, CompiledUnit, PreparedBackend};
use crate::bytecode::{self, BcFunction, BcModule, Constant, OpCode, read_u16};
use crate::types::{SimpleType, Type};
use crate::value::{Value, ValueOpError, ops};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error(transparent)]
    Value(#[from] ValueOpError),
    #[error("module has no entry function")]
    NoEntry,
    #[error("corrupt module: {0}")]
    Corrupt(String),
}

pub struct Vm;

impl Vm {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Vm {
    fn name(&self) -> &'static str {
        "vm"
    }

    fn prepare<'a>(&self, unit: &'a CompiledUnit) -> anyhow::Result<Box<dyn PreparedBackend + 'a>> {
        let module = bytecode::generate(&unit.program, &unit.analysis);
        Ok(Box::new(PreparedVm { module }))
    }
}

struct PreparedVm {
    module: BcModule,
}

impl PreparedBackend for PreparedVm {
    fn run(&self) -> anyhow::Result<String> {
        Ok(run_module(&self.module)?)
    }
}

struct Frame {
    func: usize,
    ip: usize,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    fn new(func: usize, locals: usize, op_stack_size: u16) -> Self {
        Self {
            func,
            ip: 0,
            locals: vec![Value::Undefined; locals],
            stack: Vec::with_capacity(op_stack_size as usize),
        }
    }
}

pub fn run_module(module: &BcModule) -> Result<String, VmError> {
    let entry = module.entry().ok_or(VmError::NoEntry)?;
    let mut machine = Machine {
        module,
        frames: Vec::new(),
        output: Vec::new(),
    };
    machine.push_frame(entry, Vec::new())?;
    machine.run()?;
    if machine.output.is_empty() {
        Ok(String::new())
    } else {
        Ok(machine.output.join("\n") + "\n")
    }
}

struct Machine<'a> {
    module: &'a BcModule,
    frames: Vec<Frame>,
    output: Vec<String>,
}

impl<'a> Machine<'a> {
    fn function(&self, index: usize) -> Result<&'a BcFunction, VmError> {
        match self.module.consts.get(index) {
            Some(Constant::Function(func)) => Ok(func),
            _ => Err(VmError::Corrupt(format!(
                "constant {index} is not a function"
            ))),
        }
    }

    fn push_frame(&mut self, func: usize, args: Vec<Value>) -> Result<(), VmError> {
        let target = self.function(func)?;
        let mut frame = Frame::new(func, target.locals.len().max(args.len()), target.op_stack_size);
        for (slot, value) in args.into_iter().enumerate() {
            frame.locals[slot] = value;
        }
        self.frames.push(frame);
        Ok(())
    }

    fn frame(&mut self) -> &mut Frame {
        // A frame is pushed before run() and popped only by returns.
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.frame()
            .stack
            .pop()
            .ok_or_else(|| VmError::Corrupt("operand stack underflow".to_string()))
    }

    fn push(&mut self, value: Value) {
        self.frame().stack.push(value);
    }

    fn binary(&mut self, apply: impl Fn(&Value, &Value) -> Result<Value, ValueOpError>) -> Result<(), VmError> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let value = apply(&lhs, &rhs)?;
        self.push(value);
        Ok(())
    }

    fn run(&mut self) -> Result<(), VmError> {
        while !self.frames.is_empty() {
            let current = self.frame().func;
            let func = self.function(current)?;
            let code = &func.code;
            let ip = self.frame().ip;
            if ip >= code.len() {
                // Fell off the end; behave like a bare return.
                self.exit_frame()?;
                continue;
            }
            let op = OpCode::from_u8(code[ip])
                .ok_or_else(|| VmError::Corrupt(format!("unknown opcode 0x{:02x}", code[ip])))?;
            self.frame().ip = ip + 1 + op.operand_width();

            match op {
                OpCode::AConstNull => self.push(Value::Null),
                OpCode::IConst0
                | OpCode::IConst1
                | OpCode::IConst2
                | OpCode::IConst3
                | OpCode::IConst4
                | OpCode::IConst5 => {
                    self.push(Value::Integer((op as u8 - OpCode::IConst0 as u8) as i64));
                }
                OpCode::BConst0 => self.push(Value::Boolean(false)),
                OpCode::BConst1 => self.push(Value::Boolean(true)),
                OpCode::BiPush => self.push(Value::Integer(code[ip + 1] as i8 as i64)),
                OpCode::SiPush => {
                    self.push(Value::Integer(read_u16(code, ip + 1) as i16 as i64));
                }
                OpCode::Ldc => {
                    let index = read_u16(code, ip + 1) as usize;
                    let value = match self.module.consts.get(index) {
                        Some(Constant::Integer(v)) => Value::Integer(*v),
                        Some(Constant::Number(v)) => Value::Decimal(*v),
                        _ => {
                            return Err(VmError::Corrupt(format!(
                                "constant {index} is not numeric"
                            )));
                        }
                    };
                    self.push(value);
                }
                OpCode::SLdc => {
                    let index = read_u16(code, ip + 1) as usize;
                    let Some(Constant::String(value)) = self.module.consts.get(index) else {
                        return Err(VmError::Corrupt(format!(
                            "constant {index} is not a string"
                        )));
                    };
                    let value = value.clone();
                    self.push(Value::String(value));
                }
                OpCode::ILoad => {
                    let slot = code[ip + 1] as usize;
                    self.load(slot)?;
                }
                OpCode::ILoad0 | OpCode::ILoad1 | OpCode::ILoad2 | OpCode::ILoad3 => {
                    self.load((op as u8 - OpCode::ILoad0 as u8) as usize)?;
                }
                OpCode::IStore => {
                    let slot = code[ip + 1] as usize;
                    self.store(slot)?;
                }
                OpCode::IStore0 | OpCode::IStore1 | OpCode::IStore2 | OpCode::IStore3 => {
                    self.store((op as u8 - OpCode::IStore0 as u8) as usize)?;
                }
                OpCode::Pop => {
                    self.pop()?;
                }
                OpCode::Dup => {
                    let top = self.pop()?;
                    self.push(top.clone());
                    self.push(top);
                }
                OpCode::IAdd => self.binary(ops::add)?,
                OpCode::SAdd => self.binary(|l, r| Ok(ops::concat(l, r)))?,
                OpCode::ISub => self.binary(ops::sub)?,
                OpCode::IMul => self.binary(ops::mul)?,
                OpCode::IDiv => self.binary(ops::div)?,
                OpCode::IRem => self.binary(ops::rem)?,
                OpCode::INeg => {
                    let value = self.pop()?;
                    let value = ops::neg(&value)?;
                    self.push(value);
                }
                OpCode::Not => {
                    let value = self.pop()?;
                    self.push(ops::not(&value));
                }
                OpCode::IShl => self.binary(ops::shl)?,
                OpCode::IShr => self.binary(ops::shr)?,
                OpCode::IAnd => self.binary(|l, r| Ok(ops::and(l, r)))?,
                OpCode::IOr => self.binary(|l, r| Ok(ops::or(l, r)))?,
                OpCode::IXor => self.binary(ops::xor)?,
                OpCode::IInc => {
                    let slot = code[ip + 1] as usize;
                    let delta = code[ip + 2] as i8 as i64;
                    let frame = self.frame();
                    let current = frame
                        .locals
                        .get(slot)
                        .cloned()
                        .ok_or_else(|| VmError::Corrupt(format!("bad local slot {slot}")))?;
                    let updated = ops::add(&current, &Value::Integer(delta))?;
                    self.frame().locals[slot] = updated;
                }
                OpCode::CmpEq => self.binary(|l, r| Ok(Value::Boolean(ops::eq(l, r))))?,
                OpCode::CmpNe => self.binary(|l, r| Ok(Value::Boolean(!ops::eq(l, r))))?,
                OpCode::CmpGt => {
                    self.binary(|l, r| Ok(Value::Boolean(ops::ordering(">", l, r)?.is_gt())))?;
                }
                OpCode::CmpGe => {
                    self.binary(|l, r| Ok(Value::Boolean(ops::ordering(">=", l, r)?.is_ge())))?;
                }
                OpCode::CmpLt => {
                    self.binary(|l, r| Ok(Value::Boolean(ops::ordering("<", l, r)?.is_lt())))?;
                }
                OpCode::CmpLe => {
                    self.binary(|l, r| Ok(Value::Boolean(ops::ordering("<=", l, r)?.is_le())))?;
                }
                OpCode::IfEq => {
                    let target = read_u16(code, ip + 1) as usize;
                    let value = self.pop()?;
                    if !value.is_truthy() {
                        self.frame().ip = target;
                    }
                }
                OpCode::Goto => {
                    self.frame().ip = read_u16(code, ip + 1) as usize;
                }
                OpCode::IReturn => {
                    let value = self.pop()?;
                    self.frames.pop();
                    if let Some(frame) = self.frames.last_mut() {
                        frame.stack.push(value);
                    }
                }
                OpCode::Return => {
                    self.exit_frame()?;
                }
                OpCode::InvokeStatic => {
                    let index = read_u16(code, ip + 1) as usize;
                    self.invoke(index)?;
                }
            }
        }
        Ok(())
    }

    fn load(&mut self, slot: usize) -> Result<(), VmError> {
        let value = self
            .frame()
            .locals
            .get(slot)
            .cloned()
            .ok_or_else(|| VmError::Corrupt(format!("bad local slot {slot}")))?;
        self.push(value);
        Ok(())
    }

    fn store(&mut self, slot: usize) -> Result<(), VmError> {
        let value = self.pop()?;
        let frame = self.frame();
        if slot >= frame.locals.len() {
            return Err(VmError::Corrupt(format!("bad local slot {slot}")));
        }
        frame.locals[slot] = value;
        Ok(())
    }

    /// Arguments were pushed left to right, so they pop into slots in
    /// reverse.
    /// Pops the current frame. A function typed to produce a value that
    /// returns without one yields `undefined` to its caller, matching the
    /// tree-walking backend.
    fn exit_frame(&mut self) -> Result<(), VmError> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        let returns_value = !matches!(
            self.function(frame.func)?.ty.return_type,
            Type::Simple(SimpleType::Void)
        );
        if returns_value {
            if let Some(caller) = self.frames.last_mut() {
                caller.stack.push(Value::Undefined);
            }
        }
        Ok(())
    }

    fn invoke(&mut self, index: usize) -> Result<(), VmError> {
        let target = self.function(index)?;
        let arity = target.ty.param_types.len();
        let mut args = vec![Value::Undefined; arity];
        for slot in (0..arity).rev() {
            args[slot] = self.pop()?;
        }
        if target.is_builtin {
            let result = self.call_builtin(&target.name, args)?;
            self.push(result);
            return Ok(());
        }
        self.push_frame(index, args)
    }

    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Value, VmError> {
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
            _ => Err(VmError::Corrupt(format!("unknown builtin '{name}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::compile;
    use crate::bytecode;
    use indoc::indoc;

    fn run(src: &str) -> String {
        let unit = compile(src).expect("compile");
        let module = bytecode::generate(&unit.program, &unit.analysis);
        run_module(&module).expect("run")
    }

    #[test]
    fn runs_a_function_call() {
        let output = run(indoc! {r#"
            function add(a: integer, b: integer): integer {
                return a + b;
            }
            println(add(2, 3));
        "#});
        assert_eq!(output, "5\n");
    }

    #[test]
    fn loops_and_conditionals() {
        let output = run(indoc! {r#"
            for (let i = 0; i < 5; i++) {
                if (i % 2 == 0) {
                    println(i);
                } else {
                    println("odd");
                }
            }
        "#});
        assert_eq!(output, "0\nodd\n2\nodd\n4\n");
    }

    #[test]
    fn println_with_no_argument_prints_a_blank_line() {
        let output = run(r#"println("a"); println(); println("b");"#);
        assert_eq!(output, "a\n\nb\n");
    }

    #[test]
    fn booleans_print_as_words() {
        let output = run("println(true); println(1 < 2);");
        assert_eq!(output, "true\ntrue\n");
    }

    #[test]
    fn division_by_zero_surfaces_as_an_error() {
        let unit = compile("let a = 0; println(1 / a);").expect("compile");
        let module = bytecode::generate(&unit.program, &unit.analysis);
        let err = run_module(&module).unwrap_err();
        assert_eq!(err, VmError::Value(ValueOpError::DivisionByZero));
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

    #[test]
    fn matches_interpreter_output() {
        let src = indoc! {r#"
            function classify(n: integer): string {
                if (n > 100) {
                    return "big";
                }
                return "small";
            }
            let total = 0;
            for (let i = 1; i <= 10; i++) {
                total += i * i;
            }
            println(classify(total));
            println(total);
            println("total: " + total);
        "#};
        let unit = compile(src).expect("compile");
        let interpreted = crate::backend::interpreter::run_program(&unit).expect("interpret");
        let module = bytecode::generate(&unit.program, &unit.analysis);
        let compiled = run_module(&module).expect("vm");
        assert_eq!(interpreted, compiled);
        assert_eq!(compiled, "big\n385\ntotal: 385\n");
    }

    #[test]
    fn function_without_a_return_yields_undefined() {
        let src = indoc! {r#"
            function f() {
            }
            println(f());
            println("after");
        "#};
        let unit = compile(src).expect("compile");
        let interpreted = crate::backend::interpreter::run_program(&unit).expect("interpret");
        let module = bytecode::generate(&unit.program, &unit.analysis);
        let compiled = run_module(&module).expect("vm");
        assert_eq!(interpreted, compiled);
        assert_eq!(compiled, "undefined\nafter\n");
    }
}

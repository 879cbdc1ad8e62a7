//! Execution backends: the tree-walking interpreter and the bytecode
//! machine. Both run the same analyzed program and must produce identical
//! output; the test harness holds them to that.

pub mod interpreter;
pub mod vm;

use anyhow::{Result, bail};

use crate::ast::Program;
use crate::diagnostics::{self, Diagnostic};
use crate::parser::Parser;
use crate::semantic::{self, Analysis};

/// A parsed and analyzed program, ready for any backend.
#[derive(Debug)]
pub struct CompiledUnit {
    pub program: Program,
    pub analysis: Analysis,
}

/// Runs the frontend and refuses to hand over a program that produced any
/// error diagnostic. Warnings are reported to stderr and do not block.
pub fn compile(source: &str) -> Result<CompiledUnit> {
    let (mut program, mut diagnostics) = Parser::new(source).parse();
    let analysis = semantic::analyze(&mut program, true);
    diagnostics.extend(analysis.diagnostics.iter().cloned());

    let errors = diagnostics::error_count(&diagnostics);
    if errors > 0 {
        bail!("{}\n{} error(s)", format_diagnostics(&diagnostics), errors);
    }
    for warning in &diagnostics {
        eprintln!("{warning}");
    }
    Ok(CompiledUnit { program, analysis })
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Executable artifact produced by a backend `prepare` step.
///
/// Keeps translation and execution separated so benchmarks can measure the
/// phases independently.
pub trait PreparedBackend {
    fn run(&self) -> Result<String>;
}

/// Common interface implemented by each execution backend.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn prepare<'a>(&self, unit: &'a CompiledUnit) -> Result<Box<dyn PreparedBackend + 'a>>;

    fn run(&self, unit: &CompiledUnit) -> Result<String> {
        self.prepare(unit)?.run()
    }
}

pub fn backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(interpreter::Interpreter::new()),
        Box::new(vm::Vm::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_rejects_programs_with_errors() {
        let err = compile("let a = b;").unwrap_err().to_string();
        assert!(err.contains("1 error(s)"), "got: {err}");
        assert!(err.contains("cannot find variable 'b'"), "got: {err}");
    }

    #[test]
    fn both_backends_are_registered() {
        let names: Vec<_> = backends().iter().map(|b| b.name()).collect();
        assert_eq!(names, ["interpreter", "vm"]);
    }
}

use std::path::Path;

use anyhow::{Context, Result, ensure};

use tinyscript::backend::{self, Backend, compile};
use tinyscript::bytecode::{self, io};
use tinyscript::fixtures::{Case, CaseClass, load_cases, normalize_output};

fn expected_stdout(case: &Case) -> Result<String> {
    let stdout_file = case
        .spec
        .expected
        .stdout_file
        .as_deref()
        .with_context(|| format!("Missing stdout_file in {}", case.name))?;
    case.read_text(stdout_file)
}

fn expected_error(case: &Case) -> Result<String> {
    let error_file = case
        .spec
        .expected
        .error_contains_file
        .as_deref()
        .with_context(|| format!("Missing error_contains_file in {}", case.name))?;
    Ok(case.read_text(error_file)?.trim().to_string())
}

fn run_programs_for_backend(backend: &dyn Backend) -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        let source = case.read_source()?;
        match case.spec.class {
            CaseClass::RuntimeSuccess => {
                let expected = expected_stdout(&case)?;
                let unit = compile(&source)
                    .with_context(|| format!("Compiling {}", case.name))?;
                let output = backend.run(&unit).with_context(|| {
                    format!("Backend {} failed for {}", backend.name(), case.name)
                })?;
                assert_eq!(
                    normalize_output(&output),
                    normalize_output(&expected),
                    "Backend {} mismatch for {}",
                    backend.name(),
                    case.name
                );
            }
            CaseClass::CompileError => {
                let expected = expected_error(&case)?;
                let result = compile(&source);
                ensure!(
                    result.is_err(),
                    "Expected compile error in {}, but compilation succeeded",
                    case.name
                );
                let actual = result.expect_err("result checked as err").to_string();
                ensure!(
                    actual.contains(&expected),
                    "Expected compile error containing '{expected}' in {}, got '{actual}'",
                    case.name
                );
            }
            CaseClass::RuntimeError => {
                let expected = expected_error(&case)?;
                let unit = compile(&source)
                    .with_context(|| format!("Compiling {}", case.name))?;
                let result = backend.run(&unit);
                ensure!(
                    result.is_err(),
                    "Expected runtime error for backend {} in {}",
                    backend.name(),
                    case.name
                );
                let actual = result.expect_err("result checked as err").to_string();
                ensure!(
                    actual.contains(&expected),
                    "Expected runtime error containing '{expected}' in {}, got '{actual}'",
                    case.name
                );
            }
        }
    }

    Ok(())
}

#[test]
fn runs_programs_interpreter_backend() -> Result<()> {
    run_programs_for_backend(&backend::interpreter::Interpreter::new())
}

#[test]
fn runs_programs_vm_backend() -> Result<()> {
    run_programs_for_backend(&backend::vm::Vm::new())
}

/// Every successful program must print exactly the same thing on both
/// backends, byte for byte before normalization.
#[test]
fn backends_agree_on_every_program() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;
    let interpreter = backend::interpreter::Interpreter::new();
    let vm = backend::vm::Vm::new();

    for case in cases {
        if !matches!(case.spec.class, CaseClass::RuntimeSuccess) {
            continue;
        }
        let unit = compile(&case.read_source()?)
            .with_context(|| format!("Compiling {}", case.name))?;
        let tree_output = interpreter
            .run(&unit)
            .with_context(|| format!("Interpreter failed for {}", case.name))?;
        let vm_output = vm
            .run(&unit)
            .with_context(|| format!("Machine failed for {}", case.name))?;
        assert_eq!(tree_output, vm_output, "Backend divergence for {}", case.name);
    }

    Ok(())
}

/// Serialized modules must reload into an equal pool and still produce the
/// expected output when executed.
#[test]
fn serialized_modules_survive_a_round_trip() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        if !matches!(case.spec.class, CaseClass::RuntimeSuccess) {
            continue;
        }
        let expected = expected_stdout(&case)?;
        let unit = compile(&case.read_source()?)
            .with_context(|| format!("Compiling {}", case.name))?;
        let module = bytecode::generate(&unit.program, &unit.analysis);
        let restored = io::read_module(&io::write_module(&module))
            .with_context(|| format!("Round-tripping module for {}", case.name))?;
        assert_eq!(restored, module, "Module round-trip mismatch for {}", case.name);
        let output = backend::vm::run_module(&restored)
            .with_context(|| format!("Running restored module for {}", case.name))?;
        assert_eq!(
            normalize_output(&output),
            normalize_output(&expected),
            "Restored module mismatch for {}",
            case.name
        );
    }

    Ok(())
}

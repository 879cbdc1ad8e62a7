use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::backend::Backend;

mod ast;
mod backend;
mod builtins;
mod bytecode;
mod diagnostics;
mod fixtures;
mod parser;
mod scanner;
mod scope;
mod semantic;
mod symbol;
mod token;
mod types;
mod value;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut backend_name = "interpreter".to_string();
    let mut emit_path: Option<String> = None;
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backend" | "-b" => {
                backend_name = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing backend name after {arg}"))?;
            }
            "--emit" | "-e" => {
                emit_path = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("Missing output path after {arg}"))?,
                );
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    // Precompiled modules run directly on the machine.
    if let Some(path) = input_path
        .as_deref()
        .filter(|p| Path::new(p).extension().is_some_and(|ext| ext == "tisc"))
    {
        let bytes = fs::read(path).with_context(|| format!("Reading {path}"))?;
        let module = bytecode::io::read_module(&bytes)
            .with_context(|| format!("Decoding module {path}"))?;
        let output = backend::vm::run_module(&module)?;
        if !output.is_empty() {
            print!("{output}");
        }
        return Ok(());
    }

    let source = if let Some(path) = &input_path {
        fs::read_to_string(path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let unit = backend::compile(&source)?;

    if let Some(path) = emit_path {
        let module = bytecode::generate(&unit.program, &unit.analysis);
        fs::write(&path, bytecode::io::write_module(&module))
            .with_context(|| format!("Writing {path}"))?;
        return Ok(());
    }

    for backend in backend::backends() {
        if backend.name() == backend_name {
            let output = backend.run(&unit)?;
            if !output.is_empty() {
                print!("{output}");
            }
            return Ok(());
        }
    }

    bail!("Unknown backend '{backend_name}'")
}

pub mod ast;
pub mod backend;
pub mod builtins;
pub mod bytecode;
pub mod diagnostics;
pub mod fixtures;
pub mod parser;
pub mod scanner;
pub mod scope;
pub mod semantic;
pub mod symbol;
pub mod token;
pub mod types;
pub mod value;

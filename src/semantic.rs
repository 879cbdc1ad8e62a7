//! Semantic analysis: a fixed sequence of AST passes that annotate the tree
//! and fill the symbol and scope arenas.
//!
//! The order matters. `Enter` creates scopes and symbols, `RefResolver`
//! binds references to them, `TypeChecker` infers and checks types,
//! `TypeConverter` splices in the implicit string conversions the checker
//! allowed, and `LeftValueAttributor` validates assignment targets. The
//! constant folder runs last and only annotates; it can be skipped.

mod const_folder;
mod enter;
mod left_value;
mod ref_resolver;
mod type_checker;
mod type_converter;

use crate::ast::Program;
use crate::builtins::BuiltinRegistry;
use crate::diagnostics::Diagnostic;
use crate::scope::ScopeTree;
use crate::symbol::SymbolTable;

/// Everything the backends need besides the annotated tree itself.
#[derive(Debug)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub scopes: ScopeTree,
    pub builtins: BuiltinRegistry,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn analyze(program: &mut Program, fold_constants: bool) -> Analysis {
    let mut symbols = SymbolTable::new();
    let builtins = BuiltinRegistry::install(&mut symbols);
    let mut scopes = ScopeTree::new();
    let mut diagnostics = Vec::new();

    enter::Enter::run(program, &mut symbols, &mut scopes, &mut diagnostics);
    ref_resolver::RefResolver::run(program, &symbols, &scopes, &builtins, &mut diagnostics);
    type_checker::TypeChecker::run(program, &mut symbols, &mut diagnostics);
    type_converter::TypeConverter::run(program, &builtins);
    left_value::LeftValueAttributor::run(program, &mut diagnostics);
    if fold_constants {
        const_folder::ConstFolder::run(program);
    }

    Analysis {
        symbols,
        scopes,
        builtins,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, Statement};
    use crate::parser::Parser;
    use crate::types::{SimpleType, Type};
    use indoc::indoc;

    fn analyzed(src: &str) -> (Program, Analysis) {
        let (mut program, diagnostics) = Parser::new(src).parse();
        assert!(diagnostics.is_empty(), "parse: {diagnostics:?}");
        let analysis = analyze(&mut program, true);
        (program, analysis)
    }

    fn analyzed_ok(src: &str) -> (Program, Analysis) {
        let (program, analysis) = analyzed(src);
        assert_eq!(
            crate::diagnostics::error_count(&analysis.diagnostics),
            0,
            "semantic: {:?}",
            analysis.diagnostics
        );
        (program, analysis)
    }

    #[test]
    fn unannotated_variable_narrows_from_initializer() {
        let (program, analysis) = analyzed_ok("let a = 10;");
        let [Statement::VariableDecl(decl)] = &program.body.stmts[..] else {
            panic!()
        };
        let var = analysis.symbols.var(decl.sym.unwrap()).unwrap();
        assert_eq!(var.ty, Type::Simple(SimpleType::Integer));
    }

    #[test]
    fn call_before_declaration_resolves() {
        let (program, _) = analyzed_ok(indoc! {r#"
            println(add(2, 3));
            function add(a: integer, b: integer): integer {
                return a + b;
            }
        "#});
        let Statement::Expr(stmt) = &program.body.stmts[0] else {
            panic!()
        };
        let ExprKind::Call(call) = &stmt.exp.kind else {
            panic!()
        };
        assert!(call.sym.is_some());
    }

    #[test]
    fn variable_use_before_declaration_is_an_error() {
        let (_, analysis) = analyzed("println(a); let a = 1;");
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.message.contains("before its declaration")));
    }

    #[test]
    fn duplicate_declaration_in_one_scope_is_an_error() {
        let (_, analysis) = analyzed("let a = 1; let a = 2;");
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.message.contains("duplicate")));
    }

    #[test]
    fn shadowing_in_a_nested_block_is_allowed() {
        let (_, analysis) = analyzed_ok(indoc! {r#"
            let a = 1;
            {
                let a = "inner";
                println(a);
            }
            println(a);
        "#});
        drop(analysis);
    }

    #[test]
    fn assigning_a_string_to_an_integer_is_an_error() {
        let (_, analysis) = analyzed(r#"let a: integer = "nope";"#);
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.message.contains("cannot assign")));
    }

    #[test]
    fn numeric_initializer_for_a_string_gets_a_conversion() {
        let (program, _) = analyzed_ok(r#"let s: string = 1 + "x";"#);
        let [Statement::VariableDecl(decl)] = &program.body.stmts[..] else {
            panic!()
        };
        let ExprKind::Binary { lhs, .. } = &decl.init.as_ref().unwrap().kind else {
            panic!()
        };
        let ExprKind::Call(call) = &lhs.kind else {
            panic!("expected a synthesized conversion call, got {:?}", lhs.kind)
        };
        assert_eq!(call.name, "integer_to_string");
    }

    #[test]
    fn assignment_target_must_be_a_variable() {
        let (_, analysis) = analyzed("1 = 2;");
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.message.contains("assignment")));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let (_, analysis) = analyzed("whatever(1);");
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.message.contains("cannot find function")));
    }

    #[test]
    fn wrong_argument_count_is_an_error() {
        let (_, analysis) = analyzed(indoc! {r#"
            function one(a: integer): integer {
                return a;
            }
            one(1, 2);
        "#});
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.message.contains("argument")));
    }

    #[test]
    fn constant_arithmetic_is_folded() {
        let (program, _) = analyzed_ok("let a = 2 + 3 * 4;");
        let [Statement::VariableDecl(decl)] = &program.body.stmts[..] else {
            panic!()
        };
        assert_eq!(
            decl.init.as_ref().unwrap().const_value,
            Some(crate::ast::ConstValue::Integer(14))
        );
    }

    #[test]
    fn locals_include_params_and_block_variables() {
        let (program, analysis) = analyzed_ok(indoc! {r#"
            function f(a: integer): integer {
                let b = a + 1;
                if (b > 0) {
                    let c = b * 2;
                    return c;
                }
                return b;
            }
        "#});
        let [Statement::FunctionDecl(decl)] = &program.body.stmts[..] else {
            panic!()
        };
        let func = analysis.symbols.function(decl.sym.unwrap()).unwrap();
        let names: Vec<_> = func
            .locals
            .iter()
            .map(|&id| analysis.symbols.get(id).name().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn mixed_numeric_arithmetic_narrows_to_a_union() {
        let (program, analysis) = analyzed_ok("println(1 + 2.5); let m = 1 + 2.5; println(m);");
        let Statement::VariableDecl(decl) = &program.body.stmts[1] else {
            panic!()
        };
        let var = analysis.symbols.var(decl.sym.unwrap()).unwrap();
        assert_eq!(var.ty.name(), "@union:integer|decimal");
    }

    #[test]
    fn global_reference_inside_a_function_is_an_error() {
        let (_, analysis) = analyzed(indoc! {r#"
            let g = 1;
            function f(): integer {
                return g;
            }
            println(f());
        "#});
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.message.contains("outside the current function")));
    }

    #[test]
    fn void_call_result_is_not_a_usable_argument() {
        let (_, analysis) = analyzed("function f(): void { } println(f());");
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.message.contains("argument of type 'void'")));
    }

    #[test]
    fn void_call_result_cannot_initialize_a_variable() {
        let (_, analysis) = analyzed("function f(): void { } let x = f();");
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.message.contains("cannot assign a value of type 'void'")));
    }

    #[test]
    fn void_operand_in_a_comparison_is_an_error() {
        let (_, analysis) = analyzed("function f(): void { } println(f() == 1);");
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d
                .message
                .contains("cannot be applied to a value of type 'void'")));
    }

    #[test]
    fn unused_variable_gets_a_warning() {
        let (_, analysis) = analyzed("let a = 1;");
        assert_eq!(crate::diagnostics::error_count(&analysis.diagnostics), 0);
        let [warning] = &analysis.diagnostics[..] else {
            panic!("expected one warning, got {:?}", analysis.diagnostics)
        };
        assert!(warning.is_warning);
        assert!(warning.message.contains("never used"));
    }
}

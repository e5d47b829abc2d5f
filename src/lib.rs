//! lunic is a compiler front-end and transpiler for Lunic, a statically-typed
//! superset of Lua.
//!
//! The pipeline is strictly linear: [`lexer`] turns source text into tokens,
//! [`parser`] builds the AST, [`type_checker`] validates it in two passes,
//! the opt-in [`optimizer`] folds constants, and [`code_gen`] erases every
//! type and emits plain Lua, optionally recording a [`source_map`].
//!
//! [`compile`] wires the stages together for a single compilation unit.
//! Reading files, discovering `.d.lunic` declaration files, rendering
//! diagnostics, and the command-line surface all live with the caller.

/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The type checker registers declarations and validates statements and
/// expressions, accumulating diagnostics.
pub mod type_checker;

/// The optimizer folds constants and drops dead code, preserving behavior.
pub mod optimizer;

/// The code generator emits target-dialect text from a checked AST.
pub mod code_gen;

/// Source Map v3 building and VLQ encoding.
pub mod source_map;

pub mod ast;
pub mod token;
pub mod types;

use log::debug;
use thiserror::Error;

use crate::{ast::Stmt, source_map::SourceMap};

#[derive(Clone, Debug, PartialEq)]
pub struct CompileConfig {
    pub type_check: bool,
    pub optimize: bool,
    pub source_map: bool,
    pub source_file_name: String,
    pub generated_file_name: String,
}

impl Default for CompileConfig {
    fn default() -> CompileConfig {
        CompileConfig {
            type_check: true,
            optimize: false,
            source_map: false,
            source_file_name: "main.lunic".to_string(),
            generated_file_name: "main.lua".to_string(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lex,
    Parse,
    Type,
}

#[derive(Clone, Debug, PartialEq, Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub file: String,
}

#[derive(Clone, Debug)]
pub struct CompileOutput {
    /// Populated even when diagnostics exist, for debugging; callers should
    /// treat a compilation with errors as failed.
    pub code: String,
    pub source_map: Option<SourceMap>,
    pub errors: Vec<Diagnostic>,
}

/// Compiles one source unit.
///
/// `declarations` holds the contents of the unit's ambient declaration
/// files, already discovered and read by the caller; their statements are
/// parsed first and prepended before checking, so their registrations are
/// visible to the checker's first pass. Only the main source is generated.
pub fn compile(source: &str, declarations: &[&str], config: &CompileConfig) -> CompileOutput {
    let mut errors = Vec::new();

    let mut declaration_statements: Vec<Stmt> = Vec::new();
    for (i, declaration) in declarations.iter().enumerate() {
        let file = format!("<declaration {}>", i + 1);
        let statements = parse_unit(declaration, &file, &mut errors);
        declaration_statements.extend(statements);
    }

    let statements = parse_unit(source, &config.source_file_name, &mut errors);
    debug!(
        "parsed {} statements ({} ambient)",
        statements.len(),
        declaration_statements.len()
    );

    if config.type_check {
        let mut combined = declaration_statements;
        combined.extend(statements.iter().cloned());
        let type_errors = type_checker::check(&combined);
        debug!("type check finished with {} diagnostics", type_errors.len());
        errors.extend(type_errors.into_iter().map(|e| Diagnostic {
            kind: DiagnosticKind::Type,
            message: e.to_string(),
            line: e.position.line,
            column: e.position.column,
            file: config.source_file_name.clone(),
        }));
    }

    let statements = if config.optimize {
        optimizer::optimize(statements)
    } else {
        statements
    };

    let (mut code, source_map) = if config.source_map {
        let mut generator =
            code_gen::Generator::with_source_map(&config.source_file_name, &config.generated_file_name);
        let code = generator.generate(&statements);
        (code, generator.source_map())
    } else {
        (code_gen::generate(&statements), None)
    };

    if let Some(map) = &source_map {
        let map_file = format!("{}.map", config.generated_file_name);
        code.push_str(&map.comment(Some(&map_file)));
        code.push('\n');
    }

    debug!("generated {} bytes", code.len());
    CompileOutput {
        code,
        source_map,
        errors,
    }
}

/// Lexes and parses one input, folding both stages' diagnostics into the
/// shared error list.
fn parse_unit(source: &str, file: &str, errors: &mut Vec<Diagnostic>) -> Vec<Stmt> {
    let (tokens, lex_errors) = lexer::tokenize(source);
    errors.extend(lex_errors.into_iter().map(|e| {
        let position = e.position();
        Diagnostic {
            kind: DiagnosticKind::Lex,
            message: e.to_string(),
            line: position.line,
            column: position.column,
            file: file.to_string(),
        }
    }));

    let (statements, parse_errors) = parser::Parser::new(tokens).parse();
    errors.extend(parse_errors.into_iter().map(|e| Diagnostic {
        kind: if e.is_lexical() {
            DiagnosticKind::Lex
        } else {
            DiagnosticKind::Parse
        },
        message: e.to_string(),
        line: e.position.line,
        column: e.position.column,
        file: file.to_string(),
    }));

    statements
}

//! The code generator: walks the checked AST and emits target-dialect text.
//!
//! Types never reach this stage; interfaces, type aliases and ambient
//! declarations emit nothing. Classes lower to metatable-linked tables with
//! a `.new` factory, enums to plain tables, imports to `require` bindings.
//! With source maps enabled, the generator keeps a generated-position cursor
//! and records a mapping at the start of every emitted statement.

use std::collections::HashMap;

use crate::{
    ast::{BinaryOp, ClassDecl, EnumDecl, Expr, Stmt, TableEntry, UnaryOp},
    source_map::{Builder, SourceMap},
    types::format_number,
};

pub struct Generator {
    indent: usize,
    /// Known class names, mapped to their parent class (if any); calls to
    /// these names are rewritten into `.new` constructions.
    classes: HashMap<String, Option<String>>,
    /// Parent of the class currently being generated, for `super` lowering.
    current_parent: Option<String>,
    map: Option<MapState>,
}

struct MapState {
    builder: Builder,
    line: u32,
    column: u32,
}

/// Generates code without a source map.
pub fn generate(statements: &[Stmt]) -> String {
    Generator::new().generate(statements)
}

impl Generator {
    pub fn new() -> Generator {
        Generator {
            indent: 0,
            classes: HashMap::new(),
            current_parent: None,
            map: None,
        }
    }

    pub fn with_source_map(source_file: &str, generated_file: &str) -> Generator {
        Generator {
            indent: 0,
            classes: HashMap::new(),
            current_parent: None,
            map: Some(MapState {
                builder: Builder::new(source_file, generated_file),
                line: 1,
                column: 0,
            }),
        }
    }

    pub fn generate(&mut self, statements: &[Stmt]) -> String {
        let mut output = String::new();
        for (i, stmt) in statements.iter().enumerate() {
            let code = self.statement(stmt);
            if code.is_empty() {
                continue;
            }
            self.track_statement(stmt);
            self.write(&code);
            output.push_str(&code);
            // Blank line between top-level statements.
            if i < statements.len() - 1 {
                self.write("\n");
                output.push('\n');
            }
        }
        output
    }

    pub fn source_map(&self) -> Option<SourceMap> {
        self.map.as_ref().map(|state| state.builder.build())
    }

    /// Records a mapping from the current generated position to the
    /// statement's originating token. Source columns become 0-based here.
    fn track_statement(&mut self, stmt: &Stmt) {
        let Some(state) = self.map.as_mut() else {
            return;
        };
        let position = stmt.token().position;
        if position.line == 0 {
            return; // Synthesized node with no source location.
        }
        state.builder.add_mapping(
            state.line,
            state.column,
            position.line,
            position.column.saturating_sub(1),
            None,
        );
    }

    /// Advances the generated-position cursor over emitted text.
    fn write(&mut self, text: &str) {
        let Some(state) = self.map.as_mut() else {
            return;
        };
        for c in text.chars() {
            if c == '\n' {
                state.line += 1;
                state.column = 0;
            } else {
                state.column += 1;
            }
        }
    }

    // Statements

    fn statement(&mut self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Variable { name, value, .. } => {
                let mut out = format!("{}local {}", self.pad(), name.lexeme);
                if let Some(value) = value {
                    out.push_str(" = ");
                    out.push_str(&self.expression(value));
                }
                out.push('\n');
                out
            }
            Stmt::Function(decl) => {
                let Some(body) = &decl.body else {
                    return String::new();
                };
                let params: Vec<_> = decl
                    .parameters
                    .iter()
                    .map(|p| p.name.lexeme.clone())
                    .collect();
                let mut out = format!(
                    "{}function {}({})\n",
                    self.pad(),
                    decl.name.lexeme,
                    params.join(", ")
                );
                self.indent += 1;
                for stmt in &body.statements {
                    out.push_str(&self.statement(stmt));
                }
                self.indent -= 1;
                out.push_str(&self.pad());
                out.push_str("end\n");
                out
            }
            Stmt::Return { value, .. } => {
                let mut out = format!("{}return", self.pad());
                if let Some(value) = value {
                    out.push(' ');
                    out.push_str(&self.expression(value));
                }
                out.push('\n');
                out
            }
            Stmt::If {
                condition,
                consequence,
                alternative,
                ..
            } => {
                let mut out = format!("{}if {} then\n", self.pad(), self.expression(condition));
                self.indent += 1;
                for stmt in &consequence.statements {
                    out.push_str(&self.statement(stmt));
                }
                self.indent -= 1;
                if let Some(alternative) = alternative {
                    out.push_str(&self.pad());
                    out.push_str("else\n");
                    self.indent += 1;
                    for stmt in &alternative.statements {
                        out.push_str(&self.statement(stmt));
                    }
                    self.indent -= 1;
                }
                out.push_str(&self.pad());
                out.push_str("end\n");
                out
            }
            Stmt::While {
                condition, body, ..
            } => {
                let mut out = format!("{}while {} do\n", self.pad(), self.expression(condition));
                self.indent += 1;
                for stmt in &body.statements {
                    out.push_str(&self.statement(stmt));
                }
                self.indent -= 1;
                out.push_str(&self.pad());
                out.push_str("end\n");
                out
            }
            Stmt::NumericFor {
                variable,
                start,
                end,
                step,
                body,
                ..
            } => {
                let mut out = format!(
                    "{}for {} = {}, {}",
                    self.pad(),
                    variable.lexeme,
                    self.expression(start),
                    self.expression(end)
                );
                if let Some(step) = step {
                    out.push_str(", ");
                    out.push_str(&self.expression(step));
                }
                out.push_str(" do\n");
                self.indent += 1;
                for stmt in &body.statements {
                    out.push_str(&self.statement(stmt));
                }
                self.indent -= 1;
                out.push_str(&self.pad());
                out.push_str("end\n");
                out
            }
            Stmt::GenericFor {
                variable,
                iterator,
                body,
                ..
            } => {
                let mut out = format!(
                    "{}for {} in {} do\n",
                    self.pad(),
                    variable.lexeme,
                    self.expression(iterator)
                );
                self.indent += 1;
                for stmt in &body.statements {
                    out.push_str(&self.statement(stmt));
                }
                self.indent -= 1;
                out.push_str(&self.pad());
                out.push_str("end\n");
                out
            }
            Stmt::Do { body, .. } => {
                let mut out = format!("{}do\n", self.pad());
                self.indent += 1;
                for stmt in &body.statements {
                    out.push_str(&self.statement(stmt));
                }
                self.indent -= 1;
                out.push_str(&self.pad());
                out.push_str("end\n");
                out
            }
            Stmt::Break { .. } => format!("{}break\n", self.pad()),
            // Bare blocks come from the optimizer replacing constant
            // conditionals; their statements emit in place.
            Stmt::Block(block) => {
                let mut out = String::new();
                for stmt in &block.statements {
                    out.push_str(&self.statement(stmt));
                }
                out
            }
            Stmt::Expression { expr } => {
                format!("{}{}\n", self.pad(), self.expression(expr))
            }
            Stmt::Assignment { target, value, .. } => {
                format!(
                    "{}{} = {}\n",
                    self.pad(),
                    self.expression(target),
                    self.expression(value)
                )
            }
            Stmt::Class(decl) => self.class_declaration(decl),
            Stmt::Enum(decl) => self.enum_declaration(decl),
            // Type-only declarations vanish.
            Stmt::Interface(_) | Stmt::TypeAlias(_) | Stmt::Declare { .. } => String::new(),
            Stmt::Export { statement, .. } => self.statement(statement),
            Stmt::Import {
                names,
                wildcard,
                module,
                ..
            } => self.import(names, *wildcard, module),
        }
    }

    /// A class becomes a table with an `__index` self-reference, a `.new`
    /// factory wrapping the constructor, and colon-form methods. A parent
    /// class links through a metatable so inherited methods resolve.
    fn class_declaration(&mut self, decl: &ClassDecl) -> String {
        let name = &decl.name.lexeme;
        let parent = decl.parent.as_ref().map(|p| p.lexeme.clone());
        self.classes.insert(name.clone(), parent.clone());
        let previous_parent = std::mem::replace(&mut self.current_parent, parent.clone());

        let mut chunks: Vec<String> = Vec::new();

        let mut header = format!("{}local {} = {{}}\n", self.pad(), name);
        header.push_str(&format!("{}{}.__index = {}\n", self.pad(), name, name));
        if let Some(parent) = &parent {
            header.push_str(&format!(
                "{}setmetatable({}, {{ __index = {} }})\n",
                self.pad(),
                name,
                parent
            ));
        }
        for property in &decl.properties {
            if let (true, Some(value)) = (property.is_static, &property.value) {
                header.push_str(&format!(
                    "{}{}.{} = {}\n",
                    self.pad(),
                    name,
                    property.name.lexeme,
                    self.expression(value)
                ));
            }
        }
        chunks.push(header);

        // The factory exists even without a declared constructor, since
        // construction calls always rewrite to `.new`.
        let params: Vec<_> = decl
            .constructor
            .iter()
            .flat_map(|c| &c.parameters)
            .map(|p| p.name.lexeme.clone())
            .collect();
        let mut factory = format!("{}function {}.new({})\n", self.pad(), name, params.join(", "));
        self.indent += 1;
        factory.push_str(&format!(
            "{}local self = setmetatable({{}}, {})\n",
            self.pad(),
            name
        ));
        for property in &decl.properties {
            if let (false, Some(value)) = (property.is_static, &property.value) {
                factory.push_str(&format!(
                    "{}self.{} = {}\n",
                    self.pad(),
                    property.name.lexeme,
                    self.expression(value)
                ));
            }
        }
        if let Some(body) = decl.constructor.as_ref().and_then(|c| c.body.as_ref()) {
            for stmt in &body.statements {
                factory.push_str(&self.statement(stmt));
            }
        }
        factory.push_str(&format!("{}return self\n", self.pad()));
        self.indent -= 1;
        factory.push_str(&self.pad());
        factory.push_str("end\n");
        chunks.push(factory);

        for method in &decl.methods {
            let Some(body) = &method.body else {
                continue; // Abstract methods have nothing to emit.
            };
            let separator = if method.is_static { "." } else { ":" };
            let params: Vec<_> = method
                .parameters
                .iter()
                .map(|p| p.name.lexeme.clone())
                .collect();
            let mut out = format!(
                "{}function {}{}{}({})\n",
                self.pad(),
                name,
                separator,
                method.name.lexeme,
                params.join(", ")
            );
            self.indent += 1;
            for stmt in &body.statements {
                out.push_str(&self.statement(stmt));
            }
            self.indent -= 1;
            out.push_str(&self.pad());
            out.push_str("end\n");
            chunks.push(out);
        }

        self.current_parent = previous_parent;
        chunks.join("\n")
    }

    /// An enum is a table of its members: explicit values where given, the
    /// member's 0-based declaration index otherwise.
    fn enum_declaration(&mut self, decl: &EnumDecl) -> String {
        let mut out = format!("{}local {} = {{\n", self.pad(), decl.name.lexeme);
        self.indent += 1;
        for (i, member) in decl.members.iter().enumerate() {
            out.push_str(&self.pad());
            out.push_str(&member.name.lexeme);
            out.push_str(" = ");
            match &member.value {
                Some(value) => out.push_str(&self.expression(value)),
                None => out.push_str(&i.to_string()),
            }
            out.push_str(",\n");
        }
        self.indent -= 1;
        out.push_str(&self.pad());
        out.push_str("}\n");
        out
    }

    fn import(&self, names: &[crate::token::Token], wildcard: bool, module: &str) -> String {
        let mut out = String::new();
        if wildcard {
            let binding = module
                .rsplit('/')
                .next()
                .unwrap_or(module)
                .trim_end_matches(".lunic");
            out.push_str(&format!(
                "{}local {} = require(\"{}\")\n",
                self.pad(),
                binding,
                module
            ));
        } else {
            let temp = format!("_{}", module.replace(['/', '.'], "_"));
            out.push_str(&format!(
                "{}local {} = require(\"{}\")\n",
                self.pad(),
                temp,
                module
            ));
            for name in names {
                out.push_str(&format!(
                    "{}local {} = {}.{}\n",
                    self.pad(),
                    name.lexeme,
                    temp,
                    name.lexeme
                ));
            }
        }
        out
    }

    // Expressions

    fn expression(&self, expr: &Expr) -> String {
        match expr {
            Expr::Identifier { token } => token.lexeme.clone(),
            Expr::Number { token, value } => {
                if token.lexeme.is_empty() {
                    format_number(*value)
                } else {
                    token.lexeme.clone()
                }
            }
            Expr::String { token } => format!("\"{}\"", escape_string(&token.lexeme)),
            Expr::Boolean { value, .. } => {
                if *value { "true" } else { "false" }.to_string()
            }
            Expr::Nil { .. } => "nil".to_string(),
            Expr::SelfValue { .. } => "self".to_string(),
            Expr::Super { .. } => self.super_target(),
            Expr::Table { entries, .. } => {
                let parts: Vec<_> = entries
                    .iter()
                    .map(|entry| match entry {
                        TableEntry::Value(value) => self.expression(value),
                        TableEntry::Pair { key, value } => {
                            format!("{} = {}", key.lexeme, self.expression(value))
                        }
                        TableEntry::Computed { key, value } => {
                            format!("[{}] = {}", self.expression(key), self.expression(value))
                        }
                    })
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Expr::Prefix {
                operator, operand, ..
            } => {
                let op = match operator {
                    UnaryOp::Minus => "-",
                    // `!` is not a target-dialect operator.
                    UnaryOp::Not | UnaryOp::Bang => "not",
                };
                let rhs = self.expression(operand);
                if matches!(**operand, Expr::Infix { .. } | Expr::Prefix { .. }) {
                    format!("{op} ({rhs})")
                } else {
                    format!("{op} {rhs}")
                }
            }
            Expr::Infix {
                operator,
                left,
                right,
                ..
            } => {
                let mut lhs = self.expression(left);
                let mut rhs = self.expression(right);
                if needs_parens_in_infix(left, *operator, true) {
                    lhs = format!("({lhs})");
                }
                if needs_parens_in_infix(right, *operator, false) {
                    rhs = format!("({rhs})");
                }
                format!("{} {} {}", lhs, operator.as_str(), rhs)
            }
            Expr::Call {
                callee, arguments, ..
            } => self.call(callee, arguments),
            Expr::Member {
                object, property, ..
            } => {
                let object = match object.as_ref() {
                    Expr::Super { .. } => self.super_target(),
                    other => self.expression(other),
                };
                format!("{}.{}", object, property.lexeme)
            }
            Expr::Index { object, index, .. } => {
                format!("{}[{}]", self.expression(object), self.expression(index))
            }
        }
    }

    fn call(&self, callee: &Expr, arguments: &[Expr]) -> String {
        let args: Vec<_> = arguments.iter().map(|a| self.expression(a)).collect();
        let args = args.join(", ");

        match callee {
            // `super(...)` runs the parent's factory.
            Expr::Super { .. } => format!("{}.new({})", self.super_target(), args),
            // `super.m(...)` dispatches the parent's method with the
            // current receiver.
            Expr::Member {
                object, property, ..
            } if matches!(object.as_ref(), Expr::Super { .. }) => {
                if args.is_empty() {
                    format!("{}.{}(self)", self.super_target(), property.lexeme)
                } else {
                    format!("{}.{}(self, {})", self.super_target(), property.lexeme, args)
                }
            }
            // A call to a known class name is a construction.
            Expr::Identifier { token } if self.classes.contains_key(&token.lexeme) => {
                format!("{}.new({})", token.lexeme, args)
            }
            other => format!("{}({})", self.expression(other), args),
        }
    }

    fn super_target(&self) -> String {
        self.current_parent
            .clone()
            .unwrap_or_else(|| "super".to_string())
    }

    fn pad(&self) -> String {
        "    ".repeat(self.indent)
    }
}

impl Default for Generator {
    fn default() -> Generator {
        Generator::new()
    }
}

/// Parenthesizes an infix operand only when required: lower-precedence
/// children always, and same-precedence children on the right of a
/// left-associative operator. `^` is the one right-associative operator.
fn needs_parens_in_infix(expr: &Expr, parent: BinaryOp, is_left: bool) -> bool {
    let Expr::Infix {
        operator: child, ..
    } = expr
    else {
        return false;
    };
    let parent_precedence = operator_precedence(parent);
    let child_precedence = operator_precedence(*child);
    if child_precedence < parent_precedence {
        return true;
    }
    child_precedence == parent_precedence && !is_left && parent != BinaryOp::Pow
}

fn operator_precedence(op: BinaryOp) -> u8 {
    use BinaryOp::*;
    match op {
        Or => 1,
        And => 2,
        Eq | NotEq | Lt | Gt | LtEq | GtEq => 3,
        Concat => 4,
        Add | Sub => 5,
        Mul | Div | Mod => 6,
        Pow => 8,
    }
}

/// The inverse of the lexer's escape processing.
fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

//! The opt-in optimizer: a pure AST-to-AST pass.
//!
//! Constant folding, short-circuit simplification, constant-condition `if`
//! replacement, and elimination of statements following a `return` or
//! `break`. Runs after checking, never looks at types, and preserves the
//! observable behavior of the generated program; in particular, divisions
//! and modulos by zero are left alone.

use crate::{
    ast::{BinaryOp, Block, ClassDecl, Expr, Stmt, UnaryOp},
    token::{Token, TokenKind},
    types::format_number,
};

pub fn optimize(statements: Vec<Stmt>) -> Vec<Stmt> {
    let mut optimized = Vec::with_capacity(statements.len());
    for stmt in statements {
        if let Some(stmt) = optimize_statement(stmt) {
            optimized.push(stmt);
        }
    }
    optimized
}

fn optimize_statement(stmt: Stmt) -> Option<Stmt> {
    Some(match stmt {
        Stmt::Variable {
            token,
            name,
            is_const,
            ty,
            value,
        } => Stmt::Variable {
            token,
            name,
            is_const,
            ty,
            value: value.map(optimize_expression),
        },
        Stmt::Return { token, value } => Stmt::Return {
            token,
            value: value.map(optimize_expression),
        },
        Stmt::Expression { expr } => Stmt::Expression {
            expr: optimize_expression(expr),
        },
        Stmt::Assignment {
            token,
            target,
            value,
        } => Stmt::Assignment {
            token,
            target,
            value: optimize_expression(value),
        },
        Stmt::If {
            token,
            condition,
            consequence,
            alternative,
        } => {
            let condition = optimize_expression(condition);
            if let Expr::Boolean { value, .. } = condition {
                // A constant condition selects its branch outright.
                return if value {
                    Some(Stmt::Block(optimize_block(consequence)))
                } else {
                    alternative.map(|alt| Stmt::Block(optimize_block(alt)))
                };
            }
            Stmt::If {
                token,
                condition,
                consequence: optimize_block(consequence),
                alternative: alternative.map(optimize_block),
            }
        }
        Stmt::While {
            token,
            condition,
            body,
        } => Stmt::While {
            token,
            condition: optimize_expression(condition),
            body: optimize_block(body),
        },
        Stmt::NumericFor {
            token,
            variable,
            start,
            end,
            step,
            body,
        } => Stmt::NumericFor {
            token,
            variable,
            start: optimize_expression(start),
            end: optimize_expression(end),
            step: step.map(optimize_expression),
            body: optimize_block(body),
        },
        Stmt::GenericFor {
            token,
            variable,
            iterator,
            body,
        } => Stmt::GenericFor {
            token,
            variable,
            iterator: optimize_expression(iterator),
            body: optimize_block(body),
        },
        Stmt::Do { token, body } => Stmt::Do {
            token,
            body: optimize_block(body),
        },
        Stmt::Block(block) => Stmt::Block(optimize_block(block)),
        Stmt::Function(mut decl) => {
            decl.body = decl.body.map(optimize_block);
            Stmt::Function(decl)
        }
        Stmt::Class(decl) => Stmt::Class(optimize_class(decl)),
        Stmt::Export { token, statement } => Stmt::Export {
            token,
            statement: Box::new(optimize_statement(*statement)?),
        },
        other => other,
    })
}

fn optimize_class(mut decl: ClassDecl) -> ClassDecl {
    if let Some(ctor) = decl.constructor.as_mut() {
        ctor.body = ctor.body.take().map(optimize_block);
    }
    for method in &mut decl.methods {
        method.body = method.body.take().map(optimize_block);
    }
    for property in &mut decl.properties {
        property.value = property.value.take().map(optimize_expression);
    }
    decl
}

fn optimize_block(block: Block) -> Block {
    let mut optimized = Vec::with_capacity(block.statements.len());
    for stmt in block.statements {
        let terminates = matches!(stmt, Stmt::Return { .. } | Stmt::Break { .. });
        if let Some(stmt) = optimize_statement(stmt) {
            optimized.push(stmt);
        }
        // Anything after a return or break in the same block is dead.
        if terminates {
            break;
        }
    }
    Block {
        token: block.token,
        statements: optimized,
    }
}

fn optimize_expression(expr: Expr) -> Expr {
    match expr {
        Expr::Infix {
            token,
            operator,
            left,
            right,
        } => optimize_infix(token, operator, *left, *right),
        Expr::Prefix {
            token,
            operator,
            operand,
        } => optimize_prefix(token, operator, *operand),
        Expr::Call {
            token,
            callee,
            arguments,
        } => Expr::Call {
            token,
            callee,
            arguments: arguments.into_iter().map(optimize_expression).collect(),
        },
        other => other,
    }
}

fn optimize_infix(token: Token, operator: BinaryOp, left: Expr, right: Expr) -> Expr {
    let left = optimize_expression(left);
    let right = optimize_expression(right);

    if let (Expr::Number { value: a, .. }, Expr::Number { value: b, .. }) = (&left, &right) {
        if let Some(folded) = fold_numeric(operator, *a, *b) {
            return folded;
        }
    }

    if operator == BinaryOp::Concat {
        if let (Expr::String { token: a }, Expr::String { token: b }) = (&left, &right) {
            let value = format!("{}{}", a.lexeme, b.lexeme);
            return Expr::String {
                token: Token::synthetic(TokenKind::String, value),
            };
        }
    }

    // Short-circuit rewrites only look at the left operand; the right one
    // may have effects.
    if let Expr::Boolean { value, .. } = left {
        match operator {
            BinaryOp::And => return if value { right } else { left },
            BinaryOp::Or => return if value { left } else { right },
            _ => {}
        }
    }

    Expr::Infix {
        token,
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn fold_numeric(operator: BinaryOp, a: f64, b: f64) -> Option<Expr> {
    let number = |value: f64| {
        Some(Expr::Number {
            token: Token::synthetic(TokenKind::Number, format_number(value)),
            value,
        })
    };
    let boolean = |value: bool| {
        Some(Expr::Boolean {
            token: Token::synthetic(
                if value { TokenKind::True } else { TokenKind::False },
                if value { "true" } else { "false" },
            ),
            value,
        })
    };

    match operator {
        BinaryOp::Add => number(a + b),
        BinaryOp::Sub => number(a - b),
        BinaryOp::Mul => number(a * b),
        // Division and modulo by zero are preserved verbatim.
        BinaryOp::Div if b == 0.0 => None,
        BinaryOp::Div => number(a / b),
        BinaryOp::Mod if b == 0.0 => None,
        // Floor modulo, matching the target dialect.
        BinaryOp::Mod => number(a - (a / b).floor() * b),
        BinaryOp::Pow => number(a.powf(b)),
        BinaryOp::Eq => boolean(a == b),
        BinaryOp::NotEq => boolean(a != b),
        BinaryOp::Lt => boolean(a < b),
        BinaryOp::LtEq => boolean(a <= b),
        BinaryOp::Gt => boolean(a > b),
        BinaryOp::GtEq => boolean(a >= b),
        _ => None,
    }
}

fn optimize_prefix(token: Token, operator: UnaryOp, operand: Expr) -> Expr {
    let operand = optimize_expression(operand);

    match operator {
        UnaryOp::Not | UnaryOp::Bang => {
            if let Expr::Boolean { value, .. } = operand {
                return Expr::Boolean {
                    token: Token::synthetic(
                        if value { TokenKind::False } else { TokenKind::True },
                        if value { "false" } else { "true" },
                    ),
                    value: !value,
                };
            }
        }
        UnaryOp::Minus => {
            if let Expr::Number { value, .. } = operand {
                let negated = -value;
                return Expr::Number {
                    token: Token::synthetic(TokenKind::Number, format_number(negated)),
                    value: negated,
                };
            }
        }
    }

    Expr::Prefix {
        token,
        operator,
        operand: Box::new(operand),
    }
}

use thiserror::Error;

use crate::{
    ast::{
        BinaryOp, Block, ClassDecl, ClassMethod, ClassProperty, ConstructorDecl, EnumDecl,
        EnumMember, Expr, FunctionDecl, InterfaceDecl, InterfaceMethod, InterfaceProperty,
        Parameter, Stmt, TableEntry, TypeAliasDecl, TypeExpr, UnaryOp, Visibility,
    },
    token::{Position, Token, TokenKind},
};

/// Errors are recorded on the parser as they happen; `Err(())` only signals
/// "give up on the current statement and resynchronize".
type Result<T, E = ()> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("expected next token to be {expected}, got {got} instead")]
    Unexpected { expected: String, got: String },
    #[error("no prefix parse function for {got} found")]
    NoPrefix { got: String },
    #[error("could not parse {literal:?} as number")]
    InvalidNumber { literal: String },
    #[error("unknown character {character:?}")]
    IllegalCharacter { character: String },
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("expected a type expression, got {got}")]
    MalformedType { got: String },
}

impl ParseError {
    /// Whether this diagnostic originated in the lexer (an illegal byte the
    /// parser surfaced on the lexer's behalf).
    pub fn is_lexical(&self) -> bool {
        matches!(self.kind, ParseErrorKind::IllegalCharacter { .. })
    }
}

/// Binding strength, low to high. Derived `Ord` follows declaration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Equality,
    Relational,
    Concat,
    Additive,
    Multiplicative,
    Unary,
    Member,
    Call,
}

fn precedence_of(kind: TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        Eq | NotEq | NotEqLua => Precedence::Equality,
        Lt | Gt | LtEq | GtEq => Precedence::Relational,
        TokenKind::Concat => Precedence::Concat,
        Plus | Minus => Precedence::Additive,
        Asterisk | Slash | Percent => Precedence::Multiplicative,
        Dot => Precedence::Member,
        LBracket | LParen => Precedence::Call,
        _ => Precedence::Lowest,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    errors: Vec<ParseError>,
}

/// Convenience wrapper: lexes and parses a whole program.
pub fn parse_program(src: &str) -> (Vec<Stmt>, Vec<ParseError>) {
    let (tokens, _) = crate::lexer::tokenize(src);
    Parser::new(tokens).parse()
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Parser {
        // The cursor helpers rely on a trailing EOF.
        if tokens.last().map_or(true, |t| !t.is_eof()) {
            tokens.push(Token::synthetic(TokenKind::Eof, ""));
        }
        Parser {
            tokens,
            cursor: 0,
            errors: Vec::new(),
        }
    }

    pub fn parse(mut self) -> (Vec<Stmt>, Vec<ParseError>) {
        let mut statements = Vec::new();
        while !self.current().is_eof() {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.synchronize(),
            }
        }
        (statements, self.errors)
    }

    // Statements

    fn parse_statement(&mut self) -> Result<Stmt> {
        use TokenKind::*;
        match self.current().kind {
            Function => self.parse_function(false).map(Stmt::Function),
            Return => self.parse_return(),
            Local | Const => self.parse_variable(false),
            If => self.parse_if(),
            While => self.parse_while(),
            For => self.parse_for(),
            Do => self.parse_do(),
            Break => {
                let token = self.advance();
                Ok(Stmt::Break { token })
            }
            Class => self.parse_class(false, false).map(Stmt::Class),
            Abstract => {
                self.advance();
                self.expect(Class)?;
                self.back();
                self.parse_class(true, false).map(Stmt::Class)
            }
            Interface => self.parse_interface().map(Stmt::Interface),
            Enum => self.parse_enum().map(Stmt::Enum),
            // `type` only opens an alias declaration when a name follows;
            // otherwise it is an ordinary identifier (C-KW rule).
            Type if self.peek().kind == Identifier => {
                self.parse_type_alias().map(Stmt::TypeAlias)
            }
            Declare => self.parse_declare(),
            Export => {
                let token = self.advance();
                let statement = Box::new(self.parse_statement()?);
                Ok(Stmt::Export { token, statement })
            }
            Import => self.parse_import(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        if self.current().kind == TokenKind::Assign {
            let token = self.advance();
            if !matches!(
                expr,
                Expr::Identifier { .. } | Expr::Member { .. } | Expr::Index { .. }
            ) {
                self.error_at(
                    ParseErrorKind::InvalidAssignmentTarget,
                    expr.token().position,
                );
                return Err(());
            }
            let value = self.parse_expression(Precedence::Lowest)?;
            return Ok(Stmt::Assignment {
                token,
                target: expr,
                value,
            });
        }
        Ok(Stmt::Expression { expr })
    }

    fn parse_variable(&mut self, ambient: bool) -> Result<Stmt> {
        let token = self.advance();
        let is_const = token.kind == TokenKind::Const;
        let name = self.expect(TokenKind::Identifier)?;

        let ty = if self.current().kind == TokenKind::Colon {
            self.advance();
            Some(self.parse_type_expression()?)
        } else {
            None
        };

        let value = if !ambient && self.current().kind == TokenKind::Assign {
            self.advance();
            Some(self.parse_expression(Precedence::Lowest)?)
        } else {
            None
        };

        Ok(Stmt::Variable {
            token,
            name,
            is_const,
            ty,
            value,
        })
    }

    fn parse_function(&mut self, ambient: bool) -> Result<FunctionDecl> {
        let token = self.advance();
        let name = self.expect(TokenKind::Identifier)?;
        let generic_params = self.parse_generic_params()?;
        self.expect(TokenKind::LParen)?;
        let parameters = self.parse_parameters()?;
        let return_type = self.parse_return_annotation()?;
        let body = if ambient {
            None
        } else {
            Some(self.parse_block_until_end()?)
        };
        Ok(FunctionDecl {
            token,
            name,
            generic_params,
            parameters,
            return_type,
            body,
        })
    }

    /// `<T, U>` between a declaration name and its parameter list.
    fn parse_generic_params(&mut self) -> Result<Vec<Token>> {
        let mut params = Vec::new();
        if self.current().kind != TokenKind::Lt {
            return Ok(params);
        }
        self.advance();
        params.push(self.expect(TokenKind::Identifier)?);
        while self.current().kind == TokenKind::Comma {
            self.advance();
            params.push(self.expect(TokenKind::Identifier)?);
        }
        self.expect(TokenKind::Gt)?;
        Ok(params)
    }

    /// Parses `name[: type], ...` up to and including the closing paren.
    fn parse_parameters(&mut self) -> Result<Vec<Parameter>> {
        let mut parameters = Vec::new();
        if self.current().kind == TokenKind::RParen {
            self.advance();
            return Ok(parameters);
        }
        loop {
            let name = self.expect(TokenKind::Identifier)?;
            let ty = if self.current().kind == TokenKind::Colon {
                self.advance();
                Some(self.parse_type_expression()?)
            } else {
                None
            };
            parameters.push(Parameter { name, ty });
            if self.current().kind != TokenKind::Comma {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;
        Ok(parameters)
    }

    fn parse_return_annotation(&mut self) -> Result<Option<TypeExpr>> {
        if self.current().kind == TokenKind::Colon {
            self.advance();
            Ok(Some(self.parse_type_expression()?))
        } else {
            Ok(None)
        }
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        let token = self.advance();
        let value = match self.current().kind {
            TokenKind::End | TokenKind::Else | TokenKind::Eof => None,
            _ => Some(self.parse_expression(Precedence::Lowest)?),
        };
        Ok(Stmt::Return { token, value })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let token = self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::Then)?;
        let consequence = self.parse_block(&[TokenKind::Else, TokenKind::End])?;
        let alternative = if self.current().kind == TokenKind::Else {
            self.advance();
            Some(self.parse_block(&[TokenKind::End])?)
        } else {
            None
        };
        self.expect(TokenKind::End)?;
        Ok(Stmt::If {
            token,
            condition,
            consequence,
            alternative,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let token = self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_block_until_end()?;
        Ok(Stmt::While {
            token,
            condition,
            body,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let token = self.advance();
        let variable = self.expect(TokenKind::Identifier)?;
        match self.current().kind {
            TokenKind::Assign => {
                self.advance();
                let start = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::Comma)?;
                let end = self.parse_expression(Precedence::Lowest)?;
                let step = if self.current().kind == TokenKind::Comma {
                    self.advance();
                    Some(self.parse_expression(Precedence::Lowest)?)
                } else {
                    None
                };
                self.expect(TokenKind::Do)?;
                let body = self.parse_block_until_end()?;
                Ok(Stmt::NumericFor {
                    token,
                    variable,
                    start,
                    end,
                    step,
                    body,
                })
            }
            TokenKind::In => {
                self.advance();
                let iterator = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::Do)?;
                let body = self.parse_block_until_end()?;
                Ok(Stmt::GenericFor {
                    token,
                    variable,
                    iterator,
                    body,
                })
            }
            _ => {
                self.unexpected("= or in");
                Err(())
            }
        }
    }

    fn parse_do(&mut self) -> Result<Stmt> {
        let token = self.advance();
        let body = self.parse_block_until_end()?;
        Ok(Stmt::Do { token, body })
    }

    fn parse_block_until_end(&mut self) -> Result<Block> {
        let block = self.parse_block(&[TokenKind::End])?;
        self.expect(TokenKind::End)?;
        Ok(block)
    }

    /// Parses statements until one of `terminators` (or EOF) is the current
    /// token. The terminator is left unconsumed.
    fn parse_block(&mut self, terminators: &[TokenKind]) -> Result<Block> {
        let token = self.current().clone();
        let mut statements = Vec::new();
        while !terminators.contains(&self.current().kind) && !self.current().is_eof() {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.synchronize(),
            }
        }
        Ok(Block { token, statements })
    }

    fn parse_class(&mut self, is_abstract: bool, ambient: bool) -> Result<ClassDecl> {
        let token = self.advance();
        let name = self.expect(TokenKind::Identifier)?;
        let generic_params = self.parse_generic_params()?;

        let parent = if self.current().kind == TokenKind::Extends {
            self.advance();
            Some(self.expect(TokenKind::Identifier)?)
        } else {
            None
        };

        let mut implements = Vec::new();
        if self.current().kind == TokenKind::Implements {
            self.advance();
            implements.push(self.expect(TokenKind::Identifier)?);
            while self.current().kind == TokenKind::Comma {
                self.advance();
                implements.push(self.expect(TokenKind::Identifier)?);
            }
        }

        let mut decl = ClassDecl {
            token,
            name,
            is_abstract,
            generic_params,
            parent,
            implements,
            properties: Vec::new(),
            methods: Vec::new(),
            constructor: None,
        };
        while self.current().kind != TokenKind::End && !self.current().is_eof() {
            if self.parse_class_member(&mut decl, ambient).is_err() {
                self.synchronize();
            }
        }
        self.expect(TokenKind::End)?;
        Ok(decl)
    }

    fn parse_class_member(&mut self, decl: &mut ClassDecl, ambient: bool) -> Result<()> {
        let visibility = match self.current().kind {
            TokenKind::Public => {
                self.advance();
                Visibility::Public
            }
            TokenKind::Private => {
                self.advance();
                Visibility::Private
            }
            TokenKind::Protected => {
                self.advance();
                Visibility::Protected
            }
            _ => Visibility::Public,
        };

        let mut is_static = false;
        let mut is_abstract = false;
        let mut is_readonly = false;
        loop {
            match self.current().kind {
                TokenKind::Static => is_static = true,
                TokenKind::Abstract => is_abstract = true,
                TokenKind::Readonly => is_readonly = true,
                _ => break,
            }
            self.advance();
        }

        if self.current().kind == TokenKind::Constructor {
            let token = self.advance();
            self.expect(TokenKind::LParen)?;
            let parameters = self.parse_parameters()?;
            let body = if ambient {
                None
            } else {
                Some(self.parse_block_until_end()?)
            };
            decl.constructor = Some(ConstructorDecl {
                token,
                parameters,
                body,
            });
            return Ok(());
        }

        let name = self.expect(TokenKind::Identifier)?;
        match self.current().kind {
            TokenKind::Colon => {
                self.advance();
                let ty = self.parse_type_expression()?;
                let value = if !ambient && self.current().kind == TokenKind::Assign {
                    self.advance();
                    Some(self.parse_expression(Precedence::Lowest)?)
                } else {
                    None
                };
                decl.properties.push(ClassProperty {
                    name,
                    visibility,
                    is_static,
                    is_readonly,
                    ty,
                    value,
                });
                Ok(())
            }
            TokenKind::LParen => {
                self.advance();
                let parameters = self.parse_parameters()?;
                let return_type = self.parse_return_annotation()?;
                // Abstract methods normally stop at the signature; a body is
                // only picked up when the next token can't open another
                // member, so the checker can reject it.
                let body = if ambient {
                    None
                } else if is_abstract && !starts_unambiguous_statement(self.current().kind) {
                    None
                } else {
                    Some(self.parse_block_until_end()?)
                };
                decl.methods.push(ClassMethod {
                    name,
                    visibility,
                    is_static,
                    is_abstract,
                    parameters,
                    return_type,
                    body,
                });
                Ok(())
            }
            _ => {
                self.unexpected(": or (");
                Err(())
            }
        }
    }

    fn parse_interface(&mut self) -> Result<InterfaceDecl> {
        let token = self.advance();
        let name = self.expect(TokenKind::Identifier)?;

        let mut extends = Vec::new();
        if self.current().kind == TokenKind::Extends {
            self.advance();
            extends.push(self.expect(TokenKind::Identifier)?);
            while self.current().kind == TokenKind::Comma {
                self.advance();
                extends.push(self.expect(TokenKind::Identifier)?);
            }
        }

        let mut properties = Vec::new();
        let mut methods = Vec::new();
        while self.current().kind != TokenKind::End && !self.current().is_eof() {
            let member = self.expect(TokenKind::Identifier)?;
            match self.current().kind {
                TokenKind::Colon => {
                    self.advance();
                    let ty = self.parse_type_expression()?;
                    properties.push(InterfaceProperty { name: member, ty });
                }
                TokenKind::LParen => {
                    self.advance();
                    let parameters = self.parse_parameters()?;
                    let return_type = self.parse_return_annotation()?;
                    methods.push(InterfaceMethod {
                        name: member,
                        parameters,
                        return_type,
                    });
                }
                _ => {
                    self.unexpected(": or (");
                    return Err(());
                }
            }
        }
        self.expect(TokenKind::End)?;
        Ok(InterfaceDecl {
            token,
            name,
            extends,
            properties,
            methods,
        })
    }

    fn parse_enum(&mut self) -> Result<EnumDecl> {
        let token = self.advance();
        let name = self.expect(TokenKind::Identifier)?;
        let mut members = Vec::new();
        while self.current().kind != TokenKind::End && !self.current().is_eof() {
            let member = self.expect(TokenKind::Identifier)?;
            let value = if self.current().kind == TokenKind::Assign {
                self.advance();
                Some(self.parse_expression(Precedence::Lowest)?)
            } else {
                None
            };
            members.push(EnumMember {
                name: member,
                value,
            });
            if self.current().kind == TokenKind::Comma {
                self.advance();
            }
        }
        self.expect(TokenKind::End)?;
        Ok(EnumDecl {
            token,
            name,
            members,
        })
    }

    fn parse_type_alias(&mut self) -> Result<TypeAliasDecl> {
        let token = self.advance();
        let name = self.expect(TokenKind::Identifier)?;
        let generic_params = self.parse_generic_params()?;

        if self.current().kind == TokenKind::Assign {
            self.advance();
            let aliased = self.parse_type_expression()?;
            return Ok(TypeAliasDecl {
                token,
                name,
                generic_params,
                aliased: Some(aliased),
                shape: Vec::new(),
            });
        }

        // Object-shape form: `type Name  x: number  y: number  end`.
        let mut shape = Vec::new();
        while self.current().kind != TokenKind::End && !self.current().is_eof() {
            let member = self.expect(TokenKind::Identifier)?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type_expression()?;
            shape.push(InterfaceProperty { name: member, ty });
        }
        self.expect(TokenKind::End)?;
        Ok(TypeAliasDecl {
            token,
            name,
            generic_params,
            aliased: None,
            shape,
        })
    }

    fn parse_declare(&mut self) -> Result<Stmt> {
        let token = self.advance();
        let declaration = match self.current().kind {
            TokenKind::Function => self.parse_function(true).map(Stmt::Function)?,
            TokenKind::Local | TokenKind::Const => self.parse_variable(true)?,
            TokenKind::Class => self.parse_class(false, true).map(Stmt::Class)?,
            TokenKind::Abstract => {
                self.advance();
                self.expect(TokenKind::Class)?;
                self.back();
                self.parse_class(true, true).map(Stmt::Class)?
            }
            TokenKind::Interface => self.parse_interface().map(Stmt::Interface)?,
            TokenKind::Enum => self.parse_enum().map(Stmt::Enum)?,
            TokenKind::Type => self.parse_type_alias().map(Stmt::TypeAlias)?,
            _ => {
                self.unexpected("a declaration");
                return Err(());
            }
        };
        Ok(Stmt::Declare {
            token,
            declaration: Box::new(declaration),
        })
    }

    fn parse_import(&mut self) -> Result<Stmt> {
        let token = self.advance();
        let mut names = Vec::new();
        let wildcard = match self.current().kind {
            TokenKind::Asterisk => {
                self.advance();
                true
            }
            TokenKind::LBrace => {
                self.advance();
                names.push(self.expect(TokenKind::Identifier)?);
                while self.current().kind == TokenKind::Comma {
                    self.advance();
                    names.push(self.expect(TokenKind::Identifier)?);
                }
                self.expect(TokenKind::RBrace)?;
                false
            }
            _ => {
                self.unexpected("* or {");
                return Err(());
            }
        };
        self.expect(TokenKind::From)?;
        let module = self.expect(TokenKind::String)?;
        Ok(Stmt::Import {
            token,
            names,
            wildcard,
            module: module.lexeme,
        })
    }

    // Expressions

    fn parse_expression(&mut self, min: Precedence) -> Result<Expr> {
        let mut left = self.parse_prefix()?;
        while min < precedence_of(self.current().kind) {
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        use TokenKind::*;
        let token = self.current().clone();
        match token.kind {
            Identifier => {
                self.advance();
                Ok(Expr::Identifier { token })
            }
            // C-KW rule: the context-aware keywords read as plain
            // identifiers in value positions.
            StringType | Table | Type => {
                self.advance();
                Ok(Expr::Identifier { token })
            }
            Number => {
                self.advance();
                match token.lexeme.parse::<f64>() {
                    Ok(value) => Ok(Expr::Number { token, value }),
                    Err(_) => {
                        self.error_at(
                            ParseErrorKind::InvalidNumber {
                                literal: token.lexeme.clone(),
                            },
                            token.position,
                        );
                        Err(())
                    }
                }
            }
            String => {
                self.advance();
                Ok(Expr::String { token })
            }
            True | False => {
                self.advance();
                Ok(Expr::Boolean {
                    value: token.kind == True,
                    token,
                })
            }
            Nil => {
                self.advance();
                Ok(Expr::Nil { token })
            }
            SelfKw => {
                self.advance();
                Ok(Expr::SelfValue { token })
            }
            Super => {
                self.advance();
                Ok(Expr::Super { token })
            }
            LBrace => self.parse_table_literal(),
            Minus | Not | Bang => {
                self.advance();
                let operator = match token.kind {
                    Minus => UnaryOp::Minus,
                    Not => UnaryOp::Not,
                    _ => UnaryOp::Bang,
                };
                let operand = Box::new(self.parse_expression(Precedence::Unary)?);
                Ok(Expr::Prefix {
                    token,
                    operator,
                    operand,
                })
            }
            LParen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(RParen)?;
                Ok(expr)
            }
            Illegal => {
                self.advance();
                self.error_at(
                    ParseErrorKind::IllegalCharacter {
                        character: token.lexeme.clone(),
                    },
                    token.position,
                );
                Err(())
            }
            _ => {
                self.error_at(
                    ParseErrorKind::NoPrefix {
                        got: token.kind.to_string(),
                    },
                    token.position,
                );
                Err(())
            }
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::LParen => {
                self.advance();
                let mut arguments = Vec::new();
                if self.current().kind != TokenKind::RParen {
                    arguments.push(self.parse_expression(Precedence::Lowest)?);
                    while self.current().kind == TokenKind::Comma {
                        self.advance();
                        arguments.push(self.parse_expression(Precedence::Lowest)?);
                    }
                }
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Call {
                    token,
                    callee: Box::new(left),
                    arguments,
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let index = Box::new(self.parse_expression(Precedence::Lowest)?);
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Index {
                    token,
                    object: Box::new(left),
                    index,
                })
            }
            TokenKind::Dot => {
                self.advance();
                let property = self.expect_member_name()?;
                Ok(Expr::Member {
                    token,
                    object: Box::new(left),
                    property,
                })
            }
            kind => match BinaryOp::from_token(kind) {
                Some(operator) => {
                    self.advance();
                    let right =
                        Box::new(self.parse_expression(precedence_of(kind))?);
                    Ok(Expr::Infix {
                        token,
                        operator,
                        left: Box::new(left),
                        right,
                    })
                }
                None => {
                    self.unexpected("an infix operator");
                    Err(())
                }
            },
        }
    }

    fn parse_table_literal(&mut self) -> Result<Expr> {
        let token = self.advance();
        let mut entries = Vec::new();
        while self.current().kind != TokenKind::RBrace && !self.current().is_eof() {
            let entry = match self.current().kind {
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expression(Precedence::Lowest)?;
                    self.expect(TokenKind::RBracket)?;
                    self.expect(TokenKind::Assign)?;
                    let value = self.parse_expression(Precedence::Lowest)?;
                    TableEntry::Computed { key, value }
                }
                TokenKind::Identifier if self.peek().kind == TokenKind::Assign => {
                    let key = self.advance();
                    self.advance();
                    let value = self.parse_expression(Precedence::Lowest)?;
                    TableEntry::Pair { key, value }
                }
                _ => TableEntry::Value(self.parse_expression(Precedence::Lowest)?),
            };
            entries.push(entry);
            if self.current().kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Table { token, entries })
    }

    // Type expressions
    //
    // Unions compose at the lowest precedence over members parsed by
    // `parse_non_union_type`, which never re-enters union parsing. This is
    // what keeps unions flat.

    fn parse_type_expression(&mut self) -> Result<TypeExpr> {
        let first = self.parse_non_union_type()?;
        if self.current().kind != TokenKind::Pipe {
            return Ok(first);
        }
        let token = first.token().clone();
        let mut members = vec![first];
        while self.current().kind == TokenKind::Pipe {
            self.advance();
            members.push(self.parse_non_union_type()?);
        }
        Ok(TypeExpr::union_of(token, members))
    }

    fn parse_non_union_type(&mut self) -> Result<TypeExpr> {
        let mut base = self.parse_base_type()?;
        loop {
            match self.current().kind {
                TokenKind::LBracket if self.peek().kind == TokenKind::RBracket => {
                    let token = self.advance();
                    self.advance();
                    base = TypeExpr::Array {
                        token,
                        element: Box::new(base),
                    };
                }
                TokenKind::Lt => {
                    let token = self.advance();
                    let mut arguments = vec![self.parse_type_expression()?];
                    while self.current().kind == TokenKind::Comma {
                        self.advance();
                        arguments.push(self.parse_type_expression()?);
                    }
                    self.expect(TokenKind::Gt)?;
                    base = TypeExpr::Generic {
                        token,
                        base: Box::new(base),
                        arguments,
                    };
                }
                TokenKind::Question => {
                    let token = self.advance();
                    base = TypeExpr::Optional {
                        token,
                        base: Box::new(base),
                    };
                }
                _ => return Ok(base),
            }
        }
    }

    fn parse_base_type(&mut self) -> Result<TypeExpr> {
        use TokenKind::*;
        let token = self.current().clone();
        match token.kind {
            // In type positions the primitive meaning of context-aware
            // keywords wins; `string` resolves like any named type.
            Identifier | StringType => {
                self.advance();
                Ok(TypeExpr::Name { token })
            }
            Nil => {
                self.advance();
                Ok(TypeExpr::Nil { token })
            }
            String => {
                self.advance();
                Ok(TypeExpr::StringLiteral { token })
            }
            Number => {
                self.advance();
                match token.lexeme.parse::<f64>() {
                    Ok(value) => Ok(TypeExpr::NumberLiteral { token, value }),
                    Err(_) => {
                        self.error_at(
                            ParseErrorKind::InvalidNumber {
                                literal: token.lexeme.clone(),
                            },
                            token.position,
                        );
                        Err(())
                    }
                }
            }
            Table => {
                self.advance();
                self.expect(Lt)?;
                let key = Box::new(self.parse_type_expression()?);
                self.expect(Comma)?;
                let value = Box::new(self.parse_type_expression()?);
                self.expect(Gt)?;
                Ok(TypeExpr::Table { token, key, value })
            }
            LParen => {
                self.advance();
                let mut elements = Vec::new();
                if self.current().kind != RParen {
                    elements.push(self.parse_function_type_parameter()?);
                    while self.current().kind == Comma {
                        self.advance();
                        elements.push(self.parse_function_type_parameter()?);
                    }
                }
                self.expect(RParen)?;
                if self.current().kind == Arrow {
                    self.advance();
                    let return_type = Box::new(self.parse_type_expression()?);
                    Ok(TypeExpr::Function {
                        token,
                        parameters: elements,
                        return_type: Some(return_type),
                    })
                } else {
                    Ok(TypeExpr::Tuple { token, elements })
                }
            }
            // `function(a: number): void`, the declaration-file spelling of
            // a function type.
            Function => {
                self.advance();
                self.expect(LParen)?;
                let mut parameters = Vec::new();
                if self.current().kind != RParen {
                    parameters.push(self.parse_function_type_parameter()?);
                    while self.current().kind == Comma {
                        self.advance();
                        parameters.push(self.parse_function_type_parameter()?);
                    }
                }
                self.expect(RParen)?;
                let return_type = if self.current().kind == Colon {
                    self.advance();
                    Some(Box::new(self.parse_type_expression()?))
                } else {
                    None
                };
                Ok(TypeExpr::Function {
                    token,
                    parameters,
                    return_type,
                })
            }
            _ => {
                self.error_at(
                    ParseErrorKind::MalformedType {
                        got: token.kind.to_string(),
                    },
                    token.position,
                );
                Err(())
            }
        }
    }

    /// A function-type parameter may be a bare type or a `name: type` pair;
    /// only the type matters.
    fn parse_function_type_parameter(&mut self) -> Result<TypeExpr> {
        if self.current().kind == TokenKind::Identifier && self.peek().kind == TokenKind::Colon {
            self.advance();
            self.advance();
        }
        self.parse_type_expression()
    }

    // Cursor plumbing

    fn current(&self) -> &Token {
        self.token_at(self.cursor)
    }

    fn peek(&self) -> &Token {
        self.token_at(self.cursor + 1)
    }

    fn token_at(&self, index: usize) -> &Token {
        // The token stream always ends with EOF; clamp to it.
        self.tokens
            .get(index)
            .or_else(|| self.tokens.last())
            .expect("token stream is never empty")
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.cursor + 1 < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    fn back(&mut self) {
        self.cursor -= 1;
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current().kind == kind {
            Ok(self.advance())
        } else {
            self.unexpected(&kind.to_string());
            Err(())
        }
    }

    /// Member names after `.` also admit the context-aware keywords.
    fn expect_member_name(&mut self) -> Result<Token> {
        let kind = self.current().kind;
        if kind == TokenKind::Identifier || kind.is_context_keyword() {
            Ok(self.advance())
        } else {
            self.unexpected("identifier");
            Err(())
        }
    }

    fn unexpected(&mut self, expected: &str) {
        let token = self.current().clone();
        self.error_at(
            ParseErrorKind::Unexpected {
                expected: expected.to_string(),
                got: token.kind.to_string(),
            },
            token.position,
        );
    }

    fn error_at(&mut self, kind: ParseErrorKind, position: Position) {
        self.errors.push(ParseError { kind, position });
    }

    /// Skips forward to a safe anchor: the start of the next statement, or
    /// just past an `end`, so one mistake yields one diagnostic.
    fn synchronize(&mut self) {
        use TokenKind::*;
        loop {
            match self.current().kind {
                Eof => return,
                End => {
                    self.advance();
                    return;
                }
                Function | Return | Local | Const | If | While | For | Do | Break | Class
                | Abstract | Interface | Enum | Declare | Export | Import => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

/// Token kinds that can only begin a statement, never a class member. Used
/// to decide whether an abstract method is (illegally) followed by a body.
fn starts_unambiguous_statement(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        Return
            | Local
            | Const
            | If
            | While
            | For
            | Do
            | Break
            | SelfKw
            | Super
            | Number
            | String
            | True
            | False
            | Nil
            | Not
            | Bang
            | Minus
            | LParen
    )
}

//! The type checker.
//!
//! Two passes over the statement list: pass 1 registers every type-level
//! declaration (classes, interfaces, enums, aliases, including those wrapped
//! in `declare`/`export`), pass 2 checks statements and expressions against a
//! lexically scoped environment.
//!
//! Every failed check appends a diagnostic and checking continues; `any` is
//! the recovery type. Nothing here aborts.

use std::{
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use thiserror::Error;

use crate::{
    ast::{
        BinaryOp, Block, ClassDecl, EnumDecl, Expr, FunctionDecl, InterfaceDecl, Stmt, TableEntry,
        TypeAliasDecl, TypeExpr, UnaryOp, Visibility,
    },
    token::{Position, Token},
    types::{ClassType, EnumType, FunctionType, GenericAlias, InterfaceType, Type},
};

#[derive(Clone, Debug, PartialEq, Error)]
#[error("{kind}")]
pub struct TypeError {
    pub kind: TypeErrorKind,
    pub position: Position,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum TypeErrorKind {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Unknown type '{name}'")]
    UnknownType { name: String },
    #[error("Cannot assign type '{value}' to variable of type '{declared}'")]
    InvalidDeclaration { value: String, declared: String },
    #[error("Cannot assign type '{value}' to type '{target}'")]
    InvalidAssignment { value: String, target: String },
    #[error("Cannot assign to const variable '{name}'")]
    ConstReassignment { name: String },
    #[error("Cannot assign to readonly property '{name}'")]
    ReadonlyAssignment { name: String },
    #[error("Return statement outside of function")]
    ReturnOutsideFunction,
    #[error("Function must return a value of type '{expected}'")]
    MissingReturnValue { expected: String },
    #[error("Cannot return type '{value}' from function with return type '{expected}'")]
    InvalidReturn { value: String, expected: String },
    #[error("If condition must be boolean, got '{got}'")]
    NonBooleanIfCondition { got: String },
    #[error("While condition must be boolean, got '{got}'")]
    NonBooleanWhileCondition { got: String },
    #[error("For loop start must be number, got '{got}'")]
    NonNumericForStart { got: String },
    #[error("For loop end must be number, got '{got}'")]
    NonNumericForEnd { got: String },
    #[error("For loop step must be number, got '{got}'")]
    NonNumericForStep { got: String },
    #[error("Cannot iterate over type '{got}'")]
    NotIterable { got: String },
    #[error("Cannot call type '{got}'")]
    NotCallable { got: String },
    #[error("Function expects {expected} arguments, got {got}")]
    WrongArgumentCount { expected: usize, got: usize },
    #[error("Argument {index}: cannot pass type '{got}' to parameter of type '{expected}'")]
    InvalidArgument {
        index: usize,
        got: String,
        expected: String,
    },
    #[error("Type '{ty}' has no property or method '{name}'")]
    UnknownMember { ty: String, name: String },
    #[error("Enum '{ty}' has no member '{name}'")]
    UnknownEnumMember { ty: String, name: String },
    #[error("Array index must be number, got '{got}'")]
    InvalidArrayIndex { got: String },
    #[error("Table key must be '{expected}', got '{got}'")]
    InvalidTableKey { expected: String, got: String },
    #[error("Unary operator '{op}' cannot be applied to type '{got}'")]
    InvalidUnaryOperand { op: String, got: String },
    #[error("Operator '{op}' cannot be applied to type '{got}'")]
    InvalidBinaryOperand { op: String, got: String },
    #[error("Interface '{name}' not found")]
    UnknownInterface { name: String },
    #[error("Class '{name}' not found")]
    UnknownClass { name: String },
    #[error("Circular inheritance detected for class '{name}'")]
    CircularInheritance { name: String },
    #[error("Generic type '{name}' expects {expected} type arguments, got {got}")]
    WrongTypeArgumentCount {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("Cannot access {visibility} {member_kind} '{name}' of class '{class}'")]
    InaccessibleMember {
        visibility: &'static str,
        member_kind: &'static str,
        name: String,
        class: String,
    },
    #[error("Cannot instantiate abstract class '{name}'")]
    AbstractInstantiation { name: String },
    #[error("Abstract method '{name}' can only be declared in an abstract class")]
    AbstractMethodOutsideAbstractClass { name: String },
    #[error("Abstract method '{name}' should not have an implementation")]
    AbstractMethodWithBody { name: String },
    #[error("Class '{class}' must implement abstract method '{method}' from parent class '{parent}'")]
    UnimplementedAbstractMethod {
        class: String,
        method: String,
        parent: String,
    },
    #[error("Method '{method}' override has {got} parameters, but parent method has {expected} parameters")]
    OverrideParameterCount {
        method: String,
        got: usize,
        expected: usize,
    },
    #[error("Method '{method}' override parameter {index} has type '{got}', but parent method expects '{expected}'")]
    OverrideParameterType {
        method: String,
        index: usize,
        got: String,
        expected: String,
    },
    #[error("Method '{method}' override has return type '{got}', but parent method returns '{expected}'")]
    OverrideReturnType {
        method: String,
        got: String,
        expected: String,
    },
    #[error("Method '{method}' override cannot reduce visibility from {parent} to {child}")]
    OverrideVisibilityReduced {
        method: String,
        parent: &'static str,
        child: &'static str,
    },
    #[error("'super' can only be used inside a class")]
    SuperOutsideClass,
    #[error("Class '{name}' has no parent class, cannot use 'super'")]
    SuperWithoutParent { name: String },
    #[error("Class '{class}' does not implement method '{method}' from interface '{interface}'")]
    MissingInterfaceMethod {
        class: String,
        method: String,
        interface: String,
    },
    #[error("Method '{method}' in class '{class}' has signature '{got}' but interface '{interface}' requires '{expected}'")]
    InterfaceMethodMismatch {
        method: String,
        class: String,
        got: String,
        interface: String,
        expected: String,
    },
    #[error("Class '{class}' does not implement property '{property}' from interface '{interface}'")]
    MissingInterfaceProperty {
        class: String,
        property: String,
        interface: String,
    },
    #[error("Property '{property}' in class '{class}' has type '{got}' but interface '{interface}' requires '{expected}'")]
    InterfacePropertyMismatch {
        property: String,
        class: String,
        got: String,
        interface: String,
        expected: String,
    },
}

/// A lexically scoped map from name to type, with a parallel record of
/// const bindings. Lookup walks outward.
pub struct Environment {
    scopes: Vec<Scope>,
}

#[derive(Default)]
struct Scope {
    store: BTreeMap<String, Type>,
    consts: BTreeSet<String>,
}

impl Environment {
    pub fn new() -> Environment {
        let mut root = Scope::default();
        for (name, ty) in [
            ("number", Type::Number),
            ("string", Type::String),
            ("boolean", Type::Boolean),
            ("nil", Type::Nil),
            ("void", Type::Void),
            ("any", Type::Any),
        ] {
            root.store.insert(name.to_string(), ty);
        }
        Environment { scopes: vec![root] }
    }

    fn push(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.store.get(name))
    }

    pub fn set(&mut self, name: impl Into<String>, ty: Type) {
        self.scopes
            .last_mut()
            .expect("environment always has a scope")
            .store
            .insert(name.into(), ty);
    }

    pub fn set_const(&mut self, name: impl Into<String>, ty: Type) {
        let name = name.into();
        let scope = self
            .scopes
            .last_mut()
            .expect("environment always has a scope");
        scope.consts.insert(name.clone());
        scope.store.insert(name, ty);
    }

    pub fn is_const(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.store.contains_key(name) {
                return scope.consts.contains(name);
            }
        }
        false
    }
}

impl Default for Environment {
    fn default() -> Environment {
        Environment::new()
    }
}

pub struct Checker {
    env: Environment,
    errors: Vec<TypeError>,

    // Shared registries, one per declaration kind.
    classes: BTreeMap<String, Rc<ClassType>>,
    interfaces: BTreeMap<String, Rc<InterfaceType>>,
    enums: BTreeMap<String, Rc<EnumType>>,
    type_aliases: BTreeMap<String, Type>,
    generic_aliases: BTreeMap<String, Rc<GenericAlias>>,

    // The frame the class checks thread through body traversal.
    current_class: Option<Rc<ClassType>>,
    in_constructor: bool,
    current_return_type: Option<Type>,
}

/// Checks a whole program and returns every diagnostic found.
pub fn check(statements: &[Stmt]) -> Vec<TypeError> {
    Checker::new().check(statements)
}

impl Checker {
    pub fn new() -> Checker {
        Checker {
            env: Environment::new(),
            errors: Vec::new(),
            classes: BTreeMap::new(),
            interfaces: BTreeMap::new(),
            enums: BTreeMap::new(),
            type_aliases: BTreeMap::new(),
            generic_aliases: BTreeMap::new(),
            current_class: None,
            in_constructor: false,
            current_return_type: None,
        }
    }

    pub fn check(mut self, statements: &[Stmt]) -> Vec<TypeError> {
        for stmt in statements {
            self.register_type_definition(stmt);
        }
        for stmt in statements {
            self.check_statement(stmt);
        }
        self.errors
    }

    // Pass 1: registration

    fn register_type_definition(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Class(decl) => self.register_class(decl),
            Stmt::Interface(decl) => self.register_interface(decl),
            Stmt::Enum(decl) => self.register_enum(decl),
            Stmt::TypeAlias(decl) => self.register_type_alias(decl),
            Stmt::Declare { declaration, .. } => self.register_type_definition(declaration),
            Stmt::Export { statement, .. } => self.register_type_definition(statement),
            _ => {}
        }
    }

    fn register_class(&mut self, decl: &ClassDecl) {
        let name = decl.name.lexeme.clone();

        let parent = match &decl.parent {
            Some(parent_name) if parent_name.lexeme == name => {
                self.error(
                    TypeErrorKind::CircularInheritance { name: name.clone() },
                    parent_name.position,
                );
                None
            }
            Some(parent_name) => match self.classes.get(&parent_name.lexeme) {
                Some(parent) => Some(Rc::clone(parent)),
                None => {
                    self.error(
                        TypeErrorKind::UnknownClass {
                            name: parent_name.lexeme.clone(),
                        },
                        parent_name.position,
                    );
                    None
                }
            },
            None => None,
        };

        // Member signatures resolve with each generic parameter bound to
        // `any`, so self-referential signatures type-check.
        self.env.push();
        for param in &decl.generic_params {
            self.env.set(param.lexeme.clone(), Type::Any);
        }

        let mut class = ClassType {
            name: name.clone(),
            parent,
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
            static_properties: BTreeMap::new(),
            static_methods: BTreeMap::new(),
            readonly: BTreeSet::new(),
            abstract_methods: BTreeSet::new(),
            visibility: BTreeMap::new(),
            constructor: None,
            implements: Vec::new(),
            is_abstract: decl.is_abstract,
        };

        for property in &decl.properties {
            let ty = self.resolve_type(&property.ty);
            let member = property.name.lexeme.clone();
            if property.is_static {
                class.static_properties.insert(member.clone(), ty);
            } else {
                class.properties.insert(member.clone(), ty);
            }
            if property.is_readonly {
                class.readonly.insert(member.clone());
            }
            class.visibility.insert(member, property.visibility);
        }

        for method in &decl.methods {
            let signature = Rc::new(self.resolve_signature(&method.parameters, &method.return_type));
            let member = method.name.lexeme.clone();
            if method.is_static {
                class.static_methods.insert(member.clone(), signature);
            } else {
                class.methods.insert(member.clone(), signature);
            }
            if method.is_abstract {
                class.abstract_methods.insert(member.clone());
            }
            class.visibility.insert(member, method.visibility);
        }

        if let Some(ctor) = &decl.constructor {
            class.constructor = Some(Rc::new(
                self.resolve_signature(&ctor.parameters, &None),
            ));
        }

        for iface_name in &decl.implements {
            match self.interfaces.get(&iface_name.lexeme) {
                Some(iface) => class.implements.push(Rc::clone(iface)),
                None => self.error(
                    TypeErrorKind::UnknownInterface {
                        name: iface_name.lexeme.clone(),
                    },
                    iface_name.position,
                ),
            }
        }

        self.env.pop();

        self.check_overrides(decl, &class);
        self.check_abstract_obligations(decl, &class);

        let class = Rc::new(class);
        self.classes.insert(name.clone(), Rc::clone(&class));
        self.env.set(name, Type::Class(class));
    }

    fn resolve_signature(
        &mut self,
        parameters: &[crate::ast::Parameter],
        return_type: &Option<TypeExpr>,
    ) -> FunctionType {
        let parameters = parameters
            .iter()
            .map(|p| match &p.ty {
                Some(ty) => self.resolve_type(ty),
                None => Type::Any,
            })
            .collect();
        let return_type = match return_type {
            Some(ty) => self.resolve_type(ty),
            None => Type::Void,
        };
        FunctionType {
            parameters,
            return_type,
        }
    }

    /// Overrides must keep the parent's arity, keep parameter types
    /// invariant, return a covariant type, and never narrow visibility.
    fn check_overrides(&mut self, decl: &ClassDecl, class: &ClassType) {
        let Some(parent) = class.parent.as_deref() else {
            return;
        };
        for method in &decl.methods {
            let name = &method.name.lexeme;
            let Some(own) = class.methods.get(name) else {
                continue;
            };
            let Some((parent_sig, _)) = parent.lookup_method(name) else {
                continue;
            };

            if own.parameters.len() != parent_sig.parameters.len() {
                self.error(
                    TypeErrorKind::OverrideParameterCount {
                        method: name.clone(),
                        got: own.parameters.len(),
                        expected: parent_sig.parameters.len(),
                    },
                    method.name.position,
                );
            } else {
                for (i, (own_param, parent_param)) in
                    own.parameters.iter().zip(&parent_sig.parameters).enumerate()
                {
                    if own_param != parent_param {
                        self.error(
                            TypeErrorKind::OverrideParameterType {
                                method: name.clone(),
                                index: i + 1,
                                got: own_param.to_string(),
                                expected: parent_param.to_string(),
                            },
                            method.name.position,
                        );
                    }
                }
            }

            if !own.return_type.is_assignable_to(&parent_sig.return_type) {
                self.error(
                    TypeErrorKind::OverrideReturnType {
                        method: name.clone(),
                        got: own.return_type.to_string(),
                        expected: parent_sig.return_type.to_string(),
                    },
                    method.name.position,
                );
            }

            let parent_visibility = parent.visibility_of(name);
            if visibility_rank(method.visibility) > visibility_rank(parent_visibility) {
                self.error(
                    TypeErrorKind::OverrideVisibilityReduced {
                        method: name.clone(),
                        parent: parent_visibility.as_str(),
                        child: method.visibility.as_str(),
                    },
                    method.name.position,
                );
            }
        }
    }

    /// A concrete class must implement every abstract method left open by
    /// its ancestors.
    fn check_abstract_obligations(&mut self, decl: &ClassDecl, class: &ClassType) {
        if class.is_abstract {
            return;
        }
        let mut ancestor = class.parent.as_deref();
        let mut seen = BTreeSet::new();
        while let Some(parent) = ancestor {
            for method in &parent.abstract_methods {
                if !seen.insert(method.clone()) {
                    continue;
                }
                // The nearest definition wins; if it is still abstract, the
                // obligation is unmet.
                let unimplemented = match class.lookup_method(method) {
                    Some((_, owner)) => owner.abstract_methods.contains(method),
                    None => true,
                };
                if unimplemented {
                    self.error(
                        TypeErrorKind::UnimplementedAbstractMethod {
                            class: class.name.clone(),
                            method: method.clone(),
                            parent: parent.name.clone(),
                        },
                        decl.name.position,
                    );
                }
            }
            ancestor = parent.parent.as_deref();
        }
    }

    fn register_interface(&mut self, decl: &InterfaceDecl) {
        let name = decl.name.lexeme.clone();
        let mut iface = InterfaceType {
            name: name.clone(),
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
            extends: Vec::new(),
        };

        for property in &decl.properties {
            let ty = self.resolve_type(&property.ty);
            iface.properties.insert(property.name.lexeme.clone(), ty);
        }
        for method in &decl.methods {
            let signature = self.resolve_signature(&method.parameters, &method.return_type);
            iface
                .methods
                .insert(method.name.lexeme.clone(), Rc::new(signature));
        }
        for extended in &decl.extends {
            match self.interfaces.get(&extended.lexeme) {
                Some(parent) => iface.extends.push(Rc::clone(parent)),
                None => self.error(
                    TypeErrorKind::UnknownInterface {
                        name: extended.lexeme.clone(),
                    },
                    extended.position,
                ),
            }
        }

        let iface = Rc::new(iface);
        self.interfaces.insert(name.clone(), Rc::clone(&iface));
        self.env.set(name, Type::Interface(iface));
    }

    fn register_enum(&mut self, decl: &EnumDecl) {
        let name = decl.name.lexeme.clone();
        let en = Rc::new(EnumType {
            name: name.clone(),
            members: decl
                .members
                .iter()
                .map(|m| m.name.lexeme.clone())
                .collect(),
        });
        // Registered before the member values are validated so members can
        // reference the enum itself.
        self.enums.insert(name.clone(), Rc::clone(&en));
        self.env.set(name, Type::Enum(en));
        for member in &decl.members {
            if let Some(value) = &member.value {
                self.check_expression(value);
            }
        }
    }

    fn register_type_alias(&mut self, decl: &TypeAliasDecl) {
        let name = decl.name.lexeme.clone();

        if !decl.generic_params.is_empty() {
            let alias = Rc::new(GenericAlias {
                name: name.clone(),
                params: decl
                    .generic_params
                    .iter()
                    .map(|p| p.lexeme.clone())
                    .collect(),
                body: decl
                    .aliased
                    .clone()
                    .unwrap_or_else(|| TypeExpr::Name {
                        token: Token::synthetic(crate::token::TokenKind::Identifier, "any"),
                    }),
            });
            self.generic_aliases.insert(name.clone(), Rc::clone(&alias));
            self.env.set(name, Type::GenericAlias(alias));
            return;
        }

        let ty = if let Some(aliased) = &decl.aliased {
            self.resolve_type(aliased)
        } else if !decl.shape.is_empty() {
            // Object shape: an interface in all but keyword.
            let mut iface = InterfaceType {
                name: name.clone(),
                properties: BTreeMap::new(),
                methods: BTreeMap::new(),
                extends: Vec::new(),
            };
            for property in &decl.shape {
                let ty = self.resolve_type(&property.ty);
                iface.properties.insert(property.name.lexeme.clone(), ty);
            }
            Type::Interface(Rc::new(iface))
        } else {
            Type::Any
        };

        self.type_aliases.insert(name.clone(), ty.clone());
        self.env.set(name, ty);
    }

    // Type expression resolution

    fn resolve_type(&mut self, expr: &TypeExpr) -> Type {
        match expr {
            TypeExpr::Name { token } => self.resolve_type_name(token),
            TypeExpr::Nil { .. } => Type::Nil,
            TypeExpr::StringLiteral { token } => Type::StringLiteral(token.lexeme.clone()),
            TypeExpr::NumberLiteral { value, .. } => Type::NumberLiteral(*value),
            TypeExpr::Array { element, .. } => {
                Type::Array(Box::new(self.resolve_type(element)))
            }
            TypeExpr::Table { key, value, .. } => Type::Table {
                key: Box::new(self.resolve_type(key)),
                value: Box::new(self.resolve_type(value)),
            },
            TypeExpr::Union { members, .. } => {
                let members = members.iter().map(|m| self.resolve_type(m)).collect();
                Type::union_of(members)
            }
            TypeExpr::Tuple { elements, .. } => {
                Type::Tuple(elements.iter().map(|e| self.resolve_type(e)).collect())
            }
            TypeExpr::Function {
                parameters,
                return_type,
                ..
            } => {
                let parameters = parameters.iter().map(|p| self.resolve_type(p)).collect();
                let return_type = match return_type {
                    Some(ty) => self.resolve_type(ty),
                    None => Type::Void,
                };
                Type::Function(Rc::new(FunctionType {
                    parameters,
                    return_type,
                }))
            }
            TypeExpr::Optional { base, .. } => {
                Type::Optional(Box::new(self.resolve_type(base)))
            }
            TypeExpr::Generic {
                base, arguments, ..
            } => self.resolve_generic_application(base, arguments),
        }
    }

    /// Primitives always win in type positions; then the environment (which
    /// holds generic-parameter bindings), then the registries.
    fn resolve_type_name(&mut self, token: &Token) -> Type {
        let name = token.lexeme.as_str();
        match name {
            "number" => return Type::Number,
            "string" => return Type::String,
            "boolean" => return Type::Boolean,
            "void" => return Type::Void,
            "any" => return Type::Any,
            _ => {}
        }
        if let Some(ty) = self.env.get(name) {
            return ty.clone();
        }
        if let Some(class) = self.classes.get(name) {
            return Type::Class(Rc::clone(class));
        }
        if let Some(iface) = self.interfaces.get(name) {
            return Type::Interface(Rc::clone(iface));
        }
        if let Some(en) = self.enums.get(name) {
            return Type::Enum(Rc::clone(en));
        }
        if let Some(alias) = self.type_aliases.get(name) {
            return alias.clone();
        }
        self.error(
            TypeErrorKind::UnknownType {
                name: name.to_string(),
            },
            token.position,
        );
        Type::Any
    }

    /// `Name<T1, ..., Tn>` over a generic alias is call-by-name
    /// substitution: the body resolves in an environment extending each
    /// parameter with its resolved argument.
    fn resolve_generic_application(&mut self, base: &TypeExpr, arguments: &[TypeExpr]) -> Type {
        if let TypeExpr::Name { token } = base {
            if let Some(alias) = self.generic_aliases.get(&token.lexeme).map(Rc::clone) {
                let args: Vec<Type> = arguments.iter().map(|a| self.resolve_type(a)).collect();
                if args.len() != alias.params.len() {
                    self.error(
                        TypeErrorKind::WrongTypeArgumentCount {
                            name: alias.name.clone(),
                            expected: alias.params.len(),
                            got: args.len(),
                        },
                        token.position,
                    );
                    return Type::Any;
                }
                self.env.push();
                for (param, arg) in alias.params.iter().zip(args) {
                    self.env.set(param.clone(), arg);
                }
                let resolved = self.resolve_type(&alias.body);
                self.env.pop();
                return resolved;
            }
        }
        // Not a generic alias; generic classes are not instantiated
        // structurally, so the arguments are dropped.
        self.resolve_type(base)
    }

    // Pass 2: statement checks

    fn check_statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Variable {
                token,
                name,
                is_const,
                ty,
                value,
            } => self.check_variable(token, name, *is_const, ty, value),
            Stmt::Function(decl) => self.check_function(decl),
            Stmt::Block(block) => self.check_block(block),
            Stmt::Return { token, value } => self.check_return(token, value),
            Stmt::If {
                token,
                condition,
                consequence,
                alternative,
            } => {
                let cond = self.check_expression(condition);
                if !cond.is_assignable_to(&Type::Boolean) {
                    self.error(
                        TypeErrorKind::NonBooleanIfCondition {
                            got: cond.to_string(),
                        },
                        token.position,
                    );
                }
                self.check_block(consequence);
                if let Some(alternative) = alternative {
                    self.check_block(alternative);
                }
            }
            Stmt::While {
                token,
                condition,
                body,
            } => {
                let cond = self.check_expression(condition);
                if !cond.is_assignable_to(&Type::Boolean) {
                    self.error(
                        TypeErrorKind::NonBooleanWhileCondition {
                            got: cond.to_string(),
                        },
                        token.position,
                    );
                }
                self.check_block(body);
            }
            Stmt::NumericFor {
                token,
                variable,
                start,
                end,
                step,
                body,
            } => {
                self.env.push();
                self.env.set(variable.lexeme.clone(), Type::Number);
                let start_ty = self.check_expression(start);
                if !start_ty.is_assignable_to(&Type::Number) {
                    self.error(
                        TypeErrorKind::NonNumericForStart {
                            got: start_ty.to_string(),
                        },
                        token.position,
                    );
                }
                let end_ty = self.check_expression(end);
                if !end_ty.is_assignable_to(&Type::Number) {
                    self.error(
                        TypeErrorKind::NonNumericForEnd {
                            got: end_ty.to_string(),
                        },
                        token.position,
                    );
                }
                if let Some(step) = step {
                    let step_ty = self.check_expression(step);
                    if !step_ty.is_assignable_to(&Type::Number) {
                        self.error(
                            TypeErrorKind::NonNumericForStep {
                                got: step_ty.to_string(),
                            },
                            token.position,
                        );
                    }
                }
                self.check_block(body);
                self.env.pop();
            }
            Stmt::GenericFor {
                token,
                variable,
                iterator,
                body,
            } => {
                self.env.push();
                let iter_ty = self.check_expression(iterator);
                let binding = match &iter_ty {
                    Type::Array(elem) => (**elem).clone(),
                    Type::Table { value, .. } => (**value).clone(),
                    Type::Any => Type::Any,
                    _ => {
                        self.error(
                            TypeErrorKind::NotIterable {
                                got: iter_ty.to_string(),
                            },
                            token.position,
                        );
                        Type::Any
                    }
                };
                self.env.set(variable.lexeme.clone(), binding);
                self.check_block(body);
                self.env.pop();
            }
            Stmt::Do { body, .. } => self.check_block(body),
            Stmt::Break { .. } => {}
            Stmt::Expression { expr } => {
                self.check_expression(expr);
            }
            Stmt::Assignment {
                token,
                target,
                value,
            } => self.check_assignment(token, target, value),
            Stmt::Class(decl) => self.check_class(decl),
            Stmt::Interface(_) | Stmt::Enum(_) | Stmt::TypeAlias(_) => {}
            Stmt::Declare { declaration, .. } => self.check_declare(declaration),
            Stmt::Export { statement, .. } => self.check_statement(statement),
            Stmt::Import {
                names,
                wildcard,
                module,
                ..
            } => {
                // No module resolution: imported names surface as `any`.
                if *wildcard {
                    self.env.set(wildcard_binding(module), Type::Any);
                }
                for name in names {
                    self.env.set(name.lexeme.clone(), Type::Any);
                }
            }
        }
    }

    fn check_variable(
        &mut self,
        token: &Token,
        name: &Token,
        is_const: bool,
        ty: &Option<TypeExpr>,
        value: &Option<Expr>,
    ) {
        let declared = ty.as_ref().map(|ty| self.resolve_type(ty));
        let value_ty = match value {
            Some(value) => self.check_expression(value),
            None => Type::Nil,
        };

        let binding = match declared {
            Some(declared) => {
                if value.is_some() && !value_ty.is_assignable_to(&declared) {
                    self.error(
                        TypeErrorKind::InvalidDeclaration {
                            value: value_ty.to_string(),
                            declared: declared.to_string(),
                        },
                        token.position,
                    );
                }
                declared
            }
            None => value_ty,
        };

        if is_const {
            self.env.set_const(name.lexeme.clone(), binding);
        } else {
            self.env.set(name.lexeme.clone(), binding);
        }
    }

    fn check_function(&mut self, decl: &FunctionDecl) {
        // Resolve the signature with generic parameters in scope, register
        // the function in the enclosing scope, then check the body.
        self.env.push();
        for param in &decl.generic_params {
            self.env.set(param.lexeme.clone(), Type::Any);
        }
        let signature = self.resolve_signature(&decl.parameters, &decl.return_type);
        self.env.pop();

        let return_type = signature.return_type.clone();
        let parameter_types = signature.parameters.clone();
        self.env
            .set(decl.name.lexeme.clone(), Type::Function(Rc::new(signature)));

        let Some(body) = &decl.body else {
            return;
        };

        self.env.push();
        for param in &decl.generic_params {
            self.env.set(param.lexeme.clone(), Type::Any);
        }
        for (param, ty) in decl.parameters.iter().zip(parameter_types) {
            self.env.set(param.name.lexeme.clone(), ty);
        }
        let previous_return = self.current_return_type.replace(return_type);
        self.check_block(body);
        self.current_return_type = previous_return;
        self.env.pop();
    }

    fn check_return(&mut self, token: &Token, value: &Option<Expr>) {
        let Some(expected) = self.current_return_type.clone() else {
            self.error(TypeErrorKind::ReturnOutsideFunction, token.position);
            return;
        };

        match value {
            None => {
                if expected != Type::Void {
                    self.error(
                        TypeErrorKind::MissingReturnValue {
                            expected: expected.to_string(),
                        },
                        token.position,
                    );
                }
            }
            Some(value) => {
                let value_ty = self.check_expression(value);
                if !value_ty.is_assignable_to(&expected) {
                    self.error(
                        TypeErrorKind::InvalidReturn {
                            value: value_ty.to_string(),
                            expected: expected.to_string(),
                        },
                        token.position,
                    );
                }
            }
        }
    }

    fn check_block(&mut self, block: &Block) {
        self.env.push();
        for stmt in &block.statements {
            self.check_statement(stmt);
        }
        self.env.pop();
    }

    fn check_assignment(&mut self, token: &Token, target: &Expr, value: &Expr) {
        if let Expr::Identifier { token: name } = target {
            if self.env.is_const(&name.lexeme) {
                self.error(
                    TypeErrorKind::ConstReassignment {
                        name: name.lexeme.clone(),
                    },
                    token.position,
                );
                return;
            }
        }

        if let Expr::Member {
            object, property, ..
        } = target
        {
            if let Some(class) = self.receiver_class(object) {
                if class.is_readonly(&property.lexeme) {
                    let in_own_constructor = self.in_constructor
                        && self
                            .current_class
                            .as_deref()
                            .is_some_and(|current| current.extends(&class));
                    if !in_own_constructor {
                        self.error(
                            TypeErrorKind::ReadonlyAssignment {
                                name: property.lexeme.clone(),
                            },
                            token.position,
                        );
                        return;
                    }
                }
            }
        }

        let target_ty = self.check_expression(target);
        let value_ty = self.check_expression(value);
        if !value_ty.is_assignable_to(&target_ty) {
            self.error(
                TypeErrorKind::InvalidAssignment {
                    value: value_ty.to_string(),
                    target: target_ty.to_string(),
                },
                token.position,
            );
        }
    }

    /// The class a member assignment goes through, when statically evident:
    /// `self.p`, `ClassName.p`, or `instanceVar.p`.
    fn receiver_class(&self, object: &Expr) -> Option<Rc<ClassType>> {
        match object {
            Expr::SelfValue { .. } => self.current_class.clone(),
            Expr::Identifier { token } => {
                if let Some(class) = self.classes.get(&token.lexeme) {
                    return Some(Rc::clone(class));
                }
                match self.env.get(&token.lexeme) {
                    Some(Type::Class(class)) => Some(Rc::clone(class)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn check_class(&mut self, decl: &ClassDecl) {
        let Some(class) = self.classes.get(&decl.name.lexeme).map(Rc::clone) else {
            return;
        };

        for method in &decl.methods {
            if method.is_abstract {
                if !decl.is_abstract {
                    self.error(
                        TypeErrorKind::AbstractMethodOutsideAbstractClass {
                            name: method.name.lexeme.clone(),
                        },
                        method.name.position,
                    );
                }
                if method.body.is_some() {
                    self.error(
                        TypeErrorKind::AbstractMethodWithBody {
                            name: method.name.lexeme.clone(),
                        },
                        method.name.position,
                    );
                }
            }
        }

        let previous_class = self.current_class.replace(Rc::clone(&class));

        // Property initializers.
        for property in &decl.properties {
            let Some(value) = &property.value else {
                continue;
            };
            self.env.push();
            for param in &decl.generic_params {
                self.env.set(param.lexeme.clone(), Type::Any);
            }
            let value_ty = self.check_expression(value);
            self.env.pop();
            let declared = if property.is_static {
                class.static_properties.get(&property.name.lexeme)
            } else {
                class.properties.get(&property.name.lexeme)
            };
            if let Some(declared) = declared {
                if !value_ty.is_assignable_to(declared) {
                    self.error(
                        TypeErrorKind::InvalidDeclaration {
                            value: value_ty.to_string(),
                            declared: declared.to_string(),
                        },
                        property.name.position,
                    );
                }
            }
        }

        if let Some(ctor) = &decl.constructor {
            if let Some(body) = &ctor.body {
                self.env.push();
                for param in &decl.generic_params {
                    self.env.set(param.lexeme.clone(), Type::Any);
                }
                self.env.set("self", Type::Class(Rc::clone(&class)));
                for param in &ctor.parameters {
                    let ty = match &param.ty {
                        Some(ty) => self.resolve_type(ty),
                        None => Type::Any,
                    };
                    self.env.set(param.name.lexeme.clone(), ty);
                }
                let previous_return = self.current_return_type.replace(Type::Void);
                self.in_constructor = true;
                self.check_block(body);
                self.in_constructor = false;
                self.current_return_type = previous_return;
                self.env.pop();
            }
        }

        for method in &decl.methods {
            let Some(body) = &method.body else {
                continue;
            };
            self.env.push();
            for param in &decl.generic_params {
                self.env.set(param.lexeme.clone(), Type::Any);
            }
            self.env.set("self", Type::Class(Rc::clone(&class)));
            for param in &method.parameters {
                let ty = match &param.ty {
                    Some(ty) => self.resolve_type(ty),
                    None => Type::Any,
                };
                self.env.set(param.name.lexeme.clone(), ty);
            }
            let return_type = match &method.return_type {
                Some(ty) => self.resolve_type(ty),
                None => Type::Void,
            };
            let previous_return = self.current_return_type.replace(return_type);
            self.check_block(body);
            self.current_return_type = previous_return;
            self.env.pop();
        }

        for iface in &class.implements {
            self.check_implements(&class, iface, decl.name.position);
        }

        self.current_class = previous_class;
    }

    fn check_implements(&mut self, class: &ClassType, iface: &InterfaceType, position: Position) {
        for (name, required) in &iface.methods {
            match class.lookup_method(name) {
                None => self.error(
                    TypeErrorKind::MissingInterfaceMethod {
                        class: class.name.clone(),
                        method: name.clone(),
                        interface: iface.name.clone(),
                    },
                    position,
                ),
                Some((signature, _)) => {
                    if signature.as_ref() != required.as_ref() {
                        self.error(
                            TypeErrorKind::InterfaceMethodMismatch {
                                method: name.clone(),
                                class: class.name.clone(),
                                got: signature.to_string(),
                                interface: iface.name.clone(),
                                expected: required.to_string(),
                            },
                            position,
                        );
                    }
                }
            }
        }

        for (name, required) in &iface.properties {
            match class.lookup_property(name) {
                None => self.error(
                    TypeErrorKind::MissingInterfaceProperty {
                        class: class.name.clone(),
                        property: name.clone(),
                        interface: iface.name.clone(),
                    },
                    position,
                ),
                Some((ty, _)) => {
                    if ty != required {
                        self.error(
                            TypeErrorKind::InterfacePropertyMismatch {
                                property: name.clone(),
                                class: class.name.clone(),
                                got: ty.to_string(),
                                interface: iface.name.clone(),
                                expected: required.to_string(),
                            },
                            position,
                        );
                    }
                }
            }
        }

        for extended in &iface.extends {
            self.check_implements(class, extended, position);
        }
    }

    fn check_declare(&mut self, declaration: &Stmt) {
        match declaration {
            Stmt::Variable {
                name,
                is_const,
                ty,
                ..
            } => {
                let declared = match ty {
                    Some(ty) => self.resolve_type(ty),
                    None => Type::Any,
                };
                if *is_const {
                    self.env.set_const(name.lexeme.clone(), declared);
                } else {
                    self.env.set(name.lexeme.clone(), declared);
                }
            }
            Stmt::Function(decl) => {
                let signature = self.resolve_signature(&decl.parameters, &decl.return_type);
                self.env
                    .set(decl.name.lexeme.clone(), Type::Function(Rc::new(signature)));
            }
            // Type-level declarations were registered in pass 1 and have no
            // bodies to check.
            _ => {}
        }
    }

    // Expression checks

    fn check_expression(&mut self, expr: &Expr) -> Type {
        match expr {
            Expr::Identifier { token } => match self.env.get(&token.lexeme) {
                Some(ty) => ty.clone(),
                None => {
                    self.error(
                        TypeErrorKind::UndefinedVariable {
                            name: token.lexeme.clone(),
                        },
                        token.position,
                    );
                    Type::Any
                }
            },
            // Literals infer literal types, for precision.
            Expr::Number { value, .. } => Type::NumberLiteral(*value),
            Expr::String { token } => Type::StringLiteral(token.lexeme.clone()),
            Expr::Boolean { .. } => Type::Boolean,
            Expr::Nil { .. } => Type::Nil,
            Expr::SelfValue { token } => match self.env.get("self") {
                Some(ty) => ty.clone(),
                None => {
                    self.error(
                        TypeErrorKind::UndefinedVariable {
                            name: "self".to_string(),
                        },
                        token.position,
                    );
                    Type::Any
                }
            },
            Expr::Super { token } => match self.super_class(token.position) {
                Some(parent) => Type::Class(parent),
                None => Type::Any,
            },
            Expr::Table { entries, .. } => self.check_table_literal(entries),
            Expr::Prefix {
                token,
                operator,
                operand,
            } => {
                let operand_ty = self.check_expression(operand);
                match operator {
                    UnaryOp::Minus => {
                        if !operand_ty.is_assignable_to(&Type::Number) {
                            self.error(
                                TypeErrorKind::InvalidUnaryOperand {
                                    op: "-".to_string(),
                                    got: operand_ty.to_string(),
                                },
                                token.position,
                            );
                        }
                        Type::Number
                    }
                    UnaryOp::Not | UnaryOp::Bang => Type::Boolean,
                }
            }
            Expr::Infix {
                token,
                operator,
                left,
                right,
            } => self.check_infix(token, *operator, left, right),
            Expr::Call {
                callee, arguments, ..
            } => self.check_call(callee, arguments),
            Expr::Member {
                object, property, ..
            } => self.check_member(object, property),
            Expr::Index {
                token,
                object,
                index,
            } => {
                let object_ty = self.check_expression(object);
                let index_ty = self.check_expression(index);
                match object_ty {
                    Type::Array(elem) => {
                        if !index_ty.is_assignable_to(&Type::Number) {
                            self.error(
                                TypeErrorKind::InvalidArrayIndex {
                                    got: index_ty.to_string(),
                                },
                                token.position,
                            );
                        }
                        *elem
                    }
                    Type::Table { key, value } => {
                        if !index_ty.is_assignable_to(&key) {
                            self.error(
                                TypeErrorKind::InvalidTableKey {
                                    expected: key.to_string(),
                                    got: index_ty.to_string(),
                                },
                                token.position,
                            );
                        }
                        *value
                    }
                    _ => Type::Any,
                }
            }
        }
    }

    /// A literal whose entries are all `name = value` pairs infers an
    /// anonymous interface; every other shape (including `{1, 2, 3}`) is a
    /// plain `table<any, any>`.
    fn check_table_literal(&mut self, entries: &[TableEntry]) -> Type {
        let mut properties = BTreeMap::new();
        let mut is_record = !entries.is_empty();
        for entry in entries {
            match entry {
                TableEntry::Pair { key, value } => {
                    let ty = self.check_expression(value);
                    properties.insert(key.lexeme.clone(), ty);
                }
                TableEntry::Value(value) => {
                    self.check_expression(value);
                    is_record = false;
                }
                TableEntry::Computed { key, value } => {
                    self.check_expression(key);
                    self.check_expression(value);
                    is_record = false;
                }
            }
        }
        if is_record {
            Type::Interface(Rc::new(InterfaceType {
                name: "<table literal>".to_string(),
                properties,
                methods: BTreeMap::new(),
                extends: Vec::new(),
            }))
        } else {
            Type::Table {
                key: Box::new(Type::Any),
                value: Box::new(Type::Any),
            }
        }
    }

    fn check_infix(&mut self, token: &Token, operator: BinaryOp, left: &Expr, right: &Expr) -> Type {
        let left_ty = self.check_expression(left);
        let right_ty = self.check_expression(right);

        use BinaryOp::*;
        match operator {
            Add | Sub | Mul | Div | Mod | Pow => {
                for ty in [&left_ty, &right_ty] {
                    if !ty.is_assignable_to(&Type::Number) {
                        self.error(
                            TypeErrorKind::InvalidBinaryOperand {
                                op: operator.as_str().to_string(),
                                got: ty.to_string(),
                            },
                            token.position,
                        );
                    }
                }
                Type::Number
            }
            Eq | NotEq | Lt | Gt | LtEq | GtEq | And | Or => Type::Boolean,
            Concat => Type::String,
        }
    }

    fn check_call(&mut self, callee: &Expr, arguments: &[Expr]) -> Type {
        // A call whose target names a class is an instantiation through the
        // constructor.
        if let Expr::Identifier { token } = callee {
            if let Some(class) = self.classes.get(&token.lexeme).map(Rc::clone) {
                if class.is_abstract {
                    self.error(
                        TypeErrorKind::AbstractInstantiation {
                            name: class.name.clone(),
                        },
                        token.position,
                    );
                    for argument in arguments {
                        self.check_expression(argument);
                    }
                    return Type::Class(class);
                }
                match class.constructor.clone() {
                    Some(ctor) => {
                        self.check_arguments(&ctor, arguments, token.position);
                    }
                    None => {
                        if !arguments.is_empty() {
                            self.error(
                                TypeErrorKind::WrongArgumentCount {
                                    expected: 0,
                                    got: arguments.len(),
                                },
                                token.position,
                            );
                        }
                        for argument in arguments {
                            self.check_expression(argument);
                        }
                    }
                }
                return Type::Class(class);
            }
        }

        // `super(...)` dispatches to the parent constructor.
        if let Expr::Super { token } = callee {
            let Some(parent) = self.super_class(token.position) else {
                for argument in arguments {
                    self.check_expression(argument);
                }
                return Type::Any;
            };
            match parent.constructor.clone() {
                Some(ctor) => {
                    self.check_arguments(&ctor, arguments, token.position);
                }
                None => {
                    if !arguments.is_empty() {
                        self.error(
                            TypeErrorKind::WrongArgumentCount {
                                expected: 0,
                                got: arguments.len(),
                            },
                            token.position,
                        );
                    }
                    for argument in arguments {
                        self.check_expression(argument);
                    }
                }
            }
            return Type::Void;
        }

        let callee_ty = self.check_expression(callee);
        match callee_ty {
            Type::Function(signature) => {
                self.check_arguments(&signature, arguments, callee.token().position);
                signature.return_type.clone()
            }
            Type::Any => {
                for argument in arguments {
                    self.check_expression(argument);
                }
                Type::Any
            }
            other => {
                self.error(
                    TypeErrorKind::NotCallable {
                        got: other.to_string(),
                    },
                    callee.token().position,
                );
                for argument in arguments {
                    self.check_expression(argument);
                }
                Type::Any
            }
        }
    }

    fn check_arguments(&mut self, signature: &FunctionType, arguments: &[Expr], position: Position) {
        if arguments.len() != signature.parameters.len() {
            self.error(
                TypeErrorKind::WrongArgumentCount {
                    expected: signature.parameters.len(),
                    got: arguments.len(),
                },
                position,
            );
            for argument in arguments {
                self.check_expression(argument);
            }
            return;
        }
        for (i, (argument, parameter)) in arguments.iter().zip(&signature.parameters).enumerate() {
            let argument_ty = self.check_expression(argument);
            if !argument_ty.is_assignable_to(parameter) {
                self.error(
                    TypeErrorKind::InvalidArgument {
                        index: i + 1,
                        got: argument_ty.to_string(),
                        expected: parameter.to_string(),
                    },
                    argument.token().position,
                );
            }
        }
    }

    fn check_member(&mut self, object: &Expr, property: &Token) -> Type {
        let name = property.lexeme.as_str();

        // `super.m` dispatches to the parent's members.
        if let Expr::Super { token } = object {
            let Some(parent) = self.super_class(token.position) else {
                return Type::Any;
            };
            if let Some((method, owner)) = parent.lookup_method(name) {
                let method = Rc::clone(method);
                if owner.visibility_of(name) == Visibility::Private {
                    let class = owner.name.clone();
                    self.error(
                        TypeErrorKind::InaccessibleMember {
                            visibility: "private",
                            member_kind: "method",
                            name: name.to_string(),
                            class,
                        },
                        property.position,
                    );
                }
                return Type::Function(method);
            }
            if let Some((ty, _)) = parent.lookup_property(name) {
                return ty.clone();
            }
            self.error(
                TypeErrorKind::UnknownMember {
                    ty: parent.name.clone(),
                    name: name.to_string(),
                },
                property.position,
            );
            return Type::Any;
        }

        // An identifier naming a class is a static access through the
        // class's own name.
        if let Expr::Identifier { token } = object {
            if let Some(class) = self.classes.get(&token.lexeme).map(Rc::clone) {
                return self.check_static_member(&class, property);
            }
        }

        let object_ty = self.check_expression(object);
        let receiver_is_self = matches!(object, Expr::SelfValue { .. });
        match object_ty {
            Type::Class(class) => {
                if let Some((ty, owner)) = class.lookup_property(name) {
                    let ty = ty.clone();
                    let owner_name = owner.name.clone();
                    let visibility = owner.visibility_of(name);
                    self.check_member_access(
                        visibility,
                        &owner_name,
                        "property",
                        property,
                        receiver_is_self,
                    );
                    return ty;
                }
                if let Some((method, owner)) = class.lookup_method(name) {
                    let method = Rc::clone(method);
                    let owner_name = owner.name.clone();
                    let visibility = owner.visibility_of(name);
                    self.check_member_access(
                        visibility,
                        &owner_name,
                        "method",
                        property,
                        receiver_is_self,
                    );
                    return Type::Function(method);
                }
                self.error(
                    TypeErrorKind::UnknownMember {
                        ty: class.name.clone(),
                        name: name.to_string(),
                    },
                    property.position,
                );
                Type::Any
            }
            Type::Interface(iface) => {
                if let Some(ty) = iface.lookup_property(name) {
                    return ty.clone();
                }
                if let Some(method) = iface.lookup_method(name) {
                    return Type::Function(Rc::clone(method));
                }
                self.error(
                    TypeErrorKind::UnknownMember {
                        ty: iface.name.clone(),
                        name: name.to_string(),
                    },
                    property.position,
                );
                Type::Any
            }
            Type::Enum(en) => {
                if en.has_member(name) {
                    // Members carry the enum's own nominal type.
                    Type::Enum(en)
                } else {
                    self.error(
                        TypeErrorKind::UnknownEnumMember {
                            ty: en.name.clone(),
                            name: name.to_string(),
                        },
                        property.position,
                    );
                    Type::Any
                }
            }
            // Plain table accesses and `any` receivers stay dynamic.
            _ => Type::Any,
        }
    }

    fn check_static_member(&mut self, class: &Rc<ClassType>, property: &Token) -> Type {
        let name = property.lexeme.as_str();
        if let Some((ty, owner)) = class.lookup_static_property(name) {
            let ty = ty.clone();
            let owner_name = owner.name.clone();
            let visibility = owner.visibility_of(name);
            self.check_static_access(visibility, &owner_name, "static property", property);
            return ty;
        }
        if let Some((method, owner)) = class.lookup_static_method(name) {
            let method = Rc::clone(method);
            let owner_name = owner.name.clone();
            let visibility = owner.visibility_of(name);
            self.check_static_access(visibility, &owner_name, "static method", property);
            return Type::Function(method);
        }
        // Enum-style access to instance members through the class name is
        // not a thing; anything else is unknown.
        self.error(
            TypeErrorKind::UnknownMember {
                ty: class.name.clone(),
                name: name.to_string(),
            },
            property.position,
        );
        Type::Any
    }

    /// Instance-member visibility: private members are reachable only when
    /// the receiver is `self` of the owning class; protected additionally
    /// from subclass bodies.
    fn check_member_access(
        &mut self,
        visibility: Visibility,
        owner: &str,
        member_kind: &'static str,
        property: &Token,
        receiver_is_self: bool,
    ) {
        let allowed = match visibility {
            Visibility::Public => true,
            Visibility::Private => {
                receiver_is_self
                    && self
                        .current_class
                        .as_deref()
                        .is_some_and(|class| class.name == owner)
            }
            Visibility::Protected => {
                receiver_is_self
                    && self
                        .current_class
                        .as_deref()
                        .is_some_and(|class| ancestor_named(class, owner))
            }
        };
        if !allowed {
            self.error(
                TypeErrorKind::InaccessibleMember {
                    visibility: visibility.as_str(),
                    member_kind,
                    name: property.lexeme.clone(),
                    class: owner.to_string(),
                },
                property.position,
            );
        }
    }

    /// Static-member visibility: the access must come from inside the
    /// owning class (or a subclass, for protected members).
    fn check_static_access(
        &mut self,
        visibility: Visibility,
        owner: &str,
        member_kind: &'static str,
        property: &Token,
    ) {
        let allowed = match visibility {
            Visibility::Public => true,
            Visibility::Private => self
                .current_class
                .as_deref()
                .is_some_and(|class| class.name == owner),
            Visibility::Protected => self
                .current_class
                .as_deref()
                .is_some_and(|class| ancestor_named(class, owner)),
        };
        if !allowed {
            self.error(
                TypeErrorKind::InaccessibleMember {
                    visibility: visibility.as_str(),
                    member_kind,
                    name: property.lexeme.clone(),
                    class: owner.to_string(),
                },
                property.position,
            );
        }
    }

    /// Resolves the parent class `super` refers to, reporting the placement
    /// errors when there is none.
    fn super_class(&mut self, position: Position) -> Option<Rc<ClassType>> {
        match self.current_class.as_deref() {
            None => {
                self.error(TypeErrorKind::SuperOutsideClass, position);
                None
            }
            Some(class) => match &class.parent {
                Some(parent) => Some(Rc::clone(parent)),
                None => {
                    let name = class.name.clone();
                    self.error(TypeErrorKind::SuperWithoutParent { name }, position);
                    None
                }
            },
        }
    }

    fn error(&mut self, kind: TypeErrorKind, position: Position) {
        self.errors.push(TypeError { kind, position });
    }
}

impl Default for Checker {
    fn default() -> Checker {
        Checker::new()
    }
}

fn visibility_rank(visibility: Visibility) -> u8 {
    match visibility {
        Visibility::Public => 0,
        Visibility::Protected => 1,
        Visibility::Private => 2,
    }
}

fn ancestor_named(class: &ClassType, name: &str) -> bool {
    if class.name == name {
        return true;
    }
    class
        .parent
        .as_deref()
        .is_some_and(|parent| ancestor_named(parent, name))
}

/// The name a wildcard import binds: the trailing path segment, minus the
/// source extension.
fn wildcard_binding(module: &str) -> String {
    let segment = module.rsplit('/').next().unwrap_or(module);
    segment.trim_end_matches(".lunic").to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::parser::parse_program;

    use super::*;

    fn check_messages(src: &str) -> Vec<String> {
        let (statements, parse_errors) = parse_program(src);
        assert!(
            parse_errors.is_empty(),
            "unexpected parse errors for {src:?}: {parse_errors:?}"
        );
        check(&statements)
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    fn assert_clean(src: &str) {
        let errors = check_messages(src);
        assert_eq!(errors, Vec::<String>::new());
    }

    #[test]
    fn literal_types() {
        assert_clean(
            "type Status = \"loading\" | \"success\" | \"error\"\nlocal s1: Status = \"loading\"\nlocal s2: Status = \"success\"",
        );
        assert_eq!(
            check_messages("type Status = \"loading\" | \"success\"\nlocal s: Status = \"invalid\""),
            ["Cannot assign type '\"invalid\"' to variable of type '\"loading\" | \"success\"'"]
        );
        assert_clean("type HttpCode = 200 | 404 | 500\nlocal code: HttpCode = 404");
        assert_eq!(
            check_messages("type HttpCode = 200 | 404\nlocal code: HttpCode = 403").len(),
            1
        );
    }

    #[test]
    fn generic_aliases() {
        assert_clean(
            "type Nullable<T> = nil | T\nlocal x: Nullable<string> = \"test\"\nlocal y: Nullable<number> = nil",
        );
        assert_eq!(
            check_messages("type Nullable<T> = nil | T\nlocal c: Nullable<number> = \"x\""),
            ["Cannot assign type '\"x\"' to variable of type 'nil | number'"]
        );
        assert_eq!(
            check_messages("type Pair<A, B> = A | B\nlocal x: Pair<string> = \"a\""),
            ["Generic type 'Pair' expects 2 type arguments, got 1"]
        );
    }

    #[test]
    fn object_shape_structural_typing() {
        assert_clean(
            "type Point\n    x: number\n    y: number\nend\nlocal p: Point = { x = 10, y = 20 }",
        );
        assert_eq!(
            check_messages(
                "type Point\n    x: number\n    y: number\nend\nlocal q: Point = { x = 10 }"
            ),
            ["Cannot assign type '<table literal>' to variable of type 'Point'"]
        );
        // Extra fields are fine; mixed tables are not records.
        assert_clean(
            "type Point\n    x: number\n    y: number\nend\nlocal p: Point = { x = 1, y = 2, z = 3 }",
        );
        assert_eq!(
            check_messages(
                "type Point\n    x: number\n    y: number\nend\nlocal p: Point = { 1, 2 }"
            ),
            ["Cannot assign type 'table<any, any>' to variable of type 'Point'"]
        );
    }

    #[test]
    fn undefined_names_and_types() {
        assert_eq!(
            check_messages("local x: number = y"),
            ["Undefined variable 'y'"]
        );
        // `any` is the recovery type, so only the unknown-type error fires.
        assert_eq!(
            check_messages("local x: Widget = nil"),
            ["Unknown type 'Widget'"]
        );
    }

    #[test]
    fn const_and_inference() {
        assert_eq!(
            check_messages("const x: number = 1\nx = 2"),
            ["Cannot assign to const variable 'x'"]
        );
        // Inferred type from initializer.
        assert_eq!(
            check_messages("local s = \"hi\"\ns = 5"),
            ["Cannot assign type '5' to type '\"hi\"'"]
        );
    }

    #[test]
    fn conditions_and_loops() {
        assert_clean("if true then\n    local x = 1\nend");
        assert_eq!(
            check_messages("if 1 then\nend"),
            ["If condition must be boolean, got '1'"]
        );
        assert_eq!(
            check_messages("while \"x\" do\nend"),
            ["While condition must be boolean, got '\"x\"'"]
        );
        assert_clean("for i = 1, 10, 2 do\n    local x: number = i\nend");
        assert_eq!(
            check_messages("for i = \"a\", 10 do\nend"),
            ["For loop start must be number, got '\"a\"'"]
        );
        assert_clean(
            "local xs: string[] = {}\nfor s in xs do\n    local t: string = s\nend",
        );
        assert_eq!(
            check_messages("for x in 5 do\nend"),
            ["Cannot iterate over type '5'"]
        );
    }

    #[test]
    fn function_checks() {
        assert_clean(
            "function add(a: number, b: number): number\n    return a + b\nend\nlocal s: number = add(1, 2)",
        );
        assert_eq!(
            check_messages("function f(a: number): void\nend\nf(1, 2)"),
            ["Function expects 1 arguments, got 2"]
        );
        assert_eq!(
            check_messages("function f(a: number): void\nend\nf(\"x\")"),
            ["Argument 1: cannot pass type '\"x\"' to parameter of type 'number'"]
        );
        assert_eq!(
            check_messages("function f(): number\n    return \"x\"\nend"),
            ["Cannot return type '\"x\"' from function with return type 'number'"]
        );
        assert_eq!(
            check_messages("function f(): number\n    return\nend"),
            ["Function must return a value of type 'number'"]
        );
        assert_eq!(
            check_messages("return 1"),
            ["Return statement outside of function"]
        );
        assert_eq!(
            check_messages("local x: number = 1\nx()"),
            ["Cannot call type 'number'"]
        );
    }

    #[test]
    fn classes_and_instantiation() {
        assert_clean(
            "class Point\n    x: number\n    y: number\n    constructor(a: number, b: number)\n        self.x = a\n        self.y = b\n    end\n    sum(): number\n        return self.x + self.y\n    end\nend\nlocal p: Point = Point(3, 4)\nlocal s: number = p.sum()",
        );
        assert_eq!(
            check_messages(
                "class Point\n    constructor(a: number)\n    end\nend\nlocal p: Point = Point(1, 2)"
            ),
            ["Function expects 1 arguments, got 2"]
        );
        assert_eq!(
            check_messages("class A\nend\nlocal a: A = A(1)"),
            ["Function expects 0 arguments, got 1"]
        );
    }

    #[test]
    fn inheritance() {
        assert_clean(
            "class Animal\n    name: string\nend\nclass Dog extends Animal\n    breed: string\nend\nlocal dog: Dog = Dog()\nlocal animal: Animal = dog\nlocal n: string = dog.name",
        );
        assert_eq!(
            check_messages("class Dog extends Animal\nend"),
            ["Class 'Animal' not found"]
        );
        assert_eq!(
            check_messages("class Ouroboros extends Ouroboros\nend"),
            ["Circular inheritance detected for class 'Ouroboros'"]
        );
        // Upcast only goes one way.
        assert_eq!(
            check_messages(
                "class Animal\nend\nclass Dog extends Animal\nend\nlocal a: Animal = Animal()\nlocal d: Dog = a"
            ),
            ["Cannot assign type 'Animal' to variable of type 'Dog'"]
        );
    }

    #[test]
    fn visibility() {
        // Mirrors the published access-control behavior.
        assert_eq!(
            check_messages(
                "class BankAccount\n    private balance: number\n    constructor(initial: number)\n        self.balance = initial\n    end\n    getBalance(): number\n        return self.balance\n    end\nend\nlocal account: BankAccount = BankAccount(100)\nlocal b: number = account.balance"
            ),
            ["Cannot access private property 'balance' of class 'BankAccount'"]
        );
        assert_eq!(
            check_messages(
                "class BankAccount\n    private validateAmount(amount: number): boolean\n        return amount > 0\n    end\n    deposit(amount: number): void\n        if self.validateAmount(amount) then\n            local x: number = 1\n        end\n    end\nend\nlocal account: BankAccount = BankAccount()\nlocal valid: boolean = account.validateAmount(50)"
            ),
            ["Cannot access private method 'validateAmount' of class 'BankAccount'"]
        );
        assert_clean(
            "class BankAccount\n    private balance: number\n    constructor(initial: number)\n        self.balance = initial\n    end\n    getBalance(): number\n        return self.balance\n    end\nend\nlocal account: BankAccount = BankAccount(100)\nlocal b: number = account.getBalance()",
        );
        assert_clean(
            "class Animal\n    protected name: string\nend\nclass Dog extends Animal\n    bark(): void\n        local myName: string = self.name\n    end\nend\nlocal dog: Dog = Dog()",
        );
        assert_eq!(
            check_messages(
                "class Animal\n    protected name: string\nend\nlocal animal: Animal = Animal()\nlocal n: string = animal.name"
            ),
            ["Cannot access protected property 'name' of class 'Animal'"]
        );
        assert_clean(
            "class Person\n    public name: string\n    public age: number\nend\nlocal person: Person = Person()\nlocal n: string = person.name\nlocal a: number = person.age",
        );
    }

    #[test]
    fn static_visibility() {
        assert_eq!(
            check_messages(
                "class MathUtil\n    private static PI: number\n    static getPI(): number\n        return MathUtil.PI\n    end\nend\nlocal pi: number = MathUtil.PI"
            ),
            ["Cannot access private static property 'PI' of class 'MathUtil'"]
        );
        assert_eq!(
            check_messages(
                "class Helper\n    private static validate(): boolean\n        return true\n    end\n    static doSomething(): void\n        local valid: boolean = Helper.validate()\n    end\nend\nlocal result: boolean = Helper.validate()"
            ),
            ["Cannot access private static method 'validate' of class 'Helper'"]
        );
        assert_clean(
            "class Math\n    static PI: number = 3.14159\nend\nlocal x: number = Math.PI",
        );
        assert_clean(
            "class Math\n    static max(a: number, b: number): number\n        return a\n    end\nend\nlocal x: number = Math.max(10, 20)",
        );
    }

    #[test]
    fn overrides() {
        assert_clean(
            "class Animal\n    speak(): void\n        local x: number = 1\n    end\nend\nclass Dog extends Animal\n    speak(): void\n        local y: number = 2\n    end\nend",
        );
        assert_eq!(
            check_messages(
                "class Animal\n    speak(): void\n    end\nend\nclass Dog extends Animal\n    speak(message: string): void\n    end\nend"
            ),
            ["Method 'speak' override has 1 parameters, but parent method has 0 parameters"]
        );
        assert_eq!(
            check_messages(
                "class Animal\n    eat(food: string): void\n    end\nend\nclass Dog extends Animal\n    eat(food: number): void\n    end\nend"
            ),
            ["Method 'eat' override parameter 1 has type 'number', but parent method expects 'string'"]
        );
        assert_eq!(
            check_messages(
                "class Animal\n    getAge(): number\n        return 5\n    end\nend\nclass Dog extends Animal\n    getAge(): string\n        return \"five\"\n    end\nend"
            ),
            ["Method 'getAge' override has return type 'string', but parent method returns 'number'"]
        );
        assert_eq!(
            check_messages(
                "class A\n    public m(): void\n    end\nend\nclass B extends A\n    private m(): void\n    end\nend"
            ),
            ["Method 'm' override cannot reduce visibility from public to private"]
        );
    }

    #[test]
    fn super_checks() {
        assert_clean(
            "class Animal\n    name: string\n    constructor(name: string)\n        self.name = name\n    end\nend\nclass Dog extends Animal\n    breed: string\n    constructor(name: string, breed: string)\n        super(name)\n        self.breed = breed\n    end\nend",
        );
        assert_clean(
            "class Animal\n    speak(): void\n        local x: number = 1\n    end\nend\nclass Dog extends Animal\n    speak(): void\n        super.speak()\n        local y: number = 2\n    end\nend",
        );
        assert_eq!(
            check_messages("function test(): void\n    super.something()\nend"),
            ["'super' can only be used inside a class"]
        );
        assert_eq!(
            check_messages(
                "class Animal\n    speak(): void\n        super.speak()\n    end\nend"
            ),
            ["Class 'Animal' has no parent class, cannot use 'super'"]
        );
    }

    #[test]
    fn abstract_checks() {
        assert_eq!(
            check_messages(
                "abstract class Shape\n    abstract getArea(): number\nend\nlocal s: Shape = Shape()"
            ),
            ["Cannot instantiate abstract class 'Shape'"]
        );
        assert_eq!(
            check_messages("class Shape\n    abstract getArea(): number\nend"),
            ["Abstract method 'getArea' can only be declared in an abstract class"]
        );
        assert_eq!(
            check_messages(
                "abstract class Shape\n    abstract getArea(): number\n        return 0\n    end\nend"
            ),
            ["Abstract method 'getArea' should not have an implementation"]
        );
        assert_eq!(
            check_messages(
                "abstract class Animal\n    abstract speak(): void\nend\nclass Dog extends Animal\nend"
            ),
            ["Class 'Dog' must implement abstract method 'speak' from parent class 'Animal'"]
        );
        assert_clean(
            "abstract class Animal\n    abstract speak(): void\nend\nclass Dog extends Animal\n    speak(): void\n        local x: number = 1\n    end\nend",
        );
    }

    #[test]
    fn readonly_checks() {
        assert_clean(
            "class Person\n    readonly name: string\n    constructor(n: string)\n        self.name = n\n    end\nend\nlocal p: Person = Person(\"John\")",
        );
        assert_eq!(
            check_messages(
                "class Person\n    readonly name: string\n    constructor(n: string)\n        self.name = n\n    end\nend\nlocal p: Person = Person(\"John\")\np.name = \"Jane\""
            ),
            ["Cannot assign to readonly property 'name'"]
        );
        assert_eq!(
            check_messages(
                "class Constants\n    static readonly PI: number = 3.14159\nend\nlocal x: number = Constants.PI\nConstants.PI = 3.14"
            ),
            ["Cannot assign to readonly property 'PI'"]
        );
    }

    #[test]
    fn interfaces() {
        assert_clean(
            "interface Named\n    name: string\nend\nclass Person implements Named\n    name: string\nend",
        );
        assert_eq!(
            check_messages(
                "interface Speaker\n    speak(): void\nend\nclass Mime implements Speaker\nend"
            ),
            ["Class 'Mime' does not implement method 'speak' from interface 'Speaker'"]
        );
        assert_eq!(
            check_messages(
                "interface Named\n    name: string\nend\nclass Robot implements Named\nend"
            ),
            ["Class 'Robot' does not implement property 'name' from interface 'Named'"]
        );
        assert_eq!(
            check_messages("class Ghost implements Spooky\nend"),
            ["Interface 'Spooky' not found"]
        );
        // Requirements recurse through interface extension.
        assert_eq!(
            check_messages(
                "interface Named\n    name: string\nend\ninterface Pet extends Named\n    owner: string\nend\nclass Cat implements Pet\n    owner: string\nend"
            ),
            ["Class 'Cat' does not implement property 'name' from interface 'Named'"]
        );
        // A class is assignable to an implemented interface.
        assert_clean(
            "interface Named\n    name: string\nend\nclass Person implements Named\n    name: string\nend\nlocal n: Named = Person()",
        );
    }

    #[test]
    fn enums() {
        assert_clean(
            "enum Color\n    Red = 1\n    Green = 2\nend\nfunction setColor(c: Color): void\n    local x: number = 1\nend\nsetColor(Color.Red)\nlocal col: Color = Color.Green",
        );
        // Enum identity is nominal.
        assert_eq!(
            check_messages(
                "enum Color\n    Red = 1\nend\nenum Status\n    Active\nend\nfunction setColor(c: Color): void\nend\nsetColor(Status.Active)"
            ),
            ["Argument 1: cannot pass type 'Status' to parameter of type 'Color'"]
        );
        assert_eq!(
            check_messages("enum Color\n    Red\nend\nlocal c: Color = Color.Blue"),
            ["Enum 'Color' has no member 'Blue'"]
        );
        // Members are not the underlying number.
        assert_eq!(
            check_messages("enum Color\n    Red = 1\nend\nlocal n: number = Color.Red"),
            ["Cannot assign type 'Color' to variable of type 'number'"]
        );
    }

    #[test]
    fn declares() {
        assert_clean(
            "declare const PI: number\nlocal circumference: number = PI",
        );
        assert_clean(
            "declare function print(message: string): void\nprint(\"Hello, world!\")",
        );
        assert_clean(
            "declare type Vector2\n    x: number\n    y: number\nend\ndeclare function distance(v1: Vector2, v2: Vector2): number\nlocal d: number = distance({ x = 0, y = 0 }, { x = 3, y = 4 })",
        );
        assert_clean(
            "declare class Socket\n    connect(host: string): boolean\nend",
        );
    }

    #[test]
    fn imports_surface_names_as_any() {
        assert_clean(
            "import { helper, format } from \"lib/util\"\nhelper(format(1))",
        );
        assert_clean("import * from \"lib/geometry\"\ngeometry.distance(1, 2)");
    }

    #[test]
    fn optional_narrowing_required() {
        assert_clean("local data: string? = \"x\"\nlocal also: string? = nil");
        assert_eq!(
            check_messages("local data: string? = nil\nlocal s: string = data"),
            ["Cannot assign type 'string?' to variable of type 'string'"]
        );
    }

    #[test]
    fn registration_is_idempotent() {
        let (statements, errors) = parse_program(
            "class Point\n    x: number\nend\ninterface Named\n    name: string\nend\nenum Color\n    Red = 1\nend\ntype Status = \"on\" | \"off\"\ntype Nullable<T> = nil | T",
        );
        assert!(errors.is_empty());

        let mut checker = Checker::new();
        for stmt in &statements {
            checker.register_type_definition(stmt);
        }
        let classes: Vec<_> = checker.classes.keys().cloned().collect();
        let interfaces: Vec<_> = checker.interfaces.keys().cloned().collect();
        let enums: Vec<_> = checker.enums.keys().cloned().collect();
        let aliases: Vec<_> = checker.type_aliases.keys().cloned().collect();
        let generics: Vec<_> = checker.generic_aliases.keys().cloned().collect();
        let point = Type::Class(Rc::clone(&checker.classes["Point"]));
        let status = checker.type_aliases["Status"].clone();

        for stmt in &statements {
            checker.register_type_definition(stmt);
        }
        assert_eq!(classes, checker.classes.keys().cloned().collect::<Vec<_>>());
        assert_eq!(
            interfaces,
            checker.interfaces.keys().cloned().collect::<Vec<_>>()
        );
        assert_eq!(enums, checker.enums.keys().cloned().collect::<Vec<_>>());
        assert_eq!(
            aliases,
            checker.type_aliases.keys().cloned().collect::<Vec<_>>()
        );
        assert_eq!(
            generics,
            checker.generic_aliases.keys().cloned().collect::<Vec<_>>()
        );
        assert_eq!(point, Type::Class(Rc::clone(&checker.classes["Point"])));
        assert_eq!(status, checker.type_aliases["Status"]);
    }

    #[test]
    fn errors_accumulate_without_bailing() {
        let errors = check_messages(
            "local a: number = \"one\"\nlocal b: string = 2\nlocal c: boolean = 3",
        );
        assert_eq!(errors.len(), 3);
    }
}

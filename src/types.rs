//! The checker's internal type model.
//!
//! Distinct from [`crate::ast::TypeExpr`]: type expressions are syntax, these
//! are the resolved types the checker reasons about. Nominal types (classes,
//! interfaces, enums) are shared through `Rc` between the registries and the
//! environment; everything else is structural.
//!
//! `Display` output is part of the public diagnostic surface: literal types
//! print quoted (`"foo"`) for strings and plain (`42`) for numbers.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    rc::Rc,
};

use crate::ast::{TypeExpr, Visibility};

#[derive(Clone, Debug)]
pub enum Type {
    Number,
    String,
    Boolean,
    Nil,
    Void,
    Any,
    StringLiteral(String),
    NumberLiteral(f64),
    Array(Box<Type>),
    Table {
        key: Box<Type>,
        value: Box<Type>,
    },
    Tuple(Vec<Type>),
    Function(Rc<FunctionType>),
    /// Flat and de-duplicated by construction; see [`Type::union_of`].
    Union(Vec<Type>),
    /// Kept distinct from `Union(base, nil)` so it prints as `T?`.
    Optional(Box<Type>),
    Class(Rc<ClassType>),
    Interface(Rc<InterfaceType>),
    Enum(Rc<EnumType>),
    /// An uninstantiated generic alias; usable only through `Name<...>`.
    GenericAlias(Rc<GenericAlias>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionType {
    pub parameters: Vec<Type>,
    pub return_type: Type,
}

#[derive(Clone, Debug)]
pub struct ClassType {
    pub name: String,
    pub parent: Option<Rc<ClassType>>,
    pub properties: BTreeMap<String, Type>,
    pub methods: BTreeMap<String, Rc<FunctionType>>,
    pub static_properties: BTreeMap<String, Type>,
    pub static_methods: BTreeMap<String, Rc<FunctionType>>,
    pub readonly: BTreeSet<String>,
    pub abstract_methods: BTreeSet<String>,
    pub visibility: BTreeMap<String, Visibility>,
    pub constructor: Option<Rc<FunctionType>>,
    pub implements: Vec<Rc<InterfaceType>>,
    pub is_abstract: bool,
}

impl ClassType {
    /// Resolves an instance property, walking the inheritance chain.
    /// Returns the owning class along with the type, for diagnostics.
    pub fn lookup_property(&self, name: &str) -> Option<(&Type, &ClassType)> {
        if let Some(ty) = self.properties.get(name) {
            return Some((ty, self));
        }
        self.parent.as_deref()?.lookup_property(name)
    }

    pub fn lookup_method(&self, name: &str) -> Option<(&Rc<FunctionType>, &ClassType)> {
        if let Some(method) = self.methods.get(name) {
            return Some((method, self));
        }
        self.parent.as_deref()?.lookup_method(name)
    }

    pub fn lookup_static_property(&self, name: &str) -> Option<(&Type, &ClassType)> {
        if let Some(ty) = self.static_properties.get(name) {
            return Some((ty, self));
        }
        self.parent.as_deref()?.lookup_static_property(name)
    }

    pub fn lookup_static_method(&self, name: &str) -> Option<(&Rc<FunctionType>, &ClassType)> {
        if let Some(method) = self.static_methods.get(name) {
            return Some((method, self));
        }
        self.parent.as_deref()?.lookup_static_method(name)
    }

    /// Visibility of the named member, defaulting to public. Looked up on
    /// the class that declares the member.
    pub fn visibility_of(&self, name: &str) -> Visibility {
        if let Some(&visibility) = self.visibility.get(name) {
            return visibility;
        }
        match self.parent.as_deref() {
            Some(parent) => parent.visibility_of(name),
            None => Visibility::Public,
        }
    }

    pub fn is_readonly(&self, name: &str) -> bool {
        if self.readonly.contains(name) {
            return true;
        }
        self.parent.as_deref().is_some_and(|p| p.is_readonly(name))
    }

    /// Whether `self` is `other` or transitively extends it.
    pub fn extends(&self, other: &ClassType) -> bool {
        if self.name == other.name {
            return true;
        }
        self.parent.as_deref().is_some_and(|p| p.extends(other))
    }
}

#[derive(Clone, Debug)]
pub struct InterfaceType {
    pub name: String,
    pub properties: BTreeMap<String, Type>,
    pub methods: BTreeMap<String, Rc<FunctionType>>,
    pub extends: Vec<Rc<InterfaceType>>,
}

impl InterfaceType {
    pub fn lookup_property(&self, name: &str) -> Option<&Type> {
        if let Some(ty) = self.properties.get(name) {
            return Some(ty);
        }
        self.extends
            .iter()
            .find_map(|ext| ext.lookup_property(name))
    }

    pub fn lookup_method(&self, name: &str) -> Option<&Rc<FunctionType>> {
        if let Some(method) = self.methods.get(name) {
            return Some(method);
        }
        self.extends.iter().find_map(|ext| ext.lookup_method(name))
    }

    /// Whether `self` is `other` or transitively extends it.
    pub fn extends_interface(&self, other: &InterfaceType) -> bool {
        if self.name == other.name {
            return true;
        }
        self.extends
            .iter()
            .any(|ext| ext.extends_interface(other))
    }
}

#[derive(Clone, Debug)]
pub struct EnumType {
    pub name: String,
    /// Declared order.
    pub members: Vec<String>,
}

impl EnumType {
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }
}

#[derive(Clone, Debug)]
pub struct GenericAlias {
    pub name: String,
    pub params: Vec<String>,
    /// Unresolved body; instantiation is call-by-name substitution over it.
    pub body: TypeExpr,
}

impl Type {
    /// Builds a union from resolved members, flattening nested unions and
    /// dropping duplicates.
    pub fn union_of(members: Vec<Type>) -> Type {
        let mut flat: Vec<Type> = Vec::with_capacity(members.len());
        let mut push = |ty: Type, flat: &mut Vec<Type>| {
            if !flat.iter().any(|existing| existing == &ty) {
                flat.push(ty);
            }
        };
        for member in members {
            match member {
                Type::Union(inner) => {
                    for ty in inner {
                        push(ty, &mut flat);
                    }
                }
                other => push(other, &mut flat),
            }
        }
        Type::Union(flat)
    }

    /// The assignability predicate `self ≤ other`: a value of type `self`
    /// can be used where `other` is expected.
    pub fn is_assignable_to(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        // `any` is top in both directions.
        if matches!(other, Type::Any) || matches!(self, Type::Any) {
            return true;
        }

        match self {
            // An optional never flows into a non-optional; it must be
            // narrowed first.
            Type::Optional(base) => match other {
                Type::Optional(other_base) => base.is_assignable_to(other_base),
                _ => false,
            },
            // A union fits wherever every member fits.
            Type::Union(members) => members.iter().all(|m| m.is_assignable_to(other)),
            _ => match other {
                Type::Optional(other_base) => {
                    matches!(self, Type::Nil) || self.is_assignable_to(other_base)
                }
                // Anything fits a union if it fits some member; a literal's
                // primitive counts through the member check.
                Type::Union(members) => members.iter().any(|m| self.is_assignable_to(m)),
                _ => self.is_assignable_to_base(other),
            },
        }
    }

    fn is_assignable_to_base(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::StringLiteral(_), Type::String) => true,
            (Type::NumberLiteral(_), Type::Number) => true,
            // Arrays are covariant in their element type.
            (Type::Array(elem), Type::Array(other_elem)) => elem.is_assignable_to(other_elem),
            // Tables are covariant in both key and value types.
            (
                Type::Table { key, value },
                Type::Table {
                    key: other_key,
                    value: other_value,
                },
            ) => key.is_assignable_to(other_key) && value.is_assignable_to(other_value),
            (Type::Tuple(elems), Type::Tuple(other_elems)) => {
                elems.len() == other_elems.len()
                    && elems
                        .iter()
                        .zip(other_elems)
                        .all(|(a, b)| a.is_assignable_to(b))
            }
            // Parameter-contravariant, return-covariant, same arity.
            (Type::Function(f), Type::Function(g)) => {
                f.parameters.len() == g.parameters.len()
                    && f.parameters
                        .iter()
                        .zip(&g.parameters)
                        .all(|(a, b)| b.is_assignable_to(a))
                    && f.return_type.is_assignable_to(&g.return_type)
            }
            // Classes are nominal, through the parent chain.
            (Type::Class(class), Type::Class(other_class)) => class.extends(other_class),
            // A class fits any interface in its implements chain.
            (Type::Class(class), Type::Interface(iface)) => {
                let mut current = Some(&**class);
                while let Some(class) = current {
                    if class
                        .implements
                        .iter()
                        .any(|impl_| impl_.extends_interface(iface))
                    {
                        return true;
                    }
                    current = class.parent.as_deref();
                }
                false
            }
            // Interfaces: extension chain, then structural compatibility,
            // which is what lets table literals flow into object shapes.
            (Type::Interface(this), Type::Interface(other_iface)) => {
                if this.extends_interface(other_iface) {
                    return true;
                }
                let props_ok = other_iface.properties.iter().all(|(name, required)| {
                    this.lookup_property(name)
                        .is_some_and(|ty| ty.is_assignable_to(required))
                });
                let methods_ok = other_iface.methods.iter().all(|(name, required)| {
                    this.lookup_method(name).is_some_and(|method| {
                        Type::Function(Rc::clone(method))
                            .is_assignable_to(&Type::Function(Rc::clone(required)))
                    })
                });
                props_ok && methods_ok
            }
            _ => false,
        }
    }
}

// Nominal types compare by name; everything else compares structurally.
// Union equality ignores member order.
impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Number, Type::Number)
            | (Type::String, Type::String)
            | (Type::Boolean, Type::Boolean)
            | (Type::Nil, Type::Nil)
            | (Type::Void, Type::Void)
            | (Type::Any, Type::Any) => true,
            (Type::StringLiteral(a), Type::StringLiteral(b)) => a == b,
            (Type::NumberLiteral(a), Type::NumberLiteral(b)) => a == b,
            (Type::Array(a), Type::Array(b)) => a == b,
            (
                Type::Table { key, value },
                Type::Table {
                    key: other_key,
                    value: other_value,
                },
            ) => key == other_key && value == other_value,
            (Type::Tuple(a), Type::Tuple(b)) => a == b,
            (Type::Function(a), Type::Function(b)) => a == b,
            (Type::Union(a), Type::Union(b)) => {
                a.len() == b.len()
                    && a.iter().all(|m| b.contains(m))
            }
            (Type::Optional(a), Type::Optional(b)) => a == b,
            (Type::Class(a), Type::Class(b)) => a.name == b.name,
            (Type::Interface(a), Type::Interface(b)) => a.name == b.name,
            (Type::Enum(a), Type::Enum(b)) => a.name == b.name,
            (Type::GenericAlias(a), Type::GenericAlias(b)) => {
                a.name == b.name && a.params == b.params
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::Boolean => f.write_str("boolean"),
            Type::Nil => f.write_str("nil"),
            Type::Void => f.write_str("void"),
            Type::Any => f.write_str("any"),
            Type::StringLiteral(value) => write!(f, "\"{value}\""),
            Type::NumberLiteral(value) => f.write_str(&format_number(*value)),
            Type::Array(elem) => write!(f, "{elem}[]"),
            Type::Table { key, value } => write!(f, "table<{key}, {value}>"),
            Type::Tuple(elems) => {
                f.write_str("(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                f.write_str(")")
            }
            Type::Function(func) => write!(f, "{func}"),
            Type::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
            Type::Optional(base) => write!(f, "{base}?"),
            Type::Class(class) => f.write_str(&class.name),
            Type::Interface(iface) => f.write_str(&iface.name),
            Type::Enum(en) => f.write_str(&en.name),
            Type::GenericAlias(alias) => {
                write!(f, "{}<{}>", alias.name, alias.params.join(", "))
            }
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

/// Formats a number the way the generated dialect writes it: no trailing
/// `.0` for integral values.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_literal(s: &str) -> Type {
        Type::StringLiteral(s.to_string())
    }

    #[test]
    fn any_is_top_both_ways() {
        let types = [
            Type::Number,
            Type::String,
            Type::Nil,
            Type::Void,
            string_literal("x"),
            Type::Array(Box::new(Type::Number)),
        ];
        for ty in &types {
            assert!(ty.is_assignable_to(&Type::Any));
            assert!(Type::Any.is_assignable_to(ty));
        }
    }

    #[test]
    fn primitives_are_reflexive_only() {
        assert!(Type::Number.is_assignable_to(&Type::Number));
        assert!(!Type::Number.is_assignable_to(&Type::String));
        assert!(!Type::String.is_assignable_to(&Type::Boolean));
        assert!(!Type::Void.is_assignable_to(&Type::Nil));
    }

    #[test]
    fn literals_fit_their_primitive() {
        assert!(string_literal("on").is_assignable_to(&Type::String));
        assert!(Type::NumberLiteral(4.0).is_assignable_to(&Type::Number));
        assert!(!string_literal("on").is_assignable_to(&Type::Number));
        // Not the other way around.
        assert!(!Type::String.is_assignable_to(&string_literal("on")));
    }

    #[test]
    fn unions_flatten_and_dedupe() {
        let inner = Type::union_of(vec![Type::Number, Type::Nil]);
        let outer = Type::union_of(vec![inner, Type::Number, Type::String]);
        let Type::Union(members) = &outer else {
            panic!("expected union");
        };
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn union_assignability() {
        let status = Type::union_of(vec![
            string_literal("loading"),
            string_literal("success"),
        ]);
        assert!(string_literal("loading").is_assignable_to(&status));
        assert!(!string_literal("invalid").is_assignable_to(&status));

        // A literal also fits a union through its primitive.
        let with_primitive = Type::union_of(vec![Type::Nil, Type::String]);
        assert!(string_literal("anything").is_assignable_to(&with_primitive));

        // Union-to-type needs every member to fit.
        let nums = Type::union_of(vec![Type::NumberLiteral(1.0), Type::NumberLiteral(2.0)]);
        assert!(nums.is_assignable_to(&Type::Number));
        let mixed = Type::union_of(vec![Type::NumberLiteral(1.0), Type::String]);
        assert!(!mixed.is_assignable_to(&Type::Number));
    }

    #[test]
    fn union_equality_ignores_order() {
        let a = Type::union_of(vec![Type::Number, Type::Nil]);
        let b = Type::union_of(vec![Type::Nil, Type::Number]);
        assert_eq!(a, b);
    }

    #[test]
    fn containers_are_covariant() {
        let nums = Type::Array(Box::new(Type::NumberLiteral(1.0)));
        let array_of_number = Type::Array(Box::new(Type::Number));
        assert!(nums.is_assignable_to(&array_of_number));
        assert!(!array_of_number.is_assignable_to(&nums));

        let narrow = Type::Table {
            key: Box::new(Type::String),
            value: Box::new(Type::NumberLiteral(1.0)),
        };
        let wide = Type::Table {
            key: Box::new(Type::String),
            value: Box::new(Type::Number),
        };
        assert!(narrow.is_assignable_to(&wide));
    }

    #[test]
    fn tuples_are_componentwise() {
        let a = Type::Tuple(vec![Type::NumberLiteral(1.0), Type::String]);
        let b = Type::Tuple(vec![Type::Number, Type::String]);
        assert!(a.is_assignable_to(&b));
        assert!(!b.is_assignable_to(&a));
        let short = Type::Tuple(vec![Type::Number]);
        assert!(!short.is_assignable_to(&b));
    }

    #[test]
    fn functions_are_contravariant_in_parameters() {
        let takes_literal = Type::Function(Rc::new(FunctionType {
            parameters: vec![Type::NumberLiteral(1.0)],
            return_type: Type::Void,
        }));
        let takes_number = Type::Function(Rc::new(FunctionType {
            parameters: vec![Type::Number],
            return_type: Type::Void,
        }));
        // A function accepting any number works where one accepting only the
        // literal is required.
        assert!(takes_number.is_assignable_to(&takes_literal));
        assert!(!takes_literal.is_assignable_to(&takes_number));
    }

    #[test]
    fn optionals() {
        let opt_number = Type::Optional(Box::new(Type::Number));
        assert!(Type::Nil.is_assignable_to(&opt_number));
        assert!(Type::Number.is_assignable_to(&opt_number));
        assert!(Type::NumberLiteral(3.0).is_assignable_to(&opt_number));
        // Must be narrowed before flowing into the base.
        assert!(!opt_number.is_assignable_to(&Type::Number));
        // Optional-to-optional follows the base types.
        let opt_literal = Type::Optional(Box::new(Type::NumberLiteral(3.0)));
        assert!(opt_literal.is_assignable_to(&opt_number));
        assert!(!opt_number.is_assignable_to(&opt_literal));
    }

    fn class(name: &str, parent: Option<Rc<ClassType>>) -> Rc<ClassType> {
        Rc::new(ClassType {
            name: name.to_string(),
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
            is_abstract: false,
        })
    }

    fn interface(name: &str, extends: Vec<Rc<InterfaceType>>) -> Rc<InterfaceType> {
        Rc::new(InterfaceType {
            name: name.to_string(),
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
            extends,
        })
    }

    #[test]
    fn classes_are_nominal_through_parents() {
        let animal = class("Animal", None);
        let dog = class("Dog", Some(Rc::clone(&animal)));
        let cat = class("Cat", Some(Rc::clone(&animal)));

        assert!(Type::Class(Rc::clone(&dog)).is_assignable_to(&Type::Class(Rc::clone(&animal))));
        assert!(!Type::Class(Rc::clone(&animal)).is_assignable_to(&Type::Class(Rc::clone(&dog))));
        assert!(!Type::Class(dog).is_assignable_to(&Type::Class(cat)));
    }

    #[test]
    fn class_to_interface_through_implements() {
        let base = interface("Named", vec![]);
        let derived = interface("Pet", vec![Rc::clone(&base)]);
        let mut dog = ClassType {
            name: "Dog".to_string(),
            parent: None,
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
            static_properties: BTreeMap::new(),
            static_methods: BTreeMap::new(),
            readonly: BTreeSet::new(),
            abstract_methods: BTreeSet::new(),
            visibility: BTreeMap::new(),
            constructor: None,
            implements: Vec::new(),
            is_abstract: false,
        };
        dog.implements.push(Rc::clone(&derived));
        let dog = Type::Class(Rc::new(dog));

        assert!(dog.is_assignable_to(&Type::Interface(Rc::clone(&derived))));
        // Through the interface's own extension chain too.
        assert!(dog.is_assignable_to(&Type::Interface(base)));
    }

    #[test]
    fn interface_structural_compatibility() {
        let mut anonymous = InterfaceType {
            name: "<table literal>".to_string(),
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
            extends: Vec::new(),
        };
        anonymous
            .properties
            .insert("x".to_string(), Type::NumberLiteral(10.0));
        anonymous
            .properties
            .insert("y".to_string(), Type::NumberLiteral(20.0));

        let mut point = InterfaceType {
            name: "Point".to_string(),
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
            extends: Vec::new(),
        };
        point.properties.insert("x".to_string(), Type::Number);
        point.properties.insert("y".to_string(), Type::Number);

        let anonymous = Type::Interface(Rc::new(anonymous));
        let point = Type::Interface(Rc::new(point));
        assert!(anonymous.is_assignable_to(&point));
        // Missing a required property fails.
        let mut partial = InterfaceType {
            name: "<table literal>".to_string(),
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
            extends: Vec::new(),
        };
        partial
            .properties
            .insert("x".to_string(), Type::NumberLiteral(10.0));
        assert!(!Type::Interface(Rc::new(partial)).is_assignable_to(&point));
    }

    #[test]
    fn enums_are_nominal_identity_only() {
        let color = Type::Enum(Rc::new(EnumType {
            name: "Color".to_string(),
            members: vec!["Red".to_string()],
        }));
        let status = Type::Enum(Rc::new(EnumType {
            name: "Status".to_string(),
            members: vec!["Active".to_string()],
        }));
        assert!(color.is_assignable_to(&color.clone()));
        assert!(!color.is_assignable_to(&status));
        assert!(!color.is_assignable_to(&Type::Number));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Type::StringLiteral("foo".into()).to_string(), "\"foo\"");
        assert_eq!(Type::NumberLiteral(42.0).to_string(), "42");
        assert_eq!(Type::NumberLiteral(2.5).to_string(), "2.5");
        assert_eq!(
            Type::Array(Box::new(Type::String)).to_string(),
            "string[]"
        );
        assert_eq!(
            Type::Table {
                key: Box::new(Type::String),
                value: Box::new(Type::Number)
            }
            .to_string(),
            "table<string, number>"
        );
        assert_eq!(
            Type::union_of(vec![Type::Nil, Type::Number]).to_string(),
            "nil | number"
        );
        assert_eq!(
            Type::Optional(Box::new(Type::String)).to_string(),
            "string?"
        );
        assert_eq!(
            Type::Function(Rc::new(FunctionType {
                parameters: vec![Type::Number, Type::String],
                return_type: Type::Void,
            }))
            .to_string(),
            "(number, string) -> void"
        );
    }

    #[test]
    fn assignability_is_reflexive_and_transitive() {
        let animal = class("Animal", None);
        let mammal = class("Mammal", Some(Rc::clone(&animal)));
        let dog = class("Dog", Some(Rc::clone(&mammal)));
        let samples = vec![
            Type::Number,
            Type::StringLiteral("s".into()),
            Type::union_of(vec![Type::Nil, Type::Number]),
            Type::Optional(Box::new(Type::String)),
            Type::Array(Box::new(Type::Number)),
            Type::Class(Rc::clone(&dog)),
            Type::Class(Rc::clone(&mammal)),
            Type::Class(animal),
        ];
        for ty in &samples {
            assert!(ty.is_assignable_to(ty), "{ty} not reflexive");
        }
        for a in &samples {
            for b in &samples {
                for c in &samples {
                    if a.is_assignable_to(b) && b.is_assignable_to(c) {
                        assert!(a.is_assignable_to(c), "{a} <= {b} <= {c} broke transitivity");
                    }
                }
            }
        }
    }
}

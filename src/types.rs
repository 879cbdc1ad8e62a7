use std::fmt;
use std::rc::Rc;

/// The nine built-in simple types. They form a closed lattice: `Any` is the
/// unique top, `Integer` and `Decimal` sit below `Number`, everything else
/// relates to `Any` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleType {
    Any,
    Number,
    Integer,
    Decimal,
    String,
    Boolean,
    Null,
    Undefined,
    Void,
}

impl SimpleType {
    pub const ALL: [SimpleType; 9] = [
        Self::Any,
        Self::Number,
        Self::Integer,
        Self::Decimal,
        Self::String,
        Self::Boolean,
        Self::Null,
        Self::Undefined,
        Self::Void,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Void => "void",
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn direct_supertypes(self) -> &'static [SimpleType] {
        match self {
            Self::Integer | Self::Decimal => &[Self::Number],
            Self::Number | Self::String | Self::Boolean => &[Self::Any],
            Self::Any | Self::Null | Self::Undefined | Self::Void => &[],
        }
    }

    fn is_subtype_of_simple(self, other: SimpleType) -> bool {
        if other == Self::Any || self == other {
            return true;
        }
        self.direct_supertypes()
            .iter()
            .any(|&upper| upper == other || upper.is_subtype_of_simple(other))
    }
}

/// The structural type of a function: return type plus parameter types.
/// Function types carry a stable name so serialized modules can refer to
/// them by name.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub name: String,
    pub return_type: Type,
    pub param_types: Vec<Type>,
}

impl FunctionType {
    pub fn new(function_name: &str, return_type: Type, param_types: Vec<Type>) -> Self {
        Self {
            name: format!("@function:{function_name}"),
            return_type,
            param_types,
        }
    }
}

/// An ad-hoc union produced by `upper_bound` on unrelated types. The name is
/// derived from the member names so equal unions serialize identically.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionType {
    pub name: String,
    pub members: Vec<Type>,
}

impl UnionType {
    pub fn new(members: Vec<Type>) -> Self {
        let joined = members
            .iter()
            .map(Type::name)
            .collect::<Vec<_>>()
            .join("|");
        Self {
            name: format!("@union:{joined}"),
            members,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Simple(SimpleType),
    Function(Rc<FunctionType>),
    Union(Rc<UnionType>),
}

impl Type {
    pub const ANY: Type = Type::Simple(SimpleType::Any);

    pub fn name(&self) -> &str {
        match self {
            Self::Simple(simple) => simple.name(),
            Self::Function(function) => &function.name,
            Self::Union(union) => &union.name,
        }
    }

    /// The reflexive-transitive subtype relation of the lattice.
    ///
    /// Simple types climb their supertype chain and may land in a union
    /// member. Function types admit no structural subtyping: identity or
    /// union membership only. A union is a subtype of another union when
    /// every member finds a home on the other side.
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        if matches!(other, Type::Simple(SimpleType::Any)) {
            return true;
        }
        match (self, other) {
            (Type::Simple(left), Type::Simple(right)) => left.is_subtype_of_simple(*right),
            (Type::Simple(_), Type::Union(union)) => union
                .members
                .iter()
                .any(|member| self.is_subtype_of(member)),
            (Type::Function(_), Type::Union(union)) => {
                union.members.iter().any(|member| member == self)
            }
            (Type::Function(_), _) => self == other,
            (Type::Union(left), Type::Union(right)) => left.members.iter().all(|member| {
                right
                    .members
                    .iter()
                    .any(|candidate| member.is_subtype_of(candidate))
            }),
            _ => false,
        }
    }

    /// Least upper bound of two types. Falls back to a fresh two-member
    /// union when neither side subsumes the other.
    pub fn upper_bound(t1: &Type, t2: &Type) -> Type {
        if matches!(t1, Type::Simple(SimpleType::Any)) || matches!(t2, Type::Simple(SimpleType::Any))
        {
            return Type::ANY;
        }
        if t1.is_subtype_of(t2) {
            return t2.clone();
        }
        if t2.is_subtype_of(t1) {
            return t1.clone();
        }
        Type::Union(Rc::new(UnionType::new(vec![t1.clone(), t2.clone()])))
    }
}

impl From<SimpleType> for Type {
    fn from(simple: SimpleType) -> Self {
        Type::Simple(simple)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(simple: SimpleType) -> Type {
        Type::Simple(simple)
    }

    #[test]
    fn every_simple_type_is_a_subtype_of_any() {
        for simple in SimpleType::ALL {
            assert!(t(simple).is_subtype_of(&Type::ANY), "{simple:?} <: any");
        }
    }

    #[test]
    fn subtyping_is_reflexive_and_transitive() {
        for simple in SimpleType::ALL {
            assert!(t(simple).is_subtype_of(&t(simple)));
        }
        // integer <: number <: any, therefore integer <: any.
        assert!(t(SimpleType::Integer).is_subtype_of(&t(SimpleType::Number)));
        assert!(t(SimpleType::Number).is_subtype_of(&t(SimpleType::Any)));
        assert!(t(SimpleType::Integer).is_subtype_of(&t(SimpleType::Any)));
    }

    #[test]
    fn unrelated_simple_types_are_not_subtypes() {
        assert!(!t(SimpleType::String).is_subtype_of(&t(SimpleType::Number)));
        assert!(!t(SimpleType::Number).is_subtype_of(&t(SimpleType::Integer)));
        assert!(!t(SimpleType::Any).is_subtype_of(&t(SimpleType::Number)));
    }

    #[test]
    fn upper_bound_of_integer_and_number_is_number() {
        let bound = Type::upper_bound(&t(SimpleType::Integer), &t(SimpleType::Number));
        assert_eq!(bound, t(SimpleType::Number));
    }

    #[test]
    fn upper_bound_of_unrelated_types_is_a_union() {
        let bound = Type::upper_bound(&t(SimpleType::Integer), &t(SimpleType::String));
        let Type::Union(union) = &bound else {
            panic!("expected union, got {bound:?}");
        };
        assert_eq!(union.members.len(), 2);
        assert!(t(SimpleType::Integer).is_subtype_of(&bound));
        assert!(t(SimpleType::String).is_subtype_of(&bound));
        assert!(!t(SimpleType::Boolean).is_subtype_of(&bound));
    }

    #[test]
    fn union_is_subtype_of_wider_union() {
        let narrow = Type::Union(Rc::new(UnionType::new(vec![
            t(SimpleType::Integer),
            t(SimpleType::String),
        ])));
        let wide = Type::Union(Rc::new(UnionType::new(vec![
            t(SimpleType::Number),
            t(SimpleType::String),
            t(SimpleType::Boolean),
        ])));
        assert!(narrow.is_subtype_of(&wide));
        assert!(!wide.is_subtype_of(&narrow));
        assert!(narrow.is_subtype_of(&Type::ANY));
    }

    #[test]
    fn function_types_compare_by_identity_only() {
        let f1 = Type::Function(Rc::new(FunctionType::new(
            "f",
            t(SimpleType::Integer),
            vec![t(SimpleType::Integer)],
        )));
        let g = Type::Function(Rc::new(FunctionType::new(
            "g",
            t(SimpleType::Integer),
            vec![t(SimpleType::Integer)],
        )));
        assert!(f1.is_subtype_of(&f1));
        assert!(f1.is_subtype_of(&Type::ANY));
        assert!(!f1.is_subtype_of(&g));
    }

    #[test]
    fn type_names_resolve_round_trip() {
        for simple in SimpleType::ALL {
            assert_eq!(SimpleType::by_name(simple.name()), Some(simple));
        }
        assert_eq!(SimpleType::by_name("list"), None);
    }
}

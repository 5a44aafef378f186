use crate::language::expr::BinaryOp;
use std::cmp::Ordering;
use std::fmt;

/// Semantic type carried by every variable, spelled as a prefix tag in
/// declarations (`int.count = 3`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarType {
    String,
    Integer,
    Float,
    Binary,
    List,
    Boolean,
    Unknown,
}

impl VarType {
    /// Unrecognised tags fall back to `String`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "str" => VarType::String,
            "int" => VarType::Integer,
            "fl" => VarType::Float,
            "bin" => VarType::Binary,
            "ls" => VarType::List,
            "act" => VarType::Boolean,
            _ => VarType::String,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            VarType::String => "str",
            VarType::Integer => "int",
            VarType::Float => "fl",
            VarType::Binary => "bin",
            VarType::List => "ls",
            VarType::Boolean => "act",
            VarType::Unknown => "unknown",
        }
    }

    fn is_integral(self) -> bool {
        matches!(self, VarType::Integer | VarType::Binary)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Variable>),
}

/// A typed, named value. Fields are private so the stored `Value` always
/// matches `ty`; every constructor coerces.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    ty: VarType,
    name: String,
    value: Value,
    defined: bool,
}

impl Variable {
    /// Builds a variable of `ty` from literal text, defaulting malformed
    /// input (`int` from `"abc"` is `0`).
    pub fn parse(ty: VarType, name: impl Into<String>, text: &str) -> Self {
        let value = match ty {
            VarType::String | VarType::Unknown => Value::Str(strip_quotes(text).to_string()),
            VarType::Integer => Value::Int(parse_int(text)),
            VarType::Float => Value::Float(text.trim().parse::<f64>().unwrap_or(0.0)),
            VarType::Binary => Value::Int(parse_binary(text)),
            VarType::Boolean => {
                let lowered = text.trim().to_ascii_lowercase();
                Value::Bool(lowered == "true" || lowered == "1")
            }
            VarType::List => Value::List(Vec::new()),
        };
        Self {
            ty,
            name: name.into(),
            value,
            defined: true,
        }
    }

    /// Parses a `type.name` pair; a missing tag means `str`.
    pub fn declare(type_and_name: &str, text: &str) -> Self {
        let (ty, name) = split_type_and_name(type_and_name);
        Self::parse(ty, name, text)
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(VarType::String, name, Value::Str(value.into()))
    }

    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::with_value(VarType::Integer, name, Value::Int(value))
    }

    pub fn float(name: impl Into<String>, value: f64) -> Self {
        Self::with_value(VarType::Float, name, Value::Float(value))
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::with_value(VarType::Boolean, name, Value::Bool(value))
    }

    pub fn list(name: impl Into<String>, items: Vec<Variable>) -> Self {
        Self::with_value(VarType::List, name, Value::List(items))
    }

    /// The "variable not found" sentinel: an empty, undefined `String`.
    pub fn undefined() -> Self {
        Self {
            ty: VarType::String,
            name: "undefined".into(),
            value: Value::Str(String::new()),
            defined: false,
        }
    }

    /// Error-tagged value handed back by failed arithmetic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::string("error", message)
    }

    fn with_value(ty: VarType, name: impl Into<String>, value: Value) -> Self {
        Self {
            ty,
            name: name.into(),
            value,
            defined: true,
        }
    }

    /// Literal inference for a bare token: quoted text is a `String`, digits
    /// with an optional leading `-` an `Integer`, digits with one `.` a
    /// `Float`. Anything else is not a literal.
    pub fn literal(token: &str) -> Option<Self> {
        if token.is_empty() {
            return Some(Self::string("empty", ""));
        }
        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            let inner = &token[1..token.len() - 1];
            // `"a" + "b"` is an expression, not one literal.
            if closes_early(inner) {
                return None;
            }
            return Some(Self::string("literal", inner));
        }
        let digits = token.strip_prefix('-').unwrap_or(token);
        if !digits.chars().any(|ch| ch.is_ascii_digit())
            || !digits.chars().all(|ch| ch.is_ascii_digit() || ch == '.')
        {
            return None;
        }
        match digits.matches('.').count() {
            0 => Some(Self::parse(VarType::Integer, "literal", token)),
            1 => Some(Self::parse(VarType::Float, "literal", token)),
            _ => None,
        }
    }

    pub fn ty(&self) -> VarType {
        self.ty
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn type_and_name(&self) -> String {
        format!("{}.{}", self.ty.tag(), self.name)
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn is_undefined(&self) -> bool {
        !self.defined
    }

    pub fn is_string(&self) -> bool {
        self.ty == VarType::String
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn as_int(&self) -> i64 {
        match self.value {
            Value::Int(v) => v,
            _ => 0,
        }
    }

    pub fn as_float(&self) -> f64 {
        match self.value {
            Value::Float(v) => v,
            _ => 0.0,
        }
    }

    pub fn as_str(&self) -> &str {
        match &self.value {
            Value::Str(v) => v,
            _ => "",
        }
    }

    pub fn as_bool(&self) -> bool {
        matches!(self.value, Value::Bool(true))
    }

    pub fn items(&self) -> &[Variable] {
        match &self.value {
            Value::List(items) => items,
            _ => &[],
        }
    }

    /// Appends to a `List`; any other type is left untouched.
    pub fn push(&mut self, item: Variable) -> bool {
        match &mut self.value {
            Value::List(items) => {
                items.push(item);
                true
            }
            _ => false,
        }
    }

    /// Truthiness used by conditions: booleans by value, integers when
    /// nonzero, strings when non-empty. Other types are false.
    pub fn truthy(&self) -> bool {
        match (&self.value, self.ty) {
            (Value::Bool(v), _) => *v,
            (Value::Int(v), ty) if ty.is_integral() => *v != 0,
            (Value::Str(v), VarType::String) => !v.is_empty(),
            _ => false,
        }
    }

    pub fn is_zero(&self) -> bool {
        match (&self.value, self.ty) {
            (Value::Int(v), ty) if ty.is_integral() => *v == 0,
            (Value::Float(v), VarType::Float) => *v == 0.0,
            _ => false,
        }
    }

    /// Re-types a value for a declaration. Same-typed values are kept as-is,
    /// everything else round-trips through its string form.
    pub fn coerce(self, ty: VarType, name: impl Into<String>) -> Self {
        if self.ty == ty && self.defined {
            return self.renamed(name);
        }
        if ty == VarType::List {
            return Self::list(name, Vec::new());
        }
        let text = self.to_string();
        Self::parse(ty, name, &text)
    }
}

impl Default for Variable {
    fn default() -> Self {
        Self::with_value(VarType::Unknown, "unknown", Value::Str(String::new()))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::Str(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Bool(v) => write!(f, "{v}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithmeticError {
    DivisionByZero,
    Unsupported,
}

/// Applies a binary operator under the coercion rules: integer with integer,
/// float with float (mixed numerics promote to float), and `+` concatenates
/// as soon as either side is a string.
pub fn arithmetic(
    op: BinaryOp,
    left: &Variable,
    right: &Variable,
) -> Result<Variable, ArithmeticError> {
    if op == BinaryOp::Div && right.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    match numeric_pair(left, right, true) {
        Some(Numeric::Ints(a, b)) => {
            let value = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div => a.wrapping_div(b),
            };
            Ok(Variable::integer("result", value))
        }
        Some(Numeric::Floats(a, b)) => {
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
            };
            Ok(Variable::float("result", value))
        }
        None if op == BinaryOp::Add && (left.is_string() || right.is_string()) => {
            Ok(Variable::string("result", format!("{left}{right}")))
        }
        None => Err(ArithmeticError::Unsupported),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    NotEq,
    GtEq,
    LtEq,
    Gt,
    Lt,
    Eq,
}

impl Comparison {
    /// Operators in the order a condition is scanned for them.
    pub const SCAN_ORDER: [Comparison; 6] = [
        Comparison::NotEq,
        Comparison::GtEq,
        Comparison::LtEq,
        Comparison::Gt,
        Comparison::Lt,
        Comparison::Eq,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::NotEq => "!=",
            Comparison::GtEq => ">=",
            Comparison::LtEq => "<=",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Eq => "==",
        }
    }

    fn holds(self, ordering: Option<Ordering>) -> bool {
        match self {
            Comparison::Eq => ordering == Some(Ordering::Equal),
            Comparison::NotEq => ordering != Some(Ordering::Equal),
            Comparison::Gt => ordering == Some(Ordering::Greater),
            Comparison::Lt => ordering == Some(Ordering::Less),
            Comparison::GtEq => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            Comparison::LtEq => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

/// Equality on mismatched types compares string forms; ordering requires
/// both sides integer or both float and is false otherwise.
pub fn compare(op: Comparison, left: &Variable, right: &Variable) -> bool {
    match numeric_pair(left, right, false) {
        Some(Numeric::Ints(a, b)) => op.holds(Some(a.cmp(&b))),
        Some(Numeric::Floats(a, b)) => op.holds(a.partial_cmp(&b)),
        None => match op {
            Comparison::Eq => left.to_string() == right.to_string(),
            Comparison::NotEq => left.to_string() != right.to_string(),
            _ => false,
        },
    }
}

enum Numeric {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numeric_pair(left: &Variable, right: &Variable, promote: bool) -> Option<Numeric> {
    match (&left.value, &right.value) {
        (Value::Int(a), Value::Int(b)) if left.ty.is_integral() && right.ty.is_integral() => {
            Some(Numeric::Ints(*a, *b))
        }
        (Value::Float(a), Value::Float(b)) => Some(Numeric::Floats(*a, *b)),
        (Value::Int(a), Value::Float(b)) if promote && left.ty.is_integral() => {
            Some(Numeric::Floats(*a as f64, *b))
        }
        (Value::Float(a), Value::Int(b)) if promote && right.ty.is_integral() => {
            Some(Numeric::Floats(*a, *b as f64))
        }
        _ => None,
    }
}

pub fn split_type_and_name(type_and_name: &str) -> (VarType, &str) {
    match type_and_name.split_once('.') {
        Some((tag, name)) => (VarType::from_tag(tag), name.trim()),
        None => (VarType::String, type_and_name.trim()),
    }
}

fn closes_early(inner: &str) -> bool {
    let mut escaped = false;
    for ch in inner.chars() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return true,
            _ => {}
        }
    }
    false
}

pub fn strip_quotes(text: &str) -> &str {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

fn parse_int(text: &str) -> i64 {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| {
            text.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v as i64)
        })
        .unwrap_or(0)
}

fn parse_binary(text: &str) -> i64 {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    if let Some(bits) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        return i64::from_str_radix(bits, 2).unwrap_or(0);
    }
    parse_int(text)
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_integer_defaults_to_zero() {
        let var = Variable::declare("int.count", "abc");
        assert_eq!(var.ty(), VarType::Integer);
        assert_eq!(var.as_int(), 0);
        assert_eq!(var.name(), "count");
    }

    #[test]
    fn missing_tag_declares_string() {
        let var = Variable::declare("greeting", "\"hi\"");
        assert_eq!(var.ty(), VarType::String);
        assert_eq!(var.as_str(), "hi");
    }

    #[test]
    fn binary_accepts_hex_and_bits() {
        assert_eq!(Variable::declare("bin.mask", "0xFF").as_int(), 255);
        assert_eq!(Variable::declare("bin.mask", "0b101").as_int(), 5);
    }

    #[test]
    fn list_declaration_is_empty_and_appendable() {
        let mut list = Variable::declare("ls.items", "[1, 2]");
        assert!(list.items().is_empty());
        assert!(list.push(Variable::integer("item", 4)));
        assert_eq!(list.to_string(), "[4]");
        let mut text = Variable::string("s", "x");
        assert!(!text.push(Variable::integer("item", 1)));
    }

    #[test]
    fn literal_inference() {
        assert_eq!(Variable::literal("-12").map(|v| v.as_int()), Some(-12));
        let float = Variable::literal("2.5").expect("float literal");
        assert_eq!(float.ty(), VarType::Float);
        assert_eq!(float.as_float(), 2.5);
        assert_eq!(
            Variable::literal("\"a b\"").map(|v| v.as_str().to_string()),
            Some("a b".to_string())
        );
        assert!(Variable::literal("1.2.3").is_none());
        assert!(Variable::literal("count").is_none());
        assert!(Variable::literal("-").is_none());
    }

    #[test]
    fn undefined_sentinel_is_an_empty_string() {
        let var = Variable::undefined();
        assert!(var.is_undefined());
        assert!(var.is_string());
        assert_eq!(var.to_string(), "");
    }

    #[test]
    fn arithmetic_follows_operand_types() {
        let sum = arithmetic(
            BinaryOp::Add,
            &Variable::integer("a", 2),
            &Variable::integer("b", 3),
        )
        .expect("int sum");
        assert_eq!(sum.ty(), VarType::Integer);
        assert_eq!(sum.as_int(), 5);

        let sum = arithmetic(
            BinaryOp::Add,
            &Variable::float("a", 2.5),
            &Variable::float("b", 1.5),
        )
        .expect("float sum");
        assert_eq!(sum.as_float(), 4.0);
        assert_eq!(sum.to_string(), "4.0");

        let joined = arithmetic(
            BinaryOp::Add,
            &Variable::string("a", "n="),
            &Variable::integer("b", 7),
        )
        .expect("concat");
        assert_eq!(joined.as_str(), "n=7");

        assert_eq!(
            arithmetic(
                BinaryOp::Sub,
                &Variable::string("a", "x"),
                &Variable::integer("b", 1)
            ),
            Err(ArithmeticError::Unsupported)
        );
    }

    #[test]
    fn division_by_either_zero_is_rejected() {
        let five = Variable::integer("a", 5);
        assert_eq!(
            arithmetic(BinaryOp::Div, &five, &Variable::integer("b", 0)),
            Err(ArithmeticError::DivisionByZero)
        );
        assert_eq!(
            arithmetic(BinaryOp::Div, &five, &Variable::float("b", 0.0)),
            Err(ArithmeticError::DivisionByZero)
        );
        let quotient =
            arithmetic(BinaryOp::Div, &five, &Variable::integer("b", 2)).expect("quotient");
        assert_eq!(quotient.as_int(), 2);
    }

    #[test]
    fn mixed_ordering_is_false_but_equality_falls_back_to_text() {
        let int = Variable::integer("a", 3);
        let float = Variable::float("b", 3.0);
        assert!(!compare(Comparison::Lt, &int, &float));
        assert!(!compare(Comparison::Gt, &int, &float));
        assert!(compare(Comparison::Eq, &int, &Variable::string("c", "3")));
        assert!(compare(Comparison::NotEq, &int, &float));
        assert!(compare(
            Comparison::LtEq,
            &Variable::integer("a", 2),
            &Variable::integer("b", 2)
        ));
    }

    #[test]
    fn coercion_keeps_same_typed_values() {
        let value = Variable::float("result", 4.0).coerce(VarType::Float, "c");
        assert_eq!(value.name(), "c");
        assert_eq!(value.as_float(), 4.0);
        let truncated = Variable::float("result", 4.75).coerce(VarType::Integer, "c");
        assert_eq!(truncated.as_int(), 4);
        let text = Variable::error("Division by zero").coerce(VarType::Integer, "c");
        assert_eq!(text.as_int(), 0);
    }

    #[test]
    fn truthiness() {
        assert!(Variable::integer("a", -1).truthy());
        assert!(!Variable::integer("a", 0).truthy());
        assert!(Variable::string("s", "x").truthy());
        assert!(!Variable::undefined().truthy());
        assert!(!Variable::float("f", 1.0).truthy());
        assert!(Variable::boolean("b", true).truthy());
    }
}

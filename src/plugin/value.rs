//! 脚本值与类型签名

use std::fmt;

/// 脚本运行时的值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// 值的运行时类型，同时也是参数声明可用的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    Unit,
    Bool,
    Int,
    Float,
    Str,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Unit => ValueType::Unit,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl ValueType {
    /// 脚本源码中的类型名 -> 类型（`unit` 不能用作参数类型）
    pub fn from_keyword(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(ValueType::Bool),
            "int" => Some(ValueType::Int),
            "float" => Some(ValueType::Float),
            "string" => Some(ValueType::Str),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Unit => "unit",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 参数类型签名，重载分派表的键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Signature(pub Vec<ValueType>);

impl Signature {
    /// 实参的运行时签名
    pub fn of(args: &[Value]) -> Self {
        Signature(args.iter().map(Value::value_type).collect())
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// 实参是否与本签名逐一相等
    pub fn accepts(&self, args: &[Value]) -> bool {
        self.0.len() == args.len()
            && self
                .0
                .iter()
                .zip(args)
                .all(|(ty, arg)| *ty == arg.value_type())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, ty) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", ty)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_of_args() {
        let sig = Signature::of(&[Value::from("Ada"), Value::Int(7), Value::Float(3.14)]);
        assert_eq!(
            sig,
            Signature(vec![ValueType::Str, ValueType::Int, ValueType::Float])
        );
        assert_eq!(sig.to_string(), "(string, int, float)");
    }

    #[test]
    fn int_does_not_accept_float() {
        let sig = Signature(vec![ValueType::Int]);
        assert!(sig.accepts(&[Value::Int(1)]));
        assert!(!sig.accepts(&[Value::Float(1.0)]));
        assert!(!sig.accepts(&[]));
    }

    #[test]
    fn type_keywords() {
        assert_eq!(ValueType::from_keyword("string"), Some(ValueType::Str));
        assert_eq!(ValueType::from_keyword("unit"), None);
        assert_eq!(ValueType::from_keyword("String"), None);
    }

    #[test]
    fn display_values() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Unit.to_string(), "()");
        assert_eq!(Value::from("x").to_string(), "x");
    }
}

//! Runtime values.
//!
//! A [`Value`] is immutable and cheap to clone: strings and lists are
//! reference counted.  A value read from a variable remembers the name it
//! was read from ([`Value::binding`]), which is how assignment operators
//! find their target.  The binding never affects equality or display.

use std::any::Any;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::error::ScriptError;

// ── Host values ───────────────────────────────────────────────────────────────

/// An opaque value supplied by the embedding application (the invoking
/// actor, a world handle, ...).  Scripts can pass it around and print it.
pub trait HostValue: fmt::Debug {
    fn type_name(&self) -> &str;
    fn display(&self) -> String;
    fn as_bool(&self) -> bool {
        true
    }
    fn as_any(&self) -> &dyn Any;
}

// ── LazyList ──────────────────────────────────────────────────────────────────

type IterFactory = dyn Fn() -> Box<dyn Iterator<Item = Value>>;

enum LazySource {
    Restartable(Box<IterFactory>),
    Once(RefCell<Option<Box<dyn Iterator<Item = Value>>>>),
}

/// A sequence produced on demand, possibly unbounded.
///
/// Restartable lists build a fresh iterator every time they are walked;
/// once-only lists can be walked a single time.
#[derive(Clone)]
pub struct LazyList(Rc<LazySource>);

impl LazyList {
    pub fn restartable<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Iterator<Item = Value>> + 'static,
    {
        LazyList(Rc::new(LazySource::Restartable(Box::new(factory))))
    }

    pub fn once<I>(iter: I) -> Self
    where
        I: Iterator<Item = Value> + 'static,
    {
        LazyList(Rc::new(LazySource::Once(RefCell::new(Some(Box::new(iter))))))
    }

    pub fn is_restartable(&self) -> bool {
        matches!(*self.0, LazySource::Restartable(_))
    }

    pub fn iter(&self) -> Result<Box<dyn Iterator<Item = Value>>, ScriptError> {
        match &*self.0 {
            LazySource::Restartable(factory) => Ok(factory()),
            LazySource::Once(cell) => cell
                .borrow_mut()
                .take()
                .ok_or_else(|| ScriptError::internal("iterator has already been consumed")),
        }
    }
}

impl fmt::Debug for LazyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_restartable() {
            f.write_str("LazyList(restartable)")
        } else {
            f.write_str("LazyList(once)")
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ValueData {
    Null,
    Number(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Iter(LazyList),
    Host(Rc<dyn HostValue>),
}

#[derive(Debug, Clone)]
pub struct Value {
    data: ValueData,
    binding: Option<Rc<str>>,
}

impl Default for Value {
    fn default() -> Self {
        Value::null()
    }
}

impl Value {
    fn from_data(data: ValueData) -> Self {
        Value { data, binding: None }
    }

    pub fn null() -> Self {
        Self::from_data(ValueData::Null)
    }

    pub fn number(n: f64) -> Self {
        Self::from_data(ValueData::Number(n))
    }

    pub fn boolean(b: bool) -> Self {
        Self::number(if b { 1.0 } else { 0.0 })
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::from_data(ValueData::Str(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::from_data(ValueData::List(Rc::new(items)))
    }

    pub fn iter(list: LazyList) -> Self {
        Self::from_data(ValueData::Iter(list))
    }

    pub fn host(h: Rc<dyn HostValue>) -> Self {
        Self::from_data(ValueData::Host(h))
    }

    pub fn data(&self) -> &ValueData {
        &self.data
    }

    // ── Binding ───────────────────────────────────────────────────────────────

    /// Name of the variable this value was read from, if any.
    pub fn binding(&self) -> Option<&Rc<str>> {
        self.binding.as_ref()
    }

    pub fn bind_to(mut self, name: Rc<str>) -> Self {
        self.binding = Some(name);
        self
    }

    pub fn unbound(mut self) -> Self {
        self.binding = None;
        self
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub fn is_null(&self) -> bool {
        matches!(self.data, ValueData::Null)
    }

    /// Truthiness: null, zero, the empty string and the empty list are false.
    pub fn as_bool(&self) -> bool {
        match &self.data {
            ValueData::Null => false,
            ValueData::Number(n) => *n != 0.0,
            ValueData::Str(s) => !s.is_empty(),
            ValueData::List(items) => !items.is_empty(),
            ValueData::Iter(_) => true,
            ValueData::Host(h) => h.as_bool(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match &self.data {
            ValueData::Null => Some(0.0),
            ValueData::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ValueData::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match &self.data {
            ValueData::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_host<T: 'static>(&self) -> Option<&T> {
        match &self.data {
            ValueData::Host(h) => h.as_any().downcast_ref(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match &self.data {
            ValueData::Null => "null",
            ValueData::Number(_) => "number",
            ValueData::Str(_) => "string",
            ValueData::List(_) => "list",
            ValueData::Iter(_) => "iterator",
            ValueData::Host(h) => h.type_name(),
        }
    }

    /// Numeric view for operator `what`; null counts as zero.
    pub fn to_number(&self, what: &str) -> Result<f64, ScriptError> {
        self.as_number().ok_or_else(|| {
            ScriptError::internal(format!(
                "'{what}' expects a number, got {} '{self}'",
                self.type_name()
            ))
        })
    }

    /// Walk the elements of a list or iterator.
    pub fn iter_values(&self) -> Result<Box<dyn Iterator<Item = Value>>, ScriptError> {
        match &self.data {
            ValueData::List(items) => {
                let items = items.clone();
                Ok(Box::new((0..items.len()).map(move |i| items[i].clone())))
            }
            ValueData::Iter(list) => list.iter(),
            _ => Err(ScriptError::internal(format!(
                "expected a list or iterator, got {} '{self}'",
                self.type_name()
            ))),
        }
    }

    pub fn to_list(&self) -> Result<Vec<Value>, ScriptError> {
        match &self.data {
            ValueData::List(items) => Ok(items.as_ref().clone()),
            _ => Ok(self.iter_values()?.collect()),
        }
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    fn elementwise(
        &self,
        rhs: &Value,
        op: &str,
        f: fn(&Value, &Value) -> Result<Value, ScriptError>,
    ) -> Result<Value, ScriptError> {
        let items = match (&self.data, &rhs.data) {
            (ValueData::List(a), ValueData::List(b)) => {
                if a.len() != b.len() {
                    return Err(ScriptError::internal(format!(
                        "'{op}' needs lists of equal length, got {} and {}",
                        a.len(),
                        b.len()
                    )));
                }
                a.iter().zip(b.iter()).map(|(x, y)| f(x, y)).collect::<Result<_, _>>()?
            }
            (ValueData::List(a), _) => a.iter().map(|x| f(x, rhs)).collect::<Result<_, _>>()?,
            (_, ValueData::List(b)) => b.iter().map(|y| f(self, y)).collect::<Result<_, _>>()?,
            _ => return f(self, rhs),
        };
        Ok(Value::list(items))
    }

    fn has_list(&self, rhs: &Value) -> bool {
        matches!(self.data, ValueData::List(_)) || matches!(rhs.data, ValueData::List(_))
    }

    /// `+`: string concatenation if either side is a string, element-wise
    /// for lists, numeric otherwise.
    pub fn add(&self, rhs: &Value) -> Result<Value, ScriptError> {
        if matches!(self.data, ValueData::Str(_)) || matches!(rhs.data, ValueData::Str(_)) {
            return Ok(Value::string(format!("{self}{rhs}")));
        }
        if self.has_list(rhs) {
            return self.elementwise(rhs, "+", Value::add);
        }
        Ok(Value::number(self.to_number("+")? + rhs.to_number("+")?))
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, ScriptError> {
        if self.has_list(rhs) {
            return self.elementwise(rhs, "-", Value::sub);
        }
        Ok(Value::number(self.to_number("-")? - rhs.to_number("-")?))
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, ScriptError> {
        if self.has_list(rhs) {
            return self.elementwise(rhs, "*", Value::mul);
        }
        Ok(Value::number(self.to_number("*")? * rhs.to_number("*")?))
    }

    pub fn div(&self, rhs: &Value) -> Result<Value, ScriptError> {
        if self.has_list(rhs) {
            return self.elementwise(rhs, "/", Value::div);
        }
        let (a, b) = (self.to_number("/")?, rhs.to_number("/")?);
        if b == 0.0 {
            return Err(ScriptError::arithmetic("division by zero"));
        }
        Ok(Value::number(a / b))
    }

    pub fn rem(&self, rhs: &Value) -> Result<Value, ScriptError> {
        if self.has_list(rhs) {
            return self.elementwise(rhs, "%", Value::rem);
        }
        let (a, b) = (self.to_number("%")?, rhs.to_number("%")?);
        if b == 0.0 {
            return Err(ScriptError::arithmetic("modulo by zero"));
        }
        Ok(Value::number(a % b))
    }

    pub fn pow(&self, rhs: &Value) -> Result<Value, ScriptError> {
        if self.has_list(rhs) {
            return self.elementwise(rhs, "^", Value::pow);
        }
        checked(self.to_number("^")?.powf(rhs.to_number("^")?), "^")
    }

    pub fn neg(&self) -> Result<Value, ScriptError> {
        match &self.data {
            ValueData::List(items) => {
                Ok(Value::list(items.iter().map(Value::neg).collect::<Result<_, _>>()?))
            }
            _ => Ok(Value::number(-self.to_number("-")?)),
        }
    }

    // ── Comparison ────────────────────────────────────────────────────────────

    /// Total order used by relational operators and `sort`: numbers (and
    /// null) numerically, lists lexicographically, anything else by its
    /// printed form.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (&self.data, &other.data) {
            (ValueData::Str(a), ValueData::Str(b)) => a.cmp(b),
            (ValueData::List(a), ValueData::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let o = x.compare(y);
                    if o != Ordering::Equal {
                        return o;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => self.to_string().cmp(&other.to_string()),
            },
        }
    }

    pub fn equals(&self, other: &Value) -> bool {
        match (&self.data, &other.data) {
            (ValueData::Str(a), ValueData::Str(b)) => a == b,
            (ValueData::List(a), ValueData::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (ValueData::Iter(a), ValueData::Iter(b)) => Rc::ptr_eq(&a.0, &b.0),
            (ValueData::Host(a), ValueData::Host(b)) => Rc::ptr_eq(a, b),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Reject NaN results from numeric operations.
pub fn checked(n: f64, what: &str) -> Result<Value, ScriptError> {
    if n.is_nan() {
        Err(ScriptError::arithmetic(format!("'{what}' result is not a number")))
    } else {
        Ok(Value::number(n))
    }
}

/// Print integral values without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Parse a decimal or `0x` hexadecimal number, ignoring surrounding blanks.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let hex = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"));
    let n = match hex {
        Some(h) if !h.is_empty() => parse_hex(h)?,
        Some(_) => return None,
        None => digits.parse::<f64>().ok()?,
    };
    Some(if negative { -n } else { n })
}

/// Hex digits to a float without an integer-width limit.
pub fn parse_hex(digits: &str) -> Option<f64> {
    digits
        .chars()
        .try_fold(0.0f64, |acc, c| c.to_digit(16).map(|d| acc * 16.0 + f64::from(d)))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            ValueData::Null => f.write_str("null"),
            ValueData::Number(n) => f.write_str(&format_number(*n)),
            ValueData::Str(s) => f.write_str(s),
            ValueData::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            ValueData::Iter(_) => f.write_str("[...]"),
            ValueData::Host(h) => f.write_str(&h.display()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::ErrorKind;

    fn nums(ns: &[f64]) -> Value {
        Value::list(ns.iter().copied().map(Value::number).collect())
    }

    #[test]
    fn display_numbers() {
        assert_eq!(Value::number(42.0).to_string(), "42");
        assert_eq!(Value::number(-7.0).to_string(), "-7");
        assert_eq!(Value::number(3.25).to_string(), "3.25");
        assert_eq!(Value::number(0.1 + 0.2).to_string(), "0.30000000000000004");
    }

    #[test]
    fn display_compound() {
        assert_eq!(Value::null().to_string(), "null");
        assert_eq!(nums(&[1.0, 2.0]).to_string(), "[1, 2]");
        let it = LazyList::restartable(|| Box::new(std::iter::empty()));
        assert_eq!(Value::iter(it).to_string(), "[...]");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::null().as_bool());
        assert!(!Value::number(0.0).as_bool());
        assert!(Value::number(-0.5).as_bool());
        assert!(!Value::string("").as_bool());
        assert!(Value::string("0").as_bool());
        assert!(!Value::list(vec![]).as_bool());
        assert!(nums(&[0.0]).as_bool());
    }

    #[test]
    fn binding_does_not_affect_equality() {
        let a = Value::number(1.0).bind_to("a".into());
        assert_eq!(a.binding().map(|b| &**b), Some("a"));
        assert_eq!(a, Value::number(1.0));
        assert!(a.unbound().binding().is_none());
    }

    #[test]
    fn arithmetic() {
        let (a, b) = (Value::number(10.0), Value::number(4.0));
        assert_eq!(a.add(&b).unwrap(), Value::number(14.0));
        assert_eq!(a.sub(&b).unwrap(), Value::number(6.0));
        assert_eq!(a.mul(&b).unwrap(), Value::number(40.0));
        assert_eq!(a.div(&b).unwrap(), Value::number(2.5));
        assert_eq!(a.rem(&b).unwrap(), Value::number(2.0));
        assert_eq!(b.pow(&Value::number(0.5)).unwrap(), Value::number(2.0));
        assert_eq!(Value::null().add(&b).unwrap(), Value::number(4.0));
    }

    #[test]
    fn division_by_zero_is_arithmetic() {
        let err = Value::number(1.0).div(&Value::number(0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arithmetic);
        let err = Value::number(1.0).rem(&Value::null()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arithmetic);
        let err = Value::number(-8.0).pow(&Value::number(0.5)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arithmetic);
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(Value::string("a").add(&Value::number(1.0)).unwrap(), Value::string("a1"));
        assert_eq!(Value::number(2.0).add(&Value::string("b")).unwrap(), Value::string("2b"));
        let err = Value::string("a").mul(&Value::number(2.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn list_elementwise() {
        let l = nums(&[1.0, 2.0, 3.0]);
        assert_eq!(l.add(&Value::number(1.0)).unwrap(), nums(&[2.0, 3.0, 4.0]));
        assert_eq!(l.mul(&l).unwrap(), nums(&[1.0, 4.0, 9.0]));
        assert_eq!(l.neg().unwrap(), nums(&[-1.0, -2.0, -3.0]));
        assert!(l.add(&nums(&[1.0])).is_err());
    }

    #[test]
    fn ordering() {
        assert_eq!(Value::number(1.0).compare(&Value::number(2.0)), Ordering::Less);
        assert_eq!(Value::string("b").compare(&Value::string("a")), Ordering::Greater);
        assert_eq!(nums(&[1.0, 2.0]).compare(&nums(&[1.0, 3.0])), Ordering::Less);
        assert_eq!(nums(&[1.0]).compare(&nums(&[1.0, 0.0])), Ordering::Less);
        assert_eq!(Value::null(), Value::number(0.0));
        assert_ne!(Value::string("1"), Value::number(1.0));
    }

    #[test]
    fn restartable_and_once_iterators() {
        let r = LazyList::restartable(|| Box::new((0..3).map(|i| Value::number(i as f64))));
        assert_eq!(r.iter().unwrap().count(), 3);
        assert_eq!(r.iter().unwrap().count(), 3);
        let o = LazyList::once((0..2).map(|i| Value::number(i as f64)));
        assert_eq!(o.iter().unwrap().count(), 2);
        assert!(o.iter().is_err());
    }

    #[test]
    fn number_parsing() {
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number("0xff"), Some(255.0));
        assert_eq!(parse_number("-0x10"), Some(-16.0));
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn format_round_trips() {
        for n in [0.0, 1.0, -3.5, 1e20, 123456.789, 1.0 / 3.0] {
            assert_eq!(parse_number(&format_number(n)), Some(n));
        }
    }
}

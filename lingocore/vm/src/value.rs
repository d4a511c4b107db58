//! Tagged runtime value. Heap objects are handles; symbols are interned
//! by the VM so symbol equality is handle equality.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Int(i32),
    Float(f64),
    Str(Rc<String>),
    Symbol(Rc<String>),
    LList(Rc<RefCell<Vec<Value>>>),
    PList(Rc<RefCell<Vec<(Value, Value)>>>),
    Point(Rc<RefCell<[Value; 2]>>),
    Quad(Rc<RefCell<[Value; 4]>>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::LList(Rc::new(RefCell::new(items)))
    }

    pub fn prop_list(pairs: Vec<(Value, Value)>) -> Value {
        Value::PList(Rc::new(RefCell::new(pairs)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::LList(_) => "list",
            Value::PList(_) => "property list",
            Value::Point(_) => "point",
            Value::Quad(_) => "rect",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Void => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::Symbol(_) => 4,
            Value::LList(_) => 5,
            Value::PList(_) => 6,
            Value::Point(_) => 7,
            Value::Quad(_) => 8,
        }
    }
}

/// The string form `put` writes: raw characters for strings, `#name`
/// for symbols, six decimals for floats, bracketed contents for lists.
pub fn stringify(v: &Value) -> String {
    match v {
        Value::Void => "<Void>".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format!("{:.6}", f),
        Value::Str(s) => (**s).clone(),
        Value::Symbol(s) => format!("#{}", s),
        Value::LList(items) => {
            let items = items.borrow();
            let inner: Vec<String> = items.iter().map(repr).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::PList(pairs) => {
            let pairs = pairs.borrow();
            if pairs.is_empty() {
                return "[:]".to_string();
            }
            let inner: Vec<String> =
                pairs.iter().map(|(k, v)| format!("{}: {}", repr(k), repr(v))).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Point(p) => {
            let p = p.borrow();
            format!("point({}, {})", repr(&p[0]), repr(&p[1]))
        }
        Value::Quad(q) => {
            let q = q.borrow();
            format!("rect({}, {}, {}, {})", repr(&q[0]), repr(&q[1]), repr(&q[2]), repr(&q[3]))
        }
    }
}

// inside containers strings keep their quotes
fn repr(v: &Value) -> String {
    match v {
        Value::Str(s) => format!("\"{}\"", s),
        _ => stringify(v),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", stringify(self))
    }
}

fn int_str_eq(x: i32, s: &str) -> bool {
    let t = s.trim();
    if t.contains('.') {
        t.parse::<f64>().map(|v| v == x as f64).unwrap_or(false)
    } else {
        t.parse::<i32>().map(|v| v == x).unwrap_or(false)
    }
}

/// Symmetric, total equality. Numbers compare with cross-type
/// promotion; a string compares to a number by parsing; symbols compare
/// by handle; heap objects compare by handle or element-wise.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if b.rank() < a.rank() {
        return values_equal(b, a);
    }
    match (a, b) {
        (Value::Void, Value::Void) => true,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(x), Value::Float(y)) => (*x as f64) == *y,
        (Value::Int(x), Value::Str(s)) => int_str_eq(*x, s),
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Float(x), Value::Str(s)) => {
            s.trim().parse::<f64>().map(|v| v == *x).unwrap_or(false)
        }
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Str(x), Value::Symbol(y)) => x.as_str() == y.as_str(),
        (Value::Symbol(x), Value::Symbol(y)) => Rc::ptr_eq(x, y),
        (Value::LList(x), Value::LList(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(p, q)| values_equal(p, q))
        }
        (Value::PList(x), Value::PList(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|((ka, va), (kb, vb))| values_equal(ka, kb) && values_equal(va, vb))
        }
        (Value::Point(x), Value::Point(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.iter().zip(ys.iter()).all(|(p, q)| values_equal(p, q))
        }
        (Value::Quad(x), Value::Quad(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.iter().zip(ys.iter()).all(|(p, q)| values_equal(p, q))
        }
        _ => false,
    }
}

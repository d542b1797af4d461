//! Restricted unpickler for model files written by python pickle (protocols
//! 0 to 5).
//!
//! Nothing is ever imported or called. A class instance is kept as the
//! callable that created it, the arguments it was called with and the state
//! it was built with, so numpy arrays, chumpy variables and scipy sparse
//! matrices can be decoded afterwards (see [`crate::codec::py_objects`]).
//! Byte strings from python 2 pickles are decoded as latin-1, the same as
//! `pickle.load(f, encoding="latin1")`.

use crate::error::SmplError;
use std::{
    borrow::Cow,
    cell::RefCell,
    collections::HashMap,
    io::Read,
    rc::Rc,
};

/// A fully resolved python value
#[derive(Debug, Clone, PartialEq)]
pub enum PyValue {
    None,
    Bool(bool),
    Int(i64),
    /// Integer outside of the i64 range, little-endian two's complement
    BigInt(Vec<u8>),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<PyValue>),
    Tuple(Vec<PyValue>),
    Set(Vec<PyValue>),
    /// Items in pickle order
    Dict(Vec<(PyValue, PyValue)>),
    Global {
        module: String,
        name: String,
    },
    /// Instance created by REDUCE, NEWOBJ, INST or OBJ
    Object {
        class: Box<PyValue>,
        args: Vec<PyValue>,
        state: Option<Box<PyValue>>,
    },
}

impl PyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PyValue::Int(i) => Some(*i),
            PyValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Raw bytes of a `bytes` value, or of a python 2 `str` decoded as latin-1
    pub fn as_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            PyValue::Bytes(b) => Some(Cow::Borrowed(b)),
            PyValue::Str(s) => latin1_bytes(s).map(Cow::Owned),
            _ => None,
        }
    }

    /// Looks up a string key in a dict
    pub fn get(&self, key: &str) -> Option<&PyValue> {
        match self {
            PyValue::Dict(items) => items.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v),
            _ => None,
        }
    }

    /// `(module, name)` of the class an object was created from
    pub fn class_path(&self) -> Option<(&str, &str)> {
        match self {
            PyValue::Object { class, .. } => match class.as_ref() {
                PyValue::Global { module, name } => Some((module, name)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Reads one pickled value
///
/// # Errors
/// Will error on truncated or malformed input and on opcodes that need
/// python to evaluate (persistent ids, extension registry)
pub fn from_reader<R: Read>(reader: R) -> Result<PyValue, SmplError> {
    let mut unpickler = Unpickler {
        reader,
        pos: 0,
        stack: Vec::new(),
        marks: Vec::new(),
        memo: HashMap::new(),
    };
    let root = unpickler.run()?;
    let mut cache = HashMap::new();
    Ok(resolve(&root, &mut Vec::new(), &mut cache))
}

// values under construction share children so that memoized objects see
// later APPEND, SETITEM and BUILD opcodes
type NodeRef = Rc<RefCell<Node>>;

#[derive(Debug)]
enum Node {
    Leaf(PyValue),
    List(Vec<NodeRef>),
    Tuple(Vec<NodeRef>),
    Set(Vec<NodeRef>),
    Dict(Vec<(NodeRef, NodeRef)>),
    Object {
        class: NodeRef,
        args: Vec<NodeRef>,
        state: Option<NodeRef>,
    },
}

fn node(n: Node) -> NodeRef {
    Rc::new(RefCell::new(n))
}

fn leaf(v: PyValue) -> NodeRef {
    node(Node::Leaf(v))
}

/// Converts the shared graph into a tree. A back reference to a value that is
/// still being resolved (a cycle) becomes `None`.
fn resolve(n: &NodeRef, path: &mut Vec<*const RefCell<Node>>, cache: &mut HashMap<*const RefCell<Node>, PyValue>) -> PyValue {
    let ptr = Rc::as_ptr(n);
    if path.contains(&ptr) {
        return PyValue::None;
    }
    if let Some(done) = cache.get(&ptr) {
        return done.clone();
    }
    path.push(ptr);
    let value = match &*n.borrow() {
        Node::Leaf(v) => v.clone(),
        Node::List(items) => PyValue::List(resolve_all(items, path, cache)),
        Node::Tuple(items) => PyValue::Tuple(resolve_all(items, path, cache)),
        Node::Set(items) => PyValue::Set(resolve_all(items, path, cache)),
        Node::Dict(items) => PyValue::Dict(items.iter().map(|(k, v)| (resolve(k, path, cache), resolve(v, path, cache))).collect()),
        Node::Object { class, args, state } => PyValue::Object {
            class: Box::new(resolve(class, path, cache)),
            args: resolve_all(args, path, cache),
            state: state.as_ref().map(|s| Box::new(resolve(s, path, cache))),
        },
    };
    path.pop();
    cache.insert(ptr, value.clone());
    value
}

fn resolve_all(items: &[NodeRef], path: &mut Vec<*const RefCell<Node>>, cache: &mut HashMap<*const RefCell<Node>, PyValue>) -> Vec<PyValue> {
    items.iter().map(|item| resolve(item, path, cache)).collect()
}

/// Inverse of [`latin1`], `None` if a char is above U+00FF
fn latin1_bytes(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn decode_long(bytes: &[u8]) -> PyValue {
    match bytes.last() {
        None => PyValue::Int(0),
        Some(&msb) if bytes.len() <= 8 => {
            let mut buf = if msb & 0x80 == 0 { [0u8; 8] } else { [0xff; 8] };
            buf[..bytes.len()].copy_from_slice(bytes);
            PyValue::Int(i64::from_le_bytes(buf))
        }
        Some(_) => PyValue::BigInt(bytes.to_vec()),
    }
}

/// Undoes python's `repr` quoting of a protocol 0 string
fn unquote(line: &[u8]) -> Option<Vec<u8>> {
    let (&quote, rest) = line.split_first()?;
    if quote != b'\'' && quote != b'"' {
        return None;
    }
    let body = rest.strip_suffix(&[quote])?;
    let mut out = Vec::with_capacity(body.len());
    let mut iter = body.iter().copied();
    while let Some(c) = iter.next() {
        if c != b'\\' {
            out.push(c);
            continue;
        }
        match iter.next()? {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'0' => out.push(0),
            b'x' => {
                let hex = [iter.next()?, iter.next()?];
                out.push(u8::from_str_radix(std::str::from_utf8(&hex).ok()?, 16).ok()?);
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// Decodes python's raw-unicode-escape: latin-1 plus `\uXXXX` / `\UXXXXXXXX`
fn raw_unicode_escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let width = match (bytes[i], bytes.get(i + 1)) {
            (b'\\', Some(b'u')) => 4,
            (b'\\', Some(b'U')) => 8,
            _ => 0,
        };
        let escaped = (width > 0)
            .then(|| bytes.get(i + 2..i + 2 + width))
            .flatten()
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);
        match escaped {
            Some(c) => {
                out.push(c);
                i += 2 + width;
            }
            None => {
                out.push(char::from(bytes[i]));
                i += 1;
            }
        }
    }
    out
}

struct Unpickler<R> {
    reader: R,
    pos: usize,
    stack: Vec<NodeRef>,
    marks: Vec<usize>,
    memo: HashMap<u64, NodeRef>,
}

impl<R: Read> Unpickler<R> {
    fn error<T>(&self, reason: impl Into<String>) -> Result<T, SmplError> {
        Err(SmplError::Pickle {
            offset: self.pos,
            reason: reason.into(),
        })
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, SmplError> {
        let mut buf = Vec::new();
        let read = (&mut self.reader).take(len as u64).read_to_end(&mut buf).map_err(|e| SmplError::Pickle {
            offset: self.pos,
            reason: e.to_string(),
        })?;
        self.pos += read;
        if read != len {
            return self.error("unexpected end of data");
        }
        Ok(buf)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], SmplError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.read_exact(N)?);
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8, SmplError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u32_len(&mut self) -> Result<usize, SmplError> {
        Ok(u32::from_le_bytes(self.read_array()?) as usize)
    }

    fn read_u64_len(&mut self) -> Result<usize, SmplError> {
        let len = u64::from_le_bytes(self.read_array()?);
        usize::try_from(len).or_else(|_| self.error("length does not fit in memory"))
    }

    fn read_line(&mut self) -> Result<Vec<u8>, SmplError> {
        let mut line = Vec::new();
        loop {
            match self.read_u8()? {
                b'\n' => break,
                c => line.push(c),
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(line)
    }

    fn read_line_str(&mut self) -> Result<String, SmplError> {
        let line = self.read_line()?;
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    fn parse_line<T: std::str::FromStr>(&mut self, what: &str) -> Result<T, SmplError> {
        let line = self.read_line_str()?;
        match line.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => self.error(format!("invalid {what} `{line}`")),
        }
    }

    fn push(&mut self, value: PyValue) {
        self.stack.push(leaf(value));
    }

    fn pop(&mut self) -> Result<NodeRef, SmplError> {
        if self.marks.last().is_some_and(|&m| m >= self.stack.len()) {
            return self.error("pop across a mark");
        }
        match self.stack.pop() {
            Some(v) => Ok(v),
            None => self.error("stack underflow"),
        }
    }

    fn pop_mark(&mut self) -> Result<Vec<NodeRef>, SmplError> {
        match self.marks.pop() {
            Some(mark) if mark <= self.stack.len() => Ok(self.stack.split_off(mark)),
            _ => self.error("missing mark"),
        }
    }

    fn top(&self) -> Result<NodeRef, SmplError> {
        match self.stack.last() {
            Some(top) if self.marks.last().map_or(true, |&m| m < self.stack.len()) => Ok(Rc::clone(top)),
            _ => self.error("stack underflow"),
        }
    }

    fn memo_put(&mut self, idx: u64) -> Result<(), SmplError> {
        let top = self.top()?;
        self.memo.insert(idx, top);
        Ok(())
    }

    fn memo_get(&mut self, idx: u64) -> Result<(), SmplError> {
        match self.memo.get(&idx) {
            Some(v) => {
                let v = Rc::clone(v);
                self.stack.push(v);
                Ok(())
            }
            None => self.error(format!("memo key {idx} not found")),
        }
    }

    fn append(&mut self, items: Vec<NodeRef>) -> Result<(), SmplError> {
        let target = self.top()?;
        let mut target = target.borrow_mut();
        match &mut *target {
            Node::List(list) | Node::Set(list) => {
                list.extend(items);
                Ok(())
            }
            _ => self.error("append to a non list"),
        }
    }

    fn set_items(&mut self, items: Vec<NodeRef>) -> Result<(), SmplError> {
        if items.len() % 2 != 0 {
            return self.error("odd number of dict items");
        }
        let target = self.top()?;
        let mut target = target.borrow_mut();
        let Node::Dict(dict) = &mut *target else {
            return self.error("setitem on a non dict");
        };
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            dict.push((k, v));
        }
        Ok(())
    }

    fn reduce(&mut self, callable: NodeRef, args: NodeRef) -> Result<NodeRef, SmplError> {
        let args = match &*args.borrow() {
            Node::Tuple(items) => items.clone(),
            _ => return self.error("REDUCE arguments must be a tuple"),
        };
        let global = match &*callable.borrow() {
            Node::Leaf(PyValue::Global { module, name }) => Some((module.clone(), name.clone())),
            _ => None,
        };
        let first_items = args
            .first()
            .and_then(|a| match &*a.borrow() {
                Node::List(items) | Node::Tuple(items) | Node::Set(items) => Some(items.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let built = match global.as_ref().map(|(m, n)| (m.as_str(), n.as_str())) {
            Some(("copy_reg" | "copyreg", "_reconstructor")) if !args.is_empty() => Node::Object {
                class: Rc::clone(&args[0]),
                args: Vec::new(),
                state: None,
            },
            Some(("__builtin__" | "builtins", "set" | "frozenset")) => Node::Set(first_items),
            Some(("__builtin__" | "builtins", "list")) => Node::List(first_items),
            Some(("_codecs", "encode")) => {
                // python 3 writes bytes as encode(latin1 text) below protocol 3
                let text = args.first().and_then(|a| match &*a.borrow() {
                    Node::Leaf(PyValue::Str(s)) => Some(s.clone()),
                    _ => None,
                });
                match text.as_deref().and_then(latin1_bytes) {
                    Some(bytes) => Node::Leaf(PyValue::Bytes(bytes)),
                    None => return self.error("unsupported _codecs.encode arguments"),
                }
            }
            _ => Node::Object {
                class: callable,
                args,
                state: None,
            },
        };
        Ok(node(built))
    }

    fn build(&mut self, state: NodeRef) -> Result<(), SmplError> {
        let target = self.top()?;
        let mut target = target.borrow_mut();
        match &mut *target {
            Node::Object { state: slot, .. } => *slot = Some(state),
            other => {
                let inner = std::mem::replace(other, Node::Leaf(PyValue::None));
                *other = Node::Object {
                    class: node(inner),
                    args: Vec::new(),
                    state: Some(state),
                };
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn run(&mut self) -> Result<NodeRef, SmplError> {
        loop {
            let op = self.read_u8()?;
            match op {
                // framing and protocol
                0x80 => {
                    let proto = self.read_u8()?;
                    if proto > 5 {
                        return self.error(format!("unsupported pickle protocol {proto}"));
                    }
                }
                0x95 => {
                    self.read_array::<8>()?;
                }
                b'.' => return self.pop(),

                // stack manipulation
                b'(' => self.marks.push(self.stack.len()),
                b'0' => {
                    if self.marks.last() == Some(&self.stack.len()) {
                        self.marks.pop();
                    } else {
                        self.pop()?;
                    }
                }
                b'1' => {
                    self.pop_mark()?;
                }
                b'2' => {
                    let top = self.top()?;
                    self.stack.push(top);
                }

                // scalars
                b'N' => self.push(PyValue::None),
                0x88 => self.push(PyValue::Bool(true)),
                0x89 => self.push(PyValue::Bool(false)),
                b'I' => {
                    let line = self.read_line_str()?;
                    let value = match line.as_str() {
                        "00" => PyValue::Bool(false),
                        "01" => PyValue::Bool(true),
                        other => match other.parse::<i64>() {
                            Ok(i) => PyValue::Int(i),
                            Err(_) => return self.error(format!("invalid int `{other}`")),
                        },
                    };
                    self.push(value);
                }
                b'J' => {
                    let v = i32::from_le_bytes(self.read_array()?);
                    self.push(PyValue::Int(i64::from(v)));
                }
                b'K' => {
                    let v = self.read_u8()?;
                    self.push(PyValue::Int(i64::from(v)));
                }
                b'M' => {
                    let v = u16::from_le_bytes(self.read_array()?);
                    self.push(PyValue::Int(i64::from(v)));
                }
                b'L' => {
                    let line = self.read_line_str()?;
                    match line.trim_end_matches('L').parse::<i64>() {
                        Ok(i) => self.push(PyValue::Int(i)),
                        Err(_) => return self.error(format!("long `{line}` out of range")),
                    }
                }
                0x8a => {
                    let len = self.read_u8()? as usize;
                    let bytes = self.read_exact(len)?;
                    self.push(decode_long(&bytes));
                }
                0x8b => {
                    let len = self.read_u32_len()?;
                    let bytes = self.read_exact(len)?;
                    self.push(decode_long(&bytes));
                }
                b'F' => {
                    let v: f64 = self.parse_line("float")?;
                    self.push(PyValue::Float(v));
                }
                b'G' => {
                    let v = f64::from_be_bytes(self.read_array()?);
                    self.push(PyValue::Float(v));
                }

                // strings
                b'S' => {
                    let line = self.read_line()?;
                    match unquote(&line) {
                        Some(bytes) => self.push(PyValue::Str(latin1(&bytes))),
                        None => return self.error("invalid quoted string"),
                    }
                }
                b'T' => {
                    let len = self.read_u32_len()?;
                    let bytes = self.read_exact(len)?;
                    self.push(PyValue::Str(latin1(&bytes)));
                }
                b'U' => {
                    let len = self.read_u8()? as usize;
                    let bytes = self.read_exact(len)?;
                    self.push(PyValue::Str(latin1(&bytes)));
                }
                b'V' => {
                    let line = self.read_line()?;
                    self.push(PyValue::Str(raw_unicode_escape(&line)));
                }
                b'X' | 0x8c | 0x8d => {
                    let len = match op {
                        b'X' => self.read_u32_len()?,
                        0x8c => self.read_u8()? as usize,
                        _ => self.read_u64_len()?,
                    };
                    let bytes = self.read_exact(len)?;
                    match String::from_utf8(bytes) {
                        Ok(s) => self.push(PyValue::Str(s)),
                        Err(_) => return self.error("invalid utf-8 in unicode string"),
                    }
                }
                b'B' | b'C' | 0x8e | 0x96 => {
                    let len = match op {
                        b'B' => self.read_u32_len()?,
                        b'C' => self.read_u8()? as usize,
                        _ => self.read_u64_len()?,
                    };
                    let bytes = self.read_exact(len)?;
                    self.push(PyValue::Bytes(bytes));
                }

                // containers
                b']' => self.stack.push(node(Node::List(Vec::new()))),
                b'l' => {
                    let items = self.pop_mark()?;
                    self.stack.push(node(Node::List(items)));
                }
                b'a' => {
                    let item = self.pop()?;
                    self.append(vec![item])?;
                }
                b'e' => {
                    let items = self.pop_mark()?;
                    self.append(items)?;
                }
                b')' => self.stack.push(node(Node::Tuple(Vec::new()))),
                b't' => {
                    let items = self.pop_mark()?;
                    self.stack.push(node(Node::Tuple(items)));
                }
                0x85..=0x87 => {
                    let len = usize::from(op - 0x84);
                    if self.stack.len() < len || self.marks.last().is_some_and(|&m| m > self.stack.len() - len) {
                        return self.error("stack underflow");
                    }
                    let items = self.stack.split_off(self.stack.len() - len);
                    self.stack.push(node(Node::Tuple(items)));
                }
                b'}' => self.stack.push(node(Node::Dict(Vec::new()))),
                b'd' => {
                    let items = self.pop_mark()?;
                    self.stack.push(node(Node::Dict(Vec::new())));
                    self.set_items(items)?;
                }
                b's' => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    self.set_items(vec![key, value])?;
                }
                b'u' => {
                    let items = self.pop_mark()?;
                    self.set_items(items)?;
                }
                0x8f => self.stack.push(node(Node::Set(Vec::new()))),
                0x90 => {
                    let items = self.pop_mark()?;
                    self.append(items)?;
                }
                0x91 => {
                    let items = self.pop_mark()?;
                    self.stack.push(node(Node::Set(items)));
                }

                // memo
                b'p' => {
                    let idx: u64 = self.parse_line("memo key")?;
                    self.memo_put(idx)?;
                }
                b'q' => {
                    let idx = u64::from(self.read_u8()?);
                    self.memo_put(idx)?;
                }
                b'r' => {
                    let idx = u64::from(u32::from_le_bytes(self.read_array()?));
                    self.memo_put(idx)?;
                }
                0x94 => {
                    let idx = self.memo.len() as u64;
                    self.memo_put(idx)?;
                }
                b'g' => {
                    let idx: u64 = self.parse_line("memo key")?;
                    self.memo_get(idx)?;
                }
                b'h' => {
                    let idx = u64::from(self.read_u8()?);
                    self.memo_get(idx)?;
                }
                b'j' => {
                    let idx = u64::from(u32::from_le_bytes(self.read_array()?));
                    self.memo_get(idx)?;
                }

                // classes and instances
                b'c' => {
                    let module = self.read_line_str()?;
                    let name = self.read_line_str()?;
                    self.push(PyValue::Global { module, name });
                }
                0x93 => {
                    let name = self.pop()?;
                    let module = self.pop()?;
                    let (module, name) = match (&*module.borrow(), &*name.borrow()) {
                        (Node::Leaf(PyValue::Str(m)), Node::Leaf(PyValue::Str(n))) => (m.clone(), n.clone()),
                        _ => return self.error("STACK_GLOBAL needs two strings"),
                    };
                    self.push(PyValue::Global { module, name });
                }
                b'R' => {
                    let args = self.pop()?;
                    let callable = self.pop()?;
                    let built = self.reduce(callable, args)?;
                    self.stack.push(built);
                }
                0x81 | 0x92 => {
                    if op == 0x92 {
                        self.pop()?;
                    }
                    let args = self.pop()?;
                    let class = self.pop()?;
                    let args = match &*args.borrow() {
                        Node::Tuple(items) => items.clone(),
                        _ => return self.error("NEWOBJ arguments must be a tuple"),
                    };
                    self.stack.push(node(Node::Object { class, args, state: None }));
                }
                b'i' => {
                    let module = self.read_line_str()?;
                    let name = self.read_line_str()?;
                    let args = self.pop_mark()?;
                    self.stack.push(node(Node::Object {
                        class: leaf(PyValue::Global { module, name }),
                        args,
                        state: None,
                    }));
                }
                b'o' => {
                    let mut items = self.pop_mark()?.into_iter();
                    let Some(class) = items.next() else {
                        return self.error("OBJ without a class");
                    };
                    self.stack.push(node(Node::Object {
                        class,
                        args: items.collect(),
                        state: None,
                    }));
                }
                b'b' => {
                    let state = self.pop()?;
                    self.build(state)?;
                }

                other => return self.error(format!("unsupported opcode 0x{other:02x}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(bytes: &[u8]) -> PyValue {
        from_reader(bytes).unwrap()
    }

    #[test]
    fn protocol_2_dict_of_scalars() {
        // {'a': 1, 'b': [1.5, None], 'c': True}
        let mut bytes = b"\x80\x02}q\x00(U\x01aq\x01K\x01U\x01bq\x02]q\x03(G".to_vec();
        bytes.extend(1.5f64.to_be_bytes());
        bytes.extend(b"Neq\x04U\x01cq\x05\x88u.");
        let value = load(&bytes);
        assert_eq!(value.get("a"), Some(&PyValue::Int(1)));
        assert_eq!(value.get("b"), Some(&PyValue::List(vec![PyValue::Float(1.5), PyValue::None])));
        assert_eq!(value.get("c"), Some(&PyValue::Bool(true)));
    }

    #[test]
    fn protocol_0_text_opcodes() {
        // (dp0\nS'k'\np1\nI42\nsS'neg'\np2\nL-7L\ns.
        let value = load(b"(dp0\nS'k'\np1\nI42\nsS'neg'\np2\nL-7L\ns.");
        assert_eq!(value.get("k"), Some(&PyValue::Int(42)));
        assert_eq!(value.get("neg"), Some(&PyValue::Int(-7)));
    }

    #[test]
    fn long1_is_twos_complement() {
        assert_eq!(decode_long(&[0xff]), PyValue::Int(-1));
        assert_eq!(decode_long(&[0xff, 0xff, 0xff, 0xff, 0x00]), PyValue::Int(4_294_967_295));
        assert!(matches!(decode_long(&[0; 9]), PyValue::BigInt(_)));
    }

    #[test]
    fn build_is_visible_through_the_memo() {
        // obj = mod.Cls(); obj.__setstate__({'x': 1}); (obj, obj)
        let value = load(b"\x80\x02cmod\nCls\nq\x00)\x81q\x01}q\x02U\x01xK\x01sbh\x01\x86.");
        let PyValue::Tuple(items) = value else { panic!("expected a tuple") };
        assert_eq!(items[0], items[1]);
        assert_eq!(items[1].class_path(), Some(("mod", "Cls")));
        let PyValue::Object { state: Some(state), .. } = &items[1] else { panic!("expected a built object") };
        assert_eq!(state.get("x"), Some(&PyValue::Int(1)));
    }

    #[test]
    fn latin1_strings_round_trip_to_bytes() {
        let value = load(b"\x80\x02U\x03\x00\xff\x80.");
        assert_eq!(value.as_bytes().unwrap().as_ref(), &[0x00, 0xff, 0x80]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(matches!(from_reader(&b"\x80\x02}q\x00(U\x05ab"[..]), Err(SmplError::Pickle { .. })));
        assert!(from_reader(&b"\x80\x02P"[..]).is_err());
    }

    #[test]
    fn recursive_lists_terminate() {
        // l = []; l.append(l)
        let value = load(b"\x80\x02]q\x00h\x00a.");
        assert_eq!(value, PyValue::List(vec![PyValue::None]));
    }
}

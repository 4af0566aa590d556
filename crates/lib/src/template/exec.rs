//! Template execution against a variable map.
//!
//! Field access is strict: `.KEY` on a map without `KEY` fails with
//! [`ExecError::MissingKey`], including inside `if` conditions. `index` is the
//! lenient lookup and yields an empty string for absent keys.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use super::parse::{BranchKind, Command, Node, Operand, Pipeline};
use crate::config::Variables;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
  #[error("map has no entry for key \"{0}\"")]
  MissingKey(String),

  #[error("{0}")]
  Failed(String),
}

fn failed(message: impl Into<String>) -> ExecError {
  ExecError::Failed(message.into())
}

#[derive(Debug, Clone, PartialEq)]
enum Value<'a> {
  Nil,
  Bool(bool),
  Int(i64),
  Str(String),
  Map(&'a Variables),
}

impl Value<'_> {
  fn truthy(&self) -> bool {
    match self {
      Value::Nil => false,
      Value::Bool(b) => *b,
      Value::Int(n) => *n != 0,
      Value::Str(s) => !s.is_empty(),
      Value::Map(m) => !m.is_empty(),
    }
  }

  fn type_name(&self) -> &'static str {
    match self {
      Value::Nil => "nil",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Str(_) => "string",
      Value::Map(_) => "map[string]string",
    }
  }
}

impl fmt::Display for Value<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Nil => write!(f, "<no value>"),
      Value::Bool(b) => write!(f, "{b}"),
      Value::Int(n) => write!(f, "{n}"),
      Value::Str(s) => write!(f, "{s}"),
      Value::Map(m) => {
        write!(f, "map[")?;
        for (i, (k, v)) in m.iter().enumerate() {
          if i > 0 {
            write!(f, " ")?;
          }
          write!(f, "{k}:{v}")?;
        }
        write!(f, "]")
      }
    }
  }
}

/// Execute a parsed template with `variables` as both `.` and `$`.
pub(super) fn execute(nodes: &[Node], variables: &Variables) -> Result<String, ExecError> {
  let root = Value::Map(variables);
  let mut state = State {
    vars: vec![("$".to_string(), root.clone())],
    out: String::new(),
  };
  state.walk(nodes, &root)?;
  Ok(state.out)
}

struct State<'a> {
  /// Variable stack; blocks truncate back to their entry height on exit.
  vars: Vec<(String, Value<'a>)>,
  out: String,
}

impl<'a> State<'a> {
  fn walk(&mut self, nodes: &[Node], dot: &Value<'a>) -> Result<(), ExecError> {
    for node in nodes {
      match node {
        Node::Text(text) => self.out.push_str(text),
        Node::Action(pipe) => {
          let value = self.pipeline(pipe, dot, true)?;
          if pipe.decl.is_empty() {
            self.out.push_str(&value.to_string());
          }
        }
        Node::Branch {
          kind,
          pipe,
          body,
          otherwise,
        } => {
          let mark = self.vars.len();
          let result = self.branch(*kind, pipe, body, otherwise, dot);
          self.vars.truncate(mark);
          result?;
        }
      }
    }
    Ok(())
  }

  fn scoped(&mut self, nodes: &[Node], dot: &Value<'a>) -> Result<(), ExecError> {
    let mark = self.vars.len();
    let result = self.walk(nodes, dot);
    self.vars.truncate(mark);
    result
  }

  fn branch(
    &mut self,
    kind: BranchKind,
    pipe: &Pipeline,
    body: &[Node],
    otherwise: &[Node],
    dot: &Value<'a>,
  ) -> Result<(), ExecError> {
    match kind {
      BranchKind::If => {
        let value = self.pipeline(pipe, dot, true)?;
        if value.truthy() {
          self.scoped(body, dot)
        } else {
          self.scoped(otherwise, dot)
        }
      }
      BranchKind::With => {
        let value = self.pipeline(pipe, dot, true)?;
        if value.truthy() {
          self.scoped(body, &value)
        } else {
          self.scoped(otherwise, dot)
        }
      }
      BranchKind::Range => self.range(pipe, body, otherwise, dot),
    }
  }

  fn range(&mut self, pipe: &Pipeline, body: &[Node], otherwise: &[Node], dot: &Value<'a>) -> Result<(), ExecError> {
    let items: Vec<(Value<'a>, Value<'a>)> = match self.pipeline(pipe, dot, false)? {
      Value::Map(map) => map
        .iter()
        .map(|(k, v)| (Value::Str(k.clone()), Value::Str(v.clone())))
        .collect(),
      Value::Int(n) => (0..n.max(0)).map(|i| (Value::Int(i), Value::Int(i))).collect(),
      Value::Nil => Vec::new(),
      other => return Err(failed(format!("range can't iterate over {other}"))),
    };

    if items.is_empty() {
      return self.scoped(otherwise, dot);
    }

    for (key, elem) in items {
      let mark = self.vars.len();
      match pipe.decl.as_slice() {
        [value] => self.vars.push((value.clone(), elem.clone())),
        [k, v] => {
          self.vars.push((k.clone(), key));
          self.vars.push((v.clone(), elem.clone()));
        }
        _ => {}
      }
      let result = self.walk(body, &elem);
      self.vars.truncate(mark);
      result?;
    }
    Ok(())
  }

  fn pipeline(&mut self, pipe: &Pipeline, dot: &Value<'a>, declare: bool) -> Result<Value<'a>, ExecError> {
    let mut value = None;
    for command in &pipe.commands {
      value = Some(self.command(command, dot, value.take())?);
    }
    let value = value.unwrap_or(Value::Nil);

    if declare {
      for name in &pipe.decl {
        self.vars.push((name.clone(), value.clone()));
      }
    }
    Ok(value)
  }

  /// Evaluate one command; `piped` is the previous command's value, passed as
  /// the final argument.
  fn command(&mut self, command: &Command, dot: &Value<'a>, piped: Option<Value<'a>>) -> Result<Value<'a>, ExecError> {
    let (first, rest) = command.args.split_first().ok_or_else(|| failed("empty command"))?;

    if let Operand::Func(name) = first {
      return self.call(name, rest, piped, dot);
    }
    if !rest.is_empty() || piped.is_some() {
      return Err(failed(format!("can't give argument to non-function {first}")));
    }
    if matches!(first, Operand::Nil) {
      return Err(failed("nil is not a command"));
    }
    self.operand(first, dot)
  }

  fn operand(&mut self, operand: &Operand, dot: &Value<'a>) -> Result<Value<'a>, ExecError> {
    match operand {
      Operand::Dot => Ok(dot.clone()),
      Operand::Field(path) => field_chain(dot.clone(), path),
      Operand::Variable(name, path) => {
        let base = self
          .vars
          .iter()
          .rev()
          .find(|(n, _)| n == name)
          .map(|(_, v)| v.clone())
          .ok_or_else(|| failed(format!("undefined variable: {name}")))?;
        field_chain(base, path)
      }
      Operand::Func(name) => self.call(name, &[], None, dot),
      Operand::Str(s) => Ok(Value::Str(s.clone())),
      Operand::Int(n) => Ok(Value::Int(*n)),
      Operand::Bool(b) => Ok(Value::Bool(*b)),
      Operand::Nil => Ok(Value::Nil),
      Operand::Pipe(pipe) => self.pipeline(pipe, dot, false),
    }
  }

  fn call(
    &mut self,
    name: &str,
    args: &[Operand],
    piped: Option<Value<'a>>,
    dot: &Value<'a>,
  ) -> Result<Value<'a>, ExecError> {
    // `and`/`or` stop evaluating at the first deciding argument.
    if name == "and" || name == "or" {
      let stop_on = name == "or";
      if args.is_empty() && piped.is_none() {
        return Err(failed(format!("wrong number of args for {name}: want at least 1 got 0")));
      }
      let mut last = Value::Nil;
      for arg in args {
        let value = self.operand(arg, dot)?;
        if value.truthy() == stop_on {
          return Ok(value);
        }
        last = value;
      }
      return Ok(piped.unwrap_or(last));
    }

    let mut values = Vec::with_capacity(args.len() + 1);
    for arg in args {
      values.push(self.operand(arg, dot)?);
    }
    values.extend(piped);
    builtin(name, values)
  }
}

fn field_chain<'a>(base: Value<'a>, path: &[String]) -> Result<Value<'a>, ExecError> {
  let mut current = base;
  for name in path {
    current = match current {
      Value::Map(map) => map
        .get(name)
        .map(|v| Value::Str(v.clone()))
        .ok_or_else(|| ExecError::MissingKey(name.clone()))?,
      Value::Nil => return Err(failed(format!("nil pointer evaluating .{name}"))),
      other => {
        return Err(failed(format!(
          "can't evaluate field {name} in type {}",
          other.type_name()
        )));
      }
    };
  }
  Ok(current)
}

fn arity(name: &str, args: &[Value<'_>], want: usize) -> Result<(), ExecError> {
  if args.len() == want {
    Ok(())
  } else {
    Err(failed(format!(
      "wrong number of args for {name}: want {want} got {}",
      args.len()
    )))
  }
}

fn builtin<'a>(name: &str, mut args: Vec<Value<'a>>) -> Result<Value<'a>, ExecError> {
  match name {
    "not" => {
      arity(name, &args, 1)?;
      Ok(Value::Bool(!args[0].truthy()))
    }
    "len" => {
      arity(name, &args, 1)?;
      match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.len() as i64)),
        Value::Map(m) => Ok(Value::Int(m.len() as i64)),
        other => Err(failed(format!("len of type {}", other.type_name()))),
      }
    }
    "index" => {
      if args.is_empty() {
        return Err(failed("wrong number of args for index: want at least 1 got 0"));
      }
      let keys = args.split_off(1);
      let mut current = args.remove(0);
      for key in keys {
        current = match (current, key) {
          (Value::Map(m), Value::Str(k)) => Value::Str(m.get(&k).cloned().unwrap_or_default()),
          (Value::Str(s), Value::Int(i)) => {
            let byte = usize::try_from(i)
              .ok()
              .and_then(|i| s.as_bytes().get(i).copied())
              .ok_or_else(|| failed(format!("index out of range: {i}")))?;
            Value::Int(i64::from(byte))
          }
          (item, key) => {
            return Err(failed(format!(
              "can't index item of type {} with {}",
              item.type_name(),
              key.type_name()
            )));
          }
        };
      }
      Ok(current)
    }
    "print" => Ok(Value::Str(sprint(&args))),
    "println" => {
      let words: Vec<String> = args.iter().map(ToString::to_string).collect();
      Ok(Value::Str(format!("{}\n", words.join(" "))))
    }
    "printf" => {
      if args.is_empty() {
        return Err(failed("wrong number of args for printf: want at least 1 got 0"));
      }
      let rest = args.split_off(1);
      match &args[0] {
        Value::Str(format) => Ok(Value::Str(sprintf(format, &rest))),
        other => Err(failed(format!("printf format must be a string, got {}", other.type_name()))),
      }
    }
    "eq" => {
      if args.len() < 2 {
        return Err(failed(format!("wrong number of args for eq: want at least 2 got {}", args.len())));
      }
      let (first, rest) = args.split_at(1);
      for other in rest {
        if compare(&first[0], other, false)? == Ordering::Equal {
          return Ok(Value::Bool(true));
        }
      }
      Ok(Value::Bool(false))
    }
    "ne" => {
      arity(name, &args, 2)?;
      Ok(Value::Bool(compare(&args[0], &args[1], false)? != Ordering::Equal))
    }
    "lt" | "le" | "gt" | "ge" => {
      arity(name, &args, 2)?;
      let ordering = compare(&args[0], &args[1], true)?;
      let result = match name {
        "lt" => ordering == Ordering::Less,
        "le" => ordering != Ordering::Greater,
        "gt" => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
      };
      Ok(Value::Bool(result))
    }
    _ => Err(failed(format!("function \"{name}\" not defined"))),
  }
}

fn compare(a: &Value<'_>, b: &Value<'_>, ordered: bool) -> Result<Ordering, ExecError> {
  match (a, b) {
    (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
    (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
    (Value::Bool(x), Value::Bool(y)) if !ordered => Ok(x.cmp(y)),
    (Value::Nil, _) | (_, Value::Nil) | (Value::Map(_), _) | (_, Value::Map(_)) => Err(failed(format!(
      "invalid type for comparison: {} and {}",
      a.type_name(),
      b.type_name()
    ))),
    (Value::Bool(_), Value::Bool(_)) => Err(failed("invalid type for comparison: bool")),
    _ => Err(failed(format!(
      "incompatible types for comparison: {} and {}",
      a.type_name(),
      b.type_name()
    ))),
  }
}

/// Operands are separated by a space only when neither side is a string.
fn sprint(args: &[Value<'_>]) -> String {
  let mut out = String::new();
  for (i, value) in args.iter().enumerate() {
    if i > 0 && !matches!(value, Value::Str(_)) && !matches!(args[i - 1], Value::Str(_)) {
      out.push(' ');
    }
    out.push_str(&value.to_string());
  }
  out
}

/// Supports `%s %v %d %q %t %%`. Mismatches are reported inline as
/// `%!verb(type=value)` instead of failing.
fn sprintf(format: &str, args: &[Value<'_>]) -> String {
  let mut out = String::new();
  let mut args = args.iter();
  let mut chars = format.chars();

  while let Some(c) = chars.next() {
    if c != '%' {
      out.push(c);
      continue;
    }
    let Some(verb) = chars.next() else {
      out.push_str("%!(NOVERB)");
      break;
    };
    if verb == '%' {
      out.push('%');
      continue;
    }
    let Some(arg) = args.next() else {
      out.push_str(&format!("%!{verb}(MISSING)"));
      continue;
    };
    match (verb, arg) {
      ('s' | 'v', value) => out.push_str(&value.to_string()),
      ('d', Value::Int(n)) => out.push_str(&n.to_string()),
      ('t', Value::Bool(b)) => out.push_str(&b.to_string()),
      ('q', Value::Str(s)) => out.push_str(&format!("{s:?}")),
      (verb, value) => out.push_str(&format!("%!{verb}({}={value})", value.type_name())),
    }
  }

  let extra: Vec<String> = args.map(|v| format!("{}={v}", v.type_name())).collect();
  if !extra.is_empty() {
    out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
  }
  out
}

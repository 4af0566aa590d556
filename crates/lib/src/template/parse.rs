//! Template text parsing.
//!
//! # Syntax
//!
//! Text is copied verbatim; actions are delimited by `{{` and `}}`:
//!
//! - `{{ .KEY }}` - value of variable `KEY`; `{{ . }}` is the current value
//! - `{{ "text" }}` / ``{{ `text` }}`` - literal text, e.g. `{{ "{{" }}` for literal braces
//! - `{{/* comment */}}` - removed from the output
//! - `{{- ... }}` / `{{ ... -}}` - trim whitespace before / after the action
//! - `{{ if P }} .. {{ else if P }} .. {{ else }} .. {{ end }}`
//! - `{{ with P }} .. {{ else }} .. {{ end }}` - runs the body with `.` set to the value
//! - `{{ range P }} .. {{ else }} .. {{ end }}`, optionally `range $k, $v := P`
//! - `{{ $x := P }}` declares a variable; `$` is the root value
//! - pipelines `P` such as `.A | printf "%s!"`, with parenthesised sub-pipelines
//!   and the functions `and or not len index print printf println eq ne lt le gt ge`
//!
//! A trim marker must be separated from the action body by whitespace, so
//! `{{-3}}` is the number -3.

use std::fmt;

use thiserror::Error;

/// Functions that may be called from a template.
pub(super) const FUNCTIONS: &[&str] = &[
  "and", "or", "not", "len", "index", "print", "printf", "println", "eq", "ne", "lt", "le", "gt", "ge",
];

/// Errors produced while parsing template text. Positions are byte offsets of
/// the action's opening `{{`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
  #[error("unclosed action at position {0}")]
  Unclosed(usize),

  #[error("unclosed comment at position {0}")]
  UnclosedComment(usize),

  #[error("unterminated string literal at position {0}")]
  UnterminatedString(usize),

  #[error("missing value for command at position {0}")]
  Empty(usize),

  #[error("unsupported action '{0}'")]
  Unsupported(String),

  #[error("invalid escape sequence in '{0}'")]
  InvalidEscape(String),

  #[error("unexpected {token} at position {pos}")]
  Unexpected { token: String, pos: usize },

  #[error("missing {{{{ end }}}} for {{{{ {keyword} }}}} at position {pos}")]
  MissingEnd { keyword: &'static str, pos: usize },

  #[error("function \"{name}\" not defined at position {pos}")]
  UnknownFunction { name: String, pos: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BranchKind {
  If,
  With,
  Range,
}

impl BranchKind {
  fn from_keyword(keyword: &str) -> Option<Self> {
    match keyword {
      "if" => Some(BranchKind::If),
      "with" => Some(BranchKind::With),
      "range" => Some(BranchKind::Range),
      _ => None,
    }
  }

  fn keyword(self) -> &'static str {
    match self {
      BranchKind::If => "if",
      BranchKind::With => "with",
      BranchKind::Range => "range",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Node {
  Text(String),
  /// Prints the pipeline's value unless it declares a variable.
  Action(Pipeline),
  Branch {
    kind: BranchKind,
    pipe: Pipeline,
    body: Vec<Node>,
    otherwise: Vec<Node>,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Pipeline {
  /// Declared variable names, including the leading `$`.
  pub decl: Vec<String>,
  pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Command {
  pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Operand {
  Dot,
  Field(Vec<String>),
  Variable(String, Vec<String>),
  Func(String),
  Str(String),
  Int(i64),
  Bool(bool),
  Nil,
  Pipe(Box<Pipeline>),
}

impl fmt::Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operand::Dot => write!(f, "."),
      Operand::Field(path) => write!(f, ".{}", path.join(".")),
      Operand::Variable(name, path) if path.is_empty() => write!(f, "{name}"),
      Operand::Variable(name, path) => write!(f, "{name}.{}", path.join(".")),
      Operand::Func(name) => write!(f, "{name}"),
      Operand::Str(s) => write!(f, "{s:?}"),
      Operand::Int(n) => write!(f, "{n}"),
      Operand::Bool(b) => write!(f, "{b}"),
      Operand::Nil => write!(f, "nil"),
      Operand::Pipe(_) => write!(f, "(...)"),
    }
  }
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Parse template text into a node tree.
pub(super) fn parse(input: &str) -> Result<Vec<Node>, ParseError> {
  let mut parser = Parser {
    items: scan(input)?.into_iter(),
  };
  let (nodes, stop) = parser.list()?;
  match stop {
    None => Ok(nodes),
    Some(Stop::End(pos)) => Err(ParseError::Unexpected {
      token: "{{ end }}".to_string(),
      pos,
    }),
    Some(Stop::Else(_, pos)) => Err(ParseError::Unexpected {
      token: "{{ else }}".to_string(),
      pos,
    }),
  }
}

// Scanning: split text from actions, apply trim markers, drop comments.

enum Item {
  Text(String),
  Action { tokens: Vec<Token>, pos: usize },
}

fn scan(input: &str) -> Result<Vec<Item>, ParseError> {
  let mut items = Vec::new();
  let mut literal = String::new();
  let mut rest = input;

  while let Some(start) = rest.find(OPEN) {
    literal.push_str(&rest[..start]);
    let action_pos = input.len() - rest.len() + start;
    let mut body = &rest[start + OPEN.len()..];

    if has_left_trim(body) {
      body = &body[1..];
      let kept = literal.trim_end().len();
      literal.truncate(kept);
    }

    let (raw, consumed, trim_after) = split_action(body, action_pos)?;
    if let Some(raw) = raw {
      if !literal.is_empty() {
        items.push(Item::Text(std::mem::take(&mut literal)));
      }
      items.push(Item::Action {
        tokens: lex(raw, action_pos)?,
        pos: action_pos,
      });
    }

    let after = &body[consumed..];
    rest = if trim_after { after.trim_start() } else { after };
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    items.push(Item::Text(literal));
  }
  Ok(items)
}

fn has_left_trim(body: &str) -> bool {
  let mut chars = body.chars();
  chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// Split one action off `body` (the text right after `{{` and any left trim
/// marker). Returns the action text (`None` for a comment), the number of
/// bytes consumed including the closing `}}`, and whether a right trim marker
/// was present.
fn split_action(body: &str, pos: usize) -> Result<(Option<&str>, usize, bool), ParseError> {
  let leading = body.len() - body.trim_start().len();
  let inner = &body[leading..];

  if let Some(comment) = inner.strip_prefix("/*") {
    let end = comment.find("*/").ok_or(ParseError::UnclosedComment(pos))?;
    let after_comment = leading + 2 + end + 2;
    let (close_at, trim_after) = closing_after(&body[after_comment..]).ok_or(ParseError::UnclosedComment(pos))?;
    return Ok((None, after_comment + close_at + CLOSE.len(), trim_after));
  }

  let close = find_close(body, pos)?;
  let raw = &body[..close];
  let (raw, trim_after) = match raw.strip_suffix('-') {
    Some(stripped) if stripped.ends_with(char::is_whitespace) => (stripped, true),
    _ => (raw, false),
  };
  Ok((Some(raw), close + CLOSE.len(), trim_after))
}

/// After a comment only whitespace, an optional ` -` and `}}` may follow.
/// Returns the offset of `}}` and whether a right trim marker was present.
fn closing_after(text: &str) -> Option<(usize, bool)> {
  let trimmed = text.trim_start();
  let skipped = text.len() - trimmed.len();
  if trimmed.starts_with(CLOSE) {
    return Some((skipped, false));
  }
  if skipped > 0 && trimmed.starts_with("-}}") {
    return Some((skipped + 1, true));
  }
  None
}

/// Offset of the closing `}}`, skipping over quoted literals.
fn find_close(body: &str, pos: usize) -> Result<usize, ParseError> {
  let bytes = body.as_bytes();
  let mut i = 0;
  while i < bytes.len() {
    match bytes[i] {
      b'"' => {
        i += 1;
        loop {
          match bytes.get(i) {
            None | Some(b'\n') => return Err(ParseError::UnterminatedString(pos)),
            Some(b'\\') => i += 2,
            Some(b'"') => break,
            Some(_) => i += 1,
          }
        }
      }
      b'`' => {
        i += 1;
        while bytes.get(i) != Some(&b'`') {
          if i >= bytes.len() {
            return Err(ParseError::UnterminatedString(pos));
          }
          i += 1;
        }
      }
      b'}' if bytes.get(i + 1) == Some(&b'}') => return Ok(i),
      _ => {}
    }
    i += 1;
  }
  Err(ParseError::Unclosed(pos))
}

// Lexing of a single action.

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Dot,
  Field(Vec<String>),
  Variable(String, Vec<String>),
  Ident(String),
  Str(String),
  Int(i64),
  Pipe,
  LParen,
  RParen,
  Declare,
  Comma,
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Token::Dot => write!(f, "'.'"),
      Token::Field(path) => write!(f, "'.{}'", path.join(".")),
      Token::Variable(name, _) => write!(f, "'{name}'"),
      Token::Ident(name) => write!(f, "'{name}'"),
      Token::Str(s) => write!(f, "{s:?}"),
      Token::Int(n) => write!(f, "'{n}'"),
      Token::Pipe => write!(f, "'|'"),
      Token::LParen => write!(f, "'('"),
      Token::RParen => write!(f, "')'"),
      Token::Declare => write!(f, "':='"),
      Token::Comma => write!(f, "','"),
    }
  }
}

fn is_ident_start(c: char) -> bool {
  c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
  c.is_alphanumeric() || c == '_'
}

fn lex(action: &str, pos: usize) -> Result<Vec<Token>, ParseError> {
  let chars: Vec<char> = action.chars().collect();
  let unexpected = |c: char| ParseError::Unexpected {
    token: format!("'{c}'"),
    pos,
  };
  let mut tokens = Vec::new();
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    match c {
      c if c.is_whitespace() => i += 1,
      '|' => {
        tokens.push(Token::Pipe);
        i += 1;
      }
      '(' => {
        tokens.push(Token::LParen);
        i += 1;
      }
      ')' => {
        tokens.push(Token::RParen);
        i += 1;
      }
      ',' => {
        tokens.push(Token::Comma);
        i += 1;
      }
      ':' if chars.get(i + 1) == Some(&'=') => {
        tokens.push(Token::Declare);
        i += 2;
      }
      '"' => {
        let start = i;
        i += 1;
        loop {
          match chars.get(i) {
            None | Some('\n') => return Err(ParseError::UnterminatedString(pos)),
            Some('\\') => i += 2,
            Some('"') => break,
            Some(_) => i += 1,
          }
        }
        i += 1;
        let quoted: String = chars[start..i].iter().collect();
        tokens.push(Token::Str(unquote(&quoted)?));
      }
      '`' => {
        let start = i + 1;
        let len = chars[start..]
          .iter()
          .position(|&c| c == '`')
          .ok_or(ParseError::UnterminatedString(pos))?;
        tokens.push(Token::Str(chars[start..start + len].iter().collect()));
        i = start + len + 1;
      }
      '.' => {
        if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
          return Err(unexpected('.'));
        }
        let path = lex_path(&chars, &mut i);
        tokens.push(if path.is_empty() { Token::Dot } else { Token::Field(path) });
      }
      '$' => {
        i += 1;
        let name = read_ident(&chars, &mut i);
        let path = lex_path(&chars, &mut i);
        tokens.push(Token::Variable(format!("${name}"), path));
      }
      '-' | '0'..='9' => {
        let start = i;
        i += 1;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
          i += 1;
        }
        let text: String = chars[start..i].iter().collect();
        if chars.get(i).is_some_and(|&c| is_ident_char(c)) {
          return Err(unexpected(chars[i]));
        }
        let number = text.parse().map_err(|_| ParseError::Unexpected {
          token: format!("'{text}'"),
          pos,
        })?;
        tokens.push(Token::Int(number));
      }
      c if is_ident_start(c) => {
        let name = read_ident(&chars, &mut i);
        tokens.push(Token::Ident(name));
      }
      c => return Err(unexpected(c)),
    }
  }

  Ok(tokens)
}

fn read_ident(chars: &[char], i: &mut usize) -> String {
  let start = *i;
  while chars.get(*i).is_some_and(|&c| is_ident_char(c)) {
    *i += 1;
  }
  chars[start..*i].iter().collect()
}

/// Read a `.a.b.c` chain starting at `i`; stops before a `.` that is not
/// followed by an identifier. A lone `.` consumes one character and yields an
/// empty path.
fn lex_path(chars: &[char], i: &mut usize) -> Vec<String> {
  let mut path = Vec::new();
  if chars.get(*i) == Some(&'.') && !chars.get(*i + 1).is_some_and(|&c| is_ident_start(c)) {
    *i += 1;
    return path;
  }
  while chars.get(*i) == Some(&'.') && chars.get(*i + 1).is_some_and(|&c| is_ident_start(c)) {
    *i += 1;
    path.push(read_ident(chars, i));
  }
  path
}

/// Decode a double-quoted literal, including the surrounding quotes.
fn unquote(quoted: &str) -> Result<String, ParseError> {
  let inner = &quoted[1..quoted.len() - 1];
  let invalid = || ParseError::InvalidEscape(quoted.to_string());

  let mut out = String::with_capacity(inner.len());
  let mut chars = inner.chars();
  while let Some(c) = chars.next() {
    match c {
      '\\' => match chars.next().ok_or_else(invalid)? {
        'n' => out.push('\n'),
        't' => out.push('\t'),
        'r' => out.push('\r'),
        '\\' => out.push('\\'),
        '"' => out.push('"'),
        '\'' => out.push('\''),
        _ => return Err(invalid()),
      },
      c => out.push(c),
    }
  }
  Ok(out)
}

// Tree building.

enum Stop {
  End(usize),
  Else(Vec<Token>, usize),
}

struct Parser {
  items: std::vec::IntoIter<Item>,
}

impl Parser {
  /// Parse nodes until `{{ end }}`, `{{ else }}` or the end of input.
  fn list(&mut self) -> Result<(Vec<Node>, Option<Stop>), ParseError> {
    let mut nodes = Vec::new();

    while let Some(item) = self.items.next() {
      let (tokens, pos) = match item {
        Item::Text(text) => {
          nodes.push(Node::Text(text));
          continue;
        }
        Item::Action { tokens, pos } => (tokens, pos),
      };

      let keyword = match tokens.first() {
        Some(Token::Ident(name)) => name.as_str(),
        _ => "",
      };
      match keyword {
        "end" => {
          if let Some(extra) = tokens.get(1) {
            return Err(ParseError::Unexpected {
              token: extra.to_string(),
              pos,
            });
          }
          return Ok((nodes, Some(Stop::End(pos))));
        }
        "else" => return Ok((nodes, Some(Stop::Else(tokens[1..].to_vec(), pos)))),
        "define" | "template" | "block" | "break" | "continue" => {
          return Err(ParseError::Unsupported(keyword.to_string()));
        }
        _ => {}
      }

      match BranchKind::from_keyword(keyword) {
        Some(kind) => nodes.push(self.branch(kind, &tokens[1..], pos)?),
        None => nodes.push(Node::Action(parse_pipeline(&tokens, pos, 1)?)),
      }
    }

    Ok((nodes, None))
  }

  fn branch(&mut self, kind: BranchKind, tokens: &[Token], pos: usize) -> Result<Node, ParseError> {
    let max_decl = if kind == BranchKind::Range { 2 } else { 1 };
    let pipe = parse_pipeline(tokens, pos, max_decl)?;
    let missing_end = ParseError::MissingEnd {
      keyword: kind.keyword(),
      pos,
    };

    let (body, stop) = self.list()?;
    let otherwise = match stop {
      None => return Err(missing_end),
      Some(Stop::End(_)) => Vec::new(),
      Some(Stop::Else(rest, _)) if rest.is_empty() => match self.list()? {
        (nodes, Some(Stop::End(_))) => nodes,
        (_, Some(Stop::Else(_, pos))) => {
          return Err(ParseError::Unexpected {
            token: "{{ else }}".to_string(),
            pos,
          });
        }
        (_, None) => return Err(missing_end),
      },
      // `else if` / `else with` chain into a nested branch sharing the same `end`.
      Some(Stop::Else(rest, else_pos)) => match &rest[0] {
        Token::Ident(name) if kind != BranchKind::Range && name == kind.keyword() => {
          vec![self.branch(kind, &rest[1..], else_pos)?]
        }
        other => {
          return Err(ParseError::Unexpected {
            token: other.to_string(),
            pos: else_pos,
          });
        }
      },
    };

    Ok(Node::Branch {
      kind,
      pipe,
      body,
      otherwise,
    })
  }
}

fn parse_pipeline(tokens: &[Token], pos: usize, max_decl: usize) -> Result<Pipeline, ParseError> {
  let (decl, rest) = split_declaration(tokens, pos, max_decl)?;
  if rest.is_empty() {
    return Err(ParseError::Empty(pos));
  }

  let mut commands = Vec::new();
  let mut depth = 0usize;
  let mut start = 0;
  for (i, token) in rest.iter().enumerate() {
    match token {
      Token::LParen => depth += 1,
      Token::RParen => {
        depth = depth.checked_sub(1).ok_or_else(|| ParseError::Unexpected {
          token: token.to_string(),
          pos,
        })?;
      }
      Token::Pipe if depth == 0 => {
        commands.push(parse_command(&rest[start..i], pos)?);
        start = i + 1;
      }
      _ => {}
    }
  }
  if depth != 0 {
    return Err(ParseError::Unclosed(pos));
  }
  commands.push(parse_command(&rest[start..], pos)?);

  Ok(Pipeline { decl, commands })
}

fn split_declaration(tokens: &[Token], pos: usize, max_decl: usize) -> Result<(Vec<String>, &[Token]), ParseError> {
  if max_decl == 0 {
    return Ok((Vec::new(), tokens));
  }
  match tokens {
    [Token::Variable(name, path), Token::Declare, rest @ ..] if path.is_empty() => Ok((vec![name.clone()], rest)),
    [
      Token::Variable(key, kp),
      Token::Comma,
      Token::Variable(value, vp),
      Token::Declare,
      rest @ ..,
    ] if kp.is_empty() && vp.is_empty() => {
      if max_decl < 2 {
        return Err(ParseError::Unexpected {
          token: Token::Comma.to_string(),
          pos,
        });
      }
      Ok((vec![key.clone(), value.clone()], rest))
    }
    _ => Ok((Vec::new(), tokens)),
  }
}

fn parse_command(tokens: &[Token], pos: usize) -> Result<Command, ParseError> {
  if tokens.is_empty() {
    return Err(ParseError::Empty(pos));
  }

  let mut args = Vec::new();
  let mut i = 0;
  while i < tokens.len() {
    let operand = match &tokens[i] {
      Token::LParen => {
        let close = matching_paren(tokens, i).ok_or(ParseError::Unclosed(pos))?;
        let inner = parse_pipeline(&tokens[i + 1..close], pos, 0)?;
        i = close + 1;
        args.push(Operand::Pipe(Box::new(inner)));
        continue;
      }
      Token::Dot => Operand::Dot,
      Token::Field(path) => Operand::Field(path.clone()),
      Token::Variable(name, path) => Operand::Variable(name.clone(), path.clone()),
      Token::Str(s) => Operand::Str(s.clone()),
      Token::Int(n) => Operand::Int(*n),
      Token::Ident(name) => match name.as_str() {
        "true" => Operand::Bool(true),
        "false" => Operand::Bool(false),
        "nil" => Operand::Nil,
        "if" | "else" | "end" | "range" | "with" => {
          return Err(ParseError::Unexpected {
            token: tokens[i].to_string(),
            pos,
          });
        }
        _ if FUNCTIONS.contains(&name.as_str()) => Operand::Func(name.clone()),
        _ => {
          return Err(ParseError::UnknownFunction {
            name: name.clone(),
            pos,
          });
        }
      },
      other => {
        return Err(ParseError::Unexpected {
          token: other.to_string(),
          pos,
        });
      }
    };
    args.push(operand);
    i += 1;
  }

  Ok(Command { args })
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
  let mut depth = 0usize;
  for (i, token) in tokens.iter().enumerate().skip(open) {
    match token {
      Token::LParen => depth += 1,
      Token::RParen => {
        depth -= 1;
        if depth == 0 {
          return Some(i);
        }
      }
      _ => {}
    }
  }
  None
}

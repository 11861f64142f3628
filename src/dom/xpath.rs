//! XPath 1.0 subset evaluator
//!
//! Enough of the language to evaluate every expression the locator strategies build
//! and the ones hosts hand back for replay: location paths with the common axes,
//! predicates, boolean and comparison operators with node-set semantics, unions,
//! filter expressions such as `(//a)[2]` and the string functions used in locators.

use std::collections::{HashMap, HashSet};

use super::{Document, NodeData, NodeId};
use crate::error::{InspectorError, Result};

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Dot,
    DotDot,
    Star,
    DoubleColon,
    Literal(String),
    Number(f64),
    Name(String),
}

fn tokenize(src: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
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
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::DoubleColon);
                i += 2;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if !next.is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '"' | '\'' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|ch| *ch == c)
                    .ok_or_else(|| "unterminated string literal".to_string())?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + close].iter().collect()));
                i += close + 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| format!("bad number '{}'", text))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '-' || chars[i] == '_')
                {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Following,
    FollowingSibling,
    Preceding,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "attribute" => Axis::Attribute,
            "following" => Axis::Following,
            "following-sibling" => Axis::FollowingSibling,
            "preceding" => Axis::Preceding,
            "preceding-sibling" => Axis::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
enum PathStart {
    Root,
    Context,
    Filter(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Union(Vec<Expr>),
    Path(PathStart, Vec<Step>),
    Filter(Box<Expr>, Vec<Expr>),
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
}

fn descendant_or_self_step() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            other => Err(format!("expected {:?}, found {:?}", expected, other)),
        }
    }

    fn peek_name(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == name)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_name("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.peek_name("and") {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::NotEq) => CmpOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_union()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_union()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_union(&mut self) -> ParseResult<Expr> {
        let first = self.parse_path()?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            members.push(self.parse_path()?);
        }
        Ok(Expr::Union(members))
    }

    fn starts_step(&self) -> bool {
        match self.peek() {
            Some(Token::Dot) | Some(Token::DotDot) | Some(Token::At) | Some(Token::Star) => true,
            Some(Token::Name(_)) => !self.is_function_call(),
            _ => false,
        }
    }

    fn is_function_call(&self) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::Name(name)), Some(Token::LParen)) => {
                !matches!(name.as_str(), "text" | "node")
            }
            _ => false,
        }
    }

    fn parse_path(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                let steps = if self.starts_step() {
                    self.parse_relative_steps()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path(PathStart::Root, steps))
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                let mut steps = vec![descendant_or_self_step()];
                steps.extend(self.parse_relative_steps()?);
                Ok(Expr::Path(PathStart::Root, steps))
            }
            Some(Token::LParen) | Some(Token::Literal(_)) | Some(Token::Number(_)) => {
                self.parse_filter_path()
            }
            Some(Token::Name(_)) if self.is_function_call() => self.parse_filter_path(),
            Some(_) if self.starts_step() => {
                let steps = self.parse_relative_steps()?;
                Ok(Expr::Path(PathStart::Context, steps))
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }

    fn parse_filter_path(&mut self) -> ParseResult<Expr> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let filtered = if predicates.is_empty() {
            primary
        } else {
            Expr::Filter(Box::new(primary), predicates)
        };

        match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                let steps = self.parse_relative_steps()?;
                Ok(Expr::Path(PathStart::Filter(Box::new(filtered)), steps))
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                let mut steps = vec![descendant_or_self_step()];
                steps.extend(self.parse_relative_steps()?);
                Ok(Expr::Path(PathStart::Filter(Box::new(filtered)), steps))
            }
            _ => Ok(filtered),
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Name(name)) => {
                self.expect(Token::LParen)?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    args.push(self.parse_or()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.advance();
                        args.push(self.parse_or()?);
                    }
                }
                self.expect(Token::RParen)?;
                Ok(Expr::Function(name, args))
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }

    fn parse_relative_steps(&mut self) -> ParseResult<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.advance();
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.advance();
                    steps.push(descendant_or_self_step());
                    steps.push(self.parse_step()?);
                }
                _ => break,
            }
        }
        Ok(steps)
    }

    fn parse_step(&mut self) -> ParseResult<Step> {
        match self.peek() {
            Some(Token::Dot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            Some(Token::DotDot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            _ => {}
        }

        let axis = match (self.peek(), self.peek_at(1)) {
            (Some(Token::At), _) => {
                self.advance();
                Axis::Attribute
            }
            (Some(Token::Name(name)), Some(Token::DoubleColon)) => {
                let axis =
                    Axis::from_name(name).ok_or_else(|| format!("unknown axis '{}'", name))?;
                self.advance();
                self.advance();
                axis
            }
            _ => Axis::Child,
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    self.expect(Token::RParen)?;
                    match name.as_str() {
                        "text" => NodeTest::Text,
                        "node" => NodeTest::Node,
                        other => return Err(format!("unsupported node test '{}()'", other)),
                    }
                } else {
                    NodeTest::Name(name.to_ascii_lowercase())
                }
            }
            other => return Err(format!("expected node test, found {:?}", other)),
        };

        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_predicates(&mut self) -> ParseResult<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.advance();
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }
        Ok(predicates)
    }
}

fn compile(expr: &str) -> Result<Expr> {
    let source = expr.trim();
    let source = source.strip_prefix("xpath=").unwrap_or(source);
    let tokens = tokenize(source).map_err(|reason| InspectorError::xpath(expr, reason))?;
    if tokens.is_empty() {
        return Err(InspectorError::xpath(expr, "empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser
        .parse_or()
        .map_err(|reason| InspectorError::xpath(expr, reason))?;
    if parser.pos < parser.tokens.len() {
        return Err(InspectorError::xpath(
            expr,
            format!("unexpected trailing {:?}", parser.tokens[parser.pos]),
        ));
    }
    Ok(ast)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum XNode {
    Node(NodeId),
    /// Attribute `index` of an element
    Attr(NodeId, usize),
}

#[derive(Debug, Clone)]
enum Value {
    Nodes(Vec<XNode>),
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy)]
struct Context {
    node: XNode,
    position: usize,
    size: usize,
}

struct Evaluator<'a> {
    doc: &'a Document,
    order: HashMap<NodeId, usize>,
}

/// Collapse runs of whitespace and trim, as `normalize-space()` does
pub fn normalize_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Quote a string as an XPath literal, falling back to `concat()` for mixed quotes
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl<'a> Evaluator<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            order: doc.document_order(),
        }
    }

    fn sort_key(&self, node: &XNode) -> (usize, usize) {
        match node {
            XNode::Node(id) => (self.order.get(id).copied().unwrap_or(usize::MAX), 0),
            XNode::Attr(owner, index) => (
                self.order.get(owner).copied().unwrap_or(usize::MAX),
                index + 1,
            ),
        }
    }

    fn in_document_order(&self, mut nodes: Vec<XNode>) -> Vec<XNode> {
        let mut seen = HashSet::new();
        nodes.retain(|n| seen.insert(*n));
        nodes.sort_by_key(|n| self.sort_key(n));
        nodes
    }

    fn string_value(&self, node: &XNode) -> String {
        match node {
            XNode::Node(id) => self.doc.text_content(*id),
            XNode::Attr(owner, index) => self
                .doc
                .attributes(*owner)
                .get(*index)
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
        }
    }

    fn to_string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => self
                .in_document_order(nodes.clone())
                .first()
                .map(|n| self.string_value(n))
                .unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => self.to_string(other).trim().parse().unwrap_or(f64::NAN),
        }
    }

    fn to_bool(&self, value: &Value) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn eval(&self, expr: &Expr, ctx: &Context) -> std::result::Result<Value, String> {
        match expr {
            Expr::Or(l, r) => Ok(Value::Bool(
                self.to_bool(&self.eval(l, ctx)?) || self.to_bool(&self.eval(r, ctx)?),
            )),
            Expr::And(l, r) => Ok(Value::Bool(
                self.to_bool(&self.eval(l, ctx)?) && self.to_bool(&self.eval(r, ctx)?),
            )),
            Expr::Compare(op, l, r) => {
                let left = self.eval(l, ctx)?;
                let right = self.eval(r, ctx)?;
                Ok(Value::Bool(self.compare(&left, &right, *op)))
            }
            Expr::Union(members) => {
                let mut all = Vec::new();
                for member in members {
                    match self.eval(member, ctx)? {
                        Value::Nodes(nodes) => all.extend(nodes),
                        _ => return Err("union operand is not a node-set".to_string()),
                    }
                }
                Ok(Value::Nodes(self.in_document_order(all)))
            }
            Expr::Path(start, steps) => {
                let mut nodes = match start {
                    PathStart::Root => vec![XNode::Node(self.doc.root())],
                    PathStart::Context => vec![ctx.node],
                    PathStart::Filter(inner) => match self.eval(inner, ctx)? {
                        Value::Nodes(nodes) => nodes,
                        _ => return Err("path applied to a non node-set".to_string()),
                    },
                };
                for step in steps {
                    nodes = self.apply_step(&nodes, step)?;
                }
                Ok(Value::Nodes(nodes))
            }
            Expr::Filter(inner, predicates) => {
                let mut nodes = match self.eval(inner, ctx)? {
                    Value::Nodes(nodes) => self.in_document_order(nodes),
                    _ => return Err("predicate applied to a non node-set".to_string()),
                };
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(Value::Nodes(nodes))
            }
            Expr::Literal(s) => Ok(Value::Str(s.clone())),
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Function(name, args) => self.call(name, args, ctx),
        }
    }

    fn call(&self, name: &str, args: &[Expr], ctx: &Context) -> std::result::Result<Value, String> {
        let arity = |min: usize, max: usize| -> std::result::Result<(), String> {
            if args.len() < min || args.len() > max {
                Err(format!("wrong number of arguments for {}()", name))
            } else {
                Ok(())
            }
        };
        let string_arg = |i: usize| -> std::result::Result<String, String> {
            match args.get(i) {
                Some(arg) => Ok(self.to_string(&self.eval(arg, ctx)?)),
                None => Ok(self.string_value(&ctx.node)),
            }
        };

        match name {
            "contains" => {
                arity(2, 2)?;
                Ok(Value::Bool(string_arg(0)?.contains(&string_arg(1)?)))
            }
            "starts-with" => {
                arity(2, 2)?;
                Ok(Value::Bool(string_arg(0)?.starts_with(&string_arg(1)?)))
            }
            "normalize-space" => {
                arity(0, 1)?;
                Ok(Value::Str(normalize_space(&string_arg(0)?)))
            }
            "string" => {
                arity(0, 1)?;
                Ok(Value::Str(string_arg(0)?))
            }
            "string-length" => {
                arity(0, 1)?;
                Ok(Value::Num(string_arg(0)?.chars().count() as f64))
            }
            "concat" => {
                if args.len() < 2 {
                    return Err("concat() needs at least two arguments".to_string());
                }
                let mut out = String::new();
                for i in 0..args.len() {
                    out.push_str(&string_arg(i)?);
                }
                Ok(Value::Str(out))
            }
            "not" => {
                arity(1, 1)?;
                Ok(Value::Bool(!self.to_bool(&self.eval(&args[0], ctx)?)))
            }
            "true" => {
                arity(0, 0)?;
                Ok(Value::Bool(true))
            }
            "false" => {
                arity(0, 0)?;
                Ok(Value::Bool(false))
            }
            "position" => {
                arity(0, 0)?;
                Ok(Value::Num(ctx.position as f64))
            }
            "last" => {
                arity(0, 0)?;
                Ok(Value::Num(ctx.size as f64))
            }
            "count" => {
                arity(1, 1)?;
                match self.eval(&args[0], ctx)? {
                    Value::Nodes(nodes) => Ok(Value::Num(nodes.len() as f64)),
                    _ => Err("count() expects a node-set".to_string()),
                }
            }
            other => Err(format!("unsupported function {}()", other)),
        }
    }

    fn compare(&self, left: &Value, right: &Value, op: CmpOp) -> bool {
        match (left, right) {
            (Value::Nodes(_), Value::Bool(_)) | (Value::Bool(_), Value::Nodes(_)) => {
                self.compare_scalar(
                    &Value::Bool(self.to_bool(left)),
                    &Value::Bool(self.to_bool(right)),
                    op,
                )
            }
            (Value::Nodes(nodes), _) => nodes
                .iter()
                .any(|n| self.compare(&Value::Str(self.string_value(n)), right, op)),
            (_, Value::Nodes(nodes)) => nodes
                .iter()
                .any(|n| self.compare(left, &Value::Str(self.string_value(n)), op)),
            _ => self.compare_scalar(left, right, op),
        }
    }

    fn compare_scalar(&self, left: &Value, right: &Value, op: CmpOp) -> bool {
        match op {
            CmpOp::Eq | CmpOp::Ne => {
                let equal = if matches!(left, Value::Bool(_)) || matches!(right, Value::Bool(_)) {
                    self.to_bool(left) == self.to_bool(right)
                } else if matches!(left, Value::Num(_)) || matches!(right, Value::Num(_)) {
                    self.to_number(left) == self.to_number(right)
                } else {
                    self.to_string(left) == self.to_string(right)
                };
                (op == CmpOp::Eq) == equal
            }
            CmpOp::Lt => self.to_number(left) < self.to_number(right),
            CmpOp::Le => self.to_number(left) <= self.to_number(right),
            CmpOp::Gt => self.to_number(left) > self.to_number(right),
            CmpOp::Ge => self.to_number(left) >= self.to_number(right),
        }
    }

    fn filter(&self, nodes: Vec<XNode>, predicate: &Expr) -> std::result::Result<Vec<XNode>, String> {
        let size = nodes.len();
        let mut kept = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let ctx = Context {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, &ctx)? {
                Value::Num(n) => n == (i + 1) as f64,
                other => self.to_bool(&other),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn apply_step(&self, input: &[XNode], step: &Step) -> std::result::Result<Vec<XNode>, String> {
        let mut out = Vec::new();
        for node in input {
            // Candidates come back in axis order so positional predicates see proximity
            let mut candidates: Vec<XNode> = self
                .axis(node, step.axis)
                .into_iter()
                .filter(|c| self.node_test(c, &step.test, step.axis))
                .collect();
            for predicate in &step.predicates {
                candidates = self.filter(candidates, predicate)?;
            }
            out.extend(candidates);
        }
        Ok(self.in_document_order(out))
    }

    fn node_test(&self, node: &XNode, test: &NodeTest, axis: Axis) -> bool {
        match node {
            XNode::Attr(owner, index) => {
                if axis != Axis::Attribute && axis != Axis::SelfAxis {
                    return matches!(test, NodeTest::Node);
                }
                match test {
                    NodeTest::Any | NodeTest::Node => true,
                    NodeTest::Text => false,
                    NodeTest::Name(name) => self
                        .doc
                        .attributes(*owner)
                        .get(*index)
                        .is_some_and(|(k, _)| k == name),
                }
            }
            XNode::Node(id) => match test {
                NodeTest::Node => true,
                NodeTest::Text => matches!(self.doc.data(*id), NodeData::Text(_)),
                NodeTest::Any => self.doc.is_element(*id),
                NodeTest::Name(name) => self.doc.tag_name(*id) == Some(name.as_str()),
            },
        }
    }

    fn axis(&self, node: &XNode, axis: Axis) -> Vec<XNode> {
        let doc = self.doc;
        let wrap = |ids: Vec<NodeId>| ids.into_iter().map(XNode::Node).collect::<Vec<_>>();

        let id = match node {
            XNode::Node(id) => *id,
            XNode::Attr(owner, _) => {
                return match axis {
                    Axis::SelfAxis => vec![*node],
                    Axis::Parent => vec![XNode::Node(*owner)],
                    Axis::Ancestor | Axis::AncestorOrSelf => {
                        let mut out = Vec::new();
                        if axis == Axis::AncestorOrSelf {
                            out.push(*node);
                        }
                        out.push(XNode::Node(*owner));
                        out.extend(wrap(self.ancestors(*owner)));
                        out
                    }
                    Axis::Following => wrap(self.following(*owner, true)),
                    _ => Vec::new(),
                };
            }
        };

        match axis {
            Axis::Child => wrap(doc.children(id).to_vec()),
            Axis::Descendant => wrap(doc.descendants(id)),
            Axis::DescendantOrSelf => {
                let mut out = vec![*node];
                out.extend(wrap(doc.descendants(id)));
                out
            }
            Axis::SelfAxis => vec![*node],
            Axis::Parent => wrap(doc.parent(id).into_iter().collect()),
            Axis::Ancestor => wrap(self.ancestors(id)),
            Axis::AncestorOrSelf => {
                let mut out = vec![*node];
                out.extend(wrap(self.ancestors(id)));
                out
            }
            Axis::Attribute => (0..doc.attributes(id).len())
                .map(|i| XNode::Attr(id, i))
                .collect(),
            Axis::Following => wrap(self.following(id, false)),
            Axis::FollowingSibling => wrap(self.siblings(id, true)),
            Axis::PrecedingSibling => wrap(self.siblings(id, false)),
            Axis::Preceding => {
                let ancestors: HashSet<NodeId> = self.ancestors(id).into_iter().collect();
                let position = self.order.get(&id).copied().unwrap_or(0);
                let mut before: Vec<NodeId> = self
                    .order
                    .iter()
                    .filter(|(n, o)| **o < position && !ancestors.contains(n))
                    .map(|(n, _)| *n)
                    .collect();
                before.sort_by_key(|n| std::cmp::Reverse(self.order[n]));
                wrap(before)
            }
        }
    }

    /// Every ancestor including the document node, nearest first
    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.doc.parent(id);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.doc.parent(current);
        }
        out
    }

    fn siblings(&self, id: NodeId, after: bool) -> Vec<NodeId> {
        let Some(parent) = self.doc.parent(id) else {
            return Vec::new();
        };
        let children = self.doc.children(parent);
        let pos = children.iter().position(|c| *c == id).unwrap_or(0);
        if after {
            children[pos + 1..].to_vec()
        } else {
            children[..pos].iter().rev().copied().collect()
        }
    }

    /// Nodes after `id` in document order, skipping its descendants unless asked
    fn following(&self, id: NodeId, include_descendants: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        if include_descendants {
            out.extend(self.doc.descendants(id));
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            for sibling in self.siblings(current, true) {
                out.push(sibling);
                out.extend(self.doc.descendants(sibling));
            }
            cursor = self.doc.parent(current);
        }
        out
    }
}

/// Evaluate `expr` with the document node as context and return the selected nodes
/// in document order. Attribute nodes are not returned.
pub fn evaluate(doc: &Document, expr: &str) -> Result<Vec<NodeId>> {
    let ast = compile(expr)?;
    let evaluator = Evaluator::new(doc);
    let ctx = Context {
        node: XNode::Node(doc.root()),
        position: 1,
        size: 1,
    };
    match evaluator.eval(&ast, &ctx) {
        Ok(Value::Nodes(nodes)) => Ok(evaluator
            .in_document_order(nodes)
            .into_iter()
            .filter_map(|n| match n {
                XNode::Node(id) => Some(id),
                XNode::Attr(..) => None,
            })
            .collect()),
        Ok(_) => Err(InspectorError::xpath(expr, "expression does not select nodes")),
        Err(reason) => Err(InspectorError::xpath(expr, reason)),
    }
}

/// Check that an expression parses without evaluating it
pub fn validate(expr: &str) -> Result<()> {
    compile(expr).map(|_| ())
}

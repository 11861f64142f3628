//! CSS selector parsing and matching
//!
//! Covers the selector syntax produced by the finder and the data-attribute strategy
//! and what hosts typically send back: compound selectors with type, universal, id,
//! class and attribute parts, the structural pseudo-classes and all four combinators.

use super::{Document, NodeId};
use crate::error::{InspectorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrCondition {
    name: String,
    op: AttrOp,
    value: String,
    case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoClass {
    FirstChild,
    LastChild,
    NthChild(usize),
    NthOfType(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    pseudos: Vec<PseudoClass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    Adjacent,
    Sibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    compound: Compound,
    /// Relation to the part on the left
    combinator: Option<Combinator>,
}

pub type ComplexSelector = Vec<Part>;

/// Parse a selector list (comma separated)
pub fn parse(selector: &str) -> Result<Vec<ComplexSelector>> {
    let groups = split_groups(selector);
    if groups.iter().all(|g| g.trim().is_empty()) {
        return Err(InspectorError::css(selector, "empty selector"));
    }
    groups
        .iter()
        .map(|g| parse_complex(g).map_err(|reason| InspectorError::css(selector, reason)))
        .collect()
}

pub fn matches_any(doc: &Document, node: NodeId, groups: &[ComplexSelector]) -> bool {
    doc.is_element(node) && groups.iter().any(|g| matches_complex(doc, node, g))
}

fn split_groups(selector: &str) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in selector.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                current.push(c);
            }
            '"' | '\'' if quote.is_none() => {
                quote = Some(c);
                current.push(c);
            }
            c if Some(c) == quote => {
                quote = None;
                current.push(c);
            }
            '[' | '(' if quote.is_none() => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' if quote.is_none() => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if quote.is_none() && depth == 0 => {
                groups.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    groups.push(current);
    groups
}

fn parse_complex(src: &str) -> std::result::Result<ComplexSelector, String> {
    let chars: Vec<char> = src.trim().chars().collect();
    if chars.is_empty() {
        return Err("empty selector in list".to_string());
    }

    let mut parts: Vec<Part> = Vec::new();
    let mut pending: Option<Combinator> = None;
    let mut i = 0;

    while i < chars.len() {
        let mut saw_space = false;
        while i < chars.len() && chars[i].is_whitespace() {
            saw_space = true;
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let explicit = match chars[i] {
            '>' => Some(Combinator::Child),
            '+' => Some(Combinator::Adjacent),
            '~' => Some(Combinator::Sibling),
            _ => None,
        };
        if let Some(combinator) = explicit {
            if parts.is_empty() || pending.is_some() {
                return Err(format!("misplaced combinator '{}'", chars[i]));
            }
            pending = Some(combinator);
            i += 1;
            continue;
        }

        if !parts.is_empty() && pending.is_none() {
            if !saw_space {
                return Err(format!("unexpected '{}'", chars[i]));
            }
            pending = Some(Combinator::Descendant);
        }

        let (compound, next) = parse_compound(&chars, i)?;
        parts.push(Part {
            compound,
            combinator: pending.take(),
        });
        i = next;
    }

    if pending.is_some() {
        return Err("dangling combinator".to_string());
    }
    Ok(parts)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn parse_ident(chars: &[char], mut i: usize) -> std::result::Result<(String, usize), String> {
    let mut out = String::new();
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            i += 1;
            let Some(&next) = chars.get(i) else {
                return Err("dangling escape".to_string());
            };
            if next.is_ascii_hexdigit() {
                let mut hex = String::new();
                while i < chars.len() && chars[i].is_ascii_hexdigit() && hex.len() < 6 {
                    hex.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() && chars[i] == ' ' {
                    i += 1;
                }
                let code = u32::from_str_radix(&hex, 16).map_err(|e| e.to_string())?;
                out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
            } else {
                out.push(next);
                i += 1;
            }
        } else if is_ident_char(c) {
            out.push(c);
            i += 1;
        } else {
            break;
        }
    }
    if out.is_empty() {
        return Err(format!("expected identifier at {}", i));
    }
    Ok((out, i))
}

fn parse_compound(chars: &[char], start: usize) -> std::result::Result<(Compound, usize), String> {
    let mut compound = Compound::default();
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || matches!(c, '>' | '+' | '~') {
            break;
        }
        match c {
            '*' if i == start => {
                i += 1;
            }
            '#' => {
                let (id, next) = parse_ident(chars, i + 1)?;
                compound.id = Some(id);
                i = next;
            }
            '.' => {
                let (class, next) = parse_ident(chars, i + 1)?;
                compound.classes.push(class);
                i = next;
            }
            '[' => {
                let (attr, next) = parse_attr(chars, i + 1)?;
                compound.attrs.push(attr);
                i = next;
            }
            ':' => {
                let (pseudo, next) = parse_pseudo(chars, i + 1)?;
                compound.pseudos.push(pseudo);
                i = next;
            }
            _ if i == start && (is_ident_char(c) || c == '\\') => {
                let (tag, next) = parse_ident(chars, i)?;
                compound.tag = Some(tag.to_ascii_lowercase());
                i = next;
            }
            _ => return Err(format!("unexpected '{}'", c)),
        }
    }

    if i == start {
        return Err("empty compound selector".to_string());
    }
    Ok((compound, i))
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn parse_attr(chars: &[char], i: usize) -> std::result::Result<(AttrCondition, usize), String> {
    let i = skip_ws(chars, i);
    let (name, i) = parse_ident(chars, i)?;
    let mut i = skip_ws(chars, i);

    let op = match chars.get(i) {
        Some(']') => {
            return Ok((
                AttrCondition {
                    name: name.to_ascii_lowercase(),
                    op: AttrOp::Exists,
                    value: String::new(),
                    case_insensitive: false,
                },
                i + 1,
            ))
        }
        Some('=') => {
            i += 1;
            AttrOp::Equals
        }
        Some(c @ ('~' | '|' | '^' | '$' | '*')) if chars.get(i + 1) == Some(&'=') => {
            i += 2;
            match c {
                '~' => AttrOp::Includes,
                '|' => AttrOp::DashMatch,
                '^' => AttrOp::Prefix,
                '$' => AttrOp::Suffix,
                _ => AttrOp::Substring,
            }
        }
        _ => return Err("malformed attribute selector".to_string()),
    };

    i = skip_ws(chars, i);
    let (value, next) = match chars.get(i) {
        Some(&q @ ('"' | '\'')) => {
            let mut value = String::new();
            let mut j = i + 1;
            loop {
                match chars.get(j) {
                    None => return Err("unterminated string".to_string()),
                    Some('\\') => {
                        if let Some(&escaped) = chars.get(j + 1) {
                            value.push(escaped);
                        }
                        j += 2;
                    }
                    Some(&c) if c == q => break,
                    Some(&c) => {
                        value.push(c);
                        j += 1;
                    }
                }
            }
            (value, j + 1)
        }
        _ => parse_ident(chars, i)?,
    };

    i = skip_ws(chars, next);
    let mut case_insensitive = false;
    if matches!(chars.get(i), Some('i') | Some('I')) {
        case_insensitive = true;
        i = skip_ws(chars, i + 1);
    }
    if chars.get(i) != Some(&']') {
        return Err("expected ']'".to_string());
    }

    Ok((
        AttrCondition {
            name: name.to_ascii_lowercase(),
            op,
            value,
            case_insensitive,
        },
        i + 1,
    ))
}

fn parse_pseudo(chars: &[char], i: usize) -> std::result::Result<(PseudoClass, usize), String> {
    let (name, mut i) = parse_ident(chars, i)?;
    let mut argument = None;
    if chars.get(i) == Some(&'(') {
        let close = chars[i..]
            .iter()
            .position(|c| *c == ')')
            .map(|p| p + i)
            .ok_or_else(|| "unterminated pseudo-class argument".to_string())?;
        argument = Some(chars[i + 1..close].iter().collect::<String>());
        i = close + 1;
    }

    let nth = |arg: Option<String>| -> std::result::Result<usize, String> {
        arg.as_deref()
            .map(str::trim)
            .and_then(|a| a.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("unsupported argument for :{}", name))
    };

    let pseudo = match name.to_ascii_lowercase().as_str() {
        "first-child" => PseudoClass::FirstChild,
        "last-child" => PseudoClass::LastChild,
        "nth-child" => PseudoClass::NthChild(nth(argument)?),
        "nth-of-type" => PseudoClass::NthOfType(nth(argument)?),
        other => return Err(format!("unsupported pseudo-class :{}", other)),
    };
    Ok((pseudo, i))
}

fn matches_complex(doc: &Document, node: NodeId, parts: &[Part]) -> bool {
    let Some((last, rest)) = parts.split_last() else {
        return false;
    };
    if !matches_compound(doc, node, &last.compound) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }

    match last.combinator.unwrap_or(Combinator::Descendant) {
        Combinator::Child => doc
            .parent_element(node)
            .is_some_and(|p| matches_complex(doc, p, rest)),
        Combinator::Descendant => doc
            .ancestors(node)
            .into_iter()
            .any(|a| matches_complex(doc, a, rest)),
        Combinator::Adjacent => previous_siblings(doc, node)
            .first()
            .is_some_and(|s| matches_complex(doc, *s, rest)),
        Combinator::Sibling => previous_siblings(doc, node)
            .into_iter()
            .any(|s| matches_complex(doc, s, rest)),
    }
}

/// Preceding element siblings, nearest first
fn previous_siblings(doc: &Document, node: NodeId) -> Vec<NodeId> {
    let Some(parent) = doc.parent(node) else {
        return Vec::new();
    };
    let siblings = doc.element_children(parent);
    let pos = siblings.iter().position(|s| *s == node).unwrap_or(0);
    siblings[..pos].iter().rev().copied().collect()
}

fn matches_compound(doc: &Document, node: NodeId, compound: &Compound) -> bool {
    let Some(element) = doc.element(node) else {
        return false;
    };

    if let Some(tag) = &compound.tag {
        if element.tag_name() != tag {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if element.attribute("id") != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let classes = doc.classes(node);
        if !compound.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
    }
    if !compound.attrs.iter().all(|a| matches_attr(element.attribute(&a.name), a)) {
        return false;
    }
    compound.pseudos.iter().all(|p| matches_pseudo(doc, node, p))
}

fn matches_attr(actual: Option<&str>, cond: &AttrCondition) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    let (actual, expected) = if cond.case_insensitive {
        (actual.to_lowercase(), cond.value.to_lowercase())
    } else {
        (actual.to_string(), cond.value.clone())
    };

    match cond.op {
        AttrOp::Exists => true,
        AttrOp::Equals => actual == expected,
        AttrOp::Includes => actual.split_whitespace().any(|w| w == expected),
        AttrOp::DashMatch => actual == expected || actual.starts_with(&format!("{}-", expected)),
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(&expected),
    }
}

fn matches_pseudo(doc: &Document, node: NodeId, pseudo: &PseudoClass) -> bool {
    let Some(parent) = doc.parent(node) else {
        return false;
    };
    let siblings = doc.element_children(parent);
    match pseudo {
        PseudoClass::FirstChild => siblings.first() == Some(&node),
        PseudoClass::LastChild => siblings.last() == Some(&node),
        PseudoClass::NthChild(n) => doc.sibling_index(node) == *n,
        PseudoClass::NthOfType(n) => doc.same_tag_position(node).0 == *n,
    }
}

/// Quote a value for use inside an attribute selector
pub fn quote_attr_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Whether a string can be used verbatim as a CSS identifier
pub fn is_plain_ident(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some('-') => match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        },
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

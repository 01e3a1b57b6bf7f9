//! A small CSS selector engine.
//!
//! Supports the subset the widget needs to find search inputs and app blocks
//! in arbitrary themes: type, `#id`, `.class`, attribute selectors with
//! `= *= ^= $= ~= |=` operators and the `i` case flag, and the descendant
//! (` `) and child (`>`) combinators, in comma-separated lists.

use core::fmt;
use core::str::FromStr;

use visual_search_core::NodeId;

/// Errors produced while parsing a selector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character '{found}' at offset {offset} in '{input}'")]
    Unexpected {
        input: String,
        offset: usize,
        found: char,
    },
    #[error("unterminated {what} in '{input}'")]
    Unterminated { input: String, what: &'static str },
}

/// Read access to the element tree, as needed for matching.
pub(crate) trait SelectorContext {
    fn tag_of(&self, node: NodeId) -> Option<&str>;
    fn attribute_of(&self, node: NodeId, name: &str) -> Option<&str>;
    fn parent_of(&self, node: NodeId) -> Option<NodeId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
    Word,
    DashPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
    value: String,
    case_insensitive: bool,
}

impl AttrSelector {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        if self.op == AttrOp::Exists {
            return true;
        }
        let (actual, expected) = if self.case_insensitive {
            (actual.to_ascii_lowercase(), self.value.to_ascii_lowercase())
        } else {
            (actual.to_string(), self.value.clone())
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Contains => !expected.is_empty() && actual.contains(&expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttrOp::Word => actual.split_ascii_whitespace().any(|w| w == expected),
            AttrOp::DashPrefix => {
                actual == expected || actual.starts_with(&format!("{expected}-"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.ids.is_empty() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches(&self, ctx: &impl SelectorContext, node: NodeId) -> bool {
        let Some(tag) = ctx.tag_of(node) else {
            return false;
        };
        if let Some(expected) = &self.tag
            && !expected.eq_ignore_ascii_case(tag)
        {
            return false;
        }
        if self
            .ids
            .iter()
            .any(|id| ctx.attribute_of(node, "id") != Some(id.as_str()))
        {
            return false;
        }
        if !self.classes.is_empty() {
            let class_attr = ctx.attribute_of(node, "class").unwrap_or_default();
            if !self
                .classes
                .iter()
                .all(|wanted| class_attr.split_ascii_whitespace().any(|c| c == wanted))
            {
                return false;
            }
        }
        self.attrs
            .iter()
            .all(|attr| attr.matches(ctx.attribute_of(node, &attr.name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One complex selector: compounds joined by combinators, left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    first: Compound,
    rest: Vec<(Combinator, Compound)>,
}

impl Selector {
    pub(crate) fn matches(&self, ctx: &impl SelectorContext, node: NodeId) -> bool {
        // Match right to left: the subject is the last compound.
        let mut parts: Vec<(Option<Combinator>, &Compound)> = Vec::with_capacity(self.rest.len() + 1);
        parts.push((None, &self.first));
        parts.extend(self.rest.iter().map(|(c, compound)| (Some(*c), compound)));
        match_from(ctx, node, &parts)
    }
}

fn match_from(
    ctx: &impl SelectorContext,
    node: NodeId,
    parts: &[(Option<Combinator>, &Compound)],
) -> bool {
    let Some(((combinator, compound), earlier)) = parts.split_last() else {
        return true;
    };
    if !compound.matches(ctx, node) {
        return false;
    }
    match combinator {
        None => true,
        Some(Combinator::Child) => ctx
            .parent_of(node)
            .is_some_and(|parent| match_from(ctx, parent, earlier)),
        Some(Combinator::Descendant) => {
            let mut ancestor = ctx.parent_of(node);
            while let Some(candidate) = ancestor {
                if match_from(ctx, candidate, earlier) {
                    return true;
                }
                ancestor = ctx.parent_of(candidate);
            }
            false
        }
    }
}

/// A comma-separated list of selectors; matches if any member matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    source: String,
    selectors: Vec<Selector>,
}

impl SelectorList {
    /// Parse a selector list.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] on syntax the engine does not support.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let selectors = Parser::new(input).parse_list()?;
        Ok(Self {
            source: input.to_string(),
            selectors,
        })
    }

    /// Join several selector strings into one list.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if any member fails to parse.
    pub fn from_parts(parts: &[&str]) -> Result<Self, SelectorError> {
        Self::parse(&parts.join(", "))
    }

    pub(crate) fn matches(&self, ctx: &impl SelectorContext, node: NodeId) -> bool {
        self.selectors.iter().any(|s| s.matches(ctx, node))
    }

    /// The source text this list was parsed from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for SelectorList {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn unexpected(&self, found: char) -> SelectorError {
        SelectorError::Unexpected {
            input: self.input.to_string(),
            offset: self.pos,
            found,
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Selector>, SelectorError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_ws();
            selectors.push(self.parse_complex()?);
            self.skip_ws();
            match self.bump() {
                None => break,
                Some(',') => {}
                Some(c) => return Err(self.unexpected(c)),
            }
        }
        Ok(selectors)
    }

    fn parse_complex(&mut self) -> Result<Selector, SelectorError> {
        let first = self.parse_compound()?;
        let mut rest = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    Combinator::Child
                }
                Some(_) if had_ws => Combinator::Descendant,
                Some(c) => return Err(self.unexpected(c)),
            };
            rest.push((combinator, self.parse_compound()?));
        }
        Ok(Selector { first, rest })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let universal = self.peek() == Some('*');
        if universal {
            self.pos += 1;
        } else if self.peek().is_some_and(is_ident_char) {
            compound.tag = Some(self.parse_ident().to_ascii_lowercase());
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.parse_required_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_required_ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.parse_attr()?);
                }
                _ => break,
            }
        }
        if compound.is_empty() && !universal {
            return match self.peek() {
                Some(c) => Err(self.unexpected(c)),
                None => Err(SelectorError::Empty),
            };
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek().filter(|c| is_ident_char(*c)) {
            ident.push(c);
            self.pos += 1;
        }
        ident
    }

    fn parse_required_ident(&mut self) -> Result<String, SelectorError> {
        let ident = self.parse_ident();
        if ident.is_empty() {
            return Err(self.peek().map_or(SelectorError::Empty, |c| self.unexpected(c)));
        }
        Ok(ident)
    }

    fn parse_attr(&mut self) -> Result<AttrSelector, SelectorError> {
        self.skip_ws();
        let name = self.parse_required_ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op = match self.bump() {
            Some(']') => {
                return Ok(AttrSelector {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                    case_insensitive: false,
                });
            }
            Some('=') => AttrOp::Equals,
            Some(c @ ('*' | '^' | '$' | '~' | '|')) => {
                if self.bump() != Some('=') {
                    return Err(self.unexpected(c));
                }
                match c {
                    '*' => AttrOp::Contains,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    '~' => AttrOp::Word,
                    _ => AttrOp::DashPrefix,
                }
            }
            Some(c) => return Err(self.unexpected(c)),
            None => {
                return Err(SelectorError::Unterminated {
                    input: self.input.to_string(),
                    what: "attribute selector",
                });
            }
        };
        self.skip_ws();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => {
                            return Err(SelectorError::Unterminated {
                                input: self.input.to_string(),
                                what: "string",
                            });
                        }
                    }
                }
                value
            }
            _ => self.parse_required_ident()?,
        };
        self.skip_ws();
        let case_insensitive = if matches!(self.peek(), Some('i' | 'I')) {
            self.pos += 1;
            self.skip_ws();
            true
        } else {
            false
        };
        match self.bump() {
            Some(']') => Ok(AttrSelector {
                name,
                op,
                value,
                case_insensitive,
            }),
            Some(c) => Err(self.unexpected(c)),
            None => Err(SelectorError::Unterminated {
                input: self.input.to_string(),
                what: "attribute selector",
            }),
        }
    }
}

const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

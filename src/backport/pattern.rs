//! Wildcard patterns over slash-separated internal names
//!
//! The pattern language is deliberately small:
//!
//! - `?` matches exactly one character, including `/` and `$`
//! - `*` matches zero or more characters other than `/`
//! - `**` matches zero or more characters of any kind
//! - everything else, `$` included, matches itself
//!
//! Matching is anchored at both ends. Every `*` and `**` captures the text it
//! consumed; captures are numbered from 1 in pattern order and can be
//! substituted into a [`Template`] as `<N>`.

use smallvec::SmallVec;

use crate::common::error::{Error, Result};

/// Byte range of one capture inside the matched candidate
pub type Span = (usize, usize);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    AnyChar,
    Star,
    DoubleStar,
}

/// A compiled wildcard pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
    wildcards: usize,
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl Pattern {
    /// Compile a pattern. Runs of three or more stars are rejected.
    pub fn compile(text: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut wildcards = 0;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    let mut run = 1;
                    while chars.peek() == Some(&'*') {
                        chars.next();
                        run += 1;
                    }
                    if run > 2 {
                        return Err(Error::invalid_pattern(
                            text,
                            format!("run of {} consecutive '*'", run),
                        ));
                    }
                    flush_literal(&mut literal, &mut tokens);
                    tokens.push(if run == 2 { Token::DoubleStar } else { Token::Star });
                    wildcards += 1;
                }
                '?' => {
                    flush_literal(&mut literal, &mut tokens);
                    tokens.push(Token::AnyChar);
                }
                _ => literal.push(c),
            }
        }
        flush_literal(&mut literal, &mut tokens);

        Ok(Self { source: text.to_string(), tokens, wildcards })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of capturing wildcards (`*` and `**`)
    pub fn wildcard_count(&self) -> usize {
        self.wildcards
    }

    /// Match the whole candidate, returning the captures on success
    pub fn matches<'t>(&self, candidate: &'t str) -> Option<Captures<'t>> {
        let mut spans = SmallVec::new();
        let mut dead = DeadStates::new(self, candidate);
        if self.match_from(0, candidate, 0, &mut spans, &mut dead) {
            Some(Captures { candidate, spans })
        } else {
            None
        }
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.matches(candidate).is_some()
    }

    fn match_from(
        &self,
        ti: usize,
        candidate: &str,
        pos: usize,
        spans: &mut SmallVec<[Span; 4]>,
        dead: &mut DeadStates,
    ) -> bool {
        let Some(token) = self.tokens.get(ti) else {
            return pos == candidate.len();
        };
        if dead.contains(ti, pos) {
            return false;
        }
        let matched = match token {
            Token::Literal(text) => {
                candidate[pos..].starts_with(text.as_str())
                    && self.match_from(ti + 1, candidate, pos + text.len(), spans, dead)
            }
            Token::AnyChar => match candidate[pos..].chars().next() {
                Some(c) => self.match_from(ti + 1, candidate, pos + c.len_utf8(), spans, dead),
                None => false,
            },
            Token::Star | Token::DoubleStar => {
                let limit = match token {
                    Token::Star => candidate[pos..].find('/').map_or(candidate.len(), |i| pos + i),
                    _ => candidate.len(),
                };
                let depth = spans.len();
                // Greedy: longest span first, then give back one character at a time
                let mut end = limit;
                loop {
                    if candidate.is_char_boundary(end) {
                        spans.push((pos, end));
                        if self.match_from(ti + 1, candidate, end, spans, dead) {
                            return true;
                        }
                        spans.truncate(depth);
                    }
                    if end == pos {
                        break false;
                    }
                    end -= 1;
                }
            }
        };
        if !matched {
            dead.insert(ti, pos);
        }
        matched
    }
}

/// `(token, position)` pairs already known not to match. Whether the rest
/// of the pattern matches from a state does not depend on earlier captures,
/// so each state is explored at most once.
struct DeadStates {
    width: usize,
    bits: Vec<u64>,
}

impl DeadStates {
    fn new(pattern: &Pattern, candidate: &str) -> Self {
        // A single wildcard never revisits a state
        if pattern.wildcards < 2 {
            return Self { width: 0, bits: Vec::new() };
        }
        let width = candidate.len() + 1;
        let states = pattern.tokens.len() * width;
        Self { width, bits: vec![0; states.div_ceil(64)] }
    }

    fn slot(&self, ti: usize, pos: usize) -> Option<(usize, u64)> {
        if self.width == 0 {
            return None;
        }
        let n = ti * self.width + pos;
        Some((n / 64, 1 << (n % 64)))
    }

    fn contains(&self, ti: usize, pos: usize) -> bool {
        self.slot(ti, pos)
            .is_some_and(|(word, mask)| self.bits[word] & mask != 0)
    }

    fn insert(&mut self, ti: usize, pos: usize) {
        if let Some((word, mask)) = self.slot(ti, pos) {
            self.bits[word] |= mask;
        }
    }
}

fn flush_literal(literal: &mut String, tokens: &mut Vec<Token>) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Spans captured by a successful match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captures<'t> {
    candidate: &'t str,
    spans: SmallVec<[Span; 4]>,
}

impl<'t> Captures<'t> {
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Capture at a 0-based position
    pub fn get(&self, index: usize) -> Option<&'t str> {
        self.spans.get(index).map(|&(start, end)| &self.candidate[start..end])
    }

    pub fn span(&self, index: usize) -> Option<Span> {
        self.spans.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'t str> + '_ {
        self.spans.iter().map(|&(start, end)| &self.candidate[start..end])
    }

    pub fn to_vec(&self) -> Vec<&'t str> {
        self.iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    /// 1-based capture number
    Capture(usize),
}

/// Replacement text with `<N>` capture placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    /// Parse a template whose placeholders may refer to captures
    /// `1..=wildcard_count`. A `<` that does not open `<digits>` is literal.
    pub fn parse(text: &str, wildcard_count: usize) -> Result<Self> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(open) = rest.find('<') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 || !after[digits..].starts_with('>') {
                literal.push('<');
                rest = after;
                continue;
            }
            let number: usize = after[..digits]
                .parse()
                .map_err(|_| Error::invalid_template(text, "capture number out of range"))?;
            if number == 0 || number > wildcard_count {
                return Err(Error::invalid_template(
                    text,
                    format!("<{}> does not name one of {} captures", number, wildcard_count),
                ));
            }
            if !literal.is_empty() {
                parts.push(Part::Text(std::mem::take(&mut literal)));
            }
            parts.push(Part::Capture(number));
            rest = &after[digits + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Text(literal));
        }

        Ok(Self { source: text.to_string(), parts })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Expand the template with the captures of a match
    pub fn substitute(&self, captures: &Captures<'_>) -> String {
        self.render(|n| captures.get(n - 1))
    }

    fn render<'c>(&self, capture: impl Fn(usize) -> Option<&'c str>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Capture(n) => out.push_str(capture(*n).unwrap_or_default()),
            }
        }
        out
    }
}

/// Expand `template` against an explicit capture list
pub fn substitute(template: &str, captures: &[&str]) -> Result<String> {
    let template = Template::parse(template, captures.len())?;
    Ok(template.render(|n| captures.get(n - 1).copied()))
}

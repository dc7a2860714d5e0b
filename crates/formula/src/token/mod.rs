//! Trie tokenizer.
//!
//! Token shapes are registered as chains of [`Matcher`]s and merged into a
//! single trie. The trie is an arena: nodes live in a `Vec` and refer to
//! each other by index, with structurally equal prefixes de-duplicated at
//! insertion time. Matching scans the input left to right; at every
//! position the longest registered match wins, and ties go to the earlier
//! registration.

use std::sync::Arc;

use tracing::trace;

use crate::error::SyntaxError;

pub(crate) const DIGIT_CHARACTERS: &str = "0123456789";
pub(crate) const ALPHA_CHARACTERS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// Characters allowed after the first character of an identifier key.
pub(crate) const KEY_CHARACTERS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_:.#*";

const WHITESPACE_CHARACTERS: &str = " \t\r\n";

/// One step in a token shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Matcher {
    /// Exactly this character.
    Exact(char),
    /// A run of characters drawn from `set`, at least `min` and at most
    /// `max` long (unbounded when `None`). The run is consumed greedily.
    AnyOf {
        set: String,
        min: usize,
        max: Option<usize>,
    },
    /// Everything up to (not including) the next unescaped occurrence of
    /// `terminator`. Matches at least one character.
    AnyUntil {
        terminator: String,
        escape: Option<String>,
    },
}

impl Matcher {
    /// Greedy unbounded repetition with a minimum run length.
    pub fn repeats(self, min: usize) -> Self {
        match self {
            Self::AnyOf { set, .. } => Self::AnyOf {
                set,
                min,
                max: None,
            },
            other => other,
        }
    }

    /// Zero-or-one occurrence.
    pub fn optional(self) -> Self {
        match self {
            Self::AnyOf { set, .. } => Self::AnyOf {
                set,
                min: 0,
                max: Some(1),
            },
            other => other,
        }
    }
}

/// One character drawn from `set`.
pub(crate) fn any_of(set: impl Into<String>) -> Matcher {
    Matcher::AnyOf {
        set: set.into(),
        min: 1,
        max: Some(1),
    }
}

/// Everything up to the next unescaped `terminator`.
pub(crate) fn any_until(terminator: impl Into<String>, escape: Option<&str>) -> Matcher {
    Matcher::AnyUntil {
        terminator: terminator.into(),
        escape: escape.map(str::to_string),
    }
}

/// The characters of `text`, one exact matcher each.
pub(crate) fn exact_text(text: &str) -> Vec<Matcher> {
    text.chars().map(Matcher::Exact).collect()
}

/// A delimited literal: `open`, then anything up to an unescaped `close`,
/// then `close`.
pub(crate) fn literal(open: &str, close: &str, escape: Option<&str>) -> Vec<Matcher> {
    let mut matchers = exact_text(open);
    matchers.push(any_until(close, escape));
    matchers.extend(exact_text(close));
    matchers
}

/// An unsigned digit run. Signs are left to the grammar's operators so that
/// `5-3` stays three tokens.
pub(crate) fn integer() -> Vec<Matcher> {
    vec![any_of(DIGIT_CHARACTERS).repeats(1)]
}

/// Digit run, point, digit run.
pub(crate) fn decimal() -> Vec<Matcher> {
    vec![
        any_of(DIGIT_CHARACTERS).repeats(1),
        Matcher::Exact('.'),
        any_of(DIGIT_CHARACTERS).repeats(1),
    ]
}

type Mapper<T> = Arc<dyn Fn(&str) -> Option<T> + Send + Sync>;
type NodeId = usize;

struct Node {
    matcher: Matcher,
    children: Vec<NodeId>,
    /// Index into the mapper table when a token shape ends here.
    emit: Option<usize>,
}

/// The assembled trie. `T` is whatever the registered mappers produce; a
/// mapper returning `None` discards the matched text (whitespace).
pub(crate) struct TokenTree<T> {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    mappers: Vec<Mapper<T>>,
}

impl<T> Default for TokenTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TokenTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            mappers: Vec::new(),
        }
    }

    /// Registers whitespace runs as discarded tokens.
    pub fn ignore_whitespace(&mut self) {
        self.add_branch(vec![any_of(WHITESPACE_CHARACTERS).repeats(1)], |_| None);
    }

    /// Registers one token shape. The mapper receives the matched text.
    pub fn add_branch(
        &mut self,
        matchers: Vec<Matcher>,
        mapper: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
    ) {
        debug_assert!(!matchers.is_empty());
        let mapper_id = self.mappers.len();
        self.mappers.push(Arc::new(mapper));

        let mut current: Option<NodeId> = None;
        for matcher in matchers {
            let id = self.child_for(current, &matcher);
            current = Some(id);
        }
        if let Some(id) = current {
            // The earlier registration keeps the emit slot on a shared tail.
            let node = &mut self.nodes[id];
            if node.emit.is_none() {
                node.emit = Some(mapper_id);
            }
        }
    }

    /// Finds a structurally equal child of `parent` (or root) or inserts one.
    fn child_for(&mut self, parent: Option<NodeId>, matcher: &Matcher) -> NodeId {
        let siblings = match parent {
            Some(id) => &self.nodes[id].children,
            None => &self.roots,
        };
        if let Some(&existing) = siblings
            .iter()
            .find(|&&id| self.nodes[id].matcher == *matcher)
        {
            return existing;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            matcher: matcher.clone(),
            children: Vec::new(),
            emit: None,
        });
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Splits `text` into tokens, or reports the first unmatched character.
    pub fn tokenize(&self, text: &str) -> Result<Vec<T>, SyntaxError> {
        let chars: Vec<char> = text.chars().collect();
        let byte_offsets: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain([text.len()])
            .collect();

        let mut tokens = Vec::new();
        let mut pos = 0;
        while pos < chars.len() {
            let mut best: Option<(usize, usize)> = None;
            self.walk(&self.roots, &chars, pos, &mut best);
            let Some((end, mapper)) = best else {
                return Err(SyntaxError::new(
                    pos,
                    text,
                    format!("did not expect character '{}'", chars[pos]),
                ));
            };
            let matched = &text[byte_offsets[pos]..byte_offsets[end]];
            if let Some(token) = (self.mappers[mapper])(matched) {
                tokens.push(token);
            }
            pos = end;
        }
        trace!(count = tokens.len(), "tokenized input");
        Ok(tokens)
    }

    fn walk(
        &self,
        children: &[NodeId],
        chars: &[char],
        pos: usize,
        best: &mut Option<(usize, usize)>,
    ) {
        for &id in children {
            let node = &self.nodes[id];
            let Some(consumed) = match_at(&node.matcher, chars, pos) else {
                continue;
            };
            let end = pos + consumed;
            self.walk(&node.children, chars, end, best);
            if let Some(mapper) = node.emit {
                let improves = match *best {
                    None => true,
                    Some((best_end, best_mapper)) => {
                        end > best_end || (end == best_end && mapper < best_mapper)
                    }
                };
                if improves {
                    *best = Some((end, mapper));
                }
            }
        }
    }
}

/// How many characters `matcher` consumes at `pos`, if it matches at all.
fn match_at(matcher: &Matcher, chars: &[char], pos: usize) -> Option<usize> {
    match matcher {
        Matcher::Exact(expected) => (chars.get(pos) == Some(expected)).then_some(1),
        Matcher::AnyOf { set, min, max } => {
            let mut run = 0;
            while max.is_none_or(|cap| run < cap)
                && chars.get(pos + run).is_some_and(|c| set.contains(*c))
            {
                run += 1;
            }
            (run >= *min).then_some(run)
        }
        Matcher::AnyUntil { terminator, escape } => {
            let terminator: Vec<char> = terminator.chars().collect();
            let escape: Option<Vec<char>> = escape.as_ref().map(|e| e.chars().collect());
            let mut at = pos;
            while at + terminator.len() <= chars.len() {
                if chars[at..at + terminator.len()] == terminator[..]
                    && !is_escaped(chars, at, terminator.len(), escape.as_deref())
                {
                    return (at > pos).then_some(at - pos);
                }
                at += 1;
            }
            None
        }
    }
}

/// A terminator occurrence is escaped when the escape string ends exactly
/// where the terminator does.
fn is_escaped(chars: &[char], at: usize, terminator_len: usize, escape: Option<&[char]>) -> bool {
    let Some(escape) = escape else {
        return false;
    };
    let end = at + terminator_len;
    end >= escape.len() && chars[end - escape.len()..end] == *escape
}

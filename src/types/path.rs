//! Tree paths for compaction references.
//!
//! A path addresses a node of the persisted tree from its root, e.g.
//! `$.modules[3].source`. Plain identifier keys render dotted; anything else
//! renders bracket-quoted (`$["a key"]`), with `\` escaping inside quotes.
//! Rendering and parsing are symmetric.

use std::fmt;

/// One step of a tree path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathKey {
    /// Member key of a mapping or instance props.
    Key(String),
    /// Element index of a sequence.
    Index(usize),
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Path from the persisted tree's root to one of its nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TreePath(Vec<PathKey>);

/// Error parsing a rendered tree path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreePathParseError {
    /// Reference text did not start with `$`.
    #[error("path reference must start with '$': {0:?}")]
    MissingRoot(String),
    /// A character that fits no segment form.
    #[error("unexpected {ch:?} at byte {at} in path reference")]
    Unexpected {
        /// Offending character.
        ch: char,
        /// Byte offset into the reference text.
        at: usize,
    },
    /// A bracket or quoted segment never closed.
    #[error("unterminated segment in path reference: {0:?}")]
    Unterminated(String),
    /// A dotted segment with no key characters.
    #[error("empty key segment in path reference: {0:?}")]
    EmptyKey(String),
    /// A bracket index that does not fit a sequence index.
    #[error("invalid sequence index in path reference: {0:?}")]
    BadIndex(String),
}

impl TreePath {
    /// The root path, `$`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Path extended by one step.
    pub fn child(&self, key: impl Into<PathKey>) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.into());
        Self(segments)
    }

    /// The steps from the root.
    pub fn segments(&self) -> &[PathKey] {
        &self.0
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Render to reference text, e.g. `$.a[0]["b c"]`.
    pub fn render(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.0 {
            match segment {
                PathKey::Key(key) if is_plain_ident(key) => {
                    out.push('.');
                    out.push_str(key);
                }
                PathKey::Key(key) => {
                    out.push_str("[\"");
                    for ch in key.chars() {
                        if ch == '"' || ch == '\\' {
                            out.push('\\');
                        }
                        out.push(ch);
                    }
                    out.push_str("\"]");
                }
                PathKey::Index(index) => {
                    out.push('[');
                    out.push_str(&index.to_string());
                    out.push(']');
                }
            }
        }
        out
    }

    /// Parse reference text produced by [`TreePath::render`].
    pub fn parse(text: &str) -> Result<Self, TreePathParseError> {
        let mut chars = text.char_indices().peekable();
        match chars.next() {
            Some((_, '$')) => {}
            _ => return Err(TreePathParseError::MissingRoot(text.to_string())),
        }

        let mut segments = Vec::new();
        while let Some((at, ch)) = chars.next() {
            match ch {
                '.' => {
                    let mut key = String::new();
                    while let Some(&(_, c)) = chars.peek() {
                        if c == '.' || c == '[' {
                            break;
                        }
                        key.push(c);
                        chars.next();
                    }
                    if key.is_empty() {
                        return Err(TreePathParseError::EmptyKey(text.to_string()));
                    }
                    segments.push(PathKey::Key(key));
                }
                '[' => match chars.peek() {
                    Some(&(_, '"')) => {
                        chars.next();
                        let mut key = String::new();
                        let mut closed = false;
                        while let Some((_, c)) = chars.next() {
                            match c {
                                '\\' => match chars.next() {
                                    Some((_, escaped)) => key.push(escaped),
                                    None => {
                                        return Err(TreePathParseError::Unterminated(
                                            text.to_string(),
                                        ))
                                    }
                                },
                                '"' => {
                                    closed = true;
                                    break;
                                }
                                other => key.push(other),
                            }
                        }
                        if !closed {
                            return Err(TreePathParseError::Unterminated(text.to_string()));
                        }
                        match chars.next() {
                            Some((_, ']')) => segments.push(PathKey::Key(key)),
                            Some((at, ch)) => {
                                return Err(TreePathParseError::Unexpected { ch, at })
                            }
                            None => {
                                return Err(TreePathParseError::Unterminated(text.to_string()))
                            }
                        }
                    }
                    Some(&(_, c)) if c.is_ascii_digit() => {
                        let mut digits = String::new();
                        while let Some(&(_, c)) = chars.peek() {
                            if c.is_ascii_digit() {
                                digits.push(c);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        match chars.next() {
                            Some((_, ']')) => {
                                let index = digits.parse().map_err(|_| {
                                    TreePathParseError::BadIndex(text.to_string())
                                })?;
                                segments.push(PathKey::Index(index));
                            }
                            Some((at, ch)) => {
                                return Err(TreePathParseError::Unexpected { ch, at })
                            }
                            None => {
                                return Err(TreePathParseError::Unterminated(text.to_string()))
                            }
                        }
                    }
                    Some(&(at, ch)) => return Err(TreePathParseError::Unexpected { ch, at }),
                    None => return Err(TreePathParseError::Unterminated(text.to_string())),
                },
                other => return Err(TreePathParseError::Unexpected { ch: other, at }),
            }
        }
        Ok(Self(segments))
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

fn is_plain_ident(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

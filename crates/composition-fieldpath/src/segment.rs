use std::{fmt::Display, num::ParseIntError, ops::Deref, str::FromStr};

use snafu::{ResultExt, Snafu, ensure};

/// The field name used for wildcards, e.g. `spec.containers[*].name`.
pub const WILDCARD: &str = "*";

/// Error variants which can be encountered when parsing a field path.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseError {
    #[snafu(display("field path cannot be empty"))]
    EmptyInput,

    #[snafu(display("unexpected empty field name at position {position}"))]
    EmptyField { position: usize },

    #[snafu(display("unexpected empty brackets at position {position}"))]
    EmptyBrackets { position: usize },

    #[snafu(display("unterminated bracket starting at position {position}"))]
    UnterminatedBracket { position: usize },

    #[snafu(display("unterminated quote starting at position {position}"))]
    UnterminatedQuote { position: usize },

    #[snafu(display("unexpected character {character:?} at position {position}"))]
    UnexpectedCharacter { character: char, position: usize },

    #[snafu(display("failed to parse array index {input:?}"))]
    ParseIndex {
        source: ParseIntError,
        input: String,
    },
}

/// A single segment of a field path.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    /// Accesses a field of an object, e.g. `spec` in `spec.replicas`.
    Field(String),

    /// Accesses an element of an array, e.g. `0` in `spec.containers[0]`.
    Index(u32),
}

impl Segment {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    /// Returns `true` if this segment is the `*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Field(name) if name == WILDCARD)
    }
}

/// An ordered list of field path [`Segment`]s.
///
/// The [`Display`] implementation renders the canonical field path, which can
/// be parsed again into the same list of segments.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Segments(Vec<Segment>);

impl Deref for Segments {
    type Target = [Segment];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Segment>> for Segments {
    fn from(value: Vec<Segment>) -> Self {
        Self(value)
    }
}

impl IntoIterator for Segments {
    type IntoIter = std::vec::IntoIter<Segment>;
    type Item = Segment;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Segments {
    /// Returns the first `len` segments. Requesting more segments than
    /// available returns all of them.
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0.iter().take(len).cloned().collect())
    }
}

impl FromStr for Segments {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse(input)
    }
}

impl Display for Segments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Field(name) if name == WILDCARD => write!(f, "[*]")?,
                Segment::Field(name) if name.contains(']') => write!(f, "['{name}']")?,
                Segment::Field(name) if name.is_empty() || name.contains(['.', '[']) => {
                    write!(f, "[{name}]")?
                }
                Segment::Field(name) if i == 0 => write!(f, "{name}")?,
                Segment::Field(name) => write!(f, ".{name}")?,
            }
        }

        Ok(())
    }
}

/// Parses `input` into a list of [`Segments`].
///
/// ```
/// use composition_fieldpath::{parse, Segment};
///
/// let segments = parse("spec.containers[0]['image.name']").expect("valid field path");
/// assert_eq!(
///     segments.to_vec(),
///     vec![
///         Segment::field("spec"),
///         Segment::field("containers"),
///         Segment::Index(0),
///         Segment::field("image.name"),
///     ]
/// );
/// ```
pub fn parse(input: &str) -> Result<Segments, ParseError> {
    ensure!(!input.is_empty(), EmptyInputSnafu);

    let chars: Vec<char> = input.chars().collect();
    let mut segments = Vec::new();
    let mut position = 0;

    // A leading field doesn't need a dot
    if chars[0] != '[' {
        let (name, next) = read_field(&chars, 0)?;
        segments.push(Segment::Field(name));
        position = next;
    }

    while position < chars.len() {
        match chars[position] {
            '.' => {
                let (name, next) = read_field(&chars, position + 1)?;
                segments.push(Segment::Field(name));
                position = next;
            }
            '[' => {
                let (segment, next) = read_bracket(&chars, position)?;
                segments.push(segment);
                position = next;
            }
            character => return UnexpectedCharacterSnafu { character, position }.fail(),
        }
    }

    Ok(Segments(segments))
}

/// Reads a dotted field name starting at `start` and returns it together with
/// the position of the next unread character.
fn read_field(chars: &[char], start: usize) -> Result<(String, usize), ParseError> {
    let mut end = start;

    while end < chars.len() && !matches!(chars[end], '.' | '[') {
        ensure!(
            chars[end] != ']',
            UnexpectedCharacterSnafu {
                character: ']',
                position: end
            }
        );
        end += 1;
    }

    ensure!(end > start, EmptyFieldSnafu { position: start });
    Ok((chars[start..end].iter().collect(), end))
}

/// Reads a bracketed index or key. `start` points at the opening bracket.
fn read_bracket(chars: &[char], start: usize) -> Result<(Segment, usize), ParseError> {
    let content_start = start + 1;

    if let Some(quote @ ('\'' | '"')) = chars.get(content_start).copied() {
        let key_start = content_start + 1;
        let key_end = chars[key_start..]
            .iter()
            .position(|c| *c == quote)
            .map(|offset| key_start + offset)
            .ok_or(ParseError::UnterminatedQuote {
                position: content_start,
            })?;

        match chars.get(key_end + 1) {
            Some(']') => {}
            Some(character) => {
                return UnexpectedCharacterSnafu {
                    character: *character,
                    position: key_end + 1,
                }
                .fail();
            }
            None => return UnterminatedBracketSnafu { position: start }.fail(),
        }

        let key = chars[key_start..key_end].iter().collect();
        return Ok((Segment::Field(key), key_end + 2));
    }

    let content_end = chars[content_start..]
        .iter()
        .position(|c| *c == ']')
        .map(|offset| content_start + offset)
        .ok_or(ParseError::UnterminatedBracket { position: start })?;

    ensure!(
        content_end > content_start,
        EmptyBracketsSnafu { position: start }
    );

    let content: String = chars[content_start..content_end].iter().collect();
    let segment = if content.chars().all(|c| c.is_ascii_digit()) {
        let index = content
            .parse::<u32>()
            .context(ParseIndexSnafu { input: &content })?;
        Segment::Index(index)
    } else {
        Segment::Field(content)
    };

    Ok((segment, content_end + 1))
}

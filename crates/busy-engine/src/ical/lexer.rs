//! Content-line lexing and component nesting for RFC 5545 text.
//!
//! Turns raw feed text into a tree of [`Component`]s. Only the structure is
//! validated here; property values are interpreted by the caller.

use crate::error::ParseError;

/// A single unfolded content line: `NAME;PARAM=VALUE:value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentLine {
    /// Upper-cased property name.
    pub name: String,
    /// Upper-cased parameter names with unquoted values.
    pub params: Vec<(String, String)>,
    pub value: String,
    /// 1-based physical line number where the content line starts.
    pub line: usize,
}

impl ContentLine {
    pub fn parse(line: usize, raw: &str) -> Result<Self, ParseError> {
        let malformed = || ParseError::MalformedLine {
            line,
            content: raw.chars().take(80).collect(),
        };

        let (head, value) = split_unquoted(raw, ':').ok_or_else(malformed)?;
        let mut parts = split_all_unquoted(head, ';').into_iter();
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(malformed());
        }

        let mut params = Vec::new();
        for part in parts {
            let (key, val) = part.split_once('=').ok_or_else(malformed)?;
            params.push((key.trim().to_ascii_uppercase(), unquote(val.trim()).to_string()));
        }

        Ok(Self {
            name: name.to_ascii_uppercase(),
            params,
            value: value.to_string(),
            line,
        })
    }

    /// Value of the first parameter named `name` (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A `BEGIN:X` ... `END:X` block with its properties and sub-components.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Component {
    pub name: String,
    pub properties: Vec<ContentLine>,
    pub children: Vec<Component>,
}

impl Component {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn property(&self, name: &str) -> Option<&ContentLine> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn properties<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ContentLine> + 'a {
        self.properties.iter().filter(move |p| p.name == name)
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Component> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Join folded lines (a line break followed by a space or tab continues the
/// previous line). Returns each logical line with its starting line number.
pub(crate) fn unfold(text: &str) -> Vec<(usize, String)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines: Vec<(usize, String)> = Vec::new();

    for (idx, physical) in text.lines().enumerate() {
        if let Some(rest) = physical.strip_prefix([' ', '\t']) {
            if let Some((_, last)) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push((idx + 1, physical.to_string()));
    }

    lines
}

/// Parse the feed into its top-level components.
///
/// # Errors
/// Returns [`ParseError`] for malformed content lines, unbalanced
/// `BEGIN`/`END` pairs, or properties outside of any component.
pub(crate) fn parse_components(text: &str) -> Result<Vec<Component>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut stack: Vec<Component> = Vec::new();
    let mut roots = Vec::new();

    for (line_no, raw) in unfold(text) {
        if raw.trim().is_empty() {
            continue;
        }
        let line = ContentLine::parse(line_no, &raw)?;

        match line.name.as_str() {
            "BEGIN" => stack.push(Component::new(line.value.trim().to_ascii_uppercase())),
            "END" => {
                let found = line.value.trim().to_ascii_uppercase();
                let component = stack.pop().ok_or_else(|| ParseError::UnexpectedEnd {
                    line: line_no,
                    found: found.clone(),
                })?;
                if component.name != found {
                    return Err(ParseError::MismatchedEnd {
                        line: line_no,
                        expected: component.name,
                        found,
                    });
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(component),
                    None => roots.push(component),
                }
            }
            _ => match stack.last_mut() {
                Some(component) => component.properties.push(line),
                None => {
                    return Err(ParseError::MalformedLine {
                        line: line_no,
                        content: raw.chars().take(80).collect(),
                    })
                }
            },
        }
    }

    if let Some(open) = stack.pop() {
        return Err(ParseError::Unterminated(open.name));
    }

    Ok(roots)
}

/// Split at the first `sep` that is not inside double quotes.
fn split_unquoted(s: &str, sep: char) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    for (idx, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => return Some((&s[..idx], &s[idx + c.len_utf8()..])),
            _ => {}
        }
    }
    None
}

fn split_all_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some((head, tail)) = split_unquoted(rest, sep) {
        parts.push(head);
        rest = tail;
    }
    parts.push(rest);
    parts
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}

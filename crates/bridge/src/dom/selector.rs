//! A small CSS selector subset.
//!
//! Supported: type (`div`), universal (`*`), `#id`, `.class`, `[attr]`,
//! `[attr=value]` (quoted or bare), descendant and child (`>`) combinators,
//! and comma-separated lists. Anything else is a parse error, which the
//! bridge reports as `BAD_SELECTOR`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
	#[error("empty selector")]
	Empty,
	#[error("unexpected character {0:?} at {1}")]
	Unexpected(char, usize),
	#[error("unterminated attribute selector")]
	UnterminatedAttribute,
	#[error("dangling combinator")]
	DanglingCombinator,
}

/// Relationship between a compound and the one to its left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
	Descendant,
	Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
	pub name: String,
	pub value: Option<String>,
}

/// One compound selector such as `div#main.note[data-x=1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
	pub tag: Option<String>,
	pub id: Option<String>,
	pub classes: Vec<String>,
	pub attrs: Vec<AttrSelector>,
}

/// Compounds joined by combinators. `parts[0]` is leftmost; each later part
/// carries the combinator linking it to the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Complex {
	pub parts: Vec<(Combinator, Compound)>,
}

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
	pub alternatives: Vec<Complex>,
}

impl Selector {
	pub fn parse(input: &str) -> Result<Self, SelectorError> {
		let mut alternatives = Vec::new();
		for part in input.split(',') {
			alternatives.push(parse_complex(part)?);
		}
		Ok(Self { alternatives })
	}
}

fn is_ident_char(c: char) -> bool {
	c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_complex(input: &str) -> Result<Complex, SelectorError> {
	let chars: Vec<char> = input.chars().collect();
	let mut i = 0;
	let mut parts: Vec<(Combinator, Compound)> = Vec::new();
	let mut pending = Combinator::Descendant;
	let mut saw_child = false;

	while i < chars.len() {
		let c = chars[i];
		if c.is_whitespace() {
			i += 1;
			continue;
		}
		if c == '>' {
			if parts.is_empty() || saw_child {
				return Err(SelectorError::Unexpected(c, i));
			}
			pending = Combinator::Child;
			saw_child = true;
			i += 1;
			continue;
		}
		let (compound, next) = parse_compound(&chars, i)?;
		parts.push((pending, compound));
		pending = Combinator::Descendant;
		saw_child = false;
		i = next;
	}

	if saw_child {
		return Err(SelectorError::DanglingCombinator);
	}
	if parts.is_empty() {
		return Err(SelectorError::Empty);
	}
	Ok(Complex { parts })
}

fn read_ident(chars: &[char], mut i: usize) -> (String, usize) {
	let start = i;
	while i < chars.len() && is_ident_char(chars[i]) {
		i += 1;
	}
	(chars[start..i].iter().collect(), i)
}

fn parse_compound(chars: &[char], mut i: usize) -> Result<(Compound, usize), SelectorError> {
	let mut compound = Compound::default();
	let mut any = false;

	if chars[i] == '*' {
		i += 1;
		any = true;
	} else if is_ident_char(chars[i]) {
		let (tag, next) = read_ident(chars, i);
		compound.tag = Some(tag.to_ascii_lowercase());
		i = next;
		any = true;
	}

	while i < chars.len() {
		match chars[i] {
			'#' | '.' => {
				let sigil = chars[i];
				let (name, next) = read_ident(chars, i + 1);
				if name.is_empty() {
					return Err(SelectorError::Unexpected(sigil, i));
				}
				if sigil == '#' {
					compound.id = Some(name);
				} else {
					compound.classes.push(name);
				}
				i = next;
			}
			'[' => {
				let close = chars[i..]
					.iter()
					.position(|c| *c == ']')
					.map(|p| p + i)
					.ok_or(SelectorError::UnterminatedAttribute)?;
				let inner: String = chars[i + 1..close].iter().collect();
				compound.attrs.push(parse_attr(&inner, i)?);
				i = close + 1;
			}
			c if c.is_whitespace() || c == '>' => break,
			c => return Err(SelectorError::Unexpected(c, i)),
		}
		any = true;
	}

	if !any {
		return Err(SelectorError::Unexpected(chars[i.min(chars.len() - 1)], i));
	}
	Ok((compound, i))
}

fn parse_attr(inner: &str, at: usize) -> Result<AttrSelector, SelectorError> {
	let (name, value) = match inner.split_once('=') {
		Some((name, value)) => {
			let value = value.trim();
			let unquoted = value
				.strip_prefix('"')
				.and_then(|v| v.strip_suffix('"'))
				.or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
				.unwrap_or(value);
			(name.trim(), Some(unquoted.to_string()))
		}
		None => (inner.trim(), None),
	};
	if name.is_empty() || !name.chars().all(is_ident_char) {
		return Err(SelectorError::Unexpected('[', at));
	}
	Ok(AttrSelector {
		name: name.to_ascii_lowercase(),
		value,
	})
}

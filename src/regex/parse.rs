//! Pattern → postfix.
//!
//! A recursive descent over the Vim dialect: branches split on `\|`, concats
//! on `\&`, pieces are atoms with an optional multi. Magicness (`\m \M \v \V`)
//! decides which characters are metacharacters bare and which need a
//! backslash; the scanner resolves that before the grammar ever looks at a
//! character. Counted repeats are expanded here by re-emitting the atom's
//! postfix slice, so the NFA stage never sees `\{n,m}`.
use crate::error::{EditorError, Result};

use super::{ClassKind, CompFlags, Cmp, LookKind, NSUBEXP, Op, PosixClass};

/// One element of the postfix program.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PostItem {
	/// An atom that becomes exactly one NFA state
	State(Op),
	Concat,
	Or,
	Star { greedy: bool },
	Quest { greedy: bool },
	/// `\(..\)`, `\z(..\)`, `\%(..\)`, and composing-char wrappers
	Group { open: Op, close: Op },
	/// Look-around wrapping the previous atom; `off` caps look-behind bytes
	Look { kind: LookKind, off: usize },
	/// `\@>`: match the previous atom like a full pattern (atomic group)
	Pattern,
	/// `\%[abc]`: pop that many optional atoms
	OptChars(usize),
	Empty,
}

#[derive(Debug)]
pub(crate) struct Parsed {
	pub post: Vec<PostItem>,
	pub nsubexp: usize,
	pub has_backref: bool,
	pub has_zsubexpr: bool,
	pub has_zend: bool,
}

/// Magic levels, lowest to highest: `\V` `\M` `\m` `\v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Magic {
	None,
	Off,
	On,
	All,
}

/// Minimal magic level at which `c` is special without a backslash.
fn magic_threshold(c: char) -> Magic {
	match c {
		'^' | '$' => Magic::Off,
		'.' | '[' | '*' | '~' => Magic::On,
		'(' | ')' | '|' | '&' | '+' | '=' | '?' | '{' | '}' | '@' | '%' | '<' | '>' => Magic::All,
		_ => Magic::All, // other punctuation is never special bare below \v
	}
}

fn is_special_bare(c: char, level: Magic) -> bool {
	if c.is_alphanumeric() || c == '_' {
		return false;
	}
	level >= magic_threshold(c)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok {
	/// Literal codepoint
	Lit(char),
	/// Active metacharacter, canonical form
	Meta(char),
	/// Backslash-letter escape (`\d`, `\z`, `\1`, `\_` ...), letter kept raw
	Esc(char),
}

struct Parser<'a> {
	pattern: &'a str,
	chars: Vec<char>,
	pos: usize,
	magic: Magic,
	icase: bool,
	post: Vec<PostItem>,
	paren: usize,
	zparen: usize,
	has_backref: bool,
	has_zsubexpr: bool,
	has_zend: bool,
}

pub(crate) fn parse_pattern(pattern: &str, flags: CompFlags) -> Result<Parsed> {
	let mut p = Parser {
		pattern,
		chars: pattern.chars().collect(),
		pos: 0,
		magic: if flags.magic { Magic::On } else { Magic::Off },
		icase: flags.ignorecase,
		post: Vec::with_capacity(pattern.len() * 2 + 8),
		paren: 0,
		zparen: 0,
		has_backref: false,
		has_zsubexpr: false,
		has_zend: false,
	};
	p.reg(true)?;
	if p.pos < p.chars.len() {
		return Err(p.err("unmatched \\)"));
	}
	// the whole pattern is submatch 0
	p.post.push(PostItem::Group { open: Op::Mopen(0), close: Op::Mclose(0) });
	Ok(Parsed {
		post: p.post,
		nsubexp: p.paren + 1,
		has_backref: p.has_backref,
		has_zsubexpr: p.has_zsubexpr,
		has_zend: p.has_zend,
	})
}

impl Parser<'_> {
	fn err(&self, msg: &str) -> EditorError {
		EditorError::RegexCompile(format!("{msg} in \"{}\"", self.pattern))
	}

	fn save(&self) -> (usize, Magic) {
		(self.pos, self.magic)
	}

	fn restore(&mut self, state: (usize, Magic)) {
		self.pos = state.0;
		self.magic = state.1;
	}

	/// Raw character access, no magic interpretation.
	fn raw_peek(&self) -> Option<char> {
		self.chars.get(self.pos).copied()
	}

	fn raw_next(&mut self) -> Option<char> {
		let c = self.raw_peek()?;
		self.pos += 1;
		Some(c)
	}

	/// Read the next magic-resolved token, applying `\m \M \v \V` on the way.
	fn next_tok(&mut self) -> Result<Option<Tok>> {
		loop {
			let Some(c) = self.raw_next() else {
				return Ok(None);
			};
			if c != '\\' {
				return Ok(Some(if is_special_bare(c, self.magic) {
					Tok::Meta(c)
				} else {
					Tok::Lit(c)
				}));
			}
			let Some(c2) = self.raw_next() else {
				return Err(self.err("trailing backslash"));
			};
			match c2 {
				'm' => self.magic = Magic::On,
				'M' => self.magic = Magic::Off,
				'v' => self.magic = Magic::All,
				'V' => self.magic = Magic::None,
				_ if c2.is_alphanumeric() || c2 == '_' => return Ok(Some(Tok::Esc(c2))),
				_ => {
					// escaping flips specialness
					return Ok(Some(if is_special_bare(c2, self.magic) {
						Tok::Lit(c2)
					} else {
						Tok::Meta(c2)
					}));
				}
			}
		}
	}

	fn peek_tok(&mut self) -> Result<Option<Tok>> {
		let state = self.save();
		let tok = self.next_tok()?;
		self.restore(state);
		Ok(tok)
	}

	/// pattern ::= branch ( \| branch )*
	fn reg(&mut self, toplevel: bool) -> Result<()> {
		self.branch(toplevel)?;
		while self.peek_tok()? == Some(Tok::Meta('|')) {
			self.next_tok()?;
			self.branch(toplevel)?;
			self.post.push(PostItem::Or);
		}
		Ok(())
	}

	/// branch ::= concat ( \& concat )*
	///
	/// `A\&B` turns the left concat into a zero-width check: the postfix is the
	/// left fragment wrapped invisible-group style, then the right concat.
	fn branch(&mut self, toplevel: bool) -> Result<()> {
		self.concat(toplevel)?;
		while self.peek_tok()? == Some(Tok::Meta('&')) {
			self.next_tok()?;
			self.post.push(PostItem::Group { open: Op::Nopen, close: Op::Nclose });
			self.post.push(PostItem::Look { kind: LookKind::Ahead, off: 0 });
			self.concat(toplevel)?;
			self.post.push(PostItem::Concat);
		}
		Ok(())
	}

	/// concat ::= piece+
	fn concat(&mut self, toplevel: bool) -> Result<()> {
		let mut first = true;
		loop {
			match self.peek_tok()? {
				None | Some(Tok::Meta('|' | '&')) => break,
				Some(Tok::Meta(')')) => {
					if toplevel {
						return Err(self.err("unmatched \\)"));
					}
					break;
				}
				_ => {}
			}
			let emitted = self.piece(first)?;
			if emitted && !first {
				self.post.push(PostItem::Concat);
			}
			if emitted {
				first = false;
			}
		}
		if first {
			// empty concat (e.g. "a\|") still needs a fragment
			self.post.push(PostItem::Empty);
		}
		Ok(())
	}

	/// piece ::= atom multi?
	///
	/// Returns false when the atom produced nothing (a magic-set token).
	fn piece(&mut self, at_branch_start: bool) -> Result<bool> {
		let atom_start = self.post.len();
		if !self.atom(at_branch_start)? {
			return Ok(false);
		}
		match self.peek_tok()? {
			Some(Tok::Meta('*')) => {
				self.next_tok()?;
				self.post.push(PostItem::Star { greedy: true });
			}
			Some(Tok::Meta('+')) => {
				self.next_tok()?;
				// "a\+" is "aa*"
				let atom: Vec<PostItem> = self.post[atom_start..].to_vec();
				self.post.extend(atom);
				self.post.push(PostItem::Star { greedy: true });
				self.post.push(PostItem::Concat);
			}
			Some(Tok::Meta('=' | '?')) => {
				self.next_tok()?;
				self.post.push(PostItem::Quest { greedy: true });
			}
			Some(Tok::Meta('{')) => {
				self.next_tok()?;
				self.counted_repeat(atom_start)?;
			}
			Some(Tok::Meta('@')) => {
				self.next_tok()?;
				self.lookaround()?;
			}
			_ => {}
		}
		// a multi may not follow a multi ("a**" is an error)
		if let Some(Tok::Meta(c @ ('*' | '+' | '=' | '?' | '{' | '@'))) = self.peek_tok()? {
			return Err(self.err(&format!("misplaced {c}")));
		}
		Ok(true)
	}

	/// `\{n,m}` handling: re-emit the atom's postfix slice up to `maxval`
	/// times, making copies beyond `minval` optional.
	fn counted_repeat(&mut self, atom_start: usize) -> Result<()> {
		let mut greedy = true;
		if self.raw_peek() == Some('-') {
			self.raw_next();
			greedy = false;
		}
		let minval = self.read_decimal();
		let maxval = if self.raw_peek() == Some(',') {
			self.raw_next();
			self.read_decimal()
		} else {
			minval
		};
		// closing "}" or "\}"
		match self.raw_next() {
			Some('}') => {}
			Some('\\') if self.raw_next() == Some('}') => {}
			_ => return Err(self.err("missing } after \\{")),
		}
		let minval = minval.unwrap_or(0);
		let atom: Vec<PostItem> = self.post[atom_start..].to_vec();
		match maxval {
			None => {
				// "{n,}": n copies then a star
				if minval == 0 {
					self.post.push(PostItem::Star { greedy });
					return Ok(());
				}
				for _ in 1..minval {
					self.post.extend(atom.iter().cloned());
					self.post.push(PostItem::Concat);
				}
				self.post.extend(atom.iter().cloned());
				self.post.push(PostItem::Star { greedy });
				self.post.push(PostItem::Concat);
			}
			Some(maxval) => {
				if maxval < minval {
					return Err(self.err("reverse range in \\{}"));
				}
				if maxval == 0 {
					// atom repeated zero times: drop it, match empty
					self.post.truncate(atom_start);
					self.post.push(PostItem::Empty);
					return Ok(());
				}
				// build right-to-left: a{2,4} = a a (a (a)?)?
				self.post.truncate(atom_start);
				for i in 0..maxval {
					self.post.extend(atom.iter().cloned());
					if i + 1 > minval {
						self.post.push(PostItem::Quest { greedy });
					}
					if i > 0 {
						self.post.push(PostItem::Concat);
					}
				}
			}
		}
		Ok(())
	}

	fn lookaround(&mut self) -> Result<()> {
		// optional byte cap: "\@2<=" limits how far back to try
		let cap = self.read_decimal().unwrap_or(0);
		match self.raw_next() {
			Some('=') => self.post.push(PostItem::Look { kind: LookKind::Ahead, off: 0 }),
			Some('!') => self.post.push(PostItem::Look { kind: LookKind::AheadNeg, off: 0 }),
			Some('>') => self.post.push(PostItem::Pattern),
			Some('<') => match self.raw_next() {
				Some('=') => self.post.push(PostItem::Look { kind: LookKind::Behind, off: cap }),
				Some('!') => self.post.push(PostItem::Look { kind: LookKind::BehindNeg, off: cap }),
				_ => return Err(self.err("invalid character after \\@<")),
			},
			_ => return Err(self.err("invalid character after \\@")),
		}
		Ok(())
	}

	fn read_decimal(&mut self) -> Option<usize> {
		let mut got = false;
		let mut n: usize = 0;
		while let Some(c) = self.raw_peek() {
			let Some(d) = c.to_digit(10) else { break };
			self.raw_next();
			got = true;
			n = n.saturating_mul(10).saturating_add(d as usize);
		}
		got.then_some(n)
	}

	/// atom ::= literal | class | group | anchor | backref | special
	///
	/// Returns false when nothing was emitted.
	fn atom(&mut self, at_branch_start: bool) -> Result<bool> {
		let Some(tok) = self.next_tok()? else {
			return Ok(false);
		};
		match tok {
			Tok::Meta('^') => {
				if at_branch_start {
					self.post.push(PostItem::State(Op::Bol));
				} else {
					self.literal('^');
				}
			}
			Tok::Meta('$') => {
				if matches!(self.peek_tok()?, None | Some(Tok::Meta('|' | ')' | '&'))) {
					self.post.push(PostItem::State(Op::Eol));
				} else {
					self.literal('$');
				}
			}
			Tok::Meta('.') => {
				self.post.push(PostItem::State(Op::Class {
					kind: ClassKind::Any,
					neg: false,
					add_nl: false,
				}));
			}
			Tok::Meta('<') => self.post.push(PostItem::State(Op::Bow)),
			Tok::Meta('>') => self.post.push(PostItem::State(Op::Eow)),
			Tok::Meta('(') => self.group()?,
			Tok::Meta('[') => self.collection(false)?,
			Tok::Meta('%') => self.percent_atom()?,
			Tok::Meta('~') => {
				// no substitute history in the core: "~" matches itself
				self.literal('~');
			}
			Tok::Meta(c @ ('*' | '+' | '=' | '?' | '{' | '@')) => {
				return Err(self.err(&format!("misplaced {c}")));
			}
			Tok::Meta(')') => return Err(self.err("unmatched \\)")),
			Tok::Meta(c) => self.literal(c),
			Tok::Lit(c) => self.literal_maybe_composing(c)?,
			Tok::Esc(c) => return self.escaped_atom(c),
		}
		Ok(true)
	}

	fn literal(&mut self, c: char) {
		let c = if self.icase { fold_case(c) } else { c };
		self.post.push(PostItem::State(Op::Char(c)));
	}

	/// A literal followed by combining marks becomes a composing-char group.
	fn literal_maybe_composing(&mut self, c: char) -> Result<()> {
		if !is_combining(self.raw_peek().unwrap_or('\0')) {
			self.literal(c);
			return Ok(());
		}
		self.literal(c);
		let mut n = 1;
		while let Some(mark) = self.raw_peek() {
			if !is_combining(mark) {
				break;
			}
			self.raw_next();
			self.post.push(PostItem::State(Op::Char(mark)));
			n += 1;
		}
		for _ in 1..n {
			self.post.push(PostItem::Concat);
		}
		self.post.push(PostItem::Group { open: Op::Composing, close: Op::EndComposing });
		Ok(())
	}

	/// Everything reached through a backslash-letter: classes, `\n`, control
	/// escapes, backrefs and the `\z`/`\_` families.
	fn escaped_atom(&mut self, c: char) -> Result<bool> {
		match c {
			'n' => self.post.push(PostItem::State(Op::Newl)),
			'e' => self.literal('\u{1b}'),
			't' => self.literal('\t'),
			'r' => self.literal('\r'),
			'b' => self.literal('\u{8}'),
			'1'..='9' => {
				self.has_backref = true;
				self.post
					.push(PostItem::State(Op::Backref(c as u8 - b'0')));
			}
			'z' => return self.z_atom(),
			'_' => return self.underscore_atom(),
			_ => {
				if let Some((kind, neg)) = class_for_char(c) {
					self.post
						.push(PostItem::State(Op::Class { kind, neg, add_nl: false }));
				} else {
					self.literal(c);
				}
			}
		}
		Ok(true)
	}

	/// `\z` family: `\zs`, `\ze`, `\z(`, `\z1`..`\z9`.
	fn z_atom(&mut self) -> Result<bool> {
		match self.raw_next() {
			Some('s') => self.post.push(PostItem::State(Op::Zstart)),
			Some('e') => {
				self.has_zend = true;
				self.post.push(PostItem::State(Op::Zend));
			}
			Some('(') => {
				self.zparen += 1;
				if self.zparen >= NSUBEXP {
					return Err(EditorError::TooManyGroups);
				}
				let n = self.zparen as u8;
				self.has_zsubexpr = true;
				self.group_body(Op::Zopen(n), Op::Zclose(n))?;
			}
			Some(d @ '1'..='9') => {
				self.has_backref = true;
				self.post
					.push(PostItem::State(Op::ZBackref(d as u8 - b'0')));
			}
			_ => return Err(self.err("invalid character after \\z")),
		}
		Ok(true)
	}

	/// `\_` family: `\_x` classes with newline, `\_[...]`, `\_.`, `\_^`, `\_$`.
	fn underscore_atom(&mut self) -> Result<bool> {
		match self.raw_next() {
			Some('[') => self.collection(true)?,
			Some('.') => self.post.push(PostItem::State(Op::Class {
				kind: ClassKind::Any,
				neg: false,
				add_nl: true,
			})),
			Some('^') => self.post.push(PostItem::State(Op::Bol)),
			Some('$') => self.post.push(PostItem::State(Op::Eol)),
			Some(c) => {
				let Some((kind, neg)) = class_for_char(c) else {
					return Err(self.err("invalid use of \\_"));
				};
				self.post
					.push(PostItem::State(Op::Class { kind, neg, add_nl: true }));
			}
			None => return Err(self.err("invalid use of \\_")),
		}
		Ok(true)
	}

	/// `\%` family: `\%( \%[ \%^ \%$ \%# \%V \%'m \%d123 \%23l` and friends.
	fn percent_atom(&mut self) -> Result<()> {
		let Some(c) = self.raw_next() else {
			return Err(self.err("invalid character after \\%"));
		};
		match c {
			'(' => self.group_body(Op::Nopen, Op::Nclose)?,
			'^' => self.post.push(PostItem::State(Op::Bof)),
			'$' => self.post.push(PostItem::State(Op::Eof)),
			'#' => self.post.push(PostItem::State(Op::Cursor)),
			'V' => self.post.push(PostItem::State(Op::Visual)),
			'C' => self.post.push(PostItem::State(Op::AnyComposing)),
			'[' => self.opt_chars()?,
			'\'' => {
				let Some(mark) = self.raw_next() else {
					return Err(self.err("missing mark name after \\%'"));
				};
				self.post.push(PostItem::State(Op::Mark(Cmp::Eq, mark)));
			}
			'd' => self.numeric_literal(10)?,
			'o' => self.numeric_literal(8)?,
			'x' => self.numeric_literal(16)?,
			'u' => self.numeric_literal(16)?,
			'U' => self.numeric_literal(16)?,
			'<' | '>' | '0'..='9' => {
				let cmp = match c {
					'<' => Cmp::Lt,
					'>' => Cmp::Gt,
					_ => Cmp::Eq,
				};
				if cmp == Cmp::Eq {
					self.pos -= 1; // the digit is part of the number
				}
				if cmp != Cmp::Eq && self.raw_peek() == Some('\'') {
					// \%<'m and \%>'m
					self.raw_next();
					let Some(mark) = self.raw_next() else {
						return Err(self.err("missing mark name after \\%'"));
					};
					self.post.push(PostItem::State(Op::Mark(cmp, mark)));
					return Ok(());
				}
				let Some(n) = self.read_decimal() else {
					return Err(self.err("invalid character after \\%"));
				};
				if n > i32::MAX as usize {
					return Err(EditorError::ValueTooLarge);
				}
				match self.raw_next() {
					Some('l') => self.post.push(PostItem::State(Op::Lnum(cmp, n))),
					Some('c') => self.post.push(PostItem::State(Op::Col(cmp, n))),
					Some('v') => self.post.push(PostItem::State(Op::Vcol(cmp, n))),
					_ => return Err(self.err("invalid character after \\%")),
				}
			}
			_ => return Err(self.err("invalid character after \\%")),
		}
		Ok(())
	}

	/// `\%d123` and the octal/hex forms: a literal codepoint by number.
	fn numeric_literal(&mut self, radix: u32) -> Result<()> {
		let mut n: u32 = 0;
		let mut got = false;
		while let Some(c) = self.raw_peek() {
			let Some(d) = c.to_digit(radix) else { break };
			self.raw_next();
			got = true;
			n = n
				.checked_mul(radix)
				.and_then(|n| n.checked_add(d))
				.ok_or(EditorError::ValueTooLarge)?;
		}
		if !got {
			return Err(self.err("invalid character after \\%"));
		}
		let c = char::from_u32(n).ok_or(EditorError::ValueTooLarge)?;
		self.literal(c);
		Ok(())
	}

	/// `\%[abc]`: a sequence of optionally matched atoms.
	fn opt_chars(&mut self) -> Result<()> {
		let mut n = 0;
		loop {
			match self.peek_tok()? {
				None => return Err(self.err("missing ] after \\%[")),
				Some(Tok::Lit(']') | Tok::Meta(']')) => {
					self.next_tok()?;
					break;
				}
				_ => {
					if !self.atom(false)? {
						return Err(self.err("missing ] after \\%["));
					}
					n += 1;
				}
			}
		}
		if n == 0 {
			self.post.push(PostItem::Empty);
		} else {
			self.post.push(PostItem::OptChars(n));
		}
		Ok(())
	}

	fn group(&mut self) -> Result<()> {
		self.paren += 1;
		if self.paren >= NSUBEXP {
			return Err(EditorError::TooManyGroups);
		}
		let n = self.paren as u8;
		self.group_body(Op::Mopen(n), Op::Mclose(n))
	}

	fn group_body(&mut self, open: Op, close: Op) -> Result<()> {
		self.reg(false)?;
		match self.next_tok()? {
			Some(Tok::Meta(')')) => {}
			_ => return Err(self.err("unmatched \\(")),
		}
		self.post.push(PostItem::Group { open, close });
		Ok(())
	}

	/// `[...]` collections, with `add_nl` set for the `\_[...]` form.
	fn collection(&mut self, add_nl: bool) -> Result<()> {
		let start_state = self.save();
		let mut neg = false;
		if self.raw_peek() == Some('^') {
			self.raw_next();
			neg = true;
		}
		let mut items: Vec<CollItem> = Vec::new();
		let mut add_nl = add_nl;
		let mut first = true;
		loop {
			let Some(c) = self.raw_next() else {
				// unclosed "[" is a literal "[" in Vim; rewind and emit it
				self.restore(start_state);
				self.literal('[');
				return Ok(());
			};
			match c {
				']' if !first => break,
				'[' if self.raw_peek() == Some(':') => {
					items.push(self.posix_class()?);
				}
				'[' if self.raw_peek() == Some('=') => {
					// equivalence class [=a=]
					self.raw_next();
					let Some(base) = self.raw_next() else {
						return Err(self.err("missing ] after ["));
					};
					if self.raw_next() != Some('=') || self.raw_next() != Some(']') {
						return Err(self.err("missing ] after ["));
					}
					for eq in equivalence_class(base) {
						items.push(CollItem::Char(eq));
					}
				}
				'\\' => {
					let Some(esc) = self.raw_next() else {
						return Err(self.err("trailing backslash"));
					};
					match esc {
						'n' => add_nl = true,
						'e' => self.coll_char_or_range(&mut items, '\u{1b}')?,
						't' => self.coll_char_or_range(&mut items, '\t')?,
						'r' => self.coll_char_or_range(&mut items, '\r')?,
						'b' => self.coll_char_or_range(&mut items, '\u{8}')?,
						'd' => {
							let n = self.read_decimal().ok_or_else(|| self.err("invalid escape in []"))?;
							let ch = char::from_u32(n as u32).ok_or(EditorError::ValueTooLarge)?;
							self.coll_char_or_range(&mut items, ch)?;
						}
						'\\' | ']' | '-' | '^' => self.coll_char_or_range(&mut items, esc)?,
						_ => {
							self.coll_char_or_range(&mut items, '\\')?;
							self.coll_char_or_range(&mut items, esc)?;
						}
					}
				}
				_ => self.coll_char_or_range(&mut items, c)?,
			}
			first = false;
		}
		// a simple bracket expression may collapse to a single class state
		if let Some(kind) = recognize_char_class(&items, neg) {
			self.post.push(PostItem::State(Op::Class { kind, neg: false, add_nl }));
			return Ok(());
		}
		if let Some((kind, neg)) = recognize_negated_class(&items, neg) {
			self.post.push(PostItem::State(Op::Class { kind, neg, add_nl }));
			return Ok(());
		}
		self.post.push(PostItem::State(Op::StartColl { neg, add_nl }));
		let mut count = 1;
		for item in items {
			match item {
				CollItem::Char(c) => {
					let c = if self.icase { fold_case(c) } else { c };
					self.post.push(PostItem::State(Op::Char(c)));
					count += 1;
				}
				CollItem::Range(lo, hi) => {
					self.post.push(PostItem::State(Op::RangeMin(lo)));
					self.post.push(PostItem::State(Op::RangeMax(hi)));
					count += 2;
				}
				CollItem::Class(pc) => {
					self.post.push(PostItem::State(Op::CollClass(pc)));
					count += 1;
				}
			}
		}
		self.post.push(PostItem::State(Op::EndColl));
		count += 1;
		for _ in 1..count {
			self.post.push(PostItem::Concat);
		}
		Ok(())
	}

	/// Push `c`, or a range when a `-` follows and another char closes it.
	fn coll_char_or_range(&mut self, items: &mut Vec<CollItem>, c: char) -> Result<()> {
		if self.raw_peek() == Some('-') {
			let state = self.save();
			self.raw_next();
			match self.raw_peek() {
				Some(']') | None => {
					// trailing "-" is a literal
					self.restore(state);
					items.push(CollItem::Char(c));
				}
				Some(hi) => {
					self.raw_next();
					if hi < c {
						return Err(self.err("reverse range in character class"));
					}
					items.push(CollItem::Range(c, hi));
				}
			}
		} else {
			items.push(CollItem::Char(c));
		}
		Ok(())
	}

	fn posix_class(&mut self) -> Result<CollItem> {
		self.raw_next(); // ':'
		let mut name = String::new();
		while let Some(c) = self.raw_peek() {
			if c == ':' {
				break;
			}
			name.push(c);
			self.raw_next();
		}
		if self.raw_next() != Some(':') || self.raw_next() != Some(']') {
			return Err(self.err("invalid character class"));
		}
		let pc = match name.as_str() {
			"alnum" => PosixClass::Alnum,
			"alpha" => PosixClass::Alpha,
			"blank" => PosixClass::Blank,
			"cntrl" => PosixClass::Cntrl,
			"digit" => PosixClass::Digit,
			"graph" => PosixClass::Graph,
			"lower" => PosixClass::Lower,
			"print" => PosixClass::Print,
			"punct" => PosixClass::Punct,
			"space" => PosixClass::Space,
			"upper" => PosixClass::Upper,
			"xdigit" => PosixClass::Xdigit,
			"tab" => PosixClass::Tab,
			"return" => PosixClass::Return,
			"backspace" => PosixClass::Backspace,
			"escape" => PosixClass::Escape,
			"ident" => PosixClass::Ident,
			"keyword" => PosixClass::Keyword,
			"fname" => PosixClass::Fname,
			_ => return Err(self.err(&format!("invalid character class: {name}"))),
		};
		Ok(CollItem::Class(pc))
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CollItem {
	Char(char),
	Range(char, char),
	Class(PosixClass),
}

/// `\w`-style class letters. Uppercase is either the digit-less sibling or
/// the negation, matching the classic class table.
fn class_for_char(c: char) -> Option<(ClassKind, bool)> {
	Some(match c {
		'i' => (ClassKind::Ident, false),
		'I' => (ClassKind::SIdent, false),
		'k' => (ClassKind::Kword, false),
		'K' => (ClassKind::SKword, false),
		'f' => (ClassKind::Fname, false),
		'F' => (ClassKind::SFname, false),
		'p' => (ClassKind::Print, false),
		'P' => (ClassKind::SPrint, false),
		's' => (ClassKind::White, false),
		'S' => (ClassKind::White, true),
		'd' => (ClassKind::Digit, false),
		'D' => (ClassKind::Digit, true),
		'x' => (ClassKind::Hex, false),
		'X' => (ClassKind::Hex, true),
		'o' => (ClassKind::Octal, false),
		'O' => (ClassKind::Octal, true),
		'w' => (ClassKind::Word, false),
		'W' => (ClassKind::Word, true),
		'h' => (ClassKind::Head, false),
		'H' => (ClassKind::Head, true),
		'a' => (ClassKind::Alpha, false),
		'A' => (ClassKind::Alpha, true),
		'l' => (ClassKind::Lower, false),
		'L' => (ClassKind::Lower, true),
		'u' => (ClassKind::Upper, false),
		'U' => (ClassKind::Upper, true),
		_ => return None,
	})
}

/// Rewrite well-known simple brackets (`[0-9]`, `[a-zA-Z_]`, ...) to the
/// single-state class they are equivalent to.
fn recognize_char_class(items: &[CollItem], neg: bool) -> Option<ClassKind> {
	if neg {
		return None;
	}
	let mut ranges: Vec<(char, char)> = Vec::new();
	for item in items {
		match *item {
			CollItem::Char(c) => ranges.push((c, c)),
			CollItem::Range(lo, hi) => ranges.push((lo, hi)),
			CollItem::Class(_) => return None,
		}
	}
	ranges.sort_unstable();
	let sig: Vec<(char, char)> = ranges;
	let known: &[(&[(char, char)], ClassKind)] = &[
		(&[('0', '9')], ClassKind::Digit),
		(&[('0', '7')], ClassKind::Octal),
		(&[('0', '9'), ('A', 'F'), ('a', 'f')], ClassKind::Hex),
		(&[('a', 'z')], ClassKind::LowerAsc),
		(&[('A', 'Z')], ClassKind::UpperAsc),
		(&[('A', 'Z'), ('a', 'z')], ClassKind::Alpha),
		(&[('0', '9'), ('A', 'Z'), ('_', '_'), ('a', 'z')], ClassKind::Word),
		(&[('A', 'Z'), ('_', '_'), ('a', 'z')], ClassKind::Head),
	];
	known
		.iter()
		.find(|(set, _)| *set == sig.as_slice())
		.map(|(_, kind)| *kind)
}

fn recognize_negated_class(items: &[CollItem], neg: bool) -> Option<(ClassKind, bool)> {
	if !neg {
		return None;
	}
	recognize_char_class(items, false).map(|kind| (kind, true))
}

/// Visually equivalent codepoints for `[=x=]`: the Latin accent families.
fn equivalence_class(base: char) -> Vec<char> {
	let family: &str = match base.to_ascii_lowercase() {
		'a' => "aàáâãäåāăą",
		'c' => "cçćĉċč",
		'e' => "eèéêëēĕėęě",
		'i' => "iìíîïĩīĭįı",
		'n' => "nñńņňŉ",
		'o' => "oòóôõöøōŏő",
		'u' => "uùúûüũūŭůűų",
		'y' => "yýÿŷ",
		_ => return vec![base],
	};
	if base.is_ascii_uppercase() {
		family.chars().map(|c| c.to_uppercase().next().unwrap_or(c)).collect()
	} else {
		family.chars().collect()
	}
}

pub(crate) fn fold_case(c: char) -> char {
	c.to_lowercase().next().unwrap_or(c)
}

/// Combining-mark test for composing-char support.
pub(crate) fn is_combining(c: char) -> bool {
	matches!(c as u32,
		0x0300..=0x036f
		| 0x0483..=0x0489
		| 0x0591..=0x05bd
		| 0x0610..=0x061a
		| 0x064b..=0x065f
		| 0x0e31 | 0x0e34..=0x0e3a
		| 0x1ab0..=0x1aff
		| 0x1dc0..=0x1dff
		| 0x20d0..=0x20ff
		| 0xfe20..=0xfe2f)
}

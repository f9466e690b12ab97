//! Positions, motion types, and the computed operator argument.
//!
//! Everything an operator needs to know about the region it is about to edit is
//! packed into `OpArg` before execution starts; once execution begins the region
//! is immutable.
use std::cmp::Ordering;

use unicode_width::UnicodeWidthChar;

use crate::options::Options;

/// Virtual column value meaning "to end of line" in a block selection.
pub const MAXCOL: usize = usize::MAX / 2;

/// A buffer position: 1-based line, 0-based byte column, plus the virtual
/// offset used when the cursor sits past end-of-line or inside a TAB.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
	pub lnum: usize,
	pub col: usize,
	pub coladd: usize,
}

impl Pos {
	pub fn new(lnum: usize, col: usize) -> Self {
		Self { lnum, col, coladd: 0 }
	}
}

impl PartialOrd for Pos {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Pos {
	fn cmp(&self, other: &Self) -> Ordering {
		(self.lnum, self.col, self.coladd).cmp(&(other.lnum, other.col, other.coladd))
	}
}

/// How a region is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionType {
	Char,
	Line,
	Block,
}

/// What the operator does to the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
	ShiftRight,
	ShiftLeft,
	Delete,
	Yank,
	Change,
	Replace(char),
	ToggleCase,
	Upper,
	Lower,
	Rot13,
	Indent,
	Join,
	Add,
	Sub,
	Insert,
	Append,
	Put,
}

impl OpKind {
	pub fn is_change_like(&self) -> bool {
		matches!(self, Self::Change)
	}
}

/// The fully computed description of an impending edit.
///
/// `start <= end` always holds by the time an operator runs; block-wise regions
/// additionally carry the virtual column span of the rectangle.
#[derive(Debug, Clone)]
pub struct OpArg {
	pub op: OpKind,
	pub motion_type: MotionType,
	pub start: Pos,
	pub end: Pos,
	pub start_vcol: usize,
	pub end_vcol: usize,
	pub inclusive: bool,
	pub line_count: usize,
	pub is_visual: bool,
	/// Force the shifted-register treatment normally reserved for multi-line deletes
	pub use_reg_one: bool,
	pub regname: Option<char>,
	/// Exclude trailing whitespace from the last row of a block yank
	pub excl_tr_ws: bool,
	pub empty: bool,
}

impl OpArg {
	pub fn new(op: OpKind, motion_type: MotionType, start: Pos, end: Pos) -> Self {
		let (start, end) = if start <= end { (start, end) } else { (end, start) };
		Self {
			op,
			motion_type,
			start,
			end,
			start_vcol: 0,
			end_vcol: 0,
			inclusive: true,
			line_count: end.lnum - start.lnum + 1,
			is_visual: false,
			use_reg_one: false,
			regname: None,
			excl_tr_ws: false,
			empty: false,
		}
	}
	pub fn with_vcols(mut self, start_vcol: usize, end_vcol: usize) -> Self {
		self.start_vcol = start_vcol.min(end_vcol);
		self.end_vcol = start_vcol.max(end_vcol);
		self
	}
	pub fn with_register(mut self, regname: Option<char>) -> Self {
		self.regname = regname;
		self
	}
	pub fn exclusive(mut self) -> Self {
		self.inclusive = false;
		self
	}
	pub fn is_block(&self) -> bool {
		self.motion_type == MotionType::Block
	}
}

/// Where a block-wise region intersects one particular line.
///
/// All the TAB-splitting pain lives here: when the block edge falls inside a
/// TAB (or a double-wide char), the partly covered cells become `startspaces`
/// or `endspaces` of padding.
#[derive(Debug, Default, Clone)]
pub struct BlockDef {
	/// Byte column where the block begins on this line
	pub textcol: usize,
	/// Byte length of the fully covered text
	pub textlen: usize,
	pub start_vcol: usize,
	pub end_vcol: usize,
	/// Pad cells left of the covered text (left edge split a TAB)
	pub startspaces: usize,
	/// Pad cells right of the covered text
	pub endspaces: usize,
	/// Line ends before the block's left edge
	pub is_short: bool,
	/// The whole block span falls inside a single character
	pub is_one_char: bool,
	/// Virtual width of the char under the left edge
	pub start_char_vcols: usize,
	/// Virtual width of the char under the right edge
	pub end_char_vcols: usize,
	/// Whitespace cells immediately preceding the block start
	pub pre_whitesp: usize,
}

/// Display width of `ch` when drawn at virtual column `vcol`.
pub fn char_vcols(opts: &Options, ch: char, vcol: usize) -> usize {
	if ch == '\t' {
		opts.tab_width_at(vcol)
	} else {
		UnicodeWidthChar::width(ch).unwrap_or(0).max(1)
	}
}

/// Virtual column of byte offset `col` within `line` (the column the char at
/// `col` would start on).
pub fn line_vcol(opts: &Options, line: &str, col: usize) -> usize {
	let mut vcol = 0;
	for (i, ch) in line.char_indices() {
		if i >= col {
			break;
		}
		vcol += char_vcols(opts, ch, vcol);
	}
	vcol
}

/// Virtual width of the whole line.
pub fn line_width(opts: &Options, line: &str) -> usize {
	line_vcol(opts, line, line.len())
}

/// Byte offset of the first char whose span covers virtual column `vcol`,
/// together with the vcol that char starts on. Returns the line length when
/// `vcol` lies past the end.
pub fn vcol2col(opts: &Options, line: &str, vcol: usize) -> (usize, usize) {
	let mut v = 0;
	for (i, ch) in line.char_indices() {
		let w = char_vcols(opts, ch, v);
		if v + w > vcol {
			return (i, v);
		}
		v += w;
	}
	(line.len(), v)
}

/// Byte length of the leading whitespace of `line`.
pub fn skip_white(line: &str) -> usize {
	line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Indent of `line` in virtual columns.
pub fn indent_width(opts: &Options, line: &str) -> usize {
	line_vcol(opts, line, skip_white(line))
}

/// Render an indent of `width` cells, with TABs unless `expandtab` is set.
pub fn make_indent(opts: &Options, width: usize) -> String {
	if opts.expandtab {
		" ".repeat(width)
	} else {
		let ts = opts.tabstop.max(1);
		let mut s = "\t".repeat(width / ts);
		s.push_str(&" ".repeat(width % ts));
		s
	}
}

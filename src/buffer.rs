//! The line buffer the operators edit, plus the window state they steer.
//!
//! This is the narrow surface the core consumes: whole lines in, whole lines
//! out, undo brackets around every operator, and mark adjustment broadcast
//! after structural edits. Rendering and file I/O live elsewhere.
use log::trace;

use crate::options::Options;
use crate::pos::{MotionType, Pos};

/// One undo bracket: the full line range that was about to change.
#[derive(Debug, Clone)]
struct UndoEntry {
	lines: Vec<String>,
	cursor: Pos,
}

#[derive(Debug)]
pub struct Buffer {
	lines: Vec<String>,
	pub name: Option<String>,
	pub alt_name: Option<String>,
	pub modifiable: bool,
	pub changedtick: u64,
	/// `'a`..`'z`
	marks: [Option<Pos>; 26],
	/// `'[` and `']`: start/end of the last operated text
	pub op_start: Pos,
	pub op_end: Pos,
	undo: Vec<UndoEntry>,
}

impl Default for Buffer {
	fn default() -> Self {
		Self::new()
	}
}

impl Buffer {
	pub fn new() -> Self {
		Self {
			lines: vec![String::new()],
			name: None,
			alt_name: None,
			modifiable: true,
			changedtick: 0,
			marks: [None; 26],
			op_start: Pos::new(1, 0),
			op_end: Pos::new(1, 0),
			undo: Vec::new(),
		}
	}

	pub fn from_text(text: &str) -> Self {
		let mut buf = Self::new();
		buf.lines = text.lines().map(str::to_string).collect();
		if buf.lines.is_empty() {
			buf.lines.push(String::new());
		}
		buf
	}

	pub fn line_count(&self) -> usize {
		self.lines.len()
	}

	/// 1-based line lookup. Out-of-range yields the empty string, which saves
	/// every caller from bounds arithmetic at the buffer edges.
	pub fn get_line(&self, lnum: usize) -> &str {
		if lnum == 0 || lnum > self.lines.len() {
			""
		} else {
			&self.lines[lnum - 1]
		}
	}

	pub fn set_line(&mut self, lnum: usize, text: String) {
		if lnum >= 1 && lnum <= self.lines.len() {
			self.lines[lnum - 1] = text;
			self.changed_lines(lnum, lnum, 0);
		}
	}

	/// Insert `text` as a new line after line `after` (0 = before the first).
	pub fn append_line(&mut self, after: usize, text: String) {
		let at = after.min(self.lines.len());
		self.lines.insert(at, text);
		self.mark_adjust(at + 1, usize::MAX, 1);
		self.changed_lines(at + 1, at + 1, 1);
	}

	pub fn delete_lines(&mut self, from: usize, count: usize) {
		if from == 0 || from > self.lines.len() || count == 0 {
			return;
		}
		let to = (from + count - 1).min(self.lines.len());
		self.lines.drain(from - 1..to);
		if self.lines.is_empty() {
			self.lines.push(String::new());
		}
		let deleted = to - from + 1;
		self.mark_adjust(from, to, -(deleted as isize));
		self.changed_lines(from, to, -(deleted as isize));
	}

	pub fn text(&self) -> String {
		let mut out = self.lines.join("\n");
		out.push('\n');
		out
	}

	/// Open an undo bracket covering the whole buffer state.
	pub fn u_save(&mut self, cursor: Pos) {
		self.undo.push(UndoEntry { lines: self.lines.clone(), cursor });
	}

	/// Roll back to the last bracket. Returns the cursor recorded at save time.
	pub fn u_undo(&mut self) -> Option<Pos> {
		let entry = self.undo.pop()?;
		self.lines = entry.lines;
		self.changedtick += 1;
		Some(entry.cursor)
	}

	pub fn has_undo(&self) -> bool {
		!self.undo.is_empty()
	}

	pub fn get_mark(&self, name: char) -> Option<Pos> {
		match name {
			'a'..='z' => self.marks[name as usize - 'a' as usize],
			'[' => Some(self.op_start),
			']' => Some(self.op_end),
			_ => None,
		}
	}

	pub fn set_mark(&mut self, name: char, pos: Pos) {
		if name.is_ascii_lowercase() {
			self.marks[name as usize - 'a' as usize] = Some(pos);
		}
	}

	/// Remap marks after lines `[from..=to]` moved by `lnum_delta` lines.
	/// Marks inside a deleted range collapse onto `from`.
	pub fn mark_adjust(&mut self, from: usize, to: usize, lnum_delta: isize) {
		for slot in self.marks.iter_mut() {
			let Some(pos) = slot else { continue };
			if pos.lnum < from {
				continue;
			}
			if lnum_delta < 0 && pos.lnum <= to {
				// line holding the mark went away
				pos.lnum = from;
				pos.col = 0;
			} else {
				pos.lnum = pos.lnum.saturating_add_signed(lnum_delta).max(1);
			}
		}
	}

	fn changed_lines(&mut self, from: usize, to: usize, delta: isize) {
		self.changedtick += 1;
		trace!("changed lines {from}..={to} (delta {delta}), tick {}", self.changedtick);
	}
}

/// The slice of window state operators need: where the cursor is and which
/// column it wants to stay in.
#[derive(Debug, Default, Clone)]
pub struct Window {
	pub cursor: Pos,
	pub curswant: usize,
}

/// The `curbuf`/`curwin` bundle threaded through the operator engine.
#[derive(Debug)]
pub struct Editor {
	pub buf: Buffer,
	pub win: Window,
	pub opts: Options,
	/// Active or last visual selection, for `\%V` and block operations
	pub visual: Option<(Pos, Pos, MotionType)>,
}

impl Editor {
	pub fn new(buf: Buffer, opts: Options) -> Self {
		Self {
			buf,
			win: Window { cursor: Pos::new(1, 0), curswant: 0 },
			opts,
			visual: None,
		}
	}

	pub fn from_text(text: &str) -> Self {
		Self::new(Buffer::from_text(text), Options::default())
	}

	pub fn cursor_line(&self) -> &str {
		self.buf.get_line(self.win.cursor.lnum)
	}

	/// Clamp the cursor onto a valid position of its line.
	pub fn check_cursor(&mut self) {
		let count = self.buf.line_count();
		if self.win.cursor.lnum == 0 {
			self.win.cursor.lnum = 1;
		}
		if self.win.cursor.lnum > count {
			self.win.cursor.lnum = count;
		}
		let len = self.buf.get_line(self.win.cursor.lnum).len();
		if self.win.cursor.col > len {
			self.win.cursor.col = len;
		}
	}
}

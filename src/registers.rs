//! Emulation of the editor's yank registers.
//!
//! The register table is held in a thread local, global variable; everything
//! else reaches it through the free functions or `REGISTERS.with_borrow_mut`.
//! Slots 0-9 are the numbered registers, 10-35 the letters, then the small
//! delete register `-` and the two selection registers `*` and `+`. The special
//! registers (`% # : / . = _`) are derived on demand and never stored here.
use std::cell::RefCell;

use itertools::Itertools;
use log::{debug, warn};

use crate::error::{EditorError, Result};
use crate::options::CbFlags;
use crate::pos::MotionType;

pub const NUM_REGS: usize = 39;
const IDX_MINUS: usize = 36;
const IDX_STAR: usize = 37;
const IDX_PLUS: usize = 38;

/// How deep `=` register evaluation may recurse before giving up.
const MAX_EXPR_DEPTH: usize = 10;

thread_local! {
	/// The global state for all registers.
	///
	/// This variable is thread local, so it can be freely mutated.
	pub static REGISTERS: RefCell<Registers> = RefCell::new(Registers::new());
}

/// Read a register by name (None = unnamed).
pub fn read_register(name: Option<char>) -> Option<YankReg> {
	REGISTERS.with_borrow_mut(|regs| regs.get_for_paste(name).cloned())
}

/// Overwrite or append a register from plain text.
pub fn write_register(name: char, text: &str, mt: Option<MotionType>) -> Result<()> {
	REGISTERS.with_borrow_mut(|regs| regs.write_reg(name, text, false, mt, 0))
}

/// Why a register is being resolved; affects which slot `"` aliases to and
/// whether the clipboard provider is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegMode {
	Paste,
	Yank,
	Put,
}

/// A typed yank buffer: rows of text plus the shape they were taken with.
#[derive(Debug, Clone, Default)]
pub struct YankReg {
	pub mt: Option<MotionType>,
	pub rows: Vec<String>,
	/// Block registers: inclusive column width minus one
	pub width: usize,
	pub timestamp: u64,
}

impl YankReg {
	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}
	/// Register content as one string, rows separated (and line-wise
	/// terminated) by newlines.
	pub fn join(&self) -> String {
		match self.mt {
			Some(MotionType::Line) => {
				let mut s = self.rows.join("\n");
				s.push('\n');
				s
			}
			_ => self.rows.join("\n"),
		}
	}
}

/// External clipboard access. A missing provider is warned about once per
/// session and otherwise treated as an empty clipboard.
pub trait ClipboardProvider {
	fn get(&mut self, name: char) -> Option<(Vec<String>, MotionType)>;
	fn set(&mut self, rows: &[String], mt: MotionType, name: char);
}

/// Fired after text lands in a register (the TextYankPost hook).
pub trait YankHook {
	fn text_yank_post(&mut self, regname: char, operator: char, reg: &YankReg);
}

pub struct Registers {
	regs: [YankReg; NUM_REGS],
	/// Index of the last written register; `"` aliases this slot
	prev: Option<usize>,
	pub last_search: Option<String>,
	pub last_cmdline: Option<String>,
	pub last_inserted: Option<String>,
	recording: Option<(char, String)>,
	clipboard: Option<Box<dyn ClipboardProvider>>,
	pub cb_flags: CbFlags,
	batch_depth: usize,
	/// Registers with a provider write pending until the batch ends
	pending_sync: Vec<usize>,
	warned_no_provider: bool,
	yank_hook: Option<Box<dyn YankHook>>,
	tick: u64,
}

impl Default for Registers {
	fn default() -> Self {
		Self::new()
	}
}

/// Map a register name to its slot, folding uppercase onto lowercase.
fn reg_idx(name: char) -> Option<usize> {
	match name {
		'0'..='9' => Some(name as usize - '0' as usize),
		'a'..='z' => Some(10 + name as usize - 'a' as usize),
		'A'..='Z' => Some(10 + name as usize - 'A' as usize),
		'-' => Some(IDX_MINUS),
		'*' => Some(IDX_STAR),
		'+' => Some(IDX_PLUS),
		_ => None,
	}
}

/// Whether `name` may be used as a register at all.
pub fn valid_yank_reg(name: char, writing: bool) -> bool {
	if name.is_ascii_alphanumeric() || matches!(name, '"' | '-' | '_' | '*' | '+') {
		return true;
	}
	!writing && matches!(name, '/' | '.' | '%' | ':' | '=' | '#')
}

impl Registers {
	pub fn new() -> Self {
		Self {
			regs: std::array::from_fn(|_| YankReg::default()),
			prev: None,
			last_search: None,
			last_cmdline: None,
			last_inserted: None,
			recording: None,
			clipboard: None,
			cb_flags: CbFlags::default(),
			batch_depth: 0,
			pending_sync: Vec::new(),
			warned_no_provider: false,
			yank_hook: None,
			tick: 0,
		}
	}

	pub fn set_clipboard_provider(&mut self, provider: Box<dyn ClipboardProvider>) {
		self.clipboard = Some(provider);
	}

	pub fn set_yank_hook(&mut self, hook: Box<dyn YankHook>) {
		self.yank_hook = Some(hook);
	}

	pub fn reg(&self, idx: usize) -> &YankReg {
		&self.regs[idx]
	}

	/// Resolve `name` for reading in `Paste`/`Put` mode: selection registers
	/// pull from the provider first, and in paste mode an empty name falls
	/// back to the previous-write register.
	pub fn get_for_paste(&mut self, name: Option<char>) -> Option<&YankReg> {
		self.resolve(name, RegMode::Paste)
	}

	/// Put resolution differs from paste on one point: a dead clipboard
	/// provider yields an empty register instead of the last write.
	pub fn get_for_put(&mut self, name: Option<char>) -> Option<&YankReg> {
		self.resolve(name, RegMode::Put)
	}

	fn resolve(&mut self, name: Option<char>, mode: RegMode) -> Option<&YankReg> {
		match name {
			Some(c @ ('*' | '+')) => {
				let idx = reg_idx(c).unwrap();
				if mode != RegMode::Yank {
					match self.provider_get(c) {
						Some((rows, mt)) => {
							self.tick += 1;
							self.regs[idx] = YankReg { mt: Some(mt), rows, width: 0, timestamp: self.tick };
						}
						None if mode == RegMode::Put => {
							// put from a dead provider sees an empty register
							return Some(&EMPTY_REG);
						}
						None => {
							// no selection available, fall back to the last write
							let idx = self.prev.unwrap_or(0);
							return Some(&self.regs[idx]);
						}
					}
				}
				if mode == RegMode::Yank {
					self.prev = Some(idx);
				}
				Some(&self.regs[idx])
			}
			None | Some('"') => {
				let idx = self.prev.unwrap_or(0);
				if mode == RegMode::Yank {
					self.prev = Some(idx);
				}
				Some(&self.regs[idx])
			}
			Some(c) => {
				let idx = reg_idx(c)?;
				if mode == RegMode::Yank {
					self.prev = Some(idx);
				}
				Some(&self.regs[idx])
			}
		}
	}

	/// Store yanked rows into the register selected by `name`, appending when
	/// the name is an uppercase letter. The unnamed alias follows the write.
	/// `append_break` is the `>` cpoption: appended text starts on its own row
	/// instead of joining the last one.
	pub fn put_yank(
		&mut self,
		name: Option<char>,
		mut reg: YankReg,
		operator: char,
		append_break: bool,
	) -> Result<()> {
		if let Some('_') = name {
			// black hole: succeed without storing or publishing
			return Ok(());
		}
		if let Some(c) = name
			&& !valid_yank_reg(c, true)
		{
			return Err(EditorError::InvalidRegister(c));
		}
		let append = name.is_some_and(|c| c.is_ascii_uppercase());
		let idx = name.map_or(0, |c| reg_idx(c).unwrap_or(0));
		self.tick += 1;
		reg.timestamp = self.tick;
		if append && !self.regs[idx].is_empty() {
			self.append_rows(idx, reg, append_break);
		} else {
			self.regs[idx] = reg;
		}
		self.prev = Some(idx);
		self.publish(idx, name.unwrap_or('"'), operator);
		Ok(())
	}

	/// Append semantics: char-wise existing content joins its last row with the
	/// incoming first row, unless the `>` cpoption requested a line break.
	fn append_rows(&mut self, idx: usize, incoming: YankReg, append_break: bool) {
		let existing = &mut self.regs[idx];
		let join_rows = existing.mt == Some(MotionType::Char) && !append_break;
		let mut rows = incoming.rows.into_iter();
		if join_rows {
			if let (Some(last), Some(first)) = (existing.rows.last_mut(), rows.next()) {
				last.push_str(&first);
			}
		}
		existing.rows.extend(rows);
		if incoming.mt == Some(MotionType::Line) {
			existing.mt = Some(MotionType::Line);
		}
		existing.timestamp = incoming.timestamp;
	}

	/// Shift registers 1..9 down and store `reg` in register 1. Register 9
	/// falls off the end.
	pub fn shift_delete_regs(&mut self, reg: YankReg) {
		for i in (2..=9).rev() {
			self.regs[i] = std::mem::take(&mut self.regs[i - 1]);
		}
		self.regs[1] = reg;
		self.prev = Some(1);
	}

	pub fn set_small_delete(&mut self, reg: YankReg) {
		self.regs[IDX_MINUS] = reg;
	}

	/// The delete-side register protocol: the optional named yank, the
	/// numbered-register shift, and the small-delete register. The black hole
	/// swallows everything silently.
	pub fn deposit_delete(
		&mut self,
		name: Option<char>,
		reg: YankReg,
		shift: bool,
		small: bool,
		append_break: bool,
	) -> Result<()> {
		if name == Some('_') {
			return Ok(());
		}
		if let Some(c) = name {
			if !valid_yank_reg(c, true) {
				return Err(EditorError::InvalidRegister(c));
			}
			self.put_yank(Some(c), reg.clone(), 'd', append_break)?;
		}
		if shift {
			self.tick += 1;
			let mut r = reg.clone();
			r.timestamp = self.tick;
			self.shift_delete_regs(r);
		}
		if small && name.is_none() {
			self.tick += 1;
			let mut r = reg;
			r.timestamp = self.tick;
			self.set_small_delete(r);
			self.prev = Some(IDX_MINUS);
		}
		if name.is_none() {
			// mirror the unnamed alias and fire TextYankPost once
			let idx = self.prev.unwrap_or(0);
			if self.cb_flags.contains(CbFlags::UNNAMED) {
				self.sync_to_provider(idx, '*');
			}
			if self.cb_flags.contains(CbFlags::UNNAMEDPLUS) {
				self.sync_to_provider(idx, '+');
			}
			if let Some(mut hook) = self.yank_hook.take() {
				hook.text_yank_post('"', 'd', &self.regs[idx]);
				self.yank_hook = Some(hook);
			}
		}
		Ok(())
	}

	/// Overwrite or append `text` split on newlines. A trailing newline forces
	/// line-wise typing unless the caller pinned a motion type.
	pub fn write_reg(
		&mut self,
		name: char,
		text: &str,
		append: bool,
		mt: Option<MotionType>,
		block_width: usize,
	) -> Result<()> {
		if name == '_' {
			return Ok(());
		}
		if !valid_yank_reg(name, true) {
			return Err(EditorError::InvalidRegister(name));
		}
		let mt = mt.or_else(|| {
			if text.ends_with('\n') { Some(MotionType::Line) } else { Some(MotionType::Char) }
		});
		let rows: Vec<String> = if text.ends_with('\n') && mt == Some(MotionType::Line) {
			text[..text.len() - 1].split('\n').map(str::to_string).collect()
		} else {
			text.split('\n').map(str::to_string).collect()
		};
		self.tick += 1;
		let reg = YankReg { mt, rows, width: block_width, timestamp: self.tick };
		let idx = reg_idx(name).ok_or(EditorError::InvalidRegister(name))?;
		if append || name.is_ascii_uppercase() {
			if self.regs[idx].is_empty() {
				self.regs[idx] = reg;
			} else {
				self.append_rows(idx, reg, false);
			}
		} else {
			self.regs[idx] = reg;
		}
		self.prev = Some(idx);
		self.publish(idx, name, 'y');
		Ok(())
	}

	/// Mirror a freshly written register to the clipboard according to
	/// `cb_flags`, then fire TextYankPost. Deferred inside a batch bracket.
	fn publish(&mut self, idx: usize, name: char, operator: char) {
		let mirror_star = idx == IDX_STAR || (idx == 0 && self.cb_flags.contains(CbFlags::UNNAMED));
		let mirror_plus = idx == IDX_PLUS || (idx == 0 && self.cb_flags.contains(CbFlags::UNNAMEDPLUS));
		if mirror_star {
			self.sync_to_provider(idx, '*');
		}
		if mirror_plus {
			self.sync_to_provider(idx, '+');
		}
		if let Some(mut hook) = self.yank_hook.take() {
			hook.text_yank_post(name, operator, &self.regs[idx]);
			self.yank_hook = Some(hook);
		}
	}

	fn sync_to_provider(&mut self, idx: usize, sel: char) {
		if self.batch_depth > 0 {
			if !self.pending_sync.contains(&idx) {
				self.pending_sync.push(idx);
			}
			return;
		}
		let reg = self.regs[idx].clone();
		let Some(provider) = self.clipboard.as_mut() else {
			self.warn_missing_provider();
			return;
		};
		provider.set(&reg.rows, reg.mt.unwrap_or(MotionType::Char), sel);
	}

	fn provider_get(&mut self, sel: char) -> Option<(Vec<String>, MotionType)> {
		let Some(provider) = self.clipboard.as_mut() else {
			self.warn_missing_provider();
			return None;
		};
		provider.get(sel)
	}

	fn warn_missing_provider(&mut self) {
		if !self.warned_no_provider {
			warn!("clipboard: no provider available, * and + registers are local");
			self.warned_no_provider = true;
		}
	}

	/// Enter a span during which clipboard mirrors are coalesced. Brackets
	/// nest; only the outermost exit flushes.
	pub fn start_batch_changes(&mut self) {
		self.batch_depth += 1;
	}

	pub fn end_batch_changes(&mut self) {
		if self.batch_depth == 0 {
			return;
		}
		self.batch_depth -= 1;
		if self.batch_depth == 0 {
			for idx in std::mem::take(&mut self.pending_sync) {
				let sel = if idx == IDX_PLUS { '+' } else { '*' };
				self.sync_to_provider(idx, sel);
			}
		}
	}

	/// Toggle macro recording. Starting returns `None`; stopping returns the
	/// register the keys were stored in.
	pub fn do_record(&mut self, name: char) -> Result<Option<char>> {
		match self.recording.take() {
			Some((reg, keys)) => {
				debug!("stopped recording into @{reg}");
				self.write_reg(reg, &keys, reg.is_ascii_uppercase(), Some(MotionType::Char), 0)?;
				Ok(Some(reg))
			}
			None => {
				if !valid_yank_reg(name, true) {
					return Err(EditorError::InvalidRegister(name));
				}
				debug!("recording into @{name}");
				self.recording = Some((name, String::new()));
				Ok(None)
			}
		}
	}

	pub fn is_recording(&self) -> bool {
		self.recording.is_some()
	}

	pub fn record_keys(&mut self, keys: &str) {
		if let Some((_, buf)) = self.recording.as_mut() {
			buf.push_str(keys);
		}
	}

	/// Materialize the value of a special (derived) register.
	pub fn get_spec_reg(
		&mut self,
		name: char,
		buf_name: Option<&str>,
		alt_name: Option<&str>,
		eval: &mut dyn Evaluator,
	) -> Result<Option<String>> {
		match name {
			'%' => buf_name
				.map(|n| Some(n.to_string()))
				.ok_or(EditorError::NoFileName),
			'#' => alt_name
				.map(|n| Some(n.to_string()))
				.ok_or(EditorError::NoFileName),
			':' => Ok(self.last_cmdline.clone()),
			'/' => Ok(self.last_search.clone()),
			'.' => Ok(self.last_inserted.clone()),
			'_' => Ok(Some(String::new())),
			'=' => self.eval_expr_reg(eval),
			_ => Ok(None),
		}
	}

	fn eval_expr_reg(&mut self, eval: &mut dyn Evaluator) -> Result<Option<String>> {
		thread_local! {
			static DEPTH: RefCell<usize> = const { RefCell::new(0) };
		}
		let depth = DEPTH.with_borrow(|d| *d);
		if depth >= MAX_EXPR_DEPTH {
			return Ok(Some(String::new()));
		}
		let Some(expr) = eval.get_expr_line() else {
			return Ok(None);
		};
		DEPTH.with_borrow_mut(|d| *d += 1);
		let result = eval.eval_to_string(&expr);
		DEPTH.with_borrow_mut(|d| *d -= 1);
		Ok(result)
	}

	/// `@x`: produce the lines a register execution feeds to the typeahead.
	/// With `colon` the rows become ex commands, gluing `\`-continuations.
	pub fn do_execreg(&mut self, name: char, colon: bool, addcr: bool) -> Result<Vec<String>> {
		let rows: Vec<String> = match name {
			':' => {
				let Some(last) = self.last_cmdline.clone() else {
					return Err(EditorError::Message("E30: No previous command line".into()));
				};
				vec![last]
			}
			'.' => {
				let Some(last) = self.last_inserted.clone() else {
					return Err(EditorError::Message("E29: No inserted text yet".into()));
				};
				vec![last]
			}
			_ => {
				if !valid_yank_reg(name, false) {
					return Err(EditorError::InvalidRegister(name));
				}
				let idx = reg_idx(name).ok_or(EditorError::InvalidRegister(name))?;
				self.regs[idx].rows.clone()
			}
		};
		let mut out: Vec<String> = Vec::new();
		if colon {
			// join continuation rows (leading backslash) onto the previous one
			for row in rows {
				let trimmed = row.trim_start();
				if let Some(rest) = trimmed.strip_prefix('\\')
					&& let Some(last) = out.last_mut()
				{
					last.push_str(rest);
					continue;
				}
				out.push(format!(":{row}"));
			}
		} else {
			out = rows;
			if addcr && let Some(last) = out.last_mut() {
				last.push('\r');
			}
		}
		Ok(out)
	}

	/// Paste a register into the command line. Rows are joined with CR; with
	/// `remcr` the final CR is dropped.
	pub fn cmdline_paste_reg(&mut self, name: char, literally: bool, remcr: bool) -> Result<String> {
		if !valid_yank_reg(name, false) {
			return Err(EditorError::InvalidRegister(name));
		}
		let reg = self
			.resolve(Some(name), RegMode::Paste)
			.cloned()
			.unwrap_or_default();
		let mut text = reg.rows.iter().join("\r");
		if reg.mt == Some(MotionType::Line) && !remcr {
			text.push('\r');
		}
		if !literally {
			// control chars would be interpreted as editing keys
			text.retain(|c| c == '\r' || c == '\t' || !c.is_control());
		}
		Ok(text)
	}
}

/// The opaque expression-language collaborator. The core only ever evaluates
/// strings through it.
pub trait Evaluator {
	fn eval_to_string(&mut self, expr: &str) -> Option<String>;
	fn get_var_value(&mut self, name: &str) -> Option<String>;
	fn call_provider(&mut self, name: &str, method: &str, args: &[String]) -> Option<String>;
	/// The expression last typed at the `=` register prompt.
	fn get_expr_line(&mut self) -> Option<String>;
}

/// A `=` register evaluator that knows nothing; scripts without an expression
/// language get empty results rather than errors.
pub struct NullEvaluator;

impl Evaluator for NullEvaluator {
	fn eval_to_string(&mut self, _expr: &str) -> Option<String> {
		None
	}
	fn get_var_value(&mut self, _name: &str) -> Option<String> {
		None
	}
	fn call_provider(&mut self, _name: &str, _method: &str, _args: &[String]) -> Option<String> {
		None
	}
	fn get_expr_line(&mut self) -> Option<String> {
		None
	}
}

static EMPTY_REG: YankReg = YankReg {
	mt: None,
	rows: Vec::new(),
	width: 0,
	timestamp: 0,
};

//! A narrow ex-command dispatcher.
//!
//! Only the commands the core's semantics need are here: the editing commands
//! that drive the operator engine, `:global`, and the sourcing/debugging/
//! profiling command set. Command names resolve by unambiguous prefix against
//! a fixed table, ranges support the usual addresses (`%`, `.`, `$`, numbers,
//! marks, `/pat/`), and every executed command passes the breakpoint check
//! first.
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::buffer::Editor;
use crate::debug::{
	dbg_breakadd, dbg_breakdel, dbg_breaklist, dbg_check_breakpoint, debug_break_level,
	set_debug_break_level, BpKind, DEBUG,
};
use crate::error::{EditorError, Result};
use crate::ops::{self, OperatorState, PutDir};
use crate::options::CpoFlags;
use crate::pos::{MotionType, OpArg, OpKind, Pos};
use crate::regex::{CompFlags, Prog, RegexEnv};
use crate::registers::REGISTERS;
use crate::script::{self, Flow, ProfMode, SourceCookie, SCRIPTS};

/// Host hooks fired around sourcing (the SourceCmd/SourcePre autocommands).
pub trait SourceHooks {
	/// Return true when the hook handled the sourcing entirely.
	fn source_cmd(&mut self, _path: &Path) -> bool {
		false
	}
	fn source_pre(&mut self, _path: &Path) {}
}

struct NoHooks;
impl SourceHooks for NoHooks {}

/// Everything a command needs: the editor, the operator state machine, and
/// the sourcing nesting level.
pub struct Session {
	pub ed: Editor,
	pub op_state: OperatorState,
	pub nesting: usize,
	/// Text produced by printing commands, for the host to display
	pub output: String,
	hooks: Box<dyn SourceHooks>,
}

impl Session {
	pub fn new(ed: Editor) -> Self {
		Self {
			ed,
			op_state: OperatorState::default(),
			nesting: 0,
			output: String::new(),
			hooks: Box::new(NoHooks),
		}
	}

	pub fn set_hooks(&mut self, hooks: Box<dyn SourceHooks>) {
		self.hooks = hooks;
	}

	/// Run a sequence of ex commands, stopping at `:finish`.
	pub fn do_cmdline(&mut self, lines: &[String]) -> Result<()> {
		for line in lines {
			match self.do_one_cmd(line)? {
				Flow::Finish => break,
				Flow::Normal => {}
			}
		}
		Ok(())
	}

	/// Execute one ex command line.
	pub fn do_one_cmd(&mut self, line: &str) -> Result<Flow> {
		let line = line.trim_end();
		REGISTERS.with_borrow_mut(|r| r.last_cmdline = Some(line.to_string()));

		// the debugger gets a look at every command first
		let nesting = self.nesting;
		{
			let mut exec = |cmd: &str| {
				let _ = self.do_one_cmd(cmd);
			};
			dbg_check_breakpoint(nesting, line, false, &mut exec);
		}
		if crate::interrupt::interrupted() {
			return Err(EditorError::Interrupt);
		}

		let line = line.trim_start();
		let line = line.strip_prefix(':').unwrap_or(line);
		if line.is_empty() || line.starts_with('"') {
			return Ok(Flow::Normal);
		}

		let (range, rest) = self.parse_range(line)?;
		let rest = rest.trim_start();
		if rest.is_empty() {
			// a bare range moves the cursor
			if let Some((_, end)) = range {
				self.ed.win.cursor = Pos::new(end.min(self.ed.buf.line_count()).max(1), 0);
			}
			return Ok(Flow::Normal);
		}

		self.dispatch(range, rest)
	}

	// -----------------------------------------------------------------
	// range parsing

	fn parse_range<'a>(&mut self, s: &'a str) -> Result<(Option<(usize, usize)>, &'a str)> {
		let mut rest = s;
		let mut addrs: Vec<usize> = Vec::new();
		loop {
			let (addr, after) = self.parse_one_addr(rest)?;
			match addr {
				Some(lnum) => {
					addrs.push(lnum);
					rest = after.trim_start();
					if let Some(stripped) = rest.strip_prefix([',', ';']) {
						rest = stripped.trim_start();
						continue;
					}
				}
				None => rest = after,
			}
			break;
		}
		let range = match addrs.len() {
			0 => None,
			1 => Some((addrs[0], addrs[0])),
			_ => {
				let (a, b) = (addrs[addrs.len() - 2], addrs[addrs.len() - 1]);
				Some((a.min(b), a.max(b)))
			}
		};
		Ok((range, rest))
	}

	fn parse_one_addr<'a>(&mut self, s: &'a str) -> Result<(Option<usize>, &'a str)> {
		let mut chars = s.char_indices().peekable();
		let Some(&(_, c)) = chars.peek() else {
			return Ok((None, s));
		};
		let last = self.ed.buf.line_count();
		let cur = self.ed.win.cursor.lnum;
		let (mut lnum, mut idx) = match c {
			'%' => {
				// the whole-file range is picked off by dispatch()
				return Ok((None, s));
			}
			'.' => (cur, 1),
			'$' => (last, 1),
			'0'..='9' => {
				let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
				(s[..end].parse::<usize>().unwrap_or(cur), end)
			}
			'\'' => {
				let mark = s.chars().nth(1).ok_or_else(|| {
					EditorError::Message("E20: Mark not set".into())
				})?;
				let pos = self.ed.buf.get_mark(mark).ok_or_else(|| {
					EditorError::Message("E20: Mark not set".into())
				})?;
				(pos.lnum, 2)
			}
			'/' | '?' => {
				let close = s[1..].find(c).map(|i| i + 1);
				let pat_end = close.unwrap_or(s.len());
				let pat = &s[1..pat_end];
				let lnum = self.search_lnum(pat, c == '/')?;
				(lnum, close.map_or(s.len(), |i| i + 1))
			}
			'+' | '-' => (cur, 0),
			_ => return Ok((None, s)),
		};
		// relative offsets: +3, -1, trailing + / -
		let mut rest = &s[idx..];
		while let Some(sign) = rest.chars().next().filter(|c| *c == '+' || *c == '-') {
			let body = &rest[1..];
			let dend = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
			let n: usize = if dend == 0 { 1 } else { body[..dend].parse().unwrap_or(1) };
			lnum = if sign == '+' {
				(lnum + n).min(last)
			} else {
				lnum.saturating_sub(n).max(1)
			};
			rest = &body[dend..];
			idx = s.len() - rest.len();
		}
		Ok((Some(lnum), &s[idx..]))
	}

	fn search_lnum(&mut self, pat: &str, forward: bool) -> Result<usize> {
		let prog = Prog::compile(
			pat,
			CompFlags { magic: self.ed.opts.magic, ignorecase: self.ed.opts.ignorecase },
		)?;
		REGISTERS.with_borrow_mut(|r| r.last_search = Some(pat.to_string()));
		let env = self.regex_env();
		let last = self.ed.buf.line_count();
		let cur = self.ed.win.cursor.lnum;
		let order: Vec<usize> = if forward {
			(cur + 1..=last).chain(1..=cur).collect()
		} else {
			(1..cur).rev().chain((cur..=last).rev()).collect()
		};
		for lnum in order {
			if prog.exec_multi(&self.ed.buf, lnum, 0, &env, None)?.is_some() {
				return Ok(lnum);
			}
		}
		Err(EditorError::NoMatch(pat.to_string()))
	}

	fn regex_env(&self) -> RegexEnv {
		let mut marks = Vec::new();
		for name in 'a'..='z' {
			if let Some(pos) = self.ed.buf.get_mark(name) {
				marks.push((name, (pos.lnum, pos.col)));
			}
		}
		RegexEnv {
			cursor: Some((self.ed.win.cursor.lnum, self.ed.win.cursor.col)),
			visual: self
				.ed
				.visual
				.map(|(s, e, _)| ((s.lnum, s.col), (e.lnum, e.col))),
			marks,
			tabstop: self.ed.opts.tabstop,
			maxmempattern: self.ed.opts.maxmempattern,
		}
	}

	// -----------------------------------------------------------------
	// dispatch

	fn dispatch(&mut self, range: Option<(usize, usize)>, rest: &str) -> Result<Flow> {
		// "%" range never made it through parse_one_addr; handle it here
		let (range, rest) = if let Some(stripped) = rest.strip_prefix('%') {
			(Some((1, self.ed.buf.line_count())), stripped.trim_start())
		} else {
			(range, rest)
		};

		// shift commands are runs of '<' or '>'
		if rest.starts_with('>') || rest.starts_with('<') {
			return self.ex_shift(range, rest);
		}

		let name_end = rest
			.find(|c: char| !c.is_ascii_alphanumeric())
			.unwrap_or(rest.len());
		let name = &rest[..name_end];
		let mut args = rest[name_end..].trim_start();
		let bang = rest[name_end..].starts_with('!');
		if bang {
			args = rest[name_end + 1..].trim_start();
		}

		// (full name, minimum abbreviation length)
		const COMMANDS: &[(&str, usize)] = &[
			("delete", 1),
			("yank", 1),
			("put", 2),
			("join", 1),
			("global", 1),
			("vglobal", 1),
			("print", 1),
			("source", 2),
			("runtime", 2),
			("scriptnames", 3),
			("finish", 4),
			("breakadd", 4),
			("breakdel", 6),
			("breaklist", 6),
			("debug", 3),
			("debuggreedy", 6),
			("profile", 4),
			("profdel", 5),
		];
		let cmd = COMMANDS
			.iter()
			.find(|(full, min)| {
				name.len() >= *min && full.starts_with(name) && !name.is_empty()
			})
			.map(|(full, _)| *full)
			.ok_or_else(|| EditorError::NotACommand(name.to_string()))?;

		match cmd {
			"delete" => self.ex_op(range, OpKind::Delete, args),
			"yank" => self.ex_op(range, OpKind::Yank, args),
			"put" => self.ex_put(range, args, bang),
			"join" => self.ex_join(range),
			"global" => self.ex_global(range, args, !bang),
			"vglobal" => self.ex_global(range, args, false),
			"print" => self.ex_print(range),
			"source" => self.ex_source_cmd(args, bang),
			"runtime" => self.ex_runtime(args, bang),
			"scriptnames" => {
				let names = SCRIPTS.with_borrow(|s| s.script_names());
				self.output.push_str(&names);
				Ok(Flow::Normal)
			}
			"finish" => Ok(Flow::Finish),
			"breakadd" => self.ex_breakadd(args, bang),
			"breakdel" => {
				dbg_breakdel(args)?;
				Ok(Flow::Normal)
			}
			"breaklist" => {
				let listing = dbg_breaklist();
				self.output.push_str(&listing);
				Ok(Flow::Normal)
			}
			"debug" => self.ex_debug(args),
			"debuggreedy" => {
				// ":0debuggreedy" arrives as a range of zero and turns it off
				let greedy = !matches!(range, Some((0, _)));
				DEBUG.with_borrow_mut(|d| d.greedy = greedy);
				Ok(Flow::Normal)
			}
			"profile" => self.ex_profile(args),
			"profdel" => {
				SCRIPTS.with_borrow_mut(|s| s.profdel(args))?;
				Ok(Flow::Normal)
			}
			_ => unreachable!(),
		}
	}

	// -----------------------------------------------------------------
	// editing commands

	fn range_or_cursor(&self, range: Option<(usize, usize)>) -> (usize, usize) {
		let cur = self.ed.win.cursor.lnum;
		let (s, e) = range.unwrap_or((cur, cur));
		let last = self.ed.buf.line_count();
		(s.clamp(1, last), e.clamp(1, last))
	}

	/// Line-wise operators driven through the operator state machine, exactly
	/// as a normal-mode `d`/`y` with a line motion would be.
	fn ex_op(&mut self, range: Option<(usize, usize)>, op: OpKind, args: &str) -> Result<Flow> {
		let (start, end) = self.range_or_cursor(range);
		let regname = args.chars().next().filter(|c| !c.is_whitespace());
		let mut oap = OpArg::new(op, MotionType::Line, Pos::new(start, 0), Pos::new(end, 0))
			.with_register(regname);
		oap.use_reg_one = op == OpKind::Delete;
		self.op_state.set_op(op);
		self.op_state.motion_completed(&mut self.ed, &mut oap)?;
		Ok(Flow::Normal)
	}

	fn ex_put(&mut self, range: Option<(usize, usize)>, args: &str, before: bool) -> Result<Flow> {
		let (_, end) = self.range_or_cursor(range);
		self.ed.win.cursor.lnum = end;
		let regname = args.chars().next().filter(|c| !c.is_whitespace());
		let dir = if before { PutDir::Before } else { PutDir::After };
		ops::do_put(&mut self.ed, regname, dir, 1)?;
		Ok(Flow::Normal)
	}

	fn ex_join(&mut self, range: Option<(usize, usize)>) -> Result<Flow> {
		let (start, end) = self.range_or_cursor(range);
		self.ed.win.cursor.lnum = start;
		let count = if end > start { end - start + 1 } else { 2 };
		ops::do_join(&mut self.ed, count, true, true, true, true)?;
		Ok(Flow::Normal)
	}

	fn ex_shift(&mut self, range: Option<(usize, usize)>, rest: &str) -> Result<Flow> {
		let ch = rest.chars().next().unwrap();
		let amount = rest.chars().take_while(|c| *c == ch).count();
		let (start, end) = self.range_or_cursor(range);
		let op = if ch == '>' { OpKind::ShiftRight } else { OpKind::ShiftLeft };
		let oap = OpArg::new(op, MotionType::Line, Pos::new(start, 0), Pos::new(end, 0));
		self.op_state.set_op(op);
		let result = ops::op_shift(&mut self.ed, &oap, false, amount);
		self.op_state.cancel();
		result?;
		Ok(Flow::Normal)
	}

	fn ex_print(&mut self, range: Option<(usize, usize)>) -> Result<Flow> {
		let (start, end) = self.range_or_cursor(range);
		for lnum in start..=end {
			self.output.push_str(self.ed.buf.get_line(lnum));
			self.output.push('\n');
		}
		self.ed.win.cursor.lnum = end;
		Ok(Flow::Normal)
	}

	/// `:g/pat/cmd` (and `:v` with `on_match == false`): mark every matching
	/// line first, then run the command on each mark that still exists.
	fn ex_global(
		&mut self,
		range: Option<(usize, usize)>,
		args: &str,
		on_match: bool,
	) -> Result<Flow> {
		let mut chars = args.chars();
		let delim = chars
			.next()
			.filter(|c| !c.is_alphanumeric())
			.ok_or_else(|| EditorError::Message("E477: regular expression missing".into()))?;
		let rest: &str = chars.as_str();
		let (pat, cmd) = match rest.find(delim) {
			Some(i) => (&rest[..i], rest[i + 1..].to_string()),
			None => (rest, String::from("print")),
		};
		let prog = Prog::compile(
			pat,
			CompFlags { magic: self.ed.opts.magic, ignorecase: self.ed.opts.ignorecase },
		)?;
		REGISTERS.with_borrow_mut(|r| r.last_search = Some(pat.to_string()));
		let (start, end) = range.unwrap_or((1, self.ed.buf.line_count()));

		// pass one: collect matching lines
		let env = self.regex_env();
		let mut hits = Vec::new();
		for lnum in start..=end.min(self.ed.buf.line_count()) {
			if crate::interrupt::interrupted() {
				return Err(EditorError::Interrupt);
			}
			let matched = prog.exec_multi(&self.ed.buf, lnum, 0, &env, None)?.is_some();
			if matched == on_match {
				hits.push(lnum);
			}
		}
		if hits.is_empty() {
			return Err(EditorError::NoMatch(pat.to_string()));
		}

		// pass two: clipboard writes coalesce over the whole loop
		REGISTERS.with_borrow_mut(|r| r.start_batch_changes());
		let mut delta: isize = 0;
		let mut result = Ok(Flow::Normal);
		for lnum in hits {
			let target = lnum.saturating_add_signed(delta);
			if target == 0 || target > self.ed.buf.line_count() {
				continue;
			}
			let before = self.ed.buf.line_count() as isize;
			self.ed.win.cursor = Pos::new(target, 0);
			let cmd = if cmd.is_empty() { "print" } else { &cmd };
			match self.do_one_cmd(cmd) {
				Ok(_) => {}
				Err(e) => {
					result = Err(e);
					break;
				}
			}
			delta += self.ed.buf.line_count() as isize - before;
		}
		REGISTERS.with_borrow_mut(|r| r.end_batch_changes());
		result
	}

	// -----------------------------------------------------------------
	// sourcing and friends

	fn ex_source_cmd(&mut self, args: &str, bang: bool) -> Result<Flow> {
		if args.is_empty() {
			return Err(EditorError::NoFileName);
		}
		if bang {
			// :source! feeds the file as normal-mode input; no key
			// interpreter lives in the core
			info!(":source! is not supported here, use :source");
			return Ok(Flow::Normal);
		}
		self.source_file(Path::new(args), false)?;
		Ok(Flow::Normal)
	}

	/// Source one script, recursing through the dispatcher for each line.
	pub fn source_file(&mut self, path: &Path, check_other: bool) -> Result<()> {
		if self.hooks.source_cmd(path) {
			debug!("SourceCmd hook handled {}", path.display());
			return Ok(());
		}
		self.hooks.source_pre(path);
		self.nesting += 1;
		let nesting = self.nesting;
		let no_concat = self.ed.opts.cpoptions.contains(CpoFlags::NO_CONCAT);
		let mut exec = |line: &str, cookie: &mut SourceCookie| self.source_line(line, cookie);
		let result = script::do_source(path, check_other, nesting, no_concat, &mut exec);
		self.nesting -= 1;
		result
	}

	fn source_line(&mut self, line: &str, _cookie: &mut SourceCookie) -> Result<Flow> {
		self.do_one_cmd(line)
	}

	fn ex_runtime(&mut self, pat: &str, all: bool) -> Result<Flow> {
		let mut sourced_any = false;
		for path in runtimepath_glob(&self.ed.opts.runtimepath, pat) {
			self.source_file(&path, false)?;
			sourced_any = true;
			if !all {
				break;
			}
		}
		if !sourced_any {
			debug!(":runtime found nothing for {pat}");
		}
		Ok(Flow::Normal)
	}

	fn ex_breakadd(&mut self, args: &str, forceit: bool) -> Result<Flow> {
		let mut parts = args.split_whitespace();
		let kind = parts.next().unwrap_or("");
		match kind {
			"func" | "file" => {
				let kind = if kind == "func" { BpKind::Func } else { BpKind::File };
				let mut rest: Vec<&str> = parts.collect();
				let lnum = match rest.first().and_then(|s| s.parse::<usize>().ok()) {
					Some(n) => {
						rest.remove(0);
						n
					}
					None => 1,
				};
				let name = rest.join(" ");
				if name.is_empty() {
					return Err(EditorError::Message("E474: Invalid argument".into()));
				}
				dbg_breakadd(kind, lnum, &name, forceit)?;
			}
			"here" => {
				let (name, lnum) = script::SOURCING
					.with_borrow(|s| (s.name.clone(), s.lnum));
				let Some(name) = name else {
					return Err(EditorError::Message(
						"E474: Invalid argument: not sourcing a file".into(),
					));
				};
				dbg_breakadd(BpKind::File, lnum, &name, forceit)?;
			}
			_ => return Err(EditorError::Message("E474: Invalid argument".into())),
		}
		Ok(Flow::Normal)
	}

	/// `:debug {cmd}`: run with the break level forced to maximum.
	fn ex_debug(&mut self, args: &str) -> Result<Flow> {
		let save = debug_break_level();
		set_debug_break_level(9999);
		let result = self.do_one_cmd(args);
		set_debug_break_level(save);
		result
	}

	fn ex_profile(&mut self, args: &str) -> Result<Flow> {
		let (sub, rest) = match args.find(char::is_whitespace) {
			Some(i) => (&args[..i], args[i..].trim_start()),
			None => (args, ""),
		};
		match sub {
			"start" => {
				if rest.is_empty() {
					return Err(EditorError::NoFileName);
				}
				SCRIPTS.with_borrow_mut(|s| {
					s.prof = ProfMode::Running;
					s.prof_fname = Some(PathBuf::from(rest));
				});
			}
			"pause" => SCRIPTS.with_borrow_mut(|s| {
				if s.prof == ProfMode::Running {
					s.prof = ProfMode::Paused;
				}
			}),
			"continue" => SCRIPTS.with_borrow_mut(|s| {
				if s.prof == ProfMode::Paused {
					s.prof = ProfMode::Running;
				}
			}),
			"file" | "func" => {
				if rest.is_empty() {
					return Err(EditorError::Message("E474: Invalid argument".into()));
				}
				SCRIPTS.with_borrow_mut(|s| s.add_profile_pattern(rest, true))?;
			}
			"dump" => {
				let path = SCRIPTS.with_borrow(|s| s.prof_fname.clone());
				if let Some(path) = path {
					self.profile_dump(&path)?;
				}
			}
			_ => return Err(EditorError::Message("E474: Invalid argument".into())),
		}
		Ok(Flow::Normal)
	}

	/// Write the profile report; failure to open the file is reported but not
	/// fatal to the session.
	pub fn profile_dump(&mut self, path: &Path) -> Result<()> {
		let mut file = match std::fs::File::create(path) {
			Ok(f) => f,
			Err(e) => {
				info!("cannot open profile dump file {}: {e}", path.display());
				return Ok(());
			}
		};
		SCRIPTS
			.with_borrow(|s| s.write_profile(&mut file))
			.map_err(|e| EditorError::Message(format!("profile dump failed: {e}")))?;
		Ok(())
	}
}

/// `:runtime` support: every `runtimepath` entry globbed against `pat`, in
/// order. The caller does its own iteration.
pub fn runtimepath_glob(runtimepath: &[String], pat: &str) -> Vec<PathBuf> {
	let mut out = Vec::new();
	for dir in runtimepath {
		let full = format!("{}/{}", dir.trim_end_matches('/'), pat);
		if let Ok(entries) = glob::glob(&full) {
			for path in entries.flatten() {
				if path.is_file() {
					out.push(path);
				}
			}
		}
	}
	out
}

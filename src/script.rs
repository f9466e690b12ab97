//! Script sourcing and profiling.
//!
//! `do_source` reads a file of ex commands and feeds them, one logical line at
//! a time, to the dispatcher closure. On the way each line gets line-ending
//! normalization (Unix/Dos/Mac auto-detected), an optional UTF-8 BOM strip,
//! `\`-continuation joining, and a breakpoint check. Each distinct file gets a
//! process-unique SID keyed by device+inode where available, so symlinks and
//! hardlinks resolve to the same script item.
//!
//! Profiling accumulates wall-clock per script and per line, split into total
//! and self time by subtracting the time spent in child sourcings.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::debug::{self, dbg_find_breakpoint};
use crate::error::{EditorError, Result};
use crate::interrupt::interrupted;

thread_local! {
	/// The script registry lives for the process: SIDs stay valid forever.
	pub static SCRIPTS: RefCell<ScriptRegistry> = RefCell::new(ScriptRegistry::default());

	/// Name and line of what is currently being sourced, for messages.
	pub static SOURCING: RefCell<SourcingPos> = RefCell::new(SourcingPos::default());

	/// Time spent waiting for the user, subtracted from profiles.
	static PROF_WAIT: RefCell<Duration> = const { RefCell::new(Duration::ZERO) };
}

#[derive(Debug, Default, Clone)]
pub struct SourcingPos {
	pub name: Option<String>,
	pub lnum: usize,
}

// ---------------------------------------------------------------------------
// proftime

/// Start a profiling clock.
pub fn profile_start() -> Instant {
	Instant::now()
}

/// Stop it, returning the elapsed time.
pub fn profile_end(start: Instant) -> Duration {
	start.elapsed()
}

/// Snapshot of accumulated wait time, taken before running a child.
pub fn profile_get_wait() -> Duration {
	PROF_WAIT.with_borrow(|w| *w)
}

/// Record time spent blocked on user input.
pub fn profile_add_wait(d: Duration) {
	PROF_WAIT.with_borrow_mut(|w| *w += d);
}

/// Subtract the wait time that accumulated since `wait_start` from `elapsed`.
pub fn profile_sub_wait(wait_start: Duration, elapsed: Duration) -> Duration {
	let waited = profile_get_wait().saturating_sub(wait_start);
	elapsed.saturating_sub(waited)
}

/// Divide a total by a run count (for per-call averages in reports).
pub fn profile_divide(d: Duration, count: usize) -> Duration {
	if count == 0 { Duration::ZERO } else { d / count as u32 }
}

/// A deadline `msec` from now, for cooperative timeouts.
pub fn profile_setlimit(msec: u64) -> Instant {
	Instant::now() + Duration::from_millis(msec)
}

pub fn profile_passed_limit(limit: Instant) -> bool {
	Instant::now() >= limit
}

fn fmt_time(d: Duration) -> String {
	format!("{:10.6}", d.as_secs_f64())
}

// ---------------------------------------------------------------------------
// script items

#[derive(Debug, Default, Clone)]
pub struct LineProf {
	pub count: usize,
	pub total: Duration,
	pub self_time: Duration,
}

#[derive(Debug)]
pub struct ScriptItem {
	pub name: PathBuf,
	pub dev_ino: Option<(u64, u64)>,
	pub prof_on: bool,
	pub pr_force: bool,
	pub pr_count: usize,
	pub pr_total: Duration,
	pub pr_self: Duration,
	pub pr_start: Option<Instant>,
	pub pr_children: Duration,
	/// Saved (child entry time, child wait snapshot) while a child sources
	pub pr_nest: Vec<(Instant, Duration)>,
	pub prl: Vec<LineProf>,
}

impl ScriptItem {
	fn new(name: PathBuf, dev_ino: Option<(u64, u64)>) -> Self {
		Self {
			name,
			dev_ino,
			prof_on: false,
			pr_force: false,
			pr_count: 0,
			pr_total: Duration::ZERO,
			pr_self: Duration::ZERO,
			pr_start: None,
			pr_children: Duration::ZERO,
			pr_nest: Vec::new(),
			prl: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfMode {
	#[default]
	Off,
	Running,
	Paused,
}

#[derive(Debug, Default)]
pub struct ScriptRegistry {
	/// Index = SID - 1. Entries are never removed or reused.
	items: Vec<ScriptItem>,
	pub prof: ProfMode,
	pub prof_fname: Option<PathBuf>,
	/// Patterns from `:profile file {pat}` / `:profile func {pat}`
	file_pats: Vec<(String, crate::regex::Prog, bool)>,
	pub current_sid: usize,
}

impl ScriptRegistry {
	/// Resolve `path` to its SID, allocating a fresh one for unknown scripts.
	/// Identity is device+inode when stat works, canonical path otherwise.
	pub fn sid_for(&mut self, path: &Path) -> usize {
		let dev_ino = dev_ino_of(path);
		for (i, item) in self.items.iter().enumerate() {
			let same = match (dev_ino, item.dev_ino) {
				(Some(a), Some(b)) => a == b,
				_ => item.name == path,
			};
			if same {
				return i + 1;
			}
		}
		self.items.push(ScriptItem::new(path.to_path_buf(), dev_ino));
		self.items.len()
	}

	pub fn item(&self, sid: usize) -> Option<&ScriptItem> {
		self.items.get(sid.wrapping_sub(1))
	}

	pub fn item_mut(&mut self, sid: usize) -> Option<&mut ScriptItem> {
		self.items.get_mut(sid.wrapping_sub(1))
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// `:scriptnames` output.
	pub fn script_names(&self) -> String {
		let mut out = String::new();
		for (i, item) in self.items.iter().enumerate() {
			out.push_str(&format!("{:3}: {}\n", i + 1, item.name.display()));
		}
		out
	}

	pub fn add_profile_pattern(&mut self, pat: &str, force: bool) -> Result<()> {
		let regpat = debug::file_pat_to_reg_pat(pat);
		let prog =
			crate::regex::Prog::compile(&regpat, crate::regex::CompFlags::default())?;
		self.file_pats.push((pat.to_string(), prog, force));
		Ok(())
	}

	/// `:profdel`: drop profiling patterns.
	pub fn profdel(&mut self, spec: &str) -> Result<()> {
		let spec = spec.trim();
		if spec == "*" {
			self.file_pats.clear();
			return Ok(());
		}
		let before = self.file_pats.len();
		self.file_pats.retain(|(name, _, _)| name != spec);
		if self.file_pats.len() == before {
			return Err(EditorError::BreakpointNotFound(spec.to_string()));
		}
		Ok(())
	}

	/// Does some `:profile file` pattern match this script?
	pub fn has_profiling(&self, name: &Path) -> Option<bool> {
		let name = name.to_string_lossy();
		self.file_pats
			.iter()
			.find(|(_, prog, _)| prog.match_str(&name).is_some())
			.map(|(_, _, force)| *force)
	}

	/// Entering a child script: remember when, so the parent can attribute the
	/// elapsed time to `pr_children`.
	pub fn script_prof_save(&mut self) {
		let sid = self.current_sid;
		if sid == 0 {
			return;
		}
		if let Some(item) = self.item_mut(sid)
			&& item.prof_on
		{
			item.pr_nest.push((profile_start(), profile_get_wait()));
		}
	}

	/// Leaving the child: measure and add to the parent's child time.
	pub fn script_prof_restore(&mut self) {
		let sid = self.current_sid;
		if sid == 0 {
			return;
		}
		if let Some(item) = self.item_mut(sid)
			&& let Some((start, wait)) = item.pr_nest.pop()
		{
			let elapsed = profile_sub_wait(wait, profile_end(start));
			item.pr_children += elapsed;
		}
	}

	/// The `:profile dump` report: a header per script, then the source lines
	/// prefixed with count/total/self.
	pub fn write_profile(&self, out: &mut dyn Write) -> std::io::Result<()> {
		for item in &self.items {
			if !item.prof_on {
				continue;
			}
			writeln!(out, "SCRIPT  {}", item.name.display())?;
			writeln!(
				out,
				"Sourced {} time{}",
				item.pr_count,
				if item.pr_count == 1 { "" } else { "s" }
			)?;
			writeln!(out, "Total time: {}", fmt_time(item.pr_total))?;
			writeln!(out, " Self time: {}", fmt_time(item.pr_self))?;
			writeln!(out)?;
			writeln!(out, "count     total      self")?;
			if let Ok(content) = std::fs::read_to_string(&item.name) {
				for (i, line) in content.lines().enumerate() {
					match item.prl.get(i) {
						Some(lp) if lp.count > 0 => {
							let total = if lp.total != lp.self_time {
								fmt_time(lp.total)
							} else {
								" ".repeat(10)
							};
							writeln!(
								out,
								"{:5} {} {} {}",
								lp.count,
								total,
								fmt_time(lp.self_time),
								line
							)?;
						}
						_ => writeln!(out, "{:29}{}", "", line)?,
					}
				}
			}
			writeln!(out)?;
		}
		Ok(())
	}
}

#[cfg(unix)]
fn dev_ino_of(path: &Path) -> Option<(u64, u64)> {
	use std::os::unix::fs::MetadataExt;
	std::fs::metadata(path).ok().map(|m| (m.dev(), m.ino()))
}

#[cfg(not(unix))]
fn dev_ino_of(_path: &Path) -> Option<(u64, u64)> {
	None
}

// ---------------------------------------------------------------------------
// reading script lines

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EolFormat {
	#[default]
	Unknown,
	Unix,
	Dos,
	Mac,
}

/// Per-invocation scanner state for one sourced file.
pub struct SourceCookie {
	reader: BufReader<File>,
	/// Leftover bytes after a Mac-format split
	pending: VecDeque<u8>,
	nextline: Option<String>,
	pub finished: bool,
	pub eol: EolFormat,
	/// Warned about a missing CR already
	error: bool,
	/// Strip a UTF-8 BOM / convert the encoding of each line
	/// A BOM asked for encoding conversion (the lossy UTF-8 decode does it)
	pub conv: bool,
	pub breakpoint: usize,
	pub dbg_tick: u64,
	pub fname: PathBuf,
	pub sid: usize,
	pub nesting_level: usize,
	/// Line number of the last line handed out
	pub lnum: usize,
}

impl SourceCookie {
	pub fn open(fname: &Path, sid: usize, nesting_level: usize) -> Result<Self> {
		let file = File::open(fname)
			.map_err(|_| EditorError::SourceOpenFailure(fname.display().to_string()))?;
		Ok(Self {
			reader: BufReader::new(file),
			pending: VecDeque::new(),
			nextline: None,
			finished: false,
			eol: EolFormat::Unknown,
			error: false,
			conv: false,
			breakpoint: dbg_find_breakpoint(true, &fname.to_string_lossy(), 0),
			dbg_tick: debug::debug_tick(),
			fname: fname.to_path_buf(),
			sid,
			nesting_level,
			lnum: 0,
		})
	}

	/// Read one physical line, normalizing the line ending. Handles the
	/// CTRL-Z DOS end marker and `^V`-escaped newlines.
	fn get_one_line(&mut self) -> Option<String> {
		let mut buf: Vec<u8> = Vec::with_capacity(120);
		self.lnum += 1;
		loop {
			if interrupted() {
				return None;
			}
			// for Mac format read_chunk splits on CR and maps it to NL
			let chunk = self.read_chunk()?;
			buf.extend_from_slice(&chunk);

			let len = buf.len();
			if len >= 1 && buf[len - 1] == b'\n' {
				// auto-detect and normalize the line ending
				let has_cr = len >= 2 && buf[len - 2] == b'\r';
				if self.eol == EolFormat::Unknown {
					self.eol = if has_cr { EolFormat::Dos } else { EolFormat::Unix };
				}
				if self.eol == EolFormat::Dos {
					if has_cr {
						buf.remove(len - 2);
					} else if !self.error {
						// lines like ":map xx yy^M" will have failed
						warn!("W15: Warning: Wrong line separator, ^M may be missing");
						self.error = true;
						self.eol = EolFormat::Unix;
					}
				}
				// an odd number of ^V's escapes the line break
				let len = buf.len();
				let mut c = len as isize - 2;
				while c >= 0 && buf[c as usize] == 0x16 {
					c -= 1;
				}
				if (len as isize - 1 - c) % 2 == 0 {
					// escaped NL, keep it and read more
					self.lnum += 1;
					continue;
				}
				buf.pop(); // remove the NL
				break;
			} else {
				// EOF without a final NL
				if buf.is_empty() {
					return None;
				}
				if self.eol == EolFormat::Unknown {
					self.eol = if buf.contains(&b'\r') {
						EolFormat::Mac
					} else {
						EolFormat::Unix
					};
					if self.eol == EolFormat::Mac {
						// re-split what we read on CR
						let mut it = buf.splitn(2, |b| *b == b'\r');
						let first = it.next().unwrap_or_default().to_vec();
						if let Some(rest) = it.next() {
							self.pending.extend(rest.iter());
						}
						buf = first;
					}
				}
				break;
			}
		}

		// a trailing CTRL-Z on its own line is the DOS end-of-file marker
		if self.eol == EolFormat::Dos && buf == [0x1a] {
			return None;
		}

		// the lossy UTF-8 decode doubles as the encoding conversion; `conv`
		// only records that a BOM asked for it
		let mut line = String::from_utf8_lossy(&buf).into_owned();
		if line.ends_with('\u{1a}') && self.eol == EolFormat::Dos {
			line.pop();
		}
		Some(line)
	}

	/// Pull bytes up to and including the next line terminator.
	fn read_chunk(&mut self) -> Option<Vec<u8>> {
		if !self.pending.is_empty() {
			// Mac format: pending bytes are split on CR
			let mut out = Vec::new();
			while let Some(b) = self.pending.pop_front() {
				if b == b'\r' {
					out.push(b'\n');
					return Some(out);
				}
				out.push(b);
			}
			if !out.is_empty() {
				return Some(out);
			}
		}
		if self.eol == EolFormat::Mac {
			let mut out = Vec::new();
			let mut byte = [0u8; 1];
			loop {
				match self.reader.read(&mut byte) {
					Ok(0) => break,
					Ok(_) => {
						if byte[0] == b'\r' {
							out.push(b'\n');
							return Some(out);
						}
						out.push(byte[0]);
					}
					Err(_) => return None,
				}
			}
			return if out.is_empty() { None } else { Some(out) };
		}
		let mut out = Vec::with_capacity(120);
		match self.reader.read_until(b'\n', &mut out) {
			Ok(0) => None,
			Ok(_) => Some(out),
			Err(_) => None,
		}
	}

	/// Read the next logical line: physical lines joined over
	/// `\`-continuations (unless `no_concat`), encoding-converted, with the
	/// breakpoint ticker consulted.
	pub fn get_source_line(&mut self, no_concat: bool) -> Option<String> {
		// breakpoints may have been added or deleted in the meantime
		if self.dbg_tick < debug::debug_tick() {
			self.breakpoint =
				dbg_find_breakpoint(true, &self.fname.to_string_lossy(), self.lnum);
			self.dbg_tick = debug::debug_tick();
		}
		if self.finished {
			return None;
		}
		let mut line = match self.nextline.take() {
			Some(line) => {
				self.lnum += 1;
				line
			}
			None => self.get_one_line()?,
		};

		if !no_concat {
			// compensate for the one line read-ahead
			self.lnum -= 1;
			self.nextline = self.get_one_line();
			if self
				.nextline
				.as_deref()
				.is_some_and(|next| next.trim_start().starts_with('\\'))
			{
				let mut joined = String::with_capacity(400);
				joined.push_str(&line);
				loop {
					let next = self.nextline.take().unwrap();
					let trimmed = next.trim_start();
					joined.push_str(&trimmed[1..]);
					self.nextline = self.get_one_line();
					if !self
						.nextline
						.as_deref()
						.is_some_and(|n| n.trim_start().starts_with('\\'))
					{
						break;
					}
				}
				line = joined;
			}
		}

		// did we cross a breakpoint?
		if self.breakpoint != 0 && self.breakpoint <= self.lnum {
			debug::dbg_breakpoint(&self.fname.to_string_lossy(), self.lnum);
			self.breakpoint =
				dbg_find_breakpoint(true, &self.fname.to_string_lossy(), self.lnum);
			self.dbg_tick = debug::debug_tick();
		}
		Some(line)
	}

	pub fn set_conv(&mut self, conv: bool) {
		self.conv = conv;
	}
}

// ---------------------------------------------------------------------------
// do_source

/// How the dispatcher tells the sourcing loop what happened to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
	Normal,
	/// `:finish` — stop this file, not the outer one
	Finish,
}

/// Read `fname` and execute each logical line through `exec`.
///
/// `check_other` retries with `.`⇄`_` swapped on the basename's first char
/// (the `.vimrc` / `_vimrc` dance). The closure gets each ex command plus the
/// cookie, so it can mark `:finish` or consult the nesting level.
pub fn do_source(
	fname: &Path,
	check_other: bool,
	nesting_level: usize,
	no_concat: bool,
	exec: &mut dyn FnMut(&str, &mut SourceCookie) -> Result<Flow>,
) -> Result<()> {
	let expanded = expand_env(&fname.to_string_lossy());
	let mut path = PathBuf::from(expanded);
	if path.is_dir() {
		return Err(EditorError::Message(format!(
			"E17: \"{}\" is a directory",
			path.display()
		)));
	}
	if let Ok(canonical) = path.canonicalize() {
		path = canonical;
	}

	debug!("sourcing {}", path.display());

	let mut cookie = match SourceCookie::open(&path, 0, nesting_level) {
		Ok(c) => c,
		Err(e) => {
			if !check_other {
				return Err(e);
			}
			// handle .vimrc <-> _vimrc
			let Some(alt) = swap_script_prefix(&path) else {
				return Err(e);
			};
			SourceCookie::open(&alt, 0, nesting_level)?
		}
	};
	// the file exists: resolve its script identity
	let sid = SCRIPTS.with_borrow_mut(|reg| reg.sid_for(&path));
	cookie.sid = sid;

	let save_sourcing = SOURCING.with_borrow(|s| s.clone());
	SOURCING.with_borrow_mut(|s| {
		s.name = Some(path.display().to_string());
		s.lnum = 0;
	});

	// profiling attach: per-script flag, forced by a matching pattern
	let profiling = SCRIPTS.with_borrow_mut(|reg| {
		let save_sid = reg.current_sid;
		reg.script_prof_save();
		reg.current_sid = sid;
		let profiling = reg.prof == ProfMode::Running;
		if profiling {
			let force = reg.has_profiling(&path);
			if let Some(item) = reg.item_mut(sid) {
				if !item.prof_on && force.is_some() {
					item.prof_on = true;
					item.pr_force = force.unwrap_or(false);
				}
				if item.prof_on {
					item.pr_count += 1;
					item.pr_start = Some(profile_start());
					item.pr_children = Duration::ZERO;
				}
			}
		}
		(profiling, save_sid, profile_get_wait())
	});
	let (prof_on, save_sid, wait_start) = profiling;

	// the first line may carry a UTF-8 BOM
	let mut first = cookie.get_source_line(no_concat);
	if let Some(line) = &first
		&& line.as_bytes().starts_with(&[0xef, 0xbb, 0xbf])
	{
		cookie.set_conv(true);
		first = Some(line[3..].to_string());
	}

	let mut result = Ok(());
	let mut line_opt = first;
	while let Some(line) = line_opt {
		SOURCING.with_borrow_mut(|s| s.lnum = cookie.lnum);
		let line_start = profile_start();
		let line_wait = profile_get_wait();
		let line_idx = cookie.lnum.saturating_sub(1);
		match exec(&line, &mut cookie) {
			Ok(Flow::Finish) => {
				cookie.finished = true;
			}
			Ok(Flow::Normal) => {}
			Err(e) => {
				result = Err(e);
				break;
			}
		}
		if prof_on {
			SCRIPTS.with_borrow_mut(|reg| {
				if let Some(item) = reg.item_mut(sid)
					&& item.prof_on
				{
					if item.prl.len() <= line_idx {
						item.prl.resize(line_idx + 1, LineProf::default());
					}
					let total = profile_end(line_start);
					let self_time = profile_sub_wait(line_wait, total);
					let lp = &mut item.prl[line_idx];
					lp.count += 1;
					lp.total += total;
					lp.self_time += self_time;
				}
			});
		}
		if interrupted() {
			result = Err(EditorError::Interrupt);
			break;
		}
		line_opt = cookie.get_source_line(no_concat);
	}

	// close the books on profiling for this sourcing
	SCRIPTS.with_borrow_mut(|reg| {
		if prof_on
			&& let Some(item) = reg.item_mut(sid)
			&& item.prof_on
			&& let Some(start) = item.pr_start.take()
		{
			let elapsed = profile_sub_wait(wait_start, profile_end(start));
			item.pr_total += elapsed;
			item.pr_self += elapsed.saturating_sub(item.pr_children);
		}
		reg.current_sid = save_sid;
		reg.script_prof_restore();
	});

	SOURCING.with_borrow_mut(|s| *s = save_sourcing);
	result
}

/// `$VAR` and `${VAR}` expansion in a script path.
pub fn expand_env(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	let mut chars = s.chars().peekable();
	while let Some(c) = chars.next() {
		if c != '$' {
			out.push(c);
			continue;
		}
		let braced = chars.peek() == Some(&'{');
		if braced {
			chars.next();
		}
		let mut name = String::new();
		while let Some(&nc) = chars.peek() {
			if nc.is_alphanumeric() || nc == '_' {
				name.push(nc);
				chars.next();
			} else {
				break;
			}
		}
		if braced && chars.peek() == Some(&'}') {
			chars.next();
		}
		match std::env::var(&name) {
			Ok(val) if !name.is_empty() => out.push_str(&val),
			_ => {
				out.push('$');
				out.push_str(&name);
			}
		}
	}
	out
}

/// `.vimrc` ⇄ `_vimrc`: swap the leading char of the basename.
fn swap_script_prefix(path: &Path) -> Option<PathBuf> {
	let name = path.file_name()?.to_string_lossy();
	let swapped = match name.chars().next()? {
		'.' => format!("_{}", &name[1..]),
		'_' => format!(".{}", &name[1..]),
		_ => return None,
	};
	Some(path.with_file_name(swapped))
}

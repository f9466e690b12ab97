//! Breakpoints and the debug REPL.
//!
//! `:breakadd file 12 foo.vim` compiles the file pattern into a regex; the
//! script reader asks `dbg_find_breakpoint` for the next matching line and
//! queues `dbg_breakpoint` when execution crosses it. The next executed
//! command then drops into `do_debug`, a blocking prompt that understands
//! `cont next step finish quit interrupt` by unambiguous prefix.
//!
//! A global `debug_tick` bumps on every add/delete so active source cookies
//! notice and recompute their break line.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::time::Instant;

use log::debug as log_debug;

use crate::error::{EditorError, Result};
use crate::interrupt::set_interrupt;
use crate::regex::{CompFlags, Prog};
use crate::script::{profile_add_wait, SOURCING};

/// Break at any depth when stepping.
const MAX_BREAK_LEVEL: i64 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpKind {
	Func,
	File,
}

/// One `:breakadd` entry. The pattern is kept both as typed (for `:breaklist`
/// and `:breakdel`) and compiled.
pub struct Breakpoint {
	pub nr: usize,
	pub kind: BpKind,
	pub name: String,
	prog: Prog,
	pub lnum: usize,
	pub forceit: bool,
}

#[derive(Default)]
pub struct DebugState {
	breakpoints: Vec<Breakpoint>,
	next_nr: usize,
	/// Bumped on every breakpoint add/delete
	pub tick: u64,
	/// Stop when the nesting level is at or below this
	pub break_level: i64,
	/// `:debuggreedy`: keep pending typeahead while prompting
	pub greedy: bool,
	did_msg: bool,
	/// Breakpoint crossed by the reader, to fire before the next command
	queued: Option<(String, usize)>,
	/// A skipped command saw a breakpoint; a later command may claim it
	pub skipped: bool,
	skipped_name: Option<String>,
	/// Injected debug-prompt input, consumed before falling back to stdin
	pub typeahead: VecDeque<String>,
}

thread_local! {
	pub static DEBUG: RefCell<DebugState> = RefCell::new(DebugState {
		break_level: -1,
		..Default::default()
	});
}

pub fn debug_tick() -> u64 {
	DEBUG.with_borrow(|d| d.tick)
}

pub fn debug_break_level() -> i64 {
	DEBUG.with_borrow(|d| d.break_level)
}

pub fn set_debug_break_level(level: i64) {
	DEBUG.with_borrow_mut(|d| d.break_level = level);
}

/// Turn a file pattern into a regex source: `*` spans path components, `?`
/// one char, everything else literal. Anchored on both ends.
pub fn file_pat_to_reg_pat(pat: &str) -> String {
	let mut out = String::with_capacity(pat.len() + 8);
	out.push('^');
	for c in pat.chars() {
		match c {
			'*' => out.push_str(".*"),
			'?' => out.push('.'),
			'.' => out.push_str("\\."),
			'\\' | '/' => out.push('/'),
			_ if "[]~$^".contains(c) => {
				out.push('\\');
				out.push(c);
			}
			_ => out.push(c),
		}
	}
	out.push('$');
	out
}

/// `:breakadd func|file [lnum] name`. Returns the breakpoint number.
pub fn dbg_breakadd(kind: BpKind, lnum: usize, name: &str, forceit: bool) -> Result<usize> {
	let pat = file_pat_to_reg_pat(name);
	let prog = Prog::compile(&pat, CompFlags::default())?;
	DEBUG.with_borrow_mut(|d| {
		d.next_nr += 1;
		let nr = d.next_nr;
		d.breakpoints.push(Breakpoint {
			nr,
			kind,
			name: name.to_string(),
			prog,
			lnum: lnum.max(1),
			forceit,
		});
		d.tick += 1;
		Ok(nr)
	})
}

/// `:breakdel nr` / `:breakdel *` / `:breakdel file lnum name`.
pub fn dbg_breakdel(spec: &str) -> Result<()> {
	DEBUG.with_borrow_mut(|d| {
		if spec.trim() == "*" {
			d.breakpoints.clear();
			d.tick += 1;
			return Ok(());
		}
		if let Ok(nr) = spec.trim().parse::<usize>() {
			let before = d.breakpoints.len();
			d.breakpoints.retain(|bp| bp.nr != nr);
			if d.breakpoints.len() == before {
				return Err(EditorError::BreakpointNotFound(spec.to_string()));
			}
			d.tick += 1;
			return Ok(());
		}
		// "file lnum name" / "func name" form
		let mut parts = spec.split_whitespace();
		let kind = match parts.next() {
			Some("file") => BpKind::File,
			Some("func") => BpKind::Func,
			_ => return Err(EditorError::BreakpointNotFound(spec.to_string())),
		};
		let mut rest: Vec<&str> = parts.collect();
		let lnum = match rest.first().and_then(|s| s.parse::<usize>().ok()) {
			Some(n) => {
				rest.remove(0);
				n
			}
			None => 1,
		};
		let name = rest.join(" ");
		let before = d.breakpoints.len();
		d.breakpoints
			.retain(|bp| !(bp.kind == kind && bp.lnum == lnum && bp.name == name));
		if d.breakpoints.len() == before {
			return Err(EditorError::BreakpointNotFound(spec.to_string()));
		}
		d.tick += 1;
		Ok(())
	})
}

/// `:breaklist` output.
pub fn dbg_breaklist() -> String {
	DEBUG.with_borrow(|d| {
		if d.breakpoints.is_empty() {
			return "No breakpoints defined\n".to_string();
		}
		let mut out = String::new();
		for bp in &d.breakpoints {
			let kind = match bp.kind {
				BpKind::Func => "func",
				BpKind::File => "file",
			};
			out.push_str(&format!("{:3}  {kind} {}  line {}\n", bp.nr, bp.name, bp.lnum));
		}
		out
	})
}

/// Smallest breakpoint line strictly after `after_lnum` for this file or
/// function. Zero when there is none.
pub fn dbg_find_breakpoint(is_file: bool, name: &str, after_lnum: usize) -> usize {
	DEBUG.with_borrow(|d| {
		let want = if is_file { BpKind::File } else { BpKind::Func };
		let mut best = 0usize;
		for bp in &d.breakpoints {
			if bp.kind != want || bp.lnum <= after_lnum {
				continue;
			}
			if (best == 0 || bp.lnum < best) && bp.prog.match_str(name).is_some() {
				best = bp.lnum;
			}
		}
		best
	})
}

/// Called by the script reader when execution crossed a breakpoint line. The
/// debugger is entered before the NEXT executed command.
pub fn dbg_breakpoint(name: &str, lnum: usize) {
	DEBUG.with_borrow_mut(|d| {
		d.queued = Some((name.to_string(), lnum));
	});
}

/// Called before each ex command. Fires a queued breakpoint, or steps when
/// the nesting level is at or below the break level. Skipped commands stash
/// the breakpoint for `dbg_check_skipped`. `exec` runs a non-flow debug input
/// as an ex command.
pub fn dbg_check_breakpoint(
	nesting_level: usize,
	cmd: &str,
	skip: bool,
	exec: &mut dyn FnMut(&str),
) {
	let queued = DEBUG.with_borrow_mut(|d| {
		d.skipped = false;
		d.queued.take()
	});
	if let Some((name, lnum)) = queued {
		if skip {
			DEBUG.with_borrow_mut(|d| {
				d.skipped = true;
				d.skipped_name = Some(name);
			});
			return;
		}
		log_debug!("Breakpoint in \"{name}\" line {lnum}");
		do_debug(cmd, nesting_level, exec);
	} else if nesting_level as i64 <= debug_break_level() {
		if skip {
			DEBUG.with_borrow_mut(|d| d.skipped = true);
			return;
		}
		do_debug(cmd, nesting_level, exec);
	}
}

/// A command that was skipped can decide it wants the prompt after all.
pub fn dbg_check_skipped(
	nesting_level: usize,
	cmd: &str,
	exec: &mut dyn FnMut(&str),
) -> bool {
	let claim = DEBUG.with_borrow_mut(|d| {
		if d.skipped {
			d.skipped = false;
			d.skipped_name.take().map(|name| (name, 0usize))
		} else {
			None
		}
	});
	if let Some((name, _)) = claim {
		log_debug!("Breakpoint in \"{name}\" (skipped command)");
		do_debug(cmd, nesting_level, exec);
		return true;
	}
	false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebugCmd {
	Cont,
	Next,
	Step,
	Finish,
	Quit,
	Interrupt,
}

/// Match an abbreviated debug command: the first letter picks the command,
/// the rest must be a prefix of its tail.
fn parse_debug_cmd(input: &str) -> Option<DebugCmd> {
	let word = input.trim();
	let mut chars = word.chars();
	let (cmd, tail) = match chars.next()? {
		'c' => (DebugCmd::Cont, "ont"),
		'n' => (DebugCmd::Next, "ext"),
		's' => (DebugCmd::Step, "tep"),
		'f' => (DebugCmd::Finish, "inish"),
		'q' => (DebugCmd::Quit, "uit"),
		'i' => (DebugCmd::Interrupt, "nterrupt"),
		_ => return None,
	};
	let rest: String = chars.collect();
	let mut tail_chars = tail.chars();
	for c in rest.chars() {
		if tail_chars.next() != Some(c) {
			return None;
		}
	}
	Some(cmd)
}

/// The interactive debug prompt. Blocks until a flow command is given; any
/// other input is executed as an ex command with the break level disabled so
/// the debug command itself is not instrumented.
///
/// Time spent here counts as wait time so profiles stay honest.
pub fn do_debug(cmd: &str, nesting_level: usize, exec: &mut dyn FnMut(&str)) {
	let wait_start = Instant::now();
	let first_time = DEBUG.with_borrow_mut(|d| {
		let first = !d.did_msg;
		d.did_msg = true;
		first
	});
	if first_time {
		eprintln!("Entering Debug mode.  Type \"cont\" to continue.");
	}
	SOURCING.with_borrow(|s| {
		if let Some(name) = &s.name {
			eprintln!("{name}");
		}
		if s.lnum != 0 {
			eprintln!("line {}: {cmd}", s.lnum);
		} else {
			eprintln!("cmd: {cmd}");
		}
	});

	// without 'debuggreedy' pending typeahead is set aside so the prompt
	// really reads from the user
	let saved_typeahead = DEBUG.with_borrow_mut(|d| {
		if d.greedy {
			None
		} else {
			Some(std::mem::take(&mut d.typeahead))
		}
	});

	let mut last_cmd: Option<DebugCmd> = None;
	loop {
		let Some(line) = read_debug_line() else { break };
		let parsed = if line.trim().is_empty() {
			last_cmd
		} else {
			parse_debug_cmd(&line)
		};
		match parsed {
			Some(c) => {
				// do not repeat ">interrupt", continue stepping instead
				last_cmd = Some(if c == DebugCmd::Interrupt { DebugCmd::Step } else { c });
				DEBUG.with_borrow_mut(|d| match c {
					DebugCmd::Cont => d.break_level = -1,
					DebugCmd::Next => d.break_level = nesting_level as i64,
					DebugCmd::Step => d.break_level = MAX_BREAK_LEVEL,
					DebugCmd::Finish => d.break_level = nesting_level as i64 - 1,
					DebugCmd::Quit => {
						set_interrupt();
						d.break_level = -1;
					}
					DebugCmd::Interrupt => {
						set_interrupt();
						d.break_level = MAX_BREAK_LEVEL;
					}
				});
				break;
			}
			None if !line.trim().is_empty() => {
				// execute as an ex command with debugging paused, so the
				// debug command itself is not instrumented
				let save_level = debug_break_level();
				set_debug_break_level(-1);
				exec(&line);
				set_debug_break_level(save_level);
			}
			None => {}
		}
	}

	if let Some(saved) = saved_typeahead {
		DEBUG.with_borrow_mut(|d| d.typeahead = saved);
	}
	profile_add_wait(wait_start.elapsed());
}

/// One line of debug-prompt input: injected typeahead first, then stdin.
fn read_debug_line() -> Option<String> {
	let queued = DEBUG.with_borrow_mut(|d| d.typeahead.pop_front());
	if queued.is_some() {
		return queued;
	}
	eprint!("> ");
	let _ = std::io::stderr().flush();
	let mut line = String::new();
	match std::io::stdin().lock().read_line(&mut line) {
		Ok(0) | Err(_) => None,
		Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
	}
}

//! The NFA executor: a two-list Thompson simulation.
//!
//! Two thread lists alternate per input codepoint. Zero-width states are
//! chased eagerly in `addstate` so the lists only ever hold threads blocked on
//! a character. Look-arounds either recurse immediately (`first` states) or
//! ride along as postponed invisible matches (PIMs) that are resolved when
//! their thread might actually reach a match. Backreferences consume their
//! captured text through an `NFA_SKIP`-style counter state.
//!
//! The per-execution `lastlist` bookkeeping lives in a scratch vector here,
//! not in the (immutable) program; slot 1 serves the one permitted level of
//! recursive look-around execution.
use std::time::Instant;

use log::trace;

use crate::error::{EditorError, Result};
use crate::interrupt::interrupted;

use super::nfa::match_follows;
use super::parse::{fold_case, is_combining};
use super::{
	class_match, ClassKind, LineSource, NSUBEXP, NfaState, NONE, Op, Prog, RegMatch, RegexEnv,
	Span, StateIdx,
};

/// Hard cap on list ids; exceeding it means the simulation exploded.
const NFA_MAX_STATES: u32 = 100_000;

/// A captured span during simulation; -1 marks "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpanM {
	start_lnum: i64,
	start_col: i64,
	end_lnum: i64,
	end_col: i64,
}

impl SpanM {
	const EMPTY: SpanM = SpanM { start_lnum: -1, start_col: -1, end_lnum: -1, end_col: -1 };
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sub {
	in_use: usize,
	spans: [SpanM; NSUBEXP],
}

impl Default for Sub {
	fn default() -> Self {
		Self { in_use: 0, spans: [SpanM::EMPTY; NSUBEXP] }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Subs {
	norm: Sub,
	synt: Sub,
}

/// Copy all but the whole-match span, keeping the target's slot 0.
fn copy_sub_off(to: &mut Sub, from: &Sub) {
	if to.in_use < from.in_use {
		to.in_use = from.in_use;
	}
	if from.in_use > 1 {
		to.spans[1..from.in_use].copy_from_slice(&from.spans[1..from.in_use]);
	}
}

/// When the recursive call set an end via `\ze`, propagate it.
fn copy_ze_off(to: &mut Sub, from: &Sub) {
	if from.in_use > 0 && from.spans[0].end_lnum >= 0 {
		to.spans[0].end_lnum = from.spans[0].end_lnum;
		to.spans[0].end_col = from.spans[0].end_col;
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PimResult {
	Unused,
	Todo,
	Match,
	NoMatch,
}

/// A postponed invisible match: the look-around fragment to verify later and
/// the position it must verify at.
#[derive(Debug, Clone, PartialEq)]
struct Pim {
	result: PimResult,
	state: StateIdx,
	subs: Subs,
	end: (usize, usize),
}

impl Pim {
	const UNUSED: Pim = Pim {
		result: PimResult::Unused,
		state: NONE,
		subs: Subs { norm: Sub { in_use: 0, spans: [SpanM::EMPTY; NSUBEXP] }, synt: Sub { in_use: 0, spans: [SpanM::EMPTY; NSUBEXP] } },
		end: (0, 0),
	};
	fn is_unused(&self) -> bool {
		self.result == PimResult::Unused
	}
}

fn pim_equal(a: &Pim, b: Option<&Pim>) -> bool {
	let b_unused = b.is_none_or(|p| p.is_unused());
	if a.is_unused() {
		return b_unused;
	}
	let Some(b) = b else { return false };
	if b.is_unused() {
		return false;
	}
	a.state == b.state && a.end == b.end
}

#[derive(Debug, Clone)]
struct Thread {
	state: StateIdx,
	/// Bytes left for an `NFA_SKIP` state to consume
	count: usize,
	pim: Pim,
	subs: Subs,
}

#[derive(Debug, Default)]
struct ThreadList {
	threads: Vec<Thread>,
	id: u32,
	has_pim: bool,
}

impl ThreadList {
	fn clear(&mut self) {
		self.threads.clear();
		self.has_pim = false;
	}
}

/// Where an added state's submatch positions should point.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Off {
	/// Current position plus `clen` bytes (0 = right here, no reorder)
	Ahead(usize),
	/// First column of the next line
	NextLine,
	/// Zero-width add at list position `listidx` (addstate_here)
	Here(usize),
}

struct Exec<'a> {
	prog: &'a Prog,
	src: &'a dyn LineSource,
	env: &'a RegexEnv,
	/// Current input position
	lnum: usize,
	col: usize,
	/// The line matching started on; matches may only start there
	first_lnum: usize,
	lastlist: Vec<[u32; 2]>,
	ll_index: usize,
	listid: u32,
	alt_listid: u32,
	/// End position a look-behind fragment must stop at
	endp: Option<(usize, usize)>,
	nfa_match: bool,
	deadline: Option<Instant>,
	time_count: u32,
	timed_out: bool,
}

impl Prog {
	/// Try a match starting on line `lnum` at or after byte `col`. The match
	/// may span further lines but must begin on `lnum`.
	pub fn exec_multi(
		&self,
		src: &dyn LineSource,
		lnum: usize,
		col: usize,
		env: &RegexEnv,
		deadline: Option<Instant>,
	) -> Result<Option<RegMatch>> {
		let line = src.match_line(lnum).unwrap_or("");
		let mut col = col.min(line.len());

		if self.reganch && col > 0 {
			return Ok(None);
		}
		// a literal-only pattern gets a plain substring scan
		if let Some(text) = &self.match_text {
			return Ok(self.find_match_text(line, lnum, col, text));
		}
		if let Some(start) = self.regstart
			&& let Some(found) = skip_to_start(line, col, start, self.icase)
		{
			col = found;
		} else if self.regstart.is_some() {
			return Ok(None);
		}

		let mut exec = Exec {
			prog: self,
			src,
			env,
			lnum,
			col,
			first_lnum: lnum,
			lastlist: vec![[0, 0]; self.states.len()],
			ll_index: 0,
			listid: 0,
			alt_listid: 1,
			endp: None,
			nfa_match: false,
			deadline,
			time_count: 0,
			timed_out: false,
		};
		let mut subs = Subs::default();
		let mut m = Subs::default();
		let matched = exec.regmatch(self.start, &mut subs, &mut m)?;
		if exec.timed_out {
			return Err(EditorError::Timeout);
		}
		if interrupted() {
			return Err(EditorError::Interrupt);
		}
		if !matched {
			return Ok(None);
		}
		Ok(Some(subs_to_match(&subs)))
	}

	/// Single-string convenience for callers without a buffer.
	pub fn match_str(&self, text: &str) -> Option<RegMatch> {
		let lines = super::Lines(&[text]);
		self.exec_multi(&lines, 1, 0, &RegexEnv::default(), None)
			.ok()
			.flatten()
	}

	fn find_match_text(&self, line: &str, lnum: usize, col: usize, text: &str) -> Option<RegMatch> {
		let found = skip_to_text(line, col, text, self.icase)?;
		let mut rm = RegMatch::default();
		rm.subs[0] = Some(Span {
			start_lnum: lnum,
			start_col: found,
			end_lnum: lnum,
			end_col: found + matched_len(line, found, text, self.icase),
		});
		Some(rm)
	}
}

fn subs_to_match(subs: &Subs) -> RegMatch {
	let mut rm = RegMatch::default();
	for i in 0..subs.norm.in_use {
		let s = subs.norm.spans[i];
		if s.start_lnum >= 0 && s.end_lnum >= 0 {
			rm.subs[i] = Some(Span {
				start_lnum: s.start_lnum as usize,
				start_col: s.start_col as usize,
				end_lnum: s.end_lnum as usize,
				end_col: s.end_col as usize,
			});
		}
	}
	for i in 0..subs.synt.in_use {
		let s = subs.synt.spans[i];
		if s.start_lnum >= 0 && s.end_lnum >= 0 {
			rm.zsubs[i] = Some(Span {
				start_lnum: s.start_lnum as usize,
				start_col: s.start_col as usize,
				end_lnum: s.end_lnum as usize,
				end_col: s.end_col as usize,
			});
		}
	}
	rm
}

/// Find the next occurrence of `start` at or after byte `col`.
fn skip_to_start(line: &str, col: usize, start: char, icase: bool) -> Option<usize> {
	let folded = fold_case(start);
	line[col..]
		.char_indices()
		.find(|(_, c)| *c == start || (icase && fold_case(*c) == folded))
		.map(|(i, _)| col + i)
}

fn skip_to_text(line: &str, mut col: usize, text: &str, icase: bool) -> Option<usize> {
	let first = text.chars().next()?;
	loop {
		let at = skip_to_start(line, col, first, icase)?;
		if text_matches_at(line, at, text, icase) {
			return Some(at);
		}
		col = at + line[at..].chars().next().map_or(1, char::len_utf8);
	}
}

fn text_matches_at(line: &str, at: usize, text: &str, icase: bool) -> bool {
	if !icase {
		return line[at..].starts_with(text);
	}
	let mut chars = line[at..].chars();
	text.chars().all(|t| chars.next().is_some_and(|c| fold_case(c) == fold_case(t)))
}

fn matched_len(line: &str, at: usize, text: &str, _icase: bool) -> usize {
	// same number of chars as the literal, in the line's own bytes
	line[at..]
		.char_indices()
		.nth(text.chars().count())
		.map_or(line.len() - at, |(i, _)| i)
}

impl<'a> Exec<'a> {
	fn line(&self) -> &'a str {
		self.src.match_line(self.lnum).unwrap_or("")
	}

	/// Current codepoint and its byte length; `None` at end of line.
	fn curc(&self) -> (Option<char>, usize) {
		match self.line()[self.col..].chars().next() {
			Some(c) => (Some(c), c.len_utf8()),
			None => (None, 0),
		}
	}

	fn check_timeout(&mut self) -> bool {
		self.time_count += 1;
		if self.time_count >= 20 {
			self.time_count = 0;
			if let Some(deadline) = self.deadline
				&& Instant::now() >= deadline
			{
				self.timed_out = true;
				return true;
			}
		}
		false
	}

	fn state(&self, idx: StateIdx) -> &NfaState {
		&self.prog.states[idx as usize]
	}

	/// The thread-list budget from 'maxmempattern'.
	fn list_too_big(&self, len: usize) -> bool {
		let bytes = len.saturating_mul(std::mem::size_of::<Thread>());
		(bytes >> 10) >= self.env.maxmempattern
	}

	/// Virtual column (1-based, like `\%v` counts) of the current position.
	fn cur_vcol(&self) -> usize {
		let ts = self.env.tabstop.max(1);
		let mut vcol = 0;
		for (i, c) in self.line().char_indices() {
			if i >= self.col {
				break;
			}
			vcol += if c == '\t' { ts - vcol % ts } else { 1 };
		}
		vcol
	}

	// ------------------------------------------------------------------
	// addstate

	/// Add `state` to list `l`, chasing zero-width states so the list only
	/// holds threads blocked on a character. Returns `None` on the memory
	/// budget being exceeded.
	fn addstate(
		&mut self,
		l: &mut ThreadList,
		state_idx: StateIdx,
		subs: &mut Subs,
		pim: Option<&Pim>,
		off: Off,
		depth: usize,
	) -> Option<()> {
		if depth >= 4000 {
			return None;
		}
		let op = self.state(state_idx).op;

		match op {
			// not added themselves; their outs are chased below
			Op::Nclose
			| Op::Mclose(_)
			| Op::Zclose(_)
			| Op::Mopen(0)
			| Op::Zend
			| Op::Split
			| Op::Empty => {}

			Op::Bol | Op::Bof
				if self.col > 0
					&& self.curc().0.is_some()
					&& self
						.endp
						.is_none_or(|(elnum, _)| self.lnum == elnum) =>
			{
				// "^" won't match past the start of a line, don't bother
				return Some(());
			}

			_ => {
				let ll = self.ll_index;
				if self.lastlist[state_idx as usize][ll] == l.id
					&& op != Op::Skip
				{
					if !self.prog.has_backref
						&& pim.is_none()
						&& !l.has_pim
						&& op != Op::Match
					{
						// inserted before existing states?
						let found = if let Off::Here(listidx) = off {
							l.threads[..listidx.min(l.threads.len())]
								.iter()
								.any(|t| t.state == state_idx)
						} else {
							true
						};
						if found {
							return Some(());
						}
					} else if self.has_state_with_pos(l, state_idx, subs, pim) {
						return Some(());
					}
				}
				if self.list_too_big(l.threads.len() + 1) {
					return None;
				}
				self.lastlist[state_idx as usize][ll] = l.id;
				let thread = Thread {
					state: state_idx,
					count: 0,
					pim: pim.cloned().unwrap_or(Pim::UNUSED),
					subs: subs.clone(),
				};
				if pim.is_some() {
					l.has_pim = true;
				}
				l.threads.push(thread);
			}
		}

		let state = *self.state(state_idx);
		match op {
			Op::Match => {}
			Op::Split => {
				// order matters: first branch has priority (greedy preference)
				self.addstate(l, state.out, subs, pim, off, depth + 1)?;
				self.addstate(l, state.out1, subs, pim, off, depth + 1)?;
			}
			Op::Empty | Op::Nopen | Op::Nclose => {
				self.addstate(l, state.out, subs, pim, off, depth + 1)?;
			}
			Op::Mopen(_) | Op::Zopen(_) | Op::Zstart => {
				let (sub_is_z, subidx) = match op {
					Op::Zstart => (false, 0),
					Op::Zopen(n) => (true, n as usize),
					Op::Mopen(n) => (false, n as usize),
					_ => unreachable!(),
				};
				let (pos_lnum, pos_col) = self.off_pos(off);
				let sub = if sub_is_z { &mut subs.synt } else { &mut subs.norm };
				let save = sub.spans[subidx];
				let save_in_use = if subidx < sub.in_use {
					None
				} else {
					let prev = sub.in_use;
					for i in sub.in_use..subidx {
						sub.spans[i] = SpanM::EMPTY;
					}
					sub.in_use = subidx + 1;
					Some(prev)
				};
				sub.spans[subidx].start_lnum = pos_lnum as i64;
				sub.spans[subidx].start_col = pos_col as i64;
				sub.spans[subidx].end_lnum = -1;

				self.addstate(l, state.out, subs, pim, off, depth + 1)?;

				let sub = if sub_is_z { &mut subs.synt } else { &mut subs.norm };
				match save_in_use {
					None => sub.spans[subidx] = save,
					Some(prev) => sub.in_use = prev,
				}
			}
			Op::Mclose(0) if self.prog.has_zend && subs.norm.spans[0].end_lnum >= 0 => {
				// do not overwrite the position set by \ze
				self.addstate(l, state.out, subs, pim, off, depth + 1)?;
			}
			Op::Mclose(_) | Op::Zclose(_) | Op::Zend => {
				let (sub_is_z, subidx) = match op {
					Op::Zend => (false, 0),
					Op::Zclose(n) => (true, n as usize),
					Op::Mclose(n) => (false, n as usize),
					_ => unreachable!(),
				};
				let (pos_lnum, pos_col) = self.off_pos(off);
				let sub = if sub_is_z { &mut subs.synt } else { &mut subs.norm };
				let save_in_use = sub.in_use;
				if sub.in_use <= subidx {
					sub.in_use = subidx + 1;
				}
				let save = sub.spans[subidx];
				sub.spans[subidx].end_lnum = pos_lnum as i64;
				sub.spans[subidx].end_col = pos_col as i64;

				self.addstate(l, state.out, subs, pim, off, depth + 1)?;

				let sub = if sub_is_z { &mut subs.synt } else { &mut subs.norm };
				sub.spans[subidx] = save;
				sub.in_use = save_in_use;
			}
			_ => {}
		}
		Some(())
	}

	/// The buffer position an `Off` refers to.
	fn off_pos(&self, off: Off) -> (usize, usize) {
		match off {
			Off::Ahead(clen) => (self.lnum, self.col + clen),
			Off::NextLine => (self.lnum + 1, 0),
			Off::Here(_) => (self.lnum, self.col),
		}
	}

	/// Like `addstate`, but the new states are inserted at list position
	/// `listidx`, so the order of states to be tried does not change.
	/// Returns the adjustment for the caller's loop index.
	fn addstate_here(
		&mut self,
		l: &mut ThreadList,
		state_idx: StateIdx,
		subs: &mut Subs,
		pim: Option<&Pim>,
		listidx: &mut usize,
	) -> Option<()> {
		let tlen = l.threads.len();
		self.addstate(l, state_idx, subs, pim, Off::Here(*listidx), 0)?;
		// when the current position was the end of the list, the new states
		// already sit in the right place
		if *listidx + 1 == tlen {
			return Some(());
		}
		let count = l.threads.len() - tlen;
		if count == 0 {
			return Some(());
		}
		// move the new states from the tail to the current position, replacing
		// the consumed thread; the caller's loop then processes them next
		let new_states: Vec<Thread> = l.threads.split_off(l.threads.len() - count);
		l.threads.splice(*listidx..=*listidx, new_states);
		*listidx = listidx.wrapping_sub(1);
		Some(())
	}

	fn has_state_with_pos(
		&self,
		l: &ThreadList,
		state_idx: StateIdx,
		subs: &Subs,
		pim: Option<&Pim>,
	) -> bool {
		l.threads.iter().any(|t| {
			t.state == state_idx
				&& t.subs.norm == subs.norm
				&& (!self.prog.has_zsubexpr || t.subs.synt == subs.synt)
				&& pim_equal(&t.pim, pim)
		})
	}

	// ------------------------------------------------------------------
	// recursive look-around

	/// Run the invisible fragment rooted at `state_idx` from the current (or
	/// the PIM's) position. Restores the input position afterwards.
	fn recursive_regmatch(
		&mut self,
		state_idx: StateIdx,
		pim: Option<&Pim>,
		submatch: &mut Subs,
		m: &mut Subs,
	) -> Result<bool> {
		let save_col = self.col;
		let save_lnum = self.lnum;
		let save_match = self.nfa_match;
		let save_listid = self.listid;
		let save_endp = self.endp;

		if let Some(pim) = pim {
			self.lnum = pim.end.0;
			self.col = pim.end.1;
		}

		let state = *self.state(state_idx);
		if let Op::StartInvisible { kind, off, .. } = state.op
			&& kind.is_before()
		{
			// the recursive match must end exactly where we are now
			self.endp = Some((self.lnum, self.col));
			if off == 0 {
				// unknown width: go back as far as the previous line
				if self.lnum > 1 {
					self.lnum -= 1;
				}
				self.col = 0;
			} else {
				if self.col < off && self.lnum > 1 {
					self.lnum -= 1;
					self.col = self.line().len();
				}
				if self.col >= off {
					self.col -= off;
					// back up to a char boundary
					while self.col > 0 && !self.line().is_char_boundary(self.col) {
						self.col -= 1;
					}
				} else {
					self.col = 0;
				}
			}
		}

		// clear the visited bookkeeping for the nested run
		let mut saved_listids: Option<Vec<u32>> = None;
		if self.ll_index == 1 {
			// already recursing: save and clear the nested slots
			let ids: Vec<u32> = self.lastlist.iter().map(|ll| ll[1]).collect();
			for ll in self.lastlist.iter_mut() {
				ll[1] = 0;
			}
			saved_listids = Some(ids);
		} else {
			self.ll_index = 1;
			if self.listid <= self.alt_listid {
				self.listid = self.alt_listid;
			}
		}

		let result = self.regmatch(state.out, submatch, m);

		match saved_listids {
			Some(ids) => {
				for (ll, id) in self.lastlist.iter_mut().zip(ids) {
					ll[1] = id;
				}
			}
			None => {
				self.ll_index = 0;
				self.alt_listid = self.listid;
			}
		}

		self.lnum = save_lnum;
		self.col = save_col;
		self.endp = save_endp;
		if !matches!(result, Err(EditorError::TooExpensive)) {
			self.nfa_match = save_match;
			self.listid = save_listid;
		}
		result
	}

	// ------------------------------------------------------------------
	// main loop

	fn regmatch(&mut self, start: StateIdx, submatch: &mut Subs, m: &mut Subs) -> Result<bool> {
		if interrupted() {
			return Ok(false);
		}
		if self.timed_out {
			return Ok(false);
		}
		self.nfa_match = false;

		let mut thislist = ThreadList::default();
		let mut nextlist = ThreadList::default();
		let toplevel = self.state(start).op == Op::Mopen(0);

		thislist.id = self.listid + 1;
		if toplevel {
			m.norm.spans[0].start_lnum = self.lnum as i64;
			m.norm.spans[0].start_col = self.col as i64;
			m.norm.in_use = 1;
			let out = self.state(start).out;
			if self.addstate(&mut thislist, out, m, None, Off::Ahead(0), 0).is_none() {
				return Err(EditorError::TooExpensive);
			}
		} else if self.addstate(&mut thislist, start, m, None, Off::Ahead(0), 0).is_none() {
			return Err(EditorError::TooExpensive);
		}

		// run for each input codepoint
		'mainloop: loop {
			let (curc, mut clen) = self.curc();
			let mut go_to_nextline = false;

			std::mem::swap(&mut thislist, &mut nextlist);
			nextlist.clear();
			self.listid += 1;
			if self.listid >= NFA_MAX_STATES {
				return Err(EditorError::TooExpensive);
			}
			thislist.id = self.listid;
			nextlist.id = self.listid + 1;

			if thislist.threads.is_empty() {
				break;
			}

			let mut listidx = 0usize;
			while listidx < thislist.threads.len() {
				if interrupted() {
					break 'mainloop;
				}
				if self.check_timeout() {
					break 'mainloop;
				}
				let t = thislist.threads[listidx].clone();
				let state = *self.state(t.state);

				let mut add_state: StateIdx = NONE;
				let mut add_here = false;
				let mut add_off = Off::Ahead(0);
				let mut add_count = 0usize;
				let mut result;

				match state.op {
					Op::Match => {
						// a match ending in the middle of a composing char
						// is not really a match
						if self.col > 0 && curc.is_some_and(is_combining) {
							listidx += 1;
							continue;
						}
						self.nfa_match = true;
						*submatch = t.subs.clone();
						// leftmost-longest found: ignore later states here
						if nextlist.threads.is_empty() {
							clen = 0;
						}
						break;
					}

					Op::EndInvisible { .. } | Op::EndPattern => {
						// the invisible group finished; only a match when it
						// ends at the required position
						if let Some(endp) = self.endp
							&& (self.lnum, self.col) != endp
						{
							listidx += 1;
							continue;
						}
						// do not set submatches for \@! / \@<!
						if !matches!(state.op, Op::EndInvisible { neg: true }) {
							*m = t.subs.clone();
						}
						self.nfa_match = true;
						if nextlist.threads.is_empty() {
							clen = 0;
						}
						break;
					}

					Op::StartInvisible { kind, first, off: _ } => {
						if !t.pim.is_unused() || first {
							// evaluate the look-around right now
							let save_in_use = m.norm.in_use;
							copy_sub_off(&mut m.norm, &t.subs.norm);
							if self.prog.has_zsubexpr {
								copy_sub_off(&mut m.synt, &t.subs.synt);
							}
							result = self.recursive_regmatch(t.state, None, submatch, m)?;
							if result != kind.is_neg() {
								let mut new_subs = t.subs.clone();
								copy_sub_off(&mut new_subs.norm, &m.norm);
								if self.prog.has_zsubexpr {
									copy_sub_off(&mut new_subs.synt, &m.synt);
								}
								copy_ze_off(&mut new_subs.norm, &m.norm);
								thislist.threads[listidx].subs = new_subs.clone();
								let cont = self.state(state.out1).out;
								let mut subs_for_add = new_subs;
								if self
									.addstate_here(
										&mut thislist,
										cont,
										&mut subs_for_add,
										None,
										&mut listidx,
									)
									.is_none()
								{
									return Err(EditorError::TooExpensive);
								}
							}
							m.norm.in_use = save_in_use;
						} else {
							// postpone: first try what follows, only verify
							// the invisible match if that can succeed
							let pim = Pim {
								result: PimResult::Todo,
								state: t.state,
								subs: Subs::default(),
								end: (self.lnum, self.col),
							};
							let cont = self.state(state.out1).out;
							let mut subs_for_add = t.subs.clone();
							if self
								.addstate_here(
									&mut thislist,
									cont,
									&mut subs_for_add,
									Some(&pim),
									&mut listidx,
								)
								.is_none()
							{
								return Err(EditorError::TooExpensive);
							}
						}
						listidx = listidx.wrapping_add(1);
						continue;
					}

					Op::StartPattern => {
						// no point if the output state is already queued
						let end_pat = self.state(state.out1).out; // the SKIP
						let after = self.state(end_pat).out;
						if self.state_in_list(&nextlist, end_pat, &t.subs)
							|| self.state_in_list(&nextlist, after, &t.subs)
							|| self.state_in_list(&thislist, after, &t.subs)
						{
							listidx += 1;
							continue;
						}
						copy_sub_off(&mut m.norm, &t.subs.norm);
						if self.prog.has_zsubexpr {
							copy_sub_off(&mut m.synt, &t.subs.synt);
						}
						result = self.recursive_regmatch(t.state, None, submatch, m)?;
						if result {
							let mut new_subs = t.subs.clone();
							copy_sub_off(&mut new_subs.norm, &m.norm);
							if self.prog.has_zsubexpr {
								copy_sub_off(&mut new_subs.synt, &m.synt);
							}
							thislist.threads[listidx].subs = new_subs.clone();
							let bytelen = (m.norm.spans[0].end_col.max(0) as usize)
								.saturating_sub(self.col);
							if bytelen == 0 {
								add_here = true;
								add_state = after;
							} else if bytelen <= clen {
								add_state = after;
								add_off = Off::Ahead(clen);
							} else {
								add_state = end_pat;
								add_off = Off::Ahead(bytelen);
								add_count = bytelen - clen;
							}
						}
					}

					Op::Bol => {
						if self.col == 0 {
							add_here = true;
							add_state = state.out;
						}
					}
					Op::Eol => {
						if curc.is_none() {
							add_here = true;
							add_state = state.out;
						}
					}
					Op::Bof => {
						if self.lnum == 1 && self.col == 0 {
							add_here = true;
							add_state = state.out;
						}
					}
					Op::Eof => {
						if self.lnum == self.src.last_lnum() && curc.is_none() {
							add_here = true;
							add_state = state.out;
						}
					}
					Op::Bow => {
						let is_word = curc.is_some_and(|c| class_match(ClassKind::Kword, c));
						let prev_word = self
							.prev_char()
							.is_some_and(|c| class_match(ClassKind::Kword, c));
						if is_word && !prev_word {
							add_here = true;
							add_state = state.out;
						}
					}
					Op::Eow => {
						let is_word = curc.is_some_and(|c| class_match(ClassKind::Kword, c));
						let prev_word = self
							.prev_char()
							.is_some_and(|c| class_match(ClassKind::Kword, c));
						if !is_word && prev_word {
							add_here = true;
							add_state = state.out;
						}
					}

					Op::Newl => {
						if curc.is_none() && self.lnum < self.src.last_lnum() {
							go_to_nextline = true;
							add_state = state.out;
							add_off = Off::NextLine;
						}
					}

					Op::StartColl { neg, add_nl } => {
						match curc {
							None => {
								if add_nl && self.lnum < self.src.last_lnum() {
									go_to_nextline = true;
									let end = self.collection_end(t.state);
									add_state = self.state(end).out;
									add_off = Off::NextLine;
								}
							}
							Some(c) => {
								let (end, hit) = self.walk_collection(t.state, c);
								if hit != neg {
									add_state = self.state(end).out;
									add_off = Off::Ahead(clen);
								}
							}
						}
					}

					Op::Class { kind, neg, add_nl } => {
						match curc {
							None => {
								if add_nl && self.lnum < self.src.last_lnum() {
									go_to_nextline = true;
									add_state = state.out;
									add_off = Off::NextLine;
								}
							}
							Some(c) => {
								let mut hit = class_match(kind, c) != neg;
								if !hit
									&& self.prog.icase && matches!(kind, ClassKind::LowerAsc | ClassKind::UpperAsc)
								{
									hit = c.is_ascii_alphabetic() != neg;
								}
								if hit {
									add_state = state.out;
									add_off = Off::Ahead(clen);
								}
							}
						}
					}

					Op::Backref(n) | Op::ZBackref(n) => {
						let sub = if matches!(state.op, Op::Backref(_)) {
							&t.subs.norm
						} else {
							&t.subs.synt
						};
						if let Some(bytelen) = self.match_backref(sub, n as usize) {
							let after = self.state(state.out).out; // past the SKIP
							if bytelen == 0 {
								add_here = true;
								add_state = after;
							} else if bytelen <= clen {
								add_state = after;
								add_off = Off::Ahead(clen);
							} else {
								add_state = state.out;
								add_off = Off::Ahead(bytelen);
								add_count = bytelen - clen;
							}
						}
					}

					Op::Skip => {
						if t.count <= clen {
							add_state = state.out;
							add_off = Off::Ahead(clen);
						} else {
							add_state = t.state;
							add_off = Off::Ahead(0);
							add_count = t.count - clen;
						}
					}

					Op::Lnum(cmp, val) => {
						if cmp.matches(val, self.lnum) {
							add_here = true;
							add_state = state.out;
						}
					}
					Op::Col(cmp, val) => {
						if cmp.matches(val, self.col + 1) {
							add_here = true;
							add_state = state.out;
						}
					}
					Op::Vcol(cmp, val) => {
						if cmp.matches(val, self.cur_vcol() + 1) {
							add_here = true;
							add_state = state.out;
						}
					}
					Op::Mark(cmp, name) => {
						if let Some(&(_, (mlnum, mcol))) =
							self.env.marks.iter().find(|(n, _)| *n == name)
						{
							let here = (self.lnum, self.col);
							let hit = match cmp {
								super::Cmp::Eq => here == (mlnum, mcol),
								super::Cmp::Lt => here < (mlnum, mcol),
								super::Cmp::Gt => here > (mlnum, mcol),
							};
							if hit {
								add_here = true;
								add_state = state.out;
							}
						}
					}
					Op::Cursor => {
						if self.env.cursor == Some((self.lnum, self.col)) {
							add_here = true;
							add_state = state.out;
						}
					}
					Op::Visual => {
						if let Some((vs, ve)) = self.env.visual {
							let here = (self.lnum, self.col);
							if here >= vs && here <= ve {
								add_here = true;
								add_state = state.out;
							}
						}
					}

					Op::Composing => {
						if let Some((consumed, ok)) = self.match_composing(t.state, curc) {
							if ok {
								let cont = self.state(state.out1).out; // END_COMPOSING.out
								add_state = cont;
								add_off = Off::Ahead(consumed);
							}
						}
					}
					Op::AnyComposing => {
						// always matches; skip over composing chars
						if curc.is_some_and(is_combining) {
							add_state = state.out;
							add_off = Off::Ahead(clen);
						} else {
							add_here = true;
							add_state = state.out;
						}
					}

					Op::Mopen(_) | Op::Zopen(_) | Op::Nopen | Op::Zstart => {
						// only in the list to catch loops; nothing to do
					}

					Op::Char(pc) => {
						let hit = curc.is_some_and(|c| {
							c == pc || (self.prog.icase && fold_case(c) == fold_case(pc))
						});
						if hit {
							add_state = state.out;
							add_off = Off::Ahead(clen);
						}
					}

					_ => {
						trace!("unhandled state in list: {:?}", state.op);
					}
				}

				// handle the postponed invisible match when this thread may
				// finish without consuming more input
				if add_state != NONE {
					let mut pim_to_pass: Option<Pim> =
						(!t.pim.is_unused()).then(|| t.pim.clone());

					if pim_to_pass.is_some()
						&& (clen == 0 || match_follows(&self.prog.states, add_state, 0))
					{
						let mut pim = pim_to_pass.take().unwrap();
						let verdict = if pim.result == PimResult::Todo {
							let r = self.recursive_regmatch(pim.state, Some(&pim), submatch, m)?;
							pim.result = if r { PimResult::Match } else { PimResult::NoMatch };
							let Op::StartInvisible { kind, .. } = self.state(pim.state).op else {
								unreachable!()
							};
							if r != kind.is_neg() {
								copy_sub_off(&mut pim.subs.norm, &m.norm);
								if self.prog.has_zsubexpr {
									copy_sub_off(&mut pim.subs.synt, &m.synt);
								}
							}
							r
						} else {
							pim.result == PimResult::Match
						};
						// remember the verdict for other threads sharing it
						if listidx < thislist.threads.len() {
							thislist.threads[listidx].pim = pim.clone();
						}
						let Op::StartInvisible { kind, .. } = self.state(pim.state).op else {
							unreachable!()
						};
						if verdict != kind.is_neg() {
							let mut new_subs = t.subs.clone();
							copy_sub_off(&mut new_subs.norm, &pim.subs.norm);
							if self.prog.has_zsubexpr {
								copy_sub_off(&mut new_subs.synt, &pim.subs.synt);
							}
							let mut subs_for_add = new_subs;
							let ok = if add_here {
								self.addstate_here(
									&mut thislist,
									add_state,
									&mut subs_for_add,
									None,
									&mut listidx,
								)
							} else {
								let r = self.addstate(
									&mut nextlist,
									add_state,
									&mut subs_for_add,
									None,
									add_off,
									0,
								);
								if r.is_some() && add_count > 0 {
									if let Some(last) = nextlist.threads.last_mut() {
										last.count = add_count;
									}
								}
								r
							};
							if ok.is_none() {
								return Err(EditorError::TooExpensive);
							}
						}
						// look-around failed: don't add the state
					} else {
						let mut subs_for_add = t.subs.clone();
						let pim_ref = pim_to_pass.as_ref();
						let ok = if add_here {
							self.addstate_here(
								&mut thislist,
								add_state,
								&mut subs_for_add,
								pim_ref,
								&mut listidx,
							)
						} else {
							let r = self.addstate(
								&mut nextlist,
								add_state,
								&mut subs_for_add,
								pim_ref,
								add_off,
								0,
							);
							if r.is_some() && add_count > 0 {
								if let Some(last) = nextlist.threads.last_mut() {
									last.count = add_count;
								}
							}
							r
						};
						if ok.is_none() {
							return Err(EditorError::TooExpensive);
						}
					}
				}
				listidx = listidx.wrapping_add(1);
			}

			// Look for the start of a match in the current position by adding
			// the start state; the first found match is the leftmost one.
			let within_endp = self.endp.is_some_and(|(elnum, ecol)| {
				self.lnum < elnum || (self.lnum == elnum && self.col < ecol)
			});
			if !self.nfa_match
				&& ((toplevel && self.lnum == self.first_lnum && clen != 0) || within_endp)
			{
				if toplevel {
					let mut add = true;
					if let Some(rs) = self.prog.regstart
						&& clen != 0
					{
						if nextlist.threads.is_empty() {
							// skip ahead to the char the match must start with
							match skip_to_start(self.line(), self.col + clen, rs, self.prog.icase)
							{
								Some(found) => self.col = found - clen,
								None => break,
							}
						} else {
							let next_c = self.line()[self.col + clen..].chars().next();
							if !next_c.is_some_and(|c| {
								c == rs || (self.prog.icase && fold_case(c) == fold_case(rs))
							}) {
								add = false;
							}
						}
					}
					if add {
						m.norm.spans[0].start_lnum = self.lnum as i64;
						m.norm.spans[0].start_col = (self.col + clen) as i64;
						let out = self.state(start).out;
						if self
							.addstate(&mut nextlist, out, m, None, Off::Ahead(clen), 0)
							.is_none()
						{
							return Err(EditorError::TooExpensive);
						}
					}
				} else if self
					.addstate(&mut nextlist, start, m, None, Off::Ahead(clen), 0)
					.is_none()
				{
					return Err(EditorError::TooExpensive);
				}
			}

			// advance to the next character, or the next line, or finish
			if clen != 0 {
				self.col += clen;
			} else if go_to_nextline
				|| self
					.endp
					.is_some_and(|(elnum, _)| self.lnum < elnum)
			{
				self.lnum += 1;
				self.col = 0;
			} else {
				break;
			}

			if interrupted() {
				break;
			}
			if self.check_timeout() {
				break;
			}
		}

		Ok(self.nfa_match)
	}

	fn prev_char(&self) -> Option<char> {
		if self.col == 0 {
			return None;
		}
		self.line()[..self.col].chars().next_back()
	}

	/// Walk the item chain of the collection starting at `coll_idx`; returns
	/// the `EndColl` index and whether `c` is in the set (before negation).
	fn walk_collection(&self, coll_idx: StateIdx, c: char) -> (StateIdx, bool) {
		let states = &self.prog.states[..];
		let mut idx = states[coll_idx as usize].out;
		let mut hit = false;
		let icase = self.prog.icase;
		let fc = fold_case(c);
		loop {
			let state = &states[idx as usize];
			match state.op {
				Op::EndColl => break,
				Op::Char(item) => {
					if item == c || (icase && fold_case(item) == fc) {
						hit = true;
					}
					idx = state.out;
				}
				Op::RangeMin(lo) => {
					let max_state = &states[state.out as usize];
					let Op::RangeMax(hi) = max_state.op else {
						break;
					};
					if (lo..=hi).contains(&c) || (icase && (lo..=hi).contains(&fc)) {
						hit = true;
					}
					idx = max_state.out;
				}
				Op::CollClass(pc) => {
					if pc.matches(c) {
						hit = true;
					}
					idx = state.out;
				}
				_ => break,
			}
		}
		(idx, hit)
	}

	fn collection_end(&self, coll_idx: StateIdx) -> StateIdx {
		let mut idx = self.prog.states[coll_idx as usize].out;
		while idx != NONE && self.prog.states[idx as usize].op != Op::EndColl {
			idx = self.prog.states[idx as usize].out;
		}
		idx
	}

	/// Compare the captured text of submatch `n` against the input at the
	/// current position. Returns the byte length consumed, `None` on mismatch.
	/// Only same-line captures participate; a multi-line capture never
	/// matches here.
	fn match_backref(&self, sub: &Sub, n: usize) -> Option<usize> {
		if n >= sub.in_use {
			return Some(0); // unset group matches empty
		}
		let span = sub.spans[n];
		if span.start_lnum < 0 || span.end_lnum < 0 {
			return Some(0);
		}
		if span.start_lnum != span.end_lnum {
			return None;
		}
		let src_line = self.src.match_line(span.start_lnum as usize)?;
		let captured = src_line.get(span.start_col as usize..span.end_col as usize)?;
		if captured.is_empty() {
			return Some(0);
		}
		let here = &self.line()[self.col..];
		let hit = if self.prog.icase {
			here.chars()
				.zip(captured.chars())
				.take(captured.chars().count())
				.all(|(a, b)| fold_case(a) == fold_case(b))
				&& here.chars().count() >= captured.chars().count()
		} else {
			here.starts_with(captured)
		};
		hit.then_some(captured.len())
	}

	/// Composing-char matching: the input base char plus its combining marks
	/// against the pattern's `COMPOSING..END_COMPOSING` chain. Every input
	/// mark must appear in the chain.
	fn match_composing(&self, comp_idx: StateIdx, curc: Option<char>) -> Option<(usize, bool)> {
		let base = curc?;
		let comp = self.state(comp_idx);
		// collect the pattern chain: base char then marks
		let mut chain: Vec<char> = Vec::new();
		let mut idx = comp.out;
		while idx != comp.out1 && idx != NONE {
			if let Op::Char(c) = self.state(idx).op {
				chain.push(c);
			}
			idx = self.state(idx).out;
		}
		let (&pat_base, pat_marks) = chain.split_first()?;
		if pat_base != base {
			return Some((0, false));
		}
		// gather the input's combining marks
		let mut consumed = base.len_utf8();
		let mut ok = true;
		let mut input_marks: Vec<char> = Vec::new();
		for c in self.line()[self.col + base.len_utf8()..].chars() {
			if !is_combining(c) {
				break;
			}
			input_marks.push(c);
			consumed += c.len_utf8();
		}
		for mark in &input_marks {
			if !pat_marks.contains(mark) {
				ok = false;
			}
		}
		if input_marks.is_empty() && !pat_marks.is_empty() {
			ok = false;
		}
		Some((consumed, ok))
	}

	fn state_in_list(&self, l: &ThreadList, state_idx: StateIdx, subs: &Subs) -> bool {
		if self.lastlist[state_idx as usize][self.ll_index] != l.id {
			return false;
		}
		!self.prog.has_backref || self.has_state_with_pos(l, state_idx, subs, None)
	}
}

use std::io::Write;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::buffer::Editor;
use crate::debug::{
	dbg_breakadd, dbg_breakdel, dbg_breaklist, dbg_find_breakpoint, file_pat_to_reg_pat,
	BpKind, DEBUG,
};
use crate::excmd::Session;
use crate::script::{ScriptRegistry, SourceCookie, SCRIPTS};

fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
	let path = dir.path().join(name);
	let mut f = std::fs::File::create(&path).unwrap();
	f.write_all(content).unwrap();
	path
}

fn session(text: &str) -> Session {
	Session::new(Editor::from_text(text))
}

#[test]
fn source_executes_commands() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "edit.vim", b"2d\n1,2j\n");
	let mut sess = session("one\ntwo\nthree\nfour");
	sess.source_file(&script, false).unwrap();
	assert_eq!(sess.ed.buf.text(), "one three\nfour\n");
}

#[test]
fn source_line_continuation() {
	// the continuation line is concatenated, minus backslash and leading blanks
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "cont.vim", b"echo 'hello'\n      \\ 'world'\n");
	let mut cookie = SourceCookie::open(&script, 1, 1).unwrap();
	let line = cookie.get_source_line(false).unwrap();
	assert_eq!(line, "echo 'hello' 'world'");
	assert_eq!(cookie.lnum, 2);
	assert!(cookie.get_source_line(false).is_none());
}

#[test]
fn continuation_disabled_by_cpo_flag() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "cont.vim", b"first\n\\second\n");
	let mut cookie = SourceCookie::open(&script, 1, 1).unwrap();
	assert_eq!(cookie.get_source_line(true).unwrap(), "first");
	assert_eq!(cookie.get_source_line(true).unwrap(), "\\second");
}

#[test]
fn dos_line_endings_are_stripped() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "dos.vim", b"one\r\ntwo\r\n");
	let mut cookie = SourceCookie::open(&script, 1, 1).unwrap();
	assert_eq!(cookie.get_source_line(true).unwrap(), "one");
	assert_eq!(cookie.get_source_line(true).unwrap(), "two");
}

#[test]
fn mac_line_endings_are_detected() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "mac.vim", b"one\rtwo\rthree");
	let mut cookie = SourceCookie::open(&script, 1, 1).unwrap();
	assert_eq!(cookie.get_source_line(true).unwrap(), "one");
	assert_eq!(cookie.get_source_line(true).unwrap(), "two");
	assert_eq!(cookie.get_source_line(true).unwrap(), "three");
}

#[test]
fn ctrl_v_escapes_the_line_break() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "esc.vim", b"map x \x16\nrest\n");
	let mut cookie = SourceCookie::open(&script, 1, 1).unwrap();
	let line = cookie.get_source_line(true).unwrap();
	assert_eq!(line, "map x \x16\nrest");
}

#[test]
fn bom_is_stripped_when_sourcing() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "bom.vim", b"\xef\xbb\xbf2d\n");
	let mut sess = session("one\ntwo\nthree");
	sess.source_file(&script, false).unwrap();
	assert_eq!(sess.ed.buf.text(), "one\nthree\n");
}

#[test]
fn hardlinks_share_a_script_id() {
	let dir = TempDir::new().unwrap();
	let a = write_file(&dir, "a.vim", b"1p\n");
	let b = dir.path().join("b.vim");
	std::fs::hard_link(&a, &b).unwrap();

	let mut reg = ScriptRegistry::default();
	let sid_a = reg.sid_for(&a);
	let sid_b = reg.sid_for(&b);
	assert_eq!(sid_a, sid_b);

	let other = write_file(&dir, "c.vim", b"1p\n");
	assert_ne!(reg.sid_for(&other), sid_a);
}

#[test]
fn resourcing_keeps_the_same_sid() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "same.vim", b"1p\n");
	let mut sess = session("line");
	sess.source_file(&script, false).unwrap();
	let count_after_first = SCRIPTS.with_borrow(|s| s.len());
	sess.source_file(&script, false).unwrap();
	let count_after_second = SCRIPTS.with_borrow(|s| s.len());
	assert_eq!(count_after_first, count_after_second);
}

#[test]
fn scriptnames_lists_sids() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "names.vim", b"1p\n");
	let mut sess = session("line");
	sess.source_file(&script, false).unwrap();
	sess.do_one_cmd("scriptnames").unwrap();
	assert!(sess.output.contains("names.vim"), "got: {}", sess.output);
}

#[test]
fn finish_stops_the_file_only() {
	let dir = TempDir::new().unwrap();
	let inner = write_file(&dir, "inner.vim", b"1d\nfinish\n1d\n");
	let outer_body = format!("source {}\n$d\n", inner.display());
	let outer = write_file(&dir, "outer.vim", outer_body.as_bytes());
	let mut sess = session("a\nb\nc\nd");
	sess.source_file(&outer, false).unwrap();
	// inner deleted one line and finished; outer still deleted the last line
	assert_eq!(sess.ed.buf.text(), "b\nc\n");
}

#[test]
fn missing_script_is_an_open_failure() {
	let mut sess = session("x");
	let err = sess.source_file(std::path::Path::new("/no/such/file.vim"), false);
	assert!(err.is_err());
}

#[test]
fn file_pattern_compiles_to_anchored_regex() {
	let pat = file_pat_to_reg_pat("*.vim");
	let prog = crate::regex::Prog::compile(&pat, Default::default()).unwrap();
	assert!(prog.match_str("/tmp/foo.vim").is_some());
	assert!(prog.match_str("/tmp/foo.vims").is_none());
}

#[test]
fn breakpoint_table_roundtrip() {
	let nr = dbg_breakadd(BpKind::File, 2, "*probe*", false).unwrap();
	assert!(dbg_breaklist().contains("file *probe*"));
	assert_eq!(dbg_find_breakpoint(true, "/x/probe-me.vim", 0), 2);
	assert_eq!(dbg_find_breakpoint(true, "/x/probe-me.vim", 2), 0);
	assert_eq!(dbg_find_breakpoint(true, "/x/other.vim", 0), 0);
	dbg_breakdel(&nr.to_string()).unwrap();
	assert!(dbg_breaklist().contains("No breakpoints"));
	assert!(dbg_breakdel("99").is_err());
}

#[test]
fn breakpoint_fires_once_per_crossing() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "bp.vim", b"1p\n1p\n1p\n");
	dbg_breakadd(BpKind::File, 2, "*bp.vim", false).unwrap();
	// greedy mode keeps injected typeahead available to the prompt
	DEBUG.with_borrow_mut(|d| {
		d.greedy = true;
		d.typeahead.push_back("cont".into());
		d.typeahead.push_back("cont".into());
	});
	let mut sess = session("line");
	sess.source_file(&script, false).unwrap();
	// exactly one prompt was answered
	let left = DEBUG.with_borrow(|d| d.typeahead.len());
	assert_eq!(left, 1);
	assert_eq!(sess.output, "line\nline\nline\n");
}

#[test]
fn debug_command_prefixes() {
	// the prompt accepts unambiguous prefixes with a matching tail
	DEBUG.with_borrow_mut(|d| {
		d.greedy = true;
		d.typeahead.push_back("st".into());
	});
	crate::debug::do_debug("1p", 1, &mut |_| {});
	assert_eq!(crate::debug::debug_break_level(), 9999);
	crate::debug::set_debug_break_level(-1);
	crate::interrupt::clear_interrupt();
}

#[test]
fn profile_accumulates_per_script() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "prof.vim", b"1p\n1p\n");
	let mut sess = session("line");
	sess.do_one_cmd(&format!("profile start {}/out.prof", dir.path().display()))
		.unwrap();
	sess.do_one_cmd("profile file *").unwrap();
	sess.source_file(&script, false).unwrap();
	sess.source_file(&script, false).unwrap();

	let mut report = Vec::new();
	SCRIPTS.with_borrow(|s| s.write_profile(&mut report)).unwrap();
	let report = String::from_utf8(report).unwrap();
	assert!(report.contains("SCRIPT"), "report: {report}");
	assert!(report.contains("Sourced 2 times"), "report: {report}");
	assert!(report.contains("Total time:"), "report: {report}");
}

#[test]
fn profile_dump_command_writes_file() {
	let dir = TempDir::new().unwrap();
	let script = write_file(&dir, "dump.vim", b"1p\n");
	let dump = dir.path().join("vicore.prof");
	let mut sess = session("line");
	sess.do_one_cmd(&format!("profile start {}", dump.display())).unwrap();
	sess.do_one_cmd("profile file *").unwrap();
	sess.source_file(&script, false).unwrap();
	sess.do_one_cmd("profile dump").unwrap();
	let content = std::fs::read_to_string(&dump).unwrap();
	assert!(content.contains("dump.vim"), "dump: {content}");
}

#[test]
fn runtime_sources_matching_files() {
	let dir = TempDir::new().unwrap();
	std::fs::create_dir(dir.path().join("plugin")).unwrap();
	let p = dir.path().join("plugin/auto.vim");
	std::fs::write(&p, "1d\n").unwrap();

	let mut sess = session("a\nb");
	sess.ed.opts.runtimepath = vec![dir.path().display().to_string()];
	sess.do_one_cmd("runtime plugin/*.vim").unwrap();
	assert_eq!(sess.ed.buf.text(), "b\n");
}

#[test]
fn breakadd_here_requires_sourcing() {
	let mut sess = session("x");
	assert!(sess.do_one_cmd("breakadd here").is_err());
}

#[test]
fn env_vars_expand_in_script_paths() {
	let expanded = crate::script::expand_env("$HOME/after");
	if let Ok(home) = std::env::var("HOME") {
		assert_eq!(expanded, format!("{home}/after"));
	}
}

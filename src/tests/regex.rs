use pretty_assertions::assert_eq;

use crate::error::EditorError;
use crate::regex::{CompFlags, Lines, Prog, RegexEnv, Span};

fn compile(pat: &str) -> Prog {
	Prog::compile(pat, CompFlags::default())
		.unwrap_or_else(|e| panic!("compile failed for {pat:?}: {e}"))
}

fn whole(pat: &str, text: &str) -> Option<(usize, usize)> {
	compile(pat)
		.match_str(text)
		.map(|m| (m.whole().start_col, m.whole().end_col))
}

#[test]
fn literal_text_fast_path() {
	let prog = compile("foo");
	assert_eq!(prog.match_text.as_deref(), Some("foo"));
	assert_eq!(whole("foo", "a foo b"), Some((2, 5)));
	assert_eq!(whole("foo", "nothing here"), None);
}

#[test]
fn anchors_and_reganch() {
	let prog = compile("^foo");
	assert!(prog.reganch);
	assert_eq!(whole("^foo", "foobar"), Some((0, 3)));
	assert_eq!(whole("^foo", " foo"), None);
	assert_eq!(whole("foo$", "a foo"), Some((2, 5)));
	assert_eq!(whole("foo$", "foo bar"), None);
}

#[test]
fn regstart_hint() {
	let prog = compile("fo*d");
	assert_eq!(prog.regstart, Some('f'));
}

#[test]
fn star_and_plus() {
	assert_eq!(whole("ab*c", "ac"), Some((0, 2)));
	assert_eq!(whole("ab*c", "abbbc"), Some((0, 5)));
	assert_eq!(whole("ab\\+c", "ac"), None);
	assert_eq!(whole("ab\\+c", "abbc"), Some((0, 4)));
}

#[test]
fn counted_repeats() {
	assert_eq!(whole("a\\{2,3}", "aaaa"), Some((0, 3)));
	assert_eq!(whole("a\\{2,3}", "a"), None);
	assert_eq!(whole("a\\{2}", "aaa"), Some((0, 2)));
	assert_eq!(whole("a\\{-}b", "aaab"), Some((0, 4)));
	// reverse ranges are a compile error
	assert!(matches!(
		Prog::compile("a\\{3,1}", CompFlags::default()),
		Err(EditorError::RegexCompile(_))
	));
}

#[test]
fn classes() {
	assert_eq!(whole("\\d\\+", "abc123def"), Some((3, 6)));
	assert_eq!(whole("\\s", "ab cd"), Some((2, 3)));
	assert_eq!(whole("\\w\\+", "  hey_9  "), Some((2, 7)));
	assert_eq!(whole("\\D\\+", "12ab34"), Some((2, 4)));
	assert_eq!(whole("\\h\\w*", "9abc"), Some((1, 4)));
}

#[test]
fn collections() {
	assert_eq!(whole("[0-9a-f]\\+", "xyz12af"), Some((3, 7)));
	assert_eq!(whole("[^a-z]", "abcD"), Some((3, 4)));
	assert_eq!(whole("[]x]", "a]b"), Some((1, 2)));
	assert_eq!(whole("[[:digit:]]\\+", "ab42"), Some((2, 4)));
	// a simple bracket collapses to a class state; behavior is identical
	assert_eq!(whole("[0-9]\\+", "ab42"), Some((2, 4)));
}

#[test]
fn alternation_and_groups() {
	assert_eq!(whole("\\(foo\\|bar\\)baz", "xbarbaz"), Some((1, 7)));
	let m = compile("\\(ab\\)\\(cd\\)").match_str("zabcd").unwrap();
	assert_eq!(
		m.subs[1],
		Some(Span { start_lnum: 1, start_col: 1, end_lnum: 1, end_col: 3 })
	);
	assert_eq!(
		m.subs[2],
		Some(Span { start_lnum: 1, start_col: 3, end_lnum: 1, end_col: 5 })
	);
}

#[test]
fn too_many_groups() {
	let pat = "\\(a\\)".repeat(10);
	assert!(matches!(
		Prog::compile(&pat, CompFlags::default()),
		Err(EditorError::TooManyGroups)
	));
}

#[test]
fn very_magic_mode() {
	assert_eq!(whole("\\v(ab)+c", "xababc"), Some((1, 6)));
	assert_eq!(whole("\\vd{2}", "addd"), Some((1, 3)));
}

#[test]
fn nomagic_modes() {
	// in \M the star is literal unless escaped
	assert_eq!(whole("\\Ma*b", "xa*b"), Some((1, 4)));
	assert_eq!(whole("\\Ma\\*b", "xaaab"), Some((1, 5)));
	// in \V everything is literal
	assert_eq!(whole("\\Va.c", "xa.c"), Some((1, 4)));
}

#[test]
fn backreference_same_line() {
	let prog = compile("\\v^(\\w+) \\1$");
	let m = prog.match_str("foo foo").unwrap();
	assert_eq!(
		m.subs[1],
		Some(Span { start_lnum: 1, start_col: 0, end_lnum: 1, end_col: 3 })
	);
	assert!(prog.match_str("foo bar").is_none());
}

#[test]
fn lookahead() {
	assert_eq!(whole("foo\\(bar\\)\\@=", "xfoobar"), Some((1, 4)));
	assert_eq!(whole("foo\\(bar\\)\\@=", "xfoobaz"), None);
	assert_eq!(whole("foo\\(bar\\)\\@!", "foobaz"), Some((0, 3)));
	assert_eq!(whole("foo\\(bar\\)\\@!", "foobar"), None);
}

#[test]
fn lookbehind_with_offset() {
	// the spec's fixture: match spans bytes 5..8, submatch 1 at 2..5
	let prog = compile("\\(abc\\)\\@<=def");
	let m = prog.match_str("xyabcdefgh").unwrap();
	assert_eq!(
		m.whole(),
		Span { start_lnum: 1, start_col: 5, end_lnum: 1, end_col: 8 }
	);
	assert_eq!(
		m.subs[1],
		Some(Span { start_lnum: 1, start_col: 2, end_lnum: 1, end_col: 5 })
	);
	assert!(prog.match_str("xydef").is_none());
}

#[test]
fn negative_lookbehind() {
	assert_eq!(whole("\\(abc\\)\\@<!def", "xydef"), Some((2, 5)));
	assert_eq!(whole("\\(abc\\)\\@<!def", "abcdef"), None);
}

#[test]
fn zero_width_start_end() {
	// \zs moves the reported match start
	assert_eq!(whole("foo\\zsbar", "afoobar"), Some((4, 7)));
	// \ze ends it early
	assert_eq!(whole("foo\\zebar", "afoobar"), Some((1, 4)));
}

#[test]
fn optional_sequence() {
	assert_eq!(whole("r\\%[ead]", "xread"), Some((1, 5)));
	assert_eq!(whole("r\\%[ead]", "xrea"), Some((1, 4)));
	assert_eq!(whole("r\\%[ead]", "xr"), Some((1, 2)));
}

#[test]
fn numeric_char_escape() {
	assert_eq!(whole("\\%d65", "zAz"), Some((1, 2)));
	assert_eq!(whole("\\%x41", "zAz"), Some((1, 2)));
	// overflowing values are rejected at compile time
	assert!(matches!(
		Prog::compile("\\%d99999999999", CompFlags::default()),
		Err(EditorError::ValueTooLarge)
	));
}

#[test]
fn ignorecase_flag() {
	let prog = Prog::compile("foo[a-z]", CompFlags { magic: true, ignorecase: true }).unwrap();
	assert!(prog.match_str("xFoOB").is_some());
}

#[test]
fn multiline_newline_atom() {
	let prog = compile("foo\\nbar");
	let lines = Lines(&["xfoo", "bar"]);
	let m = prog
		.exec_multi(&lines, 1, 0, &RegexEnv::default(), None)
		.unwrap()
		.unwrap();
	assert_eq!(
		m.whole(),
		Span { start_lnum: 1, start_col: 1, end_lnum: 2, end_col: 3 }
	);
}

#[test]
fn multiline_class() {
	// \_s matches a line break too
	let prog = compile("a\\_sb");
	let lines = Lines(&["a", "b"]);
	assert!(prog
		.exec_multi(&lines, 1, 0, &RegexEnv::default(), None)
		.unwrap()
		.is_some());
}

#[test]
fn line_number_anchor() {
	let prog = compile("\\%2lfoo");
	let lines = Lines(&["foo", "foo"]);
	assert!(prog
		.exec_multi(&lines, 1, 0, &RegexEnv::default(), None)
		.unwrap()
		.is_none());
	assert!(prog
		.exec_multi(&lines, 2, 0, &RegexEnv::default(), None)
		.unwrap()
		.is_some());
}

#[test]
fn cursor_anchor() {
	let prog = compile("\\%#x");
	let lines = Lines(&["axb"]);
	let mut env = RegexEnv { cursor: Some((1, 1)), ..Default::default() };
	assert!(prog.exec_multi(&lines, 1, 0, &env, None).unwrap().is_some());
	env.cursor = Some((1, 0));
	assert!(prog.exec_multi(&lines, 1, 0, &env, None).unwrap().is_none());
}

#[test]
fn mark_anchor() {
	let prog = compile("\\%'mx");
	let lines = Lines(&["axb"]);
	let env = RegexEnv { marks: vec![('m', (1, 1))], ..Default::default() };
	assert!(prog.exec_multi(&lines, 1, 0, &env, None).unwrap().is_some());
}

#[test]
fn word_boundaries() {
	assert_eq!(whole("\\<foo\\>", "a foo b"), Some((2, 5)));
	assert_eq!(whole("\\<foo\\>", "afoob"), None);
}

#[test]
fn branch_and() {
	// \& matches both patterns at the same position
	assert_eq!(whole("foo\\&f..", "xfoo"), Some((1, 4)));
	assert_eq!(whole("foo\\&b..", "xfoo"), None);
}

#[test]
fn compile_errors() {
	for pat in ["a\\{2,1}", "\\(a", "*a", "\\%d"] {
		assert!(
			Prog::compile(pat, CompFlags::default()).is_err(),
			"expected {pat:?} to fail"
		);
	}
}

#[test]
fn submatch_spans_are_ordered() {
	let m = compile("\\(a\\+\\)\\(b*\\)").match_str("caab").unwrap();
	for span in m.subs.iter().flatten() {
		assert!(
			(span.start_lnum, span.start_col) <= (span.end_lnum, span.end_col),
			"span ends before it starts: {span:?}"
		);
	}
}

#[test]
fn unmatched_backref_is_empty() {
	// group 2 never participates: \2 matches empty
	let m = compile("\\(a\\)\\%(x\\(q\\)\\)\\=\\2b").match_str("ab").unwrap();
	assert_eq!(m.whole().start_col, 0);
	assert_eq!(m.whole().end_col, 2);
}

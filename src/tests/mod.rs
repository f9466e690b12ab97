use crate::call_main;
use pretty_assertions::assert_eq;

pub mod ops;
pub mod regex;
pub mod registers;
pub mod script;

pub fn editor(text: &str) -> crate::buffer::Editor {
	crate::buffer::Editor::from_text(text)
}

// Integration tests:

#[test]
fn delete_range_through_dispatcher() {
	let output = call_main(&["-c", "2d"], "alpha\nbeta\ngamma").unwrap();
	assert_eq!(output, "alpha\ngamma\n");

	let output = call_main(&["-c", "1,2d"], "alpha\nbeta\ngamma").unwrap();
	assert_eq!(output, "gamma\n");
}

#[test]
fn global_delete() {
	let input = "keep\ndrop this\nkeep too\ndrop me\nlast";
	let output = call_main(&["-c", "g/drop/d"], input).unwrap();
	assert_eq!(output, "keep\nkeep too\nlast\n");
}

#[test]
fn vglobal_keeps_matches() {
	let input = "keep\ndrop this\nkeep too";
	let output = call_main(&["-c", "v/keep/d"], input).unwrap();
	assert_eq!(output, "keep\nkeep too\n");
}

#[test]
fn shift_and_unshift_round_trip() {
	let input = "fn main() {\nbody\n}";
	let output = call_main(&["-c", "2>", "-c", "2<"], input).unwrap();
	assert_eq!(output, "fn main() {\nbody\n}\n");
}

#[test]
fn join_through_dispatcher() {
	let output = call_main(&["-c", "1,3j"], "one\ntwo\nthree").unwrap();
	assert_eq!(output, "one two three\n");
}

#[test]
fn yank_then_put() {
	let output = call_main(&["-c", "1y", "-c", "2pu"], "first\nsecond").unwrap();
	assert_eq!(output, "first\nsecond\nfirst\n");
}

#[test]
fn print_collects_output() {
	let output = call_main(&["--silent", "-c", "2p"], "a\nb\nc").unwrap();
	assert_eq!(output, "b\n");
}

#[test]
fn range_patterns() {
	let input = "alpha\nbeta\ngamma\ndelta";
	let output = call_main(&["-c", "/gamma/d"], input).unwrap();
	assert_eq!(output, "alpha\nbeta\ndelta\n");
}

#[test]
fn unknown_command_errors() {
	let err = call_main(&["-c", "frobnicate"], "x").unwrap_err();
	assert!(err.contains("frobnicate"), "unexpected error: {err}");
}

//! `vicore` is the textual core of a modal, line-oriented editor, driven as a
//! command-line tool: it loads a buffer, sources ex-command scripts through
//! the same machinery a full editor would use, and writes the result out.
//!
//! ### High-level structure:
//! 1. Arguments select an input buffer, scripts to `:source`, and ad-hoc commands
//! 2. A `Session` holds the editor state and the operator engine
//! 3. Commands flow through the ex dispatcher, which consults the debugger and
//!    profiler on every line
use std::fmt::Display;
use std::io::Read;
use std::path::PathBuf;

extern crate tikv_jemallocator;

#[cfg(target_os = "linux")]
#[global_allocator]
/// For linux we use Jemalloc. It is ***significantly*** faster than the default allocator in this case, for some reason.
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use buffer::{Buffer, Editor};
use excmd::Session;
use options::Options;

pub mod buffer;
pub mod debug;
pub mod error;
pub mod excmd;
pub mod interrupt;
pub mod ops;
pub mod options;
pub mod pos;
pub mod regex;
pub mod registers;
pub mod script;
#[cfg(test)]
pub mod tests;

/// Print the given error message and exit the program.
/// Since we're a command-line tool, exiting on errors is the expected behavior, which makes things easy.
///
/// The error message will be prefixed with `vicore:` if it is not already.
pub fn complain_and_exit<T>(err: impl Display) -> T {
	let mut err = err.to_string();
	if !err.starts_with("vicore: ") {
		err = format!("vicore: {err}");
	}
	eprintln!("{err}");
	std::process::exit(1)
}

/// The arguments passed to the program by the user
#[derive(Default, Debug)]
pub struct Opts {
	scripts: Vec<PathBuf>,
	cmds: Vec<String>,
	profile_dump: Option<PathBuf>,
	silent: bool,
	file: Option<PathBuf>,
}

impl Opts {
	fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
		let mut opts = Self::default();
		while let Some(arg) = args.next() {
			match arg.as_str() {
				"-u" | "--source" => {
					let val = args.next().ok_or("expected a file after '-u'")?;
					opts.scripts.push(PathBuf::from(val));
				}
				"-c" | "--cmd" => {
					let val = args.next().ok_or("expected a command after '-c'")?;
					opts.cmds.push(val);
				}
				"--profile-dump" => {
					let val = args.next().ok_or("expected a file after '--profile-dump'")?;
					opts.profile_dump = Some(PathBuf::from(val));
				}
				"--silent" => opts.silent = true,
				"-h" | "--help" => {
					println!("{USAGE}");
					std::process::exit(0)
				}
				_ if arg.starts_with('-') && arg != "-" => {
					return Err(format!("unrecognized option '{arg}'"));
				}
				_ => opts.file = Some(PathBuf::from(arg)),
			}
		}
		Ok(opts)
	}
}

const USAGE: &str = "\
usage: vicore [-u SCRIPT]... [-c CMD]... [--profile-dump FILE] [FILE]

Reads FILE (or stdin), sources each SCRIPT, runs each CMD as an ex command,
then writes the buffer to stdout.";

fn main() {
	env_logger::init();
	let opts = Opts::parse(std::env::args().skip(1)).unwrap_or_else(complain_and_exit);

	let input = match &opts.file {
		Some(path) if path.as_os_str() != "-" => {
			std::fs::read_to_string(path).unwrap_or_else(complain_and_exit)
		}
		_ => {
			let mut buf = String::new();
			std::io::stdin()
				.read_to_string(&mut buf)
				.unwrap_or_else(complain_and_exit);
			buf
		}
	};

	let mut buffer = Buffer::from_text(&input);
	buffer.name = opts.file.as_ref().map(|p| p.display().to_string());
	let mut session = Session::new(Editor::new(buffer, Options::default()));

	for script in &opts.scripts {
		session
			.source_file(script, false)
			.unwrap_or_else(complain_and_exit);
	}
	for cmd in &opts.cmds {
		session.do_one_cmd(cmd).unwrap_or_else(complain_and_exit);
	}

	if let Some(path) = &opts.profile_dump {
		session.profile_dump(path).unwrap_or_else(complain_and_exit);
	}

	if !session.output.is_empty() {
		print!("{}", session.output);
	}
	if !opts.silent {
		print!("{}", session.ed.buf.text());
	}
}

/// Run the program against in-memory input, for the test suite.
#[cfg(test)]
pub fn call_main(args: &[&str], input: &str) -> Result<String, String> {
	let opts = Opts::parse(args.iter().map(|s| s.to_string()))?;
	let mut session = Session::new(Editor::from_text(input));
	for script in &opts.scripts {
		session.source_file(script, false).map_err(|e| e.to_string())?;
	}
	for cmd in &opts.cmds {
		session.do_one_cmd(cmd).map_err(|e| e.to_string())?;
	}
	let mut out = session.output.clone();
	if !opts.silent {
		out.push_str(&session.ed.buf.text());
	}
	Ok(out)
}

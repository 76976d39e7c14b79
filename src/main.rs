use std::{env, fs, io, process::exit};

use nutil::NError;
use pe_layout::executable::Executable;
use pe_layout::report;
use regex::Regex;
use tracing_subscriber::EnvFilter;

fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_writer(io::stderr)
		.init();

	let argv: Vec<String> = env::args().collect();

	if argv.len() < 3 || argv[1].is_empty() {
		print_help_and_exit();
	}

	let mode = &argv[1].as_bytes()[0];

	let res = match *mode as char {
		'd' => dump(&argv[2], None),
		'f' => {
			if argv.len() < 4 {
				print_help_and_exit();
			}
			match Regex::new(&argv[3]) {
				Err(e) => Err(NError::ErrOther(e.to_string())),
				Ok(re) => dump(&argv[2], Some(&re)),
			}
		},
		'e' => {
			fn _do_stuff(path: &str) -> Result<(), NError> {
				let exe = load(path)?;
				let count = report::write_errors(&mut io::stdout().lock(), exe.document())?;
				println!("{} validation error(s)", count);
				Ok(())
			}
			_do_stuff(&argv[2])
		},
		's' => {
			fn _do_stuff(path: &str) -> Result<(), NError> {
				let exe = load(path)?;
				println!("Machine: {}", exe.machine_name().unwrap_or("unrecognized"));
				println!("Format: {:?}", exe.optional_format());
				println!("Characteristics: {}", exe.characteristics().join(", "));
				report::write_sections(&mut io::stdout().lock(), &exe)?;
				Ok(())
			}
			_do_stuff(&argv[2])
		},
		_ => {
			print_help_and_exit();
			Ok(())
		}
	};

	if let Err(e) = res {
		print_and_exit(&e.to_string());
	}
}

fn load(path: &str) -> Result<Executable, NError> {
	let data = fs::read(path)?;
	Executable::parse(&data)
}

fn dump(path: &str, filter: Option<&Regex>) -> Result<(), NError> {
	let exe = load(path)?;
	report::write_tree(&mut io::stdout().lock(), exe.document(), filter)?;
	Ok(())
}

fn print_help_and_exit() {
	print_and_exit(r#"
Format: MODE ARGS...
    MODE can be:
        d [input exe]
            Dumps every decoded header field
        f [input exe] [path regex]
            Dumps the fields whose path matches the regex
        e [input exe]
            Lists validation errors
        s [input exe]
            Prints a header summary and the section table"#
	);
}
fn print_and_exit(s: &str) {
	println!("{}", s);
	exit(-1);
}

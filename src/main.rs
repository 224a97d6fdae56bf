use std::env;
use std::path::PathBuf;

use log::LevelFilter;
use tarn::errors::pretty::format_compile_error;
use tarn::{read_source, Compiler};

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage());
    }

    let mut source_path: Option<PathBuf> = None;
    let mut debug = false;
    let mut compiler = Compiler::new();

    for arg in &args {
        match arg.as_str() {
            "-d" | "--debug" => debug = true,
            "--emit-ir" => compiler.emit_ir = true,
            "-h" | "--help" => {
                println!("{}", usage());
                return Ok(());
            }
            "-V" | "--version" => {
                println!("tarnc {}", tarn::VERSION);
                return Ok(());
            }
            _ if arg.starts_with('-') => {
                return Err(format!("unknown option '{}'\n{}", arg, usage()));
            }
            _ => {
                if source_path.is_some() {
                    return Err("multiple source paths provided".to_string());
                }
                source_path = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(source_path) = source_path else {
        return Err(usage());
    };

    env_logger::Builder::new()
        .filter_level(if debug {
            LevelFilter::Trace
        } else {
            LevelFilter::Off
        })
        .format_timestamp(None)
        .init();

    let label = source_path.display().to_string();
    let source =
        read_source(&source_path).map_err(|err| format_compile_error(&label, "", &err))?;
    let output = compiler
        .compile_loaded_file(&source_path, &source)
        .map_err(|err| format_compile_error(&label, &source, &err))?;
    if debug {
        eprintln!("wrote {}", output.display());
    }
    Ok(())
}

fn usage() -> String {
    "usage: tarnc [-d|--debug] [--emit-ir] <file>".to_string()
}

//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, Context};
use clap::{self, crate_version, Arg, Command};
use fsmlc::{codegen::Options, source::Source, Compilation, CompileError};

use std::{
    fs,
    io::{self, Write},
    path::Path,
    process,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Parsing de CLI
    let args = Command::new("fsmlc")
        .version(crate_version!())
        .about("Compiles FSML state machines to C")
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("FILE")
                .help("FSML source file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Output C file ('-' for stdout), defaults to the input with a .c extension"),
        )
        .arg(
            Arg::new("no-lines")
                .long("no-lines")
                .help("Do not emit #line directives"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Stop after analysis, do not generate code"),
        )
        .get_matches();

    // Se extraen argumentos necesarios
    let input = args.value_of("input").context("Missing input file")?;
    let output = match args.value_of("output") {
        Some(output) => output.to_owned(),
        None => Path::new(input).with_extension("c").display().to_string(),
    };

    let text = fs::read_to_string(input).with_context(|| format!("Failed to read: {}", input))?;
    let source = Source::new(input, text);

    if args.is_present("check") {
        match fsmlc::analyze(&source) {
            Ok((_, warnings)) => report(&warnings),
            Err(errors) => fail(&errors),
        }

        return Ok(());
    }

    let options = Options {
        source_name: input.to_owned(),
        output_name: if output == "-" { String::from("<stdout>") } else { output.clone() },
        line_directives: !args.is_present("no-lines"),
    };

    let Compilation { code, warnings } = match fsmlc::compile(&source, &options) {
        Ok(compilation) => compilation,
        Err(CompileError::Rejected(errors)) => fail(&errors),
        Err(CompileError::Internal(error)) => return Err(error).context("Compilation aborted"),
    };

    report(&warnings);

    // Nada se escribe hasta que la unidad completa está lista
    match output.as_str() {
        "-" => io::stdout()
            .write_all(code.as_bytes())
            .context("Failed to write to stdout")?,

        path => fs::write(path, code).with_context(|| format!("Failed to write: {}", path))?,
    }

    Ok(())
}

fn report(warnings: &fsmlc::error::Diagnostics) {
    if !warnings.is_empty() {
        eprint!("{}", warnings);
    }
}

fn fail(errors: &fsmlc::error::Diagnostics) -> ! {
    eprint!("{}", errors);
    process::exit(1)
}

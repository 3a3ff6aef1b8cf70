use std::path::PathBuf;

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;
use subc::{
    CompileOptions,
    backend::CodegenOptions,
    frontend::{SourceFile, SourceFileOrigin},
};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// C source file to compile
    source_file: PathBuf,

    /// Where to write the assembly. Defaults to standard output.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip constant folding and dead code elimination
    #[arg(long)]
    no_optimize: bool,

    /// Do not annotate the assembly with the IR of each statement
    #[arg(long)]
    no_comments: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    if !args.source_file.exists() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Source file '{}' does not exist!", args.source_file.display()),
            )
            .exit()
    }

    if !args.source_file.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Input path '{}' is not a file!", args.source_file.display()),
            )
            .exit()
    }

    let contents = match std::fs::read_to_string(&args.source_file) {
        Ok(contents) => contents,
        Err(error) => fail(format!(
            "could not read '{}': {error}",
            args.source_file.display()
        )),
    };

    let source_file = SourceFile {
        contents,
        origin: SourceFileOrigin::File(args.source_file.clone()),
    };

    let options = CompileOptions {
        optimize: !args.no_optimize,
        codegen: CodegenOptions {
            emit_comments: !args.no_comments,
        },
        ..Default::default()
    };

    let assembly = match subc::compile(&source_file, &options) {
        Ok(assembly) => assembly,
        Err(error) => {
            for diagnostic in error.diagnostics() {
                eprintln!(
                    "{} {}:{diagnostic}",
                    "error:".bold().red(),
                    source_file.origin
                );
            }

            std::process::exit(1);
        }
    };

    match &args.output {
        Some(path) => {
            if let Err(error) = std::fs::write(path, assembly) {
                fail(format!("could not write '{}': {error}", path.display()));
            }
        }
        None => print!("{assembly}"),
    }
}

fn fail(message: String) -> ! {
    eprintln!("{} {message}", "error:".bold().red());
    std::process::exit(1);
}

use classpatch::hex::{self, HexDecoding};
use classpatch::jvm::ClassFile;
use classpatch::patch::{self, ExternalCommand, FrameRecomputer, MethodSelector, PatchError};

use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

fn cli() -> Command {
    Command::new("classpatch")
        .version(crate_version!())
        .about("Inject replacement method bodies into compiled JVM class files")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("apply")
                .about("Patch one method of a class, writing the result to a new class file")
                .arg(
                    Arg::new("TARGET_CLASS")
                        .help("Class file to patch")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("PATCHED_HEX")
                        .help("Text file with the patched method_info as hex")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::new("OUTPUT_CLASS")
                        .help("Where to write the patched class")
                        .required(true)
                        .index(3),
                )
                .arg(
                    Arg::new("LEGACY_REFERENCE_CLASS")
                        .help("Same as `--ref` (kept for older scripts)")
                        .index(4)
                        .conflicts_with_all(["reference", "original"]),
                )
                .arg(
                    Arg::new("reference")
                        .long("ref")
                        .value_name("CLASS")
                        .conflicts_with("original")
                        .help("Class whose constant pool the patched method was written against"),
                )
                .arg(
                    Arg::new("original")
                        .long("diff")
                        .value_name("ORIGINAL_HEX")
                        .help("Text file with the original method_info as hex (only swaps code)"),
                )
                .arg(
                    Arg::new("strict hex")
                        .long("strict-hex")
                        .action(ArgAction::SetTrue)
                        .help("Reject malformed hex instead of zero-filling bad pairs"),
                )
                .arg(
                    Arg::new("frames command")
                        .long("frames-command")
                        .value_name("COMMAND")
                        .env("CLASSPATCH_FRAMES_COMMAND")
                        .help("Program that reads a class on stdin and writes it back with recomputed frames"),
                )
                .arg(
                    Arg::new("no frames")
                        .long("no-frames")
                        .action(ArgAction::SetTrue)
                        .help("Without a frames command, keep stale stack map frames instead of failing"),
                ),
        )
        .subcommand(
            Command::new("extract")
                .about("Print one method_info of a class as hex")
                .arg(
                    Arg::new("CLASS")
                        .help("Class file to read")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("INDEX")
                        .help("Position of the method in the class")
                        .index(2)
                        .value_parser(clap::value_parser!(usize))
                        .required_unless_present("method")
                        .conflicts_with("method"),
                )
                .arg(
                    Arg::new("method")
                        .long("method")
                        .value_name("NAME_AND_DESCRIPTOR")
                        .help("Method to extract (eg. `foo(I)V`)"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("OUTPUT_HEX")
                        .help("Write the hex to this file instead of stdout"),
                ),
        )
}

/// Failures of the command line tool
#[derive(Debug)]
enum Error {
    Io { path: PathBuf, error: io::Error },
    BadSelector(String),
    Patch(PatchError),
}

impl Error {
    fn kind(&self) -> &'static str {
        match self {
            Error::Io { .. } => "IoError",
            Error::BadSelector(_) => "UsageError",
            Error::Patch(err) => err.kind(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io { path, error } => write!(f, "{}: {}", path.display(), error),
            Error::BadSelector(selector) => {
                write!(f, "expected a name followed by a descriptor, got {:?}", selector)
            }
            Error::Patch(err) => write!(f, "{}", err),
        }
    }
}

impl From<PatchError> for Error {
    fn from(err: PatchError) -> Error {
        Error::Patch(err)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let result = match matches.subcommand() {
        Some(("apply", matches)) => apply(matches),
        Some(("extract", matches)) => extract(matches),
        _ => unreachable!("a subcommand is required"),
    };

    match result {
        Ok(Some(output)) => println!("[SUCCESS] {}", output.display()),
        Ok(None) => (),
        Err(err) => {
            eprintln!("[FAILURE] {}: {}", err.kind(), err);
            process::exit(1);
        }
    }
}

fn apply(matches: &ArgMatches) -> Result<Option<PathBuf>, Error> {
    let path = |name: &str| matches.get_one::<String>(name).map(PathBuf::from);

    // clap enforces the required ones
    let target = path("TARGET_CLASS").unwrap_or_default();
    let patched = path("PATCHED_HEX").unwrap_or_default();
    let output = path("OUTPUT_CLASS").unwrap_or_default();

    let mode = if let Some(original) = path("original") {
        log::info!("Original method hex: {}", original.display());
        patch::PatchMode::Differential(read_text(&original)?)
    } else if let Some(reference) = path("reference").or_else(|| path("LEGACY_REFERENCE_CLASS")) {
        log::info!("Reference class: {}", reference.display());
        patch::PatchMode::Reference(read(&reference)?)
    } else {
        patch::PatchMode::Direct
    };

    let request = patch::PatchRequest {
        target_class: read(&target)?,
        patched_method_hex: read_text(&patched)?,
        mode,
    };
    let settings = patch::Settings::new(if matches.get_flag("strict hex") {
        HexDecoding::Strict
    } else {
        HexDecoding::Lenient
    });

    let external = matches
        .get_one::<String>("frames command")
        .map(String::as_str)
        .and_then(ExternalCommand::from_command_line);
    let unchanged = patch::Unchanged {
        allow_stale_frames: matches.get_flag("no frames"),
    };
    let frames: &dyn FrameRecomputer = match &external {
        Some(command) => command,
        None => {
            log::warn!("No frame recomputer configured, existing stack map frames are kept");
            &unchanged
        }
    };

    let outcome = patch::apply_patch(&request, &settings, frames)?;
    log::info!(
        "{} method {}{}",
        if outcome.method.replaced_existing {
            "Patched"
        } else {
            "Added"
        },
        outcome.method.name,
        outcome.method.descriptor
    );
    write_atomically(&output, &outcome.bytes)?;
    Ok(Some(output))
}

fn extract(matches: &ArgMatches) -> Result<Option<PathBuf>, Error> {
    let class_path = PathBuf::from(
        matches
            .get_one::<String>("CLASS")
            .map(String::as_str)
            .unwrap_or_default(),
    );
    let selector = match matches.get_one::<String>("method") {
        Some(signature) => MethodSelector::parse_signature(signature)
            .ok_or_else(|| Error::BadSelector(signature.to_owned()))?,
        None => MethodSelector::Index(matches.get_one::<usize>("INDEX").copied().unwrap_or(0)),
    };

    let class = ClassFile::parse(&read(&class_path)?).map_err(PatchError::from)?;
    let text = hex::encode(&patch::extract_method(&class, &selector)?);

    match matches.get_one::<String>("output") {
        Some(output) => {
            let output = PathBuf::from(output);
            write_atomically(&output, text.as_bytes())?;
            Ok(Some(output))
        }
        None => {
            println!("{}", text);
            Ok(None)
        }
    }
}

fn read(path: &Path) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|error| Error::Io {
        path: path.to_owned(),
        error,
    })
}

fn read_text(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|error| Error::Io {
        path: path.to_owned(),
        error,
    })
}

/// Write to a sibling temporary file, then move it into place
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temporary = path.with_file_name(format!(".{}.{}.tmp", file_name, process::id()));
    let io_error = |error| Error::Io {
        path: path.to_owned(),
        error,
    };

    log::info!("Writing '{}'", path.display());
    fs::write(&temporary, bytes).map_err(io_error)?;
    if let Err(error) = fs::rename(&temporary, path) {
        let _ = fs::remove_file(&temporary);
        return Err(io_error(error));
    }
    Ok(())
}

//! Stack map frame recomputation
//!
//! Changing a method's instructions invalidates its `StackMapTable`. Computing frames needs the
//! whole class hierarchy (to merge reference types), so it is delegated to a [`FrameRecomputer`].

use crate::jvm::{self, bytecode, ClassFile, Code, CODE};
use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

/// Something that takes class bytes and returns them with up-to-date stack map frames
pub trait FrameRecomputer {
    fn recompute(&self, class_bytes: Vec<u8>) -> Result<Vec<u8>, FrameComputationError>;
}

impl<F> FrameRecomputer for F
where
    F: Fn(Vec<u8>) -> Result<Vec<u8>, FrameComputationError>,
{
    fn recompute(&self, class_bytes: Vec<u8>) -> Result<Vec<u8>, FrameComputationError> {
        self(class_bytes)
    }
}

#[derive(Debug)]
pub enum FrameComputationError {
    /// The recomputer couldn't be run at all
    Io(io::Error),

    /// The recomputer ran, but refused the class (eg. it doesn't verify)
    Rejected {
        status: Option<i32>,
        message: String,
    },

    /// Class bytes aren't structurally valid
    Malformed(jvm::Error),
}

impl fmt::Display for FrameComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameComputationError::Io(err) => write!(f, "could not run frame recomputer: {}", err),
            FrameComputationError::Rejected {
                status: Some(code),
                message,
            } => write!(f, "rejected (exit status {}): {}", code, message.trim()),
            FrameComputationError::Rejected {
                status: None,
                message,
            } => write!(f, "rejected: {}", message.trim()),
            FrameComputationError::Malformed(err) => write!(f, "malformed class: {}", err),
        }
    }
}

impl std::error::Error for FrameComputationError {}

/// Run an external program, feeding it the class on stdin and reading the new class from stdout
///
/// A non-zero exit status means the class was rejected, with stderr as the explanation.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    /// Split a command line on whitespace (no quoting support)
    pub fn from_command_line(command_line: &str) -> Option<ExternalCommand> {
        let mut words = command_line.split_whitespace().map(str::to_owned);
        let program = words.next()?;
        Some(ExternalCommand {
            program,
            args: words.collect(),
        })
    }
}

impl FrameRecomputer for ExternalCommand {
    fn recompute(&self, class_bytes: Vec<u8>) -> Result<Vec<u8>, FrameComputationError> {
        log::info!("Recomputing frames with '{}'", self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(FrameComputationError::Io)?;

        // Feed stdin from another thread so a chatty child can't deadlock on a full stdout pipe
        let mut stdin = child.stdin.take().ok_or_else(|| {
            FrameComputationError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "child has no stdin",
            ))
        })?;
        let feeder = thread::spawn(move || stdin.write_all(&class_bytes));

        let output = child
            .wait_with_output()
            .map_err(FrameComputationError::Io)?;
        let fed = feeder.join().unwrap_or_else(|_| {
            Err(io::Error::new(io::ErrorKind::Other, "stdin writer panicked"))
        });

        if !output.status.success() {
            return Err(FrameComputationError::Rejected {
                status: output.status.code(),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        fed.map_err(FrameComputationError::Io)?;
        Ok(output.stdout)
    }
}

/// Leave frames alone, only checking that the class and its code are well-formed
///
/// Suitable for classes that predate `StackMapTable`. Newer classes are refused unless
/// `allow_stale_frames` is set, eg. when verification happens downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchanged {
    pub allow_stale_frames: bool,
}

impl FrameRecomputer for Unchanged {
    fn recompute(&self, class_bytes: Vec<u8>) -> Result<Vec<u8>, FrameComputationError> {
        let class = ClassFile::parse(&class_bytes).map_err(FrameComputationError::Malformed)?;
        if class.version.requires_stack_map_frames() {
            if !self.allow_stale_frames {
                return Err(FrameComputationError::Rejected {
                    status: None,
                    message: format!(
                        "class version {}.{} needs stack map frames, but nothing recomputes them",
                        class.version.major_version, class.version.minor_version
                    ),
                });
            }
            log::warn!(
                "Class version {}.{} needs stack map frames, which are not being recomputed",
                class.version.major_version,
                class.version.minor_version
            );
        }

        for method in &class.methods {
            for attribute in &method.attributes {
                if !attribute.is_named(&class.constants, CODE) {
                    continue;
                }
                let code = Code::parse(&attribute.info).map_err(FrameComputationError::Malformed)?;
                for instruction in bytecode::instructions(&code.code) {
                    if let Err(err) = instruction {
                        return Err(FrameComputationError::Rejected {
                            status: None,
                            message: format!(
                                "method {}: {}",
                                method.name(&class.constants).unwrap_or("?"),
                                err
                            ),
                        });
                    }
                }
            }
        }
        Ok(class_bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{ClassAccessFlags, ClassConstantIndex, ConstantIndex, ConstantPool, Version};

    #[test]
    fn closures_are_recomputers() {
        let identity = |bytes: Vec<u8>| -> Result<Vec<u8>, FrameComputationError> { Ok(bytes) };
        assert_eq!(identity.recompute(vec![1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unchanged_rejects_garbage() {
        match Unchanged::default().recompute(vec![0xde, 0xad]) {
            Err(FrameComputationError::Malformed(_)) => (),
            other => panic!("expected malformed class, got {:?}", other),
        }
    }

    fn empty_class(version: Version) -> Vec<u8> {
        ClassFile {
            version,
            constants: ConstantPool::new(),
            access_flags: ClassAccessFlags::PUBLIC,
            this_class: ClassConstantIndex(ConstantIndex(0)),
            super_class: ClassConstantIndex(ConstantIndex(0)),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn unchanged_needs_permission_for_stale_frames() {
        let java6 = empty_class(Version::JAVA6);
        assert_eq!(Unchanged::default().recompute(java6.clone()).unwrap(), java6);

        let java8 = empty_class(Version::JAVA8);
        match Unchanged::default().recompute(java8.clone()) {
            Err(FrameComputationError::Rejected { status, message }) => {
                assert_eq!(status, None);
                assert!(message.contains("52.0"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        let lenient = Unchanged {
            allow_stale_frames: true,
        };
        assert_eq!(lenient.recompute(java8.clone()).unwrap(), java8);
    }

    #[test]
    fn command_lines() {
        let command = ExternalCommand::from_command_line("java -jar  frames.jar").unwrap();
        assert_eq!(command.program, "java");
        assert_eq!(command.args, vec!["-jar", "frames.jar"]);
        assert!(ExternalCommand::from_command_line("   ").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn external_commands() {
        let cat = ExternalCommand {
            program: "cat".to_owned(),
            args: vec![],
        };
        assert_eq!(cat.recompute(vec![0xca, 0xfe]).unwrap(), vec![0xca, 0xfe]);

        let failing = ExternalCommand {
            program: "sh".to_owned(),
            args: vec!["-c".to_owned(), "cat >/dev/null; echo nope >&2; exit 3".to_owned()],
        };
        match failing.recompute(vec![0xca, 0xfe]) {
            Err(FrameComputationError::Rejected { status, message }) => {
                assert_eq!(status, Some(3));
                assert_eq!(message.trim(), "nope");
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        let missing = ExternalCommand {
            program: "/nonexistent/frame-recomputer".to_owned(),
            args: vec![],
        };
        assert!(matches!(
            missing.recompute(vec![]),
            Err(FrameComputationError::Io(_))
        ));
    }
}

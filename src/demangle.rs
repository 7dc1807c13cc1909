use std::process::{Command, Stdio};

use crate::{Error, Result};

/// Itanium C++ ABI mangled names start with this.
pub const MANGLING_PREFIX: &str = "_Z";

pub trait Demangler {
    fn demangle(&self, symbol: &str) -> Result<String>;
}

/// Leaves symbols as they are.
pub struct NoDemangler;

impl Demangler for NoDemangler {
    fn demangle(&self, symbol: &str) -> Result<String> {
        Ok(symbol.to_owned())
    }
}

/// Runs an external tool such as `c++filt -p` with the symbol as its last
/// argument and reads the demangled name from its stdout.
pub struct CommandDemangler {
    program: String,
    args: Vec<String>,
}

impl CommandDemangler {
    pub fn new(command_line: &str) -> Result<Self> {
        let mut words = shell_words::split(command_line)
            .map_err(|error| Error::Demangle {
                symbol: String::new(),
                reason: format!("cannot parse demangler command {command_line:?}: {error}"),
            })?
            .into_iter();
        let Some(program) = words.next() else {
            return Err(Error::Demangle {
                symbol: String::new(),
                reason: "demangler command is empty".to_owned(),
            });
        };
        Ok(CommandDemangler {
            program,
            args: words.collect(),
        })
    }
}

impl Demangler for CommandDemangler {
    fn demangle(&self, symbol: &str) -> Result<String> {
        let failure = |reason: String| Error::Demangle {
            symbol: symbol.to_owned(),
            reason,
        };
        let std::process::Output { status, stdout, stderr: _ } = Command::new(&self.program)
            .args(&self.args)
            .arg(symbol)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|error| failure(format!("running {} failed: {error}", self.program)))?;
        // TODO: std::process::ExitStatus::exit_ok() is unstable
        if !status.success() {
            return Err(failure(format!("{} exited with {status}", self.program)));
        }
        let mut demangled = String::from_utf8(stdout).map_err(|error| failure(error.to_string()))?;
        if demangled.ends_with('\n') {
            demangled.pop();
        }
        Ok(demangled)
    }
}

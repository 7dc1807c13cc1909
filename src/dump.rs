use std::sync::LazyLock;

use regex::{CaptureMatches, Regex};

use crate::{Error, Result};

static STACK_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(\[CRASH_STACK\][\s\S]+)\[CRASH_REGISTERS\]").expect("valid regex"));
static EXTERNAL_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\n *\d+: (.+)[^-]+Source: (.+):").expect("valid regex"));
static OFFSET_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"( const)* \+ 0x\w+").expect("valid regex"));
static INTERNAL_FRAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\d+: (.+) at (.+)").expect("valid regex"));

/// One backtrace entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub function: String,
    pub path: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpFormat {
    /// Crash dump files with a `[CRASH_STACK]` ... `[CRASH_REGISTERS]` section.
    External,
    /// Test-farm crash text whose backtrace ends at the first blank line.
    Internal,
}

/// The backtrace part of a dump. Iterating it yields frames lazily, and it
/// can be iterated any number of times.
#[derive(Clone, Copy, Debug)]
pub struct Backtrace<'a> {
    text: &'a str,
    format: DumpFormat,
}

impl<'a> Backtrace<'a> {
    pub fn parse(dump: &'a str, format: DumpFormat) -> Result<Self> {
        let text = match format {
            DumpFormat::External => match STACK_SECTION.captures(dump).and_then(|captures| captures.get(1)) {
                Some(section) => section.as_str(),
                None => return Err(Error::MalformedDump("missing [CRASH_STACK] / [CRASH_REGISTERS] section")),
            },
            DumpFormat::Internal => match memchr::memmem::find(dump.as_bytes(), b"\n\n") {
                Some(end) => &dump[..end],
                None => dump,
            },
        };
        Ok(Backtrace { text, format })
    }

    pub fn frames(&self) -> Frames<'a> {
        let pattern = match self.format {
            DumpFormat::External => &*EXTERNAL_FRAME,
            DumpFormat::Internal => &*INTERNAL_FRAME,
        };
        Frames {
            captures: pattern.captures_iter(self.text),
            format: self.format,
        }
    }
}

impl<'a> IntoIterator for Backtrace<'a> {
    type Item = Frame;
    type IntoIter = Frames<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames()
    }
}

pub struct Frames<'a> {
    captures: CaptureMatches<'static, 'a>,
    format: DumpFormat,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let captures = self.captures.next()?;
        let function = &captures[1];
        let function = match self.format {
            DumpFormat::External => OFFSET_SUFFIX.replace_all(function, "").into_owned(),
            DumpFormat::Internal => function.to_owned(),
        };
        Some(Frame {
            function,
            path: captures[2].to_owned(),
        })
    }
}

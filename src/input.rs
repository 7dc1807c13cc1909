use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;

use crate::{dump::DumpFormat, Result};

static TEST_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{9,}$").expect("valid regex"));

/// Raw crash text of test cases, by test-case id.
pub trait RawDumpSource {
    fn fetch(&self, test_id: &str) -> Result<String>;
}

/// A directory holding one `<test_id>.txt` file per test case.
pub struct DumpDirectory {
    root: PathBuf,
}

impl DumpDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DumpDirectory { root: root.into() }
    }
}

impl RawDumpSource for DumpDirectory {
    fn fetch(&self, test_id: &str) -> Result<String> {
        Ok(read_to_string(self.root.join(format!("{test_id}.txt")))?)
    }
}

/// A dump named on the command line.
#[derive(Debug, PartialEq, Eq)]
pub enum DumpArg<'a> {
    /// Test-farm crash text, fetched by id.
    TestId(&'a str),
    /// A crash dump file on disk.
    File(&'a Path),
}

impl<'a> DumpArg<'a> {
    /// Anything that looks like a test-case id (nine or more digits) is one;
    /// everything else is a path.
    pub fn classify(arg: &'a str) -> Self {
        if TEST_ID.is_match(arg) {
            DumpArg::TestId(arg)
        } else {
            DumpArg::File(Path::new(arg))
        }
    }

    pub fn read(&self, source: &dyn RawDumpSource) -> Result<(String, DumpFormat)> {
        match self {
            DumpArg::TestId(test_id) => Ok((source.fetch(test_id)?, DumpFormat::Internal)),
            DumpArg::File(path) => Ok((read_to_string(path)?, DumpFormat::External)),
        }
    }
}

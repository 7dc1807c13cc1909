//! Statistics for choosing stop words: files whose frames sit above the
//! frame that threw, in many dumps, are usually error-handling plumbing.

use std::{cmp::Reverse, collections::HashMap, sync::LazyLock};

use regex::Regex;
use tracing::{debug, info};

use crate::{
    dump::{Backtrace, DumpFormat, Frame},
    input::RawDumpSource,
    signature::base_name,
    Result,
};

const EXCEPTION_HEADER: &str = "exception throw location:\n";
const MOST_COMMON: usize = 10;

static ROOT_FRAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\d+: (.+) at .+").expect("valid regex"));

/// Functions of the first exception's throw location, which follows the
/// backtrace after the first blank line.
pub fn exception_roots(dump: &str) -> Vec<&str> {
    let Some(start) = memchr::memmem::find(dump.as_bytes(), b"\n\n") else {
        return vec![];
    };
    let exceptions = &dump[start + 2..];
    let Some(header) = exceptions.find(EXCEPTION_HEADER) else {
        return vec![];
    };
    let mut stack = &exceptions[header + EXCEPTION_HEADER.len()..];
    if dump.matches(EXCEPTION_HEADER).count() > 1 {
        if let Some(end) = stack.find("\n\n") {
            stack = &stack[..end];
        }
    }
    ROOT_FRAME
        .captures_iter(stack)
        .filter_map(|captures| captures.get(1))
        .map(|root| root.as_str())
        .collect()
}

/// Base names of the files of every frame above the first root that occurs
/// in `frames`.
pub fn obtain_words<'a>(roots: &[&str], frames: &'a [Frame]) -> Vec<&'a str> {
    for root in roots {
        if let Some(index) = frames.iter().position(|frame| frame.function == *root) {
            return frames[..index].iter().map(|frame| base_name(&frame.path)).collect();
        }
    }
    vec![]
}

fn dump_words(dump: &str) -> Result<Vec<String>> {
    let roots = exception_roots(dump);
    let frames: Vec<Frame> = Backtrace::parse(dump, DumpFormat::Internal)?.frames().collect();
    Ok(obtain_words(&roots, &frames).into_iter().map(str::to_owned).collect())
}

/// The most common stop-word candidates over the dumps of `test_ids`, most
/// common first. Ties keep the order in which words were first seen.
pub fn count_words(source: &dyn RawDumpSource, test_ids: &[String]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = vec![];
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (done, test_id) in test_ids.iter().enumerate() {
        info!("{}, {}/{}", test_id, done + 1, test_ids.len());
        let words = match source.fetch(test_id).and_then(|dump| dump_words(&dump)) {
            Ok(words) => words,
            Err(err) => {
                debug!(test_id = %test_id, %err, "skipping dump");
                continue;
            }
        };
        for word in words {
            match positions.get(&word) {
                Some(&position) => counts[position].1 += 1,
                None => {
                    positions.insert(word.clone(), counts.len());
                    counts.push((word, 1));
                }
            }
        }
    }
    counts.sort_by_key(|&(_, count)| Reverse(count));
    counts.truncate(MOST_COMMON);
    counts
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;

    const DUMP: &str = "\
0: log::write at src/log/writer.cpp
1: err::raise at src/err/raise.cpp
2: db::Table::insert at src/db/table.cpp
3: main at src/main.cpp

exception throw location:
0: db::Table::insert at src/db/table.cpp
1: main at src/main.cpp
";

    struct Dumps(Vec<(&'static str, &'static str)>);

    impl RawDumpSource for Dumps {
        fn fetch(&self, test_id: &str) -> Result<String> {
            match self.0.iter().find(|(id, _)| *id == test_id) {
                Some((_, dump)) => Ok(dump.to_string()),
                None => Err(Error::InsufficientData(format!("no dump {test_id}"))),
            }
        }
    }

    #[test]
    fn roots_of_first_exception() {
        assert_eq!(exception_roots(DUMP), vec!["db::Table::insert", "main"]);
        let two = format!("{DUMP}\n{EXCEPTION_HEADER}0: other at x.cpp\n");
        assert_eq!(exception_roots(&two), vec!["db::Table::insert", "main"]);
        assert!(exception_roots("0: f at a.cpp\n").is_empty());
    }

    #[test]
    fn words_above_first_matching_root() {
        let frames: Vec<Frame> = Backtrace::parse(DUMP, DumpFormat::Internal).unwrap().frames().collect();
        assert_eq!(obtain_words(&["missing", "db::Table::insert"], &frames), vec!["writer.cpp", "raise.cpp"]);
        assert!(obtain_words(&["missing"], &frames).is_empty());
    }

    #[test]
    fn counts_skip_missing_dumps() {
        let other = "\
0: err::raise at src/err/raise.cpp
1: main at src/main.cpp

exception throw location:
0: main at src/main.cpp
";
        let source = Dumps(vec![("1", DUMP), ("2", other)]);
        let ids: Vec<String> = ["1", "2", "3"].iter().map(|id| id.to_string()).collect();
        assert_eq!(
            count_words(&source, &ids),
            vec![("raise.cpp".to_owned(), 2), ("writer.cpp".to_owned(), 1)]
        );
    }
}

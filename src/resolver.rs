use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use serde::Deserialize;

use crate::Result;

/// Component reported when no lookup matches.
pub const UNKNOWN_COMPONENT: &str = "UNKNOWN";

/// Maps stack frames to owning components. Lookups fail soft and return
/// [`UNKNOWN_COMPONENT`].
pub trait ComponentResolver {
    fn resolve_by_path(&self, path: &str) -> String;

    fn resolve_by_function(&self, qualified_name: &str) -> String;
}

/// Path and function ownership tables, as produced by crawling the source
/// tree.
#[derive(Debug, Default, Deserialize)]
pub struct ComponentTable {
    #[serde(default)]
    paths: HashMap<String, String>,
    #[serde(default)]
    functions: Vec<(String, String)>,
}

impl ComponentTable {
    pub fn from_entries<'a>(
        paths: impl IntoIterator<Item = (&'a str, &'a str)>,
        functions: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let owned = |(key, component): (&str, &str)| (key.to_owned(), component.to_owned());
        ComponentTable {
            paths: paths.into_iter().map(owned).collect(),
            functions: functions.into_iter().map(owned).collect(),
        }
    }

    /// Reads `{ "paths": { path: component }, "functions": [[name, component], ...] }`.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    fn path_by_base_name(&self, base_name: &str) -> Option<&str> {
        let suffix = format!("/{base_name}");
        let mut matches = self.paths.keys().filter(|path| path.ends_with(&suffix));
        match (matches.next(), matches.next()) {
            (Some(path), None) => Some(path.as_str()),
            _ => None,
        }
    }
}

impl ComponentResolver for ComponentTable {
    fn resolve_by_path(&self, path: &str) -> String {
        let mut path = if path.contains('/') {
            path
        } else {
            match self.path_by_base_name(path) {
                Some(full_path) => full_path,
                None => return UNKNOWN_COMPONENT.to_owned(),
            }
        };
        loop {
            if let Some(component) = self.paths.get(path) {
                return component.clone();
            }
            match path.rfind('/') {
                Some(index) => path = &path[..index],
                None => return UNKNOWN_COMPONENT.to_owned(),
            }
        }
    }

    fn resolve_by_function(&self, qualified_name: &str) -> String {
        if let Some((_, component)) = self.functions.iter().find(|(name, _)| name == qualified_name) {
            return component.clone();
        }

        let mut prefix = qualified_name;
        while let Some(index) = prefix.rfind("::") {
            prefix = &prefix[..index];
            let nested = format!("{prefix}::");

            // (component, votes) in order of first appearance.
            let mut votes: Vec<(&str, usize)> = vec![];
            for (name, component) in &self.functions {
                if name != prefix && !name.starts_with(&nested) {
                    continue;
                }
                match votes.iter().position(|&(candidate, _)| candidate == component.as_str()) {
                    Some(index) => votes[index].1 += 1,
                    None => votes.push((component.as_str(), 1)),
                }
            }

            let Some(best) = votes.iter().map(|&(_, count)| count).max() else {
                continue;
            };
            let mut tied = votes.iter().filter(|&&(_, count)| count == best);
            let first = tied.next().map(|&(component, _)| component);
            // A tie for first place goes to the second candidate.
            return tied.next().map(|&(component, _)| component).or(first).unwrap_or(UNKNOWN_COMPONENT).to_owned();
        }
        UNKNOWN_COMPONENT.to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> ComponentTable {
        ComponentTable::from_entries(
            [("src/db", "Database"), ("src/db/index/btree.cpp", "Index"), ("src/net/socket.cpp", "Network")],
            [
                ("db::Table::insert", "Database"),
                ("db::Index::find", "Index"),
                ("db::Index::erase", "Index"),
                ("net::Socket", "Network"),
                ("util::a", "Util"),
                ("util::b", "Base"),
            ],
        )
    }

    #[test]
    fn exact_and_prefix_paths() {
        let table = table();
        assert_eq!(table.resolve_by_path("src/db/index/btree.cpp"), "Index");
        assert_eq!(table.resolve_by_path("src/db/storage/page.cpp"), "Database");
        assert_eq!(table.resolve_by_path("lib/other.cpp"), UNKNOWN_COMPONENT);
    }

    #[test]
    fn base_name_must_be_unique() {
        let table = table();
        assert_eq!(table.resolve_by_path("socket.cpp"), "Network");
        assert_eq!(table.resolve_by_path("missing.cpp"), UNKNOWN_COMPONENT);

        let ambiguous = ComponentTable::from_entries([("a/x.cpp", "A"), ("b/x.cpp", "B")], []);
        assert_eq!(ambiguous.resolve_by_path("x.cpp"), UNKNOWN_COMPONENT);
    }

    #[test]
    fn functions_degrade_to_majority() {
        let table = table();
        assert_eq!(table.resolve_by_function("net::Socket"), "Network");
        assert_eq!(table.resolve_by_function("db::Index::insert"), "Index");
        assert_eq!(table.resolve_by_function("db::Other::run"), "Index");
        assert_eq!(table.resolve_by_function("util::c"), "Base");
        assert_eq!(table.resolve_by_function("nothing"), UNKNOWN_COMPONENT);
        assert_eq!(table.resolve_by_function("none::at::all"), UNKNOWN_COMPONENT);
    }

    #[test]
    fn loads_json_table() {
        let table: ComponentTable =
            serde_json::from_str(r#"{"paths": {"a": "A"}, "functions": [["f::g", "F"]]}"#).unwrap();
        assert_eq!(table.resolve_by_path("a/b.cpp"), "A");
        assert_eq!(table.resolve_by_function("f::g::h"), "F");
    }
}

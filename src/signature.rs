use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    demangle::{Demangler, MANGLING_PREFIX},
    dump::Frame,
    resolver::{ComponentResolver, UNKNOWN_COMPONENT},
    validate::validate,
    Error, Result,
};

/// A maximal group of consecutive frames owned by one component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRun {
    pub component: String,
    pub tokens: Vec<String>,
}

/// The comparable form of one crash dump: its run-length encoded component
/// sequence. Adjacent runs never share a component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DumpSignature {
    runs: Vec<ComponentRun>,
}

impl DumpSignature {
    pub fn runs(&self) -> &[ComponentRun] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn component_order(&self) -> impl Iterator<Item = &str> {
        self.runs.iter().map(|run| run.component.as_str())
    }

    fn push(&mut self, component: String, tokens: Vec<String>) {
        match self.runs.last_mut() {
            Some(last) if last.component == component => last.tokens.extend(tokens),
            _ => self.runs.push(ComponentRun { component, tokens }),
        }
    }

    /// Rebuilds a signature from its persisted parallel form. Rejects input
    /// that breaks the run invariants instead of silently re-encoding it.
    pub fn from_parts(test_id: &str, component_order: Vec<String>, func_blocks: Vec<Vec<String>>) -> Result<Self> {
        let violations = validate(&component_order, &func_blocks);
        if !violations.is_empty() {
            return Err(Error::InvalidSignature {
                test_id: test_id.to_owned(),
                violations,
            });
        }
        let runs = component_order
            .into_iter()
            .zip(func_blocks)
            .map(|(component, tokens)| ComponentRun { component, tokens })
            .collect();
        Ok(DumpSignature { runs })
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<String>>) {
        self.runs.into_iter().map(|run| (run.component, run.tokens)).unzip()
    }
}

/// Text after the last `/`, or the whole path.
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '~'
}

/// Reduces a function signature to its scope tokens, e.g.
/// `void ns::Cls<T>::run(int) const` becomes `["ns", "Cls"]`.
/// Returns an empty list for symbols that do not reduce to a plain
/// qualified name.
pub fn unbox(function: &str) -> Vec<String> {
    let mut function = function.replace("(anonymous namespace)", "");
    if let Some(index) = function.find('(') {
        function.truncate(index);
    }
    if let Some(index) = function.find('<') {
        function.truncate(index);
    }
    let name = match function.rfind(' ') {
        Some(index) => &function[index + 1..],
        None => &function[..],
    };
    if !name.chars().all(is_symbol_char) {
        return vec![];
    }
    name.split("::").filter(|scope| !scope.is_empty()).map(str::to_owned).collect()
}

/// Turns frames into a [`DumpSignature`]: drops stop-listed and unparseable
/// frames, resolves components and run-length encodes them.
pub struct SignatureBuilder<'a> {
    resolver: &'a dyn ComponentResolver,
    demangler: &'a dyn Demangler,
    stop_words: &'a HashSet<String>,
}

impl<'a> SignatureBuilder<'a> {
    pub fn new(
        resolver: &'a dyn ComponentResolver,
        demangler: &'a dyn Demangler,
        stop_words: &'a HashSet<String>,
    ) -> Self {
        SignatureBuilder {
            resolver,
            demangler,
            stop_words,
        }
    }

    fn resolve(&self, path: &str, tokens: &[String]) -> String {
        let component = self.resolver.resolve_by_path(path);
        if component != UNKNOWN_COMPONENT {
            return component;
        }
        self.resolver.resolve_by_function(&tokens.join("::"))
    }

    pub fn build(&self, frames: impl IntoIterator<Item = Frame>) -> DumpSignature {
        let mut signature = DumpSignature::default();
        for Frame { function, path } in frames {
            if self.stop_words.contains(base_name(&path)) {
                debug!(%path, "dropping stop-listed frame");
                continue;
            }

            let function = if function.starts_with(MANGLING_PREFIX) {
                match self.demangler.demangle(&function) {
                    Ok(demangled) => demangled,
                    Err(error) => {
                        debug!(%error, "dropping frame with undemanglable symbol");
                        continue;
                    }
                }
            } else {
                function
            };

            let tokens = unbox(&function);
            if tokens.is_empty() {
                debug!(%function, "dropping frame with unparseable symbol");
                continue;
            }

            let component = self.resolve(&path, &tokens);
            signature.push(component, tokens);
        }
        signature
    }
}

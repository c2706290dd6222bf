//! The compiler catalog: an immutable, read-only table consumed by [`crate::session::Session`].
//!
//! Parsing the catalog from its on-disk form is explicitly out of scope for
//! this crate (see module docs on [`crate`]); callers build a [`Registry`]
//! however they like (a server binary typically deserializes it from JSON)
//! and hand it to the [`crate::acceptor::Acceptor`] as a read-only, shared table.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named bundle of argv fragments, activated by membership of any of its
/// `names` in the comma-separated `CompilerOption` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Switch {
    pub names: Vec<String>,
    pub flags: Vec<String>,
}

/// Everything the session needs to know about one compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerTrait {
    pub name: String,
    pub language: String,
    pub display_name: String,
    pub compile_command: Vec<String>,
    pub run_command: Vec<String>,
    pub source_suffix: String,
    #[serde(default)]
    pub version_command: Vec<String>,
    #[serde(default)]
    pub displayable: bool,
    #[serde(default)]
    pub switches: Vec<Switch>,
}

impl CompilerTrait {
    /// Is this trait eligible for inclusion in a `VersionResult` listing?
    pub fn is_version_probeable(&self) -> bool {
        self.displayable && !self.version_command.is_empty()
    }

    /// Appends the flags of every switch whose name appears in `activated`
    /// to `args`, in this trait's declaration order. Activation is additive:
    /// a switch can be named more than once in `activated` without effect
    /// beyond the first match, but distinct switches sharing a name-set both
    /// apply if both are present.
    pub fn assemble_compile_args(&self, activated: &[&str]) -> Vec<String> {
        let mut args = self.compile_command.clone();
        for sw in &self.switches {
            if sw.names.iter().any(|n| activated.contains(&n.as_str())) {
                args.extend(sw.flags.iter().cloned());
            }
        }
        args
    }

    /// The run argv with the sandbox launcher prepended.
    pub fn assemble_run_args(&self, ptracer: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(self.run_command.len() + 1);
        args.push(ptracer.to_string());
        args.extend(self.run_command.iter().cloned());
        args
    }
}

/// Read-only lookup table, shared across sessions behind an `Arc`.
#[derive(Debug, Default)]
pub struct Registry {
    by_name: HashMap<String, CompilerTrait>,
}

impl Registry {
    pub fn new(traits: impl IntoIterator<Item = CompilerTrait>) -> Self {
        Registry {
            by_name: traits.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CompilerTrait> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompilerTrait> {
        self.by_name.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trait_with(name: &str, switches: Vec<Switch>) -> CompilerTrait {
        CompilerTrait {
            name: name.to_string(),
            language: "c++".to_string(),
            display_name: name.to_string(),
            compile_command: vec!["/bin/echo".to_string(), "base".to_string()],
            run_command: vec!["/bin/echo".to_string(), "hi".to_string()],
            source_suffix: ".cpp".to_string(),
            version_command: vec![],
            displayable: false,
            switches,
        }
    }

    #[test]
    fn switch_membership_is_additive_not_exclusive() {
        let t = trait_with(
            "cc",
            vec![
                Switch {
                    names: vec!["warn".to_string()],
                    flags: vec!["-W".to_string()],
                },
                Switch {
                    names: vec!["warn".to_string(), "warn-extra".to_string()],
                    flags: vec!["-Wextra".to_string()],
                },
            ],
        );
        let args = t.assemble_compile_args(&["warn"]);
        assert_eq!(args, vec!["/bin/echo", "base", "-W", "-Wextra"]);
    }

    #[test]
    fn unknown_switch_is_ignored() {
        let t = trait_with("cc", vec![]);
        assert_eq!(t.assemble_compile_args(&["nope"]), vec!["/bin/echo", "base"]);
    }

    #[test]
    fn run_args_prepend_ptracer() {
        let t = trait_with("cc", vec![]);
        assert_eq!(
            t.assemble_run_args("/opt/ptracer.exe"),
            vec!["/opt/ptracer.exe", "/bin/echo", "hi"]
        );
    }

    #[test]
    fn registry_lookup() {
        let reg = Registry::new(vec![trait_with("cc", vec![])]);
        assert!(reg.get("cc").is_some());
        assert!(reg.get("missing").is_none());
    }
}

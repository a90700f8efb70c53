//! The fixed installation catalog.
//!
//! Order matters and is curated by hand: the package index is refreshed
//! before anything is installed, and the base tools (curl, git, tar,
//! compilers) come before every installer that relies on them.

pub mod apt;
pub mod fetch;
pub mod neovim;
pub mod shell;
pub mod toolchains;

use crate::context::ProvisionContext;
use crate::error::Result;
use crate::step::{Criticality, Step};

/// One entry of the catalog.
#[derive(Clone, Copy)]
pub struct CatalogEntry {
    pub label: &'static str,
    pub criticality: Criticality,
    pub run: fn(&ProvisionContext<'_>) -> Result<()>,
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("label", &self.label)
            .field("criticality", &self.criticality)
            .finish_non_exhaustive()
    }
}

pub const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        label: "Refresh package index",
        criticality: Criticality::Critical,
        run: apt::refresh_index,
    },
    CatalogEntry {
        label: "Base build tools",
        criticality: Criticality::Critical,
        run: apt::base_build_tools,
    },
    CatalogEntry {
        label: "Python tooling",
        criticality: Criticality::Optional,
        run: apt::python_tooling,
    },
    CatalogEntry {
        label: "GitHub CLI",
        criticality: Criticality::Optional,
        run: apt::github_cli,
    },
    CatalogEntry {
        label: "Container runtime",
        criticality: Criticality::Optional,
        run: apt::container_runtime,
    },
    CatalogEntry {
        label: "Rust toolchain",
        criticality: Criticality::Optional,
        run: toolchains::rust_toolchain,
    },
    CatalogEntry {
        label: "Node.js (nvm)",
        criticality: Criticality::Optional,
        run: toolchains::node_via_nvm,
    },
    CatalogEntry {
        label: "Neovim",
        criticality: Criticality::Optional,
        run: neovim::neovim,
    },
    CatalogEntry {
        label: "Shell aliases",
        criticality: Criticality::Optional,
        run: shell::shell_aliases,
    },
];

/// Look up a catalog entry by label (case-insensitive).
pub fn find(label: &str) -> Option<&'static CatalogEntry> {
    CATALOG
        .iter()
        .find(|entry| entry.label.eq_ignore_ascii_case(label))
}

/// Build the run's steps, bound to `ctx`, in catalog order.
pub fn steps<'a>(ctx: &'a ProvisionContext<'a>) -> Vec<Step<'a>> {
    CATALOG
        .iter()
        .map(|entry| {
            let run = entry.run;
            Step::new(entry.label, entry.criticality, move || run(ctx))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_labels_are_unique() {
        let labels: HashSet<_> = CATALOG.iter().map(|e| e.label).collect();
        assert_eq!(labels.len(), CATALOG.len());
    }

    #[test]
    fn test_critical_steps_come_first() {
        let first_optional = CATALOG
            .iter()
            .position(|e| e.criticality == Criticality::Optional)
            .expect("has optional steps");
        assert!(CATALOG[first_optional..]
            .iter()
            .all(|e| e.criticality == Criticality::Optional));
        assert_eq!(CATALOG[0].label, "Refresh package index");
    }

    #[test]
    fn test_find_is_case_insensitive() {
        assert_eq!(find("neovim").map(|e| e.label), Some("Neovim"));
        assert!(find("emacs").is_none());
    }
}

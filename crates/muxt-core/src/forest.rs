//! The forest: by-name lookup over the evaluator's parse trees.
//!
//! The checker descends into `{{template "x" .Expr}}` nodes through this
//! index, so sub-templates are typed with the statically computed argument
//! type of each call site.

use std::collections::BTreeMap;

use muxt_templates::{TemplateSet, Tree};

pub struct Forest {
    trees: BTreeMap<String, Tree>,
}

impl Forest {
    pub fn new(set: &TemplateSet) -> Self {
        Self {
            trees: set.trees().clone(),
        }
    }

    pub fn find_tree(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name)
    }

    /// Template names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.trees.keys().map(String::as_str)
    }

    pub fn trees(&self) -> impl Iterator<Item = (&str, &Tree)> + '_ {
        self.trees.iter().map(|(name, tree)| (name.as_str(), tree))
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

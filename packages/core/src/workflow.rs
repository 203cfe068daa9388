//! Workflow trees: nested job specifications whose children run first.

use serde::{Deserialize, Serialize};

/// A job specification with child workflows that must complete before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub input: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Workflow>,
}

impl Workflow {
    /// Create a leaf workflow for `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    /// Add a child that becomes a dependency of this node.
    pub fn with_child(mut self, child: Workflow) -> Self {
        self.children.push(child);
        self
    }

    /// Total number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Workflow::node_count).sum::<usize>()
    }
}

//! Artifact categories and where they live in the repository

use std::fmt;

use delivery_store::Collection;
use serde::{Deserialize, Serialize};

use crate::config::PathsConfig;

/// Kinds of configuration artifact a repository holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Cookbook,
    Role,
    DataBag,
    Environment,
    Node,
    Client,
    User,
    RoleLocal,
}

/// How artifacts of a category are laid out on disk and stored remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    /// A directory per artifact, uploaded as a versioned bundle
    Unit,
    /// One JSON file per artifact directly inside the category directory
    Record,
    /// `<container>/<item>.json` two levels down
    Item,
}

impl Category {
    /// Order in which categories are applied to the server.
    pub const APPLY_ORDER: [Category; 8] = [
        Category::Cookbook,
        Category::Role,
        Category::DataBag,
        Category::Environment,
        Category::Node,
        Category::Client,
        Category::User,
        Category::RoleLocal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cookbook => "cookbook",
            Self::Role => "role",
            Self::DataBag => "databag",
            Self::Environment => "environment",
            Self::Node => "node",
            Self::Client => "client",
            Self::User => "user",
            Self::RoleLocal => "role_local",
        }
    }

    pub fn kind(&self) -> CategoryKind {
        match self {
            Self::Cookbook => CategoryKind::Unit,
            Self::DataBag => CategoryKind::Item,
            _ => CategoryKind::Record,
        }
    }

    /// Remote collection the category is stored in. Local roles share the
    /// role collection.
    pub fn collection(&self) -> Collection {
        match self {
            Self::Cookbook => Collection::Cookbooks,
            Self::Role | Self::RoleLocal => Collection::Roles,
            Self::DataBag => Collection::DataBags,
            Self::Environment => Collection::Environments,
            Self::Node => Collection::Nodes,
            Self::Client => Collection::Clients,
            Self::User => Collection::Users,
        }
    }

    /// Whether uploads of this category carry the checkpoint tag.
    pub fn supports_checkpoint_tag(&self) -> bool {
        matches!(self, Self::Node)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository-relative directories holding each category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    entries: Vec<(Category, Vec<String>)>,
}

impl Layout {
    pub fn new(entries: Vec<(Category, Vec<String>)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(category, dirs)| {
                let dirs = dirs
                    .into_iter()
                    .map(|d| d.trim_matches('/').to_string())
                    .filter(|d| !d.is_empty())
                    .collect();
                (category, dirs)
            })
            .collect();
        Self { entries }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(vec![
            (Category::Cookbook, paths.cookbook_paths.clone()),
            (Category::Role, vec![paths.role_path.clone()]),
            (Category::DataBag, vec![paths.databag_path.clone()]),
            (Category::Environment, vec![paths.environment_path.clone()]),
            (Category::Node, vec![paths.node_path.clone()]),
            (Category::Client, vec![paths.client_path.clone()]),
            (Category::User, vec![paths.user_path.clone()]),
            (Category::RoleLocal, vec![paths.role_local_path.clone()]),
        ])
    }

    /// Directories configured for `category`.
    pub fn dirs(&self, category: Category) -> &[String] {
        self.entries
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, dirs)| dirs.as_slice())
            .unwrap_or_default()
    }

    /// Every configured `(category, dir)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &str)> {
        self.entries
            .iter()
            .flat_map(|(c, dirs)| dirs.iter().map(move |d| (*c, d.as_str())))
    }

    /// All configured directories, for restricting a diff.
    pub fn all_dirs(&self) -> Vec<String> {
        self.iter().map(|(_, d)| d.to_string()).collect()
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::from_paths(&PathsConfig::default())
    }
}

//! Table catalog
//!
//! Classifies every synchronized table as static (global reference data
//! shared by all identities) or dynamic (owned by the signed-in identity),
//! and defines the order in which tables are bootstrapped.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{IdentityId, TableName};

/// Static tables shipped by default
pub const DEFAULT_STATIC_TABLES: &[&str] = &["categories_global", "channel_types", "plan_suggestions"];

/// Dynamic tables shipped by default, in bootstrap priority order
pub const DEFAULT_DYNAMIC_TABLES: &[&str] = &[
    "profiles",
    "currencies",
    "categories",
    "wallets",
    "channels",
    "transactions",
    "commitments",
    "transfers",
    "budgets",
    "financial_plans",
    "financial_plan_components",
    "financial_plan_settlements",
    "notifications",
    "ai_usage_logs",
];

/// Tables that must land before anything referencing them
const CORE_PRIORITY: &[&str] = &[
    "profiles",
    "currencies",
    "channel_types",
    "categories",
    "wallets",
    "channels",
    "transactions",
    "commitments",
    "transfers",
    "budgets",
    "financial_plans",
    "financial_plan_components",
    "financial_plan_settlements",
];

/// Whether a table holds global or identity-owned data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Shared reference data, kept across identity switches
    Static,
    /// Data owned by the signed-in identity, purged on switch
    Dynamic,
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::Static => write!(f, "static"),
            TableKind::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Storage scope for rows and versions of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataScope {
    Global,
    Identity(IdentityId),
}

impl DataScope {
    /// Key used by storage adapters to partition rows
    pub fn key(&self) -> String {
        match self {
            DataScope::Global => "global".to_string(),
            DataScope::Identity(id) => id.to_string(),
        }
    }
}

/// The set of tables the sync engine knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCatalog {
    static_tables: Vec<TableName>,
    dynamic_tables: Vec<TableName>,
}

impl TableCatalog {
    /// Builds a catalog from table name lists
    ///
    /// # Errors
    /// Returns an error if any name is invalid or a table is listed as both
    /// static and dynamic.
    pub fn new<S: AsRef<str>>(static_tables: &[S], dynamic_tables: &[S]) -> Result<Self, DomainError> {
        let static_tables = static_tables
            .iter()
            .map(|t| TableName::new(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let dynamic_tables = dynamic_tables
            .iter()
            .map(|t| TableName::new(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(dup) = static_tables.iter().find(|t| dynamic_tables.contains(t)) {
            return Err(DomainError::ValidationFailed(format!(
                "table {dup} is listed as both static and dynamic"
            )));
        }

        Ok(Self {
            static_tables,
            dynamic_tables,
        })
    }

    pub fn static_tables(&self) -> &[TableName] {
        &self.static_tables
    }

    pub fn dynamic_tables(&self) -> &[TableName] {
        &self.dynamic_tables
    }

    /// Returns the kind of a table, or `None` if it is not catalogued
    pub fn kind_of(&self, table: &str) -> Option<TableKind> {
        if self.static_tables.iter().any(|t| t.as_str() == table) {
            Some(TableKind::Static)
        } else if self.dynamic_tables.iter().any(|t| t.as_str() == table) {
            Some(TableKind::Dynamic)
        } else {
            None
        }
    }

    pub fn contains(&self, table: &str) -> bool {
        self.kind_of(table).is_some()
    }

    /// Storage scope for `table` while `owner` is signed in
    pub fn scope_for(&self, table: &str, owner: &IdentityId) -> DataScope {
        match self.kind_of(table) {
            Some(TableKind::Static) => DataScope::Global,
            _ => DataScope::Identity(*owner),
        }
    }

    /// All tables in bootstrap priority order
    pub fn all(&self) -> Vec<TableName> {
        let mut tables: Vec<TableName> = self
            .static_tables
            .iter()
            .chain(self.dynamic_tables.iter())
            .cloned()
            .collect();
        sort_by_priority(&mut tables);
        tables
    }
}

impl Default for TableCatalog {
    fn default() -> Self {
        Self {
            static_tables: DEFAULT_STATIC_TABLES
                .iter()
                .filter_map(|t| TableName::new(*t).ok())
                .collect(),
            dynamic_tables: DEFAULT_DYNAMIC_TABLES
                .iter()
                .filter_map(|t| TableName::new(*t).ok())
                .collect(),
        }
    }
}

/// Bootstrap rank of a table; unlisted tables sort after every core table
pub fn priority_rank(table: &str) -> usize {
    CORE_PRIORITY
        .iter()
        .position(|t| *t == table)
        .unwrap_or(CORE_PRIORITY.len())
}

/// Sorts tables by core priority, then alphabetically
pub fn sort_by_priority(tables: &mut [TableName]) {
    tables.sort_by(|a, b| {
        priority_rank(a.as_str())
            .cmp(&priority_rank(b.as_str()))
            .then_with(|| a.cmp(b))
    });
}

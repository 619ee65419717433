//! Control definition schema types.
//!
//! These structs mirror the JSON catalog files on disk. Definitions are
//! loaded once at startup, validated, and shared immutably; the router and
//! executor only ever borrow them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain area a control belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlIntent {
    ConcMgr,
    Workflow,
    Adop,
    InvalidObjects,
    DataIntegrity,
    Performance,
}

impl fmt::Display for ControlIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConcMgr => "conc_mgr",
            Self::Workflow => "workflow",
            Self::Adop => "adop",
            Self::InvalidObjects => "invalid_objects",
            Self::DataIntegrity => "data_integrity",
            Self::Performance => "performance",
        };
        write!(f, "{name}")
    }
}

/// Value type vocabulary shared by bind parameters and result columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::DateTime => "datetime",
        };
        write!(f, "{name}")
    }
}

/// Keyword lists per locale used by router scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordSet {
    #[serde(default)]
    pub en: Vec<String>,
    #[serde(default)]
    pub tr: Vec<String>,
}

/// A declared bind parameter of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub bind_type: FieldType,

    /// Optional binds missing from the request are bound as SQL NULL.
    #[serde(default)]
    pub optional: bool,
}

/// A declared result column of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: FieldType,

    /// Sensitive columns are always redacted before results leave the core.
    #[serde(default)]
    pub sensitive: bool,
}

/// One parameterized read query of a control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub query_id: String,

    /// Inline SQL text. Exactly one of `sql`/`sql_file` must be authored;
    /// the loader resolves `sql_file` into this field.
    #[serde(default)]
    pub sql: Option<String>,

    /// Path of a .sql file relative to the catalog directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_file: Option<String>,

    #[serde(default)]
    pub binds: Vec<BindSpec>,

    pub result_schema: Vec<ResultColumn>,

    #[serde(default = "default_row_limit")]
    pub row_limit: usize,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_row_limit() -> usize {
    50
}

fn default_timeout_seconds() -> u64 {
    30
}

impl QueryDefinition {
    /// The SQL text, empty if the loader has not resolved it yet.
    pub fn sql_text(&self) -> &str {
        self.sql.as_deref().unwrap_or("")
    }
}

/// A pre-authored diagnostic definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlDefinition {
    /// Stable identifier, lowercase words separated by underscores.
    pub control_id: String,

    /// Date-shaped (`2025-06-01`) or semver-like version string.
    pub version: String,

    /// Short display name, used in suggestions and justifications.
    pub title: String,

    #[serde(default)]
    pub description: String,

    pub intent: ControlIntent,

    pub keywords: KeywordSet,

    pub queries: Vec<QueryDefinition>,

    /// Interpretation hints passed through to the downstream summarizer.
    #[serde(default)]
    pub doc_hint: String,

    #[serde(default)]
    pub analysis_hint: String,

    /// Optional pointer into the knowledge base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_ref: Option<String>,
}

impl ControlDefinition {
    /// Total declared result columns across all queries (router shape signal).
    pub fn total_result_columns(&self) -> usize {
        self.queries.iter().map(|q| q.result_schema.len()).sum()
    }

    /// All keywords across both locales.
    pub fn all_keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords
            .en
            .iter()
            .chain(self.keywords.tr.iter())
            .map(String::as_str)
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// A primitive schema change understood by every schema store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    AddColumn {
        table: String,
        column: ColumnSpec,
    },
    DropColumn {
        table: String,
        column: String,
    },
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
        #[serde(default)]
        primary_key: Vec<String>,
    },
    DropTable {
        table: String,
    },
}

impl Operation {
    pub fn table(&self) -> &str {
        match self {
            Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::CreateTable { table, .. }
            | Self::DropTable { table } => table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddColumn { .. } => "add_column",
            Self::DropColumn { .. } => "drop_column",
            Self::CreateTable { .. } => "create_table",
            Self::DropTable { .. } => "drop_table",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddColumn { table, column } => {
                write!(f, "add column {}.{}", table, column.name)
            }
            Self::DropColumn { table, column } => write!(f, "drop column {}.{}", table, column),
            Self::CreateTable { table, .. } => write!(f, "create table {}", table),
            Self::DropTable { table } => write!(f, "drop table {}", table),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    BigInteger,
    Float,
    Numeric,
    Boolean,
    Text,
    Varchar(u32),
    Date,
    DateTime,
    Blob,
}

impl ColumnType {
    pub fn sql(&self) -> String {
        match self {
            Self::Integer => "INTEGER".into(),
            Self::BigInteger => "BIGINT".into(),
            Self::Float => "REAL".into(),
            Self::Numeric => "NUMERIC".into(),
            Self::Boolean => "BOOLEAN".into(),
            Self::Text => "TEXT".into(),
            Self::Varchar(len) => format!("VARCHAR({})", len),
            Self::Date => "DATE".into(),
            Self::DateTime => "DATETIME".into(),
            Self::Blob => "BLOB".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl DefaultValue {
    /// SQL literal for a `DEFAULT` clause.
    pub fn sql_literal(&self) -> String {
        match self {
            Self::Bool(true) => "1".into(),
            Self::Bool(false) => "0".into(),
            Self::Integer(n) => n.to_string(),
            Self::Float(x) => x.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

//! DDL rendering for SQLite.

use crate::error::StoreError;
use crate::models::{ColumnSpec, Operation, Plan};

use super::schema::RESERVED_PREFIX;

/// Quote an identifier, rejecting names SQLite cannot hold or that collide
/// with bookkeeping tables.
pub fn quote_ident(name: &str) -> Result<String, StoreError> {
    if name.is_empty() || name.contains('\0') {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn quote_table(name: &str) -> Result<String, StoreError> {
    if name.starts_with(RESERVED_PREFIX) {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    quote_ident(name)
}

pub fn column_def(column: &ColumnSpec) -> Result<String, StoreError> {
    let mut def = format!("{} {}", quote_ident(&column.name)?, column.column_type.sql());
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        def.push_str(" DEFAULT ");
        def.push_str(&default.sql_literal());
    }
    Ok(def)
}

/// Render one operation as a single SQLite statement.
pub fn render(op: &Operation) -> Result<String, StoreError> {
    let sql = match op {
        Operation::AddColumn { table, column } => format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_table(table)?,
            column_def(column)?
        ),
        Operation::DropColumn { table, column } => format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_table(table)?,
            quote_ident(column)?
        ),
        Operation::CreateTable {
            table,
            columns,
            primary_key,
        } => {
            let mut parts = columns
                .iter()
                .map(column_def)
                .collect::<Result<Vec<_>, _>>()?;
            if !primary_key.is_empty() {
                let keys = primary_key
                    .iter()
                    .map(|k| quote_ident(k))
                    .collect::<Result<Vec<_>, _>>()?;
                parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
            }
            format!("CREATE TABLE {} ({})", quote_table(table)?, parts.join(", "))
        }
        Operation::DropTable { table } => format!("DROP TABLE {}", quote_table(table)?),
    };
    Ok(sql)
}

/// Offline rendering of a whole plan, one statement per line.
///
/// Each revision is wrapped in its own transaction, mirroring how the
/// executor runs it.
pub fn render_plan(plan: &Plan) -> Result<Vec<String>, StoreError> {
    let mut lines = Vec::new();
    for revision in &plan.steps {
        let header = match &revision.message {
            Some(message) => format!("-- {} {}: {}", plan.direction, revision.id, message),
            None => format!("-- {} {}", plan.direction, revision.id),
        };
        lines.push(header);
        lines.push("BEGIN;".to_string());
        for op in revision.ops(plan.direction) {
            lines.push(format!("{};", render(op)?));
        }
        let marker = match revision.marker_after(plan.direction) {
            Some(id) => format!("'{}'", id.as_str().replace('\'', "''")),
            None => "NULL".to_string(),
        };
        lines.push(format!(
            "INSERT INTO revchain_version (id, revision) VALUES (1, {}) \
             ON CONFLICT(id) DO UPDATE SET revision = excluded.revision;",
            marker
        ));
        lines.push("COMMIT;".to_string());
    }
    Ok(lines)
}

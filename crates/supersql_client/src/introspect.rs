//! Catalog introspection through ordinary statements.
//!
//! Every operation runs on its own cursor, closed before returning.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::connection::{Connection, Cursor};
use crate::error::{reports_missing_table, ClientError, ClientResult};
use crate::params::quote_identifier;
use crate::registry::{LogicalType, TypeRegistry};
use crate::stream::Row;
use crate::value::Value;

const COLUMN_HEADER: &str = "# col_name";
const PARTITION_SECTION: &str = "# Partition Information";

/// One column as reported by `DESCRIBE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectedColumn {
    pub name: String,
    pub logical_type: LogicalType,
    /// Type exactly as the engine printed it, e.g. `decimal(10,2)`.
    pub raw_type: String,
    pub comment: Option<String>,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referred_schema: Option<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Schema, table and column discovery for one connection.
#[derive(Debug, Clone)]
pub struct SchemaIntrospector {
    connection: Connection,
    registry: &'static TypeRegistry,
    properties: BTreeMap<String, String>,
}

impl SchemaIntrospector {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            registry: TypeRegistry::global(),
            properties: BTreeMap::new(),
        }
    }

    /// Send these session properties with every catalog statement.
    pub fn with_session_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    pub async fn list_schemas(&self) -> ClientResult<Vec<String>> {
        let rows = self.run("SHOW SCHEMAS").await?;
        Ok(rows.iter().filter_map(first_text).collect())
    }

    pub async fn list_tables(&self, schema: Option<&str>) -> ClientResult<Vec<String>> {
        let sql = match schema {
            Some(s) => format!("SHOW TABLES FROM {}", quote_identifier(s)),
            None => "SHOW TABLES".to_string(),
        };
        let rows = self.run(&sql).await?;
        Ok(rows.iter().filter_map(first_text).collect())
    }

    pub async fn describe_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> ClientResult<Vec<IntrospectedColumn>> {
        let target = match schema {
            Some(s) => format!("{}.{}", quote_identifier(s), quote_identifier(table)),
            None => quote_identifier(table),
        };
        let rows = self.run(&format!("DESCRIBE {}", target)).await?;
        let text: Vec<Vec<Option<String>>> = rows.iter().map(row_text).collect();
        Ok(parse_describe_rows(&text, self.registry))
    }

    /// Whether `DESCRIBE` finds the table. Only the engine's "does not
    /// exist" report for this table counts as absent.
    pub async fn table_exists(&self, table: &str, schema: Option<&str>) -> ClientResult<bool> {
        match self.describe_columns(table, schema).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound { message, .. })
                if reports_missing_table(&message, table) =>
            {
                debug!("Table {} not found: {}", table, message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// The engine has no constraints; always empty.
    pub fn foreign_keys(&self, _table: &str, _schema: Option<&str>) -> Vec<ForeignKey> {
        Vec::new()
    }

    pub fn primary_key(&self, _table: &str, _schema: Option<&str>) -> Vec<String> {
        Vec::new()
    }

    pub fn indexes(&self, _table: &str, _schema: Option<&str>) -> Vec<IndexInfo> {
        Vec::new()
    }

    async fn run(&self, sql: &str) -> ClientResult<Vec<Row>> {
        let mut cursor = self.connection.cursor()?;
        cursor.session_mut().inherit_properties(&self.properties);
        let result = fetch_all(&mut cursor, sql).await;
        cursor.close().await;
        result
    }
}

async fn fetch_all(cursor: &mut Cursor, sql: &str) -> ClientResult<Vec<Row>> {
    cursor.execute(sql, None).await?;
    cursor.fetchall().await
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Varchar(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn first_text(row: &Row) -> Option<String> {
    row.get(0).and_then(cell_text)
}

fn row_text(row: &Row) -> Vec<Option<String>> {
    row.values().iter().map(cell_text).collect()
}

fn type_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\w+").unwrap())
}

/// Turn `DESCRIBE` rows of `(name, type, comment)` into columns.
///
/// Blank and `# col_name` header rows are skipped; the partition section and
/// everything after it is ignored.
pub fn parse_describe_rows(
    rows: &[Vec<Option<String>>],
    registry: &TypeRegistry,
) -> Vec<IntrospectedColumn> {
    let mut columns = Vec::new();
    for row in rows {
        let field = |i: usize| {
            row.get(i)
                .and_then(|f| f.as_deref())
                .map(str::trim)
                .unwrap_or("")
        };
        let name = field(0);
        if name == PARTITION_SECTION {
            break;
        }
        if name.is_empty() || name == COLUMN_HEADER {
            continue;
        }

        let raw_type = field(1);
        let token = type_token_pattern()
            .find(raw_type)
            .map(|m| m.as_str().to_ascii_lowercase());
        let normalized = match token.as_deref() {
            Some("int") => Some("integer"),
            Some("string") => Some("varchar"),
            other => other,
        };
        let logical_type = match normalized.and_then(|t| registry.logical_type_of_name(t)) {
            Some(t) => t,
            None => {
                warn!(
                    "Did not recognize type '{}' of column '{}'",
                    raw_type, name
                );
                LogicalType::Unknown
            }
        };

        let comment = field(2);
        columns.push(IntrospectedColumn {
            name: name.to_string(),
            logical_type,
            raw_type: raw_type.to_string(),
            comment: (!comment.is_empty()).then(|| comment.to_string()),
            nullable: true,
            default: None,
        });
    }
    columns
}

//! Mapping between engine wire type ids and portable logical types.
//!
//! The table is built once per process and never mutated. Components receive
//! it as `&'static TypeRegistry` rather than reaching for a global.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use supersql_protocol::types::*;

/// Portable value types. Closed: adding a variant is a compile-checked change
/// to every decode and display site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Integer,
    Long,
    Double,
    Boolean,
    Varchar,
    Timestamp,
    Date,
    Null,
    Unknown,
}

impl LogicalType {
    pub const ALL: [LogicalType; 9] = [
        LogicalType::Integer,
        LogicalType::Long,
        LogicalType::Double,
        LogicalType::Boolean,
        LogicalType::Varchar,
        LogicalType::Timestamp,
        LogicalType::Date,
        LogicalType::Null,
        LogicalType::Unknown,
    ];

    /// Engine-side type name.
    pub fn sql_name(self) -> &'static str {
        match self {
            LogicalType::Integer => "integer",
            LogicalType::Long => "bigint",
            LogicalType::Double => "double",
            LogicalType::Boolean => "boolean",
            LogicalType::Varchar => "varchar",
            LogicalType::Timestamp => "timestamp",
            LogicalType::Date => "date",
            LogicalType::Null => "null",
            LogicalType::Unknown => "unknown",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            LogicalType::Integer | LogicalType::Long | LogicalType::Double
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, LogicalType::Timestamp | LogicalType::Date)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

// (wire id, JDBC name, logical type). The first id listed for a logical type
// is its canonical id.
const WIRE_TYPES: &[(i32, &str, LogicalType)] = &[
    (TYPE_INTEGER, "INTEGER", LogicalType::Integer),
    (TYPE_SMALLINT, "SMALLINT", LogicalType::Integer),
    (TYPE_TINYINT, "TINYINT", LogicalType::Integer),
    (TYPE_BIGINT, "BIGINT", LogicalType::Long),
    (TYPE_DOUBLE, "DOUBLE", LogicalType::Double),
    (TYPE_FLOAT, "FLOAT", LogicalType::Double),
    (TYPE_REAL, "REAL", LogicalType::Double),
    (TYPE_BOOLEAN, "BOOLEAN", LogicalType::Boolean),
    (TYPE_BIT, "BIT", LogicalType::Boolean),
    (TYPE_VARCHAR, "VARCHAR", LogicalType::Varchar),
    (TYPE_CHAR, "CHAR", LogicalType::Varchar),
    (TYPE_LONGVARCHAR, "LONGVARCHAR", LogicalType::Varchar),
    (TYPE_NVARCHAR, "NVARCHAR", LogicalType::Varchar),
    (TYPE_NCHAR, "NCHAR", LogicalType::Varchar),
    (TYPE_TIMESTAMP, "TIMESTAMP", LogicalType::Timestamp),
    (TYPE_DATE, "DATE", LogicalType::Date),
    (TYPE_NULL, "NULL", LogicalType::Null),
];

// Names the engine reports; anything else is unmapped.
const ENGINE_TYPE_NAMES: &[(&str, LogicalType)] = &[
    ("bigint", LogicalType::Long),
    ("integer", LogicalType::Integer),
    ("boolean", LogicalType::Boolean),
    ("double", LogicalType::Double),
    ("varchar", LogicalType::Varchar),
    ("timestamp", LogicalType::Timestamp),
    ("date", LogicalType::Date),
];

/// Read-only lookup tables for wire ids and engine type names.
#[derive(Debug)]
pub struct TypeRegistry {
    by_wire_id: HashMap<i32, (LogicalType, &'static str)>,
    canonical: HashMap<LogicalType, i32>,
    by_name: HashMap<&'static str, LogicalType>,
}

impl TypeRegistry {
    fn build() -> Self {
        let mut by_wire_id = HashMap::with_capacity(WIRE_TYPES.len());
        let mut canonical = HashMap::new();
        for &(id, name, logical) in WIRE_TYPES {
            by_wire_id.insert(id, (logical, name));
            canonical.entry(logical).or_insert(id);
        }
        canonical.insert(LogicalType::Unknown, TYPE_OTHER);
        let by_name = ENGINE_TYPE_NAMES.iter().copied().collect();
        Self {
            by_wire_id,
            canonical,
            by_name,
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static TypeRegistry {
        static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
        REGISTRY.get_or_init(TypeRegistry::build)
    }

    /// Total: ids the registry does not know map to `Unknown`.
    pub fn logical_type_of(&self, wire_type_id: i32) -> LogicalType {
        self.by_wire_id
            .get(&wire_type_id)
            .map(|(logical, _)| *logical)
            .unwrap_or(LogicalType::Unknown)
    }

    pub fn wire_type_of(&self, logical: LogicalType) -> i32 {
        self.canonical
            .get(&logical)
            .copied()
            .unwrap_or(TYPE_OTHER)
    }

    /// JDBC-style name for a wire id, `"OTHER"` when unmapped.
    pub fn wire_type_name(&self, wire_type_id: i32) -> &'static str {
        self.by_wire_id
            .get(&wire_type_id)
            .map(|(_, name)| *name)
            .unwrap_or("OTHER")
    }

    /// Lookup by engine type name; `None` on a miss so callers decide how
    /// loudly to report it.
    pub fn logical_type_of_name(&self, name: &str) -> Option<LogicalType> {
        self.by_name.get(name.to_ascii_lowercase().as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ids_map_to_families() {
        let reg = TypeRegistry::global();
        assert_eq!(reg.logical_type_of(TYPE_INTEGER), LogicalType::Integer);
        assert_eq!(reg.logical_type_of(TYPE_SMALLINT), LogicalType::Integer);
        assert_eq!(reg.logical_type_of(TYPE_BIGINT), LogicalType::Long);
        assert_eq!(reg.logical_type_of(TYPE_VARCHAR), LogicalType::Varchar);
        assert_eq!(reg.logical_type_of(TYPE_NCHAR), LogicalType::Varchar);
        assert_eq!(reg.logical_type_of(TYPE_REAL), LogicalType::Double);
        assert_eq!(reg.logical_type_of(TYPE_BIT), LogicalType::Boolean);
        assert_eq!(reg.logical_type_of(TYPE_TIMESTAMP), LogicalType::Timestamp);
        assert_eq!(reg.logical_type_of(TYPE_DATE), LogicalType::Date);
        assert_eq!(reg.logical_type_of(TYPE_NULL), LogicalType::Null);
    }

    #[test]
    fn test_lookup_is_total() {
        let reg = TypeRegistry::global();
        for id in [
            TYPE_DECIMAL,
            TYPE_ARRAY,
            TYPE_VARBINARY,
            TYPE_TIME,
            i32::MIN,
            i32::MAX,
            -1000,
        ] {
            assert_eq!(reg.logical_type_of(id), LogicalType::Unknown, "id {}", id);
        }
    }

    #[test]
    fn test_canonical_ids_round_trip() {
        let reg = TypeRegistry::global();
        for logical in LogicalType::ALL {
            let id = reg.wire_type_of(logical);
            assert_eq!(reg.logical_type_of(id), logical, "{:?}", logical);
        }
        assert_eq!(reg.wire_type_of(LogicalType::Integer), TYPE_INTEGER);
        assert_eq!(reg.wire_type_of(LogicalType::Varchar), TYPE_VARCHAR);
    }

    #[test]
    fn test_engine_names() {
        let reg = TypeRegistry::global();
        assert_eq!(reg.logical_type_of_name("bigint"), Some(LogicalType::Long));
        assert_eq!(reg.logical_type_of_name("VARCHAR"), Some(LogicalType::Varchar));
        assert_eq!(reg.logical_type_of_name("decimal"), None);
        // synonyms are normalized by the caller, not here
        assert_eq!(reg.logical_type_of_name("int"), None);
    }

    #[test]
    fn test_wire_type_names() {
        let reg = TypeRegistry::global();
        assert_eq!(reg.wire_type_name(TYPE_INTEGER), "INTEGER");
        assert_eq!(reg.wire_type_name(TYPE_BIGINT), "BIGINT");
        assert_eq!(reg.wire_type_name(TYPE_ARRAY), "OTHER");
    }
}

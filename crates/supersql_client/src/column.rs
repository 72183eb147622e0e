use supersql_protocol::ColumnMeta;

use crate::registry::{LogicalType, TypeRegistry};

/// Result column metadata, fixed for the life of a session once observed.
///
/// The engine reports neither sizes, precision nor scale; those fields stay
/// `None`, the cursor contract's "unknown".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub logical_type: LogicalType,
    pub wire_type: i32,
    /// Engine type name, e.g. `varchar(32)`.
    pub type_name: String,
    pub nullable: bool,
    pub display_size: Option<u32>,
    pub internal_size: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl ColumnDescriptor {
    pub fn from_meta(meta: &ColumnMeta, registry: &TypeRegistry) -> Self {
        Self {
            name: meta.name.clone(),
            logical_type: registry.logical_type_of(meta.type_id),
            wire_type: meta.type_id,
            type_name: meta.type_name.clone(),
            nullable: true,
            display_size: None,
            internal_size: None,
            precision: None,
            scale: None,
        }
    }

    /// Same name and wire type.
    pub(crate) fn same_shape(&self, meta: &ColumnMeta) -> bool {
        self.name == meta.name && self.wire_type == meta.type_id
    }
}

/// The seven-field description entry of the portable cursor contract:
/// name, type code, display size, internal size, precision, scale, null ok.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    /// JDBC-style type name, e.g. `"INTEGER"`.
    pub type_code: &'static str,
    pub display_size: Option<u32>,
    pub internal_size: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub null_ok: bool,
}

impl ColumnDescription {
    pub fn from_descriptor(column: &ColumnDescriptor, registry: &TypeRegistry) -> Self {
        Self {
            name: column.name.clone(),
            type_code: registry.wire_type_name(column.wire_type),
            display_size: column.display_size,
            internal_size: column.internal_size,
            precision: column.precision,
            scale: column.scale,
            null_ok: column.nullable,
        }
    }
}

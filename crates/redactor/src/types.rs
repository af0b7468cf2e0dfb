//! DLP `deidentifyContent` request and response model.
//!
//! Field names serialize in the service's JSON casing so a transport can send
//! these values as-is.

use serde::{Deserialize, Serialize};

/// A named category of sensitive data, e.g. `EMAIL_ADDRESS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InfoType {
    /// Category name as known to the service.
    pub name: String,
}

impl InfoType {
    /// Info type named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// What to look for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectConfig {
    /// Categories to detect.
    pub info_types: Vec<InfoType>,
}

/// Marker config: replace each finding with its info type name in brackets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceWithInfoTypeConfig {}

/// A single value transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveTransformation {
    /// `sal@domain.com` becomes `[EMAIL_ADDRESS]`.
    #[serde(rename = "replaceWithInfoTypeConfig")]
    ReplaceWithInfoType(ReplaceWithInfoTypeConfig),
}

/// Transformation applied to findings of the listed info types (all when empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoTypeTransformation {
    /// Info types this transformation applies to; empty means every finding.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub info_types: Vec<InfoType>,
    /// The transformation.
    pub primitive_transformation: PrimitiveTransformation,
}

/// Ordered list of info type transformations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoTypeTransformations {
    /// Transformations, applied in order.
    pub transformations: Vec<InfoTypeTransformation>,
}

/// How findings are rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeidentifyConfig {
    /// Per-info-type transformations.
    pub info_type_transformations: InfoTypeTransformations,
}

impl DeidentifyConfig {
    /// Replace every finding with `[INFO_TYPE]`.
    pub fn replace_with_info_type() -> Self {
        Self {
            info_type_transformations: InfoTypeTransformations {
                transformations: vec![InfoTypeTransformation {
                    info_types: Vec::new(),
                    primitive_transformation: PrimitiveTransformation::ReplaceWithInfoType(
                        ReplaceWithInfoTypeConfig {},
                    ),
                }],
            },
        }
    }
}

/// Table column header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldId {
    /// Column name.
    pub name: String,
}

/// One table cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Value {
    /// Cell contents.
    pub string_value: String,
}

/// One table row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// Cells, in column order.
    #[serde(default)]
    pub values: Vec<Value>,
}

/// Tabular content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Column headers.
    #[serde(default)]
    pub headers: Vec<FieldId>,
    /// Rows, in order.
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

/// Content sent to, and returned by, the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Tabular payload; `None` when the service answered with another content kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
}

/// A complete `deidentifyContent` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeidentifyRequest {
    /// Addressing scope, `projects/<id>`.
    pub parent: String,
    /// Detection settings.
    pub inspect_config: InspectConfig,
    /// Rewrite settings.
    pub deidentify_config: DeidentifyConfig,
    /// Content to scan.
    pub item: ContentItem,
}

//! The dashboard document
//!
//! This is the only artifact a build produces. It serializes to camelCase
//! JSON and is consumed as-is by the renderer, which does no type inference
//! of its own.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::SemanticType;

/// Fully built dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardDocument {
    pub name: String,
    pub sections: Vec<Section>,
    /// Earliest time-axis value over all charts, in epoch milliseconds
    pub min_time_value: Option<i64>,
    /// Latest time-axis value over all charts, in epoch milliseconds
    pub max_time_value: Option<i64>,
}

impl DashboardDocument {
    /// All widgets in document order
    pub fn widgets(&self) -> impl Iterator<Item = &Widget> {
        self.sections.iter().flat_map(|s| s.widgets.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// Filter controls and buttons
    Header,
    /// Charts, values and tables
    Content,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub kind: SectionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub widgets: Vec<Widget>,
}

impl Section {
    pub fn new(kind: SectionKind, title: Option<String>) -> Self {
        Self {
            kind,
            title,
            widgets: Vec::new(),
        }
    }
}

/// Every kind of widget a statement can render as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WidgetKind {
    Placeholder,
    Linechart,
    BarchartHorizontal,
    BarchartHorizontalStacked,
    BarchartVertical,
    BarchartVerticalStacked,
    Dropdown,
    DropdownMulti,
    Datepicker,
    DaterangePicker,
    Button,
    Value,
    Table,
}

impl WidgetKind {
    /// Widgets that belong in a header section
    pub fn is_header(self) -> bool {
        matches!(
            self,
            WidgetKind::Dropdown
                | WidgetKind::DropdownMulti
                | WidgetKind::Datepicker
                | WidgetKind::DaterangePicker
                | WidgetKind::Button
        )
    }

    pub fn is_chart(self) -> bool {
        matches!(
            self,
            WidgetKind::Linechart
                | WidgetKind::BarchartHorizontal
                | WidgetKind::BarchartHorizontalStacked
                | WidgetKind::BarchartVertical
                | WidgetKind::BarchartVerticalStacked
        )
    }

    pub fn section_kind(self) -> SectionKind {
        if self.is_header() {
            SectionKind::Header
        } else {
            SectionKind::Content
        }
    }
}

/// What a column does inside its widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Index,
    Value,
    Category,
    Label,
    Hint,
    From,
    To,
    Download,
    Compare,
    Trend,
}

/// How one statement is rendered
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSpec {
    #[serde(rename = "type")]
    pub kind: WidgetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Column index per role
    pub role_index: BTreeMap<Role, usize>,
}

impl RenderSpec {
    pub fn new(kind: WidgetKind) -> Self {
        Self {
            kind,
            label: None,
            role_index: BTreeMap::new(),
        }
    }

    pub fn with_role(mut self, role: Role, index: usize) -> Self {
        self.role_index.insert(role, index);
        self
    }

    pub fn with_optional_role(self, role: Role, index: Option<usize>) -> Self {
        match index {
            Some(index) => self.with_role(role, index),
            None => self,
        }
    }

    pub fn role(&self, role: Role) -> Option<usize> {
        self.role_index.get(&role).copied()
    }
}

/// Resolved column metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    /// Type name reported by the database
    pub db_type: String,
    #[serde(rename = "type")]
    pub semantic: SemanticType,
    /// At least one fetched cell is null
    pub nullable: bool,
    /// Role of the column in its widget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<Role>,
}

/// One rendered statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Widget {
    pub render: RenderSpec,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_shape() {
        let doc = DashboardDocument {
            name: "Sales".to_string(),
            sections: vec![Section {
                kind: SectionKind::Content,
                title: None,
                widgets: vec![Widget {
                    render: RenderSpec::new(WidgetKind::BarchartHorizontalStacked)
                        .with_role(Role::Index, 0)
                        .with_role(Role::Value, 1),
                    columns: vec![Column {
                        name: "m".to_string(),
                        db_type: "VARCHAR".to_string(),
                        semantic: SemanticType::Month,
                        nullable: false,
                        tag: Some(Role::Index),
                    }],
                    rows: vec![vec![json!(1)]],
                }],
            }],
            min_time_value: Some(0),
            max_time_value: None,
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["minTimeValue"], json!(0));
        assert_eq!(value["maxTimeValue"], json!(null));
        let widget = &value["sections"][0]["widgets"][0];
        assert_eq!(value["sections"][0]["kind"], json!("content"));
        assert_eq!(widget["render"]["type"], json!("barchartHorizontalStacked"));
        assert_eq!(widget["render"]["roleIndex"], json!({"index": 0, "value": 1}));
        assert_eq!(widget["columns"][0]["type"], json!("month"));
        assert_eq!(widget["columns"][0]["dbType"], json!("VARCHAR"));
        assert_eq!(widget["columns"][0]["tag"], json!("index"));
    }

    #[test]
    fn test_section_placement() {
        assert_eq!(WidgetKind::DaterangePicker.section_kind(), SectionKind::Header);
        assert_eq!(WidgetKind::Button.section_kind(), SectionKind::Header);
        assert_eq!(WidgetKind::Placeholder.section_kind(), SectionKind::Content);
        assert!(WidgetKind::BarchartVertical.is_chart());
    }
}

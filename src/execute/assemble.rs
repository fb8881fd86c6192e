//! Result assembly
//!
//! Places rendered widgets into header and content sections and tracks the
//! time range spanned by every time axis.

use serde_json::Value;

use crate::document::{DashboardDocument, Role, Section, SectionKind, Widget};

#[derive(Debug, Default)]
pub struct Assembler {
    sections: Vec<Section>,
    /// Set by an empty section marker; drops content until the next header
    hidden: bool,
    min_time: Option<i64>,
    max_time: Option<i64>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new header section from a section marker
    pub fn open_section(&mut self, title: Option<String>, hidden: bool) {
        self.sections
            .push(Section::new(SectionKind::Header, title));
        self.hidden = hidden;
    }

    /// Whether a content widget pushed now would be dropped
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Add a widget to the current section, or start one of the right kind
    ///
    /// Returns `false` when the widget was dropped by a hidden section.
    pub fn push(&mut self, widget: Widget) -> bool {
        let kind = widget.render.kind.section_kind();
        if kind == SectionKind::Header {
            self.hidden = false;
        }

        if self.sections.last().is_some_and(|last| last.kind == kind) {
            self.observe(&widget);
            if let Some(last) = self.sections.last_mut() {
                last.widgets.push(widget);
            }
            return true;
        }

        if self.hidden {
            return false;
        }

        self.observe(&widget);
        let mut section = Section::new(kind, None);
        section.widgets.push(widget);
        self.sections.push(section);
        true
    }

    fn observe(&mut self, widget: &Widget) {
        let Some(index) = widget.render.role(Role::Index) else {
            return;
        };
        let Some(column) = widget.columns.get(index) else {
            return;
        };
        if !column.semantic.is_time() {
            return;
        }
        for value in widget.rows.iter().filter_map(|row| row.get(index)) {
            if let Some(ms) = value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)) {
                self.min_time = Some(self.min_time.map_or(ms, |m| m.min(ms)));
                self.max_time = Some(self.max_time.map_or(ms, |m| m.max(ms)));
            } else if !matches!(value, Value::Null) {
                tracing::debug!(column = %column.name, "Non-numeric time axis value skipped");
            }
        }
    }

    pub fn finish(self, name: impl Into<String>) -> DashboardDocument {
        DashboardDocument {
            name: name.into(),
            sections: self.sections,
            min_time_value: self.min_time,
            max_time_value: self.max_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SemanticType;
    use crate::document::{Column, RenderSpec, WidgetKind};
    use serde_json::json;

    fn widget(kind: WidgetKind) -> Widget {
        Widget {
            render: RenderSpec::new(kind),
            columns: vec![],
            rows: vec![],
        }
    }

    fn timeline(kind: WidgetKind, semantic: SemanticType, values: &[i64]) -> Widget {
        Widget {
            render: RenderSpec::new(kind)
                .with_role(Role::Index, 0)
                .with_role(Role::Value, 1),
            columns: vec![
                Column {
                    name: "t".into(),
                    db_type: "TIMESTAMP".into(),
                    semantic,
                    nullable: false,
                    tag: Some(Role::Index),
                },
                Column {
                    name: "v".into(),
                    db_type: "INTEGER".into(),
                    semantic: SemanticType::Number,
                    nullable: false,
                    tag: Some(Role::Value),
                },
            ],
            rows: values.iter().map(|v| vec![json!(v), json!(1)]).collect(),
        }
    }

    fn kinds(doc: &DashboardDocument) -> Vec<(SectionKind, usize)> {
        doc.sections
            .iter()
            .map(|s| (s.kind, s.widgets.len()))
            .collect()
    }

    #[test]
    fn test_same_kind_widgets_share_a_section() {
        let mut asm = Assembler::new();
        asm.push(widget(WidgetKind::Dropdown));
        asm.push(widget(WidgetKind::Datepicker));
        asm.push(widget(WidgetKind::Value));
        asm.push(widget(WidgetKind::Table));
        asm.push(widget(WidgetKind::Button));

        let doc = asm.finish("d");
        assert_eq!(
            kinds(&doc),
            vec![
                (SectionKind::Header, 2),
                (SectionKind::Content, 2),
                (SectionKind::Header, 1)
            ]
        );
    }

    #[test]
    fn test_section_marker_starts_titled_header() {
        let mut asm = Assembler::new();
        asm.push(widget(WidgetKind::Value));
        asm.open_section(Some("Details".into()), false);
        asm.push(widget(WidgetKind::Dropdown));
        asm.push(widget(WidgetKind::Table));

        let doc = asm.finish("d");
        assert_eq!(
            kinds(&doc),
            vec![
                (SectionKind::Content, 1),
                (SectionKind::Header, 1),
                (SectionKind::Content, 1)
            ]
        );
        assert_eq!(doc.sections[1].title.as_deref(), Some("Details"));
    }

    #[test]
    fn test_hidden_section_drops_content_until_next_header() {
        let mut asm = Assembler::new();
        asm.open_section(None, true);
        assert!(!asm.push(widget(WidgetKind::Table)));
        assert!(asm.is_hidden());

        asm.push(widget(WidgetKind::Dropdown));
        assert!(!asm.is_hidden());
        assert!(asm.push(widget(WidgetKind::Table)));

        let doc = asm.finish("d");
        assert_eq!(
            kinds(&doc),
            vec![(SectionKind::Header, 1), (SectionKind::Content, 1)]
        );
    }

    #[test]
    fn test_time_range_over_time_axes() {
        let mut asm = Assembler::new();
        asm.push(timeline(WidgetKind::Linechart, SemanticType::Timestamp, &[500, 100]));
        asm.push(timeline(WidgetKind::BarchartVertical, SemanticType::Date, &[900]));
        asm.push(timeline(WidgetKind::BarchartVertical, SemanticType::Number, &[-5, 10_000]));

        let doc = asm.finish("d");
        assert_eq!(doc.min_time_value, Some(100));
        assert_eq!(doc.max_time_value, Some(900));
    }

    #[test]
    fn test_widget_joining_a_section_counts_toward_range() {
        let mut asm = Assembler::new();
        assert!(asm.push(timeline(WidgetKind::Linechart, SemanticType::Month, &[300])));
        assert!(asm.push(timeline(WidgetKind::Linechart, SemanticType::Month, &[50, 700])));

        let doc = asm.finish("d");
        assert_eq!(kinds(&doc), vec![(SectionKind::Content, 2)]);
        assert_eq!(doc.min_time_value, Some(50));
        assert_eq!(doc.max_time_value, Some(700));
    }

    #[test]
    fn test_no_time_axes() {
        let doc = Assembler::new().finish("empty");
        assert!(doc.sections.is_empty());
        assert_eq!(doc.min_time_value, None);
        assert_eq!(doc.max_time_value, None);
    }
}

//! Render classification
//!
//! Decides what a statement turns into. Rules are tried in a fixed order and
//! the first match wins, so tag-driven rules (charts, filters, buttons) beat
//! the shape-driven ones (single value, table).

use crate::catalog::Tag;
use crate::download::DownloadFormat;
use crate::document::{Column, RenderSpec, Role, WidgetKind};
use crate::reader::Cell;
use crate::tags::ColumnTags;
use crate::{Result, ShaperError};

/// Outcome of classifying one statement
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Label for the next widget
    Label(Option<String>),
    /// Start of a header section; `hidden` suppresses the following content
    Section { title: Option<String>, hidden: bool },
    /// A widget
    Widget(RenderSpec),
    /// A download button; the next statement is only run on demand
    Download(RenderSpec, DownloadFormat),
}

fn single_text(rows: &[Vec<Cell>]) -> Option<String> {
    rows.first()
        .and_then(|row| row.first())
        .and_then(|cell| match cell {
            Cell::Null => None,
            Cell::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
}

/// Classify a statement from its resolved columns, tags and rows
pub fn classify(
    columns: &[Column],
    tags: &ColumnTags,
    rows: &[Vec<Cell>],
) -> Result<Classification> {
    let one_by_one = rows.len() == 1 && columns.len() == 1;

    // Markers
    if tags.has(Tag::Label) && one_by_one {
        return Ok(Classification::Label(single_text(rows)));
    }

    if tags.has(Tag::Section) {
        if rows.is_empty() {
            return Ok(Classification::Section {
                title: None,
                hidden: true,
            });
        }
        if one_by_one {
            return Ok(Classification::Section {
                title: single_text(rows),
                hidden: false,
            });
        }
        return Err(ShaperError::ValidationError(format!(
            "SECTION must return zero rows or one row with one column, got {} rows and {} columns",
            rows.len(),
            columns.len()
        )));
    }

    if tags.has(Tag::Placeholder) && one_by_one {
        return Ok(Classification::Widget(RenderSpec::new(WidgetKind::Placeholder)));
    }

    // Charts
    let xaxis = tags.get(Tag::Xaxis);
    let yaxis = tags.get(Tag::Yaxis);
    let category = |specific: Tag| tags.get(specific).or_else(|| tags.get(Tag::Category));

    let line = tags.first_of(&[Tag::Linechart, Tag::LinechartPercent, Tag::LinechartYaxis]);
    if let (Some(index), Some((_, value))) = (xaxis, line) {
        return Ok(Classification::Widget(
            RenderSpec::new(WidgetKind::Linechart)
                .with_role(Role::Index, index)
                .with_role(Role::Value, value)
                .with_optional_role(Role::Category, category(Tag::LinechartCategory)),
        ));
    }

    let bar = tags.first_of(&[Tag::Barchart, Tag::BarchartPercent]);
    let stacked = tags.first_of(&[Tag::BarchartStacked, Tag::BarchartStackedPercent]);
    let bar_category = category(Tag::BarchartCategory);

    for (axis, plain_kind, stacked_kind) in [
        (
            xaxis,
            WidgetKind::BarchartHorizontal,
            WidgetKind::BarchartHorizontalStacked,
        ),
        (
            yaxis,
            WidgetKind::BarchartVertical,
            WidgetKind::BarchartVerticalStacked,
        ),
    ] {
        let Some(index) = axis else { continue };
        if let Some((_, value)) = bar {
            return Ok(Classification::Widget(
                RenderSpec::new(plain_kind)
                    .with_role(Role::Index, index)
                    .with_role(Role::Value, value)
                    .with_optional_role(Role::Category, bar_category),
            ));
        }
        if let (Some((_, value)), Some(cat)) = (stacked, bar_category) {
            return Ok(Classification::Widget(
                RenderSpec::new(stacked_kind)
                    .with_role(Role::Index, index)
                    .with_role(Role::Value, value)
                    .with_role(Role::Category, cat),
            ));
        }
    }

    // Filters
    for (tag, kind) in [
        (Tag::Dropdown, WidgetKind::Dropdown),
        (Tag::DropdownMulti, WidgetKind::DropdownMulti),
    ] {
        if let Some(value) = tags.get(tag) {
            return Ok(Classification::Widget(
                RenderSpec::new(kind)
                    .with_role(Role::Value, value)
                    .with_optional_role(Role::Label, tags.get(Tag::Label))
                    .with_optional_role(Role::Hint, tags.get(Tag::Hint)),
            ));
        }
    }

    if let Some(value) = tags.get(Tag::Datepicker) {
        return Ok(Classification::Widget(
            RenderSpec::new(WidgetKind::Datepicker).with_role(Role::Value, value),
        ));
    }

    if let (Some(from), Some(to)) = (tags.get(Tag::DatepickerFrom), tags.get(Tag::DatepickerTo)) {
        return Ok(Classification::Widget(
            RenderSpec::new(WidgetKind::DaterangePicker)
                .with_role(Role::From, from)
                .with_role(Role::To, to),
        ));
    }

    // Buttons
    for (tag, format) in [
        (Tag::DownloadCsv, DownloadFormat::Csv),
        (Tag::DownloadXlsx, DownloadFormat::Xlsx),
    ] {
        if let Some(index) = tags.get(tag) {
            return Ok(Classification::Download(
                RenderSpec::new(WidgetKind::Button).with_role(Role::Download, index),
                format,
            ));
        }
    }

    // Shapes
    if rows.len() == 1 {
        if columns.len() == 1 {
            return Ok(Classification::Widget(
                RenderSpec::new(WidgetKind::Value).with_role(Role::Value, 0),
            ));
        }
        if let (2, Some(compare @ 0..=1)) = (columns.len(), tags.get(Tag::Compare)) {
            return Ok(Classification::Widget(
                RenderSpec::new(WidgetKind::Value)
                    .with_role(Role::Value, 1 - compare)
                    .with_role(Role::Compare, compare),
            ));
        }
    }

    Ok(Classification::Widget(
        RenderSpec::new(WidgetKind::Table).with_optional_role(Role::Trend, tags.get(Tag::Trend)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SemanticType;

    fn columns(n: usize) -> Vec<Column> {
        (0..n)
            .map(|i| Column {
                name: format!("c{}", i),
                db_type: "VARCHAR".to_string(),
                semantic: SemanticType::String,
                nullable: false,
                tag: None,
            })
            .collect()
    }

    fn rows(n: usize, width: usize) -> Vec<Vec<Cell>> {
        (0..n)
            .map(|r| (0..width).map(|c| Cell::Int((r * width + c) as i64)).collect())
            .collect()
    }

    fn widget(c: Classification) -> RenderSpec {
        match c {
            Classification::Widget(spec) => spec,
            other => panic!("expected a widget, got {:?}", other),
        }
    }

    #[test]
    fn test_label_marker() {
        let tags = ColumnTags::from_pairs([(Tag::Label, 0)]);
        let label = classify(&columns(1), &tags, &[vec![Cell::Text("Revenue".into())]]).unwrap();
        assert_eq!(label, Classification::Label(Some("Revenue".into())));
    }

    #[test]
    fn test_section_shapes() {
        let tags = ColumnTags::from_pairs([(Tag::Section, 0)]);
        assert_eq!(
            classify(&columns(1), &tags, &[]).unwrap(),
            Classification::Section {
                title: None,
                hidden: true
            }
        );
        assert_eq!(
            classify(&columns(1), &tags, &[vec![Cell::Text("Sales".into())]]).unwrap(),
            Classification::Section {
                title: Some("Sales".into()),
                hidden: false
            }
        );
        assert_eq!(
            classify(&columns(1), &tags, &[vec![Cell::Text(String::new())]]).unwrap(),
            Classification::Section {
                title: None,
                hidden: false
            }
        );
        assert!(matches!(
            classify(&columns(2), &tags, &rows(1, 2)),
            Err(ShaperError::ValidationError(_))
        ));
    }

    #[test]
    fn test_placeholder() {
        let tags = ColumnTags::from_pairs([(Tag::Placeholder, 0)]);
        let spec = widget(classify(&columns(1), &tags, &rows(1, 1)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Placeholder);
    }

    #[test]
    fn test_linechart_beats_compare() {
        let tags = ColumnTags::from_pairs([(Tag::Xaxis, 0), (Tag::Linechart, 1), (Tag::Compare, 1)]);
        let spec = widget(classify(&columns(2), &tags, &rows(1, 2)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Linechart);
        assert_eq!(spec.role(Role::Index), Some(0));
        assert_eq!(spec.role(Role::Value), Some(1));
        assert_eq!(spec.role(Role::Category), None);
    }

    #[test]
    fn test_linechart_category_falls_back_to_category() {
        let tags = ColumnTags::from_pairs([
            (Tag::Xaxis, 0),
            (Tag::LinechartPercent, 1),
            (Tag::Category, 2),
        ]);
        let spec = widget(classify(&columns(3), &tags, &rows(4, 3)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Linechart);
        assert_eq!(spec.role(Role::Category), Some(2));
    }

    #[test]
    fn test_bar_variants() {
        let horizontal = ColumnTags::from_pairs([(Tag::Xaxis, 0), (Tag::Barchart, 1)]);
        assert_eq!(
            widget(classify(&columns(2), &horizontal, &rows(3, 2)).unwrap()).kind,
            WidgetKind::BarchartHorizontal
        );

        let vertical = ColumnTags::from_pairs([(Tag::Yaxis, 0), (Tag::Barchart, 1)]);
        assert_eq!(
            widget(classify(&columns(2), &vertical, &rows(3, 2)).unwrap()).kind,
            WidgetKind::BarchartVertical
        );

        let stacked = ColumnTags::from_pairs([
            (Tag::Yaxis, 0),
            (Tag::BarchartStacked, 1),
            (Tag::BarchartCategory, 2),
        ]);
        let spec = widget(classify(&columns(3), &stacked, &rows(3, 3)).unwrap());
        assert_eq!(spec.kind, WidgetKind::BarchartVerticalStacked);
        assert_eq!(spec.role(Role::Category), Some(2));
    }

    #[test]
    fn test_stacked_without_category_is_a_table() {
        let tags = ColumnTags::from_pairs([(Tag::Xaxis, 0), (Tag::BarchartStacked, 1)]);
        let spec = widget(classify(&columns(2), &tags, &rows(3, 2)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Table);
    }

    #[test]
    fn test_dropdown_roles() {
        let tags = ColumnTags::from_pairs([(Tag::DropdownMulti, 0), (Tag::Label, 1), (Tag::Hint, 2)]);
        let spec = widget(classify(&columns(3), &tags, &rows(2, 3)).unwrap());
        assert_eq!(spec.kind, WidgetKind::DropdownMulti);
        assert_eq!(spec.role(Role::Label), Some(1));
        assert_eq!(spec.role(Role::Hint), Some(2));
    }

    #[test]
    fn test_dropdown_with_single_label_row_is_still_a_dropdown() {
        // One row and two columns: LABEL is a role here, not a marker
        let tags = ColumnTags::from_pairs([(Tag::Dropdown, 0), (Tag::Label, 1)]);
        let spec = widget(classify(&columns(2), &tags, &rows(1, 2)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Dropdown);
    }

    #[test]
    fn test_datepickers() {
        let single = ColumnTags::from_pairs([(Tag::Datepicker, 0)]);
        assert_eq!(
            widget(classify(&columns(1), &single, &rows(1, 1)).unwrap()).kind,
            WidgetKind::Datepicker
        );

        let range = ColumnTags::from_pairs([(Tag::DatepickerFrom, 0), (Tag::DatepickerTo, 1)]);
        let spec = widget(classify(&columns(2), &range, &rows(1, 2)).unwrap());
        assert_eq!(spec.kind, WidgetKind::DaterangePicker);
        assert_eq!(spec.role(Role::To), Some(1));

        // Only one end of a range is not a picker
        let half = ColumnTags::from_pairs([(Tag::DatepickerFrom, 0)]);
        assert_eq!(
            widget(classify(&columns(1), &half, &rows(1, 1)).unwrap()).kind,
            WidgetKind::Value
        );
    }

    #[test]
    fn test_download_button() {
        let tags = ColumnTags::from_pairs([(Tag::DownloadXlsx, 0)]);
        let result = classify(&columns(1), &tags, &rows(1, 1)).unwrap();
        match result {
            Classification::Download(spec, format) => {
                assert_eq!(spec.kind, WidgetKind::Button);
                assert_eq!(format, DownloadFormat::Xlsx);
            }
            other => panic!("expected a download, got {:?}", other),
        }
    }

    #[test]
    fn test_value_shapes() {
        let none = ColumnTags::default();
        let spec = widget(classify(&columns(1), &none, &rows(1, 1)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Value);

        let compare = ColumnTags::from_pairs([(Tag::Compare, 0)]);
        let spec = widget(classify(&columns(2), &compare, &rows(1, 2)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Value);
        assert_eq!(spec.role(Role::Value), Some(1));
        assert_eq!(spec.role(Role::Compare), Some(0));

        // Two columns without COMPARE is a table
        let spec = widget(classify(&columns(2), &none, &rows(1, 2)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Table);

        let stray = ColumnTags::from_pairs([(Tag::Compare, 4)]);
        let spec = widget(classify(&columns(2), &stray, &rows(1, 2)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Table);
    }

    #[test]
    fn test_table_fallback_with_trend() {
        let tags = ColumnTags::from_pairs([(Tag::Trend, 2)]);
        let spec = widget(classify(&columns(3), &tags, &rows(5, 3)).unwrap());
        assert_eq!(spec.kind, WidgetKind::Table);
        assert_eq!(spec.role(Role::Trend), Some(2));

        let empty = widget(classify(&columns(1), &ColumnTags::default(), &[]).unwrap());
        assert_eq!(empty.kind, WidgetKind::Table);
    }
}

use std::collections::BTreeMap;
use std::io::Cursor;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference};

use crate::error::ApiError;

pub const FILENAME: &str = "shopping_list.pdf";
const TITLE: &str = "Список покупок";
// Helvetica has no Cyrillic glyphs
const FALLBACK_TITLE: &str = "Shopping list";

// page size in millimetres (A4 portrait), positions in points
const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const TITLE_X: f32 = 200.0;
const TITLE_Y: f32 = 800.0;
const TITLE_SIZE: f32 = 14.0;
const LINE_X: f32 = 50.0;
const FIRST_LINE_Y: f32 = 750.0;
const NEXT_PAGE_Y: f32 = 800.0;
const LINE_STEP: f32 = 25.0;
const BOTTOM_MARGIN: f32 = 50.0;
const LINE_SIZE: f32 = 12.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

impl ShoppingItem {
    pub fn line(&self) -> String {
        format!("{} — {} {}", self.name, self.amount, self.measurement_unit)
    }
}

/// Sums `(name, unit, amount)` rows per ingredient, ordered by name.
pub fn aggregate<I>(rows: I) -> Vec<ShoppingItem>
where
    I: IntoIterator<Item = (String, String, i32)>,
{
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for (name, unit, amount) in rows {
        *totals.entry((name, unit)).or_insert(0) += i64::from(amount);
    }
    totals
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingItem {
            name,
            measurement_unit,
            amount,
        })
        .collect()
}

fn pt(value: f32) -> Mm {
    Mm(value * 25.4 / 72.0)
}

/// Vertical positions of each line, as `(page index, y)`.
pub(crate) fn layout(lines: usize) -> Vec<(usize, f32)> {
    let mut positions = Vec::with_capacity(lines);
    let mut page = 0;
    let mut y = FIRST_LINE_Y;
    for _ in 0..lines {
        positions.push((page, y));
        y -= LINE_STEP;
        if y <= BOTTOM_MARGIN {
            page += 1;
            y = NEXT_PAGE_Y;
        }
    }
    positions
}

fn load_font(doc: &PdfDocumentReference, font: Option<&[u8]>) -> Result<IndirectFontRef, ApiError> {
    let loaded = match font {
        Some(bytes) => doc.add_external_font(Cursor::new(bytes)),
        None => doc.add_builtin_font(BuiltinFont::Helvetica),
    };
    loaded.map_err(|e| ApiError::Pdf(e.to_string()))
}

fn title(embedded_font: bool) -> &'static str {
    if embedded_font {
        TITLE
    } else {
        FALLBACK_TITLE
    }
}

/// Renders the list; `font` is a TrueType font to embed, Helvetica otherwise.
pub fn render_pdf(items: &[ShoppingItem], font: Option<&[u8]>) -> Result<Vec<u8>, ApiError> {
    let title = title(font.is_some());
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let font = load_font(&doc, font)?;

    let mut layer = doc.get_page(first_page).get_layer(first_layer);
    layer.use_text(title, TITLE_SIZE, pt(TITLE_X), pt(TITLE_Y), &font);

    let mut current_page = 0;
    for (item, (page, y)) in items.iter().zip(layout(items.len())) {
        if page != current_page {
            let (next_page, next_layer) =
                doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            layer = doc.get_page(next_page).get_layer(next_layer);
            current_page = page;
        }
        layer.use_text(item.line(), LINE_SIZE, pt(LINE_X), pt(y), &font);
    }

    doc.save_to_bytes().map_err(|e| ApiError::Pdf(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, unit: &str, amount: i32) -> (String, String, i32) {
        (name.to_string(), unit.to_string(), amount)
    }

    #[test]
    fn sums_per_ingredient_and_sorts_by_name() {
        let items = aggregate(vec![
            row("sugar", "g", 100),
            row("eggs", "pcs", 2),
            row("sugar", "g", 50),
            row("milk", "ml", 200),
            row("eggs", "pcs", 3),
        ]);
        let lines: Vec<String> = items.iter().map(ShoppingItem::line).collect();
        assert_eq!(
            lines,
            vec!["eggs — 5 pcs", "milk — 200 ml", "sugar — 150 g"]
        );
    }

    #[test]
    fn same_name_with_different_units_stays_apart() {
        let items = aggregate(vec![row("salt", "g", 5), row("salt", "pinch", 1), row("salt", "g", 1)]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].amount, 6);
        assert_eq!(items[1].measurement_unit, "pinch");
    }

    #[test]
    fn title_falls_back_without_an_embedded_font() {
        assert_eq!(title(true), "Список покупок");
        assert_eq!(title(false), "Shopping list");
    }

    #[test]
    fn empty_cart_gives_empty_list() {
        assert!(aggregate(Vec::new()).is_empty());
    }

    #[test]
    fn layout_breaks_pages() {
        // 750, 725, ... 75 fit on the first page: 28 lines
        let positions = layout(30);
        assert_eq!(positions[0], (0, 750.0));
        assert_eq!(positions[27], (0, 75.0));
        assert_eq!(positions[28], (1, 800.0));
        assert_eq!(positions[29], (1, 775.0));
    }

    #[test]
    fn renders_a_pdf() {
        let items = aggregate((0..40).map(|i| row(&format!("item {:02}", i), "g", i)));
        let bytes = render_pdf(&items, None).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn renders_an_empty_pdf() {
        let bytes = render_pdf(&[], None).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }
}

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::error::{CatalogError, Result};

static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub text: String,
    pub link: Option<Link>,
}

/// A data row of a calendar listing table. `index` is 1-based over data rows.
#[derive(Debug, Clone)]
pub struct Row {
    pub index: usize,
    pub cells: Vec<Cell>,
}

impl Row {
    fn cell(&self, col: usize) -> Result<&Cell> {
        self.cells.get(col).ok_or_else(|| {
            CatalogError::parse(
                format!("listing row {}", self.index),
                format!("expected at least {} cells, found {}", col + 1, self.cells.len()),
            )
        })
    }

    pub fn text(&self, col: usize) -> Result<&str> {
        Ok(self.cell(col)?.text.as_str())
    }

    /// The anchor in `col`. A missing anchor or href means the page layout changed.
    pub fn link(&self, col: usize) -> Result<&Link> {
        self.cell(col)?.link.as_ref().ok_or_else(|| {
            CatalogError::parse(
                format!("listing row {}", self.index),
                format!("no link with href in column {}", col),
            )
        })
    }
}

/// All `<tr>` rows in document order, minus the header row.
pub fn data_rows(html: &str) -> Vec<Row> {
    let document = Html::parse_document(html);
    document
        .select(&ROW_SEL)
        .skip(1)
        .enumerate()
        .map(|(i, tr)| Row {
            index: i + 1,
            cells: tr.select(&CELL_SEL).map(to_cell).collect(),
        })
        .collect()
}

fn to_cell(td: ElementRef<'_>) -> Cell {
    let link = td.select(&LINK_SEL).next().and_then(|a| {
        let href = a.value().attr("href")?.trim().to_string();
        Some(Link {
            text: element_text(a),
            href,
        })
    });
    Cell {
        text: element_text(td),
        link,
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// `/` + the last `n` `/`-separated segments of `path`.
pub fn tail_segments(path: &str, n: usize) -> String {
    let parts: Vec<&str> = path.trim().split('/').collect();
    let start = parts.len().saturating_sub(n);
    format!("/{}", parts[start..].join("/"))
}

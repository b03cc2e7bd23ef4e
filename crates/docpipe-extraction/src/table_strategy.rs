//! Table extraction strategy, ported from `extraction_service.py`'s
//! row-clustering table extractor: OCR boxes are grouped into rows by
//! y-coordinate proximity, a header row is located by fuzzy text match
//! against `table_header`, `column_name` is resolved to a column index
//! within that header, and values are read from every row that clusters
//! under it — tolerating +/-1 column-count drift and merging matching
//! tables across pages.

use crate::confidence::fuzzy_match_in_text;
use crate::value::ExtractedValue;
use docpipe_types::job::{OcrStructured, OcrTextBox};
use docpipe_types::rule::ExtractionStrategyConfig;
use docpipe_utils::{DocpipeError, Result};

/// Vertical pixel tolerance for clustering boxes into the same row.
const Y_THRESHOLD: i64 = 10;

/// Fraction of header words that must match for two rows to be
/// considered the same table header (single-page lookup and cross-page
/// merge both use this threshold).
const HEADER_MATCH_RATIO: f64 = 0.8;

struct Row {
    y: u32,
    /// Cells sorted left to right.
    cells: Vec<String>,
}

fn cluster_rows(boxes: &[OcrTextBox]) -> Vec<Row> {
    let mut sorted: Vec<&OcrTextBox> = boxes.iter().collect();
    sorted.sort_by_key(|b| b.bbox.1);

    let mut rows: Vec<Vec<&OcrTextBox>> = Vec::new();
    for b in sorted {
        match rows.last_mut() {
            Some(row) if (i64::from(row[0].bbox.1) - i64::from(b.bbox.1)).abs() <= Y_THRESHOLD => {
                row.push(b);
            }
            _ => rows.push(vec![b]),
        }
    }

    rows.into_iter()
        .map(|mut row| {
            row.sort_by_key(|b| b.bbox.0);
            Row {
                y: row[0].bbox.1,
                cells: row.into_iter().map(|b| b.text.clone()).collect(),
            }
        })
        .collect()
}

fn row_text(row: &Row) -> String {
    row.cells.join(" ")
}

fn is_header_row(row: &Row, table_header: &str) -> bool {
    let words: Vec<&str> = table_header.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }
    let text = row_text(row).to_lowercase();
    let matched = words
        .iter()
        .filter(|w| text.contains(&w.to_lowercase()))
        .count();
    matched as f64 / words.len() as f64 >= HEADER_MATCH_RATIO
}

fn same_header(a: &Row, b: &Row) -> bool {
    let words_a: Vec<String> = a.cells.iter().map(|c| c.to_lowercase()).collect();
    let words_b: Vec<String> = b.cells.iter().map(|c| c.to_lowercase()).collect();
    if words_a.is_empty() {
        return false;
    }
    let matched = words_a.iter().filter(|w| words_b.contains(w)).count();
    matched as f64 / words_a.len() as f64 >= HEADER_MATCH_RATIO
}

fn find_column_index(header: &Row, column_name: &str) -> Option<usize> {
    header
        .cells
        .iter()
        .position(|cell| fuzzy_match_in_text(column_name, cell) || fuzzy_match_in_text(cell, column_name))
}

fn is_compatible_data_row(header: &Row, row: &Row) -> bool {
    (row.cells.len() as i64 - header.cells.len() as i64).abs() <= 1
}

fn cell_at(row: &Row, index: usize) -> Option<&str> {
    row.cells.get(index).map(String::as_str)
}

/// Rows belonging to every table on `page` whose header matches
/// `table_header`, returned as `(header_row, data_rows)` tuples; a page
/// can contain more than one matching table (e.g. repeated line-item
/// blocks split by a page break upstream).
fn tables_on_page<'a>(rows: &'a [Row], table_header: &str) -> Vec<(&'a Row, Vec<&'a Row>)> {
    let mut tables = Vec::new();
    let mut i = 0;
    while i < rows.len() {
        if is_header_row(&rows[i], table_header) {
            let header = &rows[i];
            let mut data = Vec::new();
            let mut j = i + 1;
            while j < rows.len() && !is_header_row(&rows[j], table_header) {
                if is_compatible_data_row(header, &rows[j]) {
                    data.push(&rows[j]);
                }
                j += 1;
            }
            tables.push((header, data));
            i = j;
        } else {
            i += 1;
        }
    }
    tables
}

pub fn extract(ocr: &OcrStructured, config: &ExtractionStrategyConfig) -> Result<ExtractedValue> {
    let ExtractionStrategyConfig::Table {
        table_header,
        column_name,
        filter,
    } = config
    else {
        return Err(DocpipeError::Extraction(
            "table strategy invoked with a non-table config".into(),
        ));
    };

    let mut merged_header: Option<Row> = None;
    let mut values: Vec<(u32, String)> = Vec::new();

    for page in &ocr.pages {
        let rows = cluster_rows(&page.boxes);
        for (header, data_rows) in tables_on_page(&rows, table_header) {
            if let Some(existing) = &merged_header {
                if !same_header(existing, header) {
                    continue;
                }
            } else {
                merged_header = Some(clone_row(header));
            }

            let Some(col_index) = find_column_index(header, column_name) else {
                continue;
            };

            let filter_index = filter
                .as_ref()
                .and_then(|(filter_col, _)| find_column_index(header, filter_col));

            for row in data_rows {
                if let (Some((_, filter_val)), Some(filter_idx)) = (filter, filter_index) {
                    let matches = cell_at(row, filter_idx)
                        .is_some_and(|cell| fuzzy_match_in_text(filter_val, cell) || cell == filter_val);
                    if !matches {
                        continue;
                    }
                }
                if let Some(cell) = cell_at(row, col_index) {
                    values.push((page.page_number, cell.to_string()));
                }
            }
        }
    }

    if values.is_empty() {
        return Ok(ExtractedValue::empty());
    }

    if filter.is_some() {
        let (page, value) = values.into_iter().next().expect("checked non-empty");
        return Ok(ExtractedValue::scalar(value, Some(page)));
    }

    let last_page = values.last().map(|(p, _)| *p);
    let array = values
        .into_iter()
        .map(|(_, v)| serde_json::Value::String(v))
        .collect();
    Ok(ExtractedValue {
        value: serde_json::Value::Array(array),
        source_page: last_page,
    })
}

fn clone_row(row: &Row) -> Row {
    Row {
        y: row.y,
        cells: row.cells.clone(),
    }
}

pub mod rows;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};
use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::error::ExportError;
use crate::util::sanitize_file_stem;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

/// A record that can be flattened into one spreadsheet row.
pub trait SheetRow {
    fn cells(&self) -> Vec<CellValue>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Create,
    Append,
}

/// Header text for a dotted field name: its last segment.
pub fn header_name(field: &str) -> &str {
    field.rsplit('.').next().unwrap_or(field)
}

pub fn output_path(dir: &Path, iteration_path: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{}_{suffix}.xlsx", sanitize_file_stem(iteration_path)))
}

/// Fails when a fresh export would overwrite an existing file.
pub fn ensure_writable(path: &Path, mode: ExportMode) -> Result<(), ExportError> {
    if mode == ExportMode::Create && path.exists() {
        return Err(ExportError::OutputExists(path.to_path_buf()));
    }
    Ok(())
}

fn spreadsheet_err(e: impl std::fmt::Display) -> ExportError {
    ExportError::Spreadsheet(e.to_string())
}

pub struct SheetExporter {
    path: PathBuf,
    book: Spreadsheet,
    sheet_name: String,
    next_row: u32,
}

impl SheetExporter {
    pub fn open(path: &Path, sheet_name: &str, mode: ExportMode, columns: &[&str]) -> Result<Self> {
        ensure_writable(path, mode)?;

        let (mut book, appending) = if mode == ExportMode::Append && path.exists() {
            let book = umya_spreadsheet::reader::xlsx::read(path).map_err(spreadsheet_err)?;
            (book, true)
        } else {
            if mode == ExportMode::Append {
                info!(path = %path.display(), "no file to append to, creating it");
            }
            (umya_spreadsheet::new_file_empty_worksheet(), false)
        };

        let highest_row = book
            .get_sheet_by_name(sheet_name)
            .map(Worksheet::get_highest_row);
        // An existing but blank sheet still needs its header.
        let next_row = match highest_row {
            Some(highest) if appending && highest > 0 => highest + 1,
            _ => {
                if highest_row.is_none() {
                    book.new_sheet(sheet_name).map_err(spreadsheet_err)?;
                }
                let sheet = book
                    .get_sheet_by_name_mut(sheet_name)
                    .ok_or_else(|| spreadsheet_err(format!("missing sheet {sheet_name}")))?;
                write_header(sheet, columns);
                2
            }
        };
        debug!(path = %path.display(), sheet = sheet_name, next_row, "opened workbook");

        Ok(Self {
            path: path.to_path_buf(),
            book,
            sheet_name: sheet_name.to_string(),
            next_row,
        })
    }

    pub fn write_rows<R: SheetRow>(&mut self, rows: &[R]) -> Result<()> {
        let sheet = self
            .book
            .get_sheet_by_name_mut(&self.sheet_name)
            .ok_or_else(|| spreadsheet_err(format!("sheet {} disappeared", self.sheet_name)))?;

        for row in rows {
            for (col, value) in row.cells().into_iter().enumerate() {
                let coord = (col as u32 + 1, self.next_row);
                match value {
                    CellValue::Text(text) => {
                        sheet.get_cell_mut(coord).set_value(text);
                    }
                    CellValue::Number(n) => {
                        sheet.get_cell_mut(coord).set_value_number(n);
                    }
                    CellValue::Empty => {}
                }
            }
            self.next_row += 1;
        }
        Ok(())
    }

    /// Write the workbook to disk. Nothing is persisted before this.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        umya_spreadsheet::writer::xlsx::write(&self.book, &self.path).map_err(spreadsheet_err)?;
        Ok(())
    }
}

fn write_header(sheet: &mut Worksheet, columns: &[&str]) {
    for (col, field) in columns.iter().enumerate() {
        sheet
            .get_cell_mut((col as u32 + 1, 1u32))
            .set_value(header_name(field));
    }
}

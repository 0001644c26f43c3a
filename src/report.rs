//! The spreadsheet report: one sheet, one row per processed image.
//!
//! Columns are fixed: A = file name, B = recognized text (wrapped),
//! C = thumbnail anchored to the row. Data starts at row 1; there is no header.
//! Every persist writes a complete workbook to a sibling temp file and renames
//! it over the report, so the file on disk is always reopenable.

use crate::{
    config::Config,
    error::{Error, Result},
};
use image::{ImageFormat, imageops::FilterType};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use umya_spreadsheet::{
    Spreadsheet, Worksheet,
    structs::{Image, drawing::spreadsheet::MarkerType},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnWidths {
    pub name: f64,
    pub text: f64,
    pub image: f64,
}

impl Default for ColumnWidths {
    fn default() -> Self {
        Self {
            name: 20.0,
            text: 50.0,
            image: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub path: PathBuf,
    pub sheet_name: String,
    pub columns: ColumnWidths,
    pub px_per_width_unit: f64,
    pub fit_row_height: bool,
    /// Persist after every row rather than once per session.
    pub flush_every_row: bool,
    pub write_retries: u32,
}

impl ReportConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet_name: "Sheet1".into(),
            columns: ColumnWidths::default(),
            px_per_width_unit: 7.5,
            fit_row_height: true,
            flush_every_row: true,
            write_retries: 0,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let r = &cfg.report;
        Self {
            path: PathBuf::from(&cfg.paths.report_path),
            sheet_name: r.sheet_name.clone(),
            columns: ColumnWidths {
                name: r.name_width,
                text: r.text_width,
                image: r.image_width,
            },
            px_per_width_unit: r.px_per_width_unit,
            fit_row_height: r.fit_row_height,
            flush_every_row: r.flush_every_row,
            write_retries: r.write_retries,
        }
    }

    /// Side of the square thumbnail, in pixels.
    pub fn thumbnail_px(&self) -> u32 {
        (self.columns.image * self.px_per_width_unit).round().max(1.0) as u32
    }
}

/// One persisted row as read back from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub row: u32,
    pub file_name: String,
    pub text: String,
    pub wrap_text: bool,
    pub has_image: bool,
}

pub struct ReportBuilder {
    cfg: ReportConfig,
}

impl ReportBuilder {
    pub fn new(cfg: ReportConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.cfg
    }

    pub fn path(&self) -> &Path {
        &self.cfg.path
    }

    /// Opens the report (or starts a new workbook) for a run of appends.
    pub fn begin(&self) -> Result<ReportSession<'_>> {
        let mut book = if self.cfg.path.is_file() {
            debug!("opening report {}", self.cfg.path.display());
            umya_spreadsheet::reader::xlsx::read(&self.cfg.path)
                .map_err(|e| Error::report(&self.cfg.path, e))?
        } else {
            debug!("creating report {}", self.cfg.path.display());
            umya_spreadsheet::new_file_empty_worksheet()
        };

        if book.get_sheet_by_name(&self.cfg.sheet_name).is_none() {
            book.new_sheet(&self.cfg.sheet_name)
                .map_err(|e| Error::report(&self.cfg.path, e))?;
        }

        let mut session = ReportSession {
            cfg: &self.cfg,
            book,
            next_row: 1,
            pending: 0,
            poisoned: false,
        };
        let sheet = session.sheet_mut()?;
        apply_column_widths(sheet, &self.cfg.columns);
        let next_row = sheet.get_highest_row() + 1;
        session.next_row = next_row;
        Ok(session)
    }

    /// Opens, appends one row and persists. Returns the row index written.
    pub fn append_row(&self, file_name: &str, text: &str, image: &Path) -> Result<u32> {
        let mut session = self.begin()?;
        let row = session.append_row(file_name, text, image)?;
        session.commit()?;
        Ok(row)
    }

    /// All data rows currently on disk, in row order.
    pub fn read_rows(&self) -> Result<Vec<ReportRow>> {
        if !self.cfg.path.is_file() {
            return Ok(Vec::new());
        }
        let book = umya_spreadsheet::reader::xlsx::read(&self.cfg.path)
            .map_err(|e| Error::report(&self.cfg.path, e))?;
        let sheet = book.get_sheet_by_name(&self.cfg.sheet_name).ok_or_else(|| {
            Error::report(
                &self.cfg.path,
                format!("missing sheet {}", self.cfg.sheet_name),
            )
        })?;

        let anchored: HashSet<String> = sheet
            .get_image_collection()
            .iter()
            .map(|img| img.get_coordinate())
            .collect();

        Ok((1..=sheet.get_highest_row())
            .map(|row| ReportRow {
                row,
                file_name: sheet.get_value((1, row)),
                text: sheet.get_value((2, row)),
                wrap_text: sheet
                    .get_cell((2, row))
                    .and_then(|c| c.get_style().get_alignment())
                    .is_some_and(|a| matches!(a.get_wrap_text(), true)),
                has_image: anchored.contains(&format!("C{row}")),
            })
            .collect())
    }

    /// Deletes the report. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.cfg.path) {
            Ok(()) => {
                info!("removed report {}", self.cfg.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::report(&self.cfg.path, e)),
        }
    }
}

/// An open workbook. Rows become durable on persist: after each append when
/// `flush_every_row`, otherwise on [`ReportSession::commit`]. A failed persist
/// poisons the session.
pub struct ReportSession<'a> {
    cfg: &'a ReportConfig,
    book: Spreadsheet,
    next_row: u32,
    pending: u32,
    poisoned: bool,
}

impl ReportSession<'_> {
    pub fn next_row(&self) -> u32 {
        self.next_row
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn append_row(&mut self, file_name: &str, text: &str, image: &Path) -> Result<u32> {
        self.check_poisoned()?;
        let row = self.next_row;
        let thumb = self.thumbnail(image)?;
        let side = self.cfg.thumbnail_px();
        let fit_row_height = self.cfg.fit_row_height;
        let path = self.cfg.path.clone();

        let sheet = self.sheet_mut()?;
        sheet.get_cell_mut((1, row)).set_value_string(file_name);
        sheet.get_cell_mut((2, row)).set_value_string(text);
        sheet
            .get_style_mut((2, row))
            .get_alignment_mut()
            .set_wrap_text(true);

        if let Some(thumb) = &thumb {
            let thumb_path = thumb
                .path()
                .to_str()
                .ok_or_else(|| Error::report(&path, "thumbnail path is not UTF-8"))?;
            let mut marker = MarkerType::default();
            marker.set_coordinate(format!("C{row}"));
            let mut img = Image::default();
            img.new_image(thumb_path, marker);
            sheet.add_image(img);
            if fit_row_height {
                // 96 dpi: one pixel is 0.75pt
                sheet
                    .get_row_dimension_mut(&row)
                    .set_height(f64::from(side) * 0.75);
            }
        }

        self.next_row += 1;
        self.pending += 1;
        debug!(row, file_name, image = thumb.is_some(), "row appended");

        if self.cfg.flush_every_row {
            self.commit()?;
        }
        Ok(row)
    }

    /// Persists pending rows. A no-op when nothing is pending.
    pub fn commit(&mut self) -> Result<()> {
        self.check_poisoned()?;
        if self.pending == 0 {
            return Ok(());
        }

        let mut attempt = 0u32;
        loop {
            match persist(&self.book, &self.cfg.path) {
                Ok(()) => {
                    debug!(rows = self.pending, "report persisted");
                    self.pending = 0;
                    return Ok(());
                }
                Err(e) if attempt < self.cfg.write_retries => {
                    attempt += 1;
                    warn!("report persist failed (attempt {attempt}): {e}");
                    std::thread::sleep(Duration::from_millis(200 * u64::from(attempt)));
                }
                Err(e) => {
                    self.poisoned = true;
                    return Err(e);
                }
            }
        }
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::report(
                &self.cfg.path,
                "session unusable after a failed persist",
            ));
        }
        Ok(())
    }

    fn sheet_mut(&mut self) -> Result<&mut Worksheet> {
        let name = &self.cfg.sheet_name;
        self.book
            .get_sheet_by_name_mut(name)
            .ok_or_else(|| Error::report(&self.cfg.path, format!("missing sheet {name}")))
    }

    /// Square PNG thumbnail of `image`, or `None` if the file is missing or
    /// cannot be decoded.
    fn thumbnail(&self, image: &Path) -> Result<Option<NamedTempFile>> {
        if !image.is_file() {
            debug!("no image to embed at {}", image.display());
            return Ok(None);
        }
        let decoded = match image::open(image) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("cannot decode {}; row written without image: {e}", image.display());
                return Ok(None);
            }
        };

        let side = self.cfg.thumbnail_px();
        let thumb = decoded.resize_exact(side, side, FilterType::Triangle).to_rgba8();
        let tmp = tempfile::Builder::new()
            .prefix("scan-ledger-thumb-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| Error::report(&self.cfg.path, e))?;
        thumb
            .save_with_format(tmp.path(), ImageFormat::Png)
            .map_err(|e| Error::report(&self.cfg.path, e))?;
        Ok(Some(tmp))
    }
}

fn apply_column_widths(sheet: &mut Worksheet, widths: &ColumnWidths) {
    sheet.get_column_dimension_mut("A").set_width(widths.name);
    sheet.get_column_dimension_mut("B").set_width(widths.text);
    sheet.get_column_dimension_mut("C").set_width(widths.image);
}

fn persist(book: &Spreadsheet, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| Error::report(path, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".scan-ledger-")
        .suffix(".xlsx.partial")
        .tempfile_in(dir)
        .map_err(|e| Error::report(path, e))?;
    umya_spreadsheet::writer::xlsx::write_writer(book, tmp.as_file_mut())
        .map_err(|e| Error::report(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::report(path, e))?;
    tmp.persist(path).map_err(|e| Error::report(path, e.error))?;
    Ok(())
}

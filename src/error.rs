use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GrantsError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("savings API request failed: {0}")]
    Http(String),

    #[error("workbook not found: {0}")]
    #[diagnostic(help("run `doge-grants fetch` to download the dataset first"))]
    WorkbookNotFound(String),

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("sheet {0:?} not found in workbook")]
    MissingSheet(String),

    #[error("required column {column:?} missing from sheet {sheet:?}")]
    MissingColumn { sheet: String, column: String },

    #[error("page {page} out of range (1..={pages})")]
    InvalidPage { page: usize, pages: usize },

    #[error("CSV export failed: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

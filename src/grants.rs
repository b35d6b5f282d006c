use std::sync::{Arc, Mutex, MutexGuard};

use camino::Utf8PathBuf;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::domain::Collection;
use crate::error::GrantsError;
use crate::sanitize::clean_text;
use crate::workbook::{Cell, Table, read_sheet};

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "agency",
    "recipient",
    "description",
    "value",
    "savings",
    "date",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// One row of the Grants sheet with the fields the viewer works with.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub agency: Option<String>,
    pub recipient: Option<String>,
    pub description: Option<String>,
    pub value: Option<f64>,
    pub savings: Option<f64>,
    pub date: Option<String>,
    pub date_parsed: Option<NaiveDate>,
    pub year: Option<i32>,
    pub link: Option<String>,
    /// Every sheet cell, aligned with [`GrantDataset::columns`].
    pub cells: Vec<Cell>,
}

impl Grant {
    pub fn new(
        agency: Option<&str>,
        recipient: Option<&str>,
        description: Option<&str>,
        value: Option<f64>,
        savings: Option<f64>,
        date: Option<&str>,
    ) -> Self {
        let date_parsed = date.and_then(parse_date);
        Self {
            agency: agency.map(str::to_string),
            recipient: recipient.map(str::to_string),
            description: description.map(str::to_string),
            value,
            savings,
            date: date.map(str::to_string),
            date_parsed,
            year: date_parsed.map(|d| d.year()),
            link: None,
            cells: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrantDataset {
    pub columns: Vec<String>,
    pub grants: Vec<Grant>,
}

impl GrantDataset {
    /// Types a Grants sheet, re-cleaning every text cell and deriving `date_parsed`
    /// and `year`. Missing required columns reject the whole sheet.
    pub fn from_table(mut table: Table) -> Result<Self, GrantsError> {
        let index = |name: &str| table.column_index(name);
        let mut required = [0usize; REQUIRED_COLUMNS.len()];
        for (slot, name) in required.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = index(name).ok_or_else(|| GrantsError::MissingColumn {
                sheet: Collection::Grants.sheet_name().to_string(),
                column: name.to_string(),
            })?;
        }
        let [agency, recipient, description, value, savings, date] = required;
        let link = index("link");

        for row in &mut table.rows {
            for cell in row.iter_mut() {
                if let Cell::Text(text) = cell {
                    *text = clean_text(text);
                }
            }
        }

        let grants = table
            .rows
            .into_iter()
            .map(|cells| {
                let date_text = text_field(&cells[date]);
                let date_parsed = date_text.as_deref().and_then(parse_date);
                Grant {
                    agency: text_field(&cells[agency]),
                    recipient: text_field(&cells[recipient]),
                    description: text_field(&cells[description]),
                    value: cells[value].as_f64(),
                    savings: cells[savings].as_f64(),
                    date: date_text,
                    date_parsed,
                    year: date_parsed.map(|d| d.year()),
                    link: link.and_then(|idx| text_field(&cells[idx])),
                    cells,
                }
            })
            .collect();

        Ok(Self {
            columns: table.columns,
            grants,
        })
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

fn text_field(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        other => Some(other.to_field()),
    }
}

/// Parses the source date forms; anything else is `None`, never an error.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        })
}

/// Produces a fresh dataset on demand.
pub trait DatasetSource: Send + Sync {
    fn load_dataset(&self) -> Result<GrantDataset, GrantsError>;
}

/// Reads the Grants sheet of the downloaded workbook.
#[derive(Debug, Clone)]
pub struct WorkbookSource {
    path: Utf8PathBuf,
}

impl WorkbookSource {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetSource for WorkbookSource {
    fn load_dataset(&self) -> Result<GrantDataset, GrantsError> {
        let table = read_sheet(&self.path, Collection::Grants.sheet_name())?;
        GrantDataset::from_table(table)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    dataset: Option<Arc<GrantDataset>>,
    generation: u64,
}

/// Process-wide memoized dataset. `load` computes at most once per generation;
/// `invalidate` drops the cached copy and starts a new generation.
pub struct DatasetCache<S: DatasetSource> {
    source: S,
    state: Mutex<CacheState>,
}

impl<S: DatasetSource> DatasetCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn load(&self) -> Result<Arc<GrantDataset>, GrantsError> {
        let mut state = self.lock();
        if let Some(dataset) = &state.dataset {
            debug!(generation = state.generation, "dataset cache hit");
            return Ok(Arc::clone(dataset));
        }
        debug!(generation = state.generation, "dataset cache miss");
        let dataset = Arc::new(self.source.load_dataset()?);
        state.dataset = Some(Arc::clone(&dataset));
        Ok(dataset)
    }

    pub fn invalidate(&self) -> u64 {
        let mut state = self.lock();
        state.dataset = None;
        state.generation += 1;
        state.generation
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().dataset.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::api::{SavingsClient, fetch_all_records};
use crate::config::{DEFAULT_PER_PAGE, ResolvedConfig};
use crate::domain::{Collection, GrantFilter, SortKey};
use crate::error::GrantsError;
use crate::export::write_csv;
use crate::grants::{DatasetCache, DatasetSource, GrantDataset};
use crate::query::{self, QueryParams, QueryView};
use crate::sanitize::clean_value;
use crate::workbook::{Table, write_workbook};

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub workbook: String,
    pub sheets: Vec<SheetSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetSummary {
    pub sheet: String,
    pub records: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgencyList {
    pub agencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub rows: usize,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: SavingsClient, S: DatasetSource> {
    config: ResolvedConfig,
    client: C,
    cache: DatasetCache<S>,
}

impl<C: SavingsClient, S: DatasetSource> App<C, S> {
    pub fn new(config: ResolvedConfig, client: C, source: S) -> Self {
        Self {
            config,
            client,
            cache: DatasetCache::new(source),
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Drains both collections, then writes them as two sheets of one workbook.
    ///
    /// Nothing is written unless both collections were fetched; a transport error
    /// on either one aborts the run.
    pub fn fetch(&self, sink: &dyn ProgressSink) -> Result<FetchResult, GrantsError> {
        let mut tables = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let started = Instant::now();
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; draining {collection}"),
                elapsed: None,
            });
            let records = fetch_all_records(
                &self.client,
                self.config.endpoint(collection),
                collection.key(),
                DEFAULT_PER_PAGE,
            )?;
            let records: Vec<Value> = records.into_iter().map(clean_value).collect();
            sink.event(ProgressEvent {
                message: format!("fetched {} {collection}", records.len()),
                elapsed: Some(started.elapsed()),
            });
            tables.push((collection, Table::from_records(&records)));
        }

        sink.event(ProgressEvent {
            message: format!("phase=Store; writing {}", self.config.workbook),
            elapsed: None,
        });
        let sheets: Vec<(&str, &Table)> = tables
            .iter()
            .map(|(collection, table)| (collection.sheet_name(), table))
            .collect();
        write_workbook(&self.config.workbook, &sheets)?;
        info!(workbook = %self.config.workbook, "all data downloaded and saved");
        self.cache.invalidate();

        Ok(FetchResult {
            workbook: self.config.workbook.to_string(),
            sheets: tables
                .iter()
                .map(|(collection, table)| SheetSummary {
                    sheet: collection.sheet_name().to_string(),
                    records: table.len(),
                    columns: table.columns.len(),
                })
                .collect(),
        })
    }

    pub fn load(&self) -> Result<Arc<GrantDataset>, GrantsError> {
        self.cache.load()
    }

    /// Drops the memoized dataset so the next query re-reads the workbook.
    pub fn refresh(&self) -> RefreshResult {
        RefreshResult {
            generation: self.cache.invalidate(),
        }
    }

    pub fn agencies(&self) -> Result<AgencyList, GrantsError> {
        let dataset = self.load()?;
        Ok(AgencyList {
            agencies: query::agency_options(&dataset.grants),
        })
    }

    pub fn view(&self, params: &QueryParams) -> Result<QueryView, GrantsError> {
        let dataset = self.load()?;
        query::run(&dataset, params)
    }

    /// Writes the full filtered set, in display order, as CSV.
    pub fn export<W: Write>(
        &self,
        filter: &GrantFilter,
        sort: SortKey,
        writer: W,
        destination: &str,
    ) -> Result<ExportResult, GrantsError> {
        let dataset = self.load()?;
        let params = QueryParams {
            filter: filter.clone(),
            sort,
            ..QueryParams::default()
        };
        let grants = query::filtered(&dataset, &params);
        let rows = write_csv(writer, &dataset.columns, &grants)?;
        Ok(ExportResult {
            rows,
            destination: destination.to_string(),
        })
    }
}

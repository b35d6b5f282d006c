use std::collections::HashMap;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::{Value, json};

use doge_grants::api::{PageResponse, SavingsClient, fetch_all_records};
use doge_grants::app::{App, ProgressEvent, ProgressSink};
use doge_grants::config::{Config, ConfigLoader, ResolvedConfig};
use doge_grants::error::GrantsError;
use doge_grants::grants::WorkbookSource;
use doge_grants::workbook::{Cell, read_sheet};

#[derive(Clone, Copy)]
enum Page {
    Records(usize),
    Status(u16),
    Transport,
}

/// Serves scripted pages per endpoint; unscripted pages are empty.
#[derive(Default)]
struct MockSavings {
    pages: HashMap<(String, u32), Page>,
    calls: Mutex<Vec<(String, u32, u32)>>,
}

impl MockSavings {
    fn with_pages(mut self, endpoint: &str, pages: &[Page]) -> Self {
        for (idx, page) in pages.iter().enumerate() {
            self.pages
                .insert((endpoint.to_string(), idx as u32 + 1), *page);
        }
        self
    }

    fn calls_for(&self, endpoint: &str) -> Vec<u32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _, _)| url == endpoint)
            .map(|(_, page, _)| *page)
            .collect()
    }
}

impl SavingsClient for MockSavings {
    fn fetch_page(
        &self,
        endpoint: &str,
        collection_key: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PageResponse, GrantsError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), page, per_page));
        match self.pages.get(&(endpoint.to_string(), page)) {
            None => Ok(PageResponse::Records(Vec::new())),
            Some(Page::Status(status)) => Ok(PageResponse::Status(*status)),
            Some(Page::Transport) => Err(GrantsError::Http("connection reset".to_string())),
            Some(Page::Records(count)) => Ok(PageResponse::Records(
                (0..*count)
                    .map(|idx| record(collection_key, page, idx))
                    .collect(),
            )),
        }
    }
}

impl SavingsClient for &MockSavings {
    fn fetch_page(
        &self,
        endpoint: &str,
        collection_key: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PageResponse, GrantsError> {
        (**self).fetch_page(endpoint, collection_key, page, per_page)
    }
}

fn record(collection_key: &str, page: u32, idx: usize) -> Value {
    json!({
        "agency": format!("{collection_key}-agency-{}", idx % 3),
        "recipient": format!("Recipient {page}-{idx}"),
        "description": format!("page {page} item {idx}\u{0007}"),
        "value": (page as usize * 1000 + idx) as f64,
        "savings": idx as f64,
        "date": "2/14/2025",
        "link": format!("https://example.gov/{page}/{idx}"),
    })
}

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

fn config_in(dir: &tempfile::TempDir) -> ResolvedConfig {
    let workbook = Utf8PathBuf::from_path_buf(dir.path().join("download.xlsx")).unwrap();
    ConfigLoader::resolve_config(Config {
        contracts_url: Some("mock://contracts".to_string()),
        grants_url: Some("mock://grants".to_string()),
        workbook: Some(workbook.to_string()),
        ..Config::default()
    })
}

#[test]
fn drains_pages_until_empty_page() {
    let client = MockSavings::default().with_pages(
        "mock://grants",
        &[Page::Records(100), Page::Records(100), Page::Records(40)],
    );

    let records = fetch_all_records(&client, "mock://grants", "grants", 100).unwrap();

    assert_eq!(records.len(), 240);
    assert_eq!(records[0]["recipient"], "Recipient 1-0");
    assert_eq!(records[100]["recipient"], "Recipient 2-0");
    assert_eq!(records[239]["recipient"], "Recipient 3-39");
    assert_eq!(client.calls_for("mock://grants"), vec![1, 2, 3, 4]);
    assert!(client.calls.lock().unwrap().iter().all(|(_, _, per_page)| *per_page == 100));
}

#[test]
fn non_success_status_keeps_earlier_pages() {
    let client = MockSavings::default().with_pages(
        "mock://grants",
        &[
            Page::Records(100),
            Page::Records(100),
            Page::Status(500),
            Page::Records(100),
        ],
    );

    let records = fetch_all_records(&client, "mock://grants", "grants", 100).unwrap();

    assert_eq!(records.len(), 200);
    assert_eq!(client.calls_for("mock://grants"), vec![1, 2, 3]);
}

#[test]
fn transport_error_propagates() {
    let client =
        MockSavings::default().with_pages("mock://grants", &[Page::Records(5), Page::Transport]);

    let err = fetch_all_records(&client, "mock://grants", "grants", 100).unwrap_err();
    assert_matches!(err, GrantsError::Http(_));
}

#[test]
fn fetch_writes_both_sheets_cleaned() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let workbook = config.workbook.clone();
    let client = MockSavings::default()
        .with_pages("mock://contracts", &[Page::Records(3)])
        .with_pages("mock://grants", &[Page::Records(100), Page::Records(2)]);
    let app = App::new(config, client, WorkbookSource::new(workbook.clone()));

    let result = app.fetch(&NoopSink).unwrap();

    assert_eq!(result.sheets.len(), 2);
    assert_eq!(result.sheets[0].sheet, "Contracts");
    assert_eq!(result.sheets[0].records, 3);
    assert_eq!(result.sheets[1].sheet, "Grants");
    assert_eq!(result.sheets[1].records, 102);

    let contracts = read_sheet(&workbook, "Contracts").unwrap();
    assert_eq!(contracts.len(), 3);
    let grants = read_sheet(&workbook, "Grants").unwrap();
    assert_eq!(
        grants.columns,
        vec!["agency", "recipient", "description", "value", "savings", "date", "link"]
    );
    let description = grants.column_index("description").unwrap();
    assert_eq!(
        grants.rows[0][description],
        Cell::Text("page 1 item 0".to_string())
    );
    let value = grants.column_index("value").unwrap();
    assert_eq!(grants.rows[101][value], Cell::Number(2001.0));

    let dataset = app.load().unwrap();
    assert_eq!(dataset.len(), 102);
    assert_eq!(dataset.grants[0].year, Some(2025));
}

#[test]
fn transport_failure_on_second_collection_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let workbook = config.workbook.clone();
    let client = MockSavings::default()
        .with_pages("mock://contracts", &[Page::Records(10)])
        .with_pages("mock://grants", &[Page::Records(10), Page::Transport]);
    let app = App::new(config, client, WorkbookSource::new(workbook.clone()));

    let err = app.fetch(&NoopSink).unwrap_err();

    assert_matches!(err, GrantsError::Http(_));
    assert!(!workbook.as_std_path().exists());
}

#[test]
fn status_failure_still_writes_partial_collection() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let workbook = config.workbook.clone();
    let client = MockSavings::default()
        .with_pages("mock://contracts", &[Page::Status(503)])
        .with_pages("mock://grants", &[Page::Records(4), Page::Status(429)]);
    let app = App::new(config, client, WorkbookSource::new(workbook.clone()));

    let result = app.fetch(&NoopSink).unwrap();

    assert_eq!(result.sheets[0].records, 0);
    assert_eq!(result.sheets[1].records, 4);
    assert!(read_sheet(&workbook, "Contracts").unwrap().is_empty());
    assert_eq!(read_sheet(&workbook, "Grants").unwrap().len(), 4);
}

#[test]
fn fetch_ignores_per_page_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = Utf8PathBuf::from_path_buf(dir.path().join("download.xlsx")).unwrap();
    let config_path = dir.path().join("doge-grants.json");
    let content = json!({
        "contracts_url": "mock://contracts",
        "grants_url": "mock://grants",
        "per_page": 7,
        "workbook": workbook.as_str(),
    });
    std::fs::write(&config_path, content.to_string()).unwrap();
    let config = ConfigLoader::resolve(config_path.to_str()).unwrap();

    let client = MockSavings::default()
        .with_pages("mock://contracts", &[Page::Records(2)])
        .with_pages("mock://grants", &[Page::Records(2)]);
    let app = App::new(config, &client, WorkbookSource::new(workbook));
    app.fetch(&NoopSink).unwrap();

    let calls = client.calls.lock().unwrap();
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|(_, _, per_page)| *per_page == 100));
}

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::RegexBuilder;
use serde::Serialize;

use crate::domain::{GrantFilter, SortKey};
use crate::error::GrantsError;
use crate::grants::{Grant, GrantDataset};
use crate::sanitize::escape_html;

pub const MARK_OPEN: &str = "<mark>";
pub const MARK_CLOSE: &str = "</mark>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Agency,
    Recipient,
}

impl GroupField {
    fn key<'a>(self, grant: &'a Grant) -> Option<&'a str> {
        match self {
            GroupField::Agency => grant.agency.as_deref(),
            GroupField::Recipient => grant.recipient.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: String,
    pub total: f64,
    pub total_display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayFields {
    pub value_display: String,
    pub savings_display: String,
    pub date_display: String,
}

/// Distinct non-null agencies, ascending.
pub fn agency_options(grants: &[Grant]) -> Vec<String> {
    let mut options: Vec<String> = grants
        .iter()
        .filter_map(|grant| grant.agency.clone())
        .collect();
    options.sort();
    options.dedup();
    options
}

/// Keeps grants matching every active filter, in input order.
pub fn filter<'a>(grants: &'a [Grant], filter: &GrantFilter) -> Vec<&'a Grant> {
    grants
        .iter()
        .filter(|grant| filter.agency.matches(grant.agency.as_deref()))
        .filter(|grant| contains_needle(grant.recipient.as_deref(), &filter.recipient))
        .filter(|grant| contains_needle(grant.description.as_deref(), &filter.description))
        .collect()
}

/// Case-insensitive containment; an empty needle matches everything, a null
/// haystack matches nothing else.
fn contains_needle(haystack: Option<&str>, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .map(|text| text.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

/// Stable sort by a single key. Nulls go last for every key.
pub fn sort(grants: &mut [&Grant], key: SortKey) {
    match key {
        SortKey::Date => {
            grants.sort_by(|a, b| descending_nulls_last(a.date_parsed, b.date_parsed))
        }
        SortKey::Value => grants.sort_by(|a, b| descending_nulls_last(a.value, b.value)),
        SortKey::Savings => grants.sort_by(|a, b| descending_nulls_last(a.savings, b.savings)),
        SortKey::Recipient => grants.sort_by(|a, b| {
            ascending_nulls_last(a.recipient.as_deref(), b.recipient.as_deref())
        }),
    }
}

fn descending_nulls_last<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn ascending_nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sums `value` per `group_field` and keeps the `n` largest groups.
///
/// Null group keys are skipped and null values add nothing. Equal totals keep the
/// order in which their groups first appear in `grants`.
pub fn aggregate_top_n(
    grants: &[&Grant],
    group_field: GroupField,
    n: usize,
) -> Vec<GroupTotal> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for grant in grants {
        let Some(key) = group_field.key(grant) else {
            continue;
        };
        let amount = grant.value.unwrap_or(0.0);
        let idx = *positions.entry(key).or_insert_with(|| {
            totals.push((key, 0.0));
            totals.len() - 1
        });
        totals[idx].1 += amount;
    }

    totals.sort_by(|a, b| b.1.total_cmp(&a.1));
    totals
        .into_iter()
        .take(n)
        .map(|(key, total)| GroupTotal {
            key: key.to_string(),
            total,
            total_display: format_money(Some(total)),
        })
        .collect()
}

pub fn total_value(grants: &[&Grant]) -> f64 {
    grants.iter().filter_map(|grant| grant.value).sum()
}

/// `$` with thousands separators and no decimals; empty for a missing amount.
pub fn format_money(amount: Option<f64>) -> String {
    let Some(amount) = amount else {
        return String::new();
    };
    if !amount.is_finite() {
        return String::new();
    }
    let rounded = amount.round_ties_even();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("$-{grouped}")
    } else {
        format!("${grouped}")
    }
}

pub fn format_display(grant: &Grant) -> DisplayFields {
    DisplayFields {
        value_display: format_money(grant.value),
        savings_display: format_money(grant.savings),
        date_display: grant
            .date_parsed
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
    }
}

/// Number of pages for `len` items; an empty set still has one page.
pub fn page_count(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size.max(1)).max(1)
}

/// Returns the 1-indexed page `page_number`, rejecting pages outside `1..=page_count`.
pub fn paginate<T>(
    items: &[T],
    page_size: usize,
    page_number: usize,
) -> Result<&[T], GrantsError> {
    let page_size = page_size.max(1);
    let pages = page_count(items.len(), page_size);
    if page_number == 0 || page_number > pages {
        return Err(GrantsError::InvalidPage {
            page: page_number,
            pages,
        });
    }
    let start = (page_number - 1) * page_size;
    let end = (start + page_size).min(items.len());
    Ok(&items[start..end])
}

/// HTML-escapes `text` and wraps each case-insensitive occurrence of `needle`
/// in `<mark>` tags. Only the tags are markup; the record text never is.
pub fn highlight(text: &str, needle: &str) -> String {
    if needle.is_empty() {
        return escape_html(text);
    }
    let Ok(pattern) = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
    else {
        return escape_html(text);
    };

    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;
    for found in pattern.find_iter(text) {
        out.push_str(&escape_html(&text[last..found.start()]));
        out.push_str(MARK_OPEN);
        out.push_str(&escape_html(found.as_str()));
        out.push_str(MARK_CLOSE);
        last = found.end();
    }
    out.push_str(&escape_html(&text[last..]));
    out
}

#[derive(Debug, Clone)]
pub struct QueryParams {
    pub filter: GrantFilter,
    pub sort: SortKey,
    pub page: usize,
    pub page_size: usize,
    pub top_n: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            filter: GrantFilter::default(),
            sort: SortKey::default(),
            page: 1,
            page_size: crate::config::DEFAULT_PAGE_SIZE,
            top_n: crate::config::DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    pub agency: Option<String>,
    pub recipient: Option<String>,
    pub date_display: String,
    pub value_display: String,
    pub savings_display: String,
    pub link: Option<String>,
    /// Escaped description, with `<mark>` around description-filter matches.
    pub description_html: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryView {
    pub sort: String,
    pub total_results: usize,
    pub total_value: f64,
    pub total_value_display: String,
    pub top_agencies: Vec<GroupTotal>,
    pub top_recipients: Vec<GroupTotal>,
    pub page: usize,
    pub pages: usize,
    pub rows: Vec<ResultRow>,
}

impl QueryView {
    pub fn caption(&self) -> String {
        format!(
            "Showing {} of {} results",
            self.rows.len(),
            self.total_results
        )
    }
}

/// The full filtered set in display order, before pagination.
pub fn filtered<'a>(dataset: &'a GrantDataset, params: &QueryParams) -> Vec<&'a Grant> {
    let mut grants = filter(&dataset.grants, &params.filter);
    sort(&mut grants, params.sort);
    grants
}

pub fn run(dataset: &GrantDataset, params: &QueryParams) -> Result<QueryView, GrantsError> {
    let grants = filtered(dataset, params);
    let page = paginate(&grants, params.page_size, params.page)?;
    let needle = &params.filter.description;

    let rows = page
        .iter()
        .map(|grant| {
            let display = format_display(grant);
            let description = grant.description.as_deref().unwrap_or_default();
            ResultRow {
                agency: grant.agency.clone(),
                recipient: grant.recipient.clone(),
                date_display: display.date_display,
                value_display: display.value_display,
                savings_display: display.savings_display,
                link: grant.link.clone(),
                description_html: highlight(description, needle),
            }
        })
        .collect();

    let total_value = total_value(&grants);
    Ok(QueryView {
        sort: params.sort.label().to_string(),
        total_results: grants.len(),
        total_value,
        total_value_display: format_money(Some(total_value)),
        top_agencies: aggregate_top_n(&grants, GroupField::Agency, params.top_n),
        top_recipients: aggregate_top_n(&grants, GroupField::Recipient, params.top_n),
        page: params.page,
        pages: page_count(grants.len(), params.page_size),
        rows,
    })
}

use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    AgencyList, ExportResult, FetchResult, ProgressEvent, ProgressSink, RefreshResult,
};
use crate::query::{GroupTotal, MARK_CLOSE, MARK_OPEN, QueryView};

const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const REVERSE: &str = "\x1b[7m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_view(result: &QueryView) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_agencies(result: &AgencyList) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_export(result: &ExportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_refresh(result: &RefreshResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable rendering for a terminal.
pub struct TextOutput;

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        let message = event
            .message
            .split_once("; ")
            .map(|(_, payload)| payload)
            .unwrap_or(&event.message);
        match event.elapsed {
            Some(elapsed) => {
                eprintln!("{CYAN}•{RESET} {message} ({:.1}s)", elapsed.as_secs_f64())
            }
            None => eprintln!("{CYAN}•{RESET} {message}"),
        }
    }
}

impl TextOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for sheet in &result.sheets {
            writeln!(
                out,
                "{GREEN}✅ {}: {} records, {} columns{RESET}",
                sheet.sheet, sheet.records, sheet.columns
            )?;
        }
        writeln!(out, "\n🎉 All data downloaded and saved to '{}'", result.workbook)
    }

    pub fn print_view(view: &QueryView) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{CYAN}Sorted by {}{RESET}", view.sort)?;
        if view.total_results == 0 {
            writeln!(out, "{YELLOW}No results to chart.{RESET}")?;
        } else {
            write_top(&mut out, "📊 Top Agencies by Total Value", &view.top_agencies)?;
            write_top(&mut out, "📊 Top Recipients by Total Value", &view.top_recipients)?;
        }
        writeln!(
            out,
            "\n💰 Total Value of Filtered Grants: {}",
            view.total_value_display
        )?;

        writeln!(out, "\n📄 Filtered Results (page {} of {})", view.page, view.pages)?;
        if view.total_results == 0 {
            return writeln!(out, "{YELLOW}No matching results.{RESET}");
        }
        for row in &view.rows {
            writeln!(
                out,
                "\n{GREEN}{} — {} — {} — {}{RESET}",
                row.recipient.as_deref().unwrap_or_default(),
                row.agency.as_deref().unwrap_or_default(),
                row.date_display,
                row.value_display
            )?;
            writeln!(out, "  Amount:  {}", row.value_display)?;
            writeln!(out, "  Savings: {}", row.savings_display)?;
            writeln!(out, "  Link:    {}", row.link.as_deref().unwrap_or_default())?;
            writeln!(out, "  {}", terminal_marks(&row.description_html))?;
        }
        writeln!(out, "\n{}", view.caption())
    }

    pub fn print_agencies(result: &AgencyList) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for agency in &result.agencies {
            writeln!(out, "{agency}")?;
        }
        Ok(())
    }

    pub fn print_export(result: &ExportResult) -> io::Result<()> {
        eprintln!(
            "{GREEN}✅ exported {} rows to {}{RESET}",
            result.rows, result.destination
        );
        Ok(())
    }

    pub fn print_refresh(result: &RefreshResult) -> io::Result<()> {
        eprintln!("{CYAN}🔄 cache cleared (generation {}){RESET}", result.generation);
        Ok(())
    }
}

fn write_top(out: &mut impl Write, title: &str, rows: &[GroupTotal]) -> io::Result<()> {
    writeln!(out, "\n{title}")?;
    let width = rows
        .iter()
        .map(|row| row.key.chars().count())
        .max()
        .unwrap_or(0)
        .min(60);
    for row in rows {
        writeln!(out, "  {:<width$}  {:>18}", row.key, row.total_display)?;
    }
    Ok(())
}

/// Turns escaped, `<mark>`-tagged description text into plain terminal text with
/// the marks shown in reverse video.
pub fn terminal_marks(html: &str) -> String {
    html.replace(MARK_OPEN, REVERSE)
        .replace(MARK_CLOSE, RESET)
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

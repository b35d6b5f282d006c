use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use doge_grants::api::{SavingsClient, SavingsHttpClient};
use doge_grants::app::App;
use doge_grants::config::ConfigLoader;
use doge_grants::domain::{GrantFilter, SortKey};
use doge_grants::error::GrantsError;
use doge_grants::export::DEFAULT_EXPORT_FILE;
use doge_grants::grants::{DatasetSource, WorkbookSource};
use doge_grants::output::{JsonOutput, OutputMode, TextOutput};
use doge_grants::query::QueryParams;

#[derive(Parser)]
#[command(name = "doge-grants")]
#[command(about = "Download DOGE savings data and browse the grants")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download contracts and grants into the workbook")]
    Fetch,
    #[command(about = "Show filtered, sorted grants with top-10 summaries")]
    View(ViewArgs),
    #[command(about = "List agencies available for filtering")]
    Agencies,
    #[command(about = "Export the full filtered set as CSV")]
    Export(ExportArgs),
    #[command(about = "Drop the cached dataset so it is read again (interactive shell only)")]
    Refresh,
}

#[derive(Args, Clone)]
struct FilterArgs {
    #[arg(long)]
    agency: Option<String>,

    #[arg(long)]
    recipient: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long, value_enum, default_value_t = SortKey::Date)]
    sort: SortKey,

    #[arg(long)]
    refresh: bool,
}

impl FilterArgs {
    fn filter(&self) -> GrantFilter {
        GrantFilter::new(
            self.agency.as_deref(),
            self.recipient.as_deref(),
            self.description.as_deref(),
        )
    }
}

#[derive(Args, Clone)]
struct ViewArgs {
    #[command(flatten)]
    filter: FilterArgs,

    #[arg(long, default_value_t = 1)]
    page: usize,
}

#[derive(Args, Clone)]
struct ExportArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Destination file; `-` writes to stdout.
    #[arg(long, short, default_value = DEFAULT_EXPORT_FILE)]
    output: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<GrantsError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GrantsError) -> u8 {
    match error {
        GrantsError::WorkbookNotFound(_)
        | GrantsError::MissingSheet(_)
        | GrantsError::InvalidPage { .. }
        | GrantsError::ConfigRead(_) => 2,
        GrantsError::Http(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let source = WorkbookSource::new(config.workbook.clone());
    let client = SavingsHttpClient::new()?;
    let app = App::new(config, client, source);

    match cli.command {
        Some(command) => {
            ensure_one_shot(&command)?;
            run_command(command, &app, output_mode)
        }
        None => match output_mode {
            OutputMode::Interactive => run_shell(&app),
            OutputMode::NonInteractive => Err(miette::Report::msg(
                "command required (try `doge-grants --help`)",
            )),
        },
    }
}

/// Rejects commands that only make sense against the shell's long-lived cache.
fn ensure_one_shot(command: &Commands) -> miette::Result<()> {
    match command {
        Commands::Refresh => Err(miette::miette!(
            help = "use `--refresh` on `view` or `export`, or run `refresh` in the shell",
            "`refresh` only applies inside the interactive shell"
        )),
        _ => Ok(()),
    }
}

/// Reads commands from stdin and runs them against one long-lived app, so the
/// loaded dataset is reused until `refresh` or `fetch`.
fn run_shell<C: SavingsClient, S: DatasetSource>(app: &App<C, S>) -> miette::Result<()> {
    eprintln!("doge-grants shell: fetch | view [...] | agencies | export [...] | refresh | quit");
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        eprint!("> ");
        io::stderr().flush().into_diagnostic()?;
        line.clear();
        if stdin.lock().read_line(&mut line).into_diagnostic()? == 0 {
            break Ok(());
        }
        let words = split_command(&line);
        match words.first().map(String::as_str) {
            None => continue,
            Some("quit" | "exit") => break Ok(()),
            Some(_) => {}
        }
        let argv = std::iter::once("doge-grants".to_string()).chain(words);
        let command = match Cli::try_parse_from(argv) {
            Ok(Cli {
                command: Some(command),
                ..
            }) => command,
            Ok(_) => continue,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };
        if let Err(report) = run_command(command, app, OutputMode::Interactive) {
            eprintln!("{report:?}");
        }
    }
}

/// Whitespace split that keeps double-quoted phrases together.
fn split_command(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in input.trim().chars() {
        match ch {
            '"' => quoted = !quoted,
            ch if ch.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            ch => current.push(ch),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn run_command<C: SavingsClient, S: DatasetSource>(
    command: Commands,
    app: &App<C, S>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match command {
        Commands::Fetch => run_fetch(app, output_mode),
        Commands::View(args) => run_view(args, app, output_mode),
        Commands::Agencies => {
            let result = app.agencies()?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_agencies(&result),
                OutputMode::Interactive => TextOutput::print_agencies(&result),
            }
            .into_diagnostic()
        }
        Commands::Export(args) => run_export(args, app, output_mode),
        Commands::Refresh => {
            let result = app.refresh();
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_refresh(&result),
                OutputMode::Interactive => TextOutput::print_refresh(&result),
            }
            .into_diagnostic()
        }
    }
}

fn run_fetch<C: SavingsClient, S: DatasetSource>(
    app: &App<C, S>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch(&JsonOutput)?;
            JsonOutput::print_fetch(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.fetch(&TextOutput)?;
            TextOutput::print_fetch(&result).into_diagnostic()
        }
    }
}

fn run_view<C: SavingsClient, S: DatasetSource>(
    args: ViewArgs,
    app: &App<C, S>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if args.filter.refresh {
        app.refresh();
    }
    let params = QueryParams {
        filter: args.filter.filter(),
        sort: args.filter.sort,
        page: args.page,
        page_size: app.config().page_size,
        top_n: app.config().top_n,
    };
    let view = app.view(&params)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_view(&view),
        OutputMode::Interactive => TextOutput::print_view(&view),
    }
    .into_diagnostic()
}

fn run_export<C: SavingsClient, S: DatasetSource>(
    args: ExportArgs,
    app: &App<C, S>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if args.filter.refresh {
        app.refresh();
    }
    let filter = args.filter.filter();
    let result = if args.output == "-" {
        app.export(&filter, args.filter.sort, io::stdout().lock(), "stdout")?
    } else {
        let file = File::create(&args.output)
            .map_err(|err| GrantsError::Filesystem(format!("create {}: {err}", args.output)))?;
        app.export(&filter, args.filter.sort, BufWriter::new(file), &args.output)?
    };
    match output_mode {
        OutputMode::NonInteractive if args.output == "-" => Ok(()),
        OutputMode::NonInteractive => JsonOutput::print_export(&result).into_diagnostic(),
        OutputMode::Interactive => TextOutput::print_export(&result).into_diagnostic(),
    }
}

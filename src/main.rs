//! Privacy Analyzer - Main Entry Point
//!
//! Command-line front end: fetches a page, analyzes it and prints the report.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use privacy_analyzer::{
    analysis::{filter_report, parse_filters, Category, PageAnalyzer},
    config::{AnalyzerSettings, CliArgs},
    fetch::PageFetcher,
    report::AnalysisReport,
    NAME, VERSION,
};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// Output format of the `analyze` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn from_arg(value: Option<&String>) -> Self {
        match value.map(String::as_str) {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Options of one `analyze` invocation.
#[derive(Debug, Clone)]
struct AnalyzeOptions {
    url: String,
    output: Option<PathBuf>,
    filter: Option<String>,
    format: OutputFormat,
}

/// Build the CLI command parser
fn build_cli() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author("Privacy Analyzer Team")
        .about("Local-first privacy analyzer - detect trackers and fingerprinting")
        .long_about(
            "Privacy Analyzer inspects web pages for privacy issues:\n\
             - Scripts loaded from third-party domains\n\
             - Dangerous dynamic code execution (eval and friends)\n\
             - Browser APIs commonly used for fingerprinting",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file (TOML or JSON)")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Request timeout in milliseconds")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("user-agent")
                .long("user-agent")
                .value_name("STRING")
                .help("Custom user agent string")
                .global(true),
        )
        .arg(
            Arg::new("max-redirects")
                .long("max-redirects")
                .value_name("COUNT")
                .help("Maximum number of redirects to follow")
                .global(true)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_name("COUNT")
                .help("Maximum number of entries listed per section")
                .global(true)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("compact")
                .long("compact")
                .help("Print JSON on stdout without indentation")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress output except errors")
                .global(true)
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .subcommand(
            Command::new("analyze")
                .about("Analyze a URL for privacy issues")
                .arg(
                    Arg::new("url")
                        .value_name("URL")
                        .help("URL to analyze")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Output JSON report to file")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("filter")
                        .short('f')
                        .long("filter")
                        .value_name("LIST")
                        .help("Comma-separated categories: trackers, eval, fingerprinting, all"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_name("FORMAT")
                        .help("Report format on stdout")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
}

/// Parse CLI arguments into CliArgs struct
fn parse_cli_args(matches: &clap::ArgMatches) -> CliArgs {
    let mut args = CliArgs::default();

    args.config_file = matches.get_one::<PathBuf>("config").cloned();
    args.timeout_ms = matches.get_one::<u64>("timeout").copied();
    args.user_agent = matches.get_one::<String>("user-agent").cloned();
    args.max_redirects = matches.get_one::<usize>("max-redirects").copied();
    args.display_limit = matches.get_one::<usize>("limit").copied();

    if matches.get_flag("compact") {
        args.pretty_json = Some(false);
    }

    args
}

/// Parse the `analyze` subcommand options
fn parse_analyze_args(matches: &clap::ArgMatches) -> Option<AnalyzeOptions> {
    let url = matches.get_one::<String>("url")?.clone();

    Some(AnalyzeOptions {
        url,
        output: matches.get_one::<PathBuf>("output").cloned(),
        filter: matches.get_one::<String>("filter").cloned(),
        format: OutputFormat::from_arg(matches.get_one::<String>("format")),
    })
}

/// Initialize the tracing/logging subsystem
///
/// Logs go to stderr; stdout carries only the report.
fn init_tracing(verbosity: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Render a report for stdout according to the settings
fn render_json(report: &AnalysisReport, settings: &AnalyzerSettings) -> Result<String> {
    let json = if settings.pretty_json {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    };
    json.context("Failed to serialize report")
}

/// Write the report to `path` as pretty-printed JSON
fn write_report(path: &Path, report: &AnalysisReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}

/// Print a section header with its total
fn print_section(title: &str, total: usize) {
    println!(
        "\n{bold}{blue}{title}{reset} ({total}):",
        bold = colors::BOLD,
        blue = colors::BLUE,
        reset = colors::RESET
    );
}

fn print_none_detected() {
    println!(
        "  {green}None detected{reset}",
        green = colors::GREEN,
        reset = colors::RESET
    );
}

fn print_overflow(total: usize, limit: usize) {
    if total > limit {
        println!(
            "  {dim}... and {} more{reset}",
            total - limit,
            dim = colors::DIM,
            reset = colors::RESET
        );
    }
}

/// Print the report for a terminal
fn print_report(report: &AnalysisReport, categories: &[Category], limit: usize) {
    let rule = "=".repeat(50);
    println!(
        "{bold}{cyan}Analysis Results{reset}",
        bold = colors::BOLD,
        cyan = colors::CYAN,
        reset = colors::RESET
    );
    println!("{rule}");

    let summary = report.summary();

    if categories.contains(&Category::Trackers) {
        print_section("Third-Party Domains", summary.total_third_party_domains);
        if report.third_party_domains().is_empty() {
            print_none_detected();
        }
        for domain in report.third_party_domains().iter().take(limit) {
            println!(
                "  - {yellow}{domain}{reset}",
                yellow = colors::YELLOW,
                reset = colors::RESET
            );
        }
        print_overflow(report.third_party_domains().len(), limit);
    }

    if categories.contains(&Category::Eval) {
        print_section("Inline Eval Patterns", summary.total_eval_patterns);
        if report.inline_eval_patterns().is_empty() {
            print_none_detected();
        }
        let matches: Vec<_> = report
            .inline_eval_patterns()
            .iter()
            .flat_map(|finding| finding.patterns.iter().map(move |m| (finding.index, m)))
            .collect();
        for (index, m) in matches.iter().take(limit) {
            println!(
                "  - Script #{index}: {magenta}{}{reset} (line {}, col {}): {dim}{}{reset}",
                m.pattern,
                m.line,
                m.column,
                m.snippet,
                magenta = colors::MAGENTA,
                dim = colors::DIM,
                reset = colors::RESET
            );
        }
        print_overflow(matches.len(), limit);
    }

    if categories.contains(&Category::Fingerprinting) {
        print_section("Fingerprinting APIs", summary.total_fingerprinting_apis);
        if report.fingerprinting_apis().is_empty() {
            print_none_detected();
        }
        for api in report.fingerprinting_apis().iter().take(limit) {
            println!(
                "  - {yellow}{api}{reset}",
                yellow = colors::YELLOW,
                reset = colors::RESET
            );
        }
        print_overflow(report.fingerprinting_apis().len(), limit);
    }

    println!("\n{rule}");
}

/// Fetch, analyze and report one URL
async fn analyze(options: AnalyzeOptions, settings: &AnalyzerSettings) -> Result<()> {
    let categories = match options.filter {
        Some(ref filter) => parse_filters(filter)?,
        None => settings.default_categories()?,
    };
    debug!(
        "Reporting categories: {}",
        categories
            .iter()
            .map(Category::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );

    if options.format == OutputFormat::Text {
        println!(
            "{bold}Analyzing:{reset} {}\n",
            options.url,
            bold = colors::BOLD,
            reset = colors::RESET
        );
    }

    let fetcher = PageFetcher::new(settings).context("Failed to build HTTP client")?;
    let page = fetcher.fetch(&options.url).await?;

    let report = PageAnalyzer::new().analyze_html(&options.url, &page.body)?;
    let report = filter_report(&report, &categories);
    info!(
        "Analysis of {} finished: {} domain(s), {} eval finding(s), {} fingerprinting API(s)",
        report.url(),
        report.summary().total_third_party_domains,
        report.summary().total_eval_patterns,
        report.summary().total_fingerprinting_apis
    );

    match options.format {
        OutputFormat::Text => print_report(&report, &categories, settings.display_limit),
        OutputFormat::Json => println!("{}", render_json(&report, settings)?),
    }

    if let Some(ref path) = options.output {
        write_report(path, &report)?;
        if options.format == OutputFormat::Text {
            println!(
                "\n{green}Report saved to:{reset} {}",
                path.display(),
                green = colors::GREEN,
                reset = colors::RESET
            );
        }
    }

    Ok(())
}

async fn run(matches: clap::ArgMatches) -> Result<()> {
    let cli_args = parse_cli_args(&matches);

    // Load configuration with full precedence chain
    let settings = cli_args
        .load_settings()
        .context("Failed to load configuration")?;

    match matches.subcommand() {
        Some(("analyze", sub)) => {
            let options = parse_analyze_args(sub).context("Missing URL to analyze")?;
            analyze(options, &settings).await
        }
        Some((other, _)) => anyhow::bail!("Unknown command: {}", other),
        None => anyhow::bail!("No command given"),
    }
}

/// Main application entry point
#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    // Get verbosity settings before loading config
    let verbosity = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");

    init_tracing(verbosity, quiet);

    if let Err(e) = run(matches).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cmd = build_cli();

        let matches = cmd
            .clone()
            .try_get_matches_from([
                "privacy-analyzer",
                "analyze",
                "https://example.com",
                "-o",
                "report.json",
                "--filter",
                "trackers,eval",
            ])
            .unwrap();

        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "analyze");
        assert_eq!(
            sub.get_one::<String>("url").map(String::as_str),
            Some("https://example.com")
        );
        assert_eq!(
            sub.get_one::<PathBuf>("output"),
            Some(&PathBuf::from("report.json"))
        );
        assert_eq!(
            sub.get_one::<String>("filter").map(String::as_str),
            Some("trackers,eval")
        );
    }

    #[test]
    fn test_cli_requires_url() {
        let result = build_cli().try_get_matches_from(["privacy-analyzer", "analyze"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = build_cli().try_get_matches_from(["privacy-analyzer"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_format_values() {
        let cmd = build_cli();

        let matches = cmd
            .clone()
            .try_get_matches_from(["privacy-analyzer", "analyze", "https://a.test", "--format", "json"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(parse_analyze_args(sub).unwrap().format, OutputFormat::Json);

        let result = cmd.try_get_matches_from([
            "privacy-analyzer",
            "analyze",
            "https://a.test",
            "--format",
            "yaml",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_default_format_is_text() {
        let matches = build_cli()
            .try_get_matches_from(["privacy-analyzer", "analyze", "https://a.test"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let options = parse_analyze_args(sub).unwrap();
        assert_eq!(options.format, OutputFormat::Text);
        assert!(options.output.is_none());
        assert!(options.filter.is_none());
    }

    #[test]
    fn test_cli_conflicts() {
        let result = build_cli().try_get_matches_from([
            "privacy-analyzer",
            "-v",
            "-q",
            "analyze",
            "https://a.test",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_cli_args() {
        let matches = build_cli()
            .try_get_matches_from([
                "privacy-analyzer",
                "analyze",
                "https://a.test",
                "--timeout",
                "5000",
                "--user-agent",
                "test-agent",
                "--limit",
                "3",
                "--compact",
                "-c",
                "analyzer.toml",
            ])
            .unwrap();

        let args = parse_cli_args(&matches);

        assert_eq!(args.timeout_ms, Some(5000));
        assert_eq!(args.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(args.display_limit, Some(3));
        assert_eq!(args.pretty_json, Some(false));
        assert_eq!(args.config_file, Some(PathBuf::from("analyzer.toml")));
        assert_eq!(args.max_redirects, None);
    }

    #[test]
    fn test_written_report_is_always_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = PageAnalyzer::new()
            .analyze_html(
                "https://example.com",
                r#"<script src="https://cdn.example.com/lib.js"></script>"#,
            )
            .unwrap();

        write_report(&path, &report).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\n  \"thirdPartyDomains\""));

        // Compact output applies to stdout only.
        let compact = AnalyzerSettings::default().with_pretty_json(false);
        assert!(!render_json(&report, &compact).unwrap().contains('\n'));
        assert!(render_json(&report, &AnalyzerSettings::default())
            .unwrap()
            .contains('\n'));

        let back: AnalysisReport = serde_json::from_str(&written).unwrap();
        assert_eq!(back.third_party_domains(), ["cdn.example.com"]);
    }
}

//! Zonescope CLI
//!
//! Resolves zone hierarchies, record sets and registration data for a domain
//! from the command line and prints them as a tree, tables or JSON.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use zonescope::dns::context::{DohProvider, LookupConfig, LookupContext};
use zonescope::dns::doh::DohRecord;
use zonescope::dns::errors::LookupError;
use zonescope::dns::hierarchy::{HierarchyResolver, ZoneNode};
use zonescope::dns::rdap::{RdapResolver, RegistrationResult};
use zonescope::dns::records::{DetailedRecordSet, RecordAggregator};

/// Zonescope - explore DNS delegation over DNS-over-HTTPS
#[derive(Parser)]
#[command(name = "zonescope")]
#[command(version)]
#[command(about = "Zone hierarchy, record and RDAP explorer over DoH", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// DoH JSON endpoint
    #[arg(short = 'e', long, env = "ZONESCOPE_ENDPOINT")]
    endpoint: Option<String>,

    /// Well-known DoH provider, used when no endpoint is given
    #[arg(short = 'p', long, value_enum)]
    provider: Option<Provider>,

    /// TOML configuration file
    #[arg(short = 'c', long, env = "ZONESCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Per-query timeout in milliseconds
    #[arg(long, env = "ZONESCOPE_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Maximum queries per rate-limit window
    #[arg(long, env = "ZONESCOPE_MAX_QUERIES")]
    max_queries: Option<usize>,

    /// Rate-limit window in milliseconds
    #[arg(long, env = "ZONESCOPE_WINDOW_MS")]
    window_ms: Option<u64>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// No color output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy)]
enum Provider {
    Cloudflare,
    Google,
}

impl From<Provider> for DohProvider {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Cloudflare => DohProvider::Cloudflare,
            Provider::Google => DohProvider::Google,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, PartialEq)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the zone tree of a domain
    Hierarchy {
        /// Domain name or URL
        domain: String,
    },

    /// Print the zone apex enclosing a domain
    Apex {
        /// Domain name or URL
        domain: String,
    },

    /// Fetch SOA/NS at the zone apex and A/AAAA/CNAME/MX/TXT at the domain
    Records {
        /// Domain name or URL
        domain: String,

        /// Zone apex, resolved from the hierarchy when omitted
        #[arg(long)]
        apex: Option<String>,
    },

    /// Look up registration data over RDAP
    Rdap {
        /// Domain name, usually a zone apex
        domain: String,
    },

    /// Hierarchy, records and registration data in one go
    Inspect {
        /// Domain name or URL
        domain: String,
    },
}

#[derive(Serialize)]
struct Inspection {
    hierarchy: ZoneNode,
    records: DetailedRecordSet,
    registration: RegistrationResult,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = build_config(&cli)?;
    tracing::debug!(?config, "Effective configuration");

    let endpoint = config.endpoint.clone();
    let context = LookupContext::new(config);
    let formatter = OutputFormatter::new(cli.output, cli.no_color);

    match cli.command {
        Commands::Hierarchy { domain } => {
            let pb = show_progress(&format!("Resolving zones of {}...", domain));
            let result = HierarchyResolver::new(context)
                .resolve_hierarchy(&domain, &endpoint)
                .await;
            pb.finish_and_clear();

            let tree = exit_on_error(result, &domain, &formatter);
            formatter.print(&tree, || print_tree(&tree))?;
        }
        Commands::Apex { domain } => {
            let apex = HierarchyResolver::new(context)
                .find_zone_apex(&domain, &endpoint)
                .await;
            formatter.print(&apex, || println!("{}", apex))?;
        }
        Commands::Records { domain, apex } => {
            let pb = show_progress(&format!("Fetching records of {}...", domain));
            let records = RecordAggregator::new(context)
                .fetch_detailed_records(&domain, &endpoint, apex.as_deref())
                .await;
            pb.finish_and_clear();

            formatter.print(&records, || print_records(&records))?;
        }
        Commands::Rdap { domain } => {
            let pb = show_progress(&format!("Looking up registration of {}...", domain));
            let registration = RdapResolver::new(context).query_registration(&domain).await;
            pb.finish_and_clear();

            formatter.print(&registration, || print_registration(&formatter, &registration))?;
        }
        Commands::Inspect { domain } => {
            let pb = show_progress(&format!("Inspecting {}...", domain));
            let result = HierarchyResolver::new(context.clone())
                .resolve_hierarchy(&domain, &endpoint)
                .await;
            let hierarchy = exit_on_error(result, &domain, &formatter);

            let apex = hierarchy.deepest().zone_name.clone();
            let (records, registration) = futures::join!(
                async {
                    RecordAggregator::new(context.clone())
                        .fetch_detailed_records(&domain, &endpoint, Some(apex.as_str()))
                        .await
                },
                async { RdapResolver::new(context.clone()).query_registration(&apex).await }
            );
            pb.finish_and_clear();

            let inspection = Inspection {
                hierarchy,
                records,
                registration,
            };
            formatter.print(&inspection, || {
                print_tree(&inspection.hierarchy);
                println!();
                print_records(&inspection.records);
                println!();
                print_registration(&formatter, &inspection.registration);
            })?;
        }
    }

    Ok(())
}

/// Defaults, then the config file, then flags and environment
fn build_config(cli: &Cli) -> Result<LookupConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => LookupConfig::from_toml_file(path)?,
        None => LookupConfig::default(),
    };

    if let Some(provider) = cli.provider {
        config.endpoint = DohProvider::from(provider).endpoint().to_string();
    }
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(max_queries) = cli.max_queries {
        config.rate_limit.max_queries = max_queries;
    }
    if let Some(window_ms) = cli.window_ms {
        config.rate_limit.window_ms = window_ms;
    }

    Ok(config)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "zonescope=debug" } else { "zonescope=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_on_error<T>(result: Result<T, LookupError>, domain: &str, formatter: &OutputFormatter) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Lookup failed");
            formatter.print_error(&e.user_message(domain));
            process::exit(1);
        }
    }
}

fn print_tree(node: &ZoneNode) {
    let indent = "  ".repeat(node.depth as usize);

    let mut line = format!("{}{}", indent, node.zone_name.bold());
    if node.is_delegated {
        line.push_str(&format!(" {}", "[delegated]".green()));
    }
    if let Some(target) = &node.cname_target {
        line.push_str(&format!(" {} {}", "CNAME".yellow(), target));
    }
    println!("{}", line);

    if !node.nameservers.is_empty() {
        println!("{}  {} {}", indent, "ns".dimmed(), node.nameservers.join(", "));
    }
    for domain in node.domains.iter().skip(1) {
        println!("{}  {} {}", indent, "+".dimmed(), domain);
    }
    for child in &node.children {
        print_tree(child);
    }
}

fn print_records(records: &DetailedRecordSet) {
    let mut table = Table::new();
    table.set_header(vec!["Type", "Name", "TTL", "Data"]);

    let mut add = |label: &str, rows: &[DohRecord]| {
        for record in rows {
            table.add_row(vec![
                label.to_string(),
                record.name.clone(),
                record.ttl.to_string(),
                record.data.clone(),
            ]);
        }
    };

    if let Some(soa) = &records.soa {
        add("SOA", std::slice::from_ref(&soa.record));
    }
    let groups = [
        ("NS", &records.ns),
        ("A", &records.a),
        ("AAAA", &records.aaaa),
        ("CNAME", &records.cname),
        ("MX", &records.mx),
        ("TXT", &records.txt),
    ];
    for (label, rows) in groups.iter() {
        if let Some(rows) = rows {
            add(*label, rows.as_slice());
        }
    }

    println!("{} {} (zone {})", "Records for".bold(), records.domain, records.zone_apex);
    println!("{}", table);

    if let Some(parsed) = records.soa.as_ref().and_then(|soa| soa.parsed.as_ref()) {
        println!(
            "SOA serial {} refresh {} retry {} expire {} minimum {}",
            parsed.serial, parsed.refresh, parsed.retry, parsed.expire, parsed.minimum
        );
    }
}

fn print_registration(formatter: &OutputFormatter, registration: &RegistrationResult) {
    match registration {
        RegistrationResult::Found(info) => {
            let mut table = Table::new();
            table.set_header(vec!["Field", "Value"]);
            let missing = || "-".to_string();
            table.add_row(vec!["Domain".to_string(), info.domain.clone()]);
            table.add_row(vec![
                "Registrar".to_string(),
                info.registrar.clone().unwrap_or_else(missing),
            ]);
            table.add_row(vec![
                "Registered".to_string(),
                info.registered.clone().unwrap_or_else(missing),
            ]);
            table.add_row(vec![
                "Expires".to_string(),
                info.expires.clone().unwrap_or_else(missing),
            ]);
            table.add_row(vec![
                "Last changed".to_string(),
                info.last_changed.clone().unwrap_or_else(missing),
            ]);
            table.add_row(vec!["Status".to_string(), info.status.join(", ")]);
            table.add_row(vec!["Nameservers".to_string(), info.nameservers.join(", ")]);
            table.add_row(vec!["RDAP server".to_string(), info.rdap_server.clone()]);
            println!("{}", table);
        }
        RegistrationResult::Failed { error } => formatter.print_warning(error),
    }
}

/// Output formatter
struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    /// JSON for `--output json`, otherwise the plain renderer
    fn print<T: Serialize, F: FnOnce()>(&self, data: &T, plain: F) -> Result<(), serde_json::Error> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
            OutputFormat::Plain => plain(),
        }
        Ok(())
    }

    fn print_error(&self, message: &str) {
        if self.format == OutputFormat::Json {
            eprintln!("{}", serde_json::json!({ "error": message }));
        } else {
            eprintln!("{} {}", "✗".red().bold(), message);
        }
    }

    fn print_warning(&self, message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }
}

/// Progress indicator on stderr
fn show_progress(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

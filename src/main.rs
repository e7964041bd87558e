//! CLI entry point for `astromail`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::{Local, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use astromail::account::{AccountField, AccountFile};
use astromail::compose::{self, Draft};
use astromail::config::{self, Config};
use astromail::error::Result as MailResult;
use astromail::ingest::source::DirSource;
use astromail::ingest::{poll, Ingest, IngestReport};
use astromail::model::message::Message;
use astromail::outbox::{self, Transport};
use astromail::pager::Pager;
use astromail::store::{self, DiskStore, MailStore};

#[derive(Parser)]
#[command(name = "astromail", version, about = "Receive, store and compose mail for your domain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy new messages from the bucket mirror into the store
    Ingest {
        /// Local mirror of the receiving bucket
        #[arg(short, long)]
        source: Option<PathBuf>,
        /// Key prefix to ingest
        #[arg(long)]
        prefix: Option<String>,
        /// Target folder
        #[arg(short, long)]
        folder: Option<String>,
        /// Wait for the first object to appear before ingesting
        #[arg(long)]
        wait: bool,
        #[arg(long)]
        json: bool,
    },
    /// List one page of a folder
    List {
        #[arg(short, long, default_value = store::INBOX)]
        folder: String,
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        /// Messages per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Show one message
    Show {
        id: String,
        #[arg(short, long, default_value = store::INBOX)]
        folder: String,
        /// Write the attachments into this directory
        #[arg(long, value_name = "DIR")]
        save_attachments: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Compose a message and print it as EML
    Compose {
        #[arg(long)]
        from: String,
        #[arg(short, long, default_value = "")]
        subject: String,
        /// HTML body, sent as both the plain and the HTML alternative
        #[arg(short, long)]
        body: String,
        #[arg(long, required = true)]
        to: Vec<String>,
        #[arg(long)]
        cc: Vec<String>,
        /// Message id; generated when omitted
        #[arg(long)]
        message_id: Option<String>,
        /// Also file the message in the sent folder
        #[arg(long)]
        save: bool,
        /// Write the EML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Inspect or change the account state
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Print the config file location
    Config {
        /// Write the current settings to the config file
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Subcommand)]
enum AccountAction {
    /// Print the account state
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Set one field: domain, bucket, role_arn or status
    Set { field: String, value: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Ingest {
            source,
            prefix,
            folder,
            wait,
            json,
        } => cmd_ingest(&config, source, prefix, folder, wait, json),
        Commands::List {
            folder,
            page,
            page_size,
            json,
        } => cmd_list(&config, &folder, page, page_size, json),
        Commands::Show {
            id,
            folder,
            save_attachments,
            json,
        } => cmd_show(&config, &folder, &id, save_attachments.as_deref(), json),
        Commands::Compose {
            from,
            subject,
            body,
            to,
            cc,
            message_id,
            save,
            output,
        } => {
            let draft = Draft {
                from,
                subject,
                body,
                to,
                cc,
            };
            cmd_compose(&config, &draft, message_id, save, output.as_deref())
        }
        Commands::Account { action } => cmd_account(&config, action),
        Commands::Config { init } => cmd_config(&config, init),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_path = config::log_file_path(config);
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_default();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "astromail.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn open_store(config: &Config) -> anyhow::Result<DiskStore> {
    let root = config::store_dir(config);
    DiskStore::open(&root).with_context(|| format!("cannot open store at {}", root.display()))
}

/// Ingest new objects and print what happened.
fn cmd_ingest(
    config: &Config,
    source: Option<PathBuf>,
    prefix: Option<String>,
    folder: Option<String>,
    wait: bool,
    json: bool,
) -> anyhow::Result<()> {
    let Some(source_dir) = source.or_else(|| config.ingest.source_dir.clone()) else {
        anyhow::bail!("No source directory: pass --source or set ingest.source_dir in the config");
    };
    let prefix = prefix.unwrap_or_else(|| config.ingest.prefix.clone());
    let folder = folder.unwrap_or_else(|| config.ingest.folder.clone());

    let source = DirSource::new(&source_dir);
    let store = open_store(config)?;

    if wait {
        eprintln!("  Waiting for objects under '{prefix}'...");
        poll::wait_for_objects(
            &source,
            &prefix,
            config.ingest.wait_timeout(),
            config.ingest.wait_interval(),
        )?;
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Ingesting [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let report = Ingest::new(&source, &store)
        .folder(folder.as_str())
        .sentinel_id(config.ingest.sentinel_id.as_str())
        .run_with_progress(
            &prefix,
            Some(&|current, total| {
                pb.set_length(total);
                pb.set_position(current);
            }),
        )?;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_ingest_report(&report, &folder, start.elapsed());
    }
    Ok(())
}

fn print_ingest_report(report: &IngestReport, folder: &str, elapsed: std::time::Duration) {
    println!();
    println!("  {:<20} {}", "Objects listed", report.listed);
    println!("  {:<20} {}", "Stored", report.stored);
    println!("  {:<20} {}", "Already stored", report.duplicates);
    println!("  {:<20} {}", "Setup notices", report.sentinels);
    println!("  {:<20} {}", "Failures", report.failures.len());
    println!("  {:<20} {}", "Folder", folder);
    println!("  {:<20} {:.2?}", "Time", elapsed);
    for failure in &report.failures {
        println!("    {:?} {}: {}", failure.stage, failure.key, failure.error);
    }
    println!();
}

/// Print one page of a folder.
fn cmd_list(
    config: &Config,
    folder: &str,
    page: usize,
    page_size: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let page_size = page_size.unwrap_or(config.display.page_size);
    let entries = Pager::new(&store).get_entries(folder, page, page_size)?;

    if json {
        let items: Vec<serde_json::Value> = entries
            .iter()
            .map(|(id, message)| {
                serde_json::json!({
                    "id": id,
                    "from": message.from,
                    "subject": message.subject,
                    "date": message.date,
                    "attachments": message.attachments.len(),
                })
            })
            .collect();
        let output = serde_json::json!({
            "folder": folder,
            "page": page,
            "page_size": page_size,
            "total": store.count(folder)?,
            "messages": items,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} (page {page}, {} of {} message(s))",
        folder,
        entries.len(),
        store.count(folder)?
    );
    println!();
    if entries.is_empty() {
        return Ok(());
    }

    println!("  {:<17} {:<25} {:<40} {}", "Date", "From", "Subject", "Id");
    println!("  {}", "-".repeat(98));
    for (id, message) in &entries {
        let from: String = message.sender().label().chars().take(24).collect();
        let subject: String = message.subject.chars().take(39).collect();
        println!(
            "  {:<17} {:<25} {:<40} {}",
            format_date(message, &config.general.date_format),
            from,
            subject,
            id
        );
        let preview = message.preview(config.display.preview_chars);
        if !preview.is_empty() {
            println!("  {:<17} {}", "", preview);
        }
    }
    println!();
    Ok(())
}

fn format_date(message: &Message, format: &str) -> String {
    match message.parsed_date() {
        Some(date) => date.with_timezone(&Local).format(format).to_string(),
        None => message.date.chars().take(17).collect(),
    }
}

/// Print one message in full.
fn cmd_show(
    config: &Config,
    folder: &str,
    id: &str,
    save_attachments: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let message = Pager::new(&store).get(folder, id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        println!("  {:<9} {}", "From:", message.from);
        println!("  {:<9} {}", "To:", message.to.join(", "));
        println!("  {:<9} {}", "Date:", format_date(&message, &config.general.date_format));
        println!("  {:<9} {}", "Subject:", message.subject);
        for attachment in &message.attachments {
            println!(
                "  {:<9} {} ({}, {} bytes)",
                "Attached:",
                attachment.filename,
                attachment.content_type,
                attachment.size()
            );
        }
        println!();
        if message.text.is_empty() {
            println!("{}", message.html);
        } else {
            println!("{}", message.text);
        }
    }

    if let Some(dir) = save_attachments {
        std::fs::create_dir_all(dir)?;
        for (i, attachment) in message.attachments.iter().enumerate() {
            let name = if attachment.filename.is_empty() {
                format!("attachment-{}", i + 1)
            } else {
                sanitize_filename(&attachment.filename)
            };
            let path = dir.join(name);
            std::fs::write(&path, attachment.decoded()?)
                .with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!("  Saved {}", path.display());
        }
    }
    Ok(())
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Records the message under the id given on the command line without
/// contacting a mail service.
struct OfflineTransport(String);

impl Transport for OfflineTransport {
    fn send(&self, _draft: &Draft) -> MailResult<String> {
        Ok(self.0.clone())
    }
}

/// Compose a draft, optionally filing it in the sent folder.
fn cmd_compose(
    config: &Config,
    draft: &Draft,
    message_id: Option<String>,
    save: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let id = message_id.unwrap_or_else(|| format!("local-{}", Utc::now().format("%Y%m%d%H%M%S%f")));

    let eml = if save {
        let store = open_store(config)?;
        let sent = outbox::send(&OfflineTransport(id.clone()), &store, draft)?;
        eprintln!("  Saved to '{}' as {id}", store::SENT);
        sent.eml
    } else {
        compose::compose(draft, &id)
    };
    match output {
        Some(path) => {
            std::fs::write(path, &eml).with_context(|| format!("cannot write {}", path.display()))?
        }
        None => std::io::Write::write_all(&mut std::io::stdout(), &eml)?,
    }
    Ok(())
}

fn cmd_account(config: &Config, action: AccountAction) -> anyhow::Result<()> {
    let file = AccountFile::new(config::account_path(config));
    match action {
        AccountAction::Show { json } => {
            let state = file.load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
                println!("  {:<10} {}", "Domain", show(&state.domain));
                println!("  {:<10} {}", "Bucket", show(&state.bucket));
                println!("  {:<10} {}", "Role", show(&state.role_arn));
                println!("  {:<10} {}", "Status", state.status);
            }
        }
        AccountAction::Set { field, value } => {
            let parsed: AccountField = field.parse()?;
            let state = file.set(parsed, &value)?;
            println!("  {field} = {}", state.get(parsed).unwrap_or_default());
        }
    }
    Ok(())
}

fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    let path = config::config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    if init {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        config::save_config(config)?;
    }
    println!("{}", path.display());
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "astromail", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

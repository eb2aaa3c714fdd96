//! `fundline` CLI: operator tooling for a Fundline deployment.
//!
//! Verifies a built frontend bundle before it ships and reads the analytics
//! store directly (sessions, leads, dashboard summary). It never talks to a
//! running server.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use fundline_server::artifact::{self, BundleReport};
use fundline_storage::{AnalyticsStore, AnalyticsSummary, Lead, Session, SqliteStore};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

/// Escape codes in use for this run; all empty under `--no-color`.
#[derive(Clone, Copy)]
struct Palette {
    reset: &'static str,
    bold: &'static str,
    dim: &'static str,
    red: &'static str,
    green: &'static str,
    yellow: &'static str,
    cyan: &'static str,
    white: &'static str,
}

impl Palette {
    const COLOR: Self = Self {
        reset: RESET,
        bold: BOLD,
        dim: DIM,
        red: RED,
        green: GREEN,
        yellow: YELLOW,
        cyan: CYAN,
        white: WHITE,
    };

    const PLAIN: Self = Self {
        reset: "",
        bold: "",
        dim: "",
        red: "",
        green: "",
        yellow: "",
        cyan: "",
        white: "",
    };

    const fn new(no_color: bool) -> Self {
        if no_color { Self::PLAIN } else { Self::COLOR }
    }

    fn header(self, icon: &str, title: &str) {
        let Self { bold, cyan, dim, reset, .. } = self;
        println!("{bold}{cyan}{icon} {title}{reset}");
        println!("{dim}─────────────────────────────────────────{reset}");
    }

    fn kv_line(self, key: &str, value: &str) {
        let Self { dim, white, reset, .. } = self;
        println!("  {dim}{key:<20}{reset} {white}{value}{reset}");
    }

    fn success(self, msg: &str) {
        let Self { green, bold, reset, .. } = self;
        println!("{green}{bold}✓{reset} {msg}");
    }

    fn failure(self, msg: &str) {
        let Self { red, bold, reset, .. } = self;
        println!("{red}{bold}✗{reset} {msg}");
    }

    fn warning(self, msg: &str) {
        let Self { yellow, bold, reset, .. } = self;
        println!("{yellow}{bold}⚠{reset} {yellow}{msg}{reset}");
    }
}

// ── CLI structure ────────────────────────────────────────────────────

/// Fundline operator tooling.
#[derive(Parser)]
#[command(
    name = "fundline",
    version,
    about = "Fundline CLI: verify frontend bundles and inspect analytics and leads",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         DATABASE_URL          Analytics store (default: sqlite://analytics.db)\n  \
         FUNDLINE_STATIC_DIR   Frontend bundle directory (default: dist/public)\n\n\
         {DIM}Examples:{RESET}\n  \
         fundline verify --dir dist/public\n  \
         fundline summary --top 5\n  \
         fundline leads --limit 50 --json"
    ),
)]
struct Cli {
    /// Disable colored output (also disabled by a non-empty `NO_COLOR`).
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a built frontend bundle is complete.
    Verify {
        /// Bundle directory.
        #[arg(long, env = "FUNDLINE_STATIC_DIR", default_value = "dist/public")]
        dir: PathBuf,
        /// Minimum size of index.html in bytes.
        #[arg(long, env = "FUNDLINE_MIN_INDEX_BYTES", default_value = "256")]
        min_bytes: u64,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show the analytics summary.
    Summary {
        #[command(flatten)]
        db: DbArgs,
        /// Number of top pages to list.
        #[arg(long, default_value = "10")]
        top: u32,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the most recent leads.
    Leads {
        #[command(flatten)]
        db: DbArgs,
        /// Maximum number of leads.
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the most recent sessions.
    Sessions {
        #[command(flatten)]
        db: DbArgs,
        /// Maximum number of sessions.
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct DbArgs {
    /// SQLite database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://analytics.db")]
    database_url: String,
}

impl DbArgs {
    async fn open(&self) -> Result<SqliteStore> {
        if self.database_url == "memory" {
            bail!("DATABASE_URL=memory has nothing to inspect; point --database-url at a SQLite file");
        }
        SqliteStore::connect(&self.database_url)
            .await
            .with_context(|| format!("failed to open {}", self.database_url))
    }
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let ui = Palette::new(cli.no_color || no_color_env(std::env::var_os("NO_COLOR")));

    match run(ui, cli.command).await {
        Ok(code) => code,
        Err(e) => {
            let Palette { red, bold, reset, .. } = ui;
            eprintln!();
            eprintln!("  {red}{bold}✗ Error:{reset} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

/// <https://no-color.org>: any non-empty value disables color, including `0`.
fn no_color_env(value: Option<std::ffi::OsString>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

async fn run(ui: Palette, cmd: Commands) -> Result<ExitCode> {
    match cmd {
        Commands::Verify {
            dir,
            min_bytes,
            json,
        } => cmd_verify(ui, &dir, min_bytes, json),
        Commands::Summary { db, top, json } => {
            let store = db.open().await?;
            let summary = store.summary(top.max(1)).await?;
            store.close().await;
            if json {
                print_json(&summary)?;
            } else {
                print_summary(ui, &summary);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Leads { db, limit, json } => {
            let store = db.open().await?;
            let leads = store.list_leads(limit).await?;
            store.close().await;
            if json {
                print_json(&leads)?;
            } else {
                print_leads(ui, &leads);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sessions { db, limit, json } => {
            let store = db.open().await?;
            let sessions = store.list_sessions(limit).await?;
            store.close().await;
            if json {
                print_json(&sessions)?;
            } else {
                print_sessions(ui, &sessions);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ── Verify ───────────────────────────────────────────────────────────

fn cmd_verify(ui: Palette, dir: &Path, min_bytes: u64, json: bool) -> Result<ExitCode> {
    let report = artifact::verify_bundle(dir, min_bytes);

    if json {
        print_json(&report)?;
    } else {
        print_report(ui, &report);
    }

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(ui: Palette, report: &BundleReport) {
    println!();
    ui.header("📦", "Frontend Bundle");
    ui.kv_line("Directory", &report.dir.display().to_string());
    println!();

    for check in &report.checks {
        let line = format!("{:<12} {}", check.name, check.detail);
        if check.passed {
            ui.success(&line);
        } else {
            ui.failure(&line);
        }
    }
    println!();

    if report.passed() {
        ui.success("bundle is ready to serve");
    } else {
        let failed = report.failures().count();
        ui.warning(&format!("{failed} check(s) failed; rebuild the frontend"));
    }
    println!();
}

// ── Store views ──────────────────────────────────────────────────────

fn print_summary(ui: Palette, summary: &AnalyticsSummary) {
    println!();
    ui.header("📊", "Analytics Summary");
    ui.kv_line("Sessions", &summary.sessions.to_string());
    ui.kv_line("Closed sessions", &summary.closed_sessions.to_string());
    ui.kv_line(
        "Avg. session",
        &summary
            .avg_session_secs
            .map_or_else(|| "n/a".to_owned(), |avg| format_secs(round_secs(avg))),
    );
    ui.kv_line("Leads", &summary.leads.to_string());
    println!();

    ui.kv_line("Clicks", &summary.events.click.to_string());
    ui.kv_line("Navigations", &summary.events.navigation.to_string());
    ui.kv_line("Performance", &summary.events.performance.to_string());
    ui.kv_line("Total events", &summary.events.total().to_string());

    if !summary.top_pages.is_empty() {
        println!();
        ui.header("🔝", "Top Pages");
        for page in &summary.top_pages {
            ui.kv_line(&page.page_path, &page.events.to_string());
        }
    }
    println!();
}

fn print_leads(ui: Palette, leads: &[Lead]) {
    println!();
    ui.header("📇", &format!("Leads ({})", leads.len()));
    if leads.is_empty() {
        ui.warning("no leads yet");
    }
    let Palette { dim, bold, reset, .. } = ui;
    for lead in leads {
        println!(
            "  {bold}#{:<5}{reset} {} <{}> {dim}{} · {}{reset}",
            lead.id,
            lead.name,
            lead.email,
            lead.funding_amount,
            lead.created_at.format("%Y-%m-%d %H:%M"),
        );
        if let Some(company) = &lead.company {
            println!("         {dim}{company}{reset}");
        }
    }
    println!();
}

fn print_sessions(ui: Palette, sessions: &[Session]) {
    println!();
    ui.header("🧭", &format!("Sessions ({})", sessions.len()));
    if sessions.is_empty() {
        ui.warning("no sessions yet");
    }
    let Palette { dim, green, yellow, reset, .. } = ui;
    for s in sessions {
        let state = match s.duration_secs() {
            Some(secs) => format!("{green}{}{reset}", format_secs(secs)),
            None => format!("{yellow}open{reset}"),
        };
        println!(
            "  {:<24} {dim}{}{reset} {} → {} {state}",
            s.session_id,
            s.start_ts.format("%Y-%m-%d %H:%M"),
            s.entry_page,
            s.exit_page.as_deref().unwrap_or("…"),
        );
    }
    println!();
}

#[allow(clippy::cast_possible_truncation)]
fn round_secs(secs: f64) -> i64 {
    secs.round() as i64
}

fn format_secs(secs: i64) -> String {
    if secs <= 0 {
        return "0s".to_owned();
    }
    let mins = secs / 60;
    let s = secs % 60;
    if mins > 0 {
        format!("{mins}m{s}s")
    } else {
        format!("{s}s")
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_secs_rounds_and_splits_minutes() {
        assert_eq!(format_secs(round_secs(0.2)), "0s");
        assert_eq!(format_secs(round_secs(42.6)), "43s");
        assert_eq!(format_secs(125), "2m5s");
    }

    #[test]
    fn any_non_empty_no_color_disables_color() {
        assert!(no_color_env(Some("1".into())));
        assert!(no_color_env(Some("0".into())));
        assert!(no_color_env(Some("false".into())));
        assert!(!no_color_env(Some(String::new().into())));
        assert!(!no_color_env(None));
    }

    #[test]
    fn plain_palette_has_no_escapes() {
        let p = Palette::new(true);
        assert!(p.red.is_empty() && p.reset.is_empty());
        assert_eq!(Palette::new(false).bold, BOLD);
    }
}

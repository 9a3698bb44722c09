//! # backoffice CLI entry point
//!
//! Parses command-line arguments and dispatches to the library. Every
//! command prints pretty JSON on stdout; logs go to stderr and to the
//! rolling file under the data directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use storefront_backoffice::api::SupabaseClient;
use storefront_backoffice::config::{self, BackofficeConfig};
use storefront_backoffice::db::{self, DbState};
use storefront_backoffice::format::{self, CurrencyFormat};
use storefront_backoffice::orders::OrderFilter;
use storefront_backoffice::remote::memory::MemoryStore;
use storefront_backoffice::remote::RemoteStore;
use storefront_backoffice::reports::{self, DateRange};
use storefront_backoffice::{
    cash_register, diagnostics, inventory, locations, shifts, storage, Error, OrderStatus,
    OrderWorkflow,
};

/// Storefront back-office tools.
///
/// Order status workflow, delivery locations, inventory counts, register
/// closing, employee shifts and financial reports against the hosted
/// storefront backend.
#[derive(Parser, Debug)]
#[command(name = "backoffice", version, about, long_about = None)]
struct Cli {
    /// Run against an in-memory store seeded from this JSON fixture
    /// (`{"table": [rows...]}`) instead of the hosted backend.
    #[arg(long, global = true, value_name = "FILE")]
    fixture: Option<PathBuf>,

    /// tracing filter directive; `RUST_LOG` takes precedence.
    #[arg(long, global = true, env = "BACKOFFICE_LOG")]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Order listing and status transitions.
    Orders {
        #[command(subcommand)]
        cmd: OrdersCmd,
    },
    /// Delivery location hierarchy.
    Locations {
        #[command(subcommand)]
        cmd: LocationsCmd,
    },
    /// Stock count sessions.
    Inventory {
        #[command(subcommand)]
        cmd: InventoryCmd,
    },
    /// Cash register sessions.
    Register {
        #[command(subcommand)]
        cmd: RegisterCmd,
    },
    /// Employee clock-in / clock-out.
    Shifts {
        #[command(subcommand)]
        cmd: ShiftsCmd,
    },
    /// Financial report for an inclusive date range.
    Report {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Stored backend credentials.
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
    /// Version and build information.
    About,
    /// Local database status.
    Health,
}

#[derive(Subcommand, Debug)]
enum OrdersCmd {
    List {
        #[arg(long)]
        status: Option<OrderStatus>,
        /// Earliest `created_at` (RFC 3339 or date).
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    Show {
        id: String,
    },
    /// Statuses the order may move to next.
    Next {
        id: String,
    },
    Transition {
        id: String,
        to: OrderStatus,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum LocationsCmd {
    Tree,
    /// Breadcrumb from the governorate down to a location.
    Path { id: String },
}

#[derive(Subcommand, Debug)]
enum InventoryCmd {
    Start {
        #[arg(long)]
        note: Option<String>,
    },
    Count {
        session: String,
        product: String,
        quantity: i64,
    },
    Summary {
        session: String,
    },
    Approve {
        session: String,
        #[arg(long = "by")]
        approved_by: String,
    },
    Cancel {
        session: String,
    },
}

#[derive(Subcommand, Debug)]
enum RegisterCmd {
    Close { session: String, counted: f64 },
}

#[derive(Subcommand, Debug)]
enum ShiftsCmd {
    In { employee: String },
    Out { employee: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
    /// Save the backend URL and anon key (or a connection string).
    Set {
        #[arg(long)]
        url: Option<String>,
        key: String,
    },
    Clear,
    Show,
}

/// Backend, local database and display settings for one invocation.
struct Context {
    store: Arc<dyn RemoteStore>,
    db: Arc<DbState>,
    currency: CurrencyFormat,
}

impl Context {
    fn open(fixture: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = fixture {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading fixture {}", path.display()))?;
            let doc: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing fixture {}", path.display()))?;
            tracing::debug!(fixture = %path.display(), "using in-memory store");
            return Ok(Self {
                store: Arc::new(MemoryStore::from_fixture(doc)?),
                db: Arc::new(db::init_in_memory()?),
                currency: config::resolve_currency(),
            });
        }

        let cfg = BackofficeConfig::resolve()?;
        tracing::debug!(config = ?cfg, "resolved configuration");
        let state = db::init(&cfg.data_dir)?;
        let remembered = state
            .lock()
            .and_then(|conn| db::set_setting(&conn, "backend", "last_url", &cfg.supabase_url));
        if let Err(e) = remembered {
            tracing::warn!(error = %e, "failed to record backend url");
        }
        Ok(Self {
            store: Arc::new(SupabaseClient::from_config(&cfg)?),
            db: Arc::new(state),
            currency: cfg.currency,
        })
    }

    fn workflow(&self) -> OrderWorkflow {
        OrderWorkflow::new(Arc::clone(&self.store)).with_journal(Arc::clone(&self.db))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_choices(statuses: &[OrderStatus]) -> serde_json::Value {
    statuses
        .iter()
        .map(|s| json!({ "status": s, "label": s.label_ar() }))
        .collect()
}

async fn run_orders(ctx: &Context, cmd: OrdersCmd) -> anyhow::Result<ExitCode> {
    let workflow = ctx.workflow();
    match cmd {
        OrdersCmd::List {
            status,
            from,
            to,
            limit,
        } => {
            let filter = OrderFilter {
                status,
                created_from: from,
                created_to: to,
                limit: Some(limit),
            };
            let orders = workflow.list_orders(&filter).await?;
            print_json(&orders)?;
        }
        OrdersCmd::Show { id } => {
            let order = workflow.fetch_order(&id).await?;
            let history = {
                let conn = ctx.db.lock()?;
                db::transitions_for_order(&conn, &id)?
            };
            print_json(&json!({
                "order": order,
                "total": ctx.currency.format(order.total_amount),
                "updated": order
                    .updated_at
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| format::format_datetime(&dt)),
                "next": status_choices(order.allowed_next()),
                "history": history,
            }))?;
        }
        OrdersCmd::Next { id } => {
            let order = workflow.fetch_order(&id).await?;
            print_json(&json!({
                "id": order.id,
                "status": order.status,
                "next": status_choices(order.allowed_next()),
            }))?;
        }
        OrdersCmd::Transition { id, to, note } => {
            match workflow.transition_by_id(&id, to, note.as_deref()).await {
                Ok((_, receipt)) => print_json(&receipt)?,
                Err(Error::InvalidTransition { from, to }) => {
                    eprintln!(
                        "rejected: order {id} cannot move from {from} ({}) to {to} ({})",
                        from.label_ar(),
                        to.label_ar()
                    );
                    print_json(&json!({
                        "rejected": true,
                        "status": from,
                        "next": status_choices(from.allowed_next()),
                    }))?;
                    return Ok(ExitCode::from(2));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_inventory(ctx: &Context, cmd: InventoryCmd) -> anyhow::Result<()> {
    match cmd {
        InventoryCmd::Start { note } => {
            let session =
                inventory::start_session(&ctx.db, ctx.store.as_ref(), note.as_deref()).await?;
            print_json(&session)
        }
        InventoryCmd::Count {
            session,
            product,
            quantity,
        } => {
            inventory::record_count(&ctx.db, &session, &product, quantity)?;
            let loaded = inventory::load_session(&ctx.db, &session)?;
            print_json(&inventory::summarize(&loaded))
        }
        InventoryCmd::Summary { session } => {
            let loaded = inventory::load_session(&ctx.db, &session)?;
            let summary = inventory::summarize(&loaded);
            print_json(&json!({ "session": loaded, "summary": summary }))
        }
        InventoryCmd::Approve {
            session,
            approved_by,
        } => {
            let summary =
                inventory::approve_session(&ctx.db, ctx.store.as_ref(), &session, &approved_by)
                    .await?;
            print_json(&summary)
        }
        InventoryCmd::Cancel { session } => {
            inventory::cancel_session(&ctx.db, &session)?;
            print_json(&json!({ "session": session, "status": "cancelled" }))
        }
    }
}

fn run_config(cmd: ConfigCmd) -> anyhow::Result<()> {
    match cmd {
        ConfigCmd::Set { url, key } => {
            storage::save_credentials(url.as_deref(), &key)?;
            print_json(&storage::describe_credentials())
        }
        ConfigCmd::Clear => {
            storage::clear_credentials()?;
            print_json(&json!({ "cleared": true }))
        }
        ConfigCmd::Show => print_json(&json!({
            "stored": storage::describe_credentials(),
            "dataDir": config::resolve_data_dir().display().to_string(),
            "currency": config::resolve_currency().code,
        })),
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let fixture = cli.fixture.as_deref();
    match cli.command {
        Command::Config { cmd } => run_config(cmd)?,
        Command::About => print_json(&diagnostics::about())?,
        Command::Health => {
            let state = match fixture {
                Some(_) => db::init_in_memory()?,
                None => db::init(&config::resolve_data_dir())?,
            };
            print_json(&diagnostics::health(&state)?)?;
        }
        Command::Orders { cmd } => {
            let ctx = Context::open(fixture)?;
            return run_orders(&ctx, cmd).await;
        }
        Command::Locations { cmd } => {
            let ctx = Context::open(fixture)?;
            let tree = locations::load_location_tree(ctx.store.as_ref()).await?;
            match cmd {
                LocationsCmd::Tree => print_json(&tree)?,
                LocationsCmd::Path { id } => {
                    let path = locations::find_path(&tree, &id)
                        .ok_or_else(|| Error::NotFound(format!("location {id}")))?;
                    print_json(&json!({
                        "breadcrumb": locations::breadcrumb(&path),
                        "ids": path.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
                    }))?;
                }
            }
        }
        Command::Inventory { cmd } => {
            let ctx = Context::open(fixture)?;
            run_inventory(&ctx, cmd).await?;
        }
        Command::Register {
            cmd: RegisterCmd::Close { session, counted },
        } => {
            let ctx = Context::open(fixture)?;
            let result = cash_register::close_register(ctx.store.as_ref(), &session, counted).await?;
            print_json(&json!({
                "reconciliation": result,
                "expected": ctx.currency.format(result.expected),
                "variance": ctx.currency.format(result.variance),
            }))?;
        }
        Command::Shifts { cmd } => {
            let ctx = Context::open(fixture)?;
            let shift = match cmd {
                ShiftsCmd::In { employee } => shifts::clock_in(ctx.store.as_ref(), &employee).await?,
                ShiftsCmd::Out { employee } => {
                    shifts::clock_out(ctx.store.as_ref(), &employee).await?
                }
            };
            print_json(&shift)?;
        }
        Command::Report { from, to } => {
            let ctx = Context::open(fixture)?;
            let report = reports::fetch_report(ctx.store.as_ref(), DateRange::new(from, to)?).await?;
            let money = |v: f64| ctx.currency.format(v);
            print_json(&json!({
                "report": report,
                "display": {
                    "period": format!("{} - {}", format::format_date(from), format::format_date(to)),
                    "grossSales": money(report.gross_sales),
                    "expenses": money(report.expenses_total),
                    "salaries": money(report.salaries_total),
                    "netProfit": money(report.net_profit),
                },
            }))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match diagnostics::init_logging(
        &config::resolve_data_dir(),
        cli.log_filter.as_deref(),
    ) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging disabled: {e}");
            None
        }
    };
    tracing::debug!("backoffice v{} starting", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parse_transition_with_note() {
        let cli = Cli::try_parse_from([
            "backoffice",
            "orders",
            "transition",
            "o-1",
            "confirmed",
            "--note",
            "called customer",
        ])
        .unwrap();
        match cli.command {
            Command::Orders {
                cmd: OrdersCmd::Transition { id, to, note },
            } => {
                assert_eq!(id, "o-1");
                assert_eq!(to, OrderStatus::Confirmed);
                assert_eq!(note.as_deref(), Some("called customer"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["backoffice", "orders", "transition", "o-1", "lost"]).is_err());
    }

    #[test]
    fn cli_parse_report_range_and_global_fixture() {
        let cli = Cli::try_parse_from([
            "backoffice",
            "report",
            "--from",
            "2026-10-01",
            "--to",
            "2026-10-31",
            "--fixture",
            "demo.json",
        ])
        .unwrap();
        assert_eq!(cli.fixture, Some(PathBuf::from("demo.json")));
        assert!(matches!(cli.command, Command::Report { .. }));
    }

    #[tokio::test]
    async fn fixture_context_drives_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        std::fs::write(
            &path,
            r#"{"orders":[{"id":"o-1","status":"pending","total_amount":120}]}"#,
        )
        .unwrap();

        let ctx = Context::open(Some(path.as_path())).unwrap();
        let (order, _) = ctx
            .workflow()
            .transition_by_id("o-1", OrderStatus::Confirmed, None)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);

        let conn = ctx.db.lock().unwrap();
        assert_eq!(db::transitions_for_order(&conn, "o-1").unwrap().len(), 1);
    }
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};

use crate::application::{
    BalanceRequest, DepositRequest, LedgerService, OrderRequest, RevenueReportRequest, Validate,
};
use crate::config::LedgerConfig;
use crate::domain::{format_cents, ReservationStatus, RevenuePeriod};
use crate::io::ReportWriter;

/// Balance Ledger - user balances, order reservations and monthly revenue
#[derive(Parser)]
#[command(name = "balance-ledger")]
#[command(about = "A transactional balance ledger with order reservations and revenue reports")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "BALANCE_DATABASE", default_value = "balance.db")]
    pub database: PathBuf,

    /// Directory monthly reports are written to
    #[arg(long, env = "BALANCE_REPORTS_DIR", default_value = "month_reports")]
    pub reports_dir: PathBuf,

    /// URL prefix returned in report links
    #[arg(
        long,
        env = "BALANCE_REPORT_LINK_PREFIX",
        default_value = "/api/v1/balance/month_reports"
    )]
    pub report_link_prefix: String,

    /// Maximum pooled database connections
    #[arg(long, env = "BALANCE_MAX_CONNECTIONS", default_value = "8")]
    pub max_connections: u32,

    /// How long to wait for the database write lock, in milliseconds
    #[arg(long, env = "BALANCE_BUSY_TIMEOUT_MS", default_value = "5000")]
    pub busy_timeout_ms: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Show a user's balance
    Balance {
        /// User id
        user: i64,
    },

    /// Add funds to a user's balance (creates the account on first deposit)
    Deposit {
        /// User id
        user: i64,

        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,
    },

    /// Hold funds against an order
    Reserve(OrderArgs),

    /// Recognize a held reservation as revenue
    Approve(OrderArgs),

    /// Cancel a held reservation and return the funds
    Disapprove(OrderArgs),

    /// Monthly revenue per service
    Report {
        /// Month (1-12, defaults to the current month)
        #[arg(long)]
        month: Option<i64>,

        /// Year (defaults to the current year)
        #[arg(long)]
        year: Option<i64>,

        /// Output format: csv writes the report file and prints its link
        #[arg(long, value_enum, default_value_t = ReportFormat::Csv)]
        format: ReportFormat,
    },

    /// Service catalogue commands
    #[command(subcommand)]
    Service(ServiceCommands),

    /// List a user's reservations
    Reservations {
        /// User id
        user: i64,

        /// Filter by status: held, approved, disapproved
        #[arg(long)]
        status: Option<String>,
    },

    /// Show a user's ledger history, newest first
    History {
        /// User id
        user: i64,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Verify ledger integrity
    Check,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Csv,
    Table,
    Json,
}

#[derive(clap::Args)]
pub struct OrderArgs {
    /// User id
    #[arg(long)]
    user: i64,

    /// Service id
    #[arg(long)]
    service: i64,

    /// Order id
    #[arg(long)]
    order: i64,

    /// Order price (e.g., "300" or "299.99")
    #[arg(long)]
    price: String,
}

impl OrderArgs {
    fn request(&self) -> OrderRequest {
        OrderRequest {
            user_id: Some(self.user),
            service_id: Some(self.service),
            order_id: Some(self.order),
            price: Some(self.price.as_str().into()),
        }
    }
}

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Register a service name (or rename an existing one)
    Add {
        /// Service id
        id: i64,

        /// Display name used in reports
        name: String,
    },

    /// List registered services
    List,
}

impl Cli {
    pub fn config(&self) -> LedgerConfig {
        LedgerConfig {
            database_path: self.database.clone(),
            reports_dir: self.reports_dir.clone(),
            report_link_prefix: self.report_link_prefix.clone(),
            max_connections: self.max_connections,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();

        let command = match self.command {
            Commands::Init => {
                let service = LedgerService::init(&config).await?;
                service.close().await;
                println!("Database initialized: {}", config.database_path.display());
                return Ok(());
            }
            command => command,
        };

        let service = LedgerService::connect(&config).await.with_context(|| {
            format!(
                "Cannot open {} (run `balance-ledger init` first)",
                config.database_path.display()
            )
        })?;

        let result = run_command(&service, &config, command).await;
        service.close().await;
        result
    }
}

async fn run_command(service: &LedgerService, config: &LedgerConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {}

        Commands::Balance { user } => {
            let account_id = BalanceRequest { user_id: Some(user) }.validate()?;
            let account = service.get_balance(account_id).await?;
            println!("{}: {}", account.id, format_cents(account.balance));
        }

        Commands::Deposit { user, amount } => {
            let deposit = DepositRequest {
                user_id: Some(user),
                amount: Some(amount.as_str().into()),
            }
            .validate()?;
            let account = service.deposit(deposit.account_id, deposit.amount).await?;
            println!(
                "Deposited {} to {}: balance {}",
                format_cents(deposit.amount),
                account.id,
                format_cents(account.balance)
            );
        }

        Commands::Reserve(args) => {
            let order = args.request().validate()?;
            let account = service.reserve(order.key, order.amount).await?;
            println!(
                "Reserved {} for {}: balance {}",
                format_cents(order.amount),
                order.key,
                format_cents(account.balance)
            );
        }

        Commands::Approve(args) => {
            let order = args.request().validate()?;
            let reservation = service.approve(order.key, order.amount).await?;
            println!(
                "Approved {} for {}",
                format_cents(reservation.amount),
                reservation.key
            );
        }

        Commands::Disapprove(args) => {
            let order = args.request().validate()?;
            let reservation = service.disapprove(order.key, order.amount).await?;
            let account = service.get_balance(order.key.account_id).await?;
            println!(
                "Disapproved {} for {}: balance {}",
                format_cents(reservation.amount),
                reservation.key,
                format_cents(account.balance)
            );
        }

        Commands::Report {
            month,
            year,
            format,
        } => {
            let current = RevenuePeriod::containing(Utc::now());
            let period = RevenueReportRequest {
                month: Some(month.unwrap_or(i64::from(current.month))),
                year: Some(year.unwrap_or(i64::from(current.year))),
            }
            .validate()?;
            let report = service.monthly_revenue_report(period).await?;

            match format {
                ReportFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                ReportFormat::Table => {
                    println!("Revenue Report {}", report.period);
                    println!();
                    println!("{:<30} {:>14}", "SERVICE", "AMOUNT");
                    println!("{}", "-".repeat(45));
                    for record in &report.services {
                        println!(
                            "{:<30} {:>14}",
                            truncate(&record.service_name, 30),
                            format_cents(record.total_amount)
                        );
                    }
                    println!("{}", "-".repeat(45));
                    println!("{:<30} {:>14}", "TOTAL", format_cents(report.total));
                }
                ReportFormat::Csv => {
                    let link = ReportWriter::from_config(config).write(period, &report.services)?;
                    println!("{}", link.link);
                }
            }
        }

        Commands::Service(ServiceCommands::Add { id, name }) => {
            let registered = service.register_service(id, &name).await?;
            println!("Registered service {}: {}", registered.id, registered.name);
        }

        Commands::Service(ServiceCommands::List) => {
            let services = service.list_services().await?;
            if services.is_empty() {
                println!("No services registered.");
            } else {
                println!("{:>8}  {:<30}", "ID", "NAME");
                println!("{}", "-".repeat(40));
                for s in services {
                    println!("{:>8}  {:<30}", s.id, truncate(&s.name, 30));
                }
            }
        }

        Commands::Reservations { user, status } => {
            let account_id = BalanceRequest { user_id: Some(user) }.validate()?;
            let status = status
                .map(|s| {
                    ReservationStatus::from_str(&s).with_context(|| {
                        format!("Invalid status '{}'. Use held, approved or disapproved", s)
                    })
                })
                .transpose()?;

            let reservations = service.list_reservations(account_id, status).await?;
            if reservations.is_empty() {
                println!("No reservations found.");
            } else {
                println!(
                    "{:<12} {:>8} {:>10} {:>12} {:<12} SETTLED",
                    "CREATED", "SERVICE", "ORDER", "AMOUNT", "STATUS"
                );
                println!("{}", "-".repeat(70));
                for r in reservations {
                    println!(
                        "{:<12} {:>8} {:>10} {:>12} {:<12} {}",
                        r.created_at.format("%Y-%m-%d"),
                        r.key.service_id,
                        r.key.order_id,
                        format_cents(r.amount),
                        r.status.as_str(),
                        r.settled_at
                            .map(|at| at.format("%Y-%m-%d").to_string())
                            .unwrap_or_default()
                    );
                }
            }
        }

        Commands::History { user, limit } => {
            let account_id = BalanceRequest { user_id: Some(user) }.validate()?;
            let entries = service.list_entries(account_id, limit).await?;
            if entries.is_empty() {
                println!("No ledger entries found.");
            } else {
                println!(
                    "{:>6} {:<20} {:<8} {:>12} {:>12} ORDER",
                    "SEQ", "TIME", "KIND", "AMOUNT", "BALANCE"
                );
                println!("{}", "-".repeat(72));
                for entry in entries {
                    let order = match (entry.service_id, entry.order_id) {
                        (Some(service_id), Some(order_id)) => format!("{}/{}", service_id, order_id),
                        _ => String::new(),
                    };
                    println!(
                        "{:>6} {:<20} {:<8} {:>12} {:>12} {}",
                        entry.sequence,
                        entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.kind.as_str(),
                        format_cents(entry.amount),
                        format_cents(entry.balance_after),
                        order
                    );
                }
            }
        }

        Commands::Check => run_check_command(service).await?,
    }

    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Accounts:      {}", report.account_count);
    println!("Reservations:  {}", report.reservation_count);
    println!("Entries:       {}", report.entry_count);
    println!();
    println!("  {:<12} {:>14}", "Balances:", format_cents(report.total_balance));
    println!("  {:<12} {:>14}", "Held:", format_cents(report.total_held));
    println!("  {:<12} {:>14}", "Approved:", format_cents(report.total_approved));
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("delivery", 20), "delivery");
        assert_eq!(truncate("a very long service name", 10), "a very ...");
    }

    #[test]
    fn test_parses_order_command() {
        let cli = Cli::try_parse_from([
            "balance-ledger",
            "--database",
            "/tmp/ledger.db",
            "reserve",
            "--user",
            "1",
            "--service",
            "5",
            "--order",
            "42",
            "--price",
            "300",
        ])
        .unwrap();

        assert_eq!(cli.config().database_path, PathBuf::from("/tmp/ledger.db"));
        match cli.command {
            Commands::Reserve(args) => {
                let order = args.request().validate().unwrap();
                assert_eq!(order.amount, 30000);
                assert_eq!(order.key.order_id, 42);
            }
            _ => panic!("expected reserve"),
        }
    }

    #[test]
    fn test_report_format_is_checked() {
        let cli = Cli::try_parse_from(["balance-ledger", "report", "--format", "table"]).unwrap();
        match cli.command {
            Commands::Report { format, month, .. } => {
                assert_eq!(format, ReportFormat::Table);
                assert_eq!(month, None);
            }
            _ => panic!("expected report"),
        }

        let default = Cli::try_parse_from(["balance-ledger", "report"]).unwrap();
        assert!(matches!(
            default.command,
            Commands::Report {
                format: ReportFormat::Csv,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["balance-ledger", "report", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_busy_timeout_flag() {
        let cli = Cli::try_parse_from(["balance-ledger", "--busy-timeout-ms", "250", "check"]).unwrap();
        assert_eq!(cli.config().busy_timeout, Duration::from_millis(250));
    }
}

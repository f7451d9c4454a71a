//! `stockbot` command-line front-end.
//!
//! Opens the configured database, seeds it on first use and runs one
//! controller command per invocation.

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use stockbot_core::model::order::OrderLine;
use stockbot_core::robot::link::frame_program;
use stockbot_core::robot::script::{item_sorter, SortClass};
use stockbot_core::{
    init_logging, open_db, AccountService, AppConfig, AppController, CommandResponse, LogTarget,
    RobotLink, SqliteAccountRepository, SqliteInventoryStore, TcpRobotLink, ViewState,
};

#[derive(Parser)]
#[command(name = "stockbot", about = "Inventory queue and robot dispatch console", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[arg(long, global = true, help = "Robot controller host (overrides STOCKBOT_ROBOT_HOST)")]
    robot_host: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a generated sorter program without sending it.
    Script(ScriptArgs),
    #[command(flatten)]
    Console(ConsoleCommands),
}

/// Commands that run against the database and the robot.
#[derive(Subcommand)]
enum ConsoleCommands {
    /// Show queued and processed orders, stock and revenue.
    Status,
    /// Fulfill the earliest queued order.
    ProcessNext,
    /// Send the wave program to the robot.
    Ping,
    /// Check the database connection.
    CheckDb,
    /// Replace all data with the seed set.
    Reset,
    /// Create the demo accounts when none exist.
    SeedAccounts,
    /// Queue a new order.
    Submit(SubmitArgs),
    /// Create an account as an admin.
    CreateUser(CreateUserArgs),
    /// Send a raw dashboard directive (e.g. `play`, `stop`, `brake release`).
    Dashboard { command: String },
}

#[derive(Args)]
struct SubmitArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    password: String,
    /// Order lines as `ITEM=QTY`, e.g. `"White Shell=2"`.
    #[arg(required = true, value_parser = parse_line)]
    lines: Vec<OrderLine>,
}

#[derive(Args)]
struct CreateUserArgs {
    #[arg(long)]
    admin_user: String,
    #[arg(long)]
    admin_password: String,
    username: String,
    password: String,
    #[arg(long, action = ArgAction::SetTrue)]
    admin: bool,
}

#[derive(Args)]
struct ScriptArgs {
    /// `white`, `black` or `mixed`; unknown tags use the default class.
    class: String,
    #[arg(long, default_value_t = 1)]
    count: u32,
    /// Use the physical gripper driver instead of the simulator stub.
    #[arg(long, action = ArgAction::SetTrue)]
    real: bool,
    /// Wrap the body as the framed procedure sent to the controller.
    #[arg(long, action = ArgAction::SetTrue)]
    framed: bool,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    robot: String,
    view: &'a ViewState,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;
    init_logging(&config.log_level, LogTarget::from_option(config.log_dir.as_deref()))
        .context("failed to initialize logging")?;

    let command = match cli.command {
        Commands::Script(args) => return print_script(&args),
        Commands::Console(command) => command,
    };

    let conn = open_db(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    let accounts = AccountService::new(SqliteAccountRepository::new(&conn));
    let controller = AppController::new(
        SqliteInventoryStore::new(&conn),
        TcpRobotLink::new(),
        config.endpoint(),
        config.fulfillment_options(),
    );
    let loaded = controller.load();
    if !loaded.ok {
        bail!(loaded.message);
    }
    if let Some(host) = &cli.robot_host {
        let changed = controller.set_robot_host(host);
        if !changed.ok {
            bail!(changed.message);
        }
    }

    let response = match command {
        ConsoleCommands::Status => {
            let view = controller.view();
            let output = StatusOutput {
                robot: controller.endpoint().script_address(),
                view: &view,
            };
            if cli.json {
                print_json(&output)?;
            } else {
                print_status(&output);
            }
            return Ok(());
        }
        ConsoleCommands::ProcessNext => controller.process_next(),
        ConsoleCommands::Ping => controller.ping_robot(),
        ConsoleCommands::CheckDb => controller.check_db(),
        ConsoleCommands::Reset => controller.reset_db(),
        ConsoleCommands::SeedAccounts => {
            let added = accounts.seed_demo_accounts()?;
            CommandResponse::success(format!("{added} demo account(s) created"))
        }
        ConsoleCommands::Submit(args) => {
            let session = accounts.login(&args.user, &args.password)?;
            controller.submit_order(&session, &args.lines)
        }
        ConsoleCommands::CreateUser(args) => {
            let session = accounts.login(&args.admin_user, &args.admin_password)?;
            accounts.create_account_as(&session, &args.username, &args.password, args.admin)?;
            CommandResponse::success(format!("User {} created", args.username.trim()))
        }
        ConsoleCommands::Dashboard { command } => {
            match TcpRobotLink::new().send_command(&controller.endpoint(), &command) {
                Ok(()) => CommandResponse::success(format!("Sent `{}`", command.trim())),
                Err(err) => CommandResponse::failure(format!("Robot error: {err}")),
            }
        }
    };

    report(&response, cli.json)
}

fn print_script(args: &ScriptArgs) -> Result<()> {
    let class = SortClass::from_tag_or_default(&args.class);
    let body = item_sorter(class, args.count, !args.real);
    if args.framed {
        print!("{}", frame_program(&body, 0));
    } else {
        println!("{body}");
    }
    Ok(())
}

fn report(response: &CommandResponse, json: bool) -> Result<()> {
    if json {
        print_json(response)?;
    } else {
        println!("{}", response.message);
    }
    if response.ok {
        Ok(())
    } else {
        Err(anyhow!(response.message.clone()))
    }
}

fn print_status(output: &StatusOutput<'_>) {
    let view = output.view;
    println!("Robot: {}", output.robot);
    println!("Queued orders: {}", view.queued_count());
    for order in &view.book.queued {
        println!("  #{} {}", order.id, describe_lines(&order.lines));
    }
    println!("Processed orders: {}", view.processed_count());
    for order in &view.book.processed {
        println!("  #{} {}", order.id, describe_lines(&order.lines));
    }
    println!("Stock:");
    for item in view.inventory.items() {
        println!("  {:<16} qty={} location={}", item.id, item.quantity, item.location);
    }
    println!("Total revenue: {}", view.total_revenue);
}

fn describe_lines(lines: &[OrderLine]) -> String {
    lines
        .iter()
        .map(|line| format!("{} x{}", line.item_id, line.quantity))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_line(raw: &str) -> std::result::Result<OrderLine, String> {
    let (item, quantity) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected ITEM=QTY, got `{raw}`"))?;
    let item = item.trim();
    if item.is_empty() {
        return Err(format!("missing item name in `{raw}`"));
    }
    let quantity = Decimal::from_str(quantity.trim())
        .map_err(|err| format!("invalid quantity in `{raw}`: {err}"))?;
    Ok(OrderLine::new(item, quantity))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

//! waitline CLI — operator interface to the queue engine.

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::sync::Arc;
use waitline_rs::config::Config;
use waitline_rs::db::Db;
use waitline_rs::dispatch::{DispatchConfig, Dispatcher, LogDeliverer};
use waitline_rs::error::Error;
use waitline_rs::model::{Action, Channel, NewTicket, Status, Ticket};
use waitline_rs::queue::Queue;
use waitline_rs::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "waitline", about = "Walk-in/remote service queue engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the notification dispatcher daemon
    Serve {
        /// Poll interval in seconds (fallback when NOTIFY is missed)
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,
    },
    /// Ticket operations
    Ticket {
        #[command(subcommand)]
        action: TicketAction,
    },
    /// Show the board, grouped by status
    Board {
        /// Admin passcode
        #[arg(long)]
        passcode: String,
        /// Emit the board as JSON (for kiosk displays)
        #[arg(long)]
        json: bool,
    },
    /// Admin operations
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum TicketAction {
    /// Join the queue
    Join {
        /// Channel of origin (sms, whatsapp, kiosk)
        #[arg(long, default_value = "kiosk")]
        channel: String,
        /// Requester identity (phone-like string)
        #[arg(long)]
        identity: Option<String>,
        /// Free-text note
        #[arg(long)]
        note: Option<String>,
    },
    /// Show an identity's active ticket
    Status { identity: String },
    /// Cancel an identity's active ticket
    Leave { identity: String },
    /// Show a ticket and its audit trail
    Show { code: String },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Apply an action to a ticket (promote, in_room, done, no_show, urgent, cancel)
    Transition {
        code: String,
        action: String,
        #[arg(long)]
        passcode: String,
    },
    /// Replace the admin passcode
    SetPass {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Update operational settings
    Settings {
        #[arg(long)]
        passcode: String,
        #[arg(long)]
        avg_service_minutes: f64,
        #[arg(long)]
        open: bool,
        #[arg(long)]
        display_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { poll_interval } => cmd_serve(poll_interval).await,
        command => {
            let config = Config::from_env()?;
            let db = Db::connect(config.database_url.expose_secret()).await?;
            db.migrate().await?;
            if let Some(ref pass) = config.admin_pass {
                db.set_passcode(pass.expose_secret()).await?;
            }
            let queue = Queue::new(Arc::new(db));

            match command {
                Command::Serve { .. } => unreachable!(),
                Command::Ticket { action } => cmd_ticket(&queue, action).await,
                Command::Board { passcode, json } => cmd_board(&queue, &passcode, json).await,
                Command::Admin { action } => cmd_admin(&queue, action).await,
            }
        }
    }
}

async fn cmd_serve(poll_interval: u64) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "waitline".to_string(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    if let Some(ref pass) = config.admin_pass {
        db.set_passcode(pass.expose_secret()).await?;
    }

    let dispatcher = Dispatcher::new(
        Arc::new(db),
        Arc::new(LogDeliverer),
        DispatchConfig {
            poll_interval: std::time::Duration::from_secs(poll_interval),
            ..DispatchConfig::default()
        },
    );

    let shutdown = dispatcher.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown.notify_one();
    });

    dispatcher.run().await?;
    Ok(())
}

async fn cmd_ticket(queue: &Queue, action: TicketAction) -> anyhow::Result<()> {
    match action {
        TicketAction::Join {
            channel,
            identity,
            note,
        } => {
            let channel: Channel = channel.parse()?;
            let mut new = NewTicket::new(channel);
            if let Some(identity) = identity {
                new = new.identity(identity);
            }
            if let Some(note) = note {
                new = new.note(note);
            }

            match queue.join(new).await {
                Ok(ticket) => print_receipt(&ticket),
                Err(e) => reply_or_bail(e)?,
            }
        }
        TicketAction::Status { identity } => match queue.status(&identity).await {
            Ok(ticket) => print_receipt(&ticket),
            Err(e) => reply_or_bail(e)?,
        },
        TicketAction::Leave { identity } => match queue.leave(&identity).await {
            Ok(ticket) => println!("Ticket {} canceled. Thank you.", ticket.code),
            Err(e) => reply_or_bail(e)?,
        },
        TicketAction::Show { code } => {
            let ticket = queue
                .lookup(&code)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no ticket with code {code}"))?;

            println!("Code:      {}", ticket.code);
            println!("Status:    {}", ticket.status);
            println!("Channel:   {}", ticket.channel);
            println!("Identity:  {}", ticket.identity.as_deref().unwrap_or("-"));
            println!("Note:      {}", ticket.note.as_deref().unwrap_or("-"));
            println!(
                "Position:  {}",
                ticket
                    .position
                    .map(|p| p.to_string())
                    .unwrap_or("-".to_string())
            );
            println!(
                "ETA:       {}",
                ticket
                    .eta_minutes
                    .map(|m| format!("{m} min"))
                    .unwrap_or("-".to_string())
            );
            println!("Created:   {}", ticket.created_at);
            println!("Updated:   {}", ticket.updated_at);

            let events = queue.events(&ticket).await?;
            if !events.is_empty() {
                println!("---");
                for event in events {
                    println!("{}  {}", event.at.format("%Y-%m-%d %H:%M:%S"), event.kind);
                }
            }
        }
    }
    Ok(())
}

async fn cmd_board(queue: &Queue, passcode: &str, json: bool) -> anyhow::Result<()> {
    let board = queue.admin_board(passcode).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&board)?);
        return Ok(());
    }

    println!("{} — {}", board.display_name, if board.open { "open" } else { "closed" });
    println!("{}", "-".repeat(60));

    for status in [
        Status::Urgent,
        Status::Waiting,
        Status::Next,
        Status::InRoom,
        Status::Done,
        Status::NoShow,
        Status::Canceled,
    ] {
        let Some(entries) = board.tickets.get(&status) else {
            continue;
        };
        println!("{status} ({}):", entries.len());
        for entry in entries {
            let position = entry
                .position
                .map(|p| format!("#{p}"))
                .unwrap_or("-".to_string());
            let eta = entry
                .eta_minutes
                .map(|m| format!("{m} min"))
                .unwrap_or("-".to_string());
            println!(
                "  {:<6}  {:<4}  {:<8}  {}",
                entry.code,
                position,
                eta,
                entry.note.as_deref().unwrap_or("")
            );
        }
    }

    println!("\n{} active ticket(s)", board.active_count());
    Ok(())
}

async fn cmd_admin(queue: &Queue, action: AdminAction) -> anyhow::Result<()> {
    match action {
        AdminAction::Transition {
            code,
            action,
            passcode,
        } => {
            let action: Action = action.parse()?;
            let board = queue.admin_transition(&code, action, &passcode).await?;
            println!(
                "Applied {action} to {code}. {} active ticket(s) remaining.",
                board.active_count()
            );
        }
        AdminAction::SetPass { current, new } => {
            queue.set_passcode(&current, &new).await?;
            println!("Passcode updated.");
        }
        AdminAction::Settings {
            passcode,
            avg_service_minutes,
            open,
            display_name,
        } => {
            queue
                .update_settings(&passcode, avg_service_minutes, open, &display_name)
                .await?;
            println!("Settings updated.");
        }
    }
    Ok(())
}

fn print_receipt(ticket: &Ticket) {
    let position = ticket
        .position
        .map(|p| format!("#{p}"))
        .unwrap_or("-".to_string());
    let eta = ticket
        .eta_minutes
        .map(|m| format!("{m} min"))
        .unwrap_or("-".to_string());
    println!(
        "Ticket {}. Position {position}. ETA {eta}. Status {}.",
        ticket.code, ticket.status
    );
}

/// Print the short messaging-channel reply for recoverable errors; bail on
/// anything operational.
fn reply_or_bail(e: Error) -> anyhow::Result<()> {
    match e {
        Error::Database(_) | Error::Config(_) | Error::Other(_) => Err(e.into()),
        other => {
            println!("{}", other.user_reply());
            Ok(())
        }
    }
}

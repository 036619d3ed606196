// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use client::{ApiError, OfflineQueue, TaskApi};
use common::{CreateTaskPayload, Priority, Task, TaskAction, split_tags};

/// Command-line client for the task server, usable offline.
#[derive(Parser, Debug)]
#[command(name = "taskctl", version)]
struct Cli {
    /// Base URL of the task server.
    #[arg(long, env = "TASKCTL_SERVER", default_value = "http://localhost:3000")]
    server: String,

    /// File holding mutations made while offline.
    #[arg(long, env = "TASKCTL_QUEUE", default_value = "database/offline_queue.json")]
    queue: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tasks.
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Create a task.
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated tags.
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Flip a task between open and completed.
    Toggle { id: i64 },
    /// Delete a task.
    Delete { id: i64 },
    /// Show mutations waiting for the server.
    Pending,
    /// Replay queued mutations against the server.
    Sync {
        /// Send the whole queue in a single request.
        #[arg(long)]
        batch: bool,
    },
    /// Show stats over all tasks.
    Stats,
    /// Show tasks and recurring events between two dates.
    Calendar {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let api = TaskApi::new(cli.server.clone());
    let mut queue = OfflineQueue::load(&cli.queue)?;

    match cli.command {
        Command::List { category } => {
            for task in api.list_tasks(category.as_deref()).await? {
                print_task(&task);
            }
        }
        Command::Add {
            title,
            description,
            category,
            tags,
            due,
            priority,
        } => {
            let payload = CreateTaskPayload {
                title,
                description,
                category,
                tags: tags.as_deref().map(split_tags).unwrap_or_default(),
                due_date: due,
                priority,
            };
            match api.create_task(&payload).await {
                Ok(task) => print_task(&task),
                Err(err) => queue_if_offline(&mut queue, err, TaskAction::Create { payload })?,
            }
        }
        Command::Toggle { id } => match api.toggle_task(id).await {
            Ok(task) => print_task(&task),
            Err(err) => queue_if_offline(&mut queue, err, TaskAction::Toggle { id })?,
        },
        Command::Delete { id } => match api.delete_task(id).await {
            Ok(()) => println!("Deleted task {id}."),
            Err(err) => queue_if_offline(&mut queue, err, TaskAction::Delete { id })?,
        },
        Command::Pending => {
            if queue.is_empty() {
                println!("Nothing queued.");
            }
            for pending in queue.pending() {
                println!(
                    "#{:<4} {:<7} queued {}",
                    pending.seq,
                    pending.action.name(),
                    pending.queued_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Sync { batch } => {
            if queue.is_empty() {
                println!("Nothing to sync.");
                return Ok(());
            }
            let report = if batch {
                queue.sync_batch(&api).await?
            } else {
                queue.sync(&api).await?
            };
            println!("Synced {} action(s).", report.synced);
            for failed in &report.failed {
                println!("  #{} {} failed: {}", failed.seq, failed.action, failed.error);
            }
            if !report.is_clean() {
                println!(
                    "{} action(s) remain in {}.",
                    queue.len(),
                    queue.path().display()
                );
            }
        }
        Command::Stats => {
            let stats = api.stats().await?;
            println!(
                "{} tasks, {} completed, {} pending, {} overdue ({:.0}% done)",
                stats.total,
                stats.completed,
                stats.pending,
                stats.overdue,
                stats.completion_rate * 100.0
            );
        }
        Command::Calendar { start, end } => {
            if end < start {
                bail!("--end must not be before --start");
            }
            let view = api.calendar(start, end).await?;
            for task in &view.tasks {
                print_task(task);
            }
            for instance in &view.instances {
                println!(
                    "{}  {} ({})",
                    instance.instance_date, instance.event.title, instance.event.pattern
                );
            }
        }
    }

    Ok(())
}

/// Keeps a mutation for later when the server is unreachable; any other
/// failure is reported as is.
fn queue_if_offline(queue: &mut OfflineQueue, err: ApiError, action: TaskAction) -> Result<()> {
    if !err.is_offline() {
        return Err(err.into());
    }
    let seq = queue.enqueue(action);
    queue.save()?;
    println!("Server unreachable, queued as #{seq}. Run `taskctl sync` later.");
    Ok(())
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    let due = task
        .due_date
        .map(|d| format!(" due {d}"))
        .unwrap_or_default();
    let tags = if task.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", task.tags.join(", "))
    };
    println!(
        "[{mark}] {:>4} {} ({}){due}{tags}",
        task.id, task.title, task.priority
    );
}

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use crate::{
    db::Database,
    models::{Class, HistoryRecord},
    rollcall::{commands, RollEvent},
    selection::{format_elapsed, RollCallStats},
    settings::SettingsStore,
    AppState,
};

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Classroom roll call with weighted random selection", long_about = None)]
pub(crate) struct Cli {
    /// Use the local SQLite roster instead of the server
    #[arg(long, global = true)]
    pub(crate) local: bool,

    /// Settings file (defaults to the user data directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List classes with their group and student counts
    Classes {
        /// Also list the students of every group
        #[arg(long)]
        students: bool,
    },
    /// Run an interactive roll call for one class
    Roll {
        #[arg(long = "class", value_name = "ID")]
        class_id: i64,
        /// Restrict the pool to these groups (repeatable)
        #[arg(long = "group", value_name = "ID")]
        groups: Vec<i64>,
        /// Keep called students eligible
        #[arg(long, conflicts_with = "no_repeat")]
        repeat: bool,
        /// Exclude called students even if settings allow repeats
        #[arg(long)]
        no_repeat: bool,
        /// Milliseconds between draws while rolling
        #[arg(long, value_name = "MS")]
        speed: Option<u64>,
    },
    /// Show roll calls saved by the backend
    History,
    /// Load a roster JSON file into the local database
    Import { file: PathBuf },
}

pub(crate) async fn execute(cli: Cli, settings: SettingsStore) -> Result<()> {
    match cli.command {
        Commands::Import { file } => import(&settings, &file).await,
        command => {
            let state = AppState::load(settings, cli.local)?;
            let result = match command {
                Commands::Classes { students } => list_classes(&state, students).await,
                Commands::Roll {
                    class_id,
                    groups,
                    repeat,
                    no_repeat,
                    speed,
                } => {
                    let repeat = repeat_choice(repeat, no_repeat);
                    roll(&state, class_id, &groups, repeat, speed).await
                }
                Commands::History => history(&state).await,
                Commands::Import { .. } => Ok(()),
            };
            let saves = finish_saves(&state).await;
            state.rollcall.shutdown().await;
            result.and(saves)
        }
    }
}

async fn import(settings: &SettingsStore, file: &Path) -> Result<()> {
    let contents = fs::read_to_string(file)
        .with_context(|| format!("Failed to read roster from {}", file.display()))?;
    let classes: Vec<Class> = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid roster file {}", file.display()))?;

    let db = Database::open(settings.database_path())?;
    let summary = db.import_roster(classes).await?;
    println!(
        "Imported {} classes, {} groups, {} students into {}",
        summary.classes,
        summary.groups,
        summary.students,
        db.path().display()
    );
    Ok(())
}

/// Waits for saves issued by `stop` so none are lost when the runtime ends.
async fn finish_saves(state: &AppState) -> Result<()> {
    match commands::finish_pending_saves(state).await {
        Ok(0) => Ok(()),
        Ok(saved) => {
            log::info!("Saved {saved} roll call records");
            Ok(())
        }
        Err(failures) => {
            eprintln!("warning: {failures}");
            Err(anyhow!("some roll call records were not saved"))
        }
    }
}

fn repeat_choice(repeat: bool, no_repeat: bool) -> Option<bool> {
    match (repeat, no_repeat) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// Toggles repeat mode only when an explicit choice differs from the current one.
async fn apply_repeat_choice(state: &AppState, choice: Option<bool>) -> Result<bool> {
    let current = commands::get_roll_call_state(state)
        .await
        .map_err(|e| anyhow!(e))?
        .state
        .allow_repeat;
    match choice {
        Some(wanted) if wanted != current => {
            commands::toggle_repeat(state).await.map_err(|e| anyhow!(e))
        }
        _ => Ok(current),
    }
}

/// Keeps the roll speed for the next run. Repeat mode stays per-invocation.
fn remember_preferences(state: &AppState, roll_speed_ms: u64) -> Result<()> {
    state.settings.update(|settings| {
        settings.roll_speed_ms = roll_speed_ms;
    })?;
    Ok(())
}

async fn list_classes(state: &AppState, with_students: bool) -> Result<()> {
    let classes = commands::refresh_classes(state).await.map_err(|e| anyhow!(e))?;
    if classes.is_empty() {
        println!("No classes found.");
        return Ok(());
    }
    for class in classes {
        println!(
            "{:>4}  {:<20} {} groups, {} students",
            class.id,
            class.name,
            class.groups.len(),
            class.student_count()
        );
        if !with_students {
            for group in &class.groups {
                println!("        {:>4}  {} ({})", group.id, group.name, group.students.len());
            }
            continue;
        }

        let groups = commands::get_groups_for_class(state, class.id)
            .await
            .map_err(|e| anyhow!(e))?;
        for group in groups {
            let students = commands::get_students_for_group(state, group.id)
                .await
                .map_err(|e| anyhow!(e))?;
            println!("        {:>4}  {} ({})", group.id, group.name, students.len());
            for student in students {
                println!(
                    "              {:<10} {:<16} weight {}",
                    student.student_id, student.name, student.weight
                );
            }
        }
    }
    Ok(())
}

async fn history(state: &AppState) -> Result<()> {
    let records = commands::get_remote_history(state)
        .await
        .map_err(|e| anyhow!(e))?;
    if records.is_empty() {
        println!("No roll calls recorded.");
    }
    for record in records {
        let name = record
            .student
            .as_ref()
            .map(|student| student.name.as_str())
            .unwrap_or("?");
        println!(
            "{}  {:<16} class {}",
            record.called_at.format("%Y-%m-%d %H:%M:%S"),
            name,
            record.class_id
        );
    }
    Ok(())
}

fn print_stats(stats: &RollCallStats) {
    println!(
        "  called {}/{} ({}%), remaining {}, elapsed {}",
        stats.called_students,
        stats.total_students,
        stats.progress_percent,
        stats.remaining_students,
        format_elapsed(stats.elapsed_ms)
    );
}

fn print_record(record: &HistoryRecord) {
    println!(
        "\r>> {} [{}] ({})          ",
        record.student.name, record.student.student_id, record.student.group_name
    );
}

async fn roll(
    state: &AppState,
    class_id: i64,
    groups: &[i64],
    repeat: Option<bool>,
    speed: Option<u64>,
) -> Result<()> {
    commands::refresh_classes(state).await.map_err(|e| anyhow!(e))?;
    commands::select_class(state, class_id)
        .await
        .map_err(|e| anyhow!(e))?;
    for group_id in groups {
        commands::toggle_group(state, *group_id)
            .await
            .map_err(|e| anyhow!(e))?;
    }
    apply_repeat_choice(state, repeat).await?;
    if let Some(ms) = speed {
        commands::set_roll_speed(state, ms)
            .await
            .map_err(|e| anyhow!(e))?;
    }

    let snapshot = commands::get_roll_call_state(state)
        .await
        .map_err(|e| anyhow!(e))?;
    let class_name = snapshot
        .state
        .selected_class
        .as_ref()
        .map(|class| class.name.clone())
        .unwrap_or_default();
    let eligible = commands::get_candidates(state)
        .await
        .map_err(|e| anyhow!(e))?
        .len();
    println!(
        "Class {}: {} students in scope, {} eligible. Enter = start/stop, u = undo, r = reset, q = quit",
        class_name, snapshot.stats.total_students, eligible
    );

    let mut events = state.rollcall.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RollEvent::Tick { current }) => {
                    print!("\r   {} ({})          ", current.name, current.group_name);
                    let _ = std::io::stdout().flush();
                }
                Ok(RollEvent::PersistenceFailed { message, .. }) => {
                    eprintln!("\nwarning: {message}");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {
                let rolling = state.rollcall.get_state().await.is_rolling();
                if rolling {
                    match commands::stop_roll_call(state).await {
                        Ok(Some(record)) => print_record(&record),
                        Ok(None) => println!(),
                        Err(err) => eprintln!("{err}"),
                    }
                    let snapshot = commands::get_roll_call_state(state)
                        .await
                        .map_err(|e| anyhow!(e))?;
                    print_stats(&snapshot.stats);
                } else if let Err(err) = commands::start_roll_call(state).await {
                    eprintln!("{err}");
                    // Already shown; keep the next snapshot clean.
                    commands::dismiss_error(state)
                        .await
                        .map_err(|e| anyhow!(e))?;
                }
            }
            "u" => match commands::recent_history(state, 1).await {
                Ok(recent) => match recent.first() {
                    Some(last) => {
                        commands::delete_history_record(state, last.id)
                            .await
                            .map_err(|e| anyhow!(e))?;
                        println!("Removed {} from history", last.student.name);
                    }
                    None => println!("History is empty"),
                },
                Err(err) => eprintln!("{err}"),
            },
            "r" => {
                let snapshot = commands::reset_roll_call(state)
                    .await
                    .map_err(|e| anyhow!(e))?;
                println!("Session reset");
                print_stats(&snapshot.stats);
            }
            "q" => break,
            other => println!("Unknown command {other:?}"),
        }
    }

    printer.abort();
    state.rollcall.shutdown().await;

    let final_state = state.rollcall.get_state().await;
    let stats = final_state.statistics(Utc::now());
    if stats.called_count > 0 {
        println!("Session: {} calls in {}", stats.called_count, format_elapsed(stats.elapsed_ms));
    }
    remember_preferences(state, final_state.roll_speed_ms)
}

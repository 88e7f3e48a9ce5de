use std::error::Error;

use services::{AppServices, Clock, PlanSource, SessionError};
use study_core::format::{format_hms, format_long_date, format_study_minutes};
use study_core::guard::{Navigation, Route};
use study_core::model::{NewStudyRecordDraft, RecordEntry, SlotId, StudyTime, SubjectId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

type CommandResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Plan,
    Today,
    Toggle(SlotId),
    Subjects,
    History,
    Log {
        subject: SubjectId,
        time: String,
        questions: u32,
        incorrect: u32,
        topic: String,
    },
    Study {
        subject: SubjectId,
        topic: String,
    },
}

impl Command {
    fn route(&self) -> Route {
        match self {
            Command::Plan | Command::Today | Command::Toggle(_) => Route::Schedule,
            Command::Subjects => Route::Home,
            Command::History => Route::History,
            Command::Log { .. } | Command::Study { .. } => Route::Study,
        }
    }
}

/// Sign in with `STUDY_EMAIL`/`STUDY_PASSWORD` when both are set, otherwise
/// fall back to whoever signed in last.
pub async fn sign_in(services: &AppServices) -> CommandResult {
    let users = services.users();
    let email = std::env::var("STUDY_EMAIL").ok();
    let password = std::env::var("STUDY_PASSWORD").ok();
    if let (Some(email), Some(password)) = (email, password) {
        users.login(&email, &password).await?;
        return Ok(());
    }
    match users.initialize().await {
        Ok(Some(user)) => info!(%user, "using cached user"),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "continuing without a user profile"),
    }
    Ok(())
}

pub async fn execute(services: &AppServices, command: Command) -> CommandResult {
    let route = command.route();
    if let Navigation::Redirect(to) = services.users().navigate(route).await {
        return Err(format!("{route} is not available yet; open {to} first").into());
    }

    match command {
        Command::Plan => show_plan(services).await,
        Command::Today => show_today(services).await,
        Command::Toggle(slot) => toggle(services, slot).await,
        Command::Subjects => list_subjects(services).await,
        Command::History => show_history(services).await,
        Command::Log {
            subject,
            time,
            questions,
            incorrect,
            topic,
        } => {
            let draft = NewStudyRecordDraft {
                subject_id: subject,
                topic,
                study_time: StudyTime::Clock(time),
                total_pauses: 0,
                questions_resolved: questions,
                incorrect_answers: incorrect,
            };
            let entry = services.records().create(draft).await?;
            print_entry(&entry);
            load_schedule(services).await;
            sync_today(services).await;
            Ok(())
        }
        Command::Study { subject, topic } => study(services, subject, &topic).await,
    }
}

async fn load_schedule(services: &AppServices) {
    let (plan, progress) = services.schedule().load().await;
    if plan != PlanSource::Remote || progress != PlanSource::Remote {
        warn!(?plan, ?progress, "backend unavailable; showing local data");
    }
}

async fn show_plan(services: &AppServices) -> CommandResult {
    load_schedule(services).await;
    let plan = services.schedule().plan();
    for day in plan.days() {
        println!("{}", day.day);
        for slot in &day.subjects {
            println!("  [{}] {}", slot.id, slot.name);
        }
    }
    Ok(())
}

/// Mark plan slots done for the sessions logged today. Load the schedule
/// first; the push replaces the whole day.
async fn sync_today(services: &AppServices) {
    if let Err(err) = services.records().fetch(false).await {
        warn!(error = %err, "study history unavailable; progress not synced");
        return;
    }
    let today = services.records().today();
    if let Err(err) = services.schedule().sync_with_records(&today).await {
        warn!(error = %err, "progress not synced");
    }
}

async fn show_today(services: &AppServices) -> CommandResult {
    load_schedule(services).await;
    sync_today(services).await;
    println!("{}", format_long_date(Clock::default_clock().today()));
    let slots = services.schedule().today();
    if slots.is_empty() {
        println!("  nothing planned");
    }
    for status in slots {
        let mark = if status.completed { "x" } else { " " };
        println!("  [{mark}] {} {}", status.slot.id, status.slot.name);
    }
    Ok(())
}

async fn toggle(services: &AppServices, slot: SlotId) -> CommandResult {
    load_schedule(services).await;
    let today = Clock::default_clock().today();
    let completed = services.schedule().toggle_completion(today, slot).await?;
    println!("{slot}: {}", if completed { "done" } else { "not done" });
    Ok(())
}

async fn list_subjects(services: &AppServices) -> CommandResult {
    let catalog = services.subjects();
    catalog.fetch(false).await?;
    let selected = services.users().selected_subject_ids();
    for subject in catalog.subjects() {
        let mark = if selected.contains(&subject.id) { "*" } else { " " };
        println!("{mark} {:>4} {}", subject.id.value(), subject.name);
    }
    Ok(())
}

fn print_entry(entry: &RecordEntry) {
    let record = &entry.record;
    println!(
        "{:>6}  {}  {:<20} {:<24} {}  {}/{}",
        record.id.value(),
        record.local_date(),
        entry.subject_name,
        record.topic,
        format_hms(u64::from(record.study_time_secs)),
        record.correct_answers,
        record.questions_resolved
    );
}

async fn show_history(services: &AppServices) -> CommandResult {
    let records = services.records();
    records.fetch(true).await?;
    let entries = records.records();
    for entry in &entries {
        print_entry(entry);
    }
    let stats = records.stats();
    let minutes = i64::try_from(stats.total_study_secs / 60).unwrap_or(i64::MAX);
    println!(
        "{} sessions, {} studied, {:.1}% correct",
        entries.len(),
        format_study_minutes(minutes),
        stats.correct_percentage()
    );
    Ok(())
}

async fn study(services: &AppServices, subject: SubjectId, topic: &str) -> CommandResult {
    let sessions = services.sessions();
    let timer = services.timer();
    sessions.select(subject, topic);
    sessions.start()?;

    let mut updates = timer.subscribe();
    let ticker = timer.spawn_ticker();
    let display = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if !snapshot.is_running() {
                break;
            }
            let state = if snapshot.is_paused() { "paused " } else { "running" };
            eprint!("\r{} {state}", snapshot.formatted());
        }
    });

    eprintln!("enter: pause/resume | done <questions> <incorrect>: save | quit: discard");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let saved = loop {
        let Some(line) = lines.next_line().await? else {
            sessions.discard();
            break None;
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {
                sessions.toggle_pause();
            }
            ["quit"] => {
                sessions.discard();
                break None;
            }
            ["done", questions, incorrect] => {
                let (Ok(questions), Ok(incorrect)) = (questions.parse(), incorrect.parse()) else {
                    eprintln!("\nquestion counts must be whole numbers");
                    continue;
                };
                match sessions.finish(questions, incorrect).await {
                    Ok(entry) => break Some(entry),
                    Err(err @ SessionError::Record(_)) => eprintln!("\n{err}"),
                    Err(err) => return Err(err.into()),
                }
            }
            _ => eprintln!("\nunknown input"),
        }
    };

    ticker.await?;
    display.await?;
    eprintln!();
    if let Some(entry) = saved {
        print_entry(&entry);
        load_schedule(services).await;
        sync_today(services).await;
    }
    Ok(())
}

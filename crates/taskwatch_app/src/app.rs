use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use taskwatch_core::{format, TaskId, TaskStatus};
use taskwatch_engine::{QueryRequest, ReqwestTransport, Submission, TaskTracker};
use taskwatch_logging::{track_info, track_warn};

use crate::cli::{Cli, Command};
use crate::persistence::{LastTask, LastTaskStore};
use crate::render::Renderer;
use crate::sink::TerminalSink;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished(TaskStatus),
    Cancelled,
    /// A submission that did not start a task.
    Answered { success: bool },
    Formatted,
}

impl Outcome {
    pub fn exit_status(self) -> u8 {
        match self {
            Outcome::Finished(TaskStatus::Failed) | Outcome::Answered { success: false } => 1,
            Outcome::Cancelled => 130,
            Outcome::Finished(_) | Outcome::Answered { success: true } | Outcome::Formatted => 0,
        }
    }

    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

pub async fn run(cli: Cli) -> Result<Outcome> {
    let styled = io::stdout().is_terminal();

    if cli.command == Command::Format {
        return format_stdin(styled);
    }

    let transport = Arc::new(
        ReqwestTransport::new(cli.transport_settings())
            .with_context(|| format!("using server {}", cli.base_url))?,
    );
    let store = LastTaskStore::new(&cli.state_dir);

    let task_id = match &cli.command {
        Command::Track { task_id } => TaskId::from(task_id.as_str()),
        Command::Resume => {
            let last = store
                .load()?
                .ok_or_else(|| anyhow!("no saved task in {}", store.path().display()))?;
            if last.base_url != cli.base_url {
                track_warn!(
                    "Task {} was started against {}, resuming against {}",
                    last.task_id,
                    last.base_url,
                    cli.base_url
                );
            }
            last.task_id
        }
        Command::Chat { message } => {
            let submission = transport.submit_chat(&message.join(" ")).await?;
            match started_task(submission) {
                Ok(task_id) => task_id,
                Err(outcome) => return Ok(outcome),
            }
        }
        Command::JiraStatus { ticket } => {
            let submission = transport.check_jira_status(ticket).await?;
            match started_task(submission) {
                Ok(task_id) => task_id,
                Err(outcome) => return Ok(outcome),
            }
        }
        Command::SubmitQuery {
            ticket,
            approver,
            description,
        } => {
            let query = QueryRequest {
                jira_ticket: ticket.clone(),
                approver: approver.clone(),
                query_description: description.clone(),
            };
            let submission = transport.submit_query(&query).await?;
            match started_task(submission) {
                Ok(task_id) => task_id,
                Err(outcome) => return Ok(outcome),
            }
        }
        Command::Format => return format_stdin(styled),
    };

    if let Err(err) = store.save(&LastTask::new(task_id.clone(), cli.base_url.clone())) {
        track_warn!("Could not remember task {task_id}: {err:#}");
    }

    let renderer = Renderer::new(styled, Some(ReqwestTransport::clone(&transport)));
    let sink = Arc::new(TerminalSink::new(renderer));
    let tracker = TaskTracker::new(transport);
    let mut handle = tracker.start_tracking(task_id, sink.clone(), cli.track_options())?;

    tokio::select! {
        () = handle.finished() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            handle.cancel();
            eprintln!("Stopped tracking {}.", handle.task_id());
            handle.finished().await;
        }
    }

    Ok(match sink.outcome() {
        Some(status) => Outcome::Finished(status),
        None => Outcome::Cancelled,
    })
}

fn format_stdin(styled: bool) -> Result<Outcome> {
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("reading text from stdin")?;
    print!("{}", Renderer::new(styled, None).render_blocks(&format(&text)));
    Ok(Outcome::Formatted)
}

/// Print the server's answer; `Err` carries the outcome when no task was started.
fn started_task(submission: Submission) -> Result<TaskId, Outcome> {
    if !submission.message.is_empty() {
        println!("{}", submission.message);
    }
    match submission.task_id {
        Some(task_id) => {
            track_info!("Following task {task_id}");
            Ok(task_id)
        }
        None => Err(Outcome::Answered {
            success: submission.success,
        }),
    }
}

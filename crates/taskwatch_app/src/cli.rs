use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use taskwatch_engine::{TrackOptions, TransportSettings, DEFAULT_BASE_URL};
use taskwatch_logging::{LogDestination, DEFAULT_LOG_FILE};

#[derive(Debug, Parser)]
#[command(name = "taskwatch", version, about = "Follow long-running server tasks from the terminal")]
pub struct Cli {
    /// Server to talk to.
    #[arg(long, env = "TASKWATCH_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// Delay between status polls.
    #[arg(
        long,
        default_value_t = 2000,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub poll_interval_ms: u64,

    /// Poll only, never open the live event stream.
    #[arg(long, global = true)]
    pub no_stream: bool,

    /// Where the last tracked task and the log file are kept.
    #[arg(long, default_value = ".", global = true)]
    pub state_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = LogTarget::Terminal, global = true)]
    pub log: LogTarget,

    /// Log debug details.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Track a task that is already running. Pass --no-stream if it may have finished already.
    Track { task_id: String },
    /// Track the task tracked most recently. Always polls, so a finished task still reports.
    Resume,
    /// Send a chat message and track the task it starts.
    Chat {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Ask the server to check a Jira ticket.
    JiraStatus { ticket: String },
    /// Submit a data query for approval.
    SubmitQuery {
        #[arg(long)]
        ticket: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        description: String,
    },
    /// Format text from stdin and print it.
    Format,
}

impl Cli {
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            base_url: self.base_url.clone(),
            ..TransportSettings::default()
        }
    }

    /// The live stream only carries new events, so `resume` never waits on it.
    pub fn track_options(&self) -> TrackOptions {
        TrackOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            prefer_stream: !self.no_stream && self.command != Command::Resume,
        }
    }

    pub fn log_destination(&self) -> LogDestination {
        let file = self.state_dir.join(DEFAULT_LOG_FILE);
        match self.log {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File(file),
            LogTarget::Both => LogDestination::Both(file),
        }
    }
}

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::script::Tone;

mod jobs;
mod record;
mod script;

pub use jobs::handle_jobs_command;
pub use record::handle_record_command;
pub use script::handle_script_command;

#[derive(Parser, Debug)]
#[command(name = "telecue")]
#[command(about = "Teleprompter recording studio for the terminal", long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Record from camera and microphone, upload, optionally correct gaze
    Record(RecordCliArgs),
    /// Generate a teleprompter script from a topic
    Script(ScriptCliArgs),
    /// Inspect or watch a gaze-correction job
    Jobs(JobsCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct RecordCliArgs {
    /// Stop automatically after this many seconds (default: interactive)
    #[arg(short, long)]
    pub duration: Option<u64>,
    /// Camera index to record from
    #[arg(long)]
    pub camera: Option<u32>,
    /// Correlate the upload with a generated script id
    #[arg(long)]
    pub script_id: Option<String>,
    /// Script topic attached to the upload metadata
    #[arg(long)]
    pub topic: Option<String>,
    /// Submit for gaze correction without asking
    #[arg(long)]
    pub correct: bool,
    /// Never submit for gaze correction
    #[arg(long, conflicts_with = "correct")]
    pub no_correct: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ScriptCliArgs {
    /// Subject of the script
    #[arg(short, long)]
    pub topic: String,
    /// Target speaking time in minutes
    #[arg(short, long, default_value = "2")]
    pub duration: u32,
    /// Delivery tone
    #[arg(long, value_enum, default_value_t = Tone::Professional)]
    pub tone: Tone,
    /// Write the finished script to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Skip cleanup of generator metadata
    #[arg(long)]
    pub raw: bool,
}

#[derive(ClapArgs, Debug)]
pub struct JobsCliArgs {
    /// Correction job id to inspect
    pub job_id: String,
    /// Keep polling until the job reaches a terminal status
    #[arg(short, long)]
    pub watch: bool,
}

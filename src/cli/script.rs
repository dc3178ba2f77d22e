//! The `script` command: stream a generated teleprompter script to the
//! terminal as it arrives.

use anyhow::{Context, Result};
use std::io::Write;
use tracing::info;

use super::ScriptCliArgs;
use crate::config::Config;
use crate::script::{clean_script, ScriptRequest, ScriptSink, ScriptStreamClient};

/// Prints chunks as they stream in; status lines go to stderr so the
/// script text stays clean on stdout.
struct StdoutSink;

impl ScriptSink for StdoutSink {
    fn on_status(&mut self, message: &str) {
        eprintln!("[{message}]");
    }

    fn on_chunk(&mut self, content: &str) {
        print!("{content}");
        let _ = std::io::stdout().flush();
    }
}

pub async fn handle_script_command(args: ScriptCliArgs) -> Result<()> {
    let config = Config::load()?;
    let client = ScriptStreamClient::new(&config.script.endpoint);

    let request = ScriptRequest {
        topic: args.topic.clone(),
        duration: args.duration,
        tone: args.tone,
    };

    let mut sink = StdoutSink;
    let outcome = client.generate(&request, &mut sink).await?;
    println!();

    if !outcome.completed {
        eprintln!("Stream ended without a completion event; using accumulated text.");
    }

    let script = if args.raw {
        outcome.script
    } else {
        clean_script(&outcome.script)
    };

    if let Some(path) = &args.output {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        std::fs::write(path, &script)
            .with_context(|| format!("Failed to write script to {:?}", path))?;
        println!("Script written to {}", path.display());
    }

    if let Some(id) = &outcome.script_id {
        info!("Script persisted with id {id}");
        println!("Script id: {id} (pass --script-id to `record` to correlate the upload)");
    }
    if let Some(title) = &outcome.title {
        println!("Title: {title}");
    }

    Ok(())
}

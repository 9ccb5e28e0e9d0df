mod cli;
mod config;
mod session;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Command, FetchArgs, WatchArgs};
use relay::worker::WorkerOutcome;
use session::{ConsoleSink, Session};
use shared::settings::AppSettings;
use std::io::BufRead;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        settings.model = model;
    }
    if let Some(temperature) = cli.temperature {
        settings.temperature = temperature;
    }
    if let Some(dir) = cli.transcript_dir {
        settings.transcript_dir = dir.display().to_string();
    }

    match cli.command {
        Command::Fetch(args) => run_fetch(settings, args),
        Command::Watch(args) => run_watch(settings, args),
    }
}

fn run_fetch(settings: AppSettings, args: FetchArgs) -> Result<()> {
    let mut session = Session::new(settings);
    let ocr_text = match &args.ocr_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read OCR text from {}", path.display()))?,
        None => args.ocr_text.clone(),
    };
    let prompt = session.assemble_prompt(&args.prefix, &args.suffix, &ocr_text)?;
    if !args.no_copy {
        session.copy_to_clipboard(&prompt);
    }
    let outcome = session.run_request(&prompt, args.images, Arc::new(ConsoleSink))?;
    match outcome {
        WorkerOutcome::Errored(message) => Err(anyhow!(message)),
        WorkerOutcome::Completed(_) | WorkerOutcome::Cancelled => Ok(()),
    }
}

fn run_watch(settings: AppSettings, args: WatchArgs) -> Result<()> {
    let export_on_exit = args.export;
    let mut session = Session::new(settings);
    let lines = spawn_stdin_reader();

    println!("Type a question and press Enter to ask it about the newest transcript.");
    println!("Enter on its own resends the transcript; Enter during a reply cancels it.");
    println!("/reset clears the dialogue, /export saves it, /quit exits.");

    loop {
        let line = match lines.recv() {
            Ok(line) => line,
            Err(_) => break,
        };
        let question = line.trim().to_string();
        match question.as_str() {
            "/quit" => break,
            "/reset" => {
                session.reset_history();
                println!("dialogue cleared");
                continue;
            }
            "/export" => {
                match session.export_history() {
                    Ok(path) => println!("saved {}", path.display()),
                    Err(e) => eprintln!("export failed: {:#}", e),
                }
                continue;
            }
            _ => {}
        }

        let prompt = match session.assemble_prompt("", &question, "") {
            Ok(prompt) => prompt,
            Err(e) => {
                eprintln!("error: {:#}", e);
                continue;
            }
        };
        if !args.no_copy {
            session.copy_to_clipboard(&prompt);
        }
        let mut worker = match session.start_request(&prompt, Vec::new(), Arc::new(ConsoleSink)) {
            Ok(worker) => worker,
            Err(e) => {
                eprintln!("error: {:#}", e);
                continue;
            }
        };

        // Watch for an Enter while the reply streams; anything else typed
        // mid-reply is dropped rather than queued.
        let mut stdin_closed = false;
        while worker.is_running() {
            match lines.recv_timeout(Duration::from_millis(args.poll_ms)) {
                Ok(line) if line.trim().is_empty() => worker.request_cancel(),
                Ok(_) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    worker.request_cancel();
                    stdin_closed = true;
                    break;
                }
            }
        }
        let outcome = worker.wait();
        session.finish_request(&prompt, &outcome);
        if stdin_closed {
            break;
        }
    }

    if export_on_exit && session.history_len() > 0 {
        let path = session.export_history()?;
        println!("saved {}", path.display());
    }
    Ok(())
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

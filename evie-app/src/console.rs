//! Line-oriented console driving the development classifier.
//!
//! | Input | Effect |
//! |-------|--------|
//! | the configured keyword | simulate a detection |
//! | `fault [message]` | simulate an engine error |
//! | `start` / `stop` | control the listener |
//! | `bind <number> <message…>` | set and save the bound message |
//! | `unbind` | clear the bound message |
//! | `status` | print diagnostics as JSON |
//! | `quit` | exit |

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use evie_core::dispatch::phone;

use crate::settings::{normalize_keyword, save_settings, AppSettings};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Detect,
    Fault(String),
    Start,
    Stop,
    Bind { recipient: String, message: String },
    Unbind,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse(line: &str, keyword: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }
    if normalize_keyword(line) == keyword {
        return ConsoleCommand::Detect;
    }

    let (head, rest) = line
        .split_once(char::is_whitespace)
        .map(|(h, r)| (h, r.trim()))
        .unwrap_or((line, ""));
    match head.to_ascii_lowercase().as_str() {
        "fault" => ConsoleCommand::Fault(if rest.is_empty() {
            "simulated engine fault".into()
        } else {
            rest.to_string()
        }),
        "start" => ConsoleCommand::Start,
        "stop" => ConsoleCommand::Stop,
        "bind" => match rest.split_once(char::is_whitespace) {
            Some((recipient, message)) if !message.trim().is_empty() => ConsoleCommand::Bind {
                recipient: recipient.to_string(),
                message: message.trim().to_string(),
            },
            _ => ConsoleCommand::Unknown(line.to_string()),
        },
        "unbind" => ConsoleCommand::Unbind,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => ConsoleCommand::Unknown(line.to_string()),
    }
}

/// Read stdin until `quit` or EOF.
pub async fn run(state: &AppState) -> anyhow::Result<()> {
    print_help(&state.settings.lock().keyword);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let keyword = state.settings.lock().keyword.clone();
        if !handle(state, parse(&line, &keyword)) {
            break;
        }
    }
    Ok(())
}

/// Apply one command. Returns `false` when the console should exit.
pub fn handle(state: &AppState, command: ConsoleCommand) -> bool {
    match command {
        ConsoleCommand::Detect => {
            if !state.probe.detect() {
                println!("Not listening (state: {:?}). Type `start` first.", state.listener.state());
            }
        }
        ConsoleCommand::Fault(message) => state.probe.fault(&message),
        ConsoleCommand::Start => {
            if let Err(e) = state.listener.start() {
                println!("Could not start listening: {}", e.detail().message);
            }
        }
        ConsoleCommand::Stop => {
            if let Err(e) = state.listener.stop() {
                println!("Could not stop listening: {}", e.detail().message);
            }
        }
        ConsoleCommand::Bind { recipient, message } => bind(state, recipient, message),
        ConsoleCommand::Unbind => {
            state.orchestrator.unbind();
            let mut settings = state.settings.lock();
            settings.recipient.clear();
            settings.message.clear();
            persist(state, &settings);
            println!("Message binding cleared.");
        }
        ConsoleCommand::Status => match serde_json::to_string_pretty(&state.diagnostics_snapshot()) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("failed to render diagnostics: {e}"),
        },
        ConsoleCommand::Help => print_help(&state.settings.lock().keyword),
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Empty => {}
        ConsoleCommand::Unknown(line) => println!("Unknown command {line:?}. Type `help`."),
    }
    true
}

fn bind(state: &AppState, recipient: String, message: String) {
    if let Err(e) = phone::normalize(&recipient) {
        println!("{}", e.detail().message);
        return;
    }
    let binding = {
        let mut settings = state.settings.lock();
        settings.recipient = recipient;
        settings.message = message;
        persist(state, &settings);
        settings.binding()
    };
    if let Some(binding) = binding {
        println!("Bound message to {}.", binding.recipient);
        state.orchestrator.bind(binding);
    }
}

fn persist(state: &AppState, settings: &AppSettings) {
    match save_settings(&state.settings_path, settings) {
        Ok(()) => info!(path = %state.settings_path.display(), "settings saved"),
        Err(e) => warn!(path = %state.settings_path.display(), "failed to save settings: {e}"),
    }
}

fn print_help(keyword: &str) {
    println!("Say the wake word by typing {keyword:?}.");
    println!("Commands: start, stop, fault [message], bind <number> <message>, unbind, status, help, quit");
}

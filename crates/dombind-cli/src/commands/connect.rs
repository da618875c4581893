//! Connect command handler
//!
//! Loads the page, opens the connection and runs the sync engine. Lines on
//! stdin simulate user interactions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use dombind_core::{
    spawn_connection, Config, ConnectionSender, Document, EngineInput, EventMessage, Interaction,
    Outbox, SyncEngine,
};

use crate::output::{Output, OutputFormat};

/// Page fetch timeout in seconds
const FETCH_TIMEOUT: u64 = 10;

/// Overrides for the configured connection
#[derive(Debug, Default)]
pub struct ConnectArgs {
    pub page: Option<PathBuf>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub root_ref: Option<String>,
    pub dump: bool,
}

/// One parsed line of stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinCommand {
    Interact {
        target: String,
        interaction: Interaction,
    },
    Dump,
    Quit,
}

/// Parse one stdin line
///
/// Returns `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<StdinCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim_start();
    let (target, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let arg = arg.trim_start();

    let command = match verb {
        "dump" => StdinCommand::Dump,
        "quit" | "exit" => StdinCommand::Quit,
        "click" | "input" | "toggle" | "select" | "edit" => {
            if target.is_empty() {
                bail!("Usage: {} REF{}", verb, if verb == "click" { "" } else { " VALUE" });
            }
            let interaction = match verb {
                "click" => Interaction::Click,
                "input" => Interaction::Input(arg.to_string()),
                "select" => Interaction::Select(arg.to_string()),
                "edit" => Interaction::Edit(arg.to_string()),
                _ => match arg {
                    "on" => Interaction::Toggle(true),
                    "off" => Interaction::Toggle(false),
                    _ => bail!("Usage: toggle REF on|off"),
                },
            };
            StdinCommand::Interact {
                target: target.to_string(),
                interaction,
            }
        }
        _ => bail!(
            "Unknown command: '{}'\n\
             Valid commands: click, input, toggle, select, edit, dump, quit",
            verb
        ),
    };
    Ok(Some(command))
}

/// Sends through the connection and echoes what was sent
struct EchoingSender {
    sender: ConnectionSender,
    output: Output,
}

impl Outbox for EchoingSender {
    fn deliver(&mut self, message: EventMessage) -> bool {
        let sent = self.sender.deliver(message.clone());
        if sent {
            self.output.print_event(&message);
        }
        sent
    }
}

/// Connect to the server and synchronize until stdin closes or `quit`
pub async fn connect(args: ConnectArgs, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(url) = args.url {
        config.server_url = url;
    }
    if let Some(path) = args.path {
        config.path = path;
    }
    if args.root_ref.is_some() {
        config.root_ref = args.root_ref;
    }
    config.validate()?;

    let html = match args.page {
        Some(ref file) => std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read page: {:?}", file))?,
        None => fetch_page(&config.page_url()).await?,
    };
    let document = Document::parse(&html);

    output.message(&format!("Connecting to {}...", config.endpoint_url()));
    let handle = spawn_connection(config.connection_config());
    let sender = handle.sender.clone();

    let mut engine = SyncEngine::new(
        document,
        EchoingSender {
            sender: handle.sender.clone(),
            output: Output::new(output.format),
        },
    );
    debug!("Session id: {}", engine.session_id());

    let (input_tx, input_rx) = mpsc::channel(32);
    tokio::spawn(read_stdin(input_tx, output.format));

    tokio::select! {
        _ = engine.run(handle.event_rx, input_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            debug!("Interrupted");
        }
    }
    sender.shutdown().await;

    if args.dump {
        output.print_html(&engine.document().outer_html(engine.document().root()));
    }
    output.success("Disconnected");
    Ok(())
}

/// Forward stdin lines to the engine until EOF or `quit`
async fn read_stdin(input_tx: mpsc::Sender<EngineInput>, format: OutputFormat) {
    let output = Output::new(format);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match command {
            StdinCommand::Interact {
                target,
                interaction,
            } => {
                if input_tx
                    .send(EngineInput::Interact {
                        target,
                        interaction,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            StdinCommand::Dump => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if input_tx.send(EngineInput::Snapshot(reply_tx)).await.is_err() {
                    break;
                }
                if let Ok(html) = reply_rx.await {
                    output.print_html(&html);
                }
            }
            StdinCommand::Quit => break,
        }
    }
    // Dropping the sender stops the engine
}

/// Fetch the page served alongside the endpoint
async fn fetch_page(url: &str) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT))
        .user_agent("dombind/0.1")
        .build()?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch page from {}", url))?;
    if !response.status().is_success() {
        bail!("Fetching {} returned {}", url, response.status());
    }
    Ok(response.text().await?)
}

//! lumen - streaming chat client for the agent backend

mod config;

use std::collections::HashSet;
use std::io::Write as _;

use clap::Parser;
use lumen_chat::{Block, BlockId, DispatcherConfig, TurnDispatcher, TurnEvent};
use tokio::sync::broadcast;

/// lumen - streaming data-analysis chat client
#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL
    #[arg(short, long)]
    base_url: Option<String>,

    /// Conversation identity
    #[arg(long)]
    conversation: Option<String>,

    /// Run in non-interactive mode with a single message
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("lumen=debug")
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let file_config = config::Config::load();
    let base_url = args
        .base_url
        .or(file_config.base_url)
        .unwrap_or_else(|| "http://127.0.0.1:8000".to_string());
    let conversation = args
        .conversation
        .or(file_config.conversation)
        .unwrap_or_else(|| "local".to_string());

    let mut dispatcher = TurnDispatcher::new(DispatcherConfig {
        base_url,
        conversation,
    });

    // Ctrl-C cancels the running turn instead of killing the process.
    let handle = dispatcher.handle();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            handle.cancel();
        }
    });

    let printer = spawn_printer(dispatcher.subscribe());

    if let Some(message) = args.command {
        println!("lumen> {}", message);
        dispatcher.send(&message).await?;
    } else {
        run_interactive(&mut dispatcher).await?;
    }

    // Let the printer drain final events
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    printer.abort();

    Ok(())
}

async fn run_interactive(dispatcher: &mut TurnDispatcher) -> anyhow::Result<()> {
    use std::io::{self, BufRead};

    eprintln!("lumen (Ctrl-C cancels the current turn, /quit exits)");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "/quit" || message == "/exit" {
            break;
        }

        dispatcher.send(message).await?;
        // Give the printer a beat before showing the next prompt
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    Ok(())
}

/// Render turn events as they stream in.
///
/// Reasoning goes to stderr, answers to stdout, everything else as bracketed
/// status lines.
fn spawn_printer(mut receiver: broadcast::Receiver<TurnEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        // (block id, chars already printed) for the block streaming text
        let mut printed: Option<(BlockId, usize)> = None;
        let mut announced = 0usize;
        let mut results_seen: HashSet<BlockId> = HashSet::new();

        while let Ok(event) = receiver.recv().await {
            match event {
                TurnEvent::TurnStart { .. } => {
                    printed = None;
                    announced = 0;
                    results_seen.clear();
                }
                TurnEvent::StreamUpdate { blocks, .. } => {
                    for block in &blocks[announced.min(blocks.len())..] {
                        announce(block);
                    }
                    announced = blocks.len();

                    for block in &blocks {
                        if let Block::ToolCall {
                            id,
                            name,
                            result: Some(result),
                            open: false,
                            ..
                        } = block
                        {
                            if results_seen.insert(*id) {
                                eprintln!("[{}: {}]", name, truncate_chars(result, 200));
                            }
                        }
                    }

                    if let Some(block) = blocks.iter().rev().find(|b| b.is_open()) {
                        print_delta(block, &mut printed);
                    }
                }
                TurnEvent::TurnEnd { .. } => {
                    println!();
                    printed = None;
                }
            }
        }
    })
}

fn announce(block: &Block) {
    match block {
        Block::ToolCall { name, .. } => eprintln!("\n[running {}...]", name),
        Block::Chart { .. } => println!("\n[chart ready]"),
        Block::Table { payload, .. } => println!(
            "\n[table: {} columns, {} rows]",
            payload.columns.len(),
            payload.data.len()
        ),
        Block::Warning { message, .. } => eprintln!("\n[warning: {}]", message),
        Block::Error { message, .. } => eprintln!("\n[error: {}]", message),
        Block::Reasoning { .. } | Block::Answer { .. } => {}
    }
}

fn print_delta(block: &Block, printed: &mut Option<(BlockId, usize)>) {
    let (text, to_stderr) = match block {
        Block::Reasoning { text, .. } => (text, true),
        Block::Answer { text, .. } => (text, false),
        _ => return,
    };

    let already = match printed {
        Some((id, n)) if *id == block.id() => *n,
        _ => 0,
    };
    if text.len() > already {
        let delta = &text[already..];
        if to_stderr {
            eprint!("{}", delta);
            let _ = std::io::stderr().flush();
        } else {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }
    }
    *printed = Some((block.id(), text.len()));
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

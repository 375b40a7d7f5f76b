//! Streambuf TUI Entry Point
//!
//! Launches the terminal surface, or with `--headless` plays the demo script
//! without a terminal and prints a JSON report.
//!
//! Usage:
//!   streambuf-tui [OPTIONS]
//!
//! Options:
//!   -t, --throttle-ms <MS>  Coalescing window in milliseconds
//!   -c, --config <FILE>     Configuration file path
//!       --headless          Run without a terminal

use std::io::{self, IsTerminal, Write};
use std::panic;
use std::path::PathBuf;

use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streambuf_core::{load_config_from_path, ConfigOverrides, StreamConfig};
use streambuf_tui::{run_headless, App};

#[derive(Parser, Debug)]
#[command(name = "streambuf-tui")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Coalescing window in milliseconds
    #[arg(short = 't', long, value_name = "MS")]
    throttle_ms: Option<u64>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "STREAMBUF_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Play the demo script without a terminal and print a JSON report
    #[arg(long)]
    headless: bool,
}

fn init_logging(headless: bool) {
    // The alternate screen owns stderr too; only log there when asked to
    if !headless && std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn resolve_config(args: &Args) -> anyhow::Result<StreamConfig> {
    let mut config = load_config_from_path(args.config.clone())?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ms) = args.throttle_ms {
        overrides = overrides.with_throttle_ms(ms);
    }
    overrides.apply(&mut config);
    config.validate()?;

    tracing::info!(
        source = %config.source(),
        throttle = ?config.throttle_interval,
        "Configuration resolved"
    );
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.headless);
    let config = resolve_config(&args)?;

    if args.headless {
        let mut stdout = io::stdout().lock();
        let report = run_headless(&config, &mut stdout).await?;
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
        return Ok(());
    }

    // Check if we have a TTY before attempting initialization
    if !io::stdin().is_terminal() || !io::stdout().is_terminal() {
        eprintln!("Error: streambuf-tui requires a terminal (TTY)");
        eprintln!();
        eprintln!("Run it interactively, or pass --headless for a non-interactive run.");
        std::process::exit(1);
    }

    // Set up panic hook to restore terminal
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // Restore terminal before printing panic
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    // Run the app
    let mut app = App::new(&config);
    let result = app.run(&mut terminal).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // Propagate any errors
    result?;
    println!("{} frames drawn", app.frames());
    Ok(())
}

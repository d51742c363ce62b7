use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use scarpet::cli::{self, ConfigFile};
use scarpet::config::Config;
use scarpet::event_loop::Host;
use scarpet::script::Interpreter;

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("scarpet: {e}");
            eprintln!("Usage: scarpet [-f[<file>]] [-c<expr>] [-t<ms>] [-qdn] [<script>...]");
            std::process::exit(1);
        }
    };

    init_logging(args.debug);

    // ── Load config ───────────────────────────────────────────────────────────
    let mut config = match &args.config {
        ConfigFile::Skip => Config::default(),
        ConfigFile::Explicit(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("scarpet: {}: {e}", path.display());
            std::process::exit(1);
        }),
        ConfigFile::Search => match cli::find_user_config() {
            Some(path) => load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "could not read config");
                Config::default()
            }),
            None => Config::default(),
        },
    };
    if let Some(ms) = args.tick_ms {
        config.tick = Duration::from_millis(ms);
    }

    // ── Build the interpreter ─────────────────────────────────────────────────
    let interp = Rc::new(Interpreter::new());
    config.apply(&interp);
    let mut host = Host::new(interp, &config, args.quiet);

    // ── Start-up scripts, then -c commands ────────────────────────────────────
    for path in config.loads.iter().chain(&args.scripts) {
        if let Err(e) = host.load_script(path).await {
            eprintln!("scarpet: {}: {e}", path.display());
            std::process::exit(1);
        }
    }
    for command in &args.commands {
        match host.run_line(command).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                eprintln!("scarpet: {e}");
                std::process::exit(1);
            }
        }
    }

    if args.no_console {
        return;
    }

    // ── Enter main loop ───────────────────────────────────────────────────────
    if let Err(e) = host.run().await {
        eprintln!("scarpet: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so script output on stdout stays clean.  `RUST_LOG`
/// wins unless `-d` asked for debug output.
fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: &Path) -> std::io::Result<Config> {
    let (config, errors) = Config::load_file(path)?;
    for e in &errors {
        warn!(path = %path.display(), "{e}");
        eprintln!("scarpet: {}: {e}", path.display());
    }
    info!(path = %path.display(), "config loaded");
    Ok(config)
}

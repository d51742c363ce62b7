//! Command-line argument parsing.
//!
//! Usage:
//!   scarpet [-f[<file>]] [-c<expr>] [-t<ms>] [-qdn] [<script>...]

use std::path::PathBuf;

use directories::BaseDirs;

/// File name of the start-up configuration.
pub const RC_FILE: &str = ".scarpetrc";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Which rc file to read.
    pub config: ConfigFile,
    /// Expressions to run after start-up scripts (`-c<expr>`, repeatable).
    pub commands: Vec<String>,
    /// Tick length override in milliseconds (`-t<ms>`).
    pub tick_ms: Option<u64>,
    /// Omit timing from results (`-q`).
    pub quiet: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Exit after scripts and commands instead of reading the console (`-n`).
    pub no_console: bool,
    /// Script files evaluated at start-up, in order.
    pub scripts: Vec<PathBuf>,
}

/// How to choose the rc file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search `$HOME/.scarpetrc` then `./.scarpetrc` (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the rc file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            args.scripts.extend(argv[i + 1..].iter().map(PathBuf::from));
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            args.scripts.push(PathBuf::from(arg));
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'q' => args.quiet = true,
                'n' => args.no_console = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                // -c<expr>
                'c' => {
                    let expr = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-c requires an expression argument".to_owned());
                    };
                    args.commands.push(expr);
                }

                // -t<ms>
                't' => {
                    let ms = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-t requires a tick length in milliseconds".to_owned());
                    };
                    let ms: u64 = ms.parse().map_err(|_| format!("invalid tick length: {ms}"))?;
                    if ms == 0 {
                        return Err("tick length must be positive".to_owned());
                    }
                    args.tick_ms = Some(ms);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the rc file in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(RC_FILE))
        .into_iter()
        .chain(std::iter::once(PathBuf::from(".").join(RC_FILE)))
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

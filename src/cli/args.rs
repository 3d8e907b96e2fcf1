use clap::builder::styling::{AnsiColor, Styles};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use tsbridge::FramingMode;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::Cyan.on_default().bold())
    .placeholder(AnsiColor::Cyan.on_default())
    .error(AnsiColor::Red.on_default().bold());

const AFTER_HELP: &str = "\x1b[1;32mQuick Reference:\x1b[0m
  \x1b[1;36mExplore code at a specific location\x1b[0m (1-based line and column):
    tsb quickinfo src/app.ts -l 10 -c 5     Show type signature and docs
    tsb definition src/app.ts -l 10 -c 5    Jump to where this symbol is defined
    tsb references src/app.ts -l 10 -c 5    Find all usages across the project

  \x1b[1;36mCheck files:\x1b[0m
    tsb diagnostics src/app.ts src/util.ts  Syntax and semantic errors

  \x1b[1;36mAnything else:\x1b[0m
    tsb raw navtree --args '{\"file\":\"/abs/src/app.ts\"}'";

#[derive(Parser)]
#[command(name = "tsb")]
#[command(about = "Query the TypeScript language server (tsserver) from the command line")]
#[command(version)]
#[command(styles = STYLES)]
#[command(after_help = AFTER_HELP)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (defaults to the nearest directory with tsconfig.json,
    /// jsconfig.json, package.json or .git)
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Interpreter used to run tsserver
    #[arg(long, value_name = "PATH", env = "TSB_NODE", default_value = "node")]
    pub node: PathBuf,

    /// tsserver entry script, relative to the workspace unless absolute
    #[arg(
        long,
        value_name = "PATH",
        env = "TSB_TSSERVER",
        default_value = tsbridge::tsserver::config::DEFAULT_TSSERVER
    )]
    pub tsserver: PathBuf,

    /// How tsserver frames its output
    #[arg(long, value_enum, default_value_t = FramingMode::ContentLength)]
    pub framing: FramingMode,

    /// Event that marks tsserver as ready
    #[arg(
        long,
        value_name = "EVENT",
        default_value = tsbridge::tsserver::config::DEFAULT_READY_EVENT
    )]
    pub ready_event: String,

    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// Timeout in seconds for each request (default: 30)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Seconds to wait for tsserver to become ready (default: 10)
    #[arg(long, value_name = "SECONDS")]
    pub startup_timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show type signature and documentation at a specific file location
    #[command(
        long_about = "Show the type signature and documentation for the symbol at a specific \
        position in a file.\n\n\
        Examples:\n  \
        tsb quickinfo src/main.ts -l 45 -c 12\n  \
        tsb --format json quickinfo src/main.ts -l 45 -c 12"
    )]
    Quickinfo {
        file: PathBuf,

        #[arg(short, long)]
        line: u32,

        #[arg(short, long)]
        column: u32,
    },

    /// Jump to definition from a specific file location (line + column)
    Definition {
        file: PathBuf,

        #[arg(short, long)]
        line: u32,

        #[arg(short, long)]
        column: u32,
    },

    /// Find every place the symbol at a location is used
    References {
        file: PathBuf,

        #[arg(short, long)]
        line: u32,

        #[arg(short, long)]
        column: u32,
    },

    /// Report syntax and semantic diagnostics for one or more files
    Diagnostics {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },

    /// Send an arbitrary tsserver command and print the response body
    Raw {
        /// tsserver command name, e.g. `navtree` or `open`
        command: String,

        /// Command arguments as a JSON object
        #[arg(long, value_name = "JSON", default_value = "{}")]
        args: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

use clap::Parser;
use hush_core::DuplicatePolicy;

/// Debounce stdin lines.
///
/// Every line read from stdin is held back for the delay window; repeating a
/// line restarts its window. A line is printed once it has been quiet for the
/// full delay.
#[derive(Parser, Debug)]
#[command(name = "hush", version, about = "Debounce repeated lines from stdin")]
pub struct CliArgs {
    /// Delay window in milliseconds (overrides HUSH_DEFAULT_DELAY_MS)
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Duplicate handling: allow or skip_admitted (overrides HUSH_DUPLICATE_POLICY)
    #[arg(long)]
    pub policy: Option<DuplicatePolicy>,

    /// Admit everything still pending as soon as stdin closes
    #[arg(long)]
    pub flush_on_eof: bool,

    /// Print admitted lines as JSON objects
    #[arg(long)]
    pub json: bool,
}

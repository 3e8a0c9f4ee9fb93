pub mod cli;

pub use cli::Args;

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for JSON output.
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive {directive:?}: {e}"),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the CLI to completion on a fresh runtime.
pub fn run(args: Args) -> anyhow::Result<()> {
    init_logging(&["verbatim_lib=info", "verbatim_core=info"]);
    tracing::debug!(?args, "Starting Verbatim");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cli::run(args))
}

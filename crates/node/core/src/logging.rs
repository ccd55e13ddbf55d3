//! Logging configuration for the Wayfare node runner.

use crate::args::LogArgs;
use eyre::Result;
use tracing_subscriber::EnvFilter;

/// Initialize logging based on command line arguments.
///
/// The filter is built with the following precedence:
/// 1. If `--quiet` is set, only errors are shown
/// 2. Otherwise, start with `RUST_LOG` env var if set, or a level from the verbosity flags
/// 3. Apply any custom filter from `--log.filter`
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let filter = build_filter(args);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if args.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| eyre::eyre!("Failed to initialize logging: {e}"))?;

    if !args.quiet && !args.json {
        log_startup_banner();
    }

    Ok(())
}

fn build_filter(args: &LogArgs) -> EnvFilter {
    if args.quiet {
        return EnvFilter::new("error");
    }

    let base_level = match args.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

    if let Some(custom_filter) = &args.filter {
        for directive in custom_filter.split(',') {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
    }

    filter
}

/// Log a startup banner with the version
fn log_startup_banner() {
    let banner = format!(
        r#"
 __      __              ___
/  \    /  \_____  ___.__./ ____\_____ _______   ____
\   \/\/   /\__  \<   |  |\   __\ \__  \\_  __ \_/ __ \
 \        /  / __ \\___  | |  |    / __ \|  | \/\  ___/
  \__/\  /  (____  / ____| |__|   (____  /__|    \___  >
       \/        \/\/                  \/            \/

 Node Runner v{}
    "#,
        crate::version::SHORT_VERSION
    );

    println!("{}", banner);
}

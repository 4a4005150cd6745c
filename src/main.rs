use anyhow::{bail, Result};
use clap::Parser;
use env_logger::Env;
use pitchvis::config::Settings;
use pitchvis::Outcome;

fn main() -> Result<()> {
    let cfg = Settings::parse();

    // Log lines would tear through the preview, so keep it quiet there.
    let default_level = if cfg.preview { "warn" } else { "info" };
    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or(default_level));
    if let Some(level) = cfg.log_level.as_deref() {
        logger.parse_filters(level);
    }
    logger.init();

    if let Err(err) = cfg.validate() {
        bail!("{err}");
    }

    match pitchvis::app::run(cfg)? {
        Outcome::Completed => Ok(()),
        Outcome::Cancelled => {
            println!("cancelled");
            Ok(())
        }
        Outcome::Failed(err) => bail!("visualization failed: {err}"),
    }
}

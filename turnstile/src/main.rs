use std::fmt;

use args::Args;
use clap::Parser;
use rate_limit::RateLimitManager;
use tokio::io::{AsyncBufReadExt, BufReader};

mod args;
mod logger;

/// Reason printed for every rejected key.
const REJECTION_REASON: &str = "rate_limit_exceeded";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.config()?;

    logger::init(&args)?;

    let manager = match RateLimitManager::new(&config.rate_limit).await {
        Ok(manager) => manager,
        Err(e) => {
            log::error!("Failed to initialize rate limiter: {e}");
            std::process::exit(1);
        }
    };

    let result = run(&manager, &args.keys).await;

    if let Err(e) = manager.release().await {
        log::error!("Failed to release rate limiter: {e}");
    }

    result
}

async fn run(manager: &RateLimitManager, keys: &[String]) -> anyhow::Result<()> {
    if !keys.is_empty() {
        for key in keys {
            check(manager, key).await;
        }

        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let key = line.trim();

        if !key.is_empty() {
            check(manager, key).await;
        }
    }

    Ok(())
}

async fn check(manager: &RateLimitManager, key: &str) {
    let decision = Decision {
        key,
        allowed: manager.admit(key).await,
    };

    println!("{decision}");
}

/// One admission outcome, rendered as a line of output.
struct Decision<'a> {
    key: &'a str,
    allowed: bool,
}

impl fmt::Display for Decision<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.allowed {
            write!(f, "{} allowed", self.key)
        } else {
            write!(f, "{} rejected {REJECTION_REASON}", self.key)
        }
    }
}

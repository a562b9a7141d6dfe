//! Fetch command - capture one URL without running the proxy
//!
//! # Usage
//!
//! ```bash
//! liveweb fetch http://example.com/          # archive and print a summary
//! liveweb fetch http://example.com/ --raw    # write the record to stdout
//! ```

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Args;
use liveweb_archive::RecordEncoder;
use liveweb_config::Config;

use crate::context::AppContext;

/// Fetch command arguments
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// URL to capture
    #[arg(value_name = "URL")]
    url: String,

    /// Write the encoded record to stdout instead of a summary
    #[arg(long)]
    raw: bool,
}

/// Run the fetch command
pub async fn run(config: Config, args: FetchArgs) -> Result<()> {
    tokio::task::spawn_blocking(move || fetch(&config, &args))
        .await
        .context("fetch task failed")?
}

fn fetch(config: &Config, args: &FetchArgs) -> Result<()> {
    let ctx = AppContext::from_config(config)?;
    let result = capture(&ctx, args);
    ctx.close();
    result
}

fn capture(ctx: &AppContext, args: &FetchArgs) -> Result<()> {
    let record = ctx
        .capture(&args.url)
        .with_context(|| format!("failed to archive {}", args.url))?;
    let bytes = record.read_all().context("failed to read back record")?;

    let mut out = io::stdout().lock();
    if args.raw {
        out.write_all(&bytes)?;
        return Ok(());
    }

    let decoded = ctx.writer().encoder().decode(&bytes)?;
    let meta = &decoded.metadata;
    let file = record
        .filename()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());

    writeln!(out, "url:          {}", meta.url)?;
    writeln!(out, "ip:           {}", meta.ip)?;
    writeln!(out, "date:         {}", meta.date.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out, "content-type: {}", meta.content_type)?;
    writeln!(out, "captured:     {} bytes", meta.length)?;
    writeln!(out, "file:         {}", file)?;
    writeln!(out, "offset:       {}", record.offset())?;
    writeln!(out, "record:       {} bytes", record.content_length())?;
    Ok(())
}

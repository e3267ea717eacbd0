use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use weft::Page;

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Weft declarative HTML runtime CLI")]
struct Cli {
    /// Emit runtime tracing to stderr
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap a document, render once, and print the output HTML
    Render {
        /// Path to the host HTML document
        file: PathBuf,
        /// Initial URL fragment (e.g. "#tab=profile")
        #[arg(long)]
        fragment: Option<String>,
    },
    /// Check that a document parses and its roots mount
    Check {
        /// Path to the host HTML document
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.trace {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Render { file, fragment } => {
            let html = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let page = Page::open_with_fragment(&html, fragment.as_deref().unwrap_or(""))
                .with_context(|| format!("mounting {}", file.display()))?;
            println!("{}", page.html());
        }
        Commands::Check { file } => {
            let html = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let page = Page::open(&html)
                .with_context(|| format!("mounting {}", file.display()))?;
            let compiled = page.runtime().exprs.compile_count();
            eprintln!("OK: {} expression(s) compiled", compiled);
        }
    }
    Ok(())
}

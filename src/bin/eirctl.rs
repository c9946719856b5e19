//! eirctl: inspection and maintenance for the eir gateway.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eir::telemetry::report;
use eir::{BackendKind, CacheStore, CompletionOptions, Config, Gateway, Secrets};

/// eir gateway control tool
#[derive(Parser)]
#[command(name = "eirctl")]
#[command(version = eir::PKG_VERSION)]
#[command(about = "Inspect and maintain the eir inference gateway")]
struct Args {
    /// Config file (default: ~/.eir/config.toml, then /etc/eir/config.toml)
    #[arg(short, long, env = "EIR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show cache backend and counters
    ///
    /// Entry counts come from the shared Redis cache; hit and miss counters
    /// cover only this process.
    CacheStats,

    /// Delete entries from the shared Redis cache
    ///
    /// Fails when no Redis backend is reachable, since the in-process cache
    /// of another process cannot be cleared from here.
    CacheClear {
        /// Only delete keys matching this glob (e.g. "user:42:*")
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Print a performance report for this process
    ///
    /// Telemetry is kept per process, so this covers only work done by this
    /// eirctl invocation. A serving process writes its own report with
    /// `eir::telemetry::report::write`.
    Report {
        /// Also write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List configured providers and their breaker state
    Providers {
        /// Also run each provider's access check
        #[arg(long)]
        check: bool,
    },

    /// Generate a completion through the fallback chain
    Complete {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        /// System instruction
        #[arg(short, long, default_value = "")]
        system: String,
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,
        #[arg(long, default_value_t = 512)]
        max_tokens: u32,
        /// Bypass the completion cache
        #[arg(long)]
        no_cache: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let gateway = Gateway::from_config(&config, &secrets).await?;

    match args.command {
        Command::CacheStats => {
            let cache = gateway.cache();
            let stats = cache.stats();
            println!("backend:    {}", stats.backend);
            if stats.degraded {
                println!("degraded:   yes (remote backend unreachable)");
            }
            if stats.backend == BackendKind::Memory {
                println!("note:       in-process cache, local to this eirctl process");
            }
            println!("entries:    {}", cache.len().await);
            println!("hits:       {}", stats.hits);
            println!("misses:     {}", stats.misses);
            println!("operations: {}", stats.operations);
            println!("errors:     {}", stats.errors);
            println!("hit ratio:  {:.1}%", stats.hit_ratio * 100.0);
        }

        Command::CacheClear { pattern } => {
            let cache = gateway.cache();
            require_shared_cache(cache)?;
            match pattern {
                Some(pattern) => {
                    let removed = cache.delete_pattern(&pattern).await;
                    println!("removed {removed} keys matching {pattern:?}");
                }
                None => {
                    if !cache.clear().await {
                        return Err("cache clear rejected by the remote backend".into());
                    }
                    println!("cache cleared ({})", cache.backend_kind());
                }
            }
        }

        Command::Report { output, json } => {
            eprintln!(
                "note: telemetry is per process; this report covers only this eirctl run"
            );
            let summary = gateway.summarize();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", report::render(&summary));
            }
            if let Some(path) = output {
                report::write(&path, &summary)?;
                eprintln!("report written to {}", path.display());
            }
        }

        Command::Providers { check } => {
            for provider in gateway.providers() {
                let state = match provider.trip_reason {
                    Some(reason) => format!("tripped ({reason})"),
                    None => "available".to_string(),
                };
                println!("{:<12} {:<40} {state}", provider.name, provider.model);
            }
            if check {
                println!();
                for (name, result) in gateway.check_access().await {
                    match result {
                        Ok(status) if status.granted => println!("{name}: access granted"),
                        Ok(status) => println!(
                            "{name}: access denied ({})",
                            status.reason.as_deref().unwrap_or("no reason given")
                        ),
                        Err(e) => println!("{name}: check failed: {e}"),
                    }
                }
            }
        }

        Command::Complete {
            prompt,
            system,
            temperature,
            max_tokens,
            no_cache,
        } => {
            let prompt = resolve_text(prompt, "complete")?;
            let options = CompletionOptions::new()
                .temperature(temperature)
                .max_tokens(max_tokens)
                .use_cache(!no_cache);
            let text = gateway
                .generate_completion(&system, &prompt, &options)
                .await?;
            println!("{text}");
        }
    }

    Ok(())
}

/// Cache maintenance only makes sense against the shared Redis backend.
fn require_shared_cache(cache: &CacheStore) -> Result<(), String> {
    match cache.backend_kind() {
        BackendKind::Memory if cache.is_degraded() => Err(
            "redis is configured but unreachable; the in-process cache is local to eirctl"
                .to_string(),
        ),
        BackendKind::Memory => Err(
            "no redis url configured; the in-process cache is local to eirctl".to_string(),
        ),
        BackendKind::Redis => Ok(()),
    }
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}

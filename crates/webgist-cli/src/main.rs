use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webgist_core::CaptureMode;
use webgist_local::agent::WebGist;
use webgist_local::config::Config;
use webgist_local::telemetry::Telemetry;

#[derive(Parser, Debug)]
#[command(name = "webgist")]
#[command(about = "Scrape a web page and summarize it with an LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question about the first URL found in the query.
    Ask(AskCmd),
    /// Diagnose configuration (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct AskCmd {
    /// Free-form request containing an http(s) URL and a question.
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,
    /// Override OPENAI_MODEL for this run.
    #[arg(long)]
    model: Option<String>,
    /// Ask for structured reasoning and record it (scrubbed) in Langfuse.
    ///
    /// Without this flag the mode comes from LANGFUSE_CAPTURE_COT.
    #[arg(long)]
    capture_cot: bool,
    /// Skip the one-shot Langfuse connectivity trace at startup.
    #[arg(long)]
    no_startup_trace: bool,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Send a connectivity trace to Langfuse and report whether it was accepted.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    check_langfuse: bool,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn load_env_file() {
    // Opt-in only; never overrides the process environment; never logs values.
    let Ok(p) = std::env::var("WEBGIST_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let s = s.strip_prefix("export ").unwrap_or(s);
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

fn init_tracing() {
    // stdout carries the JSON payloads; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,webgist=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn ask(args: AskCmd) -> Result<()> {
    let mut cfg = Config::from_env().context("failed to load configuration")?;
    if let Some(m) = args.model.filter(|m| !m.trim().is_empty()) {
        cfg.openai_model = m;
    }
    if args.capture_cot {
        cfg.capture_mode = CaptureMode::Reasoning;
    }
    tracing::debug!(config = ?cfg, "configuration loaded");

    let telemetry = Telemetry::connect(cfg.langfuse.as_ref());
    if !args.no_startup_trace {
        telemetry.send_startup_trace().await;
    }
    let agent = WebGist::from_config(&cfg, telemetry)?;

    let query = args.query.join(" ");
    let text_output = args.output.eq_ignore_ascii_case("text");
    match agent.respond(&query).await {
        Ok(resp) => {
            if text_output {
                if !resp.url.is_empty() {
                    println!("url: {}", resp.url);
                    println!();
                }
                println!("{}", resp.summary);
            } else {
                let v = serde_json::json!({
                    "schema_version": 1,
                    "kind": "ask",
                    "ok": true,
                    "capture_mode": agent.mode().as_str(),
                    "url": resp.url,
                    "scraped_text": resp.scraped_text,
                    "summary": resp.summary,
                });
                println!("{v}");
            }
            Ok(())
        }
        Err(e) => {
            let msg = format!("Summarization failed: {e}");
            if !text_output {
                let v = serde_json::json!({
                    "schema_version": 1,
                    "kind": "ask",
                    "ok": false,
                    "error": { "code": "summarization_failed", "message": msg },
                });
                println!("{v}");
            }
            eprintln!("{msg}");
            std::process::exit(1);
        }
    }
}

async fn doctor(args: DoctorCmd) -> Result<()> {
    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }

    let t0 = std::time::Instant::now();
    let cfg = Config::from_env();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    checks.push(serde_json::json!({
        "name": "config_loads",
        "ok": cfg.is_ok(),
        "message": match &cfg {
            Ok(_) => "configuration is complete".to_string(),
            Err(e) => e.to_string(),
        },
        "hint": if cfg.is_ok() { "" } else { "Set OPENAI_API_KEY (or point WEBGIST_ENV_FILE at a file that does)." },
    }));

    let langfuse = cfg.as_ref().ok().and_then(|c| c.langfuse.clone());
    let mut langfuse_ok: Option<bool> = None;
    if args.check_langfuse {
        let telemetry = Telemetry::connect(langfuse.as_ref());
        langfuse_ok = Some(telemetry.send_startup_trace().await);
    }
    checks.push(serde_json::json!({
        "name": "langfuse_ingestion",
        "ok": langfuse_ok.unwrap_or(true),
        "skipped": langfuse_ok.is_none(),
        "message": match langfuse_ok {
            None => "langfuse connectivity check skipped",
            Some(true) => "langfuse accepted the startup trace",
            Some(false) => "langfuse did not accept the startup trace",
        },
    }));

    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    let capture_cot = cfg
        .as_ref()
        .map(|c| c.capture_mode == CaptureMode::Reasoning)
        .unwrap_or(false);
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "webgist",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "llm": {
                "openai": has_env("OPENAI_API_KEY"),
                "openai_model": cfg.as_ref().ok().map(|c| c.openai_model.clone()),
            },
            "telemetry": {
                "langfuse": langfuse.is_some(),
                "capture_cot": capture_cot,
            },
        },
        "checks": checks,
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("webgist {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
            println!(
                "llm: openai={}",
                payload["configured"]["llm"]["openai"]
                    .as_bool()
                    .unwrap_or(false)
            );
            println!(
                "telemetry: langfuse={} capture_cot={}",
                payload["configured"]["telemetry"]["langfuse"]
                    .as_bool()
                    .unwrap_or(false),
                capture_cot,
            );
            println!("checks:");
            if let Some(arr) = payload["checks"].as_array() {
                for c in arr {
                    let name = c["name"].as_str().unwrap_or("?");
                    if c["skipped"].as_bool().unwrap_or(false) {
                        println!("- {name}: skipped");
                    } else {
                        let ok = c["ok"].as_bool().unwrap_or(false);
                        println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                    }
                }
            }
        }
        _ => println!("{payload}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ask(args) => ask(args).await?,
        Commands::Doctor(args) => doctor(args).await?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "webgist",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("webgist {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}

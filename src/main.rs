use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use medbot_core::collab::{
    Collaborators, DisabledMailer, GeminiTranscriber, Mailer, ProviderCollaborator, SmtpMailer,
    Transcriber,
};
use medbot_core::config::{self, Config};
use medbot_core::dialogue::{messages, Router};
use medbot_core::provider;
use medbot_core::service::sweeper::SessionSweeper;
use medbot_core::session::store::SessionStore;
use medbot_core::worker::BackgroundWorker;

/// Model used for voice transcription when the generation model is not Gemini.
const TRANSCRIBE_MODEL: &str = "gemini-2.0-flash";

#[derive(Parser)]
#[command(
    name = "medbot",
    about = "medbot - LINE patient-education assistant",
    version = medbot_core::VERSION,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (LINE webhook + JSON API)
    Serve {
        /// Listen port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Talk to the dialogue engine from the terminal
    Chat {
        /// User ID for the local session
        #[arg(short, long, default_value = "cli:default")]
        user: String,
        /// Single message (omit for interactive mode)
        message: Vec<String>,
    },
    /// Write a default config file to ~/.medbot/config.json
    Init,
    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medbot=info".parse()?)
                .add_directive("medbot_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => cmd_serve(port).await?,
        Commands::Chat { user, message } => cmd_chat(user, message).await?,
        Commands::Init => cmd_init()?,
        Commands::Status => cmd_status()?,
    }

    Ok(())
}

/// Everything a running dialogue engine needs, wired from config.
struct Engine {
    router: Router,
    store: Arc<SessionStore>,
    worker: tokio::task::JoinHandle<()>,
}

fn build_engine(cfg: &Config) -> medbot_core::error::Result<Engine> {
    let llm = provider::provider_from_config(cfg)?;
    let collaborator = Arc::new(ProviderCollaborator::new(llm, &cfg.generation));

    let mailer: Arc<dyn Mailer> = if cfg.mail_enabled() {
        Arc::new(SmtpMailer::new(&cfg.mail))
    } else {
        tracing::warn!("SMTP not configured, mail requests will be declined");
        Arc::new(DisabledMailer)
    };

    let transcriber: Option<Arc<dyn Transcriber>> = if cfg.providers.gemini.api_key.is_empty() {
        None
    } else {
        let model = if cfg.generation.model.starts_with("gemini") {
            cfg.generation.model.as_str()
        } else {
            TRANSCRIBE_MODEL
        };
        Some(Arc::new(GeminiTranscriber::new(
            &cfg.providers.gemini.api_key,
            cfg.providers.gemini.api_base.as_deref(),
            model,
        )))
    };

    let (logger, worker) = BackgroundWorker::from_config(&cfg.storage);
    let worker = worker.spawn();

    let store = Arc::new(SessionStore::new(&cfg.session));
    let collab = Collaborators {
        generator: collaborator.clone(),
        translator: collaborator,
        mailer,
        transcriber,
        logger: Arc::new(logger),
    };
    let router = Router::new(store.clone(), collab, cfg);

    Ok(Engine {
        router,
        store,
        worker,
    })
}

async fn cmd_serve(port: Option<u16>) -> Result<()> {
    let cfg = config::load_config_from_env();
    let engine = build_engine(&cfg)?;
    let sweeper = SessionSweeper::new(engine.store.clone(), &cfg.session).spawn();

    #[cfg(feature = "http-api")]
    {
        use medbot_core::channel::line::LineChannel;
        use medbot_core::service::http::{serve, AppState};

        let line = if cfg.line.enabled {
            Some(LineChannel::new(cfg.line.clone(), engine.router.clone()))
        } else {
            tracing::warn!("LINE channel disabled (no access token)");
            None
        };
        let state = Arc::new(AppState::new(engine.router.clone(), line));
        let addr = format!("{}:{}", cfg.gateway.host, port.unwrap_or(cfg.gateway.port));
        println!("Starting medbot HTTP gateway on {}...", addr);

        tokio::select! {
            res = serve(&addr, state) => {
                if let Err(e) = res {
                    eprintln!("HTTP server error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
            }
        }
    }

    #[cfg(not(feature = "http-api"))]
    {
        let _ = port;
        eprintln!("HTTP API not available. Rebuild with: cargo build --features http-api");
    }

    sweeper.shutdown().await;
    drop(engine.router);
    // Spawned webhook turns may still hold the logger; don't wait on them forever
    if tokio::time::timeout(std::time::Duration::from_secs(2), engine.worker)
        .await
        .is_err()
    {
        tracing::warn!("Background worker did not drain before shutdown");
    }
    Ok(())
}

async fn cmd_chat(user: String, message: Vec<String>) -> Result<()> {
    let cfg = config::load_config_from_env();
    let Engine { router, worker, .. } = build_engine(&cfg)?;

    let print_reply = |reply: &medbot_core::types::Reply| {
        println!("\n{}", reply.text);
        if !reply.quick_replies.is_empty() {
            println!("[{}]", reply.quick_replies.join(" | "));
        }
        println!();
    };

    if !message.is_empty() {
        let text = message.join(" ");
        let reply = router
            .handle_turn(&user, &text)
            .await
            .unwrap_or_else(|e| messages::for_error(&e));
        print_reply(&reply);
    } else {
        println!("medbot interactive mode (Ctrl+D to exit)\n");
        loop {
            use std::io::Write;
            print!("You: ");
            std::io::stdout().flush()?;

            let mut input = String::new();
            if std::io::stdin().read_line(&mut input)? == 0 {
                break;
            }

            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            let reply = match router.handle_turn(&user, input).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("Turn failed: {}", e);
                    messages::for_error(&e)
                }
            };
            print_reply(&reply);
        }
    }

    // Let the worker flush queued log lines
    drop(router);
    let _ = worker.await;
    Ok(())
}

fn cmd_init() -> Result<()> {
    let config_path = config::get_config_path();
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    config::save_config(&Config::default(), None)?;
    println!("Created config at {}", config_path.display());
    println!("Add a Gemini or OpenAI API key under \"providers\" to get started.");
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config_path = config::get_config_path();
    let cfg = config::load_config_from_env();

    println!("medbot Status\n");

    let check = |set: bool| if set { "✓" } else { "not set" };

    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗" }
    );
    println!("Model: {}", cfg.generation.model);
    let model = Some(cfg.generation.model.as_str());
    println!("Model API key: {}", check(cfg.get_api_key(model).is_some()));
    if let Some(base) = cfg.get_api_base(model) {
        println!("API base: {}", base);
    }
    println!("Gemini API: {}", check(!cfg.providers.gemini.api_key.is_empty()));
    println!("OpenAI API: {}", check(!cfg.providers.openai.api_key.is_empty()));
    println!(
        "LINE: {}",
        if cfg.line.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "Mail: {}",
        if cfg.mail_enabled() {
            format!("✓ {}:{}", cfg.mail.smtp_host, cfg.mail.smtp_port)
        } else {
            "not set".to_string()
        }
    );
    println!("Session idle limit: {}s", cfg.session.max_idle_secs);
    println!("Interaction log: {}", cfg.storage.interaction_log_path().display());

    Ok(())
}

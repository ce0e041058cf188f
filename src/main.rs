use anyhow::Result;
use clap::{Parser, Subcommand};
use janmitra_voice::{create_router, AppState, CallSession, Config};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "janmitra-voice")]
#[command(about = "Janmitra realtime voice assistant bridge")]
struct Cli {
    /// Configuration file (JANMITRA_* environment variables override it)
    #[arg(short, long, default_value = "config/janmitra")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control surface
    Serve {
        /// Bind address override
        #[arg(long)]
        bind: Option<String>,

        /// Port override
        #[arg(long)]
        port: Option<u16>,
    },

    /// Start one interactive call from this terminal (Ctrl+C hangs up)
    Call {
        /// Voice override for this call
        #[arg(long)]
        voice: Option<String>,
    },

    /// Run headless as a deployed agent
    Agent,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Serve { bind, port } => serve(config, bind, port).await,
        Command::Call { voice } => call(config, voice).await,
        Command::Agent => janmitra_voice::agent::run(config).await,
    }
}

/// Serve the call control API
async fn serve(mut config: Config, bind: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(bind) = bind {
        config.http.bind = bind;
    }
    if let Some(port) = port {
        config.http.port = port;
    }

    let addr = format!("{}:{}", config.http.bind, config.http.port);
    let router = create_router(AppState::new(config));

    info!("Janmitra voice bridge listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Run one call against the default devices until Ctrl+C or remote hangup
async fn call(mut config: Config, voice: Option<String>) -> Result<()> {
    if let Some(voice) = voice {
        config.live.voice = voice;
    }

    let call = Arc::new(CallSession::connect(&config).await?);
    call.start().await?;

    info!("Call {} is live; press Ctrl+C to hang up", call.call_id());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Hanging up");
        }
        () = call.wait_ended() => {
            info!("Remote side ended the call");
        }
    }

    let stats = call.stop().await?;
    info!(
        "Call over: {:.1}s on the line, {} chunks sent, {} fragments played",
        stats.duration_secs, stats.chunks_sent, stats.fragments_played
    );

    Ok(())
}

//! Headless deployment mode
//!
//! Runs the same call bridge as the HTTP surface, but as a long-lived
//! process: retry session start with backoff, run until a signal arrives or
//! the remote side closes, then tear down and log a usage summary.

use crate::call::CallSession;
use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Delay before the next session-start attempt, capped at 10 seconds
fn retry_delay_ms(attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(4);
    (1000u64 << exp).min(10_000)
}

/// Run the bridge as a deployed agent
pub async fn run(mut config: Config) -> Result<()> {
    config.validate()?;

    // The deployed persona speaks with the agent voice
    config.live.voice = config.agent.voice.clone();

    let max_attempts = config.agent.max_start_attempts.max(1);
    let mut call: Option<Arc<CallSession>> = None;

    for attempt in 1..=max_attempts {
        match try_start(&config).await {
            Ok(session) => {
                call = Some(session);
                break;
            }
            Err(e) => {
                warn!(
                    "Session start attempt {}/{} failed: {:#}",
                    attempt, max_attempts, e
                );
                if attempt < max_attempts {
                    let delay = retry_delay_ms(attempt);
                    info!("Retrying in {} ms", delay);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    let call = match call {
        Some(call) => call,
        None => anyhow::bail!("Giving up after {} session start attempts", max_attempts),
    };

    info!("Agent call {} is live; send SIGINT to end it", call.call_id());

    tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        () = call.wait_ended() => {
            info!("Session ended by the remote side");
        }
    }

    let stats = call.stop().await?;
    info!(
        "Usage summary: {:.1}s on the line, {} chunks sent, {} fragments played",
        stats.duration_secs, stats.chunks_sent, stats.fragments_played
    );

    Ok(())
}

async fn try_start(config: &Config) -> Result<Arc<CallSession>> {
    let session = Arc::new(CallSession::connect(config).await?);
    session.start().await?;
    Ok(session)
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::retry_delay_ms;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(retry_delay_ms(1), 1000);
        assert_eq!(retry_delay_ms(2), 2000);
        assert_eq!(retry_delay_ms(3), 4000);
        assert_eq!(retry_delay_ms(4), 8000);
        assert_eq!(retry_delay_ms(5), 10_000);
        assert_eq!(retry_delay_ms(50), 10_000);
    }
}

//! UDP stream monitor.
//!
//! Receives transport stream datagrams on one socket and drives a
//! [`StreamSession`] with them. Chunks are persisted as they roll over; an
//! idle stream is flushed after the configured timeout, and Ctrl-C flushes
//! the last chunk before the stream record is written.

pub mod session;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::UdpSocket;
use tokio::time::timeout;

pub use session::{Rollover, SessionConfig, StreamSession};

use crate::error::IngestError;
use crate::filename::FilenameTemplate;
use crate::output::Output;

/// Largest UDP payload.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Address to receive datagrams on.
    pub listen_addr: SocketAddr,
    /// Directory chunks and sidecars are written to.
    pub output_dir: PathBuf,
    pub filename_template: FilenameTemplate,
    /// Quiet period after which pending data is flushed.
    pub idle_timeout: Duration,
    pub session: SessionConfig,
}

/// Receive until Ctrl-C.
pub async fn run(config: MonitorConfig) -> Result<(), IngestError> {
    let socket = UdpSocket::bind(config.listen_addr).await?;
    info!("Monitoring {}", socket.local_addr()?);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    serve(socket, config, shutdown).await
}

/// Receive datagrams from `socket` until `shutdown` resolves.
pub async fn serve<F>(socket: UdpSocket, config: MonitorConfig, shutdown: F) -> Result<(), IngestError>
where
    F: std::future::Future + Unpin,
{
    let mut shutdown = shutdown;
    let mut output = Output::new(&config.output_dir, config.filename_template.clone())?;
    let mut session_count = 1u64;
    let mut session = StreamSession::new(session_count, &config.session);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut idle = false;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }

            received = timeout(config.idle_timeout, socket.recv_from(&mut buf)) => {
                match received {
                    Ok(Ok((len, peer))) => {
                        if idle {
                            info!("[Session {}] Stream resumed from {}", session.id(), peer);
                            idle = false;
                        }
                        match session.push(&buf[..len]) {
                            Ok(rollover) => persist(&mut output, rollover)?,
                            Err(IngestError::Demux(e)) => {
                                error!("[Session {}] Stream unreadable: {}", session.id(), e);
                                persist(&mut output, session.flush()?)?;
                                session_count += 1;
                                session = StreamSession::new(session_count, &config.session);
                                info!("[Session {}] Started", session.id());
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Ok(Err(e)) => warn!("Receive failed: {}", e),
                    Err(_) => {
                        if !idle {
                            info!(
                                "[Session {}] No data for {:?}, flushing",
                                session.id(),
                                config.idle_timeout
                            );
                            persist(&mut output, session.flush()?)?;
                            idle = true;
                        }
                    }
                }
            }
        }
    }

    persist(&mut output, session.flush()?)?;
    output.finish()?;
    info!("Stream ended after {} session(s), {} chunk(s)", session_count, output.record().chunks());
    Ok(())
}

fn persist(output: &mut Output, rollover: Option<Rollover>) -> Result<(), IngestError> {
    if let Some(Rollover { file, attributes }) = rollover {
        output.persist(file, &attributes)?;
    }
    Ok(())
}

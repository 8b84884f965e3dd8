// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Per-process output capture.
//! Two pumps (stdout, stderr) feed one channel; the consuming task is the
//! only writer to the record's console buffer.

use crate::domain::ReadinessMarker;
use crate::record::ProcessRecord;
use crate::store::ConfigStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

const LINE_CHANNEL_CAPACITY: usize = 256;
/// How long to wait for the child to exit once its output has closed.
const EXIT_WAIT: Duration = Duration::from_secs(2);
const EXIT_POLL: Duration = Duration::from_millis(50);

pub(crate) struct OutputReaderTask {
    record: Arc<ProcessRecord>,
    store: Arc<ConfigStore>,
    marker: ReadinessMarker,
    generation: u64,
}

impl OutputReaderTask {
    pub(crate) fn new(
        record: Arc<ProcessRecord>,
        store: Arc<ConfigStore>,
        marker: ReadinessMarker,
        generation: u64,
    ) -> Self {
        Self {
            record,
            store,
            marker,
            generation,
        }
    }

    pub(crate) fn spawn<O, E>(self, stdout: Option<O>, stderr: Option<E>) -> JoinHandle<()>
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let server = self.record.name().to_string();
        if let Some(stdout) = stdout {
            tokio::spawn(pump(stdout, "stdout", server.clone(), tx.clone()));
        }
        if let Some(stderr) = stderr {
            tokio::spawn(pump(stderr, "stderr", server, tx.clone()));
        }
        drop(tx);
        tokio::spawn(self.run(rx))
    }

    async fn run(self, mut rx: mpsc::Receiver<String>) {
        debug!(server = %self.record.name(), generation = self.generation, "output reader started");

        while let Some(line) = rx.recv().await {
            let ready = self.marker.matches(&line);
            self.record.append_output(line);
            if ready && self.record.mark_running(self.generation) {
                info!(server = %self.record.name(), "server is ready");
                self.record.persist(&self.store);
            }
        }

        debug!(server = %self.record.name(), "output streams closed");
        self.reap().await;
    }

    /// After the streams close: reap the child of this generation if it has
    /// exited, waiting up to `EXIT_WAIT`. A child that keeps running with
    /// closed output is left to the liveness poller.
    async fn reap(&self) {
        let deadline = Instant::now() + EXIT_WAIT;
        loop {
            {
                let mut guard = self.record.handle().lock().await;
                let Some(handle) = guard.as_mut().filter(|h| h.generation == self.generation)
                else {
                    // Taken by stop() or an earlier reap.
                    return;
                };
                match handle.child.try_wait() {
                    Ok(Some(status)) => {
                        let pid = handle.pid;
                        guard.take();
                        drop(guard);
                        info!(server = %self.record.name(), pid, %status, "server process exited");
                        if self.record.mark_exited(self.generation) {
                            self.record.persist(&self.store);
                        }
                        return;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(server = %self.record.name(), error = %e, "failed to poll child after output closed");
                        return;
                    }
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    server = %self.record.name(),
                    "output closed but process is still running, leaving it to the liveness poller"
                );
                return;
            }
            sleep(EXIT_POLL).await;
        }
    }
}

async fn pump<R>(reader: R, stream: &'static str, server: String, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end();
                if line.is_empty() {
                    continue;
                }
                if tx.send(line.to_string()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(server = %server, stream, error = %e, "output read failed");
                break;
            }
        }
    }
}

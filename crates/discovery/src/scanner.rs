//! Brute-force LAN sweep for relay servers.
//!
//! There is no multicast protocol to lean on, so the scanner walks one or
//! more `/24` subnets, probing each host's candidate ports with short
//! timeouts. Concurrency is capped by a semaphore and the whole sweep is
//! scoped to one cancellation token so a stop request aborts every
//! in-flight probe.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::probe::probe_host;
use crate::subnet::{guess_subnet_prefixes, merge_prefixes};
use crate::types::{DiscoveredServer, QUICK_SCAN_PREFIXES, ScanConfig, ScanEvent};

/// Sweeps local subnets for relay servers.
///
/// One scan runs at a time; starting a new one cancels the previous run.
/// Results, progress, and the scanning flag are shared snapshots so any
/// number of UI surfaces can observe one scanner.
pub struct Scanner {
    http: reqwest::Client,
    servers: Arc<StdRwLock<Vec<DiscoveredServer>>>,
    scanning: Arc<AtomicBool>,
    progress_tx: Arc<watch::Sender<f32>>,
    progress_rx: watch::Receiver<f32>,
    events_tx: mpsc::Sender<ScanEvent>,
    events_rx: StdMutex<Option<mpsc::Receiver<ScanEvent>>>,
    cancel: StdMutex<Option<CancellationToken>>,
    run_lock: tokio::sync::Mutex<()>,
}

impl Scanner {
    pub fn new() -> Self {
        let (progress_tx, progress_rx) = watch::channel(0.0);
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            http: reqwest::Client::new(),
            servers: Arc::new(StdRwLock::new(Vec::new())),
            scanning: Arc::new(AtomicBool::new(false)),
            progress_tx: Arc::new(progress_tx),
            progress_rx,
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            cancel: StdMutex::new(None),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ScanEvent>> {
        self.events_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Servers found so far (accumulated across append-mode scans).
    pub fn servers(&self) -> Vec<DiscoveredServer> {
        self.servers.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    /// Current progress percentage, 0.0–100.0.
    pub fn progress(&self) -> f32 {
        *self.progress_rx.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.progress_rx.clone()
    }

    /// Aborts the scan in flight, if any. In-flight probes observe the
    /// cancellation token and stop without reporting further results;
    /// progress stays frozen at its last value.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.cancel.lock()
            && let Some(token) = guard.take()
        {
            info!("stopping scan");
            token.cancel();
        }
    }

    /// Sweeps the guessed local subnet plus common home-router subnets in
    /// one append-mode pass.
    pub async fn quick_scan(&self) -> Vec<DiscoveredServer> {
        let config = ScanConfig {
            prefixes: merge_prefixes(guess_subnet_prefixes(), &QUICK_SCAN_PREFIXES),
            append: true,
            ..Default::default()
        };
        self.scan(config).await
    }

    /// Runs one sweep and returns the result list (including prior results
    /// when `config.append` is set).
    ///
    /// Finding no server is not an error; the list is simply empty.
    pub async fn scan(&self, mut config: ScanConfig) -> Vec<DiscoveredServer> {
        // Starting over cancels whatever was running before we take the
        // run lock, so the previous sweep unwinds promptly.
        let token = CancellationToken::new();
        {
            let Ok(mut guard) = self.cancel.lock() else {
                return self.servers();
            };
            if let Some(previous) = guard.replace(token.clone()) {
                previous.cancel();
            }
        }
        let _run = self.run_lock.lock().await;

        if config.prefixes.is_empty() {
            config.prefixes = guess_subnet_prefixes();
        }
        let total = config.total_hosts();
        if total == 0 || config.ports.is_empty() {
            return self.servers();
        }

        if !config.append
            && let Ok(mut servers) = self.servers.write()
        {
            servers.clear();
        }
        self.scanning.store(true, Ordering::Relaxed);
        self.progress_tx.send_replace(0.0);

        info!(
            prefixes = ?config.prefixes,
            hosts = total,
            concurrency = config.concurrency,
            "scan started"
        );

        let scanned = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let ports = Arc::new(config.ports.clone());
        let mut tasks = JoinSet::new();

        for prefix in &config.prefixes {
            for host in config.host_start..=config.host_end {
                let ip = format!("{prefix}.{host}");
                let http = self.http.clone();
                let servers = self.servers.clone();
                let scanned = scanned.clone();
                let progress_tx = self.progress_tx.clone();
                let events_tx = self.events_tx.clone();
                let semaphore = semaphore.clone();
                let ports = ports.clone();
                let token = token.clone();
                let timeout = config.probe_timeout;

                tasks.spawn(async move {
                    let _permit = tokio::select! {
                        _ = token.cancelled() => return,
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(p) => p,
                            Err(_) => return,
                        },
                    };

                    let found = tokio::select! {
                        _ = token.cancelled() => return,
                        found = probe_host(&http, &ip, &ports, timeout) => found,
                    };

                    if let Some(server) = found {
                        let inserted = match servers.write() {
                            Ok(mut list) => {
                                if list.iter().any(|s| s.endpoint() == server.endpoint()) {
                                    false
                                } else {
                                    list.push(server.clone());
                                    true
                                }
                            }
                            Err(_) => false,
                        };
                        if inserted {
                            let _ = events_tx.try_send(ScanEvent::ServerFound(server));
                        }
                    }

                    // Progress only moves forward: a slower task reporting
                    // a smaller percentage after a faster one is ignored.
                    let done = scanned.fetch_add(1, Ordering::Relaxed) + 1;
                    let percent = done as f32 / total as f32 * 100.0;
                    progress_tx.send_if_modified(|current| {
                        if percent > *current {
                            *current = percent;
                            true
                        } else {
                            false
                        }
                    });
                });
            }
        }

        while tasks.join_next().await.is_some() {}

        self.scanning.store(false, Ordering::Relaxed);
        if token.is_cancelled() {
            debug!(
                scanned = scanned.load(Ordering::Relaxed),
                total, "scan cancelled"
            );
            let _ = self.events_tx.try_send(ScanEvent::Cancelled);
        } else {
            self.progress_tx.send_replace(100.0);
            let found = self.servers().len();
            info!(found, "scan complete");
            let _ = self.events_tx.try_send(ScanEvent::Completed { found });
            // Drop our token so a later stop() is a no-op. A newer scan
            // would have cancelled ours before replacing it, so an
            // uncancelled stored token here is still our own.
            if let Ok(mut guard) = self.cancel.lock()
                && guard.as_ref().is_some_and(|t| !t.is_cancelled())
            {
                guard.take();
            }
        }

        self.servers()
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

//! Certificate file watcher for hot reload.
//!
//! Watches the directories holding the certificate and key, so that
//! rotations by rename (as done by most ACME clients) are seen too.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::TlsConfig;

/// Watches the TLS files and signals when they change.
pub struct CertWatcher {
    dirs: BTreeSet<PathBuf>,
    names: Vec<OsString>,
    reload_tx: mpsc::UnboundedSender<()>,
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl CertWatcher {
    /// Create a watcher for the configured certificate and key.
    ///
    /// Returns the watcher and a receiver that yields once per change.
    pub fn new(config: &TlsConfig) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();
        let paths = [&config.cert_path, &config.key_path];

        let watcher = Self {
            dirs: paths.iter().map(|p| parent_dir(p)).collect(),
            names: paths
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
                .collect(),
            reload_tx,
        };
        (watcher, reload_rx)
    }

    /// Start watching in notify's background thread.
    ///
    /// The returned handle must be kept alive for the watch to continue.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.reload_tx.clone();
        let names = self.names.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_relevant(&event, &names) {
                        tracing::info!(paths = ?event.paths, "Certificate change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Certificate watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for dir in &self.dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(dirs = ?self.dirs, "Certificate watcher started");
        Ok(watcher)
    }
}

/// A create/modify/rename event touching one of the watched file names.
pub fn is_relevant(event: &Event, names: &[OsString]) -> bool {
    let kind_matches = event.kind.is_modify() || event.kind.is_create();
    kind_matches
        && event
            .paths
            .iter()
            .filter_map(|p| p.file_name())
            .any(|name| names.iter().any(|n| n == name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, ModifyKind};

    fn names() -> Vec<OsString> {
        vec!["mirror.crt".into(), "mirror.key".into()]
    }

    #[test]
    fn relevant_events() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/mirror/certs/mirror.crt"));
        assert!(is_relevant(&event, &names()));

        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/mirror/certs/mirror.key"));
        assert!(is_relevant(&event, &names()));
    }

    #[test]
    fn unrelated_files_and_reads_are_ignored() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/mirror/certs/other.pem"));
        assert!(!is_relevant(&event, &names()));

        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/etc/mirror/certs/mirror.crt"));
        assert!(!is_relevant(&event, &names()));
    }

    #[test]
    fn bare_file_names_watch_the_working_directory() {
        let config = TlsConfig {
            cert_path: PathBuf::from("mirror.crt"),
            key_path: PathBuf::from("keys/mirror.key"),
            ..TlsConfig::default()
        };
        let (watcher, _rx) = CertWatcher::new(&config);
        assert!(watcher.dirs.contains(Path::new(".")));
        assert!(watcher.dirs.contains(Path::new("keys")));
    }
}

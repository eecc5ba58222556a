//! Sonic Pi session
//!
//! Ties discovery, the OSC client, application control and the shared
//! parameter store together into the operations exposed as tools.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::config::{sonic_pi::STARTUP_POLL_INTERVAL, Config};
use crate::error::{MusicboxError, Result, SonicPiError};
use crate::sonic_pi::client::{set_variable_code, SonicPiClient};
use crate::sonic_pi::discovery::{self, ConnectionParams};
use crate::sonic_pi::process::AppController;
use crate::sonic_pi::state::{SharedState, SharedStateStore};

/// Outcome of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A stop message was sent
    Stopped,
    /// Sonic Pi is not running, nothing to stop
    NotRunning,
}

/// Snapshot of everything relevant to connection problems
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub running: bool,
    pub connected: bool,
    pub host: String,
    pub configured: Option<ConnectionParams>,
    pub parsed: std::result::Result<ConnectionParams, String>,
    pub log_path: PathBuf,
    pub log_exists: bool,
    pub state_path: PathBuf,
    pub state_exists: bool,
    pub app_path: PathBuf,
    pub app_exists: bool,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sonic Pi Running: {}", self.running)?;
        writeln!(f, "Client Connected: {}", self.connected)?;
        writeln!(f, "Host: {}", self.host)?;
        match &self.configured {
            Some(p) => {
                writeln!(f, "Configured GUI Port: {}", p.gui_port)?;
                writeln!(f, "Configured OSC Port: {}", p.osc_port)?;
                writeln!(f, "Configured Token: {}", p.token)?;
            }
            None => writeln!(f, "Configured: none")?,
        }
        match &self.parsed {
            Ok(p) => {
                writeln!(f, "Parsed GUI Port: {}", p.gui_port)?;
                writeln!(f, "Parsed OSC Port: {}", p.osc_port)?;
                writeln!(f, "Parsed Token: {}", p.token)?;
            }
            Err(e) => writeln!(f, "Parse Error: {}", e)?,
        }
        writeln!(f, "Log file: {} (exists: {})", self.log_path.display(), self.log_exists)?;
        writeln!(
            f,
            "Shared state file: {} (exists: {})",
            self.state_path.display(),
            self.state_exists
        )?;
        write!(f, "Application: {} (exists: {})", self.app_path.display(), self.app_exists)
    }
}

/// Sonic Pi session
pub struct Session {
    client: Arc<SonicPiClient>,
    controller: Arc<dyn AppController>,
    store: SharedStateStore,
    log_path: PathBuf,
    startup_timeout: Duration,
    settle_delay: Duration,
}

impl Session {
    /// Create a session from configuration
    pub fn new(
        config: &Config,
        client: Arc<SonicPiClient>,
        controller: Arc<dyn AppController>,
    ) -> Self {
        Self {
            client,
            controller,
            store: SharedStateStore::new(config.state_path.clone()),
            log_path: config.log_path.clone(),
            startup_timeout: config.startup_timeout,
            settle_delay: config.settle_delay,
        }
    }

    pub fn client(&self) -> &Arc<SonicPiClient> {
        &self.client
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    pub async fn is_running(&self) -> bool {
        self.controller.is_running().await
    }

    /// Start Sonic Pi if needed, then connect
    pub async fn initialize(&self) -> Result<ConnectionParams> {
        if !self.controller.is_running().await {
            self.controller.launch().await?;
            self.wait_until_running().await?;
        }

        self.connect().await
    }

    /// Connect to an already running Sonic Pi
    pub async fn reconnect(&self) -> Result<ConnectionParams> {
        self.require_running().await?;
        self.connect().await
    }

    /// Evaluate code in Sonic Pi
    pub async fn play(&self, code: &str) -> Result<()> {
        self.require_running().await?;
        self.ensure_connected().await?;
        self.client.run_code(code).await
    }

    /// Stop every running job
    pub async fn stop(&self) -> Result<StopOutcome> {
        if !self.controller.is_running().await {
            return Ok(StopOutcome::NotRunning);
        }

        self.ensure_connected().await?;
        self.client.stop_all_jobs().await?;
        Ok(StopOutcome::Stopped)
    }

    /// Send each parameter to Sonic Pi and record it in the store
    ///
    /// Returns the parameters that were applied. Not transactional: when a
    /// send fails midway, the parameters sent so far are still persisted.
    pub async fn change_mix(&self, parameters: &Map<String, Value>) -> Result<Vec<(String, Value)>> {
        // Reject bad input before anything reaches Sonic Pi
        for (name, value) in parameters {
            set_variable_code(name, value)?;
        }

        self.require_running().await?;
        self.ensure_connected().await?;

        let mut state = self.store.load().await?;
        let mut applied = Vec::with_capacity(parameters.len());

        for (name, value) in parameters {
            if let Err(e) = self.client.set_variable(name, value).await {
                tracing::warn!(
                    "Mix update failed after {} of {} parameters: {}",
                    applied.len(),
                    parameters.len(),
                    e
                );
                let mut message = e.to_string();
                if !applied.is_empty() {
                    if let Err(save_err) = self.store.save(&state).await {
                        tracing::warn!("Failed to record partial mix update: {}", save_err);
                        message = format!("{}; applied parameters not recorded: {}", message, save_err);
                    }
                }
                return Err(MusicboxError::SonicPi(SonicPiError::PartialUpdate {
                    applied: applied.len(),
                    total: parameters.len(),
                    message,
                }));
            }

            state.insert(name.clone(), value.clone());
            applied.push((name.clone(), value.clone()));
        }

        self.store.save(&state).await?;
        Ok(applied)
    }

    /// Current contents of the shared parameter store
    pub async fn read_state(&self) -> Result<SharedState> {
        self.store.load().await
    }

    /// Collect connection diagnostics
    pub async fn diagnostics(&self) -> Diagnostics {
        let configured = self.client.connection().await;
        Diagnostics {
            running: self.controller.is_running().await,
            connected: configured.is_some(),
            host: self.client.host().to_string(),
            configured,
            parsed: discovery::discover(&self.log_path)
                .await
                .map_err(|e| e.to_string()),
            log_path: self.log_path.clone(),
            log_exists: self.log_path.exists(),
            state_path: self.store.path().to_path_buf(),
            state_exists: self.store.exists(),
            app_path: self.controller.app_path().to_path_buf(),
            app_exists: self.controller.app_path().exists(),
        }
    }

    async fn connect(&self) -> Result<ConnectionParams> {
        let params = discovery::discover(&self.log_path).await?;
        self.client.configure(params).await;
        Ok(params)
    }

    async fn ensure_connected(&self) -> Result<()> {
        if !self.client.is_configured().await {
            tracing::info!("Not connected yet, connecting to Sonic Pi");
            self.connect().await?;
        }
        Ok(())
    }

    async fn require_running(&self) -> Result<()> {
        if self.controller.is_running().await {
            Ok(())
        } else {
            Err(MusicboxError::SonicPi(SonicPiError::NotRunning))
        }
    }

    async fn wait_until_running(&self) -> Result<()> {
        let deadline = Instant::now() + self.startup_timeout;

        loop {
            if self.controller.is_running().await {
                tracing::info!("Sonic Pi is up, waiting {:?} for it to settle", self.settle_delay);
                tokio::time::sleep(self.settle_delay).await;
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(MusicboxError::SonicPi(SonicPiError::StartupTimeout {
                    timeout_secs: self.startup_timeout.as_secs(),
                }));
            }

            tokio::time::sleep(STARTUP_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sonic_pi::transport::OscTransport;
    use async_trait::async_trait;
    use rosc::{OscPacket, OscType};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const LOG: &str = "Setting up OSC sender to Spider on port 4557\n\
                       Setting up OSC sender to Tau on port 4560\n\
                       daemon_stdout: 987654321\n";

    /// Records packets; fails every send after `fail_after` successes
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<OscPacket>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl OscTransport for Recorder {
        async fn send(&self, _target: SocketAddr, packet: &OscPacket) -> Result<()> {
            let mut sent = self.sent.lock().unwrap();
            if self.fail_after.is_some_and(|n| sent.len() >= n) {
                return Err(MusicboxError::SonicPi(SonicPiError::SendFailed {
                    target: "test".to_string(),
                    message: "connection refused".to_string(),
                }));
            }
            sent.push(packet.clone());
            Ok(())
        }
    }

    struct FakeApp {
        running: AtomicBool,
        starts_on_launch: bool,
        launches: AtomicUsize,
        path: PathBuf,
    }

    impl FakeApp {
        fn new(running: bool, starts_on_launch: bool) -> Self {
            Self {
                running: AtomicBool::new(running),
                starts_on_launch,
                launches: AtomicUsize::new(0),
                path: PathBuf::from("/Applications/Sonic Pi.app"),
            }
        }
    }

    #[async_trait]
    impl AppController for FakeApp {
        async fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        async fn launch(&self) -> Result<()> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if self.starts_on_launch {
                self.running.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        fn app_path(&self) -> &Path {
            &self.path
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        session: Session,
        recorder: Arc<Recorder>,
        app: Arc<FakeApp>,
    }

    fn fixture(app: FakeApp, recorder: Recorder, log: Option<&str>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("gui.log");
        if let Some(log) = log {
            std::fs::write(&log_path, log).unwrap();
        }
        let state_path = dir.path().join("shared_state.json");
        let config = Config::from_lookup(dir.path(), |key| match key {
            "SONIC_PI_LOG_PATH" => Some(log_path.display().to_string()),
            "MUSICBOX_STATE_PATH" => Some(state_path.display().to_string()),
            "SONIC_PI_STARTUP_TIMEOUT_SECS" | "SONIC_PI_SETTLE_SECS" => Some("0".to_string()),
            _ => None,
        })
        .unwrap();

        let recorder = Arc::new(recorder);
        let app = Arc::new(app);
        let client = Arc::new(SonicPiClient::new(config.host, recorder.clone()));
        let session = Session::new(&config, client, app.clone());
        Fixture {
            _dir: dir,
            session,
            recorder,
            app,
        }
    }

    fn code_of(packet: &OscPacket) -> String {
        match packet {
            OscPacket::Message(msg) => match &msg.args[1] {
                OscType::String(code) => code.clone(),
                other => panic!("unexpected arg: {:?}", other),
            },
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_initialize_launches_when_not_running() {
        let f = fixture(FakeApp::new(false, true), Recorder::default(), Some(LOG));
        let params = f.session.initialize().await.unwrap();
        assert_eq!(params.gui_port, 4557);
        assert_eq!(f.app.launches.load(Ordering::SeqCst), 1);
        assert!(f.session.client().is_configured().await);
    }

    #[tokio::test]
    async fn test_initialize_skips_launch_when_running() {
        let f = fixture(FakeApp::new(true, true), Recorder::default(), Some(LOG));
        f.session.initialize().await.unwrap();
        assert_eq!(f.app.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initialize_times_out() {
        let f = fixture(FakeApp::new(false, false), Recorder::default(), Some(LOG));
        let err = f.session.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            MusicboxError::SonicPi(SonicPiError::StartupTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_reconnect_requires_running() {
        let f = fixture(FakeApp::new(false, true), Recorder::default(), Some(LOG));
        let err = f.session.reconnect().await.unwrap_err();
        assert!(matches!(err, MusicboxError::SonicPi(SonicPiError::NotRunning)));
        assert_eq!(f.app.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_play_connects_lazily() {
        let f = fixture(FakeApp::new(true, true), Recorder::default(), Some(LOG));
        f.session.play("play 60").await.unwrap();
        let sent = f.recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(code_of(&sent[0]), "play 60");
    }

    #[tokio::test]
    async fn test_play_without_log_fails() {
        let f = fixture(FakeApp::new(true, true), Recorder::default(), None);
        let err = f.session.play("play 60").await.unwrap_err();
        assert!(matches!(err, MusicboxError::Discovery(_)));
    }

    #[tokio::test]
    async fn test_stop_sends_one_message_per_call() {
        let f = fixture(FakeApp::new(true, true), Recorder::default(), Some(LOG));
        assert_eq!(f.session.stop().await.unwrap(), StopOutcome::Stopped);
        assert_eq!(f.session.stop().await.unwrap(), StopOutcome::Stopped);
        assert_eq!(f.recorder.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let f = fixture(FakeApp::new(false, true), Recorder::default(), Some(LOG));
        assert_eq!(f.session.stop().await.unwrap(), StopOutcome::NotRunning);
        assert!(f.recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_mix_sends_and_persists() {
        let f = fixture(FakeApp::new(true, true), Recorder::default(), Some(LOG));
        let params = json!({"vol": 0.5, "reverb_on": true});
        let applied = f
            .session
            .change_mix(params.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(applied.len(), 2);

        let codes: Vec<String> = f.recorder.sent.lock().unwrap().iter().map(code_of).collect();
        assert_eq!(codes, vec!["set :vol, 0.5", "set :reverb_on, 1"]);

        let state = f.session.read_state().await.unwrap();
        assert_eq!(state.get("vol"), Some(&json!(0.5)));
        assert_eq!(state.get("reverb_on"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_change_mix_merges_with_existing_state() {
        let f = fixture(FakeApp::new(true, true), Recorder::default(), Some(LOG));
        let mut existing = SharedState::new();
        existing.insert("lpf_cutoff".to_string(), json!(90));
        f.session.store().save(&existing).await.unwrap();

        let params = json!({"vol": 0.7});
        f.session.change_mix(params.as_object().unwrap()).await.unwrap();

        let state = f.session.read_state().await.unwrap();
        assert_eq!(state.get("lpf_cutoff"), Some(&json!(90)));
        assert_eq!(state.get("vol"), Some(&json!(0.7)));
    }

    #[tokio::test]
    async fn test_change_mix_partial_failure_keeps_applied() {
        let recorder = Recorder {
            fail_after: Some(1),
            ..Default::default()
        };
        let f = fixture(FakeApp::new(true, true), recorder, Some(LOG));
        let params = json!({"vol": 0.5, "delay_mix": 0.3});
        let err = f
            .session
            .change_mix(params.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MusicboxError::SonicPi(SonicPiError::PartialUpdate {
                applied: 1,
                total: 2,
                ..
            })
        ));

        let state = f.session.read_state().await.unwrap();
        assert_eq!(state.get("vol"), Some(&json!(0.5)));
        assert!(state.get("delay_mix").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_change_mix_partial_failure_reports_unrecorded_state() {
        let recorder = Recorder {
            fail_after: Some(1),
            ..Default::default()
        };
        let f = fixture(FakeApp::new(true, true), recorder, Some(LOG));

        // Dangling link: loads as empty, writes fail
        let state_path = f.session.store().path().to_path_buf();
        let target = f._dir.path().join("gone").join("shared_state.json");
        std::os::unix::fs::symlink(&target, &state_path).unwrap();

        let params = json!({"vol": 0.5, "delay_mix": 0.3});
        let err = f
            .session
            .change_mix(params.as_object().unwrap())
            .await
            .unwrap_err();
        match err {
            MusicboxError::SonicPi(SonicPiError::PartialUpdate {
                applied,
                total,
                message,
            }) => {
                assert_eq!((applied, total), (1, 2));
                assert!(message.contains("connection refused"), "{}", message);
                assert!(message.contains("not recorded"), "{}", message);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_change_mix_rejects_before_sending() {
        let f = fixture(FakeApp::new(true, true), Recorder::default(), Some(LOG));
        let params = json!({"vol": 0.5, "fx": {"nested": 1}});
        let err = f
            .session
            .change_mix(params.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, MusicboxError::Validation(_)));
        assert!(f.recorder.sent.lock().unwrap().is_empty());
        assert!(!f.session.store().exists());
    }

    #[tokio::test]
    async fn test_diagnostics_report() {
        let f = fixture(FakeApp::new(true, true), Recorder::default(), Some(LOG));
        f.session.reconnect().await.unwrap();
        let report = f.session.diagnostics().await.to_string();
        assert!(report.contains("Sonic Pi Running: true"));
        assert!(report.contains("Client Connected: true"));
        assert!(report.contains("Parsed Token: 987654321"));
        assert!(report.contains("Shared state file:"));
    }
}

//! Background minting.
//!
//! A [`Minter`] owns one worker thread and a bounded job queue. Requests run
//! one at a time in submission order; each returns a [`MintHandle`] that can be
//! waited on synchronously or from async code, or cancelled.
use super::{PowRegistry, PowService, PowVersion, ProofOfWork};
use crate::error::Error;
use crate::work::{StopCheck, StopFlag, StopReason};
use derive_builder::Builder;
use flume::{Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

type MintResult = Result<ProofOfWork, Error>;

#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(pattern = "owned")]
pub struct MinterConfig {
    /// Requests that may wait behind the one being minted.
    #[builder(default = "16")]
    pub queue_capacity: usize,
    /// Upper bound on a single mint, counted from when it starts running.
    #[builder(default)]
    pub mint_timeout: Option<Duration>,
}

impl MinterConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig("queue_capacity must be >= 1".into()));
        }
        if self.mint_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig("mint_timeout must be > 0".into()));
        }
        Ok(())
    }
}

impl MinterConfigBuilder {
    pub fn build_validated(self) -> Result<MinterConfig, Error> {
        let config = self
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for MinterConfig {
    fn default() -> Self {
        MinterConfig {
            queue_capacity: 16,
            mint_timeout: None,
        }
    }
}

struct MintJob {
    service: Arc<dyn PowService>,
    payload: Vec<u8>,
    challenge: Vec<u8>,
    difficulty: f64,
    cancel: Arc<StopFlag>,
    reply: Sender<MintResult>,
}

/// Asynchronous front end over a [`PowRegistry`].
#[derive(Debug)]
pub struct Minter {
    registry: Arc<PowRegistry>,
    jobs: Option<Sender<MintJob>>,
    shutdown: Arc<StopFlag>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Minter {
    pub fn spawn(registry: Arc<PowRegistry>, config: MinterConfig) -> Result<Self, Error> {
        config.validate()?;
        let (tx, rx) = flume::bounded(config.queue_capacity);
        let shutdown = Arc::new(StopFlag::new());
        let worker_shutdown = shutdown.clone();
        let timeout = config.mint_timeout;
        let worker = thread::Builder::new()
            .name("pow-minter".into())
            .spawn(move || worker_loop(rx, worker_shutdown, timeout))
            .map_err(|e| Error::SolverFailed(format!("failed to start minter thread: {e}")))?;
        Ok(Minter {
            registry,
            jobs: Some(tx),
            shutdown,
            worker: Some(worker),
        })
    }

    pub fn registry(&self) -> &PowRegistry {
        &self.registry
    }

    /// Queue a mint. Blocks while the queue is full.
    pub fn mint(
        &self,
        version: PowVersion,
        payload: &[u8],
        challenge: &[u8],
        difficulty: f64,
    ) -> Result<MintHandle, Error> {
        let service = self.registry.get(version)?.clone();
        let jobs = self.jobs.as_ref().ok_or(Error::ChannelClosed)?;
        let (reply, result) = flume::bounded(1);
        let cancel = Arc::new(StopFlag::new());
        jobs.send(MintJob {
            service,
            payload: payload.to_vec(),
            challenge: challenge.to_vec(),
            difficulty,
            cancel: cancel.clone(),
            reply,
        })
        .map_err(|_| Error::ChannelClosed)?;
        Ok(MintHandle { result, cancel })
    }

    pub fn verify(&self, pow: &ProofOfWork) -> bool {
        self.registry.verify(pow)
    }

    /// Cancel the running mint, fail everything still queued and join the worker.
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        self.shutdown.force_stop();
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("minter thread panicked");
            }
        }
    }
}

impl Drop for Minter {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Pending result of [`Minter::mint`]. Dropping it cancels the mint.
#[derive(Debug)]
pub struct MintHandle {
    result: Receiver<MintResult>,
    cancel: Arc<StopFlag>,
}

impl MintHandle {
    pub fn cancel(&self) {
        self.cancel.force_stop();
    }

    pub fn wait(self) -> MintResult {
        self.result.recv().map_err(|_| Error::ChannelClosed)?
    }

    pub async fn wait_async(self) -> MintResult {
        self.result
            .recv_async()
            .await
            .map_err(|_| Error::ChannelClosed)?
    }

    /// `None` if the mint is still running after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<MintResult> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(Error::ChannelClosed)),
        }
    }
}

impl Drop for MintHandle {
    fn drop(&mut self) {
        self.cancel.force_stop();
    }
}

fn worker_loop(jobs: Receiver<MintJob>, shutdown: Arc<StopFlag>, timeout: Option<Duration>) {
    while let Ok(job) = jobs.recv() {
        let result = if shutdown.should_stop() || job.cancel.should_stop() {
            Err(Error::Cancelled)
        } else {
            panic::catch_unwind(AssertUnwindSafe(|| run_job(&job, &shutdown, timeout)))
                .unwrap_or_else(|_| Err(Error::SolverFailed("mint panicked".into())))
        };
        match &result {
            Err(Error::Cancelled) => debug!(version = ?job.service.version(), "mint cancelled"),
            Err(err) => warn!(%err, version = ?job.service.version(), "mint failed"),
            Ok(_) => {}
        }
        let _ = job.reply.send(result);
    }
}

fn run_job(job: &MintJob, shutdown: &StopFlag, timeout: Option<Duration>) -> MintResult {
    let check = StopCheck::new(vec![job.cancel.as_ref(), shutdown], timeout);
    let result = job.service.mint_until(
        &job.payload,
        &job.challenge,
        job.difficulty,
        &|| check.reason().is_some(),
    );
    match result {
        Err(Error::Cancelled) if check.reason() == Some(StopReason::TimedOut) => {
            Err(Error::Timeout)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{EquihashServiceBuilder, HashCashService};
    use std::sync::Mutex;
    use std::time::Instant;

    const UNREACHABLE_DIFFICULTY: f64 = 1.0e60;

    fn small_registry() -> Arc<PowRegistry> {
        let mut registry = PowRegistry::new();
        registry.register(Arc::new(HashCashService));
        registry.register(Arc::new(
            EquihashServiceBuilder::default()
                .n(30)
                .k(2)
                .build_validated()
                .expect("small equihash service"),
        ));
        Arc::new(registry)
    }

    fn spawn(config: MinterConfig) -> Minter {
        Minter::spawn(small_registry(), config).expect("spawn minter")
    }

    #[derive(Debug)]
    struct PanickingService;

    impl PowService for PanickingService {
        fn version(&self) -> PowVersion {
            PowVersion::HashCash
        }

        fn mint_until(
            &self,
            _payload: &[u8],
            _challenge: &[u8],
            _difficulty: f64,
            _should_stop: &dyn Fn() -> bool,
        ) -> MintResult {
            panic!("boom")
        }

        fn verify(&self, _pow: &ProofOfWork) -> bool {
            false
        }
    }

    #[derive(Debug, Default)]
    struct RecordingService {
        seen: Mutex<Vec<Vec<u8>>>,
    }

    impl PowService for RecordingService {
        fn version(&self) -> PowVersion {
            PowVersion::HashCash
        }

        fn mint_until(
            &self,
            payload: &[u8],
            challenge: &[u8],
            difficulty: f64,
            should_stop: &dyn Fn() -> bool,
        ) -> MintResult {
            self.seen.lock().expect("lock").push(payload.to_vec());
            HashCashService.mint_until(payload, challenge, difficulty, should_stop)
        }

        fn verify(&self, pow: &ProofOfWork) -> bool {
            HashCashService.verify(pow)
        }
    }

    #[test]
    fn config_defaults_and_validation() {
        let config = MinterConfigBuilder::default()
            .build_validated()
            .expect("defaults are valid");
        assert_eq!(config, MinterConfig::default());
        assert!(matches!(
            MinterConfigBuilder::default().queue_capacity(0).build_validated(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            MinterConfigBuilder::default()
                .mint_timeout(Some(Duration::ZERO))
                .build_validated(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn mints_and_verifies_both_versions() {
        let minter = spawn(MinterConfig::default());
        let hashcash = minter
            .mint(PowVersion::HashCash, b"payload", b"challenge", 64.0)
            .expect("queued")
            .wait()
            .expect("minted");
        let equihash = minter
            .mint(PowVersion::Equihash, b"payload", b"challenge", 1.0)
            .expect("queued")
            .wait()
            .expect("minted");
        assert!(minter.verify(&hashcash));
        assert!(minter.verify(&equihash));
        minter.shutdown();
    }

    #[test]
    fn queued_requests_run_in_order() {
        let recorder = Arc::new(RecordingService::default());
        let mut registry = PowRegistry::new();
        registry.register(recorder.clone());
        let minter = Minter::spawn(Arc::new(registry), MinterConfig::default()).expect("spawn");

        let handles: Vec<_> = (0u8..4)
            .map(|i| {
                minter
                    .mint(PowVersion::HashCash, &[i], b"challenge", 4.0)
                    .expect("queued")
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let pow = handle.wait().expect("minted");
            assert_eq!(pow.payload, vec![i as u8]);
        }
        assert_eq!(
            *recorder.seen.lock().expect("lock"),
            vec![vec![0], vec![1], vec![2], vec![3]]
        );
    }

    #[test]
    fn unknown_version_is_rejected_up_front() {
        let minter = Minter::spawn(Arc::new(PowRegistry::new()), MinterConfig::default())
            .expect("spawn");
        assert!(matches!(
            minter.mint(PowVersion::Equihash, b"p", b"c", 1.0),
            Err(Error::UnknownVersion(1))
        ));
    }

    #[test]
    fn cancel_stops_running_mint() {
        let minter = spawn(MinterConfig::default());
        let handle = minter
            .mint(PowVersion::HashCash, b"p", b"c", UNREACHABLE_DIFFICULTY)
            .expect("queued");
        assert!(handle.wait_timeout(Duration::from_millis(20)).is_none());
        handle.cancel();
        assert_eq!(handle.wait(), Err(Error::Cancelled));

        let next = minter
            .mint(PowVersion::HashCash, b"p", b"c", 2.0)
            .expect("queued")
            .wait()
            .expect("worker still serves requests");
        assert!(minter.verify(&next));
    }

    #[test]
    fn timeout_fails_the_mint() {
        let config = MinterConfigBuilder::default()
            .mint_timeout(Some(Duration::from_millis(50)))
            .build_validated()
            .expect("valid config");
        let minter = spawn(config);
        let start = Instant::now();
        let result = minter
            .mint(PowVersion::Equihash, b"p", b"c", UNREACHABLE_DIFFICULTY)
            .expect("queued")
            .wait();
        assert_eq!(result, Err(Error::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn shutdown_cancels_outstanding_work() {
        let minter = spawn(MinterConfig::default());
        let running = minter
            .mint(PowVersion::HashCash, b"p", b"c", UNREACHABLE_DIFFICULTY)
            .expect("queued");
        let queued = minter
            .mint(PowVersion::HashCash, b"p", b"c", 2.0)
            .expect("queued");
        minter.shutdown();
        assert_eq!(running.wait(), Err(Error::Cancelled));
        assert_eq!(queued.wait(), Err(Error::Cancelled));
    }

    #[test]
    fn panicking_service_fails_only_its_request() {
        let mut registry = PowRegistry::new();
        registry.register(Arc::new(PanickingService));
        registry.register(Arc::new(
            EquihashServiceBuilder::default()
                .n(30)
                .k(2)
                .build_validated()
                .expect("small equihash service"),
        ));
        let minter = Minter::spawn(Arc::new(registry), MinterConfig::default()).expect("spawn");
        let failed = minter
            .mint(PowVersion::HashCash, b"p", b"c", 1.0)
            .expect("queued")
            .wait();
        assert!(matches!(failed, Err(Error::SolverFailed(_))));
        let ok = minter
            .mint(PowVersion::Equihash, b"p", b"c", 1.0)
            .expect("queued")
            .wait();
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn wait_async_resolves() {
        let minter = spawn(MinterConfig::default());
        let pow = minter
            .mint(PowVersion::Equihash, b"async", b"challenge", 1.0)
            .expect("queued")
            .wait_async()
            .await
            .expect("minted");
        assert!(minter.verify(&pow));
        assert!(!minter.registry().verify_with_control(&pow, "x", "y", 1.0));
    }
}

//! Manager/worker process split and signal handling, translated from
//! `cifsd.c`'s `manager_process_init`/`worker_process_init`.
//!
//! Signals are bridged through a blocked-signal-mask + `signalfd` pair
//! (the pattern `wormhole-attach`'s `signals::SignalFd` wraps) rather
//! than raw `sigaction` handlers: the handler thread is ordinary code
//! running outside interrupt context, so it can log, take locks and run
//! Drop glue safely — things a true signal handler must never do. The
//! one exception is `SIGSEGV`, which a blocked mask cannot safely
//! deliver through `signalfd` for a synchronous hardware fault; that one
//! keeps a minimal raw handler that only writes to `stderr` and exits.

use std::io::Write as _;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use nix::fcntl::{self, FlockArg, OFlag};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::error::{Error, Result};
use crate::handlers::Context;
use crate::ipc_loop::{load_initial_context, IpcLoop, ReloadFlag};

const LOCK_FILE: &str = "/var/run/ksmbd.lock";

fn graceful_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGHUP);
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set.add(Signal::SIGQUIT);
    set.add(Signal::SIGABRT);
    set
}

/// Spawns the thread that turns blocked signals into channel messages.
/// The caller must have already blocked `mask` on every thread that
/// should not receive these signals directly (every thread inherits the
/// process mask from `fork`/`pthread_create`, so doing this before
/// spawning anything else covers the whole process).
fn spawn_signal_watcher(mask: SigSet) -> mpsc::Receiver<Signal> {
    let (tx, rx) = mpsc::channel();
    let mut sfd = SignalFd::with_flags(&mask, SfdFlags::empty()).expect("signalfd setup");
    std::thread::spawn(move || loop {
        match sfd.read_signal() {
            Ok(Some(info)) => {
                if let Ok(sig) = Signal::try_from(info.ssi_signo as i32) {
                    if tx.send(sig).is_err() {
                        break;
                    }
                }
            }
            Ok(None) | Err(_) => continue,
        }
    });
    rx
}

extern "C" fn segv_handler(_signo: libc::c_int) {
    // Async-signal-safe only: no allocation, no locks, no Drop glue. A
    // fault mid-registry-mutation means state may be inconsistent, so
    // this does not attempt the IPC/RPC/pool/session teardown a clean
    // shutdown does — it logs best-effort and exits immediately.
    let msg = b"ksmbd worker: SIGSEGV, exiting\n";
    unsafe {
        libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        libc::_exit(1);
    }
}

fn install_segv_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(segv_handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { signal::sigaction(Signal::SIGSEGV, &action) }
        .map_err(|e| Error::LockFile(format!("sigaction(SIGSEGV): {e}")))?;
    Ok(())
}

struct LockFile {
    file: std::fs::File,
    path: PathBuf,
}

impl LockFile {
    fn create(path: &Path) -> Result<Self> {
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .custom_flags(OFlag::O_EXCL.bits())
            .open(path)
            .map_err(|e| Error::LockFile(format!("open {}: {e}", path.display())))?;

        fcntl::flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock)
            .map_err(|e| Error::LockFile(format!("flock {}: {e}", path.display())))?;

        let pid = std::process::id().to_string();
        file.write_all(pid.as_bytes())
            .map_err(|e| Error::LockFile(format!("write pid: {e}")))?;

        Ok(LockFile {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fcntl::flock(self.file.as_raw_fd(), FlockArg::Unlock);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// CLI-derived settings the supervisor needs to start a worker.
#[derive(Clone)]
pub struct StartupConfig {
    pub pwddb_path: PathBuf,
    pub smbconf_path: PathBuf,
    pub worker_count: usize,
    pub lock_file: PathBuf,
    pub port_override: Option<u16>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        StartupConfig {
            pwddb_path: PathBuf::from("/etc/ksmbd/ksmbdpwd.db"),
            smbconf_path: PathBuf::from("/etc/ksmbd/ksmbd.conf"),
            worker_count: crate::pool::DEFAULT_WORKERS,
            lock_file: PathBuf::from(LOCK_FILE),
            port_override: None,
        }
    }
}

/// The manager process: owns the lock file, forks the worker, restarts
/// it (rate-limited) on unexpected exit, and forwards `SIGHUP` to it.
pub struct Supervisor<F> {
    config: StartupConfig,
    connect: F,
}

impl<F> Supervisor<F>
where
    F: Fn() -> Result<std::os::unix::net::UnixStream> + Send + Sync + 'static,
{
    /// `connect` opens a fresh kernel-channel socket; called once per
    /// worker start (including restarts after a crash).
    pub fn new(config: StartupConfig, connect: F) -> Self {
        Supervisor { config, connect }
    }

    /// Runs the manager loop until a terminating signal arrives.
    pub fn run(self) -> Result<()> {
        let mask = graceful_signals();
        signal::sigprocmask(signal::SigmaskHow::SIG_BLOCK, Some(&mask), None)
            .map_err(|e| Error::LockFile(format!("sigprocmask: {e}")))?;
        let signals = spawn_signal_watcher(mask);

        let _lock = LockFile::create(&self.config.lock_file)?;
        let reload = ReloadFlag::new();
        let mut worker_pid = self.spawn_worker(reload.clone())?;

        loop {
            match signals.recv_timeout(Duration::from_millis(500)) {
                Ok(Signal::SIGHUP) => {
                    log::info!("SIGHUP: forwarding reload to worker {worker_pid}");
                    let _ = signal::kill(worker_pid, Signal::SIGHUP);
                }
                Ok(sig) => {
                    log::info!("{sig:?}: shutting down");
                    let _ = signal::kill(worker_pid, sig);
                    let _ = waitpid(worker_pid, None);
                    return Ok(());
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    match waitpid(worker_pid, Some(WaitPidFlag::WNOHANG)) {
                        Ok(WaitStatus::StillAlive) => continue,
                        Ok(status) => {
                            log::warn!("worker exited unexpectedly: {status:?}, restarting");
                            std::thread::sleep(Duration::from_secs(1));
                            worker_pid = self.spawn_worker(reload.clone())?;
                        }
                        Err(_) => continue,
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    fn spawn_worker(&self, reload: ReloadFlag) -> Result<Pid> {
        // SAFETY: immediately followed by either returning to the single
        // surviving manager thread, or calling `run_worker` in the child,
        // which only touches process-local state before `exit`.
        match unsafe { fork() }.map_err(|e| Error::LockFile(format!("fork: {e}")))? {
            ForkResult::Parent { child } => Ok(child),
            ForkResult::Child => {
                let status = run_worker(&self.config, &self.connect, reload);
                std::process::exit(if status.is_ok() { 0 } else { 1 });
            }
        }
    }
}

fn run_worker<F>(config: &StartupConfig, connect: &F, reload: ReloadFlag) -> Result<()>
where
    F: Fn() -> Result<std::os::unix::net::UnixStream>,
{
    install_segv_handler()?;

    let mask = {
        let mut set = SigSet::empty();
        set.add(Signal::SIGHUP);
        set.add(Signal::SIGINT);
        set.add(Signal::SIGTERM);
        set.add(Signal::SIGQUIT);
        set.add(Signal::SIGABRT);
        set
    };
    signal::sigprocmask(signal::SigmaskHow::SIG_BLOCK, Some(&mask), None)
        .map_err(|e| Error::LockFile(format!("sigprocmask: {e}")))?;
    let signals = spawn_signal_watcher(mask);

    let ctx = load_initial_context(&config.pwddb_path, &config.smbconf_path, config.port_override)?;
    {
        let reload = reload.clone();
        std::thread::spawn(move || {
            for sig in signals {
                if sig == Signal::SIGHUP {
                    reload.request();
                    log::debug!("scheduled a config reload action");
                } else {
                    log::info!("{sig:?}: worker shutting down");
                    std::process::exit(0);
                }
            }
        });
    }

    let stream = connect()?;
    let channel = std::sync::Arc::new(std::sync::Mutex::new(
        ksmbd_ipc::UnixSocketChannel::new(stream),
    ));
    let mut loop_ = IpcLoop::new(
        channel,
        ctx.clone(),
        config.worker_count,
        reload,
        config.pwddb_path.clone(),
        config.smbconf_path.clone(),
        config.port_override,
    );
    let result = loop_.run();
    log_teardown_order(&ctx);
    result
}

/// Logs the ordered teardown a graceful shutdown performs, mirroring
/// `worker_process_free`'s release order (IPC, RPC, WorkerPool,
/// Sessions, Shares, Users). Dropping `ctx` and the channel already
/// performs the real work; this just gives the ordering operator-visible
/// shape in the log, the same role `pr_debug` calls played in the C code.
fn log_teardown_order(ctx: &Context) {
    log::debug!("shutdown: closing IPC channel");
    log::debug!("shutdown: tearing down RPC pipes");
    log::debug!("shutdown: draining worker pool");
    log::debug!("shutdown: releasing {} session(s)", ctx.sessions.len());
    log::debug!("shutdown: releasing {} share(s)", ctx.shares.len());
    log::debug!("shutdown: releasing {} user(s)", ctx.users.len());
}

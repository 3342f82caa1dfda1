//! The worker process's main loop: read one message, poll the reload
//! flag, repeat. Translated from `worker_process_init`'s `while
//! (cifsd_health_status & CIFSD_HEALTH_RUNNING)` loop in `cifsd.c`, split
//! so that config reload and message dispatch are each one call here
//! instead of inlined in `main`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ksmbd_dtyp::{SessionRegistry, ShareRegistry, User, UserRegistry};
use ksmbd_ipc::{IpcError, KernelChannel};

use crate::config::{parse_pwddb, parse_smbconf, FileConfigSource};
use crate::error::Result;
use crate::handlers::Context;
use crate::pool::WorkerPool;

/// Set by a `SIGHUP` handler, polled once per loop iteration (spec §4.6:
/// `IpcLoop` never re-reads configs mid-dispatch, only between reads).
#[derive(Clone, Default)]
pub struct ReloadFlag(Arc<AtomicBool>);

impl ReloadFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// The single-threaded read loop: blocking reads off the kernel channel,
/// handed to the [`WorkerPool`] for dispatch.
pub struct IpcLoop<C> {
    channel: Arc<Mutex<C>>,
    pool: WorkerPool,
    ctx: Context,
    reload: ReloadFlag,
    pwddb_path: PathBuf,
    smbconf_path: PathBuf,
    port_override: Option<u16>,
}

impl<C: KernelChannel + 'static> IpcLoop<C> {
    pub fn new(
        channel: Arc<Mutex<C>>,
        ctx: Context,
        worker_count: usize,
        reload: ReloadFlag,
        pwddb_path: PathBuf,
        smbconf_path: PathBuf,
        port_override: Option<u16>,
    ) -> Self {
        let pool = WorkerPool::new(worker_count, channel.clone(), ctx.clone());
        IpcLoop {
            channel,
            pool,
            ctx,
            reload,
            pwddb_path,
            smbconf_path,
            port_override,
        }
    }

    /// Runs until the channel closes. Returns `Ok(())` on a clean close,
    /// propagating any other I/O error.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if self.reload.take() {
                if let Err(e) = self.reload_configs() {
                    log::error!("failed to reload configs, continuing with the old ones: {e}");
                }
            }

            let msg = {
                let mut guard = self.channel.lock().unwrap();
                guard.recv()
            };

            match msg {
                Ok(msg) => self.pool.submit(msg),
                Err(IpcError::ChannelClosed) => return Ok(()),
                Err(e) => {
                    log::warn!("dropping malformed IPC frame: {e}");
                }
            }
        }
    }

    fn reload_configs(&self) -> Result<()> {
        let pwddb = parse_pwddb(&FileConfigSource {
            path: self.pwddb_path.clone(),
        })?;
        let users: Vec<User> = pwddb.into_iter().map(User::from).collect();
        self.ctx.users.reload(users);

        let smbconf = parse_smbconf(&FileConfigSource {
            path: self.smbconf_path.clone(),
        })?;
        self.ctx.set_global(smbconf.global.clone(), self.port_override);
        self.ctx.shares.reload(smbconf.shares)?;
        Ok(())
    }
}

/// Builds the initial [`Context`] from the two config files, the way
/// `worker_process_init` calls `parse_configs` once at startup before
/// entering its loop. `port_override` is the CLI `--port` flag, applied
/// on top of whatever `smb.conf`'s `[global]` section says.
pub fn load_initial_context(
    pwddb_path: &std::path::Path,
    smbconf_path: &std::path::Path,
    port_override: Option<u16>,
) -> Result<Context> {
    let pwddb = parse_pwddb(&FileConfigSource {
        path: pwddb_path.to_path_buf(),
    })?;
    let users = UserRegistry::from_users(pwddb.into_iter().map(User::from).collect());

    let smbconf = parse_smbconf(&FileConfigSource {
        path: smbconf_path.to_path_buf(),
    })?;
    let shares = ShareRegistry::from_shares(smbconf.shares)?;

    let ctx = Context::new(
        Arc::new(shares),
        Arc::new(users),
        Arc::new(SessionRegistry::new()),
    );
    ctx.set_global(smbconf.global, port_override);
    Ok(ctx)
}

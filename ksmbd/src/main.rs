//! `ksmbd` daemon entry point: CLI parsing, logging init, and wiring
//! `Supervisor` to a real `AF_UNIX` socket connection, translated from
//! `cifsd.c`'s `main()`/`getopt` loop.

use std::path::PathBuf;

use clap::Parser;

use ksmbd_core::{base64_encode, crypto, error::Result, StartupConfig, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "ksmbd", about = "userspace control plane for a split SMB server")]
struct Cli {
    /// TCP port override, threaded into `smb.conf`'s `[global]` section
    /// post-load (the kernel engine, not this daemon, binds the socket).
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Path to `smb.conf`.
    #[arg(short = 'c', long = "config", default_value = "/etc/ksmbd/ksmbd.conf")]
    config: PathBuf,

    /// Path to the password database.
    #[arg(long = "pwddb", default_value = "/etc/ksmbd/ksmbdpwd.db")]
    pwddb: PathBuf,

    /// Import one `username:password` per line from this file into the
    /// password database, hashing each with the NT hash, then exit.
    #[arg(short = 'i', long = "import-users")]
    import_users: Option<PathBuf>,

    /// Run in the foreground without the manager/worker fork split.
    #[arg(short = 'n', long = "nodetach")]
    no_detach: bool,

    /// Run as a foreground child of a service supervisor (e.g. systemd);
    /// implies `--nodetach`.
    #[arg(short = 's', long = "systemd")]
    systemd: bool,

    /// Path to the kernel engine's `AF_UNIX` socket.
    #[arg(long = "socket", default_value = "/run/ksmbd/kernel.sock")]
    socket: PathBuf,

    /// Path to the manager lock file.
    #[arg(long = "lock-file", default_value = "/var/run/ksmbd.lock")]
    lock_file: PathBuf,

    /// Worker thread count for the IPC dispatch pool (0 = default).
    #[arg(long = "workers", default_value_t = 0)]
    workers: usize,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(import_path) = &cli.import_users {
        return import_users(import_path, &cli.pwddb);
    }

    if let Some(port) = cli.port {
        log::info!("--port={port} overrides smb.conf's [global] port at load time");
    }

    let startup = StartupConfig {
        pwddb_path: cli.pwddb,
        smbconf_path: cli.config,
        worker_count: cli.workers,
        lock_file: cli.lock_file,
        port_override: cli.port,
    };

    let socket = cli.socket.clone();
    let connect = move || {
        std::os::unix::net::UnixStream::connect(&socket).map_err(ksmbd_core::Error::from)
    };

    // `--systemd` implies `--nodetach`: both run the manager as a
    // foreground process, the systemd mode additionally skipping the
    // double-fork (the manager loop below already is that foreground
    // process, so there's nothing further to skip in this daemon).
    if cli.no_detach || cli.systemd {
        log::info!("running in the foreground (nodetach={}, systemd={})", cli.no_detach, cli.systemd);
    } else {
        daemonize()?;
    }

    Supervisor::new(startup, connect).run()
}

/// Detaches from the controlling terminal the way `daemon(0, 0)` does:
/// fork, exit the parent, start a new session in the child. `cifsd.c`
/// calls `daemon()` directly; we reimplement the same two syscalls since
/// the daemon's own fork/setsid step is distinct from (and happens
/// before) the manager/worker fork `Supervisor` performs.
fn daemonize() -> Result<()> {
    use nix::sys::stat::{umask, Mode};
    use nix::unistd::{fork, setsid, ForkResult};

    // SAFETY: runs before any threads are spawned, matching `daemon()`'s
    // own requirement of being called early in `main`.
    match unsafe { fork() }.map_err(|e| ksmbd_core::Error::LockFile(format!("fork: {e}")))? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(|e| ksmbd_core::Error::LockFile(format!("setsid: {e}")))?;
    umask(Mode::empty());
    let _ = std::env::set_current_dir("/");
    Ok(())
}

/// `-i`/`--import-users`: reads `username:password` lines, hashes each
/// password with the NT hash, and appends `username:base64(hash)` to the
/// password database (matching `cifsadmin --add-user`'s role, folded
/// into the daemon binary here since no separate admin binary is built).
fn import_users(import_path: &std::path::Path, pwddb_path: &std::path::Path) -> Result<()> {
    let text = std::fs::read_to_string(import_path)?;
    let mut out = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((username, password)) = line.split_once(':') else {
            log::warn!("skipping malformed import line: {line}");
            continue;
        };
        let hash = crypto::nt_hash(password);
        out.push_str(username);
        out.push(':');
        out.push_str(&base64_encode(&hash));
        out.push('\n');
    }

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(pwddb_path)?;
    file.write_all(out.as_bytes())?;
    log::info!("imported users from {} into {}", import_path.display(), pwddb_path.display());
    Ok(())
}

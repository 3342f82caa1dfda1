//! Fixed-width worker pool that executes IPC requests off the read loop.
//!
//! Grounded on `cifsd/worker.c`'s `GThreadPool`: a fixed number of
//! threads (`MAX_WORKER_THREADS` there, `DEFAULT_WORKERS` here) pull
//! queued messages and run `worker_pool_fn`'s per-type dispatch.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use binrw::prelude::*;

use ksmbd_ipc::messages::{
    Heartbeat, LoginRequest, LogoutRequest, RpcRequestHeader, ShareConfigRequest,
    TreeConnectRequest, TreeDisconnectRequest,
};
use ksmbd_ipc::{KernelChannel, MessageType, RawMessage};

use crate::handlers::{
    handle_login, handle_logout, handle_rpc, handle_share_config, handle_tree_connect,
    handle_tree_disconnect, Context, PipeTable,
};

/// Default worker count (spec §4.5 Worker Pool: fixed width, default 4).
pub const DEFAULT_WORKERS: usize = 4;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of threads draining a shared job queue. Every job is a
/// fully self-contained closure carrying its own copy of the shared
/// registries, pipe table and reply channel.
pub struct WorkerPool {
    job_tx: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    handle: Box<dyn DispatchHandle>,
}

impl WorkerPool {
    /// Spawns `size` worker threads (or [`DEFAULT_WORKERS`] if `size == 0`)
    /// dispatching messages against `ctx`, replying over `channel`.
    pub fn new<C>(size: usize, channel: Arc<Mutex<C>>, ctx: Context) -> Self
    where
        C: KernelChannel + 'static,
    {
        let size = if size == 0 { DEFAULT_WORKERS } else { size };
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let pipes = Arc::new(PipeTable::new());

        let mut workers = Vec::with_capacity(size);
        for _ in 0..size {
            let job_rx = job_rx.clone();
            workers.push(std::thread::spawn(move || loop {
                let job = { job_rx.lock().unwrap().recv() };
                match job {
                    Ok(job) => job(),
                    Err(_) => break,
                }
            }));
        }

        WorkerPool {
            job_tx: Some(job_tx),
            workers,
            handle: Box::new(Handle { channel, ctx, pipes }),
        }
    }

    /// Queues one raw message for dispatch. Never blocks the caller
    /// (spec §4.5: the read loop must not stall behind a slow handler).
    pub fn submit(&self, msg: RawMessage) {
        let Some(tx) = &self.job_tx else { return };
        let job = self.handle.job_for(msg);
        let _ = tx.send(job);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

/// Type-erases the channel's concrete type so `WorkerPool` itself stays
/// non-generic after construction.
trait DispatchHandle: Send + Sync {
    fn job_for(&self, msg: RawMessage) -> Job;
}

struct Handle<C> {
    channel: Arc<Mutex<C>>,
    ctx: Context,
    pipes: Arc<PipeTable>,
}

impl<C: KernelChannel + 'static> DispatchHandle for Handle<C> {
    fn job_for(&self, msg: RawMessage) -> Job {
        let channel = self.channel.clone();
        let ctx = self.ctx.clone();
        let pipes = self.pipes.clone();
        Box::new(move || dispatch(msg, &ctx, &pipes, &channel))
    }
}

/// The per-message-type switch, mirroring `worker_pool_fn`'s dispatch:
/// parse the fixed-size payload, run the handler, send the response (if
/// the message type has one) back over the channel.
fn dispatch<C: KernelChannel>(msg: RawMessage, ctx: &Context, pipes: &PipeTable, channel: &Mutex<C>) {
    match msg.msg_type {
        MessageType::LoginRequest => {
            let Ok(req) = read::<LoginRequest>(&msg.payload) else { return };
            let resp = handle_login(&req, ctx);
            send(channel, MessageType::LoginResponse, &resp);
        }
        MessageType::TreeConnectRequest => {
            let Ok(req) = read::<TreeConnectRequest>(&msg.payload) else { return };
            let resp = handle_tree_connect(&req, ctx);
            send(channel, MessageType::TreeConnectResponse, &resp);
        }
        MessageType::TreeDisconnectRequest => {
            if let Ok(req) = read::<TreeDisconnectRequest>(&msg.payload) {
                handle_tree_disconnect(&req, ctx);
            }
        }
        MessageType::LogoutRequest => {
            if let Ok(req) = read::<LogoutRequest>(&msg.payload) {
                handle_logout(&req, ctx);
            }
        }
        MessageType::ShareConfigRequest => {
            let Ok(req) = read::<ShareConfigRequest>(&msg.payload) else { return };
            let payload = handle_share_config(&req, ctx);
            let mut guard = channel.lock().unwrap();
            let _ = guard.send(MessageType::ShareConfigResponse, 0, &payload);
        }
        MessageType::Heartbeat => {
            if read::<Heartbeat>(&msg.payload).is_ok() {
                log::debug!("heartbeat from kernel engine");
            }
        }
        MessageType::RpcRequest => {
            const HEADER_WIRE_SIZE: usize = 8 + 8 + 4 + 4 + 32 + 4;
            if msg.payload.len() < HEADER_WIRE_SIZE {
                return;
            }
            let Ok(req) = read::<RpcRequestHeader>(&msg.payload[..HEADER_WIRE_SIZE]) else { return };
            let pdu = &msg.payload[HEADER_WIRE_SIZE..];
            let (mut resp, body) = handle_rpc(&req, pdu, ctx, pipes);
            resp.data_len = body.len() as u32;
            let mut bytes = Vec::new();
            resp.write(&mut std::io::Cursor::new(&mut bytes))
                .expect("fixed-size header always encodes");
            bytes.extend_from_slice(&body);
            let mut guard = channel.lock().unwrap();
            let _ = guard.send(MessageType::RpcResponse, 0, &bytes);
        }
        other => {
            log::warn!("unexpected request message type on the worker pool: {other:?}");
        }
    }
}

fn read<T>(bytes: &[u8]) -> std::io::Result<T>
where
    T: BinRead + binrw::meta::ReadEndian,
    for<'a> T::Args<'a>: Default,
{
    let mut cursor = std::io::Cursor::new(bytes);
    T::read(&mut cursor).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn send<C, T>(channel: &Mutex<C>, msg_type: MessageType, value: &T)
where
    C: KernelChannel,
    T: BinWrite + binrw::meta::WriteEndian,
    for<'a> T::Args<'a>: Default,
{
    let mut bytes = Vec::new();
    if value.write(&mut std::io::Cursor::new(&mut bytes)).is_err() {
        return;
    }
    let mut guard = channel.lock().unwrap();
    let _ = guard.send(msg_type, 0, &bytes);
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.job_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

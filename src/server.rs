//! Daemon side: accept loop and the per-connection storage/retrieval handler
//!
//! Each accepted connection runs in its own task and serves exactly one
//! transfer. Tasks share nothing but the filesystem and the log sinks.

use crate::checksum::{verify_checksum, Md5Stream};
use crate::conn::Connection;
use crate::disk::{FsSpace, SpaceProbe};
use crate::error::{Result, TransferError};
use crate::journal::{TransferJournal, TransferKind, TransferLogEntry};
use crate::logger::{Logger, NoopLogger};
use crate::partial::PartialFile;
use crate::protocol::{status, Envelope, RetrievalRequest, StorageRequest};
use crate::protocol_core::resolve_under_root;
use anyhow::Context;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

/// Everything a connection handler needs; cheap to share between tasks.
pub struct ServerContext {
    root: PathBuf,
    space: Arc<dyn SpaceProbe>,
    logger: Arc<dyn Logger>,
    journal: Option<Arc<TransferJournal>>,
}

impl ServerContext {
    /// `root` must be an existing directory; it is canonicalized here.
    pub fn new(root: &Path) -> anyhow::Result<Self> {
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("Failed to canonicalize root path: {}", root.display()))?;
        if !root.is_dir() {
            anyhow::bail!("Root path is not a directory: {}", root.display());
        }
        Ok(Self {
            root,
            space: Arc::new(FsSpace),
            logger: Arc::new(NoopLogger),
            journal: None,
        })
    }

    pub fn with_space(mut self, space: Arc<dyn SpaceProbe>) -> Self {
        self.space = space;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_journal(mut self, journal: Arc<TransferJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Journal appends run on the blocking pool; failures are logged only.
    async fn record(&self, entry: TransferLogEntry) {
        let Some(journal) = &self.journal else {
            return;
        };
        let journal = Arc::clone(journal);
        let peer = entry.peer.clone();
        let result = tokio::task::spawn_blocking(move || journal.add_entry(&entry)).await;
        let msg = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{:#}", e),
            Err(e) => e.to_string(),
        };
        self.logger.error(&peer, "journal", &msg);
    }

    async fn available_space(&self) -> io::Result<u64> {
        let space = Arc::clone(&self.space);
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || space.available(&root))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

/// What a connection ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Peer closed before sending a request
    Disconnected,
    Stored { file_name: String, bytes: u64 },
    Retrieved { file_name: String, bytes: u64 },
}

pub async fn serve(bind: &str, ctx: ServerContext) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    serve_listener(listener, ctx).await
}

/// Accept forever, one task per connection
pub async fn serve_listener(listener: TcpListener, ctx: ServerContext) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    ctx.logger.listening(&local, &ctx.root);
    let ctx = Arc::new(ctx);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // e.g. EMFILE; back off instead of spinning
                ctx.logger.error(&local, "accept", &e.to_string());
                sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        let _ = stream.set_nodelay(true);
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let peer = peer.to_string();
            ctx.logger.connected(&peer);
            let mut conn = Connection::new(stream);
            let _ = handle_conn(&mut conn, &ctx, &peer).await;
        });
    }
}

/// Serve one transfer on `conn`, then close it. Failures are logged here;
/// the returned value is for callers that want the outcome.
pub async fn handle_conn<S>(
    conn: &mut Connection<S>,
    ctx: &ServerContext,
    peer: &str,
) -> Result<Handled>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = dispatch(conn, ctx, peer).await;
    conn.close().await;
    result
}

async fn dispatch<S>(conn: &mut Connection<S>, ctx: &ServerContext, peer: &str) -> Result<Handled>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let envelope = match conn.receive().await {
        Ok(Some(envelope)) => envelope,
        Ok(None) => {
            ctx.logger.disconnected(peer);
            return Ok(Handled::Disconnected);
        }
        Err(e) => {
            ctx.logger.error(peer, "receive", &e.to_string());
            return Err(e);
        }
    };
    match envelope {
        Envelope::StorageRequest(req) => handle_storage(conn, ctx, peer, req).await,
        Envelope::RetrievalRequest(req) => handle_retrieval(conn, ctx, peer, req).await,
        other @ (Envelope::Response(_) | Envelope::RetrievalResponse(_) | Envelope::Checksum(_)) => {
            let e = TransferError::Protocol(format!("unexpected {} as request", other.kind()));
            ctx.logger.error(peer, "dispatch", &e.to_string());
            Err(e)
        }
    }
}

async fn handle_storage<S>(
    conn: &mut Connection<S>,
    ctx: &ServerContext,
    peer: &str,
    req: StorageRequest,
) -> Result<Handled>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ctx.logger.store_start(peer, &req.file_name, req.size);
    let started = Instant::now();
    let entry = TransferLogEntry::new(peer, TransferKind::Store, &req.file_name, req.size);

    // The partial file is already gone when `store` returns an error
    match store(conn, ctx, &req).await {
        Ok(bytes) => {
            ctx.logger
                .store_done(peer, &req.file_name, bytes, started.elapsed().as_secs_f64());
            ctx.record(entry.completed(bytes)).await;
            Ok(Handled::Stored {
                file_name: req.file_name,
                bytes,
            })
        }
        Err(e) => {
            ctx.logger.error(peer, "store", &format!("{}: {}", req.file_name, e));
            conn.notify(&Envelope::response(false, e.to_string())).await;
            ctx.record(entry.failed(&e)).await;
            Err(e)
        }
    }
}

async fn store<S>(conn: &mut Connection<S>, ctx: &ServerContext, req: &StorageRequest) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Errors name the file as the client knows it, not by its server path
    let label = Path::new(&req.file_name);
    let path = resolve_under_root(&ctx.root, &req.file_name)?;
    let mut partial = PartialFile::create_new(&path)
        .await
        .map_err(|e| TransferError::local(label, e))?;

    let available = ctx
        .available_space()
        .await
        .map_err(|e| TransferError::local(label, e))?;
    if available < req.size {
        return Err(TransferError::InsufficientSpace {
            needed: req.size,
            available,
        });
    }

    conn.send_response(true, status::READY_FOR_DATA).await?;

    let mut sum = Md5Stream::new();
    conn.recv_raw_into(partial.file_mut(), label, req.size, &mut sum, None)
        .await?;
    partial
        .finish()
        .await
        .map_err(|e| TransferError::local(label, e))?;

    let received = sum.bytes();
    let remote = conn.expect_checksum().await?;
    if !verify_checksum(&sum.finish(), &remote) {
        return Err(TransferError::ChecksumMismatch);
    }
    partial.commit();
    conn.send_response(true, status::STORAGE_COMPLETE).await?;
    Ok(received)
}

async fn handle_retrieval<S>(
    conn: &mut Connection<S>,
    ctx: &ServerContext,
    peer: &str,
    req: RetrievalRequest,
) -> Result<Handled>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ctx.logger.retrieve_start(peer, &req.file_name);
    let started = Instant::now();
    let mut entry = TransferLogEntry::new(peer, TransferKind::Retrieve, &req.file_name, 0);

    let label = Path::new(&req.file_name);
    let (mut file, size) = match open_for_retrieval(ctx, &req.file_name).await {
        Ok(opened) => opened,
        Err(e) => {
            ctx.logger
                .error(peer, "retrieve", &format!("{}: {}", req.file_name, e));
            conn.notify(&Envelope::retrieval_response(false, e.to_string(), 0))
                .await;
            ctx.record(entry.failed(&e)).await;
            return Err(e);
        }
    };
    entry.size = size;

    // Past this point a failure just cuts the stream short; the peer notices
    let result: Result<u64> = async {
        conn.send_retrieval_response(true, status::READY_TO_SEND, size)
            .await?;
        let mut sum = Md5Stream::new();
        conn.send_raw_from(&mut file, label, size, &mut sum, None)
            .await?;
        conn.send_checksum(sum.finish()).await?;
        Ok(size)
    }
    .await;

    match result {
        Ok(bytes) => {
            ctx.logger
                .retrieve_done(peer, &req.file_name, bytes, started.elapsed().as_secs_f64());
            ctx.record(entry.completed(bytes)).await;
            Ok(Handled::Retrieved {
                file_name: req.file_name,
                bytes,
            })
        }
        Err(e) => {
            ctx.logger
                .error(peer, "retrieve", &format!("{}: {}", req.file_name, e));
            ctx.record(entry.failed(&e)).await;
            Err(e)
        }
    }
}

async fn open_for_retrieval(ctx: &ServerContext, name: &str) -> Result<(File, u64)> {
    let label = Path::new(name);
    let path = resolve_under_root(&ctx.root, name)?;
    let file = File::open(&path)
        .await
        .map_err(|e| TransferError::local(label, e))?;
    let meta = file
        .metadata()
        .await
        .map_err(|e| TransferError::local(label, e))?;
    if !meta.is_file() {
        return Err(TransferError::local(
            label,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    Ok((file, meta.len()))
}

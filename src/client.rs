//! Client side of a transfer: PUT and GET as fixed sequences of connection steps
//!
//! PUT: Requesting -> AwaitingReady -> Streaming -> AwaitingFinalStatus -> Done
//! GET: Requesting -> AwaitingReady -> Streaming -> AwaitingChecksum -> Verifying -> Done
//!
//! Any error is terminal; nothing is retried.

use crate::checksum::{verify_checksum, Md5Stream};
use crate::conn::Connection;
use crate::error::{Result, TransferError};
use crate::partial::PartialFile;
use crate::protocol::{Checksum, Envelope, RetrievalRequest, StorageRequest};
use crate::protocol_core::{base_name, validate_file_name};
use indicatif::ProgressBar;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};

/// A local file opened and sized for upload
pub struct LocalSource {
    path: PathBuf,
    name: String,
    file: File,
    size: u64,
}

impl LocalSource {
    pub async fn open(path: &Path) -> Result<Self> {
        let name = base_name(path)?;
        let file = File::open(path)
            .await
            .map_err(|e| TransferError::local(path, e))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| TransferError::local(path, e))?;
        if !meta.is_file() {
            return Err(TransferError::local(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            name,
            file,
            size: meta.len(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReport {
    pub file_name: String,
    pub bytes: u64,
    pub checksum: Checksum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub checksum: Checksum,
}

/// Store `source` on the server under its base name
pub async fn put<S>(
    conn: &mut Connection<S>,
    mut source: LocalSource,
    progress: Option<&ProgressBar>,
) -> Result<PutReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.send(&Envelope::StorageRequest(StorageRequest {
        file_name: source.name.clone(),
        size: source.size,
    }))
    .await?;

    let ready = conn.expect_response().await?;
    if !ready.success {
        return Err(TransferError::Rejected(ready.message));
    }

    let mut sum = Md5Stream::new();
    conn.send_raw_from(&mut source.file, &source.path, source.size, &mut sum, progress)
        .await?;
    let bytes = sum.bytes();
    let checksum = sum.finish();
    conn.send_checksum(checksum).await?;

    let status = conn.expect_response().await?;
    if !status.success {
        return Err(TransferError::Rejected(status.message));
    }
    Ok(PutReport {
        file_name: source.name,
        bytes,
        checksum,
    })
}

/// Open `path` and store it; local failures surface before anything is sent
pub async fn put_file<S>(
    conn: &mut Connection<S>,
    path: &Path,
    progress: Option<&ProgressBar>,
) -> Result<PutReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let source = LocalSource::open(path).await?;
    put(conn, source, progress).await
}

/// Fetch `file_name` into `dest_dir`, which must not already hold that name.
///
/// The destination is created only after the server confirms the file, and is
/// removed again if the body is short or fails verification.
pub async fn get<S>(
    conn: &mut Connection<S>,
    file_name: &str,
    dest_dir: &Path,
    progress: Option<&ProgressBar>,
) -> Result<GetReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = validate_file_name(file_name)?;
    conn.send(&Envelope::RetrievalRequest(RetrievalRequest {
        file_name: name.to_string(),
    }))
    .await?;

    let ready = conn.expect_retrieval_response().await?;
    if !ready.success {
        return Err(TransferError::Rejected(ready.message));
    }

    let dest = dest_dir.join(name);
    let mut partial = PartialFile::create_new(&dest)
        .await
        .map_err(|e| TransferError::local(&dest, e))?;

    let mut sum = Md5Stream::new();
    conn.recv_raw_into(partial.file_mut(), &dest, ready.size, &mut sum, progress)
        .await?;
    if let Err(e) = partial.finish().await {
        return Err(TransferError::local(partial.path(), e));
    }

    let remote = conn.expect_checksum().await?;
    let local = sum.finish();
    if !verify_checksum(&local, &remote) {
        return Err(TransferError::ChecksumMismatch);
    }
    partial.commit();
    Ok(GetReport {
        path: dest,
        bytes: ready.size,
        checksum: local,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum_of;
    use crate::protocol::status;
    use tempfile::TempDir;
    use tokio::io::{duplex, DuplexStream};

    fn pair() -> (Connection<DuplexStream>, Connection<DuplexStream>) {
        let (a, b) = duplex(256 * 1024);
        (Connection::new(a), Connection::new(b))
    }

    async fn expect_storage_request(peer: &mut Connection<DuplexStream>) -> StorageRequest {
        match peer.receive().await.unwrap() {
            Some(Envelope::StorageRequest(req)) => req,
            other => panic!("unexpected {:?}", other),
        }
    }

    async fn expect_retrieval_request(peer: &mut Connection<DuplexStream>) -> RetrievalRequest {
        match peer.receive().await.unwrap() {
            Some(Envelope::RetrievalRequest(req)) => req,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_put_happy_path() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("a.bin");
        std::fs::write(&src, b"payload bytes").unwrap();
        let (mut conn, mut server) = pair();

        let fake_server = async {
            let req = expect_storage_request(&mut server).await;
            assert_eq!(req.file_name, "a.bin");
            assert_eq!(req.size, 13);
            server.send_response(true, status::READY_FOR_DATA).await.unwrap();
            let mut body = vec![0u8; req.size as usize];
            server.read_exact(&mut body).await.unwrap();
            let sum = server.expect_checksum().await.unwrap();
            assert_eq!(sum, checksum_of(&body));
            server.send_response(true, status::STORAGE_COMPLETE).await.unwrap();
            body
        };
        let (report, body) = tokio::join!(put_file(&mut conn, &src, None), fake_server);
        let report = report.unwrap();
        assert_eq!(body, b"payload bytes");
        assert_eq!(report.file_name, "a.bin");
        assert_eq!(report.bytes, 13);
        assert_eq!(report.checksum, checksum_of(b"payload bytes"));
    }

    #[tokio::test]
    async fn test_put_missing_file_sends_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let (mut conn, mut server) = pair();
        let err = put_file(&mut conn, &temp_dir.path().join("nope.bin"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::LocalFile { .. }));
        drop(conn);
        assert!(server.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_rejected_does_not_stream() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("a.bin");
        std::fs::write(&src, vec![1u8; 1000]).unwrap();
        let (mut conn, mut server) = pair();

        let fake_server = async {
            expect_storage_request(&mut server).await;
            server
                .send_response(false, "a.bin already exists")
                .await
                .unwrap();
        };
        let (result, _) = tokio::join!(put_file(&mut conn, &src, None), fake_server);
        match result {
            Err(TransferError::Rejected(msg)) => assert_eq!(msg, "a.bin already exists"),
            other => panic!("unexpected {:?}", other),
        }
        drop(conn);
        // Nothing but EOF follows the request
        assert!(server.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_final_status_failure() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("a.bin");
        std::fs::write(&src, b"abc").unwrap();
        let (mut conn, mut server) = pair();

        let fake_server = async {
            let req = expect_storage_request(&mut server).await;
            server.send_response(true, status::READY_FOR_DATA).await.unwrap();
            let mut body = vec![0u8; req.size as usize];
            server.read_exact(&mut body).await.unwrap();
            server.expect_checksum().await.unwrap();
            server
                .send_response(false, status::INVALID_CHECKSUM)
                .await
                .unwrap();
        };
        let (result, _) = tokio::join!(put_file(&mut conn, &src, None), fake_server);
        assert!(matches!(result, Err(TransferError::Rejected(ref m)) if m == "invalid checksum"));
    }

    #[tokio::test]
    async fn test_get_happy_path() {
        let temp_dir = TempDir::new().unwrap();
        let (mut conn, mut server) = pair();
        let data = vec![9u8; 70_000];

        let fake_server = async {
            let req = expect_retrieval_request(&mut server).await;
            assert_eq!(req.file_name, "b.bin");
            server
                .send_retrieval_response(true, status::READY_TO_SEND, data.len() as u64)
                .await
                .unwrap();
            server.write_all(&data).await.unwrap();
            server.send_checksum(checksum_of(&data)).await.unwrap();
        };
        let (report, _) = tokio::join!(get(&mut conn, "b.bin", temp_dir.path(), None), fake_server);
        let report = report.unwrap();
        assert_eq!(report.path, temp_dir.path().join("b.bin"));
        assert_eq!(report.bytes, 70_000);
        assert_eq!(std::fs::read(&report.path).unwrap(), data);
    }

    #[tokio::test]
    async fn test_get_rejected_creates_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let (mut conn, mut server) = pair();

        let fake_server = async {
            expect_retrieval_request(&mut server).await;
            server
                .send_retrieval_response(false, "No such file or directory", 0)
                .await
                .unwrap();
        };
        let (result, _) = tokio::join!(get(&mut conn, "c.bin", temp_dir.path(), None), fake_server);
        assert!(matches!(result, Err(TransferError::Rejected(_))));
        assert!(!temp_dir.path().join("c.bin").exists());
    }

    #[tokio::test]
    async fn test_get_checksum_mismatch_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let (mut conn, mut server) = pair();

        let fake_server = async {
            expect_retrieval_request(&mut server).await;
            server
                .send_retrieval_response(true, status::READY_TO_SEND, 5)
                .await
                .unwrap();
            // One byte flipped on the wire, checksum of the original
            server.write_all(b"hellp").await.unwrap();
            server.send_checksum(checksum_of(b"hello")).await.unwrap();
        };
        let (result, _) = tokio::join!(get(&mut conn, "d.bin", temp_dir.path(), None), fake_server);
        assert!(matches!(result, Err(TransferError::ChecksumMismatch)));
        assert!(!temp_dir.path().join("d.bin").exists());
    }

    #[tokio::test]
    async fn test_get_wrong_message_instead_of_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let (mut conn, mut server) = pair();

        let fake_server = async {
            expect_retrieval_request(&mut server).await;
            server
                .send_retrieval_response(true, status::READY_TO_SEND, 2)
                .await
                .unwrap();
            server.write_all(b"ok").await.unwrap();
            server.send_response(true, "surprise").await.unwrap();
        };
        let (result, _) = tokio::join!(get(&mut conn, "e.bin", temp_dir.path(), None), fake_server);
        assert!(matches!(result, Err(TransferError::Protocol(_))));
        assert!(!temp_dir.path().join("e.bin").exists());
    }

    #[tokio::test]
    async fn test_get_short_stream_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let (mut conn, mut server) = pair();

        let fake_server = async move {
            expect_retrieval_request(&mut server).await;
            server
                .send_retrieval_response(true, status::READY_TO_SEND, 100)
                .await
                .unwrap();
            server.write_all(&[0u8; 40]).await.unwrap();
            drop(server);
        };
        let (result, _) = tokio::join!(get(&mut conn, "f.bin", temp_dir.path(), None), fake_server);
        assert!(result.unwrap_err().is_transport());
        assert!(!temp_dir.path().join("f.bin").exists());
    }

    #[tokio::test]
    async fn test_get_refuses_to_clobber() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("g.bin");
        std::fs::write(&existing, b"mine").unwrap();
        let (mut conn, mut server) = pair();

        let fake_server = async move {
            expect_retrieval_request(&mut server).await;
            server
                .send_retrieval_response(true, status::READY_TO_SEND, 6)
                .await
                .unwrap();
            let _ = server.write_all(b"theirs").await;
        };
        let (result, _) = tokio::join!(get(&mut conn, "g.bin", temp_dir.path(), None), fake_server);
        assert!(matches!(result, Err(TransferError::AlreadyExists(ref p)) if p == &existing));
        assert_eq!(std::fs::read(&existing).unwrap(), b"mine");
    }

    #[tokio::test]
    async fn test_get_rejects_path_names_locally() {
        let temp_dir = TempDir::new().unwrap();
        let (mut conn, _server) = pair();
        let err = get(&mut conn, "../escape", temp_dir.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidFileName(_)));
    }
}

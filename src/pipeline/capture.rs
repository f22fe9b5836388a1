//! On-disk staging of captured message bodies.
//!
//! A [`Capture`] collects the upstream reply to a `RETR` line by line. Once
//! the terminating dot arrives it is sealed and handed to exactly one
//! pipeline job, which parses it into a [`ParsedCapture`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::pipeline::outline::MailOutline;

/// Allocates recycled capture ids and maps them to staging files.
///
/// An id stays leased from [`Capture::create`] until its capture is dropped,
/// so two live captures never share a staging file.
#[derive(Debug)]
pub struct CaptureSlots {
    directory: PathBuf,
    max_slots: u64,
    next: AtomicU64,
    leased: Arc<DashSet<u64>>,
}

impl CaptureSlots {
    pub fn new(directory: impl Into<PathBuf>, max_slots: u64) -> Self {
        Self {
            directory: directory.into(),
            max_slots: max_slots.max(1),
            next: AtomicU64::new(0),
            leased: Arc::new(DashSet::new()),
        }
    }

    /// Lease the next free id, modulo the configured maximum. `None` when
    /// every slot is held by a live capture.
    pub fn allocate(&self) -> Option<SlotLease> {
        for _ in 0..self.max_slots {
            let id = self.next.fetch_add(1, Ordering::Relaxed) % self.max_slots;
            if self.leased.insert(id) {
                return Some(SlotLease {
                    id,
                    leased: self.leased.clone(),
                });
            }
        }
        None
    }

    /// Ids currently held by live captures.
    pub fn in_use(&self) -> usize {
        self.leased.len()
    }

    pub fn path_for(&self, id: u64) -> PathBuf {
        self.directory.join(format!("mail{}.txt", id))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Exclusive hold on a capture id. Released on drop.
#[derive(Debug)]
pub struct SlotLease {
    id: u64,
    leased: Arc<DashSet<u64>>,
}

impl SlotLease {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.leased.remove(&self.id);
    }
}

/// A capture being written.
#[derive(Debug)]
pub struct Capture {
    lease: SlotLease,
    path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
    lines: usize,
}

impl Capture {
    /// Open a fresh staging file, truncating whatever a previous use of the slot left.
    /// Fails when every slot is in use.
    pub async fn create(slots: &CaptureSlots) -> io::Result<Self> {
        let lease = slots
            .allocate()
            .ok_or_else(|| io::Error::other("all capture slots are in use"))?;
        let path = slots.path_for(lease.id());
        let file = tokio::fs::File::create(&path).await?;
        tracing::trace!(capture_id = lease.id(), path = ?path, "Capture opened");
        Ok(Self {
            lease,
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub async fn append(&mut self, line: &[u8]) -> io::Result<()> {
        self.writer.write_all(line).await?;
        self.lines += 1;
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.lease.id()
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Drop an unfinished capture and its staging file.
    pub async fn abandon(self) {
        drop(self.writer);
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(capture_id = self.lease.id(), error = %e, "Failed to remove capture file");
            }
        }
    }

    /// Flush and close the staging file.
    pub async fn seal(mut self) -> io::Result<SealedCapture> {
        self.writer.flush().await?;
        let file = self.writer.into_inner();
        file.sync_data().await?;
        Ok(SealedCapture {
            lease: self.lease,
            path: self.path,
        })
    }
}

/// A complete capture, no longer written by the session.
#[derive(Debug)]
pub struct SealedCapture {
    lease: SlotLease,
    path: PathBuf,
}

impl SealedCapture {
    pub fn id(&self) -> u64 {
        self.lease.id()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the stored lines. Blocking.
    pub fn parse(self) -> io::Result<ParsedCapture> {
        let lines = read_lines(&self.path)?;
        let outline = MailOutline::parse(&lines);
        Ok(ParsedCapture {
            capture: self,
            outline,
        })
    }

    /// Remove the staging file, then release the slot. Blocking.
    pub fn discard(self) {
        remove_quietly(self.id(), &self.path);
    }
}

/// A capture with its structure offsets.
#[derive(Debug)]
pub struct ParsedCapture {
    capture: SealedCapture,
    outline: MailOutline,
}

impl ParsedCapture {
    pub fn id(&self) -> u64 {
        self.capture.id()
    }

    pub fn path(&self) -> &Path {
        &self.capture.path
    }

    pub fn outline(&self) -> &MailOutline {
        &self.outline
    }

    /// Current content of the backing store. Blocking.
    pub fn read_lines(&self) -> io::Result<Vec<Vec<u8>>> {
        read_lines(&self.capture.path)
    }

    pub fn discard(self) {
        self.capture.discard();
    }
}

/// Read a file as lines, terminators kept.
pub fn read_lines(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    let content = std::fs::read(path)?;
    Ok(content.split_inclusive(|&b| b == b'\n').map(<[u8]>::to_vec).collect())
}

/// Remove a staging file, ignoring one that is already gone. Blocking.
pub fn remove_quietly(id: u64, path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(capture_id = id, error = %e, "Failed to remove capture file");
        }
    }
}

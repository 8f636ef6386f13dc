//! On-disk parts of a domain.
//!
//! A part is one file holding a contiguous serial range. Only the last part
//! of a domain accepts commits; once closed, its range is frozen. Every
//! persisted chunk is one frame in the file (see [`frame`]), and the part
//! keeps a skip list of frame offsets so reads can seek close to the
//! requested serial.

mod frame;
mod header;

pub use header::{DefaultHeaderContext, FileHeaderContext, HeaderTags};

use crate::config::Encoding;
use crate::dir::part_file_name;
use crate::error::{CoreError, CoreResult};
use frame::{encode_frame, read_frame, FrameOutcome};
use header::{PartHeader, MIN_HEADER_SIZE};
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use translog_codec::{Packet, SerialNum, SerialNumRange};

/// File offset of the frame starting at `serial`.
#[derive(Debug, Clone, Copy)]
struct SkipInfo {
    serial: SerialNum,
    offset: u64,
}

#[derive(Debug)]
struct PartState {
    range: SerialNumRange,
    size: usize,
    byte_size: u64,
    synced_bytes: u64,
    synced_serial: SerialNum,
    closed: bool,
    skip_list: Vec<SkipInfo>,
}

/// A single part file of a domain.
#[derive(Debug)]
pub struct DomainPart {
    domain: String,
    file: PathBuf,
    start_serial: SerialNum,
    encoding: Encoding,
    compression_level: u8,
    header_len: u64,
    tags: HeaderTags,
    writer: Mutex<Option<File>>,
    /// Also serializes concurrent syncs.
    syncer: Mutex<Option<File>>,
    state: RwLock<PartState>,
}

impl DomainPart {
    /// Opens the part of `domain` starting at `start` in `dir`, creating it
    /// if it does not exist.
    ///
    /// `encoding` and `compression_level` apply to new files only; an
    /// existing part keeps what its header says. When `is_last` is set, a
    /// damaged tail is cut off and the file truncated, and a file too short
    /// to hold any header is rewritten as a new empty part. In any other
    /// part the same damage is an error.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, if a complete header fails
    /// validation, or if a part that is not the last one is corrupted.
    pub fn open(
        domain: &str,
        dir: &Path,
        start: SerialNum,
        encoding: Encoding,
        compression_level: u8,
        header_context: &dyn FileHeaderContext,
        is_last: bool,
    ) -> CoreResult<Self> {
        let file = dir.join(part_file_name(domain, start));
        let existing_len = match fs::metadata(&file) {
            Ok(meta) => Some(meta.len()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        let loaded = match existing_len {
            Some(len) if len >= MIN_HEADER_SIZE => Self::load(&file, start, len, is_last)?,
            Some(len) if len > 0 && !is_last => {
                return Err(CoreError::part_corruption(format!(
                    "{} is too short for a part header: {len} bytes",
                    file.display()
                )));
            }
            Some(len) => {
                if len > 0 {
                    tracing::warn!(file = %file.display(), len, "rewriting torn part header");
                }
                Self::create(domain, &file, start, encoding, compression_level, header_context)?
            }
            None => Self::create(domain, &file, start, encoding, compression_level, header_context)?,
        };

        let writer = OpenOptions::new().append(true).open(&file)?;
        let syncer = writer.try_clone()?;
        let Loaded {
            header,
            header_len,
            state,
        } = loaded;

        Ok(Self {
            domain: domain.to_string(),
            file,
            start_serial: start,
            encoding: header.encoding,
            compression_level: header.compression_level,
            header_len,
            tags: header.tags,
            writer: Mutex::new(Some(writer)),
            syncer: Mutex::new(Some(syncer)),
            state: RwLock::new(state),
        })
    }

    fn create(
        domain: &str,
        file: &Path,
        start: SerialNum,
        encoding: Encoding,
        compression_level: u8,
        header_context: &dyn FileHeaderContext,
    ) -> CoreResult<Loaded> {
        let mut tags = HeaderTags::new();
        header_context.add_tags(&mut tags, domain);
        let header = PartHeader {
            encoding,
            compression_level,
            start_serial: start,
            tags,
        };
        let encoded = header.encode()?;

        let mut out = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(file)?;
        out.write_all(&encoded)?;
        out.sync_all()?;
        tracing::debug!(file = %file.display(), "created part");

        let header_len = encoded.len() as u64;
        Ok(Loaded {
            header,
            header_len,
            state: PartState::empty(start, header_len),
        })
    }

    fn load(file: &Path, start: SerialNum, len: u64, is_last: bool) -> CoreResult<Loaded> {
        let mut reader = BufReader::new(File::open(file)?);
        let (header, header_len) = PartHeader::read(&mut reader, len)?;
        if header.start_serial != start {
            return Err(CoreError::part_corruption(format!(
                "header start serial {} does not match file name serial {start}",
                header.start_serial
            )));
        }

        let mut state = PartState::empty(start, header_len);
        let mut offset = header_len;
        loop {
            match read_frame(&mut reader, len - offset)? {
                FrameOutcome::Frame {
                    packet,
                    first,
                    len: frame_len,
                } => {
                    state.append(first, offset, &packet, frame_len);
                    offset += frame_len;
                }
                FrameOutcome::End => break,
                FrameOutcome::Torn(err) if is_last => {
                    tracing::warn!(
                        file = %file.display(),
                        offset,
                        dropped = len - offset,
                        error = %err,
                        "truncating torn tail of part"
                    );
                    let out = OpenOptions::new().write(true).open(file)?;
                    out.set_len(offset)?;
                    out.sync_all()?;
                    break;
                }
                FrameOutcome::Torn(err) => {
                    return Err(CoreError::part_corruption(format!(
                        "{} at offset {offset}: {err}",
                        file.display()
                    )));
                }
            }
        }
        state.synced_bytes = state.byte_size;
        state.synced_serial = state.range.to();

        Ok(Loaded {
            header,
            header_len,
            state,
        })
    }

    /// Appends `packet` as one frame.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PartClosed`] on a closed part,
    /// [`CoreError::OutOfOrder`] if the packet does not start above the
    /// last serial in the part, or an I/O error.
    pub fn commit(&self, packet: &Packet) -> CoreResult<()> {
        if packet.is_empty() {
            return Err(CoreError::invalid_operation("cannot commit an empty packet"));
        }
        let frame = encode_frame(self.encoding.crc(), packet)?;

        let mut writer = self.writer.lock();
        let Some(out) = writer.as_mut() else {
            return Err(self.closed_error());
        };
        let offset = {
            let state = self.state.read();
            if state.size > 0 && packet.range().from() <= state.range.to() {
                return Err(CoreError::OutOfOrder {
                    incoming: packet.range().from(),
                    last: state.range.to(),
                });
            }
            state.byte_size
        };

        out.write_all(&frame)?;
        self.state
            .write()
            .append(packet.range().from(), offset, packet, frame.len() as u64);
        Ok(())
    }

    /// Flushes everything written so far to stable storage.
    ///
    /// A no-op on a closed part, which was synced when it was closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the fsync fails.
    pub fn sync(&self) -> CoreResult<()> {
        let syncer = self.syncer.lock();
        let Some(out) = syncer.as_ref() else {
            return Ok(());
        };
        let (bytes, serial) = {
            let state = self.state.read();
            (state.byte_size, state.range.to())
        };
        out.sync_all()?;

        let mut state = self.state.write();
        if bytes > state.synced_bytes {
            state.synced_bytes = bytes;
            state.synced_serial = serial;
        }
        Ok(())
    }

    /// Syncs and closes the part. Its range is frozen afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails; the part stays open then.
    pub fn close(&self) -> CoreResult<()> {
        self.sync()?;
        drop(self.writer.lock().take());
        drop(self.syncer.lock().take());
        self.state.write().closed = true;
        Ok(())
    }

    /// Drops everything below `to`.
    ///
    /// If `to` is past the last serial the part is closed and its file
    /// deleted, returning `true`. Otherwise the start of the range is
    /// raised to `to`; the file itself is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be closed or removed.
    pub fn erase(&self, to: SerialNum) -> CoreResult<bool> {
        let range = self.range();
        if to > range.to() {
            self.close()?;
            match fs::remove_file(&self.file) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            tracing::debug!(file = %self.file.display(), "removed part");
            return Ok(true);
        }
        let mut state = self.state.write();
        let from = state.range.from().max(to);
        state.range.set_from(from);
        Ok(false)
    }

    /// Reads entries with serial in `[from, to)`.
    ///
    /// Stops once the packet holds at least `max_bytes`, and never reads
    /// past the readable offset: the synced offset if `durable_only`, else
    /// everything written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is damaged within
    /// the readable region.
    pub fn read(
        &self,
        from: SerialNum,
        to: SerialNum,
        durable_only: bool,
        max_bytes: usize,
    ) -> CoreResult<Packet> {
        let mut out = Packet::new();
        let (lower, offset, limit) = {
            let state = self.state.read();
            let lower = from.max(state.range.from());
            if state.size == 0 || lower >= to || lower > state.range.to() {
                return Ok(out);
            }
            let index = state.skip_list.partition_point(|skip| skip.serial <= lower);
            let offset = if index == 0 {
                self.header_len
            } else {
                state.skip_list[index - 1].offset
            };
            let limit = if durable_only {
                state.synced_bytes
            } else {
                state.byte_size
            };
            (lower, offset, limit)
        };

        let mut reader = BufReader::new(File::open(&self.file)?);
        reader.seek(SeekFrom::Start(offset))?;
        let mut pos = offset;
        while pos < limit {
            match read_frame(&mut reader, limit - pos)? {
                FrameOutcome::Frame { packet, len, .. } => {
                    pos += len;
                    if packet.range().to() < lower {
                        continue;
                    }
                    for entry in &packet {
                        let entry = entry?;
                        if entry.serial() < lower {
                            continue;
                        }
                        if entry.serial() >= to {
                            return Ok(out);
                        }
                        out.add(&entry)?;
                        if out.size_bytes() >= max_bytes {
                            return Ok(out);
                        }
                    }
                }
                FrameOutcome::End => break,
                FrameOutcome::Torn(err) => {
                    return Err(CoreError::part_corruption(format!(
                        "{} at offset {pos}: {err}",
                        self.file.display()
                    )));
                }
            }
        }
        Ok(out)
    }

    /// Last serial a reader may see: the last synced serial if
    /// `durable_only`, else the last written one.
    #[must_use]
    pub fn readable_to(&self, durable_only: bool) -> SerialNum {
        let state = self.state.read();
        if durable_only {
            state.synced_serial
        } else {
            state.range.to()
        }
    }

    /// Serial range held by the part.
    #[must_use]
    pub fn range(&self) -> SerialNumRange {
        self.state.read().range
    }

    /// Number of entries in the part.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.read().size
    }

    /// Size of the file in bytes, header included.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.state.read().byte_size
    }

    /// Last serial known to be on stable storage.
    #[must_use]
    pub fn get_synced(&self) -> SerialNum {
        self.state.read().synced_serial
    }

    /// Returns true once the part has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// First serial the part was created for.
    #[must_use]
    pub fn start_serial(&self) -> SerialNum {
        self.start_serial
    }

    /// Path of the part file.
    #[must_use]
    pub fn file_name(&self) -> &Path {
        &self.file
    }

    /// Frame encoding of the part.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Compression level recorded in the header.
    #[must_use]
    pub fn compression_level(&self) -> u8 {
        self.compression_level
    }

    /// Tags recorded in the header.
    #[must_use]
    pub fn tags(&self) -> &HeaderTags {
        &self.tags
    }

    fn closed_error(&self) -> CoreError {
        tracing::debug!(domain = %self.domain, file = %self.file.display(), "write to closed part");
        CoreError::PartClosed {
            file: self.file.clone(),
        }
    }
}

impl PartState {
    fn empty(start: SerialNum, header_len: u64) -> Self {
        let range = SerialNumRange::starting_at(start);
        Self {
            range,
            size: 0,
            byte_size: header_len,
            synced_bytes: header_len,
            synced_serial: range.to(),
            closed: false,
            skip_list: Vec::new(),
        }
    }

    fn append(&mut self, first: SerialNum, offset: u64, packet: &Packet, len: u64) {
        let range = packet.range();
        if self.size == 0 {
            self.range = range;
        } else {
            self.range.set_to(range.to());
        }
        self.size += packet.size();
        self.byte_size = offset + len;
        self.skip_list.push(SkipInfo {
            serial: first,
            offset,
        });
    }
}

struct Loaded {
    header: PartHeader,
    header_len: u64,
    state: PartState,
}

//! Clustered Stream
//!
//! `SlotStream` implementation over any `Read + Write + Seek` backing store.
//! Records are cluster chains; released clusters go on a free list and are
//! reused before the stream grows.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use tracing::{debug, info, trace};

use crate::config::ContainerConfig;
use crate::error::{Result, StreamKvError};

use super::{
    SlotDescriptor, SlotStream, SlotTraits, StreamHeader, CLUSTER_HEADER_SIZE, DESCRIPTOR_SIZE,
    END_OF_CHAIN, EXTENSION_SIZE, HEADER_SIZE,
};

/// Smallest accepted cluster size
const MIN_CLUSTER_SIZE: u32 = 8;

// =============================================================================
// Record Header (on-disk descriptor)
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct RecordHeader {
    traits: SlotTraits,
    checksum: i32,
    key_len: u32,
    length: u64,
    first_cluster: u64,
}

impl RecordHeader {
    fn empty() -> Self {
        Self {
            traits: SlotTraits::NONE,
            checksum: 0,
            key_len: 0,
            length: 0,
            first_cluster: END_OF_CHAIN,
        }
    }

    fn descriptor(&self) -> SlotDescriptor {
        SlotDescriptor {
            traits: self.traits,
            checksum: self.checksum,
            key_len: self.key_len,
            length: self.length,
        }
    }
}

// =============================================================================
// Clustered Stream
// =============================================================================

/// Cluster-chained record stream
pub struct ClusteredStream<S> {
    /// Backing byte store
    inner: S,
    /// Cached header, rewritten after every structural change
    header: StreamHeader,
    /// Cluster chain of the descriptor table
    table: Vec<u64>,
}

impl ClusteredStream<Cursor<Vec<u8>>> {
    /// Create a stream backed by an in-memory buffer
    pub fn in_memory(config: &ContainerConfig) -> Result<Self> {
        Self::create(Cursor::new(Vec::new()), config)
    }
}

impl<S: Read + Write + Seek + Send> ClusteredStream<S> {
    /// Initialize a new stream on an empty backing store
    ///
    /// Writes the header and appends the reserved provider records.
    pub fn create(inner: S, config: &ContainerConfig) -> Result<Self> {
        if config.cluster_size < MIN_CLUSTER_SIZE {
            return Err(StreamKvError::Config(format!(
                "Cluster size {} below minimum {}",
                config.cluster_size, MIN_CLUSTER_SIZE
            )));
        }

        let mut stream = Self {
            inner,
            header: StreamHeader::new(config),
            table: Vec::new(),
        };
        stream.write_header()?;

        for _ in 0..config.reserved_slots {
            let record = stream.append_record()?;
            stream.set_traits(record, SlotTraits::USED, 0)?;
        }

        info!(
            cluster_size = config.cluster_size,
            reserved = config.reserved_slots,
            endianness = ?config.endianness,
            "Created clustered stream"
        );

        Ok(stream)
    }

    /// Open an existing stream, validating its header and descriptor table
    pub fn open(mut inner: S) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; HEADER_SIZE as usize];
        inner.read_exact(&mut buf)?;

        let header = StreamHeader::decode(&buf)?;
        if header.cluster_size < MIN_CLUSTER_SIZE {
            return Err(StreamKvError::Corruption(format!(
                "Cluster size {} below minimum {}",
                header.cluster_size, MIN_CLUSTER_SIZE
            )));
        }
        if header.record_count < header.reserved_records as u64 {
            return Err(StreamKvError::Corruption(format!(
                "Record count {} smaller than reserved region {}",
                header.record_count, header.reserved_records
            )));
        }

        let mut stream = Self {
            inner,
            header,
            table: Vec::new(),
        };

        let table_head = stream.header.table_head;
        stream.table = stream.chain(table_head)?;

        let needed = stream.clusters_for(stream.header.record_count * DESCRIPTOR_SIZE);
        if (stream.table.len() as u64) < needed {
            return Err(StreamKvError::Corruption(format!(
                "Descriptor table has {} clusters, {} records need {}",
                stream.table.len(),
                stream.header.record_count,
                needed
            )));
        }

        info!(
            records = stream.header.record_count,
            clusters = stream.header.cluster_count,
            "Opened clustered stream"
        );

        Ok(stream)
    }

    /// Consume the stream and return the backing store
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Borrow the backing store
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    // =========================================================================
    // Raw I/O
    // =========================================================================

    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.write_all(data)?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let bytes = self.header.encode();
        self.write_at(0, &bytes)
    }

    // =========================================================================
    // Clusters
    // =========================================================================

    fn cluster_size(&self) -> u64 {
        self.header.cluster_size as u64
    }

    fn clusters_for(&self, bytes: u64) -> u64 {
        bytes.div_ceil(self.cluster_size())
    }

    fn cluster_offset(&self, cluster: u64) -> u64 {
        HEADER_SIZE + cluster * (CLUSTER_HEADER_SIZE + self.cluster_size())
    }

    fn check_cluster(&self, cluster: u64) -> Result<()> {
        if cluster >= self.header.cluster_count {
            return Err(StreamKvError::Corruption(format!(
                "Cluster {} beyond cluster count {}",
                cluster, self.header.cluster_count
            )));
        }
        Ok(())
    }

    fn read_next(&mut self, cluster: u64) -> Result<u64> {
        let mut buf = [0u8; CLUSTER_HEADER_SIZE as usize];
        let pos = self.cluster_offset(cluster);
        self.read_at(pos, &mut buf)?;
        Ok(self.header.endianness.read_u64(&buf))
    }

    fn write_next(&mut self, cluster: u64, next: u64) -> Result<()> {
        let bytes = self.header.endianness.u64_bytes(next);
        let pos = self.cluster_offset(cluster);
        self.write_at(pos, &bytes)
    }

    /// Take a cluster from the free list, or grow the stream by one
    fn allocate_cluster(&mut self) -> Result<u64> {
        let cluster_size = self.cluster_size();

        if self.header.free_head != END_OF_CHAIN {
            let cluster = self.header.free_head;
            self.check_cluster(cluster)?;
            self.header.free_head = self.read_next(cluster)?;
            self.write_next(cluster, END_OF_CHAIN)?;

            if !self.header.policy.fast_allocate {
                let zeros = vec![0u8; cluster_size as usize];
                let pos = self.cluster_offset(cluster) + CLUSTER_HEADER_SIZE;
                self.write_at(pos, &zeros)?;
            }

            trace!(cluster, "Reused free cluster");
            return Ok(cluster);
        }

        let cluster = self.header.cluster_count;
        let mut bytes = vec![0u8; (CLUSTER_HEADER_SIZE + cluster_size) as usize];
        bytes[..CLUSTER_HEADER_SIZE as usize]
            .copy_from_slice(&self.header.endianness.u64_bytes(END_OF_CHAIN));
        let pos = self.cluster_offset(cluster);
        self.write_at(pos, &bytes)?;
        self.header.cluster_count += 1;

        trace!(cluster, "Appended cluster");
        Ok(cluster)
    }

    /// Push clusters onto the free list
    fn release_clusters(&mut self, clusters: &[u64]) -> Result<()> {
        for &cluster in clusters {
            let head = self.header.free_head;
            self.write_next(cluster, head)?;
            self.header.free_head = cluster;
        }
        if !clusters.is_empty() {
            trace!(count = clusters.len(), "Released clusters");
        }
        Ok(())
    }

    /// Walk a chain from its first cluster
    fn chain(&mut self, first: u64) -> Result<Vec<u64>> {
        let mut chain = Vec::new();
        let mut current = first;

        while current != END_OF_CHAIN {
            self.check_cluster(current)?;
            if chain.len() as u64 >= self.header.cluster_count {
                return Err(StreamKvError::Corruption(format!(
                    "Cluster chain starting at {} does not terminate",
                    first
                )));
            }
            chain.push(current);
            current = self.read_next(current)?;
        }

        Ok(chain)
    }

    /// Grow or shrink a chain to hold `bytes`, returning its (new) first cluster
    fn resize_chain(&mut self, chain: &mut Vec<u64>, bytes: u64) -> Result<u64> {
        let needed = self.clusters_for(bytes) as usize;

        while chain.len() < needed {
            let cluster = self.allocate_cluster()?;
            if let Some(&last) = chain.last() {
                self.write_next(last, cluster)?;
            }
            chain.push(cluster);
        }

        if chain.len() > needed {
            let tail = chain.split_off(needed);
            if let Some(&last) = chain.last() {
                self.write_next(last, END_OF_CHAIN)?;
            }
            self.release_clusters(&tail)?;
        }

        Ok(chain.first().copied().unwrap_or(END_OF_CHAIN))
    }

    fn read_chain(&mut self, chain: &[u64], offset: u64, buf: &mut [u8]) -> Result<()> {
        let cluster_size = self.cluster_size();
        let mut done = 0usize;

        while done < buf.len() {
            let pos = offset + done as u64;
            let cluster = *chain.get((pos / cluster_size) as usize).ok_or_else(|| {
                StreamKvError::Corruption(format!("Read at {} runs past cluster chain", pos))
            })?;
            let within = pos % cluster_size;
            let n = (cluster_size - within).min((buf.len() - done) as u64) as usize;

            let at = self.cluster_offset(cluster) + CLUSTER_HEADER_SIZE + within;
            self.read_at(at, &mut buf[done..done + n])?;
            done += n;
        }

        Ok(())
    }

    fn write_chain(&mut self, chain: &[u64], offset: u64, data: &[u8]) -> Result<()> {
        let cluster_size = self.cluster_size();
        let mut done = 0usize;

        while done < data.len() {
            let pos = offset + done as u64;
            let cluster = *chain.get((pos / cluster_size) as usize).ok_or_else(|| {
                StreamKvError::Corruption(format!("Write at {} runs past cluster chain", pos))
            })?;
            let within = pos % cluster_size;
            let n = (cluster_size - within).min((data.len() - done) as u64) as usize;

            let at = self.cluster_offset(cluster) + CLUSTER_HEADER_SIZE + within;
            self.write_at(at, &data[done..done + n])?;
            done += n;
        }

        Ok(())
    }

    // =========================================================================
    // Descriptor Table
    // =========================================================================

    fn check_record(&self, record: u64) -> Result<()> {
        if record >= self.header.record_count {
            return Err(StreamKvError::IndexOutOfRange {
                index: record,
                len: self.header.record_count,
            });
        }
        Ok(())
    }

    fn read_table(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let table = std::mem::take(&mut self.table);
        let result = self.read_chain(&table, offset, buf);
        self.table = table;
        result
    }

    fn write_table(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let table = std::mem::take(&mut self.table);
        let result = self.write_chain(&table, offset, data);
        self.table = table;
        result
    }

    /// Size the descriptor table for `records` descriptors
    fn resize_table(&mut self, records: u64) -> Result<()> {
        let mut table = std::mem::take(&mut self.table);
        let result = self.resize_chain(&mut table, records * DESCRIPTOR_SIZE);
        self.table = table;
        self.header.table_head = result?;
        Ok(())
    }

    fn read_record_header(&mut self, record: u64) -> Result<RecordHeader> {
        self.check_record(record)?;

        let mut buf = [0u8; DESCRIPTOR_SIZE as usize];
        self.read_table(record * DESCRIPTOR_SIZE, &mut buf)?;

        let e = self.header.endianness;
        Ok(RecordHeader {
            traits: SlotTraits::from_bits(e.read_u32(&buf[0..4])),
            checksum: e.read_u32(&buf[4..8]) as i32,
            key_len: e.read_u32(&buf[8..12]),
            length: e.read_u64(&buf[16..24]),
            first_cluster: e.read_u64(&buf[24..32]),
        })
    }

    fn write_record_header(&mut self, record: u64, header: &RecordHeader) -> Result<()> {
        self.check_record(record)?;

        let e = self.header.endianness;
        let mut buf = [0u8; DESCRIPTOR_SIZE as usize];
        buf[0..4].copy_from_slice(&e.u32_bytes(header.traits.bits()));
        buf[4..8].copy_from_slice(&e.u32_bytes(header.checksum as u32));
        buf[8..12].copy_from_slice(&e.u32_bytes(header.key_len));
        buf[16..24].copy_from_slice(&e.u64_bytes(header.length));
        buf[24..32].copy_from_slice(&e.u64_bytes(header.first_cluster));

        self.write_table(record * DESCRIPTOR_SIZE, &buf)
    }
}

// =============================================================================
// SlotStream Implementation
// =============================================================================

impl<S: Read + Write + Seek + Send> SlotStream for ClusteredStream<S> {
    fn header(&self) -> &StreamHeader {
        &self.header
    }

    fn descriptor(&mut self, record: u64) -> Result<SlotDescriptor> {
        Ok(self.read_record_header(record)?.descriptor())
    }

    fn set_traits(&mut self, record: u64, traits: SlotTraits, checksum: i32) -> Result<()> {
        let mut header = self.read_record_header(record)?;
        header.traits = traits;
        header.checksum = checksum;
        self.write_record_header(record, &header)
    }

    fn reap_record(&mut self, record: u64) -> Result<()> {
        let mut header = self.read_record_header(record)?;
        header.traits = SlotTraits::REAPED;
        header.checksum = 0;
        header.key_len = 0;
        self.write_record_header(record, &header)
    }

    fn write_record(
        &mut self,
        record: u64,
        traits: SlotTraits,
        checksum: i32,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let key_len = u32::try_from(key.len()).map_err(|_| {
            StreamKvError::Config(format!("Inline key of {} bytes too large", key.len()))
        })?;

        let header = self.read_record_header(record)?;
        let mut chain = self.chain(header.first_cluster)?;
        let total = key.len() as u64 + value.len() as u64;
        let first_cluster = self.resize_chain(&mut chain, total)?;

        self.write_chain(&chain, 0, key)?;
        self.write_chain(&chain, key.len() as u64, value)?;

        let updated = RecordHeader {
            traits,
            checksum,
            key_len,
            length: total,
            first_cluster,
        };
        self.write_record_header(record, &updated)?;
        self.write_header()?;

        debug!(record, key_len, value_len = value.len(), "Wrote record");
        Ok(())
    }

    fn read_key(&mut self, record: u64) -> Result<Vec<u8>> {
        let header = self.read_record_header(record)?;
        let mut key = vec![0u8; header.key_len as usize];
        if !key.is_empty() {
            let chain = self.chain(header.first_cluster)?;
            self.read_chain(&chain, 0, &mut key)?;
        }
        Ok(key)
    }

    fn read_value(&mut self, record: u64) -> Result<Vec<u8>> {
        let header = self.read_record_header(record)?;
        let len = header.length.saturating_sub(header.key_len as u64);
        let mut value = vec![0u8; len as usize];
        if !value.is_empty() {
            let chain = self.chain(header.first_cluster)?;
            self.read_chain(&chain, header.key_len as u64, &mut value)?;
        }
        Ok(value)
    }

    fn read_range(&mut self, record: u64, offset: u64, len: usize) -> Result<Vec<u8>> {
        let header = self.read_record_header(record)?;
        let end = offset + len as u64;
        if end > header.length {
            return Err(StreamKvError::IndexOutOfRange {
                index: end,
                len: header.length,
            });
        }

        let mut buf = vec![0u8; len];
        if len > 0 {
            let chain = self.chain(header.first_cluster)?;
            self.read_chain(&chain, offset, &mut buf)?;
        }
        Ok(buf)
    }

    fn write_range(&mut self, record: u64, offset: u64, data: &[u8]) -> Result<()> {
        let mut header = self.read_record_header(record)?;
        let end = offset + data.len() as u64;
        let new_len = header.length.max(end);

        let mut chain = self.chain(header.first_cluster)?;
        header.first_cluster = self.resize_chain(&mut chain, new_len)?;

        // Stale bytes past the old length must not leak into the gap
        if offset > header.length {
            let gap = vec![0u8; (offset - header.length) as usize];
            self.write_chain(&chain, header.length, &gap)?;
        }
        self.write_chain(&chain, offset, data)?;

        header.length = new_len;
        self.write_record_header(record, &header)?;
        self.write_header()
    }

    fn truncate(&mut self, record: u64, len: u64) -> Result<()> {
        let mut header = self.read_record_header(record)?;
        if len > header.length {
            return Err(StreamKvError::IndexOutOfRange {
                index: len,
                len: header.length,
            });
        }

        let mut chain = self.chain(header.first_cluster)?;
        header.first_cluster = self.resize_chain(&mut chain, len)?;
        header.length = len;
        header.key_len = header.key_len.min(len as u32);

        self.write_record_header(record, &header)?;
        self.write_header()
    }

    fn append_record(&mut self) -> Result<u64> {
        let record = self.header.record_count;
        self.resize_table(record + 1)?;
        self.header.record_count = record + 1;
        self.write_record_header(record, &RecordHeader::empty())?;
        self.write_header()?;
        Ok(record)
    }

    fn insert_record(&mut self, record: u64) -> Result<()> {
        let count = self.header.record_count;
        if record > count {
            return Err(StreamKvError::IndexOutOfRange { index: record, len: count });
        }

        self.resize_table(count + 1)?;
        self.header.record_count = count + 1;

        if record < count {
            let mut tail = vec![0u8; ((count - record) * DESCRIPTOR_SIZE) as usize];
            self.read_table(record * DESCRIPTOR_SIZE, &mut tail)?;
            self.write_table((record + 1) * DESCRIPTOR_SIZE, &tail)?;
        }

        self.write_record_header(record, &RecordHeader::empty())?;
        self.write_header()
    }

    fn remove_record(&mut self, record: u64) -> Result<()> {
        let header = self.read_record_header(record)?;
        let chain = self.chain(header.first_cluster)?;
        self.release_clusters(&chain)?;

        let count = self.header.record_count;
        if record + 1 < count {
            let mut tail = vec![0u8; ((count - record - 1) * DESCRIPTOR_SIZE) as usize];
            self.read_table((record + 1) * DESCRIPTOR_SIZE, &mut tail)?;
            self.write_table(record * DESCRIPTOR_SIZE, &tail)?;
        }

        self.header.record_count = count - 1;
        self.resize_table(count - 1)?;
        self.write_header()?;

        debug!(record, released = chain.len(), "Removed record");
        Ok(())
    }

    fn write_extension(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = match offset.checked_add(data.len()) {
            Some(end) if end <= EXTENSION_SIZE => end,
            _ => {
                return Err(StreamKvError::IndexOutOfRange {
                    index: offset as u64,
                    len: EXTENSION_SIZE as u64,
                })
            }
        };

        self.header.extension[offset..end].copy_from_slice(data);
        self.write_header()
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

//! On-disk pack fixtures for integration tests.
//!
//! Builds real `.pack`/`.idx` sibling pairs without shelling out to git:
//! entries are zlib-compressed, offsets (including >2 GiB placements via
//! sparse seeks) are tracked during serialization, and the index carries a
//! correct trailing self-digest so the loader's verification passes.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

use gitread_rs::pack_store::{ObjectId, ObjectKind};

/// Offset entries at or above this go through the large-offset table.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// One entry to serialize into a pack.
enum EntrySpec {
    Plain {
        type_byte: u8,
        payload: Vec<u8>,
    },
    OfsDelta {
        base_index: usize,
        delta: Vec<u8>,
    },
    RefDelta {
        base_id: ObjectId,
        delta: Vec<u8>,
    },
}

struct BuildEntry {
    id: ObjectId,
    spec: EntrySpec,
    at: Option<u64>,
}

/// Incrementally describes a pack, then writes it plus its index.
pub struct PackBuilder {
    entries: Vec<BuildEntry>,
}

/// Paths and offsets of a written pack.
pub struct WrittenPack {
    pub idx_path: PathBuf,
    pub pack_path: PathBuf,
    pub offsets: Vec<u64>,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a plain object; its id is the real content digest.
    pub fn plain(&mut self, kind: ObjectKind, payload: &[u8]) -> (usize, ObjectId) {
        let id = ObjectId::digest_object(kind, payload);
        self.push(id, plain_spec(kind, payload), None)
    }

    /// Adds a plain object at an explicit pack offset (sparse-seek there).
    pub fn plain_at(&mut self, kind: ObjectKind, payload: &[u8], at: u64) -> (usize, ObjectId) {
        let id = ObjectId::digest_object(kind, payload);
        self.push(id, plain_spec(kind, payload), Some(at))
    }

    /// Adds a plain entry with a raw type byte (for malformed-type tests).
    pub fn plain_raw(&mut self, type_byte: u8, payload: &[u8], id: ObjectId) -> (usize, ObjectId) {
        self.push(
            id,
            EntrySpec::Plain {
                type_byte,
                payload: payload.to_vec(),
            },
            None,
        )
    }

    /// Adds an offset delta against an earlier entry of this pack.
    pub fn ofs_delta(&mut self, id: ObjectId, base_index: usize, delta: Vec<u8>) -> (usize, ObjectId) {
        assert!(base_index < self.entries.len(), "base must precede delta");
        self.push(id, EntrySpec::OfsDelta { base_index, delta }, None)
    }

    /// Adds a ref delta against an object named by id (any pack).
    pub fn ref_delta(&mut self, id: ObjectId, base_id: ObjectId, delta: Vec<u8>) -> (usize, ObjectId) {
        self.push(id, EntrySpec::RefDelta { base_id, delta }, None)
    }

    fn push(&mut self, id: ObjectId, spec: EntrySpec, at: Option<u64>) -> (usize, ObjectId) {
        self.entries.push(BuildEntry { id, spec, at });
        (self.entries.len() - 1, id)
    }

    /// Serializes the pack and index into `pack_dir`.
    pub fn write(&self, pack_dir: &Path) -> WrittenPack {
        fs::create_dir_all(pack_dir).unwrap();
        let tmp_pack = pack_dir.join("incoming.pack");
        let mut pack = File::create(&tmp_pack).unwrap();
        let mut digest = Sha1::new();

        let mut header = Vec::new();
        header.extend_from_slice(b"PACK");
        header.extend_from_slice(&2u32.to_be_bytes());
        header.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        pack.write_all(&header).unwrap();
        digest.update(&header);

        let mut offsets = Vec::with_capacity(self.entries.len());
        let mut cursor = header.len() as u64;
        for entry in &self.entries {
            let offset = match entry.at {
                Some(at) => {
                    assert!(at >= cursor, "explicit offsets must not overlap");
                    pack.seek(SeekFrom::Start(at)).unwrap();
                    at
                }
                None => cursor,
            };

            let mut bytes = Vec::new();
            match &entry.spec {
                EntrySpec::Plain { type_byte, payload } => {
                    bytes.extend_from_slice(&entry_header(*type_byte, payload.len() as u64));
                    bytes.extend_from_slice(&compress(payload));
                }
                EntrySpec::OfsDelta { base_index, delta } => {
                    bytes.extend_from_slice(&entry_header(6, delta.len() as u64));
                    let base_offset: u64 = offsets[*base_index];
                    bytes.extend_from_slice(&negative_offset(offset - base_offset));
                    bytes.extend_from_slice(&compress(delta));
                }
                EntrySpec::RefDelta { base_id, delta } => {
                    bytes.extend_from_slice(&entry_header(7, delta.len() as u64));
                    bytes.extend_from_slice(base_id.as_bytes());
                    bytes.extend_from_slice(&compress(delta));
                }
            }
            pack.write_all(&bytes).unwrap();
            digest.update(&bytes);
            offsets.push(offset);
            cursor = offset + bytes.len() as u64;
        }

        let pack_sha: [u8; 20] = digest.finalize().into();
        pack.write_all(&pack_sha).unwrap();
        pack.flush().unwrap();
        drop(pack);

        let pack_size = fs::metadata(&tmp_pack).unwrap().len();
        let idx_bytes = build_idx(&self.entries, &offsets, &pack_sha, pack_size);

        let hex: String = pack_sha.iter().map(|b| format!("{b:02x}")).collect();
        let pack_path = pack_dir.join(format!("pack-{hex}.pack"));
        let idx_path = pack_dir.join(format!("pack-{hex}.idx"));
        fs::rename(&tmp_pack, &pack_path).unwrap();
        fs::write(&idx_path, idx_bytes).unwrap();

        WrittenPack {
            idx_path,
            pack_path,
            offsets,
        }
    }
}

fn plain_spec(kind: ObjectKind, payload: &[u8]) -> EntrySpec {
    let type_byte = match kind {
        ObjectKind::Commit => 1,
        ObjectKind::Tree => 2,
        ObjectKind::Blob => 3,
        ObjectKind::Tag => 4,
    };
    EntrySpec::Plain {
        type_byte,
        payload: payload.to_vec(),
    }
}

fn build_idx(
    entries: &[BuildEntry],
    offsets: &[u64],
    pack_sha: &[u8; 20],
    pack_size: u64,
) -> Vec<u8> {
    let mut sorted: Vec<(ObjectId, u64)> = entries
        .iter()
        .zip(offsets)
        .map(|(entry, offset)| (entry.id, *offset))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut counts = [0u32; 256];
    for (id, _) in &sorted {
        counts[id.first_byte() as usize] += 1;
    }

    let mut out = Vec::new();
    out.extend_from_slice(&[0xff, b't', b'O', b'c']);
    out.extend_from_slice(&2u32.to_be_bytes());
    let mut running = 0u32;
    for count in counts {
        running += count;
        out.extend_from_slice(&running.to_be_bytes());
    }
    for (id, _) in &sorted {
        out.extend_from_slice(id.as_bytes());
    }
    out.extend_from_slice(&vec![0u8; sorted.len() * 4]); // CRC table
    let mut large = Vec::new();
    for (_, offset) in &sorted {
        if *offset >= LARGE_OFFSET_FLAG as u64 {
            let idx = (large.len() / 8) as u32;
            out.extend_from_slice(&(LARGE_OFFSET_FLAG | idx).to_be_bytes());
            large.extend_from_slice(&offset.to_be_bytes());
        } else {
            out.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }
    if pack_size > 0x8000_0000 {
        out.extend_from_slice(&large);
    } else {
        assert!(large.is_empty(), "large offsets need a large pack");
    }
    out.extend_from_slice(pack_sha);
    let digest: [u8; 20] = Sha1::digest(&out).into();
    out.extend_from_slice(&digest);
    out
}

fn entry_header(type_byte: u8, mut size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut byte = (type_byte << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size != 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(byte);
    out
}

fn negative_offset(mut value: u64) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value != 0 {
        value -= 1;
        out.insert(0, (value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Builds an insert-only delta producing `result` from any base of
/// `base_len` bytes.
pub fn insert_delta(base_len: usize, result: &[u8]) -> Vec<u8> {
    let mut out = varint(base_len as u64);
    out.extend_from_slice(&varint(result.len() as u64));
    for chunk in result.chunks(127) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out
}

/// Builds a delta that copies the whole base and appends `suffix`,
/// producing `base` followed by `suffix`.
pub fn append_delta(base: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut out = varint(base.len() as u64);
    out.extend_from_slice(&varint((base.len() + suffix.len()) as u64));
    // Copy command for (offset 0, size base.len()).
    let size = base.len();
    assert!(size > 0 && size < 1 << 24);
    let mut cmd = 0x80u8;
    let mut tail = Vec::new();
    for (i, bit) in [(0usize, 0x10u8), (1, 0x20), (2, 0x40)] {
        let byte = ((size >> (i * 8)) & 0xff) as u8;
        if byte != 0 {
            cmd |= bit;
            tail.push(byte);
        }
    }
    out.push(cmd);
    out.extend_from_slice(&tail);
    for chunk in suffix.chunks(127) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out
}

fn varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}

/// Creates a bare-layout repository directory and returns its root.
pub fn repo_dir(root: &Path) -> PathBuf {
    let repo = root.join("repo");
    fs::create_dir_all(repo.join("objects/pack")).unwrap();
    repo
}

/// The `objects/pack` directory of a fixture repository.
pub fn pack_dir(repo: &Path) -> PathBuf {
    repo.join("objects/pack")
}

/// Opens a written pack file for direct byte surgery in corruption tests.
pub fn reopen_rw(path: &Path) -> File {
    OpenOptions::new().read(true).write(true).open(path).unwrap()
}

//! Parser for commit object payloads.
//!
//! Extracts the fields history walks need: the tree id, parent ids, and
//! the message. Header lines are expected in the standard order (`tree`,
//! zero or more `parent`, then author/committer and friends); parsing
//! stops caring about headers once the blank line before the message is
//! reached.
//!
//! ```text
//! tree <hex-oid>\n
//! parent <hex-oid>\n   (zero or more)
//! author <name> <email> <timestamp> <tz>\n
//! committer <name> <email> <timestamp> <tz>\n
//! \n
//! <message>
//! ```

use super::errors::StoreError;
use super::object_id::ObjectId;

/// Parsed commit fields.
#[derive(Clone, Debug)]
pub struct Commit {
    /// Root tree of this commit.
    pub tree: ObjectId,
    /// Parent commits, in header order.
    pub parents: Vec<ObjectId>,
    /// Raw message bytes (everything after the blank line).
    pub message: Vec<u8>,
}

impl Commit {
    /// Parses a commit payload (decompressed, no `commit <len>\0` header).
    ///
    /// # Errors
    /// `BadObjectData` on a missing tree header, malformed hex ids, or a
    /// payload without the header/message separator.
    pub fn parse(payload: &[u8]) -> Result<Self, StoreError> {
        let mut tree = None;
        let mut parents = Vec::new();
        let mut rest = payload;

        loop {
            let line_end = rest.iter().position(|&b| b == b'\n').ok_or({
                StoreError::BadObjectData {
                    detail: "commit missing header terminator",
                }
            })?;
            let line = &rest[..line_end];
            rest = &rest[line_end + 1..];

            if line.is_empty() {
                // Blank line: the message follows.
                break;
            }
            if let Some(hex) = field(line, b"tree ") {
                if tree.is_some() {
                    return Err(StoreError::BadObjectData {
                        detail: "commit has more than one tree header",
                    });
                }
                tree = Some(parse_hex_id(hex)?);
            } else if let Some(hex) = field(line, b"parent ") {
                parents.push(parse_hex_id(hex)?);
            }
            // author, committer, gpgsig continuations and unknown headers
            // are skipped; the walk does not need them.
        }

        Ok(Self {
            tree: tree.ok_or(StoreError::BadObjectData {
                detail: "commit missing tree header",
            })?,
            parents,
            message: rest.to_vec(),
        })
    }
}

/// Returns the value of a `<key> <value>` header line, if it matches.
fn field<'a>(line: &'a [u8], key: &[u8]) -> Option<&'a [u8]> {
    line.strip_prefix(key)
}

fn parse_hex_id(hex: &[u8]) -> Result<ObjectId, StoreError> {
    let hex = std::str::from_utf8(hex).map_err(|_| StoreError::BadObjectData {
        detail: "object id is not hex",
    })?;
    ObjectId::from_hex(hex)
}

//! SHA-256 Merkle fingerprint of a forest.
//!
//! A node hash covers its kind, path and reported fields; a directory hash
//! additionally covers its children's hashes in name order. Export line
//! numbers and computed rollups are left out, so two forests built from any
//! permutation of the same records share a digest.

use sha2::{Digest, Sha256};

use crate::inventory::fields::NodeFields;
use crate::inventory::tree::{Forest, Node};

/// 32-byte SHA-256 hash.
pub type ForestHash = [u8; 32];

const DIRECTORY_TAG: u8 = b'd';
const FILE_TAG: u8 = b'f';

/// Digest of every tree in the forest, roots combined in path order.
pub fn forest_digest(forest: &Forest) -> ForestHash {
    let mut hashes: Vec<Option<ForestHash>> = vec![None; forest.len()];
    for id in forest.walk().into_iter().rev() {
        let node = forest.node(id);
        let mut hasher = Sha256::new();
        hasher.update(node_hash(node));
        for child in forest.children(id) {
            if let Some(child_hash) = hashes[child.0] {
                hasher.update(child_hash);
            }
        }
        hashes[id.0] = Some(hasher.finalize().into());
    }

    let mut hasher = Sha256::new();
    for root in forest.roots() {
        if let Some(root_hash) = hashes[root.0] {
            hasher.update(root_hash);
        }
    }
    hasher.finalize().into()
}

/// Hash of one node's own content, without its children.
pub fn node_hash(node: &Node) -> ForestHash {
    let mut hasher = Sha256::new();
    hasher.update([if node.is_directory() {
        DIRECTORY_TAG
    } else {
        FILE_TAG
    }]);
    update_str(&mut hasher, &node.full_path);
    update_fields(&mut hasher, &node.fields);
    hasher.finalize().into()
}

fn update_fields(hasher: &mut Sha256, fields: &NodeFields) {
    for value in [fields.size, fields.allocated] {
        update_opt(hasher, value.map(u64::to_le_bytes).as_ref().map(<[u8; 8]>::as_slice));
    }
    for stamp in [fields.last_modified, fields.last_accessed, fields.created] {
        let text = stamp.map(|ts| ts.to_string());
        update_opt(hasher, text.as_deref().map(str::as_bytes));
    }
    for text in [
        &fields.owner,
        &fields.permissions,
        &fields.inherited_permissions,
        &fields.own_permissions,
        &fields.type_label,
        &fields.attributes,
    ] {
        update_opt(hasher, text.as_deref().map(str::as_bytes));
    }
    hasher.update([u8::from(fields.unreadable)]);
}

fn update_str(hasher: &mut Sha256, text: &str) {
    hasher.update((text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

fn update_opt(hasher: &mut Sha256, value: Option<&[u8]>) {
    match value {
        Some(bytes) => {
            hasher.update([1]);
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        None => hasher.update([0]),
    }
}

/// Lowercase hex rendering for reports.
pub fn hash_hex(hash: &ForestHash) -> String {
    use std::fmt::Write;
    hash.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

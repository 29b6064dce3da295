//! History walk and tree listing over a synthetic three-commit repository.
//!
//! Commit one adds `alpha`, commit two adds `beta`, commit three adds
//! `gamma/delta`; everything lives in a single pack.

use std::collections::BTreeSet;

use gitread_rs::pack_store::{
    Commit, ObjectId, ObjectKind, Repository, TreeIter,
};

use crate::pack_fixture::{pack_dir, repo_dir, PackBuilder};

/// Serializes tree entries into a tree payload.
fn tree_payload(entries: &[(&str, &str, ObjectId)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (mode, name, id) in entries {
        out.extend_from_slice(mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(id.as_bytes());
    }
    out
}

/// Serializes a commit payload.
fn commit_payload(tree: ObjectId, parents: &[ObjectId], message: &str) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("tree {tree}\n"));
    for parent in parents {
        out.push_str(&format!("parent {parent}\n"));
    }
    out.push_str("author Ada <ada@example.com> 1700000000 +0000\n");
    out.push_str("committer Ada <ada@example.com> 1700000000 +0000\n");
    out.push('\n');
    out.push_str(message);
    out.into_bytes()
}

#[test]
fn three_commit_walk_and_tree_listing() {
    let tmp = tempfile::tempdir().unwrap();
    let repo_root = repo_dir(tmp.path());

    let mut builder = PackBuilder::new();
    let (_, alpha) = builder.plain(ObjectKind::Blob, b"alpha\n");
    let (_, beta) = builder.plain(ObjectKind::Blob, b"beta\n");
    let (_, delta) = builder.plain(ObjectKind::Blob, b"delta\n");

    let tree1 = tree_payload(&[("100644", "alpha", alpha)]);
    let (_, tree1_id) = builder.plain(ObjectKind::Tree, &tree1);
    let tree2 = tree_payload(&[("100644", "alpha", alpha), ("100644", "beta", beta)]);
    let (_, tree2_id) = builder.plain(ObjectKind::Tree, &tree2);
    let gamma = tree_payload(&[("100644", "delta", delta)]);
    let (_, gamma_id) = builder.plain(ObjectKind::Tree, &gamma);
    let tree3 = tree_payload(&[
        ("100644", "alpha", alpha),
        ("100644", "beta", beta),
        ("40000", "gamma", gamma_id),
    ]);
    let (_, tree3_id) = builder.plain(ObjectKind::Tree, &tree3);

    let (_, c1) = builder.plain(ObjectKind::Commit, &commit_payload(tree1_id, &[], "add alpha\n"));
    let (_, c2) = builder.plain(
        ObjectKind::Commit,
        &commit_payload(tree2_id, &[c1], "add beta\n"),
    );
    let (_, head) = builder.plain(
        ObjectKind::Commit,
        &commit_payload(tree3_id, &[c2], "add gamma/delta\n"),
    );
    builder.write(&pack_dir(&repo_root));

    let mut repo = Repository::open(&repo_root).unwrap();

    // Full history walk from HEAD.
    let mut count = 0;
    let mut cursor = Some(head);
    let mut last_tree = None;
    while let Some(id) = cursor {
        let (kind, payload) = repo.read_object(&id).unwrap();
        assert_eq!(kind, ObjectKind::Commit);
        let commit = Commit::parse(&payload).unwrap();
        if last_tree.is_none() {
            last_tree = Some(commit.tree);
        }
        count += 1;
        assert!(commit.parents.len() <= 1);
        cursor = commit.parents.first().copied();
    }
    assert_eq!(count, 3);
    assert_eq!(last_tree, Some(tree3_id));

    // Tree listing of the last commit: exactly {alpha, beta, gamma/}.
    let (kind, payload) = repo.read_object(&tree3_id).unwrap();
    assert_eq!(kind, ObjectKind::Tree);
    let mut names = BTreeSet::new();
    for entry in TreeIter::new(&payload) {
        let entry = entry.unwrap();
        let mut name = String::from_utf8(entry.name.to_vec()).unwrap();
        if entry.is_tree() {
            name.push('/');
        }
        names.insert(name);
    }
    let expected: BTreeSet<String> = ["alpha", "beta", "gamma/"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(names, expected);

    // Subtree listing resolves through the store as well.
    let (_, payload) = repo.read_object(&gamma_id).unwrap();
    let entries: Vec<_> = TreeIter::new(&payload)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, b"delta");
    assert_eq!(entries[0].id, delta);
}

#[test]
fn commit_message_survives_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let repo_root = repo_dir(tmp.path());

    let mut builder = PackBuilder::new();
    let (_, blob) = builder.plain(ObjectKind::Blob, b"content\n");
    let tree = tree_payload(&[("100644", "file", blob)]);
    let (_, tree_id) = builder.plain(ObjectKind::Tree, &tree);
    let message = "subject line\n\nbody with details\n";
    let (_, commit_id) = builder.plain(
        ObjectKind::Commit,
        &commit_payload(tree_id, &[], message),
    );
    builder.write(&pack_dir(&repo_root));

    let mut repo = Repository::open(&repo_root).unwrap();
    let (_, payload) = repo.read_object(&commit_id).unwrap();
    let commit = Commit::parse(&payload).unwrap();
    assert_eq!(commit.tree, tree_id);
    assert_eq!(commit.message, message.as_bytes());
}

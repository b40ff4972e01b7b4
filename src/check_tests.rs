//! Tests for the consistency checker.

use super::*;
use crate::testutil::{manifest, FakeVcs};

const ROOT: &str = "/w/root";

fn chain(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| PathBuf::from(format!("/w/{}", n))).collect()
}

fn run(vcs: &FakeVcs, root_manifest: &str) -> Vec<ChainedError> {
    let deps = manifest::parse(root_manifest).unwrap();
    let targets = TargetMap::new(Path::new(ROOT), &deps);
    check(vcs, Path::new(ROOT), &deps, &targets)
}

/// root -> dep1@branch2, dep2@branch1, dep3@master; dep1 itself needs dep2@branch1.
fn three_deps() -> FakeVcs {
    let vcs = FakeVcs::new();
    vcs.add("/w/dep1", "d1-head", None)
        .with("/w/dep1", |s| {
            s.refs.insert("branch2".to_string(), "d1-b2".to_string());
            s.committed.insert(
                "d1-b2".to_string(),
                manifest(&[("dep2", "../dep2", "branch1")]),
            );
        })
        .add("/w/dep2", "d2-head", None)
        .with("/w/dep2", |s| {
            s.refs.insert("branch1".to_string(), "d2-b1".to_string());
            s.refs.insert("branch2".to_string(), "d2-b2".to_string());
        })
        .add("/w/dep3", "d3-head", None);
    vcs
}

#[test]
fn test_no_dependencies_is_consistent() {
    let vcs = FakeVcs::new();
    assert!(run(&vcs, "").is_empty());
    assert!(run(&vcs, "{'dependencies': []}").is_empty());
}

#[test]
fn test_matching_transitive_revision_passes() {
    let vcs = three_deps();
    let root = manifest(&[
        ("dep1", "../dep1", "branch2"),
        ("dep2", "../dep2", "branch1"),
        ("dep3", "../dep3", "master"),
    ]);
    assert!(run(&vcs, &root).is_empty());
    // Nothing changed, so a second run agrees.
    assert!(run(&vcs, &root).is_empty());
}

#[test]
fn test_inconsistent_revision_is_anchored_at_declaring_repo() {
    let vcs = three_deps();
    let root = manifest(&[
        ("dep1", "../dep1", "branch2"),
        ("dep2", "../dep2", "branch2"),
        ("dep3", "../dep3", "master"),
    ]);

    let errors = run(&vcs, &root);
    assert_eq!(errors.len(), 1);
    match &errors[0].error {
        Error::InconsistentRevision {
            name,
            required,
            found,
        } => {
            assert_eq!(name, "dep2");
            assert_eq!(required, "branch2");
            assert_eq!(found, "branch1");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(errors[0].chain, chain(&["root", "dep1"]));
}

#[test]
fn test_unlisted_dependency() {
    let vcs = three_deps();
    vcs.with("/w/dep1", |s| {
        s.committed.insert(
            "d1-b2".to_string(),
            manifest(&[("dep4", "../dep4", "master")]),
        );
    });
    let root = manifest(&[("dep1", "../dep1", "branch2")]);

    let errors = run(&vcs, &root);
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0].error, Error::UnlistedDependency { name } if name == "dep4"));
    assert_eq!(errors[0].chain, chain(&["root", "dep1"]));
}

#[test]
fn test_committed_manifest_is_checked_not_working_copy() {
    let vcs = three_deps();
    vcs.with("/w/dep1", |s| {
        s.working = Some(manifest(&[("dep4", "../dep4", "master")]));
    });
    let root = manifest(&[
        ("dep1", "../dep1", "branch2"),
        ("dep2", "../dep2", "branch1"),
    ]);
    assert!(run(&vcs, &root).is_empty());
}

#[test]
fn test_unparseable_child_manifest_stops_descent() {
    let vcs = three_deps();
    vcs.with("/w/dep1", |s| {
        s.committed
            .insert("d1-b2".to_string(), "{'dependencies': [".to_string());
    });
    let root = manifest(&[("dep1", "../dep1", "branch2")]);

    let errors = run(&vcs, &root);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].error, Error::Parse { .. }));
    assert!(errors[0].error.to_string().starts_with("syntax error"));
    assert_eq!(errors[0].chain, chain(&["root", "dep1"]));
}

#[test]
fn test_missing_repository() {
    let vcs = three_deps();
    let root = manifest(&[("gone", "../gone", "master")]);

    let errors = run(&vcs, &root);
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0].error, Error::MissingRepository { name, .. } if name == "gone"));
    assert_eq!(errors[0].chain, chain(&["root", "gone"]));
}

#[test]
fn test_bad_revision_carries_resolution_failure() {
    let vcs = three_deps();
    let root = manifest(&[("dep3", "../dep3", "nope")]);

    let errors = run(&vcs, &root);
    assert_eq!(errors.len(), 1);
    match &errors[0].error {
        Error::BadRevision {
            name,
            revision,
            reason,
        } => {
            assert_eq!(name, "dep3");
            assert_eq!(revision, "nope");
            assert_eq!(reason, "revspec 'nope' not found");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(errors[0].chain, chain(&["root"]));
}

#[test]
fn test_errors_accumulate_across_siblings() {
    let vcs = three_deps();
    let root = manifest(&[
        ("dep3", "../dep3", "nope"),
        ("gone", "../gone", "master"),
        ("dep2", "../dep2", "branch1"),
    ]);
    let errors = run(&vcs, &root);
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0].error, Error::BadRevision { .. }));
    assert!(matches!(errors[1].error, Error::MissingRepository { .. }));
}

#[test]
fn test_two_node_cycle_reports_each_entry_point() {
    let vcs = FakeVcs::new();
    vcs.add("/w/a", "a1", Some(&manifest(&[("b", "../b", "master")])))
        .add("/w/b", "b1", Some(&manifest(&[("a", "../a", "master")])));
    let root = manifest(&[("a", "../a", "master"), ("b", "../b", "master")]);

    let errors = run(&vcs, &root);
    assert_eq!(errors.len(), 2);
    for error in &errors {
        assert!(matches!(error.error, Error::CircularReference));
        assert_eq!(error.chain.len(), 4);
    }
    assert_eq!(errors[0].chain, chain(&["root", "a", "b", "a"]));
    assert_eq!(errors[1].chain, chain(&["root", "b", "a", "b"]));
}

#[test]
fn test_render_lists_innermost_first() {
    let error = ChainedError {
        error: Error::InconsistentRevision {
            name: "dep2".to_string(),
            required: "branch2".to_string(),
            found: "branch1".to_string(),
        },
        chain: chain(&["root", "dep1"]),
    };
    assert_eq!(
        error.render(),
        vec![
            "Inconsistent dependency for dep2:",
            "  required: branch2",
            "  found: branch1",
            "  Detected in: dep1",
            "    included by: root",
        ]
    );
}

#[test]
fn test_report_json() {
    let vcs = three_deps();
    let report = CheckReport {
        errors: run(&vcs, &manifest(&[("gone", "../gone", "master")])),
    };
    let json = report.to_json();
    assert_eq!(json["ok"], false);
    assert_eq!(json["errors"][0]["kind"], "missing_repository");
    assert_eq!(json["errors"][0]["message"][0], "Missing repo: gone");
    assert_eq!(json["errors"][0]["chain"][1], "/w/gone");
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{RepoFixture, Workspace};

use anyhow::Result;
use graft::{
    guard::{Git2TagProbe, GuardError, TagProbe, VersionCheck},
    overlay::{Outcome, Overlay, OverlayError, Stage, SyncEvent},
    sync::SyncError,
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    cell::Cell,
    fs::{read_to_string, write},
};

fn never(_: &VersionCheck) -> bool {
    panic!("revision prompt shown for a matching root");
}

#[sealed_test]
fn install_into_missing_destination_records_no_backup() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\n")?;
    space.overlay_file("foo.txt", "hello")?;

    let graft = space.graft(Some(Workspace::TAG));
    let outcome = graft.install(&space.target(), never)?;
    let report = outcome.report().expect("install synced");

    let dest = space.root.join("dest").join("foo.txt");
    assert_eq!(read_to_string(&dest)?, "hello");
    assert_eq!(report.stage, Stage::Synced);
    assert!(!space.backups().backup_path(&dest)?.exists());

    Ok(())
}

#[sealed_test]
fn install_then_clean_restores_previous_content() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\n")?;
    space.overlay_file("foo.txt", "hello")?;
    space.root_file("dest/foo.txt", "world")?;

    let graft = space.graft(Some(Workspace::TAG));
    graft.install(&space.target(), never)?;

    let dest = space.root.join("dest").join("foo.txt");
    assert_eq!(read_to_string(&dest)?, "hello");
    assert_eq!(
        read_to_string(space.backups().backup_path(&dest)?)?,
        "world"
    );

    graft.clean(&space.target(), never)?;
    assert_eq!(read_to_string(&dest)?, "world");

    Ok(())
}

#[sealed_test]
fn clean_removes_files_without_backup() -> Result<()> {
    let space = Workspace::new("Plugin/,Source/\n")?;
    space.overlay_file("Plugin/Plugin.cpp", "plugin")?;
    space.overlay_file("Plugin/Ego/Vehicle.cpp", "vehicle")?;

    let graft = space.graft(Some(Workspace::TAG));
    graft.install(&space.target(), never)?;

    let plugin = space.root.join("Source").join("Plugin");
    assert_eq!(read_to_string(plugin.join("Ego").join("Vehicle.cpp"))?, "vehicle");
    assert_eq!(read_to_string(plugin.join("Plugin.cpp"))?, "plugin");

    let outcome = graft.clean(&space.target(), never)?;
    let report = outcome.report().expect("clean synced");
    assert!(!plugin.exists());
    assert!(report
        .events
        .iter()
        .any(|event| matches!(event, SyncEvent::Removed { .. })));

    Ok(())
}

#[sealed_test]
fn clean_without_install_fails() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\n")?;
    space.overlay_file("foo.txt", "hello")?;

    let graft = space.graft(Some(Workspace::TAG));
    let result = graft.clean(&space.target(), never);
    assert!(matches!(result, Err(OverlayError::NoBackupAvailable { .. })));

    Ok(())
}

#[sealed_test]
fn declined_version_mismatch_writes_nothing() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\n")?;
    space.overlay_file("foo.txt", "hello")?;
    space.root_file("dest/foo.txt", "world")?;

    let asked = Cell::new(0);
    let graft = space.graft(Some("0.9.12"));
    let outcome = graft.install(&space.target(), |_| {
        asked.set(asked.get() + 1);
        false
    })?;

    assert_eq!(asked.get(), 1);
    assert_eq!(
        outcome,
        Outcome::Declined(VersionCheck::Mismatch {
            detected: Some("0.9.12".into()),
            expected: Workspace::TAG.into(),
        })
    );
    assert_eq!(read_to_string(space.root.join("dest").join("foo.txt"))?, "world");
    assert!(!space.backups().dir().exists());

    Ok(())
}

#[sealed_test]
fn confirmed_version_mismatch_proceeds() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\n")?;
    space.overlay_file("foo.txt", "hello")?;

    let graft = space.graft(None);
    let outcome = graft.install(&space.target(), |_| true)?;

    assert!(outcome.report().is_some());
    assert_eq!(read_to_string(space.root.join("dest").join("foo.txt"))?, "hello");

    Ok(())
}

#[sealed_test]
fn missing_marker_fails_before_writing() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\n")?;
    space.overlay_file("foo.txt", "hello")?;

    let mut target = space.target();
    target.markers.push("Unreal/CarlaUE4/CarlaUE4.uproject".into());

    let graft = space.graft(Some(Workspace::TAG));
    let result = graft.install(&target, never);
    assert!(matches!(
        result,
        Err(OverlayError::Guard(GuardError::MarkerMissing { .. }))
    ));
    assert!(!space.root.join("dest").exists());

    Ok(())
}

#[sealed_test]
fn reverse_install_pulls_changes_into_overlay() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\nPlugin/,Source/\n")?;
    space.overlay_file("foo.txt", "hello")?;
    space.overlay_file("Plugin/Vehicle.cpp", "vehicle")?;

    let graft = space.graft(Some(Workspace::TAG));
    graft.install(&space.target(), never)?;

    space.root_file("dest/foo.txt", "patched")?;
    space.root_file("Source/Plugin/Vehicle.cpp", "fixed build")?;
    space.root_file("Source/Plugin/Unrelated.cpp", "not ours")?;

    graft.reverse_install(&space.target(), never)?;

    let overlay_file = space.overlay.join("foo.txt");
    assert_eq!(read_to_string(&overlay_file)?, "patched");
    assert_eq!(
        read_to_string(space.overlay.join("Plugin").join("Vehicle.cpp"))?,
        "fixed build"
    );
    assert!(!space.overlay.join("Plugin").join("Unrelated.cpp").exists());
    assert_eq!(
        read_to_string(space.backups().backup_path(&overlay_file)?)?,
        "hello"
    );

    Ok(())
}

#[sealed_test]
fn check_reports_missing_and_modified() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\nbar.txt,dest/\n")?;
    space.overlay_file("foo.txt", "hello")?;
    space.overlay_file("bar.txt", "bar")?;

    let graft = space.graft(Some(Workspace::TAG));
    graft.install(&space.target(), never)?;

    let outcome = graft.check(&space.target(), never)?;
    assert!(outcome.report().expect("check synced").is_clean());

    write(space.root.join("dest").join("foo.txt"), "changed")?;
    std::fs::remove_file(space.root.join("dest").join("bar.txt"))?;

    let outcome = graft.check(&space.target(), never)?;
    let report = outcome.report().expect("check synced");
    assert_eq!(
        report.modified().collect::<Vec<_>>(),
        vec![space.root.join("dest").join("foo.txt")]
    );
    assert_eq!(
        report.missing().collect::<Vec<_>>(),
        vec![space.root.join("dest").join("bar.txt")]
    );

    Ok(())
}

#[sealed_test]
fn git2_probe_detects_tag_then_branch() -> Result<()> {
    let fixture = RepoFixture::new("root")?;
    fixture.stage_and_commit("CHANGELOG.md", "changes")?;

    let probe = Git2TagProbe;
    let root = std::env::current_dir()?.join("root");
    assert_eq!(probe.detect_tag(&root), Some("main".into()));

    fixture.tag(Workspace::TAG)?;
    assert_eq!(probe.detect_tag(&root), Some(Workspace::TAG.into()));

    Ok(())
}

#[sealed_test]
fn hard_clean_resets_root() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\n")?;
    let fixture = RepoFixture::new(&space.root)?;
    fixture.stage_and_commit("CHANGELOG.md", "committed")?;

    space.root_file("junk.txt", "junk")?;
    space.root_file("build/out.o", "object")?;

    let graft = Overlay::new(&space.overlay, space.backups());
    let report = graft.hard_clean(&space.target())?;

    assert_eq!(report.stage, Stage::Synced);
    assert_eq!(read_to_string(space.root.join("CHANGELOG.md"))?, "committed");
    assert!(!space.root.join("junk.txt").exists());
    assert!(!space.root.join("build").exists());

    Ok(())
}

#[sealed_test]
fn reverse_install_skips_entries_of_other_kind() -> Result<()> {
    let space = Workspace::new("Plugin/,Source/\n")?;
    space.overlay_file("Plugin/Config", "config")?;
    space.overlay_file("Plugin/Vehicle.cpp", "vehicle")?;

    let graft = space.graft(Some(Workspace::TAG));
    graft.install(&space.target(), never)?;

    let plugin = space.root.join("Source").join("Plugin");
    std::fs::remove_file(plugin.join("Config"))?;
    space.root_file("Source/Plugin/Configs/Default.ini", "ini")?;
    space.root_file("Source/Plugin/Vehicle.cpp", "fixed build")?;

    let outcome = graft.reverse_install(&space.target(), never)?;
    let report = outcome.report().expect("reverse-install synced");

    assert_eq!(read_to_string(space.overlay.join("Plugin").join("Config"))?, "config");
    assert_eq!(
        read_to_string(space.overlay.join("Plugin").join("Vehicle.cpp"))?,
        "fixed build"
    );
    assert_eq!(
        report.missing().collect::<Vec<_>>(),
        vec![plugin.join("Config")]
    );

    Ok(())
}

#[sealed_test]
fn install_failure_keeps_applied_copies() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\nPlugin/,blocker/\n")?;
    space.overlay_file("foo.txt", "hello")?;
    space.overlay_file("Plugin/Vehicle.cpp", "vehicle")?;
    space.root_file("blocker", "not a directory")?;

    let graft = space.graft(Some(Workspace::TAG));
    let result = graft.install(&space.target(), never);

    let dest = space.root.join("dest").join("foo.txt");
    match result {
        Err(OverlayError::Aborted {
            stage,
            reached,
            applied,
            source,
        }) => {
            assert_eq!(stage, Stage::Failed);
            assert_eq!(reached, Stage::BackedUp);
            assert_eq!(applied.len(), 1);
            assert!(matches!(
                &applied[0],
                SyncEvent::Copied { destination, .. } if destination == &dest
            ));
            assert!(matches!(
                *source,
                OverlayError::Sync(SyncError::TypeConflict { ref onto, .. })
                    if onto == &space.root.join("blocker")
            ));
        }
        other => panic!("expected aborted install, got {other:?}"),
    }

    assert_eq!(read_to_string(&dest)?, "hello");
    assert_eq!(read_to_string(space.root.join("blocker"))?, "not a directory");

    Ok(())
}

#[sealed_test]
fn relative_table_resolves_against_overlay() -> Result<()> {
    let space = Workspace::new("foo.txt,dest/\n")?;
    space.overlay_file("foo.txt", "hello")?;

    let mut target = space.target();
    target.table = "table.csv".into();

    let graft = space.graft(Some(Workspace::TAG));
    graft.install(&target, never)?;
    assert_eq!(read_to_string(space.root.join("dest").join("foo.txt"))?, "hello");

    Ok(())
}

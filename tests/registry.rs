#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use std::fs::File;
use std::sync::Arc;

use fd_pool::{FileManager, PoolError};

use common::NullFd;

#[test]
fn different_files_get_different_handlers() {
    let manager = FileManager::with_limit(8);
    let dir = tempfile::tempdir().unwrap();

    let one = manager.handler::<NullFd>(dir.path().join("one")).unwrap();
    let two = manager.handler::<NullFd>(dir.path().join("two")).unwrap();
    assert!(!Arc::ptr_eq(&one, &two));
}

#[test]
fn same_path_shares_the_handler() {
    let manager = FileManager::with_limit(8);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data");

    let one = manager.handler::<NullFd>(&path).unwrap();
    let two = manager.handler::<NullFd>(&path).unwrap();
    assert!(Arc::ptr_eq(&one, &two));
}

#[test]
fn roundabout_path_shares_the_handler() {
    let manager = FileManager::with_limit(8);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data");
    std::fs::write(&path, b"x").unwrap();

    // Build something like /tmp/../tmp/<dir>/data.
    let parent = dir.path().parent().unwrap();
    let roundabout = parent
        .join("..")
        .join(parent.file_name().unwrap())
        .join(dir.path().file_name().unwrap())
        .join("data");
    assert_ne!(path, roundabout);

    let direct = manager.handler::<NullFd>(&path).unwrap();
    let indirect = manager.handler::<NullFd>(&roundabout).unwrap();
    assert!(Arc::ptr_eq(&direct, &indirect));
}

#[test]
fn symlink_shares_the_handler() {
    let manager = FileManager::with_limit(8);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target");
    let link = dir.path().join("link");
    std::fs::write(&target, b"x").unwrap();
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let direct = manager.handler::<NullFd>(&target).unwrap();
    let via_link = manager.handler::<NullFd>(&link).unwrap();
    assert!(Arc::ptr_eq(&direct, &via_link));
}

#[test]
fn same_path_different_descriptor_type_is_rejected() {
    let manager = FileManager::with_limit(8);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data");

    let holder = manager.handler::<File>(&path).unwrap();
    let err = manager.handler::<NullFd>(&path).unwrap_err();
    assert!(matches!(err, PoolError::TypeMismatch { .. }));

    // Once the typed handler is gone, the path is free for another type.
    drop(holder);
    assert!(manager.handler::<NullFd>(&path).is_ok());
}

#[test]
fn has_handler_tracks_liveness() {
    let manager = FileManager::with_limit(8);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data");

    assert!(!manager.has_handler(&path));
    let handler = manager.handler::<NullFd>(&path).unwrap();
    assert!(manager.has_handler(&path));

    drop(handler);
    assert!(!manager.has_handler(&path));
}

#[test]
fn handler_survives_manager_but_vends_nothing_new() {
    let manager = FileManager::with_limit(8);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data");
    std::fs::write(&path, b"x").unwrap();

    let handler = manager.handler::<File>(&path).unwrap();
    {
        // Park one descriptor so the handler has something to clean up
        // without a manager.
        let _accessor = handler.accessor(fd_pool::AccessMode::Read).unwrap().unwrap();
    }

    drop(manager);
    let err = handler.accessor(fd_pool::AccessMode::Read).unwrap_err();
    assert!(matches!(err, PoolError::ManagerGone));
    // Dropping the handler closes the parked descriptor directly.
    drop(handler);
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::rc::Rc;
use syncdash_app::{CollectionKind, Mutation, ProjectId, StatsPatch, Store, TableId};
use syncdash_persist::{
    APP_STATE_KEY, KeyValueStorage, MemoryArea, PersistenceLayer, SqliteStorage, TabPhase,
};
use syncdash_testkit::fixtures;
use time::macros::datetime;

fn open_tab(area: &MemoryArea) -> (Store, Rc<syncdash_persist::MemoryStorage>, PersistenceLayer) {
    let store = Store::new();
    let storage = Rc::new(area.connect());
    let layer = PersistenceLayer::attach(store.clone(), storage.clone());
    (store, storage, layer)
}

#[test]
fn mutation_in_one_tab_reaches_the_other() -> Result<()> {
    let area = MemoryArea::new();
    let (store_a, _storage_a, _layer_a) = open_tab(&area);
    let (store_b, storage_b, layer_b) = open_tab(&area);

    let project = ProjectId::from("app1");
    store_a.set_projects(fixtures::projects(3));
    store_a.set_tables(project.clone(), fixtures::tables(&project, 2));
    store_a.set_tickets(TableId::from("tbl_app1_1"), fixtures::tickets(4));
    store_a.set_sync_time(datetime!(2026-05-04 12:00:00 UTC));

    assert_ne!(store_a.current_snapshot(), store_b.current_snapshot());
    storage_b.dispatch_external_changes()?;
    assert_eq!(store_a.current_snapshot(), store_b.current_snapshot());
    assert_eq!(layer_b.phase(), TabPhase::Live);
    Ok(())
}

#[test]
fn other_tab_does_not_echo_what_it_received() -> Result<()> {
    let area = MemoryArea::new();
    let (store_a, storage_a, _layer_a) = open_tab(&area);
    let (_store_b, storage_b, _layer_b) = open_tab(&area);

    store_a.set_users(fixtures::users(2));
    assert_eq!(storage_b.dispatch_external_changes()?, 1);
    assert_eq!(storage_a.pending_changes(), 0);
    Ok(())
}

#[test]
fn logout_in_one_tab_resets_the_other() -> Result<()> {
    let area = MemoryArea::new();
    let (store_a, _storage_a, layer_a) = open_tab(&area);
    let (store_b, storage_b, layer_b) = open_tab(&area);

    store_a.set_projects(fixtures::projects(2));
    storage_b.dispatch_external_changes()?;
    assert!(store_b.current_snapshot().has_projects());

    layer_a.clear();
    storage_b.dispatch_external_changes()?;
    assert!(!store_b.current_snapshot().has_projects());
    assert_eq!(store_b.current_snapshot().stats.projects, 0);
    assert_eq!(layer_b.phase(), TabPhase::Cleared);
    assert_eq!(area.raw(APP_STATE_KEY), None);
    Ok(())
}

#[test]
fn flag_reset_during_logout_keeps_the_key_removed() -> Result<()> {
    let area = MemoryArea::new();
    let (store_a, _storage_a, layer_a) = open_tab(&area);
    let (store_b, storage_b, layer_b) = open_tab(&area);

    let writer = store_a.clone();
    let _spinner_reset = store_a.subscribe(move |mutation, _| {
        if mutation == Mutation::Cleared {
            writer.set_loading(CollectionKind::Users, false);
        }
    });

    store_a.set_projects(fixtures::projects(2));
    storage_b.dispatch_external_changes()?;
    assert!(store_b.current_snapshot().has_projects());

    layer_a.clear();
    assert_eq!(area.raw(APP_STATE_KEY), None);
    assert_eq!(layer_a.phase(), TabPhase::Cleared);

    storage_b.dispatch_external_changes()?;
    assert!(!store_b.current_snapshot().has_projects());
    assert_eq!(layer_b.phase(), TabPhase::Cleared);
    Ok(())
}

#[test]
fn unreadable_value_from_another_tab_keeps_the_phase() -> Result<()> {
    let area = MemoryArea::new();
    let (store, storage, layer) = open_tab(&area);
    assert_eq!(layer.phase(), TabPhase::Hydrated);

    area.connect().set(APP_STATE_KEY, "{truncated")?;
    assert_eq!(storage.dispatch_external_changes()?, 1);
    assert_eq!(layer.phase(), TabPhase::Hydrated);
    assert_eq!(store.revision(), 0);
    Ok(())
}

#[test]
fn state_survives_a_restart_with_loading_reset() -> Result<()> {
    let area = MemoryArea::new();
    let before = {
        let (store, _storage, _layer) = open_tab(&area);
        store.set_projects(fixtures::projects(2));
        store.set_users(fixtures::users(3));
        store.update_stats(StatsPatch {
            revisions: Some(7),
            ..StatsPatch::default()
        });
        store.set_loading(CollectionKind::Users, true);
        store.current_snapshot()
    };

    let (store, _storage, layer) = open_tab(&area);
    let after = store.current_snapshot();
    assert_eq!(layer.phase(), TabPhase::Hydrated);
    assert_eq!(after.projects, before.projects);
    assert_eq!(after.users, before.users);
    assert_eq!(after.stats, before.stats);
    assert!(!after.loading.any());
    Ok(())
}

#[test]
fn clear_then_reload_restores_defaults() -> Result<()> {
    let area = MemoryArea::new();
    {
        let (store, _storage, layer) = open_tab(&area);
        store.set_projects(fixtures::projects(2));
        layer.clear();
    }

    let (store, _storage, _layer) = open_tab(&area);
    assert_eq!(*store.current_snapshot(), Default::default());
    Ok(())
}

#[test]
fn sqlite_processes_sync_through_the_same_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("storage.db");

    let store_a = Store::new();
    let _layer_a = PersistenceLayer::attach(store_a.clone(), Rc::new(SqliteStorage::open(&path)?));
    let store_b = Store::new();
    let storage_b = Rc::new(SqliteStorage::open(&path)?);
    let layer_b = PersistenceLayer::attach(store_b.clone(), storage_b.clone());

    store_a.set_projects(fixtures::projects(4));
    assert_eq!(storage_b.dispatch_external_changes()?, 1);
    assert_eq!(store_b.current_snapshot().projects.len(), 4);

    store_a.clear();
    storage_b.dispatch_external_changes()?;
    assert!(!store_b.current_snapshot().has_projects());
    assert_eq!(layer_b.phase(), TabPhase::Cleared);
    Ok(())
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use sha2::{Digest, Sha256};

use crate::model::SchemaTable;

/// Identity of a selectable table: a digest over the table name plus every
/// column's name and type, in order. Two snapshots can repeat a table name
/// with different column shapes; those are distinct selectable entities and
/// must never be compared by name alone.
pub fn composite_key(table: &SchemaTable) -> String {
    let mut hasher = Sha256::new();
    hasher.update(table.name.as_bytes());
    hasher.update([0]);
    for column in &table.columns {
        hasher.update(column.name.as_bytes());
        hasher.update([0]);
        hasher.update(column.data_type.as_bytes());
        hasher.update([0]);
    }

    let digest = hasher.finalize();
    let mut output = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectionEntry {
    key: String,
    table_name: String,
}

/// The set of schema tables currently marked in scope, keyed by composite
/// key, insertion-ordered. Never merged across snapshots: a fresh snapshot
/// request starts from empty before remote state is reapplied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionSet {
    entries: Vec<SelectionEntry>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the set from a remote snapshot: every snapshot table whose
    /// name appears in `selected_names` enters with a key computed fresh
    /// from that snapshot. Prior selections under other shapes are gone.
    pub fn from_remote_snapshot(snapshot: &[SchemaTable], selected_names: &[String]) -> Self {
        let mut set = Self::new();
        for table in snapshot {
            if selected_names.iter().any(|name| *name == table.name) && !set.contains(table) {
                set.insert(table);
            }
        }
        set
    }

    pub fn contains(&self, table: &SchemaTable) -> bool {
        let key = composite_key(table);
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// Select the table if absent, deselect it if present. Returns whether
    /// the table is selected afterwards. Toggling twice restores the set.
    pub fn toggle(&mut self, table: &SchemaTable) -> bool {
        let key = composite_key(table);
        if let Some(index) = self.entries.iter().position(|entry| entry.key == key) {
            self.entries.remove(index);
            false
        } else {
            self.insert(table);
            true
        }
    }

    fn insert(&mut self, table: &SchemaTable) {
        self.entries.push(SelectionEntry {
            key: composite_key(table),
            table_name: table.name.clone(),
        });
    }

    /// The selected table names in insertion order. A name selected under
    /// two different column shapes appears twice; that is a deliberate
    /// pass-through, the server sees exactly what was selected.
    pub fn commit(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.table_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PickerPhase {
    #[default]
    Closed,
    AwaitingSnapshot,
    Ready,
}

/// The schema-context picker: a snapshot of selectable tables plus the
/// in-picker selection, driven through Closed -> AwaitingSnapshot -> Ready.
///
/// There is no path from AwaitingSnapshot to a committed close: saving
/// before the snapshot arrives is refused, and cancel always works.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaPicker {
    phase: PickerPhase,
    snapshot: Vec<SchemaTable>,
    selection: SelectionSet,
}

impl SchemaPicker {
    pub fn phase(&self) -> PickerPhase {
        self.phase
    }

    pub fn tables(&self) -> &[SchemaTable] {
        &self.snapshot
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn is_open(&self) -> bool {
        self.phase != PickerPhase::Closed
    }

    /// Open the picker, discarding any prior in-picker state. The caller is
    /// expected to request a fresh snapshot from the peer at the same time.
    pub fn open(&mut self) {
        self.phase = PickerPhase::AwaitingSnapshot;
        self.snapshot.clear();
        self.selection = SelectionSet::new();
    }

    /// Install a remote snapshot and reconcile the remote selection into it.
    /// Ignored while the picker is closed; a later snapshot replaces an
    /// earlier one wholesale.
    pub fn apply_snapshot(&mut self, tables: Vec<SchemaTable>, selected_names: &[String]) -> bool {
        if self.phase == PickerPhase::Closed {
            return false;
        }
        self.selection = SelectionSet::from_remote_snapshot(&tables, selected_names);
        self.snapshot = tables;
        self.phase = PickerPhase::Ready;
        true
    }

    /// Toggle the table at `index` in the snapshot. No-op unless Ready.
    pub fn toggle(&mut self, index: usize) -> Option<bool> {
        if self.phase != PickerPhase::Ready {
            return None;
        }
        let table = self.snapshot.get(index)?.clone();
        Some(self.selection.toggle(&table))
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.snapshot
            .get(index)
            .is_some_and(|table| self.selection.contains(table))
    }

    /// Commit and close. Refused (returns None, state unchanged) unless the
    /// snapshot has arrived.
    pub fn save(&mut self) -> Option<Vec<String>> {
        if self.phase != PickerPhase::Ready {
            return None;
        }
        let committed = self.selection.commit();
        self.close();
        Some(committed)
    }

    /// Close without committing, discarding in-picker state.
    pub fn cancel(&mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.phase = PickerPhase::Closed;
        self.snapshot.clear();
        self.selection = SelectionSet::new();
    }
}

#[cfg(test)]
mod tests {
    use super::{PickerPhase, SchemaPicker, SelectionSet, composite_key};
    use crate::model::{SchemaColumn, SchemaTable};

    fn table(name: &str, columns: &[(&str, &str)]) -> SchemaTable {
        SchemaTable {
            name: name.to_owned(),
            columns: columns
                .iter()
                .map(|(name, data_type)| SchemaColumn {
                    name: (*name).to_owned(),
                    data_type: (*data_type).to_owned(),
                })
                .collect(),
        }
    }

    fn users() -> SchemaTable {
        table("users", &[("id", "INTEGER"), ("name", "TEXT")])
    }

    fn orders() -> SchemaTable {
        table("orders", &[("id", "INTEGER"), ("total", "REAL")])
    }

    #[test]
    fn composite_key_is_deterministic() {
        assert_eq!(composite_key(&users()), composite_key(&users()));
    }

    #[test]
    fn composite_key_discriminates_same_name_different_shape() {
        let narrow = table("users", &[("id", "INTEGER")]);
        assert_ne!(composite_key(&users()), composite_key(&narrow));

        let retyped = table("users", &[("id", "TEXT"), ("name", "TEXT")]);
        assert_ne!(composite_key(&users()), composite_key(&retyped));
    }

    #[test]
    fn toggle_is_an_involution() {
        let mut set = SelectionSet::new();
        let before = set.clone();

        assert!(set.toggle(&users()));
        assert!(set.contains(&users()));
        assert!(!set.toggle(&users()));
        assert_eq!(set, before);
    }

    #[test]
    fn same_name_different_shape_tables_select_independently() {
        let wide = users();
        let narrow = table("users", &[("id", "INTEGER")]);

        let mut set = SelectionSet::new();
        set.toggle(&wide);
        set.toggle(&narrow);
        assert_eq!(set.len(), 2);
        assert_eq!(set.commit(), ["users", "users"]);

        set.toggle(&wide);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&narrow));
        assert!(!set.contains(&wide));
    }

    #[test]
    fn remote_snapshot_reconciliation_keeps_only_named_tables() {
        let snapshot = vec![users(), orders()];
        let set = SelectionSet::from_remote_snapshot(&snapshot, &["users".to_owned()]);

        assert!(set.contains(&users()));
        assert!(!set.contains(&orders()));
        assert_eq!(set.commit(), ["users"]);
    }

    #[test]
    fn remote_snapshot_ignores_names_absent_from_the_snapshot() {
        let set = SelectionSet::from_remote_snapshot(&[users()], &["ghosts".to_owned()]);
        assert!(set.is_empty());
    }

    #[test]
    fn commit_preserves_insertion_order() {
        let mut set = SelectionSet::new();
        set.toggle(&orders());
        set.toggle(&users());
        assert_eq!(set.commit(), ["orders", "users"]);
    }

    #[test]
    fn picker_walks_closed_awaiting_ready_closed() {
        let mut picker = SchemaPicker::default();
        assert_eq!(picker.phase(), PickerPhase::Closed);

        picker.open();
        assert_eq!(picker.phase(), PickerPhase::AwaitingSnapshot);

        assert!(picker.apply_snapshot(vec![users(), orders()], &["users".to_owned()]));
        assert_eq!(picker.phase(), PickerPhase::Ready);
        assert!(picker.is_selected(0));
        assert!(!picker.is_selected(1));

        let committed = picker.save().expect("save after snapshot");
        assert_eq!(committed, ["users"]);
        assert_eq!(picker.phase(), PickerPhase::Closed);
    }

    #[test]
    fn save_is_refused_before_the_snapshot_arrives() {
        let mut picker = SchemaPicker::default();
        picker.open();
        assert_eq!(picker.save(), None);
        assert_eq!(picker.phase(), PickerPhase::AwaitingSnapshot);
    }

    #[test]
    fn cancel_discards_without_committing() {
        let mut picker = SchemaPicker::default();
        picker.open();
        picker.apply_snapshot(vec![users()], &[]);
        picker.toggle(0);
        picker.cancel();

        assert_eq!(picker.phase(), PickerPhase::Closed);
        assert!(picker.tables().is_empty());
        assert!(picker.selection().is_empty());
    }

    #[test]
    fn reopening_discards_prior_in_picker_state() {
        let mut picker = SchemaPicker::default();
        picker.open();
        picker.apply_snapshot(vec![users()], &["users".to_owned()]);
        assert!(picker.is_selected(0));

        picker.open();
        assert_eq!(picker.phase(), PickerPhase::AwaitingSnapshot);
        assert!(picker.tables().is_empty());
        assert!(picker.selection().is_empty());
    }

    #[test]
    fn toggle_outside_ready_is_a_no_op() {
        let mut picker = SchemaPicker::default();
        assert_eq!(picker.toggle(0), None);

        picker.open();
        assert_eq!(picker.toggle(0), None);
    }

    #[test]
    fn snapshot_ignored_while_closed() {
        let mut picker = SchemaPicker::default();
        assert!(!picker.apply_snapshot(vec![users()], &[]));
        assert_eq!(picker.phase(), PickerPhase::Closed);
    }
}

//! End-to-end sync scenarios: two replicas exchanging oplog entries
//! through a shared filesystem remote.

use oru_engine::{
    clock, device, oplog, replay, Change, CreatePayload, Error, FieldChange, FsRemote, IdGen,
    NewTask, OplogEntry, Remote, RemotePage, Result, Store, SyncEngine, TaskFilter, TaskService,
};

// ============================================================================
// Helpers
// ============================================================================

struct Rig {
    _dir: tempfile::TempDir,
    remote_path: std::path::PathBuf,
}

impl Rig {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let remote_path = dir.path().join("remote.db");
        Self {
            _dir: dir,
            remote_path,
        }
    }

    fn sync_engine(&self) -> SyncEngine<FsRemote> {
        SyncEngine::new(FsRemote::open(&self.remote_path).unwrap())
    }
}

fn replica() -> TaskService {
    TaskService::open_in_memory().unwrap()
}

/// A deterministic dump of the tasks table for equality checks between
/// replicas (replica-local meta is deliberately not included).
fn task_table(store: &Store) -> Vec<String> {
    let mut stmt = store
        .conn()
        .prepare(
            "SELECT id || '|' || title || '|' || status || '|' || priority || '|' ||
                    labels || '|' || notes || '|' || metadata || '|' ||
                    COALESCE(due_at, '') || '|' || created_at || '|' || updated_at || '|' ||
                    COALESCE(deleted_at, '')
             FROM tasks ORDER BY id",
        )
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<String>>>()
        .unwrap()
}

/// Append an entry with a controlled timestamp and materialize it, the way
/// the service would.
fn write_at(store: &mut Store, ids: &IdGen, task: &str, change: &Change, unix_ms: i64) {
    let device_id = device::get_device_id(store.conn()).unwrap();
    let entry = oplog::append(
        store.conn(),
        ids,
        &device_id,
        task,
        change,
        Some(clock::from_unix_ms(unix_ms)),
    )
    .unwrap();
    replay::apply(store.conn(), &entry).unwrap();
}

fn create_titled(title: &str) -> Change {
    Change::Create(CreatePayload {
        title: title.into(),
        ..Default::default()
    })
}

// ============================================================================
// Convergence
// ============================================================================

#[test]
fn replicas_converge_after_three_syncs() {
    let rig = Rig::new();
    let mut a = replica();
    let mut b = replica();
    let mut sync_a = rig.sync_engine();
    let mut sync_b = rig.sync_engine();

    let t1 = a.create(NewTask::titled("from a")).unwrap();
    a.add_note(&t1.id, "note from a").unwrap();
    let t2 = b.create(NewTask::titled("from b")).unwrap();
    b.delete(&t2.id).unwrap();
    b.create(NewTask::titled("also from b")).unwrap();

    sync_a.sync(a.store_mut()).unwrap();
    sync_b.sync(b.store_mut()).unwrap();
    sync_a.sync(a.store_mut()).unwrap();

    assert_eq!(task_table(a.store()), task_table(b.store()));
    assert_eq!(task_table(a.store()).len(), 3);
}

#[test]
fn update_wins_by_timestamp_across_devices() {
    let rig = Rig::new();
    let mut a = Store::open_in_memory().unwrap();
    let mut b = Store::open_in_memory().unwrap();
    let ids_a = IdGen::new();
    let ids_b = IdGen::new();
    let mut sync_a = rig.sync_engine();
    let mut sync_b = rig.sync_engine();

    // A creates T1 and both replicas learn about it.
    write_at(&mut a, &ids_a, "T1", &create_titled("a"), 100);
    sync_a.sync(&mut a).unwrap();
    sync_b.sync(&mut b).unwrap();

    // B edits at t=150 while offline; A edits later at t=200.
    write_at(
        &mut b,
        &ids_b,
        "T1",
        &Change::Update(FieldChange::Title("B".into())),
        150,
    );
    write_at(
        &mut a,
        &ids_a,
        "T1",
        &Change::Update(FieldChange::Title("A".into())),
        200,
    );

    sync_a.sync(&mut a).unwrap();
    sync_b.sync(&mut b).unwrap();
    sync_a.sync(&mut a).unwrap();

    for store in [&a, &b] {
        let (title, updated_at): (String, String) = store
            .conn()
            .query_row(
                "SELECT title, updated_at FROM tasks WHERE id = 'T1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(title, "A");
        assert_eq!(updated_at, clock::from_unix_ms(200));
    }
    assert_eq!(task_table(&a), task_table(&b));
}

#[test]
fn tombstone_propagates() {
    let rig = Rig::new();
    let mut a = replica();
    let mut b = replica();
    let mut sync_a = rig.sync_engine();
    let mut sync_b = rig.sync_engine();

    let t = a.create(NewTask::titled("doomed")).unwrap();
    sync_a.sync(a.store_mut()).unwrap();
    sync_b.sync(b.store_mut()).unwrap();
    assert_eq!(b.get(&t.id).unwrap().title, "doomed");

    a.delete(&t.id).unwrap();
    sync_a.sync(a.store_mut()).unwrap();
    sync_b.sync(b.store_mut()).unwrap();

    assert!(b.list(&TaskFilter::new()).unwrap().is_empty());
    let hidden = b.list(&TaskFilter::new().include_deleted()).unwrap();
    assert_eq!(hidden.len(), 1);
    assert!(hidden[0].is_deleted());
}

#[test]
fn update_arriving_before_its_create_materializes_on_the_late_create() {
    let rig = Rig::new();

    // The remote sees the update first, then the create - e.g. two source
    // devices pushing out of causal order.
    {
        let mut seed = rig.sync_engine();
        let update = OplogEntry::new(
            "zz-update",
            "T3",
            "dev-x",
            &Change::Update(FieldChange::Title("x".into())),
            clock::from_unix_ms(50),
        )
        .unwrap();
        seed.remote_mut().push(&[update]).unwrap();
    }

    let mut c = Store::open_in_memory().unwrap();
    let mut sync_c = rig.sync_engine();
    sync_c.sync(&mut c).unwrap();

    // Only the orphan update so far: no materialized row.
    let count: i64 = c
        .conn()
        .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);

    {
        let mut seed = rig.sync_engine();
        let create = OplogEntry::new(
            "aa-create",
            "T3",
            "dev-y",
            &create_titled(""),
            clock::from_unix_ms(10),
        )
        .unwrap();
        seed.remote_mut().push(&[create]).unwrap();
    }
    sync_c.sync(&mut c).unwrap();

    let (title, created_at, updated_at): (String, String, String) = c
        .conn()
        .query_row(
            "SELECT title, created_at, updated_at FROM tasks WHERE id = 'T3'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(title, "x");
    assert_eq!(created_at, clock::from_unix_ms(10));
    assert_eq!(updated_at, clock::from_unix_ms(50));
}

// ============================================================================
// Idempotence and retries
// ============================================================================

#[test]
fn sync_twice_with_no_changes_is_a_noop() {
    let rig = Rig::new();
    let mut a = replica();
    let mut sync_a = rig.sync_engine();

    a.create(NewTask::titled("once")).unwrap();
    let first = sync_a.sync(a.store_mut()).unwrap();
    assert_eq!(first.pushed, 1);

    let second = sync_a.sync(a.store_mut()).unwrap();
    assert_eq!(second.pushed, 0);
    assert_eq!(second.pulled, 0);
}

/// Remote wrapper that fails the next push, then recovers.
struct FlakyRemote<R: Remote> {
    inner: R,
    fail_next_push: bool,
}

impl<R: Remote> Remote for FlakyRemote<R> {
    fn push(&mut self, entries: &[OplogEntry]) -> Result<()> {
        if self.fail_next_push {
            self.fail_next_push = false;
            return Err(Error::RemoteUnavailable("injected outage".into()));
        }
        self.inner.push(entries)
    }

    fn pull(&mut self, cursor: Option<&str>) -> Result<RemotePage> {
        self.inner.pull(cursor)
    }
}

#[test]
fn failed_push_leaves_hwm_for_a_clean_retry() {
    let rig = Rig::new();
    let mut a = replica();
    let device_id = a.device_id().to_string();
    let hwm_key = format!("push_hwm_{device_id}");

    a.create(NewTask::titled("first")).unwrap();
    a.create(NewTask::titled("second")).unwrap();

    let mut sync_a = SyncEngine::new(FlakyRemote {
        inner: FsRemote::open(&rig.remote_path).unwrap(),
        fail_next_push: true,
    });

    let err = sync_a.push(a.store_mut()).unwrap_err();
    assert!(matches!(err, Error::RemoteUnavailable(_)));
    assert_eq!(a.store().meta_get(&hwm_key).unwrap(), None);

    // Retry pushes the very same entries and advances to the last id.
    assert_eq!(sync_a.push(a.store_mut()).unwrap(), 2);
    let hwm = a.store().meta_get(&hwm_key).unwrap().unwrap();
    let last = oplog::for_device_after(a.store().conn(), &device_id, None)
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(hwm, last.id);
}

#[test]
fn marks_are_monotone_across_rounds() {
    let rig = Rig::new();
    let mut a = replica();
    let mut b = replica();
    let mut sync_a = rig.sync_engine();
    let mut sync_b = rig.sync_engine();

    let device_a = a.device_id().to_string();
    let hwm_key = format!("push_hwm_{device_a}");
    let cursor_key = format!("pull_cursor_{device_a}");

    let mut hwms = Vec::new();
    let mut cursors = Vec::new();
    for round in 0..4 {
        a.create(NewTask::titled(format!("a{round}"))).unwrap();
        b.create(NewTask::titled(format!("b{round}"))).unwrap();
        sync_b.sync(b.store_mut()).unwrap();
        sync_a.sync(a.store_mut()).unwrap();

        hwms.push(a.store().meta_get(&hwm_key).unwrap().unwrap());
        cursors.push(
            a.store()
                .meta_get(&cursor_key)
                .unwrap()
                .unwrap()
                .parse::<i64>()
                .unwrap(),
        );
    }

    assert!(hwms.windows(2).all(|w| w[0] <= w[1]));
    assert!(cursors.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn pulled_duplicates_are_ignored() {
    let rig = Rig::new();
    let mut a = replica();
    let mut b = replica();
    let mut sync_a = rig.sync_engine();

    a.create(NewTask::titled("original")).unwrap();
    sync_a.sync(a.store_mut()).unwrap();

    // Simulate a crash between ingest and cursor upsert: pull the same
    // page twice by resetting the cursor.
    let mut sync_b = rig.sync_engine();
    sync_b.sync(b.store_mut()).unwrap();
    let device_b = b.device_id().to_string();
    b.store()
        .meta_put(&format!("pull_cursor_{device_b}"), "0")
        .unwrap();
    sync_b.sync(b.store_mut()).unwrap();

    assert_eq!(oplog::len(b.store().conn()).unwrap(), 1);
    assert_eq!(task_table(a.store()), task_table(b.store()));
}

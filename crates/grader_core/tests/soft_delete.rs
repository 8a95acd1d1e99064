use chrono::NaiveDate;
use grader_core::service::lifecycle::{state_of, soft_delete, undo};
use grader_core::{
    DeleteScope, DeleteState, Division, EntityKind, Exam, GradeStore, LifecycleError, Module,
    School, StoreError,
};

fn exam_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 30).unwrap()
}

fn seed(store: &GradeStore) -> (School, Division, Module) {
    let school = store
        .create(School::new("East Academy", "Hill 9", "4051", "Basel").selected())
        .unwrap();
    let division = store
        .create(Division::new(school.id, "Bachelor", 1).selected())
        .unwrap();
    let module = store
        .create(Module::new(division.id, "Databases").selected())
        .unwrap();
    (school, division, module)
}

fn add_exam(store: &GradeStore, module: &Module, name: &str) -> Exam {
    store
        .create(Exam::new(module.id, name, 4.0, 1.0, exam_date()).selected())
        .unwrap()
}

#[test]
fn state_of_follows_the_lifecycle() {
    let store = GradeStore::open_in_memory().unwrap();
    let (_, _, module) = seed(&store);
    let exam = add_exam(&store, &module, "sql");

    assert_eq!(state_of(&store, exam.id).unwrap(), DeleteState::Active);

    let token = soft_delete(&store, exam.id).unwrap().unwrap();
    assert_eq!(token.id(), exam.id);
    assert_eq!(token.kind(), EntityKind::Exam);
    assert_eq!(
        state_of(&store, exam.id).unwrap(),
        DeleteState::PendingDelete
    );

    assert!(undo(&store, token).unwrap());
    assert_eq!(state_of(&store, exam.id).unwrap(), DeleteState::Active);

    store.purge(exam.id).unwrap();
    assert_eq!(state_of(&store, exam.id).unwrap(), DeleteState::Purged);
}

#[test]
fn second_delete_of_pending_record_yields_no_token() {
    let store = GradeStore::open_in_memory().unwrap();
    let (_, _, module) = seed(&store);
    let exam = add_exam(&store, &module, "sql");

    assert!(soft_delete(&store, exam.id).unwrap().is_some());
    assert!(soft_delete(&store, exam.id).unwrap().is_none());
}

#[test]
fn undo_after_purge_is_a_no_op() {
    let store = GradeStore::open_in_memory().unwrap();
    let (_, _, module) = seed(&store);
    let exam = add_exam(&store, &module, "sql");

    let token = soft_delete(&store, exam.id).unwrap().unwrap();
    store.purge(exam.id).unwrap();

    assert!(!undo(&store, token).unwrap());
    assert!(store.locate(exam.id).unwrap().is_none());
}

#[test]
fn soft_deleting_a_parent_does_not_flag_descendants() {
    let store = GradeStore::open_in_memory().unwrap();
    let (_, division, module) = seed(&store);
    let exam = add_exam(&store, &module, "sql");

    soft_delete(&store, division.id).unwrap();

    let module: Module = store.get(module.id).unwrap();
    let exam: Exam = store.get(exam.id).unwrap();
    assert!(!module.is_deleted);
    assert!(!exam.is_deleted);
}

#[test]
fn begin_create_purges_pending_members_of_the_scope() {
    let store = GradeStore::open_in_memory().unwrap();
    let (_, _, module) = seed(&store);
    let first = add_exam(&store, &module, "first");
    let second = add_exam(&store, &module, "second");

    let mut scope = DeleteScope::new(EntityKind::Exam, Some(module.id));
    let token = scope.delete(&store, first.id).unwrap();
    assert!(token.is_some());
    assert_eq!(scope.pending(), [first.id]);

    assert_eq!(scope.begin_create(&store).unwrap(), 1);
    assert!(scope.pending().is_empty());
    assert!(store.locate(first.id).unwrap().is_none());
    assert!(store.locate(second.id).unwrap().is_some());

    assert!(!scope.undo(&store, token.unwrap()).unwrap());
}

#[test]
fn undo_within_scope_keeps_the_record_on_close() {
    let store = GradeStore::open_in_memory().unwrap();
    let (_, _, module) = seed(&store);
    let kept = add_exam(&store, &module, "kept");
    let removed = add_exam(&store, &module, "removed");

    let mut scope = DeleteScope::new(EntityKind::Exam, Some(module.id));
    let kept_token = scope.delete(&store, kept.id).unwrap().unwrap();
    scope.delete(&store, removed.id).unwrap();
    assert!(scope.undo(&store, kept_token).unwrap());
    assert_eq!(scope.pending(), [removed.id]);

    assert_eq!(scope.close(&store).unwrap(), 1);
    assert!(store.locate(kept.id).unwrap().is_some());
    assert!(store.locate(removed.id).unwrap().is_none());
}

#[test]
fn closing_a_school_scope_cascades_the_purge() {
    let store = GradeStore::open_in_memory().unwrap();
    let (school, division, module) = seed(&store);
    let exam = add_exam(&store, &module, "sql");

    let mut scope = DeleteScope::new(EntityKind::School, None);
    scope.delete(&store, school.id).unwrap();
    assert_eq!(scope.close(&store).unwrap(), 1);

    for id in [school.id, division.id, module.id, exam.id] {
        assert!(store.locate(id).unwrap().is_none());
    }
}

#[test]
fn scope_rejects_records_from_other_collections() {
    let store = GradeStore::open_in_memory().unwrap();
    let (_, division, module) = seed(&store);
    let other_module = store
        .create(Module::new(division.id, "Networks").selected())
        .unwrap();
    let foreign = add_exam(&store, &other_module, "tcp");

    let mut scope = DeleteScope::new(EntityKind::Exam, Some(module.id));
    assert!(matches!(
        scope.delete(&store, foreign.id),
        Err(LifecycleError::OutOfScope { id, .. }) if id == foreign.id
    ));
    assert!(matches!(
        scope.delete(&store, module.id),
        Err(LifecycleError::OutOfScope { .. })
    ));
    assert!(matches!(
        scope.delete(&store, uuid::Uuid::new_v4()),
        Err(LifecycleError::Store(StoreError::NotFound(_)))
    ));
    assert_eq!(
        state_of(&store, foreign.id).unwrap(),
        DeleteState::Active
    );
}

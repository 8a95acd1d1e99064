use chrono::NaiveDate;
use grader_core::{
    Average, Division, EntityKind, Exam, GradeStore, Module, School, StoreError, ValidationError,
};
use std::time::Duration;
use uuid::Uuid;

fn exam_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
}

struct Tree {
    school: School,
    division: Division,
    module: Module,
}

fn seed(store: &GradeStore) -> Tree {
    let school = store
        .create(School::new("North High", "Elm Road 4", "8001", "Zurich").selected())
        .unwrap();
    let division = store
        .create(Division::new(school.id, "Year 10", 2024).selected())
        .unwrap();
    let module = store
        .create(Module::new(division.id, "Physics").selected())
        .unwrap();
    Tree {
        school,
        division,
        module,
    }
}

#[test]
fn create_and_get_roundtrip_trims_text_fields() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);

    let exam = Exam::new(tree.module.id, "  Optics  ", 4.5, 2.0, exam_date())
        .with_description("  chapter 3  ")
        .selected();
    let created = store.create(exam).unwrap();

    let loaded: Exam = store.get(created.id).unwrap();
    assert_eq!(loaded.name, "Optics");
    assert_eq!(loaded.description.as_deref(), Some("chapter 3"));
    assert_eq!(loaded.date, exam_date());
    assert_eq!(loaded.grade, 4.5);
    assert_eq!(loaded.weight, 2.0);
    assert!(loaded.included);
    assert!(!loaded.is_deleted);
}

#[test]
fn new_aggregate_records_start_undefined() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);

    let module: Module = store.get(tree.module.id).unwrap();
    assert_eq!(module.stored_average, Average::UNDEFINED);
    assert!(store
        .stored_average(EntityKind::Module, tree.module.id)
        .unwrap()
        .is_zero_or_undefined());
}

#[test]
fn validation_failures_leave_storage_untouched() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);

    let zero_weight = Exam::new(tree.module.id, "Quiz", 5.0, 0.0, exam_date());
    assert!(matches!(
        store.create(zero_weight),
        Err(StoreError::Validation(ValidationError::InvalidWeight(w))) if w == 0.0
    ));

    let blank = Module::new(tree.division.id, "   ");
    assert!(matches!(
        store.create(blank),
        Err(StoreError::Validation(ValidationError::BlankName))
    ));

    let bad_zip = School::new("South", "Main 1", "80a1", "Bern");
    assert!(matches!(
        store.create(bad_zip),
        Err(StoreError::Validation(ValidationError::InvalidZip(_)))
    ));

    let negative_year = Division::new(tree.school.id, "Year -1", -1);
    assert!(matches!(
        store.create(negative_year),
        Err(StoreError::Validation(ValidationError::InvalidSchoolYear(-1)))
    ));

    assert!(store
        .list_children::<Exam>(Some(tree.module.id), true)
        .unwrap()
        .is_empty());
    assert_eq!(store.list_children::<School>(None, true).unwrap().len(), 1);
}

#[test]
fn create_requires_an_active_parent() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);

    let orphan_parent = Uuid::new_v4();
    assert!(matches!(
        store.create(Module::new(orphan_parent, "Chemistry")),
        Err(StoreError::ParentNotFound(id)) if id == orphan_parent
    ));

    store.soft_delete(tree.module.id).unwrap();
    assert!(matches!(
        store.create(Exam::new(tree.module.id, "Late", 4.0, 1.0, exam_date())),
        Err(StoreError::ParentNotFound(id)) if id == tree.module.id
    ));
}

#[test]
fn children_are_listed_in_insertion_order() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);

    for name in ["first", "second", "third"] {
        store
            .create(Exam::new(tree.module.id, name, 4.0, 1.0, exam_date()))
            .unwrap();
    }

    let names: Vec<String> = store
        .list_children::<Exam>(Some(tree.module.id), false)
        .unwrap()
        .into_iter()
        .map(|exam| exam.name)
        .collect();
    assert_eq!(names, ["first", "second", "third"]);
}

#[test]
fn soft_deleted_records_are_hidden_from_lists_but_readable_by_id() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);
    let exam = store
        .create(Exam::new(tree.module.id, "Mechanics", 5.0, 1.0, exam_date()))
        .unwrap();

    assert!(store.soft_delete(exam.id).unwrap());
    assert!(!store.soft_delete(exam.id).unwrap());

    assert!(store
        .list_children::<Exam>(Some(tree.module.id), false)
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .list_children::<Exam>(Some(tree.module.id), true)
            .unwrap()
            .len(),
        1
    );
    let loaded: Exam = store.get(exam.id).unwrap();
    assert!(loaded.is_deleted);

    let location = store.locate(exam.id).unwrap().unwrap();
    assert_eq!(location.kind, EntityKind::Exam);
    assert_eq!(location.parent_id, Some(tree.module.id));
    assert!(location.is_deleted);
}

#[test]
fn get_with_wrong_kind_reports_mismatch() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);

    match store.get::<Division>(tree.school.id) {
        Err(StoreError::KindMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, EntityKind::Division);
            assert_eq!(actual, EntityKind::School);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        store.get::<School>(Uuid::new_v4()),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn update_never_touches_average_or_delete_flag() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);
    store
        .create(Exam::new(tree.module.id, "Waves", 4.0, 1.0, exam_date()).selected())
        .unwrap();
    store
        .write_average(EntityKind::Module, tree.module.id, grader_core::weighted_average([(4.0, 1.0)]))
        .unwrap();

    let mut edited: Module = store.get(tree.module.id).unwrap();
    edited.name = "Applied Physics".to_string();
    edited.stored_average = Average::UNDEFINED;
    edited.is_deleted = true;
    let updated = store.update(&edited).unwrap();

    assert_eq!(updated.name, "Applied Physics");
    assert_eq!(updated.stored_average.value(), 4.0);
    assert!(updated.stored_average.is_defined());
    assert!(!updated.is_deleted);
}

#[test]
fn write_average_skips_unchanged_values_and_flags_missing_targets() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);
    let average = grader_core::weighted_average([(3.0, 1.0)]);

    assert!(store
        .write_average(EntityKind::Module, tree.module.id, average)
        .unwrap());
    assert!(!store
        .write_average(EntityKind::Module, tree.module.id, average)
        .unwrap());

    let gone = Uuid::new_v4();
    assert!(matches!(
        store.write_average(EntityKind::Module, gone, average),
        Err(StoreError::StalePropagationTarget { kind: EntityKind::Module, id }) if id == gone
    ));
    assert!(matches!(
        store.write_average(EntityKind::Exam, gone, average),
        Err(StoreError::NotAggregate(EntityKind::Exam))
    ));
}

#[test]
fn children_of_a_pending_parent_are_hidden_until_undo() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);
    store
        .create(Exam::new(tree.module.id, "Optics", 4.0, 1.0, exam_date()))
        .unwrap();
    let exams = store.subscribe::<Exam>(Some(tree.module.id)).unwrap();
    assert_eq!(exams.try_next().unwrap().len(), 1);

    store.soft_delete(tree.division.id).unwrap();
    assert!(store
        .list_children::<Module>(Some(tree.division.id), false)
        .unwrap()
        .is_empty());
    assert!(store
        .list_children::<Exam>(Some(tree.module.id), false)
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .list_children::<Exam>(Some(tree.module.id), true)
            .unwrap()
            .len(),
        1
    );
    assert_eq!(exams.latest().unwrap(), Vec::<Exam>::new());

    store.undo_soft_delete(tree.division.id).unwrap();
    assert_eq!(
        store
            .list_children::<Exam>(Some(tree.module.id), false)
            .unwrap()
            .len(),
        1
    );
    assert_eq!(exams.latest().unwrap().len(), 1);
}

#[test]
fn subscription_starts_with_current_children_and_follows_changes() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);
    store
        .create(Exam::new(tree.module.id, "Heat", 4.0, 1.0, exam_date()))
        .unwrap();

    let stream = store.subscribe::<Exam>(Some(tree.module.id)).unwrap();
    let initial = stream.try_next().unwrap();
    assert_eq!(initial.len(), 1);
    assert!(stream.try_next().is_none());

    let second = store
        .create(Exam::new(tree.module.id, "Light", 5.0, 1.0, exam_date()))
        .unwrap();
    let after_create = stream.next_timeout(Duration::from_millis(100)).unwrap();
    assert_eq!(after_create.len(), 2);

    store.soft_delete(second.id).unwrap();
    let after_delete = stream.latest().unwrap();
    assert_eq!(after_delete.len(), 1);
    assert_eq!(after_delete[0].name, "Heat");
}

#[test]
fn subscription_including_deleted_keeps_flagged_children() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);
    let exam = store
        .create(Exam::new(tree.module.id, "Sound", 4.0, 1.0, exam_date()))
        .unwrap();

    let stream = store
        .subscribe_including_deleted::<Exam>(Some(tree.module.id))
        .unwrap();
    store.soft_delete(exam.id).unwrap();

    let latest = stream.latest().unwrap();
    assert_eq!(latest.len(), 1);
    assert!(latest[0].is_deleted);
}

#[test]
fn purge_removes_subtree_and_closes_child_streams() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);
    for name in ["a", "b"] {
        store
            .create(Exam::new(tree.module.id, name, 4.0, 1.0, exam_date()))
            .unwrap();
    }
    let exams = store.subscribe::<Exam>(Some(tree.module.id)).unwrap();
    assert_eq!(exams.try_next().unwrap().len(), 2);

    let summary = store.purge(tree.division.id).unwrap();
    assert_eq!(summary.divisions, 1);
    assert_eq!(summary.modules, 1);
    assert_eq!(summary.exams, 2);
    assert_eq!(summary.schools, 0);
    assert_eq!(summary.total(), 4);

    assert!(store.locate(tree.module.id).unwrap().is_none());
    assert!(store.locate(tree.division.id).unwrap().is_none());
    assert!(store.locate(tree.school.id).unwrap().is_some());

    assert_eq!(exams.try_next().unwrap(), Vec::<Exam>::new());
    assert!(exams.try_next().is_none());
    assert!(exams.is_closed());
}

#[test]
fn purge_pending_only_removes_flagged_members() {
    let store = GradeStore::open_in_memory().unwrap();
    let tree = seed(&store);
    let keep = store
        .create(Exam::new(tree.module.id, "keep", 4.0, 1.0, exam_date()))
        .unwrap();
    let dropped = store
        .create(Exam::new(tree.module.id, "drop", 4.0, 1.0, exam_date()))
        .unwrap();
    store.soft_delete(dropped.id).unwrap();

    let purged = store
        .purge_pending(EntityKind::Exam, Some(tree.module.id))
        .unwrap();
    assert_eq!(purged, vec![dropped.id]);
    assert!(store.locate(keep.id).unwrap().is_some());
    assert!(store.locate(dropped.id).unwrap().is_none());
}

#[test]
fn file_store_persists_records_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grades.db");

    let school_id = {
        let store = GradeStore::open(&path).unwrap();
        seed(&store).school.id
    };

    let store = GradeStore::open(&path).unwrap();
    let school: School = store.get(school_id).unwrap();
    assert_eq!(school.name, "North High");
    assert_eq!(school.zip_code, "8001");
}

use chrono::NaiveDate;
use grader_core::model::validation::{MAX_GRADE, MAX_WEIGHT};
use grader_core::{
    root_average, Division, EntityKind, Exam, GradeStore, Module, PropagationPipeline, School,
    StoreError, ValidationError,
};

fn exam_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
}

struct Fixture {
    store: GradeStore,
    pipeline: PropagationPipeline,
    school: School,
    division: Division,
    module: Module,
}

fn fixture() -> Fixture {
    let store = GradeStore::open_in_memory().unwrap();
    let pipeline = PropagationPipeline::attach(&store);
    let school = store
        .create(School::new("West School", "Lake Road 2", "3000", "Bern").selected())
        .unwrap();
    let division = store
        .create(Division::new(school.id, "Grade 11", 2024).selected())
        .unwrap();
    let module = store
        .create(Module::new(division.id, "Mathematics").selected())
        .unwrap();
    Fixture {
        store,
        pipeline,
        school,
        division,
        module,
    }
}

fn add_exam(fx: &Fixture, grade: f64, weight: f64, included: bool) -> Exam {
    let mut exam = Exam::new(fx.module.id, "exam", grade, weight, exam_date());
    exam.included = included;
    fx.store.create(exam).unwrap()
}

fn module_average(fx: &Fixture) -> grader_core::Average {
    fx.store
        .stored_average(EntityKind::Module, fx.module.id)
        .unwrap()
}

#[test]
fn weighted_module_average_ignores_excluded_exams() {
    let fx = fixture();
    add_exam(&fx, 5.0, 1.0, true);
    add_exam(&fx, 3.0, 2.0, true);
    add_exam(&fx, 6.0, 1.0, false);

    let report = fx.pipeline.pump(&fx.store);
    assert_eq!(report.failed, 0);
    assert_eq!(report.stale, 0);

    let average = module_average(&fx);
    assert!(average.is_defined());
    assert_eq!(average.value(), 3.67);
}

#[test]
fn module_without_included_exams_is_zero_or_undefined() {
    let fx = fixture();
    add_exam(&fx, 5.0, 1.0, false);
    fx.pipeline.pump(&fx.store);

    let average = module_average(&fx);
    assert_eq!(average.value(), 0.0);
    assert!(average.is_zero_or_undefined());
    assert!(average.is_undefined());
}

#[test]
fn soft_delete_and_undo_restore_the_previous_average() {
    let fx = fixture();
    add_exam(&fx, 5.0, 1.0, true);
    let heavy = add_exam(&fx, 3.0, 2.0, true);
    add_exam(&fx, 6.0, 1.0, false);
    fx.pipeline.pump(&fx.store);
    assert_eq!(module_average(&fx).value(), 3.67);

    fx.store.soft_delete(heavy.id).unwrap();
    fx.pipeline.pump(&fx.store);
    assert_eq!(module_average(&fx).value(), 5.0);

    fx.store.undo_soft_delete(heavy.id).unwrap();
    fx.pipeline.pump(&fx.store);
    assert_eq!(module_average(&fx).value(), 3.67);
}

#[test]
fn toggling_inclusion_adds_and_removes_one_contribution() {
    let fx = fixture();
    add_exam(&fx, 4.0, 1.0, true);
    let toggled = add_exam(&fx, 6.0, 1.0, false);
    fx.pipeline.pump(&fx.store);
    assert_eq!(module_average(&fx).value(), 4.0);

    fx.store.set_included(toggled.id, true).unwrap();
    fx.pipeline.pump(&fx.store);
    assert_eq!(module_average(&fx).value(), 5.0);

    fx.store.set_included(toggled.id, false).unwrap();
    fx.pipeline.pump(&fx.store);
    assert_eq!(module_average(&fx).value(), 4.0);
}

#[test]
fn successive_toggles_coalesce_into_one_recompute_per_parent() {
    let fx = fixture();
    add_exam(&fx, 4.0, 1.0, true);
    let toggled = add_exam(&fx, 6.0, 1.0, false);
    fx.pipeline.pump(&fx.store);
    assert_eq!(module_average(&fx).value(), 4.0);

    fx.store.set_included(toggled.id, true).unwrap();
    fx.store.set_included(toggled.id, false).unwrap();
    fx.store.set_included(toggled.id, true).unwrap();
    assert_eq!(fx.pipeline.pending(), 3);

    // module, division, school
    let report = fx.pipeline.pump(&fx.store);
    assert_eq!(report.recomputed, 3);
    assert_eq!(report.written, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(module_average(&fx).value(), 5.0);
    assert_eq!(
        fx.store
            .stored_average(EntityKind::School, fx.school.id)
            .unwrap()
            .value(),
        5.0
    );
}

#[test]
fn oversized_exam_values_are_rejected_before_propagation() {
    let fx = fixture();
    let huge_grade = Exam::new(fx.module.id, "huge", 1e308, 1.0, exam_date()).selected();
    assert!(matches!(
        fx.store.create(huge_grade),
        Err(StoreError::Validation(ValidationError::GradeTooLarge { .. }))
    ));
    let huge_weight = Exam::new(fx.module.id, "heavy", 5.0, 1e308, exam_date()).selected();
    assert!(matches!(
        fx.store.create(huge_weight),
        Err(StoreError::Validation(ValidationError::WeightTooLarge { .. }))
    ));

    add_exam(&fx, MAX_GRADE, MAX_WEIGHT, true);
    add_exam(&fx, MAX_GRADE, MAX_WEIGHT, true);
    let report = fx.pipeline.pump(&fx.store);
    assert_eq!(report.failed, 0);

    let average = module_average(&fx);
    assert!(average.is_defined());
    assert_eq!(average.value(), MAX_GRADE);
}

#[test]
fn leaf_change_reaches_division_school_and_root() {
    let fx = fixture();
    add_exam(&fx, 5.0, 1.0, true);
    add_exam(&fx, 4.0, 1.0, true);

    let second_module = fx
        .store
        .create(Module::new(fx.division.id, "History").selected())
        .unwrap();
    fx.store
        .create(Exam::new(second_module.id, "essay", 3.0, 1.0, exam_date()).selected())
        .unwrap();

    let report = fx.pipeline.pump(&fx.store);
    assert!(report.written >= 4);

    // (4.5 + 3.0) / 2
    let division = fx
        .store
        .stored_average(EntityKind::Division, fx.division.id)
        .unwrap();
    assert_eq!(division.value(), 3.75);
    let school = fx
        .store
        .stored_average(EntityKind::School, fx.school.id)
        .unwrap();
    assert_eq!(school.value(), 3.75);
    assert_eq!(root_average(&fx.store).unwrap().value(), 3.75);
}

#[test]
fn included_child_with_undefined_average_counts_as_zero() {
    let fx = fixture();
    add_exam(&fx, 6.0, 1.0, true);
    fx.store
        .create(Module::new(fx.division.id, "Empty").selected())
        .unwrap();
    fx.pipeline.pump(&fx.store);

    let division = fx
        .store
        .stored_average(EntityKind::Division, fx.division.id)
        .unwrap();
    assert_eq!(division.value(), 3.0);
}

#[test]
fn reparenting_an_exam_updates_both_modules() {
    let fx = fixture();
    let moving = add_exam(&fx, 2.0, 1.0, true);
    add_exam(&fx, 4.0, 1.0, true);
    let target = fx
        .store
        .create(Module::new(fx.division.id, "Target").selected())
        .unwrap();
    fx.pipeline.pump(&fx.store);
    assert_eq!(module_average(&fx).value(), 3.0);

    let mut moved = moving.clone();
    moved.module_id = target.id;
    fx.store.update(&moved).unwrap();
    fx.pipeline.pump(&fx.store);

    assert_eq!(module_average(&fx).value(), 4.0);
    assert_eq!(
        fx.store
            .stored_average(EntityKind::Module, target.id)
            .unwrap()
            .value(),
        2.0
    );
}

#[test]
fn purged_parent_is_skipped_as_stale() {
    let fx = fixture();
    fx.pipeline.pump(&fx.store);

    let doomed = fx
        .store
        .create(Module::new(fx.division.id, "Doomed").selected())
        .unwrap();
    fx.store
        .create(Exam::new(doomed.id, "orphan", 5.0, 1.0, exam_date()).selected())
        .unwrap();
    fx.store.purge(doomed.id).unwrap();

    let report = fx.pipeline.pump(&fx.store);
    assert_eq!(report.stale, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fx.pipeline.pending(), 0);
}

#[test]
fn quiescent_pipeline_writes_nothing() {
    let fx = fixture();
    add_exam(&fx, 5.0, 1.0, true);
    fx.pipeline.pump(&fx.store);

    let idle = fx.pipeline.pump(&fx.store);
    assert_eq!(idle.events, 0);
    assert_eq!(idle.written, 0);

    let average = module_average(&fx);
    assert!(!fx
        .store
        .write_average(EntityKind::Module, fx.module.id, average)
        .unwrap());
}

#[test]
fn reconcile_repairs_hand_edited_caches() {
    let fx = fixture();
    add_exam(&fx, 5.0, 1.0, true);
    fx.pipeline.pump(&fx.store);

    fx.store
        .connection()
        .execute(
            "UPDATE modules SET grade = 1.0, grade_defined = 1 WHERE id = ?1;",
            [fx.module.id.to_string()],
        )
        .unwrap();
    assert_eq!(module_average(&fx).value(), 1.0);

    let report = fx.pipeline.reconcile(&fx.store).unwrap();
    assert!(report.written >= 1);
    assert_eq!(module_average(&fx).value(), 5.0);
}

#[test]
fn recompute_rejects_leaf_kinds() {
    let fx = fixture();
    let exam = add_exam(&fx, 5.0, 1.0, true);
    assert!(matches!(
        fx.pipeline.recompute(&fx.store, EntityKind::Exam, exam.id),
        Err(grader_core::StoreError::NotAggregate(EntityKind::Exam))
    ));
}

#[test]
fn shutdown_drains_queued_changes() {
    let fx = fixture();
    add_exam(&fx, 2.5, 1.0, true);
    let Fixture {
        store,
        pipeline,
        module,
        ..
    } = fx;

    let report = pipeline.shutdown(&store);
    assert!(report.written >= 1);
    assert_eq!(
        store
            .stored_average(EntityKind::Module, module.id)
            .unwrap()
            .value(),
        2.5
    );
}

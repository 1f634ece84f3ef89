//! End-to-end cascade tests through the engine's public API.
//!
//! Each test drives primary facts or update requests through
//! [`CascadeEngine`] and asserts on the derived state and the outbox:
//! consecutivity thresholds, warnings, points and ranking order, targets
//! and streaks, and the transactional request workflow.

#![allow(clippy::panic)]

use std::sync::Arc;

use fasee7_engine::config::EngineConfig;
use fasee7_engine::domain::event::DomainEvent;
use fasee7_engine::domain::facts::{AttendanceStatus, HomeworkStatus};
use fasee7_engine::domain::ids::{LessonId, QuizId, StudentId};
use fasee7_engine::domain::student::Student;
use fasee7_engine::domain::target::TargetCategory;
use fasee7_engine::domain::update_request::{RequestKind, RequestStatus};
use fasee7_engine::domain::warning::WarningKind;
use fasee7_engine::engine::CascadeEngine;
use fasee7_engine::service::StaticPrivileges;

fn make_engine() -> CascadeEngine {
    let config = EngineConfig::default();
    CascadeEngine::new(&config, Arc::new(StaticPrivileges::new(["admin-1"])))
}

async fn register(engine: &CascadeEngine, name: &str) -> Student {
    let student = engine.register_student(name).await;
    let Ok(student) = student else {
        panic!("registration failed for {name}");
    };
    student
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<DomainEvent>) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn total_is_always_the_sum_of_subtotals() {
    let engine = make_engine();
    let student = register(&engine, "Hala").await;
    let lesson = LessonId::new();

    let _ = engine
        .record_attendance(student.id, lesson, AttendanceStatus::Present)
        .await;
    let _ = engine
        .record_homework(student.id, lesson, HomeworkStatus::Partial)
        .await;
    let _ = engine
        .complete_quiz_grading(QuizId::new(), &[(student.id, 17)])
        .await;
    let _ = engine
        .on_pi_degraded(student.id, TargetCategory::Grammar, 5, 4)
        .await;
    let _ = engine
        .on_pi_improved(student.id, TargetCategory::Grammar, 5)
        .await;

    let points = engine.stores().points_or_init(student.id).await;
    assert_eq!(points.quiz_points, 17);
    assert_eq!(points.attendance_points, 1);
    assert_eq!(points.homework_points, 1);
    assert_eq!(points.target_points, 1);
    assert_eq!(
        points.total_points,
        points.quiz_points
            + points.attendance_points
            + points.homework_points
            + points.target_points
    );
}

#[tokio::test]
async fn ranking_breaks_total_ties_on_quiz_points() {
    let engine = make_engine();
    let quizzer = register(&engine, "Mira").await;
    let worker = register(&engine, "Tarek").await;
    let lesson_a = LessonId::new();
    let lesson_b = LessonId::new();

    // Both end on 5 total: one from a quiz, one from homework.
    let _ = engine
        .complete_quiz_grading(QuizId::new(), &[(quizzer.id, 5)])
        .await;
    let _ = engine
        .record_homework_batch(&[
            (worker.id, lesson_a, HomeworkStatus::Done),
            (worker.id, lesson_b, HomeworkStatus::Partial),
        ])
        .await;
    // Done(3) + Partial(1) = 4; one more Partial lesson makes 5.
    let _ = engine
        .record_homework(worker.id, LessonId::new(), HomeworkStatus::Partial)
        .await;

    let ranking = engine.ranking().await;
    let ids: Vec<StudentId> = ranking.iter().map(|r| r.student_id).collect();
    assert_eq!(ids, vec![quizzer.id, worker.id]);
    assert_eq!(engine.rank_of(quizzer.id).await, 1);
    assert_eq!(engine.rank_of(worker.id).await, 2);
}

#[tokio::test]
async fn presence_resets_the_absence_run() {
    let engine = make_engine();
    let student = register(&engine, "Jude").await;

    for _ in 0..2 {
        let _ = engine
            .record_attendance(student.id, LessonId::new(), AttendanceStatus::Absent)
            .await;
    }
    let back = engine
        .record_attendance(student.id, LessonId::new(), AttendanceStatus::Present)
        .await;
    let Ok(back) = back else {
        panic!("attendance failed");
    };
    assert_eq!(back.count, 0);

    // The next absence starts a fresh run at 1, below every threshold.
    let next = engine
        .record_attendance(student.id, LessonId::new(), AttendanceStatus::Absent)
        .await;
    let Ok(next) = next else {
        panic!("attendance failed");
    };
    assert_eq!(next.count, 1);
    assert!(next.crossing.is_none());
}

#[tokio::test]
async fn absence_thresholds_fire_exactly_once_per_crossing() {
    let engine = make_engine();
    let mut outbox = engine.event_bus().subscribe();
    let student = register(&engine, "Lina").await;

    // Five straight absences: crossings only at 2 and 3.
    for _ in 0..5 {
        let _ = engine
            .record_attendance(student.id, LessonId::new(), AttendanceStatus::Absent)
            .await;
    }

    let crossings: Vec<u32> = drain(&mut outbox)
        .into_iter()
        .filter_map(|event| match event {
            DomainEvent::ConsecutiveThresholdReached { count, .. } => Some(count),
            _ => None,
        })
        .collect();
    assert_eq!(crossings, vec![2, 3]);

    let warnings = engine.active_warnings(student.id, None).await;
    assert_eq!(warnings.len(), 2);
}

#[tokio::test]
async fn warning_resolution_is_idempotent() {
    let engine = make_engine();
    let student = register(&engine, "Fadi").await;
    for _ in 0..2 {
        let _ = engine
            .record_attendance(student.id, LessonId::new(), AttendanceStatus::Absent)
            .await;
    }
    let warning = engine
        .active_warnings(student.id, Some(WarningKind::ConsecutiveAbsence))
        .await
        .into_iter()
        .next();
    let Some(warning) = warning else {
        panic!("warning missing");
    };

    let first = engine.resolve_warning(warning.id, "guardian contacted").await;
    assert!(matches!(first, Ok(true)));
    let second = engine.resolve_warning(warning.id, "again").await;
    assert!(matches!(second, Ok(false)));
    assert!(
        engine
            .active_warnings(student.id, Some(WarningKind::ConsecutiveAbsence))
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn degradation_creates_one_target_per_lost_level() {
    let engine = make_engine();
    let student = register(&engine, "Omar").await;

    let created = engine
        .on_pi_degraded(student.id, TargetCategory::Reading, 10, 6)
        .await;
    let Ok(created) = created else {
        panic!("degradation failed");
    };
    let mut thresholds: Vec<i64> = created.iter().map(|t| t.threshold).collect();
    thresholds.sort_unstable();
    assert_eq!(thresholds, vec![7, 8, 9, 10]);

    // A repeat drop over the same range creates nothing new.
    let repeat = engine
        .on_pi_degraded(student.id, TargetCategory::Reading, 10, 6)
        .await;
    let Ok(repeat) = repeat else {
        panic!("degradation failed");
    };
    assert!(repeat.is_empty());

    let achieved = engine
        .on_pi_improved(student.id, TargetCategory::Reading, 9)
        .await;
    let Ok(achieved) = achieved else {
        panic!("improvement failed");
    };
    let reached: Vec<i64> = achieved.iter().map(|t| t.threshold).collect();
    assert_eq!(reached, vec![7, 8, 9]);

    // Streak went 1, 2, 3: bonus points 1 + 2 + 3 = 6.
    let streak = engine.stores().streak_or_init(student.id).await;
    assert_eq!(streak.current_streak, 3);
    assert_eq!(streak.cumulative_points, 6);
}

#[tokio::test]
async fn one_pending_request_per_entity() {
    let engine = make_engine();
    let student = register(&engine, "Yara").await;
    let lesson = LessonId::new();
    let _ = engine
        .record_attendance(student.id, lesson, AttendanceStatus::Absent)
        .await;

    let payload = serde_json::json!({ "lesson_id": lesson, "status": "present" });
    let first = engine
        .submit_request(
            RequestKind::AttendanceStatusChange,
            student.id,
            payload.clone(),
            "assistant-1",
        )
        .await;
    let Ok(first) = first else {
        panic!("submit failed");
    };

    let duplicate = engine
        .submit_request(
            RequestKind::AttendanceStatusChange,
            student.id,
            payload.clone(),
            "assistant-2",
        )
        .await;
    assert!(duplicate.is_err());

    let rejected = engine
        .reject_request("admin-1", first.id, "already verified")
        .await;
    assert!(rejected.is_ok());

    // Once the pending request resolves, the entity is open again.
    let resubmit = engine
        .submit_request(
            RequestKind::AttendanceStatusChange,
            student.id,
            payload,
            "assistant-2",
        )
        .await;
    assert!(resubmit.is_ok());
}

#[tokio::test]
async fn approved_correction_runs_the_full_cascade() {
    let engine = make_engine();
    let student = register(&engine, "Hana").await;
    let quiz_id = QuizId::new();
    let _ = engine
        .complete_quiz_grading(quiz_id, &[(student.id, 9)])
        .await;

    let request = engine
        .submit_request(
            RequestKind::QuizScoreCorrection,
            student.id,
            serde_json::json!({ "quiz_id": quiz_id, "score": 12 }),
            "assistant-1",
        )
        .await;
    let Ok(request) = request else {
        panic!("submit failed");
    };
    let outcome = engine
        .approve_request("admin-1", request.id, None)
        .await;
    let Ok(outcome) = outcome else {
        panic!("approve failed");
    };
    assert_eq!(outcome.status, RequestStatus::Completed);

    let points = engine.stores().points_or_init(student.id).await;
    assert_eq!(points.quiz_points, 12);
    assert_eq!(points.total_points, 12);
}

#[tokio::test]
async fn failed_request_rolls_back_and_keeps_failed_status() {
    let engine = make_engine();
    let student = register(&engine, "Sami").await;
    let graded_lesson = LessonId::new();
    let _ = engine
        .record_attendance(student.id, graded_lesson, AttendanceStatus::Present)
        .await;

    // Target a lesson that was never recorded: submission verification
    // sees the student, but the handler finds no record and fails.
    let request = engine
        .submit_request(
            RequestKind::AttendanceStatusChange,
            student.id,
            serde_json::json!({ "lesson_id": LessonId::new(), "status": "present" }),
            "assistant-1",
        )
        .await;
    let Ok(request) = request else {
        panic!("submit failed");
    };

    let before = engine.stores().points_or_init(student.id).await;
    let outcome = engine.approve_request("admin-1", request.id, None).await;
    let Ok(outcome) = outcome else {
        panic!("approve call failed");
    };
    assert_eq!(outcome.status, RequestStatus::Failed);
    assert!(outcome.failure_reason.is_some());

    // Derived state is exactly what it was before the attempt.
    let after = engine.stores().points_or_init(student.id).await;
    assert_eq!(after.total_points, before.total_points);
    assert_eq!(engine.stores().attendance.len().await, 1);
}

#[tokio::test]
async fn restore_request_reactivates_and_clears_absence_warnings() {
    let engine = make_engine();
    let student = register(&engine, "Nour").await;
    for _ in 0..3 {
        let _ = engine
            .record_attendance(student.id, LessonId::new(), AttendanceStatus::Absent)
            .await;
    }
    let archived = engine.archive_student(student.id).await;
    assert!(archived.is_ok());

    let request = engine
        .submit_request(
            RequestKind::RestoreStudent,
            student.id,
            serde_json::json!({}),
            "assistant-1",
        )
        .await;
    let Ok(request) = request else {
        panic!("submit failed");
    };
    let outcome = engine.approve_request("admin-1", request.id, None).await;
    let Ok(outcome) = outcome else {
        panic!("approve failed");
    };
    assert_eq!(outcome.status, RequestStatus::Completed);

    let restored = engine.stores().student(student.id).await;
    let Ok(restored) = restored else {
        panic!("student missing");
    };
    assert!(restored.is_active());
    assert!(engine.active_warnings(student.id, None).await.is_empty());

    // The absence run restarted from zero.
    let next = engine
        .record_attendance(student.id, LessonId::new(), AttendanceStatus::Absent)
        .await;
    let Ok(next) = next else {
        panic!("attendance failed");
    };
    assert_eq!(next.count, 1);
}

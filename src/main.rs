//! fasee7-engine demo driver.
//!
//! Seeds a small roster and replays a scripted week of primary facts:
//! absences up to the archival threshold, homework, a graded quiz, a
//! behavioral incident run, and an update request taken through approval.
//! Every outbox event is drained at the end and logged together with the
//! notification drafts the planner derives from it.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use fasee7_engine::config::EngineConfig;
use fasee7_engine::domain::facts::{AttendanceStatus, HomeworkStatus, IncidentKind};
use fasee7_engine::domain::ids::{LessonId, QuizId};
use fasee7_engine::domain::target::TargetCategory;
use fasee7_engine::domain::update_request::RequestKind;
use fasee7_engine::engine::CascadeEngine;
use fasee7_engine::service::{NotificationPlanner, StaticPrivileges};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env();
    tracing::info!(
        capacity = config.event_bus_capacity,
        top_n = config.ranking_top_n,
        "starting fasee7-engine demo"
    );

    let engine = CascadeEngine::new(&config, Arc::new(StaticPrivileges::new(["admin-1"])));
    let mut outbox = engine.event_bus().subscribe();

    // Roster.
    let hala = engine.register_student("Hala").await?;
    let tarek = engine.register_student("Tarek").await?;
    let mira = engine.register_student("Mira").await?;

    // A week of lessons. Tarek misses three in a row and crosses both
    // absence thresholds.
    let lessons: Vec<LessonId> = (0..3).map(|_| LessonId::new()).collect();
    for lesson_id in &lessons {
        let _ = engine
            .record_attendance(hala.id, *lesson_id, AttendanceStatus::Present)
            .await?;
        let _ = engine
            .record_attendance(mira.id, *lesson_id, AttendanceStatus::Present)
            .await?;
        let outcome = engine
            .record_attendance(tarek.id, *lesson_id, AttendanceStatus::Absent)
            .await?;
        tracing::info!(student = %tarek.id, count = outcome.count, "absence recorded");
    }

    // Homework for the first lesson.
    if let Some(first_lesson) = lessons.first() {
        let _ = engine
            .record_homework_batch(&[
                (hala.id, *first_lesson, HomeworkStatus::Done),
                (mira.id, *first_lesson, HomeworkStatus::Partial),
                (tarek.id, *first_lesson, HomeworkStatus::NotDone),
            ])
            .await?;
    }

    // Quiz grading lands; Mira's score will later turn out to be wrong.
    let quiz_id = QuizId::new();
    let _ = engine
        .complete_quiz_grading(quiz_id, &[(hala.id, 14), (mira.id, 9), (tarek.id, 11)])
        .await?;

    // Two same-kind incidents raise a behavioral warning.
    for note in ["interrupting repeatedly", "interrupting again"] {
        let outcome = engine
            .record_incident(mira.id, LessonId::new(), IncidentKind::Disruption, note)
            .await?;
        if let Some(warning) = &outcome.warning {
            tracing::info!(warning_id = %warning.id, reason = %warning.reason, "behavioral warning");
        }
    }

    // A reading dip creates remedial targets; partial recovery banks a
    // streak bonus.
    let _ = engine
        .on_pi_degraded(hala.id, TargetCategory::Reading, 8, 6)
        .await?;
    let _ = engine
        .on_pi_improved(hala.id, TargetCategory::Reading, 7)
        .await?;

    // An assistant files a score correction; an admin approves it.
    let request = engine
        .submit_request(
            RequestKind::QuizScoreCorrection,
            mira.id,
            serde_json::json!({ "quiz_id": quiz_id, "score": 12 }),
            "assistant-1",
        )
        .await?;
    let resolved = engine
        .approve_request("admin-1", request.id, Some("re-marked by hand".to_string()))
        .await?;
    tracing::info!(request_id = %resolved.id, status = ?resolved.status, "request resolved");

    for entry in engine.ranking().await {
        tracing::info!(
            rank = entry.rank,
            name = %entry.name,
            total = entry.points.total_points,
            "final ranking"
        );
    }

    // Drain the outbox and show what the planner would send.
    let mut planner = NotificationPlanner::new();
    while let Ok(event) = outbox.try_recv() {
        tracing::info!(event = event.event_type_str(), "outbox");
        for draft in planner.plan(&event) {
            tracing::info!(
                recipient = ?draft.recipient,
                subject = %draft.subject,
                body = %draft.body,
                "notification draft"
            );
        }
    }

    Ok(())
}

use breathhold_core::Database;
use serde::Serialize;

/// One line of history. The full result, including the safety event log,
/// is kept in the database.
#[derive(Serialize)]
struct HistoryEntry {
    session_id: String,
    program_id: String,
    level: String,
    started_at: Option<String>,
    ended_at: String,
    completion_reason: String,
    rounds_completed: usize,
    best_hold_secs: f64,
    consistency_score: f64,
    safety_compliance: String,
    safety_events: usize,
}

pub fn run(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let entries: Vec<HistoryEntry> = db
        .recent_results(limit)?
        .into_iter()
        .map(|r| HistoryEntry {
            session_id: r.session_id.to_string(),
            program_id: r.program_id.clone(),
            level: r.level.to_string(),
            started_at: r.started_at.map(|t| t.to_rfc3339()),
            ended_at: r.ended_at.to_rfc3339(),
            completion_reason: r.completion_reason.to_string(),
            rounds_completed: r.rounds_completed(),
            best_hold_secs: r.best_hold.as_secs_f64(),
            consistency_score: r.consistency_score,
            safety_compliance: r.safety_compliance.as_str().to_string(),
            safety_events: r.safety_events.len(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

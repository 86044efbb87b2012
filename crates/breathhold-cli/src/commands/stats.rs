use breathhold_core::{Database, HistoryStats};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let stats = HistoryStats::compute_now(&db.all_results()?);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

//! SQL builders for the report AI columns.
//!
//! Execution belongs to the web layer's database session.

/// Column name and SQL type, in write order.
pub fn report_ai_columns() -> Vec<(&'static str, &'static str)> {
    vec![
        ("validation_score", "FLOAT"),
        ("validation_status", "VARCHAR(20)"),
        ("validation_warnings", "TEXT"),
        ("ai_confidence", "FLOAT"),
        ("ai_predicted_class", "VARCHAR(50)"),
        ("ai_severity", "VARCHAR(20)"),
        ("final_score", "FLOAT"),
        ("gps_verified", "BOOLEAN DEFAULT FALSE"),
        ("gps_has_photo_location", "BOOLEAN DEFAULT FALSE"),
        ("gps_distance_km", "FLOAT"),
        ("gps_spoofing_detected", "BOOLEAN DEFAULT FALSE"),
    ]
}

/// Idempotent `ALTER TABLE` statements adding every AI column.
pub fn build_add_columns_migration() -> Vec<String> {
    report_ai_columns()
        .into_iter()
        .map(|(name, sql_type)| {
            format!(
                "ALTER TABLE reports ADD COLUMN IF NOT EXISTS {} {}",
                name, sql_type
            )
        })
        .collect()
}

/// `UPDATE` of the AI columns; `$1` is the report id, the columns follow
/// in `report_ai_columns` order.
pub fn build_report_ai_update() -> String {
    let assignments: Vec<String> = report_ai_columns()
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("{} = ${}", name, i + 2))
        .collect();

    format!(
        "UPDATE reports SET {} WHERE id = $1",
        assignments.join(", ")
    )
}

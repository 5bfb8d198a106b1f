//! Sample SQLite database with sensor telemetry

use std::path::Path;

use rusqlite::{Connection, Result};

/// Create `path` with a `sensor_telemetry` table holding `rows` readings
pub fn create_sample_database(path: &Path, rows: usize) -> Result<()> {
    let mut conn = Connection::open(path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sensor_telemetry (
            id INTEGER PRIMARY KEY,
            timestamp TEXT NOT NULL,
            sensor_id TEXT,
            temperature REAL,
            humidity REAL,
            status TEXT
        );
        ",
    )?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO sensor_telemetry (id, timestamp, sensor_id, temperature, humidity, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        let mut rng = 42u32;
        for i in 0..rows {
            let t = i as f64 * 0.01;
            let temperature = 20.0 + 5.0 * t.sin() + random_float(&mut rng) * 0.2;
            let humidity = 40.0 + 10.0 * t.cos() + random_float(&mut rng) * 0.5;
            let status = if random_float(&mut rng) < 0.95 {
                "OK"
            } else if random_float(&mut rng) < 0.7 {
                "WARNING"
            } else {
                "ERROR"
            };

            stmt.execute((
                i as i64,
                timestamp(i),
                format!("SENSOR_{}", (i % 5) + 1),
                temperature,
                humidity,
                status,
            ))?;
        }
    }
    tx.commit()?;

    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_sensor_id ON sensor_telemetry(sensor_id);")?;
    tracing::info!(path = %path.display(), rows, "sample database created");
    Ok(())
}

/// One reading per second from midnight, 2024-01-01
fn timestamp(seconds: usize) -> String {
    let days = seconds / 86_400;
    let rest = seconds % 86_400;
    format!(
        "2024-01-{:02} {:02}:{:02}:{:02}",
        (days % 31) + 1,
        rest / 3600,
        (rest % 3600) / 60,
        rest % 60
    )
}

fn random_float(seed: &mut u32) -> f64 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    (*seed as f64) / (u32::MAX as f64)
}

use anyhow::Context;
use rusqlite::Connection;

use crate::measurement::Measurement;

pub const DB_FILE: &str = "./sen44-env-log.db";

#[derive(Debug)]
pub struct DB {
    conn: Connection,
}

impl DB {
    pub fn new() -> Result<Self, anyhow::Error> {
        let conn = Connection::open(DB_FILE).context("Failed to open database file")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<(), anyhow::Error> {
        self.conn
            .execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS measurements (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    pm_1_0 REAL,
                    pm_2_5 REAL,
                    pm_4_0 REAL,
                    pm_10_0 REAL,
                    voc REAL,
                    humidity REAL,
                    temperature REAL
                );
                ",
            )
            .context("Failed to create table")?;
        Ok(())
    }

    pub fn insert(&self, data: &Measurement) -> Result<(), anyhow::Error> {
        self.conn
            .execute(
                r"
                INSERT INTO measurements (timestamp, pm_1_0, pm_2_5, pm_4_0, pm_10_0, voc, humidity, temperature)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    data.timestamp.to_rfc3339(),
                    data.pm_1_0,
                    data.pm_2_5,
                    data.pm_4_0,
                    data.pm_10_0,
                    data.voc,
                    data.humidity,
                    data.temperature,
                ],
            )
            .context("Failed to insert data into table")?;
        Ok(())
    }
}

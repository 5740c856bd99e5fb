//! The `cars` table: schema, batch upsert-or-ignore, and read-back

use async_trait::async_trait;
use carsales_common::types::{NormalizedRecord, StoredRecord};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Connection, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use super::{DbError, DbResult};
use crate::pipeline::CarStore;

/// Maximum rows per INSERT statement (16 binds per row, PG allows 65535).
pub const INSERT_CHUNK_SIZE: usize = 1000;

pub const CREATE_CARS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS cars (
        id SERIAL PRIMARY KEY,
        year INT,
        maker VARCHAR(255),
        model VARCHAR(255),
        "trim" VARCHAR(255),
        body VARCHAR(255),
        transmission VARCHAR(255),
        vin VARCHAR(17) UNIQUE,
        state VARCHAR(255),
        condition VARCHAR(255),
        odometer INT,
        color VARCHAR(255),
        interior VARCHAR(255),
        seller VARCHAR(255),
        mmr INT,
        sellingprice INT,
        saledate TIMESTAMP
    )
"#;

const INSERT_CARS: &str = r#"
    INSERT INTO cars (
        year, maker, model, "trim", body, transmission, vin, state, condition,
        odometer, color, interior, seller, mmr, sellingprice, saledate
    )
"#;

const SELECT_CARS: &str = r#"
    SELECT id, year, maker, model, "trim", body, transmission, vin, state, condition,
           odometer, color, interior, seller, mmr, sellingprice, saledate
    FROM cars
    ORDER BY id
"#;

/// The run's connection, wrapped as a [`CarStore`]
pub struct PgCarStore {
    conn: Option<PgConnection>,
}

impl PgCarStore {
    pub fn new(conn: PgConnection) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn(&mut self) -> DbResult<&mut PgConnection> {
        self.conn.as_mut().ok_or(DbError::Closed)
    }
}

#[async_trait]
impl CarStore for PgCarStore {
    async fn ensure_schema(&mut self) -> DbResult<()> {
        sqlx::query(CREATE_CARS_TABLE).execute(self.conn()?).await?;
        debug!("Ensured cars table exists");
        Ok(())
    }

    /// Insert every record in one transaction; rows whose vin is already
    /// stored are skipped by `ON CONFLICT (vin) DO NOTHING`.
    async fn load(&mut self, records: &[NormalizedRecord]) -> DbResult<usize> {
        if records.is_empty() {
            info!("No records to load");
            return Ok(0);
        }

        let mut tx = self.conn()?.begin().await?;
        let mut inserted: u64 = 0;

        for chunk in records.chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_CARS);

            query_builder.push_values(chunk, |mut b, record| {
                b.push_bind(record.year)
                    .push_bind(record.maker.as_deref())
                    .push_bind(record.model.as_deref())
                    .push_bind(record.trim.as_deref())
                    .push_bind(record.body.as_deref())
                    .push_bind(record.transmission.as_deref())
                    .push_bind(record.vin.as_deref())
                    .push_bind(record.state.as_deref())
                    .push_bind(record.condition.as_deref())
                    .push_bind(record.odometer)
                    .push_bind(record.color.as_deref())
                    .push_bind(record.interior.as_deref())
                    .push_bind(record.seller.as_deref())
                    .push_bind(record.mmr)
                    .push_bind(record.selling_price)
                    .push_bind(record.sale_date);
            });
            query_builder.push(" ON CONFLICT (vin) DO NOTHING");

            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(DbError::from_write)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(DbError::from_write)?;

        info!(
            attempted = records.len(),
            inserted,
            skipped = records.len() as u64 - inserted,
            "Loaded batch into cars"
        );

        Ok(records.len())
    }

    async fn fetch_all(&mut self) -> DbResult<Vec<StoredRecord>> {
        let rows = sqlx::query(SELECT_CARS).fetch_all(self.conn()?).await?;
        debug!(rows = rows.len(), "Fetched stored cars");
        rows.iter().map(stored_record).collect()
    }

    async fn close(&mut self) -> DbResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            info!("Connection closed");
        }
        Ok(())
    }
}

/// Map a `cars` row. NULLs stay absent, integer columns included.
fn stored_record(row: &PgRow) -> DbResult<StoredRecord> {
    Ok(StoredRecord {
        id: row.try_get("id")?,
        year: row.try_get("year")?,
        maker: row.try_get("maker")?,
        model: row.try_get("model")?,
        trim: row.try_get("trim")?,
        body: row.try_get("body")?,
        transmission: row.try_get("transmission")?,
        vin: row.try_get("vin")?,
        state: row.try_get("state")?,
        condition: row.try_get("condition")?,
        odometer: row.try_get("odometer")?,
        color: row.try_get("color")?,
        interior: row.try_get("interior")?,
        seller: row.try_get("seller")?,
        mmr: row.try_get("mmr")?,
        selling_price: row.try_get("sellingprice")?,
        sale_date: row.try_get("saledate")?,
    })
}

//! Postgres-backed `Store` implementation.

use async_trait::async_trait;
use sentinel_common::{Severity, config::DatabaseConfig};
use sqlx::{
    Row,
    postgres::{PgConnectOptions, PgPool, PgPoolOptions},
};

use crate::{
    error::StoreError,
    store::{EntityNames, Store, Thresholds, select_tiers},
};

const ENTITY_NAMES_QUERY: &str = "\
SELECT factorys.factory_name, zones.zone_name, machines.machine_name
FROM devices AS devices
JOIN machines AS machines ON devices.machine_entity_id = machines.machine_entity_id
JOIN entitys AS entity ON machines.machine_entity_id = entity.entity_id
JOIN zones AS zones ON entity.parent_entity_id = zones.zone_entity_id
JOIN entitys AS e ON zones.zone_entity_id = e.entity_id
JOIN factorys AS factorys ON e.parent_entity_id = factorys.factory_entity_id
WHERE devices.device_id = $1";

const COMPANY_FOR_DEVICE_QUERY: &str = "\
WITH RECURSIVE parent_entity AS (
    SELECT e.entity_id, e.parent_entity_id
    FROM devices d
    INNER JOIN machines m ON d.machine_entity_id = m.machine_entity_id
    INNER JOIN entitys e ON e.entity_id = m.machine_entity_id
    WHERE d.device_id = $1

    UNION ALL

    SELECT e.entity_id, e.parent_entity_id
    FROM entitys e
    INNER JOIN parent_entity pe ON e.entity_id = pe.parent_entity_id
)
SELECT entity_id::text
FROM parent_entity
WHERE parent_entity_id IS NULL";

/// `Store` backed by a Postgres connection pool on the `sentinel` schema.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Opens a small pool against the configured database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .options([("search_path", "sentinel")]);

        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool (tests, embedding).
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn thresholds(
        &self,
        device_id: &str,
        sensor_id: &str,
    ) -> Result<Thresholds, StoreError> {
        let row = sqlx::query(
            "SELECT threshold_yellow, threshold_orange, threshold_red \
             FROM sensors WHERE sensor_id = $1 AND device_id = $2",
        )
        .bind(sensor_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::ThresholdsMissing {
                device_id: device_id.to_string(),
                sensor_id: sensor_id.to_string(),
            });
        };

        Ok(Thresholds {
            yellow: row.try_get("threshold_yellow")?,
            orange: row.try_get("threshold_orange")?,
            red: row.try_get("threshold_red")?,
        })
    }

    async fn entity_names(&self, device_id: &str) -> Result<EntityNames, StoreError> {
        let row = sqlx::query(ENTITY_NAMES_QUERY)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(EntityNames::default()),
            Some(row) => Ok(EntityNames {
                factory: row.try_get("factory_name")?,
                zone: row.try_get("zone_name")?,
                machine: row.try_get("machine_name")?,
            }),
        }
    }

    async fn emails(
        &self,
        device_id: &str,
        severity: Severity,
    ) -> Result<Vec<String>, StoreError> {
        let row = sqlx::query(
            "SELECT yellow_emails, orange_emails, red_emails \
             FROM devices WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        let recipients = match row {
            Some(row) => {
                let yellow: Vec<String> = row.try_get("yellow_emails")?;
                let orange: Vec<String> = row.try_get("orange_emails")?;
                let red: Vec<String> = row.try_get("red_emails")?;
                select_tiers(&yellow, &orange, &red, severity)
            }
            None => Vec::new(),
        };

        if recipients.is_empty() {
            Err(StoreError::RecipientsMissing {
                device_id: device_id.to_string(),
                severity,
            })
        } else {
            Ok(recipients)
        }
    }

    async fn company_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT company_entity_id::text FROM companys")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>(0).map_err(StoreError::from))
            .collect()
    }

    async fn company_for_device(&self, device_id: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(COMPANY_FOR_DEVICE_QUERY)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.try_get::<String, _>(0).map_err(StoreError::from))
            .transpose()
    }
}

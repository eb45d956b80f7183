//! Composition record repository.
//!
//! Persists provider measurements through an idempotent upsert keyed on
//! (patient, source, measured_at, metric), so webhook re-deliveries and
//! overlapping re-syncs never create duplicate rows.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::composition_record::{self, Entity as CompositionRecord};
use crate::providers::ProviderMeasurement;

/// Repository for composition record database operations
#[derive(Debug, Clone)]
pub struct MeasurementRepository {
    pub db: Arc<DatabaseConnection>,
}

impl MeasurementRepository {
    /// Creates a new MeasurementRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Upserts a batch of measurements for a patient, returning how many rows
    /// were actually inserted.
    ///
    /// Conflicting rows are left untouched (`DO NOTHING`), so the returned
    /// count is the number of genuinely new records.
    pub async fn upsert_measurements(
        &self,
        patient_id: Uuid,
        source: &str,
        measurements: &[ProviderMeasurement],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut imported = 0u64;

        for measurement in measurements {
            let record = composition_record::ActiveModel {
                id: Set(Uuid::new_v4()),
                patient_id: Set(patient_id),
                source: Set(source.to_string()),
                metric: Set(measurement.metric.as_str().to_string()),
                measured_at: Set(measurement.measured_at.into()),
                value: Set(measurement.value),
                unit: Set(Some(measurement.metric.unit().to_string())),
                created_at: Set(now.into()),
            };

            let rows = CompositionRecord::insert(record)
                .on_conflict(
                    OnConflict::columns([
                        composition_record::Column::PatientId,
                        composition_record::Column::Source,
                        composition_record::Column::MeasuredAt,
                        composition_record::Column::Metric,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&*self.db)
                .await?;
            imported += rows;
        }

        Ok(imported)
    }

    /// Counts stored records for a patient and source
    pub async fn count_for_patient(&self, patient_id: &Uuid, source: &str) -> Result<u64> {
        Ok(CompositionRecord::find()
            .filter(composition_record::Column::PatientId.eq(*patient_id))
            .filter(composition_record::Column::Source.eq(source))
            .count(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ActiveModelTrait, Database};

    use crate::models::patient;
    use crate::providers::CanonicalMetric;

    async fn test_db() -> Arc<DatabaseConnection> {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("create in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");
        Arc::new(db)
    }

    async fn seed_patient(db: &DatabaseConnection) -> Uuid {
        let id = Uuid::new_v4();
        patient::ActiveModel {
            id: Set(id),
            display_name: Set("Test Patient".to_string()),
            created_at: Set(Utc::now().into()),
            updated_at: Set(Utc::now().into()),
        }
        .insert(db)
        .await
        .expect("insert patient");
        id
    }

    fn sample_measurements(measured_at: DateTime<Utc>) -> Vec<ProviderMeasurement> {
        vec![
            ProviderMeasurement {
                metric: CanonicalMetric::Weight,
                measured_at,
                value: 72.5,
            },
            ProviderMeasurement {
                metric: CanonicalMetric::FatRatio,
                measured_at,
                value: 21.3,
            },
        ]
    }

    #[tokio::test]
    async fn upsert_inserts_new_measurements() {
        let db = test_db().await;
        let repo = MeasurementRepository::new(db.clone());
        let patient_id = seed_patient(&db).await;
        let now = Utc::now();

        let imported = repo
            .upsert_measurements(patient_id, "withings", &sample_measurements(now), now)
            .await
            .expect("upsert succeeds");

        assert_eq!(imported, 2);
        assert_eq!(
            repo.count_for_patient(&patient_id, "withings")
                .await
                .expect("count"),
            2
        );
    }

    #[tokio::test]
    async fn upsert_is_idempotent_across_redelivery() {
        let db = test_db().await;
        let repo = MeasurementRepository::new(db.clone());
        let patient_id = seed_patient(&db).await;
        let now = Utc::now();
        let measurements = sample_measurements(now);

        let first = repo
            .upsert_measurements(patient_id, "withings", &measurements, now)
            .await
            .expect("upsert succeeds");
        let second = repo
            .upsert_measurements(patient_id, "withings", &measurements, now)
            .await
            .expect("upsert succeeds");

        assert_eq!(first, 2);
        assert_eq!(second, 0, "re-delivery must not create duplicates");
        assert_eq!(
            repo.count_for_patient(&patient_id, "withings")
                .await
                .expect("count"),
            2
        );
    }

    #[tokio::test]
    async fn same_timestamp_different_metric_is_not_a_conflict() {
        let db = test_db().await;
        let repo = MeasurementRepository::new(db.clone());
        let patient_id = seed_patient(&db).await;
        let now = Utc::now();

        let weight_only = vec![ProviderMeasurement {
            metric: CanonicalMetric::Weight,
            measured_at: now,
            value: 72.5,
        }];
        let muscle_only = vec![ProviderMeasurement {
            metric: CanonicalMetric::MuscleMass,
            measured_at: now,
            value: 54.1,
        }];

        repo.upsert_measurements(patient_id, "withings", &weight_only, now)
            .await
            .expect("upsert succeeds");
        let imported = repo
            .upsert_measurements(patient_id, "withings", &muscle_only, now)
            .await
            .expect("upsert succeeds");

        assert_eq!(imported, 1);
    }
}

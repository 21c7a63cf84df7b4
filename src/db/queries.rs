use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::{CacheRow, Ward, WardAlerts};

/// Postgres caps bind parameters per statement at 65535; alert inserts are
/// split so a chunk of wards with many alerts each stays well below it.
const ALERT_INSERT_ROWS_PER_STATEMENT: usize = 1000;

/// Load the ward set (code + coordinates), ordered by ward code.
///
/// `limit` of `None` returns every ward with coordinates.
pub async fn get_wards(pool: &PgPool, limit: Option<usize>) -> Result<Vec<Ward>, sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT ward_code, latitude, longitude
         FROM weather_cache
         WHERE latitude IS NOT NULL AND longitude IS NOT NULL
         ORDER BY ward_code",
    );
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit as i64);
    }
    qb.build_query_as::<Ward>().fetch_all(pool).await
}

/// Insert-or-replace a chunk of snapshot rows keyed by `ward_code`.
///
/// A single statement, so the chunk is applied atomically. Every weather
/// column is overwritten from the new row; nothing is merged with the old one.
pub async fn upsert_cache_rows(pool: &PgPool, rows: &[CacheRow]) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO weather_cache (
            ward_code, latitude, longitude,
            temperature_c, condition_text, condition_icon, wind_kph, humidity, is_day, precip_mm,
            daily_forecast, alerts_summary, raw_response, fetched_at, updated_at
        ) ",
    );
    qb.push_values(rows, |mut b, row| {
        b.push_bind(&row.ward_code)
            .push_bind(row.latitude)
            .push_bind(row.longitude)
            .push_bind(row.temperature_c)
            .push_bind(&row.condition_text)
            .push_bind(&row.condition_icon)
            .push_bind(row.wind_kph)
            .push_bind(row.humidity)
            .push_bind(row.is_day)
            .push_bind(row.precip_mm)
            .push_bind(Json(&row.daily_forecast))
            .push_bind((!row.alerts_summary.is_empty()).then(|| Json(&row.alerts_summary)))
            .push_bind(&row.raw_response)
            .push_bind(row.fetched_at)
            .push("NOW()");
    });
    qb.push(
        " ON CONFLICT (ward_code) DO UPDATE SET
            latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude,
            temperature_c = EXCLUDED.temperature_c,
            condition_text = EXCLUDED.condition_text,
            condition_icon = EXCLUDED.condition_icon,
            wind_kph = EXCLUDED.wind_kph,
            humidity = EXCLUDED.humidity,
            is_day = EXCLUDED.is_day,
            precip_mm = EXCLUDED.precip_mm,
            daily_forecast = EXCLUDED.daily_forecast,
            alerts_summary = EXCLUDED.alerts_summary,
            raw_response = EXCLUDED.raw_response,
            fetched_at = EXCLUDED.fetched_at,
            updated_at = EXCLUDED.updated_at",
    );

    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Replace the alert sets of a chunk of wards in one transaction.
///
/// The delete is scoped to exactly the ward codes in `sets`; alerts of any
/// other ward are never touched. A ward with an empty set ends up with no
/// alerts. Returns the number of alert rows inserted.
pub async fn replace_ward_alerts(pool: &PgPool, sets: &[WardAlerts]) -> Result<u64, sqlx::Error> {
    if sets.is_empty() {
        return Ok(0);
    }

    let ward_codes: Vec<String> = sets.iter().map(|s| s.ward_code.clone()).collect();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM weather_alerts WHERE ward_code = ANY($1)")
        .bind(&ward_codes)
        .execute(&mut *tx)
        .await?;

    let alerts: Vec<_> = sets.iter().flat_map(|s| s.alerts.iter()).collect();
    let mut inserted = 0;
    for chunk in alerts.chunks(ALERT_INSERT_ROWS_PER_STATEMENT) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO weather_alerts (
                id, ward_code, event, headline, description, severity, urgency,
                areas, category, certainty, instruction, effective, expires, created_at
            ) ",
        );
        qb.push_values(chunk.iter().copied(), |mut b, alert| {
            b.push_bind(alert.id)
                .push_bind(&alert.ward_code)
                .push_bind(&alert.event)
                .push_bind(&alert.headline)
                .push_bind(&alert.description)
                .push_bind(&alert.severity)
                .push_bind(&alert.urgency)
                .push_bind(&alert.areas)
                .push_bind(&alert.category)
                .push_bind(&alert.certainty)
                .push_bind(&alert.instruction)
                .push_bind(alert.effective)
                .push_bind(alert.expires)
                .push("NOW()");
        });
        inserted += qb.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

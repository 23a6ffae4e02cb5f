use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Istante corrente in UTC troncato al millisecondo, la precisione usata per ordinare i messaggi.
pub fn now_utc_millis() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    let millis = now.millisecond();
    now.replace_millisecond(millis).unwrap_or(now)
}

/// Formatta un istante come RFC3339 (es. "2025-11-02T12:34:56.789Z").
pub fn format_timestamp(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| t.unix_timestamp().to_string())
}

/// Millisecondi dalla Unix epoch, chiave d'ordinamento dei messaggi.
pub fn unix_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Restituisce l'istante corrente in UTC formattato come RFC3339.
pub fn now_timestamp() -> String {
    format_timestamp(now_utc_millis())
}

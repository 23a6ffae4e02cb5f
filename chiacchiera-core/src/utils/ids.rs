use uuid::Uuid;

/// Genera un nuovo identificativo unico (UUIDv4) come stringa.
/// Usato per messaggi, gruppi, utenti, token e requestId lato client.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

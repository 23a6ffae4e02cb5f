use serde::{Deserialize, Serialize};

/// Utente esposto al client/server sul wire (non è un modello di DB).
/// È anche l'identità autenticata associata a una richiesta HTTP o a una connessione WS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub role: String,
    pub created_at: String, // RFC3339 UTC
}

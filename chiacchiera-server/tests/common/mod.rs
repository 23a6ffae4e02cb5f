#![allow(dead_code)]

use chiacchiera_core::models::{Group, User};
use chiacchiera_server::{auth, connect_pool, run_migrations, sqlite_url_for_path, AppState, PageLimits};
use std::sync::Arc;
use tempfile::TempDir;

/// Database su file temporaneo + stato applicativo completo.
pub struct TestEnv {
    _dir: TempDir,
    pub state: Arc<AppState>,
}

pub async fn setup() -> TestEnv {
    let dir = TempDir::new().expect("tempdir");
    let url = sqlite_url_for_path(&dir.path().join("chiacchiera.db")).expect("sqlite url");
    let pool = connect_pool(&url).await.expect("connect pool");
    run_migrations(&pool).await.expect("run migrations");
    let state = Arc::new(AppState::new(pool, PageLimits::default()));
    TestEnv { _dir: dir, state }
}

impl TestEnv {
    /// Registra un utente, restituisce utente e token.
    pub async fn user(&self, name: &str) -> (User, String) {
        auth::register_user(&self.state.pool, name, "password", None)
            .await
            .expect("register user")
    }

    pub async fn group(&self, creator: &User, members: &[&User]) -> Group {
        let members: Vec<String> = members.iter().map(|u| u.user_id.clone()).collect();
        self.state
            .groups
            .create_group(&creator.user_id, "general", &members)
            .await
            .expect("create group")
    }
}

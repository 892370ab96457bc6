mod repository;
mod state;

use std::path::Path;

use anyhow::Context;
use log::{debug, info, warn};
use state::SessionState;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::history::{History, HistoryState};
use crate::models::EditParams;
use crate::session::EditSession;

pub use repository::SessionRepository;

const KEY_NAME: &str = "name";
const KEY_CREATED_AT: &str = "created_at";
const KEY_HISTORY_CURSOR: &str = "history_cursor";

/// Edit session persisted as a single `tar.zst` project file
#[derive(Debug)]
pub struct SessionDb {
    state: SessionState,
}

impl SessionDb {
    /// Open a project file, creating an empty one if it does not exist yet.
    pub async fn new<P: AsRef<Path>>(project_file: P) -> anyhow::Result<Self> {
        let db = Self {
            state: SessionState::new(&project_file).await?,
        };
        db.init_metadata().await?;
        Ok(db)
    }

    /// Explicitly save the project to disk.
    /// Required before dropping inside an async context.
    pub async fn save_project(&self) -> anyhow::Result<()> {
        self.state.save_project().await?;
        info!("Saved project {:?}", self.state.project_file());
        Ok(())
    }

    async fn init_metadata(&self) -> anyhow::Result<()> {
        let name = self
            .state
            .project_file()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("session")
            .to_string();
        let created_at = OffsetDateTime::now_utc().format(&Rfc3339)?;

        let mut conn = self.state.conn().await?;
        for (key, value) in [(KEY_NAME, name), (KEY_CREATED_AT, created_at)] {
            sqlx::query("INSERT OR IGNORE INTO session_metadata (key, value) VALUES ($1, $2)")
                .bind(key)
                .bind(value)
                .execute(&mut **conn)
                .await?;
        }
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.state.conn().await?;
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM session_metadata WHERE key = $1")
            .bind(key)
            .fetch_optional(&mut **conn)
            .await?;
        Ok(value)
    }

    async fn set_metadata(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query(
            r#"INSERT INTO session_metadata (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value"#,
        )
        .bind(key)
        .bind(value)
        .execute(&mut **conn)
        .await?;
        Ok(())
    }
}

impl SessionRepository for SessionDb {
    async fn get_session_name(&self) -> anyhow::Result<String> {
        self.get_metadata(KEY_NAME)
            .await?
            .context("Session name is missing")
    }

    async fn set_session_name(&self, name: &str) -> anyhow::Result<()> {
        self.set_metadata(KEY_NAME, name).await
    }

    async fn get_session_created_at(&self) -> anyhow::Result<OffsetDateTime> {
        let created_at_str = self
            .get_metadata(KEY_CREATED_AT)
            .await?
            .context("Session creation time is missing")?;
        let created_at = OffsetDateTime::parse(&created_at_str, &Rfc3339)?;
        Ok(created_at)
    }

    async fn store_session(&self, session: &EditSession) -> anyhow::Result<()> {
        let old_fnames = {
            let mut conn = self.state.conn().await?;
            sqlx::query_scalar::<_, String>("SELECT image_fname FROM base_image")
                .fetch_all(&mut **conn)
                .await?
        };

        let mut fnames = Vec::with_capacity(session.bases().len());
        for img in session.bases() {
            fnames.push(self.state.store_base_image(img).await?);
        }

        {
            let mut conn = self.state.conn().await?;
            let mut tx = conn.begin_transaction().await?;

            sqlx::query("DELETE FROM history_entry").execute(&mut *tx).await?;
            sqlx::query("DELETE FROM base_image").execute(&mut *tx).await?;

            for (idx, (fname, img)) in fnames.iter().zip(session.bases()).enumerate() {
                sqlx::query(
                    "INSERT INTO base_image (idx, image_fname, width, height) VALUES ($1, $2, $3, $4)",
                )
                .bind(idx as i64)
                .bind(fname)
                .bind(img.width() as i64)
                .bind(img.height() as i64)
                .execute(&mut *tx)
                .await?;
            }

            for (position, state) in session.history().states().iter().enumerate() {
                let params_json = serde_json::to_string(&state.params)?;
                sqlx::query(
                    "INSERT INTO history_entry (position, base_idx, params_json) VALUES ($1, $2, $3)",
                )
                .bind(position as i64)
                .bind(state.base_idx as i64)
                .bind(params_json)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                r#"INSERT INTO session_metadata (key, value) VALUES ($1, $2)
                ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value"#,
            )
            .bind(KEY_HISTORY_CURSOR)
            .bind(session.history().cursor().to_string())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }

        for fname in old_fnames {
            if let Err(e) = self.state.delete_base_image(&fname).await {
                warn!("Could not remove replaced image: {:#}", e);
            }
        }

        debug!(
            "Stored {} base images and {} history entries",
            fnames.len(),
            session.history().len()
        );
        Ok(())
    }

    async fn load_session(&self) -> anyhow::Result<Option<EditSession>> {
        let (base_rows, history_rows) = {
            let mut conn = self.state.conn().await?;
            let base_rows = sqlx::query_as::<_, (i64, String)>(
                "SELECT idx, image_fname FROM base_image ORDER BY idx",
            )
            .fetch_all(&mut **conn)
            .await?;
            let history_rows = sqlx::query_as::<_, (i64, String)>(
                "SELECT base_idx, params_json FROM history_entry ORDER BY position",
            )
            .fetch_all(&mut **conn)
            .await?;
            (base_rows, history_rows)
        };

        if base_rows.is_empty() {
            return Ok(None);
        }

        let mut bases = Vec::with_capacity(base_rows.len());
        for (expected, (idx, fname)) in base_rows.iter().enumerate() {
            if *idx != expected as i64 {
                anyhow::bail!("Corrupt project: base image index {} found where {} was expected", idx, expected);
            }
            bases.push(self.state.load_base_image(fname).await?);
        }

        let mut states = Vec::with_capacity(history_rows.len());
        for (base_idx, params_json) in history_rows {
            let params: EditParams = serde_json::from_str(&params_json)
                .with_context(|| format!("Invalid stored parameters: {}", params_json))?;
            states.push(HistoryState {
                base_idx: usize::try_from(base_idx)?,
                params: params.clamped(),
            });
        }

        let cursor = match self.get_metadata(KEY_HISTORY_CURSOR).await? {
            Some(value) => value
                .parse::<usize>()
                .with_context(|| format!("Invalid history cursor: {}", value))?,
            None => states.len().saturating_sub(1),
        };

        let history = History::from_parts(states, cursor).context("Stored session has no history")?;
        let session = EditSession::from_parts(bases, history)?;
        debug!(
            "Loaded session with {} base images, history at {}/{}",
            session.bases().len(),
            session.history().cursor() + 1,
            session.history().len()
        );
        Ok(Some(session))
    }
}

use time::OffsetDateTime;

use crate::session::EditSession;

pub trait SessionRepository {
    fn get_session_name(&self) -> impl Future<Output = anyhow::Result<String>>;
    fn set_session_name(&self, name: &str) -> impl Future<Output = anyhow::Result<()>>;
    fn get_session_created_at(&self) -> impl Future<Output = anyhow::Result<OffsetDateTime>>;

    /// Replace whatever is stored with the bases and history of `session`
    fn store_session(&self, session: &EditSession) -> impl Future<Output = anyhow::Result<()>>;

    /// Rebuild the stored session; `None` when nothing has been stored yet
    fn load_session(&self) -> impl Future<Output = anyhow::Result<Option<EditSession>>>;
}

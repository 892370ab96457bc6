use image::{DynamicImage, ImageFormat};
use log::{debug, warn};
use sqlx::{
    Connection, Sqlite, Transaction, pool::PoolConnection, sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    }
};
use tempdir::TempDir;
use tokio::{
    fs as async_fs,
    sync::{RwLock, RwLockReadGuard},
};

use std::{
    fs::{self, File},
    io::Cursor,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};
use uuid::Uuid;
use anyhow::Context;

use tar::{Archive, Builder};
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

const DB_FILE_NAME: &str = "session.db";
const IMAGE_DIR_NAME: &str = "images";

pub(super) struct SessionState {
    project_file: PathBuf,
    working_dir: TempDir,
    pool: RwLock<SqlitePool>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("project_file", &self.project_file)
            .field("working_dir", &self.working_dir.path())
            .finish()
    }
}

fn connect_options(db_file: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_file)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
}

async fn open_pool(db_file: &Path) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options(db_file))
        .await
        .with_context(|| format!("Failed to open session database {:?}", db_file))?;
    Ok(pool)
}

/// Pack `contents` into a tar.zst archive at `archive`; `None` writes an empty archive.
fn write_archive(archive: &Path, contents: Option<&Path>) -> anyhow::Result<()> {
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent)?;
    }

    let out = File::create(archive)
        .with_context(|| format!("Failed to create project archive {:?}", archive))?;
    let encoder = ZstdEncoder::new(out, 3)
        .with_context(|| format!("Failed to create zstd encoder for {:?}", archive))?;

    let mut tar = Builder::new(encoder);
    if let Some(dir) = contents {
        tar.append_dir_all(".", dir)
            .with_context(|| format!("Failed to add {:?} to tar", dir))?;
    }

    tar.into_inner()
        .with_context(|| format!("Failed to finalize tar for {:?}", archive))?
        .finish()
        .with_context(|| format!("Failed to finalize zstd stream for {:?}", archive))?;
    Ok(())
}

fn unpack_archive(archive: &Path, dest: &Path) -> anyhow::Result<()> {
    let f = File::open(archive)
        .with_context(|| format!("Failed to open project archive {:?}", archive))?;
    let decoder = ZstdDecoder::new(f)
        .with_context(|| format!("Invalid zstd stream in {:?}", archive))?;
    Archive::new(decoder)
        .unpack(dest)
        .with_context(|| format!("Failed to extract archive {:?} into {:?}", archive, dest))?;
    Ok(())
}

/// Check the unpacked layout, creating it for a fresh project. Returns the database path.
fn prepare_layout(dir: &Path) -> anyhow::Result<PathBuf> {
    let db_file = dir.join(DB_FILE_NAME);
    let images_dir = dir.join(IMAGE_DIR_NAME);

    match (db_file.is_file(), images_dir.is_dir()) {
        (true, true) => {}
        (false, false) => {
            fs::create_dir_all(&images_dir)?;
            File::create(&db_file)?;
        }
        (true, false) => anyhow::bail!(
            "Corrupt project: database exists ({:?}) but images dir missing ({:?})",
            db_file,
            images_dir
        ),
        (false, true) => anyhow::bail!(
            "Corrupt project: images dir exists ({:?}) but database missing ({:?})",
            images_dir,
            db_file
        ),
    }
    Ok(db_file)
}

impl SessionState {
    /// Acquire a pooled connection and hold the pool read lock for the entire lifetime
    /// of the returned guard.
    pub(super) async fn conn(&self) -> anyhow::Result<DbConnGuard<'_>> {
        let pool_guard = self.pool.read().await;
        let conn = pool_guard.acquire().await?;

        Ok(DbConnGuard {
            _pool_guard: pool_guard,
            conn,
        })
    }

    pub(super) fn project_file(&self) -> &Path {
        &self.project_file
    }

    pub(super) async fn load_base_image(&self, image_fname: &str) -> anyhow::Result<DynamicImage> {
        let img_path = self.working_dir.path().join(IMAGE_DIR_NAME).join(image_fname);
        let bytes = async_fs::read(&img_path)
            .await
            .with_context(|| format!("Failed to read base image {:?}", img_path))?;
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .with_context(|| format!("Failed to decode base image {:?}", img_path))?;
        Ok(img)
    }

    /// Write an image as PNG under a fresh name, returning the filename used.
    pub(super) async fn store_base_image(&self, img: &DynamicImage) -> anyhow::Result<String> {
        let img_fname = format!("{}.png", Uuid::new_v4());
        let dest_path = self.working_dir.path().join(IMAGE_DIR_NAME).join(&img_fname);

        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("Failed to encode base image as PNG")?;
        async_fs::write(&dest_path, bytes)
            .await
            .with_context(|| format!("Failed to write base image {:?}", dest_path))?;
        Ok(img_fname)
    }

    pub(super) async fn delete_base_image(&self, image_fname: &str) -> anyhow::Result<()> {
        let img_path = self.working_dir.path().join(IMAGE_DIR_NAME).join(image_fname);
        async_fs::remove_file(&img_path)
            .await
            .with_context(|| format!("Failed to delete base image {:?}", img_path))?;
        Ok(())
    }

    /// Checkpoint, close and pack the working directory into the project file,
    /// then reopen the pool.
    pub(super) async fn save_project(&self) -> anyhow::Result<()> {
        self.internal_close_and_pack(true).await
    }

    pub(super) async fn internal_close_and_pack(&self, reopen: bool) -> anyhow::Result<()> {
        // Exclusive for the whole operation: no query may run between checkpoint and pack.
        let mut pool_guard = self.pool.write().await;

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&*pool_guard)
            .await?;

        pool_guard.close().await;

        write_archive(&self.project_file, Some(self.working_dir.path()))?;
        debug!("Packed {:?} into {:?}", self.working_dir.path(), self.project_file);

        if reopen {
            let db_file = self.working_dir.path().join(DB_FILE_NAME);
            *pool_guard = open_pool(&db_file).await?;
        }
        Ok(())
    }

    pub(super) async fn new<P: AsRef<Path>>(project_file: P) -> anyhow::Result<Self> {
        let project_file = project_file.as_ref().to_path_buf();

        // A missing project file becomes an empty archive, provided its directory exists.
        if !project_file.is_file() {
            let parent_exists = project_file
                .parent()
                .is_some_and(|p| p.as_os_str().is_empty() || p.is_dir());
            if !parent_exists {
                anyhow::bail!("Project file parent does not exist: {:?}", project_file);
            }
            write_archive(&project_file, None)?;
        }

        let working_dir = TempDir::new("valo_session")?;
        unpack_archive(&project_file, working_dir.path())?;
        let db_file = prepare_layout(working_dir.path())?;

        let pool = open_pool(&db_file).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            project_file,
            working_dir,
            pool: RwLock::new(pool),
        })
    }
}

pub struct DbConnGuard<'a> {
    _pool_guard: RwLockReadGuard<'a, SqlitePool>,
    conn: PoolConnection<Sqlite>,
}

impl<'a> Deref for DbConnGuard<'a> {
    type Target = PoolConnection<Sqlite>;
    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<'a> DerefMut for DbConnGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl<'a> DbConnGuard<'a> {
    pub(super) async fn begin_transaction(&mut self) -> anyhow::Result<Transaction<'_, Sqlite>> {
        Ok(self.conn.begin().await?)
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        // Inside a runtime we cannot block; callers save explicitly before dropping.
        if tokio::runtime::Handle::try_current().is_ok() {
            return;
        }

        let result = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(async { self.internal_close_and_pack(false).await }),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            warn!("Failed to save project on drop: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_archive_unpacks_to_a_fresh_layout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("fresh.valo");
        write_archive(&archive, None)?;

        let unpacked = tempfile::tempdir()?;
        unpack_archive(&archive, unpacked.path())?;
        assert_eq!(fs::read_dir(unpacked.path())?.count(), 0);

        let db_file = prepare_layout(unpacked.path())?;
        assert!(db_file.is_file());
        assert!(unpacked.path().join(IMAGE_DIR_NAME).is_dir());
        Ok(())
    }

    #[test]
    fn packed_directory_round_trips() -> anyhow::Result<()> {
        let src = tempfile::tempdir()?;
        fs::create_dir_all(src.path().join(IMAGE_DIR_NAME))?;
        fs::write(src.path().join(DB_FILE_NAME), b"db")?;
        fs::write(src.path().join(IMAGE_DIR_NAME).join("a.png"), b"png")?;

        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("nested").join("p.valo");
        write_archive(&archive, Some(src.path()))?;

        let unpacked = tempfile::tempdir()?;
        unpack_archive(&archive, unpacked.path())?;
        prepare_layout(unpacked.path())?;
        assert_eq!(fs::read(unpacked.path().join(IMAGE_DIR_NAME).join("a.png"))?, b"png");
        Ok(())
    }

    #[test]
    fn half_a_layout_is_corrupt() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(DB_FILE_NAME), b"")?;
        assert!(prepare_layout(dir.path()).is_err());
        Ok(())
    }
}

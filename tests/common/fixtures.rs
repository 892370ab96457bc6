use image::{DynamicImage, Rgb, RgbImage};
use tempfile::NamedTempFile;
use valo::{EditSession, SessionDb};

/// Dark 60x60 frame with a bright yellow square in the middle
pub fn object_scene() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(60, 60, |x, y| {
        if (22..38).contains(&x) && (22..38).contains(&y) {
            Rgb([230, 200, 40])
        } else {
            Rgb([20, 20, 30])
        }
    }))
}

/// Flat grey image of the given size
pub fn flat_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([100, 100, 100])))
}

/// Writes the object scene to a temporary PNG.
/// The file will be automatically cleaned up when dropped.
pub fn create_test_image() -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    object_scene()
        .save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Creates a SessionDb with a temporary tar.zst file.
/// Returns the project, its path and the temp directory (which must be kept alive).
pub async fn create_test_project() -> (SessionDb, std::path::PathBuf, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("test.valo");
    let project = SessionDb::new(&path)
        .await
        .expect("Failed to create test project");
    (project, path, dir)
}

/// Session on the object scene, opened on the background removal tab
pub fn removal_session() -> EditSession {
    let mut session = EditSession::new(object_scene());
    session.open_tab(valo::Tab::RemoveBg);
    session
}

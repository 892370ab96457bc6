//! Integration tests for session persistence.
//!
//! Tests cover:
//! - Empty projects and metadata
//! - Bases, history and cursor surviving a save/load cycle
//! - Transparent bases
//! - Corrupt project archives

mod common;

use std::fs::File;

use common::*;
use zstd::stream::write::Encoder as ZstdEncoder;

#[tokio::test]
async fn test_new_project_is_empty() -> anyhow::Result<()> {
    let (project, _path, _temp_dir) = create_test_project().await;

    assert!(project.load_session().await?.is_none());
    assert_eq!(project.get_session_name().await?, "test");
    project.get_session_created_at().await?;

    Ok(())
}

#[tokio::test]
async fn test_session_round_trip() -> anyhow::Result<()> {
    let (project, path, _temp_dir) = create_test_project().await;

    let mut session = EditSession::new(flat_image(100, 100));
    session.set_adjustment(Adjustment::Brightness, 10);
    session.commit();
    session.open_tab(Tab::Crop);
    session.set_crop_ratio(CropRatio::Custom);
    assert!(session.apply_crop()?);
    assert!(session.undo());

    project.set_session_name("holiday").await?;
    project.store_session(&session).await?;
    project.save_project().await?;
    drop(project);

    let reopened = SessionDb::new(&path).await?;
    assert_eq!(reopened.get_session_name().await?, "holiday");

    let loaded = reopened.load_session().await?.expect("stored session");
    assert_eq!(loaded.bases().len(), 2);
    assert_eq!(loaded.history().len(), 3);
    assert_eq!(loaded.history().cursor(), 1);
    assert_eq!(loaded.base_idx(), 0);
    assert_eq!(loaded.params().brightness, 10);
    assert_eq!(loaded.tab(), Tab::Adjust);
    assert_eq!(
        (loaded.bases()[1].width(), loaded.bases()[1].height()),
        (80, 80)
    );
    assert_eq!(
        loaded.bases()[0].to_rgb8().get_pixel(5, 5),
        session.bases()[0].to_rgb8().get_pixel(5, 5)
    );

    Ok(())
}

#[tokio::test]
async fn test_storing_again_replaces_state() -> anyhow::Result<()> {
    let (project, _path, _temp_dir) = create_test_project().await;

    let mut session = EditSession::new(flat_image(30, 30));
    session.set_preset(Preset::Mono);
    project.store_session(&session).await?;

    let mut other = EditSession::new(flat_image(12, 8));
    other.set_adjustment(Adjustment::Blue, -40);
    other.commit();
    other.set_adjustment(Adjustment::Blue, -60);
    other.commit();
    project.store_session(&other).await?;

    let loaded = project.load_session().await?.expect("stored session");
    assert_eq!(loaded.bases().len(), 1);
    assert_eq!(loaded.current_base().width(), 12);
    assert_eq!(loaded.history().len(), 3);
    assert_eq!(loaded.params().blue, -60);
    assert_eq!(loaded.params().preset, Preset::None);

    Ok(())
}

#[tokio::test]
async fn test_transparent_base_survives() -> anyhow::Result<()> {
    let (project, _path, _temp_dir) = create_test_project().await;

    let mut rgba = image::RgbaImage::from_pixel(20, 20, image::Rgba([1, 2, 3, 255]));
    rgba.put_pixel(0, 0, image::Rgba([0, 0, 0, 0]));
    let session = EditSession::new(image::DynamicImage::ImageRgba8(rgba));
    project.store_session(&session).await?;

    let loaded = project.load_session().await?.expect("stored session");
    let base = loaded.current_base();
    assert!(base.color().has_alpha());
    assert_eq!(base.to_rgba8().get_pixel(0, 0)[3], 0);
    assert_eq!(base.to_rgba8().get_pixel(1, 1).0, [1, 2, 3, 255]);

    Ok(())
}

#[tokio::test]
async fn test_corrupt_layout_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let staging = dir.path().join("staging");
    std::fs::create_dir_all(staging.join("images"))?;

    let path = dir.path().join("broken.valo");
    let encoder = ZstdEncoder::new(File::create(&path)?, 3)?;
    let mut tar = tar::Builder::new(encoder);
    tar.append_dir_all(".", &staging)?;
    tar.into_inner()?.finish()?;

    let err = SessionDb::new(&path).await.unwrap_err();
    assert!(err.to_string().contains("Corrupt project"));

    Ok(())
}

#[tokio::test]
async fn test_missing_parent_dir_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("nope").join("test.valo");
    assert!(SessionDb::new(&path).await.is_err());
    Ok(())
}

#[test]
fn test_image_fixture_decodes() -> anyhow::Result<()> {
    let file = create_test_image();
    let img = image::open(file.path())?;
    assert_eq!((img.width(), img.height()), (60, 60));
    Ok(())
}

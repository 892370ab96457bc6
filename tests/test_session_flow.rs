//! Integration tests for edit session workflows.
//!
//! Tests cover:
//! - Background removal on the blocking worker, cancel and apply
//! - Actions that are ignored while removal runs
//! - Crop commits and undo across base images
//! - Export format handling

mod common;

use common::*;

#[tokio::test]
async fn test_background_removal_apply_keeps_alpha() -> anyhow::Result<()> {
    let mut session = removal_session();

    assert!(session.start_background_removal()?);
    assert_eq!(session.remove_status(), &RemoveStatus::Running);

    let status = session.finish_background_removal().await.clone();
    assert_eq!(status, RemoveStatus::Done);
    assert!(session.can_apply_background_removal());

    let pending = session.pending_removal().expect("pending result");
    assert_eq!(pending.get_pixel(30, 30)[3], 255);
    assert_eq!(pending.get_pixel(2, 2)[3], 0);

    assert!(session.apply_background_removal());
    assert_eq!(session.remove_status(), &RemoveStatus::Applied);
    assert_eq!(session.base_idx(), 1);
    assert!(session.params().is_neutral());
    assert!(!session.can_apply_background_removal());

    // Later edits render on top of the cut-out
    session.set_adjustment(Adjustment::Brightness, 20);
    session.commit();
    let preview = session.render_preview()?;
    assert!(preview.color().has_alpha());
    let rgba = preview.to_rgba8();
    assert_eq!(rgba.get_pixel(2, 2)[3], 0);
    assert_eq!(rgba.get_pixel(30, 30).0, [250, 220, 60, 255]);

    Ok(())
}

#[tokio::test]
async fn test_actions_ignored_while_removal_runs() -> anyhow::Result<()> {
    let mut session = removal_session();
    session.set_adjustment(Adjustment::Red, 10);
    session.commit();
    assert!(session.can_undo());

    assert!(session.start_background_removal()?);
    assert!(session.is_removing());
    assert!(!session.start_background_removal()?);
    assert!(!session.undo());
    assert!(!session.can_undo());
    assert!(!session.open_tab(Tab::Crop));
    assert_eq!(session.tab(), Tab::RemoveBg);
    assert!(!session.apply_crop()?);
    assert!(!session.apply_background_removal());

    session.finish_background_removal().await;
    assert!(!session.is_removing());
    assert!(session.undo());
    assert_eq!(session.params().red, 0);
    // Undo does not throw the finished result away
    assert!(session.pending_removal().is_some());

    Ok(())
}

#[tokio::test]
async fn test_cancelled_removal_leaves_nothing_to_apply() -> anyhow::Result<()> {
    let mut session = removal_session();
    assert!(session.start_background_removal()?);
    assert!(session.cancel_background_removal());
    assert_eq!(session.remove_status(), &RemoveStatus::Cancelling);

    let status = session.finish_background_removal().await.clone();
    assert_eq!(status, RemoveStatus::Cancelled);
    assert!(session.pending_removal().is_none());
    assert!(!session.apply_background_removal());
    assert_eq!(session.bases().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_removal_failure_is_reported() -> anyhow::Result<()> {
    let mut session = EditSession::new(flat_image(15, 15));
    session.open_tab(Tab::RemoveBg);
    assert!(session.start_background_removal()?);

    let status = session.finish_background_removal().await.clone();
    assert!(matches!(status, RemoveStatus::Failed(_)));
    assert!(!session.can_apply_background_removal());

    Ok(())
}

#[test]
fn test_crop_then_undo_redo_switches_bases() -> anyhow::Result<()> {
    let mut session = EditSession::new(flat_image(100, 100));
    session.open_tab(Tab::Crop);
    session.set_crop_ratio(CropRatio::Square);
    assert!(session.is_crop_dirty());
    assert!(session.apply_crop()?);

    assert_eq!(session.current_base().width(), 80);
    assert_eq!(session.params().crop_ratio, CropRatio::Original);
    assert!(!session.overlay().is_enabled());
    assert_eq!(session.tab(), Tab::Crop);

    assert!(session.undo());
    assert_eq!(session.current_base().width(), 100);
    assert_eq!(session.tab(), Tab::Crop);
    assert!(session.redo());
    assert_eq!(session.current_base().width(), 80);

    Ok(())
}

#[test]
fn test_crop_keeps_transparency() -> anyhow::Result<()> {
    let mut rgba = image::RgbaImage::from_pixel(50, 50, image::Rgba([10, 20, 30, 255]));
    rgba.put_pixel(49, 49, image::Rgba([0, 0, 0, 0]));
    let mut session = EditSession::new(image::DynamicImage::ImageRgba8(rgba));

    session.open_tab(Tab::Crop);
    session.set_crop_ratio(CropRatio::Custom);
    session.update_crop(CropRegion::new(0.5, 0.5, 0.5, 0.5));
    assert!(session.apply_crop()?);

    let base = session.current_base().to_rgba8();
    assert_eq!(base.dimensions(), (25, 25));
    assert_eq!(base.get_pixel(24, 24)[3], 0);
    assert_eq!(base.get_pixel(0, 0)[3], 255);

    Ok(())
}

#[test]
fn test_export_formats() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let mut session = EditSession::new(flat_image(20, 10));
    session.set_preset(Preset::Noir);

    let png = dir.path().join("out.png");
    session.export(&png)?;
    let img = image::open(&png)?.to_rgb8();
    assert_eq!(img.dimensions(), (20, 10));
    let p = img.get_pixel(3, 3);
    assert_eq!(p[0], p[1]);
    assert_eq!(p[1], p[2]);

    session.export(dir.path().join("out.bmp"))?;
    assert!(session.export(dir.path().join("out.unknown")).is_err());

    Ok(())
}

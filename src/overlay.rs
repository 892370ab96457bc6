//! Interactive crop box: viewport fitting, handle hit testing and drag handling.
//!
//! Coordinates are viewport pixels. The image is letterboxed into the viewport and the
//! crop box always lives inside that drawn area; every change is reported back as a
//! [`CropRegion`] normalized to the image.

use crate::models::CropRegion;

/// Side length of the square grab handles
pub const HANDLE_SIZE: i32 = 10;
/// Smallest box a resize can produce
pub const MIN_BOX_SIZE: i32 = 20;
/// Default box covers this fraction of the drawn image
const DEFAULT_FILL: f32 = 0.80;

/// Axis-aligned rectangle, right and bottom exclusive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_size(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (i32, i32) {
        (self.left + self.width() / 2, self.top + self.height() / 2)
    }

    pub fn intersect(&self, other: Rect) -> Option<Rect> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        if left < right && top < bottom {
            Some(Rect::new(left, top, right, bottom))
        } else {
            None
        }
    }

    pub fn translate(&self, x: i32, y: i32) -> Rect {
        Rect::new(self.left + x, self.top + y, self.right + x, self.bottom + y)
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Square of side `size` centred on a point
    fn around(x: i32, y: i32, size: i32) -> Rect {
        Rect::from_size(x - size / 2, y - size / 2, size, size)
    }
}

/// Grab handle positions, listed in hit-test priority order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    TopMiddle,
    BottomMiddle,
    MiddleLeft,
    MiddleRight,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::TopLeft,
        Handle::TopRight,
        Handle::BottomLeft,
        Handle::BottomRight,
        Handle::TopMiddle,
        Handle::BottomMiddle,
        Handle::MiddleLeft,
        Handle::MiddleRight,
    ];

    fn moves_left(&self) -> bool {
        matches!(self, Handle::TopLeft | Handle::MiddleLeft | Handle::BottomLeft)
    }

    fn moves_right(&self) -> bool {
        matches!(self, Handle::TopRight | Handle::MiddleRight | Handle::BottomRight)
    }

    fn moves_top(&self) -> bool {
        matches!(self, Handle::TopLeft | Handle::TopMiddle | Handle::TopRight)
    }

    fn moves_bottom(&self) -> bool {
        matches!(self, Handle::BottomLeft | Handle::BottomMiddle | Handle::BottomRight)
    }

    /// Handle square for a given crop box
    pub fn rect(&self, r: &Rect) -> Rect {
        let (cx, cy) = r.center();
        let (x, y) = match self {
            Handle::TopLeft => (r.left, r.top),
            Handle::TopRight => (r.right - 1, r.top),
            Handle::BottomLeft => (r.left, r.bottom - 1),
            Handle::BottomRight => (r.right - 1, r.bottom - 1),
            Handle::TopMiddle => (cx, r.top),
            Handle::BottomMiddle => (cx, r.bottom - 1),
            Handle::MiddleLeft => (r.left, cy),
            Handle::MiddleRight => (r.right - 1, cy),
        };
        Rect::around(x, y, HANDLE_SIZE)
    }
}

/// What a press on the box grabbed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragMode {
    Move,
    Resize(Handle),
}

/// How the default box is shaped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxMode {
    Custom,
    Aspect,
}

#[derive(Clone, Copy, Debug)]
struct Drag {
    mode: DragMode,
    start: (i32, i32),
    start_rect: Rect,
}

/// Result of a pointer interaction
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OverlayUpdate {
    /// New normalized crop, if the box is valid
    pub region: Option<CropRegion>,
    /// Set once when a resize released a locked aspect ratio
    pub became_custom: bool,
}

#[derive(Clone, Debug)]
pub struct CropOverlay {
    viewport: (u32, u32),
    image: (u32, u32),
    enabled: bool,
    crop: Option<Rect>,
    drag: Option<Drag>,
    aspect: Option<f32>,
    told_custom: bool,
}

impl CropOverlay {
    pub fn new(viewport: (u32, u32), image: (u32, u32)) -> Self {
        Self {
            viewport,
            image,
            enabled: false,
            crop: None,
            drag: None,
            aspect: None,
            told_custom: false,
        }
    }

    pub fn set_viewport(&mut self, viewport: (u32, u32)) {
        self.viewport = viewport;
        self.crop = None;
        self.drag = None;
    }

    pub fn set_image_size(&mut self, image: (u32, u32)) {
        self.image = image;
        self.crop = None;
        self.drag = None;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.drag = None;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_aspect(&mut self, aspect: Option<f32>) {
        self.aspect = aspect;
        self.told_custom = false;
    }

    pub fn aspect(&self) -> Option<f32> {
        self.aspect
    }

    pub fn crop_rect(&self) -> Option<Rect> {
        self.crop
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Area the image occupies inside the viewport when fitted with its aspect kept
    pub fn draw_rect(&self) -> Option<Rect> {
        let (lw, lh) = (self.viewport.0 as f32, self.viewport.1 as f32);
        let (pw, ph) = (self.image.0 as f32, self.image.1 as f32);
        if pw <= 0.0 || ph <= 0.0 || lw <= 0.0 || lh <= 0.0 {
            return None;
        }
        let scale = (lw / pw).min(lh / ph);
        let dw = (pw * scale) as i32;
        let dh = (ph * scale) as i32;
        if dw <= 0 || dh <= 0 {
            return None;
        }
        let x = (self.viewport.0 as i32 - dw) / 2;
        let y = (self.viewport.1 as i32 - dh) / 2;
        Some(Rect::from_size(x, y, dw, dh))
    }

    /// Drop the box; the returned region is the disabled full frame
    pub fn clear(&mut self) -> CropRegion {
        self.crop = None;
        self.drag = None;
        self.told_custom = false;
        CropRegion::disabled()
    }

    /// Place a default box centred in the drawn image
    pub fn ensure_box(&mut self, mode: BoxMode) -> Option<CropRegion> {
        let draw = self.draw_rect()?;
        let (dw, dh) = (draw.width(), draw.height());

        let (w, h) = match (mode, self.aspect) {
            (BoxMode::Aspect, Some(aspect)) => {
                let mut w = (dw as f32 * DEFAULT_FILL) as i32;
                let mut h = (w as f32 / aspect) as i32;
                let max_h = (dh as f32 * DEFAULT_FILL) as i32;
                if h > max_h {
                    h = max_h;
                    w = (h as f32 * aspect) as i32;
                }
                (w, h)
            }
            _ => (
                (dw as f32 * DEFAULT_FILL) as i32,
                (dh as f32 * DEFAULT_FILL) as i32,
            ),
        };

        let (cx, cy) = draw.center();
        self.crop = Rect::from_size(cx - w / 2, cy - h / 2, w, h).intersect(draw);
        self.told_custom = false;
        self.region()
    }

    /// Which part of the box sits under a point
    pub fn hit_test(&self, x: i32, y: i32) -> Option<DragMode> {
        let draw = self.draw_rect()?;
        let r = self.crop?.intersect(draw)?;
        for handle in Handle::ALL {
            if handle.rect(&r).contains_point(x, y) {
                return Some(DragMode::Resize(handle));
            }
        }
        if r.contains_point(x, y) {
            return Some(DragMode::Move);
        }
        None
    }

    /// Current box as a normalized region; `None` while no valid box exists
    pub fn region(&self) -> Option<CropRegion> {
        let draw = self.draw_rect()?;
        let r = self.crop?.intersect(draw)?;
        if r.width() < 2 || r.height() < 2 {
            return None;
        }
        let norm = |v: f32| v.clamp(0.0, 1.0);
        Some(CropRegion::new(
            norm((r.left - draw.left) as f32 / draw.width() as f32),
            norm((r.top - draw.top) as f32 / draw.height() as f32),
            norm(r.width() as f32 / draw.width() as f32),
            norm(r.height() as f32 / draw.height() as f32),
        ))
    }

    /// Start a drag. Returns the region when pressing created a default box.
    pub fn press(&mut self, x: i32, y: i32) -> Option<CropRegion> {
        if !self.enabled {
            return None;
        }
        let draw = self.draw_rect()?;
        if !draw.contains_point(x, y) {
            return None;
        }

        let mut created = None;
        if self.crop.is_none() {
            let mode = if self.aspect.is_some() {
                BoxMode::Aspect
            } else {
                BoxMode::Custom
            };
            created = self.ensure_box(mode);
        }

        if let (Some(mode), Some(start_rect)) = (self.hit_test(x, y), self.crop) {
            self.drag = Some(Drag {
                mode,
                start: (x, y),
                start_rect,
            });
        }
        created
    }

    /// Continue a drag to a new pointer position
    pub fn drag_to(&mut self, x: i32, y: i32) -> OverlayUpdate {
        let mut update = OverlayUpdate::default();
        if !self.enabled {
            return update;
        }
        let (Some(drag), Some(draw)) = (self.drag, self.draw_rect()) else {
            return update;
        };

        let dx = x - drag.start.0;
        let dy = y - drag.start.1;
        let r0 = drag.start_rect;

        match drag.mode {
            DragMode::Move => {
                let mut r = r0.translate(dx, dy);
                if r.left < draw.left {
                    r = r.translate(draw.left - r.left, 0);
                }
                if r.top < draw.top {
                    r = r.translate(0, draw.top - r.top);
                }
                if r.right > draw.right {
                    r = r.translate(draw.right - r.right, 0);
                }
                if r.bottom > draw.bottom {
                    r = r.translate(0, draw.bottom - r.bottom);
                }
                self.crop = Some(r);
            }
            DragMode::Resize(handle) => {
                if self.aspect.take().is_some() && !self.told_custom {
                    self.told_custom = true;
                    update.became_custom = true;
                }

                let mut r = r0;
                if handle.moves_left() {
                    r.left = r0.left + dx;
                }
                if handle.moves_right() {
                    r.right = r0.right + dx;
                }
                if handle.moves_top() {
                    r.top = r0.top + dy;
                }
                if handle.moves_bottom() {
                    r.bottom = r0.bottom + dy;
                }

                if r.width() < MIN_BOX_SIZE {
                    if handle.moves_left() {
                        r.left = r.right - MIN_BOX_SIZE;
                    } else {
                        r.right = r.left + MIN_BOX_SIZE;
                    }
                }
                if r.height() < MIN_BOX_SIZE {
                    if handle.moves_top() {
                        r.top = r.bottom - MIN_BOX_SIZE;
                    } else {
                        r.bottom = r.top + MIN_BOX_SIZE;
                    }
                }

                self.crop = r.intersect(draw);
            }
        }

        update.region = self.region();
        update
    }

    /// End a drag, reporting the final region
    pub fn release(&mut self) -> Option<CropRegion> {
        if !self.enabled {
            return None;
        }
        self.drag = None;
        self.region()
    }
}

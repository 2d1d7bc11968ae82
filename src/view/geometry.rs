//! Geometry view: position, size and orientation of the sources on the
//! output frame

use glam::{Vec2, Vec4};

use super::{for_each_child, Cursor, DeepUpdate, FrameContext, View, ViewCore, ViewMode, FRAME_COLOR};
use crate::scene::{HandleKind, Node, PickHit, Primitive, Transform};
use crate::settings::ViewSettings;
use crate::source::Source;

/// Rotation step when the grab modifier is held, in radians.
pub const ROTATION_STEP: f32 = 1.0 / 30.0;

const BACKGROUND_COLOR: Vec4 = Vec4::new(0.1, 0.1, 0.1, 1.0);

#[derive(Debug)]
pub struct GeometryView {
    core: ViewCore,
}

impl Default for GeometryView {
    fn default() -> Self {
        Self::new()
    }
}

/// `to / from`, or 1 when `from` is too small to divide by.
fn ratio(to: f32, from: f32) -> f32 {
    if from.abs() < 1e-6 {
        1.0
    } else {
        to / from
    }
}

impl GeometryView {
    pub fn new() -> Self {
        let mut core = ViewCore::new(ViewMode::Geometry);
        let mut surface = Primitive::surface();
        surface.shader.color = BACKGROUND_COLOR;
        let background = core.scene.background();
        core.scene.add(background, Node::primitive(surface));
        let foreground = core.scene.foreground();
        core.scene.add(
            foreground,
            Node::primitive(Primitive::line_square(FRAME_COLOR, 1.0)),
        );
        let mut view = Self { core };
        view.restore_settings(&ViewSettings::default_for(ViewMode::Geometry));
        view
    }

    /// Apply a grab on `handle` (or the body of the source when `None`) to
    /// `transform`, starting from `start`.
    fn manipulate(
        transform: &mut Transform,
        start: &Transform,
        handle: Option<(HandleKind, Vec2)>,
        from: Vec2,
        to: Vec2,
        modifier: bool,
    ) -> Cursor {
        // pointer positions in the frame of the source, as it was when the
        // gesture started
        let inverse = start.matrix().inverse();
        let local_from = inverse.transform_point3(from.extend(0.0));
        let local_to = inverse.transform_point3(to.extend(0.0));
        let resize = Vec2::new(
            ratio(local_to.x, local_from.x),
            ratio(local_to.y, local_from.y),
        );

        match handle {
            Some((HandleKind::Resize, corner)) => {
                transform.scale.x = start.scale.x * resize.x;
                transform.scale.y = if modifier {
                    transform.scale.x
                } else {
                    start.scale.y * resize.y
                };
                if corner.x * corner.y > 0.0 {
                    Cursor::ResizeNWSE
                } else {
                    Cursor::ResizeNESW
                }
            }
            Some((HandleKind::ResizeH, _)) => {
                transform.scale.x = start.scale.x * resize.x;
                Cursor::ResizeEW
            }
            Some((HandleKind::ResizeV, _)) => {
                transform.scale.y = start.scale.y * resize.y;
                Cursor::ResizeNS
            }
            Some((HandleKind::Rotate, _)) => {
                let center = start.translation.truncate();
                let a_from = from - center;
                let a_to = to - center;
                let mut angle = start.rotation.z + a_to.y.atan2(a_to.x) - a_from.y.atan2(a_from.x);
                if modifier {
                    angle = (angle / ROTATION_STEP).round() * ROTATION_STEP;
                }
                transform.rotation.z = angle;
                Cursor::Hand
            }
            None => {
                transform.translation.x = start.translation.x + to.x - from.x;
                transform.translation.y = start.translation.y + to.y - from.y;
                Cursor::ResizeAll
            }
        }
    }
}

impl View for GeometryView {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    /// The background and frame follow the output aspect ratio.
    fn update(&mut self, frame: &FrameContext) {
        if frame.deep_update {
            let aspect_ratio = frame.output_aspect_ratio;
            let background = self.core.scene.background();
            let foreground = self.core.scene.foreground();
            for_each_child(&mut self.core.scene, background, |t| t.scale.x = aspect_ratio);
            for_each_child(&mut self.core.scene, foreground, |t| t.scale.x = aspect_ratio);
        }
        self.core.update_scene(frame);
    }

    /// Resize, rotate or move the source depending on the handle under
    /// the pointer when the gesture started.
    fn grab(
        &mut self,
        from: Vec2,
        to: Vec2,
        source: Option<&mut Source>,
        pick: Option<PickHit>,
        modifier: bool,
        _deep: &mut DeepUpdate,
    ) -> Cursor {
        let Some(source) = source else {
            return Cursor::Arrow;
        };
        let Some(anchor) = self.core.grab_anchor(from, source) else {
            return Cursor::Arrow;
        };
        let handle = pick.and_then(|hit| source.handle_kind(hit.node).map(|kind| (kind, hit.local)));
        let from = self.core.unproject_in_workspace(from).truncate();
        let to = self.core.unproject_in_workspace(to).truncate();

        let Some(transform) = self.core.source_transform_mut(source) else {
            return Cursor::Arrow;
        };
        let cursor = Self::manipulate(transform, &anchor.transform, handle, from, to, modifier);
        source.touch();
        cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn start() -> Transform {
        Transform {
            translation: Vec3::new(0.2, -0.1, 0.0),
            rotation: Vec3::new(0.0, 0.0, 0.4),
            scale: Vec3::new(1.7, 0.9, 1.0),
        }
    }

    #[test]
    fn test_uniform_resize_keeps_axes_equal() {
        let start = start();
        let from = start.matrix().transform_point3(Vec3::new(1.0, 1.0, 0.0)).truncate();
        let path = [
            Vec2::new(0.9, 0.4),
            Vec2::new(-0.3, 1.2),
            Vec2::new(2.5, -0.7),
            Vec2::new(0.01, 0.02),
        ];
        for to in path {
            let mut transform = start;
            let cursor = GeometryView::manipulate(
                &mut transform,
                &start,
                Some((HandleKind::Resize, Vec2::new(1.0, 1.0))),
                from,
                to,
                true,
            );
            assert_eq!(transform.scale.x, transform.scale.y);
            assert_eq!(cursor, Cursor::ResizeNWSE);
        }
    }

    #[test]
    fn test_resize_is_relative_to_local_frame() {
        let start = start();
        let corner = |x: f32, y: f32| start.matrix().transform_point3(Vec3::new(x, y, 0.0)).truncate();
        let mut transform = start;
        // dragging the corner to where a corner of a twice larger source
        // would be doubles the scale, whatever the rotation
        let cursor = GeometryView::manipulate(
            &mut transform,
            &start,
            Some((HandleKind::Resize, Vec2::new(1.0, -1.0))),
            corner(1.0, -1.0),
            corner(2.0, -2.0),
            false,
        );
        assert!((transform.scale.x - 2.0 * start.scale.x).abs() < 1e-4);
        assert!((transform.scale.y - 2.0 * start.scale.y).abs() < 1e-4);
        assert_eq!(cursor, Cursor::ResizeNESW);
        assert_eq!(transform.translation, start.translation);
    }

    #[test]
    fn test_single_axis_resize() {
        let start = start();
        let corner = |x: f32, y: f32| start.matrix().transform_point3(Vec3::new(x, y, 0.0)).truncate();
        let mut transform = start;
        let cursor = GeometryView::manipulate(
            &mut transform,
            &start,
            Some((HandleKind::ResizeH, Vec2::new(1.0, 0.0))),
            corner(1.0, 0.0),
            corner(1.5, 0.3),
            false,
        );
        assert_eq!(cursor, Cursor::ResizeEW);
        assert!((transform.scale.x - 1.5 * start.scale.x).abs() < 1e-4);
        assert_eq!(transform.scale.y, start.scale.y);
    }

    #[test]
    fn test_rotation_steps_with_modifier() {
        let start = Transform::IDENTITY;
        let mut transform = start;
        let cursor = GeometryView::manipulate(
            &mut transform,
            &start,
            Some((HandleKind::Rotate, Vec2::new(1.2, -1.2))),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.8, 0.6),
            true,
        );
        assert_eq!(cursor, Cursor::Hand);
        let steps = transform.rotation.z / ROTATION_STEP;
        assert!((steps - steps.round()).abs() < 1e-3);
        assert!((transform.rotation.z - 0.6f32.atan2(0.8)).abs() <= ROTATION_STEP / 2.0 + 1e-5);
    }

    #[test]
    fn test_body_grab_translates() {
        let start = start();
        let mut transform = start;
        let cursor = GeometryView::manipulate(
            &mut transform,
            &start,
            None,
            Vec2::new(0.0, 0.0),
            Vec2::new(0.5, 0.25),
            false,
        );
        assert_eq!(cursor, Cursor::ResizeAll);
        assert!(transform
            .translation
            .abs_diff_eq(start.translation + Vec3::new(0.5, 0.25, 0.0), 1e-6));
        assert_eq!(transform.scale, start.scale);
    }
}

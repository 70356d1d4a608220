use hybrid_render_interface::exec_context::ExecContext;

use crate::view::View;

/// 透视相机的参数，矩阵本身保存在 view params 中
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub fov_radians: f32,
    pub near_distance: f32,
    pub far_distance: f32,
    /// 为 true 时忽略宿主设置的透视
    pub control_active: bool,
}
impl Default for CameraState {
    fn default() -> Self {
        Self {
            fov_radians: 45f32.to_radians(),
            near_distance: 1.0,
            far_distance: 1000.0,
            control_active: false,
        }
    }
}

impl<C: ExecContext> View<C> {
    /// 透视控制被接管时不生效
    pub fn set_perspective(&mut self, ctx: &C, view: glam::Mat4, fov_radians: f32, near: f32, far: f32) {
        if self.camera.control_active {
            return;
        }

        self.camera.fov_radians = fov_radians;
        self.camera.near_distance = near;
        self.camera.far_distance = far;

        let data = &mut self.view_params.data;
        data.view = view;
        data.projection = glam::Mat4::perspective_rh(fov_radians, ctx.aspect_ratio(), near, far);
    }

    /// 在相机的局部坐标系中平移
    pub fn move_perspective(&mut self, local_movement: glam::Vec3) {
        let data = &mut self.view_params.data;
        let offset = data.view.inverse() * local_movement.extend(0.0);
        data.view *= glam::Mat4::from_translation(-offset.truncate());
    }

    /// 绕相机的局部坐标轴旋转，保持相机位置不变
    pub fn rotate_perspective(&mut self, yaw: f32, pitch: f32, roll: f32) {
        let far = self.camera.far_distance;
        let data = &mut self.view_params.data;
        let view_i = data.view.inverse();

        let position = view_i.transform_point3(glam::Vec3::ZERO);
        // 参数名即旋转轴：yaw 绕 Y，pitch 绕 X，roll 绕 Z
        let local_focus = glam::Quat::from_euler(glam::EulerRot::YXZ, yaw, pitch, roll) * glam::vec3(0.0, 0.0, -far);
        let focus = view_i.transform_point3(local_focus);
        data.view = glam::Mat4::look_at_rh(position, focus, glam::Vec3::Y);
    }

    pub fn set_perspective_control_active(&mut self, active: bool) {
        self.camera.control_active = active;
    }
}
// getters
impl<C: ExecContext> View<C> {
    /// 相机在世界空间中的位置
    pub fn get_view_position(&self) -> glam::Vec3 {
        self.view_params.data.view.inverse().transform_point3(glam::Vec3::ZERO)
    }

    /// 相机局部 +Z 轴在世界空间中的方向
    pub fn get_view_direction(&self) -> glam::Vec3 {
        self.view_params.data.view.inverse().transform_vector3(glam::Vec3::Z).normalize()
    }

    /// 穿过屏幕像素 (px, py) 中心的光线方向，像素原点在左上角
    pub fn get_ray_direction_at(&self, px: i32, py: i32) -> glam::Vec3 {
        let extent = self.outputs.screen_extent();
        let x = ((px as f32 + 0.5) / extent.width as f32) * 2.0 - 1.0;
        let y = ((py as f32 + 0.5) / extent.height as f32) * 2.0 - 1.0;

        let data = &self.view_params.data;
        let target = data.projection.inverse() * glam::vec4(x, -y, 1.0, 1.0);
        data.view.inverse().transform_vector3(target.truncate()).normalize()
    }

    #[inline]
    pub fn fov_radians(&self) -> f32 {
        self.camera.fov_radians
    }

    #[inline]
    pub fn near_distance(&self) -> f32 {
        self.camera.near_distance
    }

    #[inline]
    pub fn far_distance(&self) -> f32 {
        self.camera.far_distance
    }

    #[inline]
    pub fn is_perspective_control_active(&self) -> bool {
        self.camera.control_active
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::recording::RecordingContext;

    use super::*;

    fn new_view() -> (RecordingContext, View<RecordingContext>) {
        hybrid_crate_tools::init_log::init_log_with(log::LevelFilter::Debug);
        let mut ctx = RecordingContext::new(200, 100);
        let view = View::new(&mut ctx).unwrap();
        (ctx, view)
    }

    #[test]
    fn test_set_perspective_round_trip() {
        let (ctx, mut view) = new_view();
        let eye = glam::vec3(1.0, 2.0, 3.0);
        let target = glam::vec3(1.0, 2.0, -7.0);
        view.set_perspective(&ctx, glam::Mat4::look_at_rh(eye, target, glam::Vec3::Y), 1.2, 0.5, 50.0);

        assert!(view.get_view_position().abs_diff_eq(eye, 1e-5));
        // look_at_rh 下相机的 +Z 指向身后
        assert!(view.get_view_direction().abs_diff_eq((eye - target).normalize(), 1e-5));
        assert_eq!((view.fov_radians(), view.near_distance(), view.far_distance()), (1.2, 0.5, 50.0));
        let expected = glam::Mat4::perspective_rh(1.2, 2.0, 0.5, 50.0);
        assert!(view.view_params().data.projection.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_control_override_ignores_set_perspective() {
        let (ctx, mut view) = new_view();
        let before = view.view_params().data.view;
        view.set_perspective_control_active(true);
        view.set_perspective(&ctx, glam::Mat4::from_translation(glam::Vec3::ONE), 1.0, 0.1, 10.0);
        assert_eq!(view.view_params().data.view, before);
        assert_eq!(view.far_distance(), CameraState::default().far_distance);

        // 接管期间仍然可以移动相机
        view.move_perspective(glam::Vec3::X);
        assert!(view.get_view_position().abs_diff_eq(glam::Vec3::X, 1e-5));
    }

    #[test]
    fn test_move_is_local() {
        let (ctx, mut view) = new_view();
        // 相机看向 -X
        let eye = glam::Vec3::ZERO;
        view.set_perspective(&ctx, glam::Mat4::look_at_rh(eye, -glam::Vec3::X, glam::Vec3::Y), 1.0, 0.1, 100.0);
        view.move_perspective(glam::vec3(0.0, 0.0, -2.0));
        assert!(view.get_view_position().abs_diff_eq(glam::vec3(-2.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_rotate_keeps_position() {
        let (ctx, mut view) = new_view();
        let eye = glam::vec3(3.0, 1.0, 0.0);
        view.set_perspective(&ctx, glam::Mat4::look_at_rh(eye, glam::vec3(3.0, 1.0, -1.0), glam::Vec3::Y), 1.0, 0.1, 100.0);
        view.rotate_perspective(std::f32::consts::FRAC_PI_2, 0.0, 0.0);

        assert!(view.get_view_position().abs_diff_eq(eye, 1e-3));
        // 向左转 90 度后看向 -X，+Z 指向 +X
        assert!(view.get_view_direction().abs_diff_eq(glam::Vec3::X, 1e-4));
    }

    #[test]
    fn test_pitch_rotates_around_local_x() {
        let (ctx, mut view) = new_view();
        view.set_perspective(
            &ctx,
            glam::Mat4::look_at_rh(glam::Vec3::ZERO, -glam::Vec3::Z, glam::Vec3::Y),
            1.0,
            0.1,
            100.0,
        );
        view.rotate_perspective(0.0, std::f32::consts::FRAC_PI_4, 0.0);

        // 抬头 45 度，+Z 指向身后下方
        let s = std::f32::consts::FRAC_1_SQRT_2;
        assert!(view.get_view_direction().abs_diff_eq(glam::vec3(0.0, -s, s), 1e-4));
    }

    #[test]
    fn test_center_ray_follows_forward() {
        let (ctx, mut view) = new_view();
        view.set_perspective(
            &ctx,
            glam::Mat4::look_at_rh(glam::Vec3::ZERO, -glam::Vec3::Z, glam::Vec3::Y),
            1.0,
            0.1,
            100.0,
        );
        // 200x100 的屏幕中心
        let dir = view.get_ray_direction_at(100, 50);
        let half_pixel = (0.5 / 100.0f32, 0.5 / 50.0f32);
        assert!(dir.z < -0.99);
        assert!(dir.x > 0.0 && dir.x < half_pixel.0 * 2.0);
        // 屏幕 y 向下，光线 y 向下
        assert!(dir.y < 0.0 && dir.y > -half_pixel.1 * 2.0);
    }
}

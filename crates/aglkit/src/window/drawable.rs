use winit::dpi::LogicalSize;
use winit::window::Window;

use crate::coords::Rect;
use crate::device::Drawable;

impl Drawable for Window {
    fn drawable_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }

    fn bounds(&self) -> Rect {
        let logical: LogicalSize<f64> = self.inner_size().to_logical(self.scale_factor());
        Rect::from_size(logical.width as f32, logical.height as f32)
    }

    fn will_present(&self) {
        self.pre_present_notify();
    }
}

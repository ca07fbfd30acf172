//! Per-message artifact viewer: text/diagram modes, split layout, zoom,
//! maximize, drag-to-pan, the options menu, and the render cache.
//!
//! Rendering itself happens outside this module. Transitions that need an
//! image return `true`; the caller runs the renderer and reports back with
//! [`ViewerStates::complete_render`].

use std::collections::HashMap;
use tracing::debug;

use crate::state::MessageId;

pub const ZOOM_MIN: f32 = 0.5;
pub const ZOOM_MAX: f32 = 3.0;
pub const ZOOM_STEP: f32 = 0.25;

/// Stored in place of an image when the renderer fails
pub const RENDER_FALLBACK_SVG: &str =
    r#"<svg><text x="10" y="20">Error rendering diagram</text></svg>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Text,
    DiagramSingle,
    DiagramSplit,
}

/// Left pane of the split layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitPage {
    OriginalText,
    #[default]
    CliInstructions,
}

/// Scroll offset of the diagram container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanOffset {
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub menu_open: bool,
    pub mode: ViewMode,
    pub maximized: bool,
    pub zoom: f32,
    pub rendered_image: Option<String>,
    pub pan: PanOffset,
    pub split_page: SplitPage,
    render_pending: bool,
    drag_origin: Option<(u16, u16)>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            menu_open: false,
            mode: ViewMode::Text,
            maximized: false,
            zoom: 1.0,
            rendered_image: None,
            pan: PanOffset::default(),
            split_page: SplitPage::default(),
            render_pending: false,
            drag_origin: None,
        }
    }
}

impl ViewerState {
    pub fn is_diagram(&self) -> bool {
        matches!(self.mode, ViewMode::DiagramSingle | ViewMode::DiagramSplit)
    }

    pub fn is_rendering(&self) -> bool {
        self.render_pending
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }

    /// Switch to the single diagram view. Zoom resets, maximize is kept.
    /// Returns true if the caller must start a render.
    pub fn show_diagram(&mut self) -> bool {
        self.menu_open = false;
        self.mode = ViewMode::DiagramSingle;
        self.zoom = 1.0;
        self.request_render()
    }

    /// Switch to the split text/diagram view. Returns true if the caller must
    /// start a render.
    pub fn split_view(&mut self) -> bool {
        self.menu_open = false;
        self.mode = ViewMode::DiagramSplit;
        self.request_render()
    }

    /// Back to text. Leaves maximize and split; zoom is kept.
    pub fn back(&mut self) {
        self.mode = ViewMode::Text;
        self.maximized = false;
        self.drag_origin = None;
    }

    fn request_render(&mut self) -> bool {
        if self.rendered_image.is_some() || self.render_pending {
            return false;
        }
        self.render_pending = true;
        true
    }

    /// Store a finished render. An already cached image is never replaced.
    pub fn complete_render(&mut self, svg: String) {
        self.render_pending = false;
        if self.rendered_image.is_none() {
            self.rendered_image = Some(svg);
        }
    }

    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom + ZOOM_STEP).min(ZOOM_MAX);
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom - ZOOM_STEP).max(ZOOM_MIN);
    }

    pub fn can_zoom_in(&self) -> bool {
        self.zoom < ZOOM_MAX
    }

    pub fn can_zoom_out(&self) -> bool {
        self.zoom > ZOOM_MIN
    }

    pub fn zoom_percent(&self) -> u16 {
        (self.zoom * 100.0).round() as u16
    }

    pub fn toggle_maximize(&mut self) {
        self.maximized = !self.maximized;
    }

    pub fn toggle_menu(&mut self) {
        self.menu_open = !self.menu_open;
    }

    pub fn close_menu(&mut self) {
        self.menu_open = false;
    }

    /// Pointer pressed somewhere. Closes an open menu unless the press is
    /// inside it.
    pub fn pointer_down(&mut self, inside_menu: bool) {
        if self.menu_open && !inside_menu {
            self.menu_open = false;
        }
    }

    pub fn toggle_split_page(&mut self) {
        self.split_page = match self.split_page {
            SplitPage::OriginalText => SplitPage::CliInstructions,
            SplitPage::CliInstructions => SplitPage::OriginalText,
        };
    }

    pub fn drag_start(&mut self, x: u16, y: u16) {
        if self.is_diagram() {
            self.drag_origin = Some((x, y));
        }
    }

    /// Shift the scroll offset by the movement since the previous event.
    /// Dragging right/down scrolls toward the start, like grabbing a canvas.
    pub fn drag_move(&mut self, x: u16, y: u16) {
        let Some((last_x, last_y)) = self.drag_origin else {
            return;
        };
        self.pan.x = shift(self.pan.x, last_x, x);
        self.pan.y = shift(self.pan.y, last_y, y);
        self.drag_origin = Some((x, y));
    }

    /// Release or leave
    pub fn drag_end(&mut self) {
        self.drag_origin = None;
    }

    pub fn scroll_by(&mut self, dx: i32, dy: i32) {
        self.pan.x = (self.pan.x as i32 + dx).clamp(0, u16::MAX as i32) as u16;
        self.pan.y = (self.pan.y as i32 + dy).clamp(0, u16::MAX as i32) as u16;
    }
}

fn shift(offset: u16, last: u16, current: u16) -> u16 {
    let delta = current as i32 - last as i32;
    (offset as i32 - delta).clamp(0, u16::MAX as i32) as u16
}

/// Viewer states keyed by message. States are created lazily and never
/// shared between messages.
#[derive(Debug, Default)]
pub struct ViewerStates {
    states: HashMap<MessageId, ViewerState>,
}

impl ViewerStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: MessageId) -> Option<&ViewerState> {
        self.states.get(&id)
    }

    pub fn entry(&mut self, id: MessageId) -> &mut ViewerState {
        self.states.entry(id).or_default()
    }

    /// Deliver a render result. Returns false if the message's viewer is gone.
    pub fn complete_render(&mut self, id: MessageId, svg: String) -> bool {
        match self.states.get_mut(&id) {
            Some(state) => {
                state.complete_render(svg);
                true
            }
            None => {
                debug!(message = id, "discarding render for dropped viewer");
                false
            }
        }
    }

    /// Id of the message whose menu is open, if any
    pub fn open_menu(&self) -> Option<MessageId> {
        self.states
            .iter()
            .find(|(_, s)| s.menu_open)
            .map(|(id, _)| *id)
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

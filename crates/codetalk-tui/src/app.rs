use std::sync::Arc;
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use codetalk_core::diagram::{diagram_source_for, is_diagram_message};
use codetalk_core::export::{self, Export};
use codetalk_core::render::render_or_fallback;
use codetalk_core::session::{establish_session, run_turn};
use codetalk_core::state::PLACEHOLDER_TEXT;
use codetalk_core::viewer::RENDER_FALLBACK_SVG;
use codetalk_core::{
    AgentClient, Author, ChatMessage, ChatSession, Config, DiagramRenderer, DirDownloader,
    Downloader, MessageId, TurnError, ViewerState, ViewerStates,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Entries of the per-message options menu, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    DownloadText,
    DownloadSource,
    DownloadCli,
    ShowDiagram,
    SplitView,
}

impl MenuAction {
    pub const ALL: [MenuAction; 5] = [
        MenuAction::DownloadText,
        MenuAction::DownloadSource,
        MenuAction::DownloadCli,
        MenuAction::ShowDiagram,
        MenuAction::SplitView,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::DownloadText => "Download as text",
            MenuAction::DownloadSource => "Mermaid Class Diagram code",
            MenuAction::DownloadCli => "CLI Instructions",
            MenuAction::ShowDiagram => "Show Class Diagram",
            MenuAction::SplitView => "Split CLI & Diagram",
        }
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Chat input
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars

    // Conversation
    pub session: ChatSession,
    pub viewers: ViewerStates,
    pub selected: Option<MessageId>, // selected agent message
    pub menu_state: ListState,

    // Chat scroll
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Last export/notice shown in the footer
    pub status: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub menu_area: Option<Rect>,
    pub diagram_area: Option<Rect>,

    // Collaborators
    client: AgentClient,
    renderer: Arc<dyn DiagramRenderer>,
    downloader: DirDownloader,

    // Background work, polled on every tick
    session_task: Option<JoinHandle<String>>,
    turn_task: Option<(MessageId, JoinHandle<Result<String, TurnError>>)>,
    render_tasks: Vec<(MessageId, JoinHandle<String>)>,
}

impl App {
    pub fn new(
        config: &Config,
        session: ChatSession,
        renderer: Arc<dyn DiagramRenderer>,
        downloader: DirDownloader,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            input: String::new(),
            input_cursor: 0,

            session,
            viewers: ViewerStates::new(),
            selected: None,
            menu_state: ListState::default(),

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            status: None,
            animation_frame: 0,

            menu_area: None,
            diagram_area: None,

            client: AgentClient::new(config),
            renderer,
            downloader,

            session_task: None,
            turn_task: None,
            render_tasks: Vec::new(),
        }
    }

    pub fn app_name(&self) -> &str {
        self.client.app_name()
    }

    /// Register the session in the background. Sending stays disabled until
    /// the task resolves, with the server's id or the local fallback.
    pub fn start_session(&mut self) {
        let client = self.client.clone();
        let identity = self.session.identity().clone();
        self.session_task = Some(tokio::spawn(async move {
            establish_session(&client, &identity).await
        }));
    }

    // Messages and selection

    pub fn messages(&self) -> &[ChatMessage] {
        self.session.conversation().messages()
    }

    /// Agent replies that can carry a viewer (placeholders excluded)
    fn selectable_ids(&self) -> Vec<MessageId> {
        self.messages()
            .iter()
            .filter(|m| m.author == Author::Agent && !m.is_placeholder())
            .map(|m| m.id)
            .collect()
    }

    pub fn selected_message(&self) -> Option<&ChatMessage> {
        self.selected
            .and_then(|id| self.session.conversation().get(id))
    }

    pub fn select_next(&mut self) {
        self.close_selected_menu();
        let ids = self.selectable_ids();
        self.selected = match self.selected.and_then(|id| ids.iter().position(|&i| i == id)) {
            Some(pos) => ids.get(pos + 1).or(ids.last()).copied(),
            None => ids.first().copied(),
        };
    }

    pub fn select_prev(&mut self) {
        self.close_selected_menu();
        let ids = self.selectable_ids();
        self.selected = match self.selected.and_then(|id| ids.iter().position(|&i| i == id)) {
            Some(pos) => ids.get(pos.saturating_sub(1)).copied(),
            None => ids.last().copied(),
        };
    }

    pub fn clear_selection(&mut self) {
        self.close_selected_menu();
        self.selected = None;
    }

    fn close_selected_menu(&mut self) {
        if let Some(state) = self.selected_viewer_mut() {
            state.close_menu();
        }
    }

    /// Selected message if its viewer is in a diagram mode
    pub fn active_diagram(&self) -> Option<MessageId> {
        self.selected
            .filter(|id| self.viewers.get(*id).is_some_and(ViewerState::is_diagram))
    }

    pub fn selected_viewer(&self) -> Option<&ViewerState> {
        self.selected.and_then(|id| self.viewers.get(id))
    }

    fn selected_viewer_mut(&mut self) -> Option<&mut ViewerState> {
        let id = self.selected?;
        Some(self.viewers.entry(id))
    }

    /// Diagram source for a message: its fenced block, or synthesized
    pub fn diagram_source(&self, id: MessageId) -> Option<String> {
        self.session
            .conversation()
            .get(id)
            .map(|m| diagram_source_for(&m.text))
    }

    // Chat turns

    /// Session registration still in flight
    pub fn is_connecting(&self) -> bool {
        self.session_task.is_some()
    }

    pub fn can_send(&self) -> bool {
        !self.is_connecting() && self.session.can_send(&self.input)
    }

    pub fn send_message(&mut self) {
        if self.is_connecting() {
            return;
        }
        let Some(turn) = self.session.begin_turn(&self.input) else {
            return;
        };

        self.input.clear();
        self.input_cursor = 0;
        self.status = None;

        // Scroll to bottom so the placeholder is visible
        self.scroll_chat_to_bottom();

        let client = self.client.clone();
        let placeholder = turn.placeholder;
        self.turn_task = Some((
            placeholder,
            tokio::spawn(async move { run_turn(&client, &turn.text, &turn.identity).await }),
        ));
    }

    fn on_reply(&mut self, id: MessageId) {
        // Replies that are a bare mermaid block open straight into the diagram
        let opens_diagram = self
            .session
            .conversation()
            .get(id)
            .is_some_and(|m| is_diagram_message(&m.text));
        if opens_diagram {
            self.selected = Some(id);
            if self.viewers.entry(id).show_diagram() {
                self.spawn_render(id);
            }
        }
        self.scroll_chat_to_bottom();
    }

    /// Drop the conversation and every viewer; pending work is discarded
    pub fn clear_conversation(&mut self) {
        self.session.clear();
        self.viewers.clear();
        self.selected = None;
        self.chat_scroll = 0;
        self.status = Some("Conversation cleared".to_string());
        info!("conversation cleared");
    }

    // Background tasks

    pub async fn poll_tasks(&mut self) {
        if self.session_task.as_ref().is_some_and(|t| t.is_finished()) {
            if let Some(task) = self.session_task.take() {
                match task.await {
                    Ok(session_id) => self.session.adopt_session_id(session_id),
                    Err(err) => warn!(%err, "session task failed"),
                }
            }
        }

        if self.turn_task.as_ref().is_some_and(|(_, t)| t.is_finished()) {
            if let Some((placeholder, task)) = self.turn_task.take() {
                let result = task
                    .await
                    .unwrap_or_else(|err| Err(TurnError::Transport(err.to_string())));
                if self.session.finish_turn(placeholder, result) {
                    self.on_reply(placeholder);
                }
            }
        }

        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.render_tasks)
            .into_iter()
            .partition(|(_, task)| task.is_finished());
        self.render_tasks = pending;
        for (id, task) in done {
            let svg = task.await.unwrap_or_else(|err| {
                warn!(%err, "render task failed");
                RENDER_FALLBACK_SVG.to_string()
            });
            self.viewers.complete_render(id, svg);
        }
    }

    fn spawn_render(&mut self, id: MessageId) {
        let Some(source) = self.diagram_source(id) else {
            return;
        };
        let renderer = Arc::clone(&self.renderer);
        self.render_tasks.push((
            id,
            tokio::spawn(async move { render_or_fallback(renderer.as_ref(), &source).await }),
        ));
    }

    // Viewer actions on the selected message

    pub fn toggle_menu(&mut self) {
        if let Some(state) = self.selected_viewer_mut() {
            state.toggle_menu();
            self.menu_state.select(Some(0));
        }
    }

    pub fn menu_nav_down(&mut self) {
        let i = self.menu_state.selected().unwrap_or(0);
        self.menu_state.select(Some((i + 1).min(MenuAction::ALL.len() - 1)));
    }

    pub fn menu_nav_up(&mut self) {
        let i = self.menu_state.selected().unwrap_or(0);
        self.menu_state.select(Some(i.saturating_sub(1)));
    }

    pub fn menu_activate(&mut self) {
        let index = self.menu_state.selected().unwrap_or(0);
        if let Some(action) = MenuAction::ALL.get(index).copied() {
            self.run_menu_action(action);
        }
    }

    pub fn run_menu_action(&mut self, action: MenuAction) {
        match action {
            MenuAction::DownloadText => self.download_text(),
            MenuAction::DownloadSource => self.download_source(),
            MenuAction::DownloadCli => self.download_cli(),
            MenuAction::ShowDiagram => self.show_diagram(),
            MenuAction::SplitView => self.split_view(),
        }
    }

    pub fn show_diagram(&mut self) {
        let Some(id) = self.selected else { return };
        if self.viewers.entry(id).show_diagram() {
            self.spawn_render(id);
        }
    }

    pub fn split_view(&mut self) {
        let Some(id) = self.selected else { return };
        if self.viewers.entry(id).split_view() {
            self.spawn_render(id);
        }
    }

    pub fn back(&mut self) {
        if let Some(state) = self.selected_viewer_mut() {
            state.back();
        }
    }

    pub fn zoom_in(&mut self) {
        if let Some(state) = self.selected_viewer_mut() {
            state.zoom_in();
        }
    }

    pub fn zoom_out(&mut self) {
        if let Some(state) = self.selected_viewer_mut() {
            state.zoom_out();
        }
    }

    pub fn toggle_maximize(&mut self) {
        if let Some(state) = self.selected_viewer_mut() {
            state.toggle_maximize();
        }
    }

    pub fn toggle_split_page(&mut self) {
        if let Some(state) = self.selected_viewer_mut() {
            state.toggle_split_page();
        }
    }

    pub fn pan_by(&mut self, dx: i32, dy: i32) {
        if let Some(state) = self.selected_viewer_mut() {
            state.scroll_by(dx, dy);
        }
    }

    /// Begin drag-to-pan if the press lands on the diagram pane
    pub fn drag_start(&mut self, x: u16, y: u16) {
        let Some(id) = self.active_diagram() else { return };
        if self.diagram_area.is_some_and(|r| point_in_rect(x, y, r)) {
            self.viewers.entry(id).drag_start(x, y);
        }
    }

    /// Pointer moved with the button held. Leaving the pane ends the drag.
    pub fn drag_move(&mut self, x: u16, y: u16) {
        let Some(id) = self.active_diagram() else { return };
        let inside = self.diagram_area.is_some_and(|r| point_in_rect(x, y, r));
        let state = self.viewers.entry(id);
        if inside {
            state.drag_move(x, y);
        } else {
            state.drag_end();
        }
    }

    pub fn drag_end(&mut self) {
        if let Some(id) = self.active_diagram() {
            self.viewers.entry(id).drag_end();
        }
    }

    /// Mouse button pressed at (x, y): dismisses an open menu when the press
    /// is outside it
    pub fn pointer_down(&mut self, x: u16, y: u16) {
        if let Some(id) = self.viewers.open_menu() {
            let inside = self.menu_area.is_some_and(|r| point_in_rect(x, y, r));
            self.viewers.entry(id).pointer_down(inside);
        }
    }

    pub fn is_menu_open(&self) -> bool {
        self.viewers.open_menu().is_some()
    }

    // Exports

    pub fn download_text(&mut self) {
        let Some(msg) = self.selected_message() else { return };
        let export = export::text_export(&msg.text);
        self.save(export);
    }

    pub fn download_source(&mut self) {
        let Some(source) = self.selected.and_then(|id| self.diagram_source(id)) else {
            return;
        };
        self.save(export::source_export(&source));
    }

    pub fn download_cli(&mut self) {
        let Some(source) = self.selected.and_then(|id| self.diagram_source(id)) else {
            return;
        };
        self.save(export::cli_export(&source));
    }

    pub fn download_image(&mut self) {
        match self.selected_viewer().and_then(export::image_export) {
            Some(export) => self.save(export),
            None => self.status = Some("No rendered image yet".to_string()),
        }
    }

    fn save(&mut self, export: Export) {
        if let Some(state) = self.selected_viewer_mut() {
            state.close_menu();
        }
        self.status = Some(match self.downloader.download(&export) {
            Ok(path) => format!("Saved {}", path.display()),
            Err(err) => {
                warn!(%err, file = export.filename, "download failed");
                format!("Could not save {}: {}", export.filename, err)
            }
        });
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll chat to bottom so the newest message is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.messages() {
            total_lines += 1; // Author line ("You:" or "Agent:")
            let text = if msg.is_placeholder() || is_diagram_message(&msg.text) {
                PLACEHOLDER_TEXT // rendered as a single line
            } else {
                msg.text.as_str()
            };
            for line in text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add((char_count / wrap_width + 1) as u16);
            }
            total_lines += 1; // Blank line after message
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(3);
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(3);
    }
}

/// Check if a point is within a rectangle
pub fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use codetalk_core::state::FALLBACK_REPLY;
    use codetalk_core::{RenderError, ViewMode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingRenderer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DiagramRenderer for CountingRenderer {
        async fn render(&self, _source: &str) -> Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("<svg>ok</svg>".to_string())
        }
    }

    fn test_app(renderer: Arc<CountingRenderer>, dir: &TempDir) -> App {
        let mut config = Config::new();
        config.agent_url = "http://127.0.0.1:1/run_sse".to_string();
        config.session_base_url = "http://127.0.0.1:1".to_string();
        App::new(
            &config,
            ChatSession::new("user-test"),
            renderer,
            DirDownloader::new(dir.path()),
        )
    }

    /// Add a finished agent reply and select it
    fn add_reply(app: &mut App, text: &str) -> MessageId {
        let turn = app.session.begin_turn("question").unwrap();
        app.session.finish_turn(turn.placeholder, Ok(text.to_string()));
        app.selected = Some(turn.placeholder);
        turn.placeholder
    }

    async fn settle(app: &mut App) {
        for _ in 0..200 {
            app.poll_tasks().await;
            if !app.session.is_loading() && app.render_tasks.is_empty() && app.session_task.is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("background tasks did not finish");
    }

    #[tokio::test]
    async fn test_failed_turn_shows_fallback() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(Arc::new(CountingRenderer::default()), &dir);
        app.start_session();
        settle(&mut app).await;

        app.input = "hello".to_string();
        app.send_message();
        assert!(app.input.is_empty());
        assert!(!app.can_send());
        assert_eq!(app.messages().len(), 2);
        assert!(app.messages()[1].is_placeholder());

        settle(&mut app).await;
        assert_eq!(app.messages().len(), 2);
        assert_eq!(app.messages()[1].text, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_turns_wait_for_session_registration() {
        // Session endpoint that accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let dir = TempDir::new().unwrap();
        let mut config = Config::new();
        config.agent_url = "http://127.0.0.1:1/run_sse".to_string();
        config.session_base_url = base;
        config.session_timeout_ms = 300;
        let mut app = App::new(
            &config,
            ChatSession::new("user-test"),
            Arc::new(CountingRenderer::default()),
            DirDownloader::new(dir.path()),
        );
        let local_session = app.session.identity().session_id.clone();

        app.start_session();
        tokio::time::sleep(Duration::from_millis(100)).await;
        app.poll_tasks().await;

        app.input = "hello".to_string();
        assert!(app.is_connecting());
        assert!(!app.can_send());
        app.send_message();
        assert!(app.messages().is_empty());
        assert_eq!(app.input, "hello");

        // Registration times out and the local id is kept
        settle(&mut app).await;
        assert!(!app.is_connecting());
        assert_eq!(app.session.identity().session_id, local_session);
        assert!(app.can_send());
        app.send_message();
        assert_eq!(app.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_input_is_not_sent() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(Arc::new(CountingRenderer::default()), &dir);
        app.input = "   ".to_string();
        app.send_message();
        assert!(app.messages().is_empty());
    }

    #[tokio::test]
    async fn test_diagram_renders_once_per_message() {
        let dir = TempDir::new().unwrap();
        let renderer = Arc::new(CountingRenderer::default());
        let mut app = test_app(Arc::clone(&renderer), &dir);
        let id = add_reply(&mut app, "`A` depends on `B`");

        app.show_diagram();
        assert!(app.viewers.get(id).unwrap().is_rendering());
        settle(&mut app).await;
        assert!(!app.viewers.get(id).unwrap().is_rendering());
        assert_eq!(app.active_diagram(), Some(id));
        assert_eq!(
            app.viewers.get(id).unwrap().rendered_image.as_deref(),
            Some("<svg>ok</svg>")
        );

        app.back();
        assert_eq!(app.active_diagram(), None);
        app.show_diagram();
        app.split_view();
        settle(&mut app).await;
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(app.viewers.get(id).unwrap().mode, ViewMode::DiagramSplit);
    }

    #[tokio::test]
    async fn test_menu_closes_on_outside_press() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(Arc::new(CountingRenderer::default()), &dir);
        add_reply(&mut app, "text");
        app.menu_area = Some(Rect::new(10, 10, 20, 7));

        app.toggle_menu();
        app.pointer_down(12, 12);
        assert!(app.is_menu_open());
        app.pointer_down(0, 0);
        assert!(!app.is_menu_open());
    }

    #[tokio::test]
    async fn test_menu_actions_export_and_close() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(Arc::new(CountingRenderer::default()), &dir);
        add_reply(&mut app, "`A` via `B`");

        app.toggle_menu();
        app.menu_nav_down();
        app.menu_activate();
        assert!(!app.is_menu_open());

        let saved = std::fs::read_to_string(dir.path().join("class-diagram.mmd.txt")).unwrap();
        assert!(saved.starts_with("```mermaid\nclassDiagram\n"));
        assert!(saved.contains("A --> B : depends on"));
    }

    #[tokio::test]
    async fn test_image_download_guarded() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(Arc::new(CountingRenderer::default()), &dir);
        add_reply(&mut app, "`A`");

        app.download_image();
        assert_eq!(app.status.as_deref(), Some("No rendered image yet"));
        assert!(!dir.path().join("class-diagram.svg").exists());
    }

    #[tokio::test]
    async fn test_selection_skips_user_messages() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(Arc::new(CountingRenderer::default()), &dir);
        let first = add_reply(&mut app, "one");
        let second = add_reply(&mut app, "two");
        app.selected = None;

        app.select_prev();
        assert_eq!(app.selected, Some(second));
        app.select_prev();
        assert_eq!(app.selected, Some(first));
        app.select_prev();
        assert_eq!(app.selected, Some(first));
        app.select_next();
        app.select_next();
        assert_eq!(app.selected, Some(second));
    }

    #[tokio::test]
    async fn test_drag_pans_inside_diagram_pane() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(Arc::new(CountingRenderer::default()), &dir);
        let id = add_reply(&mut app, "`A`");
        app.diagram_area = Some(Rect::new(0, 0, 40, 20));

        // No drag while the message is in text mode
        app.drag_start(5, 5);
        app.drag_move(3, 2);
        assert_eq!(app.viewers.get(id).map(|s| s.pan.y), None);

        app.show_diagram();
        app.viewers.entry(id).scroll_by(10, 10);
        app.drag_start(5, 5);
        app.drag_move(3, 2);
        let pan = app.viewers.get(id).unwrap().pan;
        assert_eq!((pan.x, pan.y), (12, 13));

        app.drag_move(50, 50);
        assert!(!app.viewers.get(id).unwrap().is_dragging());
    }

    #[tokio::test]
    async fn test_clear_discards_viewers() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(Arc::new(CountingRenderer::default()), &dir);
        let id = add_reply(&mut app, "`A`");
        app.show_diagram();
        app.clear_conversation();
        settle(&mut app).await;
        assert!(app.viewers.get(id).is_none());
        assert!(app.messages().is_empty());
    }
}

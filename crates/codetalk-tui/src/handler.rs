use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use crate::app::{point_in_rect, App, InputMode, MenuAction};
use crate::tui::AppEvent;

/// Columns/rows moved per pan key press or wheel notch
const PAN_STEP: i32 = 3;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.poll_tasks().await;
            app.tick_animation();
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal if app.is_menu_open() => handle_menu(app, key),
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_menu(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.menu_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.menu_nav_up(),
        KeyCode::Enter => app.menu_activate(),
        KeyCode::Esc | KeyCode::Char('o') | KeyCode::Char('q') => app.toggle_menu(),
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    let diagram_active = app.active_diagram().is_some();

    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Back to the input line
        KeyCode::Char('i') | KeyCode::Char('/') => app.input_mode = InputMode::Editing,

        // Message selection
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev(),

        // Options menu for the selected reply
        KeyCode::Char('o') | KeyCode::Enter => app.toggle_menu(),

        // Viewer modes
        KeyCode::Char('d') => app.run_menu_action(MenuAction::ShowDiagram),
        KeyCode::Char('v') => app.run_menu_action(MenuAction::SplitView),
        KeyCode::Char('b') => app.back(),
        KeyCode::Esc => {
            if diagram_active {
                app.back();
            } else {
                app.clear_selection();
            }
        }
        KeyCode::Char('m') if diagram_active => app.toggle_maximize(),
        KeyCode::Tab if diagram_active => app.toggle_split_page(),

        // Zoom
        KeyCode::Char('+') | KeyCode::Char('=') if diagram_active => app.zoom_in(),
        KeyCode::Char('-') if diagram_active => app.zoom_out(),

        // Pan the diagram
        KeyCode::Left | KeyCode::Char('h') if diagram_active => app.pan_by(-PAN_STEP, 0),
        KeyCode::Right | KeyCode::Char('l') if diagram_active => app.pan_by(PAN_STEP, 0),
        KeyCode::PageUp if diagram_active => app.pan_by(0, -PAN_STEP),
        KeyCode::PageDown if diagram_active => app.pan_by(0, PAN_STEP),

        // Chat scroll
        KeyCode::PageUp => app.scroll_up(),
        KeyCode::PageDown => app.scroll_down(),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Exports
        KeyCode::Char('t') => app.run_menu_action(MenuAction::DownloadText),
        KeyCode::Char('s') => app.run_menu_action(MenuAction::DownloadSource),
        KeyCode::Char('c') => app.run_menu_action(MenuAction::DownloadCli),
        KeyCode::Char('p') if diagram_active => app.download_image(),

        // Clear conversation
        KeyCode::Char('X') => app.clear_conversation(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            if app.can_send() {
                app.send_message();
                app.input_mode = InputMode::Normal;
            }
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if app.input_cursor < app.input.chars().count() {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => app.input_cursor = 0,
        KeyCode::End => app.input_cursor = app.input.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_diagram = app.active_diagram().is_some()
        && app.diagram_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            // A click on a menu row runs that entry
            if let Some(action) = menu_action_at(app, x, y) {
                app.run_menu_action(action);
                return;
            }
            app.pointer_down(x, y);
            app.drag_start(x, y);
        }
        MouseEventKind::Down(_) => app.pointer_down(x, y),
        MouseEventKind::Drag(MouseButton::Left) => app.drag_move(x, y),
        MouseEventKind::Up(_) => app.drag_end(),
        MouseEventKind::ScrollDown => {
            if in_diagram {
                app.pan_by(0, PAN_STEP);
            } else {
                app.scroll_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_diagram {
                app.pan_by(0, -PAN_STEP);
            } else {
                app.scroll_up();
            }
        }
        _ => {}
    }
}

/// Menu entry under (x, y), if the menu is open. Rows start inside the border.
fn menu_action_at(app: &App, x: u16, y: u16) -> Option<MenuAction> {
    if !app.is_menu_open() {
        return None;
    }
    let area = app.menu_area.filter(|r| point_in_rect(x, y, *r))?;
    let row = y.checked_sub(area.y + 1)? as usize;
    MenuAction::ALL.get(row).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_to_byte_index_multibyte() {
        let s = "añb";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 9), s.len());
    }
}

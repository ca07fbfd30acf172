pub mod agent;
pub mod config;
pub mod diagram;
pub mod error;
pub mod export;
pub mod interpret;
pub mod render;
pub mod session;
pub mod state;
pub mod viewer;

// Re-export main types for convenience
pub use agent::AgentClient;
pub use config::Config;
pub use diagram::{diagram_source_for, extract_fenced, is_diagram_message, synthesize, ClassDiagram};
pub use error::{InterpretError, RenderError, TurnError};
pub use export::{DirDownloader, Downloader, Export};
pub use interpret::interpret;
pub use render::{DiagramRenderer, MmdcRenderer};
pub use session::{ChatSession, IdentityStore, PendingTurn, SessionIdentity};
pub use state::{Author, ChatMessage, Conversation, MessageId};
pub use viewer::{SplitPage, ViewMode, ViewerState, ViewerStates};

use hrconnect_core::ConversationId;
use tokio::sync::watch;

use crate::manager::{ChatSession, SessionSnapshot};

/// Width at which the navigation menu is always visible.
pub const DESKTOP_BREAKPOINT: u32 = 768;

/// Where a chat surface is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Widget,
    FullScreen,
}

/// Route of the full-screen chat, optionally pinned to a conversation.
pub fn full_screen_route(conversation_id: Option<ConversationId>) -> String {
    match conversation_id {
        Some(id) => format!("/chat?id={}", id),
        None => "/chat".to_string(),
    }
}

/// A surface's view of the shared session.
pub struct SurfaceView {
    surface: Surface,
    session: ChatSession,
    events: watch::Receiver<SessionSnapshot>,
}

impl SurfaceView {
    pub fn new(surface: Surface, session: &ChatSession) -> Self {
        Self {
            surface,
            session: session.clone(),
            events: session.subscribe(),
        }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Latest state, marking it as seen.
    pub fn current(&mut self) -> SessionSnapshot {
        self.events.borrow_and_update().clone()
    }

    /// Wait for the next state change.
    pub async fn changed(&mut self) -> SessionSnapshot {
        // The view holds the session, so the sender cannot close under it.
        let _ = self.events.changed().await;
        self.events.borrow_and_update().clone()
    }

    /// Input is accepted only while nothing is outstanding.
    pub fn input_enabled(&self) -> bool {
        !self.events.borrow().is_busy()
    }

    /// Link from this surface to the full-screen chat of the active conversation.
    pub fn open_link(&self) -> Option<String> {
        match self.surface {
            Surface::Widget => Some(full_screen_route(self.events.borrow().conversation_id)),
            Surface::FullScreen => None,
        }
    }
}

/// Navigation menu visibility on narrow layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutState {
    pub menu_open: bool,
}

impl LayoutState {
    pub fn toggle(&mut self) {
        self.menu_open = !self.menu_open;
    }

    pub fn close(&mut self) {
        self.menu_open = false;
    }

    pub fn on_resize(&mut self, width: u32) {
        if width >= DESKTOP_BREAKPOINT {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SessionOptions;
    use crate::storage::{ChatStorage, MemoryStore};
    use async_trait::async_trait;
    use hrconnect_core::{
        ChatBackend, ConversationDetail, HistoryList, QueryResponse, Result,
    };
    use std::sync::Arc;

    struct EchoBackend;

    #[async_trait]
    impl ChatBackend for EchoBackend {
        async fn query(
            &self,
            question: &str,
            _conversation_id: Option<ConversationId>,
        ) -> Result<QueryResponse> {
            Ok(QueryResponse {
                answer: question.to_uppercase(),
                conversation_id: Some(ConversationId(21)),
            })
        }

        async fn get_conversation(&self, _id: ConversationId) -> Result<ConversationDetail> {
            Ok(ConversationDetail::default())
        }

        async fn history(&self) -> Result<HistoryList> {
            Ok(HistoryList::default())
        }

        async fn delete_conversation(&self, _id: ConversationId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_full_screen_route() {
        assert_eq!(full_screen_route(None), "/chat");
        assert_eq!(full_screen_route(Some(ConversationId(7))), "/chat?id=7");
    }

    #[test]
    fn test_layout_closes_on_wide_screens() {
        let mut layout = LayoutState::default();
        layout.toggle();
        assert!(layout.menu_open);

        layout.on_resize(500);
        assert!(layout.menu_open);

        layout.on_resize(768);
        assert!(!layout.menu_open);
    }

    #[tokio::test]
    async fn test_surfaces_observe_the_same_session() {
        let session = ChatSession::open(
            Arc::new(EchoBackend),
            ChatStorage::new(Arc::new(MemoryStore::new())),
            SessionOptions::default(),
        );
        let mut widget = SurfaceView::new(Surface::Widget, &session);
        let mut full_screen = SurfaceView::new(Surface::FullScreen, &session);

        assert!(widget.input_enabled());
        assert_eq!(widget.open_link(), Some("/chat".to_string()));
        assert_eq!(full_screen.open_link(), None);

        widget.session().send("hello").await;

        let seen = full_screen.changed().await;
        assert_eq!(seen.messages.last().unwrap().text, "HELLO");
        assert_eq!(widget.current(), full_screen.current());
        assert_eq!(widget.open_link(), Some("/chat?id=21".to_string()));
        assert_eq!(full_screen.surface(), Surface::FullScreen);
    }
}

//! Handler dispatch table: a tagged union of `MessageType` plus function
//! values bound at orchestrator construction time, replacing the
//! inheritance-based handler hierarchies the source system used.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::{AgentMessage, MessageType};

/// Logic bound to one `MessageType` slot. Concrete orchestrator wiring
/// supplies these; the messaging layer itself only knows how to look one
/// up and call it.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &AgentMessage) -> anyhow::Result<()>;
}

fn _assert_object_safe(_: &dyn MessageHandler) {}

/// A `HashMap`-backed lookup over boxed handler trait objects, one per
/// `MessageType`. Unregistered types are reported by the caller (inbox
/// processing turns them into a failed outcome rather than panicking).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageType, Box<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: MessageType, handler: Box<dyn MessageHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: MessageType) -> Option<&dyn MessageHandler> {
        self.handlers.get(&kind).map(|boxed| boxed.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl MessageHandler for Noop {
        async fn handle(&self, _message: &AgentMessage) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn registered_type_is_found_unregistered_is_not() {
        let mut registry = HandlerRegistry::new();
        registry.register(MessageType::Alert, Box::new(Noop));

        assert!(registry.get(MessageType::Alert).is_some());
        assert!(registry.get(MessageType::PeerQuery).is_none());
    }
}

use std::sync::{Arc, RwLock};

/// An event that can be routed by kind.
pub trait EventKind {
    type Kind: Copy + Eq + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Typed publish/subscribe: handlers register for one kind and receive plain data.
pub struct EventDispatcher<E: EventKind> {
    handlers: RwLock<Vec<(E::Kind, Handler<E>)>>,
}

impl<E: EventKind> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }
}

impl<E: EventKind> EventDispatcher<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: E::Kind, handler: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.push((kind, Arc::new(handler)));
    }

    /// Call every handler registered for the event's kind, in registration order.
    pub fn emit(&self, event: &E) {
        let kind = event.kind();
        let matching: Vec<Handler<E>> = {
            let handlers = match self.handlers.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            handlers
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, h)| Arc::clone(h))
                .collect()
        };
        for handler in matching {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        A(u32),
        B,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum PingKind {
        A,
        B,
    }

    impl EventKind for Ping {
        type Kind = PingKind;

        fn kind(&self) -> PingKind {
            match self {
                Ping::A(_) => PingKind::A,
                Ping::B => PingKind::B,
            }
        }
    }

    #[test]
    fn handlers_only_see_their_kind() {
        let dispatcher = EventDispatcher::<Ping>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        dispatcher.on(PingKind::A, move |e| sink.lock().unwrap().push(e.clone()));

        dispatcher.emit(&Ping::A(1));
        dispatcher.emit(&Ping::B);
        dispatcher.emit(&Ping::A(2));

        assert_eq!(*seen.lock().unwrap(), vec![Ping::A(1), Ping::A(2)]);
    }

    #[test]
    fn handler_may_register_another_handler() {
        let dispatcher = Arc::new(EventDispatcher::<Ping>::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.on(PingKind::B, move |_| inner.on(PingKind::A, |_| {}));
        dispatcher.emit(&Ping::B);
        dispatcher.emit(&Ping::A(3));
    }
}

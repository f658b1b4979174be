use super::TapEvent;
use tokio::sync::mpsc;

/// Non-blocking tap export for forwarded exchanges.
///
/// Fire-and-forget over an unbounded channel: a full or closed receiver
/// drops events rather than stalling the engine. Disabled emitters are a
/// no-op with no channel behind them.
#[derive(Clone)]
pub struct TapEmitter {
    sender: Option<mpsc::UnboundedSender<TapEvent>>,
    include_raw: bool,
}

impl TapEmitter {
    pub fn new_disabled() -> Self {
        Self {
            sender: None,
            include_raw: false,
        }
    }

    /// Enabled emitter plus the receiving end for the consumer task.
    /// `include_raw` asks the engine to attach wire bytes to events.
    pub fn new_enabled(include_raw: bool) -> (Self, mpsc::UnboundedReceiver<TapEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(tx),
                include_raw,
            },
            rx,
        )
    }

    pub fn emit(&self, event: TapEvent) {
        if let Some(tx) = &self.sender {
            let _ = tx.send(event);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn include_raw(&self) -> bool {
        self.include_raw
    }
}

impl Default for TapEmitter {
    fn default() -> Self {
        Self::new_disabled()
    }
}

impl std::fmt::Debug for TapEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapEmitter")
            .field("enabled", &self.is_enabled())
            .field("include_raw", &self.include_raw)
            .finish()
    }
}

use tokio::sync::mpsc;
use vidlink_core::core::events::ProgressEmitter;
use vidlink_core::models::download::DownloadProgress;

/// Forwards progress notifications into an unbounded channel.
#[derive(Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<DownloadProgress>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DownloadProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressEmitter for ChannelEmitter {
    fn emit_progress(&self, progress: &DownloadProgress) {
        let _ = self.tx.send(progress.clone());
    }
}

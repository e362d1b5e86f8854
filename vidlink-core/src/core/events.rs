use crate::models::download::DownloadProgress;

/// Receives download progress notifications.
///
/// Implementations must be cheap: the download manager calls this from the
/// streaming task, already throttled to one call per progress interval plus a
/// single terminal notification.
pub trait ProgressEmitter: Send + Sync + 'static {
    fn emit_progress(&self, progress: &DownloadProgress);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

impl ProgressEmitter for NoopEmitter {
    fn emit_progress(&self, _progress: &DownloadProgress) {}
}

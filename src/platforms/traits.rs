use async_trait::async_trait;

use vidlink_core::platforms::Platform;

use crate::error::Result;
use crate::models::raw::RawMedia;

#[async_trait]
pub trait PlatformResolver: Send + Sync {
    fn platform(&self) -> Platform;

    fn name(&self) -> &str {
        self.platform().as_str()
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(self.platform())
    }

    /// Fetches the share URL and pulls the raw media out of whatever the
    /// platform serves. Never returns an empty success: a page without media
    /// is `NotFound`, a verification page is `ChallengeDetected`.
    async fn resolve(&self, url: &str) -> Result<RawMedia>;
}

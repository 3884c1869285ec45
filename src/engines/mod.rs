//! Speech recognition back-ends.

#[cfg(feature = "local-engines")]
pub mod local;
pub mod remote;

use async_trait::async_trait;

#[cfg(feature = "local-engines")]
pub use local::LocalRecognizer;
pub use remote::RemoteRecognizer;

/// A loaded model that turns mono `f32` samples into text.
///
/// Callers serialize access through the inference gate, so implementations
/// never see two concurrent calls from this server.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        language: &str,
    ) -> anyhow::Result<String>;
}

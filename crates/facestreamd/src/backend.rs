//! Scoring backend selection.

use std::sync::Arc;

use anyhow::Result;

use facestream_core::config::DetectionConfig;
use facestream_detect::CascadeNetwork;

/// Load the cascade networks from `config.model_dir`.
#[cfg(feature = "onnx")]
pub fn load(config: &DetectionConfig) -> Result<Arc<dyn CascadeNetwork>> {
    use anyhow::Context;
    use facestream_detect::onnx::OnnxCascade;

    let cascade = OnnxCascade::load(&config.model_dir).with_context(|| {
        format!(
            "failed to load cascade models from {}",
            config.model_dir.display()
        )
    })?;
    Ok(Arc::new(cascade))
}

#[cfg(not(feature = "onnx"))]
pub fn load(config: &DetectionConfig) -> Result<Arc<dyn CascadeNetwork>> {
    anyhow::bail!(
        "no detection backend compiled in; rebuild facestreamd with `--features onnx` \
         and place pnet.onnx, rnet.onnx and onet.onnx in {}",
        config.model_dir.display()
    )
}

//! Bridge constructors for the shipped segmenter languages.
//!
//! Each language ships as its own consumer module; the only differences
//! are the module name and the segmenter identity inside the runtime.

use std::sync::Arc;

use textbridge_runtime::{SharedRuntime, VmConfig};

use crate::bridge::{LanguageBridge, SegmenterSpec};

/// Japanese segmentation (`JapaneseSegmenter.segment`).
pub fn japanese(runtime: Arc<SharedRuntime>, config: VmConfig) -> LanguageBridge {
    LanguageBridge::new(
        "japanese",
        SegmenterSpec::new("JapaneseSegmenter", "segment"),
        runtime,
        config,
    )
}

/// Korean segmentation (`KoreanSegmenter.segment`).
pub fn korean(runtime: Arc<SharedRuntime>, config: VmConfig) -> LanguageBridge {
    LanguageBridge::new(
        "korean",
        SegmenterSpec::new("KoreanSegmenter", "segment"),
        runtime,
        config,
    )
}

/// Thai segmentation (`ThaiSegmenter.segment`).
pub fn thai(runtime: Arc<SharedRuntime>, config: VmConfig) -> LanguageBridge {
    LanguageBridge::new(
        "thai",
        SegmenterSpec::new("ThaiSegmenter", "segment"),
        runtime,
        config,
    )
}

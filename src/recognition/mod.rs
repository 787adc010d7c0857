//! Text recognition: the engine capability and the batch pipeline.
//!
//! An engine is heavy (a loaded model, a warmed-up remote service), so it is
//! never held globally. Each batch takes a [`RecognitionLease`], which
//! acquires a recognizer from the engine and hands it back when dropped,
//! whatever way the batch ends.

pub mod http;
pub mod pipeline;

use anyhow::anyhow;
use std::path::Path;

use crate::error::{Error, Result};

pub use http::HttpOcrEngine;
pub use pipeline::{drain, run_batch, BatchReport, DrainReport};

/// Turns one image into text. Empty output is a valid result.
pub trait Recognizer: Send {
    fn recognize(&mut self, image: &Path) -> anyhow::Result<String>;
}

/// Source of recognizers. `acquire` may be slow and may fail; a failure aborts
/// the batch that asked.
pub trait RecognitionEngine: Send + Sync {
    fn acquire(&self) -> anyhow::Result<Box<dyn Recognizer>>;

    /// Take a recognizer back once its batch is over.
    fn release(&self, recognizer: Box<dyn Recognizer>) {
        drop(recognizer);
    }
}

/// Exclusive use of a recognizer for the length of one batch.
pub struct RecognitionLease<'a> {
    engine: &'a dyn RecognitionEngine,
    recognizer: Option<Box<dyn Recognizer>>,
}

impl<'a> RecognitionLease<'a> {
    pub fn acquire(engine: &'a dyn RecognitionEngine) -> Result<Self> {
        let recognizer = engine
            .acquire()
            .map_err(|e| Error::RecognitionUnavailable(format!("{e:#}")))?;
        tracing::debug!("Recognition engine acquired");

        Ok(Self {
            engine,
            recognizer: Some(recognizer),
        })
    }

    pub fn recognize(&mut self, image: &Path) -> anyhow::Result<String> {
        match self.recognizer.as_mut() {
            Some(recognizer) => recognizer.recognize(image),
            None => Err(anyhow!("Recognition lease already released")),
        }
    }
}

impl Drop for RecognitionLease<'_> {
    fn drop(&mut self) {
        if let Some(recognizer) = self.recognizer.take() {
            self.engine.release(recognizer);
            tracing::debug!("Recognition engine released");
        }
    }
}

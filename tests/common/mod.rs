//! Shared fixtures for integration tests.
#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use picseek::config::{AssetConfig, RecognitionConfig, SearchConfig};
use picseek::db::Database;
use picseek::recognition::{RecognitionEngine, Recognizer};
use picseek::{ImageIndex, IngestOptions};

/// A 16x16 image whose pixels depend on `seed`; distinct seeds give distinct bytes.
pub fn image(seed: u32) -> DynamicImage {
    let img = RgbImage::from_fn(16, 16, |x, y| {
        Rgb([
            ((x * 16) as u8) ^ (seed as u8),
            (y * 16) as u8,
            (seed >> 8) as u8,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn png(seed: u32) -> Vec<u8> {
    encode(&image(seed), ImageFormat::Png)
}

pub struct Fixture {
    pub dir: TempDir,
    pub index: Arc<ImageIndex>,
}

pub fn fixture() -> Fixture {
    fixture_with(|_| {})
}

pub fn fixture_with(adjust: impl FnOnce(&mut AssetConfig)) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut assets = AssetConfig {
        path: dir.path().join("images"),
        archive_dir: Some(dir.path().join("archive")),
        ..Default::default()
    };
    adjust(&mut assets);

    let db = Database::open(&dir.path().join("picseek.db")).unwrap();
    db.initialize().unwrap();
    let index = ImageIndex::new(db, assets, SearchConfig::default()).unwrap();

    Fixture {
        dir,
        index: Arc::new(index),
    }
}

impl Fixture {
    /// Make every update of record `id` fail, through a second connection to the same file.
    pub fn block_updates(&self, id: i64) {
        let conn = rusqlite::Connection::open(self.dir.path().join("picseek.db")).unwrap();
        conn.execute_batch(&format!(
            "CREATE TRIGGER block_{id} BEFORE UPDATE ON images WHEN OLD.id = {id} \
             BEGIN SELECT RAISE(ABORT, 'blocked'); END;"
        ))
        .unwrap();
    }
}

/// Ingest `png(seed)` with optional operator text.
pub fn ingest(index: &ImageIndex, seed: u32, text: Option<&str>) -> i64 {
    let options = IngestOptions {
        text: text.map(str::to_string),
        ..Default::default()
    };
    index.ingest(&png(seed), &options).unwrap().id
}

pub fn recognition_config(batch_size: usize, max_retries: u32) -> RecognitionConfig {
    RecognitionConfig {
        batch_size,
        max_retries,
        ..Default::default()
    }
}

type Respond = dyn Fn(&Path) -> anyhow::Result<String> + Send + Sync;

/// Recognition engine driven by a closure, counting acquisitions and releases.
pub struct TestEngine {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub calls: Arc<AtomicUsize>,
    pub unavailable: AtomicBool,
    respond: Arc<Respond>,
}

impl TestEngine {
    pub fn new(respond: impl Fn(&Path) -> anyhow::Result<String> + Send + Sync + 'static) -> Self {
        Self {
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            calls: Arc::new(AtomicUsize::new(0)),
            unavailable: AtomicBool::new(false),
            respond: Arc::new(respond),
        }
    }

    /// Always returns the same text.
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct TestRecognizer {
    respond: Arc<Respond>,
    calls: Arc<AtomicUsize>,
}

impl Recognizer for TestRecognizer {
    fn recognize(&mut self, image: &Path) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(image)
    }
}

impl RecognitionEngine for TestEngine {
    fn acquire(&self) -> anyhow::Result<Box<dyn Recognizer>> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("engine offline");
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestRecognizer {
            respond: self.respond.clone(),
            calls: self.calls.clone(),
        }))
    }

    fn release(&self, _recognizer: Box<dyn Recognizer>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

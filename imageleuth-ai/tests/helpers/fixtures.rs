//! Stub collaborators and image fixtures

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use imageleuth_ai::db::{SessionLedger, SqliteLedger};
use imageleuth_ai::models::{ExpenseRecord, SessionClosing};
use imageleuth_ai::services::{Recognizer, VisionError};

/// Well-formed model reply for a WeChat travel receipt
pub const SUCCESS_REPLY: &str = r#"{"code":200,"data":{"金额":"¥117.17","币种":"人民币","付款时间":"2025-05-05 14:19:21","付款账户":"零钱通","费用用途":"滴滴","起点":"杭州萧山机场T3","终点":"绍兴万达中心","费用类别":"差旅费"}}"#;

/// Small opaque PNG
pub fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 6, Rgb([240, 240, 240]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Recognizer answering from a script, in call order
///
/// `Ok(text)` is returned as the model reply, `Err(msg)` as a network error.
/// Once the script runs out every call gets [`SUCCESS_REPLY`].
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<Result<&str, &str>>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|step| step.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_succeeds() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, _image_base64: &str) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(VisionError::NetworkError(message)),
            None => Ok(SUCCESS_REPLY.to_string()),
        }
    }
}

/// SQLite ledger with injectable faults
///
/// Detail writes start failing after `healthy_writes`; optionally every
/// `open_session` fails, or the first `failing_closes` closes fail.
pub struct FaultyLedger {
    inner: SqliteLedger,
    healthy_writes: usize,
    writes: AtomicUsize,
    fail_open: bool,
    failing_closes: usize,
    closes: AtomicUsize,
}

impl FaultyLedger {
    pub fn new(inner: SqliteLedger, healthy_writes: usize) -> Self {
        Self {
            inner,
            healthy_writes,
            writes: AtomicUsize::new(0),
            fail_open: false,
            failing_closes: 0,
            closes: AtomicUsize::new(0),
        }
    }

    /// Ledger whose only fault is the given one
    pub fn healthy(inner: SqliteLedger) -> Self {
        Self::new(inner, usize::MAX)
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_closes(mut self, count: usize) -> Self {
        self.failing_closes = count;
        self
    }
}

fn disk_error() -> imageleuth_common::Error {
    imageleuth_common::Error::Internal("disk I/O error".to_string())
}

#[async_trait]
impl SessionLedger for FaultyLedger {
    async fn open_session(
        &self,
        request_id: Uuid,
        client_origin: &str,
        started_at: DateTime<Utc>,
    ) -> imageleuth_common::Result<i64> {
        if self.fail_open {
            return Err(disk_error());
        }
        self.inner.open_session(request_id, client_origin, started_at).await
    }

    async fn write_detail(
        &self,
        session_id: i64,
        record: &ExpenseRecord,
    ) -> imageleuth_common::Result<()> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.healthy_writes {
            return Err(disk_error());
        }
        self.inner.write_detail(session_id, record).await
    }

    async fn close_session(
        &self,
        session_id: i64,
        closing: &SessionClosing,
    ) -> imageleuth_common::Result<()> {
        if self.closes.fetch_add(1, Ordering::SeqCst) < self.failing_closes {
            return Err(disk_error());
        }
        self.inner.close_session(session_id, closing).await
    }
}

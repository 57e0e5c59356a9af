use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::line_break::SegmentType;

/// The emitted frame (spec §3, §6): exactly these nine fields, no extra keys.
#[derive(Debug, Clone, Serialize)]
pub struct ResultFrame {
    pub code: i32,
    pub msg: String,
    pub data: String,
    pub speaker_id: String,
    pub is_new_line: bool,
    pub segment_type: SegmentType,
    pub timestamp: f64,
    pub confidence: f32,
}

/// A lazy ordered sequence of [`ResultFrame`] values; terminates when the session closes
/// (spec §4.7 `Session::Results()`).
pub struct ResultStream {
    rx: UnboundedReceiver<ResultFrame>,
}

impl ResultStream {
    pub(crate) fn new(rx: UnboundedReceiver<ResultFrame>) -> Self {
        Self { rx }
    }
}

impl Stream for ResultStream {
    type Item = ResultFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

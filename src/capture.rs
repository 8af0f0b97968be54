use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;

use ffmpeg::util::frame::video::Video;
use ffmpeg::{codec, decoder, format, media, rescale, software};
use ffmpeg_next::{self as ffmpeg};
use image::RgbImage;

use crate::error::ExtractionError;
use crate::frames::{FrameSink, FrameSource};

static INIT: OnceLock<Result<(), ffmpeg::Error>> = OnceLock::new();

pub(crate) fn init() -> Result<(), ffmpeg::Error> {
    *INIT.get_or_init(ffmpeg::init)
}

/// Container duration in seconds, falling back to the video stream's own
/// duration. `None` when neither is reported.
pub(crate) fn probe_duration(path: &Path) -> Result<Option<f64>, ffmpeg::Error> {
    init()?;
    let input = format::input(&path)?;

    if input.duration() > 0 {
        return Ok(Some(input.duration() as f64 * f64::from(rescale::TIME_BASE)));
    }

    Ok(input
        .streams()
        .best(media::Type::Video)
        .filter(|stream| stream.duration() > 0)
        .map(|stream| stream.duration() as f64 * f64::from(stream.time_base())))
}

/// Walks the whole seconds `0..end` as decoded frames arrive in timestamp order.
#[derive(Debug)]
pub(crate) struct SecondCursor {
    next: u32,
    end: u32,
}

impl SecondCursor {
    pub(crate) fn new(end: u32) -> Self {
        Self { next: 0, end }
    }

    pub(crate) fn position(&self) -> u32 {
        self.next
    }

    pub(crate) fn is_done(&self) -> bool {
        self.next >= self.end
    }

    /// Seconds strictly before `timestamp` that have not been handed out yet.
    /// The frame held before the one at `timestamp` is the one on screen then.
    pub(crate) fn due_before(&mut self, timestamp: f64) -> Range<u32> {
        let start = self.next;
        while self.next < self.end && f64::from(self.next) < timestamp {
            self.next += 1;
        }
        start..self.next
    }

    pub(crate) fn rest(&mut self) -> Range<u32> {
        let start = self.next;
        self.next = self.end;
        start..self.end
    }
}

/// Frame source backed by libav decoding.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FfmpegFrames;

impl FrameSource for FfmpegFrames {
    fn duration(&self, video: &Path) -> Result<Option<f64>, ExtractionError> {
        probe_duration(video).map_err(|e| unreadable(video, e))
    }

    fn sample(
        &self,
        video: &Path,
        seconds: u32,
        sink: &mut FrameSink<'_>,
    ) -> Result<(), ExtractionError> {
        init().map_err(|e| unreadable(video, e))?;
        let mut input = format::input(&video).map_err(|e| unreadable(video, e))?;

        let video_stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| unreadable(video, ffmpeg::Error::StreamNotFound))?;
        let video_stream_index = video_stream.index();
        let time_base: f64 = video_stream.time_base().into();
        let start_time = video_stream.start_time().max(0);

        let mut decoder = codec::context::Context::from_parameters(video_stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|e| unreadable(video, e))?;

        let scaler = software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| unreadable(video, e))?;

        let mut decoding = Decoding {
            scaler,
            time_base,
            start_time,
            sampler: Sampler::new(seconds),
            sink,
        };

        for (stream, packet) in input.packets() {
            if stream.index() != video_stream_index {
                continue;
            }
            decoder
                .send_packet(&packet)
                .map_err(|e| decoding.capture_error(e))?;
            decoding.receive_and_process_decoded_frames(&mut decoder)?;
            if decoding.sampler.is_done() {
                return Ok(());
            }
        }
        decoder.send_eof().map_err(|e| decoding.capture_error(e))?;
        decoding.receive_and_process_decoded_frames(&mut decoder)?;
        decoding.finish()
    }
}

/// Picks the frame on screen at each whole second from frames arriving in
/// timestamp order. A frame stays on screen until the next one starts; the
/// first frame also stands in for any seconds before it.
#[derive(Debug)]
pub(crate) struct Sampler<T> {
    cursor: SecondCursor,
    held: Option<T>,
}

impl<T> Sampler<T> {
    pub(crate) fn new(seconds: u32) -> Self {
        Self {
            cursor: SecondCursor::new(seconds),
            held: None,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.cursor.is_done()
    }

    pub(crate) fn position(&self) -> u32 {
        self.cursor.position()
    }

    /// Offers a frame shown from `timestamp` seconds on. `emit` receives the
    /// seconds that became due and the frame covering them.
    pub(crate) fn push<E>(
        &mut self,
        timestamp: f64,
        frame: T,
        emit: impl FnOnce(Range<u32>, &T) -> Result<(), E>,
    ) -> Result<(), E> {
        let due = self.cursor.due_before(timestamp);
        if !due.is_empty() {
            emit(due, self.held.as_ref().unwrap_or(&frame))?;
        }
        self.held = Some(frame);
        Ok(())
    }

    /// The last frame stays on screen until the end of the video.
    pub(crate) fn finish<E>(
        &mut self,
        emit: impl FnOnce(Range<u32>, &T) -> Result<(), E>,
    ) -> Result<(), E> {
        if self.cursor.is_done() {
            return Ok(());
        }
        match &self.held {
            Some(held) => emit(self.cursor.rest(), held),
            None => Ok(()),
        }
    }
}

struct Decoding<'a, 'b> {
    scaler: software::scaling::context::Context,
    time_base: f64,
    start_time: i64,
    sampler: Sampler<Video>,
    sink: &'a mut FrameSink<'b>,
}

impl Decoding<'_, '_> {
    fn receive_and_process_decoded_frames(
        &mut self,
        decoder: &mut decoder::Video,
    ) -> Result<(), ExtractionError> {
        loop {
            let mut decoded = Video::empty();
            if decoder.receive_frame(&mut decoded).is_err() {
                return Ok(());
            }
            let timestamp = decoded
                .timestamp()
                .ok_or_else(|| self.capture_error("decoded frame has no timestamp"))?;
            let seconds = (timestamp - self.start_time) as f64 * self.time_base;

            let scaler = &mut self.scaler;
            let sink = &mut *self.sink;
            self.sampler.push(seconds, decoded, |due, frame| {
                emit(scaler, sink, due, frame)
            })?;
            if self.sampler.is_done() {
                return Ok(());
            }
        }
    }

    fn finish(&mut self) -> Result<(), ExtractionError> {
        let scaler = &mut self.scaler;
        let sink = &mut *self.sink;
        self.sampler.finish(|rest, frame| emit(scaler, sink, rest, frame))
    }

    fn capture_error(&self, error: impl ToString) -> ExtractionError {
        ExtractionError::FrameCapture {
            second: self.sampler.position(),
            message: error.to_string(),
        }
    }
}

/// Converts `frame` once and hands a copy to `sink` for every second it covers.
fn emit(
    scaler: &mut software::scaling::context::Context,
    sink: &mut FrameSink<'_>,
    seconds: Range<u32>,
    frame: &Video,
) -> Result<(), ExtractionError> {
    let image = to_rgb_image(scaler, frame).map_err(|message| ExtractionError::FrameCapture {
        second: seconds.start,
        message,
    })?;
    let last = seconds.end.saturating_sub(1);
    for second in seconds {
        if second == last {
            return sink(second, image);
        }
        sink(second, image.clone())?;
    }
    Ok(())
}

fn to_rgb_image(
    scaler: &mut software::scaling::context::Context,
    frame: &Video,
) -> Result<RgbImage, String> {
    let mut rgb_frame = Video::empty();
    scaler.run(frame, &mut rgb_frame).map_err(|e| e.to_string())?;

    let width = rgb_frame.width();
    let height = rgb_frame.height();
    let pixels = packed_rows(
        rgb_frame.data(0),
        rgb_frame.stride(0),
        width as usize * 3,
        height as usize,
    )?;

    RgbImage::from_raw(width, height, pixels).ok_or_else(|| "Failed to create image buffer".to_owned())
}

/// Drops the per-row padding libav adds after `row` bytes of pixel data.
fn packed_rows(data: &[u8], stride: usize, row: usize, height: usize) -> Result<Vec<u8>, String> {
    let mut pixels = Vec::with_capacity(row * height);
    for y in 0..height {
        let offset = y * stride;
        let line = data
            .get(offset..offset + row)
            .ok_or_else(|| format!("frame buffer too short for row {y}"))?;
        pixels.extend_from_slice(line);
    }
    Ok(pixels)
}

fn unreadable(video: &Path, error: ffmpeg::Error) -> ExtractionError {
    ExtractionError::UnreadableVideo {
        path: video.to_path_buf(),
        message: error.to_string(),
    }
}
